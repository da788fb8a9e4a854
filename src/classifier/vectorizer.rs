//! TF-IDF vectorizer with a bounded vocabulary.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Sparse document vector: `(term index, weight)` sorted by index.
pub type SparseVec = Vec<(usize, f64)>;

/// Lowercased alphanumeric tokens of at least two characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
}

#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Fit vocabulary and inverse document frequencies on `docs`.
    ///
    /// At most `max_features` terms are kept, chosen by descending document
    /// frequency with ties broken lexically. Returns `None` when the corpus
    /// contains no usable token at all.
    pub fn fit<S: AsRef<str>>(docs: &[S], max_features: usize) -> Option<Self> {
        let mut df: BTreeMap<String, usize> = BTreeMap::new();
        for doc in docs {
            let terms: HashSet<String> = tokenize(doc.as_ref()).collect();
            for t in terms {
                *df.entry(t).or_insert(0) += 1;
            }
        }
        if df.is_empty() || max_features == 0 {
            return None;
        }

        // BTreeMap iteration is lexical; a stable sort keeps that for ties.
        let mut ranked: Vec<(String, usize)> = df.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(max_features);
        ranked.sort_by(|a, b| a.0.cmp(&b.0));

        let n = docs.len() as f64;
        let mut vocabulary = HashMap::with_capacity(ranked.len());
        let mut idf = Vec::with_capacity(ranked.len());
        for (i, (term, freq)) in ranked.into_iter().enumerate() {
            idf.push(((1.0 + n) / (1.0 + freq as f64)).ln() + 1.0);
            vocabulary.insert(term, i);
        }

        Some(Self { vocabulary, idf })
    }

    pub fn len(&self) -> usize {
        self.idf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idf.is_empty()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }

    /// L2-normalized TF-IDF vector. Empty if no token is in the vocabulary.
    pub fn transform(&self, text: &str) -> SparseVec {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for t in tokenize(text) {
            if let Some(&i) = self.vocabulary.get(&t) {
                *counts.entry(i).or_insert(0.0) += 1.0;
            }
        }

        let mut v: SparseVec = counts
            .into_iter()
            .map(|(i, tf)| (i, tf * self.idf[i]))
            .collect();

        let norm = v.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in v.iter_mut() {
                *w /= norm;
            }
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_short_tokens() {
        let tokens: Vec<String> = tokenize("GET /a/Index.html?id=1").collect();
        assert_eq!(tokens, vec!["get", "index", "html", "id"]);
    }

    #[test]
    fn test_vocabulary_cap_prefers_frequent_then_lexical() {
        let docs = ["aa bb cc", "bb cc", "cc dd", "ee"];
        let v = TfidfVectorizer::fit(&docs, 3).unwrap();
        assert_eq!(v.len(), 3);
        // cc (df 3), bb (df 2), then aa wins the df-1 tie over dd and ee.
        assert!(v.contains("cc"));
        assert!(v.contains("bb"));
        assert!(v.contains("aa"));
        assert!(!v.contains("dd"));
        assert!(!v.contains("ee"));
    }

    #[test]
    fn test_transform_is_normalized() {
        let docs = ["get index html", "get login", "post login"];
        let v = TfidfVectorizer::fit(&docs, 1000).unwrap();
        let x = v.transform("GET /login");
        let norm: f64 = x.iter().map(|(_, w)| w * w).sum();
        assert!((norm - 1.0).abs() < 1e-9);
        assert_eq!(x.len(), 2);
    }

    #[test]
    fn test_unknown_text_is_empty() {
        let v = TfidfVectorizer::fit(&["get index"], 1000).unwrap();
        assert!(v.transform("zzz qqq").is_empty());
        assert!(v.transform("").is_empty());
    }

    #[test]
    fn test_no_tokens_no_vocabulary() {
        assert!(TfidfVectorizer::fit(&["/ - ?", "a b"], 1000).is_none());
    }
}
