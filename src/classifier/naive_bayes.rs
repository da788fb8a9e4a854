//! Multinomial naive Bayes over sparse TF-IDF features.

use super::vectorizer::SparseVec;
use crate::category::Category;

/// Laplace smoothing.
const ALPHA: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct MultinomialNb {
    classes: Vec<Category>,
    class_log_prior: Vec<f64>,
    feature_log_prob: Vec<Vec<f64>>, // [n_classes][n_features]
}

impl MultinomialNb {
    /// Fit on `(features, label)` samples. Returns `None` for an empty set.
    pub fn fit(samples: &[(SparseVec, Category)], n_features: usize) -> Option<Self> {
        if samples.is_empty() || n_features == 0 {
            return None;
        }

        let mut classes: Vec<Category> = samples.iter().map(|(_, c)| *c).collect();
        classes.sort();
        classes.dedup();

        let mut class_count = vec![0usize; classes.len()];
        let mut feature_count = vec![vec![0.0f64; n_features]; classes.len()];
        for (x, label) in samples {
            // classes is sorted and contains every label
            let k = classes.binary_search(label).ok()?;
            class_count[k] += 1;
            for &(j, w) in x {
                feature_count[k][j] += w;
            }
        }

        let total = samples.len() as f64;
        let class_log_prior = class_count
            .iter()
            .map(|&c| (c as f64 / total).ln())
            .collect();

        let feature_log_prob = feature_count
            .iter()
            .map(|row| {
                let denom = (row.iter().sum::<f64>() + ALPHA * n_features as f64).ln();
                row.iter().map(|&fc| (fc + ALPHA).ln() - denom).collect()
            })
            .collect();

        Some(Self {
            classes,
            class_log_prior,
            feature_log_prob,
        })
    }

    pub fn classes(&self) -> &[Category] {
        &self.classes
    }

    /// Most likely class; ties go to the first class in category order.
    pub fn predict(&self, x: &SparseVec) -> Category {
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (k, prior) in self.class_log_prior.iter().enumerate() {
            let score = prior
                + x.iter()
                    .map(|&(j, w)| w * self.feature_log_prob[k][j])
                    .sum::<f64>();
            if score > best_score {
                best_score = score;
                best = k;
            }
        }
        self.classes[best]
    }
}
