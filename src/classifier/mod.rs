//! Local statistical classifier trained from the memory.
//!
//! The model is a TF-IDF vectorizer feeding a multinomial naive Bayes. It is
//! refit from scratch on the whole corpus on every retrain and swapped in as
//! a unit; a prediction never observes a half-built model.

pub mod naive_bayes;
pub mod vectorizer;

use self::naive_bayes::MultinomialNb;
use self::vectorizer::TfidfVectorizer;
use crate::category::Category;
use crate::memory::MemoryEntry;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_FEATURES: usize = 1000;
pub const DEFAULT_MIN_CORPUS_SIZE: usize = 5;

/// Reasons the local model defers to the oracle. Expected, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, serde::Serialize)]
pub enum NoPrediction {
    #[error("model has not been trained yet")]
    Untrained,
    #[error("line shares no vocabulary with the trained model")]
    EmptyVector,
}

/// What a retrain attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrainOutcome {
    Skipped { have: usize, needed: usize },
    Trained { samples: usize, vocabulary: usize, classes: usize },
    /// The corpus yields no usable vocabulary; the previous model is kept.
    Failed { samples: usize },
}

#[derive(Debug, Clone)]
pub struct ClassifierModel {
    vectorizer: TfidfVectorizer,
    nb: MultinomialNb,
}

impl ClassifierModel {
    pub fn vocabulary_size(&self) -> usize {
        self.vectorizer.len()
    }

    pub fn classes(&self) -> &[Category] {
        self.nb.classes()
    }
}

#[derive(Debug, Clone)]
pub struct LocalClassifier {
    max_features: usize,
    min_corpus_size: usize,
    model: Option<ClassifierModel>,
}

impl Default for LocalClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FEATURES, DEFAULT_MIN_CORPUS_SIZE)
    }
}

impl LocalClassifier {
    pub fn new(max_features: usize, min_corpus_size: usize) -> Self {
        Self {
            max_features,
            min_corpus_size,
            model: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&ClassifierModel> {
        self.model.as_ref()
    }

    pub fn predict(&self, line: &str) -> Result<Category, NoPrediction> {
        let model = self.model.as_ref().ok_or(NoPrediction::Untrained)?;
        let x = model.vectorizer.transform(line);
        if x.is_empty() {
            return Err(NoPrediction::EmptyVector);
        }
        Ok(model.nb.predict(&x))
    }

    /// Refit vectorizer and model on the full corpus.
    pub fn retrain(&mut self, corpus: &[MemoryEntry]) -> RetrainOutcome {
        if corpus.len() < self.min_corpus_size {
            debug!(
                have = corpus.len(),
                needed = self.min_corpus_size,
                "not enough examples to train yet"
            );
            return RetrainOutcome::Skipped {
                have: corpus.len(),
                needed: self.min_corpus_size,
            };
        }

        let docs: Vec<&str> = corpus.iter().map(|e| e.line.as_str()).collect();
        let Some(vectorizer) = TfidfVectorizer::fit(&docs, self.max_features) else {
            warn!(samples = corpus.len(), "corpus has no usable vocabulary, keeping previous model");
            return RetrainOutcome::Failed { samples: corpus.len() };
        };

        let samples: Vec<_> = corpus
            .iter()
            .map(|e| (vectorizer.transform(&e.line), e.label))
            .collect();
        let Some(nb) = MultinomialNb::fit(&samples, vectorizer.len()) else {
            warn!(samples = corpus.len(), "model fit failed, keeping previous model");
            return RetrainOutcome::Failed { samples: corpus.len() };
        };

        let model = ClassifierModel { vectorizer, nb };
        let outcome = RetrainOutcome::Trained {
            samples: corpus.len(),
            vocabulary: model.vocabulary_size(),
            classes: model.classes().len(),
        };
        self.model = Some(model);

        info!(samples = corpus.len(), "model trained");
        outcome
    }
}
