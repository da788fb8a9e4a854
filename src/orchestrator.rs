//! Per-line decision chain: memory, local model, heuristic, oracle.
//!
//! ```text
//! line -> trim -> empty?            -> No Attack (nothing recorded)
//!              -> memorized?        -> stored label (nothing recorded)
//!              -> model verdict?    -> verdict, unless "No Attack" on a
//!                                      suspicious line
//!              -> oracle            -> oracle label, or No Attack + review
//! ```
//!
//! Every verdict from the model or the oracle is memorized, persisted and
//! followed by a retrain attempt before the next line is taken.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::category::Category;
use crate::classifier::{LocalClassifier, NoPrediction, RetrainOutcome};
use crate::heuristic::Heuristic;
use crate::memory::MemoryStore;
use crate::oracle::retry::RetryError;
use crate::oracle::{Oracle, RetryPolicy};
use crate::review::{ReviewEntry, ReviewLog};

/// Why a line was sent to the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Escalation {
    /// The local model had nothing to say.
    ModelNoPrediction(NoPrediction),
    /// The model said "No Attack" but the line carries a suspicious marker.
    SuspiciousNoAttack,
}

/// How a line's category was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    Empty,
    CacheHit,
    Model,
    Oracle { reason: Escalation },
    /// The oracle failed; resolved to the safe default and flagged.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub line: String,
    pub category: Category,
    pub resolution: Resolution,
}

/// Counters over the lifetime of an orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainStats {
    pub lines: u64,
    pub empty: u64,
    pub cache_hits: u64,
    pub model_verdicts: u64,
    pub oracle_calls: u64,
    pub fallbacks: u64,
    pub retrain_attempts: u64,
    pub retrains: u64,
    pub persist_failures: u64,
}

pub struct Orchestrator<S: MemoryStore> {
    store: S,
    classifier: LocalClassifier,
    heuristic: Heuristic,
    oracle: Box<dyn Oracle>,
    retry: RetryPolicy,
    review: Option<ReviewLog>,
    cancel: CancellationToken,
    stats: ChainStats,
}

impl<S: MemoryStore> Orchestrator<S> {
    pub fn new(store: S, oracle: Box<dyn Oracle>) -> Self {
        Self {
            store,
            classifier: LocalClassifier::default(),
            heuristic: Heuristic::default(),
            oracle,
            retry: RetryPolicy::default(),
            review: None,
            cancel: CancellationToken::new(),
            stats: ChainStats::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: LocalClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_heuristic(mut self, heuristic: Heuristic) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_review_log(mut self, review: ReviewLog) -> Self {
        self.review = Some(review);
        self
    }

    /// Token that cuts oracle retry backoff short on shutdown.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn classifier(&self) -> &LocalClassifier {
        &self.classifier
    }

    pub fn stats(&self) -> &ChainStats {
        &self.stats
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Train from whatever the memory already holds.
    pub fn warm_start(&mut self) -> RetrainOutcome {
        self.retrain()
    }

    /// Run one line through the chain.
    pub async fn process_line(&mut self, raw: &str) -> Classification {
        self.stats.lines += 1;

        let line = raw.trim();
        if line.is_empty() {
            self.stats.empty += 1;
            debug!("empty line, skipping");
            return Classification {
                line: String::new(),
                category: Category::NoAttack,
                resolution: Resolution::Empty,
            };
        }

        if let Some(category) = self.store.get(line) {
            self.stats.cache_hits += 1;
            debug!(%line, %category, "memorized");
            return Classification {
                line: line.to_string(),
                category,
                resolution: Resolution::CacheHit,
            };
        }

        let reason = match self.classifier.predict(line) {
            Ok(Category::NoAttack) if self.heuristic.is_suspicious(line) => {
                info!(
                    %line,
                    keyword = self.heuristic.matched_keyword(line).unwrap_or_default(),
                    "model says No Attack but line looks suspicious"
                );
                Escalation::SuspiciousNoAttack
            }
            Ok(verdict) => {
                self.stats.model_verdicts += 1;
                debug!(%line, category = %verdict, "classified by local model");
                return self.resolve(line, verdict, Resolution::Model);
            }
            Err(no_prediction) => {
                debug!(%line, reason = %no_prediction, "local model deferred");
                Escalation::ModelNoPrediction(no_prediction)
            }
        };

        self.stats.oracle_calls += 1;
        info!(%line, ?reason, "escalating to oracle");
        let answer = self
            .retry
            .classify(self.oracle.as_ref(), line, &self.cancel)
            .await;
        match answer {
            Ok(category) => {
                let category = category.storable();
                info!(%line, %category, "classified by oracle");
                self.resolve(line, category, Resolution::Oracle { reason })
            }
            Err(e) => self.fall_back(line, e).await,
        }
    }

    fn resolve(&mut self, line: &str, category: Category, resolution: Resolution) -> Classification {
        self.store.put(line, category);
        if let Err(e) = self.store.persist() {
            self.stats.persist_failures += 1;
            error!(error = %e, "MEMORY NOT PERSISTED; answers will be lost on restart");
        }
        self.retrain();

        Classification {
            line: line.to_string(),
            category,
            resolution,
        }
    }

    fn retrain(&mut self) -> RetrainOutcome {
        self.stats.retrain_attempts += 1;
        let outcome = self.classifier.retrain(self.store.all());
        if matches!(outcome, RetrainOutcome::Trained { .. }) {
            self.stats.retrains += 1;
        }
        outcome
    }

    async fn fall_back(&mut self, line: &str, err: RetryError) -> Classification {
        self.stats.fallbacks += 1;
        error!(%line, error = %err, "oracle unavailable, flagging line for review");

        if let Some(review) = &self.review {
            let entry = ReviewEntry::new(line, err.last_error.to_string(), err.attempts);
            if let Err(e) = review.append(&entry).await {
                warn!(error = %e, "failed to record review entry");
            }
        }

        Classification {
            line: line.to_string(),
            category: Category::NoAttack,
            resolution: Resolution::Fallback,
        }
    }
}
