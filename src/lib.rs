//! waftriage -- self-training attack classifier for web request logs.
//!
//! Each new log line is answered from memory when possible, then by a
//! locally trained naive Bayes model, and only as a last resort by an
//! external classification oracle. Every answer obtained is memorized and
//! the local model is retrained from the memory, so oracle traffic falls as
//! the system sees more of its own traffic.

pub mod category;
pub mod classifier;
pub mod config;
pub mod heuristic;
pub mod memory;
pub mod oracle;
pub mod orchestrator;
pub mod review;
pub mod tailer;

use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::classifier::LocalClassifier;
use crate::config::Config;
use crate::heuristic::Heuristic;
use crate::memory::{JsonFileStore, MemoryStore};
use crate::oracle::{ChatOracle, Oracle, RetryPolicy};
use crate::orchestrator::{ChainStats, Orchestrator, Resolution};
use crate::review::ReviewLog;
use crate::tailer::{LogTailer, StartPosition};

/// Assemble a decision chain from configuration around `store` and `oracle`.
pub fn build_orchestrator<S: MemoryStore>(
    config: &Config,
    store: S,
    oracle: Box<dyn Oracle>,
    cancel: CancellationToken,
) -> Orchestrator<S> {
    Orchestrator::new(store, oracle)
        .with_classifier(LocalClassifier::new(
            config.classifier.max_features,
            config.classifier.min_corpus_size,
        ))
        .with_heuristic(Heuristic::with_extra(&config.heuristic.extra_keywords))
        .with_retry(RetryPolicy::from_config(&config.oracle))
        .with_review_log(ReviewLog::new(&config.memory.review_log))
        .with_cancel(cancel)
}

/// Open the durable memory and connect the oracle.
///
/// Fails when no oracle credentials are configured.
pub fn open_chain(config: &Config, cancel: CancellationToken) -> Result<Orchestrator<JsonFileStore>> {
    config.validate()?;
    let oracle = ChatOracle::new(&config.oracle).context("cannot start without an oracle")?;
    let store = JsonFileStore::open(&config.memory.path);

    let mut chain = build_orchestrator(config, store, Box::new(oracle), cancel);
    chain.warm_start();
    Ok(chain)
}

/// Follow the configured log source and classify every new line until
/// `cancel` fires.
pub async fn watch(config: &Config, cancel: CancellationToken) -> Result<ChainStats> {
    let mut chain = open_chain(config, cancel.clone())?;

    let start = if config.source.from_start {
        StartPosition::Beginning
    } else {
        StartPosition::End
    };
    let mut tailer = LogTailer::open(
        &config.source.path,
        start,
        Duration::from_millis(config.source.poll_interval_ms),
    )
    .await?;

    while let Some(line) = tailer.next_line(&cancel).await? {
        let result = chain.process_line(&line).await;
        match result.resolution {
            Resolution::Empty => {}
            Resolution::CacheHit => {
                info!(line = %result.line, category = %result.category, "classified (memorized)")
            }
            resolution => {
                info!(line = %result.line, category = %result.category, ?resolution, "classified")
            }
        }
    }

    let stats = chain.stats().clone();
    info!(
        lines = stats.lines,
        cache_hits = stats.cache_hits,
        model_verdicts = stats.model_verdicts,
        oracle_calls = stats.oracle_calls,
        fallbacks = stats.fallbacks,
        memorized = chain.store().len(),
        "watch stopped"
    );
    Ok(stats)
}
