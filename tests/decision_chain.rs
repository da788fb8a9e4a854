//! Decision chain behavior against an in-memory store and a scripted oracle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use waftriage::category::Category;
use waftriage::classifier::NoPrediction;
use waftriage::memory::{InMemoryStore, JsonFileStore, MemoryEntry, MemoryError, MemoryStore};
use waftriage::oracle::{interpret_answer, Oracle, OracleError, RetryPolicy};
use waftriage::orchestrator::{Escalation, Orchestrator, Resolution};
use waftriage::review::ReviewLog;

/// Answers from a fixed table of raw strings; unknown lines get "No Attack".
#[derive(Clone, Default)]
struct FakeOracle {
    answers: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<AtomicUsize>,
    down: bool,
}

impl FakeOracle {
    fn answering(pairs: &[(&str, &str)]) -> Self {
        let oracle = Self::default();
        {
            let mut answers = oracle.answers.lock().unwrap();
            for (line, answer) in pairs {
                answers.insert(line.to_string(), answer.to_string());
            }
        }
        oracle
    }

    fn unavailable() -> Self {
        Self {
            down: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Oracle for FakeOracle {
    async fn classify(&self, line: &str) -> Result<Category, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down {
            return Err(OracleError::Transport("connection refused".into()));
        }
        let raw = self
            .answers
            .lock()
            .unwrap()
            .get(line)
            .cloned()
            .unwrap_or_else(|| "No Attack".to_string());
        Ok(interpret_answer(line, &raw))
    }
}

/// In-memory store that counts how often it is asked to persist.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryStore,
    persists: Arc<AtomicUsize>,
}

impl MemoryStore for CountingStore {
    fn get(&self, line: &str) -> Option<Category> {
        self.inner.get(line)
    }

    fn put(&mut self, line: &str, label: Category) {
        self.inner.put(line, label);
    }

    fn all(&self) -> &[MemoryEntry] {
        self.inner.all()
    }

    fn persist(&self) -> Result<(), MemoryError> {
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn chain(oracle: &FakeOracle) -> Orchestrator<InMemoryStore> {
    Orchestrator::new(InMemoryStore::new(), Box::new(oracle.clone()))
        .with_retry(RetryPolicy::immediate(3))
}

const BENIGN: [&str; 5] = [
    "GET /products/42 HTTP/1.1",
    "GET /products/list HTTP/1.1",
    "GET /contact HTTP/1.1",
    "GET /users/profile HTTP/1.1",
    "POST /users/login HTTP/1.1",
];

#[tokio::test]
async fn test_scenario_a_first_line_goes_to_oracle() {
    let oracle = FakeOracle::answering(&[("GET /index.html", "No Attack")]);
    let mut chain = chain(&oracle);

    let result = chain.process_line("GET /index.html\n").await;

    assert_eq!(result.category, Category::NoAttack);
    assert_eq!(
        result.resolution,
        Resolution::Oracle {
            reason: Escalation::ModelNoPrediction(NoPrediction::Untrained)
        }
    );
    assert_eq!(oracle.calls(), 1);
    assert_eq!(chain.store().len(), 1);
    assert_eq!(chain.store().get("GET /index.html"), Some(Category::NoAttack));
    assert!(!chain.classifier().is_trained());
    assert_eq!(chain.stats().retrains, 0);
}

#[tokio::test]
async fn test_scenario_b_repeat_is_a_cache_hit() {
    let oracle = FakeOracle::answering(&[("GET /index.html", "No Attack")]);
    let mut chain = chain(&oracle);

    let first = chain.process_line("GET /index.html").await;
    let stats_before = chain.stats().clone();
    let second = chain.process_line("  GET /index.html  ").await;

    assert_eq!(first.category, second.category);
    assert_eq!(second.resolution, Resolution::CacheHit);
    assert_eq!(oracle.calls(), 1);
    assert_eq!(chain.store().len(), 1);
    assert_eq!(chain.stats().retrain_attempts, stats_before.retrain_attempts);
    assert_eq!(chain.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_cache_hit_does_not_persist() {
    let oracle = FakeOracle::answering(&[("GET /index.html", "No Attack")]);
    let store = CountingStore::default();
    let persists = store.persists.clone();
    let mut chain = Orchestrator::new(store, Box::new(oracle.clone()))
        .with_retry(RetryPolicy::immediate(3));

    chain.process_line("GET /index.html").await;
    assert_eq!(persists.load(Ordering::SeqCst), 1);

    let again = chain.process_line("GET /index.html").await;
    assert_eq!(again.resolution, Resolution::CacheHit);
    assert_eq!(persists.load(Ordering::SeqCst), 1);
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn test_scenario_c_sql_injection_is_memorized() {
    let line = "id=1 UNION SELECT password FROM admin";
    let oracle = FakeOracle::answering(&[(line, "SQL Injection")]);
    let mut chain = chain(&oracle);

    let result = chain.process_line(line).await;

    assert_eq!(result.category, Category::SqlInjection);
    assert!(matches!(result.resolution, Resolution::Oracle { .. }));
    assert_eq!(chain.store().get(line), Some(Category::SqlInjection));
}

#[tokio::test]
async fn test_scenario_d_model_takes_over_after_threshold() {
    let oracle = FakeOracle::default();
    let mut chain = chain(&oracle);

    for (i, line) in BENIGN.iter().enumerate() {
        chain.process_line(line).await;
        assert_eq!(chain.classifier().is_trained(), i + 1 >= 5, "after {} lines", i + 1);
    }
    assert_eq!(oracle.calls(), 5);
    assert_eq!(chain.stats().retrain_attempts, 5);
    assert_eq!(chain.stats().retrains, 1);

    assert_eq!(
        chain.classifier().predict("GET /products/7 HTTP/1.1"),
        Ok(Category::NoAttack)
    );

    // A sixth new line is answered locally and triggers another retrain.
    let result = chain.process_line("GET /products/99 HTTP/1.1").await;
    assert_eq!(result.resolution, Resolution::Model);
    assert_eq!(result.category, Category::NoAttack);
    assert_eq!(oracle.calls(), 5);
    assert_eq!(chain.stats().retrains, 2);
    assert_eq!(chain.store().len(), 6);
}

#[tokio::test]
async fn test_suspicious_no_attack_verdict_is_escalated() {
    let oracle = FakeOracle::answering(&[("SELECT * FROM users", "SQL Injection")]);
    let mut chain = chain(&oracle);
    for line in BENIGN {
        chain.process_line(line).await;
    }
    assert_eq!(
        chain.classifier().predict("SELECT * FROM users"),
        Ok(Category::NoAttack)
    );

    let result = chain.process_line("SELECT * FROM users").await;

    assert_eq!(
        result.resolution,
        Resolution::Oracle {
            reason: Escalation::SuspiciousNoAttack
        }
    );
    assert_eq!(result.category, Category::SqlInjection);
    assert_eq!(oracle.calls(), 6);
}

#[tokio::test]
async fn test_unknown_vocabulary_is_escalated() {
    let oracle = FakeOracle::default();
    let mut chain = chain(&oracle);
    for line in BENIGN {
        chain.process_line(line).await;
    }

    let result = chain.process_line("zzz qqq").await;
    assert_eq!(
        result.resolution,
        Resolution::Oracle {
            reason: Escalation::ModelNoPrediction(NoPrediction::EmptyVector)
        }
    );
}

#[tokio::test]
async fn test_empty_lines_touch_nothing() {
    let oracle = FakeOracle::default();
    let mut chain = chain(&oracle);

    for raw in ["", "   ", "\t\r\n", "\n"] {
        let result = chain.process_line(raw).await;
        assert_eq!(result.category, Category::NoAttack);
        assert_eq!(result.resolution, Resolution::Empty);
    }

    assert_eq!(oracle.calls(), 0);
    assert!(chain.store().is_empty());
    assert_eq!(chain.stats().retrain_attempts, 0);
    assert_eq!(chain.stats().empty, 4);
}

#[tokio::test]
async fn test_unrecognized_answers_are_stored_as_no_attack() {
    let oracle = FakeOracle::answering(&[
        ("GET /a", "I'll need to see the rest of the request."),
        ("GET /b", "Probably XSS, but hard to say"),
        ("GET /c", "'Path Traversal'."),
    ]);
    let mut chain = chain(&oracle);

    for line in ["GET /a", "GET /b", "GET /c"] {
        chain.process_line(line).await;
    }

    assert_eq!(chain.store().get("GET /a"), Some(Category::NoAttack));
    assert_eq!(chain.store().get("GET /b"), Some(Category::NoAttack));
    assert_eq!(chain.store().get("GET /c"), Some(Category::PathTraversal));
    for entry in chain.store().all() {
        assert!(Category::KNOWN.contains(&entry.label));
    }
}

#[tokio::test]
async fn test_memory_grows_by_at_most_one_per_line() {
    let oracle = FakeOracle::default();
    let mut chain = chain(&oracle);
    let lines = [
        "GET /a", "GET /b", "GET /a", "", "GET /c", "GET /b", "GET /d", "GET /e", "GET /f",
        "GET /a",
    ];

    let mut previous = 0;
    for line in lines {
        chain.process_line(line).await;
        let size = chain.store().len();
        assert!(size >= previous && size <= previous + 1);
        previous = size;
    }
    assert_eq!(previous, 6);
}

#[tokio::test]
async fn test_oracle_outage_falls_back_and_flags() {
    let dir = tempfile::tempdir().unwrap();
    let review = ReviewLog::new(dir.path().join("review.jsonl"));
    let oracle = FakeOracle::unavailable();
    let mut chain = chain(&oracle).with_review_log(review.clone());

    let result = chain.process_line("GET /cgi-bin/test.sh").await;

    assert_eq!(result.category, Category::NoAttack);
    assert_eq!(result.resolution, Resolution::Fallback);
    assert_eq!(oracle.calls(), 3);
    assert!(chain.store().is_empty());
    assert_eq!(chain.stats().fallbacks, 1);

    let flagged = review.read_all().await.unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].line, "GET /cgi-bin/test.sh");
    assert_eq!(flagged[0].attempts, 3);

    // Not memorized, so the next occurrence asks again.
    chain.process_line("GET /cgi-bin/test.sh").await;
    assert_eq!(oracle.calls(), 6);
}

#[tokio::test]
async fn test_answers_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memoria.json");
    let oracle = FakeOracle::answering(&[("GET /?q=<script>", "XSS")]);

    let mut chain = Orchestrator::new(JsonFileStore::open(&path), Box::new(oracle.clone()))
        .with_retry(RetryPolicy::immediate(1));
    chain.process_line("GET /?q=<script>").await;
    drop(chain);

    let mut restarted = Orchestrator::new(JsonFileStore::open(&path), Box::new(oracle.clone()))
        .with_retry(RetryPolicy::immediate(1));
    let result = restarted.process_line("GET /?q=<script>").await;

    assert_eq!(result.category, Category::Xss);
    assert_eq!(result.resolution, Resolution::CacheHit);
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn test_persist_failure_keeps_processing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("memoria.json");
    let oracle = FakeOracle::default();
    let mut chain = Orchestrator::new(JsonFileStore::open(&path), Box::new(oracle.clone()))
        .with_retry(RetryPolicy::immediate(1));

    chain.process_line("GET /").await;
    let again = chain.process_line("GET /").await;

    assert_eq!(chain.stats().persist_failures, 1);
    assert_eq!(again.resolution, Resolution::CacheHit);
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn test_warm_start_trains_from_existing_memory() {
    let mut store = InMemoryStore::new();
    for line in BENIGN {
        store.put(line, Category::NoAttack);
    }
    let oracle = FakeOracle::default();
    let mut chain = Orchestrator::new(store, Box::new(oracle.clone()));
    chain.warm_start();

    let result = chain.process_line("GET /contact/map HTTP/1.1").await;
    assert_eq!(result.resolution, Resolution::Model);
    assert_eq!(oracle.calls(), 0);
}
