use std::io::BufRead;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use waftriage::category::Category;
use waftriage::classifier::{LocalClassifier, RetrainOutcome};
use waftriage::config::Config;
use waftriage::memory::{label_counts, JsonFileStore, MemoryStore};
use waftriage::orchestrator::{Classification, Resolution};
use waftriage::review::ReviewLog;

#[derive(Parser)]
#[command(
    name = "waftriage",
    about = "Self-training attack classifier for web request logs",
    version,
    long_about = None
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "WAFTRIAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Memory file, overrides memory.path
    #[arg(long, global = true)]
    memory: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a log file and classify new lines until interrupted
    Watch {
        /// Log file to follow, overrides source.path
        #[arg(long)]
        source: Option<PathBuf>,

        /// Classify lines already in the file too
        #[arg(long)]
        from_start: bool,

        /// Idle poll interval in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },

    /// Classify the given lines (or stdin) through the full chain
    Classify {
        /// Log lines; read from stdin when omitted
        lines: Vec<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Inspect the memorized answers
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Train the local model from memory and report on it
    Train,

    /// Ask only the local model about a line
    Predict {
        line: String,
    },

    /// List lines flagged for review after oracle failures
    Review,
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Entry counts per category
    Stats,

    /// Print memorized lines
    List {
        /// Only lines with this label, e.g. "SQL Injection"
        #[arg(long)]
        label: Option<Category>,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn resolution_label(r: &Resolution) -> &'static str {
    match r {
        Resolution::Empty => "empty",
        Resolution::CacheHit => "memory",
        Resolution::Model => "model",
        Resolution::Oracle { .. } => "oracle",
        Resolution::Fallback => "fallback",
    }
}

fn print_classifications(results: &[Classification]) {
    println!("{:<22} | {:<8} | Line", "Category", "Source");
    println!("{:-<22}-|-{:-<8}-|-{:-<40}", "", "", "");
    for r in results {
        println!(
            "{:<22} | {:<8} | {}",
            r.category,
            resolution_label(&r.resolution),
            r.line
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(memory) = cli.memory {
        config.memory.path = memory;
    }

    match cli.command {
        Commands::Watch {
            source,
            from_start,
            poll_interval_ms,
        } => {
            if let Some(source) = source {
                config.source.path = source;
            }
            if from_start {
                config.source.from_start = true;
            }
            if let Some(ms) = poll_interval_ms {
                config.source.poll_interval_ms = ms;
            }

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested");
                    trigger.cancel();
                }
            });

            tracing::info!(source = %config.source.path.display(), "Starting waftriage watcher");
            waftriage::watch(&config, cancel).await?;
        }
        Commands::Classify { lines, json } => {
            let lines = if lines.is_empty() {
                std::io::stdin().lock().lines().collect::<Result<Vec<_>, _>>()?
            } else {
                lines
            };

            let mut chain = waftriage::open_chain(&config, CancellationToken::new())?;
            let mut results = Vec::with_capacity(lines.len());
            for line in &lines {
                results.push(chain.process_line(line).await);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_classifications(&results);
            }
        }
        Commands::Memory { action } => {
            let store = JsonFileStore::load(&config.memory.path)?;
            match action {
                MemoryAction::Stats => {
                    println!("Memory: {}", store.path().display());
                    println!("Entries: {}", store.len());
                    for (category, count) in label_counts(store.all()) {
                        println!("  {:<22} {}", category, count);
                    }
                }
                MemoryAction::List { label } => {
                    for entry in store.all() {
                        if label.map_or(true, |l| l == entry.label) {
                            println!("{:<22} | {}", entry.label, entry.line);
                        }
                    }
                }
            }
        }
        Commands::Train => {
            let store = JsonFileStore::load(&config.memory.path)?;
            let mut classifier = LocalClassifier::new(
                config.classifier.max_features,
                config.classifier.min_corpus_size,
            );
            match classifier.retrain(store.all()) {
                RetrainOutcome::Skipped { have, needed } => {
                    println!("Not enough examples to train: have {}, need {}.", have, needed);
                }
                RetrainOutcome::Failed { samples } => {
                    println!("Training failed: {} examples yield no usable vocabulary.", samples);
                }
                RetrainOutcome::Trained {
                    samples,
                    vocabulary,
                    classes,
                } => {
                    println!("Trained on {} examples.", samples);
                    println!("Vocabulary: {} terms", vocabulary);
                    println!("Classes:    {}", classes);
                    for (category, count) in label_counts(store.all()) {
                        println!("  {:<22} {}", category, count);
                    }
                }
            }
        }
        Commands::Predict { line } => {
            let store = JsonFileStore::load(&config.memory.path)?;
            let mut classifier = LocalClassifier::new(
                config.classifier.max_features,
                config.classifier.min_corpus_size,
            );
            classifier.retrain(store.all());
            match classifier.predict(line.trim()) {
                Ok(category) => println!("{}", category),
                Err(reason) => println!("No prediction: {}", reason),
            }
        }
        Commands::Review => {
            let entries = ReviewLog::new(&config.memory.review_log).read_all().await?;
            if entries.is_empty() {
                println!("No lines flagged for review.");
            } else {
                println!("{:<25} | {:<8} | {:<30} | Line", "Flagged at", "Attempts", "Reason");
                println!("{:-<25}-|-{:-<8}-|-{:-<30}-|-{:-<30}", "", "", "", "");
                for e in entries {
                    println!(
                        "{:<25} | {:<8} | {:<30} | {}",
                        e.timestamp, e.attempts, e.reason, e.line
                    );
                }
            }
        }
    }

    Ok(())
}
