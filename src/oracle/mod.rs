//! External classification oracle.
//!
//! The oracle is consulted only when neither the memory nor the local model
//! can settle a line. Its answer is free text that must map onto the closed
//! category set; anything else is treated as "No Attack".

pub mod chat;
pub mod retry;

pub use self::chat::ChatOracle;
pub use self::retry::RetryPolicy;

use crate::category::Category;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(String),

    #[error("oracle request timed out")]
    Timeout,

    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle response could not be read: {0}")]
    MalformedResponse(String),

    #[error("no oracle credentials configured (set oracle.api_key or OPENAI_API_KEY)")]
    MissingCredentials,

    #[error("oracle call cancelled")]
    Cancelled,
}

impl OracleError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::Transport(_) | OracleError::Timeout => true,
            OracleError::Status { status, .. } => *status == 429 || *status >= 500,
            OracleError::MalformedResponse(_)
            | OracleError::MissingCredentials
            | OracleError::Cancelled => false,
        }
    }
}

/// Instruction sent with every request, fixing the label vocabulary.
pub fn instruction() -> String {
    let labels: Vec<String> = Category::KNOWN
        .iter()
        .map(|c| format!("'{}'", c.label()))
        .collect();
    format!(
        "Classify the web server log line as exactly one of: {}. \
         Answer with the label only.",
        labels.join(", ")
    )
}

/// Map a raw answer onto a storable category.
pub fn interpret_answer(line: &str, raw: &str) -> Category {
    match Category::from_oracle_text(raw) {
        Category::Unclassifiable => {
            warn!(%line, answer = %raw, "oracle answer is not a known label, using No Attack");
            Category::NoAttack
        }
        c => c,
    }
}

/// A synchronous request/response classification service.
#[async_trait::async_trait]
pub trait Oracle: Send + Sync {
    /// Classify one non-empty log line.
    async fn classify(&self, line: &str) -> Result<Category, OracleError>;
}
