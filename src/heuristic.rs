//! Keyword based suspicion check.
//!
//! The local model happily answers "No Attack" for lines that merely share
//! vocabulary with benign traffic. Any line carrying one of these markers is
//! sent to the oracle instead of trusting such a verdict.

/// Built-in markers, matched case-insensitively as substrings.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    // query language
    "select", "union", "insert into", "drop table", "' or ", "--",
    // path escalation
    "../", "..\\", "/etc/passwd", "shadow", "admin",
    // script injection
    "<script", "alert", "svg", "onerror", "javascript:",
    // shell / code execution
    "cmd.exe", "cat", "/bin/sh", "wget", "eval(",
    // remote inclusion, encoded payloads, ldap filters
    "http://", "https://", "ftp://", "%", "(&(", "*)(",
];

#[derive(Debug, Clone)]
pub struct Heuristic {
    keywords: Vec<String>,
}

impl Default for Heuristic {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Heuristic {
    /// Built-in markers plus `extra`.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut h = Self::default();
        h.keywords.extend(
            extra
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty()),
        );
        h
    }

    pub fn is_suspicious(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// The first marker found in `line`, for logging.
    pub fn matched_keyword(&self, line: &str) -> Option<&str> {
        let lower = line.to_lowercase();
        self.keywords
            .iter()
            .find(|k| lower.contains(k.as_str()))
            .map(String::as_str)
    }
}
