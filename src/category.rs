//! Closed set of attack categories and their canonical labels.

use serde::{Deserialize, Serialize};

/// Attack category assigned to a log line.
///
/// `Unclassifiable` is a transient sentinel for oracle answers that do not
/// map onto the enumeration. It is never stored and never parsed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Category {
    NoAttack,
    Xss,
    SqlInjection,
    PathTraversal,
    CommandInjection,
    RemoteFileInclusion,
    LdapInjection,
    CodeInjection,
    Unclassifiable,
}

impl Category {
    /// Every category that may be stored or returned by the oracle.
    pub const KNOWN: [Category; 8] = [
        Category::NoAttack,
        Category::Xss,
        Category::SqlInjection,
        Category::PathTraversal,
        Category::CommandInjection,
        Category::RemoteFileInclusion,
        Category::LdapInjection,
        Category::CodeInjection,
    ];

    /// Canonical label as used in the memory file and the oracle prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Category::NoAttack => "No Attack",
            Category::Xss => "XSS",
            Category::SqlInjection => "SQL Injection",
            Category::PathTraversal => "Path Traversal",
            Category::CommandInjection => "Command Injection",
            Category::RemoteFileInclusion => "Remote File Inclusion",
            Category::LdapInjection => "LDAP Injection",
            Category::CodeInjection => "Code Injection",
            Category::Unclassifiable => "Unclassifiable",
        }
    }

    /// Look up a known category by label.
    ///
    /// Case, spaces, underscores and hyphens are ignored, so `sql_injection`
    /// and `SQL Injection` resolve to the same category.
    pub fn from_label(label: &str) -> Option<Category> {
        let wanted = fold(label);
        if wanted.is_empty() {
            return None;
        }
        Self::KNOWN
            .iter()
            .copied()
            .find(|c| fold(c.label()) == wanted)
    }

    /// Interpret a raw oracle answer. Anything that is not a clean label
    /// (refusals, explanations, requests for more context) becomes
    /// `Unclassifiable`.
    pub fn from_oracle_text(raw: &str) -> Category {
        let cleaned =
            raw.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '.'));
        Self::from_label(cleaned).unwrap_or(Category::Unclassifiable)
    }

    /// The value that may be persisted for this category.
    pub fn storable(self) -> Category {
        match self {
            Category::Unclassifiable => Category::NoAttack,
            other => other,
        }
    }
}

fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::from_label(s).ok_or_else(|| format!("unknown category label: {s:?}"))
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.label().to_string()
    }
}
