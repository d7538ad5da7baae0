//! Classification of remote failures.

use crate::error::RemoteError;
use regex::RegexSet;
use std::fmt;
use std::sync::OnceLock;

/// Category of a remote failure.
///
/// Only the retryable flag changes engine behavior; the kind itself is for
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport trouble: timeouts, refused connections, offline.
    Network,
    /// Concurrent write or key collision.
    Conflict,
    /// Authentication or authorization rejection.
    Permission,
    /// The remote rejected the data itself.
    Validation,
    /// Anything unrecognized.
    Unknown,
}

/// Kinds in pattern-set order. The first matching kind wins.
const KINDS: [ErrorKind; 4] = [
    ErrorKind::Network,
    ErrorKind::Conflict,
    ErrorKind::Permission,
    ErrorKind::Validation,
];

static PATTERNS: OnceLock<RegexSet> = OnceLock::new();

impl ErrorKind {
    /// Returns true if a later attempt may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Permission | Self::Validation)
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Conflict => "conflict",
            Self::Permission => "permission",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[allow(clippy::missing_panics_doc)] // patterns are hardcoded
fn patterns() -> &'static RegexSet {
    PATTERNS.get_or_init(|| {
        RegexSet::new([
            r"(?i)timeout|timed out|network|connection|fetch failed|econnrefused|dns|unreachable|offline",
            r"(?i)duplicate key|already exists|unique constraint|\b23505\b|conflict",
            r"(?i)permission|unauthori[sz]ed|forbidden|denied|policy|jwt|\b401\b|\b403\b|\b42501\b",
            r"(?i)violates|constraint|invalid|check|not-null|null value|malformed|unknown table|\b2[23][0-9a-z]{3}\b",
        ])
        .expect("classification patterns are valid")
    })
}

/// Classifies a free-form error message.
#[must_use]
pub fn classify_message(message: &str) -> ErrorKind {
    patterns()
        .matches(message)
        .iter()
        .next()
        .map_or(ErrorKind::Unknown, |index| KINDS[index])
}

/// Classifies a remote failure.
#[must_use]
pub fn classify(error: &RemoteError) -> ErrorKind {
    match error {
        RemoteError::DuplicateKey { .. } => ErrorKind::Conflict,
        RemoteError::NotFound { .. } => ErrorKind::Validation,
        RemoteError::Other(message) => classify_message(message),
    }
}
