//! Error status - how a caller should react to an error

use std::fmt;

/// Whether an error is worth retrying.
///
/// The pipeline itself never retries (one call per collaborator per cycle),
/// but the status is still reported so the operator knows whether trying the
/// same problem again could help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    /// Retrying will not help
    Permanent,
    /// The error may go away on retry (network hiccup, model still loading)
    Temporary,
}

impl ErrorStatus {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorStatus::Temporary)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Permanent => "permanent",
            ErrorStatus::Temporary => "temporary",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
