//! Error kinds for neurosym operations

use std::fmt;

/// What went wrong.
///
/// The four stage kinds (`TranslationFailed`, `ArchiveFailed`,
/// `ExecutionFailed`, `NarrationFailed`) are what the interaction loop
/// reports; the rest classify the underlying cause and survive as `cause`
/// context after `Error::into_stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Catch-all for failures nothing else describes
    Unexpected,
    ConfigInvalid,

    /// No usable program came back from the LLM
    TranslationFailed,
    /// The program could not be written to the archive
    ArchiveFailed,
    /// Syntax error, runtime error, timeout or no solution
    ExecutionFailed,
    /// The LLM could not explain the result
    NarrationFailed,

    /// `swipl` is missing or won't start
    EngineUnavailable,
    /// The LLM server rejected us or lacks the model
    ProviderUnavailable,
    Timeout,
    NetworkFailed,

    FileNotFound,
    PermissionDenied,
    IoFailed,
    ParseFailed,
    SerializationFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::TranslationFailed => "TranslationFailed",
            ErrorKind::ArchiveFailed => "ArchiveFailed",
            ErrorKind::ExecutionFailed => "ExecutionFailed",
            ErrorKind::NarrationFailed => "NarrationFailed",
            ErrorKind::EngineUnavailable => "EngineUnavailable",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Whether asking again may succeed. LLM output varies between calls,
    /// so both LLM stages count.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkFailed
                | ErrorKind::Timeout
                | ErrorKind::ProviderUnavailable
                | ErrorKind::TranslationFailed
                | ErrorKind::NarrationFailed
        )
    }

    /// True for the four kinds the interaction loop recovers from
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::TranslationFailed
                | ErrorKind::ArchiveFailed
                | ErrorKind::ExecutionFailed
                | ErrorKind::NarrationFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
