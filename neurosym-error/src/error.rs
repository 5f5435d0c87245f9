//! The neurosym Error type

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The error returned by every fallible neurosym operation.
///
/// Besides its [`ErrorKind`] and message it records the operation that
/// raised it (earlier operations move into context as `called`), free-form
/// context pairs and the underlying error, if any.
///
/// ```rust
/// use neurosym_error::{Error, ErrorKind};
///
/// let err = Error::new(ErrorKind::NetworkFailed, "connection refused")
///     .with_operation("provider")
///     .into_stage(ErrorKind::TranslationFailed)
///     .with_context("model", "qwen2.5-coder:7b");
///
/// assert_eq!(err.kind(), ErrorKind::TranslationFailed);
/// assert!(err.is_retryable());
/// assert_eq!(
///     err.to_string(),
///     "TranslationFailed: connection refused (at provider; cause=NetworkFailed, model=qwen2.5-coder:7b)"
/// );
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Status defaults from the kind: retryable kinds start `Temporary`
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: if kind.is_retryable() {
                ErrorStatus::Temporary
            } else {
                ErrorStatus::Permanent
            },
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// First context value stored under `key`
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set the operation; a previously set one is kept as `called`
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach the underlying error. Debug builds assert it is set only once.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    /// Re-tag as a pipeline stage failure, keeping the previous kind as
    /// `cause`. Status is left as is.
    pub fn into_stage(mut self, stage: ErrorKind) -> Self {
        if self.kind != stage {
            self.context.push(("cause", self.kind.to_string()));
            self.kind = stage;
        }
        self
    }

    pub fn config_invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message).with_context("field", field)
    }

    pub fn translation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TranslationFailed, message)
    }

    pub fn archive_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArchiveFailed, message)
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionFailed, message)
    }

    /// `program` is the engine binary that could not be used
    pub fn engine_unavailable(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::EngineUnavailable, reason).with_context("program", program)
    }

    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }
}

/// One line: `Kind: message (at operation; key=value, ...)`
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if self.operation.is_empty() && self.context.is_empty() {
            return Ok(());
        }
        write!(f, " (")?;
        if !self.operation.is_empty() {
            write!(f, "at {}", self.operation)?;
            if !self.context.is_empty() {
                write!(f, "; ")?;
            }
        }
        let pairs: Vec<String> = self.context.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{})", pairs.join(", "))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.kind, self.status)?;
        writeln!(f, "    message:   {}", self.message)?;
        if !self.operation.is_empty() {
            writeln!(f, "    operation: {}", self.operation)?;
        }
        for (key, value) in &self.context {
            writeln!(f, "    {}: {}", key, value)?;
        }
        if let Some(source) = &self.source {
            writeln!(f, "    source:    {:#}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        let kind = match err.kind() {
            Io::NotFound => ErrorKind::FileNotFound,
            Io::PermissionDenied => ErrorKind::PermissionDenied,
            Io::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string()).with_operation("io").set_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_kind() {
        let err = Error::archive_failed("read-only filesystem");
        assert_eq!(err.kind(), ErrorKind::ArchiveFailed);
        assert_eq!(err.message(), "read-only filesystem");
        assert_eq!(err.status(), ErrorStatus::Permanent);

        assert!(Error::new(ErrorKind::NetworkFailed, "reset").is_retryable());
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::IoFailed, "write failed")
            .with_operation("archive::write")
            .with_operation("agent::archive");

        assert_eq!(err.operation(), "agent::archive");
        assert_eq!(err.context_value("called"), Some("archive::write"));
    }

    #[test]
    fn test_into_stage_keeps_cause() {
        let err = Error::new(ErrorKind::NetworkFailed, "connection refused").into_stage(ErrorKind::NarrationFailed);

        assert_eq!(err.kind(), ErrorKind::NarrationFailed);
        assert_eq!(err.context_value("cause"), Some("NetworkFailed"));
        assert!(err.is_retryable());

        let same = Error::execution_failed("no solution").into_stage(ErrorKind::ExecutionFailed);
        assert!(same.context().is_empty());
    }

    #[test]
    fn test_display() {
        let err = Error::execution_failed("goal failed")
            .with_operation("engine::solve")
            .with_context("goal", "solve(Solution)");
        assert_eq!(err.to_string(), "ExecutionFailed: goal failed (at engine::solve; goal=solve(Solution))");

        assert_eq!(Error::parse_failed("bad line").to_string(), "ParseFailed: bad line");
        assert_eq!(
            Error::config_invalid("llm.model", "model name is empty").to_string(),
            "ConfigInvalid: model name is empty (field=llm.model)"
        );
    }

    #[test]
    fn test_debug_lists_context() {
        let err = Error::engine_unavailable("swipl", "not found");
        let debug = format!("{:?}", err);
        assert!(debug.starts_with("EngineUnavailable (permanent)\n"));
        assert!(debug.contains("    program: swipl\n"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io_err.into();

        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.operation(), "io");
        assert!(std::error::Error::source(&err).is_some());

        let err = Error::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
