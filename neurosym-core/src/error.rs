//! Core error helpers
//!
//! Re-exports neurosym-error and adds conversions for collaborator errors.

pub use neurosym_error::{Error, ErrorKind, ErrorStatus, Result};

use crate::provider::ProviderError;

/// Wrap a provider error, classifying it by transport failure.
///
/// Callers re-tag the result with their stage kind via `Error::into_stage`.
pub fn from_provider(err: ProviderError) -> Error {
    let kind = match &err {
        ProviderError::Network(_) => ErrorKind::NetworkFailed,
        ProviderError::Timeout => ErrorKind::Timeout,
        ProviderError::ModelNotFound(_) | ProviderError::Unauthorized => ErrorKind::ProviderUnavailable,
        ProviderError::Parse(_) => ErrorKind::ParseFailed,
        _ => ErrorKind::Unexpected,
    };
    Error::new(kind, err.to_string())
        .with_operation("provider")
        .set_source(err)
}

/// Create an ArchiveFailed error for a path
pub fn archive_failed(path: &std::path::Path, err: std::io::Error) -> Error {
    Error::archive_failed(format!("cannot write {}: {}", path.display(), err))
        .with_context("path", path.display().to_string())
        .set_source(err)
}
