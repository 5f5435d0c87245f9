//! Error type shared by every neurosym crate.
//!
//! An [`Error`] carries an [`ErrorKind`] saying what failed, an
//! [`ErrorStatus`] saying whether trying again can help, and the operation
//! and `key=value` context collected on its way up. Lower layers raise
//! cause kinds such as `NetworkFailed`; the interaction loop re-tags them
//! with [`Error::into_stage`] so users see which of the four stages broke.
//!
//! ```rust
//! use neurosym_error::{Error, ErrorKind};
//!
//! fn archive() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ArchiveFailed, "disk full")
//!         .with_operation("archive::write")
//!         .with_context("path", "prolog_programs/problem_20250101_000000.pl"))
//! }
//!
//! assert_eq!(archive().unwrap_err().kind(), ErrorKind::ArchiveFailed);
//! ```

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

pub type Result<T> = std::result::Result<T, Error>;
