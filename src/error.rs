//! Error types returned across the store boundary.

use thiserror::Error;

/// Failures produced by the store's fetch and local-mutation operations.
///
/// None of these are raised as panics; every store operation hands them back as a value
/// so callers (and the query bindings) can decide how to surface them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
  /// No fetch handler is registered for the requested key
  #[error("no handler registered for key '{0}'")]
  NoHandler(String),

  /// The handler kept failing until the retry budget ran out
  #[error("fetch for '{key}' failed after {attempts} attempt(s): {message}")]
  FetchFailed {
    key: String,
    attempts: u32,
    message: String,
  },

  /// A local edit targeted a key with no value in the store
  #[error("no value stored under '{0}'")]
  MissingValue(String),

  /// A local edit targeted a value that is not a list of records
  #[error("value under '{0}' is not a list")]
  NotAList(String),

  /// Merging the partial fields into the matching record failed
  #[error("could not merge fields into '{key}': {reason}")]
  MergeFailed { key: String, reason: String },
}

impl SyncError {
  /// True for errors caused by how the store was set up rather than by the remote side.
  pub fn is_configuration(&self) -> bool {
    matches!(self, SyncError::NoHandler(_))
  }
}
