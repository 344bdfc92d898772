//! Error types for the location tracker.

use thiserror::Error;

use crate::source::SourceError;

/// Errors surfaced to callers of provider selection.
///
/// Persistence and listener faults never appear here; they are recovered
/// where they happen.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// No enabled provider matches the criteria; tracking is inactive.
    #[error("No enabled position provider is available")]
    NoProviderAvailable,

    /// The position source rejected a request.
    #[error(transparent)]
    Source(#[from] SourceError),
}
