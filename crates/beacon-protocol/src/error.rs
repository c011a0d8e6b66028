//! Error taxonomy for the tracking pipeline.

use thiserror::Error;

/// Failures crossing the client/backend boundary.
///
/// There is no fatal class: every variant is handled at the point of
/// occurrence and the pipeline degrades to "no tracking this cycle".
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The backend no longer recognizes the session identifier (expired or
    /// evicted, e.g. after an in-memory store restart).
    #[error("session not recognized by the backend")]
    UnknownSession,
    /// The backend rejected the payload as malformed. Treated like a stale
    /// session: the local state that produced it is unusable.
    #[error("update rejected by the backend: {0}")]
    Rejected(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("durable storage failure: {0}")]
    Storage(String),
}

impl TrackerError {
    /// Whether the local session state should be discarded and recreated.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::UnknownSession | Self::Rejected(_))
    }
}

/// Convenience result type for pipeline operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_classification() {
        assert!(TrackerError::UnknownSession.is_stale());
        assert!(TrackerError::Rejected("missing id".into()).is_stale());
        assert!(!TrackerError::Network("timeout".into()).is_stale());
        assert!(!TrackerError::Storage("read-only".into()).is_stale());
    }
}
