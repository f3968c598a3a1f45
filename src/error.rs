use std::sync::Arc;

/// Error delivered to every requester of a key whose batch could not be resolved.
///
/// A single failure is fanned out to all pending requests of a batch window, so the error is
/// cheaply cloneable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    /// The `BatchFunction` itself failed.
    #[error("batch dispatch failed: {0}")]
    Dispatch(#[source] Arc<dyn std::error::Error + Send + Sync>),
    /// The `BatchFunction` returned fewer values than it was given keys.
    #[error("batch function returned {actual} values for {expected} keys")]
    CardinalityMismatch { expected: usize, actual: usize },
    /// The worker task stopped before answering the request.
    #[error("loader worker is no longer running")]
    WorkerGone,
}

impl LoadError {
    pub fn dispatch<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LoadError::Dispatch(Arc::new(error))
    }
}
