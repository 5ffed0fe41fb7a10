use futures::task::SpawnError;
use thiserror::Error;

/// Boxed error produced by item sources
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cause passed to [Subscriber::on_error](crate::Subscriber::on_error). Errors never travel
/// back to the caller of [request](crate::Subscription::request) or [cancel](crate::Subscription::cancel),
/// they are always reported downstream as the terminal signal of the stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// ```request(n)``` was called with ```n <= 0```
    #[error("illegal demand {0}: request amount must be positive")]
    IllegalDemand(i64),

    /// Single ```request(n)``` call exceeded the per-request ceiling of the publisher
    #[error("requested {requested} items in one call, at most {limit} allowed")]
    CapacityExceeded { requested: i64, limit: u64 },

    /// Item source failed while producing the next item
    #[error("source failed: {0}")]
    Source(#[source] BoxError),

    /// Item source panicked while producing the next item
    #[error("source panicked: {0}")]
    SourcePanicked(String),

    /// Bounded sink buffer is full and overflow strategy is [Error](crate::OverflowStrategy::Error)
    #[error("buffer overflow: {capacity} items already queued")]
    Overflow { capacity: usize },

    /// Asynchronous source could not be started on the executor
    #[error("failed to spawn source task: {0}")]
    Spawn(#[from] SpawnError),
}

impl StreamError {
    /// Wrap any error coming from an item source
    pub fn from_source<E: Into<BoxError>>(error: E) -> Self {
        StreamError::Source(error.into())
    }

    /// Whether the error reports a misbehaving consumer rather than a failing source
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            StreamError::IllegalDemand(_) | StreamError::CapacityExceeded { .. }
        )
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        StreamError::SourcePanicked(message)
    }
}
