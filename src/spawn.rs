use std::sync::Arc;

use async_trait::async_trait;
use futures::{
    task::{Spawn, SpawnExt},
    Stream, StreamExt,
};
use tracing::debug;

use crate::{BoxError, PushPublisher, SinkConfig, Sink, StreamError};

///
/// Asynchronous producer feeding a [Sink]. Typically implemented like this:
///
/// ```
/// # use async_trait::async_trait;
/// # use async_demand_streams::{AsyncSource, BoxError, Sink};
/// struct Countdown(u32);
///
/// #[async_trait]
/// impl AsyncSource<u32> for Countdown {
///     async fn produce(&self, sink: &Sink<u32>) -> Result<(), BoxError> {
///         for n in (0..self.0).rev() {
///             if sink.is_cancelled() {
///                 break;
///             }
///             sink.emit(n);
///         }
///         Ok(())
///     }
/// }
/// ```
///
/// Returning ```Ok``` completes the stream, returning ```Err``` fails it with [StreamError::Source].
/// Cancellation is cooperative: the source has to poll [Sink::is_cancelled] between items.
#[async_trait]
pub trait AsyncSource<T: Send + 'static>: Send + Sync {
    async fn produce(&self, sink: &Sink<T>) -> Result<(), BoxError>;
}

/// [AsyncSource] forwarding every stream created by the factory into the sink
pub struct StreamSource<F>(F);

impl<F> StreamSource<F> {
    pub fn new(factory: F) -> Self {
        Self(factory)
    }
}

#[async_trait]
impl<T, S, F> AsyncSource<T> for StreamSource<F>
where
    T: Send + 'static,
    S: Stream<Item = T> + Send + Unpin,
    F: Fn() -> S + Send + Sync,
{
    async fn produce(&self, sink: &Sink<T>) -> Result<(), BoxError> {
        let mut stream = (self.0)();
        while let Some(item) = stream.next().await {
            if sink.is_cancelled() {
                debug!("stream source stopped by cancellation");
                break;
            }
            sink.emit(item);
        }
        Ok(())
    }
}

impl<T: Send + 'static> PushPublisher<T> {
    /// Create publisher running ```source``` as a separate task on ```spawner``` for every subscriber.
    /// If the task can't be spawned the subscriber receives [StreamError::Spawn].
    pub fn spawned<SP, S>(spawner: SP, config: SinkConfig, source: S) -> Self
    where
        SP: Spawn + Send + Sync + 'static,
        S: AsyncSource<T> + 'static,
    {
        let source = Arc::new(source);
        Self::new(config, move |sink| {
            let source = source.clone();
            let task_sink = sink.clone();
            let task = async move {
                match source.produce(&task_sink).await {
                    Ok(()) => task_sink.complete(),
                    Err(error) => task_sink.error(StreamError::Source(error)),
                }
            };
            if let Err(error) = spawner.spawn(task) {
                sink.error(StreamError::Spawn(error));
            }
        })
    }

    /// Create publisher forwarding a new stream from ```factory``` to every subscriber
    pub fn from_stream<SP, S, F>(spawner: SP, config: SinkConfig, factory: F) -> Self
    where
        SP: Spawn + Send + Sync + 'static,
        S: Stream<Item = T> + Send + Unpin + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self::spawned(spawner, config, StreamSource::new(factory))
    }
}
