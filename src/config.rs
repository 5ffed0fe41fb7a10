//! Buffering configuration of push sinks.

/// What [Sink::emit](crate::Sink::emit) does when a bounded buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowStrategy {
    /// Discard the item being emitted.
    DropNewest,

    /// Discard the oldest buffered item to make room for the new one.
    DropOldest,

    /// Terminate the stream with [StreamError::Overflow](crate::StreamError::Overflow) and cancel the source.
    Error,

    /// Block the emitting thread until the consumer makes room.
    ///
    /// Must not be used when items are emitted from inside the consumer's own signal handlers:
    /// the consumer can't make room while it waits for itself.
    Block,
}

/// Storage policy for items emitted ahead of demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferPolicy {
    /// Keep every item until it is requested.
    ///
    /// No item is ever lost, but a source that is persistently faster than its consumer
    /// grows memory without limit.
    #[default]
    Unbounded,

    /// Keep at most ```capacity``` items and resolve overflow with the given strategy
    Bounded {
        capacity: usize,
        overflow: OverflowStrategy,
    },
}

/// Configuration of the [Sink](crate::Sink)s created by a [PushPublisher](crate::PushPublisher)
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkConfig {
    pub buffer: BufferPolicy,
}

impl SinkConfig {
    /// Never drop items, never block the source
    pub fn unbounded() -> Self {
        Self {
            buffer: BufferPolicy::Unbounded,
        }
    }

    /// Hold at most ```capacity``` undelivered items (at least one)
    pub fn bounded(capacity: usize, overflow: OverflowStrategy) -> Self {
        Self {
            buffer: BufferPolicy::Bounded {
                capacity: capacity.max(1),
                overflow,
            },
        }
    }

    /// Buffer capacity, ```None``` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        match self.buffer {
            BufferPolicy::Unbounded => None,
            BufferPolicy::Bounded { capacity, .. } => Some(capacity),
        }
    }
}
