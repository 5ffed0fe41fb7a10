use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, PoisonError, Weak},
};

use tracing::{trace, warn};

use crate::{
    config::{BufferPolicy, OverflowStrategy, SinkConfig},
    downstream::{Downstream, Slot},
    drain::lock,
    Publisher, StreamError, Subscriber, Subscription,
};

/// Publisher for sources producing items at their own pace: callbacks, other threads, async tasks.
///
/// For every subscriber the source callback receives a new [Sink]. Items emitted to the sink are
/// delivered right away while there is demand and buffered otherwise, according to the [SinkConfig].
///
/// ```
/// use std::{sync::Arc, thread};
/// use async_demand_streams::{Publisher, PushPublisher, SinkConfig, StreamError, Subscriber, Subscription, UNBOUNDED};
///
/// struct Sum(u64);
///
/// impl Subscriber<u64> for Sum {
///     fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
///         subscription.request(UNBOUNDED);
///     }
///     fn on_next(&mut self, item: u64) {
///         self.0 += item;
///     }
///     fn on_error(&mut self, _: StreamError) {}
///     fn on_complete(&mut self) {
///         assert_eq!(self.0, 45);
///     }
/// }
///
/// let publisher = PushPublisher::new(SinkConfig::unbounded(), |sink| {
///     thread::spawn(move || {
///         for n in 0u64..10 {
///             sink.emit(n);
///         }
///         sink.complete();
///     });
/// });
/// publisher.subscribe_with(Sum(0));
/// ```
pub struct PushPublisher<T> {
    config: SinkConfig,
    source: Arc<dyn Fn(Sink<T>) + Send + Sync>,
}

impl<T: Send + 'static> PushPublisher<T> {
    /// ```source``` is called once per subscriber, right after ```on_subscribe``` was delivered
    pub fn new<F>(config: SinkConfig, source: F) -> Self
    where
        F: Fn(Sink<T>) + Send + Sync + 'static,
    {
        Self {
            config,
            source: Arc::new(source),
        }
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }
}

impl<T> Clone for PushPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            source: self.source.clone(),
        }
    }
}

impl<T: Send + 'static> Publisher for PushPublisher<T> {
    type Item = T;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        trace!(config = ?self.config, "push subscribe");
        let subscription = Arc::new_cyclic(|me: &Weak<PushSubscription<T>>| PushSubscription {
            downstream: Downstream::new(subscriber, me.clone()),
            buffer: Mutex::new(Buffer {
                items: VecDeque::new(),
                done: false,
                error: None,
            }),
            space: Condvar::new(),
            config: self.config,
            on_request: Mutex::new(None),
            on_cancel: Mutex::new(None),
        });
        subscription.drain();
        (self.source)(Sink {
            inner: subscription,
        });
    }
}

/// Thread-safe entry point of a push source. Cloned sinks feed the same subscription; delivery to the
/// consumer stays one item at a time, in the order the ```emit``` calls won the buffer lock.
pub struct Sink<T> {
    inner: Arc<PushSubscription<T>>,
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Sink<T> {
    /// Deliver or buffer ```item```. Returns ```false``` if the item was discarded: the stream is cancelled
    /// or terminated, or the bounded buffer overflowed. Never blocks unless the sink is configured
    /// with [OverflowStrategy::Block].
    pub fn emit(&self, item: T) -> bool {
        self.inner.emit(item)
    }

    /// Complete the stream once the buffered items are delivered
    pub fn complete(&self) {
        self.inner.finish(None)
    }

    /// Fail the stream once the buffered items are delivered
    pub fn error(&self, error: StreamError) {
        self.inner.finish(Some(error))
    }

    /// Whether the consumer cancelled or the stream is terminated. Sources should check it
    /// before producing each item.
    pub fn is_cancelled(&self) -> bool {
        self.inner.downstream.is_done()
    }

    /// Outstanding demand not yet covered by delivered items
    pub fn requested(&self) -> i64 {
        self.inner.downstream.demand.get()
    }

    /// Number of items waiting for demand
    pub fn buffered(&self) -> usize {
        lock(&self.inner.buffer).items.len()
    }

    /// Call ```f``` with the amount of every later successful ```request```. Demand granted before
    /// registration is not replayed, read it with [requested](Sink::requested).
    pub fn on_request<F: Fn(i64) + Send + Sync + 'static>(&self, f: F) {
        *lock(&self.inner.on_request) = Some(Arc::new(f));
    }

    /// Call ```f``` once when the subscription gets cancelled. Called immediately if it already is.
    pub fn on_cancel<F: FnOnce() + Send + 'static>(&self, f: F) {
        *lock(&self.inner.on_cancel) = Some(Box::new(f));
        if self.inner.downstream.is_cancelled() {
            self.inner.fire_cancel();
        }
    }
}

struct Buffer<T> {
    items: VecDeque<T>,
    done: bool,
    error: Option<StreamError>,
}

struct PushSubscription<T> {
    downstream: Downstream<T>,
    buffer: Mutex<Buffer<T>>,
    space: Condvar,
    config: SinkConfig,
    on_request: Mutex<Option<Arc<dyn Fn(i64) + Send + Sync>>>,
    on_cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl<T: Send + 'static> PushSubscription<T> {
    fn emit(&self, item: T) -> bool {
        if self.downstream.is_done() {
            return false;
        }
        {
            let mut buffer = lock(&self.buffer);
            if buffer.done {
                return false;
            }
            if let BufferPolicy::Bounded { capacity, overflow } = self.config.buffer {
                let capacity = capacity.max(1);
                if buffer.items.len() >= capacity {
                    match overflow {
                        OverflowStrategy::DropNewest => {
                            warn!(capacity, "sink buffer full, dropping newest item");
                            return false;
                        }
                        OverflowStrategy::DropOldest => {
                            warn!(capacity, "sink buffer full, dropping oldest item");
                            buffer.items.pop_front();
                        }
                        OverflowStrategy::Error => {
                            drop(buffer);
                            self.downstream.abort(StreamError::Overflow { capacity });
                            self.fire_cancel();
                            self.drain();
                            return false;
                        }
                        OverflowStrategy::Block => {
                            while buffer.items.len() >= capacity && !self.downstream.is_done() {
                                buffer = self
                                    .space
                                    .wait(buffer)
                                    .unwrap_or_else(PoisonError::into_inner);
                            }
                            if self.downstream.is_done() {
                                return false;
                            }
                        }
                    }
                }
            }
            buffer.items.push_back(item);
        }
        self.drain();
        true
    }

    fn finish(&self, error: Option<StreamError>) {
        {
            let mut buffer = lock(&self.buffer);
            if buffer.done {
                return;
            }
            buffer.done = true;
            buffer.error = error;
        }
        self.drain();
    }

    fn drain(&self) {
        self.downstream
            .drain(|downstream, slot| self.deliver(downstream, slot));
        if self.downstream.is_done() {
            self.wake_blocked();
        }
    }

    fn deliver(&self, downstream: &Downstream<T>, slot: &mut Slot<T>) {
        loop {
            if downstream.is_cancelled() {
                return;
            }
            let mut buffer = lock(&self.buffer);
            if buffer.items.is_empty() {
                if buffer.done {
                    let error = buffer.error.take();
                    drop(buffer);
                    match error {
                        Some(error) => downstream.fail(slot, error),
                        None => downstream.complete(slot),
                    }
                }
                return;
            }
            if !downstream.demand.try_take() {
                return;
            }
            let item = buffer.items.pop_front();
            drop(buffer);
            self.space.notify_all();
            if let Some(item) = item {
                if !downstream.next(slot, item) {
                    return;
                }
            }
        }
    }

    fn wake_blocked(&self) {
        // Taking the lock orders this wakeup after any waiter's last check of the flags
        drop(lock(&self.buffer));
        self.space.notify_all();
    }

    fn fire_cancel(&self) {
        let hook = lock(&self.on_cancel).take();
        if let Some(hook) = hook {
            trace!("running source cancel hook");
            hook();
        }
    }
}

impl<T: Send + 'static> Subscription for PushSubscription<T> {
    fn request(&self, n: i64) {
        if !self.downstream.request(n, None) {
            return;
        }
        if self.downstream.is_cancelled() {
            self.fire_cancel();
        }
        self.drain();
        if n > 0 && !self.downstream.is_done() {
            let hook = lock(&self.on_request).clone();
            if let Some(hook) = hook {
                hook(n);
            }
        }
    }

    fn cancel(&self) {
        if self.downstream.cancel() {
            self.fire_cancel();
            self.drain();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.downstream.is_done()
    }
}
