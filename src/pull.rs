use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, Weak},
};

use tracing::trace;

use crate::{
    downstream::{Downstream, Slot},
    drain::lock,
    BoxError, Publisher, StreamError, Subscriber, Subscription,
};

/// Producer of items for one subscription of a [PullPublisher]. Called only when the subscriber
/// has outstanding demand, never ahead of it.
pub trait ItemSource: Send {
    type Item;
    /// Compute the next item. ```None``` ends the stream, ```Some(Err(_))``` fails it.
    fn next_item(&mut self) -> Option<Result<Self::Item, BoxError>>;
    /// Whether it is already known that [next_item](ItemSource::next_item) would return ```None```.
    /// Lets the publisher complete without waiting for more demand.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// [ItemSource] over an iterator. Exhaustion is detected from the iterator's ```size_hint```
pub struct IterSource<I>(I);

impl<I> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self(iter)
    }
}

impl<I: Iterator + Send> ItemSource for IterSource<I> {
    type Item = I::Item;
    fn next_item(&mut self) -> Option<Result<Self::Item, BoxError>> {
        self.0.next().map(Ok)
    }
    fn is_exhausted(&self) -> bool {
        self.0.size_hint().1 == Some(0)
    }
}

/// [ItemSource] computing each item from its zero based index. Never ends by itself,
/// combine with [PullPublisher::limit].
pub struct FnSource<F> {
    f: Arc<F>,
    index: u64,
}

impl<F> FnSource<F> {
    pub fn new(f: Arc<F>) -> Self {
        Self { f, index: 0 }
    }
}

impl<T, E, F> ItemSource for FnSource<F>
where
    F: Fn(u64) -> Result<T, E> + Send + Sync,
    E: Into<BoxError>,
{
    type Item = T;
    fn next_item(&mut self) -> Option<Result<T, BoxError>> {
        let index = self.index;
        self.index += 1;
        Some((self.f)(index).map_err(Into::into))
    }
}

type SourceFactory<T> = dyn Fn() -> Box<dyn ItemSource<Item = T>> + Send + Sync;

/// Publisher emitting items synchronously, on the thread calling [request](Subscription::request),
/// and only as many as requested. Every subscriber gets its own source created by the factory,
/// so the sequence always starts from the beginning.
///
/// ```
/// use std::sync::Arc;
/// use async_demand_streams::{Publisher, PullPublisher, StreamError, Subscriber, Subscription};
///
/// struct Printer;
///
/// impl Subscriber<u64> for Printer {
///     fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
///         subscription.request(3);
///     }
///     fn on_next(&mut self, item: u64) {
///         println!("{item}");
///     }
///     fn on_error(&mut self, error: StreamError) {
///         eprintln!("{error}");
///     }
///     fn on_complete(&mut self) {
///         println!("done");
///     }
/// }
///
/// // Prints 0, 1, 4 and completes
/// PullPublisher::from_fn(|n| Ok::<_, StreamError>(n * n))
///     .limit(3)
///     .subscribe_with(Printer);
/// ```
pub struct PullPublisher<T> {
    factory: Arc<SourceFactory<T>>,
    limit: Option<u64>,
    max_request: Option<u64>,
}

impl<T: Send + 'static> PullPublisher<T> {
    /// Create publisher from factory of custom [ItemSource]s, one per subscriber
    pub fn from_source<S, F>(factory: F) -> Self
    where
        S: ItemSource<Item = T> + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(move || Box::new(factory()) as Box<dyn ItemSource<Item = T>>),
            limit: None,
            max_request: None,
        }
    }

    /// Create publisher replaying a clone of ```items``` to every subscriber
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::from_source(move || IterSource::new(items.clone().into_iter()))
    }

    /// Create publisher computing items from their index. An ```Err``` fails the stream.
    pub fn from_fn<F, E>(f: F) -> Self
    where
        F: Fn(u64) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError> + 'static,
    {
        let f = Arc::new(f);
        Self::from_source(move || FnSource::new(f.clone()))
    }

    /// Complete every subscription after ```cap``` items, discarding whatever demand is left
    pub fn limit(mut self, cap: u64) -> Self {
        self.limit = Some(cap);
        self
    }

    /// Treat any single ```request(n)``` with ```n``` above ```max``` as a protocol violation.
    /// The subscriber receives [StreamError::CapacityExceeded] and the subscription is cancelled,
    /// the request is never truncated.
    pub fn max_request(mut self, max: u64) -> Self {
        self.max_request = Some(max);
        self
    }
}

impl<T> Clone for PullPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            limit: self.limit,
            max_request: self.max_request,
        }
    }
}

impl<T: Send + 'static> Publisher for PullPublisher<T> {
    type Item = T;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        trace!(limit = ?self.limit, max_request = ?self.max_request, "pull subscribe");
        let source = (self.factory)();
        let subscription = Arc::new_cyclic(|me: &Weak<PullSubscription<T>>| PullSubscription {
            downstream: Downstream::new(subscriber, me.clone()),
            production: Mutex::new(Production {
                source,
                produced: 0,
            }),
            limit: self.limit,
            max_request: self.max_request,
        });
        // Delivers on_subscribe, then waits for demand
        subscription.drain();
    }
}

struct Production<T> {
    source: Box<dyn ItemSource<Item = T>>,
    produced: u64,
}

struct PullSubscription<T> {
    downstream: Downstream<T>,
    production: Mutex<Production<T>>,
    limit: Option<u64>,
    max_request: Option<u64>,
}

impl<T: Send + 'static> PullSubscription<T> {
    fn drain(&self) {
        self.downstream.drain(|downstream, slot| self.emit(downstream, slot))
    }

    fn emit(&self, downstream: &Downstream<T>, slot: &mut Slot<T>) {
        let mut production = lock(&self.production);
        loop {
            let capped = self.limit.is_some_and(|cap| production.produced >= cap);
            if capped || production.source.is_exhausted() {
                downstream.complete(slot);
                return;
            }
            if downstream.is_cancelled() || !downstream.demand.try_take() {
                return;
            }
            let next = catch_unwind(AssertUnwindSafe(|| production.source.next_item()));
            match next {
                Ok(Some(Ok(item))) => {
                    production.produced += 1;
                    if !downstream.next(slot, item) {
                        return;
                    }
                }
                Ok(Some(Err(error))) => {
                    downstream.fail(slot, StreamError::Source(error));
                    return;
                }
                Ok(None) => {
                    downstream.complete(slot);
                    return;
                }
                Err(panic) => {
                    downstream.fail(slot, StreamError::from_panic(panic));
                    return;
                }
            }
        }
    }
}

impl<T: Send + 'static> Subscription for PullSubscription<T> {
    fn request(&self, n: i64) {
        if self.downstream.request(n, self.max_request) {
            self.drain();
        }
    }

    fn cancel(&self) {
        if self.downstream.cancel() {
            self.drain();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.downstream.is_done()
    }
}
