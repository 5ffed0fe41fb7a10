use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, Weak,
};

use tracing::{debug, trace};

use crate::{
    demand::{Demand, UNBOUNDED},
    drain::{lock, Drain},
    StreamError, Subscriber, Subscription,
};

/// Subscriber slot, touched only by the current owner of the [Drain]
pub(crate) struct Slot<T> {
    subscriber: Option<Box<dyn Subscriber<T>>>,
    subscribed: bool,
}

/// State shared by every subscription flavour: demand, cancellation and termination flags,
/// pending protocol violation and the serialized access to the subscriber
pub(crate) struct Downstream<T> {
    pub demand: Demand,
    cancelled: AtomicBool,
    terminated: AtomicBool,
    violation: Mutex<Option<StreamError>>,
    drain: Drain,
    slot: Mutex<Slot<T>>,
    handle: Weak<dyn Subscription>,
}

impl<T> Downstream<T> {
    /// ```handle``` points back to the subscription owning this state and is passed to ```on_subscribe```
    pub fn new(subscriber: Box<dyn Subscriber<T>>, handle: Weak<dyn Subscription>) -> Self {
        Self {
            demand: Demand::new(),
            cancelled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            violation: Mutex::new(None),
            drain: Drain::new(),
            slot: Mutex::new(Slot {
                subscriber: Some(subscriber),
                subscribed: false,
            }),
            handle,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_terminated()
    }

    /// Validate and account a ```request(n)``` call. Returns ```true``` when the caller has to drain.
    pub fn request(&self, n: i64, ceiling: Option<u64>) -> bool {
        if self.is_done() {
            return false;
        }
        if n <= 0 {
            return self.abort(StreamError::IllegalDemand(n));
        }
        if let Some(limit) = ceiling {
            if n != UNBOUNDED && n as u64 > limit {
                return self.abort(StreamError::CapacityExceeded {
                    requested: n,
                    limit,
                });
            }
        }
        let total = self.demand.add(n);
        trace!(n, total, "request");
        true
    }

    /// Cancel the subscription and record ```error``` to be delivered as ```on_error``` by the next drain
    pub fn abort(&self, error: StreamError) -> bool {
        debug!(%error, "aborting subscription");
        {
            let mut violation = lock(&self.violation);
            if violation.is_none() {
                *violation = Some(error);
            }
        }
        self.cancelled.store(true, Ordering::Release);
        true
    }

    /// Mark the subscription cancelled. Returns ```true``` on the first effective call only.
    pub fn cancel(&self) -> bool {
        if self.is_terminated() {
            return false;
        }
        let first = !self.cancelled.swap(true, Ordering::AcqRel);
        if first {
            trace!("cancel");
        }
        first
    }

    /// Run ```emit``` serialized with every other signal. Handles ```on_subscribe```, pending violations and
    /// cancellation before passing the live slot to ```emit```.
    pub fn drain(&self, mut emit: impl FnMut(&Self, &mut Slot<T>)) {
        self.drain.run(|| {
            let mut guard = lock(&self.slot);
            let slot = &mut *guard;
            let Some(subscriber) = slot.subscriber.as_mut() else {
                return;
            };
            if !slot.subscribed {
                slot.subscribed = true;
                if let Some(subscription) = self.handle.upgrade() {
                    subscriber.on_subscribe(subscription);
                }
            }
            let violation = lock(&self.violation).take();
            if let Some(error) = violation {
                self.signal_error(slot, error);
                return;
            }
            if self.release_if_cancelled(slot) {
                return;
            }
            emit(self, slot);
        })
    }

    /// Deliver ```on_next``` if the stream is still live and not cancelled
    pub fn next(&self, slot: &mut Slot<T>, item: T) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match slot.subscriber.as_mut() {
            Some(subscriber) => {
                subscriber.on_next(item);
                true
            }
            None => false,
        }
    }

    pub fn complete(&self, slot: &mut Slot<T>) {
        if self.release_if_cancelled(slot) {
            return;
        }
        if let Some(mut subscriber) = self.terminate(slot) {
            trace!("complete");
            subscriber.on_complete();
        }
    }

    pub fn fail(&self, slot: &mut Slot<T>, error: StreamError) {
        if self.release_if_cancelled(slot) {
            return;
        }
        self.signal_error(slot, error)
    }

    fn signal_error(&self, slot: &mut Slot<T>, error: StreamError) {
        if let Some(mut subscriber) = self.terminate(slot) {
            trace!(%error, "error");
            subscriber.on_error(error);
        }
    }

    fn release_if_cancelled(&self, slot: &mut Slot<T>) -> bool {
        if !self.is_cancelled() {
            return false;
        }
        trace!("releasing cancelled subscriber");
        self.demand.clear();
        slot.subscriber = None;
        true
    }

    fn terminate(&self, slot: &mut Slot<T>) -> Option<Box<dyn Subscriber<T>>> {
        let subscriber = slot.subscriber.take()?;
        self.terminated.store(true, Ordering::Release);
        self.demand.clear();
        Some(subscriber)
    }
}
