use std::sync::Arc;

use tracing::warn;

use crate::StreamError;

/// Control channel handed to a [Subscriber] in [on_subscribe](Subscriber::on_subscribe).
///
/// Both methods are safe to call from any thread and from inside any signal handler of the subscriber.
/// They never fail: protocol violations are reported to the subscriber with [on_error](Subscriber::on_error).
pub trait Subscription: Send + Sync {
    /// Allow the publisher to deliver ```n``` more items. ```n <= 0``` is a protocol violation which
    /// terminates the stream with [StreamError::IllegalDemand]. [UNBOUNDED](crate::UNBOUNDED) turns off
    /// flow control. Ignored after cancellation or termination.
    fn request(&self, n: i64);
    /// Stop delivery of any further signal. Idempotent.
    fn cancel(&self);
    /// Whether the subscription was cancelled or the stream is terminated
    fn is_cancelled(&self) -> bool;
}

/// Receiver of stream signals. The publisher calls [on_subscribe](Subscriber::on_subscribe) once, then
/// [on_next](Subscriber::on_next) at most as many times as was requested, then at most one of
/// [on_error](Subscriber::on_error) or [on_complete](Subscriber::on_complete).
///
/// Signals are never delivered concurrently, so handlers take ```&mut self```.
pub trait Subscriber<T>: Send {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>);
    fn on_next(&mut self, item: T);
    fn on_error(&mut self, error: StreamError);
    fn on_complete(&mut self);
}

impl<T, S: Subscriber<T> + ?Sized> Subscriber<T> for Box<S> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        (**self).on_subscribe(subscription)
    }
    fn on_next(&mut self, item: T) {
        (**self).on_next(item)
    }
    fn on_error(&mut self, error: StreamError) {
        (**self).on_error(error)
    }
    fn on_complete(&mut self) {
        (**self).on_complete()
    }
}

/// Source of items for any number of independent subscribers. Each call to
/// [subscribe](Publisher::subscribe) creates a new subscription owned by that subscriber only.
pub trait Publisher {
    type Item: Send + 'static;

    fn subscribe(&self, subscriber: Box<dyn Subscriber<Self::Item>>);

    fn subscribe_with<S>(&self, subscriber: S)
    where
        S: Subscriber<Self::Item> + 'static,
        Self: Sized,
    {
        self.subscribe(Box::new(subscriber))
    }
}

/// Lifecycle of the consumer side of a stream
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    NotSubscribed,
    Subscribed,
    Terminated,
}

/// Wrapper enforcing the consumer state machine on top of any subscriber, whatever publisher it
/// is attached to. A second subscription is cancelled right away, signals arriving before
/// ```on_subscribe``` or after a terminal signal are dropped.
pub struct GuardedSubscriber<S> {
    inner: S,
    state: ConsumerState,
}

impl<S> GuardedSubscriber<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: ConsumerState::NotSubscribed,
        }
    }
    pub fn state(&self) -> ConsumerState {
        self.state
    }
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<T, S: Subscriber<T>> Subscriber<T> for GuardedSubscriber<S> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if self.state != ConsumerState::NotSubscribed {
            warn!(state = ?self.state, "duplicate on_subscribe, cancelling extra subscription");
            subscription.cancel();
            return;
        }
        self.state = ConsumerState::Subscribed;
        self.inner.on_subscribe(subscription)
    }
    fn on_next(&mut self, item: T) {
        if self.state != ConsumerState::Subscribed {
            warn!(state = ?self.state, "on_next out of order, dropped");
            return;
        }
        self.inner.on_next(item)
    }
    fn on_error(&mut self, error: StreamError) {
        if self.state != ConsumerState::Subscribed {
            warn!(state = ?self.state, %error, "on_error out of order, dropped");
            return;
        }
        self.state = ConsumerState::Terminated;
        self.inner.on_error(error)
    }
    fn on_complete(&mut self) {
        if self.state != ConsumerState::Subscribed {
            warn!(state = ?self.state, "on_complete out of order, dropped");
            return;
        }
        self.state = ConsumerState::Terminated;
        self.inner.on_complete()
    }
}
