use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Waker},
};

use futures::Stream;

use crate::{drain::lock, Publisher, StreamError, Subscriber, Subscription, UNBOUNDED};

struct StreamQueue<T> {
    items: VecDeque<T>,
    error: Option<StreamError>,
    done: bool,
    waker: Option<Waker>,
    subscription: Option<Arc<dyn Subscription>>,
}

impl<T> StreamQueue<T> {
    fn new() -> Self {
        Self {
            items: VecDeque::new(),
            error: None,
            done: false,
            waker: None,
            subscription: None,
        }
    }
    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake()
        }
    }
}

struct StreamSubscriber<T> {
    queue: Arc<Mutex<StreamQueue<T>>>,
    prefetch: i64,
}

impl<T: Send> Subscriber<T> for StreamSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        lock(&self.queue).subscription = Some(subscription.clone());
        subscription.request(self.prefetch);
    }
    fn on_next(&mut self, item: T) {
        let mut queue = lock(&self.queue);
        queue.items.push_back(item);
        queue.wake();
    }
    fn on_error(&mut self, error: StreamError) {
        let mut queue = lock(&self.queue);
        queue.error = Some(error);
        queue.done = true;
        queue.subscription = None;
        queue.wake();
    }
    fn on_complete(&mut self) {
        let mut queue = lock(&self.queue);
        queue.done = true;
        queue.subscription = None;
        queue.wake();
    }
}

/// Asynchronous stream of items of a [Publisher]. The stream requests ```prefetch``` items up front
/// and requests more each time three quarters of the batch are consumed. ```next()``` returns
/// ```Some(Ok(item))``` for items, ```Some(Err(error))``` once if the stream failed and ```None``` after the
/// terminal signal. Dropping the stream cancels the subscription.
pub struct SubscriberStream<T> {
    queue: Arc<Mutex<StreamQueue<T>>>,
    replenish: i64,
    consumed: i64,
}

impl<T: Send + 'static> SubscriberStream<T> {
    pub fn new<P: Publisher<Item = T>>(publisher: &P, prefetch: i64) -> Self {
        let prefetch = prefetch.max(1);
        let replenish = if prefetch == UNBOUNDED {
            UNBOUNDED
        } else {
            prefetch - (prefetch >> 2)
        };
        let queue = Arc::new(Mutex::new(StreamQueue::new()));
        publisher.subscribe(Box::new(StreamSubscriber {
            queue: queue.clone(),
            prefetch,
        }));
        Self {
            queue,
            replenish,
            consumed: 0,
        }
    }

    fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T, StreamError>>> {
        let mut queue = lock(&self.queue);
        if let Some(item) = queue.items.pop_front() {
            let mut refill = None;
            if self.replenish != UNBOUNDED {
                self.consumed += 1;
                if self.consumed == self.replenish {
                    self.consumed = 0;
                    refill = queue.subscription.clone();
                }
            }
            // request may deliver synchronously, queue must be unlocked
            drop(queue);
            if let Some(subscription) = refill {
                subscription.request(self.replenish);
            }
            return Poll::Ready(Some(Ok(item)));
        }
        if let Some(error) = queue.error.take() {
            return Poll::Ready(Some(Err(error)));
        }
        if queue.done {
            return Poll::Ready(None);
        }
        queue.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T: Send + 'static> Stream for SubscriberStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_item(cx)
    }
}

impl<T> Drop for SubscriberStream<T> {
    fn drop(&mut self) {
        let subscription = lock(&self.queue).subscription.take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }
}

/// Standardized way to consume any [Publisher] as [futures::Stream]
pub trait PublisherExt: Publisher {
    fn to_stream(&self, prefetch: i64) -> SubscriberStream<Self::Item>
    where
        Self: Sized,
    {
        SubscriberStream::new(self, prefetch)
    }
}

impl<P: Publisher> PublisherExt for P {}
