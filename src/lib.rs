//!
//! Library implementing demand driven streams: a producer delivers items to a single consumer, and
//! the consumer controls the pace by requesting how many items it is ready to accept.
//!
//! # Usage sample
//!
//! ```
//! use futures::{executor::block_on, StreamExt};
//! use async_demand_streams::{PublisherExt, PullPublisher};
//!
//! let publisher = PullPublisher::from_items(vec![42, 451, 1984]);
//! // Request items by two
//! let mut stream = publisher.to_stream(2);
//!
//! let values = block_on(async move {
//!     let mut values = Vec::new();
//!     while let Some(item) = stream.next().await {
//!         values.push(item.unwrap());
//!     }
//!     values
//! });
//! assert!(values == vec![42, 451, 1984]);
//! ```
//!
//! # Protocol
//!
//! Three parties take part in the exchange:
//!
//! - [Publisher] accepts a [Subscriber] and creates a new [Subscription] for it
//! - [Subscription] is the control channel of the subscriber: [request](Subscription::request) grants demand,
//!   [cancel](Subscription::cancel) stops the stream
//! - [Subscriber] receives ```on_subscribe``` once, then ```on_next``` no more times than requested,
//!   then at most one of ```on_complete``` or ```on_error```
//!
//! Signals to one subscriber are never delivered concurrently. Calling ```request``` or ```cancel```
//! from inside a signal handler is allowed, the call only records the new state and the delivery continues
//! in the outer loop. Errors never travel back to the caller of ```request```: illegal demand
//! (```n <= 0```) or a request above the publisher's per-call ceiling is reported with ```on_error``` and
//! cancels the subscription. After a terminal signal or cancellation every call is silently ignored.
//!
//! # Production strategies
//!
//! [PullPublisher] computes items synchronously, on the thread calling ```request```, and never ahead of demand.
//!
//! [PushPublisher] lets independent sources (threads, callbacks, async tasks, see [AsyncSource]) emit items
//! into a [Sink] at their own pace. Items emitted ahead of demand are buffered according to [SinkConfig]. The default
//! buffer is unbounded: no item is ever lost, at the price of unlimited memory growth if the source is persistently
//! faster than the consumer. Bounded buffers resolve overflow with an explicit [OverflowStrategy].
//!
//! # Consuming as futures::Stream
//!
//! Any publisher can be read asynchronously with [PublisherExt::to_stream], which requests items in batches
//! and cancels the subscription when the stream is dropped.
//!

mod config;
mod demand;
mod downstream;
mod drain;
mod error;
mod pull;
mod push;
mod spawn;
mod stream;
mod subscriber;

pub use config::{BufferPolicy, OverflowStrategy, SinkConfig};
pub use demand::UNBOUNDED;
pub use error::{BoxError, StreamError};
pub use pull::{FnSource, ItemSource, IterSource, PullPublisher};
pub use push::{PushPublisher, Sink};
pub use spawn::{AsyncSource, StreamSource};
pub use stream::{PublisherExt, SubscriberStream};
pub use subscriber::{ConsumerState, GuardedSubscriber, Publisher, Subscriber, Subscription};
