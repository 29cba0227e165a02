//! Broker channel abstraction consumed by the sampling session.
//!
//! A [`Channel`] is an open, authenticated link to a broker. The session only
//! uses it: it never connects, reconnects or declares anything.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ConsumeSession (per thread)                │
//! │  ensure_subscribed() / sample() / teardown()                │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Channel trait                         │
//! │  apply_prefetch / create_consumer / register_consumer       │
//! │  next_delivery(timeout) / acknowledge / purge / cancel      │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                     │
//!          ▼                                     ▼
//! ┌──────────────────┐                ┌──────────────────────┐
//! │ InMemoryChannel  │                │ AmqpChannel (lapin)  │
//! │   (included)     │                │   feature "amqp"     │
//! └──────────────────┘                └──────────────────────┘
//! ```

#[cfg(feature = "amqp")]
mod amqp;
mod delivery;
mod in_memory;

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpChannel, AmqpConsumer};
pub use delivery::{Delivery, MessageProperties, BASIC_CLASS_ID};
pub use in_memory::{CallCounts, InMemoryChannel, InMemoryConsumer, Operation};

/// Failure signalled by the broker link.
///
/// The variants line up with the broker conditions a consumer has to tell
/// apart: the link going away, the broker revoking the consumer, a caller
/// cancelling the wait, and transport failures.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The connection or channel was shut down.
    #[error("channel shut down: {0}")]
    Shutdown(String),
    /// The broker cancelled the consumer registration (e.g. queue deleted).
    #[error("consumer cancelled by broker: {0}")]
    ConsumerCancelled(String),
    /// The wait for a delivery was interrupted by the caller.
    #[error("interrupted while waiting for a delivery")]
    Interrupted,
    /// Transport failure.
    #[error("channel i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Anything the channel could not classify.
    #[error("channel error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl ChannelError {
    /// Wrap an arbitrary error as [`ChannelError::Other`].
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        ChannelError::Other(err.into())
    }
}

/// Cancellation request for an in-flight (or the next) delivery wait.
///
/// Cloning shares the same flag, so one clone can live in the session while
/// another is handed to whoever needs to stop the run. A channel honours the
/// request by calling [`Interrupt::take`], which clears it again.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    requested: Arc<AtomicBool>,
}

impl Interrupt {
    /// Create a handle with no pending request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the current wait stops.
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether a request is pending.
    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Consume a pending request, returning whether there was one.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}

/// Capability object over an open broker channel.
///
/// This is a pull-based interface: [`Channel::next_delivery`] blocks for at
/// most `timeout` and returns `Ok(None)` when nothing arrived in time.
/// Timeouts are not errors.
pub trait Channel {
    /// Consumer object deliveries are pulled through.
    type Consumer;

    /// Limit the number of unacknowledged deliveries (0 = unlimited).
    fn apply_prefetch(&self, count: u16) -> Result<(), ChannelError>;

    /// Create a consumer object bound to this channel.
    fn create_consumer(&self) -> Result<Self::Consumer, ChannelError>;

    /// Register the consumer on a queue, returning the broker's consumer tag.
    fn register_consumer(
        &self,
        queue: &str,
        auto_ack: bool,
        consumer: &Self::Consumer,
    ) -> Result<String, ChannelError>;

    /// Wait up to `timeout` for the next delivery.
    ///
    /// Must return [`ChannelError::Interrupted`] promptly once `interrupt` is
    /// triggered.
    fn next_delivery(
        &self,
        consumer: &Self::Consumer,
        timeout: Duration,
        interrupt: &Interrupt,
    ) -> Result<Option<Delivery>, ChannelError>;

    /// Acknowledge a single delivery.
    fn acknowledge(&self, delivery_tag: u64) -> Result<(), ChannelError>;

    /// Discard everything queued, returning the number of purged messages.
    fn purge_queue(&self, queue: &str) -> Result<u32, ChannelError>;

    /// Cancel a consumer registration.
    fn cancel_consumer(&self, consumer_tag: &str) -> Result<(), ChannelError>;
}

macro_rules! forward_channel {
    ($ty:ty) => {
        impl<T: Channel + ?Sized> Channel for $ty {
            type Consumer = T::Consumer;

            fn apply_prefetch(&self, count: u16) -> Result<(), ChannelError> {
                (**self).apply_prefetch(count)
            }

            fn create_consumer(&self) -> Result<Self::Consumer, ChannelError> {
                (**self).create_consumer()
            }

            fn register_consumer(
                &self,
                queue: &str,
                auto_ack: bool,
                consumer: &Self::Consumer,
            ) -> Result<String, ChannelError> {
                (**self).register_consumer(queue, auto_ack, consumer)
            }

            fn next_delivery(
                &self,
                consumer: &Self::Consumer,
                timeout: Duration,
                interrupt: &Interrupt,
            ) -> Result<Option<Delivery>, ChannelError> {
                (**self).next_delivery(consumer, timeout, interrupt)
            }

            fn acknowledge(&self, delivery_tag: u64) -> Result<(), ChannelError> {
                (**self).acknowledge(delivery_tag)
            }

            fn purge_queue(&self, queue: &str) -> Result<u32, ChannelError> {
                (**self).purge_queue(queue)
            }

            fn cancel_consumer(&self, consumer_tag: &str) -> Result<(), ChannelError> {
                (**self).cancel_consumer(consumer_tag)
            }
        }
    };
}

// The channel is owned by the harness; sessions may hold it shared or borrowed.
forward_channel!(Arc<T>);
forward_channel!(&T);
