//! Consumer-side sampling for AMQP load tests.
//!
//! A [`ConsumeSession`] pulls a bounded number of deliveries per sample from a
//! [`Channel`], optionally acknowledges them, and reports a [`SampleOutcome`]
//! with timing, payload and message metadata. Broker failures invalidate the
//! subscription so the next sample rebuilds it.

pub mod channel;
pub mod config;
mod error;
pub mod metadata;
pub mod session;

pub use channel::{Channel, ChannelError, Delivery, InMemoryChannel, Interrupt, MessageProperties};
pub use config::ConsumerConfig;
pub use error::ConfigError;
pub use metadata::MetadataRecord;
pub use session::{ConsumeSession, SampleOutcome, StatusCode, Subscription};
