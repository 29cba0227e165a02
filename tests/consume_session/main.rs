//! Consume session integration tests.
//!
//! Exercises `ConsumeSession` against the in-memory channel:
//! - Subscription lifecycle and prefetch
//! - Receive loop, acknowledgements and timeouts
//! - Failure classification and subscription recovery
//! - Teardown and cross-thread interruption

mod sampling;
mod teardown;
mod threaded;
