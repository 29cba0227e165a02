//! Consume sessions - per-thread consumer state and sampling.
//!
//! ```text
//!  UNSUBSCRIBED ──ensure_subscribed()──▶ SUBSCRIBED
//!       ▲                                   │
//!       └── shutdown / cancelled / interrupted / i/o / unknown / teardown
//! ```
//!
//! A failure that invalidates the subscription only clears it; the next
//! `sample()` rebuilds the consumer and its tag from scratch. Nothing is
//! retried within a call.

mod consume;
mod outcome;

pub use consume::{ConsumeSession, Subscription};
pub use outcome::{SampleOutcome, StatusCode, READ_RESPONSE_DISABLED};
