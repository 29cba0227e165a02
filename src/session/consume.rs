use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

use super::outcome::{SampleOutcome, StatusCode, READ_RESPONSE_DISABLED};
use crate::channel::{Channel, ChannelError, Interrupt};
use crate::config::ConsumerConfig;
use crate::metadata::MetadataRecord;

/// An active consumer registration: the consumer object and its tag.
///
/// Held as one value so a session is either fully subscribed or not at all.
#[derive(Debug)]
pub struct Subscription<T> {
    consumer: T,
    tag: String,
}

impl<T> Subscription<T> {
    pub fn consumer(&self) -> &T {
        &self.consumer
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

enum Progress {
    Complete,
    TimedOut,
}

/// Consumer state for one test element on one thread.
///
/// The subscription is built lazily by the first sample and rebuilt after
/// any failure that invalidates it. Sessions are not shared between threads;
/// use [`ConsumeSession::interrupter`] to stop a wait from elsewhere.
///
/// ## Example
///
/// ```
/// use amqp_consume::channel::{Delivery, InMemoryChannel};
/// use amqp_consume::{ConsumeSession, ConsumerConfig, StatusCode};
///
/// let channel = InMemoryChannel::new();
/// channel.publish("q1", Delivery::new(42, r#"{"x":1}"#));
///
/// let mut session = ConsumeSession::new(channel.clone(), ConsumerConfig::new("q1"));
/// let outcome = session.sample();
///
/// assert_eq!(outcome.status, StatusCode::Ok);
/// assert_eq!(outcome.payload.as_deref(), Some(r#"{"x":1}"#));
/// assert_eq!(channel.acknowledged(), vec![42]);
///
/// session.teardown();
/// ```
pub struct ConsumeSession<C: Channel> {
    channel: C,
    config: ConsumerConfig,
    label: String,
    subscription: Option<Subscription<C::Consumer>>,
    qos_applied: bool,
    interrupt: Interrupt,
    span: tracing::Span,
}

fn session_span(queue: &str, label: &str) -> tracing::Span {
    tracing::info_span!("consume_session", queue = %queue, label = %label)
}

impl<C: Channel> ConsumeSession<C> {
    /// Create an unsubscribed session labelled with the queue name.
    pub fn new(channel: C, config: ConsumerConfig) -> Self {
        let label = config.queue.clone();
        Self {
            span: session_span(&config.queue, &label),
            channel,
            config,
            label,
            subscription: None,
            qos_applied: false,
            interrupt: Interrupt::new(),
        }
    }

    /// Set the label reported in every outcome.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self.span = session_span(&self.config.queue, &self.label);
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The active subscription, if any.
    pub fn subscription(&self) -> Option<&Subscription<C::Consumer>> {
        self.subscription.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Tag of the active consumer registration.
    pub fn consumer_tag(&self) -> Option<&str> {
        self.subscription.as_ref().map(Subscription::tag)
    }

    /// Handle that can stop an in-flight wait from another thread.
    pub fn interrupter(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Stop the current (or next) wait for a delivery.
    pub fn interrupt(&self) {
        self.interrupt.trigger();
    }

    /// Apply prefetch once and make sure a consumer is registered.
    ///
    /// The subscription is stored only when both the consumer and its tag
    /// were obtained; on error the session stays unsubscribed.
    pub fn ensure_subscribed(&mut self) -> Result<(), ChannelError> {
        let _guard = self.span.enter();

        if !self.qos_applied {
            debug!(prefetch = self.config.prefetch_count, "applying prefetch");
            self.channel.apply_prefetch(self.config.prefetch_count)?;
            self.qos_applied = true;
        }

        if self.subscription.is_none() {
            info!("creating consumer");
            let consumer = self.channel.create_consumer()?;
            info!("starting basic consumer");
            let tag = self.channel.register_consumer(
                &self.config.queue,
                self.config.auto_ack,
                &consumer,
            )?;
            debug!(consumer_tag = %tag, "consumer registered");
            self.subscription = Some(Subscription { consumer, tag });
        }

        Ok(())
    }

    /// Take one sample: subscribe if needed, then consume.
    ///
    /// Always returns exactly one outcome with the elapsed time recorded.
    pub fn sample(&mut self) -> SampleOutcome {
        let started = Instant::now();

        if let Err(err) = self.ensure_subscribed() {
            let _guard = self.span.enter();
            error!(error = %err, "failed to initialize consumer");
            let mut outcome = SampleOutcome::new(&self.label);
            outcome.fail(StatusCode::InitError, err.to_string());
            outcome.elapsed = started.elapsed();
            return outcome;
        }

        self.sample_once()
    }

    /// Pull `iterations` deliveries from the active subscription.
    pub fn sample_once(&mut self) -> SampleOutcome {
        let span = self.span.clone();
        let _guard = span.enter();
        trace!("sample started");

        let started = Instant::now();
        let mut outcome = SampleOutcome::new(&self.label);

        let progress = match &self.subscription {
            Some(subscription) => self.consume(subscription, &mut outcome),
            None => {
                outcome.fail(StatusCode::InitError, "consumer is not subscribed");
                outcome.elapsed = started.elapsed();
                return outcome;
            }
        };

        match progress {
            Ok(Progress::Complete) => outcome.succeed(),
            Ok(Progress::TimedOut) => {
                debug!(received = outcome.received, "timed out waiting for delivery");
                outcome.fail(StatusCode::Timeout, "timed out");
            }
            Err(err) => self.fail(err, &mut outcome),
        }

        outcome.elapsed = started.elapsed();
        trace!(status = %outcome.status, elapsed = ?outcome.elapsed, "sample ended");
        outcome
    }

    fn consume(
        &self,
        subscription: &Subscription<C::Consumer>,
        outcome: &mut SampleOutcome,
    ) -> Result<Progress, ChannelError> {
        let timeout = self.config.receive_timeout();

        for _ in 0..self.config.iterations_per_sample() {
            let delivery = match self.channel.next_delivery(
                &subscription.consumer,
                timeout,
                &self.interrupt,
            )? {
                Some(delivery) => delivery,
                None => return Ok(Progress::TimedOut),
            };
            outcome.received += 1;
            if delivery.redelivered {
                outcome.redelivered += 1;
            }

            if self.config.read_response {
                let body = delivery.body_text();
                let record = MetadataRecord::from_delivery(&delivery, &body);
                outcome.sampler_data = Some(record.to_json());
                outcome.metadata = Some(record);
                outcome.message = body.clone();
                outcome.payload = Some(body);
            } else {
                outcome.sampler_data = Some(READ_RESPONSE_DISABLED.to_string());
            }

            if !self.config.auto_ack {
                self.channel.acknowledge(delivery.delivery_tag)?;
                outcome.acknowledged += 1;
            }
        }

        Ok(Progress::Complete)
    }

    fn fail(&mut self, err: ChannelError, outcome: &mut SampleOutcome) {
        let status = match &err {
            ChannelError::Shutdown(_) => StatusCode::Shutdown,
            ChannelError::ConsumerCancelled(_) => StatusCode::Cancelled,
            ChannelError::Interrupted => StatusCode::Interrupted,
            ChannelError::Io(_) => StatusCode::IoError,
            ChannelError::Other(_) => StatusCode::UnknownError,
        };

        if status.invalidates_subscription() {
            self.subscription = None;
        }
        if status == StatusCode::Interrupted {
            info!("interrupted while attempting to consume");
        } else {
            warn!(error = %err, status = %status, "consumer failed to consume");
        }

        if matches!(status, StatusCode::Shutdown | StatusCode::Cancelled) {
            self.teardown();
        }

        outcome.fail(status, err.to_string());
    }

    /// End-of-run cleanup: purge the queue if configured, then cancel the
    /// active registration. Both steps are best-effort and independent.
    pub fn teardown(&mut self) {
        let _guard = self.span.enter();

        if self.config.purge_on_end {
            info!(queue = %self.config.queue, "purging queue");
            match self.channel.purge_queue(&self.config.queue) {
                Ok(purged) => debug!(purged, "queue purged"),
                Err(err) => error!(error = %err, queue = %self.config.queue, "failed to purge queue"),
            }
        }

        if let Some(subscription) = self.subscription.take() {
            if let Err(err) = self.channel.cancel_consumer(&subscription.tag) {
                error!(error = %err, consumer_tag = %subscription.tag, "couldn't safely cancel consumer");
            }
        }
    }
}
