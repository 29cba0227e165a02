//! In-memory channel for testing and single-process scenarios.
//!
//! [`InMemoryChannel`] behaves like a broker channel without a broker:
//! - Thread-safe (clones share the same queues, so a producer thread can
//!   publish while a session consumes)
//! - Bounded, interruptible waits in `next_delivery`
//! - Scripted one-shot failures for every channel operation
//! - Call counters and ack/cancel history for assertions

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{Channel, ChannelError, Delivery, Interrupt};

/// Consumer object handed out by [`InMemoryChannel::create_consumer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryConsumer {
    id: u64,
}

impl InMemoryConsumer {
    /// Channel-local consumer id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Number of times each channel operation was invoked.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub apply_prefetch: usize,
    pub create_consumer: usize,
    pub register_consumer: usize,
    pub next_delivery: usize,
    pub acknowledge: usize,
    pub purge_queue: usize,
    pub cancel_consumer: usize,
}

/// Operation a scripted failure is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ApplyPrefetch,
    CreateConsumer,
    RegisterConsumer,
    NextDelivery,
    Acknowledge,
    PurgeQueue,
    CancelConsumer,
}

#[derive(Debug)]
struct Registration {
    queue: String,
    auto_ack: bool,
    tag: String,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Delivery>>,
    registrations: BTreeMap<u64, Registration>,
    next_consumer_id: u64,
    prefetch: Option<u16>,
    acknowledged: Vec<u64>,
    cancelled: Vec<String>,
    purged: Vec<String>,
    failures: HashMap<Operation, VecDeque<ChannelError>>,
    calls: CallCounts,
}

impl State {
    fn scripted_failure(&mut self, op: Operation) -> Result<(), ChannelError> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory broker channel.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use amqp_consume::channel::{Channel, Delivery, InMemoryChannel, Interrupt};
///
/// let channel = InMemoryChannel::new();
/// channel.publish("orders", Delivery::new(1, r#"{"id":"123"}"#));
///
/// let consumer = channel.create_consumer().unwrap();
/// let tag = channel.register_consumer("orders", false, &consumer).unwrap();
/// assert!(tag.starts_with("amq.ctag-"));
///
/// let delivery = channel
///     .next_delivery(&consumer, Duration::from_millis(10), &Interrupt::new())
///     .unwrap()
///     .unwrap();
/// channel.acknowledge(delivery.delivery_tag).unwrap();
/// assert_eq!(channel.acknowledged(), vec![1]);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryChannel {
    state: Arc<Mutex<State>>,
}

impl InMemoryChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a delivery on a queue.
    pub fn publish(&self, queue: &str, delivery: Delivery) {
        self.state()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(delivery);
    }

    /// Enqueue several deliveries in order.
    pub fn publish_batch(&self, queue: &str, deliveries: Vec<Delivery>) {
        self.state()
            .queues
            .entry(queue.to_string())
            .or_default()
            .extend(deliveries);
    }

    /// Make the next call to `op` fail with `err`.
    ///
    /// Failures queue up: scripting the same operation twice fails its next
    /// two calls.
    pub fn fail_next(&self, op: Operation, err: ChannelError) {
        self.state().failures.entry(op).or_default().push_back(err);
    }

    /// Messages waiting on a queue.
    pub fn queue_len(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Delivery tags acknowledged so far, in order.
    pub fn acknowledged(&self) -> Vec<u64> {
        self.state().acknowledged.clone()
    }

    /// Consumer tags cancelled so far, in order.
    pub fn cancelled(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }

    /// Queues purged so far, in order.
    pub fn purged(&self) -> Vec<String> {
        self.state().purged.clone()
    }

    /// Last prefetch count applied.
    pub fn prefetch(&self) -> Option<u16> {
        self.state().prefetch
    }

    /// Tags of the currently registered consumers.
    pub fn active_tags(&self) -> Vec<String> {
        self.state()
            .registrations
            .values()
            .map(|r| r.tag.clone())
            .collect()
    }

    /// Whether a registered consumer runs in auto-ack mode.
    pub fn is_auto_ack(&self, consumer_tag: &str) -> Option<bool> {
        self.state()
            .registrations
            .values()
            .find(|r| r.tag == consumer_tag)
            .map(|r| r.auto_ack)
    }

    /// Per-operation call counts.
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }
}

impl Channel for InMemoryChannel {
    type Consumer = InMemoryConsumer;

    fn apply_prefetch(&self, count: u16) -> Result<(), ChannelError> {
        let mut state = self.state();
        state.calls.apply_prefetch += 1;
        state.scripted_failure(Operation::ApplyPrefetch)?;
        state.prefetch = Some(count);
        Ok(())
    }

    fn create_consumer(&self) -> Result<InMemoryConsumer, ChannelError> {
        let mut state = self.state();
        state.calls.create_consumer += 1;
        state.scripted_failure(Operation::CreateConsumer)?;
        state.next_consumer_id += 1;
        Ok(InMemoryConsumer {
            id: state.next_consumer_id,
        })
    }

    fn register_consumer(
        &self,
        queue: &str,
        auto_ack: bool,
        consumer: &InMemoryConsumer,
    ) -> Result<String, ChannelError> {
        let mut state = self.state();
        state.calls.register_consumer += 1;
        state.scripted_failure(Operation::RegisterConsumer)?;
        let tag = format!("amq.ctag-{}", consumer.id);
        state.registrations.insert(
            consumer.id,
            Registration {
                queue: queue.to_string(),
                auto_ack,
                tag: tag.clone(),
            },
        );
        Ok(tag)
    }

    fn next_delivery(
        &self,
        consumer: &InMemoryConsumer,
        timeout: Duration,
        interrupt: &Interrupt,
    ) -> Result<Option<Delivery>, ChannelError> {
        let deadline = Instant::now() + timeout;

        {
            let mut state = self.state();
            state.calls.next_delivery += 1;
            state.scripted_failure(Operation::NextDelivery)?;
        }

        loop {
            if interrupt.take() {
                return Err(ChannelError::Interrupted);
            }

            {
                let mut state = self.state();
                let queue = match state.registrations.get(&consumer.id) {
                    Some(registration) => registration.queue.clone(),
                    None => {
                        return Err(ChannelError::ConsumerCancelled(format!(
                            "consumer {} is not registered",
                            consumer.id
                        )))
                    }
                };

                if let Some(delivery) = state.queues.get_mut(&queue).and_then(VecDeque::pop_front) {
                    return Ok(Some(delivery));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Small sleep to avoid busy-waiting
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn acknowledge(&self, delivery_tag: u64) -> Result<(), ChannelError> {
        let mut state = self.state();
        state.calls.acknowledge += 1;
        state.scripted_failure(Operation::Acknowledge)?;
        state.acknowledged.push(delivery_tag);
        Ok(())
    }

    fn purge_queue(&self, queue: &str) -> Result<u32, ChannelError> {
        let mut state = self.state();
        state.calls.purge_queue += 1;
        state.scripted_failure(Operation::PurgeQueue)?;
        let purged = state
            .queues
            .get_mut(queue)
            .map(|q| q.drain(..).count())
            .unwrap_or(0);
        state.purged.push(queue.to_string());
        Ok(u32::try_from(purged).unwrap_or(u32::MAX))
    }

    fn cancel_consumer(&self, consumer_tag: &str) -> Result<(), ChannelError> {
        let mut state = self.state();
        state.calls.cancel_consumer += 1;
        state.scripted_failure(Operation::CancelConsumer)?;
        state.registrations.retain(|_, r| r.tag != consumer_tag);
        state.cancelled.push(consumer_tag.to_string());
        Ok(())
    }
}
