//! `Channel` over a live AMQP 0-9-1 broker, backed by `lapin`.
//!
//! The session is synchronous, so every broker call is driven to completion
//! on a tokio runtime handle owned by the caller. Connection setup, queue
//! declaration and credentials stay with the caller.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicQosOptions, QueuePurgeOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio_stream::StreamExt;

use super::{Channel, ChannelError, Delivery, Interrupt, MessageProperties};

/// Longest stretch a wait runs before checking for an interrupt.
const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// Consumer object for [`AmqpChannel`]; holds the delivery stream once
/// registered.
#[derive(Default)]
pub struct AmqpConsumer {
    stream: Mutex<Option<lapin::Consumer>>,
}

/// Broker channel driven through a tokio runtime handle.
#[derive(Clone)]
pub struct AmqpChannel {
    channel: lapin::Channel,
    runtime: Handle,
}

impl AmqpChannel {
    /// Wrap an open channel. Calls block on `runtime`, so they must not be
    /// made from inside it.
    pub fn new(channel: lapin::Channel, runtime: Handle) -> Self {
        Self { channel, runtime }
    }

    /// The underlying lapin channel.
    pub fn inner(&self) -> &lapin::Channel {
        &self.channel
    }
}

impl From<lapin::Error> for ChannelError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::IOError(io) => {
                ChannelError::Io(std::io::Error::new(io.kind(), io.to_string()))
            }
            lapin::Error::InvalidChannelState(_)
            | lapin::Error::InvalidConnectionState(_)
            | lapin::Error::ProtocolError(_) => ChannelError::Shutdown(err.to_string()),
            other => ChannelError::other(other),
        }
    }
}

impl Channel for AmqpChannel {
    type Consumer = AmqpConsumer;

    fn apply_prefetch(&self, count: u16) -> Result<(), ChannelError> {
        self.runtime
            .block_on(self.channel.basic_qos(count, BasicQosOptions::default()))?;
        Ok(())
    }

    fn create_consumer(&self) -> Result<AmqpConsumer, ChannelError> {
        Ok(AmqpConsumer::default())
    }

    fn register_consumer(
        &self,
        queue: &str,
        auto_ack: bool,
        consumer: &AmqpConsumer,
    ) -> Result<String, ChannelError> {
        let options = BasicConsumeOptions {
            no_ack: auto_ack,
            ..BasicConsumeOptions::default()
        };
        let stream = self.runtime.block_on(self.channel.basic_consume(
            queue,
            "",
            options,
            FieldTable::default(),
        ))?;
        let tag = stream.tag().as_str().to_string();
        *consumer.stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(stream);
        Ok(tag)
    }

    fn next_delivery(
        &self,
        consumer: &AmqpConsumer,
        timeout: Duration,
        interrupt: &Interrupt,
    ) -> Result<Option<Delivery>, ChannelError> {
        let mut slot = consumer.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let stream = slot.as_mut().ok_or_else(|| {
            ChannelError::ConsumerCancelled("consumer is not registered".to_string())
        })?;

        self.runtime.block_on(async {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if interrupt.take() {
                    return Err(ChannelError::Interrupted);
                }
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    return Ok(None);
                }

                match tokio::time::timeout((deadline - now).min(INTERRUPT_POLL), stream.next()).await {
                    Err(_) => continue,
                    Ok(Some(Ok(delivery))) => return Ok(Some(convert_delivery(delivery))),
                    Ok(Some(Err(err))) => return Err(err.into()),
                    Ok(None) => {
                        return Err(ChannelError::ConsumerCancelled(
                            "delivery stream ended".to_string(),
                        ))
                    }
                }
            }
        })
    }

    fn acknowledge(&self, delivery_tag: u64) -> Result<(), ChannelError> {
        self.runtime.block_on(
            self.channel
                .basic_ack(delivery_tag, BasicAckOptions::default()),
        )?;
        Ok(())
    }

    fn purge_queue(&self, queue: &str) -> Result<u32, ChannelError> {
        let purged = self
            .runtime
            .block_on(self.channel.queue_purge(queue, QueuePurgeOptions::default()))?;
        Ok(purged)
    }

    fn cancel_consumer(&self, consumer_tag: &str) -> Result<(), ChannelError> {
        self.runtime.block_on(
            self.channel
                .basic_cancel(consumer_tag, BasicCancelOptions::default()),
        )?;
        Ok(())
    }
}

fn convert_delivery(delivery: lapin::message::Delivery) -> Delivery {
    let props = &delivery.properties;
    let text = |value: &Option<lapin::types::ShortString>| {
        value.as_ref().map(|s| s.as_str().to_string())
    };

    let headers = props
        .headers()
        .as_ref()
        .map(|table| {
            table
                .inner()
                .iter()
                .map(|(key, value)| (key.as_str().to_string(), render_value(value)))
                .collect()
        })
        .unwrap_or_default();

    let properties = MessageProperties {
        app_id: text(props.app_id()),
        cluster_id: text(props.cluster_id()),
        content_encoding: text(props.content_encoding()),
        content_type: text(props.content_type()),
        correlation_id: text(props.correlation_id()),
        delivery_mode: *props.delivery_mode(),
        expiration: text(props.expiration()),
        headers,
        message_id: text(props.message_id()),
        priority: *props.priority(),
        reply_to: text(props.reply_to()),
        timestamp: *props.timestamp(),
        kind: text(props.kind()),
        user_id: text(props.user_id()),
        ..MessageProperties::default()
    };

    Delivery {
        delivery_tag: delivery.delivery_tag,
        redelivered: delivery.redelivered,
        properties,
        body: delivery.data,
    }
}

/// Header values as the plain text a listener expects: strings verbatim,
/// numbers and booleans in their usual notation, nested tables and arrays as
/// JSON, and `Void` as an empty string.
fn render_value(value: &AMQPValue) -> String {
    match header_json(value) {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn header_json(value: &AMQPValue) -> Value {
    match value {
        AMQPValue::Boolean(b) => Value::Bool(*b),
        AMQPValue::ShortShortInt(n) => Value::from(*n),
        AMQPValue::ShortShortUInt(n) => Value::from(*n),
        AMQPValue::ShortInt(n) => Value::from(*n),
        AMQPValue::ShortUInt(n) => Value::from(*n),
        AMQPValue::LongInt(n) => Value::from(*n),
        AMQPValue::LongUInt(n) => Value::from(*n),
        AMQPValue::LongLongInt(n) => Value::from(*n),
        AMQPValue::Float(f) => Value::from(f64::from(*f)),
        AMQPValue::Double(d) => Value::from(*d),
        AMQPValue::DecimalValue(d) => {
            Value::from(f64::from(d.value) / 10f64.powi(i32::from(d.scale)))
        }
        AMQPValue::ShortString(s) => Value::String(s.as_str().to_string()),
        AMQPValue::LongString(s) => {
            Value::String(String::from_utf8_lossy(s.as_bytes()).into_owned())
        }
        AMQPValue::ByteArray(bytes) => {
            Value::String(String::from_utf8_lossy(bytes.as_slice()).into_owned())
        }
        AMQPValue::Timestamp(t) => Value::from(*t),
        AMQPValue::FieldArray(items) => {
            Value::Array(items.as_slice().iter().map(header_json).collect())
        }
        AMQPValue::FieldTable(table) => Value::Object(
            table
                .inner()
                .iter()
                .map(|(key, value)| (key.as_str().to_string(), header_json(value)))
                .collect(),
        ),
        AMQPValue::Void => Value::Null,
    }
}
