//! A received message and its property bag.

use std::collections::BTreeMap;

/// Class id of the AMQP `basic` class, reported by every content header.
pub const BASIC_CLASS_ID: u16 = 60;

/// One message received from a queue.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    /// Opaque acknowledgement token.
    pub delivery_tag: u64,
    /// Raw message body.
    pub body: Vec<u8>,
    /// Content header properties.
    pub properties: MessageProperties,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
}

impl Delivery {
    /// Create a delivery with default properties.
    pub fn new(delivery_tag: u64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_tag,
            body: body.into(),
            properties: MessageProperties::default(),
            redelivered: false,
        }
    }

    /// Replace the property bag.
    pub fn with_properties(mut self, properties: MessageProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Mark the delivery as redelivered.
    pub fn redelivered(mut self) -> Self {
        self.redelivered = true;
        self
    }

    /// Body decoded as text, replacing invalid UTF-8.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// AMQP `basic` content header properties.
///
/// Header values arrive already stringified; channels are responsible for
/// rendering table values.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageProperties {
    pub app_id: Option<String>,
    pub class_id: u16,
    pub cluster_id: Option<String>,
    pub content_encoding: Option<String>,
    pub content_type: Option<String>,
    pub correlation_id: Option<String>,
    pub delivery_mode: Option<u8>,
    pub expiration: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub message_id: Option<String>,
    pub priority: Option<u8>,
    pub reply_to: Option<String>,
    /// Seconds since the Unix epoch.
    pub timestamp: Option<u64>,
    /// Application message type (`type` on the wire).
    pub kind: Option<String>,
    pub user_id: Option<String>,
}

impl Default for MessageProperties {
    fn default() -> Self {
        Self {
            app_id: None,
            class_id: BASIC_CLASS_ID,
            cluster_id: None,
            content_encoding: None,
            content_type: None,
            correlation_id: None,
            delivery_mode: None,
            expiration: None,
            headers: BTreeMap::new(),
            message_id: None,
            priority: None,
            reply_to: None,
            timestamp: None,
            kind: None,
            user_id: None,
        }
    }
}

impl MessageProperties {
    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }
}
