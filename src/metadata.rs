//! Structured record of a delivery's properties.
//!
//! The record is attached to each sample as descriptive data. Every key is
//! always present (absent properties render as `null`) and keys keep a fixed
//! order.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::channel::Delivery;

/// Metadata captured from one delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub app_id: Option<String>,
    pub class_id: u16,
    pub cluster_id: Option<String>,
    pub content: Value,
    pub content_encoding: Option<String>,
    /// Mirrors `content_encoding`; see DESIGN.md.
    pub content_type: Option<String>,
    pub correlation_id: Option<String>,
    pub delivery_mode: Option<u8>,
    pub expiration: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub message_id: Option<String>,
    pub priority: Option<u8>,
    pub reply_to: Option<String>,
    pub timestamp: Option<u64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub user_id: Option<String>,
}

impl MetadataRecord {
    /// Build the record for a delivery whose body decoded to `body`.
    pub fn from_delivery(delivery: &Delivery, body: &str) -> Self {
        let props = &delivery.properties;
        Self {
            app_id: props.app_id.clone(),
            class_id: props.class_id,
            cluster_id: props.cluster_id.clone(),
            content: parse_content(body),
            content_encoding: props.content_encoding.clone(),
            content_type: props.content_encoding.clone(),
            correlation_id: props.correlation_id.clone(),
            delivery_mode: props.delivery_mode,
            expiration: props.expiration.clone(),
            headers: props.headers.clone(),
            message_id: props.message_id.clone(),
            priority: props.priority,
            reply_to: props.reply_to.clone(),
            timestamp: props.timestamp,
            kind: props.kind.clone(),
            user_id: props.user_id.clone(),
        }
    }

    /// Compact JSON rendering.
    pub fn to_json(&self) -> String {
        // Every field is a string, number, map or JSON value, so this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The record as a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Structured bodies (JSON objects and arrays) are embedded as-is; anything
/// else is kept as the raw string.
fn parse_content(body: &str) -> Value {
    match serde_json::from_str::<Value>(body) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::String(body.to_string()),
    }
}
