//! Receive loop: payloads, metadata, acknowledgements and timeouts.

use std::time::Duration;

use amqp_consume::channel::Delivery;
use amqp_consume::session::READ_RESPONSE_DISABLED;
use amqp_consume::StatusCode;
use serde_json::json;

use crate::support::{config, order_delivery, session};

#[test]
fn reads_and_acknowledges_a_single_delivery() {
    let (channel, mut session) = session(config("q1").with_iterations(1));
    channel.publish("q1", Delivery::new(42, r#"{"x":1}"#));

    let outcome = session.sample();

    assert!(outcome.success);
    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.payload.as_deref(), Some(r#"{"x":1}"#));
    assert_eq!(outcome.message, r#"{"x":1}"#);
    assert_eq!(outcome.metadata.as_ref().unwrap().content, json!({ "x": 1 }));
    assert_eq!(channel.acknowledged(), vec![42]);
    assert_eq!(outcome.received, 1);
    assert_eq!(outcome.acknowledged, 1);
}

#[test]
fn acknowledges_each_delivery_with_its_own_tag() {
    let (channel, mut session) = session(config("q1").with_iterations(3));
    channel.publish_batch(
        "q1",
        vec![Delivery::new(7, "a"), Delivery::new(8, "b"), Delivery::new(9, "c")],
    );

    let outcome = session.sample();

    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.received, 3);
    assert_eq!(channel.calls().next_delivery, 3);
    assert_eq!(channel.acknowledged(), vec![7, 8, 9]);
    // The last delivery's body is reported.
    assert_eq!(outcome.payload.as_deref(), Some("c"));
}

#[test]
fn auto_ack_sends_no_acknowledgements() {
    let (channel, mut session) = session(config("q1").with_auto_ack(true).with_iterations(2));
    channel.publish_batch("q1", vec![Delivery::new(1, "a"), Delivery::new(2, "b")]);

    let outcome = session.sample();

    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.acknowledged, 0);
    assert_eq!(channel.calls().acknowledge, 0);
}

#[test]
fn timeout_mid_call_stops_further_iterations() {
    let (channel, mut session) = session(config("q1").with_iterations(2));
    channel.publish("q1", Delivery::new(1, "only"));

    let outcome = session.sample();

    assert!(!outcome.success);
    assert_eq!(outcome.status, StatusCode::Timeout);
    assert_eq!(outcome.message, "timed out");
    assert_eq!(outcome.received, 1);
    assert_eq!(channel.acknowledged(), vec![1]);
    assert!(outcome.elapsed >= Duration::from_millis(20));
}

#[test]
fn timeout_on_first_iteration_consumes_nothing() {
    let (channel, mut session) = session(config("q1").with_iterations(3));

    let outcome = session.sample();

    assert_eq!(outcome.status, StatusCode::Timeout);
    assert_eq!(outcome.response_code(), "500");
    assert_eq!(channel.calls().next_delivery, 1);
    assert!(outcome.payload.is_none());
}

#[test]
fn timeout_keeps_the_subscription() {
    let (channel, mut session) = session(config("q1"));

    assert_eq!(session.sample().status, StatusCode::Timeout);
    assert!(session.is_subscribed());

    channel.publish("q1", Delivery::new(1, "late"));
    assert_eq!(session.sample().status, StatusCode::Ok);
    assert_eq!(channel.calls().create_consumer, 1);
}

#[test]
fn unread_responses_attach_a_marker() {
    let (channel, mut session) = session(config("q1").with_read_response(false));
    channel.publish("q1", Delivery::new(5, "ignored"));

    let outcome = session.sample();

    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.sampler_data.as_deref(), Some(READ_RESPONSE_DISABLED));
    assert!(outcome.payload.is_none());
    assert!(outcome.metadata.is_none());
    assert_eq!(channel.acknowledged(), vec![5]);
}

#[test]
fn sampler_data_carries_the_metadata_record() {
    let (channel, mut session) = session(config("orders"));
    channel.publish("orders", order_delivery(3, "o-1"));

    let outcome = session.sample();
    let data: serde_json::Value =
        serde_json::from_str(outcome.sampler_data.as_deref().unwrap()).unwrap();

    assert_eq!(data["appId"], json!("order-service"));
    assert_eq!(data["classId"], json!(60));
    assert_eq!(data["content"], json!({ "order": "o-1" }));
    assert_eq!(data["contentEncoding"], json!("utf-8"));
    assert_eq!(data["contentType"], json!("utf-8"));
    assert_eq!(data["deliveryMode"], json!(2));
    assert_eq!(data["headers"], json!({ "x-tenant": "acme" }));
    assert_eq!(data["messageId"], json!("msg-3"));
    assert_eq!(data["userId"], json!(null));
}

#[test]
fn outcomes_carry_the_session_label() {
    let (channel, session) = session(config("q1"));
    let mut session = session.with_label("Consume orders");
    channel.publish("q1", Delivery::new(1, "a"));

    assert_eq!(session.sample().label, "Consume orders");
    assert_eq!(session.label(), "Consume orders");
}

#[test]
fn counts_redelivered_messages() {
    let (channel, mut session) = session(config("q1").with_iterations(3));
    channel.publish_batch(
        "q1",
        vec![
            Delivery::new(1, "a").redelivered(),
            Delivery::new(2, "b"),
            Delivery::new(3, "c").redelivered(),
        ],
    );

    let outcome = session.sample();

    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.received, 3);
    assert_eq!(outcome.redelivered, 2);
}
