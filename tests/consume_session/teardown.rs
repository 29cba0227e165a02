//! Teardown: purge and cancel, both best-effort.

use amqp_consume::channel::{ChannelError, Delivery, Operation};

use crate::support::{config, session};

#[test]
fn cancels_the_active_consumer() {
    let (channel, mut session) = session(config("q1"));
    session.ensure_subscribed().unwrap();
    let tag = session.consumer_tag().unwrap().to_string();

    session.teardown();

    assert_eq!(channel.cancelled(), vec![tag]);
    assert!(channel.active_tags().is_empty());
    assert!(!session.is_subscribed());
    assert_eq!(channel.calls().purge_queue, 0);
}

#[test]
fn purges_when_configured() {
    let (channel, mut session) = session(config("q1").with_purge_on_end(true));
    channel.publish_batch("q1", vec![Delivery::new(1, "a"), Delivery::new(2, "b")]);

    session.teardown();

    assert_eq!(channel.purged(), vec!["q1".to_string()]);
    assert_eq!(channel.queue_len("q1"), 0);
    // Never subscribed, so nothing to cancel.
    assert_eq!(channel.calls().cancel_consumer, 0);
}

#[test]
fn purge_happens_even_if_cancel_fails() {
    let (channel, mut session) = session(config("q1").with_purge_on_end(true));
    session.ensure_subscribed().unwrap();
    channel.fail_next(Operation::CancelConsumer, ChannelError::Shutdown("gone".into()));

    session.teardown();

    assert_eq!(channel.calls().purge_queue, 1);
    assert_eq!(channel.calls().cancel_consumer, 1);
    assert!(!session.is_subscribed());
}

#[test]
fn cancel_happens_even_if_purge_fails() {
    let (channel, mut session) = session(config("q1").with_purge_on_end(true));
    session.ensure_subscribed().unwrap();
    let tag = session.consumer_tag().unwrap().to_string();
    channel.fail_next(Operation::PurgeQueue, ChannelError::other("access refused"));

    session.teardown();

    assert_eq!(channel.calls().purge_queue, 1);
    assert_eq!(channel.cancelled(), vec![tag]);
}

#[test]
fn teardown_is_repeatable() {
    let (channel, mut session) = session(config("q1"));
    session.ensure_subscribed().unwrap();

    session.teardown();
    session.teardown();

    assert_eq!(channel.calls().cancel_consumer, 1);
}

#[test]
fn session_resubscribes_after_teardown() {
    let (channel, mut session) = session(config("q1"));
    session.ensure_subscribed().unwrap();
    session.teardown();

    channel.publish("q1", Delivery::new(1, "a"));
    assert!(session.sample().success);
    assert_eq!(channel.calls().register_consumer, 2);
    assert_eq!(channel.calls().apply_prefetch, 1);
}
