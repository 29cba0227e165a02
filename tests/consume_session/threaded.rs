//! Cross-thread behaviour: producers publishing while a session waits, and
//! interrupting an in-flight wait.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use amqp_consume::channel::{Delivery, InMemoryChannel};
use amqp_consume::{ConsumeSession, ConsumerConfig, StatusCode};

use crate::support::init_tracing;

#[test]
fn receives_deliveries_published_while_waiting() {
    init_tracing();
    let channel = InMemoryChannel::new();
    let mut session = ConsumeSession::new(
        channel.clone(),
        ConsumerConfig::new("q1").with_receive_timeout_ms(2_000),
    );

    let producer = {
        let channel = channel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            channel.publish("q1", Delivery::new(11, "late arrival"));
        })
    };

    let outcome = session.sample();
    producer.join().unwrap();

    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.payload.as_deref(), Some("late arrival"));
    assert_eq!(channel.acknowledged(), vec![11]);
}

#[test]
fn interrupt_stops_an_in_flight_wait() {
    init_tracing();
    let channel = InMemoryChannel::new();
    let mut session = ConsumeSession::new(
        channel.clone(),
        ConsumerConfig::new("q1")
            .with_receive_timeout_ms(10_000)
            .with_purge_on_end(true),
    );
    let interrupter = session.interrupter();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        interrupter.trigger();
    });

    let started = Instant::now();
    let outcome = session.sample();
    stopper.join().unwrap();

    assert_eq!(outcome.status, StatusCode::Interrupted);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(outcome.elapsed >= Duration::from_millis(20));
    assert!(!session.is_subscribed());
    // No teardown hook for caller-driven stops.
    assert_eq!(channel.calls().purge_queue, 0);
}

#[test]
fn sessions_on_separate_threads_share_one_channel() {
    init_tracing();
    let channel = Arc::new(InMemoryChannel::new());
    for tag in 1..=4 {
        channel.publish("q1", Delivery::new(tag, format!("m{}", tag)));
    }

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let mut session = ConsumeSession::new(
                    channel,
                    ConsumerConfig::new("q1")
                        .with_iterations(2)
                        .with_receive_timeout_ms(500),
                );
                let outcome = session.sample();
                session.teardown();
                outcome
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap().status, StatusCode::Ok);
    }

    let mut acked = channel.acknowledged();
    acked.sort_unstable();
    assert_eq!(acked, vec![1, 2, 3, 4]);
    assert_eq!(channel.cancelled().len(), 2);
}
