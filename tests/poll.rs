mod common;

use appliance_bus::{
    CommandDescriptor, Configuration, Frame, Link, MemoryBus, StreamError, TransportEvent,
};
use common::*;
use erd_format::{FormatSpec, Primitive, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const STATUS: u8 = 0x42;

/// Device answering STATUS with whatever `value` holds, reports every answered request.
fn spawn_device(
    mut link: Link,
    value: Arc<Mutex<Vec<u8>>>,
    served: mpsc::UnboundedSender<()>,
) {
    tokio::spawn(async move {
        while let Some(event) = link.rx.recv().await {
            let TransportEvent::Frame(frame) = event else {
                continue;
            };
            if frame.destination != DEVICE || frame.command != STATUS {
                continue;
            }
            let data = value.lock().unwrap().clone();
            link.tx.send(frame.reply(DEVICE, STATUS, data)).unwrap();
            _ = served.send(());
        }
    });
}

#[tokio::test(start_paused = true)]
async fn poll_reports_changes_only() {
    init_tracing();
    let medium = MemoryBus::new();
    let host = Configuration::new(HOST)
        .without_discovery()
        .bind(medium.attach());
    let value = Arc::new(Mutex::new(vec![0x01, 0x02]));
    let (served_tx, mut served) = mpsc::unbounded_channel();
    spawn_device(medium.attach(), value.clone(), served_tx);

    let status = host.endpoint(DEVICE).command(
        CommandDescriptor::new(STATUS, FormatSpec::primitive(Primitive::UInt16)).with_request([0]),
    );
    assert_eq!(status.read().await.unwrap(), Value::UInt(0x0102));
    served.recv().await.unwrap();

    let mut subscription = status.subscribe(Duration::from_millis(100));
    assert_eq!(subscription.recv().await.unwrap(), Value::UInt(0x0102));
    let started = tokio::time::Instant::now();
    // the first poll plus three more, all with the same value
    for _ in 0..4 {
        served.recv().await.unwrap();
    }
    assert_eq!(started.elapsed(), Duration::from_millis(300));
    let unchanged = tokio::time::timeout(Duration::from_millis(1), subscription.recv()).await;
    assert!(unchanged.is_err(), "unexpected {unchanged:?}");

    *value.lock().unwrap() = vec![0x00, 0x07];
    assert_eq!(subscription.recv().await.unwrap(), Value::UInt(7));

    subscription.stop();
    assert_eq!(subscription.recv().await, Err(StreamError::Closed));
}

#[tokio::test(start_paused = true)]
async fn poll_survives_timeouts() {
    init_tracing();
    let medium = MemoryBus::new();
    let host = Configuration::new(HOST)
        .without_discovery()
        .bind(medium.attach());
    let mut raw = medium.attach();

    let status = host
        .endpoint(DEVICE)
        .item(FormatSpec::primitive(Primitive::UInt8))
        .command(STATUS, Vec::new());
    let mut subscription = status.subscribe(Duration::from_secs(1));

    // first request is left unanswered and times out
    let Some(TransportEvent::Frame(first)) = raw.rx.recv().await else {
        panic!("transport closed");
    };
    assert_eq!(first, Frame::new(HOST, DEVICE, STATUS, vec![]));
    let Some(TransportEvent::Frame(second)) = raw.rx.recv().await else {
        panic!("transport closed");
    };
    raw.tx
        .send(second.reply(DEVICE, STATUS, vec![9]))
        .unwrap();
    assert_eq!(subscription.recv().await.unwrap(), Value::UInt(9));
    drop(subscription);
}

#[tokio::test(start_paused = true)]
async fn zero_period_keeps_polling() {
    init_tracing();
    let medium = MemoryBus::new();
    let host = Configuration::new(HOST)
        .without_discovery()
        .bind(medium.attach());
    let value = Arc::new(Mutex::new(vec![3]));
    let (served_tx, mut served) = mpsc::unbounded_channel();
    spawn_device(medium.attach(), value.clone(), served_tx);

    let status = host
        .endpoint(DEVICE)
        .item(FormatSpec::primitive(Primitive::UInt8))
        .command(STATUS, Vec::new());
    let mut subscription = status.subscribe(Duration::ZERO);
    assert_eq!(subscription.recv().await.unwrap(), Value::UInt(3));
    served.recv().await.unwrap();
    served.recv().await.unwrap();
    assert!(!subscription.is_finished());

    *value.lock().unwrap() = vec![4];
    assert_eq!(subscription.recv().await.unwrap(), Value::UInt(4));
}
