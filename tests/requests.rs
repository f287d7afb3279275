mod common;

use appliance_bus::{
    BusEvent, Configuration, Error, Frame, MatchSpec, MemoryBus, Message, Timeout, TraceEvent,
    TransportEvent,
};
use common::*;
use std::time::Duration;

#[tokio::test]
async fn responses_in_reverse_order() {
    init_tracing();
    let medium = MemoryBus::new();
    let host = Configuration::new(HOST)
        .without_discovery()
        .bind(medium.attach());
    let mut raw = medium.attach();

    let first = host.endpoint(0x20);
    let second = host.endpoint(0x21);
    let devices = async {
        let mut requests = Vec::new();
        while requests.len() < 2 {
            if let Some(TransportEvent::Frame(frame)) = raw.rx.recv().await {
                requests.push(frame);
            }
        }
        for request in requests.iter().rev() {
            let reply = request.reply(request.destination, 0x42, vec![request.destination]);
            raw.tx.send(reply).unwrap();
        }
    };
    let (first, second, ()) = tokio::join!(
        first.request(0x42, vec![1]),
        second.request(0x42, vec![2]),
        devices
    );
    assert_eq!(first.unwrap().data, vec![0x20]);
    assert_eq!(second.unwrap().data, vec![0x21]);
}

#[tokio::test]
async fn unrelated_frames_do_not_resolve() {
    let (medium, host, _device) = host_and_device();
    let waiting = host.wait(
        MatchSpec::new().from(0x30).to(HOST).command(0x42),
        Timeout::Millis(1000),
    );
    let injector = async {
        medium.inject(Frame::new(0x31, HOST, 0x42, vec![1]));
        medium.inject(Frame::new(0x30, 0x50, 0x42, vec![2]));
        medium.inject(Frame::new(0x30, HOST, 0x43, vec![3]));
        medium.inject(Frame::new(0x30, HOST, 0x42, vec![4]));
    };
    let (frame, ()) = tokio::join!(waiting, injector);
    assert_eq!(frame.unwrap(), Frame::new(0x30, HOST, 0x42, vec![4]));
}

#[tokio::test(start_paused = true)]
async fn timeout() {
    let (_medium, host, _device) = host_and_device();
    let endpoint = host.endpoint(0x30).with_timeout(Timeout::Millis(50));
    let started = tokio::time::Instant::now();
    let result = endpoint.request(0x42, vec![]).await;
    assert_eq!(result, Err(Error::Timeout));
    assert_eq!(started.elapsed(), Duration::from_millis(50));

    // default timeout comes from the enabled cargo feature
    let started = tokio::time::Instant::now();
    let result = host.endpoint(0x30).read(0x0001).await;
    assert_eq!(result, Err(Error::Timeout));
    assert_eq!(
        Some(started.elapsed()),
        host.default_timeout(),
        "default timeout"
    );
}

#[tokio::test]
async fn shutdown_resolves_outstanding_requests() {
    let (_medium, host, _device) = host_and_device();
    let endpoint = host.endpoint(0x30).with_timeout(Timeout::Never);
    let (result, shutdown) = tokio::join!(endpoint.request(0x42, vec![]), host.shutdown());
    shutdown.unwrap();
    assert_eq!(result, Err(Error::ExitRequested));
    assert!(!host.is_running());
    assert_eq!(
        host.send(Message::new(0x42).to(0x30)),
        Err(Error::EventLoopNotRunning)
    );
}

#[tokio::test]
async fn transport_error_reported() {
    let (medium, host, _device) = host_and_device();
    let mut events = host.events().unwrap();
    let mut trace = host.trace().unwrap();
    // round trip through the event loop, so that both listeners are registered
    host.devices().await.unwrap();

    medium.inject_error("cable unplugged");
    assert!(matches!(
        events.recv().await,
        Some(BusEvent::Error(Error::Transport(reason))) if reason == "cable unplugged"
    ));
    assert_eq!(
        trace.recv().await,
        Some(TraceEvent::Error {
            reason: "cable unplugged".into()
        })
    );

    // bus keeps working
    host.send(Message::new(0x42).to(DEVICE).with_data([1, 2]))
        .unwrap();
    assert_eq!(
        trace.recv().await,
        Some(TraceEvent::Sent(Frame::new(HOST, DEVICE, 0x42, vec![1, 2])))
    );
}

#[tokio::test]
async fn events_filtered_by_endpoint() {
    let (medium, host, _device) = host_and_device();
    let mut events = host.endpoint(0x30).events().unwrap();
    host.devices().await.unwrap();

    medium.inject(Frame::new(0x31, HOST, 0x42, vec![1]));
    medium.inject(Frame::new(0x30, HOST, 0x42, vec![2]));
    let Some(BusEvent::Message(frame)) = events.recv().await else {
        panic!("expected a message");
    };
    assert_eq!(frame.data, vec![2]);
}
