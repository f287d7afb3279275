mod common;

use appliance_bus::{
    BROADCAST_ADDRESS, BusEvent, COMMAND_VERSION, Configuration, DeviceRecord, Frame, MemoryBus,
    TransportEvent,
};
use common::*;
use std::time::Duration;

#[tokio::test]
async fn device_discovered_once() {
    init_tracing();
    let medium = MemoryBus::new();
    let _device = Configuration::new(DEVICE)
        .with_version(DEVICE_VERSION)
        .without_discovery()
        .bind(medium.attach());
    // discovery starts on bind, first VERSION broadcast goes out right away
    let host = Configuration::new(HOST).bind(medium.attach());
    let mut events = host.events().unwrap();

    let appliance = loop {
        if let BusEvent::DeviceDiscovered(appliance) = events.recv().await.unwrap() {
            break appliance;
        }
    };
    assert_eq!(appliance.address(), DEVICE);
    assert_eq!(appliance.version(), &DEVICE_VERSION);
    assert_eq!(appliance.local(), HOST);

    host.discover_now().unwrap();
    loop {
        match events.recv().await.unwrap() {
            BusEvent::Version {
                source, version, ..
            } if source == DEVICE => {
                assert_eq!(version, DEVICE_VERSION);
                break;
            }
            BusEvent::DeviceDiscovered(appliance) => {
                panic!("{appliance:?} announced twice")
            }
            _ => {}
        }
    }

    assert_eq!(
        host.devices().await.unwrap(),
        vec![DeviceRecord {
            address: DEVICE,
            version: DEVICE_VERSION.to_vec()
        }]
    );
    assert_eq!(host.appliances().await.unwrap().len(), 1);
    assert!(host.appliance(DEVICE).await.unwrap().is_some());
    assert!(host.appliance(0x21).await.unwrap().is_none());
}

#[tokio::test]
async fn version_request_answered() {
    let (medium, _host, _device) = host_and_device();
    let mut raw = medium.attach();
    raw.tx
        .send(Frame::new(0x30, BROADCAST_ADDRESS, COMMAND_VERSION, vec![]))
        .unwrap();
    let Some(TransportEvent::Frame(reply)) = raw.rx.recv().await else {
        panic!("transport closed");
    };
    assert_eq!(
        reply,
        Frame::new(DEVICE, 0x30, COMMAND_VERSION, DEVICE_VERSION.to_vec())
    );

    // host has no version configured and stays silent
    let next = tokio::time::timeout(Duration::from_millis(100), raw.rx.recv()).await;
    assert!(next.is_err(), "unexpected {next:?}");
}

#[tokio::test]
async fn empty_version_response_is_not_a_device() {
    let (medium, host, _device) = host_and_device();
    let mut events = host.events().unwrap();
    medium.inject(Frame::new(0x30, HOST, COMMAND_VERSION, vec![]));
    medium.inject(Frame::new(0x31, HOST, COMMAND_VERSION, vec![7]));
    loop {
        match events.recv().await.unwrap() {
            BusEvent::DeviceDiscovered(appliance) => {
                assert_eq!(appliance.address(), 0x31);
                break;
            }
            BusEvent::Version { source, .. } => assert_eq!(source, 0x31),
            _ => {}
        }
    }
    let devices = host.devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].address, 0x31);
}

#[tokio::test(start_paused = true)]
async fn periodic_discovery() {
    init_tracing();
    let medium = MemoryBus::new();
    let mut raw = medium.attach();
    let host = Configuration::new(HOST)
        .with_discovery_interval(Duration::from_secs(10))
        .bind(medium.attach());

    let started = tokio::time::Instant::now();
    for round in 0..3 {
        let Some(TransportEvent::Frame(frame)) = raw.rx.recv().await else {
            panic!("transport closed");
        };
        assert_eq!(
            frame,
            Frame::new(HOST, BROADCAST_ADDRESS, COMMAND_VERSION, vec![])
        );
        assert_eq!(started.elapsed(), Duration::from_secs(10 * round));
    }

    host.stop_discovery().unwrap();
    let next = tokio::time::timeout(Duration::from_secs(60), raw.rx.recv()).await;
    assert!(next.is_err());
}

#[tokio::test]
async fn zero_discovery_interval() {
    init_tracing();
    let medium = MemoryBus::new();
    let _device = Configuration::new(DEVICE)
        .with_version(DEVICE_VERSION)
        .without_discovery()
        .bind(medium.attach());
    let host = Configuration::new(HOST)
        .with_discovery_interval(Duration::ZERO)
        .bind(medium.attach());
    let mut events = host.events().unwrap();
    loop {
        if let BusEvent::DeviceDiscovered(appliance) = events.recv().await.unwrap() {
            assert_eq!(appliance.address(), DEVICE);
            break;
        }
    }
    assert!(host.is_running());
    assert_eq!(host.devices().await.unwrap().len(), 1);
}
