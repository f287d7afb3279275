mod common;

use appliance_bus::appliance::{self, erds};
use appliance_bus::{
    Appliance, BROADCAST_ADDRESS, BusEvent, ErdCommand, ErdRequest, Error, Frame, SharedValue,
    TraceEvent,
};
use common::*;
use erd_format::{FormatSpec, Primitive, Value};
use hex_literal::hex;

fn clock(hours: u8, minutes: u8, seconds: u8) -> Value {
    Value::record([
        ("hours", Value::from(hours)),
        ("minutes", Value::from(minutes)),
        ("seconds", Value::from(seconds)),
    ])
}

#[tokio::test]
async fn clock_read_write() {
    let (_medium, host, device) = host_and_device();
    let time = SharedValue::new(clock(13, 5, 0));
    let descriptor = appliance::lookup(erds::CLOCK_TIME).unwrap();
    device.serve(descriptor, time.clone()).unwrap();
    let mut trace = host.trace().unwrap();

    let appliance = Appliance::new(host.endpoint(DEVICE), DEVICE_VERSION.to_vec());
    assert_eq!(appliance.clock_time().await.unwrap(), (13, 5, 0));
    assert_eq!(
        trace.recv().await,
        Some(TraceEvent::Sent(Frame::new(
            HOST,
            DEVICE,
            ErdCommand::Read.code(),
            hex!("01 0005").to_vec()
        )))
    );
    assert_eq!(
        trace.recv().await,
        Some(TraceEvent::Received(Frame::new(
            DEVICE,
            HOST,
            ErdCommand::Read.code(),
            hex!("01 0005 03 0d0500").to_vec()
        )))
    );

    appliance.set_clock_time(8, 30, 15).await.unwrap();
    assert_eq!(time.get(), clock(8, 30, 15));
    assert_eq!(host.read(DEVICE, erds::CLOCK_TIME).await.unwrap(), hex!("08 1e 0f"));
}

#[tokio::test]
async fn model_number() {
    let (_medium, host, device) = host_and_device();
    let model = appliance::lookup(erds::MODEL_NUMBER).unwrap();
    device.serve(model, SharedValue::new("ZWE23ESN")).unwrap();

    let raw = host.read(DEVICE, erds::MODEL_NUMBER).await.unwrap();
    assert_eq!(raw.len(), 32);
    assert_eq!(&raw[..8], b"ZWE23ESN");

    let appliance = Appliance::new(host.endpoint(DEVICE), vec![]);
    assert_eq!(appliance.model_number().await.unwrap(), "ZWE23ESN");
    assert_eq!(
        appliance.serial_number().await,
        Err(Error::NoHandlerResponse {
            erd: erds::SERIAL_NUMBER
        })
    );
    assert!(appliance.erd_named("sound_level").is_some());
    assert!(matches!(
        appliance.known(0x7777),
        Err(Error::UnknownErd(0x7777))
    ));
}

#[tokio::test]
async fn missing_responder() {
    let (_medium, host, _device) = host_and_device();
    assert_eq!(
        host.read(DEVICE, 0x1234).await,
        Err(Error::NoHandlerResponse { erd: 0x1234 })
    );
    assert_eq!(
        host.write(DEVICE, 0x1234, &[1]).await,
        Err(Error::NoHandlerResponse { erd: 0x1234 })
    );
}

#[tokio::test]
async fn read_only_responder() {
    let (_medium, host, device) = host_and_device();
    device
        .serve_erd(0x0100, |request: &ErdRequest| {
            Some(vec![request.source])
        })
        .unwrap();
    assert_eq!(host.read(DEVICE, 0x0100).await.unwrap(), vec![HOST]);
    assert_eq!(
        host.write(DEVICE, 0x0100, &[1]).await,
        Err(Error::NoHandlerResponse { erd: 0x0100 })
    );
}

#[tokio::test]
async fn broadcast_read() {
    let (_medium, host, device) = host_and_device();
    device
        .serve_erd(0x0008, |_: &ErdRequest| Some(vec![0x07]))
        .unwrap();
    let everyone = host.endpoint(BROADCAST_ADDRESS);
    assert_eq!(everyone.read(0x0008).await.unwrap(), vec![0x07]);
}

#[tokio::test]
async fn typed_accessors() {
    let (_medium, host, device) = host_and_device();
    let remote_enable = SharedValue::new(0u8);
    // bound to the host only
    device
        .endpoint(HOST)
        .item(FormatSpec::primitive(Primitive::UInt8))
        .erd(erds::REMOTE_ENABLE, "remote_enable")
        .serve(remote_enable.clone())
        .unwrap();
    let mut events = device.events().unwrap();

    let accessor = host
        .endpoint(DEVICE)
        .item(FormatSpec::primitive(Primitive::UInt8))
        .erd(erds::REMOTE_ENABLE, "remote_enable");
    accessor.write(&Value::from(1u8)).await.unwrap();
    assert_eq!(remote_enable.get(), Value::UInt(1));
    assert_eq!(accessor.read().await.unwrap(), Value::UInt(1));
    assert!(matches!(
        accessor.write(&Value::from(300u16)).await,
        Err(Error::Format(erd_format::Error::ValueOutOfRange { .. }))
    ));

    loop {
        if let Some(BusEvent::Write { source, erd, data, .. }) = events.recv().await {
            assert_eq!((source, erd, data), (HOST, erds::REMOTE_ENABLE, vec![1]));
            break;
        }
    }
}

#[tokio::test]
async fn malformed_frame_dropped() {
    let (medium, host, device) = host_and_device();
    let time = SharedValue::new(clock(13, 5, 0));
    device
        .serve(appliance::lookup(erds::CLOCK_TIME).unwrap(), time)
        .unwrap();
    let mut trace = host.trace().unwrap();
    host.devices().await.unwrap();

    // value length says 3, only 2 bytes follow
    let malformed = Frame::new(
        DEVICE,
        HOST,
        ErdCommand::Read.code(),
        hex!("01 0005 03 0d05").to_vec(),
    );
    medium.inject(malformed.clone());
    assert_eq!(trace.recv().await, Some(TraceEvent::Received(malformed)));

    assert_eq!(
        host.read(DEVICE, erds::CLOCK_TIME).await.unwrap(),
        hex!("0d 05 00")
    );
}
