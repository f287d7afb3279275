#![allow(dead_code)]

use appliance_bus::{Address, Bus, Configuration, MemoryBus};
use tracing_subscriber::EnvFilter;

pub const HOST: Address = 0xC0;
pub const DEVICE: Address = 0x20;
pub const DEVICE_VERSION: [u8; 4] = [0x00, 0x01, 0x02, 0x03];

pub fn init_tracing() {
    _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Host and device nodes on a shared in-memory medium, discovery disabled on both.
pub fn host_and_device() -> (MemoryBus, Bus, Bus) {
    init_tracing();
    let medium = MemoryBus::new();
    let device = Configuration::new(DEVICE)
        .with_version(DEVICE_VERSION)
        .without_discovery()
        .bind(medium.attach());
    let host = Configuration::new(HOST)
        .without_discovery()
        .bind(medium.attach());
    (medium, host, device)
}
