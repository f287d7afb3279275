use crate::bus::Bus;
use crate::timeout::{DEFAULT_TIMEOUT, Timeout};
use crate::transport::Transport;
use crate::{Address, DEFAULT_DISCOVERY_INTERVAL};
use std::time::Duration;
use tokio::sync::mpsc;

/// Local node settings, turned into a running [Bus] by [Configuration::bind].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Configuration {
    pub address: Address,
    /// Sent in reply to VERSION requests. Requests are left unanswered while this is empty.
    pub version: Vec<u8>,
    pub discovery_interval: Duration,
    pub discover_on_bind: bool,
    /// Used by requests made with [Timeout::Default].
    pub timeout: Timeout,
}

impl Configuration {
    pub fn new(address: Address) -> Self {
        Configuration {
            address,
            version: Vec::new(),
            discovery_interval: DEFAULT_DISCOVERY_INTERVAL,
            discover_on_bind: true,
            timeout: Timeout::Default,
        }
    }

    pub fn with_version(mut self, version: impl Into<Vec<u8>>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    /// Do not start discovery on bind, see [Bus::start_discovery] and [Bus::discover_now].
    pub fn without_discovery(mut self) -> Self {
        self.discover_on_bind = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawn the bus event loop on the current tokio runtime.
    pub fn bind(self, transport: impl Transport) -> Bus {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let default_timeout = self.timeout.resolve(Some(DEFAULT_TIMEOUT));
        let bus = Bus::new(cmd_tx, self.address, default_timeout);
        let weak = bus.downgrade();
        let link = transport.into_link();
        tokio::spawn(async move {
            crate::event_loop::bus_worker(cmd_rx, link, self, weak).await;
        });
        bus
    }
}
