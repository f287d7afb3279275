use crate::{Address, COMMAND_VERSION, Frame, MIN_PERIOD};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace};

/// A node that answered the version handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRecord {
    pub address: Address,
    pub version: Vec<u8>,
}

pub(crate) enum VersionAction {
    /// Empty VERSION request, reply with the local version
    Reply(Frame),
    Discovered(DeviceRecord),
    AlreadyKnown,
    Ignore,
}

/// Periodic VERSION broadcast and the address -> device registry it fills.
/// Entries are only ever added.
pub(crate) struct Discovery {
    local: Address,
    version: Vec<u8>,
    period: Duration,
    interval: Option<Interval>,
    registry: BTreeMap<Address, DeviceRecord>,
}

impl Discovery {
    pub(crate) fn new(local: Address, version: Vec<u8>, period: Duration) -> Self {
        Discovery {
            local,
            version,
            period: period.max(MIN_PERIOD),
            interval: None,
            registry: BTreeMap::new(),
        }
    }

    /// First tick fires immediately. Does nothing if already running.
    pub(crate) fn start(&mut self) {
        if self.is_running() {
            return;
        }
        info!("discovery started, every {:?}", self.period);
        let mut interval = tokio::time::interval_at(Instant::now(), self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub(crate) fn stop(&mut self) {
        if self.interval.take().is_some() {
            info!("discovery stopped");
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolves on the next discovery round, never while stopped.
    pub(crate) async fn tick(&mut self) {
        match &mut self.interval {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    pub(crate) fn request(&self) -> Frame {
        Frame::new(
            self.local,
            crate::BROADCAST_ADDRESS,
            COMMAND_VERSION,
            Vec::new(),
        )
    }

    pub(crate) fn on_version(&mut self, frame: &Frame) -> VersionAction {
        if frame.command != COMMAND_VERSION || frame.source == self.local {
            return VersionAction::Ignore;
        }
        if frame.data.is_empty() {
            // an empty version would be read as another request
            if !frame.is_for(self.local) || self.version.is_empty() {
                return VersionAction::Ignore;
            }
            trace!("version requested by {:#04x}", frame.source);
            return VersionAction::Reply(frame.reply(
                self.local,
                COMMAND_VERSION,
                self.version.clone(),
            ));
        }
        if self.registry.contains_key(&frame.source) {
            return VersionAction::AlreadyKnown;
        }
        let record = DeviceRecord {
            address: frame.source,
            version: frame.data.clone(),
        };
        debug!(
            "discovered {:#04x} version [{}]",
            record.address,
            hex::encode(&record.version)
        );
        self.registry.insert(frame.source, record.clone());
        VersionAction::Discovered(record)
    }

    pub(crate) fn devices(&self) -> Vec<DeviceRecord> {
        self.registry.values().cloned().collect()
    }
}
