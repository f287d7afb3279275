//! Subscriptions to plain commands, emulated by periodic reads.

use crate::endpoint::CommandAccessor;
use crate::stream::StreamError;
use crate::{Error, MIN_PERIOD};
use erd_format::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Passes a value only when its bytes differ from the previously passed one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    last: Option<Vec<u8>>,
}

impl ChangeFilter {
    /// Returns true and remembers `bytes` when they differ from the last seen value.
    pub fn update(&mut self, bytes: &[u8]) -> bool {
        if self.last.as_deref() == Some(bytes) {
            return false;
        }
        self.last = Some(bytes.to_vec());
        true
    }

    pub fn last(&self) -> Option<&[u8]> {
        self.last.as_deref()
    }
}

/// Background task reading a command every period. Stopped when dropped.
pub struct PollSubscription {
    rx: mpsc::UnboundedReceiver<Result<Value, StreamError>>,
    handle: JoinHandle<()>,
}

impl PollSubscription {
    pub(crate) fn spawn(accessor: CommandAccessor, period: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let command = accessor.descriptor().command;
            let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut filter = ChangeFilter::default();
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = tx.closed() => break,
                }
                let bytes = match accessor.read_raw().await {
                    Ok(bytes) => bytes,
                    Err(Error::EventLoopNotRunning | Error::ExitRequested) => {
                        debug!("poll of {command:#04x} stopped, bus is gone");
                        break;
                    }
                    Err(e) => {
                        debug!("poll of {command:#04x} failed: {e}");
                        continue;
                    }
                };
                if !filter.update(&bytes) {
                    trace!("poll of {command:#04x}: unchanged");
                    continue;
                }
                let value = accessor
                    .descriptor()
                    .format
                    .deserialize(&bytes)
                    .map_err(StreamError::from);
                if tx.send(value).is_err() {
                    break;
                }
            }
        });
        PollSubscription { rx, handle }
    }

    /// Next changed value. [StreamError::Closed] once the poll task stopped.
    pub async fn recv(&mut self) -> Result<Value, StreamError> {
        self.rx.recv().await.ok_or(StreamError::Closed)?
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
