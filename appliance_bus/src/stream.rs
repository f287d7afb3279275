use crate::event::BusEvent;
use crate::{Address, ErdId, Error};
use erd_format::{FormatSpec, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Stream closed, because the bus event loop exited")]
    Closed,
    #[error(transparent)]
    Format(#[from] erd_format::Error),
    #[error(transparent)]
    Other(#[from] Error),
}

/// Values published by one remote node for one ERD.
pub struct ErdStream {
    rx: mpsc::UnboundedReceiver<BusEvent>,
    remote: Address,
    erd: ErdId,
}

impl ErdStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<BusEvent>, remote: Address, erd: ErdId) -> Self {
        ErdStream { rx, remote, erd }
    }

    pub fn remote(&self) -> Address {
        self.remote
    }

    pub fn erd(&self) -> ErdId {
        self.erd
    }

    /// Wait for the next published value.
    pub async fn recv(&mut self) -> Result<Vec<u8>, StreamError> {
        loop {
            match self.rx.recv().await.ok_or(StreamError::Closed)? {
                BusEvent::Publish {
                    source, erd, data, ..
                } if source == self.remote && erd == self.erd => return Ok(data),
                _ => {}
            }
        }
    }

    /// Next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        while let Ok(event) = self.rx.try_recv() {
            if let BusEvent::Publish {
                source, erd, data, ..
            } = event
                && source == self.remote
                && erd == self.erd
            {
                return Some(data);
            }
        }
        None
    }
}

/// [ErdStream] with values deserialized through a format.
pub struct TypedErdStream {
    inner: ErdStream,
    format: Arc<FormatSpec>,
}

impl TypedErdStream {
    pub(crate) fn new(inner: ErdStream, format: Arc<FormatSpec>) -> Self {
        TypedErdStream { inner, format }
    }

    pub fn erd(&self) -> ErdId {
        self.inner.erd
    }

    /// Undecodable values are returned as errors, the stream stays usable.
    pub async fn recv(&mut self) -> Result<Value, StreamError> {
        let bytes = self.inner.recv().await?;
        Ok(self.format.deserialize(&bytes)?)
    }

    pub fn into_raw(self) -> ErdStream {
        self.inner
    }
}
