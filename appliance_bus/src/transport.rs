//! Boundary to the physical transport (USB, UDP, serial adapters). Adapters deliver already
//! deframed [Frame]s and accept outgoing ones through a [Link].

use crate::Frame;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Frame),
    /// Adapter specific failure, forwarded to bus listeners
    Error(String),
}

/// Channel pair connecting a bus to a transport adapter.
pub struct Link {
    /// Frames to be put on the wire
    pub tx: mpsc::UnboundedSender<Frame>,
    /// Frames and errors coming from the wire. Closing this channel means the transport is gone.
    pub rx: mpsc::UnboundedReceiver<TransportEvent>,
}

pub trait Transport {
    fn into_link(self) -> Link;
}

impl Transport for Link {
    fn into_link(self) -> Link {
        self
    }
}

impl Link {
    /// Two links wired back to back, without any adapter in between.
    pub fn pair() -> (Link, Link) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let (a_events_tx, a_events_rx) = mpsc::unbounded_channel();
        let (b_events_tx, b_events_rx) = mpsc::unbounded_channel();
        forward(a_rx, b_events_tx);
        forward(b_rx, a_events_tx);
        (
            Link {
                tx: a_tx,
                rx: a_events_rx,
            },
            Link {
                tx: b_tx,
                rx: b_events_rx,
            },
        )
    }
}

fn forward(
    mut frames: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if events.send(TransportEvent::Frame(frame)).is_err() {
                break;
            }
        }
    });
}

struct Port {
    id: usize,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

#[derive(Default)]
struct Ports {
    next_id: usize,
    ports: Vec<Port>,
}

/// In-memory shared medium: a frame sent on one attached link is delivered to every other link.
/// Must be used from within a tokio runtime.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<Ports>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self) -> Link {
        let (tx, mut frames_rx) = mpsc::unbounded_channel::<Frame>();
        let (events_tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.ports.push(Port { id, events_tx });
            id
        };
        debug!("port {id} attached");
        let bus = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = frames_rx.recv().await {
                bus.deliver(Some(id), TransportEvent::Frame(frame));
            }
            trace!("port {id} sender closed");
        });
        Link { tx, rx }
    }

    /// Deliver a frame to every attached link, as if a node outside of this process sent it.
    pub fn inject(&self, frame: Frame) {
        self.deliver(None, TransportEvent::Frame(frame));
    }

    /// Report a transport error to every attached link.
    pub fn inject_error(&self, reason: impl Into<String>) {
        self.deliver(None, TransportEvent::Error(reason.into()));
    }

    pub fn port_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ports
            .len()
    }

    fn deliver(&self, from: Option<usize>, event: TransportEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.ports.retain(|port| {
            if Some(port.id) == from {
                return !port.events_tx.is_closed();
            }
            let keep = port.events_tx.send(event.clone()).is_ok();
            if !keep {
                debug!("port {} detached", port.id);
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_bus_delivers_to_others() {
        let bus = MemoryBus::new();
        let a = bus.attach();
        let mut b = bus.attach();
        let mut c = bus.attach();
        let frame = Frame::new(1, 2, 3, vec![4]);
        a.tx.send(frame.clone()).unwrap();
        assert_eq!(b.rx.recv().await, Some(TransportEvent::Frame(frame.clone())));
        assert_eq!(c.rx.recv().await, Some(TransportEvent::Frame(frame)));

        bus.inject_error("unplugged");
        assert_eq!(
            b.rx.recv().await,
            Some(TransportEvent::Error("unplugged".into()))
        );
        drop(c);
        bus.inject(Frame::new(9, 9, 9, vec![]));
        assert_eq!(bus.port_count(), 2);
    }

    #[tokio::test]
    async fn pair() {
        let (a, mut b) = Link::pair();
        a.tx.send(Frame::new(1, 2, 3, vec![])).unwrap();
        assert_eq!(
            b.rx.recv().await,
            Some(TransportEvent::Frame(Frame::new(1, 2, 3, vec![])))
        );
    }
}
