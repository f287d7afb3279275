use crate::erd::SubscribeEntry;
use crate::{Address, Appliance, BROADCAST_ADDRESS, ErdId, Error, Frame};

/// Everything a bus listener can observe.
#[derive(Clone, Debug)]
pub enum BusEvent {
    /// Every frame received from the transport
    Message(Frame),
    /// Transport error, never fatal to the bus
    Error(Error),
    /// VERSION frame carrying a version payload
    Version {
        source: Address,
        destination: Address,
        version: Vec<u8>,
    },
    /// First version response from a node
    DeviceDiscovered(Appliance),
    Read {
        source: Address,
        destination: Address,
        erd: ErdId,
    },
    ReadResponse {
        source: Address,
        destination: Address,
        erd: ErdId,
        data: Vec<u8>,
    },
    Write {
        source: Address,
        destination: Address,
        erd: ErdId,
        data: Vec<u8>,
    },
    WriteResponse {
        source: Address,
        destination: Address,
        erd: ErdId,
    },
    Subscribe {
        source: Address,
        destination: Address,
        erd: ErdId,
        time: u8,
    },
    Unsubscribe {
        source: Address,
        destination: Address,
        erd: ErdId,
    },
    SubscribeList {
        source: Address,
        destination: Address,
        entries: Vec<SubscribeEntry>,
    },
    Publish {
        source: Address,
        destination: Address,
        erd: ErdId,
        data: Vec<u8>,
    },
}

impl BusEvent {
    /// `(source, destination)` of the frame behind this event, None for transport errors.
    pub fn addressing(&self) -> Option<(Address, Address)> {
        match self {
            BusEvent::Message(frame) => Some((frame.source, frame.destination)),
            BusEvent::Error(_) => None,
            BusEvent::DeviceDiscovered(appliance) => Some((appliance.address(), appliance.local())),
            BusEvent::Version {
                source,
                destination,
                ..
            }
            | BusEvent::Read {
                source,
                destination,
                ..
            }
            | BusEvent::ReadResponse {
                source,
                destination,
                ..
            }
            | BusEvent::Write {
                source,
                destination,
                ..
            }
            | BusEvent::WriteResponse {
                source,
                destination,
                ..
            }
            | BusEvent::Subscribe {
                source,
                destination,
                ..
            }
            | BusEvent::Unsubscribe {
                source,
                destination,
                ..
            }
            | BusEvent::SubscribeList {
                source,
                destination,
                ..
            }
            | BusEvent::Publish {
                source,
                destination,
                ..
            } => Some((*source, *destination)),
        }
    }
}

/// Restricts events to traffic between a local and a remote node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    pair: Option<(Address, Address)>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(local: Address, remote: Address) -> Self {
        EventFilter {
            pair: Some((local, remote)),
        }
    }

    /// Frames from the remote to the local node or to everyone, and from the local to the remote node.
    /// Events without addressing always pass.
    pub fn accepts(&self, event: &BusEvent) -> bool {
        let (Some((local, remote)), Some((source, destination))) = (self.pair, event.addressing())
        else {
            return true;
        };
        (source == remote && (destination == local || destination == BROADCAST_ADDRESS))
            || (source == local && destination == remote)
    }
}
