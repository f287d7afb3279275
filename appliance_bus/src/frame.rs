use crate::{Address, BROADCAST_ADDRESS};
use std::fmt::{Debug, Formatter};

/// One addressed, command-tagged message exchanged over the bus.
/// Byte framing is done by the transport, layers above only see deframed messages.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub source: Address,
    pub destination: Address,
    pub command: u8,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(source: Address, destination: Address, command: u8, data: Vec<u8>) -> Self {
        Frame {
            source,
            destination,
            command,
            data,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination == BROADCAST_ADDRESS
    }

    /// Whether `address` should act on this frame.
    pub fn is_for(&self, address: Address) -> bool {
        self.destination == address || self.is_broadcast()
    }

    /// Frame sent back to this frame's source.
    pub fn reply(&self, local: Address, command: u8, data: Vec<u8>) -> Frame {
        Frame::new(local, self.source, command, data)
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frame {{ {:#04x} -> {:#04x} cmd: {:#04x} data: [{}] }}",
            self.source,
            self.destination,
            self.command,
            hex::encode(&self.data)
        )
    }
}

/// Partially specified outgoing frame, unset fields are filled in by [Message::complete]
/// with the local address, broadcast destination and empty data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub source: Option<Address>,
    pub destination: Option<Address>,
    pub command: u8,
    pub data: Option<Vec<u8>>,
}

impl Message {
    pub fn new(command: u8) -> Self {
        Message {
            source: None,
            destination: None,
            command,
            data: None,
        }
    }

    pub fn from(mut self, source: Address) -> Self {
        self.source = Some(source);
        self
    }

    pub fn to(mut self, destination: Address) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn complete(self, local: Address) -> Frame {
        Frame {
            source: self.source.unwrap_or(local),
            destination: self.destination.unwrap_or(BROADCAST_ADDRESS),
            command: self.command,
            data: self.data.unwrap_or_default(),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        Message {
            source: Some(frame.source),
            destination: Some(frame.destination),
            command: frame.command,
            data: Some(frame.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let frame = Message::new(0x01).complete(0x10);
        assert_eq!(frame, Frame::new(0x10, BROADCAST_ADDRESS, 0x01, vec![]));
        assert!(frame.is_broadcast());
        assert!(frame.is_for(0x20));

        let frame = Message::new(0xf0)
            .from(0x11)
            .to(0x22)
            .with_data([1, 0, 5])
            .complete(0x10);
        assert_eq!(frame, Frame::new(0x11, 0x22, 0xf0, vec![1, 0, 5]));
        assert!(!frame.is_for(0x10));
    }

    #[test]
    fn explicit_fields_are_kept() {
        let frame = Frame::new(0x11, 0x22, 0xf5, vec![]);
        let message: Message = frame.clone().into();
        assert_eq!(message.complete(0x10), frame);
    }

    #[test]
    fn reply_swaps_direction() {
        let frame = Frame::new(0x20, BROADCAST_ADDRESS, 0x01, vec![]);
        assert_eq!(
            frame.reply(0x10, 0x01, vec![2]),
            Frame::new(0x10, 0x20, 0x01, vec![2])
        );
    }
}
