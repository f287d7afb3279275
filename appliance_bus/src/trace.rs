use crate::Frame;

/// Raw frame level view of the bus, see [Bus::trace](crate::Bus::trace).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    /// Frame handed to the transport
    Sent(Frame),
    /// Frame received from the transport
    Received(Frame),
    Error { reason: String },
}
