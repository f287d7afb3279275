//! Host and device side of the appliance bus: addressed frames, ERD (Embedded Resource Data)
//! read / write / subscribe / publish, version based discovery and typed per-device endpoints.
//!
//! All state lives in one event loop task per [Bus], started by [Configuration::bind].

pub mod appliance;
mod bus;
mod command;
mod config;
mod discovery;
pub mod endpoint;
pub mod erd;
mod erd_layer;
mod event;
mod event_loop;
pub mod frame;
mod poll;
pub mod responder;
pub mod stream;
pub mod timeout;
pub mod trace;
pub mod transport;
mod waiter;

pub use appliance::Appliance;
pub use bus::{Bus, WeakBus};
pub use config::Configuration;
pub use discovery::DeviceRecord;
pub use endpoint::{
    CommandAccessor, CommandDescriptor, Endpoint, ErdAccessor, ErdDescriptor, Item,
};
pub use erd::{ErdCommand, ErdEntry, ErdMessage, SubscribeEntry};
pub use erd_format;
pub use event::{BusEvent, EventFilter};
pub use frame::{Frame, Message};
pub use poll::{ChangeFilter, PollSubscription};
pub use responder::{ErdHandler, ErdRequest, ErdResponder, SharedValue};
pub use stream::{ErdStream, StreamError, TypedErdStream};
pub use timeout::Timeout;
pub use trace::TraceEvent;
pub use transport::{Link, MemoryBus, Transport, TransportEvent};
pub use waiter::MatchSpec;

use std::time::Duration;

/// 8-bit node address on the bus.
pub type Address = u8;
/// ERD identifier.
pub type ErdId = u16;

pub const BROADCAST_ADDRESS: Address = 0xFF;
/// Version handshake command, used for discovery.
pub const COMMAND_VERSION: u8 = 0x01;
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(60);
/// Shorter discovery and poll periods are raised to this.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Called a method that required event loop to be running")]
    EventLoopNotRunning,
    #[error("Timeout")]
    Timeout,
    #[error("Malformed frame with command {command:#04x}: {reason}")]
    MalformedFrame { command: u8, reason: String },
    #[error("Remote device has no value for ERD {erd:#06x}")]
    NoHandlerResponse { erd: ErdId },
    #[error("Value of {0} bytes does not fit into an ERD entry")]
    ValueTooLong(usize),
    #[error("ERD {0:#06x} is not in the appliance catalogue")]
    UnknownErd(ErdId),
    #[error(transparent)]
    Format(#[from] erd_format::Error),
    #[error("Transport specific error: {}", .0)]
    Transport(String),
    #[error("Exit command received")]
    ExitRequested,
    #[error("Unexpected response: {}", .0)]
    UnexpectedResponse(String),
}
