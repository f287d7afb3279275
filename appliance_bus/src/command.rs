use crate::discovery::DeviceRecord;
use crate::event::{BusEvent, EventFilter};
use crate::responder::ErdResponder;
use crate::trace::TraceEvent;
use crate::waiter::{MatchSpec, ResponseSender};
use crate::{Address, ErdId, Error, Frame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Request waiting for a correlated frame.
pub(crate) struct Wait {
    pub(crate) spec: MatchSpec,
    pub(crate) timeout: Option<Duration>,
    pub(crate) done_tx: ResponseSender,
}

/// Commands for the bus event loop, sent by [Bus](crate::Bus) handles.
pub(crate) enum Command {
    /// Send a frame. The waiter, if any, is registered before the frame leaves, so that a fast
    /// response cannot be missed.
    Send { frame: Frame, wait: Option<Wait> },
    Wait(Wait),
    Listen {
        filter: EventFilter,
        events_tx: mpsc::UnboundedSender<BusEvent>,
    },
    RegisterTracer {
        trace_tx: mpsc::UnboundedSender<TraceEvent>,
    },
    Serve {
        erd: ErdId,
        remote: Option<Address>,
        responder: Arc<dyn ErdResponder>,
    },
    NotifySubscribers {
        erd: ErdId,
        data: Vec<u8>,
        done_tx: oneshot::Sender<Result<usize, Error>>,
    },
    StartDiscovery,
    StopDiscovery,
    DiscoverNow,
    Devices {
        done_tx: oneshot::Sender<Vec<DeviceRecord>>,
    },
    /// Stop the event loop, outstanding waiters resolve with [Error::ExitRequested].
    Exit {
        done_tx: Option<oneshot::Sender<()>>,
    },
}
