use crate::appliance::Appliance;
use crate::command::{Command, Wait};
use crate::discovery::DeviceRecord;
use crate::endpoint::{Endpoint, ErdDescriptor};
use crate::event::{BusEvent, EventFilter};
use crate::frame::{Frame, Message};
use crate::responder::{ErdHandler, ErdResponder, FormatResponder};
use crate::stream::ErdStream;
use crate::timeout::Timeout;
use crate::trace::TraceEvent;
use crate::waiter::MatchSpec;
use crate::{Address, BROADCAST_ADDRESS, ErdId, Error};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Handle to a running bus event loop. Cheap to clone, all clones talk to the same event loop,
/// which exits once every handle is dropped or [Bus::shutdown] is called.
#[derive(Clone, Debug)]
pub struct Bus {
    cmd_tx: mpsc::UnboundedSender<Command>,
    address: Address,
    default_timeout: Option<Duration>,
}

/// Handle that does not keep the event loop alive.
#[derive(Clone)]
pub struct WeakBus {
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
    address: Address,
    default_timeout: Option<Duration>,
}

impl WeakBus {
    pub fn upgrade(&self) -> Option<Bus> {
        Some(Bus {
            cmd_tx: self.cmd_tx.upgrade()?,
            address: self.address,
            default_timeout: self.default_timeout,
        })
    }
}

impl Bus {
    pub(crate) fn new(
        cmd_tx: mpsc::UnboundedSender<Command>,
        address: Address,
        default_timeout: Option<Duration>,
    ) -> Self {
        Bus {
            cmd_tx,
            address,
            default_timeout,
        }
    }

    pub fn downgrade(&self) -> WeakBus {
        WeakBus {
            cmd_tx: self.cmd_tx.downgrade(),
            address: self.address,
            default_timeout: self.default_timeout,
        }
    }

    /// Local node address.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    pub(crate) fn command(&self, command: Command) -> Result<(), Error> {
        self.cmd_tx
            .send(command)
            .map_err(|_| Error::EventLoopNotRunning)
    }

    /// Send a frame, filling in local address as source, broadcast as destination and empty data
    /// when those are not set.
    pub fn send(&self, message: impl Into<Message>) -> Result<(), Error> {
        let frame = message.into().complete(self.address);
        self.command(Command::Send { frame, wait: None })
    }

    /// Send a frame and wait for the first received frame matching `spec`.
    pub async fn send_and_wait(
        &self,
        message: impl Into<Message>,
        spec: MatchSpec,
        timeout: Timeout,
    ) -> Result<Frame, Error> {
        let frame = message.into().complete(self.address);
        let (done_tx, done_rx) = oneshot::channel();
        let wait = Wait {
            spec,
            timeout: timeout.resolve(self.default_timeout),
            done_tx,
        };
        self.command(Command::Send {
            frame,
            wait: Some(wait),
        })?;
        done_rx.await.map_err(|_| Error::EventLoopNotRunning)?
    }

    /// Send a frame and wait for a frame with the same command coming back from its destination.
    /// Responses to broadcast requests may come from any node.
    pub async fn request(&self, message: impl Into<Message>, timeout: Timeout) -> Result<Frame, Error> {
        let frame = message.into().complete(self.address);
        let mut spec = MatchSpec::new()
            .to(frame.source)
            .command(frame.command);
        if frame.destination != BROADCAST_ADDRESS {
            spec = spec.from(frame.destination);
        }
        self.send_and_wait(frame, spec, timeout).await
    }

    /// Wait for the first received frame matching `spec`, without sending anything.
    pub async fn wait(&self, spec: MatchSpec, timeout: Timeout) -> Result<Frame, Error> {
        let (done_tx, done_rx) = oneshot::channel();
        self.command(Command::Wait(Wait {
            spec,
            timeout: timeout.resolve(self.default_timeout),
            done_tx,
        }))?;
        done_rx.await.map_err(|_| Error::EventLoopNotRunning)?
    }

    /// Every event observed from now on.
    pub fn events(&self) -> Result<mpsc::UnboundedReceiver<BusEvent>, Error> {
        self.events_filtered(EventFilter::all())
    }

    pub fn events_filtered(
        &self,
        filter: EventFilter,
    ) -> Result<mpsc::UnboundedReceiver<BusEvent>, Error> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.command(Command::Listen { filter, events_tx })?;
        Ok(events_rx)
    }

    /// Raw frames in both directions and transport errors.
    pub fn trace(&self) -> Result<mpsc::UnboundedReceiver<TraceEvent>, Error> {
        let (trace_tx, trace_rx) = mpsc::unbounded_channel();
        self.command(Command::RegisterTracer { trace_tx })?;
        Ok(trace_rx)
    }

    pub fn endpoint(&self, remote: Address) -> Endpoint {
        Endpoint::new(self.clone(), remote)
    }

    /// Discovered devices, in address order.
    pub async fn devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        let (done_tx, done_rx) = oneshot::channel();
        self.command(Command::Devices { done_tx })?;
        done_rx.await.map_err(|_| Error::EventLoopNotRunning)
    }

    pub async fn appliances(&self) -> Result<Vec<Appliance>, Error> {
        Ok(self
            .devices()
            .await?
            .into_iter()
            .map(|record| self.appliance_from(record))
            .collect())
    }

    pub async fn appliance(&self, address: Address) -> Result<Option<Appliance>, Error> {
        Ok(self
            .devices()
            .await?
            .into_iter()
            .find(|record| record.address == address)
            .map(|record| self.appliance_from(record)))
    }

    fn appliance_from(&self, record: DeviceRecord) -> Appliance {
        Appliance::new(self.endpoint(record.address), record.version)
    }

    /// Answer READ / WRITE requests for `erd` from any node.
    pub fn serve_erd(&self, erd: ErdId, responder: impl ErdResponder + 'static) -> Result<(), Error> {
        self.command(Command::Serve {
            erd,
            remote: None,
            responder: Arc::new(responder),
        })
    }

    /// Typed variant of [Bus::serve_erd].
    pub fn serve(
        &self,
        descriptor: &ErdDescriptor,
        handler: impl ErdHandler + 'static,
    ) -> Result<(), Error> {
        self.serve_erd(
            descriptor.id,
            FormatResponder::new(descriptor.format.clone(), handler),
        )
    }

    pub(crate) fn serve_for(
        &self,
        erd: ErdId,
        remote: Address,
        responder: Arc<dyn ErdResponder>,
    ) -> Result<(), Error> {
        self.command(Command::Serve {
            erd,
            remote: Some(remote),
            responder,
        })
    }

    /// Publish `data` to every node subscribed to `erd`, returns the number of subscribers.
    pub async fn notify_subscribers(&self, erd: ErdId, data: impl Into<Vec<u8>>) -> Result<usize, Error> {
        let (done_tx, done_rx) = oneshot::channel();
        self.command(Command::NotifySubscribers {
            erd,
            data: data.into(),
            done_tx,
        })?;
        done_rx.await.map_err(|_| Error::EventLoopNotRunning)?
    }

    pub fn start_discovery(&self) -> Result<(), Error> {
        self.command(Command::StartDiscovery)
    }

    pub fn stop_discovery(&self) -> Result<(), Error> {
        self.command(Command::StopDiscovery)
    }

    /// One VERSION broadcast, regardless of the discovery schedule.
    pub fn discover_now(&self) -> Result<(), Error> {
        self.command(Command::DiscoverNow)
    }

    pub async fn read(&self, remote: Address, erd: ErdId) -> Result<Vec<u8>, Error> {
        self.endpoint(remote).read(erd).await
    }

    pub async fn write(&self, remote: Address, erd: ErdId, data: &[u8]) -> Result<(), Error> {
        self.endpoint(remote).write(erd, data).await
    }

    pub async fn subscribe(&self, remote: Address, erd: ErdId) -> Result<ErdStream, Error> {
        self.endpoint(remote).subscribe(erd).await
    }

    pub fn publish(&self, remote: Address, erd: ErdId, data: &[u8]) -> Result<(), Error> {
        self.endpoint(remote).publish(erd, data)
    }

    /// Stop the event loop. Outstanding requests resolve with [Error::ExitRequested].
    pub async fn shutdown(&self) -> Result<(), Error> {
        let (done_tx, done_rx) = oneshot::channel();
        self.command(Command::Exit {
            done_tx: Some(done_tx),
        })?;
        done_rx.await.map_err(|_| Error::EventLoopNotRunning)
    }
}
