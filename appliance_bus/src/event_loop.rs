use crate::appliance::Appliance;
use crate::bus::WeakBus;
use crate::command::{Command, Wait};
use crate::discovery::{Discovery, VersionAction};
use crate::erd::ErdMessage;
use crate::erd_layer::ErdLayer;
use crate::event::{BusEvent, EventFilter};
use crate::trace::TraceEvent;
use crate::transport::{Link, TransportEvent};
use crate::waiter::Waiters;
use crate::{Address, Configuration, Error, Frame};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, trace, warn};

const IDLE_TIMER_DURATION: Duration = Duration::from_secs(1);

struct BusState {
    address: Address,
    link_tx: mpsc::UnboundedSender<Frame>,
    waiters: Waiters,
    erd: ErdLayer,
    discovery: Discovery,
    listeners: Vec<(EventFilter, mpsc::UnboundedSender<BusEvent>)>,
    tracers: Vec<mpsc::UnboundedSender<TraceEvent>>,
    bus: WeakBus,
}

pub(crate) async fn bus_worker(
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    link: Link,
    config: Configuration,
    bus: WeakBus,
) {
    info!("bus worker started at {:#04x}", config.address);
    let Link { tx, rx } = link;
    let mut link_rx = Some(rx);
    let mut state = BusState {
        address: config.address,
        link_tx: tx,
        waiters: Waiters::default(),
        erd: ErdLayer::new(config.address),
        discovery: Discovery::new(config.address, config.version, config.discovery_interval),
        listeners: Vec::new(),
        tracers: Vec::new(),
        bus,
    };
    if config.discover_on_bind {
        state.discovery.start();
    }

    loop {
        let next_deadline = state.waiters.prune(Instant::now());
        let timer = sleep_until(next_deadline.unwrap_or_else(|| Instant::now() + IDLE_TIMER_DURATION));
        tokio::select! {
            // commands first: a responder or listener registered before a frame arrives must see it
            biased;
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("bus worker exiting, because all command senders were dropped");
                    break;
                };
                if state.handle_cmd(cmd).is_break() {
                    break;
                }
            }
            event = next_event(&mut link_rx) => {
                match event {
                    Some(TransportEvent::Frame(frame)) => state.on_frame(frame),
                    Some(TransportEvent::Error(reason)) => state.on_transport_error(reason),
                    None => {
                        link_rx = None;
                        state.on_transport_error("transport closed".into());
                    }
                }
            }
            _ = state.discovery.tick() => {
                trace!("discovery round");
                let request = state.discovery.request();
                state.transmit(request);
            }
            _ = timer => {}
        }
    }
    if state.waiters.len() > 0 {
        debug!("canceling {} outstanding waiters", state.waiters.len());
    }
    state.waiters.cancel_all(Error::ExitRequested);
    debug!("bus worker exited");
}

async fn next_event(
    rx: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl BusState {
    fn handle_cmd(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::Send { frame, wait } => {
                if let Some(wait) = wait {
                    self.register(wait);
                }
                self.transmit(frame);
            }
            Command::Wait(wait) => self.register(wait),
            Command::Listen { filter, events_tx } => {
                trace!("new listener {filter:?}");
                self.listeners.push((filter, events_tx));
            }
            Command::RegisterTracer { trace_tx } => {
                self.tracers.push(trace_tx);
            }
            Command::Serve {
                erd,
                remote,
                responder,
            } => self.erd.serve(erd, remote, responder),
            Command::NotifySubscribers { erd, data, done_tx } => {
                let result = self.erd.notify(erd, &data).map(|frames| {
                    let count = frames.len();
                    for frame in frames {
                        self.transmit(frame);
                    }
                    count
                });
                _ = done_tx.send(result);
            }
            Command::StartDiscovery => self.discovery.start(),
            Command::StopDiscovery => self.discovery.stop(),
            Command::DiscoverNow => {
                let request = self.discovery.request();
                self.transmit(request);
            }
            Command::Devices { done_tx } => {
                _ = done_tx.send(self.discovery.devices());
            }
            Command::Exit { done_tx } => {
                info!("exiting bus worker on user request");
                self.waiters.cancel_all(Error::ExitRequested);
                if let Some(tx) = done_tx {
                    _ = tx.send(());
                }
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn register(&mut self, wait: Wait) {
        let Wait {
            spec,
            timeout,
            done_tx,
        } = wait;
        self.waiters.register(spec, timeout, done_tx);
    }

    fn transmit(&mut self, frame: Frame) {
        trace!("sending {frame:?}");
        self.trace(TraceEvent::Sent(frame.clone()));
        if self.link_tx.send(frame).is_err() {
            error!("transport is not accepting frames");
            self.trace(TraceEvent::Error {
                reason: "transport is not accepting frames".into(),
            });
        }
    }

    fn on_transport_error(&mut self, reason: String) {
        warn!("transport error: {reason}");
        self.trace(TraceEvent::Error {
            reason: reason.clone(),
        });
        self.emit(BusEvent::Error(Error::Transport(reason)));
    }

    /// Frame goes through: waiters, discovery, ERD layer. Replies are sent after all of them saw it.
    fn on_frame(&mut self, frame: Frame) {
        trace!("received {frame:?}");
        self.trace(TraceEvent::Received(frame.clone()));
        self.emit(BusEvent::Message(frame.clone()));
        if frame.source == self.address {
            trace!("ignoring own frame");
            return;
        }
        self.waiters.offer(&frame);

        let mut outbox = Vec::new();
        match self.discovery.on_version(&frame) {
            VersionAction::Reply(reply) => outbox.push(reply),
            VersionAction::Discovered(record) => {
                self.emit_version(&frame);
                match self.bus.upgrade() {
                    Some(bus) => {
                        let appliance = Appliance::new(bus.endpoint(record.address), record.version);
                        self.emit(BusEvent::DeviceDiscovered(appliance));
                    }
                    None => debug!("all bus handles dropped, not announcing {record:?}"),
                }
            }
            VersionAction::AlreadyKnown => self.emit_version(&frame),
            VersionAction::Ignore => {}
        }

        match ErdMessage::decode(&frame) {
            Ok(Some(message)) => {
                for event in ErdLayer::events(&frame, &message) {
                    self.emit(event);
                }
                self.erd.on_message(&frame, &message, &mut outbox);
            }
            Ok(None) => {}
            Err(e) => warn!("dropping {frame:?}: {e}"),
        }

        for reply in outbox {
            self.transmit(reply);
        }
    }

    fn emit_version(&mut self, frame: &Frame) {
        self.emit(BusEvent::Version {
            source: frame.source,
            destination: frame.destination,
            version: frame.data.clone(),
        });
    }

    fn emit(&mut self, event: BusEvent) {
        self.listeners.retain(|(filter, tx)| {
            if !filter.accepts(&event) {
                return !tx.is_closed();
            }
            let keep = tx.send(event.clone()).is_ok();
            if !keep {
                trace!("dropped listener {filter:?}");
            }
            keep
        });
    }

    fn trace(&mut self, event: TraceEvent) {
        if self.tracers.is_empty() {
            return;
        }
        self.tracers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
