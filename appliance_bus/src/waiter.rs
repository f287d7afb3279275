use crate::erd::ErdMessage;
use crate::{Address, ErdId, Error, Frame};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::trace;

pub(crate) type ResponseSender = oneshot::Sender<Result<Frame, Error>>;

/// Partial frame match, unset fields match anything.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchSpec {
    pub source: Option<Address>,
    pub destination: Option<Address>,
    pub command: Option<u8>,
    /// Only ERD frames that can answer a request for this ERD match, see [ErdMessage::answers].
    pub erd: Option<ErdId>,
    /// Skip frames that decode as ERD requests, see [ErdMessage::is_request].
    pub responses_only: bool,
}

impl MatchSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, source: Address) -> Self {
        self.source = Some(source);
        self
    }

    pub fn to(mut self, destination: Address) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn command(mut self, command: u8) -> Self {
        self.command = Some(command);
        self
    }

    pub fn erd(mut self, erd: ErdId) -> Self {
        self.erd = Some(erd);
        self
    }

    pub fn responses_only(mut self) -> Self {
        self.responses_only = true;
        self
    }

    pub fn matches(&self, frame: &Frame) -> bool {
        if self.source.is_some_and(|s| s != frame.source)
            || self.destination.is_some_and(|d| d != frame.destination)
            || self.command.is_some_and(|c| c != frame.command)
        {
            return false;
        }
        if self.erd.is_none() && !self.responses_only {
            return true;
        }
        match ErdMessage::decode(frame) {
            Ok(Some(m)) => {
                self.erd.is_none_or(|erd| m.answers(erd))
                    && !(self.responses_only && m.is_request())
            }
            Ok(None) => self.erd.is_none(),
            Err(_) => false,
        }
    }
}

struct Waiter {
    spec: MatchSpec,
    deadline: Option<Instant>,
    done_tx: ResponseSender,
}

/// Outstanding waiters in registration order.
#[derive(Default)]
pub(crate) struct Waiters {
    list: VecDeque<Waiter>,
}

impl Waiters {
    pub(crate) fn register(
        &mut self,
        spec: MatchSpec,
        timeout: Option<Duration>,
        done_tx: ResponseSender,
    ) {
        let deadline = timeout.map(|t| Instant::now() + t);
        trace!("waiting for {spec:?}, deadline: {deadline:?}");
        self.list.push_back(Waiter {
            spec,
            deadline,
            done_tx,
        });
    }

    /// Resolve the first waiter matching `frame`. Returns false if nobody was waiting for it.
    pub(crate) fn offer(&mut self, frame: &Frame) -> bool {
        self.list.retain(|w| !w.done_tx.is_closed());
        while let Some(idx) = self.list.iter().position(|w| w.spec.matches(frame)) {
            let Some(waiter) = self.list.remove(idx) else {
                break;
            };
            if waiter.done_tx.send(Ok(frame.clone())).is_ok() {
                trace!("resolved {:?} with {frame:?}", waiter.spec);
                return true;
            }
        }
        false
    }

    /// Resolve waiters whose deadline is at or before `now` with [Error::Timeout], return the nearest
    /// remaining deadline.
    pub(crate) fn prune(&mut self, now: Instant) -> Option<Instant> {
        let mut next: Option<Instant> = None;
        let mut remaining = VecDeque::with_capacity(self.list.len());
        for waiter in self.list.drain(..) {
            match waiter.deadline {
                Some(deadline) if deadline <= now => {
                    trace!("timed out {:?}", waiter.spec);
                    _ = waiter.done_tx.send(Err(Error::Timeout));
                }
                deadline => {
                    if let Some(deadline) = deadline {
                        next = Some(next.map_or(deadline, |n| n.min(deadline)));
                    }
                    remaining.push_back(waiter);
                }
            }
        }
        self.list = remaining;
        next
    }

    pub(crate) fn cancel_all(&mut self, error: Error) {
        trace!("canceling all waiters");
        for waiter in self.list.drain(..) {
            _ = waiter.done_tx.send(Err(error.clone()));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }
}
