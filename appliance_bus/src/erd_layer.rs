use crate::erd::{ErdCommand, ErdEntry, ErdMessage, FAILURE_PAYLOAD, SubscribeEntry};
use crate::event::BusEvent;
use crate::responder::{ErdRequest, ErdResponder};
use crate::{Address, ErdId, Error, Frame};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct Registration {
    /// None serves every remote node
    remote: Option<Address>,
    responder: Arc<dyn ErdResponder>,
}

/// Device side ERD state: value responders and remote subscriptions.
pub(crate) struct ErdLayer {
    local: Address,
    responders: HashMap<ErdId, Vec<Registration>>,
    /// (subscriber, erd) -> time
    subscriptions: BTreeMap<(Address, ErdId), u8>,
}

impl ErdLayer {
    pub(crate) fn new(local: Address) -> Self {
        ErdLayer {
            local,
            responders: HashMap::new(),
            subscriptions: BTreeMap::new(),
        }
    }

    /// Later registrations take precedence, a responder bound to a remote node precedes a catch-all one.
    pub(crate) fn serve(
        &mut self,
        erd: ErdId,
        remote: Option<Address>,
        responder: Arc<dyn ErdResponder>,
    ) {
        debug!("serving ERD {erd:#06x} for {remote:?}");
        self.responders
            .entry(erd)
            .or_default()
            .push(Registration { remote, responder });
    }

    fn responder(&self, erd: ErdId, remote: Address) -> Option<&Arc<dyn ErdResponder>> {
        let registrations = self.responders.get(&erd)?;
        registrations
            .iter()
            .rev()
            .find(|r| r.remote == Some(remote))
            .or_else(|| registrations.iter().rev().find(|r| r.remote.is_none()))
            .map(|r| &r.responder)
    }

    /// Typed events for a decoded ERD frame.
    pub(crate) fn events(frame: &Frame, message: &ErdMessage) -> Vec<BusEvent> {
        let (source, destination) = (frame.source, frame.destination);
        match message {
            ErdMessage::ReadRequest(erds) => erds
                .iter()
                .map(|&erd| BusEvent::Read {
                    source,
                    destination,
                    erd,
                })
                .collect(),
            ErdMessage::ReadResponse(entries) => entries
                .iter()
                .map(|e| BusEvent::ReadResponse {
                    source,
                    destination,
                    erd: e.erd,
                    data: e.data.clone(),
                })
                .collect(),
            ErdMessage::WriteRequest(entries) => entries
                .iter()
                .map(|e| BusEvent::Write {
                    source,
                    destination,
                    erd: e.erd,
                    data: e.data.clone(),
                })
                .collect(),
            ErdMessage::WriteResponse(erds) => erds
                .iter()
                .map(|&erd| BusEvent::WriteResponse {
                    source,
                    destination,
                    erd,
                })
                .collect(),
            ErdMessage::SubscribeRequest(entries) => entries
                .iter()
                .map(|e| BusEvent::Subscribe {
                    source,
                    destination,
                    erd: e.erd,
                    time: e.time,
                })
                .collect(),
            ErdMessage::UnsubscribeRequest(erds) => erds
                .iter()
                .map(|&erd| BusEvent::Unsubscribe {
                    source,
                    destination,
                    erd,
                })
                .collect(),
            ErdMessage::SubscribeListResponse(entries) => vec![BusEvent::SubscribeList {
                source,
                destination,
                entries: entries.clone(),
            }],
            ErdMessage::Publish(entries) => entries
                .iter()
                .map(|e| BusEvent::Publish {
                    source,
                    destination,
                    erd: e.erd,
                    data: e.data.clone(),
                })
                .collect(),
            ErdMessage::SubscribeAck(_)
            | ErdMessage::UnsubscribeAck(_)
            | ErdMessage::SubscribeListRequest
            | ErdMessage::PublishAck => vec![],
        }
    }

    /// Answer requests addressed to this node, `outbox` receives the replies.
    pub(crate) fn on_message(&mut self, frame: &Frame, message: &ErdMessage, outbox: &mut Vec<Frame>) {
        if frame.source == self.local || !frame.is_for(self.local) {
            return;
        }
        let command = message.command().code();
        let reply = match message {
            ErdMessage::ReadRequest(erds) if !erds.is_empty() => {
                self.answer_read(frame, erds)
            }
            ErdMessage::WriteRequest(entries) if !entries.is_empty() => {
                self.answer_write(frame, entries)
            }
            ErdMessage::SubscribeRequest(entries) => {
                for entry in entries {
                    self.subscriptions
                        .insert((frame.source, entry.erd), entry.time);
                }
                debug!("{:#04x} subscribed to {entries:?}", frame.source);
                Some(ErdMessage::SubscribeAck(entries.len() as u8).encode())
            }
            ErdMessage::UnsubscribeRequest(erds) => {
                let removed = erds
                    .iter()
                    .filter(|&&erd| self.subscriptions.remove(&(frame.source, erd)).is_some())
                    .count();
                debug!("{:#04x} unsubscribed from {erds:?}", frame.source);
                Some(ErdMessage::UnsubscribeAck(removed as u8).encode())
            }
            ErdMessage::SubscribeListRequest => {
                Some(ErdMessage::SubscribeListResponse(self.subscriptions_of(frame.source)).encode())
            }
            ErdMessage::Publish(entries) if !entries.is_empty() => {
                Some(ErdMessage::PublishAck.encode())
            }
            _ => None,
        };
        match reply {
            Some(Ok(data)) => outbox.push(frame.reply(self.local, command, data)),
            Some(Err(e)) => {
                warn!("failed to encode reply to {frame:?}: {e}");
                outbox.push(frame.reply(self.local, command, FAILURE_PAYLOAD.to_vec()));
            }
            None => {}
        }
    }

    fn has_responders(&self, source: Address, erds: impl IntoIterator<Item = ErdId>) -> bool {
        erds.into_iter()
            .all(|erd| self.responder(erd, source).is_some())
    }

    fn answer_read(&self, frame: &Frame, erds: &[ErdId]) -> Option<Result<Vec<u8>, Error>> {
        if frame.is_broadcast() && !self.has_responders(frame.source, erds.iter().copied()) {
            return None;
        }
        let mut entries = Vec::with_capacity(erds.len());
        for &erd in erds {
            match self.read_one(frame, erd) {
                Ok(data) => entries.push(ErdEntry::new(erd, data)),
                Err(e) => {
                    debug!("READ {erd:#06x} from {:#04x} failed: {e}", frame.source);
                    return Some(Ok(FAILURE_PAYLOAD.to_vec()));
                }
            }
        }
        Some(ErdMessage::ReadResponse(entries).encode())
    }

    fn read_one(&self, frame: &Frame, erd: ErdId) -> Result<Vec<u8>, Error> {
        let responder = self
            .responder(erd, frame.source)
            .ok_or(Error::NoHandlerResponse { erd })?;
        let data = responder.read(&request(frame, erd))?;
        if data.len() > u8::MAX as usize {
            return Err(Error::ValueTooLong(data.len()));
        }
        Ok(data)
    }

    fn answer_write(&self, frame: &Frame, entries: &[ErdEntry]) -> Option<Result<Vec<u8>, Error>> {
        if frame.is_broadcast() && !self.has_responders(frame.source, entries.iter().map(|e| e.erd))
        {
            return None;
        }
        let mut erds = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = self
                .responder(entry.erd, frame.source)
                .ok_or(Error::NoHandlerResponse { erd: entry.erd })
                .and_then(|r| r.write(&request(frame, entry.erd), &entry.data));
            match result {
                Ok(()) => erds.push(entry.erd),
                Err(e) => {
                    debug!("WRITE {:#06x} from {:#04x} failed: {e}", entry.erd, frame.source);
                    return Some(Ok(FAILURE_PAYLOAD.to_vec()));
                }
            }
        }
        Some(ErdMessage::WriteResponse(erds).encode())
    }

    fn subscriptions_of(&self, subscriber: Address) -> Vec<SubscribeEntry> {
        self.subscriptions
            .range((subscriber, 0)..=(subscriber, ErdId::MAX))
            .map(|(&(_, erd), &time)| SubscribeEntry { erd, time })
            .collect()
    }

    /// PUBLISH frames for every node subscribed to `erd`.
    pub(crate) fn notify(&self, erd: ErdId, data: &[u8]) -> Result<Vec<Frame>, Error> {
        let payload = ErdMessage::Publish(vec![ErdEntry::new(erd, data)]).encode()?;
        let frames: Vec<Frame> = self
            .subscriptions
            .keys()
            .filter(|(_, e)| *e == erd)
            .map(|&(subscriber, _)| {
                Frame::new(
                    self.local,
                    subscriber,
                    ErdCommand::Publish.code(),
                    payload.clone(),
                )
            })
            .collect();
        trace!("notifying {} subscribers of {erd:#06x}", frames.len());
        Ok(frames)
    }
}

fn request(frame: &Frame, erd: ErdId) -> ErdRequest {
    ErdRequest {
        source: frame.source,
        destination: frame.destination,
        erd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BROADCAST_ADDRESS;
    use hex_literal::hex;

    const LOCAL: Address = 0x10;
    const REMOTE: Address = 0x20;

    fn layer() -> ErdLayer {
        let mut layer = ErdLayer::new(LOCAL);
        layer.serve(
            0x0005,
            None,
            Arc::new(|_: &ErdRequest| Some(vec![13, 5, 0])),
        );
        layer
    }

    fn handle(layer: &mut ErdLayer, frame: Frame) -> Vec<Frame> {
        let message = ErdMessage::decode(&frame).unwrap().unwrap();
        let mut outbox = vec![];
        layer.on_message(&frame, &message, &mut outbox);
        outbox
    }

    #[test]
    fn read_is_answered() {
        let mut layer = layer();
        let replies = handle(&mut layer, Frame::new(REMOTE, LOCAL, 0xf0, hex!("01 00 05").to_vec()));
        assert_eq!(
            replies,
            vec![Frame::new(LOCAL, REMOTE, 0xf0, hex!("01 00 05 03 0d 05 00").to_vec())]
        );
    }

    #[test]
    fn missing_responder() {
        let mut layer = layer();
        let replies = handle(&mut layer, Frame::new(REMOTE, LOCAL, 0xf0, hex!("01 00 06").to_vec()));
        assert_eq!(replies, vec![Frame::new(LOCAL, REMOTE, 0xf0, vec![0])]);

        // broadcast requests are only answered by nodes serving every requested ERD
        let replies = handle(
            &mut layer,
            Frame::new(REMOTE, BROADCAST_ADDRESS, 0xf0, hex!("01 00 06").to_vec()),
        );
        assert!(replies.is_empty());
        let replies = handle(
            &mut layer,
            Frame::new(REMOTE, BROADCAST_ADDRESS, 0xf0, hex!("01 00 05").to_vec()),
        );
        assert_eq!(replies.len(), 1);
    }

    #[test]
    fn not_addressed_to_us() {
        let mut layer = layer();
        let replies = handle(&mut layer, Frame::new(REMOTE, 0x30, 0xf0, hex!("01 00 05").to_vec()));
        assert!(replies.is_empty());
        let replies = handle(&mut layer, Frame::new(LOCAL, LOCAL, 0xf0, hex!("01 00 05").to_vec()));
        assert!(replies.is_empty());
    }

    #[test]
    fn read_only_write_fails() {
        let mut layer = layer();
        let replies = handle(
            &mut layer,
            Frame::new(REMOTE, LOCAL, 0xf1, hex!("01 00 05 01 07").to_vec()),
        );
        assert_eq!(replies, vec![Frame::new(LOCAL, REMOTE, 0xf1, vec![0])]);
    }

    #[test]
    fn failure_payload_is_not_answered() {
        let mut layer = layer();
        assert!(handle(&mut layer, Frame::new(REMOTE, LOCAL, 0xf0, vec![0])).is_empty());
        assert!(handle(&mut layer, Frame::new(REMOTE, LOCAL, 0xf1, vec![0])).is_empty());
    }

    #[test]
    fn subscriptions() {
        let mut layer = layer();
        let replies = handle(
            &mut layer,
            Frame::new(REMOTE, LOCAL, 0xf2, hex!("02 00 05 00 00 07 0a").to_vec()),
        );
        assert_eq!(replies, vec![Frame::new(LOCAL, REMOTE, 0xf2, vec![2])]);
        handle(&mut layer, Frame::new(0x30, LOCAL, 0xf2, hex!("01 00 05 00").to_vec()));

        let replies = handle(&mut layer, Frame::new(REMOTE, LOCAL, 0xf3, vec![]));
        assert_eq!(
            replies,
            vec![Frame::new(LOCAL, REMOTE, 0xf3, hex!("02 00 05 00 00 07 0a").to_vec())]
        );

        let frames = layer.notify(0x0005, &[1]).unwrap();
        assert_eq!(
            frames,
            vec![
                Frame::new(LOCAL, REMOTE, 0xf5, hex!("01 00 05 01 01").to_vec()),
                Frame::new(LOCAL, 0x30, 0xf5, hex!("01 00 05 01 01").to_vec()),
            ]
        );

        let replies = handle(&mut layer, Frame::new(REMOTE, LOCAL, 0xf4, hex!("01 00 05").to_vec()));
        assert_eq!(replies, vec![Frame::new(LOCAL, REMOTE, 0xf4, vec![1])]);
        assert_eq!(layer.notify(0x0005, &[1]).unwrap().len(), 1);
    }

    #[test]
    fn publish_ack() {
        let mut layer = layer();
        let replies = handle(
            &mut layer,
            Frame::new(REMOTE, LOCAL, 0xf5, hex!("01 00 05 01 01").to_vec()),
        );
        assert_eq!(replies, vec![Frame::new(LOCAL, REMOTE, 0xf5, vec![])]);
        assert!(handle(&mut layer, Frame::new(REMOTE, LOCAL, 0xf5, vec![])).is_empty());
    }

    #[test]
    fn events() {
        let frame = Frame::new(REMOTE, LOCAL, 0xf0, hex!("02 00 05 00 06").to_vec());
        let message = ErdMessage::decode(&frame).unwrap().unwrap();
        let events = ErdLayer::events(&frame, &message);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], BusEvent::Read { erd: 6, source: REMOTE, .. }));
    }
}
