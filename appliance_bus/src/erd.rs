//! ERD wire format. All payloads are big-endian and start with an entry count byte.
//!
//! READ and WRITE reuse one command code for requests and responses, which are told apart only by
//! payload length: `1 + 2 * count` bytes is a bare ERD id list (READ request, WRITE response),
//! anything else carries `(erd, len, value)` entries.

use crate::{ErdId, Error, Frame};
use erd_format::{BufReader, BufWriter};
use strum_macros::FromRepr;

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, FromRepr)]
pub enum ErdCommand {
    Read = 0xF0,
    Write = 0xF1,
    Subscribe = 0xF2,
    SubscribeList = 0xF3,
    Unsubscribe = 0xF4,
    Publish = 0xF5,
}

impl ErdCommand {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErdEntry {
    pub erd: ErdId,
    pub data: Vec<u8>,
}

impl ErdEntry {
    pub fn new(erd: ErdId, data: impl Into<Vec<u8>>) -> Self {
        ErdEntry {
            erd,
            data: data.into(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SubscribeEntry {
    pub erd: ErdId,
    pub time: u8,
}

/// Decoded payload of one ERD frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErdMessage {
    ReadRequest(Vec<ErdId>),
    ReadResponse(Vec<ErdEntry>),
    WriteRequest(Vec<ErdEntry>),
    /// Acknowledged ERD ids, empty list is a failure response
    WriteResponse(Vec<ErdId>),
    SubscribeRequest(Vec<SubscribeEntry>),
    /// One byte acknowledgement
    SubscribeAck(u8),
    SubscribeListRequest,
    SubscribeListResponse(Vec<SubscribeEntry>),
    UnsubscribeRequest(Vec<ErdId>),
    UnsubscribeAck(u8),
    Publish(Vec<ErdEntry>),
    /// Empty PUBLISH
    PublishAck,
}

/// Sent instead of a well-formed response when a request could not be answered.
/// Decodes as an empty READ request or an empty WRITE response.
pub const FAILURE_PAYLOAD: [u8; 1] = [0];

impl ErdMessage {
    /// Decode an ERD frame, `Ok(None)` if `frame.command` is not an ERD command.
    pub fn decode(frame: &Frame) -> Result<Option<ErdMessage>, Error> {
        let Some(command) = ErdCommand::from_repr(frame.command) else {
            return Ok(None);
        };
        Self::decode_payload(command, &frame.data).map(Some)
    }

    pub fn decode_payload(command: ErdCommand, data: &[u8]) -> Result<ErdMessage, Error> {
        let malformed = |reason: &str| Error::MalformedFrame {
            command: command.code(),
            reason: reason.to_string(),
        };
        let mut rd = BufReader::big_endian(data);
        let message = match command {
            ErdCommand::Read | ErdCommand::Write => {
                let count = rd.read_u8().map_err(|_| malformed("empty payload"))? as usize;
                let is_id_list = data.len() == 1 + 2 * count;
                match (command, is_id_list) {
                    (ErdCommand::Read, true) => ErdMessage::ReadRequest(read_ids(&mut rd, count)),
                    (ErdCommand::Read, false) => {
                        ErdMessage::ReadResponse(read_entries(&mut rd, count).ok_or_else(
                            || malformed("entries do not match payload length"),
                        )?)
                    }
                    (_, true) => ErdMessage::WriteResponse(read_ids(&mut rd, count)),
                    (_, false) => {
                        ErdMessage::WriteRequest(read_entries(&mut rd, count).ok_or_else(
                            || malformed("entries do not match payload length"),
                        )?)
                    }
                }
            }
            ErdCommand::Subscribe if data.len() == 1 => ErdMessage::SubscribeAck(data[0]),
            ErdCommand::Subscribe => ErdMessage::SubscribeRequest(
                read_subscribe_entries(&mut rd)
                    .ok_or_else(|| malformed("expected (erd, time) pairs"))?,
            ),
            ErdCommand::SubscribeList if data.is_empty() => ErdMessage::SubscribeListRequest,
            ErdCommand::SubscribeList => ErdMessage::SubscribeListResponse(
                read_subscribe_entries(&mut rd)
                    .ok_or_else(|| malformed("expected (erd, time) pairs"))?,
            ),
            ErdCommand::Unsubscribe if data.len() == 1 => ErdMessage::UnsubscribeAck(data[0]),
            ErdCommand::Unsubscribe => {
                let count = rd.read_u8().map_err(|_| malformed("empty payload"))? as usize;
                if data.len() != 1 + 2 * count {
                    return Err(malformed("expected erd list"));
                }
                ErdMessage::UnsubscribeRequest(read_ids(&mut rd, count))
            }
            ErdCommand::Publish if data.is_empty() => ErdMessage::PublishAck,
            ErdCommand::Publish => {
                let count = rd.read_u8().map_err(|_| malformed("empty payload"))? as usize;
                ErdMessage::Publish(
                    read_entries(&mut rd, count)
                        .ok_or_else(|| malformed("entries do not match payload length"))?,
                )
            }
        };
        Ok(message)
    }

    pub fn command(&self) -> ErdCommand {
        match self {
            ErdMessage::ReadRequest(_) | ErdMessage::ReadResponse(_) => ErdCommand::Read,
            ErdMessage::WriteRequest(_) | ErdMessage::WriteResponse(_) => ErdCommand::Write,
            ErdMessage::SubscribeRequest(_) | ErdMessage::SubscribeAck(_) => ErdCommand::Subscribe,
            ErdMessage::SubscribeListRequest | ErdMessage::SubscribeListResponse(_) => {
                ErdCommand::SubscribeList
            }
            ErdMessage::UnsubscribeRequest(_) | ErdMessage::UnsubscribeAck(_) => {
                ErdCommand::Unsubscribe
            }
            ErdMessage::Publish(_) | ErdMessage::PublishAck => ErdCommand::Publish,
        }
    }

    /// Encode into a frame payload. Fails if there are more than 255 entries or a value is longer
    /// than 255 bytes.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut wr = BufWriter::big_endian();
        match self {
            ErdMessage::ReadRequest(erds)
            | ErdMessage::WriteResponse(erds)
            | ErdMessage::UnsubscribeRequest(erds) => {
                write_count(&mut wr, self.command(), erds.len())?;
                for erd in erds {
                    wr.write_u16(*erd);
                }
            }
            ErdMessage::ReadResponse(entries)
            | ErdMessage::WriteRequest(entries)
            | ErdMessage::Publish(entries) => {
                write_count(&mut wr, self.command(), entries.len())?;
                for entry in entries {
                    wr.write_u16(entry.erd);
                    wr.write_len_prefixed(&entry.data)
                        .map_err(|_| Error::ValueTooLong(entry.data.len()))?;
                }
            }
            ErdMessage::SubscribeRequest(entries) | ErdMessage::SubscribeListResponse(entries) => {
                write_count(&mut wr, self.command(), entries.len())?;
                for entry in entries {
                    wr.write_u16(entry.erd);
                    wr.write_u8(entry.time);
                }
            }
            ErdMessage::SubscribeAck(status) | ErdMessage::UnsubscribeAck(status) => {
                wr.write_u8(*status);
            }
            ErdMessage::SubscribeListRequest | ErdMessage::PublishAck => {}
        }
        Ok(wr.finish())
    }

    /// A READ or WRITE answer carrying no entries, sent back when a request could not be served.
    pub fn is_failure(&self) -> bool {
        match self {
            ErdMessage::ReadRequest(erds) | ErdMessage::WriteResponse(erds) => erds.is_empty(),
            _ => false,
        }
    }

    /// Whether this message asks the receiver for something. The `[0]` failure reply is not a request.
    pub fn is_request(&self) -> bool {
        match self {
            ErdMessage::ReadRequest(erds) => !erds.is_empty(),
            ErdMessage::WriteRequest(_)
            | ErdMessage::SubscribeRequest(_)
            | ErdMessage::SubscribeListRequest
            | ErdMessage::UnsubscribeRequest(_) => true,
            _ => false,
        }
    }

    /// Whether this message can be the answer to a request concerning `erd`.
    pub fn answers(&self, erd: ErdId) -> bool {
        match self {
            ErdMessage::ReadResponse(entries) | ErdMessage::Publish(entries) => {
                entries.iter().any(|e| e.erd == erd)
            }
            ErdMessage::WriteResponse(erds) => erds.is_empty() || erds.contains(&erd),
            ErdMessage::ReadRequest(erds) => erds.is_empty(),
            ErdMessage::SubscribeAck(_)
            | ErdMessage::UnsubscribeAck(_)
            | ErdMessage::SubscribeListResponse(_) => true,
            ErdMessage::WriteRequest(_)
            | ErdMessage::SubscribeRequest(_)
            | ErdMessage::SubscribeListRequest
            | ErdMessage::UnsubscribeRequest(_)
            | ErdMessage::PublishAck => false,
        }
    }
}

fn write_count(wr: &mut BufWriter, command: ErdCommand, count: usize) -> Result<(), Error> {
    let count = u8::try_from(count).map_err(|_| Error::MalformedFrame {
        command: command.code(),
        reason: format!("{count} entries do not fit into one frame"),
    })?;
    wr.write_u8(count);
    Ok(())
}

/// Caller checked that exactly `count` ids follow.
fn read_ids(rd: &mut BufReader, count: usize) -> Vec<ErdId> {
    (0..count).filter_map(|_| rd.read_u16().ok()).collect()
}

/// Exactly `count` entries must consume the rest of the payload.
fn read_entries(rd: &mut BufReader, count: usize) -> Option<Vec<ErdEntry>> {
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let erd = rd.read_u16().ok()?;
        let data = rd.read_len_prefixed().ok()?;
        entries.push(ErdEntry::new(erd, data));
    }
    rd.is_empty().then_some(entries)
}

fn read_subscribe_entries(rd: &mut BufReader) -> Option<Vec<SubscribeEntry>> {
    let count = rd.read_u8().ok()? as usize;
    if rd.bytes_left() != 3 * count {
        return None;
    }
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let erd = rd.read_u16().ok()?;
        let time = rd.read_u8().ok()?;
        entries.push(SubscribeEntry { erd, time });
    }
    Some(entries)
}
