//! Operations scoped to one local / remote node pair, and typed accessors built on top of them.

use crate::bus::Bus;
use crate::erd::{ErdCommand, ErdEntry, ErdMessage, SubscribeEntry};
use crate::event::{BusEvent, EventFilter};
use crate::frame::{Frame, Message};
use crate::poll::PollSubscription;
use crate::responder::{ErdHandler, FormatResponder};
use crate::stream::{ErdStream, TypedErdStream};
use crate::timeout::Timeout;
use crate::waiter::MatchSpec;
use crate::{Address, BROADCAST_ADDRESS, ErdId, Error};
use erd_format::{FormatSpec, Value};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Local / remote address pair bound to a bus.
#[derive(Clone, Debug)]
pub struct Endpoint {
    bus: Bus,
    local: Address,
    remote: Address,
    timeout: Timeout,
}

impl Endpoint {
    pub fn new(bus: Bus, remote: Address) -> Self {
        Endpoint {
            local: bus.address(),
            bus,
            remote,
            timeout: Timeout::Default,
        }
    }

    /// Act as a different local node, e.g. when bridging.
    pub fn with_local(mut self, local: Address) -> Self {
        self.local = local;
        self
    }

    /// Use a provided timeout instead of the bus default one.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn local(&self) -> Address {
        self.local
    }

    pub fn remote(&self) -> Address {
        self.remote
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    fn message(&self, command: u8, data: Vec<u8>) -> Message {
        Message::new(command)
            .from(self.local)
            .to(self.remote)
            .with_data(data)
    }

    fn response_spec(&self, command: u8) -> MatchSpec {
        let spec = MatchSpec::new()
            .to(self.local)
            .command(command)
            .responses_only();
        if self.remote == BROADCAST_ADDRESS {
            spec
        } else {
            spec.from(self.remote)
        }
    }

    /// Send an arbitrary command to the remote node.
    pub fn send(&self, command: u8, data: impl Into<Vec<u8>>) -> Result<(), Error> {
        self.bus.send(self.message(command, data.into()))
    }

    /// Send an arbitrary command and wait for the remote node to answer with the same command.
    pub async fn request(&self, command: u8, data: impl Into<Vec<u8>>) -> Result<Frame, Error> {
        self.bus
            .send_and_wait(
                self.message(command, data.into()),
                self.response_spec(command),
                self.timeout,
            )
            .await
    }

    async fn erd_request(&self, message: ErdMessage, erd: ErdId) -> Result<ErdMessage, Error> {
        let command = message.command().code();
        let data = message.encode()?;
        let frame = self
            .bus
            .send_and_wait(
                self.message(command, data),
                self.response_spec(command).erd(erd),
                self.timeout,
            )
            .await?;
        let response = ErdMessage::decode(&frame)?
            .ok_or_else(|| Error::UnexpectedResponse(format!("{frame:?}")))?;
        if response.is_failure() {
            return Err(Error::NoHandlerResponse { erd });
        }
        Ok(response)
    }

    pub async fn read(&self, erd: ErdId) -> Result<Vec<u8>, Error> {
        match self.erd_request(ErdMessage::ReadRequest(vec![erd]), erd).await? {
            ErdMessage::ReadResponse(entries) => entries
                .into_iter()
                .find(|e| e.erd == erd)
                .map(|e| e.data)
                .ok_or_else(|| Error::UnexpectedResponse(format!("no value for {erd:#06x}"))),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn write(&self, erd: ErdId, data: &[u8]) -> Result<(), Error> {
        if data.len() > u8::MAX as usize {
            return Err(Error::ValueTooLong(data.len()));
        }
        let request = ErdMessage::WriteRequest(vec![ErdEntry::new(erd, data)]);
        match self.erd_request(request, erd).await? {
            ErdMessage::WriteResponse(_) => Ok(()),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Ask the remote node to publish `erd` to us. Values arrive through the returned stream.
    pub async fn subscribe(&self, erd: ErdId) -> Result<ErdStream, Error> {
        // listen before asking, so that an immediate publish is not lost
        let rx = self.events()?;
        let request = ErdMessage::SubscribeRequest(vec![SubscribeEntry { erd, time: 0 }]);
        match self.erd_request(request, erd).await? {
            ErdMessage::SubscribeAck(_) => Ok(ErdStream::new(rx, self.remote, erd)),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn unsubscribe(&self, erd: ErdId) -> Result<(), Error> {
        match self
            .erd_request(ErdMessage::UnsubscribeRequest(vec![erd]), erd)
            .await?
        {
            ErdMessage::UnsubscribeAck(_) => Ok(()),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// ERDs the remote node publishes to us.
    pub async fn subscriptions(&self) -> Result<Vec<SubscribeEntry>, Error> {
        let frame = self
            .request(ErdCommand::SubscribeList.code(), Vec::new())
            .await?;
        match ErdMessage::decode(&frame)? {
            Some(ErdMessage::SubscribeListResponse(entries)) => Ok(entries),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Push a value to the remote node, the acknowledgement is not waited for.
    pub fn publish(&self, erd: ErdId, data: &[u8]) -> Result<(), Error> {
        let data = ErdMessage::Publish(vec![ErdEntry::new(erd, data)]).encode()?;
        self.bus
            .send(self.message(ErdCommand::Publish.code(), data))
    }

    /// Events between this endpoint's local and remote nodes.
    pub fn events(&self) -> Result<mpsc::UnboundedReceiver<BusEvent>, Error> {
        self.bus
            .events_filtered(EventFilter::between(self.local, self.remote))
    }

    pub fn item(&self, format: FormatSpec) -> Item {
        Item {
            endpoint: self.clone(),
            format: Arc::new(format),
        }
    }

    pub fn erd(&self, descriptor: ErdDescriptor) -> ErdAccessor {
        ErdAccessor {
            endpoint: self.clone(),
            descriptor,
        }
    }

    pub fn command(&self, descriptor: CommandDescriptor) -> CommandAccessor {
        CommandAccessor {
            endpoint: self.clone(),
            descriptor,
        }
    }
}

/// Value format bound to an endpoint.
#[derive(Clone, Debug)]
pub struct Item {
    endpoint: Endpoint,
    format: Arc<FormatSpec>,
}

impl Item {
    pub fn format(&self) -> &FormatSpec {
        &self.format
    }

    pub fn serialize(&self, value: &Value) -> Result<Vec<u8>, Error> {
        Ok(self.format.serialize(value)?)
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<Value, Error> {
        Ok(self.format.deserialize(bytes)?)
    }

    pub fn erd(&self, id: ErdId, name: impl Into<Cow<'static, str>>) -> ErdAccessor {
        self.endpoint.erd(ErdDescriptor {
            id,
            name: name.into(),
            format: self.format.clone(),
        })
    }

    /// Command answered with a value of this format, see [CommandDescriptor].
    pub fn command(&self, command: u8, request: impl Into<Vec<u8>>) -> CommandAccessor {
        self.endpoint.command(CommandDescriptor {
            command,
            request: request.into(),
            format: self.format.clone(),
        })
    }
}

/// ERD id with its value format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErdDescriptor {
    pub id: ErdId,
    pub name: Cow<'static, str>,
    pub format: Arc<FormatSpec>,
}

impl ErdDescriptor {
    pub fn new(id: ErdId, name: impl Into<Cow<'static, str>>, format: FormatSpec) -> Self {
        ErdDescriptor {
            id,
            name: name.into(),
            format: Arc::new(format),
        }
    }

    /// Scalar value, e.g. `"String@32"`.
    pub fn parse(
        id: ErdId,
        name: impl Into<Cow<'static, str>>,
        descriptor: &str,
    ) -> Result<Self, Error> {
        Ok(Self::new(id, name, FormatSpec::parse(descriptor)?))
    }

    /// Struct value, e.g. `["hours:UInt8", "minutes:UInt8"]`.
    pub fn parse_struct(
        id: ErdId,
        name: impl Into<Cow<'static, str>>,
        fields: &[&str],
    ) -> Result<Self, Error> {
        Ok(Self::new(id, name, FormatSpec::parse_struct(fields)?))
    }
}

/// Typed read / write / subscribe of one ERD on one endpoint.
#[derive(Clone, Debug)]
pub struct ErdAccessor {
    endpoint: Endpoint,
    descriptor: ErdDescriptor,
}

impl ErdAccessor {
    pub fn descriptor(&self) -> &ErdDescriptor {
        &self.descriptor
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn read(&self) -> Result<Value, Error> {
        let bytes = self.endpoint.read(self.descriptor.id).await?;
        Ok(self.descriptor.format.deserialize(&bytes)?)
    }

    pub async fn read_raw(&self) -> Result<Vec<u8>, Error> {
        self.endpoint.read(self.descriptor.id).await
    }

    pub async fn write(&self, value: &Value) -> Result<(), Error> {
        let bytes = self.descriptor.format.serialize(value)?;
        self.endpoint.write(self.descriptor.id, &bytes).await
    }

    /// Write a value built from declared defaults only.
    pub async fn write_default(&self) -> Result<(), Error> {
        let bytes = self.descriptor.format.serialize_default()?;
        self.endpoint.write(self.descriptor.id, &bytes).await
    }

    pub async fn subscribe(&self) -> Result<TypedErdStream, Error> {
        let stream = self.endpoint.subscribe(self.descriptor.id).await?;
        Ok(TypedErdStream::new(stream, self.descriptor.format.clone()))
    }

    pub async fn unsubscribe(&self) -> Result<(), Error> {
        self.endpoint.unsubscribe(self.descriptor.id).await
    }

    pub fn publish(&self, value: &Value) -> Result<(), Error> {
        let bytes = self.descriptor.format.serialize(value)?;
        self.endpoint.publish(self.descriptor.id, &bytes)
    }

    /// Answer this endpoint's remote node when it reads or writes this ERD from us.
    pub fn serve(&self, handler: impl ErdHandler + 'static) -> Result<(), Error> {
        let responder = FormatResponder::new(self.descriptor.format.clone(), handler);
        self.endpoint
            .bus
            .serve_for(self.descriptor.id, self.endpoint.remote, Arc::new(responder))
    }
}

/// Plain command whose response carries a value: `request` is sent with `command`, the remote node
/// answers with the same command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub command: u8,
    pub request: Vec<u8>,
    pub format: Arc<FormatSpec>,
}

impl CommandDescriptor {
    pub fn new(command: u8, format: FormatSpec) -> Self {
        CommandDescriptor {
            command,
            request: Vec::new(),
            format: Arc::new(format),
        }
    }

    pub fn with_request(mut self, request: impl Into<Vec<u8>>) -> Self {
        self.request = request.into();
        self
    }
}

#[derive(Clone, Debug)]
pub struct CommandAccessor {
    endpoint: Endpoint,
    descriptor: CommandDescriptor,
}

impl CommandAccessor {
    pub fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    pub async fn read_raw(&self) -> Result<Vec<u8>, Error> {
        let frame = self
            .endpoint
            .request(self.descriptor.command, self.descriptor.request.clone())
            .await?;
        Ok(frame.data)
    }

    pub async fn read(&self) -> Result<Value, Error> {
        let bytes = self.read_raw().await?;
        Ok(self.descriptor.format.deserialize(&bytes)?)
    }

    /// Send a value with this command, nothing is waited for.
    pub fn write(&self, value: &Value) -> Result<(), Error> {
        let bytes = self.descriptor.format.serialize(value)?;
        self.endpoint.send(self.descriptor.command, bytes)
    }

    /// Reissue the read every `period` and yield values only when their serialized bytes change.
    pub fn subscribe(&self, period: Duration) -> PollSubscription {
        PollSubscription::spawn(self.clone(), period)
    }
}
