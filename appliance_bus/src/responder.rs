//! Device side: producers of ERD values answering READ and WRITE requests from remote nodes.

use crate::{Address, ErdId, Error};
use erd_format::{FormatSpec, Value};
use std::sync::{Arc, Mutex, PoisonError};

/// Who asked for which ERD.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ErdRequest {
    pub source: Address,
    pub destination: Address,
    pub erd: ErdId,
}

/// Raw byte level responder, called from the bus event loop and must not block.
///
/// Any error is answered with a one byte failure payload.
pub trait ErdResponder: Send + Sync {
    fn read(&self, request: &ErdRequest) -> Result<Vec<u8>, Error>;

    fn write(&self, request: &ErdRequest, _data: &[u8]) -> Result<(), Error> {
        Err(Error::NoHandlerResponse { erd: request.erd })
    }
}

/// Typed responder, see [FormatResponder] for the adapter to [ErdResponder].
pub trait ErdHandler: Send + Sync {
    fn read(&self, request: &ErdRequest) -> Option<Value>;

    /// Returns false if the value was rejected.
    fn write(&self, _request: &ErdRequest, _value: Value) -> bool {
        false
    }
}

pub struct FormatResponder<H> {
    format: Arc<FormatSpec>,
    handler: H,
}

impl<H: ErdHandler> FormatResponder<H> {
    pub fn new(format: Arc<FormatSpec>, handler: H) -> Self {
        FormatResponder { format, handler }
    }
}

impl<H: ErdHandler> ErdResponder for FormatResponder<H> {
    fn read(&self, request: &ErdRequest) -> Result<Vec<u8>, Error> {
        let value = self
            .handler
            .read(request)
            .ok_or(Error::NoHandlerResponse { erd: request.erd })?;
        Ok(self.format.serialize(&value)?)
    }

    fn write(&self, request: &ErdRequest, data: &[u8]) -> Result<(), Error> {
        let value = self.format.deserialize(data)?;
        if self.handler.write(request, value) {
            Ok(())
        } else {
            Err(Error::NoHandlerResponse { erd: request.erd })
        }
    }
}

/// Value that remote nodes can read and overwrite. Clones share the value.
#[derive(Clone, Debug)]
pub struct SharedValue(Arc<Mutex<Value>>);

impl SharedValue {
    pub fn new(value: impl Into<Value>) -> Self {
        SharedValue(Arc::new(Mutex::new(value.into())))
    }

    pub fn get(&self) -> Value {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, value: impl Into<Value>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = value.into();
    }
}

impl ErdHandler for SharedValue {
    fn read(&self, _request: &ErdRequest) -> Option<Value> {
        Some(self.get())
    }

    fn write(&self, _request: &ErdRequest, value: Value) -> bool {
        self.set(value);
        true
    }
}

impl<F> ErdResponder for F
where
    F: Fn(&ErdRequest) -> Option<Vec<u8>> + Send + Sync,
{
    fn read(&self, request: &ErdRequest) -> Result<Vec<u8>, Error> {
        self(request).ok_or(Error::NoHandlerResponse { erd: request.erd })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: ErdRequest = ErdRequest {
        source: 0x20,
        destination: 0x10,
        erd: 0x0005,
    };

    fn clock() -> Arc<FormatSpec> {
        Arc::new(
            FormatSpec::parse_struct(["hours:UInt8", "minutes:UInt8", "seconds:UInt8"]).unwrap(),
        )
    }

    #[test]
    fn shared_value_through_format() {
        let value = SharedValue::new(Value::record([
            ("hours", Value::from(13u8)),
            ("minutes", Value::from(5u8)),
            ("seconds", Value::from(0u8)),
        ]));
        let responder = FormatResponder::new(clock(), value.clone());
        assert_eq!(responder.read(&REQUEST), Ok(vec![13, 5, 0]));

        ErdResponder::write(&responder, &REQUEST, &[7, 30, 15]).unwrap();
        assert_eq!(value.get().get("minutes"), Some(&Value::UInt(30)));
        assert!(matches!(
            ErdResponder::write(&responder, &REQUEST, &[7]),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn closure_is_read_only() {
        let responder = |request: &ErdRequest| (request.erd == 5).then(|| vec![1]);
        assert_eq!(ErdResponder::read(&responder, &REQUEST), Ok(vec![1]));
        assert_eq!(
            ErdResponder::write(&responder, &REQUEST, &[2]),
            Err(Error::NoHandlerResponse { erd: 5 })
        );
    }
}
