//! Discovered device with the catalogue of ERDs common to all appliances.

use crate::endpoint::{Endpoint, ErdAccessor, ErdDescriptor};
use crate::{Address, ErdId, Error};
use erd_format::Value;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::LazyLock;
use tracing::error;

pub mod erds {
    use crate::ErdId;

    pub const MODEL_NUMBER: ErdId = 0x0001;
    pub const SERIAL_NUMBER: ErdId = 0x0002;
    pub const REMOTE_ENABLE: ErdId = 0x0003;
    pub const USER_INTERFACE_LOCK: ErdId = 0x0004;
    pub const CLOCK_TIME: ErdId = 0x0005;
    pub const CLOCK_FORMAT: ErdId = 0x0006;
    pub const TEMPERATURE_DISPLAY_UNITS: ErdId = 0x0007;
    pub const APPLIANCE_TYPE: ErdId = 0x0008;
    pub const SABBATH_MODE: ErdId = 0x0009;
    pub const SOUND_LEVEL: ErdId = 0x000A;
}

const CATALOGUE_SOURCE: &[(ErdId, &str, &[&str])] = &[
    (erds::MODEL_NUMBER, "model_number", &["String@32"]),
    (erds::SERIAL_NUMBER, "serial_number", &["String@32"]),
    (erds::REMOTE_ENABLE, "remote_enable", &["UInt8"]),
    (erds::USER_INTERFACE_LOCK, "user_interface_lock", &["UInt8"]),
    (
        erds::CLOCK_TIME,
        "clock_time",
        &["hours:UInt8", "minutes:UInt8", "seconds:UInt8"],
    ),
    (erds::CLOCK_FORMAT, "clock_format", &["UInt8"]),
    (
        erds::TEMPERATURE_DISPLAY_UNITS,
        "temperature_display_units",
        &["UInt8"],
    ),
    (erds::APPLIANCE_TYPE, "appliance_type", &["UInt8"]),
    (erds::SABBATH_MODE, "sabbath_mode", &["UInt8"]),
    (erds::SOUND_LEVEL, "sound_level", &["UInt8"]),
];

static CATALOGUE: LazyLock<Vec<ErdDescriptor>> = LazyLock::new(|| {
    CATALOGUE_SOURCE
        .iter()
        .filter_map(|&(id, name, fields)| {
            let descriptor = match fields {
                [scalar] => ErdDescriptor::parse(id, name, scalar),
                fields => ErdDescriptor::parse_struct(id, name, fields),
            };
            descriptor
                .inspect_err(|e| error!("bad catalogue entry {name}: {e}"))
                .ok()
        })
        .collect()
});

/// Descriptors of the ERDs every appliance is expected to expose, in id order.
pub fn catalogue() -> &'static [ErdDescriptor] {
    &CATALOGUE
}

pub fn lookup(id: ErdId) -> Option<&'static ErdDescriptor> {
    CATALOGUE.iter().find(|d| d.id == id)
}

pub fn lookup_named(name: &str) -> Option<&'static ErdDescriptor> {
    CATALOGUE.iter().find(|d| d.name == name)
}

/// [Endpoint] to a discovered node, with typed access to the catalogue ERDs.
#[derive(Clone)]
pub struct Appliance {
    endpoint: Endpoint,
    version: Vec<u8>,
}

impl Appliance {
    pub fn new(endpoint: Endpoint, version: Vec<u8>) -> Self {
        Appliance { endpoint, version }
    }

    pub fn address(&self) -> Address {
        self.endpoint.remote()
    }

    /// Payload of the VERSION response that announced this device.
    pub fn version(&self) -> &[u8] {
        &self.version
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn known(&self, id: ErdId) -> Result<ErdAccessor, Error> {
        lookup(id)
            .map(|descriptor| self.endpoint.erd(descriptor.clone()))
            .ok_or(Error::UnknownErd(id))
    }

    pub fn erd_named(&self, name: &str) -> Option<ErdAccessor> {
        lookup_named(name).map(|descriptor| self.endpoint.erd(descriptor.clone()))
    }

    pub async fn model_number(&self) -> Result<String, Error> {
        self.read_string(erds::MODEL_NUMBER).await
    }

    pub async fn serial_number(&self) -> Result<String, Error> {
        self.read_string(erds::SERIAL_NUMBER).await
    }

    async fn read_string(&self, id: ErdId) -> Result<String, Error> {
        match self.known(id)?.read().await? {
            Value::Str(s) => Ok(s),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// `(hours, minutes, seconds)`
    pub async fn clock_time(&self) -> Result<(u8, u8, u8), Error> {
        let value = self.known(erds::CLOCK_TIME)?.read().await?;
        let part = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_u64)
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| Error::UnexpectedResponse(format!("clock time: {value:?}")))
        };
        Ok((part("hours")?, part("minutes")?, part("seconds")?))
    }

    pub async fn set_clock_time(&self, hours: u8, minutes: u8, seconds: u8) -> Result<(), Error> {
        let value = Value::record([
            ("hours", Value::from(hours)),
            ("minutes", Value::from(minutes)),
            ("seconds", Value::from(seconds)),
        ]);
        self.known(erds::CLOCK_TIME)?.write(&value).await
    }
}

impl Deref for Appliance {
    type Target = Endpoint;

    fn deref(&self) -> &Self::Target {
        &self.endpoint
    }
}

impl Debug for Appliance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Appliance {{ address: {:#04x}, version: {} }}",
            self.address(),
            hex::encode(&self.version)
        )
    }
}
