use crate::{BufReader, BufWriter, Endian, Error, Value};
use std::collections::{BTreeMap, HashSet};

/// Primitive types of the descriptor language.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Int16,
    Int32,
    /// Byte array, fixed size when declared with `@size`, one-byte length prefix otherwise.
    Bytes,
    /// ASCII string, fixed size when declared with `@size`, one-byte length prefix otherwise.
    String,
}

impl Primitive {
    pub const ALL: [Primitive; 8] = [
        Primitive::UInt8,
        Primitive::UInt16,
        Primitive::UInt32,
        Primitive::Int8,
        Primitive::Int16,
        Primitive::Int32,
        Primitive::Bytes,
        Primitive::String,
    ];

    /// Name used in the descriptor language.
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::UInt8 => "UInt8",
            Primitive::UInt16 => "UInt16",
            Primitive::UInt32 => "UInt32",
            Primitive::Int8 => "Int8",
            Primitive::Int16 => "Int16",
            Primitive::Int32 => "Int32",
            Primitive::Bytes => "Bytes",
            Primitive::String => "String",
        }
    }

    /// Width in bytes for integer types, None for Bytes and String.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Primitive::UInt8 | Primitive::Int8 => Some(1),
            Primitive::UInt16 | Primitive::Int16 => Some(2),
            Primitive::UInt32 | Primitive::Int32 => Some(4),
            Primitive::Bytes | Primitive::String => None,
        }
    }

    fn integer_range(&self) -> Option<(i128, i128)> {
        match self {
            Primitive::UInt8 => Some((0, u8::MAX as i128)),
            Primitive::UInt16 => Some((0, u16::MAX as i128)),
            Primitive::UInt32 => Some((0, u32::MAX as i128)),
            Primitive::Int8 => Some((i8::MIN as i128, i8::MAX as i128)),
            Primitive::Int16 => Some((i16::MIN as i128, i16::MAX as i128)),
            Primitive::Int32 => Some((i32::MIN as i128, i32::MAX as i128)),
            Primitive::Bytes | Primitive::String => None,
        }
    }
}

/// One primitive descriptor: `(name?, primitive, size?, default?)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    name: Option<String>,
    primitive: Primitive,
    size: Option<usize>,
    default: Option<Value>,
}

impl Field {
    pub fn new(primitive: Primitive) -> Self {
        Field {
            name: None,
            primitive,
            size: None,
            default: None,
        }
    }

    pub fn named(name: impl Into<String>, primitive: Primitive) -> Self {
        Field {
            name: Some(name.into()),
            ..Field::new(primitive)
        }
    }

    /// Declared size, only used by Bytes and String.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    /// Effective size: declared size for Bytes and String, fixed width for integers.
    pub fn size(&self) -> Option<usize> {
        self.primitive.fixed_width().or(self.size)
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "value".into())
    }

    fn validate(&self, endian: Endian) -> Result<(), Error> {
        if let Some(default) = &self.default {
            let mut wr = BufWriter::new(endian);
            self.write(&mut wr, default)
                .map_err(|e| Error::InvalidDefault {
                    field: self.label(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    pub(crate) fn write(&self, wr: &mut BufWriter, value: &Value) -> Result<(), Error> {
        match self.primitive {
            Primitive::Bytes => {
                let Some(bytes) = value.as_bytes() else {
                    return Err(self.mismatch("bytes", value));
                };
                match self.size {
                    Some(size) => wr.write_padded(bytes, size, 0)?,
                    None => wr.write_len_prefixed(bytes)?,
                }
            }
            Primitive::String => {
                let Some(s) = value.as_str() else {
                    return Err(self.mismatch("string", value));
                };
                if !s.is_ascii() {
                    return Err(Error::NonAscii);
                }
                match self.size {
                    Some(size) => {
                        let truncated = &s.as_bytes()[..s.len().min(size)];
                        wr.write_padded(truncated, size, 0)?
                    }
                    None => wr.write_len_prefixed(s.as_bytes())?,
                }
            }
            Primitive::UInt8 => wr.write_u8(self.integer(value)? as u8),
            Primitive::UInt16 => wr.write_u16(self.integer(value)? as u16),
            Primitive::UInt32 => wr.write_u32(self.integer(value)? as u32),
            Primitive::Int8 => wr.write_i8(self.integer(value)? as i8),
            Primitive::Int16 => wr.write_i16(self.integer(value)? as i16),
            Primitive::Int32 => wr.write_i32(self.integer(value)? as i32),
        }
        Ok(())
    }

    fn integer(&self, value: &Value) -> Result<i128, Error> {
        let Some(v) = value.as_integer() else {
            return Err(self.mismatch("integer", value));
        };
        if let Some((min, max)) = self.primitive.integer_range() {
            if v < min || v > max {
                return Err(Error::ValueOutOfRange {
                    value: v,
                    primitive: self.primitive,
                });
            }
        }
        Ok(v)
    }

    pub(crate) fn read(&self, rd: &mut BufReader) -> Result<Value, Error> {
        let value = match self.primitive {
            Primitive::UInt8 => Value::UInt(rd.read_u8()? as u64),
            Primitive::UInt16 => Value::UInt(rd.read_u16()? as u64),
            Primitive::UInt32 => Value::UInt(rd.read_u32()? as u64),
            Primitive::Int8 => Value::Int(rd.read_i8()? as i64),
            Primitive::Int16 => Value::Int(rd.read_i16()? as i64),
            Primitive::Int32 => Value::Int(rd.read_i32()? as i64),
            Primitive::Bytes => Value::Bytes(self.read_variable(rd)?.to_vec()),
            Primitive::String => {
                let bytes = self.read_variable(rd)?;
                if !bytes.is_ascii() {
                    return Err(Error::NonAscii);
                }
                let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
                Value::Str(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
        };
        Ok(value)
    }

    fn read_variable<'i>(&self, rd: &mut BufReader<'i>) -> Result<&'i [u8], Error> {
        match self.size {
            Some(size) => rd.read_raw_slice(size),
            None => rd.read_len_prefixed(),
        }
    }

    fn mismatch(&self, expected: &'static str, got: &Value) -> Error {
        Error::TypeMismatch {
            field: self.label(),
            expected,
            got: got.kind(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Single primitive, serialized without any framing.
    Scalar(Field),
    /// Ordered named fields.
    Struct(Vec<Field>),
}

/// Immutable, validated value format. Built once and reused for every serialize/deserialize call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatSpec {
    layout: Layout,
    endian: Endian,
}

impl FormatSpec {
    pub fn scalar(field: Field) -> Result<Self, Error> {
        Self::validated(Layout::Scalar(field), Endian::Big)
    }

    /// Scalar without name, size or default.
    pub fn primitive(primitive: Primitive) -> Self {
        FormatSpec {
            layout: Layout::Scalar(Field::new(primitive)),
            endian: Endian::Big,
        }
    }

    pub fn structure(fields: Vec<Field>) -> Result<Self, Error> {
        Self::validated(Layout::Struct(fields), Endian::Big)
    }

    pub fn builder() -> FormatBuilder {
        FormatBuilder::default()
    }

    /// Parse a scalar descriptor such as `"UInt8"`, `"String@32"` or `"mode:UInt8@1:3"`.
    pub fn parse(descriptor: &str) -> Result<Self, Error> {
        Self::scalar(descriptor.parse()?)
    }

    /// Parse a struct from named field descriptors, e.g. `["hours:UInt8", "minutes:UInt8"]`.
    pub fn parse_struct<I, S>(descriptors: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = descriptors
            .into_iter()
            .map(|d| d.as_ref().parse::<Field>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::structure(fields)
    }

    fn validated(layout: Layout, endian: Endian) -> Result<Self, Error> {
        if let Layout::Struct(fields) = &layout {
            let mut names = HashSet::new();
            for field in fields {
                let Some(name) = field.name() else {
                    return Err(Error::UnnamedField);
                };
                if !names.insert(name) {
                    return Err(Error::DuplicateField(name.to_string()));
                }
            }
        }
        let spec = FormatSpec { layout, endian };
        for field in spec.fields() {
            field.validate(endian)?;
        }
        Ok(spec)
    }

    pub fn with_endian(self, endian: Endian) -> Self {
        FormatSpec { endian, ..self }
    }

    pub fn little_endian(self) -> Self {
        self.with_endian(Endian::Little)
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.layout, Layout::Struct(_))
    }

    pub fn fields(&self) -> &[Field] {
        match &self.layout {
            Layout::Scalar(field) => std::slice::from_ref(field),
            Layout::Struct(fields) => fields.as_slice(),
        }
    }

    /// Serialized size if every field has a known size.
    pub fn fixed_size(&self) -> Option<usize> {
        self.fields().iter().map(|f| f.size()).sum()
    }

    pub fn serialize(&self, value: &Value) -> Result<Vec<u8>, Error> {
        let mut wr = BufWriter::new(self.endian);
        self.write(&mut wr, Some(value))?;
        Ok(wr.finish())
    }

    /// Serialize using declared defaults only.
    pub fn serialize_default(&self) -> Result<Vec<u8>, Error> {
        let mut wr = BufWriter::new(self.endian);
        self.write(&mut wr, None)?;
        Ok(wr.finish())
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<Value, Error> {
        let mut rd = BufReader::new(bytes, self.endian);
        let value = self.read(&mut rd)?;

        #[cfg(feature = "tracing-extended")]
        if !rd.is_empty() {
            tracing::trace!("ignoring {} trailing bytes", rd.bytes_left());
        }

        Ok(value)
    }

    /// Write into an existing writer, its endianness is overridden by this format's.
    pub fn write(&self, wr: &mut BufWriter, value: Option<&Value>) -> Result<(), Error> {
        let mut local = BufWriter::new(self.endian);
        match &self.layout {
            Layout::Scalar(field) => {
                let value = value
                    .or(field.default_value())
                    .ok_or_else(|| Error::MissingField(field.label()))?;
                field.write(&mut local, value)?;
            }
            Layout::Struct(fields) => {
                let empty = BTreeMap::new();
                let map = match value {
                    Some(Value::Struct(map)) => map,
                    Some(other) => {
                        return Err(Error::TypeMismatch {
                            field: "value".into(),
                            expected: "struct",
                            got: other.kind(),
                        });
                    }
                    None => &empty,
                };
                for field in fields {
                    let name = field.label();
                    let value = map
                        .get(&name)
                        .or(field.default_value())
                        .ok_or(Error::MissingField(name))?;
                    field.write(&mut local, value)?;
                }
            }
        }
        wr.write_raw_slice(&local.finish());
        Ok(())
    }

    /// Read from an existing reader, advancing it past the consumed bytes only.
    pub fn read(&self, rd: &mut BufReader) -> Result<Value, Error> {
        let mut peek = *rd;
        let remaining = peek.read_raw_slice(peek.bytes_left())?;
        let mut local = BufReader::new(remaining, self.endian);
        let value = match &self.layout {
            Layout::Scalar(field) => field.read(&mut local)?,
            Layout::Struct(fields) => {
                let mut map = BTreeMap::new();
                for field in fields {
                    map.insert(field.label(), field.read(&mut local)?);
                }
                Value::Struct(map)
            }
        };
        rd.read_raw_slice(local.pos())?;
        Ok(value)
    }
}

/// Typed builder for struct formats, validated by [FormatBuilder::build].
#[derive(Default)]
pub struct FormatBuilder {
    fields: Vec<Field>,
    endian: Endian,
}

impl FormatBuilder {
    pub fn field(mut self, name: &str, primitive: Primitive) -> Self {
        self.fields.push(Field::named(name, primitive));
        self
    }

    pub fn sized(mut self, name: &str, primitive: Primitive, size: usize) -> Self {
        self.fields
            .push(Field::named(name, primitive).with_size(size));
        self
    }

    pub fn field_with_default(
        mut self,
        name: &str,
        primitive: Primitive,
        default: impl Into<Value>,
    ) -> Self {
        self.fields
            .push(Field::named(name, primitive).with_default(default));
        self
    }

    pub fn push(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn little_endian(mut self) -> Self {
        self.endian = Endian::Little;
        self
    }

    pub fn build(self) -> Result<FormatSpec, Error> {
        FormatSpec::validated(Layout::Struct(self.fields), self.endian)
    }
}
