//! Binary value formats for ERD payloads: a small descriptor language (`"name:type@size:default"`),
//! typed [FormatSpec] builder and a dynamically typed [Value].

pub use buf_reader::BufReader;
pub use buf_writer::BufWriter;
pub use format::{Field, FormatBuilder, FormatSpec, Layout, Primitive};
pub use value::Value;

pub mod buf_reader;
pub mod buf_writer;
pub mod format;
mod parse;
pub mod value;

/// Byte order of multi-byte integers. ERD frames are always big-endian, individual value formats
/// may override this.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Out of bounds read")]
    OutOfBoundsRead,
    #[error("Field '{0}' is absent and has no default")]
    MissingField(String),
    #[error("Field '{field}' expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("{value} does not fit into {primitive:?}")]
    ValueOutOfRange { value: i128, primitive: Primitive },
    #[error("String is not ASCII")]
    NonAscii,
    #[error("{len} bytes do not fit into {size}")]
    TooLong { len: usize, size: usize },
    #[error("Unknown type '{0}'")]
    UnknownType(String),
    #[error("Malformed descriptor '{descriptor}': {reason}")]
    MalformedDescriptor { descriptor: String, reason: String },
    #[error("Invalid default for '{field}': {reason}")]
    InvalidDefault { field: String, reason: String },
    #[error("Duplicate field '{0}'")]
    DuplicateField(String),
    #[error("Struct fields must be named")]
    UnnamedField,
}
