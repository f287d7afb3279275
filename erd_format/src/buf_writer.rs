use crate::{Endian, Error};

/// Growable byte buffer writer, counterpart of [BufReader](crate::BufReader).
///
/// # Example
/// ```
/// use erd_format::{BufWriter, Endian};
/// let mut wr = BufWriter::new(Endian::Big);
/// wr.write_u8(1);
/// wr.write_u16(0x0005);
/// assert_eq!(wr.finish(), vec![0x01, 0x00, 0x05]);
/// ```
#[derive(Clone, Debug)]
pub struct BufWriter {
    buf: Vec<u8>,
    endian: Endian,
}

macro_rules! write_int {
    ($name:ident, $ty:ty) => {
        #[doc = concat!("Write ", stringify!($ty), " using writer endianness.")]
        pub fn $name(&mut self, val: $ty) {
            match self.endian {
                Endian::Big => self.buf.extend_from_slice(&val.to_be_bytes()),
                Endian::Little => self.buf.extend_from_slice(&val.to_le_bytes()),
            }
        }
    };
}

impl BufWriter {
    pub fn new(endian: Endian) -> Self {
        Self {
            buf: Vec::new(),
            endian,
        }
    }

    pub fn big_endian() -> Self {
        Self::new(Endian::Big)
    }

    pub fn with_capacity(capacity: usize, endian: Endian) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            endian,
        }
    }

    pub fn write_u8(&mut self, val: u8) {
        self.buf.push(val);
    }

    pub fn write_i8(&mut self, val: i8) {
        self.buf.push(val as u8);
    }

    write_int!(write_u16, u16);
    write_int!(write_u32, u32);
    write_int!(write_i16, i16);
    write_int!(write_i32, i32);

    pub fn write_raw_slice(&mut self, val: &[u8]) {
        self.buf.extend_from_slice(val);
    }

    /// Write a one-byte length followed by the bytes themselves.
    pub fn write_len_prefixed(&mut self, val: &[u8]) -> Result<(), Error> {
        let Ok(len) = u8::try_from(val.len()) else {
            return Err(Error::TooLong {
                len: val.len(),
                size: u8::MAX as usize,
            });
        };
        self.write_u8(len);
        self.write_raw_slice(val);
        Ok(())
    }

    /// Write exactly `size` bytes: `val` followed by `pad` bytes. Longer input is an error.
    pub fn write_padded(&mut self, val: &[u8], size: usize, pad: u8) -> Result<(), Error> {
        if val.len() > size {
            return Err(Error::TooLong {
                len: val.len(),
                size,
            });
        }
        self.write_raw_slice(val);
        self.buf.resize(self.buf.len() + size - val.len(), pad);
        Ok(())
    }

    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
