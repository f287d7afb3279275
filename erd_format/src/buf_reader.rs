use crate::{Endian, Error};

/// Byte buffer reader for ERD payloads. Multi-byte integers are decoded with the endianness
/// given on construction, ERD frames themselves are always [Endian::Big].
#[derive(Copy, Clone, Debug)]
pub struct BufReader<'i> {
    buf: &'i [u8],
    /// Next byte to read from
    byte_idx: usize,
    endian: Endian,
}

macro_rules! read_int {
    ($name:ident, $ty:ty) => {
        #[doc = concat!("Read ", stringify!($ty), " using reader endianness.")]
        pub fn $name(&mut self) -> Result<$ty, Error> {
            const N: usize = size_of::<$ty>();
            let bytes: [u8; N] = self
                .read_raw_slice(N)?
                .try_into()
                .map_err(|_| Error::OutOfBoundsRead)?;
            let value = match self.endian {
                Endian::Big => <$ty>::from_be_bytes(bytes),
                Endian::Little => <$ty>::from_le_bytes(bytes),
            };

            #[cfg(feature = "tracing-extended")]
            tracing::trace!(concat!(stringify!($name), "() = {}"), value);

            Ok(value)
        }
    };
}

impl<'i> BufReader<'i> {
    /// Create a new BufReader from the provided slice.
    pub fn new(buf: &'i [u8], endian: Endian) -> Self {
        Self {
            buf,
            byte_idx: 0,
            endian,
        }
    }

    /// Create a new big-endian BufReader, as used by all ERD frame layouts.
    pub fn big_endian(buf: &'i [u8]) -> Self {
        Self::new(buf, Endian::Big)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        if self.bytes_left() == 0 {
            return Err(Error::OutOfBoundsRead);
        }
        let val = self.buf[self.byte_idx];
        self.byte_idx += 1;
        Ok(val)
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    read_int!(read_u16, u16);
    read_int!(read_u32, u32);
    read_int!(read_i16, i16);
    read_int!(read_i32, i32);

    /// Create a slice with the provided length.
    pub fn read_raw_slice(&mut self, len: usize) -> Result<&'i [u8], Error> {
        if self.bytes_left() < len {
            return Err(Error::OutOfBoundsRead);
        }
        let val = &self.buf[self.byte_idx..self.byte_idx + len];
        self.byte_idx += len;
        Ok(val)
    }

    /// Read a one-byte length, followed by that many bytes.
    pub fn read_len_prefixed(&mut self) -> Result<&'i [u8], Error> {
        let len = self.read_u8()? as usize;
        self.read_raw_slice(len)
    }

    pub fn bytes_left(&self) -> usize {
        self.buf.len().saturating_sub(self.byte_idx)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_left() == 0
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Return byte position that will be used on the next read call.
    pub fn pos(&self) -> usize {
        self.byte_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn bytes() {
        let buf = [1, 2, 3];
        let mut rd = BufReader::big_endian(&buf);
        assert_eq!(rd.read_u8(), Ok(1));
        assert_eq!(rd.bytes_left(), 2);
        assert_eq!(rd.read_u8(), Ok(2));
        assert_eq!(rd.bytes_left(), 1);
        assert_eq!(rd.read_u8(), Ok(3));
        assert_eq!(rd.bytes_left(), 0);
        assert_eq!(rd.read_u8(), Err(Error::OutOfBoundsRead));
    }

    #[test]
    fn endianness() {
        let buf = hex!("12 34 56 78");
        let mut rd = BufReader::big_endian(&buf);
        assert_eq!(rd.read_u32(), Ok(0x1234_5678));

        let mut rd = BufReader::new(&buf, Endian::Little);
        assert_eq!(rd.read_u16(), Ok(0x3412));
        assert_eq!(rd.read_u16(), Ok(0x7856));
    }

    #[test]
    fn signed() {
        let buf = hex!("ff fe ff ff ff 80");
        let mut rd = BufReader::big_endian(&buf);
        assert_eq!(rd.read_i8(), Ok(-1));
        assert_eq!(rd.read_i32(), Ok(-2));
        assert_eq!(rd.read_i8(), Ok(-128));
    }

    #[test]
    fn len_prefixed() {
        let buf = hex!("02 aa bb 05 01");
        let mut rd = BufReader::big_endian(&buf);
        assert_eq!(rd.read_len_prefixed(), Ok(&[0xaa, 0xbb][..]));
        assert_eq!(rd.read_len_prefixed(), Err(Error::OutOfBoundsRead));
    }

    #[test]
    fn short_read_does_not_advance() {
        let buf = [0x01];
        let mut rd = BufReader::big_endian(&buf);
        assert_eq!(rd.read_u16(), Err(Error::OutOfBoundsRead));
        assert_eq!(rd.pos(), 0);
        assert_eq!(rd.read_u8(), Ok(1));
    }
}
