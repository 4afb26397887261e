//! Avro binary primitives over a byte stream.

use crate::runtime::runtime_error::DecodeError;
use std::io::{ErrorKind, Read};

/// Input cursor. Tracks how many bytes have been consumed so errors can
/// point at an offset.
pub struct Reader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Reader { inner, position: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(DecodeError::malformed(self.position, "unexpected end of input"))
            }
            Err(source) => Err(DecodeError::Io {
                position: self.position,
                source,
            }),
        }
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    /// Zig-zag varint, at most ten bytes.
    pub fn read_long(&mut self) -> Result<i64, DecodeError> {
        let start = self.position;
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_byte()?;
            // the tenth byte may only carry the top bit
            if shift == 63 && byte > 1 {
                return Err(DecodeError::malformed(start, "varint overflows 64 bits"));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(((value >> 1) as i64) ^ -((value & 1) as i64))
    }

    pub fn read_int(&mut self) -> Result<i32, DecodeError> {
        let start = self.position;
        let value = self.read_long()?;
        i32::try_from(value)
            .map_err(|_| DecodeError::malformed(start, format!("int out of range: {}", value)))
    }

    pub fn read_boolean(&mut self) -> Result<bool, DecodeError> {
        let start = self.position;
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::malformed(
                start,
                format!("invalid boolean byte 0x{:02x}", other),
            )),
        }
    }

    pub fn read_float(&mut self) -> Result<f32, DecodeError> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    pub fn read_double(&mut self) -> Result<f64, DecodeError> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    /// Length-prefixed byte run. The buffer grows with the data actually
    /// read, so a forged length cannot force a huge allocation.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let start = self.position;
        let len = self.read_long()?;
        let len = u64::try_from(len)
            .map_err(|_| DecodeError::malformed(start, format!("negative length {}", len)))?;

        let mut buf = Vec::new();
        let read = match self.inner.by_ref().take(len).read_to_end(&mut buf) {
            Ok(n) => n as u64,
            Err(source) => {
                return Err(DecodeError::Io {
                    position: self.position,
                    source,
                });
            }
        };
        self.position += read;
        if read < len {
            return Err(DecodeError::malformed(self.position, "unexpected end of input"));
        }
        Ok(buf)
    }

    pub fn read_fixed(&mut self, size: usize) -> Result<Vec<u8>, DecodeError> {
        let mut buf = vec![0u8; size];
        self.fill(&mut buf)?;
        Ok(buf)
    }
}

/// Strings travel as bytes and are checked once they reach a sink.
/// `position` is where the error is reported.
pub(crate) fn utf8(bytes: Vec<u8>, position: u64) -> Result<String, DecodeError> {
    String::from_utf8(bytes)
        .map_err(|e| DecodeError::malformed(position, format!("invalid utf-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &[u8]) -> Reader<&[u8]> {
        Reader::new(bytes)
    }

    #[test]
    fn test_zigzag_longs() {
        let mut r = reader(&[0x00, 0x01, 0x02, 0x03, 0x7f, 0x80, 0x01]);
        assert_eq!(r.read_long().unwrap(), 0);
        assert_eq!(r.read_long().unwrap(), -1);
        assert_eq!(r.read_long().unwrap(), 1);
        assert_eq!(r.read_long().unwrap(), -2);
        assert_eq!(r.read_long().unwrap(), -64);
        assert_eq!(r.read_long().unwrap(), 64);
        assert_eq!(r.position(), 7);
    }

    #[test]
    fn test_long_extremes() {
        let mut max = vec![0xfe];
        max.extend_from_slice(&[0xff; 8]);
        max.push(0x01);
        assert_eq!(reader(&max).read_long().unwrap(), i64::MAX);

        let mut min = vec![0xff; 9];
        min.push(0x01);
        assert_eq!(reader(&min).read_long().unwrap(), i64::MIN);
    }

    #[test]
    fn test_overlong_varint() {
        let bytes = [0xff; 11];
        let err = reader(&bytes).read_long().unwrap_err();
        assert!(matches!(err, DecodeError::MalformedInput { position: 0, .. }));
    }

    #[test]
    fn test_truncated_input() {
        let err = reader(&[0x80]).read_long().unwrap_err();
        assert!(matches!(err, DecodeError::MalformedInput { position: 1, .. }));
    }

    #[test]
    fn test_int_out_of_range() {
        // zig-zag of 2^31
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x10];
        assert!(matches!(
            reader(&bytes).read_int(),
            Err(DecodeError::MalformedInput { .. })
        ));
    }

    #[test]
    fn test_boolean() {
        let mut r = reader(&[0x00, 0x01, 0x02]);
        assert!(!r.read_boolean().unwrap());
        assert!(r.read_boolean().unwrap());
        assert!(r.read_boolean().is_err());
    }

    #[test]
    fn test_float_and_double() {
        let mut bytes = 1.5f32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(-2.25f64).to_le_bytes());
        let mut r = reader(&bytes);
        assert_eq!(r.read_float().unwrap(), 1.5);
        assert_eq!(r.read_double().unwrap(), -2.25);
        assert_eq!(r.position(), 12);
    }

    #[test]
    fn test_string() {
        let mut r = reader(&[0x06, b'f', b'o', b'o']);
        let bytes = r.read_bytes().unwrap();
        assert_eq!(utf8(bytes, r.position()).unwrap(), "foo");
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn test_negative_length() {
        let err = reader(&[0x01]).read_bytes().unwrap_err();
        assert!(err.to_string().contains("negative length -1"));
    }

    #[test]
    fn test_length_past_end() {
        // claims 100 bytes, provides 2
        let err = reader(&[0xc8, 0x01, 0xaa, 0xbb]).read_bytes().unwrap_err();
        assert!(matches!(err, DecodeError::MalformedInput { position: 4, .. }));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut r = reader(&[0x02, 0xff]);
        let bytes = r.read_bytes().unwrap();
        let err = utf8(bytes, r.position()).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedInput { position: 2, .. }));
        assert!(err.to_string().contains("invalid utf-8"));
    }

    #[test]
    fn test_fixed() {
        let mut r = reader(&[1, 2, 3, 4]);
        assert_eq!(r.read_fixed(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(r.position(), 3);
    }
}
