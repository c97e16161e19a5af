//! Positional byte reader and writer for the NetTask wire format.
//!
//! All multi-byte integers are big-endian (network byte order). Variable
//! length fields travel as a u32 length prefix followed by the raw bytes.
//! Reads never panic; an under-run fails with [`WireError::Truncated`].

use crate::core::WireError;

/// A cursor over an immutable byte buffer.
///
/// Every read advances the cursor; the buffer itself is never copied.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether the reader is exhausted.
    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Read `n` bytes as a borrowed view and advance.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let view = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(view)
    }

    /// Read a fixed-size array and advance.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let view = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(view);
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    /// Read a big-endian i64.
    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_be_bytes(self.read_array::<8>()?))
    }

    /// Read a big-endian f64.
    pub fn read_f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_be_bytes(self.read_array::<8>()?))
    }

    /// Read a u32-length-prefixed block of bytes.
    pub fn read_block(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }
}

/// An append-only builder for outgoing frames.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with a pre-sized backing buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Append a big-endian u32.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a big-endian i64.
    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a big-endian f64.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a u32 length prefix followed by `bytes`.
    pub fn write_block(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.write_bytes(bytes);
    }

    /// Consume the writer and return the accumulated bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_integers() {
        let mut w = WireWriter::new();
        w.write_u8(0xAB);
        w.write_u32(0xDEADBEEF);
        w.write_i64(-42);
        w.write_f64(0.5);
        let bytes = w.finish();

        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        assert_eq!(r.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(r.read_i64().unwrap(), -42);
        assert_eq!(r.read_f64().unwrap(), 0.5);
        assert!(r.is_empty());
    }

    #[test]
    fn test_big_endian_layout() {
        let mut w = WireWriter::new();
        w.write_u32(0x01020304);
        assert_eq!(w.finish(), vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_block_roundtrip() {
        let mut w = WireWriter::new();
        w.write_block(b"hello");
        w.write_block(b"");
        let bytes = w.finish();

        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_block().unwrap(), b"hello");
        assert_eq!(r.read_block().unwrap(), b"");
        assert!(r.is_empty());
    }

    #[test]
    fn test_under_run_reports_sizes() {
        let mut r = WireReader::new(&[0x01, 0x02]);
        let err = r.read_u32().unwrap_err();
        assert_eq!(
            err,
            WireError::Truncated {
                needed: 4,
                available: 2
            }
        );
        // A failed read does not advance the cursor.
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn test_block_with_lying_prefix() {
        // Prefix claims 10 bytes, only 3 present.
        let mut w = WireWriter::new();
        w.write_u32(10);
        w.write_bytes(&[1, 2, 3]);
        let bytes = w.finish();

        let mut r = WireReader::new(&bytes);
        assert!(matches!(
            r.read_block(),
            Err(WireError::Truncated {
                needed: 10,
                available: 3
            })
        ));
    }

    #[test]
    fn test_reader_views_borrow() {
        let bytes = [1u8, 2, 3, 4, 5];
        let mut r = WireReader::new(&bytes);
        let head = r.read_bytes(2).unwrap();
        let tail = r.read_bytes(3).unwrap();
        assert_eq!(head, &[1, 2]);
        assert_eq!(tail, &[3, 4, 5]);
    }
}
