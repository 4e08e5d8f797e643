//! Thin adapter over the MessagePack packing layer.
//!
//! [`WireReader`] wraps any [`io::Read`] and exposes the handful of primitive
//! reads the docrep grammar needs, plus two things the packing layer does not
//! give us directly: the absolute byte offset consumed so far, and a capture
//! mode that returns the exact bytes consumed by a run of reads. Capture is
//! what makes lazy preservation byte-faithful. The stream is strictly
//! forward, so instead of a mark/reset protocol the reader tees every byte it
//! consumes while a capture is open.

use std::io;
use std::io::Read as _;

use rmp::decode::{self, MarkerReadError, NumValueReadError, ValueReadError};
use rmp::Marker;

use crate::{Error, Result};

/// A positioned MessagePack reader over an arbitrary byte stream.
pub struct WireReader<R> {
    inner: R,
    pos: u64,
    capture: Option<Vec<u8>>,
}

impl<R> WireReader<R> {
    /// Creates a new `WireReader` consuming from `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pos: 0,
            capture: None,
        }
    }

    /// Returns the number of bytes consumed from the stream so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Returns a reference to the inner reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Returns a mutable reference to the inner reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consumes the `WireReader` and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Starts recording every byte consumed from the stream.
    ///
    /// Captures do not nest; the decoder opens at most one per packed value.
    pub fn begin_capture(&mut self) {
        debug_assert!(self.capture.is_none(), "capture already open");
        self.capture = Some(Vec::new());
    }

    /// Stops recording and returns the bytes consumed since
    /// [`begin_capture`](Self::begin_capture).
    pub fn end_capture(&mut self) -> Vec<u8> {
        self.capture.take().unwrap_or_default()
    }
}

impl<R: io::Read> io::Read for WireReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        if let Some(capture) = self.capture.as_mut() {
            capture.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }
}

impl<R: io::Read> WireReader<R> {
    /// Reads the one-byte wire version opening a frame.
    ///
    /// Returns `Ok(None)` on end of stream: a frame boundary is the one
    /// position where running out of bytes is the normal end-of-stream
    /// condition rather than a truncation.
    ///
    /// # Errors
    /// Returns an error if the stream holds a non-integer value or fails
    /// with anything other than a clean EOF.
    pub fn read_frame_version(&mut self) -> Result<Option<u8>> {
        match decode::read_int::<u8, _>(self) {
            Ok(version) => Ok(Some(version)),
            Err(NumValueReadError::InvalidMarkerRead(err))
                if err.kind() == io::ErrorKind::UnexpectedEof =>
            {
                Ok(None)
            }
            Err(err) => Err(num_err(err, "wire version")),
        }
    }

    /// Reads an unsigned byte.
    ///
    /// # Errors
    /// Returns an error if the next value is not an integer in `u8` range.
    pub fn read_u8(&mut self, what: &str) -> Result<u8> {
        decode::read_int(self).map_err(|e| num_err(e, what))
    }

    /// Reads a signed 32-bit integer, accepting any integer marker whose
    /// value fits.
    ///
    /// # Errors
    /// Returns an error if the next value is not an integer in `i32` range.
    pub fn read_i32(&mut self, what: &str) -> Result<i32> {
        decode::read_int(self).map_err(|e| num_err(e, what))
    }

    /// Reads a signed 64-bit integer, accepting any integer marker.
    ///
    /// # Errors
    /// Returns an error if the next value is not an integer.
    pub fn read_i64(&mut self, what: &str) -> Result<i64> {
        decode::read_int(self).map_err(|e| num_err(e, what))
    }

    /// Reads a boolean.
    ///
    /// # Errors
    /// Returns an error if the next value is not a boolean.
    pub fn read_bool(&mut self, what: &str) -> Result<bool> {
        decode::read_bool(self).map_err(|e| value_err(e, what))
    }

    /// Reads a 32-bit float.
    ///
    /// # Errors
    /// Returns an error if the next value is not an `f32`.
    pub fn read_f32(&mut self, what: &str) -> Result<f32> {
        decode::read_f32(self).map_err(|e| value_err(e, what))
    }

    /// Reads a 64-bit float.
    ///
    /// # Errors
    /// Returns an error if the next value is not an `f64`.
    pub fn read_f64(&mut self, what: &str) -> Result<f64> {
        decode::read_f64(self).map_err(|e| value_err(e, what))
    }

    /// Reads a nil.
    ///
    /// # Errors
    /// Returns an error if the next value is not nil.
    pub fn read_nil(&mut self, what: &str) -> Result<()> {
        decode::read_nil(self).map_err(|e| value_err(e, what))
    }

    /// Reads a UTF-8 string.
    ///
    /// # Errors
    /// Returns an error if the next value is not a string or holds invalid
    /// UTF-8.
    pub fn read_string(&mut self, what: &str) -> Result<String> {
        let len = decode::read_str_len(self).map_err(|e| value_err(e, what))? as usize;
        let bytes = self.read_exact_bytes(len, what)?;
        String::from_utf8(bytes)
            .map_err(|e| Error::wire(format!("invalid UTF-8 while reading {what}: {e}")))
    }

    /// Reads an array header and returns the element count.
    ///
    /// # Errors
    /// Returns an error if the next value is not an array.
    pub fn read_array_header(&mut self, what: &str) -> Result<usize> {
        decode::read_array_len(self)
            .map(|n| n as usize)
            .map_err(|e| value_err(e, what))
    }

    /// Reads a map header and returns the entry count.
    ///
    /// # Errors
    /// Returns an error if the next value is not a map.
    pub fn read_map_header(&mut self, what: &str) -> Result<usize> {
        decode::read_map_len(self)
            .map(|n| n as usize)
            .map_err(|e| value_err(e, what))
    }

    /// Reads exactly `len` raw bytes.
    ///
    /// # Errors
    /// Returns an error if the stream ends before `len` bytes arrive.
    pub fn read_exact_bytes(&mut self, len: usize, what: &str) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        io::Read::read_exact(self, &mut buf).map_err(|e| io_err(e, what))?;
        Ok(buf)
    }

    /// Consumes one packed value of any kind and returns the exact bytes it
    /// occupied on the wire.
    ///
    /// # Errors
    /// Returns an error on a malformed or truncated value.
    pub fn read_opaque_value(&mut self, what: &str) -> Result<Vec<u8>> {
        self.begin_capture();
        let skipped = self.skip_value(what);
        let bytes = self.end_capture();
        skipped?;
        Ok(bytes)
    }

    /// Consumes one packed value of any kind without interpreting it.
    ///
    /// # Errors
    /// Returns an error on a malformed or truncated value.
    pub fn skip_value(&mut self, what: &str) -> Result<()> {
        let marker = decode::read_marker(self).map_err(|e| marker_err(e, what))?;
        match marker {
            Marker::Null
            | Marker::True
            | Marker::False
            | Marker::FixPos(_)
            | Marker::FixNeg(_) => Ok(()),
            Marker::U8 | Marker::I8 => self.skip_bytes(1, what),
            Marker::U16 | Marker::I16 => self.skip_bytes(2, what),
            Marker::U32 | Marker::I32 | Marker::F32 => self.skip_bytes(4, what),
            Marker::U64 | Marker::I64 | Marker::F64 => self.skip_bytes(8, what),
            Marker::FixStr(len) => self.skip_bytes(u64::from(len), what),
            Marker::Str8 | Marker::Bin8 => {
                let len = self.read_raw_len(1, what)?;
                self.skip_bytes(len, what)
            }
            Marker::Str16 | Marker::Bin16 => {
                let len = self.read_raw_len(2, what)?;
                self.skip_bytes(len, what)
            }
            Marker::Str32 | Marker::Bin32 => {
                let len = self.read_raw_len(4, what)?;
                self.skip_bytes(len, what)
            }
            Marker::FixArray(n) => self.skip_values(u64::from(n), what),
            Marker::Array16 => {
                let n = self.read_raw_len(2, what)?;
                self.skip_values(n, what)
            }
            Marker::Array32 => {
                let n = self.read_raw_len(4, what)?;
                self.skip_values(n, what)
            }
            Marker::FixMap(n) => self.skip_values(2 * u64::from(n), what),
            Marker::Map16 => {
                let n = self.read_raw_len(2, what)?;
                self.skip_values(2 * n, what)
            }
            Marker::Map32 => {
                let n = self.read_raw_len(4, what)?;
                self.skip_values(2 * n, what)
            }
            Marker::FixExt1 => self.skip_bytes(2, what),
            Marker::FixExt2 => self.skip_bytes(3, what),
            Marker::FixExt4 => self.skip_bytes(5, what),
            Marker::FixExt8 => self.skip_bytes(9, what),
            Marker::FixExt16 => self.skip_bytes(17, what),
            Marker::Ext8 => {
                let len = self.read_raw_len(1, what)?;
                self.skip_bytes(len + 1, what)
            }
            Marker::Ext16 => {
                let len = self.read_raw_len(2, what)?;
                self.skip_bytes(len + 1, what)
            }
            Marker::Ext32 => {
                let len = self.read_raw_len(4, what)?;
                self.skip_bytes(len + 1, what)
            }
            Marker::Reserved => Err(Error::wire(format!(
                "reserved marker while reading {what}"
            ))),
        }
    }

    fn skip_values(&mut self, n: u64, what: &str) -> Result<()> {
        for _ in 0..n {
            self.skip_value(what)?;
        }
        Ok(())
    }

    /// Reads a big-endian length field of `width` bytes following a marker.
    fn read_raw_len(&mut self, width: usize, what: &str) -> Result<u64> {
        let mut buf = [0u8; 4];
        io::Read::read_exact(self, &mut buf[..width]).map_err(|e| io_err(e, what))?;
        let mut len = 0u64;
        for byte in &buf[..width] {
            len = (len << 8) | u64::from(*byte);
        }
        Ok(len)
    }

    fn skip_bytes(&mut self, n: u64, what: &str) -> Result<()> {
        let copied = io::copy(&mut io::Read::by_ref(self).take(n), &mut io::sink())
            .map_err(|e| io_err(e, what))?;
        if copied < n {
            return Err(Error::wire(format!("truncated frame while reading {what}")));
        }
        Ok(())
    }
}

fn io_err(err: io::Error, what: &str) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::wire(format!("truncated frame while reading {what}"))
    } else {
        Error::io(err, format!("reading {what}"))
    }
}

fn value_err(err: ValueReadError, what: &str) -> Error {
    match err {
        ValueReadError::TypeMismatch(marker) => Error::wire(format!(
            "unexpected {marker:?} while reading {what}"
        )),
        ValueReadError::InvalidMarkerRead(err) | ValueReadError::InvalidDataRead(err) => {
            io_err(err, what)
        }
    }
}

fn num_err(err: NumValueReadError, what: &str) -> Error {
    match err {
        NumValueReadError::TypeMismatch(marker) => Error::wire(format!(
            "unexpected {marker:?} while reading {what}"
        )),
        NumValueReadError::OutOfRange => {
            Error::wire(format!("integer out of range while reading {what}"))
        }
        NumValueReadError::InvalidMarkerRead(err) | NumValueReadError::InvalidDataRead(err) => {
            io_err(err, what)
        }
    }
}

fn marker_err(err: MarkerReadError, what: &str) -> Error {
    io_err(err.0, what)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed_sample() -> Vec<u8> {
        let mut buf = Vec::new();
        rmp::encode::write_map_len(&mut buf, 2).unwrap();
        rmp::encode::write_sint(&mut buf, 0).unwrap();
        rmp::encode::write_str(&mut buf, "hello").unwrap();
        rmp::encode::write_sint(&mut buf, 1).unwrap();
        rmp::encode::write_array_len(&mut buf, 3).unwrap();
        rmp::encode::write_sint(&mut buf, -70000).unwrap();
        rmp::encode::write_nil(&mut buf).unwrap();
        rmp::encode::write_f64(&mut buf, 2.5).unwrap();
        buf
    }

    #[test]
    fn test_opaque_value_captures_exact_bytes() {
        let mut bytes = packed_sample();
        rmp::encode::write_bool(&mut bytes, true).unwrap();
        let trailer_start = packed_sample().len();

        let mut wire = WireReader::new(bytes.as_slice());
        let opaque = wire.read_opaque_value("sample").unwrap();
        assert_eq!(opaque, &bytes[..trailer_start]);
        assert_eq!(wire.position(), trailer_start as u64);
        assert!(wire.read_bool("trailer").unwrap());
    }

    #[test]
    fn test_capture_spans_multiple_reads() {
        let mut bytes = Vec::new();
        rmp::encode::write_array_len(&mut bytes, 2).unwrap();
        rmp::encode::write_sint(&mut bytes, 3).unwrap();
        rmp::encode::write_sint(&mut bytes, 400).unwrap();

        let mut wire = WireReader::new(bytes.as_slice());
        wire.begin_capture();
        assert_eq!(wire.read_array_header("pair").unwrap(), 2);
        assert_eq!(wire.read_i64("start").unwrap(), 3);
        assert_eq!(wire.read_i64("len").unwrap(), 400);
        assert_eq!(wire.end_capture(), bytes);
    }

    #[test]
    fn test_truncated_value_is_wire_error() {
        let mut bytes = Vec::new();
        rmp::encode::write_str(&mut bytes, "truncated").unwrap();
        bytes.truncate(4);

        let mut wire = WireReader::new(bytes.as_slice());
        let res = wire.read_string("name");
        assert!(matches!(res, Err(Error::Wire(msg)) if msg.contains("truncated")));
    }

    #[test]
    fn test_frame_version_eof_is_none() {
        let mut wire = WireReader::new([].as_slice());
        assert!(wire.read_frame_version().unwrap().is_none());
        // still none on repeated probes
        assert!(wire.read_frame_version().unwrap().is_none());
    }

    #[test]
    fn test_read_int_narrows_from_any_width() {
        let mut bytes = Vec::new();
        rmp::encode::write_uint(&mut bytes, 7).unwrap();
        let mut wire = WireReader::new(bytes.as_slice());
        assert_eq!(wire.read_i32("small").unwrap(), 7);
    }

    #[test]
    fn test_skip_nested_structures() {
        let mut bytes = Vec::new();
        rmp::encode::write_array_len(&mut bytes, 2).unwrap();
        rmp::encode::write_map_len(&mut bytes, 1).unwrap();
        rmp::encode::write_str(&mut bytes, "k").unwrap();
        rmp::encode::write_array_len(&mut bytes, 0).unwrap();
        rmp::encode::write_str(&mut bytes, "tail").unwrap();
        rmp::encode::write_sint(&mut bytes, 9).unwrap();

        let mut wire = WireReader::new(bytes.as_slice());
        wire.skip_value("nested").unwrap();
        assert_eq!(wire.read_i64("tail").unwrap(), 9);
    }
}
