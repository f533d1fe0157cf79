use tracing::trace;
use winnow::Parser;
use winnow::binary::Endianness;
use winnow::error::{ContextError, ErrMode};

use crate::codecs::{PackedNormal, Quat, Vector3};
use crate::data::VersionContext;
use crate::data::parser_utils;
use crate::error::{DecodeError, DecodeResult, parse_failure};

/// Bulk data is stored in another file; the header is all that is inline.
pub const BULKDATA_STORE_IN_SEPARATE_FILE: u32 = 0x01;
/// Bulk data was stripped when cooking.
pub const BULKDATA_NO_DATA: u32 = 0x20;

/// A seekable view over a fully buffered record.
///
/// Reads never go past the stopper, which marks the end of the object the record belongs
/// to. All multi-byte reads honor the cursor's byte order.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    stopper: usize,
    endian: Endianness,
}

/// Inline header of a lazily loaded bulk payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BulkDataHeader {
    pub flags: u32,
    pub element_count: i32,
    pub size_on_disk: i32,
    pub offset_in_file: i32,
}

impl BulkDataHeader {
    pub fn is_inline(&self) -> bool {
        self.flags & (BULKDATA_STORE_IN_SEPARATE_FILE | BULKDATA_NO_DATA) == 0
    }
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], endian: Endianness) -> Self {
        ByteCursor {
            data,
            pos: 0,
            stopper: data.len(),
            endian,
        }
    }

    /// Cursor using the byte order of the context's platform.
    pub fn for_context(data: &'a [u8], ctx: &VersionContext) -> Self {
        Self::new(data, ctx.endianness())
    }

    pub fn with_stopper(mut self, stopper: usize) -> Self {
        self.stopper = stopper.min(self.data.len());
        self
    }

    pub fn endianness(&self) -> Endianness {
        self.endian
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn stopper(&self) -> usize {
        self.stopper
    }

    /// Bytes left before the stopper.
    pub fn remaining(&self) -> usize {
        self.stopper.saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) -> DecodeResult<()> {
        if pos > self.stopper {
            return Err(DecodeError::malformed(
                self.pos,
                format!("seek to 0x{pos:X} past stopper 0x{:X}", self.stopper),
            ));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn seek_to_stopper(&mut self) {
        if self.pos != self.stopper {
            trace!(from = self.pos, to = self.stopper, "seeking to stopper");
        }
        self.pos = self.stopper;
    }

    pub fn skip(&mut self, n: usize) -> DecodeResult<()> {
        self.read(n).map(|_| ())
    }

    /// Round the position up to a multiple of `n`.
    pub fn align(&mut self, n: usize) -> DecodeResult<()> {
        if n <= 1 {
            return Ok(());
        }
        let aligned = self.pos.div_ceil(n) * n;
        self.seek(aligned)
    }

    pub fn read(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(DecodeError::malformed(
                self.pos,
                format!("need {n} bytes, {} left", self.remaining()),
            ));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Run a winnow parser at the current position and advance past what it consumed.
    pub fn parse<O>(
        &mut self,
        mut parser: impl Parser<&'a [u8], O, ErrMode<ContextError>>,
    ) -> DecodeResult<O> {
        let start = self.pos;
        let mut input = &self.data[self.pos..self.stopper.max(self.pos)];
        let before = input.len();
        let value = parser
            .parse_next(&mut input)
            .map_err(|e| parse_failure(start, e))?;
        self.pos += before - input.len();
        Ok(value)
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        self.parse(winnow::binary::u8)
    }

    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        self.parse(winnow::binary::u16(self.endian))
    }

    pub fn read_i16(&mut self) -> DecodeResult<i16> {
        self.parse(winnow::binary::i16(self.endian))
    }

    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        self.parse(winnow::binary::u32(self.endian))
    }

    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        self.parse(winnow::binary::i32(self.endian))
    }

    pub fn read_f32(&mut self) -> DecodeResult<f32> {
        self.parse(winnow::binary::f32(self.endian))
    }

    pub fn read_vector(&mut self) -> DecodeResult<Vector3> {
        self.parse(parser_utils::vector(self.endian))
    }

    pub fn read_quat(&mut self) -> DecodeResult<Quat> {
        self.parse(parser_utils::quat(self.endian))
    }

    pub fn read_packed_normal(&mut self) -> DecodeResult<PackedNormal> {
        self.parse(parser_utils::packed_normal(self.endian))
    }

    pub fn read_half_uv(&mut self) -> DecodeResult<[f32; 2]> {
        self.parse(parser_utils::half_uv(self.endian))
    }

    pub fn read_float_uv(&mut self) -> DecodeResult<[f32; 2]> {
        self.parse(parser_utils::float_uv(self.endian))
    }

    /// Engine string: positive length is a NUL-terminated 8-bit string, negative length
    /// is a NUL-terminated UTF-16 string of `-len` code units.
    pub fn read_fstring(&mut self) -> DecodeResult<String> {
        let start = self.pos;
        let len = self.read_i32()?;
        if len == 0 {
            return Ok(String::new());
        }
        if len > 0 {
            let bytes = self.read(len as usize)?;
            let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
            return Ok(String::from_utf8_lossy(bytes).into_owned());
        }
        let units = len.unsigned_abs() as usize;
        if units.saturating_mul(2) > self.remaining() {
            return Err(DecodeError::malformed(
                start,
                format!("wide string of {units} units overruns record"),
            ));
        }
        let mut wide = Vec::with_capacity(units);
        for _ in 0..units {
            wide.push(self.read_u16()?);
        }
        if wide.last() == Some(&0) {
            wide.pop();
        }
        Ok(String::from_utf16_lossy(&wide))
    }

    /// Read a count prefix and check that `count` elements of at least `min_element_size`
    /// bytes can fit in what is left.
    pub fn read_count(&mut self, min_element_size: usize) -> DecodeResult<usize> {
        let start = self.pos;
        let count = self.read_i32()?;
        self.check_count(start, count, min_element_size)
    }

    fn check_count(&self, at: usize, count: i32, min_element_size: usize) -> DecodeResult<usize> {
        if count < 0 {
            return Err(DecodeError::malformed(at, format!("negative count {count}")));
        }
        let count = count as usize;
        if count.saturating_mul(min_element_size.max(1)) > self.remaining() {
            return Err(DecodeError::malformed(
                at,
                format!(
                    "count {count} x {min_element_size} bytes exceeds the {} bytes left",
                    self.remaining()
                ),
            ));
        }
        Ok(count)
    }

    /// Count-prefixed array.
    pub fn read_array<T>(
        &mut self,
        min_element_size: usize,
        mut read_one: impl FnMut(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<Vec<T>> {
        let count = self.read_count(min_element_size)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(read_one(self)?);
        }
        Ok(items)
    }

    /// Array serialized in bulk: element size, count, then the payload. The bytes
    /// consumed must equal `element size * count`.
    pub fn read_bulk_array<T>(
        &mut self,
        mut read_one: impl FnMut(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<Vec<T>> {
        let header = self.pos;
        let element_size = self.read_i32()?;
        if element_size < 0 {
            return Err(DecodeError::malformed(
                header,
                format!("negative bulk element size {element_size}"),
            ));
        }
        let count = self.read_count(element_size as usize)?;
        let start = self.pos;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(read_one(self)?);
        }
        let expected = element_size as usize * count;
        let consumed = self.pos - start;
        if consumed != expected {
            return Err(DecodeError::malformed(
                header,
                format!(
                    "bulk array of {count} x {element_size} bytes consumed {consumed} bytes"
                ),
            ));
        }
        Ok(items)
    }

    /// Skip a bulk array without looking at its elements.
    pub fn skip_bulk_array(&mut self) -> DecodeResult<()> {
        let element_size = self.read_i32()?;
        let at = self.pos;
        let count = self.read_i32()?;
        if element_size < 0 || count < 0 {
            return Err(DecodeError::malformed(
                at,
                format!("bad bulk array shape {count} x {element_size}"),
            ));
        }
        self.skip(element_size as usize * count as usize)
    }

    pub fn read_bulk_data_header(&mut self) -> DecodeResult<BulkDataHeader> {
        Ok(BulkDataHeader {
            flags: self.read_u32()?,
            element_count: self.read_i32()?,
            size_on_disk: self.read_i32()?,
            offset_in_file: self.read_i32()?,
        })
    }

    /// Skip an inline bulk payload, leaving the cursor after it. Returns the header so
    /// callers can compare the element count with their own.
    pub fn skip_bulk_data(&mut self) -> DecodeResult<BulkDataHeader> {
        let at = self.pos;
        let header = self.read_bulk_data_header()?;
        if header.is_inline() {
            if header.size_on_disk < 0 {
                return Err(DecodeError::malformed(
                    at,
                    format!("negative bulk size {}", header.size_on_disk),
                ));
            }
            self.skip(header.size_on_disk as usize)?;
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::ByteWriter;

    #[test]
    fn primitive_reads_follow_endianness() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut le = ByteCursor::new(&data, Endianness::Little);
        assert_eq!(le.read_u32().unwrap(), 0x0403_0201);
        let mut be = ByteCursor::new(&data, Endianness::Big);
        assert_eq!(be.read_u32().unwrap(), 0x0102_0304);
        assert_eq!(be.remaining(), 0);
    }

    #[test]
    fn align_rounds_up() {
        let data = [0u8; 16];
        let mut c = ByteCursor::new(&data, Endianness::Little);
        c.skip(5).unwrap();
        c.align(4).unwrap();
        assert_eq!(c.tell(), 8);
        c.align(4).unwrap();
        assert_eq!(c.tell(), 8);
    }

    #[test]
    fn reads_stop_at_stopper() {
        let data = [0u8; 16];
        let mut c = ByteCursor::new(&data, Endianness::Little).with_stopper(6);
        assert_eq!(c.remaining(), 6);
        c.read_i32().unwrap();
        assert!(matches!(
            c.read_i32(),
            Err(DecodeError::MalformedStream { offset: 4, .. })
        ));
        c.seek_to_stopper();
        assert_eq!(c.tell(), 6);
    }

    #[test]
    fn negative_and_oversized_counts_are_malformed() {
        let data = ByteWriter::new().i32(-1).finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        assert!(c.read_array(4, |c| c.read_i32()).is_err());

        let data = ByteWriter::new().i32(1000).i32(1).finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        assert!(c.read_array(4, |c| c.read_i32()).is_err());
    }

    #[test]
    fn bulk_array_checks_element_size() {
        let data = ByteWriter::new().i32(4).i32(2).i32(7).i32(9).finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        assert_eq!(c.read_bulk_array(|c| c.read_i32()).unwrap(), vec![7, 9]);

        let data = ByteWriter::new().i32(6).i32(2).i32(7).i32(9).i32(0).finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        assert!(c.read_bulk_array(|c| c.read_i32()).is_err());
    }

    #[test]
    fn bulk_data_skips_inline_payload_only() {
        let data = ByteWriter::new()
            .u32(0)
            .i32(3)
            .i32(6)
            .i32(0)
            .bytes(&[1, 2, 3, 4, 5, 6])
            .u32(BULKDATA_STORE_IN_SEPARATE_FILE)
            .i32(3)
            .i32(6)
            .i32(128)
            .finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let inline = c.skip_bulk_data().unwrap();
        assert_eq!(inline.element_count, 3);
        assert_eq!(c.tell(), 22);
        let external = c.skip_bulk_data().unwrap();
        assert!(!external.is_inline());
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn fstrings() {
        let data = ByteWriter::new()
            .i32(4)
            .bytes(b"abc\0")
            .i32(-2)
            .u16(u16::from(b'h'))
            .u16(0)
            .finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        assert_eq!(c.read_fstring().unwrap(), "abc");
        assert_eq!(c.read_fstring().unwrap(), "h");
    }
}
