//! Shared winnow-based parsers for the engine's primitive value types.

use winnow::Parser;
use winnow::binary::{Endianness, f32, u16, u32};
use winnow::error::{ContextError, ErrMode};

use crate::codecs::{PackedNormal, Quat, Vector3, half_to_f32};

pub fn vector<'i>(endian: Endianness) -> impl Parser<&'i [u8], Vector3, ErrMode<ContextError>> {
    (f32(endian), f32(endian), f32(endian)).map(|(x, y, z)| Vector3::new(x, y, z))
}

pub fn quat<'i>(endian: Endianness) -> impl Parser<&'i [u8], Quat, ErrMode<ContextError>> {
    (f32(endian), f32(endian), f32(endian), f32(endian)).map(|(x, y, z, w)| Quat { x, y, z, w })
}

/// Packed normals are a single 32-bit word, so byte order is resolved before the
/// components are split.
pub fn packed_normal<'i>(
    endian: Endianness,
) -> impl Parser<&'i [u8], PackedNormal, ErrMode<ContextError>> {
    u32(endian).map(PackedNormal)
}

pub fn half_uv<'i>(endian: Endianness) -> impl Parser<&'i [u8], [f32; 2], ErrMode<ContextError>> {
    (u16(endian), u16(endian)).map(|(u, v)| [half_to_f32(u), half_to_f32(v)])
}

pub fn float_uv<'i>(endian: Endianness) -> impl Parser<&'i [u8], [f32; 2], ErrMode<ContextError>> {
    (f32(endian), f32(endian)).map(|(u, v)| [u, v])
}

/// Three 16-bit words, the storage unit of every 48-bit codec.
pub fn words3<'i>(endian: Endianness) -> impl Parser<&'i [u8], [u16; 3], ErrMode<ContextError>> {
    (u16(endian), u16(endian), u16(endian)).map(|(a, b, c)| [a, b, c])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_reads_three_floats() {
        let mut bytes = Vec::new();
        for v in [1.0f32, -2.0, 0.5] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let v = vector(Endianness::Big).parse_next(&mut &bytes[..]).unwrap();
        assert_eq!(v, Vector3::new(1.0, -2.0, 0.5));
    }

    #[test]
    fn words3_consumes_six_bytes() {
        let bytes = [1u8, 0, 2, 0, 3, 0, 9];
        let input = &mut &bytes[..];
        assert_eq!(words3(Endianness::Little).parse_next(input).unwrap(), [1, 2, 3]);
        assert_eq!(input.len(), 1);
    }
}
