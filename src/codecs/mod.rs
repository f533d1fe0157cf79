//! Fixed-point, interval, delta and mini-float decoders for the compressed quantities
//! found in mesh and animation records.

mod half;
mod normal;
mod quat;
mod vector;

use std::ops::{Add, Mul, Neg, Sub};

pub use half::half_to_f32;
pub use normal::{PackedNormal, WELD_TOLERANCE};
pub use quat::*;
pub use vector::*;

use crate::data::ByteCursor;
use crate::error::DecodeResult;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Vector3 { x, y, z }
    }

    pub fn cross(self, other: Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn dot(self, other: Vector3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f32) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;

    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    pub fn xyz(&self) -> Vector3 {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl Default for Quat {
    fn default() -> Self {
        Quat::IDENTITY
    }
}

/// Rotation key encodings. Interval variants carry the `(min, range)` pair read before the
/// key loop and the delta variant carries the running base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuatCodec {
    /// Full four-float quaternion.
    Float128,
    Float96NoW,
    Fixed48NoW,
    Fixed32NoW,
    Float32NoW,
    IntervalFixed32NoW { min: Vector3, range: Vector3 },
    IntervalFixed48NoW { min: Vector3, range: Vector3 },
    Delta48NoW { min: Vector3, range: Vector3, base: Quat },
    Fixed48Max,
    BioFixed48,
    /// No payload, every key is the identity rotation.
    Identity,
}

impl QuatCodec {
    pub fn key_size(&self) -> usize {
        match self {
            QuatCodec::Float128 => 16,
            QuatCodec::Float96NoW => 12,
            QuatCodec::Fixed48NoW
            | QuatCodec::IntervalFixed48NoW { .. }
            | QuatCodec::Delta48NoW { .. }
            | QuatCodec::Fixed48Max
            | QuatCodec::BioFixed48 => 6,
            QuatCodec::Fixed32NoW
            | QuatCodec::Float32NoW
            | QuatCodec::IntervalFixed32NoW { .. } => 4,
            QuatCodec::Identity => 0,
        }
    }

    /// Decode one key. Delta codecs advance their base to the decoded value.
    pub fn read_key(&mut self, cursor: &mut ByteCursor<'_>) -> DecodeResult<Quat> {
        let q = match self {
            QuatCodec::Float128 => cursor.read_quat()?,
            QuatCodec::Float96NoW => {
                let v = cursor.read_vector()?;
                restore_quat_w(v.x, v.y, v.z)
            }
            QuatCodec::Fixed48NoW => decode_fixed48_no_w(read_words(cursor)?),
            QuatCodec::Fixed32NoW => decode_fixed32_no_w(cursor.read_u32()?),
            QuatCodec::Float32NoW => decode_float32_no_w(cursor.read_u32()?),
            QuatCodec::IntervalFixed32NoW { min, range } => {
                decode_interval_fixed32_no_w(cursor.read_u32()?, *min, *range)
            }
            QuatCodec::IntervalFixed48NoW { min, range } => {
                decode_interval_fixed48_no_w(read_words(cursor)?, *min, *range)
            }
            QuatCodec::Delta48NoW { min, range, base } => {
                let q = decode_delta48_no_w(read_words(cursor)?, *min, *range, *base);
                *base = q;
                q
            }
            QuatCodec::Fixed48Max => decode_fixed48_max(read_words(cursor)?),
            QuatCodec::BioFixed48 => decode_bio_fixed48(read_words(cursor)?),
            QuatCodec::Identity => Quat::IDENTITY,
        };
        Ok(q)
    }
}

/// Translation key encodings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VectorCodec {
    Float96,
    Fixed48,
    IntervalFixed32 { min: Vector3, range: Vector3 },
    Delta48 { min: Vector3, range: Vector3, base: Vector3 },
    PackedTrans { offset: Vector3, scale: Vector3 },
    Identity,
}

impl VectorCodec {
    pub fn key_size(&self) -> usize {
        match self {
            VectorCodec::Float96 => 12,
            VectorCodec::Fixed48 | VectorCodec::Delta48 { .. } => 6,
            VectorCodec::IntervalFixed32 { .. } | VectorCodec::PackedTrans { .. } => 4,
            VectorCodec::Identity => 0,
        }
    }

    pub fn read_key(&mut self, cursor: &mut ByteCursor<'_>) -> DecodeResult<Vector3> {
        let v = match self {
            VectorCodec::Float96 => cursor.read_vector()?,
            VectorCodec::Fixed48 => decode_vector_fixed48(read_words(cursor)?),
            VectorCodec::IntervalFixed32 { min, range } => {
                decode_vector_interval_fixed32(cursor.read_u32()?, *min, *range)
            }
            VectorCodec::Delta48 { min, range, base } => {
                let v = decode_vector_delta48(read_words(cursor)?, *min, *range, *base);
                *base = v;
                v
            }
            VectorCodec::PackedTrans { offset, scale } => {
                decode_packed_vector_trans(cursor.read_u32()?, *offset, *scale)
            }
            VectorCodec::Identity => Vector3::ZERO,
        };
        Ok(v)
    }
}

fn read_words(cursor: &mut ByteCursor<'_>) -> DecodeResult<[u16; 3]> {
    let endian = cursor.endianness();
    cursor.parse(crate::data::parser_utils::words3(endian))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::ByteWriter;
    use winnow::binary::Endianness;

    #[test]
    fn cross_product_is_right_handed() {
        let x = Vector3::new(1.0, 0.0, 0.0);
        let y = Vector3::new(0.0, 1.0, 0.0);
        assert_eq!(x.cross(y), Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn delta_codec_advances_base() {
        let data = ByteWriter::new().u16(65535).u16(0).u16(0).u16(65535).u16(0).u16(0).finish();
        let mut cursor = ByteCursor::new(&data, Endianness::Little);
        let mut codec = VectorCodec::Delta48 {
            min: Vector3::ZERO,
            range: Vector3::new(1.0, 1.0, 1.0),
            base: Vector3::new(10.0, 0.0, 0.0),
        };
        assert_eq!(codec.read_key(&mut cursor).unwrap().x, 11.0);
        assert_eq!(codec.read_key(&mut cursor).unwrap().x, 12.0);
    }

    #[test]
    fn identity_consumes_nothing() {
        let data = [0u8; 4];
        let mut cursor = ByteCursor::new(&data, Endianness::Little);
        assert_eq!(QuatCodec::Identity.read_key(&mut cursor).unwrap(), Quat::IDENTITY);
        assert_eq!(cursor.tell(), 0);
    }
}
