//! Little-endian writer for building synthetic record streams in tests.

use crate::codecs::{PackedNormal, Vector3};

#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn bytes(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn zeros(self, n: usize) -> Self {
        self.bytes(&vec![0; n])
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16(self, v: u16) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn i16(self, v: i16) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u32(self, v: u32) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn i32(self, v: i32) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn f32(self, v: f32) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn vec3(self, v: Vector3) -> Self {
        self.f32(v.x).f32(v.y).f32(v.z)
    }

    pub fn normal(self, n: PackedNormal) -> Self {
        self.u32(n.0)
    }

    pub fn half(self, v: f32) -> Self {
        self.u16(half::f16::from_f32(v).to_bits())
    }

    /// Pad with zeros up to the next multiple of `n`.
    pub fn align(self, n: usize) -> Self {
        let pad = self.buf.len().div_ceil(n) * n - self.buf.len();
        self.zeros(pad)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
