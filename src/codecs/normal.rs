use super::Vector3;

/// Two packed normals are considered the same direction when no signed component byte
/// differs by more than this.
pub const WELD_TOLERANCE: i32 = 10;

/// Tangent-space vector packed into one 32-bit word: x, y and z in the low three bytes,
/// a handedness byte on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackedNormal(pub u32);

impl PackedNormal {
    pub fn from_bytes(x: u8, y: u8, z: u8, w: u8) -> Self {
        PackedNormal(u32::from_le_bytes([x, y, z, w]))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    fn byte(&self, index: u32) -> u8 {
        ((self.0 >> (index * 8)) & 0xFF) as u8
    }

    pub fn to_vector(&self) -> Vector3 {
        Vector3::new(
            self.byte(0) as f32 / 127.5 - 1.0,
            self.byte(1) as f32 / 127.5 - 1.0,
            self.byte(2) as f32 / 127.5 - 1.0,
        )
    }

    /// Handedness sign. A zero top byte yields exactly `-1.0`.
    pub fn w(&self) -> f32 {
        ((self.0 >> 24) as f64 / 127.5 - 1.0) as f32
    }

    /// The three vector bytes reinterpreted as signed.
    pub fn components(&self) -> [i8; 3] {
        [self.byte(0) as i8, self.byte(1) as i8, self.byte(2) as i8]
    }

    pub fn is_close(&self, other: &PackedNormal) -> bool {
        self.components()
            .iter()
            .zip(other.components())
            .all(|(a, b)| (*a as i32 - b as i32).abs() <= WELD_TOLERANCE)
    }
}
