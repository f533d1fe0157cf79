use super::Vector3;

const FIXED48_SCALE: f32 = 128.0 / 32767.0;

/// Three biased 16-bit values covering ±128 units.
pub fn decode_vector_fixed48(words: [u16; 3]) -> Vector3 {
    let [x, y, z] = words.map(|v| (v as i32 - 32767) as f32 * FIXED48_SCALE);
    Vector3::new(x, y, z)
}

/// 10/11/11 split with X in the low 10 bits.
pub fn decode_vector_interval_fixed32(d: u32, min: Vector3, range: Vector3) -> Vector3 {
    let x = d & 0x3FF;
    let y = (d >> 10) & 0x7FF;
    let z = d >> 21;
    Vector3::new(
        (x as f32 / 511.0 - 1.0) * range.x + min.x,
        (y as f32 / 1023.0 - 1.0) * range.y + min.y,
        (z as f32 / 1023.0 - 1.0) * range.z + min.z,
    )
}

pub fn decode_vector_delta48(
    words: [u16; 3],
    min: Vector3,
    range: Vector3,
    base: Vector3,
) -> Vector3 {
    let [x, y, z] = words;
    Vector3::new(
        x as f32 / 65535.0 * range.x + min.x + base.x,
        y as f32 / 65535.0 * range.y + min.y + base.y,
        z as f32 / 65535.0 * range.z + min.z + base.z,
    )
}

/// Unbiased 11/10/11 split (Z low) scaled into `offset .. offset + scale`.
pub fn decode_packed_vector_trans(d: u32, offset: Vector3, scale: Vector3) -> Vector3 {
    let z = d & 0x7FF;
    let y = (d >> 11) & 0x3FF;
    let x = d >> 21;
    Vector3::new(
        x as f32 / 2047.0 * scale.x + offset.x,
        y as f32 / 1023.0 * scale.y + offset.y,
        z as f32 / 2047.0 * scale.z + offset.z,
    )
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Signed 11/11/10 fields (X low) used by packed GPU vertex positions, scaled around the
/// mesh origin by its extension.
pub fn decode_vector_interval_fixed32_gpu(d: u32, min: Vector3, range: Vector3) -> Vector3 {
    let x = sign_extend(d & 0x7FF, 11);
    let y = sign_extend((d >> 11) & 0x7FF, 11);
    let z = sign_extend(d >> 22, 10);
    Vector3::new(
        (x as f32 / 1023.0) * range.x + min.x,
        (y as f32 / 1023.0) * range.y + min.y,
        (z as f32 / 511.0) * range.z + min.z,
    )
}
