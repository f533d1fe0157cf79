use super::{Quat, Vector3};

const MAX_SHIFT: f32 = 0.707_106_77; // sqrt(0.5)
const MAX_SCALE: f32 = 1.414_213_5; // 2 * sqrt(0.5)

/// Rebuild W from the three stored components of a unit quaternion. Lossy encodings can
/// push `x² + y² + z²` past one; W is then 0 rather than NaN.
pub fn restore_quat_w(x: f32, y: f32, z: f32) -> Quat {
    let w_sq = 1.0 - (x * x + y * y + z * z);
    let w = if w_sq > 0.0 { w_sq.sqrt() } else { 0.0 };
    Quat { x, y, z, w }
}

fn fixed16(v: u16) -> f32 {
    (v as i32 - 32767) as f32 / 32767.0
}

/// 11/11/10 split used by the 32-bit fixed codecs: X in the top 11 bits, Z in the low 10.
fn split_11_11_10(d: u32) -> (u32, u32, u32) {
    (d >> 21, (d >> 10) & 0x7FF, d & 0x3FF)
}

pub fn decode_fixed48_no_w(words: [u16; 3]) -> Quat {
    restore_quat_w(fixed16(words[0]), fixed16(words[1]), fixed16(words[2]))
}

pub fn decode_fixed32_no_w(d: u32) -> Quat {
    let (x, y, z) = split_11_11_10(d);
    restore_quat_w(
        x as f32 / 1023.0 - 1.0,
        y as f32 / 1023.0 - 1.0,
        z as f32 / 511.0 - 1.0,
    )
}

pub fn decode_interval_fixed32_no_w(d: u32, min: Vector3, range: Vector3) -> Quat {
    let (x, y, z) = split_11_11_10(d);
    restore_quat_w(
        (x as f32 / 1023.0 - 1.0) * range.x + min.x,
        (y as f32 / 1023.0 - 1.0) * range.y + min.y,
        (z as f32 / 511.0 - 1.0) * range.z + min.z,
    )
}

pub fn decode_interval_fixed48_no_w(words: [u16; 3], min: Vector3, range: Vector3) -> Quat {
    restore_quat_w(
        fixed16(words[0]) * range.x + min.x,
        fixed16(words[1]) * range.y + min.y,
        fixed16(words[2]) * range.z + min.z,
    )
}

/// 11/11/10-bit mini floats: sign bit, 3 exponent bits biased around 2^-4, and 7 (X, Y) or
/// 6 (Z) mantissa bits, widened straight into IEEE single bit patterns.
pub fn decode_float32_no_w(d: u32) -> Quat {
    let (x, y, z) = split_11_11_10(d);
    let wide = |v: u32| -> u32 {
        ((((v >> 7) & 7) + 123) << 23) | (((v & 0x7F) | (32 * (v & 0xFFFF_FC00))) << 16)
    };
    let z_bits = ((((z >> 6) & 7) + 123) << 23) | (((z & 0x3F) | (32 * (z & 0xFFFF_FE00))) << 17);
    restore_quat_w(
        f32::from_bits(wide(x)),
        f32::from_bits(wide(y)),
        f32::from_bits(z_bits),
    )
}

/// `a` is the dropped largest component, `s` says where it goes in x, y, z, w order.
fn place_largest(s: u32, a: f32, l: f32, m: f32, h: f32) -> Quat {
    let [x, y, z, w] = match s {
        0 => [a, l, m, h],
        1 => [l, a, m, h],
        2 => [l, m, a, h],
        _ => [l, m, h, a],
    };
    Quat { x, y, z, w }
}

fn largest_from_rest(l: f32, m: f32, h: f32) -> f32 {
    let sq = 1.0 - (l * l + m * m + h * h);
    if sq > 0.0 { sq.sqrt() } else { 0.0 }
}

/// 48 bits laid out as `H[15] : M[15] : L[15] : S[2]` from the top, bit 47 unused.
pub fn decode_fixed48_max(words: [u16; 3]) -> Quat {
    let [d0, d1, d2] = words.map(u32::from);
    let lo = (d1 << 16) | d0;
    let s = lo & 3;
    let l_raw = (lo >> 2) & 0x7FFF;
    let hi = (d2 << 16) | d1;
    let m_raw = (hi >> 1) & 0x7FFF;
    let h_raw = (hi >> 16) & 0x7FFF;

    let unpack = |v: u32| (v as f32 - 0.5) / 32767.0 * MAX_SCALE - MAX_SHIFT;
    let (l, m, h) = (unpack(l_raw), unpack(m_raw), unpack(h_raw));
    place_largest(s, largest_from_rest(l, m, h), l, m, h)
}

/// Three 15-bit values; the position of the dropped component is packed into the top bits of
/// the first two words.
pub fn decode_bio_fixed48(words: [u16; 3]) -> Quat {
    let unpack = |v: u16| (v & 0x7FFF) as f32 / 32767.0 * MAX_SCALE - MAX_SHIFT;
    let (x, y, z) = (unpack(words[0]), unpack(words[1]), unpack(words[2]));
    let s = (((words[0] >> 14) & 2) | ((words[1] >> 15) & 1)) as u32;
    place_largest(s, largest_from_rest(x, y, z), x, y, z)
}

/// Offset from the previous key. The top bit of Z carries the sign of W.
pub fn decode_delta48_no_w(words: [u16; 3], min: Vector3, range: Vector3, base: Quat) -> Quat {
    let [x, y, z] = words;
    let negative_w = z >> 15 != 0;
    let mut q = restore_quat_w(
        x as f32 / 65535.0 * range.x + min.x + base.x,
        y as f32 / 65535.0 * range.y + min.y + base.y,
        (z & 0x7FFF) as f32 / 32767.0 * range.z + min.z + base.z,
    );
    if negative_w {
        q.w = -q.w;
    }
    q
}

/// Post-transform applied to every interval-48 rotation key of a Transformers track:
/// the key is multiplied on the right by the track's modifier quaternion.
pub fn transformers_modify_quat(q: Quat, m: Quat) -> Quat {
    let Quat { x, y, z, w } = q;
    let Quat {
        x: sx,
        y: sy,
        z: sz,
        w: sw,
    } = m;

    let a = (sy - sz) * (z - y);
    let b = (sz + sy) * (w - x);
    let c = (sw - sx) * (z + y);
    let d = (sw + sz) * (w - y) + (sw - sz) * (w + y) + (sx + sy) * (x + z);
    let e = (d + (sx - sy) * (z - x)) / 2.0;

    Quat {
        x: (sx + sw) * (x + w) + e - d,
        y: -(sw + sz) * (w - y) + e + b,
        z: -(sw - sz) * (w + y) + e + c,
        w: -(sx + sy) * (x + z) + e + a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quats() -> Vec<Quat> {
        let raw: [[f32; 4]; 5] = [
            [0.0, 0.0, 0.0, 1.0],
            [0.5, 0.5, 0.5, 0.5],
            [0.1, -0.2, 0.3, 0.927],
            [-0.7, 0.1, 0.0, 0.707],
            [0.0, 0.0, 0.999, 0.045],
        ];
        raw.iter()
            .map(|&[x, y, z, w]| {
                let n = (x * x + y * y + z * z + w * w).sqrt();
                Quat {
                    x: x / n,
                    y: y / n,
                    z: z / n,
                    w: w / n,
                }
            })
            .collect()
    }

    fn to_fixed16(v: f32) -> u16 {
        ((v + 1.0) * 32767.0).round() as u16
    }

    fn to_bits(v: f32, max: f32) -> u32 {
        ((v + 1.0) * max).round() as u32
    }

    fn assert_unit_with_positive_w(q: Quat, tolerance: f32) {
        assert!(q.w >= 0.0, "{q:?}");
        assert!((q.length_squared() - 1.0).abs() < tolerance, "{q:?}");
    }

    #[test]
    fn restore_w_clamps() {
        let q = restore_quat_w(0.8, 0.8, 0.0);
        assert_eq!(q.w, 0.0);
        let q = restore_quat_w(0.0, 0.6, 0.0);
        assert!((q.w - 0.8).abs() < 1e-6);
    }

    #[test]
    fn fixed48_no_w_stays_unit() {
        for q in unit_quats() {
            let words = [to_fixed16(q.x), to_fixed16(q.y), to_fixed16(q.z)];
            let d = decode_fixed48_no_w(words);
            assert_unit_with_positive_w(d, 1e-3);
            // Half a quantization step per component.
            assert!((d.x - q.x).abs() <= 0.5 / 32767.0 + 1e-6);
            assert!((d.z - q.z).abs() <= 0.5 / 32767.0 + 1e-6);
        }
    }

    #[test]
    fn fixed48_zero_point() {
        let q = decode_fixed48_no_w([32767, 32767, 32767]);
        assert_eq!(q, Quat::IDENTITY);
    }

    #[test]
    fn fixed32_no_w_field_order() {
        for q in unit_quats() {
            let d =
                (to_bits(q.x, 1023.0) << 21) | (to_bits(q.y, 1023.0) << 10) | to_bits(q.z, 511.0);
            let r = decode_fixed32_no_w(d);
            assert_unit_with_positive_w(r, 5e-3);
            assert!((r.x - q.x).abs() <= 0.5 / 1023.0 + 1e-6);
            assert!((r.z - q.z).abs() <= 0.5 / 511.0 + 1e-6);
        }
    }

    #[test]
    fn interval_fixed32_applies_min_and_range() {
        // Every field at its midpoint encodes zero before scaling.
        let d = (1023 << 21) | (1023 << 10) | 511;
        let q = decode_interval_fixed32_no_w(
            d,
            Vector3::new(0.1, 0.2, 0.3),
            Vector3::new(5.0, 5.0, 5.0),
        );
        assert!((q.x - 0.1).abs() < 1e-6);
        assert!((q.y - 0.2).abs() < 1e-6);
        assert!((q.z - 0.3).abs() < 1e-6);
        assert!(q.w > 0.0);
    }

    #[test]
    fn float32_no_w_bit_recipe() {
        let q = decode_float32_no_w(0);
        assert_eq!(q.x, 0.0625);
        assert_eq!(q.y, 0.0625);
        assert_eq!(q.z, 0.0625);
        assert_unit_with_positive_w(q, 1e-6);

        // X sign bit set, exponent field 3 -> 2^-1.
        let x = 0x400 | (3 << 7);
        let q = decode_float32_no_w(x << 21);
        assert_eq!(q.x, -0.5);
        assert!(q.w >= 0.0);
    }

    #[test]
    fn fixed48_max_places_largest_component() {
        // All three stored values at their midpoint decode to ~0, so the rebuilt component
        // is ~1 and lands wherever S says.
        let mid = 16384u32;
        for s in 0..4u32 {
            let bits: u64 = s as u64 | (mid as u64) << 2 | (mid as u64) << 17 | (mid as u64) << 32;
            let words = [bits as u16, (bits >> 16) as u16, (bits >> 32) as u16];
            let q = decode_fixed48_max(words);
            let parts = [q.x, q.y, q.z, q.w];
            assert!(parts[s as usize] > 0.999, "{s}: {q:?}");
            assert!((q.length_squared() - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn fixed48_max_never_produces_nan() {
        let q = decode_fixed48_max([0xFFFF, 0xFFFF, 0xFFFF]);
        assert!(!q.x.is_nan() && !q.y.is_nan() && !q.z.is_nan() && !q.w.is_nan());
    }

    #[test]
    fn bio_fixed48_selector_bits() {
        let mid = 16384u16;
        let q = decode_bio_fixed48([mid, mid, mid]);
        assert!(q.x > 0.999);
        let q = decode_bio_fixed48([mid | 0x8000, mid | 0x8000, mid]);
        assert!(q.w > 0.999);
        let q = decode_bio_fixed48([mid, mid | 0x8000, mid]);
        assert!(q.y > 0.999);
    }

    #[test]
    fn delta48_sign_bit_negates_w() {
        let base = Quat {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        };
        let min = Vector3::ZERO;
        let range = Vector3::new(0.1, 0.1, 0.1);
        let pos = decode_delta48_no_w([0, 0, 0], min, range, base);
        let neg = decode_delta48_no_w([0, 0, 0x8000], min, range, base);
        assert_eq!(pos.w, 1.0);
        assert_eq!(neg.w, -1.0);
        assert_eq!(pos.xyz(), neg.xyz());
    }

    #[test]
    fn modifier_is_right_multiplication() {
        let q = Quat {
            x: 0.1,
            y: 0.2,
            z: 0.3,
            w: 0.927,
        };
        let same = transformers_modify_quat(q, Quat::IDENTITY);
        assert!((same.length_squared() - q.length_squared()).abs() < 1e-5);
        assert!((same.x - q.x).abs() < 1e-6 && (same.w - q.w).abs() < 1e-6);

        let m = Quat {
            x: 0.5,
            y: -0.5,
            z: 0.5,
            w: 0.5,
        };
        let r = transformers_modify_quat(q, m);
        let expected = [0.7635, -0.2635, 0.4635, 0.3635];
        for (got, want) in [r.x, r.y, r.z, r.w].iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{r:?}");
        }
    }
}
