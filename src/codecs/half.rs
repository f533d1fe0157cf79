/// Expand a binary16 value to `f32` by rebiasing the exponent and widening the mantissa.
///
/// Zero, subnormal, infinity and NaN inputs get no special treatment: a zero exponent is
/// rebiased like any other, so `0x0000` decodes to `2^-15`. Existing exported assets
/// were produced with exactly this mapping.
pub fn half_to_f32(h: u16) -> f32 {
    let sign = ((h >> 15) & 1) as u32;
    let exp = ((h >> 10) & 0x1F) as u32 + (127 - 15);
    let mant = (h & 0x3FF) as u32;
    f32::from_bits((sign << 31) | (exp << 23) | (mant << 13))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_ieee_for_normal_values() {
        for v in [1.0f32, -2.5, 0.333, 65504.0, 6.1035156e-5, -0.75] {
            let bits = ::half::f16::from_f32(v).to_bits();
            assert_eq!(half_to_f32(bits), ::half::f16::from_bits(bits).to_f32(), "{v}");
        }
    }

    #[test]
    fn zero_is_not_special_cased() {
        assert_eq!(half_to_f32(0x0000), 2.0f32.powi(-15));
        assert_eq!(half_to_f32(0x8000), -(2.0f32.powi(-15)));
    }
}
