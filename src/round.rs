//! Outward-rounding helpers shared by every numeric domain.
//!
//! Interval and affine arithmetic over IEEE doubles is only sound if every
//! computed bound is widened by at least one unit-in-last-place: the hardware
//! rounds to nearest, so a raw result may under-enclose the exact image.
//! Every arithmetic primitive in this crate routes its bounds through
//! [`minus_ulp`] (lower) and [`plus_ulp`] (upper).

/// The distance from `x` to the next representable double of larger magnitude.
///
/// Returns `0.0` for non-finite inputs, so infinite bounds pass through the
/// widening helpers unchanged (`inf - ulp(inf)` would otherwise be NaN).
pub fn ulp(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    let bits = x.to_bits() & !(1u64 << 63);
    if bits == f64::MAX.to_bits() {
        // Stepping up from MAX would overflow to infinity.
        return f64::MAX - f64::from_bits(bits - 1);
    }
    f64::from_bits(bits + 1) - f64::from_bits(bits)
}

/// `x` widened upward by one ulp. Non-finite values are returned unchanged.
pub fn plus_ulp(x: f64) -> f64 {
    x + ulp(x)
}

/// `x` widened downward by one ulp. Non-finite values are returned unchanged.
pub fn minus_ulp(x: f64) -> f64 {
    x - ulp(x)
}
