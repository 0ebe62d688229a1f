//! Saturating integer intervals.
//!
//! [`IntegerInterval`] is a closed range of `i64` values in which
//! `i64::MIN` and `i64::MAX` act as the infinity sentinels: any operation
//! whose exact result would leave the representable range saturates the
//! affected bound to the sentinel instead of wrapping. Arithmetic is thus
//! total and sound without a big-integer fallback.
//!
//! Non-linear operations (powers, roots, logarithms) go through the
//! floating-point [`Interval`][crate::interval::Interval] image and clamp
//! the result back to integers.

use std::fmt;
use std::str::FromStr;

use crate::interval::{Interval, ParseRangeError};
use crate::range::NumberRange;

/// A closed interval of machine integers with saturating bounds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IntegerInterval {
    pub min: i64,
    pub max: i64,
}

/// Saturating sum: overflow collapses to the sentinel of the sign.
fn add_sat(a: i64, b: i64) -> i64 {
    // The sentinels absorb regardless of the other operand.
    if a == i64::MAX || b == i64::MAX {
        return i64::MAX;
    }
    if a == i64::MIN || b == i64::MIN {
        return i64::MIN;
    }
    let sum = a.wrapping_add(b);
    // Overflow iff both operands share a sign the result lost.
    if (a >= 0) == (b >= 0) && (sum >= 0) != (a >= 0) {
        if a >= 0 {
            i64::MAX
        } else {
            i64::MIN
        }
    } else {
        sum
    }
}

fn sub_sat(a: i64, b: i64) -> i64 {
    if b == i64::MIN {
        return i64::MAX;
    }
    add_sat(a, -b)
}

/// Saturating product, verified by the inverse division.
fn mul_sat(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return 0;
    }
    let positive = (a > 0) == (b > 0);
    if a == i64::MAX || a == i64::MIN || b == i64::MAX || b == i64::MIN {
        return if positive { i64::MAX } else { i64::MIN };
    }
    let p = a.wrapping_mul(b);
    match p.checked_div(b) {
        Some(q) if q == a && (p > 0) == positive => p,
        _ => {
            if positive {
                i64::MAX
            } else {
                i64::MIN
            }
        }
    }
}

impl IntegerInterval {
    /// The empty set, `[MAX, MIN]`.
    pub const EMPTY: IntegerInterval = IntegerInterval {
        min: i64::MAX,
        max: i64::MIN,
    };

    /// All integers, `[MIN, MAX]`.
    pub const INTEGERS: IntegerInterval = IntegerInterval {
        min: i64::MIN,
        max: i64::MAX,
    };

    pub const fn new(min: i64, max: i64) -> Self {
        IntegerInterval { min, max }
    }

    pub const fn scalar(value: i64) -> Self {
        IntegerInterval {
            min: value,
            max: value,
        }
    }

    pub fn min_is_inf(&self) -> bool {
        self.min == i64::MIN
    }

    pub fn max_is_inf(&self) -> bool {
        self.max == i64::MAX
    }

    /// The floating-point interval covering the same values.
    pub fn as_real(&self) -> Interval {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        let lo = if self.min_is_inf() {
            f64::NEG_INFINITY
        } else {
            self.min as f64
        };
        let hi = if self.max_is_inf() {
            f64::INFINITY
        } else {
            self.max as f64
        };
        Interval::new(lo, hi)
    }

    /// Clamps a floating-point image back into an integer interval,
    /// rounding both bounds outward.
    fn from_real(range: Interval) -> IntegerInterval {
        if range.is_empty() {
            return IntegerInterval::EMPTY;
        }
        let lo = range.min.floor();
        let hi = range.max.ceil();
        let min = if lo <= i64::MIN as f64 { i64::MIN } else { lo as i64 };
        let max = if hi >= i64::MAX as f64 { i64::MAX } else { hi as i64 };
        IntegerInterval::new(min, max)
    }

    /// Remainder interval for `self % other`.
    ///
    /// For a divisor interval the result is bounded by the largest
    /// absolute divisor value; the sign follows the dividend.
    pub fn rem(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return IntegerInterval::EMPTY;
        }
        if other.contains(0) && other.is_scalar() {
            return IntegerInterval::EMPTY;
        }
        if other.min_is_inf() || other.max_is_inf() {
            return IntegerInterval::INTEGERS;
        }
        let bound = other.min.unsigned_abs().max(other.max.unsigned_abs());
        let bound = if bound > i64::MAX as u64 {
            i64::MAX
        } else {
            (bound as i64).saturating_sub(1)
        };
        let lo = if self.min < 0 { -bound } else { 0 };
        let hi = if self.max > 0 { bound } else { 0 };
        IntegerInterval::new(lo, hi)
    }

    /// `2^self`, saturating.
    pub fn power2(&self) -> Self {
        if self.is_empty() {
            return IntegerInterval::EMPTY;
        }
        let pow = |e: i64| -> i64 {
            if e < 0 {
                0
            } else if e >= 63 {
                i64::MAX
            } else {
                1i64 << e
            }
        };
        IntegerInterval::new(pow(self.min), pow(self.max))
    }
}

impl NumberRange<i64> for IntegerInterval {
    fn min(&self) -> i64 {
        self.min
    }

    fn max(&self) -> i64 {
        self.max
    }

    fn is_empty(&self) -> bool {
        self.min > self.max
    }

    fn is_zero(&self) -> bool {
        self.min == 0 && self.max == 0
    }

    fn is_one(&self) -> bool {
        self.min == 1 && self.max == 1
    }

    fn join(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        IntegerInterval::new(self.min.min(other.min), self.max.max(other.max))
    }

    fn intersect(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return IntegerInterval::EMPTY;
        }
        IntegerInterval::new(self.min.max(other.min), self.max.min(other.max))
    }

    fn add(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return IntegerInterval::EMPTY;
        }
        IntegerInterval::new(add_sat(self.min, other.min), add_sat(self.max, other.max))
    }

    fn add_scalar(&self, other: i64) -> Self {
        if self.is_empty() {
            return IntegerInterval::EMPTY;
        }
        IntegerInterval::new(add_sat(self.min, other), add_sat(self.max, other))
    }

    fn sub(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return IntegerInterval::EMPTY;
        }
        IntegerInterval::new(sub_sat(self.min, other.max), sub_sat(self.max, other.min))
    }

    fn sub_scalar(&self, other: i64) -> Self {
        if self.is_empty() {
            return IntegerInterval::EMPTY;
        }
        IntegerInterval::new(sub_sat(self.min, other), sub_sat(self.max, other))
    }

    fn mul(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return IntegerInterval::EMPTY;
        }
        let corners = [
            mul_sat(self.min, other.min),
            mul_sat(self.min, other.max),
            mul_sat(self.max, other.min),
            mul_sat(self.max, other.max),
        ];
        IntegerInterval::new(
            *corners.iter().min().unwrap(),
            *corners.iter().max().unwrap(),
        )
    }

    fn mul_scalar(&self, other: i64) -> Self {
        if self.is_empty() {
            return IntegerInterval::EMPTY;
        }
        let a = mul_sat(self.min, other);
        let b = mul_sat(self.max, other);
        IntegerInterval::new(a.min(b), a.max(b))
    }

    fn div(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return IntegerInterval::EMPTY;
        }
        if other.is_zero() {
            return IntegerInterval::EMPTY;
        }
        if other.contains(0) {
            return IntegerInterval::INTEGERS;
        }
        IntegerInterval::from_real(self.as_real() / other.as_real())
    }

    fn div_scalar(&self, other: i64) -> Self {
        self.div(&IntegerInterval::scalar(other))
    }

    fn neg(&self) -> Self {
        if self.is_empty() {
            return IntegerInterval::EMPTY;
        }
        // The sentinels swap; everything else negates exactly.
        let flip = |v: i64| match v {
            i64::MIN => i64::MAX,
            i64::MAX => i64::MIN,
            _ => -v,
        };
        IntegerInterval::new(flip(self.max), flip(self.min))
    }

    fn sqr(&self) -> Self {
        if self.is_empty() {
            return IntegerInterval::EMPTY;
        }
        let a = mul_sat(self.min, self.min);
        let b = mul_sat(self.max, self.max);
        let lo = if self.contains(0) { 0 } else { a.min(b) };
        IntegerInterval::new(lo, a.max(b))
    }

    fn sqrt(&self) -> Self {
        IntegerInterval::from_real(self.as_real().sqrt())
    }

    fn pow_scalar(&self, other: i64) -> Self {
        IntegerInterval::from_real(self.as_real().pow_scalar(other as f64))
    }

    fn pow(&self, other: &Self) -> Self {
        IntegerInterval::from_real(self.as_real().pow(&other.as_real()))
    }

    fn root(&self, other: &Self) -> Self {
        IntegerInterval::from_real(self.as_real().root(&other.as_real()))
    }

    fn exp(&self) -> Self {
        IntegerInterval::from_real(self.as_real().exp())
    }

    fn log(&self) -> Self {
        IntegerInterval::from_real(self.as_real().log())
    }

    fn log_base(&self, other: &Self) -> Self {
        IntegerInterval::from_real(self.as_real().log_base(&other.as_real()))
    }
}

impl std::ops::Add for IntegerInterval {
    type Output = IntegerInterval;
    fn add(self, rhs: IntegerInterval) -> IntegerInterval {
        NumberRange::add(&self, &rhs)
    }
}

impl std::ops::Sub for IntegerInterval {
    type Output = IntegerInterval;
    fn sub(self, rhs: IntegerInterval) -> IntegerInterval {
        NumberRange::sub(&self, &rhs)
    }
}

impl std::ops::Mul for IntegerInterval {
    type Output = IntegerInterval;
    fn mul(self, rhs: IntegerInterval) -> IntegerInterval {
        NumberRange::mul(&self, &rhs)
    }
}

impl std::ops::Neg for IntegerInterval {
    type Output = IntegerInterval;
    fn neg(self) -> IntegerInterval {
        NumberRange::neg(&self)
    }
}

impl fmt::Display for IntegerInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "∅");
        }
        if self.is_scalar() {
            return write!(f, "{}", self.min);
        }
        if self.min_is_inf() {
            write!(f, "[MIN .. ")?;
        } else {
            write!(f, "[{} .. ", self.min)?;
        }
        if self.max_is_inf() {
            write!(f, "MAX]")
        } else {
            write!(f, "{}]", self.max)
        }
    }
}

impl FromStr for IntegerInterval {
    type Err = ParseRangeError;

    /// Parses `[lo .. hi]`, `lo..hi`, or a single integer. `MIN` and
    /// `MAX` stand for the sentinels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('[').trim_end_matches(']');
        let bound = |t: &str| -> Result<i64, ParseRangeError> {
            match t {
                "MIN" => Ok(i64::MIN),
                "MAX" => Ok(i64::MAX),
                _ => t.parse::<i64>().map_err(|_| ParseRangeError::Bound(t.to_string())),
            }
        };
        let mut parts = s.splitn(2, "..");
        let min = bound(parts.next().unwrap_or("").trim())?;
        let max = match parts.next() {
            Some(t) => bound(t.trim())?,
            None => min,
        };
        Ok(IntegerInterval::new(min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xbool::XBool;

    #[test]
    fn test_exact_small_arithmetic() {
        let a = IntegerInterval::new(1, 1);
        let b = IntegerInterval::new(2, 2);
        assert_eq!(a + b, IntegerInterval::new(3, 3));
        assert_eq!(IntegerInterval::new(3, 3) - a, IntegerInterval::new(2, 2));
        assert_eq!(b * b, IntegerInterval::new(4, 4));
    }

    #[test]
    fn test_add_saturates_to_sentinel() {
        let a = IntegerInterval::new(1, i64::MAX);
        let b = IntegerInterval::new(1, i64::MAX);
        let c = a + b;
        assert_eq!(c, IntegerInterval::new(2, i64::MAX));

        let d = IntegerInterval::new(i64::MAX - 1, i64::MAX - 1);
        assert_eq!(d.add_scalar(10).max, i64::MAX);
        let e = IntegerInterval::new(i64::MIN + 1, i64::MIN + 1);
        assert_eq!(e.sub_scalar(10).min, i64::MIN);
    }

    #[test]
    fn test_sentinels_absorb() {
        let inf = IntegerInterval::INTEGERS;
        let a = IntegerInterval::new(-5, 5);
        assert_eq!(inf + a, IntegerInterval::INTEGERS);
        assert_eq!(inf - a, IntegerInterval::INTEGERS);
        assert_eq!(inf.neg(), IntegerInterval::INTEGERS);
    }

    #[test]
    fn test_mul_overflow_detection() {
        let a = IntegerInterval::scalar(1 << 40);
        let sq = a * a;
        assert_eq!(sq.max, i64::MAX);
        // The i64::MIN / -1 corner must not panic.
        let b = IntegerInterval::new(i64::MIN, i64::MIN);
        let c = b.mul_scalar(-1);
        assert_eq!(c.max, i64::MAX);
    }

    #[test]
    fn test_mul_signs() {
        let a = IntegerInterval::new(-2, 3);
        let b = IntegerInterval::new(-4, 5);
        let c = a * b;
        assert_eq!(c, IntegerInterval::new(-12, 15));
    }

    #[test]
    fn test_div() {
        let a = IntegerInterval::new(10, 20);
        let b = IntegerInterval::new(2, 5);
        let c = a.div(&b);
        assert!(c.contains(2) && c.contains(10));
        assert!(a.div(&IntegerInterval::new(-1, 1)) == IntegerInterval::INTEGERS);
        assert!(a.div_scalar(0).is_empty());
    }

    #[test]
    fn test_rem() {
        let a = IntegerInterval::new(0, 100);
        let m = a.rem(&IntegerInterval::scalar(7));
        assert_eq!(m, IntegerInterval::new(0, 6));
        let neg = IntegerInterval::new(-100, -1).rem(&IntegerInterval::scalar(7));
        assert_eq!(neg, IntegerInterval::new(-6, 0));
    }

    #[test]
    fn test_sqr_straddling() {
        let a = IntegerInterval::new(-3, 2);
        assert_eq!(a.sqr(), IntegerInterval::new(0, 9));
    }

    #[test]
    fn test_power2() {
        assert_eq!(IntegerInterval::new(0, 10).power2(), IntegerInterval::new(1, 1024));
        assert_eq!(IntegerInterval::scalar(200).power2().max, i64::MAX);
    }

    #[test]
    fn test_comparisons() {
        let a = IntegerInterval::new(1, 3);
        let b = IntegerInterval::new(2, 4);
        assert_eq!(a.greater_than(&b), XBool::Unknown);
        assert_eq!(IntegerInterval::new(5, 6).greater_than(&a), XBool::True);
        assert_eq!(a.greater_than(&IntegerInterval::EMPTY), XBool::Contradiction);
    }

    #[test]
    fn test_parse_and_display() {
        let a: IntegerInterval = "[1 .. 5]".parse().unwrap();
        assert_eq!(a, IntegerInterval::new(1, 5));
        assert_eq!(a.to_string(), "[1 .. 5]");
        let inf: IntegerInterval = "[MIN .. MAX]".parse().unwrap();
        assert_eq!(inf, IntegerInterval::INTEGERS);
        assert_eq!(inf.to_string(), "[MIN .. MAX]");
        assert_eq!("7".parse::<IntegerInterval>().unwrap(), IntegerInterval::scalar(7));
        assert!("[x .. 2]".parse::<IntegerInterval>().is_err());
    }
}
