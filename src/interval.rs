//! Outward-rounded interval arithmetic over IEEE doubles.
//!
//! An [`Interval`] is a closed range `[min, max]` of `f64` values. Every
//! arithmetic primitive computes the enclosing corner candidates and then
//! nudges the lower bound down and the upper bound up by one ulp, so the
//! result never under-encloses the exact mathematical image (see
//! [`round`][crate::round]).
//!
//! Two canonical sentinels absorb anomalies:
//!
//! - [`Interval::EMPTY`] — `[MAX, -MAX]`, the empty set,
//! - [`Interval::REALS`] — `[-inf, +inf]`, the full real line.
//!
//! Division by a zero-containing interval yields `REALS`, operations on
//! `EMPTY` yield `EMPTY`; no operation panics or returns NaN bounds.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::range::NumberRange;
use crate::round::{minus_ulp, plus_ulp};

/// A closed interval of doubles; see the [module docs][crate::interval].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

/// Error parsing the textual `lo..hi` form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRangeError {
    #[error("invalid range bound: `{0}`")]
    Bound(String),
}

impl Interval {
    /// The empty set, `[MAX, -MAX]`.
    pub const EMPTY: Interval = Interval {
        min: f64::MAX,
        max: -f64::MAX,
    };

    /// The full real line, `[-inf, +inf]`.
    pub const REALS: Interval = Interval {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    pub const fn new(min: f64, max: f64) -> Self {
        Interval { min, max }
    }

    /// A degenerate interval holding a single value.
    pub const fn scalar(value: f64) -> Self {
        Interval {
            min: value,
            max: value,
        }
    }

    pub fn min_is_inf(&self) -> bool {
        self.min.is_infinite()
    }

    pub fn max_is_inf(&self) -> bool {
        self.max.is_infinite()
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn is_reals(&self) -> bool {
        self.min == f64::NEG_INFINITY && self.max == f64::INFINITY
    }

    pub fn is_strictly_positive(&self) -> bool {
        self.min > 0.0
    }

    pub fn is_strictly_negative(&self) -> bool {
        self.max < 0.0
    }

    pub fn is_weakly_positive(&self) -> bool {
        self.min >= 0.0
    }

    pub fn is_weakly_negative(&self) -> bool {
        self.max <= 0.0
    }

    /// The multiplicative inverse `1 / self`.
    ///
    /// A zero-interior interval inverts to [`REALS`][Interval::REALS]; a
    /// zero endpoint yields a one-sided infinite interval.
    pub fn inv(&self) -> Interval {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        if self.min == 0.0 && self.max == 0.0 {
            return Interval::REALS;
        }
        if self.min == 0.0 {
            return Interval::new(minus_ulp(1.0 / self.max), f64::INFINITY);
        }
        if self.max == 0.0 {
            return Interval::new(f64::NEG_INFINITY, plus_ulp(1.0 / self.min));
        }
        if self.contains(0.0) {
            return Interval::REALS;
        }
        let a = 1.0 / self.min;
        let b = 1.0 / self.max;
        Interval::new(minus_ulp(a.min(b)), plus_ulp(a.max(b)))
    }

    /// Componentwise ceiling, widened outward.
    pub fn ceil(&self) -> Interval {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        Interval::new(minus_ulp(self.min.ceil()), plus_ulp(self.max.ceil()))
    }

    /// Preimage of the ceiling: all x with `ceil(x)` in `self`.
    pub fn inv_ceil(&self) -> Interval {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        Interval::new(minus_ulp(self.min - 1.0), plus_ulp(self.max))
    }

    /// Componentwise floor, widened outward.
    pub fn floor(&self) -> Interval {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        Interval::new(minus_ulp(self.min.floor()), plus_ulp(self.max.floor()))
    }

    /// Preimage of the floor: all x with `floor(x)` in `self`.
    pub fn inv_floor(&self) -> Interval {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        Interval::new(minus_ulp(self.min), plus_ulp(self.max + 1.0))
    }

    /// Rectified linear unit over the interval.
    pub fn relu(&self) -> Interval {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        Interval::new(self.min.max(0.0), self.max.max(0.0))
    }
}

impl NumberRange<f64> for Interval {
    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn is_empty(&self) -> bool {
        self.min > self.max || self.min.is_nan() || self.max.is_nan()
    }

    fn scalar_is_invalid(value: f64) -> bool {
        value.is_nan()
    }

    fn is_zero(&self) -> bool {
        self.min == 0.0 && self.max == 0.0
    }

    fn is_one(&self) -> bool {
        self.min == 1.0 && self.max == 1.0
    }

    fn join(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Interval::new(self.min.min(other.min), self.max.max(other.max))
    }

    fn intersect(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Interval::EMPTY;
        }
        Interval::new(self.min.max(other.min), self.max.min(other.max))
    }

    fn add(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Interval::EMPTY;
        }
        // -inf + inf from mixed infinite operands widens conservatively.
        let lo = self.min + other.min;
        let hi = self.max + other.max;
        Interval::new(
            if lo.is_nan() { f64::NEG_INFINITY } else { minus_ulp(lo) },
            if hi.is_nan() { f64::INFINITY } else { plus_ulp(hi) },
        )
    }

    fn add_scalar(&self, other: f64) -> Self {
        if self.is_empty() || other.is_nan() {
            return Interval::EMPTY;
        }
        Interval::new(minus_ulp(self.min + other), plus_ulp(self.max + other))
    }

    fn sub(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Interval::EMPTY;
        }
        let lo = self.min - other.max;
        let hi = self.max - other.min;
        Interval::new(
            if lo.is_nan() { f64::NEG_INFINITY } else { minus_ulp(lo) },
            if hi.is_nan() { f64::INFINITY } else { plus_ulp(hi) },
        )
    }

    fn sub_scalar(&self, other: f64) -> Self {
        self.add_scalar(-other)
    }

    fn mul(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Interval::EMPTY;
        }
        if self.is_zero() || other.is_zero() {
            return Interval::scalar(0.0);
        }
        if self.is_one() {
            return *other;
        }
        if other.is_one() {
            return *self;
        }
        let corners = [
            self.min * other.min,
            self.min * other.max,
            self.max * other.min,
            self.max * other.max,
        ];
        // NaN corners (0 * inf) are skipped by f64::min/max.
        let lo = corners.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let hi = corners.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        Interval::new(minus_ulp(lo), plus_ulp(hi))
    }

    fn mul_scalar(&self, other: f64) -> Self {
        if self.is_empty() || other.is_nan() {
            return Interval::EMPTY;
        }
        if other == 0.0 {
            return Interval::scalar(0.0);
        }
        if other == 1.0 {
            return *self;
        }
        let a = self.min * other;
        let b = self.max * other;
        Interval::new(minus_ulp(a.min(b)), plus_ulp(a.max(b)))
    }

    fn div(&self, other: &Self) -> Self {
        self.mul(&other.inv())
    }

    fn div_scalar(&self, other: f64) -> Self {
        self.div(&Interval::scalar(other))
    }

    fn neg(&self) -> Self {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        Interval::new(-self.max, -self.min)
    }

    fn sqr(&self) -> Self {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        let a = self.min * self.min;
        let b = self.max * self.max;
        let lo = if self.contains(0.0) { 0.0 } else { minus_ulp(a.min(b)) };
        Interval::new(lo.max(0.0), plus_ulp(a.max(b)))
    }

    fn sqrt(&self) -> Self {
        if self.is_empty() || self.max < 0.0 {
            return Interval::EMPTY;
        }
        let lo = if self.min > 0.0 {
            minus_ulp(self.min.sqrt()).max(0.0)
        } else {
            0.0
        };
        Interval::new(lo, plus_ulp(self.max.sqrt()))
    }

    fn pow_scalar(&self, other: f64) -> Self {
        if self.is_empty() || other.is_nan() {
            return Interval::EMPTY;
        }
        if other == 0.0 {
            return Interval::scalar(1.0);
        }
        if other == 1.0 {
            return *self;
        }
        if self.min < 0.0 {
            if other.floor() != other {
                return Interval::REALS;
            }
            let a = self.min.powf(other);
            let b = self.max.powf(other);
            let even = (other as i64) % 2 == 0;
            let straddles = self.contains(0.0);
            let lo = if even && straddles { 0.0 } else { a.min(b) };
            let hi = a.max(b);
            return Interval::new(minus_ulp(lo), plus_ulp(hi));
        }
        let a = self.min.powf(other);
        let b = self.max.powf(other);
        Interval::new(minus_ulp(a.min(b)), plus_ulp(a.max(b)))
    }

    fn pow(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Interval::EMPTY;
        }
        if self.min < 0.0 {
            return Interval::REALS;
        }
        let corners = [
            self.min.powf(other.min),
            self.min.powf(other.max),
            self.max.powf(other.min),
            self.max.powf(other.max),
        ];
        let lo = corners.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let hi = corners.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        Interval::new(minus_ulp(lo), plus_ulp(hi))
    }

    fn root(&self, other: &Self) -> Self {
        self.pow(&other.inv())
    }

    fn exp(&self) -> Self {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        Interval::new(minus_ulp(self.min.exp()).max(0.0), plus_ulp(self.max.exp()))
    }

    fn log(&self) -> Self {
        if self.is_empty() || self.max <= 0.0 {
            return Interval::EMPTY;
        }
        if self.min <= 0.0 {
            return Interval::new(f64::NEG_INFINITY, plus_ulp(self.max.ln()));
        }
        Interval::new(minus_ulp(self.min.ln()), plus_ulp(self.max.ln()))
    }

    fn log_base(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() || self.max <= 0.0 || other.min <= 1.0 {
            return Interval::EMPTY;
        }
        if self.min <= 0.0 {
            return Interval::new(f64::NEG_INFINITY, plus_ulp(self.max.log(other.min)));
        }
        let corners = [
            self.min.log(other.min),
            self.min.log(other.max),
            self.max.log(other.min),
            self.max.log(other.max),
        ];
        let lo = corners.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let hi = corners.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        Interval::new(minus_ulp(lo), plus_ulp(hi))
    }
}

impl std::ops::Add for Interval {
    type Output = Interval;
    fn add(self, rhs: Interval) -> Interval {
        NumberRange::add(&self, &rhs)
    }
}

impl std::ops::Sub for Interval {
    type Output = Interval;
    fn sub(self, rhs: Interval) -> Interval {
        NumberRange::sub(&self, &rhs)
    }
}

impl std::ops::Mul for Interval {
    type Output = Interval;
    fn mul(self, rhs: Interval) -> Interval {
        NumberRange::mul(&self, &rhs)
    }
}

impl std::ops::Div for Interval {
    type Output = Interval;
    fn div(self, rhs: Interval) -> Interval {
        NumberRange::div(&self, &rhs)
    }
}

impl std::ops::Neg for Interval {
    type Output = Interval;
    fn neg(self) -> Interval {
        NumberRange::neg(&self)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "∅");
        }
        if self.is_scalar() {
            return write!(f, "{}", self.min);
        }
        if self.is_reals() {
            return write!(f, "Real");
        }
        // Capture near-infinite bounds as the wildcard form.
        if self.min < -f64::MAX / 2.0 {
            write!(f, "-*..")?;
        } else {
            write!(f, "{}..", self.min)?;
        }
        if self.max > f64::MAX / 2.0 {
            write!(f, "*")
        } else {
            write!(f, "{}", self.max)
        }
    }
}

fn parse_bound(s: &str) -> Result<f64, ParseRangeError> {
    match s {
        "-INF" | "*" | "-*" => Ok(-f64::MAX),
        "INF" => Ok(f64::MAX),
        _ => s.parse::<f64>().map_err(|_| ParseRangeError::Bound(s.to_string())),
    }
}

impl FromStr for Interval {
    type Err = ParseRangeError;

    /// Parses `lo..hi`, a single scalar, or the empty string (all reals).
    /// `*`, `-*`, `INF` and `-INF` stand for the largest finite double of
    /// the respective sign.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Interval::new(-f64::MAX, f64::MAX));
        }
        let mut parts = s.splitn(2, "..");
        let min = parse_bound(parts.next().unwrap_or("").trim())?;
        let max = match parts.next() {
            Some(ub) => {
                let ub = ub.trim();
                if ub == "INF" || ub == "*" {
                    f64::MAX
                } else {
                    ub.parse::<f64>().map_err(|_| ParseRangeError::Bound(ub.to_string()))?
                }
            }
            None => min,
        };
        Ok(Interval::new(min, max))
    }
}
