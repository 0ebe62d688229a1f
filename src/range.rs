//! The common contract for range arithmetic over ordered scalars.
//!
//! Both numeric domains — [`Interval`][crate::interval::Interval] over `f64`
//! and [`IntegerInterval`][crate::integer::IntegerInterval] over `i64` —
//! implement this trait. Implementations guarantee
//!
//! - a safe inclusion in the presence of rounding errors (outward rounding),
//! - saturation instead of silent overflow,
//! - totality: anomalies such as division by a zero-containing range are
//!   absorbed into sentinel values, never raised as errors.
//!
//! The four-valued comparisons are provided as default methods: they only
//! need the bounds, an emptiness test and a NaN hook, so both domains share
//! one definition. Overlapping ranges — subset or partial overlap alike —
//! compare to [`XBool::Unknown`]; only disjoint ranges compare definitely.

use crate::xbool::XBool;

/// A closed range of scalars of type `T` with conservative arithmetic.
pub trait NumberRange<T: PartialOrd + Copy>: Sized {
    /// The lower bound.
    fn min(&self) -> T;
    /// The upper bound.
    fn max(&self) -> T;

    /// An empty range (`min > max` or an invalid bound).
    fn is_empty(&self) -> bool;

    /// Hook for scalar validity; only meaningful for floating-point domains.
    fn scalar_is_invalid(value: T) -> bool {
        let _ = value;
        false
    }

    /// True iff the range holds exactly one value.
    fn is_scalar(&self) -> bool {
        !self.is_empty() && self.min() == self.max()
    }

    /// True iff the range holds more than one value.
    fn is_range(&self) -> bool {
        !self.is_empty() && !self.is_scalar()
    }

    fn is_zero(&self) -> bool;
    fn is_one(&self) -> bool;

    /// Scalar containment.
    fn contains(&self, value: T) -> bool {
        !self.is_empty() && self.min() <= value && value <= self.max()
    }

    /// Range containment (subset-of, non-strict).
    fn contains_range(&self, other: &Self) -> bool {
        other.is_empty() || (!self.is_empty() && self.min() <= other.min() && self.max() >= other.max())
    }

    /// The enclosing hull of both ranges.
    fn join(&self, other: &Self) -> Self;

    /// Alias for [`join`][NumberRange::join].
    fn union(&self, other: &Self) -> Self {
        self.join(other)
    }

    /// The overlap of both ranges; may be empty.
    fn intersect(&self, other: &Self) -> Self;

    // Four-valued comparisons. Definite answers require disjointness; any
    // overlap is Unknown, an empty operand is a Contradiction.

    fn greater_than(&self, other: &Self) -> XBool {
        if self.is_empty() || other.is_empty() {
            return XBool::Contradiction;
        }
        if self.min() > other.max() {
            XBool::True
        } else if self.max() <= other.min() {
            XBool::False
        } else {
            XBool::Unknown
        }
    }

    fn greater_than_or_equals(&self, other: &Self) -> XBool {
        if self.is_empty() || other.is_empty() {
            return XBool::Contradiction;
        }
        if self.min() >= other.max() {
            XBool::True
        } else if self.max() < other.min() {
            XBool::False
        } else {
            XBool::Unknown
        }
    }

    fn less_than(&self, other: &Self) -> XBool {
        if self.is_empty() || other.is_empty() {
            return XBool::Contradiction;
        }
        if self.max() < other.min() {
            XBool::True
        } else if self.min() >= other.max() {
            XBool::False
        } else {
            XBool::Unknown
        }
    }

    fn less_than_or_equals(&self, other: &Self) -> XBool {
        if self.is_empty() || other.is_empty() {
            return XBool::Contradiction;
        }
        if self.max() <= other.min() {
            XBool::True
        } else if self.min() > other.max() {
            XBool::False
        } else {
            XBool::Unknown
        }
    }

    fn greater_than_scalar(&self, other: T) -> XBool {
        if self.is_empty() || Self::scalar_is_invalid(other) {
            return XBool::Contradiction;
        }
        if self.min() > other {
            XBool::True
        } else if self.max() <= other {
            XBool::False
        } else {
            XBool::Unknown
        }
    }

    fn greater_than_or_equals_scalar(&self, other: T) -> XBool {
        if self.is_empty() || Self::scalar_is_invalid(other) {
            return XBool::Contradiction;
        }
        if self.min() >= other {
            XBool::True
        } else if self.max() < other {
            XBool::False
        } else {
            XBool::Unknown
        }
    }

    fn less_than_scalar(&self, other: T) -> XBool {
        if self.is_empty() || Self::scalar_is_invalid(other) {
            return XBool::Contradiction;
        }
        if self.max() < other {
            XBool::True
        } else if self.min() >= other {
            XBool::False
        } else {
            XBool::Unknown
        }
    }

    fn less_than_or_equals_scalar(&self, other: T) -> XBool {
        if self.is_empty() || Self::scalar_is_invalid(other) {
            return XBool::Contradiction;
        }
        if self.max() <= other {
            XBool::True
        } else if self.min() > other {
            XBool::False
        } else {
            XBool::Unknown
        }
    }

    // Arithmetic. Every implementation rounds outward / saturates.

    fn add(&self, other: &Self) -> Self;
    fn add_scalar(&self, other: T) -> Self;
    fn sub(&self, other: &Self) -> Self;
    fn sub_scalar(&self, other: T) -> Self;
    fn mul(&self, other: &Self) -> Self;
    fn mul_scalar(&self, other: T) -> Self;
    fn div(&self, other: &Self) -> Self;
    fn div_scalar(&self, other: T) -> Self;
    fn neg(&self) -> Self;

    fn sqr(&self) -> Self;
    fn sqrt(&self) -> Self;
    fn pow_scalar(&self, other: T) -> Self;
    fn pow(&self, other: &Self) -> Self;
    /// The n-th root, `self^(1/n)`.
    fn root(&self, other: &Self) -> Self;
    fn exp(&self) -> Self;
    fn log(&self) -> Self;
    fn log_base(&self, other: &Self) -> Self;
}
