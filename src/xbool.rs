//! Four-valued logic for uncertain comparisons.
//!
//! Comparing two overlapping ranges cannot be decided either way, and
//! comparing against an empty range or NaN is not a boolean question at all.
//! [`XBool`] closes ordinary boolean logic over both situations:
//!
//! - [`XBool::True`] / [`XBool::False`] — definite outcomes,
//! - [`XBool::Unknown`] — refinable to either `True` or `False`,
//! - [`XBool::Contradiction`] — neither `True` nor `False` (e.g. a predicate
//!   on an empty range).
//!
//! All operations are total lookup tables; there is nothing to compute.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;

/// A four-valued boolean: `True`, `False`, `Unknown`, or `Contradiction`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum XBool {
    True,
    False,
    /// Can still be refined to `True` or `False`.
    Unknown,
    /// Neither `True` nor `False`; absorbs every operation.
    Contradiction,
}

use XBool::{Contradiction, False, True, Unknown};

impl XBool {
    /// Three-valued Kleene conjunction, absorbing toward `Contradiction`.
    pub fn and(self, other: XBool) -> XBool {
        match (self, other) {
            (Contradiction, _) | (_, Contradiction) => Contradiction,
            (False, _) | (_, False) => False,
            (True, True) => True,
            _ => Unknown,
        }
    }

    /// Three-valued Kleene disjunction, absorbing toward `Contradiction`.
    pub fn or(self, other: XBool) -> XBool {
        match (self, other) {
            (Contradiction, _) | (_, Contradiction) => Contradiction,
            (True, _) | (_, True) => True,
            (False, False) => False,
            _ => Unknown,
        }
    }

    /// Checks two outcomes for possible equality: agreeing definite values
    /// stay definite, `Unknown` refines to the other operand, and
    /// disagreeing definite values yield `Contradiction`.
    pub fn intersect(self, other: XBool) -> XBool {
        match (self, other) {
            (Contradiction, _) | (_, Contradiction) => Contradiction,
            (Unknown, x) => x,
            (x, Unknown) => x,
            (True, True) => True,
            (False, False) => False,
            (True, False) | (False, True) => Contradiction,
        }
    }

    /// Information-order containment: `Unknown` contains both definite
    /// values and itself; every other value contains only itself.
    /// `Contradiction` is disjoint from the rest.
    pub fn contains(self, other: XBool) -> bool {
        match (self, other) {
            (Unknown, True) | (Unknown, False) | (Unknown, Unknown) => true,
            (a, b) => a == b && a != Unknown,
        }
    }

    /// True iff the value is one of the two definite outcomes.
    pub fn is_definite(self) -> bool {
        matches!(self, True | False)
    }
}

impl Not for XBool {
    type Output = XBool;

    fn not(self) -> XBool {
        match self {
            True => False,
            False => True,
            Unknown => Unknown,
            Contradiction => Contradiction,
        }
    }
}

impl BitAnd for XBool {
    type Output = XBool;

    fn bitand(self, rhs: XBool) -> XBool {
        self.and(rhs)
    }
}

impl BitOr for XBool {
    type Output = XBool;

    fn bitor(self, rhs: XBool) -> XBool {
        self.or(rhs)
    }
}

impl From<bool> for XBool {
    fn from(b: bool) -> XBool {
        if b {
            True
        } else {
            False
        }
    }
}

impl fmt::Display for XBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            True => "True",
            False => "False",
            Unknown => "Unknown",
            Contradiction => "Contradiction",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for XBool {
    type Err = crate::interval::ParseRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "True" => Ok(True),
            "False" => Ok(False),
            "X" | "Unknown" => Ok(Unknown),
            "NaB" | "Contradiction" => Ok(Contradiction),
            _ => Err(crate::interval::ParseRangeError::Bound(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [XBool; 4] = [True, False, Unknown, Contradiction];

    #[test]
    fn test_and_table() {
        assert_eq!(True.and(True), True);
        assert_eq!(True.and(False), False);
        assert_eq!(True.and(Unknown), Unknown);
        assert_eq!(False.and(Unknown), False);
        assert_eq!(Unknown.and(Unknown), Unknown);
        for x in ALL {
            assert_eq!(Contradiction.and(x), Contradiction);
            assert_eq!(x.and(Contradiction), Contradiction);
        }
    }

    #[test]
    fn test_or_table() {
        assert_eq!(False.or(False), False);
        assert_eq!(True.or(False), True);
        assert_eq!(True.or(Unknown), True);
        assert_eq!(False.or(Unknown), Unknown);
        assert_eq!(Unknown.or(Unknown), Unknown);
        for x in ALL {
            assert_eq!(Contradiction.or(x), Contradiction);
            assert_eq!(x.or(Contradiction), Contradiction);
        }
    }

    #[test]
    fn test_intersect_table() {
        assert_eq!(True.intersect(False), Contradiction);
        assert_eq!(False.intersect(True), Contradiction);
        assert_eq!(True.intersect(True), True);
        assert_eq!(False.intersect(False), False);
        for x in ALL {
            assert_eq!(Unknown.intersect(x), x);
            assert_eq!(Contradiction.intersect(x), Contradiction);
        }
    }

    #[test]
    fn test_contains_table() {
        let expected = [
            (True, True),
            (False, False),
            (Contradiction, Contradiction),
            (Unknown, True),
            (Unknown, False),
            (Unknown, Unknown),
        ];
        for a in ALL {
            for b in ALL {
                assert_eq!(a.contains(b), expected.contains(&(a, b)), "contains({a}, {b})");
            }
        }
    }

    #[test]
    fn test_not() {
        assert_eq!(!True, False);
        assert_eq!(!False, True);
        assert_eq!(!Unknown, Unknown);
        assert_eq!(!Contradiction, Contradiction);
    }

    #[test]
    fn test_de_morgan_on_definite_values() {
        for a in [True, False] {
            for b in [True, False] {
                assert_eq!(!(a & b), !a | !b);
                assert_eq!(!(a | b), !a & !b);
            }
        }
    }

    #[test]
    fn test_parse_and_display() {
        for x in ALL {
            assert_eq!(x.to_string().parse::<XBool>().unwrap(), x);
        }
        assert_eq!("X".parse::<XBool>().unwrap(), Unknown);
        assert_eq!("NaB".parse::<XBool>().unwrap(), Contradiction);
        assert!("maybe".parse::<XBool>().is_err());
    }
}
