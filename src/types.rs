//! Type-safe wrapper for noise-symbol identifiers.
//!
//! Noise symbols are globally unique unit-interval variables shared across
//! affine values; sharing an id means asserting correlated uncertainty from
//! the same original source of error. The newtype keeps symbol ids from being
//! confused with counters or coefficients in arithmetic code.

use std::fmt;

/// A noise-symbol identifier (1-indexed).
///
/// Ids are issued by [`NoiseSymbols`][crate::noise::NoiseSymbols] and are
/// never reused or freed. Plain symbols live below the garbage base; ids at
/// or above it are synthesized by nonlinear operations and may be merged by
/// symbol-count reduction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Creates a symbol id.
    ///
    /// # Panics
    ///
    /// Panics if `id == 0`; symbol ids are 1-indexed.
    pub fn new(id: u32) -> Self {
        assert_ne!(id, 0, "Symbol ids must be >= 1");
        SymbolId(id)
    }

    /// Returns the raw id as a `u32`.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl From<SymbolId> for u32 {
    fn from(id: SymbolId) -> Self {
        id.0
    }
}
