//! # affine-rs: Affine Arithmetic in Rust
//!
//! **`affine-rs`** is a manager-centric library for **self-validated numerics**:
//! computing with ranges instead of point values, while keeping track of linear
//! correlations between them. It is the numeric core for static analysis of
//! analog and mixed-signal behavior, parameter sweeps, and verified computation.
//!
//! ## What is an affine form?
//!
//! An affine form represents a quantity as `central + Σ coeff_i · e_i ± r`,
//! where each noise symbol `e_i` ranges over `[-1, 1]`. Two values built over
//! the *same* symbols stay correlated: `x - x` is exactly zero, not an interval
//! twice as wide. Every value also carries a plain interval bound, and each
//! operation keeps the intersection of both, so the result is never worse than
//! interval arithmetic.
//!
//! ## Key Features
//!
//! - **Manager-Centric Architecture**: All operations go through a
//!   [`Context`][crate::affine::Context], which owns the noise-symbol table.
//!   Symbols are shared across values, which is what makes cancellation work.
//! - **Sound Rounding**: Every primitive rounds outward by one ulp,
//!   so computed ranges always enclose the exact result.
//! - **Four-Valued Comparisons**: Range comparisons answer with
//!   [`XBool`][crate::xbool::XBool] --- `True`, `False`, `Unknown`, or
//!   `Contradiction` --- instead of guessing on overlap.
//! - **Saturating Integer Ranges**: [`IntegerInterval`][crate::integer::IntegerInterval]
//!   treats `i64::MIN`/`MAX` as infinities and saturates instead of wrapping.
//! - **Provenance Tracking** (opt-in): approximation-error symbols are keyed by
//!   the operation that created them, so `f(x) - f(x)` cancels exactly.
//!
//! ## Basic Usage
//!
//! ```rust
//! use affine_rs::affine::Context;
//! use affine_rs::xbool::XBool;
//!
//! // 1. Initialize the manager
//! let ctx = Context::new();
//!
//! // 2. Create values over shared noise symbols
//! let x = ctx.interval(1.0, 2.0);
//! let y = ctx.interval(3.0, 4.0);
//!
//! // 3. Compute; correlation is tracked through the operations
//! let sum = ctx.add(&x, &y);
//! assert!(sum.contains(4.0) && sum.contains(6.0));
//!
//! let zero = ctx.sub(&x, &x);
//! assert!(zero.is_zero());
//!
//! // 4. Compare; overlapping ranges are honestly Unknown
//! assert_eq!(x.less_than(&y), XBool::True);
//! assert_eq!(x.less_than(&ctx.interval(1.5, 3.0)), XBool::Unknown);
//! ```
//!
//! ## Core Components
//!
//! - **[`affine`]**: The heart of the library. [`Context`][crate::affine::Context]
//!   and [`AffineValue`][crate::affine::AffineValue], with all arithmetic and
//!   the non-affine linearizations.
//! - **[`interval`]**: Outward-rounded interval arithmetic over `f64`.
//! - **[`integer`]**: Saturating `i64` intervals.
//! - **[`xbool`]**: The four-valued logic used by comparisons.
//! - **[`lp`]**: The linear-programming contract for range tightening under
//!   side conditions.

pub mod affine;
pub mod config;
pub mod integer;
pub mod interval;
pub mod lp;
pub mod noise;
pub mod range;
pub mod round;
pub mod types;
pub mod xbool;

pub use affine::{AffineValue, Context};
pub use config::{ApproximationScheme, Config};
pub use integer::IntegerInterval;
pub use interval::Interval;
pub use range::NumberRange;
pub use types::SymbolId;
pub use xbool::XBool;
