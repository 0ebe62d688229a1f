//! Tunables for affine-form construction.

/// How non-affine unary functions are linearized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ApproximationScheme {
    /// Minimizes the width of the result range. Keeps the linearization
    /// inside the function's codomain (e.g. `exp` stays positive).
    #[default]
    MinRange,
    /// Chebyshev (minimax) linearization. Minimizes the maximum absolute
    /// error but may overshoot the codomain.
    Chebyshev,
}

/// Per-context settings; [`Config::default`] matches the common case.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Linearization scheme for `exp`, `log`, `sqrt`, `inv`, and friends.
    pub scheme: ApproximationScheme,
    /// When set, approximation-error symbols are tagged with the
    /// operation and operand shapes that produced them, and identical
    /// operations reuse the same symbol. Enables algebraic cancellation
    /// such as `f(x) - f(x) == 0` at the cost of bookkeeping.
    pub track_provenance: bool,
    /// Soft cap on the number of noise terms per form. Exceeding it
    /// triggers a reduction pass.
    pub max_symbols: usize,
    /// How many of the smallest terms a reduction pass merges at once.
    pub merge_batch: usize,
    /// Whether reduction passes run at all.
    pub reduce_symbols: bool,
    /// Terms with absolute coefficient below this threshold are folded
    /// into the residual eagerly. `None` keeps every term.
    pub drop_threshold: Option<f64>,
    /// Two forms whose bounds differ by less than this are considered
    /// similar when joining.
    pub join_tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scheme: ApproximationScheme::MinRange,
            track_provenance: false,
            max_symbols: 200,
            merge_batch: 10,
            reduce_symbols: true,
            drop_threshold: None,
            join_tolerance: 1e-3,
        }
    }
}

impl Config {
    /// Default settings with provenance tracking switched on.
    pub fn with_provenance() -> Self {
        Config {
            track_provenance: true,
            ..Config::default()
        }
    }
}
