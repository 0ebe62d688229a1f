//! Noise-symbol allocation and provenance tagging.
//!
//! Every [`Context`][crate::affine::Context] owns one [`NoiseSymbols`]
//! allocator. Regular symbols are handed out sequentially starting at 1;
//! garbage symbols (approximation error introduced by non-affine
//! operations) live in a disjoint id space starting at
//! [`GARBAGE_BASE`], so a form's input symbols and its error symbols
//! never collide.
//!
//! With provenance tracking enabled, a garbage symbol is keyed by the
//! operation that produced it and the [`Fingerprint`]s of its operands.
//! Re-running the same operation on structurally identical operands
//! then reuses the same symbol, which lets subtraction cancel the error
//! terms of `f(x) - f(x)` exactly.

use std::collections::{HashMap, HashSet};

use crate::types::SymbolId;

/// First id of the garbage-symbol space.
pub const GARBAGE_BASE: u32 = 10_000_000;

/// Bounded-map capacity for tag and original-form lookups.
const MAX_ENTRIES: usize = 200;
/// How many least-recently-used entries an eviction frees.
const FREE_SPACE: usize = 20;

/// The operation a tagged garbage symbol stems from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpTag {
    Plus,
    Minus,
    Times,
    Div,
    Inv,
    Exp,
    Log,
    Sqrt,
    Pow,
    ScalarPlus,
    ScalarTimes,
}

impl OpTag {
    /// Operand order is irrelevant for these, so tag lookups normalize it.
    fn is_commutative(self) -> bool {
        matches!(self, OpTag::Plus | OpTag::Times)
    }
}

/// What a garbage symbol carries: the linearization error of an
/// operation, or the floating-point rounding slack of one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    Op(OpTag),
    Rounding(OpTag),
}

impl Tag {
    /// The rounding-slack tag paired with `op`.
    pub fn rounding_of(op: OpTag) -> Tag {
        Tag::Rounding(op)
    }

    fn op(self) -> OpTag {
        match self {
            Tag::Op(op) | Tag::Rounding(op) => op,
        }
    }
}

/// Structural identity of an affine form, bit-exact.
///
/// Two forms with equal fingerprints are indistinguishable: same central
/// value, same residual, same bounds, same terms. Floats are compared by
/// bit pattern, so the type can derive `Eq` and `Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    central: u64,
    r: u64,
    min: u64,
    max: u64,
    terms: Vec<(u32, u64)>,
}

impl Fingerprint {
    pub fn from_parts(
        central: f64,
        r: f64,
        min: f64,
        max: f64,
        terms: impl Iterator<Item = (SymbolId, f64)>,
    ) -> Self {
        Fingerprint {
            central: central.to_bits(),
            r: r.to_bits(),
            min: min.to_bits(),
            max: max.to_bits(),
            terms: terms.map(|(id, c)| (id.raw(), c.to_bits())).collect(),
        }
    }
}

#[derive(Debug)]
struct TagEntry {
    id: SymbolId,
    last_use: u64,
}

#[derive(Debug)]
struct OriginalEntry {
    base: Fingerprint,
    other: Option<Fingerprint>,
    last_use: u64,
}

/// Allocator state; one per context.
#[derive(Debug, Default)]
pub struct NoiseSymbols {
    next: u32,
    next_garbage: u32,
    names: HashMap<String, SymbolId>,
    symbols: HashMap<SymbolId, String>,
    tags: HashMap<(Tag, Fingerprint, Option<Fingerprint>), TagEntry>,
    tagged_ids: HashSet<SymbolId>,
    originals: HashMap<Fingerprint, OriginalEntry>,
    uses: HashMap<SymbolId, u64>,
    clock: u64,
}

impl NoiseSymbols {
    pub fn new() -> Self {
        NoiseSymbols::default()
    }

    /// A fresh regular noise symbol.
    pub fn fresh(&mut self) -> SymbolId {
        self.next += 1;
        assert!(self.next < GARBAGE_BASE, "noise symbol space exhausted");
        SymbolId::new(self.next)
    }

    /// The symbol registered under `name`, allocating it on first use.
    pub fn named(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = self.fresh();
        self.names.insert(name.to_string(), id);
        self.symbols.insert(id, name.to_string());
        id
    }

    pub fn name_of(&self, id: SymbolId) -> Option<&str> {
        self.symbols.get(&id).map(String::as_str)
    }

    /// A fresh garbage symbol with no provenance.
    pub fn garbage(&mut self) -> SymbolId {
        if self.next_garbage == 0 {
            self.next_garbage = GARBAGE_BASE;
        }
        let id = SymbolId::new(self.next_garbage);
        self.next_garbage += 1;
        id
    }

    /// The garbage symbol for `tag` applied to the given operand shapes.
    ///
    /// Identical (tag, operands) triples return the same symbol until the
    /// entry is evicted. Commutative operations normalize operand order.
    pub fn tagged(&mut self, tag: Tag, a: Fingerprint, b: Option<Fingerprint>) -> SymbolId {
        let (a, b) = match b {
            Some(b) if tag.op().is_commutative() && b < a => (b, Some(a)),
            b => (a, b),
        };
        self.clock += 1;
        let key = (tag, a, b);
        if let Some(entry) = self.tags.get_mut(&key) {
            entry.last_use = self.clock;
            *self.uses.entry(entry.id).or_insert(0) += 1;
            return entry.id;
        }
        if self.tags.len() >= MAX_ENTRIES {
            let mut by_use: Vec<_> = self
                .tags
                .iter()
                .map(|(k, e)| (e.last_use, k.clone()))
                .collect();
            by_use.sort();
            for (_, k) in by_use.into_iter().take(FREE_SPACE) {
                self.tags.remove(&k);
            }
        }
        let id = self.garbage();
        self.tagged_ids.insert(id);
        self.uses.insert(id, 1);
        self.tags.insert(
            key,
            TagEntry {
                id,
                last_use: self.clock,
            },
        );
        id
    }

    /// First id of the garbage space.
    pub fn garbage_base(&self) -> SymbolId {
        SymbolId::new(GARBAGE_BASE)
    }

    /// How often `tagged` has handed out `id`. Diagnostic.
    pub fn uses(&self, id: SymbolId) -> u64 {
        self.uses.get(&id).copied().unwrap_or(0)
    }

    pub fn is_garbage(&self, id: SymbolId) -> bool {
        id.raw() >= GARBAGE_BASE
    }

    pub fn is_tagged(&self, id: SymbolId) -> bool {
        self.tagged_ids.contains(&id)
    }

    /// Remembers that the form with fingerprint `result` arose from a
    /// scalar operation on `base` (and possibly `other`). Used to tag
    /// follow-up operations with the underlying operand rather than the
    /// scaled intermediate.
    pub fn record_original(
        &mut self,
        result: Fingerprint,
        base: Fingerprint,
        other: Option<Fingerprint>,
    ) {
        self.clock += 1;
        if self.originals.len() >= MAX_ENTRIES {
            let mut by_use: Vec<_> = self
                .originals
                .iter()
                .map(|(k, e)| (e.last_use, k.clone()))
                .collect();
            by_use.sort();
            for (_, k) in by_use.into_iter().take(FREE_SPACE) {
                self.originals.remove(&k);
            }
        }
        self.originals.insert(
            result,
            OriginalEntry {
                base,
                other,
                last_use: self.clock,
            },
        );
    }

    pub fn original_of(&mut self, fp: &Fingerprint) -> Option<(Fingerprint, Option<Fingerprint>)> {
        self.clock += 1;
        let clock = self.clock;
        self.originals.get_mut(fp).map(|e| {
            e.last_use = clock;
            (e.base.clone(), e.other.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(central: f64) -> Fingerprint {
        Fingerprint::from_parts(central, 0.0, central, central, std::iter::empty())
    }

    #[test]
    fn test_fresh_is_sequential() {
        let mut ns = NoiseSymbols::new();
        assert_eq!(ns.fresh().raw(), 1);
        assert_eq!(ns.fresh().raw(), 2);
    }

    #[test]
    fn test_named_reuses() {
        let mut ns = NoiseSymbols::new();
        let x = ns.named("x");
        let y = ns.named("y");
        assert_ne!(x, y);
        assert_eq!(ns.named("x"), x);
        assert_eq!(ns.name_of(x), Some("x"));
        assert_eq!(ns.name_of(SymbolId::new(99)), None);
    }

    #[test]
    fn test_garbage_space_is_disjoint() {
        let mut ns = NoiseSymbols::new();
        let regular = ns.fresh();
        let g = ns.garbage();
        assert_eq!(g.raw(), GARBAGE_BASE);
        assert!(ns.is_garbage(g));
        assert!(!ns.is_garbage(regular));
        assert_eq!(ns.garbage().raw(), GARBAGE_BASE + 1);
    }

    #[test]
    fn test_tagged_dedups() {
        let mut ns = NoiseSymbols::new();
        let a = fp(1.0);
        let g1 = ns.tagged(Tag::Op(OpTag::Exp), a.clone(), None);
        let g2 = ns.tagged(Tag::Op(OpTag::Exp), a.clone(), None);
        assert_eq!(g1, g2);
        assert!(ns.is_tagged(g1));
        assert_eq!(ns.uses(g1), 2);
        // Different tag, different symbol.
        let g3 = ns.tagged(Tag::Rounding(OpTag::Exp), a.clone(), None);
        assert_ne!(g1, g3);
        // Different operand, different symbol.
        let g4 = ns.tagged(Tag::Op(OpTag::Exp), fp(2.0), None);
        assert_ne!(g1, g4);
    }

    #[test]
    fn test_tagged_commutative_normalizes() {
        let mut ns = NoiseSymbols::new();
        let a = fp(1.0);
        let b = fp(2.0);
        let g1 = ns.tagged(Tag::Op(OpTag::Times), a.clone(), Some(b.clone()));
        let g2 = ns.tagged(Tag::Op(OpTag::Times), b.clone(), Some(a.clone()));
        assert_eq!(g1, g2);
        // Division is direction-sensitive.
        let d1 = ns.tagged(Tag::Op(OpTag::Div), a.clone(), Some(b.clone()));
        let d2 = ns.tagged(Tag::Op(OpTag::Div), b, Some(a));
        assert_ne!(d1, d2);
    }

    #[test]
    fn test_tag_eviction_keeps_recent() {
        let mut ns = NoiseSymbols::new();
        let hot = ns.tagged(Tag::Op(OpTag::Exp), fp(-1.0), None);
        for i in 0..MAX_ENTRIES {
            // Keep the hot entry recently used while the table fills.
            ns.tagged(Tag::Op(OpTag::Exp), fp(-1.0), None);
            ns.tagged(Tag::Op(OpTag::Exp), fp(i as f64), None);
        }
        assert_eq!(ns.tagged(Tag::Op(OpTag::Exp), fp(-1.0), None), hot);
    }

    #[test]
    fn test_original_forms() {
        let mut ns = NoiseSymbols::new();
        let scaled = fp(4.0);
        let base = fp(2.0);
        assert!(ns.original_of(&scaled).is_none());
        ns.record_original(scaled.clone(), base.clone(), None);
        assert_eq!(ns.original_of(&scaled), Some((base, None)));
    }
}
