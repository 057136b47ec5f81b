//! Node bitmap collaborator.
//!
//! Node sets are treated as an external collaborator, used only through a
//! handful of set operations (§1, §4.D-F). `NodeBitmap` is the thin,
//! crate-local seam over [`fixedbitset::FixedBitSet`] so the rest of the
//! engine never touches the underlying representation directly.

use fixedbitset::FixedBitSet;

/// A dense bitmap over the `0..n` node index space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBitmap(FixedBitSet);

impl NodeBitmap {
    /// An all-clear bitmap over `n` nodes.
    pub fn with_capacity(n: usize) -> Self {
        Self(FixedBitSet::with_capacity(n))
    }

    /// Build from an explicit list of set bits.
    pub fn from_bits(n: usize, bits: impl IntoIterator<Item = usize>) -> Self {
        let mut bm = Self::with_capacity(n);
        for b in bits {
            bm.set(b, true);
        }
        bm
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty_bitmap(&self) -> bool {
        self.count() == 0
    }

    pub fn contains(&self, i: usize) -> bool {
        self.0.contains(i)
    }

    pub fn set(&mut self, i: usize, value: bool) {
        self.0.set(i, value);
    }

    pub fn clear_all(&mut self) {
        self.0.clear();
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.0.count_ones(..)
    }

    /// Iterate set bit indices in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.ones()
    }

    /// `self` restricted to bits also in `other`.
    pub fn intersection(&self, other: &NodeBitmap) -> NodeBitmap {
        let mut out = self.clone();
        out.0.intersect_with(&other.0);
        out
    }

    pub fn union(&self, other: &NodeBitmap) -> NodeBitmap {
        let mut out = self.clone();
        out.0.union_with(&other.0);
        out
    }

    pub fn union_with(&mut self, other: &NodeBitmap) {
        self.0.union_with(&other.0);
    }

    pub fn intersect_with(&mut self, other: &NodeBitmap) {
        self.0.intersect_with(&other.0);
    }

    /// True iff every bit set in `self` is also set in `other`.
    pub fn is_subset_of(&self, other: &NodeBitmap) -> bool {
        self.0.is_subset(&other.0)
    }

    /// True iff `self` and `other` share at least one set bit.
    pub fn intersects(&self, other: &NodeBitmap) -> bool {
        self.0.intersection(&other.0).next().is_some()
    }
}
