use std::ops::{Add, AddAssign, Index};

use super::classify::{Category, NUM_CATEGORIES};

/// Per-position observation counts, one slot per [`Category`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CategoryCounts {
    counts: [u64; NUM_CATEGORIES],
}

impl CategoryCounts {
    /// All-zero counts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts in column order.
    pub fn from_array(counts: [u64; NUM_CATEGORIES]) -> Self {
        Self { counts }
    }

    /// Record one observation.
    pub fn increment(&mut self, category: Category) {
        self.counts[category.index()] += 1;
    }

    /// Count for one category.
    pub fn get(&self, category: Category) -> u64 {
        self.counts[category.index()]
    }

    /// Counts in column order.
    pub fn as_array(&self) -> &[u64; NUM_CATEGORIES] {
        &self.counts
    }

    /// Total number of observations folded in.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Whether no observation was recorded.
    pub fn is_zero(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    /// Observations that disagree with the reference (everything but `match`).
    pub fn discordant(&self) -> u64 {
        self.total() - self.get(Category::Match)
    }
}

impl AddAssign for CategoryCounts {
    fn add_assign(&mut self, other: Self) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts) {
            *mine += theirs;
        }
    }
}

impl Add for CategoryCounts {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl Index<Category> for CategoryCounts {
    type Output = u64;

    fn index(&self, category: Category) -> &u64 {
        &self.counts[category.index()]
    }
}
