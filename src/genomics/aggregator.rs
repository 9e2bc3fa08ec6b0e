use std::collections::btree_map::{self, BTreeMap};

use super::{Category, CategoryCounts, Position};
use crate::UncertaintyError;

/// Finalized per-position counts, ascending by [`Position`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UncertaintyTable {
    rows: BTreeMap<Position, CategoryCounts>,
}

impl UncertaintyTable {
    pub(crate) fn from_rows(rows: BTreeMap<Position, CategoryCounts>) -> Self {
        Self { rows }
    }

    /// Counts recorded at a position.
    pub fn get(&self, position: &Position) -> Option<&CategoryCounts> {
        self.rows.get(position)
    }

    /// Rows in ascending position order.
    pub fn iter(&self) -> btree_map::Iter<'_, Position, CategoryCounts> {
        self.rows.iter()
    }

    /// Number of positions with at least one observation.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column totals over every position.
    pub fn totals(&self) -> CategoryCounts {
        self.rows
            .values()
            .fold(CategoryCounts::new(), |acc, counts| acc + *counts)
    }
}

impl<'a> IntoIterator for &'a UncertaintyTable {
    type Item = (&'a Position, &'a CategoryCounts);
    type IntoIter = btree_map::Iter<'a, Position, CategoryCounts>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Accumulates category observations per position.
///
/// Partial aggregators built over disjoint loci or disjoint reads merge by
/// element-wise addition, in any order and grouping. [`finalize`] hands the
/// table out once; the aggregator rejects any use afterwards.
///
/// [`finalize`]: PositionAggregator::finalize
#[derive(Debug, Default)]
pub struct PositionAggregator {
    rows: BTreeMap<Position, CategoryCounts>,
    observations: u64,
    finalized: bool,
}

impl PositionAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation at a position.
    pub fn observe(
        &mut self,
        position: &Position,
        category: Category,
    ) -> Result<(), UncertaintyError> {
        if self.finalized {
            return Err(UncertaintyError::AggregatorFinalized {
                position: Some(position.clone()),
            });
        }
        match self.rows.get_mut(position) {
            Some(counts) => counts.increment(category),
            None => {
                let mut counts = CategoryCounts::new();
                counts.increment(category);
                self.rows.insert(position.clone(), counts);
            }
        }
        self.observations += 1;
        Ok(())
    }

    /// Fold another partial aggregator into this one.
    pub fn merge(&mut self, other: PositionAggregator) -> Result<(), UncertaintyError> {
        if self.finalized || other.finalized {
            return Err(UncertaintyError::AggregatorFinalized { position: None });
        }
        // Fold the smaller map into the larger one.
        let (mut into, from) = if self.rows.len() >= other.rows.len() {
            (std::mem::take(&mut self.rows), other.rows)
        } else {
            (other.rows, std::mem::take(&mut self.rows))
        };
        for (position, counts) in from {
            *into.entry(position).or_default() += counts;
        }
        self.rows = into;
        self.observations += other.observations;
        Ok(())
    }

    /// Consume two partial aggregators into their merge.
    pub fn merged(mut self, other: PositionAggregator) -> Result<Self, UncertaintyError> {
        self.merge(other)?;
        Ok(self)
    }

    /// Number of observations recorded so far.
    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// Number of positions seen so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether nothing was observed.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Hand out the completed table; the aggregator is unusable afterwards.
    pub fn finalize(&mut self) -> Result<UncertaintyTable, UncertaintyError> {
        if self.finalized {
            return Err(UncertaintyError::AggregatorFinalized { position: None });
        }
        self.finalized = true;
        Ok(UncertaintyTable::from_rows(std::mem::take(&mut self.rows)))
    }
}
