use std::collections::BTreeMap;
use std::sync::Arc;

use super::Position;

/// In-memory reference sequences keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGenome {
    sequences: BTreeMap<Arc<str>, Arc<[u8]>>,
}

impl ReferenceGenome {
    /// Create an empty reference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a sequence.
    pub fn insert(&mut self, name: impl Into<Arc<str>>, bases: impl Into<Arc<[u8]>>) {
        self.sequences.insert(name.into(), bases.into());
    }

    /// Reference base at a 1-based position, if the reference covers it.
    pub fn base_at(&self, position: &Position) -> Option<u8> {
        let index = position.offset.checked_sub(1)? as usize;
        self.sequences
            .get(&position.sequence)
            .and_then(|bases| bases.get(index))
            .copied()
    }

    /// Length of a named sequence.
    pub fn sequence_len(&self, name: &str) -> Option<usize> {
        self.sequences.get(name).map(|bases| bases.len())
    }

    /// Number of sequences.
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Whether no sequence was loaded.
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}
