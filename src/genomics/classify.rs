use std::fmt;

use super::Position;
use crate::UncertaintyError;

/// Number of read-to-reference categories.
pub const NUM_CATEGORIES: usize = 7;

/// Relationship of one read observation to the reference at one position.
///
/// Declaration order is the column order of the uncertainty file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Category {
    /// Base call equal to the reference base.
    Match,
    /// Base call `A` against a different reference base.
    MismatchA,
    /// Base call `C` against a different reference base.
    MismatchC,
    /// Base call `G` against a different reference base.
    MismatchG,
    /// Base call `T` against a different reference base.
    MismatchT,
    /// The read deletes this position.
    Deletion,
    /// The read inserts bases immediately after this position.
    InsertionAfter,
}

impl Category {
    /// All categories in column order.
    pub const ALL: [Category; NUM_CATEGORIES] = [
        Category::Match,
        Category::MismatchA,
        Category::MismatchC,
        Category::MismatchG,
        Category::MismatchT,
        Category::Deletion,
        Category::InsertionAfter,
    ];

    /// Column index of the category.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Column name used in the uncertainty file header.
    pub fn column_name(self) -> &'static str {
        match self {
            Category::Match => "match",
            Category::MismatchA => "mismatch_A",
            Category::MismatchC => "mismatch_C",
            Category::MismatchG => "mismatch_G",
            Category::MismatchT => "mismatch_T",
            Category::Deletion => "deletion",
            Category::InsertionAfter => "insertion_after",
        }
    }

    /// Mismatch category for an upper-case A/C/G/T base.
    pub fn mismatch(base: u8) -> Option<Category> {
        match base {
            b'A' => Some(Category::MismatchA),
            b'C' => Some(Category::MismatchC),
            b'G' => Some(Category::MismatchG),
            b'T' => Some(Category::MismatchT),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// What one read shows at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadObservation {
    /// The read calls this base (as found in the read, any case).
    Called(u8),
    /// The read deletes the position.
    Deleted,
    /// The read inserts bases right after the position.
    InsertionAfter,
}

/// Maps a read observation at a position to a [`Category`].
///
/// Closures with the same signature implement the trait, so callers can
/// inject a classifier without defining a type.
pub trait Classifier: Send + Sync {
    /// Classify `observation` made by `read` at `position`, whose reference base is `reference_base`.
    fn classify(
        &self,
        position: &Position,
        reference_base: u8,
        read: &str,
        observation: ReadObservation,
    ) -> Result<Category, UncertaintyError>;
}

impl<F> Classifier for F
where
    F: Fn(&Position, u8, &str, ReadObservation) -> Result<Category, UncertaintyError>
        + Send
        + Sync,
{
    fn classify(
        &self,
        position: &Position,
        reference_base: u8,
        read: &str,
        observation: ReadObservation,
    ) -> Result<Category, UncertaintyError> {
        self(position, reference_base, read, observation)
    }
}

/// Stock classifier: deletion, then insertion, then base comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadClassifier;

impl ReadClassifier {
    /// Create the classifier.
    pub fn new() -> Self {
        Self
    }
}

impl Classifier for ReadClassifier {
    fn classify(
        &self,
        position: &Position,
        reference_base: u8,
        read: &str,
        observation: ReadObservation,
    ) -> Result<Category, UncertaintyError> {
        let called = match observation {
            ReadObservation::Deleted => return Ok(Category::Deletion),
            ReadObservation::InsertionAfter => return Ok(Category::InsertionAfter),
            ReadObservation::Called(base) => base.to_ascii_uppercase(),
        };

        let mismatch = Category::mismatch(called).ok_or_else(|| {
            UncertaintyError::UnrecognizedBase {
                symbol: called,
                position: position.clone(),
                read: read.to_string(),
            }
        })?;

        // Ambiguity codes in the reference never equal a called base.
        if called == reference_base.to_ascii_uppercase() {
            Ok(Category::Match)
        } else {
            Ok(mismatch)
        }
    }
}
