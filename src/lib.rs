//! # Per-position alignment uncertainty
//!
//! Walks a set of aligned reads over a reference and records, for every
//! covered position, how many read observations fall into each of seven
//! categories:
//!
//! 1. match to the reference
//! 2. mismatch with base A
//! 3. mismatch with base C
//! 4. mismatch with base G
//! 5. mismatch with base T
//! 6. deletion at the position
//! 7. insertion immediately following the position
//!
//! The result is written as a tab-delimited `.uncertainty` file. It does not
//! depend on variant calls; a downstream tool subtracts confident variants
//! from it to estimate where the align/detect process is failing.
//!
//! ## Pipeline
//!
//! 1. **Input**: BAM/CRAM records and an indexed FASTA are loaded through htslib
//! 2. **Pileup**: reads are walked along their CIGAR into ordered loci, one
//!    reference window at a time
//! 3. **Classification**: each read observation at a locus maps to one category
//! 4. **Aggregation**: blocks of loci fold into partial aggregators
//! 5. **Tree reduction**: partial aggregators merge pairwise (optionally in parallel)
//! 6. **Output**: the finalized table is written atomically
//!
//! ## Usage Example
//!
//! ```ignore
//! use measure_uncertainty::genomics::{MeasureUncertainty, ReadSet, ReferenceGenome};
//! use measure_uncertainty::TraversalConfig;
//!
//! let mut reference = ReferenceGenome::new();
//! reference.insert("chr1", b"ACGT".to_vec());
//! let walker = MeasureUncertainty::new(reference, TraversalConfig::default());
//! let run = walker.measure(&[ReadSet::new("sample", reads)])?;
//! measure_uncertainty::genomics::write_uncertainty_file("out.uncertainty", &run.table)?;
//! ```

#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::new_without_default)]

pub mod framework; // Generic fold-over-loci driver
pub mod genomics;  // Reads, pileup, classification, aggregation, output
pub mod tree;      // Implicit reduction tree

pub use framework::{
    CancellationToken, FrameworkError, LocusProcessor, TraversalConfig, TraversalDriver,
    TraversalResult,
};
pub use genomics::{
    Category, CategoryCounts, MeasureUncertainty, Position, PositionAggregator,
    UncertaintyTable,
};

use std::io;

use thiserror::Error;

/// Errors raised while measuring or writing per-position uncertainty.
#[derive(Error, Debug)]
pub enum UncertaintyError {
    /// A read reported a base call outside A/C/G/T.
    #[error("unrecognized base '{}' in read {read} at {position}", base_char(.symbol))]
    UnrecognizedBase {
        /// Offending base symbol as found in the read.
        symbol: u8,
        /// Position of the base call.
        position: Position,
        /// Read that carried the base call.
        read: String,
    },

    /// Reads overlap a position for which the reference has no base.
    #[error("no reference base at {position}")]
    ReferenceGap {
        /// Position missing from the reference.
        position: Position,
    },

    /// An aggregator was used after it produced its table.
    #[error("aggregator already finalized{}", observation_context(.position))]
    AggregatorFinalized {
        /// Position of the rejected observation, if any.
        position: Option<Position>,
    },

    /// The output destination could not be created or written.
    #[error("failed to write uncertainty output to {destination}: {source}")]
    OutputWrite {
        /// Destination path or stream description.
        destination: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A read's alignment is inconsistent with its bases.
    #[error("invalid alignment for read {read} on {sequence}:{offset}: {reason}")]
    InvalidAlignment {
        /// Read name.
        read: String,
        /// Reference sequence name.
        sequence: String,
        /// 1-based leftmost offset.
        offset: u32,
        /// What was wrong with it.
        reason: String,
    },

    /// A region string could not be parsed.
    #[error("invalid region '{region}': {reason}")]
    InvalidRegion {
        /// Region text as supplied.
        region: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A line of an uncertainty file could not be parsed.
    #[error("malformed uncertainty record on line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Failure reported by the traversal driver.
    #[error(transparent)]
    Framework(#[from] FrameworkError),
}

fn base_char(symbol: &u8) -> char {
    *symbol as char
}

fn observation_context(position: &Option<Position>) -> String {
    match position {
        Some(position) => format!(" (observation at {position})"),
        None => String::new(),
    }
}
