//! Genomics data structures and the per-position uncertainty measurement.
//!
//! Reads are walked into loci ([`pileup`]), each read observation is mapped
//! to a [`Category`] ([`classify`]), counts accumulate per [`Position`]
//! ([`aggregator`]) and the finished table is written as an `.uncertainty`
//! file ([`uncertainty`]).

pub mod aggregator;
pub mod classify;
mod counts;
pub mod io;
pub mod pileup;
mod reference;
mod region;
mod types;
pub mod uncertainty;
mod walker;

pub use aggregator::{PositionAggregator, UncertaintyTable};
pub use classify::{Category, Classifier, ReadClassifier, ReadObservation, NUM_CATEGORIES};
pub use counts::CategoryCounts;
pub use pileup::{
    AlignedBase, Locus, Pileup, PileupOptions, PileupWindows, ReadState, DEFAULT_WINDOW_LEN,
};
pub use reference::ReferenceGenome;
pub use region::Region;
pub use types::{AlignedRead, CigarOp, CigarOpKind, Position, ReadSet};
pub use uncertainty::{
    parse_uncertainty, render_uncertainty, write_uncertainty, write_uncertainty_file,
};
pub use walker::{
    MeasureUncertainty, PartialTally, TraversalReport, UncertaintyRun, UncertaintyWalker,
};
