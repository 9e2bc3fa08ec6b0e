//! Generic fold-over-loci driver.
//!
//! A [`LocusProcessor`] describes how one locus folds into a partial summary,
//! how two partial summaries merge, and how the root summary becomes the
//! final output. [`TraversalDriver`] cuts the ordered loci into blocks, folds
//! each block independently and merges the block summaries pairwise along a
//! midpoint tree, optionally in parallel. Merging must be associative and
//! commutative; the driver gives no guarantee on merge order.

mod driver;

pub use driver::{
    BlockContext, CancellationToken, FrameworkError, LocusProcessor, TraversalConfig,
    TraversalDriver, TraversalResult, DEFAULT_LOCI_PER_BLOCK,
};
