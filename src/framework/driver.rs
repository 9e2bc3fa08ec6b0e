use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::tree::{self, TreeNode};

/// Default number of loci folded per block.
pub const DEFAULT_LOCI_PER_BLOCK: usize = 4096;

/// Errors that can occur while driving a traversal.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// Configuration invalid (e.g., zero block size).
    #[error("invalid traversal configuration: {0}")]
    InvalidConfiguration(String),

    /// Requested block index is out of range for the configured number of blocks.
    #[error("block id {block_id} out of range (max {max_blocks})")]
    BlockOutOfRange {
        /// Block identifier (1-indexed) that was requested.
        block_id: usize,
        /// Maximum valid block identifier.
        max_blocks: usize,
    },

    /// The traversal was cancelled before it completed.
    #[error("traversal cancelled")]
    Cancelled,
}

/// Configuration parameters for a traversal.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Number of loci folded into one partial summary.
    pub loci_per_block: usize,
    /// Evaluate sibling subtrees on the rayon pool.
    pub parallel: bool,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            loci_per_block: DEFAULT_LOCI_PER_BLOCK,
            parallel: false,
        }
    }
}

impl TraversalConfig {
    /// Construct configuration with explicit block size.
    pub fn with_block_size(loci_per_block: usize) -> Result<Self, FrameworkError> {
        if loci_per_block == 0 {
            return Err(FrameworkError::InvalidConfiguration(
                "block size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            loci_per_block,
            ..Self::default()
        })
    }

    /// Enable or disable parallel evaluation.
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Number of blocks `⌈n / b⌉` needed for `total_loci` loci.
    pub fn num_blocks(&self, total_loci: usize) -> usize {
        total_loci.div_ceil(self.loci_per_block)
    }

    /// Compute block context (start/end indices) for a given block id (1-indexed).
    pub fn block_context(
        &self,
        block_id: usize,
        total_loci: usize,
    ) -> Result<BlockContext, FrameworkError> {
        let max_blocks = self.num_blocks(total_loci);
        if block_id == 0 || block_id > max_blocks {
            return Err(FrameworkError::BlockOutOfRange {
                block_id,
                max_blocks,
            });
        }
        let start = (block_id - 1) * self.loci_per_block;
        let end = (start + self.loci_per_block).min(total_loci);
        Ok(BlockContext {
            block_id,
            range: start..end,
        })
    }
}

/// Per-block metadata.
#[derive(Debug, Clone)]
pub struct BlockContext {
    /// 1-indexed block identifier.
    pub block_id: usize,
    /// Range of loci covered by the block.
    pub range: Range<usize>,
}

impl BlockContext {
    /// Number of loci covered by this block.
    pub fn len(&self) -> usize {
        self.range.end.saturating_sub(self.range.start)
    }

    /// Whether the block covers no loci.
    pub fn is_empty(&self) -> bool {
        self.range.end <= self.range.start
    }
}

/// Shared flag used to abandon a traversal from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every traversal holding a clone stops at its next locus.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Domain logic plugged into the [`TraversalDriver`].
pub trait LocusProcessor: Sync {
    /// One unit of work (e.g. a reference position with its overlapping reads).
    type Locus: Sync;
    /// Partial result for a set of loci (must be mergeable).
    type Summary: Send;
    /// Final output produced from the root summary.
    type Output;
    /// Error type; driver failures convert into it.
    type Error: From<FrameworkError> + Send;

    /// Summary of zero loci.
    fn empty(&self) -> Self::Summary;

    /// Fold one locus into a partial summary.
    fn process_locus(
        &self,
        locus: &Self::Locus,
        summary: &mut Self::Summary,
    ) -> Result<(), Self::Error>;

    /// Merge two partial summaries (associative, commutative).
    fn merge(
        &self,
        left: Self::Summary,
        right: Self::Summary,
    ) -> Result<Self::Summary, Self::Error>;

    /// Finalize result at the root.
    fn finalize(&self, root: Self::Summary) -> Result<Self::Output, Self::Error>;
}

/// Result returned by the driver.
#[derive(Debug)]
pub struct TraversalResult<O> {
    /// Finalized output for [`TraversalDriver::run`], root summary for [`TraversalDriver::fold`].
    pub output: O,
    /// Number of loci folded.
    pub loci_visited: usize,
    /// Number of leaf blocks evaluated.
    pub num_blocks: usize,
}

/// Folds ordered loci through a [`LocusProcessor`] with tree-shaped merging.
#[derive(Debug)]
pub struct TraversalDriver<P: LocusProcessor> {
    processor: P,
    config: TraversalConfig,
    cancellation: CancellationToken,
}

impl<P: LocusProcessor> TraversalDriver<P> {
    /// Create a new driver with the provided processor and configuration.
    pub fn new(processor: P, config: TraversalConfig) -> Self {
        Self {
            processor,
            config,
            cancellation: CancellationToken::new(),
        }
    }

    /// Observe an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Fold every locus and return the finalized output.
    pub fn run(&self, loci: &[P::Locus]) -> Result<TraversalResult<P::Output>, P::Error> {
        let folded = self.fold(loci)?;
        Ok(TraversalResult {
            output: self.processor.finalize(folded.output)?,
            loci_visited: folded.loci_visited,
            num_blocks: folded.num_blocks,
        })
    }

    /// Fold every locus into the root summary without finalizing it, so that
    /// summaries of consecutive slices can be merged by the caller.
    pub fn fold(&self, loci: &[P::Locus]) -> Result<TraversalResult<P::Summary>, P::Error> {
        if self.config.loci_per_block == 0 {
            return Err(FrameworkError::InvalidConfiguration(
                "block size must be > 0".to_string(),
            )
            .into());
        }

        let num_blocks = self.config.num_blocks(loci.len());
        let root_summary = if num_blocks == 0 {
            self.processor.empty()
        } else {
            debug!(
                loci = loci.len(),
                blocks = num_blocks,
                height = tree::height_bound(num_blocks),
                parallel = self.config.parallel,
                "starting traversal"
            );
            self.evaluate(TreeNode::root(num_blocks), loci)?
        };

        Ok(TraversalResult {
            output: root_summary,
            loci_visited: loci.len(),
            num_blocks,
        })
    }

    fn evaluate(&self, node: TreeNode, loci: &[P::Locus]) -> Result<P::Summary, P::Error> {
        let Some((left_child, right_child)) = node.split() else {
            let context = self.config.block_context(node.first, loci.len())?;
            return self.process_block(loci, &context);
        };

        let (left, right) = if self.config.parallel {
            let (left, right) = rayon::join(
                || self.evaluate(left_child, loci),
                || self.evaluate(right_child, loci),
            );
            (left?, right?)
        } else {
            let left = self.evaluate(left_child, loci)?;
            let right = self.evaluate(right_child, loci)?;
            (left, right)
        };

        self.processor.merge(left, right)
    }

    fn process_block(
        &self,
        loci: &[P::Locus],
        context: &BlockContext,
    ) -> Result<P::Summary, P::Error> {
        let mut summary = self.processor.empty();
        for locus in &loci[context.range.clone()] {
            if self.cancellation.is_cancelled() {
                return Err(FrameworkError::Cancelled.into());
            }
            self.processor.process_locus(locus, &mut summary)?;
        }
        trace!(block = context.block_id, loci = context.len(), "block folded");
        Ok(summary)
    }
}
