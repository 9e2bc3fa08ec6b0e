//! Implicit reduction tree over blocks of loci
//!
//! A node covers a run of block ids `first..=last` and splits at its
//! midpoint. Partial results of the two children are merged at the
//! parent, so a traversal over `T` blocks performs `T - 1` merges along a
//! tree of height `⌈log2 T⌉`.

mod node;

pub use node::TreeNode;

/// Height of the reduction tree over `num_blocks` leaves.
pub fn height_bound(num_blocks: usize) -> usize {
    if num_blocks <= 1 {
        return 0;
    }
    (num_blocks as f64).log2().ceil() as usize
}
