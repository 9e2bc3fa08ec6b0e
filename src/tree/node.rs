//! Reduction tree node over a run of blocks

/// Blocks `first..=last` (1-based) whose partial summaries merge at this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeNode {
    /// First block folded under this node.
    pub first: usize,
    /// Last block folded under this node.
    pub last: usize,
}

impl TreeNode {
    /// Root over blocks `1..=num_blocks`.
    pub fn root(num_blocks: usize) -> Self {
        debug_assert!(num_blocks > 0, "a reduction tree needs a block");
        Self {
            first: 1,
            last: num_blocks,
        }
    }

    /// Halves merged at this node; `None` for a single block.
    ///
    /// The left half takes the extra block of an odd run.
    pub fn split(&self) -> Option<(TreeNode, TreeNode)> {
        if self.first == self.last {
            return None;
        }
        let mid = self.first + (self.last - self.first) / 2;
        Some((
            TreeNode {
                first: self.first,
                last: mid,
            },
            TreeNode {
                first: mid + 1,
                last: self.last,
            },
        ))
    }
}
