//! Node topology: which units share a physical node.

/// Information about the group of units running on the caller's node.
pub trait Topology {
    /// Returns the number of units on the caller's node.
    fn local_group_size(&self) -> usize;

    /// Returns the rank of the caller within its node.
    fn local_rank(&self) -> usize;

    /// Returns the global unit ids of all units on the caller's node, indexed
    /// by local rank.
    fn rank_table(&self) -> Vec<usize>;

    /// Returns the unit coordinating the caller's node (local rank 0).
    #[inline]
    fn coordinating_unit(&self) -> usize {
        self.rank_table()[0]
    }
}
