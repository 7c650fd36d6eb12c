//! Sparse in-memory index from logical entry index to byte offset.

/// A recorded `(index, offset)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexPosition {
    /// Logical entry index.
    pub index: u64,
    /// Byte offset of the entry's frame within its segment.
    pub offset: usize,
}

/// Sparse index over the entries of one segment.
///
/// A position is recorded for the first entry of the segment and for every
/// entry whose index is a multiple of the interval. Positions are kept
/// sorted and are monotonic in both index and offset, so a lookup resolves
/// to the nearest preceding position and the caller scans forward from
/// there.
#[derive(Debug, Clone)]
pub struct SparseIndex {
    interval: u64,
    positions: Vec<IndexPosition>,
}

impl SparseIndex {
    /// Create an empty index recording every `interval` entries.
    #[must_use]
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            positions: Vec::new(),
        }
    }

    /// Record the position of an entry that was just written.
    ///
    /// Entries must be offered in increasing index order; out-of-order
    /// offers are ignored.
    pub fn index(&mut self, index: u64, offset: usize) {
        if let Some(last) = self.positions.last()
            && (index <= last.index || offset <= last.offset)
        {
            return;
        }
        if self.positions.is_empty() || index % self.interval == 0 {
            self.positions.push(IndexPosition { index, offset });
        }
    }

    /// Find the recorded position nearest to, and not after, `index`.
    #[must_use]
    pub fn lookup(&self, index: u64) -> Option<IndexPosition> {
        let after = self.positions.partition_point(|p| p.index <= index);
        after.checked_sub(1).map(|i| self.positions[i])
    }

    /// Drop every position after `index`.
    pub fn truncate(&mut self, index: u64) {
        let keep = self.positions.partition_point(|p| p.index <= index);
        self.positions.truncate(keep);
    }

    /// Drop positions that are no longer needed to reach `index` or
    /// anything after it.
    ///
    /// The nearest position at or before `index` is kept so lookups from
    /// `index` onward stay cheap.
    pub fn compact(&mut self, index: u64) {
        let Some(floor) = self.lookup(index) else {
            return;
        };
        self.positions.retain(|p| p.index >= floor.index);
    }

    /// Number of recorded positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if no position is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The most recently recorded position.
    #[must_use]
    pub fn last(&self) -> Option<IndexPosition> {
        self.positions.last().copied()
    }
}
