use crate::Crdt;

/// An owned copy of a counter's per-actor partial sums.
///
/// Slot `i` holds actor `i`'s own count, where `i` is the actor's position in
/// the cluster's fixed actor list. This is the value exchanged by push and
/// pull sync and the state a [`SyncCounter`](crate::SyncCounter) merges in.
///
/// # Example
///
/// ```
/// use crdt_tally::prelude::*;
///
/// let mut a = Snapshot::from(vec![3, 0, 1]);
/// let b = Snapshot::from(vec![1, 4, 1]);
///
/// a.merge(&b);
/// assert_eq!(a.counts(), &[3, 4, 1]);
/// assert_eq!(a.value(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Snapshot {
    counts: Vec<u64>,
}

impl Snapshot {
    /// A snapshot of `len` actors that have not counted anything yet.
    pub fn zeroed(len: usize) -> Self {
        Self {
            counts: vec![0; len],
        }
    }

    /// Number of actor slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns `true` if the snapshot has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The per-actor counts, in actor order.
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Count recorded for actor `index`, zero if the slot does not exist.
    #[must_use]
    pub fn count_for(&self, index: usize) -> u64 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    /// Sum of every slot. Saturates instead of wrapping.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &count| acc.saturating_add(count))
    }

    /// Consume the snapshot, returning the raw counts.
    pub fn into_counts(self) -> Vec<u64> {
        self.counts
    }
}

impl From<Vec<u64>> for Snapshot {
    fn from(counts: Vec<u64>) -> Self {
        Self { counts }
    }
}

impl Crdt for Snapshot {
    /// Slot-wise maximum. A shorter snapshot is treated as zero-padded.
    fn merge(&mut self, other: &Self) {
        if other.counts.len() > self.counts.len() {
            self.counts.resize(other.counts.len(), 0);
        }
        for (mine, &theirs) in self.counts.iter_mut().zip(&other.counts) {
            *mine = (*mine).max(theirs);
        }
    }
}
