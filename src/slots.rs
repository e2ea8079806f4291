//! Shared per-actor state of a live counter.
//!
//! Each slot is an independent atomic cell, so a merge from one peer, a merge
//! from another peer and a local increment only contend when they touch the
//! same actor index. There is no vector-wide lock.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{CounterError, Snapshot};

pub(crate) struct SlotVector {
    slots: Box<[AtomicU64]>,
}

impl SlotVector {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, index: usize) -> u64 {
        self.slots[index].load(Ordering::Acquire)
    }

    /// Add `delta` to slot `index`, saturating at `u64::MAX`. Returns the new
    /// slot value.
    pub(crate) fn add(&self, index: usize, delta: u64) -> u64 {
        let slot = &self.slots[index];
        let mut current = slot.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(delta);
            match slot.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Max-merge `snapshot` into the slots.
    ///
    /// The snapshot is validated before anything is written: on a length
    /// mismatch no slot changes. Returns how many slots advanced.
    pub(crate) fn merge(&self, snapshot: &Snapshot) -> Result<usize, CounterError> {
        if snapshot.len() != self.slots.len() {
            return Err(CounterError::SnapshotLength {
                expected: self.slots.len(),
                got: snapshot.len(),
            });
        }

        let mut advanced = 0;
        for (slot, &incoming) in self.slots.iter().zip(snapshot.counts()) {
            // Cheap pre-check; fetch_max re-verifies atomically.
            if incoming > slot.load(Ordering::Relaxed)
                && slot.fetch_max(incoming, Ordering::AcqRel) < incoming
            {
                advanced += 1;
            }
        }
        Ok(advanced)
    }

    /// Sum of all slots, each read from its own cell. Saturates.
    pub(crate) fn sum(&self) -> u64 {
        self.slots.iter().fold(0u64, |acc, slot| {
            acc.saturating_add(slot.load(Ordering::Acquire))
        })
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .collect::<Vec<_>>()
            .into()
    }
}
