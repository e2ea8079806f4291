//! Per-peer "attempt in flight" flags.
//!
//! A sync attempt toward peer `i` first claims flag `i`. Claiming a flag that
//! is already held fails immediately instead of waiting, which collapses
//! redundant triggers into the attempt already running. The flag is released
//! when the returned guard drops, including when the owning task is
//! cancelled.
//!
//! Each peer also has a pending bit. A trigger sets it before looking at the
//! claim; the holder clears it before reading the state it sends and checks
//! it again after releasing. Either the trigger sees the claim free or the
//! holder sees the bit, so no trigger is lost.

use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) struct InFlight {
    flags: Box<[AtomicBool]>,
    pending: Box<[AtomicBool]>,
}

impl InFlight {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            flags: (0..len).map(|_| AtomicBool::new(false)).collect(),
            pending: (0..len).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub(crate) fn try_claim(&self, peer: usize) -> Option<InFlightGuard<'_>> {
        let flag = &self.flags[peer];
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlightGuard { flag })
    }

    pub(crate) fn is_claimed(&self, peer: usize) -> bool {
        self.flags[peer].load(Ordering::SeqCst)
    }

    /// Record that `peer` needs newer state than what may be in flight.
    pub(crate) fn mark_pending(&self, peer: usize) {
        self.pending[peer].store(true, Ordering::SeqCst);
    }

    /// Clear the pending bit, returning whether it was set.
    pub(crate) fn take_pending(&self, peer: usize) -> bool {
        self.pending[peer].swap(false, Ordering::SeqCst)
    }

    pub(crate) fn is_pending(&self, peer: usize) -> bool {
        self.pending[peer].load(Ordering::SeqCst)
    }
}

pub(crate) struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
