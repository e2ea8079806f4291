//! The synchronizing counter: local state plus the three anti-entropy paths.
//!
//! - **Push on write.** [`SyncCounter::add`] bumps the local slot, then sends
//!   the whole vector to every peer, retrying each with exponential backoff
//!   until it is acknowledged.
//! - **Poll.** While running, a background loop pulls every peer's vector
//!   once per jittered interval and merges it. A failed pull is simply
//!   retried on the next round.
//! - **Full sync.** [`SyncCounter::global_value`] pulls from every peer,
//!   retrying each until it succeeds, before summing.
//!
//! Concurrent push attempts toward the same peer collapse into the one
//! already in flight, and likewise for poll pulls. The two directions have
//! independent flags. A write that finds a push in flight is sent by that
//! push's loop once its current attempt is acknowledged.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;
use crate::guard::InFlight;
use crate::slots::SlotVector;
use crate::{CounterError, Snapshot, SyncConfig, Transport, TransportError};

/// Log a warning every this many failed pulls of one full sync.
const FULL_SYNC_WARN_EVERY: u32 = 50;

/// A grow-only counter replicated across a fixed set of actors.
///
/// Cloning is cheap and yields another handle to the same counter.
///
/// Background work (poll loop, push retries, full-sync pulls) runs as Tokio
/// tasks, so [`add`](Self::add), [`start`](Self::start),
/// [`push_to_all`](Self::push_to_all) and [`full_sync`](Self::full_sync) must
/// be called from within a Tokio runtime when the counter has peers.
///
/// # Example
///
/// ```
/// use crdt_tally::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), CounterError> {
/// let net = LoopbackNetwork::new();
/// let actors = vec!["a".to_string(), "b".to_string()];
///
/// let a = net.counter("hits", &actors, 0, SyncConfig::default())?;
/// let b = net.counter("hits", &actors, 1, SyncConfig::default())?;
///
/// a.add(3);
/// b.add(4);
///
/// // Pulls from every peer before summing.
/// assert_eq!(a.global_value().await?, 7);
///
/// a.shutdown().await;
/// b.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SyncCounter {
    inner: Arc<Inner>,
}

/// A non-owning handle to a [`SyncCounter`].
#[derive(Clone, Debug)]
pub struct WeakCounter {
    inner: Weak<Inner>,
}

struct Inner {
    name: String,
    actors: Vec<String>,
    host_id: usize,
    slots: SlotVector,
    pushing: InFlight,
    pulling: InFlight,
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    tasks: TaskTracker,
    cancel: CancellationToken,
    polling: AtomicBool,
}

impl SyncCounter {
    /// Create a counter with every slot at zero. No background work starts
    /// until [`start`](Self::start).
    ///
    /// `host_id` is this process's index into `actors`.
    pub fn new(
        name: impl Into<String>,
        actors: Vec<String>,
        host_id: usize,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Result<Self, CounterError> {
        if actors.is_empty() {
            return Err(CounterError::NoActors);
        }
        if host_id >= actors.len() {
            return Err(CounterError::HostOutOfRange {
                host_id,
                actors: actors.len(),
            });
        }

        let len = actors.len();
        Ok(Self {
            inner: Arc::new(Inner {
                name: name.into(),
                actors,
                host_id,
                slots: SlotVector::new(len),
                pushing: InFlight::new(len),
                pulling: InFlight::new(len),
                transport,
                config,
                tasks: TaskTracker::new(),
                cancel: CancellationToken::new(),
                polling: AtomicBool::new(false),
            }),
        })
    }

    /// [`new`](Self::new) followed by [`start`](Self::start).
    pub fn spawn(
        name: impl Into<String>,
        actors: Vec<String>,
        host_id: usize,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Result<Self, CounterError> {
        let counter = Self::new(name, actors, host_id, transport, config)?;
        counter.start();
        Ok(counter)
    }

    /// Start the background poll loop. Calling it again is a no-op, and so is
    /// calling it after [`shutdown`](Self::shutdown).
    pub fn start(&self) {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            warn!(counter = %inner.name, "not starting a counter that was shut down");
            return;
        }
        if inner.polling.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(
            counter = %inner.name,
            host_id = inner.host_id,
            actors = inner.actors.len(),
            "starting poll loop"
        );
        inner.tasks.spawn(Arc::clone(inner).poll_forever());
    }

    /// Stop all background work and wait for it to finish.
    ///
    /// Pending push retries are abandoned and a waiting
    /// [`global_value`](Self::global_value) returns
    /// [`CounterError::ShutDown`]. Local state stays readable.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.cancel.cancel();
        inner.tasks.close();
        inner.tasks.wait().await;
        debug!(counter = %inner.name, "counter shut down");
    }

    /// Returns `true` while the poll loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.polling.load(Ordering::Acquire) && !self.inner.cancel.is_cancelled()
    }

    /// Increment this host's own slot by `delta` and push the new state to
    /// every peer in the background. Adding zero does nothing.
    pub fn add(&self, delta: u64) {
        if delta == 0 {
            return;
        }
        let inner = &self.inner;
        let own = inner.slots.add(inner.host_id, delta);
        debug!(counter = %inner.name, delta, own, "local add");
        self.push_to_all();
    }

    /// Sum of every slot as currently known. Never touches the network, and
    /// may undercount updates that have not reached this host yet.
    #[must_use]
    pub fn local_value(&self) -> u64 {
        self.inner.slots.sum()
    }

    /// Pull from every peer, then sum.
    ///
    /// Every peer is contacted during this call even if the poll loop has
    /// converged already. A peer that stays unreachable makes this wait
    /// forever; dropping the future abandons the wait.
    pub async fn global_value(&self) -> Result<u64, CounterError> {
        self.full_sync().await?;
        Ok(self.local_value())
    }

    /// Copy of the current per-actor counts.
    #[must_use]
    pub fn current_snapshot(&self) -> Snapshot {
        self.inner.slots.snapshot()
    }

    /// Merge a peer's counts into this counter.
    ///
    /// A snapshot with the wrong number of slots is rejected and nothing is
    /// merged.
    pub fn apply_snapshot(&self, snapshot: &Snapshot) -> Result<(), CounterError> {
        let advanced = self.inner.slots.merge(snapshot)?;
        if advanced > 0 {
            debug!(counter = %self.inner.name, advanced, "merged remote state");
        }
        Ok(())
    }

    /// Fire one push retry loop per peer, skipping peers that already have
    /// one in flight.
    pub fn push_to_all(&self) {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return;
        }
        for peer in inner.peers() {
            inner.pushing.mark_pending(peer);
            if inner.pushing.is_claimed(peer) {
                trace!(counter = %inner.name, peer = %inner.actors[peer], "push already in flight");
                continue;
            }
            inner.tasks.spawn(Arc::clone(inner).push_with_backoff(peer));
        }
    }

    /// Fire one pull attempt per peer, skipping peers that already have one
    /// in flight. This is one round of the poll loop.
    pub fn pull_from_all(&self) {
        spawn_pull_round(&self.inner);
    }

    /// Pull from every peer concurrently, retrying each until it succeeds.
    pub async fn full_sync(&self) -> Result<(), CounterError> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(CounterError::ShutDown);
        }

        // Dropping this call stops its pull loops.
        let call = inner.cancel.child_token();
        let _abandon = call.clone().drop_guard();

        let handles: Vec<_> = inner
            .peers()
            .map(|peer| {
                inner
                    .tasks
                    .spawn(Arc::clone(inner).pull_until_synced(peer, call.clone()))
            })
            .collect();
        let peers = handles.len();

        for handle in handles {
            match handle.await {
                Ok(true) => {}
                Ok(false) => return Err(CounterError::ShutDown),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => return Err(CounterError::ShutDown),
            }
        }
        debug!(counter = %inner.name, peers, "full sync complete");
        Ok(())
    }

    /// Name shared by this counter's replicas on every host.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The fixed actor list.
    #[must_use]
    pub fn actors(&self) -> &[String] {
        &self.inner.actors
    }

    /// This host's index into [`actors`](Self::actors).
    #[must_use]
    pub fn host_id(&self) -> usize {
        self.inner.host_id
    }

    /// Indices of every actor except this host.
    pub fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        self.inner.peers()
    }

    /// Returns `true` while a push retry loop toward `peer` is running.
    #[must_use]
    pub fn push_in_flight(&self, peer: usize) -> bool {
        self.inner.pushing.is_claimed(peer)
    }

    /// Returns `true` while a poll pull from `peer` is running.
    #[must_use]
    pub fn pull_in_flight(&self, peer: usize) -> bool {
        self.inner.pulling.is_claimed(peer)
    }

    /// A handle that does not keep the counter alive.
    pub fn downgrade(&self) -> WeakCounter {
        WeakCounter {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for SyncCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCounter")
            .field("name", &self.inner.name)
            .field("host_id", &self.inner.host_id)
            .field("actors", &self.inner.actors)
            .field("counts", &self.inner.slots.snapshot().counts())
            .finish()
    }
}

impl WeakCounter {
    /// The counter, if any handle to it is still alive.
    pub fn upgrade(&self) -> Option<SyncCounter> {
        self.inner.upgrade().map(|inner| SyncCounter { inner })
    }
}

impl Inner {
    fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.actors.len()).filter(move |&i| i != self.host_id)
    }

    async fn push_once(&self, peer: usize) -> Result<(), TransportError> {
        let snapshot = self.slots.snapshot();
        self.transport
            .send_sync(&self.actors[peer], &self.name, &snapshot)
            .await
    }

    async fn pull_once(&self, peer: usize) -> Result<(), TransportError> {
        let snapshot = self
            .transport
            .fetch_sync(&self.actors[peer], &self.name)
            .await?;
        let advanced = self
            .slots
            .merge(&snapshot)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        if advanced > 0 {
            debug!(counter = %self.name, peer = %self.actors[peer], advanced, "pulled newer state");
        }
        Ok(())
    }

    /// Push until acknowledged, then again for as long as a trigger arrived
    /// after the last delivered vector was read.
    async fn push_with_backoff(self: Arc<Self>, peer: usize) {
        loop {
            let Some(claim) = self.pushing.try_claim(peer) else {
                trace!(counter = %self.name, peer = %self.actors[peer], "push already in flight");
                return;
            };
            let delivered = self.push_until_acked(peer).await;
            drop(claim);

            if !delivered || !self.pushing.is_pending(peer) {
                return;
            }
            trace!(counter = %self.name, peer = %self.actors[peer], "newer state written during push");
        }
    }

    /// Returns `false` if cancelled before the peer acknowledged.
    async fn push_until_acked(&self, peer: usize) -> bool {
        let mut backoff = Backoff::new(self.config.push_backoff);
        loop {
            // Cleared before the vector is read: any later add sets it again.
            self.pushing.take_pending(peer);
            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => return false,
                result = self.push_once(peer) => result,
            };
            let error = match attempt {
                Ok(()) => {
                    trace!(counter = %self.name, peer = %self.actors[peer], "push delivered");
                    return true;
                }
                Err(error) => error,
            };

            let delay = backoff.next_delay(&mut rand::thread_rng());
            debug!(
                counter = %self.name,
                peer = %self.actors[peer],
                %error,
                ?delay,
                "push failed, backing off"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn poll_forever(self: Arc<Self>) {
        loop {
            spawn_pull_round(&self);
            let delay = self.config.poll_interval.sample(&mut rand::thread_rng());
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(counter = %self.name, "poll loop stopped");
    }

    /// One best-effort pull. Failures are left to the next poll round.
    async fn pull_singleton(self: Arc<Self>, peer: usize) {
        let Some(_claim) = self.pulling.try_claim(peer) else {
            return;
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            result = self.pull_once(peer) => {
                if let Err(error) = result {
                    debug!(counter = %self.name, peer = %self.actors[peer], %error, "poll pull failed");
                }
            }
        }
    }

    /// Returns `false` if cancelled before a pull succeeded.
    async fn pull_until_synced(self: Arc<Self>, peer: usize, cancel: CancellationToken) -> bool {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            let result = tokio::select! {
                _ = cancel.cancelled() => return false,
                result = self.pull_once(peer) => result,
            };
            match result {
                Ok(()) => {
                    trace!(counter = %self.name, peer = %self.actors[peer], attempts, "full sync reached peer");
                    return true;
                }
                Err(error) if attempts % FULL_SYNC_WARN_EVERY == 0 => {
                    warn!(counter = %self.name, peer = %self.actors[peer], attempts, %error, "full sync still waiting on peer");
                }
                Err(error) => {
                    debug!(counter = %self.name, peer = %self.actors[peer], attempts, %error, "full sync pull failed");
                }
            }

            let delay = self.config.full_sync_retry.sample(&mut rand::thread_rng());
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn spawn_pull_round(inner: &Arc<Inner>) {
    if inner.cancel.is_cancelled() {
        return;
    }
    for peer in inner.peers() {
        if inner.pulling.is_claimed(peer) {
            continue;
        }
        inner.tasks.spawn(Arc::clone(inner).pull_singleton(peer));
    }
}
