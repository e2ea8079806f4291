//! In-process [`Transport`] connecting counters that share one process.
//!
//! Every call goes through the same JSON encoding as the HTTP transport, so
//! tests exercise the wire format too. Hosts can be partitioned, slowed
//! down, or made to fail a number of calls, and every call is counted.
//! A partitioned host can neither reach nor be reached by anyone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::counter::WeakCounter;
use crate::message::SyncMsg;
use crate::{CounterError, Snapshot, SyncConfig, SyncCounter, Transport, TransportError};

/// An in-memory network of hosts, addressed by actor string.
///
/// Cloning yields another handle to the same network.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    hosts: Arc<Mutex<HashMap<String, Host>>>,
}

#[derive(Default)]
struct Host {
    counters: HashMap<String, WeakCounter>,
    partitioned: bool,
    failures: usize,
    latency: Duration,
    pushes: usize,
    pulls: usize,
}

#[derive(Clone, Copy)]
enum Call {
    Push,
    Pull,
}

impl LoopbackNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport for calls made by host `local`.
    pub fn transport(&self, local: &str) -> Arc<dyn Transport> {
        Arc::new(LoopbackTransport {
            network: self.clone(),
            local: local.to_string(),
        })
    }

    /// Create a counter on host `actors[host_id]` that talks over this
    /// network, and register it there. The counter is not started.
    pub fn counter(
        &self,
        name: &str,
        actors: &[String],
        host_id: usize,
        config: SyncConfig,
    ) -> Result<SyncCounter, CounterError> {
        let local = actors.get(host_id).map_or("", String::as_str);
        let counter =
            SyncCounter::new(name, actors.to_vec(), host_id, self.transport(local), config)?;
        self.register(&counter);
        Ok(counter)
    }

    /// Make `counter` reachable at its own actor address.
    ///
    /// The network only keeps a weak handle.
    pub fn register(&self, counter: &SyncCounter) {
        let addr = counter.actors()[counter.host_id()].clone();
        self.hosts
            .lock()
            .entry(addr)
            .or_default()
            .counters
            .insert(counter.name().to_string(), counter.downgrade());
    }

    /// Every call to or from `addr` fails as unreachable until
    /// [`heal`](Self::heal).
    pub fn partition(&self, addr: &str) {
        self.hosts.lock().entry(addr.to_string()).or_default().partitioned = true;
    }

    /// Undo [`partition`](Self::partition).
    pub fn heal(&self, addr: &str) {
        self.hosts.lock().entry(addr.to_string()).or_default().partitioned = false;
    }

    /// The next `n` calls to `addr` answer with status 503.
    pub fn fail_next(&self, addr: &str, n: usize) {
        self.hosts.lock().entry(addr.to_string()).or_default().failures = n;
    }

    /// Delay every call to `addr` by `latency` before it is handled.
    pub fn set_latency(&self, addr: &str, latency: Duration) {
        self.hosts.lock().entry(addr.to_string()).or_default().latency = latency;
    }

    /// Push attempts made toward `addr`, failed ones included.
    #[must_use]
    pub fn pushes_to(&self, addr: &str) -> usize {
        self.hosts.lock().get(addr).map_or(0, |h| h.pushes)
    }

    /// Pull attempts made toward `addr`, failed ones included.
    #[must_use]
    pub fn pulls_from(&self, addr: &str) -> usize {
        self.hosts.lock().get(addr).map_or(0, |h| h.pulls)
    }

    /// Count the call and apply the host's latency, then resolve the target
    /// counter or the configured failure.
    async fn route(
        &self,
        from: &str,
        addr: &str,
        name: &str,
        call: Call,
    ) -> Result<SyncCounter, TransportError> {
        let latency = {
            let mut hosts = self.hosts.lock();
            let host = hosts.entry(addr.to_string()).or_default();
            match call {
                Call::Push => host.pushes += 1,
                Call::Pull => host.pulls += 1,
            }
            host.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut hosts = self.hosts.lock();
        if hosts.get(from).is_some_and(|h| h.partitioned) {
            return Err(TransportError::Unreachable(format!("{from} is partitioned")));
        }
        let host = hosts.entry(addr.to_string()).or_default();
        if host.partitioned {
            return Err(TransportError::Unreachable(format!("{addr} is partitioned")));
        }
        if host.failures > 0 {
            host.failures -= 1;
            return Err(TransportError::Status(503));
        }
        host.counters
            .get(name)
            .and_then(WeakCounter::upgrade)
            .ok_or(TransportError::Status(404))
    }
}

/// The [`Transport`] handed to one host of a [`LoopbackNetwork`].
struct LoopbackTransport {
    network: LoopbackNetwork,
    local: String,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send_sync(
        &self,
        peer: &str,
        counter: &str,
        snapshot: &Snapshot,
    ) -> Result<(), TransportError> {
        let body = SyncMsg::from(snapshot.clone()).to_vec()?;
        let target = self
            .network
            .route(&self.local, peer, counter, Call::Push)
            .await?;
        let msg = SyncMsg::from_slice(&body).map_err(|_| TransportError::Status(400))?;
        target
            .apply_snapshot(&msg.into())
            .map_err(|_| TransportError::Status(400))
    }

    async fn fetch_sync(&self, peer: &str, counter: &str) -> Result<Snapshot, TransportError> {
        let target = self
            .network
            .route(&self.local, peer, counter, Call::Pull)
            .await?;
        let body = SyncMsg::from(target.current_snapshot()).to_vec()?;
        Ok(SyncMsg::from_slice(&body)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actors() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[tokio::test]
    async fn fetch_returns_remote_state() {
        let net = LoopbackNetwork::new();
        let b = net.counter("c", &actors(), 1, SyncConfig::default()).unwrap();
        b.apply_snapshot(&Snapshot::from(vec![0, 6])).unwrap();

        let snapshot = net.transport("a").fetch_sync("b", "c").await.unwrap();
        assert_eq!(snapshot.counts(), &[0, 6]);
        assert_eq!(net.pulls_from("b"), 1);
    }

    #[tokio::test]
    async fn send_merges_into_remote() {
        let net = LoopbackNetwork::new();
        let b = net.counter("c", &actors(), 1, SyncConfig::default()).unwrap();

        net.transport("a")
            .send_sync("b", "c", &Snapshot::from(vec![3, 0]))
            .await
            .unwrap();
        assert_eq!(b.local_value(), 3);
        assert_eq!(net.pushes_to("b"), 1);
    }

    #[tokio::test]
    async fn unknown_counter_is_not_found() {
        let net = LoopbackNetwork::new();
        let _b = net.counter("c", &actors(), 1, SyncConfig::default()).unwrap();
        assert_eq!(
            net.transport("a").fetch_sync("b", "other").await,
            Err(TransportError::Status(404))
        );
    }

    #[tokio::test]
    async fn wrong_length_push_is_refused() {
        let net = LoopbackNetwork::new();
        let b = net.counter("c", &actors(), 1, SyncConfig::default()).unwrap();
        assert_eq!(
            net.transport("a")
                .send_sync("b", "c", &Snapshot::from(vec![1, 2, 3]))
                .await,
            Err(TransportError::Status(400))
        );
        assert_eq!(b.local_value(), 0);
    }

    #[tokio::test]
    async fn partition_and_heal() {
        let net = LoopbackNetwork::new();
        let _b = net.counter("c", &actors(), 1, SyncConfig::default()).unwrap();

        net.partition("b");
        assert!(matches!(
            net.transport("a").fetch_sync("b", "c").await,
            Err(TransportError::Unreachable(_))
        ));

        net.heal("b");
        assert!(net.transport("a").fetch_sync("b", "c").await.is_ok());
        assert_eq!(net.pulls_from("b"), 2);
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let net = LoopbackNetwork::new();
        let _b = net.counter("c", &actors(), 1, SyncConfig::default()).unwrap();

        net.fail_next("b", 2);
        let a = net.transport("a");
        assert_eq!(a.fetch_sync("b", "c").await, Err(TransportError::Status(503)));
        assert_eq!(a.fetch_sync("b", "c").await, Err(TransportError::Status(503)));
        assert!(a.fetch_sync("b", "c").await.is_ok());
    }

    #[tokio::test]
    async fn dropped_counter_is_unreachable() {
        let net = LoopbackNetwork::new();
        let b = net.counter("c", &actors(), 1, SyncConfig::default()).unwrap();
        drop(b);
        assert_eq!(
            net.transport("a").fetch_sync("b", "c").await,
            Err(TransportError::Status(404))
        );
    }
}
