//! Name → counter map for one host, plus the cluster membership it was
//! configured with.

use std::collections::HashMap;
use std::sync::Arc;

use crdt_tally::{CounterError, SyncConfig, SyncCounter, Transport};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::ServerError;

/// The actor list this host was configured with and its own place in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Actor addresses in index order.
    pub actors: Vec<String>,
    /// Index of this host in `actors`.
    pub host_id: usize,
}

/// Every counter known on this host.
///
/// Counters are created on first reference and started immediately. The
/// membership is set once; there is no way to change it afterwards.
pub struct Registry {
    transport: Arc<dyn Transport>,
    sync: SyncConfig,
    cluster: RwLock<Option<Cluster>>,
    counters: Mutex<Counters>,
}

#[derive(Default)]
struct Counters {
    by_name: HashMap<String, SyncCounter>,
    closed: bool,
}

impl Registry {
    /// An unconfigured registry whose counters sync through `transport`.
    pub fn new(transport: Arc<dyn Transport>, sync: SyncConfig) -> Self {
        Self {
            transport,
            sync,
            cluster: RwLock::new(None),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Set the cluster membership.
    ///
    /// Repeating the same actor list is accepted; a different one is
    /// refused.
    pub fn configure(&self, cluster: Cluster) -> Result<(), ServerError> {
        let Some(local) = cluster.actors.get(cluster.host_id) else {
            return Err(if cluster.actors.is_empty() {
                CounterError::NoActors
            } else {
                CounterError::HostOutOfRange {
                    host_id: cluster.host_id,
                    actors: cluster.actors.len(),
                }
            }
            .into());
        };
        let mut current = self.cluster.write();
        if let Some(existing) = current.as_ref() {
            return if existing.actors == cluster.actors {
                Ok(())
            } else {
                Err(ServerError::AlreadyConfigured)
            };
        }
        info!(
            actors = ?cluster.actors,
            host_id = cluster.host_id,
            local = %local,
            "configuration received"
        );
        *current = Some(cluster);
        Ok(())
    }

    /// The configured membership.
    pub fn cluster(&self) -> Result<Cluster, ServerError> {
        self.cluster.read().clone().ok_or(ServerError::NotConfigured)
    }

    /// An existing counter.
    pub fn get(&self, name: &str) -> Result<SyncCounter, ServerError> {
        self.ensure_configured()?;
        self.counters
            .lock()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::UnknownCounter(name.to_string()))
    }

    /// The counter called `name`, created and started if this is the first
    /// time it is referenced.
    pub fn get_or_spawn(&self, name: &str) -> Result<SyncCounter, ServerError> {
        let cluster = self.cluster()?;
        let mut counters = self.counters.lock();
        if counters.closed {
            return Err(CounterError::ShutDown.into());
        }
        if let Some(counter) = counters.by_name.get(name) {
            return Ok(counter.clone());
        }

        info!(counter = name, "counter not found, creating a new one");
        let counter = SyncCounter::spawn(
            name,
            cluster.actors,
            cluster.host_id,
            Arc::clone(&self.transport),
            self.sync,
        )?;
        counters.by_name.insert(name.to_string(), counter.clone());
        Ok(counter)
    }

    /// Number of counters on this host.
    pub fn len(&self) -> usize {
        self.counters.lock().by_name.len()
    }

    /// Returns `true` if no counter has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shut every counter down. No counter can be created afterwards.
    pub async fn shutdown_all(&self) {
        let counters: Vec<SyncCounter> = {
            let mut counters = self.counters.lock();
            counters.closed = true;
            counters.by_name.values().cloned().collect()
        };
        debug!(counters = counters.len(), "shutting down counters");
        for counter in counters {
            counter.shutdown().await;
        }
    }

    fn ensure_configured(&self) -> Result<(), ServerError> {
        if self.cluster.read().is_some() {
            Ok(())
        } else {
            Err(ServerError::NotConfigured)
        }
    }
}
