use async_trait::async_trait;

use crate::{Snapshot, TransportError};

/// Single-shot delivery of counter state between hosts.
///
/// Both calls make exactly one attempt: no retries, no deduplication. A
/// failed call must not leave partial effects behind; the sync engine layers
/// its own retry policy on top.
///
/// Peers are addressed by the actor strings the counter was configured with
/// and counters by name, so one transport serves every counter of a host.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver `snapshot` to counter `counter` on `peer`, creating it there if
    /// needed. Succeeds only if the peer acknowledged.
    async fn send_sync(
        &self,
        peer: &str,
        counter: &str,
        snapshot: &Snapshot,
    ) -> Result<(), TransportError>;

    /// Fetch the current state of counter `counter` on `peer`.
    async fn fetch_sync(&self, peer: &str, counter: &str) -> Result<Snapshot, TransportError>;
}
