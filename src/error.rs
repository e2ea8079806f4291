use thiserror::Error;

/// Error type for [`SyncCounter`](crate::SyncCounter) construction and
/// local operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    /// A counter was constructed with an empty actor list.
    #[error("a counter needs at least one actor")]
    NoActors,
    /// The host index does not name an entry of the actor list.
    #[error("host index {host_id} is out of range for {actors} actors")]
    HostOutOfRange {
        /// The rejected host index.
        host_id: usize,
        /// Number of configured actors.
        actors: usize,
    },
    /// A negative increment was offered to a grow-only counter.
    #[error("cannot add a negative value ({0}) to a grow-only counter")]
    NegativeDelta(i64),
    /// An incoming snapshot does not have one slot per actor.
    #[error("snapshot has {got} slots, counter has {expected}")]
    SnapshotLength {
        /// Number of actors of the local counter.
        expected: usize,
        /// Number of slots in the rejected snapshot.
        got: usize,
    },
    /// The counter's background work was stopped while an operation waited on it.
    #[error("counter has been shut down")]
    ShutDown,
}

/// Failure of a single push or pull attempt toward one peer.
///
/// Every variant is treated the same by the sync engine: the attempt had no
/// effect and the calling layer decides whether to retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection refused, reset, timed out, or otherwise not delivered.
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    /// The peer answered with a non-success status.
    #[error("peer responded with status {0}")]
    Status(u16),
    /// The peer's payload could not be decoded or did not fit this counter.
    #[error("malformed sync payload: {0}")]
    Malformed(String),
}
