//! # crdt-tally
//!
//! A grow-only counter replicated across a fixed set of hosts and kept in
//! sync by gossip.
//!
//! Every host (an *actor*) owns one slot of a per-actor vector of partial
//! sums and is the only writer of that slot. Replicas exchange whole vectors
//! and merge them slot by slot with `max`, a state-based CRDT: merging is
//! commutative, associative and idempotent, so replicas converge no matter
//! how often or in which order states arrive.
//!
//! ## Anti-entropy
//!
//! A [`SyncCounter`] spreads state three ways:
//!
//! - **push on write**: every [`SyncCounter::add`] sends the vector to every
//!   peer, retrying with randomized exponential backoff until acknowledged;
//! - **poll**: a background loop pulls every peer every 250–750 ms;
//! - **full sync**: [`SyncCounter::global_value`] pulls from every peer,
//!   retrying until each answers, before it sums.
//!
//! Redundant attempts toward the same peer collapse into the one already in
//! flight. [`SyncCounter::local_value`] never blocks and may undercount;
//! [`SyncCounter::global_value`] may block for as long as a peer is
//! unreachable.
//!
//! ## Quick Start
//!
//! ```
//! use crdt_tally::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), CounterError> {
//! let net = LoopbackNetwork::new();
//! let actors: Vec<String> = ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
//!     .into_iter()
//!     .map(String::from)
//!     .collect();
//!
//! let nodes = (0..3)
//!     .map(|i| net.counter("page-views", &actors, i, SyncConfig::default()))
//!     .collect::<Result<Vec<_>, _>>()?;
//!
//! nodes[0].add(5);
//! assert_eq!(nodes[0].local_value(), 5);
//! assert_eq!(nodes[1].local_value(), 0);
//!
//! nodes[2].add(2);
//! assert_eq!(nodes[1].global_value().await?, 7);
//!
//! for node in &nodes {
//!     node.shutdown().await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Transports
//!
//! The engine talks to peers through the [`Transport`] trait: one attempt to
//! push a [`Snapshot`], one attempt to fetch one. [`LoopbackNetwork`] wires
//! counters together inside one process; the `crdt-tally-server` crate
//! provides the HTTP transport and server.

#![warn(missing_docs)]

mod backoff;
mod config;
mod counter;
mod crdt;
mod error;
mod guard;
mod loopback;
mod slots;
mod snapshot;
mod transport;

pub mod message;
pub mod prelude;

pub use backoff::{Backoff, BackoffConfig, JitterRange};
pub use config::{SyncConfig, DEFAULT_FULL_SYNC_RETRY, DEFAULT_POLL_INTERVAL};
pub use counter::{SyncCounter, WeakCounter};
pub use crdt::Crdt;
pub use error::{CounterError, TransportError};
pub use loopback::LoopbackNetwork;
pub use snapshot::Snapshot;
pub use transport::Transport;
