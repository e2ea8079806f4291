//! Convenient re-exports for common usage.
//!
//! ```
//! use crdt_tally::prelude::*;
//! ```

pub use crate::message::{AddMsg, ConfigMsg, SyncMsg};
pub use crate::CounterError;
pub use crate::Crdt;
pub use crate::LoopbackNetwork;
pub use crate::Snapshot;
pub use crate::SyncConfig;
pub use crate::SyncCounter;
pub use crate::Transport;
pub use crate::TransportError;
