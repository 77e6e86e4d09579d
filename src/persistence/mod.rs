//! Persistence Layer
//!
//! Checksummed JSON snapshots of the engine state, used by the CLI to carry
//! state between invocations and by embedders for crash recovery.

pub mod snapshot;

pub use snapshot::{EngineSnapshot, IdCounters, SnapshotFile, SNAPSHOT_VERSION};
