//! Partitioned response cache and the fetch strategies that run against it.
//!
//! - Partitions are named, versioned key-value stores of request -> response snapshot
//! - Cache-first serves stored snapshots without touching the network
//! - Network-first always tries the network and falls back to the partition
//! - Neither strategy ever fails a request: the last resort is a synthetic response

mod layer;
mod partition;
mod storage;
mod types;

pub use layer::CacheLayer;
pub use partition::{PartitionNames, Purpose};
pub use storage::{CacheStorage, SqliteStorage, StoreError};
pub use types::{Destination, Request, RequestKey, Response, ResponseType, Served};

#[cfg(test)]
pub use storage::StoreResult;
#[cfg(test)]
pub use types::{CachedResponse, ResponseSource};
