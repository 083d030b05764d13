//! Discovered networks and the joinable-network cache.
//!
//! This module contains:
//! - [`record`]: Beacons, network records and the join acceptance filter
//! - [`cache`]: Bounded, deduplicating cache consumed most-recent first

mod cache;
mod record;

pub use cache::{
    networks_for_budget, ConsiderResult, JoinableCache, JoinableCacheConfig, JoinableCacheError,
    DEFAULT_NETWORK_STORAGE_BYTES, MAX_JOINABLE_NETWORKS, NETWORK_RECORD_BYTES,
};
pub use record::{
    Beacon, ExtendedPanId, JoinFilter, NetworkRecord, RejectReason, EXTENDED_PAN_ID_SIZE,
};
