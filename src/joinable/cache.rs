//! Joinable-network cache.
//!
//! A joinable scan hears the same network many times (every router answers a
//! beacon request). The cache keeps one record per extended PAN ID in a fixed
//! table so the caller can walk the candidates one at a time.
//!
//! Capacity policy is "first discovered wins": once the table is full, new
//! networks are dropped rather than evicting earlier ones. Records are handed
//! out most recently inserted first.
//!
//! # Example
//!
//! ```
//! use wpan_form_join::channel::PageChannel;
//! use wpan_form_join::joinable::{
//!     Beacon, ConsiderResult, ExtendedPanId, JoinFilter, JoinableCache, JoinableCacheConfig,
//!     NetworkRecord,
//! };
//!
//! let mut cache = JoinableCache::new(JoinableCacheConfig::default()).unwrap();
//! let filter = JoinFilter::new(2, ExtendedPanId::WILDCARD);
//!
//! let beacon = Beacon {
//!     extended_pan_id: ExtendedPanId::new([1, 2, 3, 4, 5, 6, 7, 8]),
//!     pan_id: 0x1A2B,
//!     channel: PageChannel::new(0, 15).unwrap(),
//!     stack_profile: 2,
//!     allowing_join: true,
//!     nwk_update_id: 0,
//! };
//! let record = NetworkRecord::new(beacon, 255, -40);
//!
//! assert_eq!(cache.consider(record, &filter), ConsiderResult::Inserted);
//! assert_eq!(cache.consider(record, &filter), ConsiderResult::Duplicate);
//! assert_eq!(cache.pop(), Some(record));
//! ```

use super::record::{ExtendedPanId, JoinFilter, NetworkRecord, RejectReason};
use heapless::Vec;
use std::fmt;

/// Bytes one record occupies in the platform buffer.
pub const NETWORK_RECORD_BYTES: usize = 15;

/// Hard upper bound on cached networks (one buffer on the smallest platform).
pub const MAX_JOINABLE_NETWORKS: usize = 15;

/// Default buffer budget for the cache.
pub const DEFAULT_NETWORK_STORAGE_BYTES: usize = MAX_JOINABLE_NETWORKS * NETWORK_RECORD_BYTES;

/// Records a buffer of `bytes` holds, capped at [`MAX_JOINABLE_NETWORKS`].
pub const fn networks_for_budget(bytes: usize) -> usize {
    let records = bytes / NETWORK_RECORD_BYTES;
    if records > MAX_JOINABLE_NETWORKS {
        MAX_JOINABLE_NETWORKS
    } else {
        records
    }
}

/// Configuration for the joinable-network cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinableCacheConfig {
    /// Maximum number of networks held.
    pub capacity: usize,
}

impl Default for JoinableCacheConfig {
    fn default() -> Self {
        Self {
            capacity: networks_for_budget(DEFAULT_NETWORK_STORAGE_BYTES),
        }
    }
}

impl JoinableCacheConfig {
    /// Size the cache from a byte budget, capped by `max_networks`.
    pub fn from_budget(bytes: usize, max_networks: usize) -> Self {
        Self {
            capacity: networks_for_budget(bytes).min(max_networks),
        }
    }

    /// Bytes the platform must provide for this capacity.
    pub fn buffer_bytes(&self) -> usize {
        self.capacity * NETWORK_RECORD_BYTES
    }

    /// Validate configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `capacity` is 0
    /// - `capacity` exceeds [`MAX_JOINABLE_NETWORKS`]
    pub fn validate(&self) -> Result<(), JoinableCacheError> {
        if self.capacity == 0 {
            return Err(JoinableCacheError::InvalidConfig(
                "capacity must be greater than 0",
            ));
        }
        if self.capacity > MAX_JOINABLE_NETWORKS {
            return Err(JoinableCacheError::InvalidConfig(
                "capacity must be <= MAX_JOINABLE_NETWORKS",
            ));
        }
        Ok(())
    }
}

/// Error type for joinable cache operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinableCacheError {
    /// Invalid configuration parameter.
    InvalidConfig(&'static str),
}

impl fmt::Display for JoinableCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for JoinableCacheError {}

/// Result of offering a beacon to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "ignoring consider result hides dropped networks"]
pub enum ConsiderResult {
    /// New network stored.
    Inserted,
    /// Network already cached; nothing changed.
    Duplicate,
    /// Cache full; the network was dropped.
    Full,
    /// The beacon failed the join policy.
    Rejected(RejectReason),
}

/// Bounded, deduplicating store of joinable networks.
#[derive(Debug, Clone)]
pub struct JoinableCache {
    config: JoinableCacheConfig,
    entries: Vec<NetworkRecord, MAX_JOINABLE_NETWORKS>,
}

impl JoinableCache {
    /// Create an empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: JoinableCacheConfig) -> Result<Self, JoinableCacheError> {
        config.validate()?;
        Ok(Self {
            config,
            entries: Vec::new(),
        })
    }

    /// Apply the join policy, then insert if the network is new and there is room.
    pub fn consider(&mut self, record: NetworkRecord, filter: &JoinFilter) -> ConsiderResult {
        if let Err(reason) = filter.check(&record.beacon) {
            return ConsiderResult::Rejected(reason);
        }
        self.insert(record)
    }

    /// Insert without the join policy.
    pub fn insert(&mut self, record: NetworkRecord) -> ConsiderResult {
        if self.contains(record.extended_pan_id()) {
            return ConsiderResult::Duplicate;
        }
        if self.is_full() {
            return ConsiderResult::Full;
        }
        match self.entries.push(record) {
            Ok(()) => ConsiderResult::Inserted,
            Err(_) => ConsiderResult::Full,
        }
    }

    /// Remove and return the most recently inserted network.
    pub fn pop(&mut self) -> Option<NetworkRecord> {
        self.entries.pop()
    }

    /// Check if a network is cached.
    pub fn contains(&self, extended_pan_id: &ExtendedPanId) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.extended_pan_id() == extended_pan_id)
    }

    /// Cached networks, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkRecord> {
        self.entries.iter()
    }

    /// Drop every cached network.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.config.capacity
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &JoinableCacheConfig {
        &self.config
    }
}
