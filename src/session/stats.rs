//! Per-session scan counters.

use std::fmt;

/// Counters for the current (or last) session, reset when a session starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Energy readings received.
    pub energy_samples: u32,
    /// Beacons heard, in any active scan.
    pub beacons_seen: u32,
    /// Networks added to the joinable cache.
    pub networks_cached: u32,
    /// Beacons for networks already cached.
    pub duplicates: u32,
    /// Joinable networks dropped because the cache was full.
    pub dropped: u32,
    /// Beacons that failed the join policy.
    pub rejected: u32,
    /// PAN ID trial sets drawn.
    pub pan_id_attempts: u32,
    /// Channels covered by scan requests.
    pub channels_scanned: u32,
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channels={} energy={} beacons={} cached={} dup={} dropped={} rejected={} pan_id_attempts={}",
            self.channels_scanned,
            self.energy_samples,
            self.beacons_seen,
            self.networks_cached,
            self.duplicates,
            self.dropped,
            self.rejected,
            self.pan_id_attempts
        )
    }
}
