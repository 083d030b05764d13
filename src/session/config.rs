//! Scan session configuration.

use crate::channel::{
    candidates_for_budget, DEFAULT_CANDIDATE_BUFFER_BYTES, MAX_CHANNEL_CANDIDATES,
};
use crate::joinable::{JoinableCacheConfig, DEFAULT_NETWORK_STORAGE_BYTES, MAX_JOINABLE_NETWORKS};
use crate::radio::{ACTIVE_SCAN_DURATION, ENERGY_SCAN_DURATION, SUBGHZ_ACTIVE_SCAN_DURATION};
use std::fmt;
use std::time::Duration;

/// Largest 802.15.4 scan-duration exponent.
pub const MAX_SCAN_DURATION: u8 = 14;

/// Default window in which a caller may ask for the next joinable network.
pub const DEFAULT_RESUME_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of PAN ID trial sets drawn before giving up.
pub const DEFAULT_MAX_PAN_ID_ATTEMPTS: u8 = 4;

/// Configuration for a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Energy scan duration exponent.
    pub energy_scan_duration: u8,

    /// Active scan duration exponent on 2.4 GHz.
    pub active_scan_duration: u8,

    /// Active scan duration exponent on sub-GHz pages.
    pub subghz_active_scan_duration: u8,

    /// How long a delivered network stays resumable.
    pub resume_timeout: Duration,

    /// PAN ID trial sets to draw before reporting exhaustion.
    pub max_pan_id_attempts: u8,

    /// Scratch buffer bytes for energy-scan candidates (2 bytes each).
    pub candidate_buffer_bytes: usize,

    /// Buffer bytes for the joinable-network cache (15 bytes per network).
    pub cache_buffer_bytes: usize,

    /// Cap on cached networks regardless of buffer size.
    pub max_cached_networks: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            energy_scan_duration: ENERGY_SCAN_DURATION,
            active_scan_duration: ACTIVE_SCAN_DURATION,
            subghz_active_scan_duration: SUBGHZ_ACTIVE_SCAN_DURATION,
            resume_timeout: DEFAULT_RESUME_TIMEOUT,
            max_pan_id_attempts: DEFAULT_MAX_PAN_ID_ATTEMPTS,
            candidate_buffer_bytes: DEFAULT_CANDIDATE_BUFFER_BYTES,
            cache_buffer_bytes: DEFAULT_NETWORK_STORAGE_BYTES,
            max_cached_networks: MAX_JOINABLE_NETWORKS,
        }
    }
}

impl SessionConfig {
    /// Cache configuration derived from the buffer budget and cap.
    pub fn cache_config(&self) -> JoinableCacheConfig {
        JoinableCacheConfig::from_budget(self.cache_buffer_bytes, self.max_cached_networks)
    }

    /// Reservoir slots the candidate buffer holds.
    pub fn candidate_slots(&self) -> usize {
        candidates_for_budget(self.candidate_buffer_bytes)
    }

    /// Validate configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - any scan duration exceeds [`MAX_SCAN_DURATION`]
    /// - `resume_timeout` is zero
    /// - `max_pan_id_attempts` is 0
    /// - the candidate buffer holds no slot
    /// - the cache buffer or cap allows no network
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        if self.energy_scan_duration > MAX_SCAN_DURATION
            || self.active_scan_duration > MAX_SCAN_DURATION
            || self.subghz_active_scan_duration > MAX_SCAN_DURATION
        {
            return Err(SessionConfigError::InvalidConfig(
                "scan durations must be <= 14",
            ));
        }
        if self.resume_timeout.is_zero() {
            return Err(SessionConfigError::InvalidConfig(
                "resume_timeout must be non-zero",
            ));
        }
        if self.max_pan_id_attempts == 0 {
            return Err(SessionConfigError::InvalidConfig(
                "max_pan_id_attempts must be greater than 0",
            ));
        }
        let slots = self.candidate_slots();
        if slots == 0 || slots > MAX_CHANNEL_CANDIDATES {
            return Err(SessionConfigError::InvalidConfig(
                "candidate buffer must hold at least one candidate",
            ));
        }
        if self.cache_config().validate().is_err() {
            return Err(SessionConfigError::InvalidConfig(
                "cache buffer must hold at least one network",
            ));
        }
        Ok(())
    }
}

/// Error type for session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionConfigError {
    /// Invalid configuration parameter.
    InvalidConfig(&'static str),
}

impl fmt::Display for SessionConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid session config: {}", msg),
        }
    }
}

impl std::error::Error for SessionConfigError {}
