//! Scan sessions.
//!
//! This module contains:
//! - [`machine`]: The session state machine driving energy, PAN ID and joinable scans
//! - [`config`]: Scan durations, timeouts and buffer budgets
//! - [`error`]: Session errors with their stack status codes
//! - [`timer`]: Soft deadline used for the resumption window
//! - [`stats`]: Per-session counters

mod config;
mod error;
mod machine;
mod stats;
mod timer;

pub use config::{
    SessionConfig, SessionConfigError, DEFAULT_MAX_PAN_ID_ATTEMPTS, DEFAULT_RESUME_TIMEOUT,
    MAX_SCAN_DURATION,
};
pub use error::ScanError;
pub use machine::{ScanSession, SessionOutcome, SessionState};
pub use stats::ScanStats;
pub use timer::Timer;
