//! Form and join policy on top of scan sessions.
//!
//! This module contains:
//! - [`orchestrator`]: Sequences scan sessions across pages for form and join requests
//! - [`config`]: Channel masks, search mode and join restrictions
//! - [`notify`]: Events handed back to the application
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use wpan_form_join::buffer::StaticBufferPool;
//! use wpan_form_join::channel::PageChannel;
//! use wpan_form_join::discovery::{DiscoveryConfig, DiscoveryEvent, Orchestrator};
//! use wpan_form_join::radio::{RadioEvent, RecordingRadio, ScanStatus};
//! use wpan_form_join::rng::ScanRng;
//!
//! let mut orchestrator = Orchestrator::new(
//!     DiscoveryConfig::default(),
//!     RecordingRadio::new(2),
//!     StaticBufferPool::default(),
//!     ScanRng::new(7),
//! )
//! .unwrap();
//!
//! let now = Instant::now();
//! let ch15 = PageChannel::new(0, 15).unwrap();
//! let _ = orchestrator.find_unused_pan_id_and_form(now).unwrap();
//! let _ = orchestrator
//!     .handle_radio(RadioEvent::EnergyScanResult { channel: ch15, energy: -90 }, now)
//!     .unwrap();
//! let done = RadioEvent::ScanComplete { channel: ch15, status: ScanStatus::Success };
//! let _ = orchestrator.handle_radio(done, now).unwrap();
//!
//! // The PAN ID scan on channel 15 hears nothing
//! let events = orchestrator.handle_radio(done, now).unwrap();
//! assert!(matches!(
//!     events.as_slice(),
//!     [DiscoveryEvent::UnusedPanIdFound { channel, .. }] if *channel == ch15
//! ));
//! ```

mod config;
mod notify;
mod orchestrator;

pub use config::{
    full_pages, DiscoveryConfig, DiscoveryConfigError, PageList, DEFAULT_POST_JOIN_WINDOW,
    MAX_SEARCH_PAGES, MAX_SUBGHZ_PAGES, PREFERRED_2_4_GHZ_CHANNELS,
};
pub use notify::{DiscoveryEvent, Notifications, MAX_NOTIFICATIONS};
pub use orchestrator::{DiscoveryError, DiscoveryState, Input, Orchestrator};
