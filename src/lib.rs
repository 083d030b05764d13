//! IEEE 802.15.4 network formation and join scanning.
//!
//! This library decides where a mesh node forms or joins a network. It picks
//! quiet channels from energy scans, finds PAN IDs no neighbour uses, and
//! walks joinable networks one at a time across 2.4 GHz and sub-GHz pages.
//! The radio driver and buffer allocator are collaborators behind traits, so
//! everything here runs and is tested on the host.

pub mod buffer;
pub mod channel;
pub mod discovery;
pub mod joinable;
pub mod pan_id;
pub mod radio;
pub mod rng;
pub mod session;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use buffer::{BufferHandle, BufferProvider, StaticBufferPool};
pub use channel::{ChannelMask, PageChannel, SearchMode};
pub use discovery::{DiscoveryConfig, DiscoveryError, DiscoveryEvent, Notifications, Orchestrator};
pub use joinable::{Beacon, ExtendedPanId, NetworkRecord};
pub use radio::{Radio, RadioEvent, ScanKind, ScanStatus};
pub use session::{ScanError, ScanSession, SessionConfig, SessionOutcome};
