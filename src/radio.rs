//! Radio driver collaborator.
//!
//! The engine does not drive a MAC or PHY. It asks a [`Radio`] to start
//! energy or active scans and is told about progress through [`RadioEvent`]s
//! fed back into the state machine, one at a time, in the same task.
//!
//! # Example
//!
//! ```
//! use wpan_form_join::channel::ChannelMask;
//! use wpan_form_join::radio::{Radio, RecordingRadio, ScanKind};
//!
//! let mut radio = RecordingRadio::new(2);
//! radio.start_scan(ScanKind::Energy, ChannelMask::ALL_2_4_GHZ, 5).unwrap();
//! assert_eq!(radio.requests()[0].kind, ScanKind::Energy);
//! ```

use crate::channel::{ChannelMask, PageChannel};
use crate::joinable::Beacon;
use std::fmt;

/// Active scan duration on 2.4 GHz, in 802.15.4 scan-duration exponents.
pub const ACTIVE_SCAN_DURATION: u8 = 3;

/// Active scan duration on sub-GHz pages.
pub const SUBGHZ_ACTIVE_SCAN_DURATION: u8 = 5;

/// Default energy scan duration.
pub const ENERGY_SCAN_DURATION: u8 = 5;

/// Kind of scan the driver performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Passive RF energy measurement per channel.
    Energy,
    /// Beacon request and listen for responses.
    Active,
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Energy => write!(f, "energy"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Driver status for scan requests and completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Success,
    /// The beacon request could not be sent on one channel.
    ///
    /// Reported per channel while the scan keeps going.
    MacTransmitFailure,
    /// Any other driver status code.
    Failed(u8),
}

impl ScanStatus {
    const SUCCESS_CODE: u8 = 0x00;
    const MAC_TRANSMIT_FAILURE_CODE: u8 = 0x3C;

    /// Decode a driver status byte.
    pub fn from_code(code: u8) -> Self {
        match code {
            Self::SUCCESS_CODE => Self::Success,
            Self::MAC_TRANSMIT_FAILURE_CODE => Self::MacTransmitFailure,
            other => Self::Failed(other),
        }
    }

    /// Driver status byte.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => Self::SUCCESS_CODE,
            Self::MacTransmitFailure => Self::MAC_TRANSMIT_FAILURE_CODE,
            Self::Failed(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::MacTransmitFailure => write!(f, "MAC transmit failure"),
            Self::Failed(code) => write!(f, "driver status 0x{:02X}", code),
        }
    }
}

/// Upward events from the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    /// A scan, or one channel of it, completed.
    ScanComplete {
        channel: PageChannel,
        status: ScanStatus,
    },
    /// Energy reading for one channel.
    EnergyScanResult { channel: PageChannel, energy: i8 },
    /// A beacon was heard during an active scan.
    NetworkFound { beacon: Beacon, lqi: u8, rssi: i8 },
    /// The driver ran the PAN ID search itself.
    UnusedPanIdFound { pan_id: u16, channel: PageChannel },
}

/// Downward interface to the radio driver.
pub trait Radio {
    /// Start a scan over `mask`.
    ///
    /// Returns immediately; results arrive as [`RadioEvent`]s.
    fn start_scan(
        &mut self,
        kind: ScanKind,
        mask: ChannelMask,
        duration: u8,
    ) -> Result<(), ScanStatus>;

    /// Stack profile this node runs.
    fn stack_profile(&self) -> u8;
}

impl<T: Radio + ?Sized> Radio for &mut T {
    fn start_scan(
        &mut self,
        kind: ScanKind,
        mask: ChannelMask,
        duration: u8,
    ) -> Result<(), ScanStatus> {
        (**self).start_scan(kind, mask, duration)
    }

    fn stack_profile(&self) -> u8 {
        (**self).stack_profile()
    }
}

/// One scan request seen by [`RecordingRadio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    pub kind: ScanKind,
    pub mask: ChannelMask,
    pub duration: u8,
}

/// Radio that records requests instead of scanning.
///
/// Used by the host simulator, which plays results back as events, and by
/// tests. Requests accumulate until [`take_request`](Self::take_request) or
/// [`clear`](Self::clear) removes them; long-running callers must do one or
/// the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingRadio {
    stack_profile: u8,
    requests: Vec<ScanRequest>,
    refuse_with: Option<ScanStatus>,
}

impl RecordingRadio {
    pub fn new(stack_profile: u8) -> Self {
        Self {
            stack_profile,
            ..Self::default()
        }
    }

    /// Refuse every following request with `status` (or accept again with `None`).
    pub fn refuse_with(&mut self, status: Option<ScanStatus>) {
        self.refuse_with = status;
    }

    /// Requests accepted so far, oldest first.
    pub fn requests(&self) -> &[ScanRequest] {
        &self.requests
    }

    pub fn last_request(&self) -> Option<&ScanRequest> {
        self.requests.last()
    }

    /// Remove and return the oldest recorded request.
    pub fn take_request(&mut self) -> Option<ScanRequest> {
        if self.requests.is_empty() {
            None
        } else {
            Some(self.requests.remove(0))
        }
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }
}

impl Radio for RecordingRadio {
    fn start_scan(
        &mut self,
        kind: ScanKind,
        mask: ChannelMask,
        duration: u8,
    ) -> Result<(), ScanStatus> {
        if let Some(status) = self.refuse_with {
            return Err(status);
        }
        log::debug!("{} scan requested on {} (duration {})", kind, mask, duration);
        self.requests.push(ScanRequest {
            kind,
            mask,
            duration,
        });
        Ok(())
    }

    fn stack_profile(&self) -> u8 {
        self.stack_profile
    }
}
