//! Scan session errors.

use crate::radio::ScanStatus;
use std::fmt;

/// Errors a scan session reports.
///
/// Each maps onto the status byte the stack uses for the same condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// A session is already running.
    AlreadyScanning,
    /// Call made outside the valid state or resumable window.
    InvalidCall,
    /// The buffer provider had nothing to give.
    NoBuffers,
    /// Every channel was scanned without a usable network.
    NoBeacons,
    /// The energy scan left no channel under the cutoff.
    NoViableCandidate,
    /// Every PAN ID attempt collided.
    PanIdExhausted,
    /// The radio refused a scan or ended one with an error.
    Radio(ScanStatus),
}

impl ScanError {
    /// Stack status byte for this error.
    pub fn status_code(&self) -> u8 {
        match self {
            Self::AlreadyScanning => 0x3D,
            Self::InvalidCall => 0x70,
            Self::NoBuffers => 0x18,
            Self::NoBeacons | Self::NoViableCandidate => 0xAB,
            Self::PanIdExhausted => 0x01,
            Self::Radio(status) => status.code(),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyScanning => write!(f, "already scanning"),
            Self::InvalidCall => write!(f, "invalid call"),
            Self::NoBuffers => write!(f, "no buffers"),
            Self::NoBeacons => write!(f, "no beacons"),
            Self::NoViableCandidate => write!(f, "no viable channel candidate"),
            Self::PanIdExhausted => write!(f, "PAN ID attempts exhausted"),
            Self::Radio(status) => write!(f, "radio error: {}", status),
        }
    }
}

impl std::error::Error for ScanError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ScanError::AlreadyScanning.status_code(), 0x3D);
        assert_eq!(ScanError::InvalidCall.status_code(), 0x70);
        assert_eq!(ScanError::NoBuffers.status_code(), 0x18);
        assert_eq!(ScanError::NoBeacons.status_code(), 0xAB);
        assert_eq!(ScanError::NoViableCandidate.status_code(), 0xAB);
        assert_eq!(ScanError::PanIdExhausted.status_code(), 0x01);
        assert_eq!(
            ScanError::Radio(ScanStatus::Failed(0x42)).status_code(),
            0x42
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ScanError::NoBeacons.to_string(), "no beacons");
        assert_eq!(
            ScanError::Radio(ScanStatus::MacTransmitFailure).to_string(),
            "radio error: MAC transmit failure"
        );
    }
}
