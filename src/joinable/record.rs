//! Beacons, network records and the join acceptance filter.

use crate::channel::PageChannel;
use std::fmt;

/// Size of an extended PAN ID in bytes.
pub const EXTENDED_PAN_ID_SIZE: usize = 8;

/// Globally unique network identifier; the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExtendedPanId([u8; EXTENDED_PAN_ID_SIZE]);

impl ExtendedPanId {
    /// All-zero value, meaning "any network" in a filter.
    pub const WILDCARD: Self = Self([0; EXTENDED_PAN_ID_SIZE]);

    pub const fn new(bytes: [u8; EXTENDED_PAN_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8; EXTENDED_PAN_ID_SIZE] {
        &self.0
    }

    /// True for the all-zero value.
    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD.0
    }
}

impl fmt::Display for ExtendedPanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Network description carried by a beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beacon {
    /// Extended PAN ID (unique key).
    pub extended_pan_id: ExtendedPanId,
    /// Short PAN ID.
    pub pan_id: u16,
    /// Channel the beacon was heard on.
    pub channel: PageChannel,
    /// Stack profile advertised by the network.
    pub stack_profile: u8,
    /// Whether the network currently permits joining.
    pub allowing_join: bool,
    /// Network update identifier.
    pub nwk_update_id: u8,
}

/// A discovered network with the link metrics it was heard at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkRecord {
    pub beacon: Beacon,
    /// Link quality indicator of the beacon.
    pub lqi: u8,
    /// Received signal strength in dBm.
    pub rssi: i8,
}

impl NetworkRecord {
    pub fn new(beacon: Beacon, lqi: u8, rssi: i8) -> Self {
        Self { beacon, lqi, rssi }
    }

    pub fn extended_pan_id(&self) -> &ExtendedPanId {
        &self.beacon.extended_pan_id
    }
}

/// Why a beacon was not considered joinable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The network is not permitting joins.
    NotAllowingJoin,
    /// The network runs a different stack profile.
    StackProfileMismatch {
        /// Profile this node runs.
        expected: u8,
        /// Profile the beacon advertised.
        found: u8,
    },
    /// The caller asked for a specific extended PAN ID.
    ExtendedPanIdMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAllowingJoin => write!(f, "not allowing join"),
            Self::StackProfileMismatch { expected, found } => {
                write!(f, "stack profile {} (expected {})", found, expected)
            }
            Self::ExtendedPanIdMismatch => write!(f, "extended PAN ID mismatch"),
        }
    }
}

/// Acceptance policy applied to every beacon of a joinable scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinFilter {
    /// Stack profile the network must advertise.
    pub stack_profile: u8,
    /// Required extended PAN ID, `None` for any.
    pub extended_pan_id: Option<ExtendedPanId>,
}

impl JoinFilter {
    /// Build a filter; the all-zero extended PAN ID means any network.
    pub fn new(stack_profile: u8, extended_pan_id: ExtendedPanId) -> Self {
        Self {
            stack_profile,
            extended_pan_id: (!extended_pan_id.is_wildcard()).then_some(extended_pan_id),
        }
    }

    /// Check a beacon against the policy.
    pub fn check(&self, beacon: &Beacon) -> Result<(), RejectReason> {
        if !beacon.allowing_join {
            return Err(RejectReason::NotAllowingJoin);
        }
        if beacon.stack_profile != self.stack_profile {
            return Err(RejectReason::StackProfileMismatch {
                expected: self.stack_profile,
                found: beacon.stack_profile,
            });
        }
        match self.extended_pan_id {
            Some(wanted) if wanted != beacon.extended_pan_id => {
                Err(RejectReason::ExtendedPanIdMismatch)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{make_beacon, xpan};

    #[test]
    fn test_wildcard_filter_accepts_any_network() {
        let filter = JoinFilter::new(2, ExtendedPanId::WILDCARD);
        assert_eq!(filter.extended_pan_id, None);
        assert!(filter.check(&make_beacon(1, 0x1234, 15)).is_ok());
        assert!(filter.check(&make_beacon(2, 0x4321, 20)).is_ok());
    }

    #[test]
    fn test_specific_filter() {
        let filter = JoinFilter::new(2, xpan(7));
        assert!(filter.check(&make_beacon(7, 0x1234, 15)).is_ok());
        assert_eq!(
            filter.check(&make_beacon(8, 0x1234, 15)),
            Err(RejectReason::ExtendedPanIdMismatch)
        );
    }

    #[test]
    fn test_closed_network_rejected() {
        let mut beacon = make_beacon(1, 0x1234, 15);
        beacon.allowing_join = false;
        let filter = JoinFilter::new(2, ExtendedPanId::WILDCARD);
        assert_eq!(filter.check(&beacon), Err(RejectReason::NotAllowingJoin));
    }

    #[test]
    fn test_stack_profile_mismatch() {
        let mut beacon = make_beacon(1, 0x1234, 15);
        beacon.stack_profile = 1;
        let filter = JoinFilter::new(2, ExtendedPanId::WILDCARD);
        assert_eq!(
            filter.check(&beacon),
            Err(RejectReason::StackProfileMismatch {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_extended_pan_id_display() {
        let id = ExtendedPanId::new([0xDE, 0xAD, 0, 1, 2, 3, 4, 0xFF]);
        assert_eq!(id.to_string(), "DE:AD:00:01:02:03:04:FF");
        assert!(ExtendedPanId::default().is_wildcard());
    }
}
