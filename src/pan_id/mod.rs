//! PAN ID collision avoidance.
//!
//! This module provides:
//! - [`PanIdTrialSet`]: Random PAN ID candidates struck out by observed beacons

mod trial;

pub use trial::{PanIdTrialSet, INVALID_PAN_ID, PAN_ID_CANDIDATES};
