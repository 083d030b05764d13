//! PAN ID trial set for collision avoidance.
//!
//! Before forming a network the node draws a handful of random PAN IDs, runs
//! an active scan on the chosen channel, and strikes out every candidate that
//! an existing network's beacon already uses. The first survivor wins.
//!
//! # Example
//!
//! ```
//! use wpan_form_join::pan_id::PanIdTrialSet;
//! use wpan_form_join::rng::ScanRng;
//!
//! let mut trials = PanIdTrialSet::generate(&mut ScanRng::new(9));
//! let first = trials.first_live().unwrap();
//! trials.observe(first);
//! assert_ne!(trials.first_live(), Some(first));
//! ```

use crate::rng::random_u16;
use rand_core::RngCore;

/// Candidates drawn per scan attempt.
pub const PAN_ID_CANDIDATES: usize = 16;

/// Broadcast PAN ID; marks an invalidated slot and is never a result.
pub const INVALID_PAN_ID: u16 = 0xFFFF;

/// Fixed set of random PAN ID candidates.
///
/// Duplicates among the candidates are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanIdTrialSet {
    candidates: [u16; PAN_ID_CANDIDATES],
}

impl PanIdTrialSet {
    /// Draw a fresh set, rejecting the broadcast value.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut candidates = [INVALID_PAN_ID; PAN_ID_CANDIDATES];
        for slot in candidates.iter_mut() {
            let mut pan_id = random_u16(rng);
            while pan_id == INVALID_PAN_ID {
                pan_id = random_u16(rng);
            }
            *slot = pan_id;
        }
        Self { candidates }
    }

    /// Strike out every live slot using `pan_id`.
    ///
    /// Returns the number of slots invalidated.
    pub fn observe(&mut self, pan_id: u16) -> usize {
        if pan_id == INVALID_PAN_ID {
            return 0;
        }
        let mut struck = 0;
        for slot in self.candidates.iter_mut().filter(|slot| **slot == pan_id) {
            *slot = INVALID_PAN_ID;
            struck += 1;
        }
        struck
    }

    /// First surviving candidate in generation order.
    pub fn first_live(&self) -> Option<u16> {
        self.candidates
            .iter()
            .copied()
            .find(|pan_id| *pan_id != INVALID_PAN_ID)
    }

    /// Number of surviving candidates.
    pub fn live_count(&self) -> usize {
        self.candidates
            .iter()
            .filter(|pan_id| **pan_id != INVALID_PAN_ID)
            .count()
    }

    /// True if every candidate collided.
    pub fn is_exhausted(&self) -> bool {
        self.live_count() == 0
    }

    /// Candidates in generation order, invalidated slots included.
    pub fn candidates(&self) -> &[u16; PAN_ID_CANDIDATES] {
        &self.candidates
    }
}
