//! Candidate reservoir for energy-scan channel selection.
//!
//! During an energy scan the radio reports one reading per channel. The
//! reservoir keeps the K quietest channels seen so far in a fixed table, then
//! picks one at random among those whose energy is close to the quietest.
//!
//! # Algorithm
//!
//! 1. Every slot starts at the maximum-energy sentinel
//! 2. A reading replaces the loudest slot if it is strictly quieter
//! 3. At the end, `cutoff = min(lowest + ENERGY_FUZZ, MAX_ENERGY)`
//! 4. Every slot below the cutoff survives; one survivor is chosen uniformly
//!
//! Energy scans are short and noisy. Always taking the single quietest
//! channel would send neighbouring devices that form at the same time onto
//! the same channel, so near-equal readings are treated as equivalent.
//!
//! # Example
//!
//! ```
//! use wpan_form_join::channel::{CandidateReservoir, PageChannel};
//! use wpan_form_join::rng::ScanRng;
//!
//! let mut reservoir = CandidateReservoir::new(4).unwrap();
//! reservoir.observe(PageChannel::new(0, 11).unwrap(), -40);
//! reservoir.observe(PageChannel::new(0, 15).unwrap(), -90);
//!
//! let chosen = reservoir.select(&mut ScanRng::new(1)).unwrap();
//! assert_eq!(chosen.channel().unwrap().channel(), 15);
//! ```

use super::PageChannel;
use crate::rng::random_u16;
use heapless::Vec;
use rand_core::RngCore;
use std::fmt;

/// Tolerance under which two readings count as equally quiet.
pub const ENERGY_FUZZ: i16 = 25;

/// Sentinel energy for unused slots.
pub const MAX_ENERGY: i8 = i8::MAX;

/// Bytes one candidate occupies in the platform scratch buffer.
pub const CANDIDATE_ENTRY_BYTES: usize = 2;

/// Default scratch buffer reserved for candidates.
pub const DEFAULT_CANDIDATE_BUFFER_BYTES: usize = 16;

/// Upper bound on reservoir slots.
pub const MAX_CHANNEL_CANDIDATES: usize = 16;

/// Number of reservoir slots a scratch buffer of `bytes` holds.
pub const fn candidates_for_budget(bytes: usize) -> usize {
    let slots = bytes / CANDIDATE_ENTRY_BYTES;
    if slots > MAX_CHANNEL_CANDIDATES {
        MAX_CHANNEL_CANDIDATES
    } else {
        slots
    }
}

/// Errors from the candidate reservoir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservoirError {
    /// Invalid configuration parameter.
    InvalidConfig(&'static str),
    /// No slot fell under the cutoff (nothing was observed).
    NoViableCandidate,
}

impl fmt::Display for ReservoirError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid reservoir config: {}", msg),
            Self::NoViableCandidate => write!(f, "no viable channel candidate"),
        }
    }
}

impl std::error::Error for ReservoirError {}

/// One reservoir slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCandidate {
    channel: Option<PageChannel>,
    energy: i8,
}

impl ChannelCandidate {
    const SENTINEL: Self = Self {
        channel: None,
        energy: MAX_ENERGY,
    };

    /// Channel the reading was taken on, `None` for an unused slot.
    pub fn channel(&self) -> Option<PageChannel> {
        self.channel
    }

    /// Energy reading in dBm.
    pub fn energy(&self) -> i8 {
        self.energy
    }
}

/// Fixed-size table of the quietest channels seen in an energy scan.
#[derive(Debug, Clone)]
pub struct CandidateReservoir {
    slots: Vec<ChannelCandidate, MAX_CHANNEL_CANDIDATES>,
}

impl CandidateReservoir {
    /// Create a reservoir with `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is 0 or above [`MAX_CHANNEL_CANDIDATES`].
    pub fn new(capacity: usize) -> Result<Self, ReservoirError> {
        if capacity == 0 {
            return Err(ReservoirError::InvalidConfig(
                "capacity must be greater than 0",
            ));
        }
        if capacity > MAX_CHANNEL_CANDIDATES {
            return Err(ReservoirError::InvalidConfig(
                "capacity must be <= MAX_CHANNEL_CANDIDATES",
            ));
        }
        let mut slots = Vec::new();
        for _ in 0..capacity {
            // Bounded by the check above
            let _ = slots.push(ChannelCandidate::SENTINEL);
        }
        Ok(Self { slots })
    }

    /// Create a reservoir sized from a scratch buffer budget in bytes.
    pub fn with_budget(bytes: usize) -> Result<Self, ReservoirError> {
        Self::new(candidates_for_budget(bytes))
    }

    /// Number of slots (K).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Return every slot to the sentinel.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = ChannelCandidate::SENTINEL;
        }
    }

    /// Record one energy reading.
    ///
    /// Returns `true` if the reading displaced the loudest slot.
    pub fn observe(&mut self, channel: PageChannel, energy: i8) -> bool {
        // First loudest slot, so readings fill the table in arrival order
        let mut loudest = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.energy > self.slots[loudest].energy {
                loudest = index;
            }
        }

        if energy < self.slots[loudest].energy {
            self.slots[loudest] = ChannelCandidate {
                channel: Some(channel),
                energy,
            };
            true
        } else {
            false
        }
    }

    /// Lowest energy currently held.
    pub fn min_energy(&self) -> i8 {
        self.slots
            .iter()
            .map(|slot| slot.energy)
            .min()
            .unwrap_or(MAX_ENERGY)
    }

    /// Energy a slot must stay under to be selectable.
    pub fn cutoff(&self) -> i8 {
        let cutoff = (self.min_energy() as i16 + ENERGY_FUZZ).min(MAX_ENERGY as i16);
        cutoff as i8
    }

    /// Slots under the cutoff, in table order.
    pub fn survivors(&self) -> Vec<ChannelCandidate, MAX_CHANNEL_CANDIDATES> {
        let cutoff = self.cutoff();
        self.slots
            .iter()
            .filter(|slot| slot.channel.is_some() && slot.energy < cutoff)
            .copied()
            .collect()
    }

    /// Pick a channel uniformly among the survivors.
    ///
    /// # Errors
    ///
    /// Returns [`ReservoirError::NoViableCandidate`] if no slot survives.
    pub fn select<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<ChannelCandidate, ReservoirError> {
        let survivors = self.survivors();
        if survivors.is_empty() {
            return Err(ReservoirError::NoViableCandidate);
        }
        let index = random_u16(rng) as usize % survivors.len();
        Ok(survivors[index])
    }

    /// Iterate every slot, sentinels included.
    pub fn iter(&self) -> impl Iterator<Item = &ChannelCandidate> {
        self.slots.iter()
    }
}

impl Default for CandidateReservoir {
    fn default() -> Self {
        Self {
            slots: (0..candidates_for_budget(DEFAULT_CANDIDATE_BUFFER_BYTES))
                .map(|_| ChannelCandidate::SENTINEL)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScanRng;
    use crate::testing::SequenceRng;

    fn ch(channel: u8) -> PageChannel {
        PageChannel::new(0, channel).unwrap()
    }

    fn seeded(readings: &[(u8, i8)], capacity: usize) -> CandidateReservoir {
        let mut reservoir = CandidateReservoir::new(capacity).unwrap();
        for (channel, energy) in readings {
            reservoir.observe(ch(*channel), *energy);
        }
        reservoir
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(matches!(
            CandidateReservoir::new(0),
            Err(ReservoirError::InvalidConfig(_))
        ));
        assert!(matches!(
            CandidateReservoir::new(MAX_CHANNEL_CANDIDATES + 1),
            Err(ReservoirError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_budget_sizing() {
        assert_eq!(candidates_for_budget(16), 8);
        assert_eq!(candidates_for_budget(5), 2);
        assert_eq!(candidates_for_budget(1000), MAX_CHANNEL_CANDIDATES);
        assert_eq!(CandidateReservoir::default().capacity(), 8);
        assert_eq!(CandidateReservoir::with_budget(30).unwrap().capacity(), 15);
    }

    #[test]
    fn test_empty_reservoir_has_no_viable_candidate() {
        let reservoir = CandidateReservoir::new(4).unwrap();
        assert_eq!(reservoir.cutoff(), MAX_ENERGY);
        assert!(reservoir.survivors().is_empty());
        assert_eq!(
            reservoir.select(&mut ScanRng::new(1)),
            Err(ReservoirError::NoViableCandidate)
        );
    }

    #[test]
    fn test_keeps_k_lowest() {
        let reservoir = seeded(&[(11, -20), (12, -80), (13, -50), (14, -90)], 2);
        let mut kept: std::vec::Vec<u8> = reservoir
            .iter()
            .filter_map(|slot| slot.channel())
            .map(|c| c.channel())
            .collect();
        kept.sort_unstable();
        assert_eq!(kept, vec![12, 14]);
    }

    #[test]
    fn test_equal_reading_does_not_replace() {
        let mut reservoir = seeded(&[(11, -60), (12, -70)], 2);
        assert!(!reservoir.observe(ch(13), -60));
        assert!(reservoir.observe(ch(13), -61));
    }

    #[test]
    fn test_sentinel_reading_never_stored() {
        let mut reservoir = CandidateReservoir::new(2).unwrap();
        assert!(!reservoir.observe(ch(11), MAX_ENERGY));
        assert!(reservoir.survivors().is_empty());
    }

    #[test]
    fn test_all_four_survive_within_fuzz() {
        let reservoir = seeded(&[(11, -60), (12, -55), (13, -70), (14, -58)], 4);
        assert_eq!(reservoir.min_energy(), -70);
        assert_eq!(reservoir.cutoff(), -45);
        assert_eq!(reservoir.survivors().len(), 4);

        // Each draw index maps onto one survivor in table order
        let mut rng = SequenceRng::new(&[0, 1, 2, 3]);
        let picks: std::vec::Vec<u8> = (0..4)
            .map(|_| reservoir.select(&mut rng).unwrap().channel().unwrap().channel())
            .collect();
        assert_eq!(picks, vec![11, 12, 13, 14]);
    }

    #[test]
    fn test_selection_is_uniform_among_survivors() {
        let reservoir = seeded(&[(11, -60), (12, -55), (13, -70), (14, -58)], 4);
        let mut rng = ScanRng::new(2024);
        let mut counts = [0u32; 27];
        for _ in 0..4000 {
            let pick = reservoir.select(&mut rng).unwrap();
            counts[pick.channel().unwrap().channel() as usize] += 1;
        }
        for channel in 11..=14 {
            assert!(
                counts[channel] > 800,
                "channel {} picked {} times",
                channel,
                counts[channel]
            );
        }
    }

    #[test]
    fn test_loud_channels_excluded() {
        let reservoir = seeded(&[(11, -90), (12, -40), (13, -20), (14, 10)], 4);
        assert_eq!(reservoir.cutoff(), -65);
        let survivors = reservoir.survivors();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].channel(), Some(ch(11)));
    }

    #[test]
    fn test_cutoff_saturates_at_max_energy() {
        let reservoir = seeded(&[(11, 120)], 2);
        assert_eq!(reservoir.cutoff(), MAX_ENERGY);
        assert_eq!(reservoir.select(&mut ScanRng::new(5)).unwrap().energy(), 120);
    }

    #[test]
    fn test_selected_energy_within_fuzz_of_minimum() {
        let mut source = ScanRng::new(777);
        let mut picker = ScanRng::new(778);
        for _ in 0..200 {
            let mut reservoir = CandidateReservoir::new(6).unwrap();
            for channel in 11..=26 {
                let energy = -((source.next_u32() % 100) as i8);
                reservoir.observe(ch(channel), energy);
            }
            let min = reservoir.min_energy() as i16;
            let chosen = reservoir.select(&mut picker).unwrap().energy() as i16;
            assert!(chosen >= min);
            assert!(chosen < min + ENERGY_FUZZ);
        }
    }

    #[test]
    fn test_reset_restores_sentinels() {
        let mut reservoir = seeded(&[(11, -60)], 3);
        reservoir.reset();
        assert!(reservoir.iter().all(|slot| slot.channel().is_none()));
        assert_eq!(reservoir.capacity(), 3);
    }
}
