//! Shared fixtures for unit tests.

use crate::channel::{ChannelMask, PageChannel};
use crate::joinable::{Beacon, ExtendedPanId};
use rand_core::{impls, Error, RngCore};

/// RNG replaying a fixed sequence of 16-bit draws, cycling when exhausted.
pub struct SequenceRng {
    values: Vec<u16>,
    next: usize,
}

impl SequenceRng {
    pub fn new(values: &[u16]) -> Self {
        assert!(!values.is_empty(), "sequence must not be empty");
        Self {
            values: values.to_vec(),
            next: 0,
        }
    }
}

impl RngCore for SequenceRng {
    fn next_u32(&mut self) -> u32 {
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        (value as u32) << 16
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

pub fn ch(channel: u8) -> PageChannel {
    PageChannel::new(0, channel).unwrap()
}

pub fn mask(channels: &[u8]) -> ChannelMask {
    let bits = channels.iter().fold(0u32, |acc, ch| acc | (1 << ch));
    ChannelMask::new(0, bits).unwrap()
}

pub fn xpan(id: u8) -> ExtendedPanId {
    ExtendedPanId::new([id, 0, 0, 0, 0, 0, 0, 0x10])
}

/// Joinable beacon on 2.4 GHz `channel` with stack profile 2.
pub fn make_beacon(id: u8, pan_id: u16, channel: u8) -> Beacon {
    Beacon {
        extended_pan_id: xpan(id),
        pan_id,
        channel: ch(channel),
        stack_profile: 2,
        allowing_join: true,
        nwk_update_id: 0,
    }
}
