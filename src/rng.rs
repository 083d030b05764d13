//! Non-cryptographic randomness for channel and PAN ID selection.
//!
//! Random draws only spread nearby devices across channels and PAN IDs, so a
//! small LCG is enough. Anything implementing [`rand_core::RngCore`] can be
//! used instead, e.g. a hardware RNG on the target.
//!
//! # Example
//!
//! ```
//! use wpan_form_join::rng::{random_u16, ScanRng};
//!
//! let mut rng = ScanRng::new(12345);
//! let a = random_u16(&mut rng);
//! let b = random_u16(&mut rng);
//! assert_ne!(a, b);
//! ```

use rand_core::{impls, Error, RngCore};

/// Draw a 16-bit value from any [`RngCore`].
pub fn random_u16<R: RngCore + ?Sized>(rng: &mut R) -> u16 {
    (rng.next_u32() >> 16) as u16
}

/// Simple LCG random number generator.
///
/// Parameters from Numerical Recipes. The upper bits have the longest period,
/// which is why [`random_u16`] takes the high half of each draw.
#[derive(Debug, Clone)]
pub struct ScanRng {
    state: u32,
}

impl Default for ScanRng {
    fn default() -> Self {
        Self::new(0x12345678)
    }
}

impl ScanRng {
    /// Create a generator from a seed. A zero seed is replaced by 1.
    pub fn new(seed: u32) -> Self {
        let mut rng = Self { state: 1 };
        rng.seed(seed);
        rng
    }

    /// Reseed the generator.
    ///
    /// On hardware, seed from the radio's RNG or noise readings.
    pub fn seed(&mut self, seed: u32) {
        self.state = if seed == 0 { 1 } else { seed };
    }
}

impl RngCore for ScanRng {
    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state
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
