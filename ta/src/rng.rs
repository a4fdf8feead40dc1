//! Seeding policy for the random number generator.

use crate::device::HwRng;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use log::{debug, error};
use tkm_common::crypto::Rng;
use zeroize::Zeroizing;


/// Number of RNG uses between reseeds from the hardware entropy source.
pub const RESEED_INTERVAL: u32 = 32;

/// Number of bytes of hardware entropy mixed in per reseed.
pub const SEED_SIZE: usize = 64;

/// Tracks whether the RNG has been seeded, and when it next needs fresh entropy.
#[derive(Debug, Default)]
pub struct RngGate {
    initialized: AtomicBool,
    calls: AtomicU32,
}

impl RngGate {
    pub const fn new() -> Self {
        Self { initialized: AtomicBool::new(false), calls: AtomicU32::new(0) }
    }

    /// Indicate whether the RNG has been seeded at least once.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Indicate whether the RNG should be reseeded before use.  Once seeded, every
    /// [`RESEED_INTERVAL`]th call returns `true`.
    pub fn should_reseed(&self) -> bool {
        if !self.is_initialized() {
            return true;
        }
        let calls = self.calls.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        calls % RESEED_INTERVAL == 0
    }

    /// Mix [`SEED_SIZE`] bytes of hardware entropy into `rng`.  Returns whether this succeeded;
    /// on failure the seeded state is unchanged.
    pub fn reseed(&self, hw_rng: &dyn HwRng, rng: &mut dyn Rng) -> bool {
        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        if let Err(e) = hw_rng.read(&mut seed[..]) {
            error!("failed to read hardware entropy: {:?}", e);
            return false;
        }
        if let Err(e) = rng.add_entropy(&seed[..]) {
            error!("failed to add hardware entropy: {:?}", e);
            return false;
        }
        debug!("RNG reseeded");
        self.initialized.store(true, Ordering::Release);
        true
    }

    /// Reseed if needed, returning whether the RNG is usable.
    pub fn seed_if_needed(&self, hw_rng: &dyn HwRng, rng: &mut dyn Rng) -> bool {
        if self.should_reseed() {
            self.reseed(hw_rng, rng);
        }
        self.is_initialized()
    }
}
