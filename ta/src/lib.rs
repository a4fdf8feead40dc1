//! Trusty KeyMaster context.
//!
//! Holds the device-wide state of the KeyMaster trusted application (root of trust, system
//! version, RNG seeding and the auth token key) and implements the policy that binds key blobs
//! to that state.

#![no_std]
extern crate alloc;

use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::AtomicUsize;
use log::{error, info, warn};
use tkm_common::{
    crypto::{self, hmac, Rng, SHA256_DIGEST_LEN},
    km_err, try_to_vec, vec_try, Error,
};
use tkm_wire::keymint::{Algorithm, Digest, ErrorCode, VerifiedBootState};

pub mod attest;
pub mod device;
pub mod keys;
pub mod master;
pub mod rng;
pub mod wrap;

pub use device::VerifiedBootParams;


/// Verified boot key recorded in keys created before the bootloader has reported one.
pub const UNBOUND_BOOT_KEY: &[u8] = b"Unbound";

/// Size of a confirmation token.
pub const CONFIRMATION_TOKEN_SIZE: usize = SHA256_DIGEST_LEN;

/// Size of the auth token HMAC key.
const AUTH_TOKEN_KEY_SIZE: usize = 32;

/// Algorithms for which key blobs can be parsed.
const SUPPORTED_ALGORITHMS: &[Algorithm] =
    &[Algorithm::Rsa, Algorithm::Ec, Algorithm::Aes, Algorithm::TripleDes, Algorithm::Hmac];

/// Handling of key blobs in the legacy AES-OCB format, when the caller has not asked for
/// legacy tolerance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LegacyFormatPolicy {
    /// Accept the blob, counting how many have been seen.
    #[default]
    AcceptWithCounter,
    /// Reject the blob with [`ErrorCode::KeyRequiresUpgrade`].
    Reject,
}

/// Runtime configuration of the context.
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    pub legacy_format_policy: LegacyFormatPolicy,
}

/// Root of trust reported by the bootloader.
#[derive(Clone, Debug, PartialEq, Eq)]
struct BootParams {
    verified_boot_key: Vec<u8>,
    verified_boot_hash: Vec<u8>,
    verified_boot_state: VerifiedBootState,
    device_locked: bool,
}

/// KeyMaster context for a Trusty device.
pub struct TrustyKeymasterContext<'a> {
    /**
     * Cryptographic primitives and device collaborators.
     */
    imp: crypto::Implementation<'a>,
    rng: RefCell<&'a mut dyn Rng>,
    dev: device::Implementation<'a>,
    config: Config,

    /**
     * State that is latched once per boot.
     */
    /// Root of trust, set by the bootloader.
    boot: spin::Once<BootParams>,

    /// OS version and patchlevel, set by the (untrusted) system.
    version: spin::Once<(u32, u32)>,

    /// HMAC key shared with the enforcement policy.
    auth_token_key: spin::Once<hmac::Key>,

    /**
     * Counters.
     */
    rng_gate: rng::RngGate,

    /// Number of AES-OCB key blobs accepted without an upgrade request.
    ocb_accepted: AtomicUsize,
}

impl<'a> TrustyKeymasterContext<'a> {
    /// Create a new context, using the given collaborators.
    pub fn new(
        imp: crypto::Implementation<'a>,
        rng: &'a mut dyn Rng,
        dev: device::Implementation<'a>,
        config: Config,
    ) -> Self {
        Self {
            imp,
            rng: RefCell::new(rng),
            dev,
            config,
            boot: spin::Once::new(),
            version: spin::Once::new(),
            auth_token_key: spin::Once::new(),
            rng_gate: rng::RngGate::new(),
            ocb_accepted: AtomicUsize::new(0),
        }
    }

    /// Record the root of trust reported by the bootloader.  This can only happen once.
    ///
    /// The OS version and patchlevel are accepted for compatibility but not used; the system
    /// version comes from [`Self::set_system_version`].
    pub fn set_boot_params(
        &self,
        _os_version: u32,
        _os_patchlevel: u32,
        verified_boot_key: &[u8],
        verified_boot_state: VerifiedBootState,
        device_locked: bool,
        verified_boot_hash: &[u8],
    ) -> Result<(), Error> {
        if self.boot.is_completed() {
            return Err(km_err!(RootOfTrustAlreadySet, "boot parameters already set"));
        }
        let mut params = BootParams {
            verified_boot_key: Vec::new(),
            verified_boot_hash: try_to_vec(verified_boot_hash)?,
            verified_boot_state,
            device_locked,
        };
        match verified_boot_state {
            VerifiedBootState::Verified | VerifiedBootState::SelfSigned => {
                if verified_boot_key.is_empty() {
                    warn!(
                        "no verified boot key for {:?} boot, treating as unverified",
                        verified_boot_state
                    );
                    params.verified_boot_state = VerifiedBootState::Unverified;
                    params.device_locked = false;
                } else {
                    params.verified_boot_key = try_to_vec(verified_boot_key)?;
                }
            }
            VerifiedBootState::Unverified | VerifiedBootState::Failed => {
                params.device_locked = false;
            }
        }

        let mut newly_set = false;
        self.boot.call_once(|| {
            newly_set = true;
            params
        });
        if newly_set {
            info!("root of trust set, state {:?}", verified_boot_state);
            Ok(())
        } else {
            Err(km_err!(RootOfTrustAlreadySet, "boot parameters already set"))
        }
    }

    /// Return the verified boot parameters.  Before the bootloader reports them, keys are bound
    /// to [`UNBOUND_BOOT_KEY`] in the verified, unlocked state.
    pub fn get_verified_boot_params(&self) -> VerifiedBootParams {
        match self.boot.get() {
            Some(p) => VerifiedBootParams {
                verified_boot_key: &p.verified_boot_key,
                verified_boot_hash: &p.verified_boot_hash,
                verified_boot_state: p.verified_boot_state,
                device_locked: p.device_locked,
            },
            None => VerifiedBootParams {
                verified_boot_key: UNBOUND_BOOT_KEY,
                verified_boot_hash: &[],
                verified_boot_state: VerifiedBootState::Verified,
                device_locked: false,
            },
        }
    }

    /// Record the OS version and patchlevel.  The first call wins; later calls are ignored.
    pub fn set_system_version(&self, os_version: u32, os_patchlevel: u32) -> Result<(), Error> {
        let current = self.version.call_once(|| (os_version, os_patchlevel));
        if *current != (os_version, os_patchlevel) {
            warn!(
                "system version already set to {:?}, ignoring {:?}",
                current,
                (os_version, os_patchlevel)
            );
        }
        Ok(())
    }

    /// Return the OS version and patchlevel, or zeroes if not yet set.
    pub fn get_system_version(&self) -> (u32, u32) {
        self.version.get().copied().unwrap_or((0, 0))
    }

    /// Mix caller-provided entropy into the RNG.
    pub fn add_rng_entropy(&self, data: &[u8]) -> Result<(), Error> {
        self.rng.borrow_mut().add_entropy(data).map_err(|e| match e {
            Error::Hal(ErrorCode::InvalidInputLength, _) => e,
            e => {
                error!("failed to add entropy: {:?}", e);
                km_err!(UnknownError, "failed to add entropy")
            }
        })
    }

    /// Fill `dest` from the RNG, seeding it first if needed.
    pub(crate) fn fill_random(&self, dest: &mut [u8]) -> Result<(), Error> {
        let mut rng = self.rng.borrow_mut();
        if !self.rng_gate.seed_if_needed(self.dev.hw_rng, &mut **rng) {
            return Err(km_err!(SecureHwCommunicationFailed, "RNG not seeded"));
        }
        rng.fill_bytes(dest);
        Ok(())
    }

    /// Return `len` random bytes.
    pub fn generate_random(&self, len: usize) -> Result<Vec<u8>, Error> {
        let mut result = vec_try![0u8; len]?;
        self.fill_random(&mut result)?;
        Ok(result)
    }

    /// Return the key shared with the enforcement policy, fetching it on first use.
    pub fn auth_token_key(&self) -> Result<&hmac::Key, Error> {
        self.auth_token_key.try_call_once(|| {
            let key = self.dev.auth_token_key.hmac_key().map_err(|e| {
                error!("failed to retrieve auth token key: {:?}", e);
                km_err!(UnknownError, "auth token key unavailable")
            })?;
            if key.0.len() != AUTH_TOKEN_KEY_SIZE {
                return Err(km_err!(
                    UnknownError,
                    "auth token key is {} bytes, want {}",
                    key.0.len(),
                    AUTH_TOKEN_KEY_SIZE
                ));
            }
            Ok(key)
        })
    }

    /// Check that `token` is the HMAC of `input` under the auth token key.
    pub fn check_confirmation_token(
        &self,
        input: &[u8],
        token: &[u8; CONFIRMATION_TOKEN_SIZE],
    ) -> Result<(), Error> {
        let key = self.auth_token_key()?.clone();
        let computed = self
            .imp
            .hmac
            .begin(key, Digest::Sha256)
            .and_then(|mut op| {
                op.update(input)?;
                op.finish()
            })
            .map_err(|e| {
                error!("failed to compute confirmation token: {:?}", e);
                km_err!(UnknownError, "confirmation token HMAC failed")
            })?;
        if computed.len() != CONFIRMATION_TOKEN_SIZE || self.imp.compare.ne(&computed, token) {
            return Err(km_err!(NoUserConfirmation, "confirmation token mismatch"));
        }
        Ok(())
    }

    /// Return the factory for keys of the given algorithm.
    pub fn key_factory(&self, algorithm: Algorithm) -> Result<&'a dyn device::KeyFactory, Error> {
        if !SUPPORTED_ALGORITHMS.contains(&algorithm) {
            return Err(km_err!(UnsupportedAlgorithm, "no key factory for {:?}", algorithm));
        }
        Ok(self.dev.key_factories.get(algorithm))
    }

    /// Return the algorithms for which key factories are available.
    pub fn supported_algorithms(&self) -> &'static [Algorithm] {
        SUPPORTED_ALGORITHMS
    }
}
