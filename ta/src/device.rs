//! Traits representing access to device-specific information and functionality.

use crate::keys::Key;
use alloc::vec::Vec;
use tkm_common::{
    crypto::{aes, des, ec, hmac, rsa, AsymmetricKey, KeyMaterial},
    get_opt_tag_value, get_tag_value, keyblob::KeyBlobAead, km_err, Error,
};
use tkm_wire::{
    keymint::{Algorithm, Certificate, ErrorCode, KeyParam, VerifiedBootState},
    KeySizeInBits,
};

/// Combined collection of trait implementations that must be provided.
pub struct Implementation<'a> {
    /// Hardware key derivation service, used for the master key.
    pub hw_key: &'a dyn HwKey,

    /// Hardware entropy source, used to (re)seed the RNG.
    pub hw_rng: &'a dyn HwRng,

    /// Secure storage holding the device attestation keys and certificate chains.  If not
    /// available, attestation with device keys fails.
    pub attestation_storage: Option<&'a dyn AttestationStorage>,

    /// Software attestation keys, only consulted when built with `soft-attestation-fallback`.
    pub soft_attestation: Option<&'a dyn AttestationStorage>,

    /// Certificate construction and signing.
    pub cert_gen: &'a dyn CertificateGenerator,

    /// Source of the key shared with the enforcement policy, used for auth and confirmation
    /// tokens.
    pub auth_token_key: &'a dyn AuthTokenKeySource,

    /// Key blob encryption.  If `None`, AES-GCM keyed by HKDF is used.
    pub keyblob_aead: Option<&'a dyn KeyBlobAead>,

    /// Materialization of key material, per algorithm.
    pub key_factories: KeyFactories<'a>,
}

/// Opaque handle for a session with the hardware key service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HwKeySession(pub u32);

/// Hardware key derivation service.
pub trait HwKey {
    /// Open a session.
    fn open(&self) -> Result<HwKeySession, Error>;

    /// Derive `out.len()` bytes of key material bound to the device, using the given KDF version
    /// and label.
    fn derive(
        &self,
        session: HwKeySession,
        kdf_version: u32,
        label: &[u8],
        out: &mut [u8],
    ) -> Result<(), Error>;

    /// Close a session previously returned by [`HwKey::open`].
    fn close(&self, session: HwKeySession);
}

/// Hardware entropy source.
pub trait HwRng {
    /// Fill `buf` with entropy.
    fn read(&self, buf: &mut [u8]) -> Result<(), Error>;
}

/// Slot in attestation storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttestationKeySlot {
    Rsa,
    Ecdsa,
}

impl AttestationKeySlot {
    /// Return the slot holding the attestation key for keys of the given algorithm.
    pub fn for_algorithm(algorithm: Algorithm) -> Result<Self, Error> {
        match algorithm {
            Algorithm::Rsa => Ok(Self::Rsa),
            Algorithm::Ec => Ok(Self::Ecdsa),
            a => Err(km_err!(UnsupportedAlgorithm, "no attestation key for {:?}", a)),
        }
    }
}

/// Retrieval of device attestation keys and their certificate chains.
pub trait AttestationStorage {
    /// Return the attestation signing key held in `slot`.
    fn read_key(&self, slot: AttestationKeySlot) -> Result<KeyMaterial, Error>;

    /// Return the certificate chain for the key in `slot`, leaf first.
    fn read_cert_chain(&self, slot: AttestationKeySlot) -> Result<Vec<Certificate>, Error>;
}

/// Verified boot information as recorded by the bootloader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifiedBootParams<'a> {
    pub verified_boot_key: &'a [u8],
    pub verified_boot_hash: &'a [u8],
    pub verified_boot_state: VerifiedBootState,
    pub device_locked: bool,
}

/// Device state included in attestation records.
#[derive(Clone, Copy, Debug)]
pub struct AttestationContext<'a> {
    pub boot: VerifiedBootParams<'a>,
    pub os_version: u32,
    pub os_patchlevel: u32,
}

/// Key that signs an attestation certificate.
pub enum AttestationSigner<'a> {
    /// Device attestation key, with the chain that certifies it.
    Device { key: &'a KeyMaterial, chain: &'a [Certificate] },
    /// Caller-provided attestation key.
    Caller { key: AsymmetricKey<'a>, issuer_subject: &'a [u8] },
}

/// Construction and signing of X.509 certificates.
pub trait CertificateGenerator {
    /// Build a certificate chain attesting to `key`, whose authorizations are given in
    /// `hw_enforced` and `sw_enforced`.  The returned chain starts with the new leaf certificate.
    #[allow(clippy::too_many_arguments)]
    fn generate_attestation(
        &self,
        key: AsymmetricKey,
        hw_enforced: &[KeyParam],
        sw_enforced: &[KeyParam],
        attest_params: &[KeyParam],
        signer: AttestationSigner,
        context: &AttestationContext,
    ) -> Result<Vec<Certificate>, Error>;

    /// Build a certificate for `key` signed by itself, or carrying a placeholder signature if
    /// `fake_signature` is set (for keys that cannot sign).
    fn generate_self_signed(
        &self,
        key: AsymmetricKey,
        hw_enforced: &[KeyParam],
        sw_enforced: &[KeyParam],
        cert_params: &[KeyParam],
        fake_signature: bool,
    ) -> Result<Vec<Certificate>, Error>;
}

/// Retrieval of the HMAC key shared with the enforcement policy.
pub trait AuthTokenKeySource {
    fn hmac_key(&self) -> Result<hmac::Key, Error>;
}

/// Conversion of decrypted key material into a typed [`Key`].
pub trait KeyFactory {
    /// Algorithm handled by this factory.
    fn algorithm(&self) -> Algorithm;

    /// Build a [`Key`] from the plaintext `key_material` and its authorizations.
    fn load_key(
        &self,
        key_material: &[u8],
        additional_params: &[KeyParam],
        hw_enforced: Vec<KeyParam>,
        sw_enforced: Vec<KeyParam>,
    ) -> Result<Key, Error>;
}

/// One [`KeyFactory`] per supported algorithm.
#[derive(Clone, Copy)]
pub struct KeyFactories<'a> {
    pub aes: &'a dyn KeyFactory,
    pub triple_des: &'a dyn KeyFactory,
    pub hmac: &'a dyn KeyFactory,
    pub rsa: &'a dyn KeyFactory,
    pub ec: &'a dyn KeyFactory,
}

impl<'a> KeyFactories<'a> {
    /// Return the factory for an algorithm.
    pub fn get(&self, algorithm: Algorithm) -> &'a dyn KeyFactory {
        match algorithm {
            Algorithm::Aes => self.aes,
            Algorithm::TripleDes => self.triple_des,
            Algorithm::Hmac => self.hmac,
            Algorithm::Rsa => self.rsa,
            Algorithm::Ec => self.ec,
        }
    }
}

impl Default for KeyFactories<'static> {
    fn default() -> Self {
        Self {
            aes: &DefaultKeyFactory::AES,
            triple_des: &DefaultKeyFactory::TRIPLE_DES,
            hmac: &DefaultKeyFactory::HMAC,
            rsa: &DefaultKeyFactory::RSA,
            ec: &DefaultKeyFactory::EC,
        }
    }
}

/// Key factory that holds key material in the form used by the crypto traits.
pub struct DefaultKeyFactory(pub Algorithm);

impl DefaultKeyFactory {
    pub const AES: Self = Self(Algorithm::Aes);
    pub const TRIPLE_DES: Self = Self(Algorithm::TripleDes);
    pub const HMAC: Self = Self(Algorithm::Hmac);
    pub const RSA: Self = Self(Algorithm::Rsa);
    pub const EC: Self = Self(Algorithm::Ec);
}

impl KeyFactory for DefaultKeyFactory {
    fn algorithm(&self) -> Algorithm {
        self.0
    }

    fn load_key(
        &self,
        key_material: &[u8],
        _additional_params: &[KeyParam],
        hw_enforced: Vec<KeyParam>,
        sw_enforced: Vec<KeyParam>,
    ) -> Result<Key, Error> {
        let material = match self.0 {
            Algorithm::Aes => KeyMaterial::Aes(aes::Key::new_from(key_material)?),
            Algorithm::TripleDes => KeyMaterial::TripleDes(des::Key::new_from(key_material)?),
            Algorithm::Hmac => {
                let key = hmac::Key::new_from(key_material)?;
                hmac::valid_hal_size(key.size())?;
                KeyMaterial::Hmac(key)
            }
            Algorithm::Rsa => KeyMaterial::Rsa(rsa::Key::new_from(key_material)?),
            Algorithm::Ec => {
                let curve = match get_opt_tag_value!(&hw_enforced, EcCurve)? {
                    Some(curve) => *curve,
                    None => {
                        let key_size: KeySizeInBits =
                            get_tag_value!(&hw_enforced, KeySize, ErrorCode::InvalidKeyBlob)?;
                        ec::key_size_to_curve(key_size)?
                    }
                };
                KeyMaterial::Ec(curve, ec::Key::new_from(key_material)?)
            }
        };
        Ok(Key { material, hw_enforced, sw_enforced })
    }
}
