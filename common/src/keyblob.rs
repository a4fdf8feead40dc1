//! Key blob manipulation functionality.

use crate::{
    crypto::{aes, Aes, Hkdf, SymmetricOperation},
    km_err, tag, try_to_vec, vec_try_with_capacity, Error, FallibleAllocExt,
};
use alloc::vec::Vec;
use legacy::{AuthEncryptedBlobFormat, EncryptedKeyBlob};
use log::error;
use tkm_wire::keymint::KeyParam;
use zeroize::Zeroizing;

pub mod legacy;

/// Prefix found on key blobs that were wrapped by an older software-fallback layer.
pub const LEGACY_PREFIX: &[u8] = b"pKMblob";

/// Length of the legacy prefix including its trailing type byte.
pub const LEGACY_PREFIX_LEN: usize = 8;

/// Type byte following [`LEGACY_PREFIX`] for a blob that wraps a hardware-backed key.
const LEGACY_TYPE_HARDWARE: u8 = 0;

/// Type byte following [`LEGACY_PREFIX`] for a software-only key blob.
const LEGACY_TYPE_SOFTWARE: u8 = 1;

/// Remove any legacy prefix from a key blob.  Blobs with a prefix that indicates a
/// software-only key, or with an unrecognized type byte, are rejected.
pub fn strip_legacy_prefix(blob: &[u8]) -> Result<&[u8], Error> {
    if blob.len() < LEGACY_PREFIX_LEN || !blob.starts_with(LEGACY_PREFIX) {
        return Ok(blob);
    }
    match blob[LEGACY_PREFIX.len()] {
        LEGACY_TYPE_HARDWARE => Ok(&blob[LEGACY_PREFIX_LEN..]),
        LEGACY_TYPE_SOFTWARE => {
            error!("Software key blobs are not supported");
            Err(km_err!(InvalidKeyBlob, "software key blobs are not supported"))
        }
        t => {
            error!("Invalid key blob type {}", t);
            Err(km_err!(InvalidKeyBlob, "invalid key blob type {}", t))
        }
    }
}

/// Authenticated encryption of key material, keyed by the device master key and bound to the
/// hidden and enforced authorizations of the key.
pub trait KeyBlobAead {
    /// Encrypt `key_material` in the given format, producing a complete [`EncryptedKeyBlob`].
    #[allow(clippy::too_many_arguments)]
    fn encrypt(
        &self,
        format: AuthEncryptedBlobFormat,
        master_key: &[u8],
        nonce: &[u8],
        key_material: &[u8],
        hidden: &[KeyParam],
        hw_enforced: Vec<KeyParam>,
        sw_enforced: Vec<KeyParam>,
    ) -> Result<EncryptedKeyBlob, Error>;

    /// Decrypt and authenticate the key material held in `blob`.
    fn decrypt(
        &self,
        master_key: &[u8],
        blob: &EncryptedKeyBlob,
        hidden: &[KeyParam],
    ) -> Result<Zeroizing<Vec<u8>>, Error>;
}

/// Info string prefixed to the serialized authorizations when deriving an AES-GCM key
/// encryption key.
const GCM_KEK_INFO: &[u8] = b"AES-256-GCM-HKDF-SHA-256, version 1";

/// Size of an AES-GCM key encryption key in bytes.
const GCM_KEK_SIZE: usize = 32;

/// Size of an AES-GCM key blob tag in bytes.
pub const GCM_TAG_SIZE: usize = 16;

/// Key blob encryption with AES-256-GCM under an HKDF-derived key.
///
/// The key encryption key is HKDF-SHA256 over the master key, with no salt and an info string of
/// `GCM_KEK_INFO || ser(hidden) || ser(hw_enforced) || ser(sw_enforced)`, using the legacy
/// authorization set serialization.  The key material is encrypted with no additional data.
///
/// The legacy AES-OCB format is not supported by this implementation.
pub struct GcmKeyBlobAead<'a> {
    pub aes: &'a dyn Aes,
    pub hkdf: &'a dyn Hkdf,
}

impl<'a> GcmKeyBlobAead<'a> {
    fn derive_kek(
        &self,
        master_key: &[u8],
        hidden: &[KeyParam],
        hw_enforced: &[KeyParam],
        sw_enforced: &[KeyParam],
    ) -> Result<aes::Key, Error> {
        let hidden_data = tag::legacy::serialize(hidden)?;
        let hw_data = tag::legacy::serialize(hw_enforced)?;
        let sw_data = tag::legacy::serialize(sw_enforced)?;
        let mut info = vec_try_with_capacity!(
            GCM_KEK_INFO.len() + hidden_data.len() + hw_data.len() + sw_data.len()
        )?;
        info.extend_from_slice(GCM_KEK_INFO);
        info.extend_from_slice(&hidden_data);
        info.extend_from_slice(&hw_data);
        info.extend_from_slice(&sw_data);
        let kek = Zeroizing::new(self.hkdf.hkdf(&[], master_key, &info, GCM_KEK_SIZE)?);
        aes::Key::new_from(&kek)
    }

    fn check_format(format: AuthEncryptedBlobFormat) -> Result<(), Error> {
        match format {
            AuthEncryptedBlobFormat::AesGcmWithSwEnforced => Ok(()),
            AuthEncryptedBlobFormat::AesOcb => {
                Err(km_err!(Unimplemented, "AES-OCB key blobs not supported"))
            }
            AuthEncryptedBlobFormat::AesGcmWithSecureDeletion => {
                Err(km_err!(InvalidKeyBlob, "secure deletion key blobs not supported"))
            }
        }
    }
}

impl<'a> KeyBlobAead for GcmKeyBlobAead<'a> {
    fn encrypt(
        &self,
        format: AuthEncryptedBlobFormat,
        master_key: &[u8],
        nonce: &[u8],
        key_material: &[u8],
        hidden: &[KeyParam],
        hw_enforced: Vec<KeyParam>,
        sw_enforced: Vec<KeyParam>,
    ) -> Result<EncryptedKeyBlob, Error> {
        Self::check_format(format)?;
        let kek = self.derive_kek(master_key, hidden, &hw_enforced, &sw_enforced)?;
        let mode = aes::GcmMode::new(nonce, (GCM_TAG_SIZE * 8) as u32)?;
        let mut op = self.aes.begin_aead(kek, mode, SymmetricOperation::Encrypt)?;
        let mut ciphertext = op.update(key_material)?;
        let trailer = op.finish()?;
        ciphertext.try_extend_from_slice(&trailer)?;
        if ciphertext.len() < GCM_TAG_SIZE {
            return Err(km_err!(UnknownError, "AES-GCM output too short for tag"));
        }
        let tag = try_to_vec(&ciphertext[ciphertext.len() - GCM_TAG_SIZE..])?;
        ciphertext.truncate(ciphertext.len() - GCM_TAG_SIZE);
        Ok(EncryptedKeyBlob {
            format,
            nonce: try_to_vec(nonce)?,
            ciphertext,
            tag,
            hw_enforced,
            sw_enforced,
            key_slot: None,
        })
    }

    fn decrypt(
        &self,
        master_key: &[u8],
        blob: &EncryptedKeyBlob,
        hidden: &[KeyParam],
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        Self::check_format(blob.format)?;
        if blob.nonce.len() != aes::GCM_NONCE_SIZE {
            return Err(km_err!(InvalidKeyBlob, "unexpected nonce length {}", blob.nonce.len()));
        }
        if blob.tag.len() != GCM_TAG_SIZE {
            return Err(km_err!(InvalidKeyBlob, "unexpected tag length {}", blob.tag.len()));
        }
        let kek = self.derive_kek(master_key, hidden, &blob.hw_enforced, &blob.sw_enforced)?;
        let mode = aes::GcmMode::new(&blob.nonce, (GCM_TAG_SIZE * 8) as u32)?;
        let mut op = self.aes.begin_aead(kek, mode, SymmetricOperation::Decrypt)?;
        let mut input = vec_try_with_capacity!(blob.ciphertext.len() + blob.tag.len())?;
        input.extend_from_slice(&blob.ciphertext);
        input.extend_from_slice(&blob.tag);

        let mut plaintext = Zeroizing::new(op.update(&input)?);
        let trailer = Zeroizing::new(
            op.finish()
                .map_err(|e| km_err!(InvalidKeyBlob, "key blob failed to decrypt: {:?}", e))?,
        );
        plaintext.try_extend_from_slice(&trailer)?;
        Ok(plaintext)
    }
}
