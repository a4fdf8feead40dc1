//! Utilities for handling legacy KeyMaster encrypted key blobs.

use crate::tag::legacy::{append_vec, consume_u32, consume_u8, consume_vec};
use crate::{km_err, try_to_vec, vec_try_with_capacity, Error, FallibleAllocExt};
use alloc::vec::Vec;
use core::mem::size_of;
use tkm_wire::keymint::KeyParam;


/// Format of encrypted key blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEncryptedBlobFormat {
    AesOcb = 0,
    AesGcmWithSwEnforced = 1,
    AesGcmWithSecureDeletion = 2,
}

/// Encrypted key blob, including key characteristics.
#[derive(Debug, PartialEq, Eq)]
pub struct EncryptedKeyBlob {
    pub format: AuthEncryptedBlobFormat,
    // IV for encryption.
    pub nonce: Vec<u8>,
    // Encrypted key material.
    pub ciphertext: Vec<u8>,
    // Authenticated encryption tag.
    pub tag: Vec<u8>,
    pub hw_enforced: Vec<KeyParam>,
    pub sw_enforced: Vec<KeyParam>,
    pub key_slot: Option<u32>,
}

impl EncryptedKeyBlob {
    /// Serialize an [`EncryptedKeyBlob`].
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let hw_enforced_data = crate::tag::legacy::serialize(&self.hw_enforced)?;
        let sw_enforced_data = crate::tag::legacy::serialize(&self.sw_enforced)?;
        let mut result = vec_try_with_capacity!(
            size_of::<u8>()
                + size_of::<u32>()
                + self.nonce.len()
                + size_of::<u32>()
                + self.ciphertext.len()
                + size_of::<u32>()
                + self.tag.len()
                + hw_enforced_data.len()
                + sw_enforced_data.len()
                + size_of::<u32>()
        )?;
        result.push(self.format as u8);
        append_vec(&mut result, &self.nonce)?;
        append_vec(&mut result, &self.ciphertext)?;
        append_vec(&mut result, &self.tag)?;
        result.try_extend_from_slice(&hw_enforced_data)?;
        result.try_extend_from_slice(&sw_enforced_data)?;
        if let Some(slot) = self.key_slot {
            result.try_extend_from_slice(&slot.to_ne_bytes())?;
        }
        Ok(result)
    }

    /// Parse a serialized [`EncryptedKeyBlob`].
    pub fn deserialize(mut data: &[u8]) -> Result<Self, Error> {
        let format = match consume_u8(&mut data)? {
            x if x == AuthEncryptedBlobFormat::AesOcb as u8 => AuthEncryptedBlobFormat::AesOcb,
            x if x == AuthEncryptedBlobFormat::AesGcmWithSwEnforced as u8 => {
                AuthEncryptedBlobFormat::AesGcmWithSwEnforced
            }
            x if x == AuthEncryptedBlobFormat::AesGcmWithSecureDeletion as u8 => {
                AuthEncryptedBlobFormat::AesGcmWithSecureDeletion
            }
            x => return Err(km_err!(InvalidKeyBlob, "unexpected blob format {}", x)),
        };

        let nonce = consume_vec(&mut data)?;
        let ciphertext = consume_vec(&mut data)?;
        let tag = consume_vec(&mut data)?;
        let hw_enforced = crate::tag::legacy::deserialize(&mut data)?;
        let sw_enforced = crate::tag::legacy::deserialize(&mut data)?;

        let key_slot = match data.len() {
            0 => None,
            4 => Some(consume_u32(&mut data)?),
            _ => return Err(km_err!(InvalidKeyBlob, "unexpected remaining length {}", data.len())),
        };

        Ok(EncryptedKeyBlob { format, nonce, ciphertext, tag, hw_enforced, sw_enforced, key_slot })
    }
}

/// Build the parameters that are used as the hidden input to KEK derivation:
/// - `ApplicationId(data)` if present
/// - `ApplicationData(data)` if present
/// - (repeated) `RootOfTrust(rot)` for each of the provided root of trust components, in order.
///
/// If the application ID or data is repeated, the first occurrence is used.
pub fn hidden(params: &[KeyParam], rots: &[&[u8]]) -> Result<Vec<KeyParam>, Error> {
    let mut results = Vec::new();
    let app_id = params.iter().find_map(|p| match p {
        KeyParam::ApplicationId(v) => Some(v),
        _ => None,
    });
    if let Some(app_id) = app_id {
        results.try_push(KeyParam::ApplicationId(try_to_vec(app_id)?))?;
    }
    let app_data = params.iter().find_map(|p| match p {
        KeyParam::ApplicationData(v) => Some(v),
        _ => None,
    });
    if let Some(app_data) = app_data {
        results.try_push(KeyParam::ApplicationData(try_to_vec(app_data)?))?;
    }
    for rot in rots {
        results.try_push(KeyParam::RootOfTrust(try_to_vec(rot)?))?;
    }
    Ok(results)
}
