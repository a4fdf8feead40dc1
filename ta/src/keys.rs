//! Key blob creation, parsing and upgrade.

use crate::{master, TrustyKeymasterContext};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::sync::atomic;
use log::{error, info, warn};
use tkm_common::{
    crypto::{aes::GCM_NONCE_SIZE, KeyMaterial},
    get_tag_value,
    keyblob::{
        self,
        legacy::{AuthEncryptedBlobFormat, EncryptedKeyBlob},
        GcmKeyBlobAead, KeyBlobAead,
    },
    km_err, km_verr,
    tag::{self, TagPolicy},
    vec_try_with_capacity, Error, FallibleAllocExt,
};
use tkm_wire::keymint::{ErrorCode, KeyOrigin, KeyParam};
use zeroize::Zeroizing;

/// A key recovered from a key blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Key {
    pub material: KeyMaterial,
    pub hw_enforced: Vec<KeyParam>,
    pub sw_enforced: Vec<KeyParam>,
}

/// Result of creating a key blob: the blob itself and the authorizations it records.
#[derive(Debug, PartialEq, Eq)]
pub struct KeyBlobResult {
    pub key_blob: Vec<u8>,
    pub hw_enforced: Vec<KeyParam>,
    pub sw_enforced: Vec<KeyParam>,
}

/// Version field of a key's authorizations that advances on upgrade.
#[derive(Clone, Copy, Debug)]
enum VersionField {
    OsVersion,
    OsPatchlevel,
}

/// Move a recorded version value up to `curr`, refusing to move it down.
fn upgrade(v: &mut u32, curr: u32, name: &str) -> Result<bool, Error> {
    match (*v).cmp(&curr) {
        Ordering::Less => {
            *v = curr;
            Ok(true)
        }
        Ordering::Equal => Ok(false),
        Ordering::Greater => {
            error!("refusing to downgrade {} from {} to {}", name, v, curr);
            Err(km_err!(
                InvalidArgument,
                "keyblob with future {} {} (current {})",
                name,
                v,
                curr
            ))
        }
    }
}

/// Upgrade the given version field in `params`, inserting it if absent.  Returns whether
/// anything changed.
fn upgrade_field(
    params: &mut Vec<KeyParam>,
    field: VersionField,
    curr: u32,
) -> Result<bool, Error> {
    for param in params.iter_mut() {
        match (field, param) {
            (VersionField::OsVersion, KeyParam::OsVersion(v)) => {
                return upgrade(v, curr, "OS version")
            }
            (VersionField::OsPatchlevel, KeyParam::OsPatchlevel(v)) => {
                return upgrade(v, curr, "OS patchlevel")
            }
            _ => {}
        }
    }
    params.try_push(match field {
        VersionField::OsVersion => KeyParam::OsVersion(curr),
        VersionField::OsPatchlevel => KeyParam::OsPatchlevel(curr),
    })?;
    Ok(true)
}

/// Force any recorded OS version to zero.  Returns `(changed, found)`.
fn force_os_version_zero(params: &mut [KeyParam]) -> (bool, bool) {
    let mut changed = false;
    let mut found = false;
    for param in params.iter_mut() {
        if let KeyParam::OsVersion(v) = param {
            found = true;
            changed |= *v != 0;
            *v = 0;
        }
    }
    (changed, found)
}

impl<'a> TrustyKeymasterContext<'a> {
    /// Split a caller's key description into hardware-enforced and software-enforced
    /// authorizations, adding the origin and the current system version.
    pub fn split_authorizations(
        &self,
        key_description: &[KeyParam],
        origin: KeyOrigin,
    ) -> Result<(Vec<KeyParam>, Vec<KeyParam>), Error> {
        let mut hw_enforced = vec_try_with_capacity!(key_description.len() + 3)?;
        let mut sw_enforced = Vec::new();
        for param in key_description {
            match tag::policy(param.tag()) {
                TagPolicy::Forbidden => {
                    error!("tag {:?} not allowed in key description", param.tag());
                    return Err(km_err!(
                        InvalidKeyBlob,
                        "tag {:?} not allowed in key description",
                        param.tag()
                    ));
                }
                TagPolicy::Rejected(code) => {
                    return Err(km_verr!(code, "tag {:?} not supported", param.tag()));
                }
                TagPolicy::CertificateInfo | TagPolicy::Ignored => {}
                TagPolicy::UserAuthType => {
                    if let KeyParam::UserAuthType(v) = param {
                        hw_enforced.try_push(KeyParam::UserAuthType(
                            v & tag::supported_user_auth_types(),
                        ))?;
                    }
                }
                TagPolicy::HardwareEnforced => hw_enforced.try_push(param.clone())?,
                TagPolicy::SoftwareEnforced => sw_enforced.try_push(param.clone())?,
            }
        }

        let (os_version, os_patchlevel) = self.get_system_version();
        hw_enforced.try_push(KeyParam::Origin(origin))?;
        hw_enforced.try_push(KeyParam::OsVersion(os_version))?;
        hw_enforced.try_push(KeyParam::OsPatchlevel(os_patchlevel))?;
        Ok((hw_enforced, sw_enforced))
    }

    /// Build the hidden authorizations that bind a key blob to the caller's application and the
    /// device's root of trust.
    pub fn hidden_authorizations(&self, params: &[KeyParam]) -> Result<Vec<KeyParam>, Error> {
        let boot = self.get_verified_boot_params();
        let state = (boot.verified_boot_state as u32).to_ne_bytes();
        let locked = [boot.device_locked as u8];
        keyblob::legacy::hidden(params, &[boot.verified_boot_key, &state, &locked])
    }

    fn keyblob_aead(&self) -> GcmKeyBlobAead<'a> {
        GcmKeyBlobAead { aes: self.imp.aes, hkdf: self.imp.hkdf }
    }

    /// Create a key blob holding `key_material`, with authorizations derived from
    /// `key_description`.
    pub fn create_key_blob(
        &self,
        key_description: &[KeyParam],
        origin: KeyOrigin,
        key_material: &[u8],
    ) -> Result<KeyBlobResult, Error> {
        let (hw_enforced, sw_enforced) = self.split_authorizations(key_description, origin)?;
        let key_blob = self.create_auth_encrypted(
            key_description,
            key_material,
            hw_enforced.clone(),
            sw_enforced.clone(),
        )?;
        Ok(KeyBlobResult { key_blob, hw_enforced, sw_enforced })
    }

    /// Encrypt key material and its authorizations into a serialized key blob, bound to the
    /// hidden authorizations built from `params`.
    fn create_auth_encrypted(
        &self,
        params: &[KeyParam],
        key_material: &[u8],
        hw_enforced: Vec<KeyParam>,
        sw_enforced: Vec<KeyParam>,
    ) -> Result<Vec<u8>, Error> {
        let hidden = self.hidden_authorizations(params)?;
        let master_key = master::derive_master_key(self.dev.hw_key)?;
        let mut nonce = [0u8; GCM_NONCE_SIZE];
        self.fill_random(&mut nonce)?;

        let format = AuthEncryptedBlobFormat::AesGcmWithSwEnforced;
        let encrypted = match self.dev.keyblob_aead {
            Some(aead) => aead.encrypt(
                format,
                &master_key,
                &nonce,
                key_material,
                &hidden,
                hw_enforced,
                sw_enforced,
            )?,
            None => self.keyblob_aead().encrypt(
                format,
                &master_key,
                &nonce,
                key_material,
                &hidden,
                hw_enforced,
                sw_enforced,
            )?,
        };
        encrypted.serialize()
    }

    /// Parse and decrypt a key blob, returning the plaintext key material and its
    /// authorizations.
    fn decrypt_key_blob(
        &self,
        key_blob: &[u8],
        additional_params: &[KeyParam],
        allow_legacy_format: bool,
    ) -> Result<(Zeroizing<Vec<u8>>, Vec<KeyParam>, Vec<KeyParam>), Error> {
        let data = keyblob::strip_legacy_prefix(key_blob)?;
        let encrypted = EncryptedKeyBlob::deserialize(data).map_err(|e| match e {
            Error::Alloc(_) => e,
            e => km_err!(InvalidKeyBlob, "failed to parse key blob: {:?}", e),
        })?;

        if encrypted.format == AuthEncryptedBlobFormat::AesOcb && !allow_legacy_format {
            match self.config.legacy_format_policy {
                crate::LegacyFormatPolicy::AcceptWithCounter => {
                    let count = self.ocb_accepted.fetch_add(1, atomic::Ordering::Relaxed) + 1;
                    info!("accepting AES-OCB blob #{}", count);
                }
                crate::LegacyFormatPolicy::Reject => {
                    warn!("rejecting AES-OCB blob");
                    return Err(km_err!(KeyRequiresUpgrade, "AES-OCB key blob needs upgrade"));
                }
            }
        }

        let master_key = master::derive_master_key(self.dev.hw_key)?;
        let hidden = self.hidden_authorizations(additional_params)?;
        let key_material = match self.dev.keyblob_aead {
            Some(aead) => aead.decrypt(&master_key, &encrypted, &hidden)?,
            None => self.keyblob_aead().decrypt(&master_key, &encrypted, &hidden)?,
        };
        let EncryptedKeyBlob { hw_enforced, sw_enforced, .. } = encrypted;
        Ok((key_material, hw_enforced, sw_enforced))
    }

    /// Parse a key blob into a typed [`Key`].  `additional_params` must carry the same
    /// application ID and data that were present when the key was created.
    pub fn parse_key_blob(
        &self,
        key_blob: &[u8],
        additional_params: &[KeyParam],
        allow_legacy_format: bool,
    ) -> Result<Key, Error> {
        let (key_material, hw_enforced, sw_enforced) =
            self.decrypt_key_blob(key_blob, additional_params, allow_legacy_format)?;
        let algorithm = get_tag_value!(&hw_enforced, Algorithm, ErrorCode::InvalidKeyBlob)?;
        self.key_factory(algorithm)?.load_key(
            &key_material,
            additional_params,
            hw_enforced,
            sw_enforced,
        )
    }

    /// Upgrade a key blob to the current system version.  Returns `None` if the blob is already
    /// current.
    pub fn upgrade_key_blob(
        &self,
        key_blob: &[u8],
        upgrade_params: &[KeyParam],
    ) -> Result<Option<Vec<u8>>, Error> {
        let Key { material, mut hw_enforced, mut sw_enforced } =
            self.parse_key_blob(key_blob, upgrade_params, true)?;
        let (os_version, os_patchlevel) = self.get_system_version();

        let mut changed = false;
        if os_version == 0 {
            // Upgrades to OS version zero are always allowed.
            let (hw_changed, found) = force_os_version_zero(&mut hw_enforced);
            let (sw_changed, _) = force_os_version_zero(&mut sw_enforced);
            changed |= hw_changed || sw_changed;
            if !found {
                hw_enforced.try_push(KeyParam::OsVersion(0))?;
                changed = true;
            }
            if changed {
                warn!("forcing upgrade to OS version 0");
            }
        } else {
            changed |= upgrade_field(&mut hw_enforced, VersionField::OsVersion, os_version)?;
        }
        changed |= upgrade_field(&mut hw_enforced, VersionField::OsPatchlevel, os_patchlevel)?;

        if !changed {
            return Ok(None);
        }
        info!("upgrading key blob to OS version {} patchlevel {}", os_version, os_patchlevel);
        let key_blob = self.create_auth_encrypted(
            upgrade_params,
            material.raw_bytes(),
            hw_enforced,
            sw_enforced,
        )?;
        Ok(Some(key_blob))
    }
}
