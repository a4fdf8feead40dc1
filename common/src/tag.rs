//! Helper functionality for working with tags.

use crate::{
    crypto::rsa::DecryptionMode, km_err, km_verr, try_to_vec, vec_try_with_capacity, Error,
    FallibleAllocExt,
};
use alloc::vec::Vec;
use core::convert::TryFrom;
use tkm_wire::{
    keymint::{
        Algorithm, BlockMode, DateTime, Digest, EcCurve, ErrorCode, HardwareAuthenticatorType,
        KeyBlobUsageRequirements, KeyDerivationFunction, KeyOrigin, KeyParam, KeyPurpose,
        PaddingMode, SecurityLevel, Tag,
    },
    KeySizeInBits, RsaExponent,
};

pub mod legacy;
mod policy;
pub use policy::*;

/// Macro to retrieve a copy of the (single) value of a tag in a collection of `KeyParam`s.  There
/// can be only one.  Only works for variants whose data type implements `Copy`.
#[macro_export]
macro_rules! get_tag_value {
    { $params:expr, $variant:ident, $err:expr } => {
        {
            let mut result = None;
            let mut count = 0;
            for param in $params {
                if let $crate::wire::keymint::KeyParam::$variant(v) = param {
                    count += 1;
                    result = Some(*v);
                }
            }
            match count {
                0 => Err($crate::km_verr!($err, "missing tag {}", stringify!($variant))),
                1 => Ok(result.unwrap()),  /* safe: count=1 => exists */
                _ => Err($crate::km_verr!($err, "duplicate tag {}", stringify!($variant))),
            }
        }
    }
}

/// Macro to retrieve the value of an optional single-valued tag in a collection of `KeyParam`s.  It
/// may or may not be present, but multiple instances of the tag are assumed to be invalid.
#[macro_export]
macro_rules! get_opt_tag_value {
    { $params:expr, $variant:ident } => {
        $crate::get_opt_tag_value!($params, $variant, InvalidTag)
    };
    { $params:expr, $variant:ident, $dup_error:ident } => {
        {
            let mut result = None;
            let mut count = 0;
            for param in $params {
                if let $crate::wire::keymint::KeyParam::$variant(v) = param {
                    count += 1;
                    result = Some(v);
                }
            }
            match count {
                0 => Ok(None),
                1 => Ok(Some(result.unwrap())),  /* safe: count=1 => exists */
                _ => Err($crate::km_err!($dup_error, "duplicate tag {}", stringify!($variant))),
            }
        }
    }
}

/// Macro to check a collection of `KeyParam`s holds a value matching the given value.
#[macro_export]
macro_rules! contains_tag_value {
    { $params:expr, $variant:ident, $value:expr } => {
        {
            let mut found = false;
            for param in $params {
                if let $crate::wire::keymint::KeyParam::$variant(v) = param {
                    if *v == $value {
                        found = true;
                    }
                }
            }
            found
        }
    }
}

/// Untyped value of a key parameter, as it appears in serialized authorization sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawValue<'a> {
    /// `TagType::Bool`; only ever present as `true`.
    True,
    /// `TagType::Enum[Rep]` and `TagType::Uint[Rep]`.
    Integer(u32),
    /// `TagType::Ulong[Rep]` and `TagType::Date`.
    Long(u64),
    /// `TagType::Bytes` and `TagType::Bignum`.
    Bytes(&'a [u8]),
}

/// Return the untyped value held by a [`KeyParam`].
pub fn param_to_raw(param: &KeyParam) -> RawValue {
    match param {
        // Enum-holding variants.
        KeyParam::Purpose(v) => RawValue::Integer(*v as u32),
        KeyParam::Algorithm(v) => RawValue::Integer(*v as u32),
        KeyParam::BlockMode(v) => RawValue::Integer(*v as u32),
        KeyParam::Digest(v) | KeyParam::RsaOaepMgfDigest(v) => RawValue::Integer(*v as u32),
        KeyParam::Padding(v) => RawValue::Integer(*v as u32),
        KeyParam::Kdf(v) => RawValue::Integer(*v as u32),
        KeyParam::EcCurve(v) => RawValue::Integer(*v as u32),
        KeyParam::BlobUsageRequirements(v) => RawValue::Integer(*v as u32),
        KeyParam::HardwareType(v) => RawValue::Integer(*v as u32),
        KeyParam::Origin(v) => RawValue::Integer(*v as u32),

        // `u32`-holding variants.
        KeyParam::KeySize(v) => RawValue::Integer(v.0),
        KeyParam::MinMacLength(v)
        | KeyParam::MinSecondsBetweenOps(v)
        | KeyParam::MaxUsesPerBoot(v)
        | KeyParam::UsageCountLimit(v)
        | KeyParam::UserId(v)
        | KeyParam::UserAuthType(v)
        | KeyParam::AuthTimeout(v)
        | KeyParam::OsVersion(v)
        | KeyParam::OsPatchlevel(v)
        | KeyParam::VendorPatchlevel(v)
        | KeyParam::BootPatchlevel(v)
        | KeyParam::MacLength(v)
        | KeyParam::MaxBootLevel(v) => RawValue::Integer(*v),

        // `u64`-holding variants.
        KeyParam::RsaPublicExponent(v) => RawValue::Long(v.0),
        KeyParam::UserSecureId(v) => RawValue::Long(*v),

        // `DateTime`-holding variants.
        KeyParam::ActiveDatetime(v)
        | KeyParam::OriginationExpireDatetime(v)
        | KeyParam::UsageExpireDatetime(v)
        | KeyParam::CreationDatetime(v)
        | KeyParam::CertificateNotBefore(v)
        | KeyParam::CertificateNotAfter(v) => RawValue::Long(v.ms_since_epoch as u64),

        // `true`-holding variants.
        KeyParam::CallerNonce
        | KeyParam::EciesSingleHashMode
        | KeyParam::IncludeUniqueId
        | KeyParam::BootloaderOnly
        | KeyParam::RollbackResistance
        | KeyParam::RollbackResistant
        | KeyParam::EarlyBootOnly
        | KeyParam::AllUsers
        | KeyParam::NoAuthRequired
        | KeyParam::AllowWhileOnBody
        | KeyParam::TrustedUserPresenceRequired
        | KeyParam::TrustedConfirmationRequired
        | KeyParam::UnlockedDeviceRequired
        | KeyParam::AllApplications
        | KeyParam::Exportable
        | KeyParam::DeviceUniqueAttestation
        | KeyParam::IdentityCredentialKey
        | KeyParam::StorageKey
        | KeyParam::ResetSinceIdRotation => RawValue::True,

        // `Vec<u8>`-holding variants.
        KeyParam::ApplicationId(v)
        | KeyParam::ApplicationData(v)
        | KeyParam::RootOfTrust(v)
        | KeyParam::UniqueId(v)
        | KeyParam::AttestationChallenge(v)
        | KeyParam::AttestationApplicationId(v)
        | KeyParam::AttestationIdBrand(v)
        | KeyParam::AttestationIdDevice(v)
        | KeyParam::AttestationIdProduct(v)
        | KeyParam::AttestationIdSerial(v)
        | KeyParam::AttestationIdImei(v)
        | KeyParam::AttestationIdSecondImei(v)
        | KeyParam::AttestationIdMeid(v)
        | KeyParam::AttestationIdManufacturer(v)
        | KeyParam::AttestationIdModel(v)
        | KeyParam::AssociatedData(v)
        | KeyParam::Nonce(v)
        | KeyParam::AuthToken(v)
        | KeyParam::ConfirmationToken(v)
        | KeyParam::CertificateSerial(v)
        | KeyParam::CertificateSubject(v) => RawValue::Bytes(v),
    }
}

/// Build a typed [`KeyParam`] from a tag and its untyped value.  Any mismatch between the tag and
/// the kind of value, or an unrecognized enum value, results in an error with the given code.
pub fn param_from_raw(tag: Tag, value: RawValue, err: ErrorCode) -> Result<KeyParam, Error> {
    macro_rules! int {
        () => {
            match value {
                RawValue::Integer(v) => v,
                _ => return Err(km_verr!(err, "expected integer value for {:?}", tag)),
            }
        };
    }
    macro_rules! long {
        () => {
            match value {
                RawValue::Long(v) => v,
                _ => return Err(km_verr!(err, "expected long value for {:?}", tag)),
            }
        };
    }
    macro_rules! bytes {
        () => {
            match value {
                RawValue::Bytes(v) => try_to_vec(v)?,
                _ => return Err(km_verr!(err, "expected bytes value for {:?}", tag)),
            }
        };
    }
    macro_rules! flag {
        ($variant:ident) => {
            match value {
                RawValue::True => KeyParam::$variant,
                _ => return Err(km_verr!(err, "expected bool value for {:?}", tag)),
            }
        };
    }
    macro_rules! enumval {
        ($etype:ty) => {
            <$etype>::try_from(int!() as i32)
                .map_err(|_e| km_verr!(err, "unknown enum value for {:?}", tag))?
        };
    }
    let date = |v: u64| DateTime { ms_since_epoch: v as i64 };

    Ok(match tag {
        // Enum-holding variants.
        Tag::Purpose => KeyParam::Purpose(enumval!(KeyPurpose)),
        Tag::Algorithm => KeyParam::Algorithm(enumval!(Algorithm)),
        Tag::BlockMode => KeyParam::BlockMode(enumval!(BlockMode)),
        Tag::Digest => KeyParam::Digest(enumval!(Digest)),
        Tag::Padding => KeyParam::Padding(enumval!(PaddingMode)),
        Tag::Kdf => KeyParam::Kdf(enumval!(KeyDerivationFunction)),
        Tag::EcCurve => KeyParam::EcCurve(enumval!(EcCurve)),
        Tag::RsaOaepMgfDigest => KeyParam::RsaOaepMgfDigest(enumval!(Digest)),
        Tag::BlobUsageRequirements => {
            KeyParam::BlobUsageRequirements(enumval!(KeyBlobUsageRequirements))
        }
        Tag::HardwareType => KeyParam::HardwareType(enumval!(SecurityLevel)),
        Tag::Origin => KeyParam::Origin(enumval!(KeyOrigin)),

        // `u32`-holding variants.
        Tag::KeySize => KeyParam::KeySize(KeySizeInBits(int!())),
        Tag::MinMacLength => KeyParam::MinMacLength(int!()),
        Tag::MinSecondsBetweenOps => KeyParam::MinSecondsBetweenOps(int!()),
        Tag::MaxUsesPerBoot => KeyParam::MaxUsesPerBoot(int!()),
        Tag::UsageCountLimit => KeyParam::UsageCountLimit(int!()),
        Tag::UserId => KeyParam::UserId(int!()),
        Tag::UserAuthType => KeyParam::UserAuthType(int!()),
        Tag::AuthTimeout => KeyParam::AuthTimeout(int!()),
        Tag::OsVersion => KeyParam::OsVersion(int!()),
        Tag::OsPatchlevel => KeyParam::OsPatchlevel(int!()),
        Tag::VendorPatchlevel => KeyParam::VendorPatchlevel(int!()),
        Tag::BootPatchlevel => KeyParam::BootPatchlevel(int!()),
        Tag::MacLength => KeyParam::MacLength(int!()),
        Tag::MaxBootLevel => KeyParam::MaxBootLevel(int!()),

        // `u64`-holding variants.
        Tag::RsaPublicExponent => KeyParam::RsaPublicExponent(RsaExponent(long!())),
        Tag::UserSecureId => KeyParam::UserSecureId(long!()),

        // `DateTime`-holding variants.
        Tag::ActiveDatetime => KeyParam::ActiveDatetime(date(long!())),
        Tag::OriginationExpireDatetime => KeyParam::OriginationExpireDatetime(date(long!())),
        Tag::UsageExpireDatetime => KeyParam::UsageExpireDatetime(date(long!())),
        Tag::CreationDatetime => KeyParam::CreationDatetime(date(long!())),
        Tag::CertificateNotBefore => KeyParam::CertificateNotBefore(date(long!())),
        Tag::CertificateNotAfter => KeyParam::CertificateNotAfter(date(long!())),

        // `true`-holding variants.
        Tag::CallerNonce => flag!(CallerNonce),
        Tag::EciesSingleHashMode => flag!(EciesSingleHashMode),
        Tag::IncludeUniqueId => flag!(IncludeUniqueId),
        Tag::BootloaderOnly => flag!(BootloaderOnly),
        Tag::RollbackResistance => flag!(RollbackResistance),
        Tag::RollbackResistant => flag!(RollbackResistant),
        Tag::EarlyBootOnly => flag!(EarlyBootOnly),
        Tag::AllUsers => flag!(AllUsers),
        Tag::NoAuthRequired => flag!(NoAuthRequired),
        Tag::AllowWhileOnBody => flag!(AllowWhileOnBody),
        Tag::TrustedUserPresenceRequired => flag!(TrustedUserPresenceRequired),
        Tag::TrustedConfirmationRequired => flag!(TrustedConfirmationRequired),
        Tag::UnlockedDeviceRequired => flag!(UnlockedDeviceRequired),
        Tag::AllApplications => flag!(AllApplications),
        Tag::Exportable => flag!(Exportable),
        Tag::DeviceUniqueAttestation => flag!(DeviceUniqueAttestation),
        Tag::IdentityCredentialKey => flag!(IdentityCredentialKey),
        Tag::StorageKey => flag!(StorageKey),
        Tag::ResetSinceIdRotation => flag!(ResetSinceIdRotation),

        // `Vec<u8>`-holding variants.
        Tag::ApplicationId => KeyParam::ApplicationId(bytes!()),
        Tag::ApplicationData => KeyParam::ApplicationData(bytes!()),
        Tag::RootOfTrust => KeyParam::RootOfTrust(bytes!()),
        Tag::UniqueId => KeyParam::UniqueId(bytes!()),
        Tag::AttestationChallenge => KeyParam::AttestationChallenge(bytes!()),
        Tag::AttestationApplicationId => KeyParam::AttestationApplicationId(bytes!()),
        Tag::AttestationIdBrand => KeyParam::AttestationIdBrand(bytes!()),
        Tag::AttestationIdDevice => KeyParam::AttestationIdDevice(bytes!()),
        Tag::AttestationIdProduct => KeyParam::AttestationIdProduct(bytes!()),
        Tag::AttestationIdSerial => KeyParam::AttestationIdSerial(bytes!()),
        Tag::AttestationIdImei => KeyParam::AttestationIdImei(bytes!()),
        Tag::AttestationIdSecondImei => KeyParam::AttestationIdSecondImei(bytes!()),
        Tag::AttestationIdMeid => KeyParam::AttestationIdMeid(bytes!()),
        Tag::AttestationIdManufacturer => KeyParam::AttestationIdManufacturer(bytes!()),
        Tag::AttestationIdModel => KeyParam::AttestationIdModel(bytes!()),
        Tag::AssociatedData => KeyParam::AssociatedData(bytes!()),
        Tag::Nonce => KeyParam::Nonce(bytes!()),
        Tag::AuthToken => KeyParam::AuthToken(bytes!()),
        Tag::ConfirmationToken => KeyParam::ConfirmationToken(bytes!()),
        Tag::CertificateSerial => KeyParam::CertificateSerial(bytes!()),
        Tag::CertificateSubject => KeyParam::CertificateSubject(bytes!()),

        Tag::Invalid => return Err(km_verr!(err, "invalid tag encountered")),
    })
}

/// Get the configured MGF digest from a set of parameters.  If no MGF digest is specified,
/// a default value of SHA1 is returned.
pub fn get_mgf_digest(params: &[KeyParam]) -> Result<Digest, Error> {
    Ok(*get_opt_tag_value!(params, RsaOaepMgfDigest)?.unwrap_or(&Digest::Sha1))
}

/// Return the set of user authenticator types that may be recorded in a key's authorizations.
pub fn supported_user_auth_types() -> u32 {
    let mut mask = HardwareAuthenticatorType::Password as u32;
    if cfg!(feature = "fingerprint-auth") {
        mask |= HardwareAuthenticatorType::Fingerprint as u32;
    }
    mask
}

/// Copy the parameters of two authorization sets into a single new set.
pub fn union(first: &[KeyParam], second: &[KeyParam]) -> Result<Vec<KeyParam>, Error> {
    let mut result = vec_try_with_capacity!(first.len() + second.len())?;
    for param in first.iter().chain(second.iter()) {
        result.try_push(param.clone())?;
    }
    Ok(result)
}

/// Check the required key characteristics and caller parameters for an RSA wrapping key used in
/// secure import, and return the [`DecryptionMode`] to use for the transport key.
///
/// `chars` holds the combined (hardware- and software-enforced) characteristics of the wrapping
/// key, `params` the parameters supplied by the caller for the unwrap operation.
pub fn check_rsa_wrapping_key_params(
    chars: &[KeyParam],
    params: &[KeyParam],
) -> Result<DecryptionMode, Error> {
    if !contains_tag_value!(chars, Purpose, KeyPurpose::WrapKey) {
        return Err(km_err!(IncompatiblePurpose, "no wrap key purpose for the wrapping key"));
    }
    if !contains_tag_value!(chars, Digest, Digest::Sha256) {
        return Err(km_err!(IncompatibleDigest, "wrapping key not authorized for SHA-256"));
    }
    if !contains_tag_value!(chars, Padding, PaddingMode::RsaOaep) {
        return Err(km_err!(IncompatiblePaddingMode, "wrapping key not authorized for OAEP"));
    }

    if !contains_tag_value!(params, Digest, Digest::Sha256) {
        return Err(km_err!(IncompatibleDigest, "unwrap requires SHA-256 digest"));
    }
    if !contains_tag_value!(params, Padding, PaddingMode::RsaOaep) {
        return Err(km_err!(IncompatiblePaddingMode, "unwrap requires OAEP padding"));
    }

    let mgf_digest = get_mgf_digest(params)?;
    if mgf_digest == Digest::None {
        return Err(km_err!(UnsupportedMgfDigest, "MGF digest cannot be NONE for RSA-OAEP"));
    }
    Ok(DecryptionMode::OaepPadding { msg_digest: Digest::Sha256, mgf_digest })
}
