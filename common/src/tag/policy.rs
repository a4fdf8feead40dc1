//! Per-tag policy applied when a caller's key description is split into hardware-enforced and
//! software-enforced authorizations.

use tkm_wire::keymint::{ErrorCode, Tag};

/// Disposition of a tag found in a key description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagPolicy {
    /// Never valid in a key description; the whole key is rejected as an invalid key blob.
    Forbidden,
    /// Only used to build attestation certificates, never recorded in the key.
    CertificateInfo,
    /// Describes a capability that is not supported; the key is rejected with this error.
    Rejected(ErrorCode),
    /// Silently dropped, either because the value is supplied by the context itself or because
    /// it is meaningless for keys held here.
    Ignored,
    /// Recorded in the hardware-enforced set after masking to the supported authenticator types.
    UserAuthType,
    /// Enforced by the secure environment.
    HardwareEnforced,
    /// Recorded as software-enforced.
    SoftwareEnforced,
}

/// Storage keys are only accepted when hardware-wrapped storage keys are supported.
const STORAGE_KEY_POLICY: TagPolicy = if cfg!(feature = "hwwsk") {
    TagPolicy::HardwareEnforced
} else {
    TagPolicy::Rejected(ErrorCode::Unimplemented)
};

/// Return the policy for a tag.
pub fn policy(tag: Tag) -> TagPolicy {
    match tag {
        Tag::AssociatedData
        | Tag::AuthToken
        | Tag::BootloaderOnly
        | Tag::Invalid
        | Tag::MacLength
        | Tag::Nonce
        | Tag::RootOfTrust
        | Tag::UniqueId
        | Tag::IdentityCredentialKey => TagPolicy::Forbidden,

        Tag::AttestationApplicationId
        | Tag::AttestationChallenge
        | Tag::AttestationIdBrand
        | Tag::AttestationIdDevice
        | Tag::AttestationIdImei
        | Tag::AttestationIdSecondImei
        | Tag::AttestationIdManufacturer
        | Tag::AttestationIdMeid
        | Tag::AttestationIdModel
        | Tag::AttestationIdProduct
        | Tag::AttestationIdSerial
        | Tag::CertificateNotAfter
        | Tag::CertificateNotBefore
        | Tag::CertificateSerial
        | Tag::CertificateSubject
        | Tag::ResetSinceIdRotation => TagPolicy::CertificateInfo,

        Tag::RollbackResistance => TagPolicy::Rejected(ErrorCode::RollbackResistanceUnavailable),
        Tag::DeviceUniqueAttestation => TagPolicy::Rejected(ErrorCode::InvalidArgument),

        // Origin, OS version and patchlevel are filled in from the context's own state. The
        // application id/data are bound into the blob rather than stored in it.
        Tag::AllowWhileOnBody
        | Tag::AllApplications
        | Tag::RollbackResistant
        | Tag::ConfirmationToken
        | Tag::ApplicationId
        | Tag::ApplicationData
        | Tag::BootPatchlevel
        | Tag::Origin
        | Tag::OsPatchlevel
        | Tag::OsVersion
        | Tag::VendorPatchlevel
        | Tag::HardwareType => TagPolicy::Ignored,

        Tag::StorageKey => STORAGE_KEY_POLICY,

        Tag::UserAuthType => TagPolicy::UserAuthType,

        Tag::Algorithm
        | Tag::AuthTimeout
        | Tag::BlobUsageRequirements
        | Tag::BlockMode
        | Tag::CallerNonce
        | Tag::Digest
        | Tag::EarlyBootOnly
        | Tag::EciesSingleHashMode
        | Tag::EcCurve
        | Tag::Kdf
        | Tag::KeySize
        | Tag::MaxUsesPerBoot
        | Tag::MinMacLength
        | Tag::MinSecondsBetweenOps
        | Tag::NoAuthRequired
        | Tag::Padding
        | Tag::Purpose
        | Tag::RsaOaepMgfDigest
        | Tag::RsaPublicExponent
        | Tag::TrustedConfirmationRequired
        | Tag::TrustedUserPresenceRequired
        | Tag::UnlockedDeviceRequired
        | Tag::UserSecureId => TagPolicy::HardwareEnforced,

        Tag::ActiveDatetime
        | Tag::AllUsers
        | Tag::CreationDatetime
        | Tag::Exportable
        | Tag::IncludeUniqueId
        | Tag::MaxBootLevel
        | Tag::OriginationExpireDatetime
        | Tag::UsageCountLimit
        | Tag::UsageExpireDatetime
        | Tag::UserId => TagPolicy::SoftwareEnforced,
    }
}
