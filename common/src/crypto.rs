//! Abstractions and related types for accessing cryptographic primitives
//! and related functionality.

use crate::{
    km_err, try_to_vec, vec_try_with_capacity,
    wire::keymint::{Algorithm, Digest, EcCurve},
    Error, FallibleAllocExt,
};
use alloc::vec::Vec;

pub mod aes;
pub mod des;
pub mod ec;
pub mod hmac;
pub mod rsa;
mod traits;
pub use traits::*;

/// Size of SHA-256 output in bytes.
pub const SHA256_DIGEST_LEN: usize = 32;

/// Plaintext key material, tagged by algorithm.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Aes(aes::Key),
    TripleDes(des::Key),
    Hmac(hmac::Key),
    Rsa(rsa::Key),
    Ec(EcCurve, ec::Key),
}

impl KeyMaterial {
    /// Indicate the algorithm of the key material.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Aes(_) => Algorithm::Aes,
            Self::TripleDes(_) => Algorithm::TripleDes,
            Self::Hmac(_) => Algorithm::Hmac,
            Self::Rsa(_) => Algorithm::Rsa,
            Self::Ec(_, _) => Algorithm::Ec,
        }
    }

    /// Return a view of the key material restricted to asymmetric keys, or `None` for a
    /// symmetric key.
    pub fn as_asymmetric(&self) -> Option<AsymmetricKey> {
        match self {
            Self::Rsa(k) => Some(AsymmetricKey::Rsa(k)),
            Self::Ec(curve, k) => Some(AsymmetricKey::Ec(*curve, k)),
            Self::Aes(_) | Self::TripleDes(_) | Self::Hmac(_) => None,
        }
    }

    /// Return the raw bytes of the key material, as held in a key blob.
    pub fn raw_bytes(&self) -> &[u8] {
        match self {
            Self::Aes(k) => k.as_bytes(),
            Self::TripleDes(k) => &k.0,
            Self::Hmac(k) => &k.0,
            Self::Rsa(k) => &k.0,
            Self::Ec(_, k) => &k.0,
        }
    }
}

/// Manual implementation of [`Debug`] that skips emitting plaintext key material.
impl core::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Aes(k) => match k {
                aes::Key::Aes128(_) => f.write_str("Aes128(...)"),
                aes::Key::Aes192(_) => f.write_str("Aes192(...)"),
                aes::Key::Aes256(_) => f.write_str("Aes256(...)"),
            },
            Self::TripleDes(_) => f.write_str("TripleDes(...)"),
            Self::Hmac(_) => f.write_str("Hmac(...)"),
            Self::Rsa(_) => f.write_str("Rsa(...)"),
            Self::Ec(c, _) => f.write_fmt(format_args!("Ec({:?}, ...)", c)),
        }
    }
}

/// Borrowed view of the key material of an asymmetric key, for operations that only make sense
/// for signing keys (attestation and self-signed certificates).
#[derive(Clone, Copy)]
pub enum AsymmetricKey<'a> {
    Rsa(&'a rsa::Key),
    Ec(EcCurve, &'a ec::Key),
}

impl<'a> AsymmetricKey<'a> {
    /// Indicate the algorithm of the key.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Rsa(_) => Algorithm::Rsa,
            Self::Ec(_, _) => Algorithm::Ec,
        }
    }
}

impl<'a> core::fmt::Debug for AsymmetricKey<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Rsa(_) => f.write_str("Rsa(...)"),
            Self::Ec(c, _) => f.write_fmt(format_args!("Ec({:?}, ...)", c)),
        }
    }
}

/// Direction of cipher operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymmetricOperation {
    Encrypt,
    Decrypt,
}

/// Salt value used in HKDF if none provided.
const HKDF_EMPTY_SALT: [u8; SHA256_DIGEST_LEN] = [0; SHA256_DIGEST_LEN];

/// Convenience wrapper to perform one-shot HMAC-SHA256.
fn hmac_sha256(hmac: &dyn Hmac, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut op = hmac.begin(hmac::Key(try_to_vec(key)?), Digest::Sha256)?;
    op.update(data)?;
    op.finish()
}

/// Perform HKDF with HMAC-SHA256, as described in RFC 5869.
pub fn hkdf(
    hmac: &dyn Hmac,
    mut salt: &[u8],
    ikm: &[u8],
    info: &[u8],
    out_len: usize,
) -> Result<Vec<u8>, Error> {
    // HDKF extract
    if salt.is_empty() {
        salt = &HKDF_EMPTY_SALT[..];
    }
    let prk = zeroize::Zeroizing::new(hmac_sha256(hmac, salt, ikm)?);

    // HKDF expand
    let n = (out_len + SHA256_DIGEST_LEN - 1) / SHA256_DIGEST_LEN;
    if n > 255 {
        return Err(km_err!(UnknownError, "overflow in hkdf"));
    }
    let mut t = zeroize::Zeroizing::new(Vec::new());
    let mut okm = vec_try_with_capacity!(n * SHA256_DIGEST_LEN)?;
    for idx in 0..n as u8 {
        let mut input = zeroize::Zeroizing::new(vec_try_with_capacity!(
            t.len() + info.len() + 1
        )?);
        input.extend_from_slice(&t);
        input.extend_from_slice(info);
        input.push(idx + 1);
        t = zeroize::Zeroizing::new(hmac_sha256(hmac, &prk, &input)?);
        okm.try_extend_from_slice(&t)?;
    }
    okm.truncate(out_len);
    Ok(okm)
}

/// Any HMAC implementation also provides HKDF.
impl<T: Hmac> Hkdf for T {
    fn hkdf(&self, salt: &[u8], ikm: &[u8], info: &[u8], out_len: usize) -> Result<Vec<u8>, Error> {
        hkdf(self, salt, ikm, info, out_len)
    }
}
