//! Functionality related to RSA.

use crate::{try_to_vec, wire::keymint::Digest, Error};
use alloc::vec::Vec;
use zeroize::ZeroizeOnDrop;

/// An RSA key, in the form of an ASN.1 DER encoding of an PKCS#1 `RSAPrivateKey` structure,
/// as specified by RFC 3447 sections A.1.2 and 3.2:
///
/// ```asn1
/// RSAPrivateKey ::= SEQUENCE {
///     version           Version,
///     modulus           INTEGER,  -- n
///     publicExponent    INTEGER,  -- e
///     privateExponent   INTEGER,  -- d
///     prime1            INTEGER,  -- p
///     prime2            INTEGER,  -- q
///     exponent1         INTEGER,  -- d mod (p-1)
///     exponent2         INTEGER,  -- d mod (q-1)
///     coefficient       INTEGER,  -- (inverse of q) mod p
///     otherPrimeInfos   OtherPrimeInfos OPTIONAL
/// }
/// ```
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Key(pub Vec<u8>);

impl Key {
    /// Create a new RSA key from DER-encoded data.
    pub fn new_from(data: &[u8]) -> Result<Key, Error> {
        Ok(Key(try_to_vec(data)?))
    }
}

/// RSA decryption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptionMode {
    NoPadding,
    OaepPadding { msg_digest: Digest, mgf_digest: Digest },
    Pkcs1_1_5Padding,
}
