//! Functionality related to elliptic curve keys.

use crate::{km_err, try_to_vec, wire::keymint::EcCurve, wire::KeySizeInBits, Error};
use alloc::vec::Vec;
use zeroize::ZeroizeOnDrop;

/// An EC private key.  For the NIST curves this is the ASN.1 DER encoding of an `ECPrivateKey`
/// structure, as described in RFC 5915 section 3:
///
/// ```asn1
/// ECPrivateKey ::= SEQUENCE {
///   version        INTEGER { ecPrivkeyVer1(1) } (ecPrivkeyVer1),
///   privateKey     OCTET STRING,
///   parameters [0] ECParameters {{ NamedCurve }} OPTIONAL,
///   publicKey  [1] BIT STRING OPTIONAL
/// }
/// ```
///
/// For curve 25519 it is the raw 32-byte private key.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Key(pub Vec<u8>);

impl Key {
    /// Create a new EC key from data.
    pub fn new_from(data: &[u8]) -> Result<Key, Error> {
        Ok(Key(try_to_vec(data)?))
    }
}

/// Return the NIST curve that corresponds to a key size in bits.  Older key blobs record only the
/// key size for EC keys.
pub fn key_size_to_curve(key_size: KeySizeInBits) -> Result<EcCurve, Error> {
    match key_size.0 {
        224 => Ok(EcCurve::P224),
        256 => Ok(EcCurve::P256),
        384 => Ok(EcCurve::P384),
        521 => Ok(EcCurve::P521),
        v => Err(km_err!(UnsupportedKeySize, "no EC curve of size {} bits", v)),
    }
}
