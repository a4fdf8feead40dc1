//! Secure import of keys wrapped for this device.

use crate::{keys::Key, TrustyKeymasterContext};
use alloc::vec::Vec;
use core::convert::TryFrom;
use der::{
    asn1::{AnyRef, Null, OctetStringRef},
    Decode, Encode, Sequence, Tagged,
};
use log::error;
use tkm_common::{
    crypto::{aes, KeyMaterial, SymmetricOperation},
    km_err,
    tag::{self, param_from_raw, RawValue},
    try_to_vec, vec_try, vec_try_with_capacity, Error, FallibleAllocExt,
};
use tkm_wire::keymint::{
    tag_type, Algorithm, BlockMode, ErrorCode, KeyFormat, KeyParam, PaddingMode, Tag, TagType,
};
use tkm_wire::KeySizeInBits;
use zeroize::Zeroizing;


/// Contents of wrapped key data.
///
/// ```asn1
/// SecureKeyWrapper ::= SEQUENCE {
///     version                   INTEGER, # Value 0
///     encryptedTransportKey     OCTET_STRING,
///     initializationVector      OCTET_STRING,
///     keyDescription            KeyDescription,
///     encryptedKey              OCTET_STRING,
///     tag                       OCTET_STRING,
/// }
/// ```
///
/// The key description is kept as raw DER, as its encoding is the additional data for the
/// decryption of the imported key.
#[derive(Debug, Clone, Sequence)]
pub struct SecureKeyWrapper<'a> {
    pub version: i32,
    #[asn1(type = "OCTET STRING")]
    pub encrypted_transport_key: &'a [u8],
    #[asn1(type = "OCTET STRING")]
    pub initialization_vector: &'a [u8],
    pub key_description: AnyRef<'a>,
    #[asn1(type = "OCTET STRING")]
    pub encrypted_key: &'a [u8],
    #[asn1(type = "OCTET STRING")]
    pub tag: &'a [u8],
}

const SECURE_KEY_WRAPPER_VERSION: i32 = 0;

/// Contents of key description.
///
/// ```asn1
/// KeyDescription ::= SEQUENCE {
///     keyFormat    INTEGER, # Values from KeyFormat enum
///     keyParams    AuthorizationList,
/// }
/// ```
#[derive(Debug, Clone, Sequence)]
pub struct KeyDescription<'a> {
    pub key_format: i32,
    pub key_params: AnyRef<'a>,
}

impl<'a> KeyDescription<'a> {
    /// Decode the authorization list carried in the key description.
    pub fn authorizations(&self) -> Result<Vec<KeyParam>, Error> {
        if self.key_params.tag() != der::Tag::Sequence {
            return Err(asn1_err("expected SEQUENCE"));
        }
        decode_authorization_list(self.key_params.value())
    }
}

/// Size of the AES-256 transport key.
const TRANSPORT_KEY_SIZE: usize = 32;

/// Size of the AES-GCM tag protecting the imported key, in bits.
const TRANSPORT_MAC_LEN_BITS: u32 = 128;

/// A key recovered from a [`SecureKeyWrapper`], ready to be imported.
#[derive(Debug)]
pub struct UnwrappedKey {
    /// Authorizations from the key description.
    pub key_params: Vec<KeyParam>,
    pub key_format: KeyFormat,
    pub key_material: Zeroizing<Vec<u8>>,
}

impl<'a> TrustyKeymasterContext<'a> {
    /// Recover a key wrapped for secure import.
    ///
    /// The transport key is encrypted under the RSA wrapping key held in `wrapping_key_blob`
    /// and XOR-masked with `masking_key`; it in turn protects the imported key with AES-GCM.
    pub fn unwrap_key(
        &self,
        wrapped_key_data: &[u8],
        wrapping_key_blob: &[u8],
        wrapping_key_params: &[KeyParam],
        masking_key: &[u8],
    ) -> Result<UnwrappedKey, Error> {
        let wrapping_key = self.parse_key_blob(wrapping_key_blob, wrapping_key_params, false)?;
        let chars = tag::union(&wrapping_key.hw_enforced, &wrapping_key.sw_enforced)?;
        let decrypt_mode = tag::check_rsa_wrapping_key_params(&chars, wrapping_key_params)?;
        let rsa_key = match &wrapping_key.material {
            KeyMaterial::Rsa(key) => key.clone(),
            other => {
                return Err(km_err!(
                    IncompatibleAlgorithm,
                    "wrapping key is {:?}, not RSA",
                    other.algorithm()
                ))
            }
        };

        let wrapper = SecureKeyWrapper::from_der(wrapped_key_data)?;
        if wrapper.version != SECURE_KEY_WRAPPER_VERSION {
            return Err(km_err!(
                InvalidArgument,
                "invalid version {} in wrapped key",
                wrapper.version
            ));
        }
        let key_description_der = wrapper.key_description.to_der()?;
        let key_description = KeyDescription::from_der(&key_description_der)?;
        let key_params = key_description.authorizations()?;
        let key_format = KeyFormat::try_from(key_description.key_format).map_err(|_e| {
            km_err!(UnsupportedKeyFormat, "unknown key format {}", key_description.key_format)
        })?;

        // Decrypt and unmask the transport key.
        let op = self.imp.rsa.begin_decrypt(rsa_key, decrypt_mode)?;
        let masked_transport_key =
            Zeroizing::new(op.finish_with(wrapper.encrypted_transport_key)?);
        if masked_transport_key.len() != masking_key.len() {
            return Err(km_err!(
                InvalidArgument,
                "masked transport key is {} bytes, but masking key is {} bytes",
                masked_transport_key.len(),
                masking_key.len()
            ));
        }
        let transport_key: Zeroizing<Vec<u8>> = Zeroizing::new(
            masked_transport_key.iter().zip(masking_key).map(|(x, y)| x ^ y).collect(),
        );

        let aes_key = self.load_transport_key(&transport_key, wrapper.initialization_vector)?;
        let mode = aes::GcmMode::new(wrapper.initialization_vector, TRANSPORT_MAC_LEN_BITS)?;
        let mut op = self.imp.aes.begin_aead(aes_key, mode, SymmetricOperation::Decrypt)?;
        op.update_aad(&key_description_der)?;

        let mut input =
            vec_try_with_capacity!(wrapper.encrypted_key.len() + wrapper.tag.len())?;
        input.extend_from_slice(wrapper.encrypted_key);
        input.extend_from_slice(wrapper.tag);
        let mut key_material = Zeroizing::new(op.update(&input)?);
        let trailer = Zeroizing::new(op.finish().map_err(|e| {
            error!("imported key failed to verify: {:?}", e);
            km_err!(VerificationFailed, "imported key failed to verify")
        })?);
        key_material.try_extend_from_slice(&trailer)?;

        Ok(UnwrappedKey { key_params, key_format, key_material })
    }

    /// Materialize the transport key through the AES key factory.
    fn load_transport_key(&self, transport_key: &[u8], iv: &[u8]) -> Result<aes::Key, Error> {
        if transport_key.len() != TRANSPORT_KEY_SIZE {
            return Err(km_err!(
                InvalidArgument,
                "transport key is {} bytes, want {}",
                transport_key.len(),
                TRANSPORT_KEY_SIZE
            ));
        }
        if iv.len() != aes::GCM_NONCE_SIZE {
            return Err(km_err!(
                InvalidNonce,
                "IV is {} bytes, want {}",
                iv.len(),
                aes::GCM_NONCE_SIZE
            ));
        }
        let nonce = try_to_vec(iv)?;
        let hw_enforced = vec_try![
            KeyParam::Algorithm(Algorithm::Aes),
            KeyParam::KeySize(KeySizeInBits(256)),
            KeyParam::Padding(PaddingMode::None),
            KeyParam::BlockMode(BlockMode::Gcm),
            KeyParam::Nonce(nonce.clone()),
            KeyParam::MinMacLength(TRANSPORT_MAC_LEN_BITS),
        ]?;
        let gcm_params = vec_try![
            KeyParam::Padding(PaddingMode::None),
            KeyParam::BlockMode(BlockMode::Gcm),
            KeyParam::Nonce(nonce),
            KeyParam::MacLength(TRANSPORT_MAC_LEN_BITS),
        ]?;
        let Key { material, .. } = self.key_factory(Algorithm::Aes)?.load_key(
            transport_key,
            &gcm_params,
            hw_enforced,
            Vec::new(),
        )?;
        match material {
            KeyMaterial::Aes(key) => Ok(key),
            other => {
                error!("AES key factory produced {:?}", other);
                Err(km_err!(UnknownError, "transport key has wrong type"))
            }
        }
    }
}

/// ASN.1 identifier octet bits for a constructed, context-specific element.
const CONTEXT_CONSTRUCTED: u8 = 0xa0;

/// Mask for the class and constructed bits of an identifier octet.
const CLASS_MASK: u8 = 0xe0;

/// Identifier octet of a `SET` / `SET OF`.
const SET_IDENTIFIER: u8 = 0x31;

/// Tag types, in the order used to resolve a bare tag number.
const TAG_TYPES: [TagType; 10] = [
    TagType::Enum,
    TagType::EnumRep,
    TagType::Uint,
    TagType::UintRep,
    TagType::Ulong,
    TagType::Date,
    TagType::Bool,
    TagType::Bignum,
    TagType::Bytes,
    TagType::UlongRep,
];

/// A single BER/DER element.
struct Tlv<'a> {
    /// First identifier octet.
    identifier: u8,
    /// Tag number, decoded from the high-tag-number form if needed.
    number: u32,
    /// Contents octets.
    contents: &'a [u8],
    /// The complete encoding, header included.
    encoded: &'a [u8],
}

fn asn1_err(msg: &str) -> Error {
    km_err!(InvalidArgument, "malformed authorization list: {}", msg)
}

/// Read one element from the start of `data`, advancing past it.
///
/// The `der` crate only handles tag numbers up to 30, whereas authorization list entries are
/// tagged with the (much larger) KeyMint tag number.
fn read_tlv<'a>(data: &mut &'a [u8]) -> Result<Tlv<'a>, Error> {
    let all: &'a [u8] = data;
    let mut pos = 0;
    let mut next = |what: &str| -> Result<u8, Error> {
        let b = *all.get(pos).ok_or_else(|| asn1_err(what))?;
        pos += 1;
        Ok(b)
    };

    let identifier = next("missing identifier")?;
    let mut number = (identifier & 0x1f) as u32;
    if number == 0x1f {
        number = 0;
        loop {
            let b = next("truncated tag number")?;
            if number > 0x00ff_ffff {
                return Err(asn1_err("tag number too large"));
            }
            number = (number << 7) | (b & 0x7f) as u32;
            if b & 0x80 == 0 {
                break;
            }
        }
    }

    let first = next("missing length")?;
    let len = match first {
        l if l < 0x80 => l as usize,
        0x80 => return Err(asn1_err("indefinite length")),
        l => {
            let count = (l & 0x7f) as usize;
            if count > 4 {
                return Err(asn1_err("length too large"));
            }
            let mut len = 0usize;
            for _ in 0..count {
                len = (len << 8) | next("truncated length")? as usize;
            }
            len
        }
    };

    if all.len() - pos < len {
        return Err(asn1_err("contents beyond end of data"));
    }
    let contents = &all[pos..pos + len];
    let encoded = &all[..pos + len];
    *data = &all[pos + len..];
    Ok(Tlv { identifier, number, contents, encoded })
}

/// Find the tag with the given tag number, whatever its type.
fn tag_for_number(number: u32) -> Result<Tag, Error> {
    TAG_TYPES
        .iter()
        .find_map(|tt| Tag::n(((*tt as i32) as u32 | number) as i32))
        .ok_or_else(|| km_err!(InvalidArgument, "unknown tag number {}", number))
}

fn decode_u64(tlv: &Tlv) -> Result<u64, Error> {
    Ok(u64::from_der(tlv.encoded)?)
}

fn decode_u32(tlv: &Tlv) -> Result<u32, Error> {
    let v = decode_u64(tlv)?;
    u32::try_from(v).map_err(|_e| km_err!(InvalidArgument, "value {} out of range", v))
}

/// Decode the contents of a `SET OF INTEGER`.
fn decode_set<T>(tlv: &Tlv, decode: fn(&Tlv) -> Result<T, Error>) -> Result<Vec<T>, Error> {
    if tlv.identifier != SET_IDENTIFIER {
        return Err(asn1_err("expected SET OF"));
    }
    let mut results = Vec::new();
    let mut data = tlv.contents;
    while !data.is_empty() {
        let elem = read_tlv(&mut data)?;
        results.try_push(decode(&elem)?)?;
    }
    Ok(results)
}

/// Decode the contents of a DER `AuthorizationList`, in which each authorization is an
/// `[tag number] EXPLICIT` element holding an `INTEGER`, `NULL`, `OCTET STRING` or, for
/// repeatable tags, `SET OF INTEGER`.
pub fn decode_authorization_list(mut data: &[u8]) -> Result<Vec<KeyParam>, Error> {
    let mut params = Vec::new();
    while !data.is_empty() {
        let field = read_tlv(&mut data)?;
        if field.identifier & CLASS_MASK != CONTEXT_CONSTRUCTED {
            return Err(asn1_err("expected explicitly tagged field"));
        }
        let tag = tag_for_number(field.number)?;
        let mut inner = field.contents;
        let value = read_tlv(&mut inner)?;
        if !inner.is_empty() {
            return Err(asn1_err("trailing data in field"));
        }

        let err = ErrorCode::InvalidArgument;
        match tag_type(tag) {
            TagType::Enum | TagType::Uint => {
                params.try_push(param_from_raw(tag, RawValue::Integer(decode_u32(&value)?), err)?)?
            }
            TagType::Ulong | TagType::Date => {
                params.try_push(param_from_raw(tag, RawValue::Long(decode_u64(&value)?), err)?)?
            }
            TagType::EnumRep | TagType::UintRep => {
                for v in decode_set(&value, decode_u32)? {
                    params.try_push(param_from_raw(tag, RawValue::Integer(v), err)?)?;
                }
            }
            TagType::UlongRep => {
                for v in decode_set(&value, decode_u64)? {
                    params.try_push(param_from_raw(tag, RawValue::Long(v), err)?)?;
                }
            }
            TagType::Bool => {
                Null::from_der(value.encoded)?;
                params.try_push(param_from_raw(tag, RawValue::True, err)?)?;
            }
            TagType::Bytes | TagType::Bignum => {
                let bytes = OctetStringRef::from_der(value.encoded)?;
                params.try_push(param_from_raw(tag, RawValue::Bytes(bytes.as_bytes()), err)?)?;
            }
            TagType::Invalid => return Err(asn1_err("invalid tag")),
        }
    }
    Ok(params)
}
