//! Functionality related to AES encryption

use crate::{km_err, wire::KeySizeInBits, Error};
use core::convert::TryInto;
use zeroize::ZeroizeOnDrop;

/// Size of an AES block in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Size of AES-GCM nonce in bytes.
pub const GCM_NONCE_SIZE: usize = 12; // 96 bits

/// An AES-128, AES-192 or AES-256 key.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub enum Key {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

impl Key {
    /// Create a new [`Key`] from raw data, which must be 16, 24 or 32 bytes long.
    pub fn new_from(data: &[u8]) -> Result<Self, Error> {
        match data.len() {
            16 => Ok(Key::Aes128(data.try_into().unwrap())), // safe: len checked
            24 => Ok(Key::Aes192(data.try_into().unwrap())), // safe: len checked
            32 => Ok(Key::Aes256(data.try_into().unwrap())), // safe: len checked
            l => Err(km_err!(UnsupportedKeySize, "AES keys must be 16, 24 or 32 bytes not {}", l)),
        }
    }

    /// Indicate the size of the key in bits.
    pub fn size(&self) -> KeySizeInBits {
        KeySizeInBits(match self {
            Key::Aes128(_) => 128,
            Key::Aes192(_) => 192,
            Key::Aes256(_) => 256,
        })
    }

    /// Return the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Key::Aes128(k) => k,
            Key::Aes192(k) => k,
            Key::Aes256(k) => k,
        }
    }
}

/// Mode of AES-GCM operation.  Associated value is the nonce.
#[derive(Clone, Copy, Debug)]
pub enum GcmMode {
    GcmTag12 { nonce: [u8; GCM_NONCE_SIZE] },
    GcmTag13 { nonce: [u8; GCM_NONCE_SIZE] },
    GcmTag14 { nonce: [u8; GCM_NONCE_SIZE] },
    GcmTag15 { nonce: [u8; GCM_NONCE_SIZE] },
    GcmTag16 { nonce: [u8; GCM_NONCE_SIZE] },
}

impl GcmMode {
    /// Determine the GCM mode from a nonce and a tag length in bits.
    pub fn new(nonce: &[u8], mac_len_bits: u32) -> Result<Self, Error> {
        let nonce: [u8; GCM_NONCE_SIZE] = nonce
            .try_into()
            .map_err(|_e| km_err!(InvalidNonce, "want {} byte nonce", GCM_NONCE_SIZE))?;
        match mac_len_bits {
            96 => Ok(GcmMode::GcmTag12 { nonce }),
            104 => Ok(GcmMode::GcmTag13 { nonce }),
            112 => Ok(GcmMode::GcmTag14 { nonce }),
            120 => Ok(GcmMode::GcmTag15 { nonce }),
            128 => Ok(GcmMode::GcmTag16 { nonce }),
            v => Err(km_err!(UnsupportedMacLength, "want 96-128 bit tag len, got {}", v)),
        }
    }

    /// Return the tag length (in bytes) for an AES-GCM mode.
    pub fn tag_len(&self) -> usize {
        match self {
            GcmMode::GcmTag12 { nonce: _ } => 12,
            GcmMode::GcmTag13 { nonce: _ } => 13,
            GcmMode::GcmTag14 { nonce: _ } => 14,
            GcmMode::GcmTag15 { nonce: _ } => 15,
            GcmMode::GcmTag16 { nonce: _ } => 16,
        }
    }

    /// Return the nonce for an AES-GCM mode.
    pub fn nonce(&self) -> &[u8; GCM_NONCE_SIZE] {
        match self {
            GcmMode::GcmTag12 { nonce }
            | GcmMode::GcmTag13 { nonce }
            | GcmMode::GcmTag14 { nonce }
            | GcmMode::GcmTag15 { nonce }
            | GcmMode::GcmTag16 { nonce } => nonce,
        }
    }
}
