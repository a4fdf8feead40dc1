//! Newtype wrappers used inside key parameters.

/// Key size in bits.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeySizeInBits(pub u32);

/// RSA exponent.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RsaExponent(pub u64);

/// Marker type indicating failure to convert into an `enum` variant.
#[derive(Debug)]
pub struct ValueNotRecognized;
