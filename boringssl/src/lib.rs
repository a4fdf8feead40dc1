//! Implementations of [`tkm_common::crypto`] traits based on BoringSSL/OpenSSL.

#![no_std]

extern crate alloc;

use log::error;
use openssl::hash::MessageDigest;
use tkm_wire::keymint::{Digest, ErrorCode};

pub mod aes;
pub mod eq;
pub mod hmac;
pub mod rng;
pub mod rsa;


/// Map an OpenSSL `ErrorStack` into a KeyMaster [`ErrorCode`] value.
pub(crate) fn map_openssl_errstack(errs: &openssl::error::ErrorStack) -> ErrorCode {
    let errors = errs.errors();
    if errors.is_empty() {
        error!("OpenSSL error requested but none available!");
        return ErrorCode::UnknownError;
    }
    let err = &errors[0]; // safe: length checked above
    map_openssl_err(err)
}

/// Map a single OpenSSL error into a KeyMaster [`ErrorCode`] value.  The library reason codes
/// are not stable across OpenSSL and BoringSSL, so every error maps to the generic code.
pub(crate) fn map_openssl_err(_err: &openssl::error::Error) -> ErrorCode {
    ErrorCode::UnknownError
}

/// Macro to auto-generate error mapping around invocations of `openssl` methods.
/// An invocation like:
///
/// ```ignore
/// let x = ossl!(y.func(a, b))?;
/// ```
///
/// will map to:
///
/// ```ignore
/// let x = y.func(a, b).map_err(openssl_err!("failed to perform: y.func(a, b)"))?;
/// ```
#[macro_export]
macro_rules! ossl {
    { $e:expr } => {
        $e.map_err(openssl_err!(concat!("failed to perform: ", stringify!($e))))
    }
}

/// Macro to emit a closure that builds an [`Error::Hal`] instance, based on an
/// openssl `ErrorStack` together with a format-like message.
///
/// [`Error::Hal`]: tkm_common::Error::Hal
#[macro_export]
macro_rules! openssl_err {
    { $($arg:tt)+ } => {
        |e| tkm_common::Error::Hal(
            $crate::map_openssl_errstack(&e),
            alloc::format!("{}:{}: {}: {:?}", file!(), line!(), format_args!($($arg)+), e)
        )
    };
}

/// Macro to emit a closure that builds an [`Error::Hal`] instance, based on an openssl `ErrorStack`
/// together with a format-like message, plus default `ErrorCode` to be used if no OpenSSL error is
/// available.
///
/// [`Error::Hal`]: tkm_common::Error::Hal
#[macro_export]
macro_rules! openssl_err_or {
    { $default:ident, $($arg:tt)+ } => {
        |e| {
            let errors = e.errors();
            let errcode = if errors.is_empty() {
                tkm_wire::keymint::ErrorCode::$default
            } else {
                $crate::map_openssl_err(&errors[0]) // safe: length checked above
            };
            tkm_common::Error::Hal(
                errcode,
                alloc::format!("{}:{}: {}: {:?}", file!(), line!(), format_args!($($arg)+), e)
            )
        }
    };
}

/// Translate a [`Digest`] into an OpenSSL [`MessageDigest`].
fn digest_into_openssl(digest: Digest) -> Option<MessageDigest> {
    match digest {
        Digest::None => None,
        Digest::Md5 => Some(MessageDigest::md5()),
        Digest::Sha1 => Some(MessageDigest::sha1()),
        Digest::Sha224 => Some(MessageDigest::sha224()),
        Digest::Sha256 => Some(MessageDigest::sha256()),
        Digest::Sha384 => Some(MessageDigest::sha384()),
        Digest::Sha512 => Some(MessageDigest::sha512()),
    }
}
