//! Functionality for the Trusty KeyMaster context that is shared between the TA core, the crypto
//! backend and the test tooling.

#![no_std]
extern crate alloc;

use alloc::{collections::TryReserveError, string::String, vec::Vec};
use wire::keymint::ErrorCode;

/// Re-export of the wire types crate, so that the exported macros can refer to
/// `$crate::wire::...`.
pub use tkm_wire as wire;

pub mod crypto;
pub mod keyblob;
pub mod tag;

/// General error type.
#[derive(Debug)]
pub enum Error {
    /// Failure with a specific KeyMaster error code and diagnostic message.
    Hal(ErrorCode, String),
    /// Failed to allocate memory.
    Alloc(&'static str),
    /// Failure to parse or emit DER.
    Der(der::ErrorKind),
}

// The following macros for error generation allow the message portion to be automatically
// compiled out in future, avoiding potential information leakage and allocation.

/// Macro to build an [`Error::Hal`] instance for a specific [`ErrorCode`] value known at compile time:
/// `km_err!(InvalidTag, "some {} format", arg)`.
#[macro_export]
macro_rules! km_err {
    { $error_code:ident, $($arg:tt)+ } => {
        $crate::Error::Hal($crate::wire::keymint::ErrorCode::$error_code,
                           alloc::format!("{}:{}: {}", file!(), line!(), format_args!($($arg)+))) };
}

/// Macro to build an [`Error::Hal`] instance:
/// `km_verr!(rc, "some {} format", arg)`.
#[macro_export]
macro_rules! km_verr {
    { $error_code:expr, $($arg:tt)+ } => {
        $crate::Error::Hal($error_code,
                           alloc::format!("{}:{}: {}", file!(), line!(), format_args!($($arg)+))) };
}

impl From<Error> for ErrorCode {
    fn from(e: Error) -> Self {
        match e {
            Error::Hal(e, _msg) => e,
            Error::Alloc(_msg) => ErrorCode::MemoryAllocationFailed,
            Error::Der(_) => ErrorCode::InvalidArgument,
        }
    }
}

impl From<der::Error> for Error {
    fn from(e: der::Error) -> Self {
        Error::Der(e.kind())
    }
}

impl From<TryReserveError> for Error {
    fn from(_e: TryReserveError) -> Self {
        Error::Alloc("allocation of Vec failed")
    }
}

/// Macro to allocate a `Vec<T>` with the given length reserved, detecting allocation failure.
#[macro_export]
macro_rules! vec_try_with_capacity {
    { $len:expr } => {
        {
            let mut v = alloc::vec::Vec::new();
            match v.try_reserve($len) {
                Err(_e) => Err($crate::Error::Alloc("allocation of Vec failed")),
                Ok(_) => Ok(v),
            }
        }
    }
}

/// Macro that mimics `vec!` but which detects allocation failure.
#[macro_export]
macro_rules! vec_try {
    { $elem:expr ; $len:expr } => {
        {
            let len = $len;
            let mut v = alloc::vec::Vec::new();
            match v.try_reserve(len) {
                Err(_e) => Err($crate::Error::Alloc("allocation of Vec failed")),
                Ok(_) => {
                    v.resize(len, $elem);
                    Ok(v)
                }
            }
        }
    };
    { $($x:expr),* $(,)? } => {
        {
            let mut v = alloc::vec::Vec::new();
            let len = [$(stringify!($x)),*].len();
            match v.try_reserve(len) {
                Err(_e) => Err($crate::Error::Alloc("allocation of Vec failed")),
                Ok(_) => {
                    $( v.push($x); )*
                    Ok(v)
                }
            }
        }
    };
}

/// Fallible equivalents of the growing methods of `Vec`.
pub trait FallibleAllocExt<T> {
    /// Try to add the given value to the end of the collection.
    fn try_push(&mut self, value: T) -> Result<(), Error>;
    /// Try to extend the collection with the contents of a slice.
    fn try_extend_from_slice(&mut self, other: &[T]) -> Result<(), Error>
    where
        T: Clone;
}

impl<T> FallibleAllocExt<T> for Vec<T> {
    fn try_push(&mut self, value: T) -> Result<(), Error> {
        self.try_reserve(1)?;
        self.push(value);
        Ok(())
    }
    fn try_extend_from_slice(&mut self, other: &[T]) -> Result<(), Error>
    where
        T: Clone,
    {
        self.try_reserve(other.len())?;
        self.extend_from_slice(other);
        Ok(())
    }
}

/// Copy a slice into a newly allocated `Vec`, detecting allocation failure.
pub fn try_to_vec<T: Clone>(s: &[T]) -> Result<Vec<T>, Error> {
    let mut v = vec_try_with_capacity!(s.len())?;
    v.extend_from_slice(s);
    Ok(v)
}

/// Check for an expected error.
#[macro_export]
macro_rules! expect_err {
    ($result:expr, $err_msg:expr) => {
        assert!(
            $result.is_err(),
            "Expected error containing '{}', got success {:?}",
            $err_msg,
            $result
        );
        let err = $result.err();
        assert!(
            alloc::format!("{:?}", err).contains($err_msg),
            "Unexpected error {:?}, doesn't contain '{}'",
            err,
            $err_msg
        );
    };
}
