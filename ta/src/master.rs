//! Derivation of the device master key that protects key blobs.

use crate::device::{HwKey, HwKeySession};
use alloc::vec::Vec;
use log::error;
use tkm_common::{km_err, vec_try, Error};
use zeroize::Zeroizing;


/// Size of the master key in bytes.
pub const MASTER_KEY_SIZE: usize = if cfg!(feature = "wrapping-key-32") { 32 } else { 16 };

/// Label passed to the hardware key service, zero-padded to [`MASTER_KEY_SIZE`].
const MASTER_KEY_LABEL: &[u8] = b"KeymasterMaster";

const MASTER_KEY_KDF_VERSION: u32 = 1;

/// Open session with the hardware key service, closed on drop.
struct Session<'a> {
    hw_key: &'a dyn HwKey,
    handle: HwKeySession,
}

impl<'a> Session<'a> {
    fn open(hw_key: &'a dyn HwKey) -> Result<Self, Error> {
        let handle = hw_key.open().map_err(|e| {
            error!("failed to connect to hardware key service: {:?}", e);
            km_err!(UnknownError, "generic secure-hardware error")
        })?;
        Ok(Self { hw_key, handle })
    }
}

impl<'a> Drop for Session<'a> {
    fn drop(&mut self) {
        self.hw_key.close(self.handle);
    }
}

/// Derive the master key from the hardware key service.
pub(crate) fn derive_master_key(hw_key: &dyn HwKey) -> Result<Zeroizing<Vec<u8>>, Error> {
    let session = Session::open(hw_key)?;

    let mut label = vec_try![0u8; MASTER_KEY_SIZE]?;
    label[..MASTER_KEY_LABEL.len()].copy_from_slice(MASTER_KEY_LABEL);

    let mut key = Zeroizing::new(vec_try![0u8; MASTER_KEY_SIZE]?);
    hw_key.derive(session.handle, MASTER_KEY_KDF_VERSION, &label, &mut key).map_err(|e| {
        error!("failed to derive master key: {:?}", e);
        km_err!(UnknownError, "generic secure-hardware error")
    })?;
    Ok(key)
}
