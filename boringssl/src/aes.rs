use crate::{openssl_err, openssl_err_or, ossl};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cmp::min;
use openssl::symm::{Cipher, Crypter};
use tkm_common::{crypto, km_err, vec_try, vec_try_with_capacity, Error, FallibleAllocExt};

/// [`crypto::Aes`] implementation based on BoringSSL/OpenSSL.
pub struct BoringAes;

impl crypto::Aes for BoringAes {
    fn begin_aead(
        &self,
        key: crypto::aes::Key,
        mode: crypto::aes::GcmMode,
        dir: crypto::SymmetricOperation,
    ) -> Result<Box<dyn crypto::AadOperation>, Error> {
        let dir_mode = match dir {
            crypto::SymmetricOperation::Encrypt => openssl::symm::Mode::Encrypt,
            crypto::SymmetricOperation::Decrypt => openssl::symm::Mode::Decrypt,
        };
        let (cipher, raw_key) = match &key {
            crypto::aes::Key::Aes128(k) => (Cipher::aes_128_gcm(), &k[..]),
            crypto::aes::Key::Aes192(k) => (Cipher::aes_192_gcm(), &k[..]),
            crypto::aes::Key::Aes256(k) => (Cipher::aes_256_gcm(), &k[..]),
        };
        let crypter = Crypter::new(cipher, dir_mode, raw_key, Some(&mode.nonce()[..])).map_err(
            openssl_err!("failed to create GCM Crypter for {:?} {:?}", key.size(), dir),
        )?;

        Ok(match dir {
            crypto::SymmetricOperation::Encrypt => {
                Box::new(BoringAesGcmEncryptOperation { tag_len: mode.tag_len(), crypter })
            }
            crypto::SymmetricOperation::Decrypt => Box::new(BoringAesGcmDecryptOperation {
                crypter,
                decrypt_tag_len: mode.tag_len(),
                pending_input_tail: vec_try_with_capacity!(mode.tag_len())?,
            }),
        })
    }
}

/// AES-GCM encryption operation; the tag is appended to the output of `finish()`.
pub struct BoringAesGcmEncryptOperation {
    tag_len: usize,
    crypter: Crypter,
}

impl crypto::AadOperation for BoringAesGcmEncryptOperation {
    fn update_aad(&mut self, aad: &[u8]) -> Result<(), Error> {
        ossl!(self.crypter.aad_update(aad))
    }
}

impl crypto::EmittingOperation for BoringAesGcmEncryptOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut output = vec_try![0; data.len() + crypto::aes::BLOCK_SIZE]?;
        let out_len = self
            .crypter
            .update(data, &mut output)
            .map_err(openssl_err!("update {} bytes from input failed", data.len()))?;
        output.truncate(out_len);
        Ok(output)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, Error> {
        let mut output = vec_try![0; crypto::aes::BLOCK_SIZE + self.tag_len]?;
        let offset = self
            .crypter
            .finalize(&mut output)
            .map_err(openssl_err_or!(VerificationFailed, "failed to finalize"))?;

        self.crypter
            .get_tag(&mut output[offset..offset + self.tag_len])
            .map_err(openssl_err!("failed to get tag of len {}", self.tag_len))?;
        output.truncate(offset + self.tag_len);
        Ok(output)
    }
}

/// AES-GCM decryption operation; the input is expected to end with the tag.
pub struct BoringAesGcmDecryptOperation {
    crypter: Crypter,

    // Size of the final tag.
    decrypt_tag_len: usize,

    // The last `decrypt_tag_len` bytes of input must be fed in separately, but the overall size of
    // the input is not known in advance, so hold up to `decrypt_tag_len` bytes in reserve until
    // `finish()`.
    pending_input_tail: Vec<u8>, // Capacity = decrypt_tag_len
}

impl crypto::AadOperation for BoringAesGcmDecryptOperation {
    fn update_aad(&mut self, aad: &[u8]) -> Result<(), Error> {
        ossl!(self.crypter.aad_update(aad))
    }
}

impl crypto::EmittingOperation for BoringAesGcmDecryptOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        // The current input is the (self.pending_input_tail || data) combination.
        let combined_len = self.pending_input_tail.len() + data.len();
        if combined_len <= self.decrypt_tag_len {
            self.pending_input_tail.try_extend_from_slice(data)?;
            return Ok(Vec::new());
        }

        // Feed everything except the last `decrypt_tag_len` bytes into the cipher.
        let cipherable_len = combined_len - self.decrypt_tag_len;
        let cipherable_from_pending = min(cipherable_len, self.pending_input_tail.len());
        let cipherable_from_data = cipherable_len - cipherable_from_pending;

        let mut output = vec_try![0; cipherable_len + crypto::aes::BLOCK_SIZE]?;
        let mut offset = 0;
        if cipherable_from_pending > 0 {
            offset = self
                .crypter
                .update(&self.pending_input_tail[..cipherable_from_pending], &mut output)
                .map_err(openssl_err!(
                    "update {} bytes from pending failed",
                    cipherable_from_pending
                ))?;
        }
        if cipherable_from_data > 0 {
            let out_len = self
                .crypter
                .update(&data[..cipherable_from_data], &mut output[offset..])
                .map_err(openssl_err!("update {} bytes from input failed", cipherable_from_data))?;
            offset += out_len;
        }
        output.truncate(offset);

        // Reset `self.pending_input_tail` to the unused data.
        let leftover_pending = self.pending_input_tail.len() - cipherable_from_pending;
        self.pending_input_tail.resize(self.decrypt_tag_len, 0);
        self.pending_input_tail.copy_within(cipherable_from_pending.., 0);
        self.pending_input_tail[leftover_pending..].copy_from_slice(&data[cipherable_from_data..]);

        Ok(output)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, Error> {
        if self.pending_input_tail.len() != self.decrypt_tag_len {
            return Err(km_err!(
                InvalidTag,
                "only {} bytes of pending data, need {}",
                self.pending_input_tail.len(),
                self.decrypt_tag_len
            ));
        }
        self.crypter.set_tag(&self.pending_input_tail).map_err(openssl_err!(
            "failed to set {} bytes of tag",
            self.pending_input_tail.len()
        ))?;

        // Feeding in just the tag should not result in any output data.
        let mut output = vec_try![0; crypto::aes::BLOCK_SIZE]?;
        let out_len = self
            .crypter
            .finalize(&mut output)
            .map_err(openssl_err_or!(VerificationFailed, "failed to finalize"))?;
        if out_len != 0 {
            return Err(km_err!(
                UnknownError,
                "finalizing AES-GCM tag produced {} bytes of data!",
                out_len
            ));
        }
        Ok(Vec::new())
    }
}
