use crate::{digest_into_openssl, openssl_err, ossl};
use alloc::boxed::Box;
use alloc::vec::Vec;
use openssl::hash::MessageDigest;
use tkm_common::{crypto, km_err, Error, FallibleAllocExt};
use tkm_wire::keymint::Digest;
use zeroize::Zeroizing;

/// [`crypto::Hmac`] implementation based on BoringSSL/OpenSSL.
pub struct BoringHmac;

impl crypto::Hmac for BoringHmac {
    fn begin(
        &self,
        key: crypto::hmac::Key,
        digest: Digest,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        let md = digest_into_openssl(digest)
            .ok_or_else(|| km_err!(UnsupportedDigest, "no digest for HMAC"))?;
        Ok(Box::new(BoringHmacOperation { key, md, pending_input: Zeroizing::new(Vec::new()) }))
    }
}

/// HMAC operation based on BoringSSL/OpenSSL.
///
/// [`openssl::sign::Signer`] borrows its key, so input is accumulated and the MAC is computed
/// in one shot by `finish()`.
pub struct BoringHmacOperation {
    key: crypto::hmac::Key,
    md: MessageDigest,
    pending_input: Zeroizing<Vec<u8>>,
}

impl crypto::AccumulatingOperation for BoringHmacOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.pending_input.try_extend_from_slice(data)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        let pkey = ossl!(openssl::pkey::PKey::hmac(&self.key.0))?;
        let mut signer = ossl!(openssl::sign::Signer::new(self.md, &pkey))?;
        signer
            .sign_oneshot_to_vec(&self.pending_input)
            .map_err(openssl_err!("failed to HMAC {} bytes", self.pending_input.len()))
    }
}
