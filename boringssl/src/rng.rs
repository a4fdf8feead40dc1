use openssl::sha::Sha256;
use tkm_common::{crypto, crypto::SHA256_DIGEST_LEN, km_err, Error};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Largest amount of entropy accepted in a single [`crypto::Rng::add_entropy`] call.
pub const MAX_ENTROPY_INPUT: usize = 2048;

/// [`crypto::Rng`] implementation based on BoringSSL/OpenSSL.
///
/// The `openssl` crate does not expose `RAND_add()`, so added entropy is folded into a local
/// SHA-256 pool, and the output of `RAND_bytes()` is XORed with a keystream derived from that
/// pool.
#[derive(Default, ZeroizeOnDrop)]
pub struct BoringRng {
    pool: [u8; SHA256_DIGEST_LEN],
    counter: u64,
}

impl crypto::Rng for BoringRng {
    fn add_entropy(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > MAX_ENTROPY_INPUT {
            return Err(km_err!(
                InvalidInputLength,
                "entropy input of {} bytes exceeds {}",
                data.len(),
                MAX_ENTROPY_INPUT
            ));
        }
        let mut hasher = Sha256::new();
        hasher.update(&self.pool);
        hasher.update(data);
        self.pool = hasher.finish();
        Ok(())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        openssl::rand::rand_bytes(dest).unwrap(); // safe: RAND_bytes() only fails if unseeded
        for chunk in dest.chunks_mut(SHA256_DIGEST_LEN) {
            let mut hasher = Sha256::new();
            hasher.update(&self.pool);
            hasher.update(&self.counter.to_be_bytes());
            self.counter = self.counter.wrapping_add(1);
            let mut keystream = hasher.finish();
            for (d, k) in chunk.iter_mut().zip(keystream.iter()) {
                *d ^= k;
            }
            keystream.zeroize();
        }
    }
}
