use tkm_common::crypto;

/// Constant time comparator based on BoringSSL/OpenSSL.
#[derive(Clone)]
pub struct BoringEq;

impl crypto::ConstTimeEq for BoringEq {
    fn eq(&self, left: &[u8], right: &[u8]) -> bool {
        if left.len() != right.len() {
            return false;
        }
        openssl::memcmp::eq(left, right)
    }
}
