//! Attestation keys and certificate issuance.

use crate::{
    device::{AttestationContext, AttestationKeySlot, AttestationSigner, AttestationStorage},
    keys::Key,
    TrustyKeymasterContext,
};
use alloc::vec::Vec;
use log::{error, warn};
use tkm_common::{
    crypto::{AsymmetricKey, KeyMaterial},
    km_err, Error,
};
use tkm_wire::keymint::{Algorithm, Certificate, KeyParam};

/// Return the algorithm recorded in a key's authorizations.
fn key_algorithm(key: &Key) -> Result<Algorithm, Error> {
    key.hw_enforced
        .iter()
        .chain(key.sw_enforced.iter())
        .find_map(|p| match p {
            KeyParam::Algorithm(a) => Some(*a),
            _ => None,
        })
        .ok_or_else(|| km_err!(UnknownError, "key has no algorithm"))
}

/// Return the asymmetric view of a key that is to appear in a certificate.
fn certifiable_key(key: &Key) -> Result<AsymmetricKey, Error> {
    match key_algorithm(key)? {
        Algorithm::Rsa | Algorithm::Ec => {}
        a => return Err(km_err!(IncompatibleAlgorithm, "cannot certify {:?} key", a)),
    }
    key.material.as_asymmetric().ok_or_else(|| {
        km_err!(
            IncompatibleAlgorithm,
            "key material {:?} does not match algorithm",
            key.material.algorithm()
        )
    })
}

impl<'a> TrustyKeymasterContext<'a> {
    /// Run `f` against the attestation storage, falling back to the software store if that is
    /// enabled and the secure store fails.
    fn with_attestation_storage<T>(
        &self,
        f: impl Fn(&dyn AttestationStorage) -> Result<T, Error>,
        usable: impl Fn(&T) -> bool,
    ) -> Result<T, Error> {
        let result = match self.dev.attestation_storage {
            Some(storage) => f(storage),
            None => Err(km_err!(SecureHwCommunicationFailed, "attestation storage unavailable")),
        };
        if !cfg!(feature = "soft-attestation-fallback") {
            return result;
        }
        let ok = matches!(&result, Ok(v) if usable(v));
        match self.dev.soft_attestation {
            Some(soft) if !ok => {
                warn!("secure attestation storage failed, using software attestation keys");
                f(soft)
            }
            _ => result,
        }
    }

    /// Return the device attestation key for keys of the given algorithm.
    pub fn get_attestation_key(&self, algorithm: Algorithm) -> Result<KeyMaterial, Error> {
        let slot = AttestationKeySlot::for_algorithm(algorithm)?;
        self.with_attestation_storage(|s| s.read_key(slot), |_| true).map_err(|e| {
            error!("failed to read attestation key for {:?}: {:?}", slot, e);
            e
        })
    }

    /// Return the certificate chain of the device attestation key for keys of the given
    /// algorithm.
    pub fn get_attestation_chain(&self, algorithm: Algorithm) -> Result<Vec<Certificate>, Error> {
        let slot = AttestationKeySlot::for_algorithm(algorithm)?;
        self.with_attestation_storage(|s| s.read_cert_chain(slot), |chain| !chain.is_empty())
            .map_err(|e| {
                error!("failed to read attestation chain for {:?}: {:?}", slot, e);
                e
            })
    }

    fn attestation_context(&self) -> AttestationContext {
        let (os_version, os_patchlevel) = self.get_system_version();
        AttestationContext { boot: self.get_verified_boot_params(), os_version, os_patchlevel }
    }

    /// Generate an attestation certificate chain for `key`.
    ///
    /// If `attest_key` is given, the certificate is signed by that key and names the given
    /// issuer subject; otherwise it is signed by the device attestation key for the key's
    /// algorithm and the device chain is appended.
    pub fn generate_attestation(
        &self,
        key: &Key,
        attest_params: &[KeyParam],
        attest_key: Option<(&Key, &[u8])>,
    ) -> Result<Vec<Certificate>, Error> {
        let algorithm = key_algorithm(key)?;
        let subject_key = certifiable_key(key)?;
        let context = self.attestation_context();

        match attest_key {
            Some((signing_key, issuer_subject)) => {
                if issuer_subject.is_empty() {
                    return Err(km_err!(InvalidArgument, "attestation key needs issuer subject"));
                }
                let signing_key = signing_key.material.as_asymmetric().ok_or_else(|| {
                    km_err!(IncompatibleAlgorithm, "attestation key must be asymmetric")
                })?;
                self.dev.cert_gen.generate_attestation(
                    subject_key,
                    &key.hw_enforced,
                    &key.sw_enforced,
                    attest_params,
                    AttestationSigner::Caller { key: signing_key, issuer_subject },
                    &context,
                )
            }
            None => {
                let signing_key = self.get_attestation_key(algorithm)?;
                let chain = self.get_attestation_chain(algorithm)?;
                self.dev.cert_gen.generate_attestation(
                    subject_key,
                    &key.hw_enforced,
                    &key.sw_enforced,
                    attest_params,
                    AttestationSigner::Device { key: &signing_key, chain: &chain },
                    &context,
                )
            }
        }
    }

    /// Generate a self-signed certificate for `key`.  If `fake_signature` is set the
    /// certificate carries a placeholder signature, for keys that are not allowed to sign.
    pub fn generate_self_signed_certificate(
        &self,
        key: &Key,
        cert_params: &[KeyParam],
        fake_signature: bool,
    ) -> Result<Vec<Certificate>, Error> {
        let subject_key = certifiable_key(key)?;
        self.dev.cert_gen.generate_self_signed(
            subject_key,
            &key.hw_enforced,
            &key.sw_enforced,
            cert_params,
            fake_signature,
        )
    }
}
