// Integration tests driving the KeyMaster context with the OpenSSL crypto backend.

// Explicitly include alloc because macros from `tkm_common` assume it.
extern crate alloc;

use openssl::{encrypt::Encrypter, hash::MessageDigest, pkey::PKey, rsa::Padding};
use tkm_common::{
    crypto::{self, aes, Aes, KeyMaterial, SymmetricOperation},
    expect_err,
};
use tkm_crypto_boring::{
    aes::BoringAes, eq::BoringEq, hmac::BoringHmac, rng::BoringRng, rsa::BoringRsa,
};
use tkm_ta::{
    device::{self, AttestationStorage, KeyFactories},
    Config, LegacyFormatPolicy, TrustyKeymasterContext,
};
use tkm_tests::fakes::{
    CertRequest, FakeAttestationStorage, FakeAuthTokenKey, FakeCertGen, FakeHwKey, FakeHwRng,
    FAKE_LEAF,
};
use tkm_wire::{
    keymint::{
        Algorithm, BlockMode, Certificate, Digest, EcCurve, KeyFormat, KeyOrigin, KeyParam,
        KeyPurpose, PaddingMode, VerifiedBootState,
    },
    KeySizeInBits, RsaExponent,
};

const DEVICE_SECRET: [u8; 32] = [0x5a; 32];

/// Device collaborators, owned so that a context can borrow them.
struct Device {
    hw_key: FakeHwKey,
    hw_rng: FakeHwRng,
    storage: Option<FakeAttestationStorage>,
    cert_gen: FakeCertGen,
    auth_key: FakeAuthTokenKey,
}

impl Device {
    fn new() -> Self {
        let chain = vec![
            Certificate { encoded_certificate: b"intermediate".to_vec() },
            Certificate { encoded_certificate: b"root".to_vec() },
        ];
        Self {
            hw_key: FakeHwKey::new(DEVICE_SECRET),
            hw_rng: FakeHwRng::default(),
            storage: Some(FakeAttestationStorage {
                rsa: None,
                ecdsa: Some((
                    KeyMaterial::Ec(EcCurve::P256, crypto::ec::Key(vec![0x01; 32])),
                    chain,
                )),
            }),
            cert_gen: FakeCertGen::default(),
            auth_key: FakeAuthTokenKey::new(&[0x33; 32]),
        }
    }

    fn context<'a>(&'a self, rng: &'a mut BoringRng, config: Config) -> TrustyKeymasterContext<'a> {
        let imp = crypto::Implementation {
            compare: &BoringEq,
            aes: &BoringAes,
            hmac: &BoringHmac,
            rsa: &BoringRsa,
            hkdf: &BoringHmac,
        };
        let dev = device::Implementation {
            hw_key: &self.hw_key,
            hw_rng: &self.hw_rng,
            attestation_storage: self.storage.as_ref().map(|s| s as &dyn AttestationStorage),
            soft_attestation: None,
            cert_gen: &self.cert_gen,
            auth_token_key: &self.auth_key,
            keyblob_aead: None,
            key_factories: KeyFactories::default(),
        };
        TrustyKeymasterContext::new(imp, rng, dev, config)
    }
}

fn aes_description(app_id: &[u8]) -> Vec<KeyParam> {
    let mut params = vec![
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::KeySize(KeySizeInBits(128)),
        KeyParam::BlockMode(BlockMode::Gcm),
        KeyParam::Padding(PaddingMode::None),
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::MinMacLength(128),
        KeyParam::NoAuthRequired,
        KeyParam::CreationDatetime(tkm_wire::keymint::DateTime { ms_since_epoch: 1_000 }),
    ];
    if !app_id.is_empty() {
        params.push(KeyParam::ApplicationId(app_id.to_vec()));
    }
    params
}

#[test]
fn test_create_parse_roundtrip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dev = Device::new();
    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());
    ctx.set_system_version(110000, 202301).unwrap();

    let material = [0x11u8; 16];
    let result =
        ctx.create_key_blob(&aes_description(b"app"), KeyOrigin::Generated, &material).unwrap();
    assert!(result.hw_enforced.contains(&KeyParam::Origin(KeyOrigin::Generated)));
    assert!(result.hw_enforced.contains(&KeyParam::OsVersion(110000)));
    assert!(result.hw_enforced.contains(&KeyParam::OsPatchlevel(202301)));
    assert!(!result.hw_enforced.iter().any(|p| matches!(p, KeyParam::ApplicationId(_))));
    assert_eq!(
        result.sw_enforced,
        vec![KeyParam::CreationDatetime(tkm_wire::keymint::DateTime { ms_since_epoch: 1_000 })]
    );

    let app_id = vec![KeyParam::ApplicationId(b"app".to_vec())];
    let key = ctx.parse_key_blob(&result.key_blob, &app_id, false).unwrap();
    assert_eq!(key.material, KeyMaterial::Aes(aes::Key::Aes128(material)));
    assert_eq!(key.hw_enforced, result.hw_enforced);
    assert_eq!(key.sw_enforced, result.sw_enforced);

    // Application ID is bound into the blob.
    let wrong_id = vec![KeyParam::ApplicationId(b"other".to_vec())];
    let result2 = ctx.parse_key_blob(&result.key_blob, &wrong_id, false);
    expect_err!(result2, "InvalidKeyBlob");
    let result3 = ctx.parse_key_blob(&result.key_blob, &[], false);
    expect_err!(result3, "InvalidKeyBlob");

    // Every hardware key session was closed again.
    assert_eq!(dev.hw_key.open_sessions.get(), 0);
}

#[test]
fn test_repeated_application_id() {
    let dev = Device::new();
    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());

    let mut desc = aes_description(b"secret-app");
    desc.push(KeyParam::ApplicationId(b"other-app".to_vec()));
    let result = ctx.create_key_blob(&desc, KeyOrigin::Generated, &[0x22; 16]).unwrap();

    // The first application ID is the one bound into the blob.
    let result2 = ctx.parse_key_blob(&result.key_blob, &[], false);
    expect_err!(result2, "InvalidKeyBlob");
    let other = vec![KeyParam::ApplicationId(b"other-app".to_vec())];
    let result3 = ctx.parse_key_blob(&result.key_blob, &other, false);
    expect_err!(result3, "InvalidKeyBlob");
    let first = vec![KeyParam::ApplicationId(b"secret-app".to_vec())];
    assert!(ctx.parse_key_blob(&result.key_blob, &first, false).is_ok());
    assert!(ctx.parse_key_blob(&result.key_blob, &desc, false).is_ok());
}

#[test]
fn test_key_blob_bound_to_device_and_boot_state() {
    let dev = Device::new();
    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());
    let blob = ctx.create_key_blob(&aes_description(b""), KeyOrigin::Imported, &[7; 16]).unwrap();

    // A different device secret cannot open the blob.
    let mut other = Device::new();
    other.hw_key = FakeHwKey::new([0xa5; 32]);
    let mut rng2 = BoringRng::default();
    let other_ctx = other.context(&mut rng2, Config::default());
    let result = other_ctx.parse_key_blob(&blob.key_blob, &[], false);
    expect_err!(result, "InvalidKeyBlob");

    // Before the bootloader reports, keys are bound to the "Unbound" root of trust, so setting
    // the real root of trust invalidates them.
    let mut rng3 = BoringRng::default();
    let dev3 = Device::new();
    let ctx3 = dev3.context(&mut rng3, Config::default());
    assert!(ctx3.parse_key_blob(&blob.key_blob, &[], false).is_ok());
    ctx3.set_boot_params(0, 0, b"boot key", VerifiedBootState::Verified, true, b"hash").unwrap();
    let result = ctx3.parse_key_blob(&blob.key_blob, &[], false);
    expect_err!(result, "InvalidKeyBlob");

    // Keys created under a given root of trust open on another boot with the same state.
    let blob = ctx3.create_key_blob(&aes_description(b""), KeyOrigin::Imported, &[7; 16]).unwrap();
    let mut rng4 = BoringRng::default();
    let ctx4 = dev3.context(&mut rng4, Config::default());
    ctx4.set_boot_params(0, 0, b"boot key", VerifiedBootState::Verified, true, b"hash").unwrap();
    assert!(ctx4.parse_key_blob(&blob.key_blob, &[], false).is_ok());

    // ... but not if the device lock state differs.
    let mut rng5 = BoringRng::default();
    let ctx5 = dev3.context(&mut rng5, Config::default());
    ctx5.set_boot_params(0, 0, b"boot key", VerifiedBootState::Verified, false, b"hash").unwrap();
    let result = ctx5.parse_key_blob(&blob.key_blob, &[], false);
    expect_err!(result, "InvalidKeyBlob");
}

#[test]
fn test_legacy_prefix() {
    let dev = Device::new();
    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());
    let blob = ctx.create_key_blob(&aes_description(b""), KeyOrigin::Generated, &[3; 16]).unwrap();

    let mut hw_prefixed = b"pKMblob\x00".to_vec();
    hw_prefixed.extend_from_slice(&blob.key_blob);
    assert!(ctx.parse_key_blob(&hw_prefixed, &[], false).is_ok());

    let mut sw_prefixed = b"pKMblob\x01".to_vec();
    sw_prefixed.extend_from_slice(&blob.key_blob);
    let result = ctx.parse_key_blob(&sw_prefixed, &[], false);
    expect_err!(result, "InvalidKeyBlob");
}

#[test]
fn test_upgrade() {
    let dev = Device::new();
    let desc = aes_description(b"app");
    let app_id = vec![KeyParam::ApplicationId(b"app".to_vec())];

    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());
    ctx.set_system_version(110000, 202301).unwrap();
    let blob = ctx.create_key_blob(&desc, KeyOrigin::Generated, &[9; 16]).unwrap().key_blob;
    assert_eq!(ctx.upgrade_key_blob(&blob, &app_id).unwrap(), None);

    // Newer system: the blob is upgraded.
    let mut rng2 = BoringRng::default();
    let newer = dev.context(&mut rng2, Config::default());
    newer.set_system_version(120000, 202401).unwrap();
    let upgraded = newer.upgrade_key_blob(&blob, &app_id).unwrap().unwrap();
    let key = newer.parse_key_blob(&upgraded, &app_id, false).unwrap();
    assert!(key.hw_enforced.contains(&KeyParam::OsVersion(120000)));
    assert!(key.hw_enforced.contains(&KeyParam::OsPatchlevel(202401)));
    assert_eq!(key.material, KeyMaterial::Aes(aes::Key::Aes128([9; 16])));
    assert_eq!(newer.upgrade_key_blob(&upgraded, &app_id).unwrap(), None);

    // Older system: refuse to downgrade.
    let mut rng3 = BoringRng::default();
    let older = dev.context(&mut rng3, Config::default());
    older.set_system_version(100000, 202401).unwrap();
    let result = older.upgrade_key_blob(&blob, &app_id);
    expect_err!(result, "InvalidArgument");

    // OS version zero is always accepted.
    let mut rng4 = BoringRng::default();
    let zero = dev.context(&mut rng4, Config::default());
    zero.set_system_version(0, 202301).unwrap();
    let upgraded = zero.upgrade_key_blob(&blob, &app_id).unwrap().unwrap();
    let key = zero.parse_key_blob(&upgraded, &app_id, false).unwrap();
    assert!(key.hw_enforced.contains(&KeyParam::OsVersion(0)));
    assert!(!key.hw_enforced.contains(&KeyParam::OsVersion(110000)));
}

#[test]
fn test_confirmation_token() {
    let dev = Device::new();
    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());

    let input = b"confirmation prompt and extra data";
    let token = openssl::sign::Signer::new(
        MessageDigest::sha256(),
        &PKey::hmac(&[0x33; 32]).unwrap(),
    )
    .unwrap()
    .sign_oneshot_to_vec(input)
    .unwrap();
    let mut token: [u8; 32] = token.try_into().unwrap();
    assert!(ctx.check_confirmation_token(input, &token).is_ok());
    assert!(ctx.check_confirmation_token(input, &token).is_ok());
    assert_eq!(dev.auth_key.requests.get(), 1);

    token[31] ^= 0x01;
    let result = ctx.check_confirmation_token(input, &token);
    expect_err!(result, "NoUserConfirmation");
}

#[test]
fn test_generate_random() {
    let dev = Device::new();
    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());
    let a = ctx.generate_random(32).unwrap();
    let b = ctx.generate_random(32).unwrap();
    assert_ne!(a, b);
    assert!(ctx.generate_random(0).unwrap().is_empty());
    assert!(ctx.add_rng_entropy(&[1, 2, 3]).is_ok());
    let result = ctx.add_rng_entropy(&[0; 4096]);
    expect_err!(result, "InvalidInputLength");

    let failing = Device::new();
    failing.hw_rng.fail.set(true);
    let mut rng2 = BoringRng::default();
    let ctx2 = failing.context(&mut rng2, Config::default());
    let result = ctx2.generate_random(16);
    expect_err!(result, "SecureHwCommunicationFailed");
}

#[test]
fn test_legacy_ocb_policy() {
    // A blob in AES-OCB format parses as far as the format check, then fails to decrypt
    // because the default key blob encryption only supports AES-GCM.
    let ocb = tkm_common::keyblob::legacy::EncryptedKeyBlob {
        format: tkm_common::keyblob::legacy::AuthEncryptedBlobFormat::AesOcb,
        nonce: vec![0; 12],
        ciphertext: vec![0; 16],
        tag: vec![0; 16],
        hw_enforced: vec![KeyParam::Algorithm(Algorithm::Aes)],
        sw_enforced: vec![],
        key_slot: None,
    }
    .serialize()
    .unwrap();

    let dev = Device::new();
    let mut rng = BoringRng::default();
    let reject = dev.context(&mut rng, Config { legacy_format_policy: LegacyFormatPolicy::Reject });
    let result = reject.parse_key_blob(&ocb, &[], false);
    expect_err!(result, "KeyRequiresUpgrade");
    let result = reject.parse_key_blob(&ocb, &[], true);
    expect_err!(result, "Unimplemented");

    let mut rng2 = BoringRng::default();
    let accept = dev.context(&mut rng2, Config::default());
    let result = accept.parse_key_blob(&ocb, &[], false);
    expect_err!(result, "Unimplemented");
}

/// Minimal DER encoding helpers for building wrapped keys.
fn der_tlv(identifier: &[u8], contents: &[u8]) -> Vec<u8> {
    let mut out = identifier.to_vec();
    let len = contents.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x100 {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(contents);
    out
}

fn der_integer(v: u64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(7);
    let mut contents = bytes[first..].to_vec();
    if contents[0] & 0x80 != 0 {
        contents.insert(0, 0);
    }
    der_tlv(&[0x02], &contents)
}

fn der_octets(data: &[u8]) -> Vec<u8> {
    der_tlv(&[0x04], data)
}

fn der_explicit(number: u32, inner: &[u8]) -> Vec<u8> {
    if number < 31 {
        der_tlv(&[0xa0 | number as u8], inner)
    } else {
        assert!(number < 0x4000);
        der_tlv(&[0xbf, 0x80 | (number >> 7) as u8, (number & 0x7f) as u8], inner)
    }
}

fn der_set_of_integers(values: &[u64]) -> Vec<u8> {
    let contents: Vec<u8> = values.iter().flat_map(|v| der_integer(*v)).collect();
    der_tlv(&[0x31], &contents)
}

/// Authorization list for an AES-256-GCM key, as DER.
fn aes_gcm_authorization_list() -> Vec<u8> {
    let mut list = Vec::new();
    list.extend(der_explicit(1, &der_set_of_integers(&[0, 1]))); // purpose
    list.extend(der_explicit(2, &der_integer(32))); // algorithm
    list.extend(der_explicit(3, &der_integer(256))); // key size
    list.extend(der_explicit(4, &der_set_of_integers(&[32]))); // block mode
    list.extend(der_explicit(6, &der_set_of_integers(&[1]))); // padding
    list.extend(der_explicit(8, &der_integer(128))); // min MAC length
    list.extend(der_explicit(503, &[0x05, 0x00])); // no auth required
    der_tlv(&[0x30], &list)
}

struct WrappingKey {
    pkey: PKey<openssl::pkey::Private>,
    der: Vec<u8>,
}

fn wrapping_key() -> WrappingKey {
    let rsa_key = openssl::rsa::Rsa::generate(2048).unwrap();
    let der = rsa_key.private_key_to_der().unwrap();
    WrappingKey { pkey: PKey::from_rsa(rsa_key).unwrap(), der }
}

fn wrapping_key_description(purpose: KeyPurpose) -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Rsa),
        KeyParam::KeySize(KeySizeInBits(2048)),
        KeyParam::RsaPublicExponent(RsaExponent(65537)),
        KeyParam::Purpose(purpose),
        KeyParam::Padding(PaddingMode::RsaOaep),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::NoAuthRequired,
    ]
}

/// Build a `SecureKeyWrapper` holding `secret`, returning its DER encoding.
fn wrap_key(wrapping: &WrappingKey, version: u64, masking_key: &[u8], secret: &[u8]) -> Vec<u8> {
    let transport_key = [0x42u8; 32];
    let iv = [0x24u8; 12];

    let masked: Vec<u8> = transport_key.iter().zip(masking_key).map(|(a, b)| a ^ b).collect();
    let mut encrypter = Encrypter::new(&wrapping.pkey).unwrap();
    encrypter.set_rsa_padding(Padding::PKCS1_OAEP).unwrap();
    encrypter.set_rsa_oaep_md(MessageDigest::sha256()).unwrap();
    encrypter.set_rsa_mgf1_md(MessageDigest::sha1()).unwrap();
    let mut encrypted_transport_key = vec![0u8; encrypter.encrypt_len(&masked).unwrap()];
    let len = encrypter.encrypt(&masked, &mut encrypted_transport_key).unwrap();
    encrypted_transport_key.truncate(len);

    let mut description = der_integer(KeyFormat::Raw as u64);
    description.extend(aes_gcm_authorization_list());
    let description = der_tlv(&[0x30], &description);

    let mut op = BoringAes
        .begin_aead(
            aes::Key::Aes256(transport_key),
            aes::GcmMode::new(&iv, 128).unwrap(),
            SymmetricOperation::Encrypt,
        )
        .unwrap();
    op.update_aad(&description).unwrap();
    let mut ct = op.update(secret).unwrap();
    ct.extend_from_slice(&op.finish().unwrap());
    let (encrypted_key, tag) = ct.split_at(ct.len() - 16);

    let mut wrapper = der_integer(version);
    wrapper.extend(der_octets(&encrypted_transport_key));
    wrapper.extend(der_octets(&iv));
    wrapper.extend(description);
    wrapper.extend(der_octets(encrypted_key));
    wrapper.extend(der_octets(tag));
    der_tlv(&[0x30], &wrapper)
}

fn unwrap_params() -> Vec<KeyParam> {
    vec![KeyParam::Padding(PaddingMode::RsaOaep), KeyParam::Digest(Digest::Sha256)]
}

#[test]
fn test_secure_import() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dev = Device::new();
    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());

    let wrapping = wrapping_key();
    let blob = ctx
        .create_key_blob(
            &wrapping_key_description(KeyPurpose::WrapKey),
            KeyOrigin::Generated,
            &wrapping.der,
        )
        .unwrap()
        .key_blob;
    let secret = [0x99u8; 32];
    let masking_key = [0x0fu8; 32];

    let wrapped = wrap_key(&wrapping, 0, &masking_key, &secret);
    let unwrapped = ctx.unwrap_key(&wrapped, &blob, &unwrap_params(), &masking_key).unwrap();
    assert_eq!(unwrapped.key_format, KeyFormat::Raw);
    assert_eq!(&unwrapped.key_material[..], &secret[..]);
    assert_eq!(
        unwrapped.key_params,
        vec![
            KeyParam::Purpose(KeyPurpose::Encrypt),
            KeyParam::Purpose(KeyPurpose::Decrypt),
            KeyParam::Algorithm(Algorithm::Aes),
            KeyParam::KeySize(KeySizeInBits(256)),
            KeyParam::BlockMode(BlockMode::Gcm),
            KeyParam::Padding(PaddingMode::None),
            KeyParam::MinMacLength(128),
            KeyParam::NoAuthRequired,
        ]
    );

    // An all-zero masking key leaves the transport key unchanged.
    let zero_mask = [0u8; 32];
    let wrapped = wrap_key(&wrapping, 0, &zero_mask, &secret);
    let unwrapped = ctx.unwrap_key(&wrapped, &blob, &unwrap_params(), &zero_mask).unwrap();
    assert_eq!(&unwrapped.key_material[..], &secret[..]);
}

#[test]
fn test_secure_import_fail() {
    let dev = Device::new();
    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());
    let wrapping = wrapping_key();
    let blob = ctx
        .create_key_blob(
            &wrapping_key_description(KeyPurpose::WrapKey),
            KeyOrigin::Generated,
            &wrapping.der,
        )
        .unwrap()
        .key_blob;
    let masking_key = [0x0fu8; 32];
    let wrapped = wrap_key(&wrapping, 0, &masking_key, &[0x99; 32]);

    // Wrong masking key length.
    let result = ctx.unwrap_key(&wrapped, &blob, &unwrap_params(), &masking_key[..16]);
    expect_err!(result, "InvalidArgument");

    // Wrong masking key value gives the wrong transport key.
    let result = ctx.unwrap_key(&wrapped, &blob, &unwrap_params(), &[0xf0; 32]);
    expect_err!(result, "VerificationFailed");

    // Unwrap parameters must ask for OAEP with SHA-256.
    let result =
        ctx.unwrap_key(&wrapped, &blob, &[KeyParam::Digest(Digest::Sha256)], &masking_key);
    expect_err!(result, "IncompatiblePaddingMode");
    let result = ctx.unwrap_key(
        &wrapped,
        &blob,
        &[KeyParam::Padding(PaddingMode::RsaOaep)],
        &masking_key,
    );
    expect_err!(result, "IncompatibleDigest");

    // Unsupported wrapper version.
    let wrapped_v1 = wrap_key(&wrapping, 1, &masking_key, &[0x99; 32]);
    let result = ctx.unwrap_key(&wrapped_v1, &blob, &unwrap_params(), &masking_key);
    expect_err!(result, "InvalidArgument");

    // Tampered encrypted key.
    let mut tampered = wrapped.clone();
    let idx = tampered.len() - 20;
    tampered[idx] ^= 0x01;
    let result = ctx.unwrap_key(&tampered, &blob, &unwrap_params(), &masking_key);
    expect_err!(result, "VerificationFailed");

    // Truncated wrapper.
    let truncated = &wrapped[..wrapped.len() - 1];
    let result = ctx.unwrap_key(truncated, &blob, &unwrap_params(), &masking_key);
    assert!(result.is_err());

    // Wrapping key without the wrap purpose.
    let sign_blob = ctx
        .create_key_blob(
            &wrapping_key_description(KeyPurpose::Sign),
            KeyOrigin::Generated,
            &wrapping.der,
        )
        .unwrap()
        .key_blob;
    let result = ctx.unwrap_key(&wrapped, &sign_blob, &unwrap_params(), &masking_key);
    expect_err!(result, "IncompatiblePurpose");

    // Wrapping key that is not RSA.
    let mut aes_desc = aes_description(b"");
    aes_desc.push(KeyParam::Purpose(KeyPurpose::WrapKey));
    aes_desc.push(KeyParam::Digest(Digest::Sha256));
    aes_desc.push(KeyParam::Padding(PaddingMode::RsaOaep));
    let aes_blob =
        ctx.create_key_blob(&aes_desc, KeyOrigin::Generated, &[1; 16]).unwrap().key_blob;
    let result = ctx.unwrap_key(&wrapped, &aes_blob, &unwrap_params(), &masking_key);
    expect_err!(result, "IncompatibleAlgorithm");
}

fn ec_key_blob(ctx: &TrustyKeymasterContext) -> Vec<u8> {
    let desc = vec![
        KeyParam::Algorithm(Algorithm::Ec),
        KeyParam::EcCurve(EcCurve::P256),
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::AttestationChallenge(b"challenge".to_vec()),
    ];
    ctx.create_key_blob(&desc, KeyOrigin::Generated, &[0x02; 32]).unwrap().key_blob
}

#[test]
fn test_attestation() {
    let dev = Device::new();
    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());
    ctx.set_system_version(130000, 202405).unwrap();
    let key = ctx.parse_key_blob(&ec_key_blob(&ctx), &[], false).unwrap();
    assert!(!key.hw_enforced.iter().any(|p| matches!(p, KeyParam::AttestationChallenge(_))));

    let chain = ctx
        .generate_attestation(&key, &[KeyParam::AttestationChallenge(b"c".to_vec())], None)
        .unwrap();
    assert_eq!(chain.len(), 3);
    assert_eq!(chain[0].encoded_certificate, FAKE_LEAF);
    assert_eq!(chain[2].encoded_certificate, b"root");
    assert_eq!(
        dev.cert_gen.requests.borrow()[0],
        CertRequest::Attestation {
            hw_enforced: key.hw_enforced.clone(),
            signer_chain_len: Some(2),
            issuer_subject: None,
            os_version: 130000,
            os_patchlevel: 202405,
            verified_boot_key: b"Unbound".to_vec(),
        }
    );

    // Caller-provided attestation key.
    let chain = ctx.generate_attestation(&key, &[], Some((&key, &b"issuer"[..]))).unwrap();
    assert_eq!(chain.len(), 1);
    let result = ctx.generate_attestation(&key, &[], Some((&key, &b""[..])));
    expect_err!(result, "InvalidArgument");

    // Self-signed certificates pass the fake-signature flag through.
    ctx.generate_self_signed_certificate(&key, &[], true).unwrap();
    assert_eq!(
        dev.cert_gen.requests.borrow().last().unwrap(),
        &CertRequest::SelfSigned { fake_signature: true }
    );

    // Symmetric keys cannot be certified.
    let aes_blob =
        ctx.create_key_blob(&aes_description(b""), KeyOrigin::Generated, &[1; 16]).unwrap();
    let aes_key = ctx.parse_key_blob(&aes_blob.key_blob, &[], false).unwrap();
    let result = ctx.generate_attestation(&aes_key, &[], None);
    expect_err!(result, "IncompatibleAlgorithm");
    let result = ctx.generate_self_signed_certificate(&aes_key, &[], false);
    expect_err!(result, "IncompatibleAlgorithm");
}

#[test]
fn test_attestation_storage_errors() {
    let mut dev = Device::new();
    dev.storage = None;
    let mut rng = BoringRng::default();
    let ctx = dev.context(&mut rng, Config::default());
    let key = ctx.parse_key_blob(&ec_key_blob(&ctx), &[], false).unwrap();
    let result = ctx.generate_attestation(&key, &[], None);
    expect_err!(result, "SecureHwCommunicationFailed");

    // RSA slot is empty in the fake storage.
    let dev2 = Device::new();
    let mut rng2 = BoringRng::default();
    let ctx2 = dev2.context(&mut rng2, Config::default());
    let result = ctx2.get_attestation_chain(Algorithm::Rsa);
    expect_err!(result, "SecureHwCommunicationFailed");
    assert_eq!(ctx2.get_attestation_chain(Algorithm::Ec).unwrap().len(), 2);
    let result = ctx2.get_attestation_key(Algorithm::Aes);
    expect_err!(result, "UnsupportedAlgorithm");
}
