//! Test methods to confirm basic functionality of trait implementations, plus fake device
//! collaborators for exercising the KeyMaster context.

extern crate alloc;

use openssl::{encrypt::Encrypter, hash::MessageDigest, pkey::PKey, rsa::Padding};
use tkm_common::crypto::{
    aes, hmac, rsa, rsa::DecryptionMode, Aes, ConstTimeEq, Hkdf, Hmac, Rng, Rsa,
    SymmetricOperation,
};
use tkm_wire::keymint::Digest;


/// Test basic [`Rng`] functionality.
pub fn test_rng<R: Rng>(rng: &mut R) {
    let u1 = rng.next_u64();
    let u2 = rng.next_u64();
    assert_ne!(u1, u2);

    let mut b1 = [0u8; 16];
    let mut b2 = [0u8; 16];
    rng.fill_bytes(&mut b1);
    rng.fill_bytes(&mut b2);
    assert_ne!(b1, b2);

    rng.add_entropy(&b1).unwrap();
    rng.add_entropy(&[]).unwrap();
    rng.fill_bytes(&mut b1);
    assert_ne!(b1, b2);
}

/// Test basic [`ConstTimeEq`] functionality. Does not test the key constant-time property though.
pub fn test_eq<E: ConstTimeEq>(comparator: E) {
    let b0 = [];
    let b1 = [0u8, 1u8, 2u8];
    let b2 = [1u8, 1u8, 2u8];
    let b3 = [0u8, 1u8, 3u8];
    let b4 = [0u8, 1u8, 2u8, 3u8];
    let b5 = [42; 4096];
    let mut b6 = [42; 4096];
    b6[4095] = 43;
    assert!(comparator.eq(&b0, &b0));
    assert!(comparator.eq(&b5, &b5));

    assert!(comparator.ne(&b0, &b1));
    assert!(comparator.ne(&b0, &b2));
    assert!(comparator.ne(&b0, &b3));
    assert!(comparator.ne(&b0, &b4));
    assert!(comparator.ne(&b0, &b5));
    assert!(comparator.eq(&b1, &b1));
    assert!(comparator.ne(&b1, &b2));
    assert!(comparator.ne(&b1, &b3));
    assert!(comparator.ne(&b1, &b4));
    assert!(comparator.ne(&b5, &b6));
}

/// Test basic HKDF functionality.
pub fn test_hkdf<H: Hmac>(hmac: H) {
    struct TestCase {
        ikm: &'static str,
        salt: &'static str,
        info: &'static str,
        out_len: usize,
        want: &'static str,
    }

    const HKDF_TESTS: &[TestCase] = &[
        // RFC 5869 section A.1
        TestCase {
            ikm: "0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b",
            salt: "000102030405060708090a0b0c",
            info: "f0f1f2f3f4f5f6f7f8f9",
            out_len: 42,
            want: concat!(
                "3cb25f25faacd57a90434f64d0362f2a",
                "2d2d0a90cf1a5a4c5db02d56ecc4c5bf",
                "34007208d5b887185865",
            ),
        },
        // RFC 5869 section A.2
        TestCase {
            ikm: concat!(
                "000102030405060708090a0b0c0d0e0f",
                "101112131415161718191a1b1c1d1e1f",
                "202122232425262728292a2b2c2d2e2f",
                "303132333435363738393a3b3c3d3e3f",
                "404142434445464748494a4b4c4d4e4f",
            ),
            salt: concat!(
                "606162636465666768696a6b6c6d6e6f",
                "707172737475767778797a7b7c7d7e7f",
                "808182838485868788898a8b8c8d8e8f",
                "909192939495969798999a9b9c9d9e9f",
                "a0a1a2a3a4a5a6a7a8a9aaabacadaeaf",
            ),
            info: concat!(
                "b0b1b2b3b4b5b6b7b8b9babbbcbdbebf",
                "c0c1c2c3c4c5c6c7c8c9cacbcccdcecf",
                "d0d1d2d3d4d5d6d7d8d9dadbdcdddedf",
                "e0e1e2e3e4e5e6e7e8e9eaebecedeeef",
                "f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff",
            ),
            out_len: 82,
            want: concat!(
                "b11e398dc80327a1c8e7f78c596a4934",
                "4f012eda2d4efad8a050cc4c19afa97c",
                "59045a99cac7827271cb41c65e590e09",
                "da3275600c2f09b8367793a9aca3db71",
                "cc30c58179ec3e87c14c01d5c1f3434f",
                "1d87",
            ),
        },
        // RFC 5869 section A.3
        TestCase {
            ikm: "0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b",
            salt: "",
            info: "",
            out_len: 42,
            want: concat!(
                "8da4e775a563c18f715f802a063c5a31",
                "b8a11f5c5ee1879ec3454e5f3c738d2d",
                "9d201395faa4b61a96c8",
            ),
        },
    ];

    for (i, test) in HKDF_TESTS.iter().enumerate() {
        let ikm = hex::decode(test.ikm).unwrap();
        let salt = hex::decode(test.salt).unwrap();
        let info = hex::decode(test.info).unwrap();

        let got = hmac.hkdf(&salt, &ikm, &info, test.out_len).unwrap();
        assert_eq!(hex::encode(got), test.want, "incorrect HKDF result for case {}", i);
    }
}

/// Test basic [`Hmac`] functionality.
pub fn test_hmac<H: Hmac>(hmac: H) {
    struct TestCase {
        digest: Digest,
        tag_size: usize,
        key: &'static [u8],
        data: &'static [u8],
        expected_mac: &'static str,
    }

    // RFC 4231 sections 4.2 to 4.4, plus an empty message.
    const HMAC_TESTS: &[TestCase] = &[
        TestCase {
            digest: Digest::Sha256,
            tag_size: 32,
            key: &[0x0b; 20],
            data: b"Hi There",
            expected_mac: "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7",
        },
        TestCase {
            digest: Digest::Sha256,
            tag_size: 32,
            key: b"Jefe",
            data: b"what do ya want for nothing?",
            expected_mac: "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843",
        },
        TestCase {
            digest: Digest::Sha256,
            tag_size: 32,
            key: &[0xaa; 20],
            data: &[0xdd; 50],
            expected_mac: "773ea91e36800e46854db8ebd09181a72959098b3ef8c122d9635514ced565fe",
        },
        TestCase {
            digest: Digest::Sha256,
            tag_size: 16,
            key: &[0xaa; 20],
            data: &[0xdd; 50],
            expected_mac: "773ea91e36800e46854db8ebd09181a7",
        },
        TestCase {
            digest: Digest::Sha256,
            tag_size: 32,
            key: b"\x00\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c\x0d\x0e\x0f",
            data: &[],
            expected_mac: "07eff8b326b7798c9ccfcbdbe579489ac785a7995a04618b1a2813c26744777d",
        },
    ];

    for (i, test) in HMAC_TESTS.iter().enumerate() {
        let mut op = hmac.begin(hmac::Key(test.key.to_vec()), test.digest).unwrap();
        op.update(test.data).unwrap();
        let mut mac = op.finish().unwrap();
        mac.truncate(test.tag_size);

        assert_eq!(
            hex::encode(&mac),
            test.expected_mac[..(test.tag_size * 2)],
            "incorrect mac in test case {}",
            i
        );
    }
}

/// Test AES-GCM functionality.
pub fn test_aes_gcm<A: Aes>(aes: A) {
    struct TestCase {
        key: &'static str,
        iv: &'static str,
        aad: &'static str,
        msg: &'static str,
        ct: &'static str,
        tag: &'static str,
    }
    // Test vectors from https://github.com/google/wycheproof/blob/master/testvectors/aes_gcm_test.json
    let tests = vec![
        TestCase {
            key: "5b9604fe14eadba931b0ccf34843dab9",
            iv: "028318abc1824029138141a2",
            aad: "",
            msg: "001d0c231287c1182784554ca3a21908",
            ct: "26073cc1d851beff176384dc9896d5ff",
            tag: "0a3ea7a5487cb5f7d70fb6c58d038554",
        },
        TestCase {
            key: "5b9604fe14eadba931b0ccf34843dab9",
            iv: "921d2507fa8007b7bd067d34",
            aad: "00112233445566778899aabbccddeeff",
            msg: "001d0c231287c1182784554ca3a21908",
            ct: "49d8b9783e911913d87094d1f63cc765",
            tag: "1e348ba07cca2cf04c618cb4d43a5b92",
        },
    ];
    let run = |key: &[u8],
               iv: &[u8],
               tag_bits: u32,
               dir: SymmetricOperation,
               aad: &[u8],
               input: &[u8]|
     -> Result<Vec<u8>, tkm_common::Error> {
        let mode = aes::GcmMode::new(iv, tag_bits)?;
        let mut op = aes.begin_aead(aes::Key::new_from(key)?, mode, dir)?;
        op.update_aad(aad)?;
        let mut output = op.update(input)?;
        output.extend_from_slice(&op.finish()?);
        Ok(output)
    };
    for test in tests {
        let key = hex::decode(test.key).unwrap();
        let iv = hex::decode(test.iv).unwrap();
        let aad = hex::decode(test.aad).unwrap();
        let msg = hex::decode(test.msg).unwrap();

        let got_ct = run(&key, &iv, 128, SymmetricOperation::Encrypt, &aad, &msg).unwrap();
        assert_eq!(format!("{}{}", test.ct, test.tag), hex::encode(&got_ct));
        let got_pt = run(&key, &iv, 128, SymmetricOperation::Decrypt, &aad, &got_ct).unwrap();
        assert_eq!(got_pt, msg);

        // A 96-bit tag is a prefix of the full tag.
        let short = &got_ct[..got_ct.len() - 4];
        let got_pt = run(&key, &iv, 96, SymmetricOperation::Decrypt, &aad, short).unwrap();
        assert_eq!(got_pt, msg);

        let mut corrupt_ct = got_ct.clone();
        corrupt_ct[0] ^= 0x01;
        assert!(run(&key, &iv, 128, SymmetricOperation::Decrypt, &aad, &corrupt_ct).is_err());
        assert!(run(&key, &iv, 128, SymmetricOperation::Decrypt, b"other", &got_ct).is_err());
    }

    // Key blobs use AES-256 with no additional data.
    let key = [0x42u8; 32];
    let iv = [0x07u8; 12];
    let msg = b"sixteen byte key";
    let ct = run(&key, &iv, 128, SymmetricOperation::Encrypt, &[], msg).unwrap();
    assert_eq!(ct.len(), msg.len() + 16);
    let pt = run(&key, &iv, 128, SymmetricOperation::Decrypt, &[], &ct).unwrap();
    assert_eq!(pt, msg);
    assert!(run(&key, &iv, 128, SymmetricOperation::Decrypt, &[], &ct[..ct.len() - 1]).is_err());
}

/// Test RSA decryption in each of the supported padding modes, against data encrypted by
/// OpenSSL.
pub fn test_rsa_decrypt<R: Rsa>(rsa_impl: R) {
    let rsa_key = openssl::rsa::Rsa::generate(2048).unwrap();
    let key = rsa::Key(rsa_key.private_key_to_der().unwrap());
    let pkey = PKey::from_rsa(rsa_key).unwrap();
    let msg = b"a 32-byte transport key, really";

    let oaep = DecryptionMode::OaepPadding { msg_digest: Digest::Sha256, mgf_digest: Digest::Sha1 };
    let tests = [
        (DecryptionMode::Pkcs1_1_5Padding, Padding::PKCS1, msg.to_vec()),
        (oaep, Padding::PKCS1_OAEP, msg.to_vec()),
        (DecryptionMode::NoPadding, Padding::NONE, {
            // Raw RSA needs a full-size input that is smaller than the modulus.
            let mut v = vec![0u8; 256];
            v[256 - msg.len()..].copy_from_slice(msg);
            v
        }),
    ];
    for (mode, padding, plaintext) in tests {
        let mut encrypter = Encrypter::new(&pkey).unwrap();
        encrypter.set_rsa_padding(padding).unwrap();
        if padding == Padding::PKCS1_OAEP {
            encrypter.set_rsa_oaep_md(MessageDigest::sha256()).unwrap();
            encrypter.set_rsa_mgf1_md(MessageDigest::sha1()).unwrap();
        }
        let mut ct = vec![0u8; encrypter.encrypt_len(&plaintext).unwrap()];
        let len = encrypter.encrypt(&plaintext, &mut ct).unwrap();
        ct.truncate(len);

        let op = rsa_impl.begin_decrypt(key.clone(), mode).unwrap();
        let got = op.finish_with(&ct).unwrap();
        assert_eq!(got, plaintext, "mismatch for {:?}", mode);
    }

    // Decrypting with the wrong OAEP digest fails.
    let mut encrypter = Encrypter::new(&pkey).unwrap();
    encrypter.set_rsa_padding(Padding::PKCS1_OAEP).unwrap();
    let mut ct = vec![0u8; encrypter.encrypt_len(msg).unwrap()];
    let len = encrypter.encrypt(msg, &mut ct).unwrap();
    ct.truncate(len);
    let op = rsa_impl.begin_decrypt(key.clone(), oaep).unwrap();
    assert!(op.finish_with(&ct).is_err());

    // Input longer than the modulus is rejected.
    let op = rsa_impl.begin_decrypt(key, oaep).unwrap();
    assert!(op.finish_with(&[0u8; 257]).is_err());
}
