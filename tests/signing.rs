//! End-to-end strong-name signing of generated images.
//!
//! Every test works on scratch copies in a temporary directory and checks the resulting bytes
//! directly, independent of the library's own verification where it matters.

mod common;

use std::fs;

use common::{PeBuilder, FLAGS_OFFSET, ORIGINAL_FLAGS, SLOT_OFFSET};
use dotsign::{
    prelude::*,
    strongname::{hashable_ranges, parse_key_blob, RsaKeyMaterial},
};
use rsa::{traits::PublicKeyParts, Pkcs1v15Sign};
use sha1::{Digest, Sha1};
use tempfile::TempDir;

fn key() -> Result<StrongNameKey> {
    StrongNameKey::from_blob(&common::key_blob(common::rsa_key()))
}

/// A 64-bit image with a 128-byte slot gains the flag bit and a 128-byte signature, nothing else.
#[test]
fn test_sign_pe32_plus_changes_flag_and_slot_only() -> Result<()> {
    let scratch = TempDir::new()?;
    let original = PeBuilder::default().build();
    let path = common::write(scratch.path(), "app.dll", &original);

    let key = key()?;
    let signer = StrongNameSigner::new(&key, SignOptions::default());
    let result = signer.sign(&path)?.expect("image has a slot");

    assert_eq!(result.signature.len(), 128);
    assert_eq!(result.signature_offset_in_file, SLOT_OFFSET as i32);
    assert_eq!(result.cor_flags_offset_in_file, FLAGS_OFFSET as i32);

    let signed = fs::read(&path)?;
    assert_eq!(signed.len(), original.len());
    assert_eq!(signed[FLAGS_OFFSET], ORIGINAL_FLAGS | 0x08);
    assert_eq!(&signed[SLOT_OFFSET..SLOT_OFFSET + 128], &result.signature[..]);

    let changed = common::changed_offsets(&original, &signed);
    assert!(changed.contains(&FLAGS_OFFSET));
    assert!(changed
        .iter()
        .all(|&offset| offset == FLAGS_OFFSET || (SLOT_OFFSET..SLOT_OFFSET + 128).contains(&offset)));
    let signature_bytes = result.signature.iter().filter(|&&byte| byte != 0).count();
    assert_eq!(changed.len(), 1 + signature_bytes);

    let header = File::from_file(&path)?.cor20_header()?;
    assert!(header.is_strong_name_signed());
    Ok(())
}

/// The stored signature verifies with the plain RSA primitive over the ECMA-335 byte selection.
#[test]
fn test_signature_matches_independent_digest() -> Result<()> {
    let scratch = TempDir::new()?;
    let builder = PeBuilder::default();
    let path = common::write(scratch.path(), "app.dll", &builder.build());

    let key = key()?;
    StrongNameSigner::new(&key, SignOptions::default())
        .sign(&path)?
        .expect("image has a slot");

    let signed = fs::read(&path)?;
    let mut hasher = Sha1::new();
    hasher.update(&signed[..builder.signable_header_size()]);
    hasher.update(&signed[0x200..SLOT_OFFSET]);
    hasher.update(&signed[SLOT_OFFSET + 128..]);
    let digest = hasher.finalize();

    let mut signature = signed[SLOT_OFFSET..SLOT_OFFSET + 128].to_vec();
    signature.reverse();

    let public_key = common::rsa_key().to_public_key();
    assert!(public_key
        .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, &signature)
        .is_ok());
    Ok(())
}

#[test]
fn test_sign_pe32() -> Result<()> {
    let scratch = TempDir::new()?;
    let builder = PeBuilder::pe32();
    let path = common::write(scratch.path(), "app32.exe", &builder.build());

    let key = key()?;
    let signer = StrongNameSigner::new(&key, SignOptions::default());
    assert!(signer.sign(&path)?.is_some());
    assert!(signer.verify(&path)?);

    let metadata = File::from_file(&path)?.signing_metadata()?;
    assert!(!metadata.is_64_bit());
    Ok(())
}

/// Computing twice yields the same bytes, and computing alone writes nothing.
#[test]
fn test_compute_is_deterministic_and_read_only() -> Result<()> {
    let scratch = TempDir::new()?;
    let original = PeBuilder::default().build();
    let path = common::write(scratch.path(), "app.dll", &original);

    let key = key()?;
    let signer = StrongNameSigner::new(&key, SignOptions::default());

    let first = signer.compute(&path)?;
    let second = signer.compute(&path)?;
    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(fs::read(&path)?, original);
    Ok(())
}

#[test]
fn test_verify_round_trip() -> Result<()> {
    let scratch = TempDir::new()?;
    let path = common::write(scratch.path(), "app.dll", &PeBuilder::default().build());

    let key = key()?;
    let signer = StrongNameSigner::new(&key, SignOptions::default());

    assert!(!signer.verify(&path)?);
    signer.sign(&path)?;
    assert!(signer.verify(&path)?);

    let mut tampered = fs::read(&path)?;
    tampered[0x500] ^= 0xFF;
    fs::write(&path, &tampered)?;
    assert!(!signer.verify(&path)?);
    Ok(())
}

/// Bytes inside the slot and the header padding are outside the signature.
#[test]
fn test_unhashed_bytes_do_not_affect_signature() -> Result<()> {
    let scratch = TempDir::new()?;
    let builder = PeBuilder::default();
    let original = builder.build();

    let mut padded = original.clone();
    padded[builder.signable_header_size() + 4] = 0xCC;
    padded[SLOT_OFFSET + 7] = 0xCC;

    let first = common::write(scratch.path(), "a.dll", &original);
    let second = common::write(scratch.path(), "b.dll", &padded);

    let key = key()?;
    let signer = StrongNameSigner::new(&key, SignOptions::default());
    assert_eq!(
        signer.compute(&first)?.map(|result| result.signature),
        signer.compute(&second)?.map(|result| result.signature)
    );
    Ok(())
}

#[test]
fn test_image_without_slot_is_unchanged() -> Result<()> {
    let scratch = TempDir::new()?;
    let original = PeBuilder::default().slot(0).build();
    let path = common::write(scratch.path(), "noslot.dll", &original);

    let key = key()?;
    let signer = StrongNameSigner::new(&key, SignOptions::default());

    assert!(signer.sign(&path)?.is_none());
    assert!(!signer.verify(&path)?);
    assert_eq!(fs::read(&path)?, original);
    Ok(())
}

#[test]
fn test_slot_too_small_is_unchanged() -> Result<()> {
    let scratch = TempDir::new()?;
    let original = PeBuilder::default().slot(64).build();
    let path = common::write(scratch.path(), "small.dll", &original);

    let key = key()?;
    assert!(StrongNameSigner::new(&key, SignOptions::default())
        .sign(&path)?
        .is_none());
    assert_eq!(fs::read(&path)?, original);
    Ok(())
}

#[test]
fn test_half_empty_strong_name_directory_is_skipped() -> Result<()> {
    let scratch = TempDir::new()?;
    let key = key()?;
    let signer = StrongNameSigner::new(&key, SignOptions::default());

    for (name, rva, size) in [("rva-only.dll", 0x2100, 0), ("size-only.dll", 0, 128)] {
        let mut original = PeBuilder::default().build();
        common::set_strong_name_directory(&mut original, rva, size);
        let path = common::write(scratch.path(), name, &original);

        let metadata = File::from_mem(original.clone())?.signing_metadata()?;
        assert!(hashable_ranges(&metadata)?.is_none(), "{name}");
        assert!(signer.sign(&path)?.is_none(), "{name}");
        assert_eq!(fs::read(&path)?, original, "{name}");
    }
    Ok(())
}

#[test]
fn test_slot_too_small_skips_before_signing() -> Result<()> {
    let scratch = TempDir::new()?;
    let original = PeBuilder::default().slot(64).build();
    let path = common::write(scratch.path(), "small.dll", &original);

    // An unusable key is never reached when the slot can not hold its signature
    let mut material = parse_key_blob(&common::key_blob(common::rsa_key()))?;
    material.d[5] ^= 0x01;
    let key = StrongNameKey::from_material(&material);

    let signer = StrongNameSigner::new(&key, SignOptions::default());
    assert!(signer.compute(&path)?.is_none());
    assert!(signer.sign(&path)?.is_none());
    assert_eq!(fs::read(&path)?, original);
    Ok(())
}

#[test]
fn test_unknown_cor_flags_are_preserved() -> Result<()> {
    let scratch = TempDir::new()?;
    let mut original = PeBuilder::default().build();
    original[FLAGS_OFFSET + 3] = 0x80;
    let path = common::write(scratch.path(), "flags.dll", &original);

    let key = key()?;
    let signer = StrongNameSigner::new(&key, SignOptions::default());
    assert!(signer.sign(&path)?.is_some());

    let signed = fs::read(&path)?;
    assert_eq!(signed[FLAGS_OFFSET], ORIGINAL_FLAGS | 0x08);
    assert_eq!(signed[FLAGS_OFFSET + 3], 0x80);
    assert!(signer.verify(&path)?);

    let header = File::from_mem(signed)?.cor20_header()?;
    assert!(header.is_strong_name_signed());
    assert_eq!(header.flags.bits(), 0x8000_0009);
    Ok(())
}

#[test]
fn test_crt_fields_do_not_affect_signature() -> Result<()> {
    let scratch = TempDir::new()?;
    let path = common::write(scratch.path(), "app.dll", &PeBuilder::default().build());

    let sign = |material: &RsaKeyMaterial| -> Result<Vec<u8>> {
        let key = StrongNameKey::from_material(material);
        let result = StrongNameSigner::new(&key, SignOptions::default()).compute(&path)?;
        Ok(result.expect("signature").signature)
    };

    let mut material = parse_key_blob(&common::key_blob(common::rsa_key()))?;
    let expected = sign(&material)?;

    material.dp.fill(0);
    material.dq.fill(0);
    material.inverse_q.fill(0);
    let actual = sign(&material)?;

    assert_eq!(actual, expected);
    Ok(())
}

#[test]
fn test_checksum_is_rejected() -> Result<()> {
    let scratch = TempDir::new()?;
    let original = PeBuilder::default().check_sum(0x0001_2345).build();
    let path = common::write(scratch.path(), "checksum.dll", &original);

    let key = key()?;
    let result = StrongNameSigner::new(&key, SignOptions::default()).sign(&path);

    assert!(matches!(result, Err(Error::UnsupportedPeFeature(_))));
    assert_eq!(fs::read(&path)?, original);
    Ok(())
}

#[test]
fn test_certificate_table_is_rejected() -> Result<()> {
    let scratch = TempDir::new()?;
    let original = PeBuilder::default().certificate().build();
    let path = common::write(scratch.path(), "authenticode.dll", &original);

    let key = key()?;
    let result = StrongNameSigner::new(&key, SignOptions::default()).sign(&path);

    assert!(matches!(result, Err(Error::UnsupportedPeFeature(_))));
    assert_eq!(fs::read(&path)?, original);
    Ok(())
}

#[test]
fn test_inconsistent_key_fails_per_file() -> Result<()> {
    let scratch = TempDir::new()?;
    let original = PeBuilder::default().build();
    let path = common::write(scratch.path(), "app.dll", &original);

    let mut material = parse_key_blob(&common::key_blob(common::rsa_key()))?;
    material.d[5] ^= 0x01;
    let key = StrongNameKey::from_material(&material);

    let result = StrongNameSigner::new(&key, SignOptions::default()).sign(&path);
    assert!(matches!(result, Err(Error::SigningError(_))));
    assert_eq!(fs::read(&path)?, original);
    Ok(())
}

#[test]
fn test_verify_after_sign() -> Result<()> {
    let scratch = TempDir::new()?;
    let path = common::write(scratch.path(), "app.dll", &PeBuilder::default().build());

    let key = key()?;
    let options = SignOptions {
        verify_after_sign: true,
        ..SignOptions::default()
    };
    assert!(StrongNameSigner::new(&key, options).sign(&path)?.is_some());
    Ok(())
}

#[test]
fn test_key_blob_round_trip() -> Result<()> {
    let rsa_key = common::rsa_key();
    let material = parse_key_blob(&common::key_blob(rsa_key))?;

    assert_eq!(material.bit_length, 1024);
    assert_eq!(material.modulus, rsa_key.n().to_bytes_be());
    assert_eq!(material.exponent, vec![0x01, 0x00, 0x01]);

    let key = StrongNameKey::from_material(&material);
    assert_eq!(key.signature_len(), 128);
    assert_eq!(key.public_key()?, rsa_key.to_public_key());
    assert_eq!(key.public_key_blob()?.len(), 12 + 20 + 128);
    Ok(())
}
