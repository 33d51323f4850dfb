//! Shared fixtures for the integration tests: a minimal managed PE image and `.snk` key blobs.
#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use rand::{rngs::StdRng, SeedableRng};
use rsa::{
    traits::{PrivateKeyParts, PublicKeyParts},
    BigUint, RsaPrivateKey,
};

/// Length of a generated image without a certificate.
pub const FILE_LEN: usize = 0x600;
/// File offset of the CLI header.
pub const COR_HEADER_OFFSET: usize = 0x200;
/// File offset of the CLI header `Flags` byte.
pub const FLAGS_OFFSET: usize = COR_HEADER_OFFSET + 16;
/// File offset of the strong-name signature slot.
pub const SLOT_OFFSET: usize = 0x300;
/// Original CLI header flags (`ILOnly`).
pub const ORIGINAL_FLAGS: u8 = 0x01;
/// File offset of the CLI header `StrongNameSignature` RVA, followed by its size.
pub const STRONG_NAME_DIRECTORY: usize = COR_HEADER_OFFSET + 32;
/// File offset of the metadata root.
pub const METADATA_ROOT: usize = COR_HEADER_OFFSET + METADATA_ROOT_OFFSET;

const PE_OFFSET: usize = 0x80;
const OPTIONAL_HEADER_OFFSET: usize = PE_OFFSET + 4 + 20;
const SECTION_RVA: u32 = 0x2000;
const SECTION_LEN: u32 = 0x400;
const METADATA_ROOT_OFFSET: usize = 0x48;
const METADATA_VERSION: &[u8] = b"v4.0.30319\0\0";
// Signature, versions, reserved, version length and string, flags and stream count
const METADATA_ROOT_LEN: usize = 16 + METADATA_VERSION.len() + 4;

/// Builds a single-section managed image with a `.text` section at file offset 0x200 that holds
/// the CLI header and a strong-name slot at 0x300.
#[derive(Debug, Clone)]
pub struct PeBuilder {
    pub machine: u16,
    pub strong_name_size: u32,
    pub check_sum: u32,
    pub certificate: bool,
}

impl Default for PeBuilder {
    fn default() -> Self {
        PeBuilder {
            machine: 0x8664,
            strong_name_size: 128,
            check_sum: 0,
            certificate: false,
        }
    }
}

impl PeBuilder {
    pub fn pe32() -> Self {
        PeBuilder {
            machine: 0x014C,
            ..PeBuilder::default()
        }
    }

    pub fn slot(mut self, size: u32) -> Self {
        self.strong_name_size = size;
        self
    }

    pub fn check_sum(mut self, value: u32) -> Self {
        self.check_sum = value;
        self
    }

    pub fn certificate(mut self) -> Self {
        self.certificate = true;
        self
    }

    pub fn is_64_bit(&self) -> bool {
        self.machine == 0x8664
    }

    pub fn optional_header_size(&self) -> usize {
        if self.is_64_bit() {
            240
        } else {
            224
        }
    }

    /// Number of header bytes covered by the hash.
    pub fn signable_header_size(&self) -> usize {
        128 + 4 + 20 + self.optional_header_size() + 40
    }

    pub fn build(&self) -> Vec<u8> {
        let mut image = vec![0_u8; FILE_LEN];

        // DOS header
        image[0..2].copy_from_slice(b"MZ");
        put_u32(&mut image, 0x3C, PE_OFFSET as u32);
        image[0x40..0x4E].copy_from_slice(b"dotsign tests\0");

        // COFF header
        image[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");
        let coff = PE_OFFSET + 4;
        put_u16(&mut image, coff, self.machine);
        put_u16(&mut image, coff + 2, 1);
        put_u16(&mut image, coff + 16, self.optional_header_size() as u16);
        put_u16(
            &mut image,
            coff + 18,
            if self.is_64_bit() { 0x2022 } else { 0x2102 },
        );

        // Optional header, standard fields
        let optional = OPTIONAL_HEADER_OFFSET;
        put_u16(
            &mut image,
            optional,
            if self.is_64_bit() { 0x20B } else { 0x10B },
        );
        image[optional + 2] = 48;
        put_u32(&mut image, optional + 4, SECTION_LEN);
        put_u32(&mut image, optional + 20, SECTION_RVA);
        if self.is_64_bit() {
            put_u64(&mut image, optional + 24, 0x1_8000_0000);
        } else {
            put_u32(&mut image, optional + 24, SECTION_RVA);
            put_u32(&mut image, optional + 28, 0x1000_0000);
        }

        // Optional header, windows fields
        let windows = optional + 32;
        put_u32(&mut image, windows, 0x2000);
        put_u32(&mut image, windows + 4, 0x200);
        put_u16(&mut image, windows + 8, 4);
        put_u16(&mut image, windows + 16, 4);
        put_u32(&mut image, windows + 24, 0x4000);
        put_u32(&mut image, windows + 28, 0x200);
        put_u32(&mut image, windows + 32, self.check_sum);
        put_u16(&mut image, windows + 36, 3);
        put_u16(&mut image, windows + 38, 0x8540);
        let directories = if self.is_64_bit() {
            put_u64(&mut image, windows + 40, 0x10_0000);
            put_u64(&mut image, windows + 48, 0x1000);
            put_u64(&mut image, windows + 56, 0x10_0000);
            put_u64(&mut image, windows + 64, 0x1000);
            put_u32(&mut image, windows + 76, 16);
            windows + 80
        } else {
            put_u32(&mut image, windows + 40, 0x10_0000);
            put_u32(&mut image, windows + 44, 0x1000);
            put_u32(&mut image, windows + 48, 0x10_0000);
            put_u32(&mut image, windows + 52, 0x1000);
            put_u32(&mut image, windows + 60, 16);
            windows + 64
        };
        assert_eq!(directories, optional + self.optional_header_size() - 128);

        // CLI header directory
        put_u32(&mut image, directories + 14 * 8, SECTION_RVA);
        put_u32(&mut image, directories + 14 * 8 + 4, 72);

        // Section table
        let section = optional + self.optional_header_size();
        image[section..section + 5].copy_from_slice(b".text");
        put_u32(&mut image, section + 8, SECTION_LEN);
        put_u32(&mut image, section + 12, SECTION_RVA);
        put_u32(&mut image, section + 16, SECTION_LEN);
        put_u32(&mut image, section + 20, COR_HEADER_OFFSET as u32);
        put_u32(&mut image, section + 36, 0x6000_0020);

        // Section body: pattern first, header fields and the zeroed slot on top
        for (index, byte) in image[COR_HEADER_OFFSET..].iter_mut().enumerate() {
            *byte = (index * 7 % 253) as u8;
        }
        image[SLOT_OFFSET..SLOT_OFFSET + self.strong_name_size as usize].fill(0);

        let cor = COR_HEADER_OFFSET;
        image[cor..cor + 72].fill(0);
        put_u32(&mut image, cor, 72);
        put_u16(&mut image, cor + 4, 2);
        put_u16(&mut image, cor + 6, 5);
        put_u32(&mut image, cor + 8, SECTION_RVA + METADATA_ROOT_OFFSET as u32);
        put_u32(&mut image, cor + 12, METADATA_ROOT_LEN as u32);
        put_u32(&mut image, cor + 16, u32::from(ORIGINAL_FLAGS));
        put_u32(&mut image, cor + 20, 0x0600_0001);
        if self.strong_name_size > 0 {
            put_u32(
                &mut image,
                cor + 32,
                SECTION_RVA + (SLOT_OFFSET - COR_HEADER_OFFSET) as u32,
            );
            put_u32(&mut image, cor + 36, self.strong_name_size);
        }

        // Metadata root (ECMA-335 II.24.2.1) without streams
        let root = cor + METADATA_ROOT_OFFSET;
        image[root..root + METADATA_ROOT_LEN].fill(0);
        image[root..root + 4].copy_from_slice(b"BSJB");
        put_u16(&mut image, root + 4, 1);
        put_u16(&mut image, root + 6, 1);
        put_u32(&mut image, root + 12, METADATA_VERSION.len() as u32);
        image[root + 16..root + 16 + METADATA_VERSION.len()].copy_from_slice(METADATA_VERSION);

        if self.certificate {
            let offset = image.len();
            put_u32(&mut image, directories + 4 * 8, offset as u32);
            put_u32(&mut image, directories + 4 * 8 + 4, 16);

            image.extend_from_slice(&16_u32.to_le_bytes());
            image.extend_from_slice(&0x0200_u16.to_le_bytes());
            image.extend_from_slice(&0x0002_u16.to_le_bytes());
            image.extend_from_slice(&[0x30, 0x82, 0, 0, 0, 0, 0, 0]);
        }

        image
    }
}

/// A 1024-bit key generated once per test binary.
pub fn rsa_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        RsaPrivateKey::new(&mut rng, 1024).expect("key generation")
    })
}

/// Encodes `key` as a strong-name `PRIVATEKEYBLOB`.
pub fn key_blob(key: &RsaPrivateKey) -> Vec<u8> {
    let bit_length = key.n().bits();
    let modulus_len = bit_length / 8;
    let half_len = modulus_len.div_ceil(2);
    let primes = key.primes();

    let mut blob = vec![0x07, 0x02, 0x00, 0x00, 0x00, 0x24, 0x00, 0x00];
    blob.extend_from_slice(b"RSA2");
    blob.extend_from_slice(&(bit_length as u32).to_le_bytes());
    blob.extend(le_padded(key.e(), 4));
    blob.extend(le_padded(key.n(), modulus_len));
    blob.extend(le_padded(&primes[0], half_len));
    blob.extend(le_padded(&primes[1], half_len));
    blob.extend(le_padded(key.dp().expect("precomputed"), half_len));
    blob.extend(le_padded(key.dq().expect("precomputed"), half_len));
    blob.extend(le_padded(
        &key.crt_coefficient().expect("precomputed"),
        half_len,
    ));
    blob.extend(le_padded(key.d(), modulus_len));
    blob
}

fn le_padded(value: &BigUint, len: usize) -> Vec<u8> {
    let mut bytes = value.to_bytes_le();
    bytes.resize(len, 0);
    bytes
}

pub fn write(directory: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = directory.join(name);
    fs::write(&path, data).expect("write fixture");
    path
}

/// Offsets at which `a` and `b` differ.
pub fn changed_offsets(a: &[u8], b: &[u8]) -> Vec<usize> {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .enumerate()
        .filter(|(_, (x, y))| x != y)
        .map(|(offset, _)| offset)
        .collect()
}

/// Overwrites the CLI header strong-name directory of a built image.
pub fn set_strong_name_directory(image: &mut [u8], rva: u32, size: u32) {
    put_u32(image, STRONG_NAME_DIRECTORY, rva);
    put_u32(image, STRONG_NAME_DIRECTORY + 4, size);
}

fn put_u16(image: &mut [u8], offset: usize, value: u16) {
    image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(image: &mut [u8], offset: usize, value: u64) {
    image[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
