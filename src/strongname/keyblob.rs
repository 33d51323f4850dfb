//! Strong-name key blob decoding.
//!
//! A strong-name key file (`.snk`) is a CryptoAPI `PRIVATEKEYBLOB`: a 12-byte header
//! (`BLOBHEADER` plus the `RSA2` magic) followed by the RSA components packed little-endian:
//!
//! ```text
//! offset  size          field
//! 0       12            header (not validated)
//! 12      4             bit length
//! 16      4             public exponent
//! 20      n             modulus
//! 20+n    n/2 (x5)      P, Q, DP, DQ, InverseQ
//! 20+7n/2 n             private exponent D
//! ```
//!
//! where `n = bitlen / 8` and `n/2` rounds up. Decoding is a pure byte-order reversal per
//! field. No cryptographic consistency check happens here; a bogus key decodes fine and is
//! rejected later by the RSA primitive.
//!
//! [`StrongNameKey`] wraps the decoded material for signing and exposes the public half in the
//! ECMA-335 `PublicKey` blob form together with its public key token.

use std::{fmt, fs, path::Path};

use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    file::{io::write_le_at, parser::Parser},
    Error, Result,
};

/// Size of the opaque header in front of the key fields.
pub const KEY_BLOB_HEADER_SIZE: usize = 12;

/// `CALG_RSA_SIGN`, the signature algorithm id of strong-name public keys.
pub const CALG_RSA_SIGN: u32 = 0x0000_2400;
/// `CALG_SHA1`, the hash algorithm id of strong-name public keys.
pub const CALG_SHA1: u32 = 0x0000_8004;

const PUBLICKEYBLOB: u8 = 0x06;
const CUR_BLOB_VERSION: u8 = 0x02;
const RSA1_MAGIC: u32 = 0x3141_5352;
const PUBLIC_KEY_PREFIX_SIZE: usize = 12;
const PUBLIC_KEY_HEADER_SIZE: usize = 20;

/// Decoded RSA private key components, all big-endian.
///
/// Every buffer is wiped when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RsaKeyMaterial {
    /// Declared key size in bits
    pub bit_length: u32,
    /// Public modulus, `bit_length / 8` bytes
    pub modulus: Vec<u8>,
    /// Public exponent without leading zero bytes
    pub exponent: Vec<u8>,
    /// Private exponent, `bit_length / 8` bytes
    pub d: Vec<u8>,
    /// First prime
    pub p: Vec<u8>,
    /// Second prime
    pub q: Vec<u8>,
    /// `D mod (P - 1)`
    pub dp: Vec<u8>,
    /// `D mod (Q - 1)`
    pub dq: Vec<u8>,
    /// `Q^-1 mod P`
    pub inverse_q: Vec<u8>,
}

impl fmt::Debug for RsaKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyMaterial")
            .field("bit_length", &self.bit_length)
            .field("modulus_len", &self.modulus.len())
            .field("exponent", &self.exponent)
            .finish_non_exhaustive()
    }
}

/// Decodes a strong-name private key blob into big-endian RSA components.
///
/// # Arguments
/// * `blob` - The complete key file contents, including the 12-byte header
///
/// # Errors
/// Returns [`crate::Error::MalformedKeyBlob`] if the blob is shorter than the header plus the
/// fields implied by its bit length.
///
/// # Examples
///
/// ```rust,no_run
/// use dotsign::strongname::parse_key_blob;
///
/// let blob = std::fs::read("key.snk")?;
/// let material = parse_key_blob(&blob)?;
/// println!("{}-bit key, exponent {:02x?}", material.bit_length, material.exponent);
/// # Ok::<(), dotsign::Error>(())
/// ```
pub fn parse_key_blob(blob: &[u8]) -> Result<RsaKeyMaterial> {
    if blob.len() < KEY_BLOB_HEADER_SIZE {
        return Err(key_blob_error!(
            "{} bytes is shorter than the {}-byte header",
            blob.len(),
            KEY_BLOB_HEADER_SIZE
        ));
    }

    log::debug!(
        "key blob type 0x{:02x}, magic {:02x?}",
        blob[0],
        &blob[8..KEY_BLOB_HEADER_SIZE]
    );

    let mut parser = Parser::new(blob);
    parser
        .advance_by(KEY_BLOB_HEADER_SIZE)
        .map_err(|_| key_blob_error!("{} bytes has no room for the header", blob.len()))?;
    let bit_length = parser
        .read_le::<u32>()
        .map_err(|_| key_blob_error!("missing bit length after {} header bytes", KEY_BLOB_HEADER_SIZE))?;

    let modulus_len = (bit_length / 8) as usize;
    let half_len = modulus_len.div_ceil(2);
    let required = modulus_len
        .checked_mul(2)
        .and_then(|both| half_len.checked_mul(5).and_then(|crt| both.checked_add(crt)))
        .and_then(|fields| fields.checked_add(4))
        .ok_or_else(|| key_blob_error!("bit length {} overflows", bit_length))?;

    if parser.remaining() < required {
        return Err(key_blob_error!(
            "{}-bit key needs {} bytes of key fields, found {}",
            bit_length,
            required,
            parser.remaining()
        ));
    }

    let mut read_field = |length: usize| {
        parser
            .read_reversed(length)
            .map_err(|_| key_blob_error!("field of {} bytes runs past the end", length))
    };

    let mut exponent = read_field(4)?;
    let leading_zeros = exponent.iter().take_while(|&&byte| byte == 0).count();
    exponent.drain(..leading_zeros);

    let modulus = read_field(modulus_len)?;
    let p = read_field(half_len)?;
    let q = read_field(half_len)?;
    let dp = read_field(half_len)?;
    let dq = read_field(half_len)?;
    let inverse_q = read_field(half_len)?;
    let d = read_field(modulus_len)?;

    Ok(RsaKeyMaterial {
        bit_length,
        modulus,
        exponent,
        d,
        p,
        q,
        dp,
        dq,
        inverse_q,
    })
}

/// A strong-name signing key, loaded once and shared read-only by every file of a batch.
///
/// The RSA primitive is built when the key is loaded, from the modulus, both exponents and the
/// primes. It derives its own CRT parameters, so the blob's `DP`, `DQ` and `InverseQ` are
/// decoded but not used for signing.
///
/// If the primitive rejects the material, the rejection is kept and reported as
/// [`crate::Error::SigningError`] by every signing attempt, so a bad key fails each file rather
/// than aborting the batch.
pub struct StrongNameKey {
    bit_length: u32,
    modulus: Vec<u8>,
    exponent: Vec<u8>,
    private_key: std::result::Result<RsaPrivateKey, String>,
}

impl StrongNameKey {
    /// Reads and decodes a key file from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, or
    /// [`crate::Error::MalformedKeyBlob`] if it is truncated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut blob = fs::read(path)?;
        let key = Self::from_blob(&blob);
        blob.zeroize();
        key
    }

    /// Decodes a key from the raw key file contents.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedKeyBlob`] if the blob is truncated.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        let material = parse_key_blob(blob)?;
        Ok(Self::from_material(&material))
    }

    /// Builds a signing key from decoded components.
    #[must_use]
    pub fn from_material(material: &RsaKeyMaterial) -> Self {
        let private_key = RsaPrivateKey::from_components(
            BigUint::from_bytes_be(&material.modulus),
            BigUint::from_bytes_be(&material.exponent),
            BigUint::from_bytes_be(&material.d),
            vec![
                BigUint::from_bytes_be(&material.p),
                BigUint::from_bytes_be(&material.q),
            ],
        )
        .map_err(|error| {
            log::warn!("RSA primitive rejected the key material: {error}");
            error.to_string()
        });

        StrongNameKey {
            bit_length: material.bit_length,
            modulus: material.modulus.clone(),
            exponent: material.exponent.clone(),
            private_key,
        }
    }

    /// Declared key size in bits.
    #[must_use]
    pub fn bit_length(&self) -> u32 {
        self.bit_length
    }

    /// Length in bytes of a signature produced with this key.
    #[must_use]
    pub fn signature_len(&self) -> usize {
        match &self.private_key {
            Ok(private_key) => rsa::traits::PublicKeyParts::size(private_key),
            Err(_) => self.modulus.len(),
        }
    }

    /// Returns the RSA private key.
    ///
    /// # Errors
    /// Returns [`crate::Error::SigningError`] if the RSA primitive rejected the key material.
    pub fn private_key(&self) -> Result<&RsaPrivateKey> {
        self.private_key
            .as_ref()
            .map_err(|message| Error::SigningError(message.clone()))
    }

    /// Returns the RSA public key.
    ///
    /// # Errors
    /// Returns [`crate::Error::SigningError`] if the modulus and exponent do not form a valid
    /// RSA public key.
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        match &self.private_key {
            Ok(private_key) => Ok(private_key.to_public_key()),
            Err(_) => Ok(RsaPublicKey::new(
                BigUint::from_bytes_be(&self.modulus),
                BigUint::from_bytes_be(&self.exponent),
            )?),
        }
    }

    /// Encodes the public half as an ECMA-335 `PublicKey` blob (II.6.2.1.3).
    ///
    /// This is the form stored in the `Assembly` table of a strong-named assembly: the
    /// signature and hash algorithm ids, the length of the CryptoAPI `PUBLICKEYBLOB` that
    /// follows, and the `PUBLICKEYBLOB` itself with a little-endian modulus.
    ///
    /// # Errors
    /// Returns [`crate::Error::SigningError`] if the public exponent does not fit the 32-bit
    /// `RSAPUBKEY.pubexp` field.
    pub fn public_key_blob(&self) -> Result<Vec<u8>> {
        if self.exponent.len() > 4 {
            return Err(Error::SigningError(format!(
                "public exponent of {} bytes does not fit RSAPUBKEY",
                self.exponent.len()
            )));
        }
        let exponent = self
            .exponent
            .iter()
            .fold(0_u32, |value, &byte| (value << 8) | u32::from(byte));

        let key_blob_len = PUBLIC_KEY_HEADER_SIZE + self.modulus.len();
        let mut blob = vec![0_u8; PUBLIC_KEY_PREFIX_SIZE + key_blob_len];
        let mut offset = 0;

        write_le_at(&mut blob, &mut offset, CALG_RSA_SIGN)?;
        write_le_at(&mut blob, &mut offset, CALG_SHA1)?;
        write_le_at(&mut blob, &mut offset, key_blob_len as u32)?;
        write_le_at(&mut blob, &mut offset, PUBLICKEYBLOB)?;
        write_le_at(&mut blob, &mut offset, CUR_BLOB_VERSION)?;
        write_le_at(&mut blob, &mut offset, 0_u16)?;
        write_le_at(&mut blob, &mut offset, CALG_RSA_SIGN)?;
        write_le_at(&mut blob, &mut offset, RSA1_MAGIC)?;
        write_le_at(&mut blob, &mut offset, self.bit_length)?;
        write_le_at(&mut blob, &mut offset, exponent)?;

        for (slot, byte) in blob[offset..].iter_mut().zip(self.modulus.iter().rev()) {
            *slot = *byte;
        }

        Ok(blob)
    }

    /// Computes the 8-byte public key token: the last 8 bytes of the SHA-1 of the
    /// [`StrongNameKey::public_key_blob`], in reverse order.
    ///
    /// # Errors
    /// Propagates errors from [`StrongNameKey::public_key_blob`].
    pub fn public_key_token(&self) -> Result<[u8; 8]> {
        let digest = Sha1::digest(self.public_key_blob()?);

        let mut token = [0_u8; 8];
        for (slot, byte) in token.iter_mut().zip(digest.iter().rev()) {
            *slot = *byte;
        }
        Ok(token)
    }
}

impl fmt::Debug for StrongNameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrongNameKey")
            .field("bit_length", &self.bit_length)
            .field("usable", &self.private_key.is_ok())
            .finish_non_exhaustive()
    }
}
