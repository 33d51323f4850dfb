//! RSA signing of the strong-name digest.
//!
//! Strong-name signatures are PKCS#1 v1.5 signatures over the SHA-1 digest, stored with their
//! bytes reversed (little-endian) compared to the RSA primitive's output.

use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;

use crate::{strongname::keyblob::StrongNameKey, Result};

/// Signs `digest` and returns the signature in stored byte order.
///
/// The result is exactly as long as the key modulus.
///
/// # Errors
/// Returns [`crate::Error::SigningError`] if the key material was rejected by the RSA
/// primitive or signing fails.
pub fn compute_signature(key: &StrongNameKey, digest: &[u8; 20]) -> Result<Vec<u8>> {
    let mut signature = key
        .private_key()?
        .sign(Pkcs1v15Sign::new::<Sha1>(), digest)?;
    signature.reverse();
    Ok(signature)
}

/// Checks a signature in stored byte order against `digest`.
#[must_use]
pub fn verify_signature(public_key: &RsaPublicKey, digest: &[u8; 20], stored: &[u8]) -> bool {
    let mut signature = stored.to_vec();
    signature.reverse();

    public_key
        .verify(Pkcs1v15Sign::new::<Sha1>(), digest, &signature)
        .is_ok()
}
