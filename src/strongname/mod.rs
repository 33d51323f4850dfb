//! Strong-name signing of .NET assemblies.
//!
//! A strong-name signature is an RSA PKCS#1 v1.5 signature over the SHA-1 digest of most of an
//! image's bytes, stored in a slot the compiler reserved when the assembly was delay-signed.
//! Signing fills that slot and sets the `StrongNameSigned` bit in the CLI header flags.
//!
//! # Pipeline
//!
//! Each file runs through the same sequence of stages:
//!
//! 1. [`crate::file::File::signing_metadata`] reads the PE and CLI headers
//! 2. [`ranges::hashable_ranges`] selects the bytes to hash
//! 3. [`hasher::hash_ranges`] streams them through SHA-1, with the flag bit already set in memory
//! 4. [`signature::compute_signature`] signs the digest
//! 5. [`patcher::patch_file`] writes the flag byte and the signature back
//!
//! An image without a reserved slot, or with a slot too small for the key, yields `Ok(None)`
//! and is left untouched.
//!
//! # Batches
//!
//! [`StrongNameSigner::sign_all`] signs many files in parallel with `rayon`. The key is shared
//! read-only; each file is processed by exactly one worker. A failure is reported for its
//! file only. A [`crate::utils::CancellationToken`] in [`SignOptions`] is checked before every
//! read and write; cancellation observed before the patch stage leaves a file unmodified.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotsign::{SignOptions, SignOutcome, StrongNameKey, StrongNameSigner};
//! use std::path::Path;
//!
//! let key = StrongNameKey::from_file(Path::new("key.snk"))?;
//! let signer = StrongNameSigner::new(&key, SignOptions::default());
//!
//! for outcome in signer.sign_all(&["a.dll", "b.dll"]) {
//!     match outcome {
//!         SignOutcome::Signed { path, .. } => println!("signed {}", path.display()),
//!         SignOutcome::Skipped { path } => println!("no slot in {}", path.display()),
//!         SignOutcome::Failed { path, error } => eprintln!("{}: {}", path.display(), error),
//!     }
//! }
//! # Ok::<(), dotsign::Error>(())
//! ```

pub mod hasher;
pub mod keyblob;
pub mod patcher;
pub mod ranges;
pub mod signature;

use std::{
    fs,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use rsa::traits::PublicKeyParts;

use crate::{file::File, utils::CancellationToken, Error, Result};

pub use hasher::{apply_flag_patch, hash_ranges, HASH_CHUNK_SIZE};
pub use keyblob::{parse_key_blob, RsaKeyMaterial, StrongNameKey};
pub use patcher::patch_file;
pub use ranges::{hashable_ranges, signable_header_size, ByteRange, HashableRanges};
pub use signature::{compute_signature, verify_signature};

/// A signature ready to be written into an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResult {
    /// Signature bytes in stored (reversed) order
    pub signature: Vec<u8>,
    /// File offset of the reserved signature slot
    pub signature_offset_in_file: i32,
    /// File offset of the CLI header `Flags` byte
    pub cor_flags_offset_in_file: i32,
}

/// Settings shared by every file a [`StrongNameSigner`] processes.
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Bytes per read while hashing
    pub chunk_size: usize,
    /// Re-read and verify every image after patching it
    pub verify_after_sign: bool,
    /// Checked before every read and write
    pub cancellation: CancellationToken,
}

impl Default for SignOptions {
    fn default() -> Self {
        SignOptions {
            chunk_size: HASH_CHUNK_SIZE,
            verify_after_sign: false,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Result of signing one file of a batch.
#[derive(Debug)]
pub enum SignOutcome {
    /// The image was patched
    Signed {
        /// The image
        path: PathBuf,
        /// Number of signature bytes written
        signature_len: usize,
    },
    /// The image has no usable slot and was left untouched
    Skipped {
        /// The image
        path: PathBuf,
    },
    /// Signing failed for this image
    Failed {
        /// The image
        path: PathBuf,
        /// What went wrong
        error: Error,
    },
}

impl SignOutcome {
    /// The image this outcome belongs to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            SignOutcome::Signed { path, .. }
            | SignOutcome::Skipped { path }
            | SignOutcome::Failed { path, .. } => path,
        }
    }

    /// Returns `true` for [`SignOutcome::Failed`].
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, SignOutcome::Failed { .. })
    }
}

/// Signs images with one key.
pub struct StrongNameSigner<'a> {
    key: &'a StrongNameKey,
    options: SignOptions,
}

impl<'a> StrongNameSigner<'a> {
    /// Creates a signer for `key`.
    #[must_use]
    pub fn new(key: &'a StrongNameKey, options: SignOptions) -> Self {
        StrongNameSigner { key, options }
    }

    /// The options this signer runs with.
    #[must_use]
    pub fn options(&self) -> &SignOptions {
        &self.options
    }

    /// Computes the signature for `path` without modifying it.
    ///
    /// Returns `Ok(None)` if the image has no reserved slot or the signature does not fit it.
    ///
    /// # Errors
    /// Returns an error if the image can not be parsed or read, uses an unsupported PE feature,
    /// the key is unusable, or the operation was cancelled.
    pub fn compute(&self, path: &Path) -> Result<Option<SignResult>> {
        self.options.cancellation.check()?;

        let metadata = File::from_file(path)?.signing_metadata()?;
        let Some(plan) = hashable_ranges(&metadata)? else {
            log::info!("{}: no strong name slot", path.display());
            return Ok(None);
        };

        let slot = plan.strong_name_directory;
        let signature_len = self.key.signature_len();
        if signature_len == 0 || signature_len > slot.size as usize {
            log::info!(
                "{}: {}-byte signature does not fit the {}-byte slot",
                path.display(),
                signature_len,
                slot.size
            );
            return Ok(None);
        }

        let flags_offset = metadata.cor_flags_offset();
        let digest = {
            let mut image = fs::File::open(path)?;
            hash_ranges(
                &mut image,
                &plan.ranges,
                Some(u64::from(flags_offset)),
                self.options.chunk_size,
                &self.options.cancellation,
            )?
        };
        log::debug!(
            "{}: {} bytes in {} ranges, digest {:02x?}",
            path.display(),
            plan.hashed_len(),
            plan.ranges.len(),
            digest
        );

        let signature = compute_signature(self.key, &digest)?;
        if signature.len() != signature_len {
            return Err(Error::SigningError(format!(
                "expected a {}-byte signature, got {} bytes",
                signature_len,
                signature.len()
            )));
        }

        Ok(Some(SignResult {
            signature,
            signature_offset_in_file: slot.offset_in_file,
            cor_flags_offset_in_file: i32::try_from(flags_offset).map_err(|_| {
                malformed_error!("CLI header flags offset 0x{:x} exceeds i32", flags_offset)
            })?,
        }))
    }

    /// Signs `path` in place.
    ///
    /// Returns the written signature, or `Ok(None)` if the image was left untouched.
    ///
    /// # Errors
    /// Returns the errors of [`StrongNameSigner::compute`] and [`patch_file`]. With
    /// [`SignOptions::verify_after_sign`] set, a signature that fails to verify is reported as
    /// [`crate::Error::SigningError`].
    pub fn sign(&self, path: &Path) -> Result<Option<SignResult>> {
        let Some(result) = self.compute(path)? else {
            return Ok(None);
        };

        patch_file(path, &result, &self.options.cancellation)?;

        if self.options.verify_after_sign && !self.verify(path)? {
            return Err(Error::SigningError(format!(
                "{} does not verify after signing",
                path.display()
            )));
        }

        Ok(Some(result))
    }

    /// Checks the strong-name signature stored in `path` against this signer's public key.
    ///
    /// The image is hashed as stored, so an image whose flag bit is not set does not verify.
    /// An image without a reserved slot returns `Ok(false)`.
    ///
    /// # Errors
    /// Returns an error if the image can not be parsed or read, or uses an unsupported PE
    /// feature.
    pub fn verify(&self, path: &Path) -> Result<bool> {
        let metadata = File::from_file(path)?.signing_metadata()?;
        let Some(plan) = hashable_ranges(&metadata)? else {
            return Ok(false);
        };

        let public_key = self.key.public_key()?;
        let slot = plan.strong_name_directory;
        let signature_len = public_key.size();
        if signature_len > slot.size as usize {
            return Ok(false);
        }

        let mut image = fs::File::open(path)?;
        let digest = hash_ranges(
            &mut image,
            &plan.ranges,
            None,
            self.options.chunk_size,
            &self.options.cancellation,
        )?;

        let mut stored = vec![0_u8; signature_len];
        image.seek(SeekFrom::Start(slot.offset_in_file as u64))?;
        image.read_exact(&mut stored)?;

        Ok(verify_signature(&public_key, &digest, &stored))
    }

    /// Signs every image in `paths` in parallel.
    ///
    /// Returns one outcome per input, in input order. A failing image does not stop the others.
    pub fn sign_all<P: AsRef<Path> + Sync>(&self, paths: &[P]) -> Vec<SignOutcome> {
        paths
            .par_iter()
            .map(|path| self.outcome(path.as_ref()))
            .collect()
    }

    fn outcome(&self, path: &Path) -> SignOutcome {
        let path_buf = path.to_path_buf();
        match self.sign(path) {
            Ok(Some(result)) => {
                log::info!(
                    "{}: signed ({} bytes)",
                    path.display(),
                    result.signature.len()
                );
                SignOutcome::Signed {
                    path: path_buf,
                    signature_len: result.signature.len(),
                }
            }
            Ok(None) => {
                log::info!("{}: skipped", path.display());
                SignOutcome::Skipped { path: path_buf }
            }
            Err(error) => {
                log::warn!("{}: {}", path.display(), error);
                SignOutcome::Failed {
                    path: path_buf,
                    error,
                }
            }
        }
    }
}

/// Loads the key at `key_path` once and signs every image in `paths`.
///
/// # Errors
/// Returns an error only if the key can not be loaded; in that case no image is touched.
/// Per-image failures are reported in the returned outcomes.
pub fn sign_files<P: AsRef<Path> + Sync>(
    key_path: &Path,
    paths: &[P],
    options: SignOptions,
) -> Result<Vec<SignOutcome>> {
    let key = StrongNameKey::from_file(key_path)?;
    log::debug!("loaded {}-bit key from {}", key.bit_length(), key_path.display());

    Ok(StrongNameSigner::new(&key, options).sign_all(paths))
}
