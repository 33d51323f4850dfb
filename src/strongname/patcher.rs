//! Writes a computed signature back into the image.
//!
//! Exactly two regions change: the CLI header `Flags` byte gains the strong-name-signed bit,
//! and the reserved signature slot receives the signature. The two writes are not atomic.

use std::{
    fs::OpenOptions,
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::{
    metadata::cor20header::CorFlags, strongname::SignResult, utils::CancellationToken, Error,
    Result,
};

/// Patches `path` in place with `result`.
///
/// The file must already exist; it is never created or resized.
///
/// # Errors
/// Returns [`crate::Error::FileError`] on I/O failure, [`crate::Error::Malformed`] for negative
/// offsets, and [`crate::Error::Cancelled`] if the token was tripped before a write.
pub fn patch_file(path: &Path, result: &SignResult, cancellation: &CancellationToken) -> Result<()> {
    let flags_offset = file_offset(result.cor_flags_offset_in_file)?;
    let signature_offset = file_offset(result.signature_offset_in_file)?;

    cancellation.check()?;
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;

    let mut flags = [0_u8; 1];
    file.seek(SeekFrom::Start(flags_offset))?;
    file.read_exact(&mut flags)?;
    flags[0] |= CorFlags::STRONG_NAME_SIGNED.bits() as u8;

    cancellation.check()?;
    file.seek(SeekFrom::Start(flags_offset))?;
    file.write_all(&flags)?;

    cancellation.check()?;
    file.seek(SeekFrom::Start(signature_offset))?;
    file.write_all(&result.signature)?;
    file.flush()?;

    log::debug!(
        "patched {}: flags at 0x{:x}, {} signature bytes at 0x{:x}",
        path.display(),
        flags_offset,
        result.signature.len(),
        signature_offset
    );
    Ok(())
}

fn file_offset(offset: i32) -> Result<u64> {
    u64::try_from(offset).map_err(|_| -> Error { malformed_error!("Negative file offset {}", offset) })
}
