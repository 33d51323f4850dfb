//! Streaming SHA-1 over the hashable ranges.
//!
//! The digest is computed as if the image were already marked strong-name signed: whenever a
//! chunk covers the CLI header `Flags` byte, the signed bit is set in the chunk buffer before
//! it is hashed. The file itself is not touched.

use std::io::{self, Read, Seek, SeekFrom};

use sha1::{Digest, Sha1};

use crate::{
    metadata::cor20header::CorFlags, strongname::ranges::ByteRange, utils::CancellationToken,
    Result,
};

/// Default read size.
pub const HASH_CHUNK_SIZE: usize = 4096;

/// Sets the strong-name-signed bit in `chunk` if it holds the `Flags` byte.
///
/// # Arguments
/// * `chunk` - Bytes just read from the file
/// * `chunk_position` - File offset of `chunk[0]`
/// * `flags_offset` - File offset of the CLI header `Flags` byte
pub fn apply_flag_patch(chunk: &mut [u8], chunk_position: u64, flags_offset: u64) {
    if flags_offset < chunk_position {
        return;
    }

    let Ok(index) = usize::try_from(flags_offset - chunk_position) else {
        return;
    };
    if let Some(byte) = chunk.get_mut(index) {
        *byte |= CorFlags::STRONG_NAME_SIGNED.bits() as u8;
    }
}

/// Computes the strong-name digest of `reader` over `ranges`.
///
/// # Arguments
/// * `reader` - The opened image
/// * `ranges` - Ranges in increasing `start` order
/// * `flags_offset` - File offset of the `Flags` byte to patch in memory, `None` to hash the
///   bytes as stored
/// * `chunk_size` - Bytes per read, must not be zero
/// * `cancellation` - Checked before every read
///
/// # Errors
/// Returns [`crate::Error::FileError`] on I/O failure, including an image that ends inside a
/// range, and [`crate::Error::Cancelled`] if the token was tripped.
pub fn hash_ranges<R: Read + Seek>(
    reader: &mut R,
    ranges: &[ByteRange],
    flags_offset: Option<u64>,
    chunk_size: usize,
    cancellation: &CancellationToken,
) -> Result<[u8; 20]> {
    let mut hasher = Sha1::new();
    let mut buffer = vec![0_u8; chunk_size.max(1)];

    for range in ranges {
        cancellation.check()?;
        reader.seek(SeekFrom::Start(u64::from(range.start)))?;

        let mut position = u64::from(range.start);
        let mut remaining = range.length as usize;
        while remaining > 0 {
            cancellation.check()?;

            let wanted = remaining.min(buffer.len());
            let read = match reader.read(&mut buffer[..wanted]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("image ends at 0x{position:x}, inside range ending at 0x{:x}", range.end()),
                    )
                    .into())
                }
                Ok(read) => read,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error.into()),
            };

            let chunk = &mut buffer[..read];
            if let Some(flags_offset) = flags_offset {
                apply_flag_patch(chunk, position, flags_offset);
            }
            hasher.update(&*chunk);

            position += read as u64;
            remaining -= read;
        }
    }

    Ok(hasher.finalize().into())
}
