//! Selection of the byte ranges covered by a strong-name signature.
//!
//! ECMA-335 II.6.2.1.3 hashes the whole image except the signature slot itself, the Authenticode
//! checksum and certificate directory, and the padding between the end of the section table
//! and the first section. The PE headers are walked the same way the platform signers do:
//!
//! 1. The signable header prefix is DOS header, PE signature, COFF header, optional header and
//!    section table. Rounding it up to `FileAlignment` gives the aligned header size.
//! 2. Section one is stretched to start at offset 0, so its span covers the headers too.
//! 3. From that span the signable prefix is hashed and the alignment padding skipped. Whatever
//!    remains, and every later section, is hashed with the signature slot cut out.
//!
//! Bytes after the last section's raw data (debug data, appended payloads) are not covered.

use crate::{
    file::headers::{
        PeHeaderMetadata, RawDirectoryEntry, COFF_HEADER_SIZE, DOS_HEADER_SIZE,
        PE_SIGNATURE_SIZE, SECTION_HEADER_SIZE,
    },
    utils::align_up,
    Error, Result,
};

/// A contiguous run of file bytes fed to the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteRange {
    /// Offset from the start of the file
    pub start: u32,
    /// Number of bytes
    pub length: u32,
}

impl ByteRange {
    /// Creates a new range.
    #[must_use]
    pub fn new(start: u32, length: u32) -> Self {
        ByteRange { start, length }
    }

    /// Exclusive end offset.
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.start) + u64::from(self.length)
    }
}

/// The hash plan for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashableRanges {
    /// Ranges in strictly increasing `start` order, non-overlapping, none empty
    pub ranges: Vec<ByteRange>,
    /// The strong-name signature slot excluded from `ranges`
    pub strong_name_directory: RawDirectoryEntry,
}

impl HashableRanges {
    /// Total number of hashed bytes.
    #[must_use]
    pub fn hashed_len(&self) -> u64 {
        self.ranges.iter().map(|range| u64::from(range.length)).sum()
    }
}

/// Size of the header prefix that is hashed: everything up to the end of the section table.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the section count makes the size overflow.
pub fn signable_header_size(metadata: &PeHeaderMetadata) -> Result<u32> {
    u32::try_from(metadata.sections.len())
        .ok()
        .and_then(|count| count.checked_mul(SECTION_HEADER_SIZE))
        .and_then(|table| {
            table.checked_add(
                DOS_HEADER_SIZE
                    + PE_SIGNATURE_SIZE
                    + COFF_HEADER_SIZE
                    + metadata.optional_header_size(),
            )
        })
        .ok_or_else(|| {
            malformed_error!(
                "Section table of {} entries overflows the header size",
                metadata.sections.len()
            )
        })
}

/// Computes the ranges to hash for one image.
///
/// Returns `Ok(None)` if the image has no reserved strong-name slot, which is not an error:
/// such an image can not be signed without re-linking.
///
/// # Errors
/// Returns [`crate::Error::UnsupportedPeFeature`] for a non-zero checksum or a populated
/// certificate table, and [`crate::Error::Malformed`] if sections overlap or run past 4 GiB.
///
/// # Examples
///
/// ```rust,no_run
/// use dotsign::{File, strongname::hashable_ranges};
/// use std::path::Path;
///
/// let file = File::from_file(Path::new("app.dll"))?;
/// if let Some(plan) = hashable_ranges(&file.signing_metadata()?)? {
///     for range in &plan.ranges {
///         println!("0x{:08x} +{}", range.start, range.length);
///     }
/// }
/// # Ok::<(), dotsign::Error>(())
/// ```
pub fn hashable_ranges(metadata: &PeHeaderMetadata) -> Result<Option<HashableRanges>> {
    let directory = match metadata.strong_name_signature {
        Some(directory) if directory.size > 0 && directory.offset_in_file >= 0 => directory,
        _ => return Ok(None),
    };

    if metadata.check_sum != 0 {
        return Err(Error::UnsupportedPeFeature(format!(
            "PE checksum is set (0x{:08x})",
            metadata.check_sum
        )));
    }
    if metadata.certificate_table.size != 0 {
        return Err(Error::UnsupportedPeFeature(format!(
            "certificate table is populated ({} bytes at 0x{:x})",
            metadata.certificate_table.size, metadata.certificate_table.offset
        )));
    }

    let signable = signable_header_size(metadata)?;
    let aligned = align_up(signable, metadata.file_alignment)?;

    let excluded_start = directory.offset_in_file as u64;
    let excluded_end = excluded_start + directory.size as u64;

    let mut header_to_sign = u64::from(signable);
    let mut header_remaining = u64::from(aligned);
    let mut ranges = Vec::with_capacity(metadata.sections.len() + 2);

    for (index, section) in metadata.sections.iter().enumerate() {
        let (mut start, mut length) = if index == 0 {
            (
                0,
                u64::from(section.pointer_to_raw_data) + u64::from(section.size_of_raw_data),
            )
        } else {
            (
                u64::from(section.pointer_to_raw_data),
                u64::from(section.size_of_raw_data),
            )
        };

        while length > 0 {
            if header_remaining == 0 {
                push_excluding(&mut ranges, start, start + length, excluded_start, excluded_end)?;
                break;
            }

            let consumed = if header_to_sign > 0 {
                let consumed = header_to_sign.min(length);
                push_range(&mut ranges, start, start + consumed)?;
                header_to_sign -= consumed;
                consumed
            } else {
                header_remaining.min(length)
            };

            header_remaining -= consumed;
            start += consumed;
            length -= consumed;
        }
    }

    ranges.sort_by_key(|range| range.start);

    for pair in ranges.windows(2) {
        if pair[0].end() > u64::from(pair[1].start) {
            return Err(malformed_error!(
                "Sections overlap at 0x{:x}..0x{:x}",
                pair[1].start,
                pair[0].end()
            ));
        }
    }

    log::debug!(
        "{} ranges, signable header {} bytes, aligned {} bytes",
        ranges.len(),
        signable,
        aligned
    );

    Ok(Some(HashableRanges {
        ranges,
        strong_name_directory: directory,
    }))
}

/// Emits `[start, end)` minus the signature slot.
///
/// A slot that only partially overlaps the span is clipped to it.
fn push_excluding(
    ranges: &mut Vec<ByteRange>,
    start: u64,
    end: u64,
    excluded_start: u64,
    excluded_end: u64,
) -> Result<()> {
    let prefix_end = start.max(end.min(excluded_start));
    let suffix_start = start.max(end.min(excluded_end));

    push_range(ranges, start, prefix_end)?;
    push_range(ranges, suffix_start, end)
}

fn push_range(ranges: &mut Vec<ByteRange>, start: u64, end: u64) -> Result<()> {
    if end <= start {
        return Ok(());
    }

    let (Ok(range_start), Ok(range_end)) = (u32::try_from(start), u32::try_from(end)) else {
        return Err(malformed_error!(
            "Range 0x{:x}..0x{:x} exceeds 32-bit file offsets",
            start,
            end
        ));
    };

    ranges.push(ByteRange::new(range_start, range_end - range_start));
    Ok(())
}
