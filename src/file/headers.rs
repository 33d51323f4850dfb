//! Owned PE header facts needed for strong-name signing.
//!
//! [`crate::file::File`] borrows its parse from the mapped image, which makes it awkward to
//! keep around while the same image is later opened for writing. [`PeHeaderMetadata`] is the
//! small owned subset the signer needs, extracted once through
//! [`crate::file::File::signing_metadata`] and then passed by reference into the range
//! computation.
//!
//! # Reference
//! - Microsoft PE/COFF Specification, sections 3 and 4
//! - ECMA-335 6th Edition, Partition II.25

use goblin::pe::header::{COFF_MACHINE_ARM64, COFF_MACHINE_IA64, COFF_MACHINE_X86_64};

use crate::metadata::cor20header::Cor20Header;

/// Size of the DOS header plus the DOS stub, as counted by the strong-name hash.
pub const DOS_HEADER_SIZE: u32 = 128;
/// Size of the `PE\0\0` signature.
pub const PE_SIGNATURE_SIZE: u32 = 4;
/// Size of the COFF file header.
pub const COFF_HEADER_SIZE: u32 = 20;
/// Size of a PE32 optional header including its 16 data directories.
pub const OPTIONAL_HEADER_SIZE_32: u32 = 224;
/// Size of a PE32+ optional header including its 16 data directories.
pub const OPTIONAL_HEADER_SIZE_64: u32 = 240;
/// Size of a single section table entry.
pub const SECTION_HEADER_SIZE: u32 = 40;

/// File location of the raw data of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    /// File offset of the section's raw data
    pub pointer_to_raw_data: u32,
    /// Size of the section's raw data in the file
    pub size_of_raw_data: u32,
}

/// A data directory whose address is already a file offset.
///
/// The certificate table is the one PE directory that stores a file offset instead of an RVA.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// File offset of the directory data
    pub offset: u32,
    /// Declared size of the directory data
    pub size: u32,
}

/// The strong-name signature directory after RVA to file offset translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDirectoryEntry {
    /// File offset of the reserved signature bytes
    pub offset_in_file: i32,
    /// Declared size of the reserved signature bytes
    pub size: i32,
}

/// Header facts of one PE image that drive the strong-name hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeHeaderMetadata {
    /// COFF machine type, selects the 32/64-bit optional header layout
    pub machine: u16,
    /// `FileAlignment` from the optional header
    pub file_alignment: u32,
    /// Section table in file order
    pub sections: Vec<SectionSpan>,
    /// `CheckSum` from the optional header
    pub check_sum: u32,
    /// Authenticode certificate table directory
    pub certificate_table: DirectoryEntry,
    /// Strong-name signature directory, `None` if its RVA does not map into the file
    pub strong_name_signature: Option<RawDirectoryEntry>,
    /// File offset of the CLI header
    pub cor_header_offset: u32,
}

impl PeHeaderMetadata {
    /// Returns `true` if `machine` implies a PE32+ optional header.
    #[must_use]
    pub fn machine_is_64_bit(machine: u16) -> bool {
        matches!(
            machine,
            COFF_MACHINE_X86_64 | COFF_MACHINE_ARM64 | COFF_MACHINE_IA64
        )
    }

    /// Returns `true` if the machine type implies a PE32+ optional header.
    #[must_use]
    pub fn is_64_bit(&self) -> bool {
        Self::machine_is_64_bit(self.machine)
    }

    /// Size of the optional header for this machine type.
    #[must_use]
    pub fn optional_header_size(&self) -> u32 {
        if self.is_64_bit() {
            OPTIONAL_HEADER_SIZE_64
        } else {
            OPTIONAL_HEADER_SIZE_32
        }
    }

    /// File offset of the one-byte CLI header `Flags` field that carries the
    /// strong-name-signed bit (ECMA-335 II.25.3.3).
    #[must_use]
    pub fn cor_flags_offset(&self) -> u32 {
        self.cor_header_offset + Cor20Header::FLAGS_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(machine: u16) -> PeHeaderMetadata {
        PeHeaderMetadata {
            machine,
            file_alignment: 0x200,
            sections: vec![],
            check_sum: 0,
            certificate_table: DirectoryEntry::default(),
            strong_name_signature: None,
            cor_header_offset: 0x208,
        }
    }

    #[test]
    fn optional_header_size_by_machine() {
        assert_eq!(metadata(0x014C).optional_header_size(), 224);
        assert_eq!(metadata(0x01C4).optional_header_size(), 224);
        assert_eq!(metadata(0x8664).optional_header_size(), 240);
        assert_eq!(metadata(0xAA64).optional_header_size(), 240);
        assert_eq!(metadata(0x0200).optional_header_size(), 240);
    }

    #[test]
    fn cor_flags_offset() {
        assert_eq!(metadata(0x014C).cor_flags_offset(), 0x218);
    }
}
