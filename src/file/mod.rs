//! PE file abstraction for .NET images.
//!
//! This module reads the PE/COFF headers of a managed image and exposes the handful of facts
//! strong-name signing depends on: the section table, the data directories, the file alignment,
//! the machine type and the CLI header.
//!
//! # Key Components
//!
//! - [`crate::file::File`] - PE file abstraction backed by `goblin`
//! - [`crate::file::Backend`] - Trait for different data sources (disk files, memory buffers)
//! - [`crate::file::headers::PeHeaderMetadata`] - Owned header facts consumed by the signer
//! - [`crate::file::parser::Parser`] - Bounds-checked little-endian cursor
//! - [`crate::file::io`] - Low-level byte order helpers
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotsign::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("MyAssembly.dll"))?;
//! let metadata = file.signing_metadata()?;
//! println!("{} sections, file alignment 0x{:x}", metadata.sections.len(), metadata.file_alignment);
//!
//! if let Some(slot) = metadata.strong_name_signature {
//!     println!("Signature slot at 0x{:x}, {} bytes", slot.offset_in_file, slot.size);
//! }
//! # Ok::<(), dotsign::Error>(())
//! ```
//!
//! # References
//!
//! - Microsoft PE/COFF Specification
//! - ECMA-335 6th Edition, Partition II - PE File Format

pub mod headers;
pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use crate::{
    metadata::cor20header::Cor20Header,
    Error::{Empty, GoblinErr},
    Result,
};
use goblin::pe::{
    data_directories::{DataDirectory, DataDirectoryType},
    header::Header,
    optional_header::OptionalHeader,
    options::{ParseMode, ParseOptions},
    section_table::SectionTable,
    PE,
};
use headers::{DirectoryEntry, PeHeaderMetadata, RawDirectoryEntry, SectionSpan};
use memory::Memory;
use ouroboros::self_referencing;
use physical::Physical;

/// Backend trait for file data sources.
///
/// This trait abstracts over the source of PE data, allowing for both in-memory and on-disk
/// representations. All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Arguments
    ///
    /// * `offset` - The starting offset within the data.
    /// * `len` - The length of the slice in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

#[self_referencing]
/// Represents a loaded PE file with a CLI header.
///
/// This struct wraps the parsed PE and provides methods for accessing headers, sections and
/// data directories, and for converting RVAs into file offsets. Loading fails for images
/// without an optional header or without a CLR runtime header directory.
///
/// # Examples
///
/// ```rust,no_run
/// use dotsign::File;
///
/// let data = std::fs::read("MyAssembly.dll")?;
/// let file = File::from_mem(data)?;
///
/// let (clr_rva, clr_size) = file.clr();
/// println!("CLR header at RVA 0x{:x}, {} bytes", clr_rva, clr_size);
/// # Ok::<(), dotsign::Error>(())
/// ```
pub struct File {
    /// The underlying data source (memory or file).
    data: Box<dyn Backend>,
    /// The parsed PE structure, referencing the data.
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Loads a PE file from the given path.
    ///
    /// The file is memory-mapped read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or opened
    /// - The file is not a valid PE format
    /// - The PE file does not contain a CLR runtime header directory
    /// - The file is empty
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Loads a PE file from a memory buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is empty, is not a valid PE, or lacks a CLR runtime header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);

        Self::load(input)
    }

    /// Options for the header-only parse the signer relies on.
    ///
    /// Directory contents (CLR metadata, resources, imports, TLS) are parsed permissively and
    /// attribute certificates are skipped. A populated certificate table is still visible in the
    /// data directories and rejected when the hashable ranges are computed.
    fn parse_options() -> ParseOptions {
        let mut options = ParseOptions::default()
            .with_parse_mode(ParseMode::Permissive)
            .with_parse_imports(false)
            .with_parse_resources(false)
            .with_parse_tls_data(false);
        options.parse_attribute_certificates = false;
        options
    }

    /// Internal loader for any backend.
    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let data = Box::new(data);

        File::try_new(data, |data| {
            let data = data.as_ref();
            match PE::parse_with_opts(data.data(), &Self::parse_options()) {
                Ok(pe) => match pe.header.optional_header {
                    Some(optional_header) => {
                        if optional_header
                            .data_directories
                            .get_clr_runtime_header()
                            .is_none()
                        {
                            Err(malformed_error!(
                                "File does not have a CLR runtime header directory"
                            ))
                        } else {
                            Ok(pe)
                        }
                    }
                    None => Err(malformed_error!("File does not have an OptionalHeader")),
                },
                Err(error) => Err(GoblinErr(error)),
            }
        })
    }

    /// Returns the total size of the loaded file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Returns `true` if the file has a length of zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the raw bytes of the image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// Returns a bounds-checked slice of the image.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.with_data(|data| data.data_slice(offset, len))
    }

    /// Returns a reference to the PE header.
    #[must_use]
    pub fn header(&self) -> &Header {
        self.with_pe(|pe| &pe.header)
    }

    /// Returns a reference to the optional header, if present.
    ///
    /// This is always `Some`, the loader rejects images without one.
    #[must_use]
    pub fn header_optional(&self) -> &Option<OptionalHeader> {
        self.with_pe(|pe| &pe.header.optional_header)
    }

    /// Returns the RVA and size (in bytes) of the CLR runtime header.
    ///
    /// # Panics
    ///
    /// Panics if the CLR runtime header is missing (the loader rejects such images).
    #[must_use]
    pub fn clr(&self) -> (usize, usize) {
        self.with_pe(|pe| {
            let optional_header = pe.header.optional_header.unwrap();
            let clr_dir = optional_header
                .data_directories
                .get_clr_runtime_header()
                .unwrap();

            (clr_dir.virtual_address as usize, clr_dir.size as usize)
        })
    }

    /// Returns an iterator over the section headers of the PE file.
    pub fn sections(&self) -> impl Iterator<Item = &SectionTable> {
        self.with_pe(|pe| pe.sections.iter())
    }

    /// Returns the data directories of the PE file.
    ///
    /// # Panics
    ///
    /// Panics if the optional header is missing (the loader rejects such images).
    #[must_use]
    pub fn directories(&self) -> Vec<(DataDirectoryType, DataDirectory)> {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .unwrap()
                .data_directories
                .dirs()
                .collect()
        })
    }

    /// Returns the raw address and size of a data directory entry.
    ///
    /// The address is returned as stored: an RVA for most directories, a file offset for the
    /// certificate table. `None` means the entry is all zero or not declared.
    #[must_use]
    pub fn get_data_directory(&self, dir_type: DataDirectoryType) -> Option<(u32, u32)> {
        self.directories()
            .into_iter()
            .find(|(directory_type, _)| *directory_type == dir_type)
            .map(|(_, directory)| (directory.virtual_address, directory.size))
    }

    /// Converts a relative virtual address (RVA) to a file offset.
    ///
    /// The RVA must fall inside the raw data of a section, otherwise the bytes it names do not
    /// exist in the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the RVA cannot be mapped to a file offset.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        let rva_u32 =
            u32::try_from(rva).map_err(|_| malformed_error!("RVA too large to fit in u32: {}", rva))?;

        self.with_pe(|pe| {
            for section in &pe.sections {
                let virtual_size = if section.virtual_size == 0 {
                    section.size_of_raw_data
                } else {
                    section.virtual_size
                };
                let Some(section_max) = section.virtual_address.checked_add(virtual_size) else {
                    return Err(malformed_error!(
                        "Section malformed, causing integer overflow - {} + {}",
                        section.virtual_address,
                        virtual_size
                    ));
                };

                if section.virtual_address <= rva_u32 && rva_u32 < section_max {
                    let delta = rva_u32 - section.virtual_address;
                    if delta >= section.size_of_raw_data {
                        return Err(malformed_error!(
                            "RVA 0x{:x} lies in the uninitialized tail of a section",
                            rva
                        ));
                    }

                    return Ok(section.pointer_to_raw_data as usize + delta as usize);
                }
            }

            Err(malformed_error!(
                "RVA could not be converted to offset - {}",
                rva
            ))
        })
    }

    /// Gets the file alignment value from the PE header.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the optional header is missing.
    pub fn file_alignment(&self) -> Result<u32> {
        let optional_header = self
            .header_optional()
            .as_ref()
            .ok_or_else(|| malformed_error!("Missing optional header for file alignment"))?;

        Ok(optional_header.windows_fields.file_alignment)
    }

    /// Determines if this is a PE32+ format file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the optional header is missing.
    pub fn is_pe32_plus_format(&self) -> Result<bool> {
        let optional_header = self
            .header_optional()
            .as_ref()
            .ok_or_else(|| malformed_error!("Missing optional header for PE format detection"))?;

        // PE32 magic is 0x10b, PE32+ magic is 0x20b
        Ok(optional_header.standard_fields.magic != 0x10b)
    }

    /// Reads and parses the CLI header.
    ///
    /// # Errors
    /// Returns an error if the CLI header RVA does not map into the file or the header is malformed.
    pub fn cor20_header(&self) -> Result<Cor20Header> {
        let (clr_rva, _) = self.clr();
        let clr_offset = self.rva_to_offset(clr_rva)?;

        Cor20Header::read(self.data_slice(clr_offset, Cor20Header::SIZE)?)
    }

    /// Extracts the owned header facts the strong-name signer needs.
    ///
    /// A strong-name directory of size zero is reported with size zero. One whose RVA is zero or
    /// cannot be translated into a file offset is reported as `None`. Neither is an error; both
    /// make the image ineligible for signing.
    ///
    /// # Errors
    /// Returns an error if the optional header is missing, or the CLI header cannot be read.
    pub fn signing_metadata(&self) -> Result<PeHeaderMetadata> {
        let optional_header = self
            .header_optional()
            .as_ref()
            .ok_or_else(|| malformed_error!("Missing optional header"))?;

        let (clr_rva, _) = self.clr();
        let cor_header_offset = self.rva_to_offset(clr_rva)?;
        let cor_header = self.cor20_header()?;

        let strong_name_signature = if cor_header.strong_name_signature_size == 0 {
            Some(RawDirectoryEntry {
                offset_in_file: 0,
                size: 0,
            })
        } else if cor_header.strong_name_signature_rva == 0 {
            log::debug!(
                "strong name directory declares {} bytes at RVA 0",
                cor_header.strong_name_signature_size
            );
            None
        } else {
            match self.rva_to_offset(cor_header.strong_name_signature_rva as usize) {
                Ok(offset) => Some(RawDirectoryEntry {
                    offset_in_file: i32::try_from(offset).map_err(|_| {
                        malformed_error!("Strong name offset 0x{:x} exceeds i32", offset)
                    })?,
                    size: i32::try_from(cor_header.strong_name_signature_size).map_err(|_| {
                        malformed_error!(
                            "Strong name size {} exceeds i32",
                            cor_header.strong_name_signature_size
                        )
                    })?,
                }),
                Err(error) => {
                    log::debug!("strong name directory has no file offset: {error}");
                    None
                }
            }
        };

        let machine = self.header().coff_header.machine;
        if self.is_pe32_plus_format()? != PeHeaderMetadata::machine_is_64_bit(machine) {
            log::debug!(
                "optional header magic 0x{:x} disagrees with machine 0x{:04x}, using the machine",
                optional_header.standard_fields.magic,
                machine
            );
        }

        let certificate_table = self
            .get_data_directory(DataDirectoryType::CertificateTable)
            .map(|(offset, size)| DirectoryEntry { offset, size })
            .unwrap_or_default();

        Ok(PeHeaderMetadata {
            machine,
            file_alignment: self.file_alignment()?,
            sections: self
                .sections()
                .map(|section| SectionSpan {
                    pointer_to_raw_data: section.pointer_to_raw_data,
                    size_of_raw_data: section.size_of_raw_data,
                })
                .collect(),
            check_sum: optional_header.windows_fields.check_sum,
            certificate_table,
            strong_name_signature,
            cor_header_offset: u32::try_from(cor_header_offset).map_err(|_| {
                malformed_error!("CLI header offset 0x{:x} exceeds u32", cor_header_offset)
            })?,
        })
    }
}
