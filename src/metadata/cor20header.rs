//! CLR 2.0 (Cor20) header parsing for .NET assemblies.
//!
//! This module defines the [`Cor20Header`] struct, which represents the main header for .NET assemblies
//! as found in the IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR data directory of PE files, and the
//! [`CorFlags`] bitfield whose `STRONG_NAME_SIGNED` bit the signer sets.
//!
//! # Reference
//! - [ECMA-335 II.25.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::{file::parser::Parser, Result};

bitflags! {
    /// Runtime flags of the CLI header (ECMA-335 II.25.3.3.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CorFlags: u32 {
        /// The image contains IL code only
        const IL_ONLY = 0x0000_0001;
        /// The image can only be loaded into a 32-bit process
        const REQUIRES_32BIT = 0x0000_0002;
        /// Obsolete IL library flag
        const IL_LIBRARY = 0x0000_0004;
        /// The image carries a strong name signature
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// The entry point is an unmanaged method
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// The loader and JIT track debug data
        const TRACK_DEBUG_DATA = 0x0001_0000;
        /// The image prefers a 32-bit process on 64-bit platforms
        const PREFERS_32BIT = 0x0002_0000;
    }
}

/// The main header of CIL, located at the beginning of the `IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR` data
/// directory of PE files.
///
/// This struct contains all fields defined by the ECMA-335 standard for the CLR 2.0 header.
pub struct Cor20Header {
    /// Size of header in bytes
    pub cb: u32,
    /// The minimum version of runtime required to run this program
    pub major_runtime_version: u16,
    /// The minor portion of the version
    pub minor_runtime_version: u16,
    /// RVA of the `MetaData`
    pub meta_data_rva: u32,
    /// Size of the `MetaData`
    pub meta_data_size: u32,
    /// Flags describing this runtime
    pub flags: CorFlags,
    /// Token for the `MethodDef` or File of the entry point for the image
    pub entry_point_token: u32,
    /// RVA of implementation specific resources
    pub resource_rva: u32,
    /// Size of implementation specific resources
    pub resource_size: u32,
    /// RVA of the hash data for this pe file used by the CLI loader for binding and versioning
    pub strong_name_signature_rva: u32,
    /// Size of the hash data
    pub strong_name_signature_size: u32,
    /// Always 0
    pub code_manager_table_rva: u32,
    /// Always 0
    pub code_manager_table_size: u32,
    /// RVA of an array of locations in the file that contain an array of functions pointers
    pub vtable_fixups_rva: u32,
    /// Size of an array of locations in the file that contain an array of functions pointers
    pub vtable_fixups_size: u32,
    /// Always 0
    pub export_address_table_jmp_rva: u32,
    /// Always 0
    pub export_address_table_jmp_size: u32,
    /// Always 0
    pub managed_native_header_rva: u32,
    /// Always 0
    pub managed_native_header_size: u32,
}

impl Cor20Header {
    /// Size of the CLI header in bytes.
    pub const SIZE: usize = 72;

    /// Offset of the `Flags` field from the start of the header.
    pub const FLAGS_OFFSET: u32 = 16;

    /// Create a `Cor20Header` object from a sequence of bytes
    ///
    /// # Arguments
    /// * `data` - The byte slice from which this object shall be created
    ///
    /// # Errors
    /// Returns an error if the data is too short to contain a valid CLR header,
    /// or if any field validation fails per ECMA-335 II.25.3.3.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < Self::SIZE {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb as usize != Self::SIZE {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;
        if major_runtime_version == 0 || major_runtime_version > 10 {
            return Err(malformed_error!(
                "Invalid major runtime version: {}",
                major_runtime_version
            ));
        }

        let meta_data_rva = parser.read_le::<u32>()?;
        if meta_data_rva == 0 {
            return Err(malformed_error!("Metadata RVA cannot be zero"));
        }

        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_size == 0 {
            return Err(malformed_error!("Metadata size cannot be zero"));
        }

        let flags = CorFlags::from_bits_retain(parser.read_le::<u32>()?);

        let entry_point_token = parser.read_le::<u32>()?;

        let resource_rva = parser.read_le::<u32>()?;
        let resource_size = parser.read_le::<u32>()?;

        let strong_name_signature_rva = parser.read_le::<u32>()?;
        let strong_name_signature_size = parser.read_le::<u32>()?;

        let code_manager_table_rva = parser.read_le::<u32>()?;
        let code_manager_table_size = parser.read_le::<u32>()?;
        let vtable_fixups_rva = parser.read_le::<u32>()?;
        let vtable_fixups_size = parser.read_le::<u32>()?;
        let export_address_table_jmp_rva = parser.read_le::<u32>()?;
        let export_address_table_jmp_size = parser.read_le::<u32>()?;
        let managed_native_header_rva = parser.read_le::<u32>()?;
        let managed_native_header_size = parser.read_le::<u32>()?;

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            resource_rva,
            resource_size,
            strong_name_signature_rva,
            strong_name_signature_size,
            code_manager_table_rva,
            code_manager_table_size,
            vtable_fixups_rva,
            vtable_fixups_size,
            export_address_table_jmp_rva,
            export_address_table_jmp_size,
            managed_native_header_rva,
            managed_native_header_size,
        })
    }

    /// Returns `true` if the strong-name-signed bit is set.
    #[must_use]
    pub fn is_strong_name_signed(&self) -> bool {
        self.flags.contains(CorFlags::STRONG_NAME_SIGNED)
    }
}
