//! Low-level byte order and safe reading/writing utilities for PE and key blob parsing.
//!
//! Everything this crate reads from disk is little-endian: the PE headers, the CLI header and
//! the packed RSA key blob. This module provides bounds-checked helpers for decoding and
//! encoding the primitive types involved, built around the [`crate::file::io::BlobIO`] trait.
//!
//! # Key Components
//!
//! - [`crate::file::io::BlobIO`] - Trait defining little-endian conversion for primitive types
//! - [`crate::file::io::read_le`] - Read a value from the start of a buffer
//! - [`crate::file::io::read_le_at`] - Read a value at an offset and advance the offset
//! - [`crate::file::io::write_le_at`] - Write a value at an offset and advance the offset
//!
//! # Examples
//!
//! ```rust,ignore
//! use dotsign::file::io::{read_le_at, write_le_at};
//!
//! let mut buffer = [0u8; 6];
//! let mut offset = 0;
//! write_le_at(&mut buffer, &mut offset, 0x2400_u32)?;
//! write_le_at(&mut buffer, &mut offset, 0x8004_u16)?;
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u32>(&buffer, &mut offset)?, 0x2400);
//! assert_eq!(read_le_at::<u16>(&buffer, &mut offset)?, 0x8004);
//! # Ok::<(), dotsign::Error>(())
//! ```

use crate::Result;

/// Trait for primitive types that can be decoded from and encoded to little-endian bytes.
///
/// All implementations are pure conversions without shared state and therefore thread-safe.
pub trait BlobIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_blob_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl BlobIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_blob_io!(u8 => 1, u16 => 2, u32 => 4, i32 => 4, u64 => 8);

/// Safely reads a value of type `T` in little-endian byte order from the start of a buffer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le<T: BlobIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`, advancing the
/// offset by the size of `T`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: BlobIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Safely writes a value of type `T` in little-endian byte order at `offset`, advancing the
/// offset by the size of `T`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too small.
pub fn write_le_at<T: BlobIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;

    Ok(())
}
