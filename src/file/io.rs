//! Little-endian reading and writing of primitive values at an offset.
//!
//! All functions are bounds-checked and return [`crate::Error::OutOfBounds`] instead of
//! panicking. The `_at` variants advance the offset by the size of the value, so a row or
//! a header can be read or written field after field:
//!
//! ```rust
//! use dotpdb::file::io::{read_le_at, write_le_at};
//!
//! let mut data = [0u8; 6];
//! let mut offset = 0;
//! write_le_at(&mut data, &mut offset, 0x0102u16)?;
//! write_le_at(&mut data, &mut offset, 7u32)?;
//! assert_eq!(data, [0x02, 0x01, 7, 0, 0, 0]);
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 0x0102);
//! assert_eq!(read_le_at::<u32>(&data, &mut offset)?, 7);
//! # Ok::<(), dotpdb::Error>(())
//! ```
//!
//! The `_dyn` variants handle heap and table indices, which are 2 or 4 bytes wide depending
//! on the size of the heap or table they point into.

use crate::{Error::OutOfBounds, Result};

/// A primitive that can be converted from and to its little-endian byte representation.
pub trait PdbIO: Sized + Copy {
    /// Number of bytes occupied by the value.
    const SIZE: usize;

    /// Decodes the value from exactly [`PdbIO::SIZE`] bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Encodes the value into exactly [`PdbIO::SIZE`] bytes.
    fn write_le_slice(self, out: &mut [u8]);
}

macro_rules! impl_pdb_io {
    ($($ty:ty),*) => {
        $(
            impl PdbIO for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                fn write_le_slice(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_pdb_io!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Reads a value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: PdbIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0;
    read_le_at(data, &mut offset)
}

/// Reads a value at `offset` and advances the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `T::SIZE` bytes remain.
pub fn read_le_at<T: PdbIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let end = offset.checked_add(T::SIZE).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let value = T::from_le_slice(&data[*offset..end]);
    *offset = end;
    Ok(value)
}

/// Reads a 2-byte or 4-byte index, promoted to `u32`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the index does not fit in `data`.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    if is_large {
        read_le_at::<u32>(data, offset)
    } else {
        Ok(u32::from(read_le_at::<u16>(data, offset)?))
    }
}

/// Writes a value at `offset` and advances the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `T::SIZE` bytes remain.
pub fn write_le_at<T: PdbIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let end = offset.checked_add(T::SIZE).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    value.write_le_slice(&mut data[*offset..end]);
    *offset = end;
    Ok(())
}

/// Writes a 2-byte or 4-byte index.
///
/// A small index that does not fit into 16 bits is a layout bug in the caller and is
/// reported as malformed rather than silently truncated.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short, or
/// [`crate::Error::Malformed`] if `value` exceeds a 2-byte index.
pub fn write_le_at_dyn(
    data: &mut [u8],
    offset: &mut usize,
    value: u32,
    is_large: bool,
) -> Result<()> {
    if is_large {
        write_le_at::<u32>(data, offset, value)
    } else {
        let small = u16::try_from(value)
            .map_err(|_| malformed_error!("Index {} does not fit a 2-byte column", value))?;
        write_le_at::<u16>(data, offset, small)
    }
}
