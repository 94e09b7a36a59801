//! Little-endian read helpers for the binary parsers.
//!
//! The module image and method body formats are small enough that a handful of
//! concrete cursor-based readers covers every access pattern. All helpers
//! return [`Error::OutOfBounds`] instead of panicking on truncated input.

use crate::{Error::OutOfBounds, Result};

/// Reads a `u8` at `*offset` and advances the cursor.
pub(crate) fn read_u8_at(data: &[u8], offset: &mut usize) -> Result<u8> {
    let value = *data.get(*offset).ok_or(OutOfBounds)?;
    *offset += 1;
    Ok(value)
}

/// Reads a little-endian `u16` at `*offset` and advances the cursor.
pub(crate) fn read_u16_at(data: &[u8], offset: &mut usize) -> Result<u16> {
    let end = offset.checked_add(2).ok_or(OutOfBounds)?;
    let bytes = data.get(*offset..end).ok_or(OutOfBounds)?;
    *offset = end;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Reads a little-endian `u32` at `*offset` and advances the cursor.
pub(crate) fn read_u32_at(data: &[u8], offset: &mut usize) -> Result<u32> {
    let end = offset.checked_add(4).ok_or(OutOfBounds)?;
    let bytes = data.get(*offset..end).ok_or(OutOfBounds)?;
    *offset = end;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Reads a little-endian `i16` at `*offset` and advances the cursor.
pub(crate) fn read_i16_at(data: &[u8], offset: &mut usize) -> Result<i16> {
    read_u16_at(data, offset).map(|v| v as i16)
}

/// Reads a little-endian `i32` at `*offset` and advances the cursor.
pub(crate) fn read_i32_at(data: &[u8], offset: &mut usize) -> Result<i32> {
    read_u32_at(data, offset).map(|v| v as i32)
}

/// Reads `len` bytes at `*offset` and advances the cursor.
pub(crate) fn read_bytes_at<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = offset.checked_add(len).ok_or(OutOfBounds)?;
    let bytes = data.get(*offset..end).ok_or(OutOfBounds)?;
    *offset = end;
    Ok(bytes)
}
