//! Fixed-width little-endian primitive codec and the 16-bit-length Pascal
//! string encoding used throughout the format.

use crate::error::{Error, Result};

const NUL: u8 = 0;

/// Encodes `s` as a Pascal string: `u16` length, UTF-8 bytes, trailing NUL.
///
/// ```text
/// encode("Hello") == 05 00 'H' 'e' 'l' 'l' 'o' 00
/// ```
pub fn encode_pascal_string(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(2 + bytes.len() + 1);
    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(bytes);
    out.push(NUL);
    out
}

/// Decodes a Pascal string (`u16 length`, bytes, NUL) starting at `offset`
/// in `data`. The trailing NUL is not part of the returned string.
pub fn read_pascal_string(data: &[u8], offset: usize) -> Result<String> {
    let len_bytes = data.get(offset..offset + 2).ok_or(Error::Truncated {
        offset,
        requested: 2,
        len: data.len(),
    })?;
    let length = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
    let start = offset + 2;
    let end = start + length;
    let bytes = data.get(start..end).ok_or(Error::Truncated {
        offset: start,
        requested: length,
        len: data.len(),
    })?;
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::InvalidString {
        offset: start,
        source: e,
    })
}

/// Reads a NUL-terminated string at `offset` (used only for the file
/// header's name field, which is not length-prefixed).
pub fn read_cstring(data: &[u8], offset: usize) -> Result<String> {
    let end = data[offset..]
        .iter()
        .position(|&b| b == NUL)
        .map(|i| offset + i)
        .ok_or(Error::Truncated {
            offset,
            requested: 1,
            len: data.len(),
        })?;
    String::from_utf8(data[offset..end].to_vec()).map_err(|e| Error::InvalidString {
        offset,
        source: e,
    })
}
