//! Cursor-based reader for symbol blobs and metadata streams.
//!
//! [`Parser`] wraps a byte slice and a position. Every read is bounds-checked and returns
//! [`crate::Error::OutOfBounds`] when the data runs out, so the blob decoders in
//! [`crate::metadata`] never index raw slices themselves.
//!
//! Besides fixed-width little-endian values it understands the ECMA-335 §II.23.2 compressed
//! integer encodings used by sequence point, import and EnC blobs:
//!
//! | First byte | Width | Unsigned range |
//! |------------|-------|----------------|
//! | `0xxxxxxx` | 1 | `0..=0x7F` |
//! | `10xxxxxx` | 2 | `0..=0x3FFF` |
//! | `110xxxxx` | 4 | `0..=0x1FFF_FFFF` |
//!
//! Signed values are stored rotated: the sign lands in the least significant bit and the
//! remaining bits hold the two's complement value truncated to the width.
//!
//! # Examples
//!
//! ```rust
//! use dotpdb::Parser;
//!
//! let data = [0x03, 0x7F, 0x80, 0x80];
//! let mut parser = Parser::new(&data);
//! assert_eq!(parser.read_compressed_uint()?, 3);
//! assert_eq!(parser.read_compressed_int()?, -1);
//! assert_eq!(parser.read_compressed_uint()?, 0x80);
//! assert!(!parser.has_more_data());
//! # Ok::<(), dotpdb::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, PdbIO},
    metadata::{tables::TableId, token::Token},
    Error::OutOfBounds,
    Result,
};

/// A forward-only cursor over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Length of the underlying buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Moves the cursor to an absolute position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Skips `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let target = self.position.checked_add(step).ok_or(OutOfBounds)?;
        self.seek(target)
    }

    /// Advances to the next multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the aligned position is past the end.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Returns the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Reads a fixed-width little-endian value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit the remaining data.
    pub fn read_le<T: PdbIO>(&mut self) -> Result<T> {
        read_le_at(self.data, &mut self.position)
    }

    /// Reads an ECMA-335 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input or
    /// [`crate::Error::Malformed`] for the reserved `111xxxxx` lead byte.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let (value, _) = self.read_compressed_raw()?;
        Ok(value)
    }

    /// Reads an ECMA-335 compressed signed integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input or
    /// [`crate::Error::Malformed`] for the reserved `111xxxxx` lead byte.
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let (raw, width) = self.read_compressed_raw()?;

        #[allow(clippy::cast_possible_wrap)]
        let magnitude = (raw >> 1) as i32;
        if raw & 1 == 0 {
            return Ok(magnitude);
        }

        let bias = match width {
            1 => 0x40,
            2 => 0x2000,
            _ => 0x1000_0000,
        };
        Ok(magnitude - bias)
    }

    /// Reads a `TypeDefOrRefOrSpecEncoded` compressed token (ECMA-335 §II.23.2.8).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for the reserved tag `3`.
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let encoded = self.read_compressed_uint()?;

        let table = match encoded & 0x3 {
            0 => TableId::TypeDef,
            1 => TableId::TypeRef,
            2 => TableId::TypeSpec,
            _ => {
                return Err(malformed_error!(
                    "Invalid compressed token tag - {:#x}",
                    encoded
                ))
            }
        };

        Ok(Token::from_parts(table, encoded >> 2))
    }

    /// Reads `length` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.position.checked_add(length).ok_or(OutOfBounds)?;
        if end > self.data.len() {
            return Err(OutOfBounds);
        }

        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Reads all remaining bytes.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.position.min(self.data.len())..];
        self.position = self.data.len();
        bytes
    }

    /// Reads a 16-byte GUID.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 16 bytes remain.
    pub fn read_guid(&mut self) -> Result<uguid::Guid> {
        let bytes = self.read_bytes(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(bytes);
        Ok(uguid::Guid::from_bytes(raw))
    }

    /// Reads a null-terminated UTF-8 string. A missing terminator at the end of the data
    /// is accepted.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the bytes are not valid UTF-8.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let start = self.position;
        let end = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.data.len(), |p| start + p);

        let text = std::str::from_utf8(&self.data[start..end]).map_err(|e| {
            malformed_error!("Invalid UTF-8 string at offset {}-{}: {}", start, end, e)
        })?;

        self.position = if end < self.data.len() { end + 1 } else { end };
        Ok(text.to_string())
    }

    /// Reads a null-terminated UTF-16LE string.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if no terminator is found, or
    /// [`crate::Error::Malformed`] for unpaired surrogates.
    pub fn read_string_utf16(&mut self) -> Result<String> {
        let mut units = Vec::new();
        loop {
            let unit = self.read_le::<u16>()?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }

        widestring::U16String::from_vec(units)
            .to_string()
            .map_err(|e| malformed_error!("Invalid UTF-16 string: {}", e))
    }

    fn read_compressed_raw(&mut self) -> Result<(u32, u8)> {
        let first = self.read_le::<u8>()?;

        if first & 0x80 == 0 {
            return Ok((u32::from(first), 1));
        }

        if first & 0xC0 == 0x80 {
            let second = self.read_le::<u8>()?;
            return Ok((((u32::from(first) & 0x3F) << 8) | u32::from(second), 2));
        }

        if first & 0xE0 == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            return Ok((
                ((u32::from(first) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3,
                4,
            ));
        }

        Err(malformed_error!("Invalid compressed integer - {:#x}", first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn compressed_uint_widths() {
        let data = [0x7F, 0x80, 0x80, 0xBF, 0xFF, 0xC0, 0x00, 0x40, 0x00];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x7F);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x80);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x3FFF);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x4000);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn compressed_int_examples() {
        // ECMA-335 II.23.2 sample encodings
        let cases: &[(&[u8], i32)] = &[
            (&[0x06], 3),
            (&[0x7B], -3),
            (&[0x80, 0x80], 64),
            (&[0x01], -64),
            (&[0xC0, 0x00, 0x40, 0x00], 8192),
            (&[0x80, 0x01], -8192),
            (&[0xDF, 0xFF, 0xFF, 0xFE], 268_435_455),
            (&[0xC0, 0x00, 0x00, 0x01], -268_435_456),
        ];

        for (bytes, expected) in cases {
            let mut parser = Parser::new(bytes);
            assert_eq!(parser.read_compressed_int().unwrap(), *expected, "{bytes:x?}");
        }
    }

    #[test]
    fn reserved_lead_byte() {
        let mut parser = Parser::new(&[0xE0, 0, 0, 0]);
        assert!(matches!(
            parser.read_compressed_uint(),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn truncated_compressed_uint() {
        let mut parser = Parser::new(&[0xC0, 0x00]);
        assert!(matches!(
            parser.read_compressed_uint(),
            Err(Error::OutOfBounds)
        ));
    }

    #[test]
    fn compressed_token() {
        let mut parser = Parser::new(&[0x05, 0x08, 0x0A]);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x0100_0001);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x0200_0002);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x1B00_0002);
    }

    #[test]
    fn strings() {
        let mut parser = Parser::new(b"System\0IO");
        assert_eq!(parser.read_string_utf8().unwrap(), "System");
        assert_eq!(parser.read_string_utf8().unwrap(), "IO");
        assert!(!parser.has_more_data());

        let data = [b'M', 0, b'N', 0, 0, 0];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_string_utf16().unwrap(), "MN");
    }

    #[test]
    fn align_and_bytes() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut parser = Parser::new(&data);
        parser.advance_by(1).unwrap();
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
        assert_eq!(parser.read_bytes(2).unwrap(), &[5, 6]);
        assert_eq!(parser.read_remaining(), &[7, 8]);
        assert!(parser.read_bytes(1).is_err());
    }
}
