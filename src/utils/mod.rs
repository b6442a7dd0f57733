//! Shared helpers for blob encoding and cross-thread coordination.
//!
//! The encoders in [`crate::metadata`] build their blobs into a `Vec<u8>`; the functions here
//! append the ECMA-335 compressed integer forms and padding those blobs need. The inverse
//! operations live on [`crate::file::parser::Parser`].

pub mod synchronization;

pub use synchronization::CancellationToken;

/// Largest value representable as a compressed unsigned integer.
pub const MAX_COMPRESSED_UINT: u32 = 0x1FFF_FFFF;

/// Smallest value representable as a compressed signed integer.
pub const MIN_COMPRESSED_INT: i32 = -0x1000_0000;

/// Largest value representable as a compressed signed integer.
pub const MAX_COMPRESSED_INT: i32 = 0x0FFF_FFFF;

/// Number of bytes (1, 2 or 4) the compressed form of `value` occupies.
#[must_use]
pub fn compressed_uint_size(value: u32) -> usize {
    if value < 0x80 {
        1
    } else if value < 0x4000 {
        2
    } else {
        4
    }
}

/// Appends `value` as an ECMA-335 compressed unsigned integer.
///
/// Values above [`MAX_COMPRESSED_UINT`] cannot be represented; callers clamp before
/// encoding, and the value is masked here so the output stays decodable.
pub fn write_compressed_uint(value: u32, buffer: &mut Vec<u8>) {
    if value < 0x80 {
        buffer.push(value as u8);
    } else if value < 0x4000 {
        buffer.push(0x80 | (value >> 8) as u8);
        buffer.push(value as u8);
    } else {
        let value = value & MAX_COMPRESSED_UINT;
        buffer.push(0xC0 | (value >> 24) as u8);
        buffer.push((value >> 16) as u8);
        buffer.push((value >> 8) as u8);
        buffer.push(value as u8);
    }
}

/// Appends `value` as an ECMA-335 compressed signed integer.
///
/// The two's complement value is truncated to the chosen width and rotated left by one so
/// the sign ends up in bit 0. Values outside
/// [`MIN_COMPRESSED_INT`]`..=`[`MAX_COMPRESSED_INT`] are saturated.
#[allow(clippy::cast_sign_loss)]
pub fn write_compressed_int(value: i32, buffer: &mut Vec<u8>) {
    let value = value.clamp(MIN_COMPRESSED_INT, MAX_COMPRESSED_INT);
    let sign = u32::from(value < 0);
    let bits = value as u32;

    if (-0x40..0x40).contains(&value) {
        buffer.push((((bits & 0x3F) << 1) | sign) as u8);
    } else if (-0x2000..0x2000).contains(&value) {
        let rotated = ((bits & 0x1FFF) << 1) | sign;
        buffer.push(0x80 | (rotated >> 8) as u8);
        buffer.push(rotated as u8);
    } else {
        let rotated = ((bits & 0x0FFF_FFFF) << 1) | sign;
        buffer.push(0xC0 | (rotated >> 24) as u8);
        buffer.push((rotated >> 16) as u8);
        buffer.push((rotated >> 8) as u8);
        buffer.push(rotated as u8);
    }
}

/// Rounds `value` up to the next multiple of `alignment` (a power of two).
#[must_use]
pub fn align_to(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Pads `buffer` with zeros up to the next multiple of `alignment`.
pub fn pad_to(buffer: &mut Vec<u8>, alignment: usize) {
    buffer.resize(align_to(buffer.len(), alignment), 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::parser::Parser;

    #[test]
    fn compressed_uint_sizes() {
        assert_eq!(compressed_uint_size(0), 1);
        assert_eq!(compressed_uint_size(0x7F), 1);
        assert_eq!(compressed_uint_size(0x80), 2);
        assert_eq!(compressed_uint_size(0x3FFF), 2);
        assert_eq!(compressed_uint_size(0x4000), 4);
    }

    #[test]
    fn compressed_uint_encoding() {
        let mut buffer = Vec::new();
        write_compressed_uint(0x03, &mut buffer);
        write_compressed_uint(0x80, &mut buffer);
        write_compressed_uint(0x2E57, &mut buffer);
        write_compressed_uint(0x4000, &mut buffer);
        assert_eq!(
            buffer,
            [0x03, 0x80, 0x80, 0xAE, 0x57, 0xC0, 0x00, 0x40, 0x00]
        );
    }

    #[test]
    fn compressed_int_matches_ecma_samples() {
        let cases: &[(i32, &[u8])] = &[
            (3, &[0x06]),
            (-3, &[0x7B]),
            (64, &[0x80, 0x80]),
            (-64, &[0x01]),
            (8192, &[0xC0, 0x00, 0x40, 0x00]),
            (-8192, &[0x80, 0x01]),
            (268_435_455, &[0xDF, 0xFF, 0xFF, 0xFE]),
            (-268_435_456, &[0xC0, 0x00, 0x00, 0x01]),
        ];

        for (value, expected) in cases {
            let mut buffer = Vec::new();
            write_compressed_int(*value, &mut buffer);
            assert_eq!(buffer.as_slice(), *expected, "encoding {value}");

            let mut parser = Parser::new(&buffer);
            assert_eq!(parser.read_compressed_int().unwrap(), *value);
        }
    }

    #[test]
    fn alignment() {
        assert_eq!(align_to(0, 4), 0);
        assert_eq!(align_to(5, 4), 8);
        let mut buffer = vec![1, 2, 3, 4, 5];
        pad_to(&mut buffer, 4);
        assert_eq!(buffer, [1, 2, 3, 4, 5, 0, 0, 0]);
    }
}
