use crate::{file::io::read_le, utils::pad_to, Error::OutOfBounds, Result};

/// Names of the streams a Portable PDB may contain.
pub const PDB_STREAM_NAMES: [&str; 6] = ["#Pdb", "#~", "#Strings", "#US", "#GUID", "#Blob"];

/// An entry of the metadata root's stream directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Stream name
    pub name: String,
}

impl StreamHeader {
    /// Parses a stream header; the name is null-terminated and padded to four bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated data or
    /// [`crate::Error::Malformed`] for an unknown stream name.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let name_bytes: Vec<u8> = data[8..]
            .iter()
            .take(32)
            .take_while(|&&b| b != 0)
            .copied()
            .collect();
        let name = String::from_utf8_lossy(&name_bytes).into_owned();

        if !PDB_STREAM_NAMES.iter().any(|valid| name == *valid) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        Ok(StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name,
        })
    }

    /// Size of the serialized header.
    #[must_use]
    pub fn header_size(&self) -> usize {
        8 + crate::utils::align_to(self.name.len() + 1, 4)
    }

    /// Appends the serialized header.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        pad_to(out, 4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x23, 0x50, 0x64, 0x62, 0x00, 0x00, 0x00, 0x00,
        ];

        let parsed = StreamHeader::from(&header_bytes).unwrap();
        assert_eq!(parsed.offset, 0x6C);
        assert_eq!(parsed.size, 0x45A4);
        assert_eq!(parsed.name, "#Pdb");
        assert_eq!(parsed.header_size(), 16);

        let mut out = Vec::new();
        parsed.write(&mut out);
        assert_eq!(out, header_bytes);
    }

    #[test]
    fn crafted_invalid() {
        let header_bytes = [0x6C, 0, 0, 0, 0xA4, 0x45, 0, 0, 0x24, 0x7E, 0x00];
        assert!(StreamHeader::from(&header_bytes).is_err());
    }
}
