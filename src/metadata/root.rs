//! Metadata root (`BSJB` header and stream directory) of a Portable PDB.
//!
//! ```text
//! u32  signature 0x424A5342 ("BSJB")
//! u16  major version (1)
//! u16  minor version (1)
//! u32  reserved
//! u32  length of the version string, padded to 4
//! ...  version string ("PDB v1.0"), null-padded
//! u16  flags
//! u16  stream count
//! ...  stream headers
//! ```

use crate::{
    file::io::{read_le, read_le_at},
    metadata::streams::StreamHeader,
    utils::{align_to, pad_to},
    Error::OutOfBounds,
    Result,
};

/// `BSJB`
pub const METADATA_MAGIC: u32 = 0x424A_5342;

/// Version string written into Portable PDBs.
pub const PDB_VERSION_STRING: &str = "PDB v1.0";

/// A parsed metadata root.
#[derive(Debug, Clone)]
pub struct Root {
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Version string, without padding
    pub version: String,
    /// Flags
    pub flags: u16,
    /// Stream directory
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parses the metadata root at the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a bad signature, an invalid stream count or
    /// overlapping streams, and [`crate::Error::OutOfBounds`] for truncated data.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != METADATA_MAGIC {
            return Err(malformed_error!(
                "Metadata signature does not match - {:#x}",
                signature
            ));
        }

        let version_length = read_le::<u32>(&data[12..])? as usize;
        let version_end = 16usize
            .checked_add(version_length)
            .filter(|end| *end + 4 <= data.len())
            .ok_or(OutOfBounds)?;
        let version_bytes = &data[16..version_end];
        let version = String::from_utf8_lossy(
            &version_bytes[..version_bytes
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(version_bytes.len())],
        )
        .into_owned();

        let mut offset = version_end;
        let flags = read_le_at::<u16>(data, &mut offset)?;
        let stream_count = read_le_at::<u16>(data, &mut offset)?;
        if stream_count == 0 || stream_count > 6 {
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            if offset >= data.len() {
                return Err(OutOfBounds);
            }

            let header = StreamHeader::from(&data[offset..])?;
            let end = header.offset.checked_add(header.size).ok_or_else(|| {
                malformed_error!(
                    "Stream offset and size cause integer overflow - {} + {}",
                    header.offset,
                    header.size
                )
            })?;
            if end as usize > data.len() {
                return Err(OutOfBounds);
            }
            if stream_headers
                .iter()
                .any(|h: &StreamHeader| h.name == header.name)
            {
                return Err(malformed_error!("Duplicate stream - {}", header.name));
            }

            offset += header.header_size();
            stream_headers.push(header);
        }

        Ok(Root {
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            version,
            flags,
            stream_headers,
        })
    }

    /// Returns the bytes of the named stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no such stream exists, or
    /// [`crate::Error::OutOfBounds`] if it does not fit `data`.
    pub fn stream<'a>(&self, data: &'a [u8], name: &str) -> Result<&'a [u8]> {
        let header = self
            .stream_headers
            .iter()
            .find(|h| h.name == name)
            .ok_or_else(|| malformed_error!("Missing stream - {}", name))?;

        let start = header.offset as usize;
        data.get(start..start + header.size as usize)
            .ok_or(OutOfBounds)
    }
}

/// Lays out a metadata root followed by `streams`, in order.
///
/// Each stream is padded to a multiple of four bytes.
#[must_use]
pub fn write_metadata(streams: &[(&str, &[u8])]) -> Vec<u8> {
    let version_length = align_to(PDB_VERSION_STRING.len() + 1, 4);

    let mut headers: Vec<StreamHeader> = streams
        .iter()
        .map(|(name, _)| StreamHeader {
            offset: 0,
            size: 0,
            name: (*name).to_string(),
        })
        .collect();

    let directory_size: usize = headers.iter().map(StreamHeader::header_size).sum();
    let mut stream_offset = 16 + version_length + 4 + directory_size;
    for (header, (_, data)) in headers.iter_mut().zip(streams) {
        let size = align_to(data.len(), 4);
        header.offset = stream_offset as u32;
        header.size = size as u32;
        stream_offset += size;
    }

    let mut out = Vec::with_capacity(stream_offset);
    out.extend_from_slice(&METADATA_MAGIC.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(version_length as u32).to_le_bytes());
    out.extend_from_slice(PDB_VERSION_STRING.as_bytes());
    out.resize(16 + version_length, 0);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(headers.len() as u16).to_le_bytes());
    for header in &headers {
        header.write(&mut out);
    }

    for (_, data) in streams {
        out.extend_from_slice(data);
        pad_to(&mut out, 4);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let pdb = [1u8; 32];
        let tables = [2u8; 30];
        let data = write_metadata(&[("#Pdb", &pdb), ("#~", &tables)]);

        let root = Root::read(&data).unwrap();
        assert_eq!(root.major_version, 1);
        assert_eq!(root.version, PDB_VERSION_STRING);
        assert_eq!(root.stream_headers.len(), 2);
        assert_eq!(root.stream(&data, "#Pdb").unwrap(), &pdb);
        let tables_stream = root.stream(&data, "#~").unwrap();
        assert_eq!(tables_stream.len(), 32);
        assert_eq!(&tables_stream[..30], &tables);
        assert!(root.stream(&data, "#Blob").is_err());
    }

    #[test]
    fn bad_signature() {
        let mut data = write_metadata(&[("#Pdb", &[0u8; 4])]);
        data[0] = 0;
        assert!(Root::read(&data).is_err());
    }
}
