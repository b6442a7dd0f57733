//! Debug directory data handed to the PE writer.
//!
//! The PE writer owns the directory itself; this module produces the entry payloads that
//! tie the image to its symbols:
//!
//! | Entry | Type | Version | Payload |
//! |-------|------|---------|---------|
//! | CodeView | 2 | `0x0100.0x504D` portable, `0.0` native | `RSDS`, GUID, age, UTF-8 path, NUL |
//! | Reproducible | 16 | `0.0` | none |
//! | Embedded Portable PDB | 17 | `0x0100.0x0100` | `MPDB`, uncompressed size, deflate stream |
//! | PDB checksum | 19 | `1.0` | `SHA256`, NUL, digest of the symbol stream |

use std::io::{Read, Write};

use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use sha2::{Digest, Sha256};
use uguid::Guid;

use crate::{file::parser::Parser, Result};

const CODEVIEW_SIGNATURE: &[u8; 4] = b"RSDS";
const EMBEDDED_PDB_SIGNATURE: &[u8; 4] = b"MPDB";
const CHECKSUM_ALGORITHM: &[u8] = b"SHA256\0";

/// Portable CodeView entries carry this minor version (`PM`).
pub const PORTABLE_CODEVIEW_MINOR: u16 = 0x504D;
/// Major version of portable CodeView and embedded PDB entries.
pub const PORTABLE_VERSION_MAJOR: u16 = 0x0100;

/// `IMAGE_DEBUG_TYPE_*` of the entries this crate produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DebugDirectoryKind {
    /// Symbol file reference
    CodeView = 2,
    /// Marks a deterministic build; the time stamps are content hashes
    Reproducible = 16,
    /// Compressed Portable PDB stored in the image
    EmbeddedPortablePdb = 17,
    /// Hash of the symbol file
    PdbChecksum = 19,
}

/// One debug directory entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugDirectoryEntry {
    /// Entry type
    pub kind: DebugDirectoryKind,
    /// `TimeDateStamp` field
    pub stamp: u32,
    /// `MajorVersion` field
    pub major_version: u16,
    /// `MinorVersion` field
    pub minor_version: u16,
    /// Payload the PE writer places in the image and points the entry at
    pub data: Vec<u8>,
}

impl DebugDirectoryEntry {
    /// CodeView entry referencing the symbol file at `pdb_path`.
    #[must_use]
    pub fn codeview(guid: Guid, age: u32, stamp: u32, pdb_path: &str, portable: bool) -> Self {
        let mut data = Vec::with_capacity(24 + pdb_path.len() + 1);
        data.extend_from_slice(CODEVIEW_SIGNATURE);
        data.extend_from_slice(&guid.to_bytes());
        data.extend_from_slice(&age.to_le_bytes());
        data.extend_from_slice(pdb_path.as_bytes());
        data.push(0);

        let (major_version, minor_version) = if portable {
            (PORTABLE_VERSION_MAJOR, PORTABLE_CODEVIEW_MINOR)
        } else {
            (0, 0)
        };

        DebugDirectoryEntry {
            kind: DebugDirectoryKind::CodeView,
            stamp,
            major_version,
            minor_version,
            data,
        }
    }

    /// PDB checksum entry over the symbol stream.
    #[must_use]
    pub fn pdb_checksum(symbols: &[u8]) -> Self {
        let mut data = CHECKSUM_ALGORITHM.to_vec();
        data.extend_from_slice(&Sha256::digest(symbols));
        DebugDirectoryEntry {
            kind: DebugDirectoryKind::PdbChecksum,
            stamp: 0,
            major_version: 1,
            minor_version: 0,
            data,
        }
    }

    /// Embedded Portable PDB entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if compression fails.
    pub fn embedded_pdb(symbols: &[u8]) -> Result<Self> {
        let size = u32::try_from(symbols.len())
            .map_err(|_| malformed_error!("Symbol stream exceeds 4 GiB"))?;

        let mut data = EMBEDDED_PDB_SIGNATURE.to_vec();
        data.extend_from_slice(&size.to_le_bytes());
        let mut encoder = DeflateEncoder::new(data, Compression::default());
        encoder.write_all(symbols)?;

        Ok(DebugDirectoryEntry {
            kind: DebugDirectoryKind::EmbeddedPortablePdb,
            stamp: 0,
            major_version: PORTABLE_VERSION_MAJOR,
            minor_version: PORTABLE_VERSION_MAJOR,
            data: encoder.finish()?,
        })
    }

    /// Reproducible marker entry.
    #[must_use]
    pub fn reproducible() -> Self {
        DebugDirectoryEntry {
            kind: DebugDirectoryKind::Reproducible,
            stamp: 0,
            major_version: 0,
            minor_version: 0,
            data: Vec::new(),
        }
    }
}

/// A decoded CodeView payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeViewInfo {
    /// Symbol file signature
    pub guid: Guid,
    /// Age
    pub age: u32,
    /// Symbol file path
    pub path: String,
}

/// Reads a CodeView payload.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a wrong signature or a missing terminator.
pub fn parse_codeview(data: &[u8]) -> Result<CodeViewInfo> {
    let mut parser = Parser::new(data);
    if parser.read_bytes(4)? != CODEVIEW_SIGNATURE {
        return Err(malformed_error!("CodeView entry without RSDS signature"));
    }

    let guid = parser.read_guid()?;
    let age = parser.read_le::<u32>()?;
    if !data[parser.pos()..].contains(&0) {
        return Err(malformed_error!("CodeView path is not terminated"));
    }
    let path = parser.read_string_utf8()?;

    Ok(CodeViewInfo {
        guid,
        age,
        path,
    })
}

/// Decompresses an embedded Portable PDB payload.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a wrong signature or size mismatch.
pub fn decode_embedded_pdb(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 8 || &data[..4] != EMBEDDED_PDB_SIGNATURE {
        return Err(malformed_error!("Embedded PDB entry without MPDB signature"));
    }

    let size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let mut symbols = Vec::with_capacity(size);
    DeflateDecoder::new(&data[8..]).read_to_end(&mut symbols)?;
    if symbols.len() != size {
        return Err(malformed_error!(
            "Embedded PDB decompressed to {} bytes, expected {}",
            symbols.len(),
            size
        ));
    }
    Ok(symbols)
}

/// The debug directory entries of a compilation, in the order the PE writer emits them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebugDirectoryInfo {
    entries: Vec<DebugDirectoryEntry>,
}

impl DebugDirectoryInfo {
    /// Appends an entry.
    pub fn push(&mut self, entry: DebugDirectoryEntry) {
        self.entries.push(entry);
    }

    /// All entries.
    #[must_use]
    pub fn entries(&self) -> &[DebugDirectoryEntry] {
        &self.entries
    }

    /// First entry of the given kind.
    #[must_use]
    pub fn get(&self, kind: DebugDirectoryKind) -> Option<&DebugDirectoryEntry> {
        self.entries.iter().find(|entry| entry.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codeview_layout() {
        let guid = Guid::from_bytes([0x11; 16]);
        let entry = DebugDirectoryEntry::codeview(guid, 1, 0x8000_0001, "a.pdb", true);
        assert_eq!(&entry.data[..4], b"RSDS");
        assert_eq!(entry.data.len(), 4 + 16 + 4 + 5 + 1);
        assert_eq!(entry.minor_version, 0x504D);

        let info = parse_codeview(&entry.data).unwrap();
        assert_eq!(info.guid, guid);
        assert_eq!(info.age, 1);
        assert_eq!(info.path, "a.pdb");
    }

    #[test]
    fn checksum_entry() {
        let entry = DebugDirectoryEntry::pdb_checksum(b"symbols");
        assert_eq!(&entry.data[..7], b"SHA256\0");
        assert_eq!(entry.data.len(), 7 + 32);
    }

    #[test]
    fn embedded_pdb_decodes() {
        let symbols = vec![0x42u8; 4096];
        let entry = DebugDirectoryEntry::embedded_pdb(&symbols).unwrap();
        assert!(entry.data.len() < symbols.len());
        assert_eq!(decode_embedded_pdb(&entry.data).unwrap(), symbols);

        let mut damaged = entry.data.clone();
        damaged[4] ^= 1;
        assert!(decode_embedded_pdb(&damaged).is_err());
    }
}
