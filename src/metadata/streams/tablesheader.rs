//! Header of the `#~` (compressed tables) stream.
//!
//! ```text
//! u32  reserved (0)
//! u8   major version (2)
//! u8   minor version (0)
//! u8   heap sizes
//! u8   reserved (1)
//! u64  valid
//! u64  sorted
//! u32  rows[popcount(valid)]
//! ```
//!
//! A Portable PDB only sets `Valid` bits for its debug tables. The row counts of the
//! type-system tables that the index widths depend on are carried by the `#Pdb` stream,
//! so [`TablesHeader::from`] takes them as an input.

use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::{
    file::io::read_le_at,
    metadata::tables::{TableId, TableInfo, TableInfoRef},
    Error::OutOfBounds,
    Result,
};

/// Decoded `#~` header.
#[derive(Debug, Clone)]
pub struct TablesHeader {
    /// Major schema version
    pub major_version: u8,
    /// Minor schema version
    pub minor_version: u8,
    /// Bit vector of present tables
    pub valid: u64,
    /// Bit vector of sorted tables
    pub sorted: u64,
    /// Column width information, including the external type-system row counts
    pub info: TableInfoRef,
    /// Offset of the first table row relative to the stream start
    pub tables_offset: usize,
}

impl TablesHeader {
    /// Parses the header. `type_system_rows` supplies the row counts of tables that are
    /// referenced but not present (taken from the `#Pdb` stream).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for a truncated header.
    pub fn from(data: &[u8], type_system_rows: &[(TableId, u32)]) -> Result<TablesHeader> {
        if data.len() < 24 {
            return Err(OutOfBounds);
        }

        let mut offset = 4;
        let major_version = read_le_at::<u8>(data, &mut offset)?;
        let minor_version = read_le_at::<u8>(data, &mut offset)?;
        let heap_sizes = read_le_at::<u8>(data, &mut offset)?;
        offset += 1;
        let valid = read_le_at::<u64>(data, &mut offset)?;
        let sorted = read_le_at::<u64>(data, &mut offset)?;

        let mut info = TableInfo::from_heap_flags(heap_sizes);
        for (table, rows) in type_system_rows {
            info.set_rows(*table, *rows);
        }

        for table in TableId::iter() {
            if valid & table.bit() != 0 {
                info.set_rows(table, read_le_at::<u32>(data, &mut offset)?);
            }
        }

        Ok(TablesHeader {
            major_version,
            minor_version,
            valid,
            sorted,
            info: Arc::new(info),
            tables_offset: offset,
        })
    }

    /// Number of present tables.
    #[must_use]
    pub fn table_count(&self) -> u32 {
        self.valid.count_ones()
    }
}

/// Appends a `#~` header for the tables of `info` whose bits are in `valid`.
pub fn write_tables_header(info: &TableInfo, valid: u64, sorted: u64, out: &mut Vec<u8>) {
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(2);
    out.push(0);
    out.push(info.heap_flags());
    out.push(1);
    out.extend_from_slice(&valid.to_le_bytes());
    out.extend_from_slice(&sorted.to_le_bytes());

    for table in TableId::iter() {
        if valid & table.bit() != 0 {
            out.extend_from_slice(&info.rows(table).to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_external_rows() {
        let mut info = TableInfo::new(false, false, true);
        info.set_rows(TableId::Document, 2);
        info.set_rows(TableId::MethodDebugInformation, 5);
        info.set_rows(TableId::MethodDef, 5);

        let valid = info.present_debug_tables();
        let mut data = Vec::new();
        write_tables_header(&info, valid, 0, &mut data);
        assert_eq!(data.len(), 24 + 8);

        let header = TablesHeader::from(&data, &[(TableId::MethodDef, 5)]).unwrap();
        assert_eq!(header.major_version, 2);
        assert_eq!(header.table_count(), 2);
        assert_eq!(header.tables_offset, 32);
        assert_eq!(header.info.rows(TableId::MethodDebugInformation), 5);
        assert_eq!(header.info.rows(TableId::MethodDef), 5);
        assert!(header.info.is_large_blob());
    }

    #[test]
    fn truncated() {
        assert!(TablesHeader::from(&[0u8; 10], &[]).is_err());
    }
}
