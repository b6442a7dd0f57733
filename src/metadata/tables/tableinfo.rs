use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::metadata::tables::{CodedIndexType, TableId};

/// Shared handle to a [`TableInfo`].
pub type TableInfoRef = Arc<TableInfo>;

/// Row counts and heap sizes that determine column widths of the metadata tables.
///
/// Index columns are 2 bytes unless the referenced table has more than `u16::MAX` rows
/// (or the heap is flagged large), in which case they are 4 bytes. For a Portable PDB the
/// type-system row counts are those of the module the PDB describes, taken from the
/// `#Pdb` stream; the debug table counts are the PDB's own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableInfo {
    rows: [u32; 64],
    large_str: bool,
    large_guid: bool,
    large_blob: bool,
}

impl Default for TableInfo {
    fn default() -> Self {
        Self::new(false, false, false)
    }
}

impl TableInfo {
    /// Creates a table info without rows and with the given heap index widths.
    #[must_use]
    pub fn new(large_str: bool, large_guid: bool, large_blob: bool) -> Self {
        TableInfo {
            rows: [0; 64],
            large_str,
            large_guid,
            large_blob,
        }
    }

    /// Decodes the `HeapSizes` byte of a `#~` header.
    #[must_use]
    pub fn from_heap_flags(flags: u8) -> Self {
        Self::new(flags & 0x01 != 0, flags & 0x02 != 0, flags & 0x04 != 0)
    }

    /// Encodes the heap widths as the `HeapSizes` byte of a `#~` header.
    #[must_use]
    pub fn heap_flags(&self) -> u8 {
        u8::from(self.large_str) | (u8::from(self.large_guid) << 1) | (u8::from(self.large_blob) << 2)
    }

    /// Sets the row count of a table.
    pub fn set_rows(&mut self, table: TableId, rows: u32) {
        self.rows[table as usize] = rows;
    }

    /// Row count of a table.
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    /// Bit vector of the debug tables that have rows.
    #[must_use]
    pub fn present_debug_tables(&self) -> u64 {
        TableId::iter()
            .filter(|t| t.is_debug_table() && self.rows(*t) > 0)
            .fold(0, |mask, t| mask | t.bit())
    }

    /// Bit vector of the type-system tables that have rows.
    #[must_use]
    pub fn present_type_system_tables(&self) -> u64 {
        TableId::iter()
            .filter(|t| !t.is_debug_table() && self.rows(*t) > 0)
            .fold(0, |mask, t| mask | t.bit())
    }

    /// `true` if an index into `table` needs 4 bytes.
    #[must_use]
    pub fn is_large(&self, table: TableId) -> bool {
        self.rows(table) > u32::from(u16::MAX)
    }

    /// Width of a simple index into `table`.
    #[must_use]
    pub fn table_index_bytes(&self, table: TableId) -> u8 {
        if self.is_large(table) {
            4
        } else {
            2
        }
    }

    /// `true` if the coded index needs 4 bytes.
    #[must_use]
    pub fn is_large_coded(&self, coded: CodedIndexType) -> bool {
        let limit = 1u32 << (16 - coded.tag_bits());
        coded.tables().iter().any(|t| self.rows(*t) >= limit)
    }

    /// Width of a coded index.
    #[must_use]
    pub fn coded_index_bytes(&self, coded: CodedIndexType) -> u8 {
        if self.is_large_coded(coded) {
            4
        } else {
            2
        }
    }

    /// `true` if `#Strings` indices are 4 bytes.
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.large_str
    }

    /// `true` if `#GUID` indices are 4 bytes.
    #[must_use]
    pub fn is_large_guid(&self) -> bool {
        self.large_guid
    }

    /// `true` if `#Blob` indices are 4 bytes.
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.large_blob
    }

    /// Width of a `#Strings` index.
    #[must_use]
    pub fn str_bytes(&self) -> u8 {
        if self.large_str {
            4
        } else {
            2
        }
    }

    /// Width of a `#GUID` index.
    #[must_use]
    pub fn guid_bytes(&self) -> u8 {
        if self.large_guid {
            4
        } else {
            2
        }
    }

    /// Width of a `#Blob` index.
    #[must_use]
    pub fn blob_bytes(&self) -> u8 {
        if self.large_blob {
            4
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_flags_round_trip() {
        let info = TableInfo::new(true, false, true);
        assert_eq!(info.heap_flags(), 0x05);
        assert_eq!(TableInfo::from_heap_flags(0x05), info);
        assert_eq!(info.str_bytes(), 4);
        assert_eq!(info.guid_bytes(), 2);
        assert_eq!(info.blob_bytes(), 4);
    }

    #[test]
    fn simple_index_width() {
        let mut info = TableInfo::default();
        info.set_rows(TableId::MethodDef, u32::from(u16::MAX));
        assert_eq!(info.table_index_bytes(TableId::MethodDef), 2);
        info.set_rows(TableId::MethodDef, u32::from(u16::MAX) + 1);
        assert_eq!(info.table_index_bytes(TableId::MethodDef), 4);
    }

    #[test]
    fn coded_index_width_depends_on_tag_bits() {
        let coded = CodedIndexType::HasCustomDebugInformation;
        let mut info = TableInfo::default();
        info.set_rows(TableId::LocalVariable, 2047);
        assert_eq!(info.coded_index_bytes(coded), 2);
        info.set_rows(TableId::LocalVariable, 2048);
        assert_eq!(info.coded_index_bytes(coded), 4);
    }

    #[test]
    fn present_masks() {
        let mut info = TableInfo::default();
        info.set_rows(TableId::MethodDef, 3);
        info.set_rows(TableId::Document, 1);
        info.set_rows(TableId::LocalScope, 0);
        assert_eq!(info.present_type_system_tables(), 1 << 0x06);
        assert_eq!(info.present_debug_tables(), 1 << 0x30);
    }
}
