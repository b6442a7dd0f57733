use crate::{
    file::io::{read_le_at_dyn, write_le_at_dyn},
    metadata::tables::{TableId, TableInfoRef, TableRow},
    Result,
};

/// A row of the `ImportScope` table (0x35).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportScopeRaw {
    /// Row id
    pub rid: u32,
    /// Enclosing `ImportScope` row, 0 for the outermost scope
    pub parent: u32,
    /// `#Blob` index of the imports blob
    pub imports: u32,
}

impl TableRow for ImportScopeRaw {
    const TABLE: TableId = TableId::ImportScope;

    fn row_size(sizes: &TableInfoRef) -> u32 {
        u32::from(sizes.table_index_bytes(TableId::ImportScope) + sizes.blob_bytes())
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(ImportScopeRaw {
            rid,
            parent: read_le_at_dyn(data, offset, sizes.is_large(TableId::ImportScope))?,
            imports: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }

    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()> {
        write_le_at_dyn(data, offset, self.parent, sizes.is_large(TableId::ImportScope))?;
        write_le_at_dyn(data, offset, self.imports, sizes.is_large_blob())
    }
}
