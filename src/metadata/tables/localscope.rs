use crate::{
    file::io::{read_le_at, read_le_at_dyn, write_le_at, write_le_at_dyn},
    metadata::tables::{TableId, TableInfoRef, TableRow},
    Result,
};

/// A row of the `LocalScope` table (0x32).
///
/// Rows are sorted by method, then by start offset ascending, then by length descending,
/// so a parent scope always precedes the scopes it contains. Variable and constant lists
/// run until the list start of the next row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalScopeRaw {
    /// Row id
    pub rid: u32,
    /// `MethodDef` row of the owning method
    pub method: u32,
    /// `ImportScope` row, 0 for none
    pub import_scope: u32,
    /// First `LocalVariable` row owned by the scope
    pub variable_list: u32,
    /// First `LocalConstant` row owned by the scope
    pub constant_list: u32,
    /// First IL offset covered
    pub start_offset: u32,
    /// Number of IL bytes covered
    pub length: u32,
}

impl TableRow for LocalScopeRaw {
    const TABLE: TableId = TableId::LocalScope;

    fn row_size(sizes: &TableInfoRef) -> u32 {
        u32::from(
            sizes.table_index_bytes(TableId::MethodDef)
                + sizes.table_index_bytes(TableId::ImportScope)
                + sizes.table_index_bytes(TableId::LocalVariable)
                + sizes.table_index_bytes(TableId::LocalConstant)
                + 4
                + 4,
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(LocalScopeRaw {
            rid,
            method: read_le_at_dyn(data, offset, sizes.is_large(TableId::MethodDef))?,
            import_scope: read_le_at_dyn(data, offset, sizes.is_large(TableId::ImportScope))?,
            variable_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::LocalVariable))?,
            constant_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::LocalConstant))?,
            start_offset: read_le_at::<u32>(data, offset)?,
            length: read_le_at::<u32>(data, offset)?,
        })
    }

    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()> {
        write_le_at_dyn(data, offset, self.method, sizes.is_large(TableId::MethodDef))?;
        write_le_at_dyn(data, offset, self.import_scope, sizes.is_large(TableId::ImportScope))?;
        write_le_at_dyn(data, offset, self.variable_list, sizes.is_large(TableId::LocalVariable))?;
        write_le_at_dyn(data, offset, self.constant_list, sizes.is_large(TableId::LocalConstant))?;
        write_le_at(data, offset, self.start_offset)?;
        write_le_at(data, offset, self.length)
    }
}
