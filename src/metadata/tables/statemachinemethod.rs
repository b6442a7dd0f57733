use crate::{
    file::io::{read_le_at_dyn, write_le_at_dyn},
    metadata::tables::{TableId, TableInfoRef, TableRow},
    Result,
};

/// A row of the `StateMachineMethod` table (0x36), sorted by `move_next_method`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateMachineMethodRaw {
    /// Row id
    pub rid: u32,
    /// `MethodDef` row of the generated `MoveNext`
    pub move_next_method: u32,
    /// `MethodDef` row of the user-visible kickoff method
    pub kickoff_method: u32,
}

impl TableRow for StateMachineMethodRaw {
    const TABLE: TableId = TableId::StateMachineMethod;

    fn row_size(sizes: &TableInfoRef) -> u32 {
        u32::from(sizes.table_index_bytes(TableId::MethodDef)) * 2
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        let large = sizes.is_large(TableId::MethodDef);
        Ok(StateMachineMethodRaw {
            rid,
            move_next_method: read_le_at_dyn(data, offset, large)?,
            kickoff_method: read_le_at_dyn(data, offset, large)?,
        })
    }

    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()> {
        let large = sizes.is_large(TableId::MethodDef);
        write_le_at_dyn(data, offset, self.move_next_method, large)?;
        write_le_at_dyn(data, offset, self.kickoff_method, large)
    }
}
