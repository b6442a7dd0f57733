use crate::{
    file::io::{read_le_at, read_le_at_dyn, write_le_at, write_le_at_dyn},
    metadata::tables::{TableId, TableInfoRef, TableRow},
    Result,
};

/// A row of the `LocalVariable` table (0x33).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableRaw {
    /// Row id
    pub rid: u32,
    /// `LocalVariableAttributes` bits
    pub attributes: u16,
    /// Slot index in the local signature
    pub index: u16,
    /// `#Strings` index of the name
    pub name: u32,
}

impl TableRow for LocalVariableRaw {
    const TABLE: TableId = TableId::LocalVariable;

    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 + 2 + u32::from(sizes.str_bytes())
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(LocalVariableRaw {
            rid,
            attributes: read_le_at::<u16>(data, offset)?,
            index: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
        })
    }

    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()> {
        write_le_at(data, offset, self.attributes)?;
        write_le_at(data, offset, self.index)?;
        write_le_at_dyn(data, offset, self.name, sizes.is_large_str())
    }
}
