use crate::{
    file::io::{read_le_at_dyn, write_le_at_dyn},
    metadata::tables::{TableId, TableInfoRef, TableRow},
    Result,
};

/// A row of the `LocalConstant` table (0x34).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalConstantRaw {
    /// Row id
    pub rid: u32,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Blob` index of the constant signature
    pub signature: u32,
}

impl TableRow for LocalConstantRaw {
    const TABLE: TableId = TableId::LocalConstant;

    fn row_size(sizes: &TableInfoRef) -> u32 {
        u32::from(sizes.str_bytes() + sizes.blob_bytes())
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(LocalConstantRaw {
            rid,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }

    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()> {
        write_le_at_dyn(data, offset, self.name, sizes.is_large_str())?;
        write_le_at_dyn(data, offset, self.signature, sizes.is_large_blob())
    }
}
