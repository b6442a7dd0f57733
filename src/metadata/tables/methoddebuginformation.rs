use crate::{
    file::io::{read_le_at_dyn, write_le_at_dyn},
    metadata::tables::{TableId, TableInfoRef, TableRow},
    Result,
};

/// A row of the `MethodDebugInformation` table (0x31).
///
/// The table is parallel to `MethodDef`: row `n` describes method `0x06000000 | n`, and
/// methods without debug information get a row of zeros.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MethodDebugInformationRaw {
    /// Row id
    pub rid: u32,
    /// `Document` row when all sequence points are in one document, else 0
    pub document: u32,
    /// `#Blob` index of the sequence points blob
    pub sequence_points: u32,
}

impl TableRow for MethodDebugInformationRaw {
    const TABLE: TableId = TableId::MethodDebugInformation;

    fn row_size(sizes: &TableInfoRef) -> u32 {
        u32::from(sizes.table_index_bytes(TableId::Document) + sizes.blob_bytes())
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(MethodDebugInformationRaw {
            rid,
            document: read_le_at_dyn(data, offset, sizes.is_large(TableId::Document))?,
            sequence_points: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }

    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()> {
        write_le_at_dyn(data, offset, self.document, sizes.is_large(TableId::Document))?;
        write_le_at_dyn(data, offset, self.sequence_points, sizes.is_large_blob())
    }
}
