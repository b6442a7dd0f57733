use crate::{
    file::io::{read_le_at_dyn, write_le_at_dyn},
    metadata::tables::{CodedIndexType, TableId, TableInfoRef, TableRow},
    Result,
};

/// A row of the `CustomDebugInformation` table (0x37), sorted by `parent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomDebugInformationRaw {
    /// Row id
    pub rid: u32,
    /// `HasCustomDebugInformation` coded index of the owning entity
    pub parent: u32,
    /// `#GUID` index of the kind
    pub kind: u32,
    /// `#Blob` index of the value
    pub value: u32,
}

impl TableRow for CustomDebugInformationRaw {
    const TABLE: TableId = TableId::CustomDebugInformation;

    fn row_size(sizes: &TableInfoRef) -> u32 {
        u32::from(
            sizes.coded_index_bytes(CodedIndexType::HasCustomDebugInformation)
                + sizes.guid_bytes()
                + sizes.blob_bytes(),
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(CustomDebugInformationRaw {
            rid,
            parent: read_le_at_dyn(
                data,
                offset,
                sizes.is_large_coded(CodedIndexType::HasCustomDebugInformation),
            )?,
            kind: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
            value: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }

    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()> {
        write_le_at_dyn(
            data,
            offset,
            self.parent,
            sizes.is_large_coded(CodedIndexType::HasCustomDebugInformation),
        )?;
        write_le_at_dyn(data, offset, self.kind, sizes.is_large_guid())?;
        write_le_at_dyn(data, offset, self.value, sizes.is_large_blob())
    }
}
