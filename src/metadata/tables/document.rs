use crate::{
    file::io::{read_le_at_dyn, write_le_at_dyn},
    metadata::tables::{TableId, TableInfoRef, TableRow},
    Result,
};

/// A row of the `Document` table (0x30).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentRaw {
    /// Row id
    pub rid: u32,
    /// `#Blob` index of the document name blob
    pub name: u32,
    /// `#GUID` index of the hash algorithm
    pub hash_algorithm: u32,
    /// `#Blob` index of the checksum
    pub hash: u32,
    /// `#GUID` index of the language
    pub language: u32,
}

impl TableRow for DocumentRaw {
    const TABLE: TableId = TableId::Document;

    fn row_size(sizes: &TableInfoRef) -> u32 {
        u32::from(
            sizes.blob_bytes() + // name
            sizes.guid_bytes() + // hash_algorithm
            sizes.blob_bytes() + // hash
            sizes.guid_bytes(), //  language
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(DocumentRaw {
            rid,
            name: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            hash_algorithm: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
            hash: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            language: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
        })
    }

    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()> {
        write_le_at_dyn(data, offset, self.name, sizes.is_large_blob())?;
        write_le_at_dyn(data, offset, self.hash_algorithm, sizes.is_large_guid())?;
        write_le_at_dyn(data, offset, self.hash, sizes.is_large_blob())?;
        write_le_at_dyn(data, offset, self.language, sizes.is_large_guid())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metadata::tables::TableInfo;

    #[test]
    fn small_heaps() {
        let sizes = Arc::new(TableInfo::default());
        let row = DocumentRaw {
            rid: 1,
            name: 0x0101,
            hash_algorithm: 0x02,
            hash: 0x0303,
            language: 0x04,
        };

        let mut data = vec![0u8; DocumentRaw::row_size(&sizes) as usize];
        let mut offset = 0;
        row.row_write(&mut data, &mut offset, &sizes).unwrap();
        assert_eq!(data, [0x01, 0x01, 0x02, 0x00, 0x03, 0x03, 0x04, 0x00]);

        let mut offset = 0;
        assert_eq!(DocumentRaw::row_read(&data, &mut offset, 1, &sizes).unwrap(), row);
    }

    #[test]
    fn large_blob_heap() {
        let sizes = Arc::new(TableInfo::new(false, false, true));
        assert_eq!(DocumentRaw::row_size(&sizes), 12);
    }
}
