use strum::IntoEnumIterator;

use crate::{
    file::parser::Parser,
    metadata::{tables::TableId, token::Token},
    Result,
};

/// Length of the PDB id: a 16-byte GUID followed by a 4-byte stamp.
pub const PDB_ID_SIZE: usize = 20;

/// The `#Pdb` stream.
///
/// It identifies the PDB (the id the PE's CodeView entry must match), names the entry point
/// and carries the row counts of the type-system tables of the described module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbStream {
    /// PDB id: GUID followed by a timestamp-like stamp
    pub id: [u8; PDB_ID_SIZE],
    /// Entry point method, or a null token
    pub entry_point: Token,
    /// Bit vector of type-system tables the debug tables may reference
    pub referenced_type_system_tables: u64,
    /// Row counts of the referenced tables, in table id order
    pub type_system_rows: Vec<(TableId, u32)>,
}

impl PdbStream {
    /// Parses the stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for a truncated stream.
    pub fn from(data: &[u8]) -> Result<PdbStream> {
        let mut parser = Parser::new(data);
        let mut id = [0u8; PDB_ID_SIZE];
        id.copy_from_slice(parser.read_bytes(PDB_ID_SIZE)?);
        let entry_point = Token::new(parser.read_le::<u32>()?);
        let referenced_type_system_tables = parser.read_le::<u64>()?;

        let mut type_system_rows = Vec::new();
        for table in TableId::iter().filter(|t| !t.is_debug_table()) {
            if referenced_type_system_tables & table.bit() != 0 {
                type_system_rows.push((table, parser.read_le::<u32>()?));
            }
        }

        Ok(PdbStream {
            id,
            entry_point,
            referenced_type_system_tables,
            type_system_rows,
        })
    }

    /// Appends the serialized stream.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&self.entry_point.value().to_le_bytes());
        out.extend_from_slice(&self.referenced_type_system_tables.to_le_bytes());
        for (_, rows) in &self.type_system_rows {
            out.extend_from_slice(&rows.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let stream = PdbStream {
            id: [7; PDB_ID_SIZE],
            entry_point: Token::method_def(1),
            referenced_type_system_tables: TableId::TypeDef.bit() | TableId::MethodDef.bit(),
            type_system_rows: vec![(TableId::TypeDef, 2), (TableId::MethodDef, 9)],
        };

        let mut data = Vec::new();
        stream.write(&mut data);
        assert_eq!(data.len(), 20 + 4 + 8 + 8);
        assert_eq!(PdbStream::from(&data).unwrap(), stream);
    }
}
