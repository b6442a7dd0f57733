//! Portable PDB reader.
//!
//! Parses a complete image produced by [`crate::pdb::portable`] (or any other Portable PDB
//! writer) back into the debug model. It is used to verify emitted symbols and to render
//! the XML dump; nothing on the emission path depends on it.
//!
//! All tables are decoded eagerly, blobs lazily on access.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotpdb::pdb::reader::PortablePdbReader;
//!
//! let bytes = std::fs::read("app.pdb")?;
//! let pdb = PortablePdbReader::read(&bytes)?;
//! for document in pdb.documents()? {
//!     println!("{} {}", document.row, document.name);
//! }
//! # Ok::<(), dotpdb::Error>(())
//! ```

use std::ops::Range;

use strum::IntoEnumIterator;
use uguid::Guid as GuidValue;

use crate::{
    metadata::{
        customdebuginformation::{parse_custom_debug_blob, CustomDebugInfo, CustomDebugKind},
        importscope::{parse_imports_blob, ImportsInfo},
        localscope::LocalVariableAttributes,
        root::Root,
        sequencepoints::{parse_sequence_points, DecodedSequencePoints},
        streams::{Blob, Guid, PdbStream, Strings, TablesHeader, PDB_ID_SIZE},
        tables::{
            read_table, CodedIndexType, CustomDebugInformationRaw, DocumentRaw, ImportScopeRaw,
            LocalConstantRaw, LocalScopeRaw, LocalVariableRaw, MethodDebugInformationRaw,
            StateMachineMethodRaw, TableId, TableRow,
        },
        token::Token,
    },
    pdb::portable::decode_document_name,
    Error::OutOfBounds,
    Result,
};

/// A decoded `Document` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentEntry {
    /// Row number
    pub row: u32,
    /// Path
    pub name: String,
    /// Hash algorithm GUID, if the document has a checksum
    pub hash_algorithm: Option<GuidValue>,
    /// Checksum bytes
    pub hash: Vec<u8>,
    /// Language GUID
    pub language: GuidValue,
}

/// A decoded `LocalVariable` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableEntry {
    /// Name
    pub name: String,
    /// Slot index
    pub index: u16,
    /// Attributes
    pub attributes: LocalVariableAttributes,
}

/// A decoded `LocalConstant` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalConstantEntry {
    /// Name
    pub name: String,
    /// Constant signature blob
    pub signature: Vec<u8>,
}

/// A decoded `LocalScope` row with the variables and constants it owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalScopeEntry {
    /// Owning method
    pub method: Token,
    /// `ImportScope` row, 0 for none
    pub import_scope: u32,
    /// First IL offset
    pub start: u32,
    /// Length in IL bytes
    pub length: u32,
    /// Variables
    pub variables: Vec<LocalVariableEntry>,
    /// Constants
    pub constants: Vec<LocalConstantEntry>,
}

impl LocalScopeEntry {
    /// IL offset after the scope.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.start + self.length
    }
}

/// A decoded `ImportScope` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportScopeEntry {
    /// Row number
    pub row: u32,
    /// Parent row, 0 for the outermost scope
    pub parent: u32,
    /// Declarations
    pub imports: ImportsInfo,
}

/// Read access to a Portable PDB image.
pub struct PortablePdbReader<'a> {
    pdb: PdbStream,
    strings: Strings<'a>,
    blobs: Blob<'a>,
    guids: Guid<'a>,
    documents: Vec<DocumentRaw>,
    methods: Vec<MethodDebugInformationRaw>,
    scopes: Vec<LocalScopeRaw>,
    variables: Vec<LocalVariableRaw>,
    constants: Vec<LocalConstantRaw>,
    import_scopes: Vec<ImportScopeRaw>,
    state_machines: Vec<StateMachineMethodRaw>,
    custom_debug_info: Vec<CustomDebugInformationRaw>,
}

impl<'a> PortablePdbReader<'a> {
    /// Parses the metadata root, the streams and all debug tables.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a damaged image and
    /// [`crate::Error::OutOfBounds`] for a truncated one.
    pub fn read(data: &'a [u8]) -> Result<Self> {
        let root = Root::read(data)?;
        let pdb = PdbStream::from(root.stream(data, "#Pdb")?)?;
        let tables_stream = root.stream(data, "#~")?;
        let header = TablesHeader::from(tables_stream, &pdb.type_system_rows)?;

        let strings = Strings::from(root.stream(data, "#Strings")?)?;
        let blobs = Blob::from(root.stream(data, "#Blob")?)?;
        let guids = match root.stream(data, "#GUID") {
            Ok(stream) => Guid::from(stream)?,
            Err(_) => Guid::from(&[] as &[u8])?,
        };

        for table in TableId::iter() {
            if header.valid & table.bit() != 0 && !table.is_debug_table() {
                return Err(malformed_error!(
                    "Portable PDB contains type-system table {:?}",
                    table
                ));
            }
        }

        let info = &header.info;
        let mut offset = header.tables_offset;
        let rows = |table: TableId| -> u32 {
            if header.valid & table.bit() != 0 {
                info.rows(table)
            } else {
                0
            }
        };

        let documents = read_rows::<DocumentRaw>(tables_stream, &mut offset, rows(TableId::Document), info)?;
        let methods = read_rows::<MethodDebugInformationRaw>(
            tables_stream,
            &mut offset,
            rows(TableId::MethodDebugInformation),
            info,
        )?;
        let scopes = read_rows::<LocalScopeRaw>(tables_stream, &mut offset, rows(TableId::LocalScope), info)?;
        let variables = read_rows::<LocalVariableRaw>(
            tables_stream,
            &mut offset,
            rows(TableId::LocalVariable),
            info,
        )?;
        let constants = read_rows::<LocalConstantRaw>(
            tables_stream,
            &mut offset,
            rows(TableId::LocalConstant),
            info,
        )?;
        let import_scopes =
            read_rows::<ImportScopeRaw>(tables_stream, &mut offset, rows(TableId::ImportScope), info)?;
        let state_machines = read_rows::<StateMachineMethodRaw>(
            tables_stream,
            &mut offset,
            rows(TableId::StateMachineMethod),
            info,
        )?;
        let custom_debug_info = read_rows::<CustomDebugInformationRaw>(
            tables_stream,
            &mut offset,
            rows(TableId::CustomDebugInformation),
            info,
        )?;

        Ok(PortablePdbReader {
            pdb,
            strings,
            blobs,
            guids,
            documents,
            methods,
            scopes,
            variables,
            constants,
            import_scopes,
            state_machines,
            custom_debug_info,
        })
    }

    /// PDB id.
    #[must_use]
    pub fn id(&self) -> [u8; PDB_ID_SIZE] {
        self.pdb.id
    }

    /// Entry point, a null token if none.
    #[must_use]
    pub fn entry_point(&self) -> Token {
        self.pdb.entry_point
    }

    /// The `#Pdb` stream.
    #[must_use]
    pub fn pdb_stream(&self) -> &PdbStream {
        &self.pdb
    }

    /// Number of rows of each debug table, in table order.
    #[must_use]
    pub fn row_counts(&self) -> [(TableId, usize); 8] {
        [
            (TableId::Document, self.documents.len()),
            (TableId::MethodDebugInformation, self.methods.len()),
            (TableId::LocalScope, self.scopes.len()),
            (TableId::LocalVariable, self.variables.len()),
            (TableId::LocalConstant, self.constants.len()),
            (TableId::ImportScope, self.import_scopes.len()),
            (TableId::StateMachineMethod, self.state_machines.len()),
            (TableId::CustomDebugInformation, self.custom_debug_info.len()),
        ]
    }

    /// All documents in row order.
    ///
    /// # Errors
    /// Returns an error if a heap reference is invalid.
    pub fn documents(&self) -> Result<Vec<DocumentEntry>> {
        self.documents
            .iter()
            .map(|row| {
                let name_blob = self.blobs.get(row.name as usize)?;
                let name =
                    decode_document_name(name_blob, &|index| self.blobs.get(index as usize))?;
                let hash_algorithm = match row.hash_algorithm {
                    0 => None,
                    index => Some(self.guids.get(index as usize)?),
                };
                Ok(DocumentEntry {
                    row: row.rid,
                    name,
                    hash_algorithm,
                    hash: self.blobs.get(row.hash as usize)?.to_vec(),
                    language: self.guids.get(row.language as usize)?,
                })
            })
            .collect()
    }

    /// Methods that carry any debug information, in token order.
    #[must_use]
    pub fn debug_methods(&self) -> Vec<Token> {
        let mut rows: Vec<u32> = self
            .methods
            .iter()
            .filter(|row| row.sequence_points != 0)
            .map(|row| row.rid)
            .chain(self.scopes.iter().map(|row| row.method))
            .chain(self.custom_debug_info.iter().filter_map(|row| {
                CodedIndexType::HasCustomDebugInformation
                    .decode(row.parent)
                    .ok()
                    .filter(|token| token.is_table(TableId::MethodDef))
                    .map(|token| token.row())
            }))
            .collect();
        rows.sort_unstable();
        rows.dedup();
        rows.into_iter().map(Token::method_def).collect()
    }

    /// Sequence points of `method`, `None` if it has none.
    ///
    /// # Errors
    /// Returns an error if the blob is malformed.
    pub fn sequence_points(&self, method: Token) -> Result<Option<DecodedSequencePoints>> {
        let Some(row) = method
            .row()
            .checked_sub(1)
            .and_then(|index| self.methods.get(index as usize))
        else {
            return Ok(None);
        };
        if row.sequence_points == 0 {
            return Ok(None);
        }

        let blob = self.blobs.get(row.sequence_points as usize)?;
        parse_sequence_points(blob, row.document).map(Some)
    }

    /// Scopes of `method` in table order, parents before children.
    ///
    /// # Errors
    /// Returns an error if a heap reference or a list range is invalid.
    pub fn local_scopes(&self, method: Token) -> Result<Vec<LocalScopeEntry>> {
        let mut result = Vec::new();
        for (index, scope) in self.scopes.iter().enumerate() {
            if scope.method != method.row() {
                continue;
            }

            let next = self.scopes.get(index + 1);
            let variables = list_range(
                scope.variable_list,
                next.map(|n| n.variable_list),
                self.variables.len(),
            )?;
            let constants = list_range(
                scope.constant_list,
                next.map(|n| n.constant_list),
                self.constants.len(),
            )?;

            result.push(LocalScopeEntry {
                method: Token::method_def(scope.method),
                import_scope: scope.import_scope,
                start: scope.start_offset,
                length: scope.length,
                variables: self.variables[variables]
                    .iter()
                    .map(|row| {
                        Ok(LocalVariableEntry {
                            name: self.strings.get(row.name as usize)?.to_string(),
                            index: row.index,
                            attributes: LocalVariableAttributes::from_bits_retain(row.attributes),
                        })
                    })
                    .collect::<Result<_>>()?,
                constants: self.constants[constants]
                    .iter()
                    .map(|row| {
                        Ok(LocalConstantEntry {
                            name: self.strings.get(row.name as usize)?.to_string(),
                            signature: self.blobs.get(row.signature as usize)?.to_vec(),
                        })
                    })
                    .collect::<Result<_>>()?,
            });
        }
        Ok(result)
    }

    /// All import scopes in row order.
    ///
    /// # Errors
    /// Returns an error if an imports blob is malformed.
    pub fn import_scopes(&self) -> Result<Vec<ImportScopeEntry>> {
        self.import_scopes
            .iter()
            .map(|row| {
                let blob = self.blobs.get(row.imports as usize)?;
                Ok(ImportScopeEntry {
                    row: row.rid,
                    parent: row.parent,
                    imports: parse_imports_blob(blob, &self.blobs)?,
                })
            })
            .collect()
    }

    /// `(move_next, kickoff)` pairs ordered by `MoveNext`.
    #[must_use]
    pub fn state_machine_methods(&self) -> Vec<(Token, Token)> {
        self.state_machines
            .iter()
            .map(|row| {
                (
                    Token::method_def(row.move_next_method),
                    Token::method_def(row.kickoff_method),
                )
            })
            .collect()
    }

    /// Every custom debug information row, decoded, in table order.
    ///
    /// # Errors
    /// Returns an error if a parent, kind or value cannot be decoded.
    pub fn custom_debug_entries(&self) -> Result<Vec<(Token, CustomDebugInfo)>> {
        self.custom_debug_info
            .iter()
            .map(|row| {
                let parent = CodedIndexType::HasCustomDebugInformation.decode(row.parent)?;
                let kind = CustomDebugKind::from_guid(self.guids.get(row.kind as usize)?);
                let value = self.blobs.get(row.value as usize)?;
                Ok((parent, parse_custom_debug_blob(value, kind)?))
            })
            .collect()
    }

    /// Custom debug information attached to `parent`.
    ///
    /// # Errors
    /// Returns an error if a value cannot be decoded.
    pub fn custom_debug_info(&self, parent: Token) -> Result<Vec<CustomDebugInfo>> {
        Ok(self
            .custom_debug_entries()?
            .into_iter()
            .filter(|(owner, _)| *owner == parent)
            .map(|(_, info)| info)
            .collect())
    }
}

fn read_rows<T: TableRow>(
    data: &[u8],
    offset: &mut usize,
    count: u32,
    info: &crate::metadata::tables::TableInfoRef,
) -> Result<Vec<T>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let needed = count as usize * T::row_size(info) as usize;
    if !matches!(offset.checked_add(needed), Some(end) if end <= data.len()) {
        return Err(OutOfBounds);
    }
    read_table(data, offset, count, info)
}

fn list_range(start: u32, next: Option<u32>, len: usize) -> Result<Range<usize>> {
    let start = start.max(1) as usize - 1;
    let end = next.map_or(len, |n| (n.max(1) as usize - 1).min(len));
    if start > end {
        return Err(malformed_error!(
            "Invalid list range {}..{} in LocalScope",
            start + 1,
            end + 1
        ));
    }
    Ok(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            customdebuginformation::serialize,
            documents::{DocumentChecksum, DocumentLanguage, HashAlgorithm},
            importscope::{encode_imports, ImportDeclaration},
        },
        pdb::portable::{PdbIdMode, PortablePdbBuilder},
    };

    fn sample() -> Vec<u8> {
        let mut builder = PortablePdbBuilder::new(&[(TableId::MethodDef, 3)]);
        let checksum = DocumentChecksum {
            algorithm: HashAlgorithm::Sha1.guid(),
            digest: vec![0xAB; 20],
        };
        let document = builder
            .add_document("/src/Program.cs", DocumentLanguage::CSharp.guid(), Some(&checksum))
            .unwrap();
        builder.add_document("/gen/Line.cs", DocumentLanguage::CSharp.guid(), None).unwrap();

        builder
            .set_method_debug_info(
                Token::method_def(2),
                document,
                &[0x01, 0, 0, 1, 1, 35, 1, 0, 25, 0, 4, 6, 0, 1, 0, 0x34],
            )
            .unwrap();

        let imports = ImportsInfo::with_declarations(vec![ImportDeclaration::namespace("System")]);
        let blob = encode_imports(&imports, builder.blobs_mut()).unwrap();
        let import_scope = builder.add_import_scope(0, &blob).unwrap();

        builder.add_local_scope(Token::method_def(2), import_scope, 0, 8).unwrap();
        builder.add_local_variable(0, 0, "p").unwrap();
        builder.add_local_scope(Token::method_def(2), 0, 1, 3).unwrap();
        builder.add_local_constant("K", &[0x08, 1, 0, 0, 0]).unwrap();
        builder.add_local_scope(Token::method_def(3), 0, 0, 2).unwrap();

        let source_link = CustomDebugInfo::SourceLink("{}".into());
        builder
            .add_custom_debug_info(
                Token::from_parts(TableId::Module, 1),
                CustomDebugKind::SourceLink.guid(),
                &serialize(&source_link).unwrap(),
            )
            .unwrap();
        builder.add_state_machine(Token::method_def(3), Token::method_def(1)).unwrap();
        builder.set_entry_point(Token::method_def(2));
        builder.finish(PdbIdMode::Deterministic).unwrap().bytes
    }

    #[test]
    fn reads_back_documents_and_methods() {
        let bytes = sample();
        let pdb = PortablePdbReader::read(&bytes).unwrap();
        assert_eq!(pdb.entry_point(), Token::method_def(2));

        let documents = pdb.documents().unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].name, "/src/Program.cs");
        assert_eq!(documents[0].hash_algorithm, Some(HashAlgorithm::Sha1.guid()));
        assert_eq!(documents[0].hash, vec![0xAB; 20]);
        assert_eq!(documents[1].hash_algorithm, None);
        assert!(documents[1].hash.is_empty());

        let points = pdb.sequence_points(Token::method_def(2)).unwrap().unwrap();
        assert_eq!(points.local_signature, 1);
        assert_eq!(points.table.offsets().collect::<Vec<_>>(), [0, 1, 7]);
        assert!(pdb.sequence_points(Token::method_def(1)).unwrap().is_none());
        assert_eq!(
            pdb.debug_methods(),
            [Token::method_def(2), Token::method_def(3)]
        );
    }

    #[test]
    fn reads_back_scopes_with_their_lists() {
        let bytes = sample();
        let pdb = PortablePdbReader::read(&bytes).unwrap();

        let scopes = pdb.local_scopes(Token::method_def(2)).unwrap();
        assert_eq!(scopes.len(), 2);
        assert_eq!((scopes[0].start, scopes[0].end()), (0, 8));
        assert_eq!(scopes[0].import_scope, 1);
        assert_eq!(scopes[0].variables.len(), 1);
        assert_eq!(scopes[0].variables[0].name, "p");
        assert!(scopes[0].constants.is_empty());
        assert!(scopes[1].variables.is_empty());
        assert_eq!(scopes[1].constants[0].name, "K");

        let third = pdb.local_scopes(Token::method_def(3)).unwrap();
        assert_eq!(third.len(), 1);
        assert!(third[0].variables.is_empty());
        assert!(third[0].constants.is_empty());
    }

    #[test]
    fn reads_back_imports_and_custom_debug_info() {
        let bytes = sample();
        let pdb = PortablePdbReader::read(&bytes).unwrap();

        let imports = pdb.import_scopes().unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].parent, 0);
        assert_eq!(
            imports[0].imports.iter().next(),
            Some(&ImportDeclaration::namespace("System"))
        );

        let module = pdb
            .custom_debug_info(Token::from_parts(TableId::Module, 1))
            .unwrap();
        assert_eq!(module, vec![CustomDebugInfo::SourceLink("{}".into())]);
        assert_eq!(
            pdb.state_machine_methods(),
            [(Token::method_def(3), Token::method_def(1))]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(PortablePdbReader::read(&[0u8; 64]).is_err());
        let mut bytes = sample();
        bytes.truncate(bytes.len() / 2);
        assert!(PortablePdbReader::read(&bytes).is_err());
    }
}
