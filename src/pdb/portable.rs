//! Portable PDB serialization.
//!
//! [`PortablePdbBuilder`] collects the rows of the eight debug tables together with the
//! heaps they index into, and lays them out as a complete metadata image:
//!
//! ```text
//! BSJB root | #Pdb | #~ | #Strings | #US | #GUID | #Blob
//! ```
//!
//! Rows are appended in the order the symbol writer produces them. The writer hands methods
//! over in token order, so `LocalScope` rows and the variable and constant lists they
//! point at come out sorted already. `StateMachineMethod` and `CustomDebugInformation`
//! rows are sorted here (stable, so the kind order of one parent is kept).
//!
//! The PDB id is computed last. With deterministic output it is derived from a SHA-256 of
//! the whole image with the id zeroed, so identical inputs give identical files.
//!
//! # Examples
//!
//! ```rust
//! use dotpdb::pdb::portable::{PdbIdMode, PortablePdbBuilder};
//!
//! let mut builder = PortablePdbBuilder::new(&[]);
//! builder.add_document("/src/a.cs", dotpdb::metadata::documents::DocumentLanguage::CSharp.guid(), None)?;
//! let pdb = builder.finish(PdbIdMode::Deterministic)?;
//! assert_eq!(&pdb.bytes[..4], b"BSJB");
//! # Ok::<(), dotpdb::Error>(())
//! ```

use std::sync::Arc;

use sha2::{Digest, Sha256};
use strum::IntoEnumIterator;
use uguid::Guid;

use crate::{
    file::parser::Parser,
    metadata::{
        documents::DocumentChecksum,
        root::{write_metadata, Root},
        streams::{
            write_tables_header, BlobHeapBuilder, GuidHeapBuilder, PdbStream, StringsHeapBuilder,
            PDB_ID_SIZE,
        },
        tables::{
            write_table, CodedIndexType, CustomDebugInformationRaw, DocumentRaw, ImportScopeRaw,
            LocalConstantRaw, LocalScopeRaw, LocalVariableRaw, MethodDebugInformationRaw,
            StateMachineMethodRaw, TableId, TableInfo, TableInfoRef, TableRow,
            SORTED_DEBUG_TABLES,
        },
        token::Token,
    },
    utils::write_compressed_uint,
    Result,
};

/// How the PDB id is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PdbIdMode {
    /// Hash of the content; reproducible
    Deterministic,
    /// Hash of the content salted with the given nanosecond timestamp
    Timestamped(u128),
}

impl PdbIdMode {
    /// Salts with the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        PdbIdMode::Timestamped(nanos)
    }
}

/// A serialized Portable PDB.
#[derive(Clone, Debug)]
pub struct PortablePdb {
    /// The image
    pub bytes: Vec<u8>,
    /// PDB id, also stored in the `#Pdb` stream
    pub id: [u8; PDB_ID_SIZE],
}

impl PortablePdb {
    /// GUID part of the id, as referenced by the CodeView debug directory entry.
    #[must_use]
    pub fn guid(&self) -> Guid {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.id[..16]);
        Guid::from_bytes(bytes)
    }

    /// Stamp part of the id, used as the debug directory time stamp.
    #[must_use]
    pub fn stamp(&self) -> u32 {
        u32::from_le_bytes([self.id[16], self.id[17], self.id[18], self.id[19]])
    }
}

/// Collects debug table rows and heaps, then writes the image.
pub struct PortablePdbBuilder {
    strings: StringsHeapBuilder,
    blobs: BlobHeapBuilder,
    guids: GuidHeapBuilder,
    documents: Vec<DocumentRaw>,
    methods: Vec<MethodDebugInformationRaw>,
    scopes: Vec<LocalScopeRaw>,
    variables: Vec<LocalVariableRaw>,
    constants: Vec<LocalConstantRaw>,
    import_scopes: Vec<ImportScopeRaw>,
    state_machines: Vec<StateMachineMethodRaw>,
    custom_debug_info: Vec<CustomDebugInformationRaw>,
    entry_point: Token,
    type_system_rows: Vec<(TableId, u32)>,
}

impl PortablePdbBuilder {
    /// Creates an empty builder. `type_system_rows` are the row counts of the compiled
    /// module's tables; they size the index columns and the `MethodDebugInformation` table.
    #[must_use]
    pub fn new(type_system_rows: &[(TableId, u32)]) -> Self {
        let mut type_system_rows: Vec<(TableId, u32)> = type_system_rows
            .iter()
            .copied()
            .filter(|(table, rows)| !table.is_debug_table() && *rows > 0)
            .collect();
        type_system_rows.sort_by_key(|(table, _)| *table);
        type_system_rows.dedup_by_key(|(table, _)| *table);

        let method_count = type_system_rows
            .iter()
            .find(|(table, _)| *table == TableId::MethodDef)
            .map_or(0, |(_, rows)| *rows);

        PortablePdbBuilder {
            strings: StringsHeapBuilder::new(),
            blobs: BlobHeapBuilder::new(),
            guids: GuidHeapBuilder::new(),
            documents: Vec::new(),
            methods: (1..=method_count)
                .map(|rid| MethodDebugInformationRaw {
                    rid,
                    document: 0,
                    sequence_points: 0,
                })
                .collect(),
            scopes: Vec::new(),
            variables: Vec::new(),
            constants: Vec::new(),
            import_scopes: Vec::new(),
            state_machines: Vec::new(),
            custom_debug_info: Vec::new(),
            entry_point: Token::new(0),
            type_system_rows,
        }
    }

    /// Mutable access to the blob heap, for blobs that reference other blobs.
    pub fn blobs_mut(&mut self) -> &mut BlobHeapBuilder {
        &mut self.blobs
    }

    /// Adds a blob and returns its heap offset.
    pub fn add_blob(&mut self, value: &[u8]) -> u32 {
        self.blobs.add(value)
    }

    /// Adds a `Document` row and returns its row number.
    ///
    /// # Errors
    /// Currently infallible apart from heap overflow on absurd input.
    pub fn add_document(
        &mut self,
        name: &str,
        language: Guid,
        checksum: Option<&DocumentChecksum>,
    ) -> Result<u32> {
        let name_blob = encode_document_name(name, &mut self.blobs);
        let name = self.blobs.add(&name_blob);
        let (hash_algorithm, hash) = match checksum {
            Some(checksum) => (
                self.guids.add(checksum.algorithm),
                self.blobs.add(&checksum.digest),
            ),
            None => (0, 0),
        };
        let language = self.guids.add(language);

        let rid = next_rid(self.documents.len())?;
        self.documents.push(DocumentRaw {
            rid,
            name,
            hash_algorithm,
            hash,
            language,
        });
        Ok(rid)
    }

    /// Fills the `MethodDebugInformation` row of `method`. Rows of methods that are never
    /// set stay empty; the table grows if the method lies beyond the declared row count.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a token that is not a `MethodDef`.
    pub fn set_method_debug_info(
        &mut self,
        method: Token,
        document: u32,
        sequence_points: &[u8],
    ) -> Result<()> {
        if !method.is_table(TableId::MethodDef) || method.row() == 0 {
            return Err(malformed_error!("Not a method definition - {}", method));
        }

        let index = method.row() as usize - 1;
        while self.methods.len() <= index {
            let rid = self.methods.len() as u32 + 1;
            self.methods.push(MethodDebugInformationRaw {
                rid,
                document: 0,
                sequence_points: 0,
            });
        }

        let sequence_points = self.blobs.add(sequence_points);
        self.methods[index].document = document;
        self.methods[index].sequence_points = sequence_points;
        Ok(())
    }

    /// Adds a `LocalScope` row whose variable and constant lists start at the next rows to
    /// be added. Returns the row number.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row would break the table's sort order.
    pub fn add_local_scope(
        &mut self,
        method: Token,
        import_scope: u32,
        start_offset: u32,
        length: u32,
    ) -> Result<u32> {
        if let Some(previous) = self.scopes.last() {
            let key = (method.row(), start_offset, std::cmp::Reverse(length));
            let previous_key = (
                previous.method,
                previous.start_offset,
                std::cmp::Reverse(previous.length),
            );
            if key < previous_key {
                return Err(malformed_error!(
                    "LocalScope of {} at {:#x} added out of order",
                    method,
                    start_offset
                ));
            }
        }

        let rid = next_rid(self.scopes.len())?;
        self.scopes.push(LocalScopeRaw {
            rid,
            method: method.row(),
            import_scope,
            variable_list: next_rid(self.variables.len())?,
            constant_list: next_rid(self.constants.len())?,
            start_offset,
            length,
        });
        Ok(rid)
    }

    /// Adds a `LocalVariable` row to the last scope and returns its row number.
    ///
    /// # Errors
    /// Returns an error if the name cannot be added to the string heap.
    pub fn add_local_variable(&mut self, attributes: u16, index: u16, name: &str) -> Result<u32> {
        let name = self.strings.add(name)?;
        let rid = next_rid(self.variables.len())?;
        self.variables.push(LocalVariableRaw {
            rid,
            attributes,
            index,
            name,
        });
        Ok(rid)
    }

    /// Adds a `LocalConstant` row to the last scope and returns its row number.
    ///
    /// # Errors
    /// Returns an error if the name cannot be added to the string heap.
    pub fn add_local_constant(&mut self, name: &str, signature: &[u8]) -> Result<u32> {
        let name = self.strings.add(name)?;
        let signature = self.blobs.add(signature);
        let rid = next_rid(self.constants.len())?;
        self.constants.push(LocalConstantRaw {
            rid,
            name,
            signature,
        });
        Ok(rid)
    }

    /// Adds an `ImportScope` row and returns its row number. `parent` must be an earlier row
    /// or 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a forward parent reference.
    pub fn add_import_scope(&mut self, parent: u32, imports: &[u8]) -> Result<u32> {
        let rid = next_rid(self.import_scopes.len())?;
        if parent >= rid {
            return Err(malformed_error!(
                "ImportScope {} references parent {} which is not defined yet",
                rid,
                parent
            ));
        }

        let imports = self.blobs.add(imports);
        self.import_scopes.push(ImportScopeRaw {
            rid,
            parent,
            imports,
        });
        Ok(rid)
    }

    /// Adds a `StateMachineMethod` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if either token is not a `MethodDef`.
    pub fn add_state_machine(&mut self, move_next: Token, kickoff: Token) -> Result<()> {
        if !move_next.is_table(TableId::MethodDef) || !kickoff.is_table(TableId::MethodDef) {
            return Err(malformed_error!(
                "State machine methods must be method definitions - {} / {}",
                move_next,
                kickoff
            ));
        }

        self.state_machines.push(StateMachineMethodRaw {
            rid: 0,
            move_next_method: move_next.row(),
            kickoff_method: kickoff.row(),
        });
        Ok(())
    }

    /// Adds a `CustomDebugInformation` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `parent` cannot carry custom debug information.
    pub fn add_custom_debug_info(&mut self, parent: Token, kind: Guid, value: &[u8]) -> Result<()> {
        let parent = CodedIndexType::HasCustomDebugInformation.encode(parent)?;
        let kind = self.guids.add(kind);
        let value = self.blobs.add(value);
        self.custom_debug_info.push(CustomDebugInformationRaw {
            rid: 0,
            parent,
            kind,
            value,
        });
        Ok(())
    }

    /// Sets the entry point method.
    pub fn set_entry_point(&mut self, method: Token) {
        self.entry_point = method;
    }

    /// Number of `Document` rows added so far.
    #[must_use]
    pub fn document_count(&self) -> u32 {
        self.documents.len() as u32
    }

    /// Writes the image.
    ///
    /// # Errors
    /// Returns an error if a row does not fit its column widths.
    pub fn finish(mut self, mode: PdbIdMode) -> Result<PortablePdb> {
        self.state_machines.sort_by_key(|row| row.move_next_method);
        for (index, row) in self.state_machines.iter_mut().enumerate() {
            row.rid = index as u32 + 1;
        }

        self.custom_debug_info.sort_by_key(|row| row.parent);
        for (index, row) in self.custom_debug_info.iter_mut().enumerate() {
            row.rid = index as u32 + 1;
        }

        let strings = self.strings.finish();
        let guids = self.guids.finish();
        let blobs = self.blobs.finish();

        let mut info = TableInfo::new(
            strings.len() > usize::from(u16::MAX),
            guids.len() / 16 > usize::from(u16::MAX),
            blobs.len() > usize::from(u16::MAX),
        );
        for (table, rows) in &self.type_system_rows {
            info.set_rows(*table, *rows);
        }
        info.set_rows(TableId::Document, self.documents.len() as u32);
        info.set_rows(TableId::MethodDebugInformation, self.methods.len() as u32);
        info.set_rows(TableId::LocalScope, self.scopes.len() as u32);
        info.set_rows(TableId::LocalVariable, self.variables.len() as u32);
        info.set_rows(TableId::LocalConstant, self.constants.len() as u32);
        info.set_rows(TableId::ImportScope, self.import_scopes.len() as u32);
        info.set_rows(TableId::StateMachineMethod, self.state_machines.len() as u32);
        info.set_rows(
            TableId::CustomDebugInformation,
            self.custom_debug_info.len() as u32,
        );
        // MethodDebugInformation rows are indexed by MethodDef rows.
        if info.rows(TableId::MethodDef) < self.methods.len() as u32 {
            info.set_rows(TableId::MethodDef, self.methods.len() as u32);
        }
        let info: TableInfoRef = Arc::new(info);

        let valid = info.present_debug_tables();
        let mut tables = Vec::new();
        write_tables_header(&info, valid, SORTED_DEBUG_TABLES & valid, &mut tables);
        append_table(&mut tables, &self.documents, &info)?;
        append_table(&mut tables, &self.methods, &info)?;
        append_table(&mut tables, &self.scopes, &info)?;
        append_table(&mut tables, &self.variables, &info)?;
        append_table(&mut tables, &self.constants, &info)?;
        append_table(&mut tables, &self.import_scopes, &info)?;
        append_table(&mut tables, &self.state_machines, &info)?;
        append_table(&mut tables, &self.custom_debug_info, &info)?;

        let type_system_rows: Vec<(TableId, u32)> = TableId::iter()
            .filter(|table| !table.is_debug_table() && info.rows(*table) > 0)
            .map(|table| (table, info.rows(table)))
            .collect();

        let pdb_stream = PdbStream {
            id: [0; PDB_ID_SIZE],
            entry_point: self.entry_point,
            referenced_type_system_tables: info.present_type_system_tables(),
            type_system_rows,
        };
        let mut pdb = Vec::new();
        pdb_stream.write(&mut pdb);

        let mut bytes = write_metadata(&[
            ("#Pdb", &pdb),
            ("#~", &tables),
            ("#Strings", &strings),
            ("#US", &[0]),
            ("#GUID", &guids),
            ("#Blob", &blobs),
        ]);

        let id_offset = pdb_id_offset(&bytes)?;
        let id = compute_pdb_id(&bytes, mode);
        bytes[id_offset..id_offset + PDB_ID_SIZE].copy_from_slice(&id);

        log::debug!(
            "Portable PDB: {} documents, {} scopes, {} locals, {} custom debug rows, {} bytes",
            self.documents.len(),
            self.scopes.len(),
            self.variables.len(),
            self.custom_debug_info.len(),
            bytes.len()
        );

        Ok(PortablePdb { bytes, id })
    }
}

fn next_rid(len: usize) -> Result<u32> {
    u32::try_from(len + 1).map_err(|_| malformed_error!("Table row count overflow"))
}

fn append_table<T: TableRow>(out: &mut Vec<u8>, rows: &[T], info: &TableInfoRef) -> Result<()> {
    out.extend_from_slice(&write_table(rows, info)?);
    Ok(())
}

/// Offset of the PDB id within a Portable PDB image.
///
/// # Errors
/// Returns an error if `bytes` is not a metadata image with a `#Pdb` stream.
pub fn pdb_id_offset(bytes: &[u8]) -> Result<usize> {
    let root = Root::read(bytes)?;
    let header = root
        .stream_headers
        .iter()
        .find(|h| h.name == "#Pdb")
        .ok_or_else(|| malformed_error!("Missing stream - #Pdb"))?;
    Ok(header.offset as usize)
}

/// Derives the PDB id from an image whose id is zeroed.
///
/// The first 16 bytes of the SHA-256 become the GUID, with the RFC 4122 version 4 and
/// variant bits set, the next four the stamp, with its high bit set.
#[must_use]
pub fn compute_pdb_id(bytes: &[u8], mode: PdbIdMode) -> [u8; PDB_ID_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    if let PdbIdMode::Timestamped(nanos) = mode {
        hasher.update(nanos.to_le_bytes());
    }
    let hash = hasher.finalize();

    let mut id = [0u8; PDB_ID_SIZE];
    id.copy_from_slice(&hash[..PDB_ID_SIZE]);
    id[7] = (id[7] & 0x0F) | 0x40;
    id[8] = (id[8] & 0x3F) | 0x80;
    id[19] |= 0x80;
    id
}

/// Encodes a document name blob.
///
/// ```text
/// Separator (byte, 0 for none)  { Part (compressed #Blob offset of the UTF-8 part) }*
/// ```
///
/// The separator is whichever of `/` and `\` occurs more often, `/` on a tie.
pub fn encode_document_name(name: &str, blobs: &mut BlobHeapBuilder) -> Vec<u8> {
    let forward = name.matches('/').count();
    let backward = name.matches('\\').count();

    let mut blob = Vec::new();
    if forward == 0 && backward == 0 {
        blob.push(0);
        write_compressed_uint(blobs.add(name.as_bytes()), &mut blob);
        return blob;
    }

    let separator = if forward >= backward { '/' } else { '\\' };
    blob.push(separator as u8);
    for part in name.split(separator) {
        write_compressed_uint(blobs.add(part.as_bytes()), &mut blob);
    }
    blob
}

/// Decodes a document name blob. `part` resolves a `#Blob` offset.
///
/// # Errors
/// Returns an error if the blob or one of its parts is malformed.
pub fn decode_document_name<'a>(
    blob: &[u8],
    part: &dyn Fn(u32) -> Result<&'a [u8]>,
) -> Result<String> {
    let mut parser = Parser::new(blob);
    let separator = parser.read_le::<u8>()?;

    let mut name = String::new();
    let mut first = true;
    while parser.has_more_data() {
        if !first && separator != 0 {
            name.push(char::from(separator));
        }
        first = false;

        let bytes = part(parser.read_compressed_uint()?)?;
        name.push_str(&String::from_utf8_lossy(bytes));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        documents::{DocumentLanguage, HashAlgorithm},
        streams::Blob,
    };

    #[test]
    fn document_name_round_trip() {
        let mut blobs = BlobHeapBuilder::new();
        let unix = encode_document_name("/src/app/Program.cs", &mut blobs);
        let windows = encode_document_name(r"C:\src\app\Program.cs", &mut blobs);
        let bare = encode_document_name("Program.cs", &mut blobs);
        assert_eq!(unix[0], b'/');
        assert_eq!(unix[1], 0, "leading separator yields an empty first part");
        assert_eq!(windows[0], b'\\');
        assert_eq!(bare[0], 0);

        let heap = blobs.finish();
        let heap = Blob::from(&heap).unwrap();
        let part = |index: u32| heap.get(index as usize);
        assert_eq!(
            decode_document_name(&unix, &part).unwrap(),
            "/src/app/Program.cs"
        );
        assert_eq!(
            decode_document_name(&windows, &part).unwrap(),
            r"C:\src\app\Program.cs"
        );
        assert_eq!(decode_document_name(&bare, &part).unwrap(), "Program.cs");
    }

    #[test]
    fn shared_name_parts_are_deduplicated() {
        let mut blobs = BlobHeapBuilder::new();
        let a = encode_document_name("/src/a.cs", &mut blobs);
        let b = encode_document_name("/src/b.cs", &mut blobs);
        assert_eq!(a[2], b[2]);
    }

    #[test]
    fn deterministic_id_is_stable_and_marked() {
        let build = || {
            let mut builder = PortablePdbBuilder::new(&[(TableId::MethodDef, 2)]);
            let checksum = DocumentChecksum {
                algorithm: HashAlgorithm::Sha256.guid(),
                digest: vec![1; 32],
            };
            let row = builder
                .add_document("/src/a.cs", DocumentLanguage::CSharp.guid(), Some(&checksum))
                .unwrap();
            builder
                .set_method_debug_info(Token::method_def(1), row, &[0, 0, 0, 1, 1])
                .unwrap();
            builder.finish(PdbIdMode::Deterministic).unwrap()
        };

        let first = build();
        let second = build();
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.id[7] & 0xF0, 0x40);
        assert_eq!(first.id[19] & 0x80, 0x80);

        let offset = pdb_id_offset(&first.bytes).unwrap();
        assert_eq!(&first.bytes[offset..offset + PDB_ID_SIZE], &first.id);

        let mut zeroed = first.bytes.clone();
        zeroed[offset..offset + PDB_ID_SIZE].fill(0);
        assert_eq!(compute_pdb_id(&zeroed, PdbIdMode::Deterministic), first.id);
    }

    #[test]
    fn timestamped_ids_differ() {
        let a = PortablePdbBuilder::new(&[])
            .finish(PdbIdMode::Timestamped(1))
            .unwrap();
        let b = PortablePdbBuilder::new(&[])
            .finish(PdbIdMode::Timestamped(2))
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.bytes.len(), b.bytes.len());
    }

    #[test]
    fn scopes_must_be_added_in_table_order() {
        let mut builder = PortablePdbBuilder::new(&[(TableId::MethodDef, 3)]);
        builder.add_local_scope(Token::method_def(2), 0, 0, 10).unwrap();
        builder.add_local_scope(Token::method_def(2), 0, 2, 4).unwrap();
        assert!(builder.add_local_scope(Token::method_def(1), 0, 0, 10).is_err());
    }

    #[test]
    fn import_scope_parent_must_precede() {
        let mut builder = PortablePdbBuilder::new(&[]);
        assert_eq!(builder.add_import_scope(0, &[]).unwrap(), 1);
        assert_eq!(builder.add_import_scope(1, &[]).unwrap(), 2);
        assert!(builder.add_import_scope(3, &[]).is_err());
    }
}
