use std::{collections::HashMap, fmt};

use crate::{
    metadata::{documents::HashAlgorithm, tables::TableId, token::Token},
    pdb::native::NativeWriterProviderRef,
};

/// Which symbol format a compilation produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SymbolFormat {
    /// Portable PDB written next to the image
    #[default]
    Portable,
    /// Portable PDB compressed into the image's debug directory
    Embedded,
    /// Native PDB produced by an external writer
    Native,
}

/// Row counts of the compiled module's type-system tables.
///
/// The `#Pdb` stream records them because the debug tables index into `MethodDef` and
/// coded indices reference other tables; their sizes decide the index widths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeSystemRowCounts {
    rows: Vec<(TableId, u32)>,
}

impl TypeSystemRowCounts {
    /// Creates an empty set of counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the row count of one table.
    #[must_use]
    pub fn with_table(mut self, table: TableId, rows: u32) -> Self {
        match self.rows.iter_mut().find(|(t, _)| *t == table) {
            Some(entry) => entry.1 = rows,
            None => self.rows.push((table, rows)),
        }
        self
    }

    /// Row count of `table`, 0 if unknown.
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows
            .iter()
            .find(|(t, _)| *t == table)
            .map_or(0, |(_, rows)| *rows)
    }

    /// All counts.
    #[must_use]
    pub fn as_slice(&self) -> &[(TableId, u32)] {
        &self.rows
    }
}

/// Configuration of a [`crate::emit::SymbolWriter`].
///
/// ```rust
/// use dotpdb::emit::{EmitOptions, SymbolFormat};
///
/// let options = EmitOptions::default()
///     .with_format(SymbolFormat::Embedded)
///     .with_deterministic(true)
///     .with_pdb_path("Program.pdb");
/// assert!(options.deterministic);
/// ```
#[derive(Clone)]
pub struct EmitOptions {
    /// Output format
    pub format: SymbolFormat,
    /// Derive ids from content instead of the clock
    pub deterministic: bool,
    /// Embed the text of every document that has it
    pub embed_all_sources: bool,
    /// Path recorded in the CodeView debug directory entry
    pub pdb_path: String,
    /// Factory for the native writer, required for [`SymbolFormat::Native`]
    pub native_writer: Option<NativeWriterProviderRef>,
    /// Type-system row counts of the compiled module
    pub type_system_rows: TypeSystemRowCounts,
    /// Checksum algorithm for sources added through the writer
    pub checksum_algorithm: HashAlgorithm,
    /// Names of type and assembly references, for native using strings
    pub token_names: HashMap<Token, String>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            format: SymbolFormat::Portable,
            deterministic: false,
            embed_all_sources: false,
            pdb_path: String::new(),
            native_writer: None,
            type_system_rows: TypeSystemRowCounts::new(),
            checksum_algorithm: HashAlgorithm::Sha256,
            token_names: HashMap::new(),
        }
    }
}

impl fmt::Debug for EmitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitOptions")
            .field("format", &self.format)
            .field("deterministic", &self.deterministic)
            .field("embed_all_sources", &self.embed_all_sources)
            .field("pdb_path", &self.pdb_path)
            .field("native_writer", &self.native_writer.is_some())
            .field("type_system_rows", &self.type_system_rows)
            .field("checksum_algorithm", &self.checksum_algorithm)
            .finish_non_exhaustive()
    }
}

impl EmitOptions {
    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: SymbolFormat) -> Self {
        self.format = format;
        self
    }

    /// Enables deterministic output.
    #[must_use]
    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Enables source embedding.
    #[must_use]
    pub fn with_embed_all_sources(mut self, embed: bool) -> Self {
        self.embed_all_sources = embed;
        self
    }

    /// Sets the symbol file path recorded in the image.
    #[must_use]
    pub fn with_pdb_path(mut self, path: impl Into<String>) -> Self {
        self.pdb_path = path.into();
        self
    }

    /// Installs the native writer factory.
    #[must_use]
    pub fn with_native_writer(mut self, provider: NativeWriterProviderRef) -> Self {
        self.native_writer = Some(provider);
        self
    }

    /// Sets the type-system row counts.
    #[must_use]
    pub fn with_type_system_rows(mut self, rows: TypeSystemRowCounts) -> Self {
        self.type_system_rows = rows;
        self
    }

    /// Sets the checksum algorithm for sources added through the writer.
    #[must_use]
    pub fn with_checksum_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.checksum_algorithm = algorithm;
        self
    }

    /// Names a type or assembly reference for native using strings.
    #[must_use]
    pub fn with_token_name(mut self, token: Token, name: impl Into<String>) -> Self {
        self.token_names.insert(token, name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_counts_replace() {
        let rows = TypeSystemRowCounts::new()
            .with_table(TableId::MethodDef, 3)
            .with_table(TableId::TypeDef, 2)
            .with_table(TableId::MethodDef, 5);
        assert_eq!(rows.rows(TableId::MethodDef), 5);
        assert_eq!(rows.rows(TableId::Field), 0);
        assert_eq!(rows.as_slice().len(), 2);
    }

    #[test]
    fn defaults() {
        let options = EmitOptions::default();
        assert_eq!(options.format, SymbolFormat::Portable);
        assert!(!options.deterministic);
        assert_eq!(options.checksum_algorithm, HashAlgorithm::Sha256);
        assert!(format!("{options:?}").contains("native_writer: false"));
    }
}
