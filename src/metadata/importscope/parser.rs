//! Imports blob parser.
//!
//! The blob is a sequence of declarations, each a compressed kind followed by its operands.
//! Names are `#Blob` offsets to UTF-8 text, assembly references are bare `AssemblyRef`
//! rows and types are compressed `TypeDefOrRefOrSpec` tokens.

use crate::{
    file::parser::Parser,
    metadata::{
        importscope::types::{ImportDeclaration, ImportKind, ImportsInfo},
        streams::Blob,
        tables::TableId,
        token::Token,
    },
    Result,
};

/// Iterator over the declarations of one imports blob.
///
/// Yields an error, then stops, when a declaration cannot be decoded.
pub struct ImportsParser<'a> {
    parser: Parser<'a>,
    blobs: &'a Blob<'a>,
    failed: bool,
}

impl<'a> ImportsParser<'a> {
    /// Creates a parser over `data`, resolving names through `blobs`.
    #[must_use]
    pub fn new(data: &'a [u8], blobs: &'a Blob<'a>) -> Self {
        ImportsParser {
            parser: Parser::new(data),
            blobs,
            failed: false,
        }
    }

    /// Decodes the remaining declarations.
    ///
    /// # Errors
    /// Returns an error for unknown kinds, truncated data, invalid heap offsets or names
    /// that are not UTF-8.
    pub fn parse_imports(&mut self) -> Result<ImportsInfo> {
        let declarations = self.by_ref().collect::<Result<Vec<_>>>()?;
        Ok(ImportsInfo::with_declarations(declarations))
    }

    fn declaration(&mut self) -> Result<ImportDeclaration> {
        let at = self.parser.pos();
        let value = self.parser.read_compressed_uint()?;
        let Some(kind) = ImportKind::from_u32(value) else {
            return Err(malformed_error!(
                "Unknown import kind {} at offset {}",
                value,
                at
            ));
        };

        Ok(match kind {
            ImportKind::ImportNamespace => ImportDeclaration::ImportNamespace {
                namespace: self.name()?,
            },
            ImportKind::ImportAssemblyNamespace => ImportDeclaration::ImportAssemblyNamespace {
                assembly_ref: self.assembly()?,
                namespace: self.name()?,
            },
            ImportKind::ImportType => ImportDeclaration::ImportType {
                type_ref: self.parser.read_compressed_token()?,
            },
            ImportKind::ImportXmlNamespace => ImportDeclaration::ImportXmlNamespace {
                alias: self.name()?,
                namespace: self.name()?,
            },
            ImportKind::ImportAssemblyReferenceAlias => {
                ImportDeclaration::ImportAssemblyReferenceAlias { alias: self.name()? }
            }
            ImportKind::DefineAssemblyAlias => ImportDeclaration::DefineAssemblyAlias {
                alias: self.name()?,
                assembly_ref: self.assembly()?,
            },
            ImportKind::DefineNamespaceAlias => ImportDeclaration::DefineNamespaceAlias {
                alias: self.name()?,
                namespace: self.name()?,
            },
            ImportKind::DefineAssemblyNamespaceAlias => {
                ImportDeclaration::DefineAssemblyNamespaceAlias {
                    alias: self.name()?,
                    assembly_ref: self.assembly()?,
                    namespace: self.name()?,
                }
            }
            ImportKind::DefineTypeAlias => ImportDeclaration::DefineTypeAlias {
                alias: self.name()?,
                type_ref: self.parser.read_compressed_token()?,
            },
        })
    }

    fn name(&mut self) -> Result<String> {
        let offset = self.parser.read_compressed_uint()?;
        let bytes = self.blobs.get(offset as usize)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| malformed_error!("Import name at #Blob offset {} is not UTF-8", offset))
    }

    fn assembly(&mut self) -> Result<Token> {
        let row = self.parser.read_compressed_uint()?;
        if row == 0 {
            return Err(malformed_error!("Import references AssemblyRef row 0"));
        }
        Ok(Token::from_parts(TableId::AssemblyRef, row))
    }
}

impl Iterator for ImportsParser<'_> {
    type Item = Result<ImportDeclaration>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.parser.has_more_data() {
            return None;
        }
        let declaration = self.declaration();
        self.failed = declaration.is_err();
        Some(declaration)
    }
}

/// Parses an imports blob. An empty blob is an empty scope.
///
/// # Errors
/// See [`ImportsParser::parse_imports`].
pub fn parse_imports_blob(data: &[u8], blobs: &Blob) -> Result<ImportsInfo> {
    ImportsParser::new(data, blobs).parse_imports()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{importscope::encode_imports, streams::BlobHeapBuilder};

    fn heap_with(entries: &[&[u8]]) -> (Vec<u8>, Vec<u32>) {
        let mut builder = BlobHeapBuilder::new();
        let offsets = entries.iter().map(|entry| builder.add(entry)).collect();
        (builder.finish(), offsets)
    }

    #[test]
    fn empty_blob_is_empty_scope() {
        let heap = [0x00];
        let blobs = Blob::from(&heap).unwrap();
        assert!(parse_imports_blob(&[], &blobs).unwrap().is_empty());
    }

    #[test]
    fn encoder_output_parses_back() {
        let imports = ImportsInfo::with_declarations(vec![
            ImportDeclaration::namespace("System.Text"),
            ImportDeclaration::ImportAssemblyNamespace {
                assembly_ref: Token::new(0x2300_0002),
                namespace: "System.Linq".into(),
            },
            ImportDeclaration::ImportType {
                type_ref: Token::new(0x1B00_0001),
            },
            ImportDeclaration::DefineNamespaceAlias {
                alias: "IO".into(),
                namespace: "System.IO".into(),
            },
            ImportDeclaration::ImportAssemblyReferenceAlias { alias: "X".into() },
        ]);

        let mut heap = BlobHeapBuilder::new();
        let blob = encode_imports(&imports, &mut heap).unwrap();
        let heap = heap.finish();
        let blobs = Blob::from(&heap).unwrap();

        assert_eq!(parse_imports_blob(&blob, &blobs).unwrap(), imports);
    }

    #[test]
    fn unknown_kind_stops_iteration() {
        let heap = [0x00];
        let blobs = Blob::from(&heap).unwrap();
        let mut parser = ImportsParser::new(&[0x0A, 0x00], &blobs);
        assert!(parser.next().unwrap().is_err());
        assert!(parser.next().is_none());
    }

    #[test]
    fn non_utf8_name_is_rejected() {
        let (heap, offsets) = heap_with(&[&[0xFF, 0xFE]]);
        let blobs = Blob::from(&heap).unwrap();
        let data = [0x01, offsets[0] as u8];
        assert!(parse_imports_blob(&data, &blobs).is_err());
    }

    #[test]
    fn assembly_row_zero_is_rejected() {
        let (heap, offsets) = heap_with(&[b"System"]);
        let blobs = Blob::from(&heap).unwrap();
        let data = [0x02, 0x00, offsets[0] as u8];
        assert!(parse_imports_blob(&data, &blobs).is_err());
    }
}
