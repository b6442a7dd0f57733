//! Imports blob encoder.

use crate::{
    metadata::{
        importscope::types::{ImportDeclaration, ImportsInfo},
        streams::BlobHeapBuilder,
        tables::TableId,
        token::Token,
    },
    utils::write_compressed_uint,
    Result,
};

/// Encodes the imports blob of an `ImportScope` row. Strings are added to `blobs` and
/// referenced by heap index.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if an assembly reference is not an `AssemblyRef`
/// token or a type is not a `TypeDef`, `TypeRef` or `TypeSpec` token.
pub fn encode_imports(imports: &ImportsInfo, blobs: &mut BlobHeapBuilder) -> Result<Vec<u8>> {
    let mut blob = Vec::with_capacity(imports.len() * 3);

    for declaration in imports {
        write_compressed_uint(declaration.kind() as u32, &mut blob);

        let mut string = |value: &str, blob: &mut Vec<u8>| {
            write_compressed_uint(blobs.add(value.as_bytes()), blob);
        };

        match declaration {
            ImportDeclaration::ImportNamespace { namespace } => string(namespace, &mut blob),
            ImportDeclaration::ImportAssemblyNamespace {
                assembly_ref,
                namespace,
            } => {
                write_assembly_ref(*assembly_ref, &mut blob)?;
                string(namespace, &mut blob);
            }
            ImportDeclaration::ImportType { type_ref } => write_type(*type_ref, &mut blob)?,
            ImportDeclaration::ImportXmlNamespace { alias, namespace }
            | ImportDeclaration::DefineNamespaceAlias { alias, namespace } => {
                string(alias, &mut blob);
                string(namespace, &mut blob);
            }
            ImportDeclaration::ImportAssemblyReferenceAlias { alias } => string(alias, &mut blob),
            ImportDeclaration::DefineAssemblyAlias {
                alias,
                assembly_ref,
            } => {
                string(alias, &mut blob);
                write_assembly_ref(*assembly_ref, &mut blob)?;
            }
            ImportDeclaration::DefineAssemblyNamespaceAlias {
                alias,
                assembly_ref,
                namespace,
            } => {
                string(alias, &mut blob);
                write_assembly_ref(*assembly_ref, &mut blob)?;
                string(namespace, &mut blob);
            }
            ImportDeclaration::DefineTypeAlias { alias, type_ref } => {
                string(alias, &mut blob);
                write_type(*type_ref, &mut blob)?;
            }
        }
    }

    Ok(blob)
}

fn write_assembly_ref(token: Token, blob: &mut Vec<u8>) -> Result<()> {
    if !token.is_table(TableId::AssemblyRef) || token.row() == 0 {
        return Err(malformed_error!("Expected an AssemblyRef token, got {}", token));
    }
    write_compressed_uint(token.row(), blob);
    Ok(())
}

fn write_type(token: Token, blob: &mut Vec<u8>) -> Result<()> {
    let tag = match token.table() {
        t if t == TableId::TypeDef as u8 => 0,
        t if t == TableId::TypeRef as u8 => 1,
        t if t == TableId::TypeSpec as u8 => 2,
        _ => return Err(malformed_error!("Expected a type token, got {}", token)),
    };
    write_compressed_uint((token.row() << 2) | tag, blob);
    Ok(())
}
