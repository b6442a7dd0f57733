//! Import declaration types.
//!
//! See the parent module [`crate::metadata::importscope`] for the blob format.

use crate::metadata::token::Token;

/// The nine import declaration kinds of the `ImportScope` imports blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ImportKind {
    /// `using NS;`
    ImportNamespace = 1,
    /// `using NS;` with the namespace taken from a specific assembly
    ImportAssemblyNamespace = 2,
    /// `using static T;`
    ImportType = 3,
    /// VB `Imports <xmlns:alias="...">`
    ImportXmlNamespace = 4,
    /// Members of an extern alias
    ImportAssemblyReferenceAlias = 5,
    /// `extern alias A;`
    DefineAssemblyAlias = 6,
    /// `using A = NS;`
    DefineNamespaceAlias = 7,
    /// `using A = NS;` with the namespace from a specific assembly
    DefineAssemblyNamespaceAlias = 8,
    /// `using A = T;`
    DefineTypeAlias = 9,
}

impl ImportKind {
    /// Maps the blob value to a kind.
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(ImportKind::ImportNamespace),
            2 => Some(ImportKind::ImportAssemblyNamespace),
            3 => Some(ImportKind::ImportType),
            4 => Some(ImportKind::ImportXmlNamespace),
            5 => Some(ImportKind::ImportAssemblyReferenceAlias),
            6 => Some(ImportKind::DefineAssemblyAlias),
            7 => Some(ImportKind::DefineNamespaceAlias),
            8 => Some(ImportKind::DefineAssemblyNamespaceAlias),
            9 => Some(ImportKind::DefineTypeAlias),
            _ => None,
        }
    }
}

/// One import. Assembly references are `AssemblyRef` tokens, types are `TypeDef`,
/// `TypeRef` or `TypeSpec` tokens of the compiled module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ImportDeclaration {
    ImportNamespace {
        namespace: String,
    },
    ImportAssemblyNamespace {
        assembly_ref: Token,
        namespace: String,
    },
    ImportType {
        type_ref: Token,
    },
    ImportXmlNamespace {
        alias: String,
        namespace: String,
    },
    ImportAssemblyReferenceAlias {
        alias: String,
    },
    DefineAssemblyAlias {
        alias: String,
        assembly_ref: Token,
    },
    DefineNamespaceAlias {
        alias: String,
        namespace: String,
    },
    DefineAssemblyNamespaceAlias {
        alias: String,
        assembly_ref: Token,
        namespace: String,
    },
    DefineTypeAlias {
        alias: String,
        type_ref: Token,
    },
}

impl ImportDeclaration {
    /// Kind of the declaration.
    #[must_use]
    pub fn kind(&self) -> ImportKind {
        match self {
            ImportDeclaration::ImportNamespace { .. } => ImportKind::ImportNamespace,
            ImportDeclaration::ImportAssemblyNamespace { .. } => {
                ImportKind::ImportAssemblyNamespace
            }
            ImportDeclaration::ImportType { .. } => ImportKind::ImportType,
            ImportDeclaration::ImportXmlNamespace { .. } => ImportKind::ImportXmlNamespace,
            ImportDeclaration::ImportAssemblyReferenceAlias { .. } => {
                ImportKind::ImportAssemblyReferenceAlias
            }
            ImportDeclaration::DefineAssemblyAlias { .. } => ImportKind::DefineAssemblyAlias,
            ImportDeclaration::DefineNamespaceAlias { .. } => ImportKind::DefineNamespaceAlias,
            ImportDeclaration::DefineAssemblyNamespaceAlias { .. } => {
                ImportKind::DefineAssemblyNamespaceAlias
            }
            ImportDeclaration::DefineTypeAlias { .. } => ImportKind::DefineTypeAlias,
        }
    }

    /// Shorthand for `using namespace;`.
    #[must_use]
    pub fn namespace(namespace: impl Into<String>) -> Self {
        ImportDeclaration::ImportNamespace {
            namespace: namespace.into(),
        }
    }
}

/// The ordered declarations of one import scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ImportsInfo {
    /// Declarations in source order
    pub declarations: Vec<ImportDeclaration>,
}

impl ImportsInfo {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            declarations: Vec::new(),
        }
    }

    /// Wraps declarations.
    #[must_use]
    pub fn with_declarations(declarations: Vec<ImportDeclaration>) -> Self {
        Self { declarations }
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns `true` without declarations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Iterates the declarations.
    pub fn iter(&self) -> std::slice::Iter<'_, ImportDeclaration> {
        self.declarations.iter()
    }
}

impl FromIterator<ImportDeclaration> for ImportsInfo {
    fn from_iter<T: IntoIterator<Item = ImportDeclaration>>(iter: T) -> Self {
        Self::with_declarations(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ImportsInfo {
    type Item = &'a ImportDeclaration;
    type IntoIter = std::slice::Iter<'a, ImportDeclaration>;

    fn into_iter(self) -> Self::IntoIter {
        self.declarations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_kind_from_u32() {
        assert_eq!(ImportKind::from_u32(1), Some(ImportKind::ImportNamespace));
        assert_eq!(ImportKind::from_u32(9), Some(ImportKind::DefineTypeAlias));
        assert_eq!(ImportKind::from_u32(0), None);
        assert_eq!(ImportKind::from_u32(10), None);
    }

    #[test]
    fn test_declaration_kind_matches_discriminant() {
        let declarations = [
            ImportDeclaration::namespace("System"),
            ImportDeclaration::DefineTypeAlias {
                alias: "L".into(),
                type_ref: Token::new(0x0100_0003),
            },
        ];
        for declaration in &declarations {
            let kind = declaration.kind();
            assert_eq!(ImportKind::from_u32(kind as u32), Some(kind));
        }
    }

    #[test]
    fn test_imports_info_collect() {
        let info: ImportsInfo = ["System", "System.Linq"]
            .into_iter()
            .map(ImportDeclaration::namespace)
            .collect();
        assert_eq!(info.len(), 2);
        assert_eq!(info, ImportsInfo::with_declarations(info.declarations.clone()));
        assert!(ImportsInfo::default().is_empty());
    }
}
