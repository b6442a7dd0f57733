//! Coded indices used by the Portable PDB debug tables.
//!
//! A coded index packs a table tag into the low bits of a row number so one column can
//! point into several tables (ECMA-335 §II.24.2.6). The debug tables only use one coded
//! index, `HasCustomDebugInformation`, which can point at almost any entity of the module
//! as well as at documents, scopes, locals and import scopes.

use strum::{EnumCount, EnumIter};

use crate::{
    metadata::{tables::TableId, token::Token},
    Result,
};

/// The kinds of coded index that appear in debug table columns.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, EnumIter, EnumCount)]
pub enum CodedIndexType {
    /// `CustomDebugInformation.Parent`
    HasCustomDebugInformation,
}

impl CodedIndexType {
    /// Tables this coded index can reference, in tag order.
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::HasCustomDebugInformation => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity,
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
                TableId::Document,
                TableId::LocalScope,
                TableId::LocalVariable,
                TableId::LocalConstant,
                TableId::ImportScope,
            ],
        }
    }

    /// Number of low bits holding the table tag.
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        let count = self.tables().len() as u32;
        u32::BITS - (count - 1).leading_zeros()
    }

    /// Packs `token` into a coded index value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the token's table cannot be referenced by this
    /// coded index.
    pub fn encode(&self, token: Token) -> Result<u32> {
        let tag = self
            .tables()
            .iter()
            .position(|table| token.is_table(*table))
            .ok_or_else(|| {
                malformed_error!("Token {} cannot be encoded as {:?}", token, self)
            })?;

        Ok((token.row() << self.tag_bits()) | tag as u32)
    }

    /// Unpacks a coded index value into a token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the tag is out of range.
    pub fn decode(&self, value: u32) -> Result<Token> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let table = self.tables().get(tag).ok_or_else(|| {
            malformed_error!("Invalid {:?} tag {} in value {:#x}", self, tag, value)
        })?;

        Ok(Token::from_parts(*table, value >> bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_debug_information_uses_five_tag_bits() {
        assert_eq!(CodedIndexType::HasCustomDebugInformation.tables().len(), 27);
        assert_eq!(CodedIndexType::HasCustomDebugInformation.tag_bits(), 5);
    }

    #[test]
    fn encode_and_decode() {
        let coded = CodedIndexType::HasCustomDebugInformation;
        assert_eq!(coded.encode(Token::method_def(3)).unwrap(), 3 << 5);
        assert_eq!(coded.encode(Token::from_parts(TableId::Module, 1)).unwrap(), (1 << 5) | 7);

        let import_scope = Token::from_parts(TableId::ImportScope, 2);
        let value = coded.encode(import_scope).unwrap();
        assert_eq!(value, (2 << 5) | 26);
        assert_eq!(coded.decode(value).unwrap(), import_scope);
    }

    #[test]
    fn foreign_tables_are_rejected() {
        let coded = CodedIndexType::HasCustomDebugInformation;
        assert!(coded
            .encode(Token::from_parts(TableId::CustomAttribute, 1))
            .is_err());
        assert!(coded.decode(27).is_err());
    }
}
