//! Metadata tokens of the compiled module.
//!
//! Debug tables refer to methods, types, local signatures and assembly references of the
//! module being compiled by token. The token is the only link between the two.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::metadata::tables::TableId;

/// A metadata token referencing a row of the compiled module's metadata.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
///
/// The debug information emitter never resolves tokens itself. Methods, types, local
/// signatures and assembly references are handed over by the code generator as tokens
/// and written back out as row numbers or coded indices.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table and a 1-based row number
    #[must_use]
    pub fn from_parts(table: TableId, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// Shorthand for a `MethodDef` token
    #[must_use]
    pub fn method_def(row: u32) -> Self {
        Self::from_parts(TableId::MethodDef, row)
    }

    /// Shorthand for a `TypeDef` token
    #[must_use]
    pub fn type_def(row: u32) -> Self {
        Self::from_parts(TableId::TypeDef, row)
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token points into the given table
    #[must_use]
    pub fn is_table(&self, table: TableId) -> bool {
        self.table() == table as u8
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parts() {
        let token = Token::method_def(5);
        assert_eq!(token.value(), 0x0600_0005);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 5);
        assert!(token.is_table(TableId::MethodDef));
        assert!(!token.is_table(TableId::TypeDef));
    }

    #[test]
    fn test_token_row_is_masked() {
        let token = Token::from_parts(TableId::TypeDef, 0x0100_0001);
        assert_eq!(token.row(), 1);
        assert_eq!(token.table(), 0x02);
    }

    #[test]
    fn test_token_is_null() {
        assert!(Token(0).is_null());
        assert!(!Token::type_def(1).is_null());
    }

    #[test]
    fn test_token_display_and_debug() {
        let token = Token(0x06000001);
        assert_eq!(format!("{}", token), "0x06000001");
        let debug_str = format!("{:?}", token);
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));
    }

    #[test]
    fn test_token_ordering_follows_value() {
        let mut tokens = vec![Token::method_def(3), Token::type_def(9), Token::method_def(1)];
        tokens.sort();
        assert_eq!(
            tokens,
            vec![Token::type_def(9), Token::method_def(1), Token::method_def(3)]
        );
    }
}
