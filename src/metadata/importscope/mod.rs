//! Import scopes: the namespaces, types and aliases visible in a lexical scope.
//!
//! Import scopes form a chain from the innermost namespace declaration of a method out
//! to the file level. The Portable PDB stores them in the `ImportScope` table, each row
//! pointing at its parent and carrying an imports blob:
//!
//! ```text
//! Blob   ::= Import*
//! Import ::= kind alias? target-assembly? target-namespace? target-type?
//! ```
//!
//! - **kind**: compressed unsigned integer, 1 to 9 ([`ImportKind`])
//! - **alias**, **target-namespace**: `#Blob` heap index of a UTF-8 string
//! - **target-assembly**: `AssemblyRef` row
//! - **target-type**: `TypeDefOrRefOrSpecEncoded`
//!
//! [`ImportScopeRegistry`] deduplicates scopes so methods with the same imports share one
//! row. The native format has no shared table; there a method repeats its using
//! namespaces or forwards to an earlier method with the same scope (see
//! [`crate::metadata::customdebuginformation::native`]).
//!
//! # Examples
//!
//! ```rust
//! use dotpdb::metadata::importscope::{ImportDeclaration, ImportScopeRegistry, ImportsInfo};
//!
//! let registry = ImportScopeRegistry::new();
//! let file = registry.add(None, ImportsInfo::with_declarations(vec![
//!     ImportDeclaration::namespace("System"),
//! ]))?;
//! let again = registry.add(None, ImportsInfo::with_declarations(vec![
//!     ImportDeclaration::namespace("System"),
//! ]))?;
//! assert_eq!(file, again);
//! # Ok::<(), dotpdb::Error>(())
//! ```

mod encoder;
mod parser;
mod registry;
mod types;

pub use encoder::encode_imports;
pub use parser::{parse_imports_blob, ImportsParser};
pub use registry::{ImportScope, ImportScopeId, ImportScopeRegistry};
pub use types::{ImportDeclaration, ImportKind, ImportsInfo};
