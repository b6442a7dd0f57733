//! Custom debug information: compiler specific data attached to methods, documents and
//! the module.
//!
//! In the Portable PDB every value is a row of the `CustomDebugInformation` table, keyed
//! by the parent entity and a kind GUID ([`CustomDebugKind`]). [`serialize`] and
//! [`parse_custom_debug_blob`] convert between [`CustomDebugInfo`] values and the row blobs.
//! [`CustomDebugInfoSet`] keeps the values of one entity in a fixed kind order, so the
//! emitted table does not depend on the order values were produced in.
//!
//! The native format packs a subset of the same information into version 4 records,
//! see [`native`].
//!
//! # Examples
//!
//! ```rust
//! use dotpdb::metadata::customdebuginformation::{
//!     parse_custom_debug_blob, serialize, CustomDebugInfo,
//! };
//!
//! let info = CustomDebugInfo::DefaultNamespace("Contoso.Tools".to_string());
//! let blob = serialize(&info)?;
//! assert_eq!(parse_custom_debug_blob(&blob, info.kind())?, info);
//! # Ok::<(), dotpdb::Error>(())
//! ```

mod encoder;
pub mod native;
mod parser;
mod types;

pub use encoder::serialize;
pub use parser::{parse_custom_debug_blob, CustomDebugParser};
pub use types::{
    AsyncSteppingInfo, CustomDebugInfo, CustomDebugInfoSet, CustomDebugKind, EmbeddedSource,
    EMBEDDED_SOURCE_COMPRESSION_THRESHOLD,
};
