//! Metadata streams of a Portable PDB.
//!
//! A Portable PDB uses the ECMA-335 metadata physical layout. Besides the `#~` table stream
//! it carries the usual heaps and a `#Pdb` stream:
//!
//! - [`crate::metadata::streams::PdbStream`] - PDB id, entry point, type-system row counts
//! - [`crate::metadata::streams::TablesHeader`] - `#~` header
//! - [`crate::metadata::streams::Strings`] / [`crate::metadata::streams::StringsHeapBuilder`] - identifiers
//! - [`crate::metadata::streams::Blob`] / [`crate::metadata::streams::BlobHeapBuilder`] - binary blobs
//! - [`crate::metadata::streams::Guid`] / [`crate::metadata::streams::GuidHeapBuilder`] - GUIDs
//!
//! The readers borrow the stream bytes; the builders deduplicate entries and produce the
//! final, 4-byte aligned heap. `#US` is always empty in a PDB and has no builder.

mod blob;
mod guid;
mod pdb;
mod streamheader;
mod strings;
mod tablesheader;

pub use blob::{Blob, BlobHeapBuilder};
pub use guid::{Guid, GuidHeapBuilder};
pub use pdb::{PdbStream, PDB_ID_SIZE};
pub use streamheader::{StreamHeader, PDB_STREAM_NAMES};
pub use strings::{Strings, StringsHeapBuilder};
pub use tablesheader::{write_tables_header, TablesHeader};
