//! Debug information model and the Portable PDB metadata format.
//!
//! The modules fall into two layers.
//!
//! The per-method model, produced by the code generator and consumed by the symbol writer:
//!
//! - [`documents`] - Source documents, checksums and embedded sources
//! - [`sequencepoints`] - IL offset to source span mapping
//! - [`localscope`] - Lexical scopes, locals and constants
//! - [`closures`] - Lambda, closure and local slot maps for Edit and Continue
//! - [`statemachine`] - Iterator and async state machine descriptors
//! - [`importscope`] - Namespace imports and their deduplication
//! - [`customdebuginformation`] - Kind GUID keyed blobs and native records
//! - [`compilation`] - Compilation options and metadata references records
//!
//! The Portable PDB container these are serialized into:
//!
//! - [`root`] - Metadata root and stream directory
//! - [`streams`] - `#Pdb`, `#~`, `#Strings`, `#GUID` and `#Blob`
//! - [`tables`] - The eight debug tables
//! - [`token`] - Metadata tokens of the compiled module
//! - [`diagnostics`] - Diagnostics reported to the compiler

pub mod closures;
pub mod compilation;
pub mod customdebuginformation;
pub mod diagnostics;
pub mod documents;
pub mod importscope;
pub mod localscope;
pub mod root;
pub mod sequencepoints;
pub mod statemachine;
pub mod streams;
pub mod tables;
pub mod token;
