//! The symbol writer facade.
//!
//! A compilation creates one [`SymbolWriter`] with its [`EmitOptions`], the shared
//! [`crate::metadata::documents::DocumentRegistry`] and the
//! [`crate::metadata::importscope::ImportScopeRegistry`]. Method bodies arrive as
//! [`MethodDebugBody`] values from any number of code generation threads and are merged by
//! token; [`SymbolWriter::finalize`] then produces the symbol stream in the selected
//! [`SymbolFormat`] together with the debug directory entries the PE writer needs.
//!
//! # Key Components
//!
//! - [`SymbolWriter`] - Collects method records and serializes them
//! - [`EmitOptions`] - Format, determinism, source embedding and native writer selection
//! - [`MethodDebugBody`] / [`MethodDebugRecord`] - Per-method input and processed output
//! - [`SymbolOutput`] - Symbol stream plus [`debugdir::DebugDirectoryInfo`]
//!
//! # Output
//!
//! | Format | Symbol stream | Debug directory |
//! |--------|---------------|-----------------|
//! | [`SymbolFormat::Portable`] | Portable PDB | CodeView, PDB checksum, Reproducible |
//! | [`SymbolFormat::Embedded`] | none | CodeView, PDB checksum, Reproducible, embedded PDB |
//! | [`SymbolFormat::Native`] | from the native writer | CodeView, Reproducible |
//!
//! The Reproducible entry is only written for deterministic compilations.

pub mod debugdir;
mod method;
mod options;
mod writer;

pub use method::{MethodDebugBody, MethodDebugRecord, StateMachineRole};
pub use options::{EmitOptions, SymbolFormat, TypeSystemRowCounts};
pub use writer::{SymbolOutput, SymbolWriter};
