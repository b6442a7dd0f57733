//! # dotpdb Prelude
//!
//! The types needed to drive a symbol writer from a code generator, plus the reader for
//! inspecting the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotpdb operations
pub use crate::Error;

/// The result type used throughout dotpdb
pub use crate::Result;

/// Cooperative cancellation of method processing
pub use crate::utils::CancellationToken;

// ================================================================================================
// Emission
// ================================================================================================

/// Symbol writer facade and its configuration
pub use crate::emit::{
    EmitOptions, MethodDebugBody, StateMachineRole, SymbolFormat, SymbolOutput, SymbolWriter,
    TypeSystemRowCounts,
};

/// Debug directory data for the PE writer
pub use crate::emit::debugdir::{DebugDirectoryEntry, DebugDirectoryInfo, DebugDirectoryKind};

// ================================================================================================
// Data Model
// ================================================================================================

/// Metadata tokens and table identifiers
pub use crate::metadata::{tables::TableId, token::Token};

/// Source documents
pub use crate::metadata::documents::{
    DocumentId, DocumentLanguage, DocumentRegistry, HashAlgorithm, SourceEncoding, SourceText,
};

/// Sequence points
pub use crate::metadata::sequencepoints::{SequenceMarker, SourceSpan};

/// Locals and constants
pub use crate::metadata::localscope::{LocalConstantDefinition, LocalDefinition};

/// Import scopes
pub use crate::metadata::importscope::{ImportDeclaration, ImportScopeRegistry, ImportsInfo};

/// State machines
pub use crate::metadata::statemachine::{StateMachineDescriptor, StateMachineKind};

/// Edit-and-continue maps
pub use crate::metadata::closures::{LambdaMap, LocalSlotMap};

/// Compilation options and references
pub use crate::metadata::compilation::{CompilationOptionsRecord, MetadataReferenceRecord};

/// Custom debug information values
pub use crate::metadata::customdebuginformation::{CustomDebugInfo, CustomDebugKind};

/// Diagnostics
pub use crate::metadata::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};

// ================================================================================================
// Symbol Formats
// ================================================================================================

/// Portable PDB reader
pub use crate::pdb::reader::PortablePdbReader;

/// Native writer seam
pub use crate::pdb::native::{NativeSymWriter, NativeWriterCapabilities, NativeWriterProvider};

/// XML rendering
pub use crate::pdb::xml::{portable_to_xml, XmlSymWriter};
