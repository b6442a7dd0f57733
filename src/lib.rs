// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/output.rs' maps the output file into memory

//! # dotpdb
//!
//! Debug information emission for .NET compilers. `dotpdb` takes what a code generator
//! knows about each method body (sequence point markers, local scopes, import scopes,
//! state machine and closure bookkeeping) and writes it as a Portable PDB, an embedded
//! Portable PDB, or through an external native PDB writer.
//!
//! ## Features
//!
//! - **Thread-safe collection** - Method bodies are processed on any thread and merged by token
//! - **Deterministic output** - Content-derived PDB ids, sorted tables and stable heaps
//! - **Portable PDB** - Writer and reader for the ECMA-335 debug tables and the `#Pdb` stream
//! - **Native seam** - Replays the same records into a pluggable native writer
//! - **Custom debug information** - Edit-and-continue maps, async stepping, Source Link, compilation options
//! - **XML rendering** - Human-readable dumps for tests and tooling
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dotpdb::prelude::*;
//!
//! let documents = Arc::new(DocumentRegistry::new());
//! let text = SourceText::new("class C { void M() {} }", SourceEncoding::Utf8 { bom: true });
//! let doc = documents.register("/src/C.cs", &text, HashAlgorithm::Sha256)?;
//!
//! let writer = SymbolWriter::new(
//!     EmitOptions::default().with_deterministic(true).with_pdb_path("C.pdb"),
//!     documents,
//!     ImportScopeRegistry::new(),
//! )?;
//! writer.emit_method(
//!     MethodDebugBody::new(Token::method_def(1), 1)
//!         .with_marker(0, SequenceMarker::Visible(SourceSpan::new(doc, 1, 11, 1, 24))),
//! )?;
//!
//! let output = writer.finalize()?;
//! let pdb = PortablePdbReader::read(output.symbol_stream.as_deref().unwrap_or_default())?;
//! assert_eq!(pdb.debug_methods(), vec![Token::method_def(1)]);
//! # Ok::<(), dotpdb::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - The data model: documents, sequence points, scopes, imports, state
//!   machines, closures, custom debug information, and the metadata heaps and tables
//! - [`pdb`] - Symbol formats: Portable PDB writer and reader, native writer seam, XML
//! - [`emit`] - The [`emit::SymbolWriter`] facade and debug directory data
//! - [`file`] - Binary parsing and atomic file output
//! - [`utils`] - Compressed integer helpers and cancellation
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Failures the compiler reports to the user
//! (missing source encodings, native writer problems, cancellation) convert into
//! [`metadata::diagnostics::Diagnostic`] values through [`Error::to_diagnostic`].

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust
/// use dotpdb::prelude::*;
///
/// let token = Token::method_def(1);
/// assert!(token.is_table(TableId::MethodDef));
/// ```
pub mod prelude;

/// Binary parsing and atomic file output.
pub mod file;

/// The debug information data model.
///
/// # Key Components
///
/// - [`metadata::documents`] - Source documents, checksums and embedded text
/// - [`metadata::sequencepoints`] - Marker collection, clamping and blob encoding
/// - [`metadata::localscope`] - Local scope trees built from live ranges
/// - [`metadata::importscope`] - Deduplicated import scopes
/// - [`metadata::statemachine`] - Async and iterator state machine descriptors
/// - [`metadata::closures`] - Lambda, closure and local slot maps
/// - [`metadata::customdebuginformation`] - Portable and native custom debug information
/// - [`metadata::compilation`] - Compilation options and metadata references
/// - [`metadata::streams`] / [`metadata::tables`] - Heaps and debug tables
pub mod metadata;

/// Symbol file formats.
pub mod pdb;

/// Symbol writer facade and debug directory data.
pub mod emit;

/// Shared helpers.
pub mod utils;

/// `dotpdb` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotpdb` Error type
///
/// # Examples
///
/// ```rust
/// use dotpdb::Error;
///
/// let error = Error::MissingEncoding { path: "a.cs".into() };
/// assert!(error.to_diagnostic().is_some());
/// ```
pub use error::Error;

/// Low-level binary parsing.
///
/// ```rust
/// use dotpdb::Parser;
///
/// let mut parser = Parser::new(&[0x80, 0x80]);
/// assert_eq!(parser.read_compressed_uint()?, 0x80);
/// # Ok::<(), dotpdb::Error>(())
/// ```
pub use file::parser::Parser;
