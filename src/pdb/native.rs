//! The native (legacy) symbol writer seam.
//!
//! The native PDB format is produced by an external writer component. The crate never
//! links one directly; instead the compilation supplies a [`NativeWriterProvider`] that
//! creates a [`NativeSymWriter`], and the symbol writer facade replays every method into
//! it in token order:
//!
//! ```text
//! define_document*
//! { open_method  define_sequence_points*  open_scope ... close_scope
//!   set_async_info?  define_custom_metadata?  close_method }*
//! set_entry_point?  set_source_link?  commit
//! ```
//!
//! Writer implementations report failures as [`crate::Error::SymWriterFailed`] (any other
//! error is converted to it by the facade), so the message the writer produced reaches the
//! user verbatim.
//!
//! [`crate::pdb::xml::XmlSymWriter`] is the in-crate implementation; it renders what it is
//! given as XML and is what tests and the dump tooling use.

use std::sync::Arc;

use bitflags::bitflags;
use uguid::Guid;

use crate::{
    metadata::{
        documents::DocumentChecksum,
        localscope::LocalVariableAttributes,
        sequencepoints::{SequencePoint, HIDDEN_LINE},
        token::Token,
    },
    Result,
};

bitflags! {
    /// Optional features of a native writer.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NativeWriterCapabilities: u8 {
        /// Can store a Source Link document
        const SOURCE_LINK = 0x01;
        /// Can store embedded source text
        const EMBEDDED_SOURCE = 0x02;
        /// Can store async stepping information
        const ASYNC_METHODS = 0x04;
    }
}

/// What a native writer reports about itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeWriterInfo {
    /// Version string, quoted in diagnostics
    pub version: String,
    /// Whether the writer can produce byte-identical output for identical input
    pub supports_deterministic: bool,
    /// Optional features
    pub capabilities: NativeWriterCapabilities,
}

/// A native sequence point: hidden points use [`HIDDEN_LINE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeSequencePoint {
    /// IL offset
    pub offset: u32,
    /// Start line
    pub start_line: u32,
    /// Start column
    pub start_column: u16,
    /// End line
    pub end_line: u32,
    /// End column
    pub end_column: u16,
}

impl NativeSequencePoint {
    /// Converts a collected point; hidden points get the hidden line marker.
    #[must_use]
    pub fn from_point(point: &SequencePoint) -> Self {
        match point.span {
            Some(span) => NativeSequencePoint {
                offset: point.il_offset,
                start_line: span.start_line,
                start_column: span.start_column,
                end_line: span.end_line,
                end_column: span.end_column,
            },
            None => NativeSequencePoint {
                offset: point.il_offset,
                start_line: HIDDEN_LINE,
                start_column: 0,
                end_line: HIDDEN_LINE,
                end_column: 0,
            },
        }
    }

    /// Returns `true` for the hidden line marker.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.start_line == HIDDEN_LINE
    }
}

/// Async stepping information as the native format stores it, on `MoveNext`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeAsyncInfo {
    /// Kickoff method
    pub kickoff: Token,
    /// Catch handler offset, if the body has one
    pub catch_handler: Option<u32>,
    /// Yield offsets
    pub yield_offsets: Vec<u32>,
    /// Resume offsets, parallel to `yield_offsets`
    pub resume_offsets: Vec<u32>,
}

/// Identity of a committed native PDB, for the CodeView debug directory entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativePdb {
    /// Symbol stream
    pub bytes: Vec<u8>,
    /// Signature GUID
    pub guid: Guid,
    /// Age
    pub age: u32,
    /// Time stamp
    pub stamp: u32,
}

/// A native symbol writer.
///
/// Calls arrive in the order documented on the module. Document handles returned by
/// [`NativeSymWriter::define_document`] are writer defined.
pub trait NativeSymWriter: Send {
    /// Version and capabilities.
    fn info(&self) -> NativeWriterInfo;

    /// Defines a document and returns the writer's handle for it.
    ///
    /// # Errors
    /// Writer defined.
    fn define_document(
        &mut self,
        name: &str,
        language: Guid,
        checksum: Option<&DocumentChecksum>,
    ) -> Result<u32>;

    /// Starts the debug information of a method.
    ///
    /// # Errors
    /// Writer defined.
    fn open_method(&mut self, method: Token) -> Result<()>;

    /// Ends the current method.
    ///
    /// # Errors
    /// Writer defined.
    fn close_method(&mut self) -> Result<()>;

    /// Adds sequence points of one document to the current method.
    ///
    /// # Errors
    /// Writer defined.
    fn define_sequence_points(&mut self, document: u32, points: &[NativeSequencePoint])
        -> Result<()>;

    /// Opens a scope at `start`.
    ///
    /// # Errors
    /// Writer defined.
    fn open_scope(&mut self, start: u32) -> Result<()>;

    /// Closes the innermost scope; `end` is exclusive.
    ///
    /// # Errors
    /// Writer defined.
    fn close_scope(&mut self, end: u32) -> Result<()>;

    /// Defines a local of the innermost scope.
    ///
    /// # Errors
    /// Writer defined.
    fn define_local_variable(
        &mut self,
        slot: u16,
        name: &str,
        attributes: LocalVariableAttributes,
    ) -> Result<()>;

    /// Defines a constant of the innermost scope.
    ///
    /// # Errors
    /// Writer defined.
    fn define_local_constant(&mut self, name: &str, signature: &[u8]) -> Result<()>;

    /// Adds a using string to the innermost scope.
    ///
    /// # Errors
    /// Writer defined.
    fn using_namespace(&mut self, using: &str) -> Result<()>;

    /// Attaches async stepping information to the current method.
    ///
    /// # Errors
    /// Writer defined.
    fn set_async_info(&mut self, info: &NativeAsyncInfo) -> Result<()>;

    /// Attaches the native custom debug information blob to the current method.
    ///
    /// # Errors
    /// Writer defined.
    fn define_custom_metadata(&mut self, blob: &[u8]) -> Result<()>;

    /// Sets the entry point.
    ///
    /// # Errors
    /// Writer defined.
    fn set_entry_point(&mut self, method: Token) -> Result<()>;

    /// Stores a Source Link document. Only called when the writer reports
    /// [`NativeWriterCapabilities::SOURCE_LINK`].
    ///
    /// # Errors
    /// Writer defined.
    fn set_source_link(&mut self, json: &[u8]) -> Result<()>;

    /// Stores embedded source for a document. Only called when the writer reports
    /// [`NativeWriterCapabilities::EMBEDDED_SOURCE`].
    ///
    /// # Errors
    /// Writer defined.
    fn set_embedded_source(&mut self, document: u32, source: &[u8]) -> Result<()>;

    /// Finishes the PDB. `deterministic_id` is set when the compilation is deterministic
    /// and must then be used as the signature.
    ///
    /// # Errors
    /// Writer defined.
    fn commit(&mut self, deterministic_id: Option<(Guid, u32)>) -> Result<NativePdb>;
}

/// Creates native writers, one per compilation.
pub trait NativeWriterProvider: Send + Sync {
    /// Creates a writer.
    ///
    /// # Errors
    /// Returns [`crate::Error::SymWriterNotFound`] if no writer implementation is available.
    fn create(&self) -> Result<Box<dyn NativeSymWriter>>;
}

impl<F> NativeWriterProvider for F
where
    F: Fn() -> Result<Box<dyn NativeSymWriter>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn NativeSymWriter>> {
        self()
    }
}

/// Shared handle to a provider, as stored in the emit options.
pub type NativeWriterProviderRef = Arc<dyn NativeWriterProvider>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{documents::DocumentId, sequencepoints::LineSpan};

    #[test]
    fn hidden_points_use_marker_line() {
        let hidden = SequencePoint {
            il_offset: 4,
            document: DocumentId::from_raw(1),
            span: None,
        };
        let native = NativeSequencePoint::from_point(&hidden);
        assert!(native.is_hidden());
        assert_eq!(native.start_line, 0xFEEFEE);
        assert_eq!(native.offset, 4);

        let visible = SequencePoint {
            il_offset: 0,
            document: DocumentId::from_raw(1),
            span: Some(LineSpan {
                start_line: 3,
                start_column: 5,
                end_line: 3,
                end_column: 9,
            }),
        };
        let native = NativeSequencePoint::from_point(&visible);
        assert!(!native.is_hidden());
        assert_eq!((native.start_line, native.end_column), (3, 9));
    }

    #[test]
    fn closures_are_providers() {
        let provider = || -> Result<Box<dyn NativeSymWriter>> {
            Err(crate::Error::SymWriterNotFound("none installed".into()))
        };
        assert!(matches!(
            provider.create(),
            Err(crate::Error::SymWriterNotFound(_))
        ));
    }
}
