use thiserror::Error;

use crate::metadata::{diagnostics::Diagnostic, token::Token};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into four groups which mirror how a compiler has to react to them:
///
/// ## Input contract violations
/// - [`Error::MissingEncoding`] - A source text without encoding cannot be checksummed
/// - [`Error::Malformed`] - Structurally invalid input records (decreasing offsets, bad ranges)
/// - [`Error::InvalidScope`] - Local scopes that partially overlap
/// - [`Error::InvalidClosure`] - A lambda referencing a closure that was never recorded
///
/// ## Capability mismatches
/// - [`Error::SymWriterNotDeterministic`] - Deterministic output requested from a writer that cannot do it
/// - [`Error::SymWriterCapability`] - The native writer lacks a feature the compilation needs
/// - [`Error::SymWriterNotFound`] - Native format requested but no writer is available
///
/// ## Writer-level faults
/// - [`Error::SymWriterFailed`] - The native writer reported an arbitrary error
/// - [`Error::FileError`] / [`Error::WriteFailed`] - Output stream problems
///
/// ## Aggregated failures
/// - [`Error::EmitFailed`] - One or more diagnostics aborted the emission
///
/// Degenerate-but-legal inputs (overlong lines, duplicate paths) never produce an error.
///
/// # Examples
///
/// ```rust
/// use dotpdb::{Error, metadata::documents::{DocumentRegistry, HashAlgorithm, SourceText}};
///
/// let registry = DocumentRegistry::new();
/// let text = SourceText::without_encoding("class C {}");
/// match registry.register("a.cs", &text, HashAlgorithm::Sha1) {
///     Err(Error::MissingEncoding { path }) => assert_eq!(path, "a.cs"),
///     other => panic!("unexpected {:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be processed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing a blob or stream.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A source text has no encoding, so its checksum cannot be computed.
    #[error("Cannot emit debug information for a source text without encoding - {path}")]
    MissingEncoding {
        /// Path of the offending source
        path: String,
    },

    /// Two local scopes overlap without one containing the other.
    #[error("Local scopes [{first_start:#x}, {first_end:#x}) and [{second_start:#x}, {second_end:#x}) overlap")]
    InvalidScope {
        /// Start of the first scope
        first_start: u32,
        /// End of the first scope
        first_end: u32,
        /// Start of the second scope
        second_start: u32,
        /// End of the second scope
        second_end: u32,
    },

    /// A lambda references a closure ordinal which was never recorded.
    #[error("Lambda at syntax offset {syntax_offset} references unknown closure {ordinal}")]
    InvalidClosure {
        /// Syntax offset of the lambda
        syntax_offset: i32,
        /// The referenced closure ordinal
        ordinal: u32,
    },

    /// A method was emitted twice.
    #[error("Debug information for method {0} was already emitted")]
    DuplicateMethod(Token),

    /// The configured native symbol writer cannot produce deterministic output.
    #[error("The symbol writer version ({version}) does not support deterministic output")]
    SymWriterNotDeterministic {
        /// Version string reported by the writer
        version: String,
    },

    /// The configured native symbol writer lacks a capability required by the compilation.
    #[error("The symbol writer version ({version}) does not support {capability}")]
    SymWriterCapability {
        /// Version string reported by the writer
        version: String,
        /// The unmet capability
        capability: String,
    },

    /// Native symbol format requested but no writer implementation is available.
    #[error("The native symbol writer could not be found: {0}")]
    SymWriterNotFound(String),

    /// The native symbol writer reported an error; the message is kept verbatim.
    #[error("Unexpected error writing debug information -- '{0}'")]
    SymWriterFailed(String),

    /// Writing the symbol file failed.
    #[error("Failed to write symbol output: {message}")]
    WriteFailed {
        /// Description of the failure
        message: String,
    },

    /// The compilation was cancelled between two units of work.
    #[error("Debug information emission was cancelled")]
    Cancelled,

    /// Emission was aborted by one or more diagnostics.
    #[error("Debug information emission failed with {} diagnostic(s)", .0.len())]
    EmitFailed(Vec<Diagnostic>),
}
