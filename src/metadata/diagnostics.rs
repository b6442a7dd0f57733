//! Diagnostics reported while emitting debug information.
//!
//! Most problems with debug information are resolved locally (overlong lines are clamped,
//! duplicate paths collapse onto one document). What remains are a handful of conditions
//! the compiler has to surface to the user, each with a stable [`DiagnosticCode`]:
//!
//! | Code | Condition |
//! |------|-----------|
//! | `PDB0001` | A source text has no encoding, so no checksum can be computed |
//! | `PDB0002` | Deterministic output requested but the native writer cannot provide it |
//! | `PDB0003` | Native symbols requested but no native writer is available |
//! | `PDB0004` | The native writer lacks a capability the compilation needs |
//! | `PDB0005` | The native writer failed; its message is kept verbatim |
//! | `PDB0006` | Emission was cancelled |
//!
//! Input-contract diagnostics are attached to the offending source path; writer faults are
//! not attached to any location.
//!
//! The [`Diagnostics`] container uses `boxcar::Vec` so method workers can report without
//! locking.
//!
//! # Examples
//!
//! ```rust
//! use dotpdb::metadata::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
//!
//! let diagnostics = Diagnostics::new();
//! diagnostics.push(
//!     Diagnostic::new(DiagnosticCode::MissingEncoding, "no encoding").with_path("a.cs"),
//! );
//! assert!(diagnostics.has_errors());
//! assert_eq!(diagnostics.iter().next().unwrap().code.as_ref(), "PDB0001");
//! ```

use std::fmt;

use strum::{AsRefStr, EnumIter};

use crate::{metadata::token::Token, Error};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    /// Informational, never fails a compilation
    Info,
    /// Reported, emission continues
    Warning,
    /// Emission fails
    Error,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Info => write!(f, "INFO"),
            DiagnosticSeverity::Warning => write!(f, "WARN"),
            DiagnosticSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// Stable identifiers of the diagnostics this crate reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumIter)]
pub enum DiagnosticCode {
    /// Source text without encoding
    #[strum(serialize = "PDB0001")]
    MissingEncoding,
    /// Native writer cannot produce deterministic output
    #[strum(serialize = "PDB0002")]
    SymWriterNotDeterministic,
    /// No native writer available
    #[strum(serialize = "PDB0003")]
    SymWriterNotFound,
    /// Native writer lacks a required capability
    #[strum(serialize = "PDB0004")]
    SymWriterCapability,
    /// Native writer failure
    #[strum(serialize = "PDB0005")]
    SymWriterFailed,
    /// Emission cancelled
    #[strum(serialize = "PDB0006")]
    Cancelled,
}

impl DiagnosticCode {
    /// Default severity of the code. Every code currently fails the emission.
    #[must_use]
    pub fn severity(self) -> DiagnosticSeverity {
        DiagnosticSeverity::Error
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// A single reported condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Stable identifier
    pub code: DiagnosticCode,
    /// Severity
    pub severity: DiagnosticSeverity,
    /// Human readable description
    pub message: String,
    /// Source path the diagnostic is attached to, if any
    pub path: Option<String>,
    /// Method the diagnostic concerns, if any
    pub token: Option<Token>,
}

impl Diagnostic {
    /// Creates an unattached diagnostic with the code's default severity.
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            message: message.into(),
            path: None,
            token: None,
        }
    }

    /// Attaches the diagnostic to a source path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attaches the diagnostic to a method.
    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{path}: ")?;
        }

        write!(f, "{} {}: {}", self.severity, self.code, self.message)?;

        if let Some(token) = self.token {
            write!(f, " (method: {token})")?;
        }

        Ok(())
    }
}

impl Error {
    /// Maps an emission failure to the diagnostic the compiler reports for it.
    ///
    /// Returns `None` for errors that indicate a bug in the caller (malformed records,
    /// overlapping scopes) rather than a user-facing condition.
    #[must_use]
    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        let diagnostic = match self {
            Error::MissingEncoding { path } => {
                Diagnostic::new(DiagnosticCode::MissingEncoding, self.to_string()).with_path(path)
            }
            Error::SymWriterNotDeterministic { .. } => {
                Diagnostic::new(DiagnosticCode::SymWriterNotDeterministic, self.to_string())
            }
            Error::SymWriterNotFound(_) => {
                Diagnostic::new(DiagnosticCode::SymWriterNotFound, self.to_string())
            }
            Error::SymWriterCapability { .. } => {
                Diagnostic::new(DiagnosticCode::SymWriterCapability, self.to_string())
            }
            Error::SymWriterFailed(_) => {
                Diagnostic::new(DiagnosticCode::SymWriterFailed, self.to_string())
            }
            Error::Cancelled => Diagnostic::new(DiagnosticCode::Cancelled, self.to_string()),
            _ => return None,
        };

        Some(diagnostic)
    }
}

/// Lock-free collection of diagnostics.
#[derive(Debug)]
pub struct Diagnostics {
    entries: boxcar::Vec<Diagnostic>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Adds a diagnostic.
    pub fn push(&self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Adds the diagnostic for `error`, if it maps to one. Returns whether it did.
    pub fn report(&self, error: &Error) -> bool {
        match error.to_diagnostic() {
            Some(diagnostic) => {
                self.push(diagnostic);
                true
            }
            None => false,
        }
    }

    /// Number of collected diagnostics.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Returns `true` if any diagnostic has [`DiagnosticSeverity::Error`].
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.iter().any(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// Clones the collected diagnostics into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Diagnostic> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};
    use strum::IntoEnumIterator;

    #[test]
    fn codes_are_stable() {
        let codes: Vec<_> = DiagnosticCode::iter().map(|c| c.to_string()).collect();
        assert_eq!(
            codes,
            ["PDB0001", "PDB0002", "PDB0003", "PDB0004", "PDB0005", "PDB0006"]
        );
    }

    #[test]
    fn missing_encoding_is_attached_to_path() {
        let error = Error::MissingEncoding {
            path: "Program.cs".to_string(),
        };
        let diagnostic = error.to_diagnostic().unwrap();
        assert_eq!(diagnostic.code, DiagnosticCode::MissingEncoding);
        assert_eq!(diagnostic.path.as_deref(), Some("Program.cs"));
        assert!(diagnostic.to_string().starts_with("Program.cs: ERROR PDB0001"));
    }

    #[test]
    fn writer_failure_keeps_message_and_is_unattached() {
        let error = Error::SymWriterFailed("disk full".to_string());
        let diagnostic = error.to_diagnostic().unwrap();
        assert_eq!(diagnostic.code, DiagnosticCode::SymWriterFailed);
        assert!(diagnostic.message.contains("disk full"));
        assert!(diagnostic.path.is_none());
    }

    #[test]
    fn internal_errors_have_no_diagnostic() {
        assert!(Error::OutOfBounds.to_diagnostic().is_none());
        let diagnostics = Diagnostics::new();
        assert!(!diagnostics.report(&Error::OutOfBounds));
        assert_eq!(diagnostics.count(), 0);
    }

    #[test]
    fn concurrent_push() {
        let diagnostics = Arc::new(Diagnostics::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let diagnostics = Arc::clone(&diagnostics);
                thread::spawn(move || {
                    diagnostics.push(
                        Diagnostic::new(DiagnosticCode::Cancelled, "stop")
                            .with_token(Token::method_def(i + 1)),
                    );
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(diagnostics.count(), 4);
        assert!(diagnostics.has_errors());
    }
}
