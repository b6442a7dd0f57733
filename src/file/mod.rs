//! Binary data access for symbol streams.
//!
//! This module holds the byte-level plumbing the rest of the crate builds on:
//!
//! - [`crate::file::io`] - Bounds-checked little-endian reads and writes at an offset
//! - [`crate::file::parser::Parser`] - Cursor over a byte slice with ECMA-335 compressed integer support
//! - [`crate::file::output::Output`] - Memory-mapped, atomically committed symbol file output
//!
//! Portable PDB and custom debug information are little-endian throughout, so unlike a PE
//! loader there is no big-endian path here.

pub mod io;
pub mod output;
pub mod parser;

pub use output::Output;
pub use parser::Parser;
