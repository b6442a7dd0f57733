//! Symbol stream producers and readers.
//!
//! - [`portable`] - Builds Portable PDB images and computes their ids
//! - [`reader`] - Reads Portable PDB images back into entries
//! - [`native`] - The seam to an external native PDB writer
//! - [`xml`] - XML rendering of both, used by tooling and tests

pub mod native;
pub mod portable;
pub mod reader;
pub mod xml;
