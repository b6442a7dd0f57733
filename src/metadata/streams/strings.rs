//! The `#Strings` heap: null-terminated UTF-8 identifiers.
//!
//! In a Portable PDB only local variable and constant names live here; document names and
//! import targets use the blob heap. Offset 0 is always the empty string.

use std::{collections::HashMap, ffi::CStr};

use crate::{Error::OutOfBounds, Result};

/// Read access to a `#Strings` heap.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wraps heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty string.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap is empty"));
        }

        Ok(Strings { data })
    }

    /// Returns the string at byte offset `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an offset past the heap, or
    /// [`crate::Error::Malformed`] for an unterminated or non-UTF-8 string.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        CStr::from_bytes_until_nul(&self.data[index..])
            .ok()
            .and_then(|s| s.to_str().ok())
            .ok_or_else(|| malformed_error!("Invalid string at index - {}", index))
    }
}

/// Builds a `#Strings` heap with deduplication.
#[derive(Debug)]
pub struct StringsHeapBuilder {
    data: Vec<u8>,
    lookup: HashMap<String, u32>,
}

impl Default for StringsHeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringsHeapBuilder {
    /// Creates a heap holding only the empty string.
    #[must_use]
    pub fn new() -> Self {
        StringsHeapBuilder {
            data: vec![0],
            lookup: HashMap::new(),
        }
    }

    /// Adds `value` and returns its offset. Equal strings share one entry; the empty
    /// string is offset 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` contains a null character.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }

        if value.contains('\0') {
            return Err(malformed_error!(
                "Identifier '{}' contains a null character",
                value.escape_debug()
            ));
        }

        if let Some(&index) = self.lookup.get(value) {
            return Ok(index);
        }

        let index = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.lookup.insert(value.to_string(), index);
        Ok(index)
    }

    /// Current heap size in bytes, unpadded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if only the empty string is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 1
    }

    /// Finishes the heap, padded to a multiple of four.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        crate::utils::pad_to(&mut self.data, 4);
        self.data
    }
}
