//! The `#Blob` heap: length-prefixed byte sequences.
//!
//! Every blob is prefixed with its length as a compressed unsigned integer. Offset 0 is the
//! empty blob. Sequence points, import lists, document names and custom debug information
//! values all live here, and identical blobs are stored once.

use std::collections::HashMap;

use crate::{file::parser::Parser, utils::write_compressed_uint, Error::OutOfBounds, Result};

/// Read access to a `#Blob` heap.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wraps heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty blob.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// Returns the blob at byte offset `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the offset or the blob length exceed the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        parser.read_bytes(len)
    }
}

/// Builds a `#Blob` heap with deduplication.
#[derive(Debug)]
pub struct BlobHeapBuilder {
    data: Vec<u8>,
    lookup: HashMap<Vec<u8>, u32>,
}

impl Default for BlobHeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobHeapBuilder {
    /// Creates a heap holding only the empty blob.
    #[must_use]
    pub fn new() -> Self {
        BlobHeapBuilder {
            data: vec![0],
            lookup: HashMap::new(),
        }
    }

    /// Adds `value` and returns its offset; the empty blob is offset 0.
    pub fn add(&mut self, value: &[u8]) -> u32 {
        if value.is_empty() {
            return 0;
        }

        if let Some(&index) = self.lookup.get(value) {
            return index;
        }

        let index = self.data.len() as u32;
        write_compressed_uint(value.len() as u32, &mut self.data);
        self.data.extend_from_slice(value);
        self.lookup.insert(value.to_vec(), index);
        index
    }

    /// Current heap size in bytes, unpadded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if only the empty blob is present.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_and_read_back() {
        let mut builder = BlobHeapBuilder::new();
        assert_eq!(builder.add(&[]), 0);
        let first = builder.add(&[1, 2, 3]);
        let large = builder.add(&[0xAB; 200]);
        assert_eq!(builder.add(&[1, 2, 3]), first);
        assert_eq!(first, 1);
        assert_eq!(large, 5);

        let data = builder.finish();
        let blobs = Blob::from(&data).unwrap();
        assert_eq!(blobs.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(blobs.get(first as usize).unwrap(), &[1, 2, 3]);
        assert_eq!(blobs.get(large as usize).unwrap().len(), 200);
    }

    #[test]
    fn truncated_blob() {
        let data = [0x00, 0x05, 0x01, 0x02];
        let blobs = Blob::from(&data).unwrap();
        assert!(matches!(blobs.get(1), Err(OutOfBounds)));
    }
}
