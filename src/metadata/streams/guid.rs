//! The `#GUID` heap: a 1-based array of 16-byte GUIDs.
//!
//! Index 0 means "no GUID". Document languages, hash algorithms and custom debug
//! information kinds are stored here.

use std::collections::HashMap;

use crate::{Error::OutOfBounds, Result};

/// Read access to a `#GUID` heap.
pub struct Guid<'a> {
    data: &'a [u8],
}

impl<'a> Guid<'a> {
    /// Wraps heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the size is not a multiple of 16.
    pub fn from(data: &'a [u8]) -> Result<Guid<'a>> {
        if data.len() % 16 != 0 {
            return Err(malformed_error!(
                "Size of #GUID heap ({}) is not a multiple of 16",
                data.len()
            ));
        }

        Ok(Guid { data })
    }

    /// Number of GUIDs in the heap.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len() / 16
    }

    /// Returns the GUID at 1-based `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for index 0 or past the end of the heap.
    pub fn get(&self, index: usize) -> Result<uguid::Guid> {
        if index < 1 || index > self.count() {
            return Err(OutOfBounds);
        }

        let start = (index - 1) * 16;
        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(&self.data[start..start + 16]);
        Ok(uguid::Guid::from_bytes(buffer))
    }
}

/// Builds a `#GUID` heap with deduplication.
#[derive(Debug, Default)]
pub struct GuidHeapBuilder {
    guids: Vec<uguid::Guid>,
    lookup: HashMap<[u8; 16], u32>,
}

impl GuidHeapBuilder {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `guid` and returns its 1-based index.
    pub fn add(&mut self, guid: uguid::Guid) -> u32 {
        let bytes = guid.to_bytes();
        if let Some(&index) = self.lookup.get(&bytes) {
            return index;
        }

        self.guids.push(guid);
        let index = self.guids.len() as u32;
        self.lookup.insert(bytes, index);
        index
    }

    /// Number of GUIDs added.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guids.len()
    }

    /// Returns `true` if no GUID was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guids.is_empty()
    }

    /// Finishes the heap.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.guids.iter().flat_map(|guid| guid.to_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data : [u8; 32] = [
            0x8e, 0x90, 0x37, 0xd4, 0xe6, 0x65, 0x7c, 0x48, 0x97, 0x35, 0x7b, 0xdf, 0xf6, 0x99, 0xbe, 0xa5,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];

        let guids = Guid::from(&data).unwrap();
        assert_eq!(
            guids.get(1).unwrap(),
            uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5")
        );
        assert_eq!(
            guids.get(2).unwrap(),
            uguid::guid!("AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA")
        );
        assert!(guids.get(0).is_err());
        assert!(guids.get(3).is_err());
    }

    #[test]
    fn builder_dedups() {
        let csharp = uguid::guid!("3f5162f8-07c6-11d3-9053-00c04fa302a1");
        let sha256 = uguid::guid!("8829d00f-11b8-4213-878b-770e8597ac16");

        let mut builder = GuidHeapBuilder::new();
        assert_eq!(builder.add(csharp), 1);
        assert_eq!(builder.add(sha256), 2);
        assert_eq!(builder.add(csharp), 1);

        let data = builder.finish();
        let heap = Guid::from(&data).unwrap();
        assert_eq!(heap.get(2).unwrap(), sha256);
    }
}
