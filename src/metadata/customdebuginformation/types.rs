//! Custom debug information kinds and values.

use std::io::{Read, Write};

use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use uguid::{guid, Guid};

use crate::{
    metadata::{
        closures::{LambdaMap, LocalSlotMap},
        compilation::MetadataReferenceRecord,
        localscope::HoistedLocalScope,
        statemachine::{AwaitPoint, StateSlot},
        token::Token,
    },
    Result,
};

/// Texts of at least this many bytes are deflated when embedded.
pub const EMBEDDED_SOURCE_COMPRESSION_THRESHOLD: usize = 200;

/// Kind GUID of a `CustomDebugInformation` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum CustomDebugKind {
    EncLocalSlotMap,
    EncLambdaAndClosureMap,
    EncStateMachineStateMap,
    StateMachineHoistedLocalScopes,
    AsyncMethodSteppingInformation,
    DynamicLocalVariables,
    TupleElementNames,
    DefaultNamespace,
    EmbeddedSource,
    SourceLink,
    CompilationOptions,
    CompilationMetadataReferences,
    /// Any other GUID, carried opaquely
    Unknown(Guid),
}

impl CustomDebugKind {
    /// All well-known kinds, in serialization priority order.
    pub const KNOWN: [CustomDebugKind; 12] = [
        CustomDebugKind::StateMachineHoistedLocalScopes,
        CustomDebugKind::DynamicLocalVariables,
        CustomDebugKind::TupleElementNames,
        CustomDebugKind::EncLocalSlotMap,
        CustomDebugKind::EncLambdaAndClosureMap,
        CustomDebugKind::EncStateMachineStateMap,
        CustomDebugKind::AsyncMethodSteppingInformation,
        CustomDebugKind::DefaultNamespace,
        CustomDebugKind::EmbeddedSource,
        CustomDebugKind::SourceLink,
        CustomDebugKind::CompilationOptions,
        CustomDebugKind::CompilationMetadataReferences,
    ];

    /// Maps a GUID to a kind.
    #[must_use]
    pub fn from_guid(guid: Guid) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|kind| kind.guid() == guid)
            .unwrap_or(CustomDebugKind::Unknown(guid))
    }

    /// The kind GUID.
    #[must_use]
    pub fn guid(self) -> Guid {
        match self {
            CustomDebugKind::EncLocalSlotMap => guid!("755f52a8-91c5-45be-b4b8-209571e552bd"),
            CustomDebugKind::EncLambdaAndClosureMap => {
                guid!("a643004c-0240-496f-a783-30d64f4979de")
            }
            CustomDebugKind::EncStateMachineStateMap => {
                guid!("8b78cd68-2ede-420b-980b-e15884b8aaa3")
            }
            CustomDebugKind::StateMachineHoistedLocalScopes => {
                guid!("6da9a61e-f8c7-4874-be62-68bc5630df71")
            }
            CustomDebugKind::AsyncMethodSteppingInformation => {
                guid!("54fd2ac5-e925-401a-9c2a-f94f171072f8")
            }
            CustomDebugKind::DynamicLocalVariables => {
                guid!("83c563c4-b4f3-47d5-b824-ba5441477ea8")
            }
            CustomDebugKind::TupleElementNames => guid!("ed9fdf71-8879-4747-8ed3-fe5ede3ce710"),
            CustomDebugKind::DefaultNamespace => guid!("58b2eab6-209f-4e4e-a22c-b2d0f910c782"),
            CustomDebugKind::EmbeddedSource => guid!("0e8a571b-6926-466e-b4ad-8ab04611f5fe"),
            CustomDebugKind::SourceLink => guid!("cc110556-a091-4d38-9fec-25ab9a351a6a"),
            CustomDebugKind::CompilationOptions => guid!("b5feec05-8cd0-4a83-96da-466284bb4bd8"),
            CustomDebugKind::CompilationMetadataReferences => {
                guid!("7e4d4708-096e-4c5c-aeda-cb10ba6a740d")
            }
            CustomDebugKind::Unknown(guid) => guid,
        }
    }

    /// Position in serialization order; unknown kinds sort last.
    #[must_use]
    pub fn priority(self) -> usize {
        Self::KNOWN
            .iter()
            .position(|kind| *kind == self)
            .unwrap_or(Self::KNOWN.len())
    }

    /// Short name used in dumps.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            CustomDebugKind::Unknown(guid) => guid.to_string(),
            other => format!("{other:?}"),
        }
    }
}

/// An embedded source payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedSource {
    /// Size of the decompressed text, 0 if `content` is stored uncompressed
    pub uncompressed_size: u32,
    /// Stored bytes, raw deflate stream when compressed
    pub content: Vec<u8>,
}

impl EmbeddedSource {
    /// Wraps encoded source bytes, compressing them from
    /// [`EMBEDDED_SOURCE_COMPRESSION_THRESHOLD`] bytes on.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if compression fails.
    pub fn from_text(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < EMBEDDED_SOURCE_COMPRESSION_THRESHOLD {
            return Ok(EmbeddedSource {
                uncompressed_size: 0,
                content: bytes.to_vec(),
            });
        }

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes)?;
        Ok(EmbeddedSource {
            uncompressed_size: u32::try_from(bytes.len())
                .map_err(|_| malformed_error!("Embedded source exceeds 4 GiB"))?,
            content: encoder.finish()?,
        })
    }

    /// Returns the original bytes.
    ///
    /// # Errors
    /// Returns an error if the deflate stream is damaged or its size does not match.
    pub fn decompressed(&self) -> Result<Vec<u8>> {
        if self.uncompressed_size == 0 {
            return Ok(self.content.clone());
        }

        let mut decoder = DeflateDecoder::new(self.content.as_slice());
        let mut decompressed = Vec::with_capacity(self.uncompressed_size as usize);
        decoder.read_to_end(&mut decompressed)?;
        if decompressed.len() != self.uncompressed_size as usize {
            return Err(malformed_error!(
                "Embedded source decompressed to {} bytes, expected {}",
                decompressed.len(),
                self.uncompressed_size
            ));
        }
        Ok(decompressed)
    }
}

/// Async stepping information of a kickoff method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncSteppingInfo {
    /// Catch handler offset in `MoveNext`
    pub catch_handler: Option<u32>,
    /// Await points
    pub await_points: Vec<AwaitPoint>,
    /// `MoveNext` method
    pub move_next: Token,
}

/// A decoded custom debug information value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CustomDebugInfo {
    EncLocalSlotMap(LocalSlotMap),
    EncLambdaAndClosureMap(LambdaMap),
    EncStateMachineStateMap(Vec<StateSlot>),
    StateMachineHoistedLocalScopes(Vec<HoistedLocalScope>),
    AsyncMethodSteppingInformation(AsyncSteppingInfo),
    /// Recognized, not interpreted
    DynamicLocalVariables(Vec<u8>),
    /// Recognized, not interpreted
    TupleElementNames(Vec<u8>),
    DefaultNamespace(String),
    EmbeddedSource(EmbeddedSource),
    /// Source Link JSON document
    SourceLink(String),
    /// Key/value pairs
    CompilationOptions(Vec<(String, String)>),
    CompilationMetadataReferences(Vec<MetadataReferenceRecord>),
    Unknown {
        kind: CustomDebugKind,
        data: Vec<u8>,
    },
}

impl CustomDebugInfo {
    /// Kind of the value.
    #[must_use]
    pub fn kind(&self) -> CustomDebugKind {
        match self {
            CustomDebugInfo::EncLocalSlotMap(_) => CustomDebugKind::EncLocalSlotMap,
            CustomDebugInfo::EncLambdaAndClosureMap(_) => CustomDebugKind::EncLambdaAndClosureMap,
            CustomDebugInfo::EncStateMachineStateMap(_) => {
                CustomDebugKind::EncStateMachineStateMap
            }
            CustomDebugInfo::StateMachineHoistedLocalScopes(_) => {
                CustomDebugKind::StateMachineHoistedLocalScopes
            }
            CustomDebugInfo::AsyncMethodSteppingInformation(_) => {
                CustomDebugKind::AsyncMethodSteppingInformation
            }
            CustomDebugInfo::DynamicLocalVariables(_) => CustomDebugKind::DynamicLocalVariables,
            CustomDebugInfo::TupleElementNames(_) => CustomDebugKind::TupleElementNames,
            CustomDebugInfo::DefaultNamespace(_) => CustomDebugKind::DefaultNamespace,
            CustomDebugInfo::EmbeddedSource(_) => CustomDebugKind::EmbeddedSource,
            CustomDebugInfo::SourceLink(_) => CustomDebugKind::SourceLink,
            CustomDebugInfo::CompilationOptions(_) => CustomDebugKind::CompilationOptions,
            CustomDebugInfo::CompilationMetadataReferences(_) => {
                CustomDebugKind::CompilationMetadataReferences
            }
            CustomDebugInfo::Unknown { kind, .. } => *kind,
        }
    }

    /// Returns `true` unless the value is carried opaquely.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, CustomDebugInfo::Unknown { .. })
    }
}

/// The custom debug information of one entity, ordered by kind priority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomDebugInfoSet {
    entries: Vec<CustomDebugInfo>,
}

impl CustomDebugInfoSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, replacing an earlier value of the same kind.
    pub fn insert(&mut self, info: CustomDebugInfo) {
        let kind = info.kind();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.kind() == kind) {
            log::debug!("Replacing custom debug information {}", kind.name());
            *existing = info;
            return;
        }

        let position = self
            .entries
            .iter()
            .position(|e| sort_key(e.kind()) > sort_key(kind))
            .unwrap_or(self.entries.len());
        self.entries.insert(position, info);
    }

    /// Values in priority order.
    pub fn iter(&self) -> std::slice::Iter<'_, CustomDebugInfo> {
        self.entries.iter()
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` without values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of the given kind.
    #[must_use]
    pub fn get(&self, kind: CustomDebugKind) -> Option<&CustomDebugInfo> {
        self.entries.iter().find(|e| e.kind() == kind)
    }
}

fn sort_key(kind: CustomDebugKind) -> (usize, [u8; 16]) {
    (kind.priority(), kind.guid().to_bytes())
}

impl<'a> IntoIterator for &'a CustomDebugInfoSet {
    type Item = &'a CustomDebugInfo;
    type IntoIter = std::slice::Iter<'a, CustomDebugInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_debug_kind_from_guid() {
        // Source Link: CC110556-A091-4D38-9FEC-25AB9A351A6A
        let sourcelink = Guid::from_bytes([
            0x56, 0x05, 0x11, 0xCC, 0x91, 0xA0, 0x38, 0x4D, 0x9F, 0xEC, 0x25, 0xAB, 0x9A, 0x35,
            0x1A, 0x6A,
        ]);
        assert_eq!(CustomDebugKind::from_guid(sourcelink), CustomDebugKind::SourceLink);

        for kind in CustomDebugKind::KNOWN {
            assert_eq!(CustomDebugKind::from_guid(kind.guid()), kind);
        }

        let unknown = guid!("01020304-0506-0708-090a-0b0c0d0e0f10");
        assert_eq!(
            CustomDebugKind::from_guid(unknown),
            CustomDebugKind::Unknown(unknown)
        );
    }

    #[test]
    fn test_set_orders_by_priority() {
        let mut set = CustomDebugInfoSet::new();
        set.insert(CustomDebugInfo::Unknown {
            kind: CustomDebugKind::Unknown(guid!("01020304-0506-0708-090a-0b0c0d0e0f10")),
            data: vec![1],
        });
        set.insert(CustomDebugInfo::EncLambdaAndClosureMap(LambdaMap::default()));
        set.insert(CustomDebugInfo::EncLocalSlotMap(LocalSlotMap::default()));
        set.insert(CustomDebugInfo::StateMachineHoistedLocalScopes(vec![]));

        let kinds: Vec<_> = set.iter().map(CustomDebugInfo::kind).collect();
        assert_eq!(kinds[0], CustomDebugKind::StateMachineHoistedLocalScopes);
        assert_eq!(kinds[1], CustomDebugKind::EncLocalSlotMap);
        assert_eq!(kinds[2], CustomDebugKind::EncLambdaAndClosureMap);
        assert!(matches!(kinds[3], CustomDebugKind::Unknown(_)));
    }

    #[test]
    fn test_set_replaces_same_kind() {
        let mut set = CustomDebugInfoSet::new();
        set.insert(CustomDebugInfo::SourceLink("{}".into()));
        set.insert(CustomDebugInfo::SourceLink("{\"documents\":{}}".into()));
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get(CustomDebugKind::SourceLink),
            Some(&CustomDebugInfo::SourceLink("{\"documents\":{}}".into()))
        );
    }

    #[test]
    fn test_embedded_source_threshold() {
        let small = EmbeddedSource::from_text(b"class C {}").unwrap();
        assert_eq!(small.uncompressed_size, 0);
        assert_eq!(small.decompressed().unwrap(), b"class C {}");

        let text = "class C { }\n".repeat(40);
        let large = EmbeddedSource::from_text(text.as_bytes()).unwrap();
        assert_eq!(large.uncompressed_size as usize, text.len());
        assert!(large.content.len() < text.len());
        assert_eq!(large.decompressed().unwrap(), text.as_bytes());
    }
}
