//! Source document registry.
//!
//! Every source a method's sequence points can refer to is registered here once and gets
//! a stable [`DocumentId`]. The registry is shared by all method workers of a compilation:
//!
//! - Registration is idempotent per path. The first registration wins, including its
//!   checksum, even when a later input declares the same path with different content.
//! - Checksums are computed over the text encoded with the text's *own* encoding,
//!   preamble (BOM) included. A text without an encoding cannot be checksummed and fails
//!   with [`crate::Error::MissingEncoding`].
//! - `#line` targets are resolved relative to the directory of the file containing the
//!   directive and carry no checksum unless a `#pragma checksum` supplied one.
//!
//! The registry is an arena (`boxcar::Vec`) plus a `DashMap` from canonical path to id, so
//! insert-if-absent is atomic per path without a registry-wide lock. Arena ids are not the
//! row numbers of the `Document` table: those are assigned deterministically when the
//! symbol file is finalized, see [`crate::emit`].
//!
//! # Examples
//!
//! ```rust
//! use dotpdb::metadata::documents::{DocumentRegistry, HashAlgorithm, SourceEncoding, SourceText};
//!
//! let registry = DocumentRegistry::new();
//! let text = SourceText::new("class C { }", SourceEncoding::Utf8 { bom: true });
//! let first = registry.register("/src/C.cs", &text, HashAlgorithm::Sha256)?;
//!
//! let changed = SourceText::new("class D { }", SourceEncoding::Utf8 { bom: true });
//! let second = registry.register("/src/C.cs", &changed, HashAlgorithm::Sha256)?;
//! assert_eq!(first, second);
//!
//! let line_target = registry.resolve_relative("/src/C.cs", "../gen/C.g.cs");
//! assert_eq!(registry.get(line_target).unwrap().name, "/gen/C.g.cs");
//! # Ok::<(), dotpdb::Error>(())
//! ```

use std::{borrow::Cow, fmt};

use dashmap::{mapref::entry::Entry, DashMap};
use sha2::Digest;
use uguid::{guid, Guid};

use crate::{Error, Result};

/// Identifier of a registered document, 1-based and stable for the compilation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct DocumentId(pub(crate) u32);

impl DocumentId {
    /// Raw 1-based value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Creates an id from its raw 1-based value.
    #[must_use]
    pub fn from_raw(value: u32) -> Self {
        DocumentId(value)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Checksum algorithms a document can be hashed with.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HashAlgorithm {
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
    /// MD5, only seen through `#pragma checksum`
    Md5,
}

impl HashAlgorithm {
    /// GUID stored in `Document.HashAlgorithm`.
    #[must_use]
    pub fn guid(self) -> Guid {
        match self {
            HashAlgorithm::Sha1 => guid!("ff1816ec-aa5e-4d10-87f7-6f4963833460"),
            HashAlgorithm::Sha256 => guid!("8829d00f-11b8-4213-878b-770e8597ac16"),
            HashAlgorithm::Md5 => guid!("406ea660-64cf-4c82-b6f0-42d48172a799"),
        }
    }

    /// Maps a hash algorithm GUID back to the algorithm.
    #[must_use]
    pub fn from_guid(guid: Guid) -> Option<Self> {
        [HashAlgorithm::Sha1, HashAlgorithm::Sha256, HashAlgorithm::Md5]
            .into_iter()
            .find(|algorithm| algorithm.guid() == guid)
    }

    /// Hashes `data`.
    #[must_use]
    pub fn compute(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Md5 => md5::Md5::digest(data).to_vec(),
        }
    }
}

/// Source language of a document.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DocumentLanguage {
    /// C#
    CSharp,
    /// Visual Basic
    VisualBasic,
    /// F#
    FSharp,
    /// Any other language, by GUID
    Other(Guid),
}

impl DocumentLanguage {
    /// GUID stored in `Document.Language`.
    #[must_use]
    pub fn guid(self) -> Guid {
        match self {
            DocumentLanguage::CSharp => guid!("3f5162f8-07c6-11d3-9053-00c04fa302a1"),
            DocumentLanguage::VisualBasic => guid!("3a12d0b8-c26c-11d0-b442-00a0244a1dd2"),
            DocumentLanguage::FSharp => guid!("ab4f38c9-b6e6-43ba-be3b-58080b2ccce3"),
            DocumentLanguage::Other(guid) => guid,
        }
    }

    /// Maps a language GUID to the language.
    #[must_use]
    pub fn from_guid(guid: Guid) -> Self {
        [
            DocumentLanguage::CSharp,
            DocumentLanguage::VisualBasic,
            DocumentLanguage::FSharp,
        ]
        .into_iter()
        .find(|language| language.guid() == guid)
        .unwrap_or(DocumentLanguage::Other(guid))
    }
}

/// The encoding a source file was read with.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum SourceEncoding {
    /// UTF-8, with or without the `EF BB BF` preamble
    Utf8 {
        /// Whether the preamble is written
        bom: bool,
    },
    /// UTF-16 little endian, preamble `FF FE`
    Utf16Le,
    /// UTF-16 big endian, preamble `FE FF`
    Utf16Be,
    /// A non-Unicode code page such as Shift-JIS (932); the original bytes must be kept
    CodePage(u32),
}

impl SourceEncoding {
    /// Preamble written before the encoded text.
    #[must_use]
    pub fn preamble(&self) -> &'static [u8] {
        match self {
            SourceEncoding::Utf8 { bom: true } => &[0xEF, 0xBB, 0xBF],
            SourceEncoding::Utf8 { bom: false } | SourceEncoding::CodePage(_) => &[],
            SourceEncoding::Utf16Le => &[0xFF, 0xFE],
            SourceEncoding::Utf16Be => &[0xFE, 0xFF],
        }
    }
}

/// The contents of a source file together with its encoding.
#[derive(Clone, Debug)]
pub struct SourceText {
    text: Option<String>,
    bytes: Option<Vec<u8>>,
    encoding: Option<SourceEncoding>,
}

impl SourceText {
    /// Text that will be encoded with `encoding` when it is checksummed or embedded.
    ///
    /// Code page encodings cannot be produced from text; use [`SourceText::from_bytes`]
    /// for those.
    pub fn new(text: impl Into<String>, encoding: SourceEncoding) -> Self {
        SourceText {
            text: Some(text.into()),
            bytes: None,
            encoding: Some(encoding),
        }
    }

    /// The file's original bytes. A leading preamble matching `encoding` is accepted and
    /// normalized, so checksums are identical whether or not the caller stripped it.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>, encoding: SourceEncoding) -> Self {
        let preamble = encoding.preamble();
        let payload = if !preamble.is_empty() && bytes.starts_with(preamble) {
            bytes[preamble.len()..].to_vec()
        } else {
            bytes
        };

        let text = match encoding {
            SourceEncoding::Utf8 { .. } => String::from_utf8(payload.clone()).ok(),
            SourceEncoding::Utf16Le => decode_utf16(&payload, u16::from_le_bytes),
            SourceEncoding::Utf16Be => decode_utf16(&payload, u16::from_be_bytes),
            SourceEncoding::CodePage(_) => None,
        };

        SourceText {
            text,
            bytes: Some(payload),
            encoding: Some(encoding),
        }
    }

    /// Text whose encoding is unknown; it cannot be checksummed.
    pub fn without_encoding(text: impl Into<String>) -> Self {
        SourceText {
            text: Some(text.into()),
            bytes: None,
            encoding: None,
        }
    }

    /// The decoded text, when available.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// The declared encoding.
    #[must_use]
    pub fn encoding(&self) -> Option<&SourceEncoding> {
        self.encoding.as_ref()
    }

    /// Preamble plus encoded content, or `None` without an encoding.
    #[must_use]
    pub fn encoded_bytes(&self) -> Option<Cow<'_, [u8]>> {
        let encoding = self.encoding.as_ref()?;
        let preamble = encoding.preamble();

        let payload: Cow<'_, [u8]> = match (&self.bytes, &self.text, encoding) {
            (Some(bytes), _, _) => Cow::Borrowed(bytes),
            (None, Some(text), SourceEncoding::Utf8 { .. }) => Cow::Borrowed(text.as_bytes()),
            (None, Some(text), SourceEncoding::Utf16Le) => Cow::Owned(encode_utf16(text, u16::to_le_bytes)),
            (None, Some(text), SourceEncoding::Utf16Be) => Cow::Owned(encode_utf16(text, u16::to_be_bytes)),
            (None, _, _) => return None,
        };

        if preamble.is_empty() {
            return Some(payload);
        }

        let mut bytes = Vec::with_capacity(preamble.len() + payload.len());
        bytes.extend_from_slice(preamble);
        bytes.extend_from_slice(&payload);
        Some(Cow::Owned(bytes))
    }
}

fn encode_utf16(text: &str, convert: fn(u16) -> [u8; 2]) -> Vec<u8> {
    widestring::U16String::from_str(text)
        .into_vec()
        .into_iter()
        .flat_map(convert)
        .collect()
}

fn decode_utf16(bytes: &[u8], convert: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| convert([pair[0], pair[1]]))
        .collect();
    widestring::U16String::from_vec(units).to_string().ok()
}

/// A document checksum: algorithm GUID plus digest.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct DocumentChecksum {
    /// Hash algorithm GUID
    pub algorithm: Guid,
    /// Digest bytes
    pub digest: Vec<u8>,
}

/// Identity of the generator that synthesized a source.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct GeneratedSource {
    /// Generator identity, e.g. its assembly-qualified type name
    pub generator: String,
    /// Hint name the generator chose
    pub hint_name: String,
}

/// A registered source document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// Registry id
    pub id: DocumentId,
    /// Path as written into the symbol file; empty for location-less synthesized code
    pub name: String,
    /// Source language
    pub language: DocumentLanguage,
    /// Checksum, absent for `#line` targets without `#pragma checksum`
    pub checksum: Option<DocumentChecksum>,
    /// Encoded source (preamble included) when source embedding is enabled
    pub embedded_source: Option<Vec<u8>>,
    /// Generator identity for synthesized sources
    pub generated: Option<GeneratedSource>,
    /// Created by resolving a `#line` or `#pragma checksum` target
    pub directive: bool,
}

/// Thread-safe, first-writer-wins registry of source documents.
#[derive(Debug)]
pub struct DocumentRegistry {
    by_path: DashMap<String, DocumentId>,
    documents: boxcar::Vec<Document>,
    language: DocumentLanguage,
    embed_sources: bool,
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRegistry {
    /// Creates an empty C# registry without source embedding.
    #[must_use]
    pub fn new() -> Self {
        DocumentRegistry {
            by_path: DashMap::new(),
            documents: boxcar::Vec::new(),
            language: DocumentLanguage::CSharp,
            embed_sources: false,
        }
    }

    /// Sets the language recorded for every document.
    #[must_use]
    pub fn with_language(mut self, language: DocumentLanguage) -> Self {
        self.language = language;
        self
    }

    /// Keeps the encoded text of registered sources for embedding into the symbol file.
    #[must_use]
    pub fn with_embedded_sources(mut self, embed: bool) -> Self {
        self.embed_sources = embed;
        self
    }

    /// Registers a compiled source.
    ///
    /// Returns the existing id if `path` was registered before; the first checksum is kept.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingEncoding`] if `text` has no encoding (or a code page
    /// encoding without its original bytes).
    pub fn register(
        &self,
        path: &str,
        text: &SourceText,
        algorithm: HashAlgorithm,
    ) -> Result<DocumentId> {
        self.register_source(path, text, algorithm, None)
    }

    /// Registers a source produced by a source generator, named `<generator>/<hint_name>`.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingEncoding`] if `text` has no encoding.
    pub fn register_generated(
        &self,
        hint_name: &str,
        generator: &str,
        text: &SourceText,
        algorithm: HashAlgorithm,
    ) -> Result<DocumentId> {
        let generated = GeneratedSource {
            generator: generator.to_string(),
            hint_name: hint_name.to_string(),
        };
        self.register_source(
            &format!("{generator}/{hint_name}"),
            text,
            algorithm,
            Some(generated),
        )
    }

    fn register_source(
        &self,
        path: &str,
        text: &SourceText,
        algorithm: HashAlgorithm,
        generated: Option<GeneratedSource>,
    ) -> Result<DocumentId> {
        let encoded = text.encoded_bytes().ok_or_else(|| Error::MissingEncoding {
            path: path.to_string(),
        })?;

        let key = normalize_path(path);
        if let Some(existing) = self.by_path.get(&key) {
            log::debug!("Source path {} registered again, keeping {}", path, *existing);
            return Ok(*existing);
        }

        let checksum = DocumentChecksum {
            algorithm: algorithm.guid(),
            digest: algorithm.compute(&encoded),
        };
        let embedded_source = self.embed_sources.then(|| encoded.into_owned());

        Ok(self.insert_if_absent(key, |id, name| Document {
            id,
            name,
            language: self.language,
            checksum: Some(checksum),
            embedded_source,
            generated,
            directive: false,
        }))
    }

    /// Resolves a `#line` target relative to the directory of `base_path`. The resulting
    /// document has no checksum unless one was registered for that path before.
    pub fn resolve_relative(&self, base_path: &str, relative_path: &str) -> DocumentId {
        let key = normalize_path(&combine_paths(base_path, relative_path));
        if let Some(existing) = self.by_path.get(&key) {
            return *existing;
        }

        self.insert_if_absent(key, |id, name| Document {
            id,
            name,
            language: self.language,
            checksum: None,
            embedded_source: None,
            generated: None,
            directive: true,
        })
    }

    /// Resolves a `#pragma checksum` target with the supplied algorithm GUID and digest.
    pub fn resolve_with_checksum(
        &self,
        base_path: &str,
        relative_path: &str,
        algorithm: Guid,
        digest: Vec<u8>,
    ) -> DocumentId {
        let key = normalize_path(&combine_paths(base_path, relative_path));
        if let Some(existing) = self.by_path.get(&key) {
            return *existing;
        }

        self.insert_if_absent(key, |id, name| Document {
            id,
            name,
            language: self.language,
            checksum: Some(DocumentChecksum { algorithm, digest }),
            embedded_source: None,
            generated: None,
            directive: true,
        })
    }

    /// Looks a document up by id.
    #[must_use]
    pub fn get(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get((id.0 as usize).checked_sub(1)?)
    }

    /// Looks a document id up by path.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<DocumentId> {
        self.by_path.get(&normalize_path(path)).map(|id| *id)
    }

    /// Number of registered documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.count()
    }

    /// Returns `true` if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Documents in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter().map(|(_, document)| document)
    }

    fn insert_if_absent(
        &self,
        key: String,
        make: impl FnOnce(DocumentId, String) -> Document,
    ) -> DocumentId {
        match self.by_path.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let name = entry.key().clone();
                // The entry lock is held across the push, so ids follow insertion order.
                let index = self.documents.push_with(|index| make(DocumentId(index as u32 + 1), name));
                let id = DocumentId(index as u32 + 1);
                entry.insert(id);
                id
            }
        }
    }
}

/// Combines a `#line` path with the directory of the file that contains the directive.
/// Absolute targets are returned unchanged.
#[must_use]
pub fn combine_paths(base_path: &str, relative_path: &str) -> String {
    if is_absolute(relative_path) || base_path.is_empty() {
        return relative_path.to_string();
    }

    let separator = if base_path.contains('\\') { '\\' } else { '/' };
    match base_path.rfind(['/', '\\']) {
        Some(pos) => format!("{}{}{}", &base_path[..pos], separator, relative_path),
        None => relative_path.to_string(),
    }
}

fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Collapses `.` and `..` segments. The separator style of the first separator is kept.
///
/// The root is left as written: a UNC `\\` or `//` prefix, a drive (`C:` with or without a
/// separator) or a single leading separator. `..` never climbs above a root.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let Some(separator) = path.chars().find(|c| *c == '/' || *c == '\\') else {
        return path.to_string();
    };

    let (root, rest) = split_root(path);
    let rooted = root.ends_with(['/', '\\']);
    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    format!("{root}{}", parts.join(&separator.to_string()))
}

fn split_root(path: &str) -> (&str, &str) {
    let bytes = path.as_bytes();
    let is_separator = |b: u8| b == b'/' || b == b'\\';
    let root_len = match bytes {
        [a, b, ..] if is_separator(*a) && is_separator(*b) => 2,
        [d, b':', s, ..] if d.is_ascii_alphabetic() && is_separator(*s) => 3,
        [d, b':', ..] if d.is_ascii_alphabetic() => 2,
        [s, ..] if is_separator(*s) => 1,
        _ => 0,
    };
    path.split_at(root_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn unc_roots_are_kept() {
        assert_eq!(normalize_path(r"\\server\share\a.cs"), r"\\server\share\a.cs");
        assert_eq!(
            normalize_path(r"\\server\share\src\..\b.cs"),
            r"\\server\share\b.cs"
        );
        assert_eq!(normalize_path("//server/share/./a.cs"), "//server/share/a.cs");
        assert_ne!(normalize_path(r"\\server\a.cs"), normalize_path(r"\server\a.cs"));

        let registry = DocumentRegistry::new();
        let text = SourceText::new("class A {}", SourceEncoding::Utf8 { bom: false });
        let unc = registry
            .register(r"\\server\share\a.cs", &text, HashAlgorithm::Sha256)
            .unwrap();
        let local = registry
            .register(r"\server\share\a.cs", &text, HashAlgorithm::Sha256)
            .unwrap();
        assert_ne!(unc, local);
        assert_eq!(registry.get(unc).unwrap().name, r"\\server\share\a.cs");
    }

    #[test]
    fn first_registration_wins() {
        let registry = DocumentRegistry::new();
        let a = SourceText::new("class A {}", SourceEncoding::Utf8 { bom: false });
        let b = SourceText::new("class B {}", SourceEncoding::Utf8 { bom: false });

        let first = registry.register("/src/a.cs", &a, HashAlgorithm::Sha1).unwrap();
        let second = registry.register("/src/a.cs", &b, HashAlgorithm::Sha1).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);

        let document = registry.get(first).unwrap();
        assert_eq!(
            document.checksum.as_ref().unwrap().digest,
            HashAlgorithm::Sha1.compute(b"class A {}")
        );
    }

    #[test]
    fn missing_encoding_fails() {
        let registry = DocumentRegistry::new();
        let text = SourceText::without_encoding("class C {}");
        assert!(matches!(
            registry.register("c.cs", &text, HashAlgorithm::Sha1),
            Err(Error::MissingEncoding { path }) if path == "c.cs"
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn checksum_includes_preamble() {
        let with_bom = SourceText::new("x", SourceEncoding::Utf8 { bom: true });
        assert_eq!(with_bom.encoded_bytes().unwrap().as_ref(), &[0xEF, 0xBB, 0xBF, b'x']);

        let utf16 = SourceText::new("x", SourceEncoding::Utf16Le);
        assert_eq!(utf16.encoded_bytes().unwrap().as_ref(), &[0xFF, 0xFE, b'x', 0]);

        let utf16be = SourceText::new("x", SourceEncoding::Utf16Be);
        assert_eq!(utf16be.encoded_bytes().unwrap().as_ref(), &[0xFE, 0xFF, 0, b'x']);
    }

    #[test]
    fn code_page_keeps_original_bytes() {
        // "あ" in Shift-JIS
        let sjis = SourceText::from_bytes(vec![0x82, 0xA0], SourceEncoding::CodePage(932));
        assert!(sjis.text().is_none());
        assert_eq!(sjis.encoded_bytes().unwrap().as_ref(), &[0x82, 0xA0]);
    }

    #[test]
    fn from_bytes_normalizes_preamble() {
        let stripped = SourceText::from_bytes(b"abc".to_vec(), SourceEncoding::Utf8 { bom: true });
        let with_bom = SourceText::from_bytes(
            vec![0xEF, 0xBB, 0xBF, b'a', b'b', b'c'],
            SourceEncoding::Utf8 { bom: true },
        );
        assert_eq!(stripped.encoded_bytes(), with_bom.encoded_bytes());
        assert_eq!(with_bom.text(), Some("abc"));

        let utf16 = SourceText::from_bytes(vec![0xFF, 0xFE, b'h', 0, b'i', 0], SourceEncoding::Utf16Le);
        assert_eq!(utf16.text(), Some("hi"));
    }

    #[test]
    fn code_page_text_without_bytes_has_no_encoding() {
        let registry = DocumentRegistry::new();
        let text = SourceText::new("abc", SourceEncoding::CodePage(1252));
        assert!(matches!(
            registry.register("w.cs", &text, HashAlgorithm::Sha1),
            Err(Error::MissingEncoding { .. })
        ));
    }

    #[test]
    fn relative_resolution() {
        assert_eq!(combine_paths("/src/a.cs", "b.cs"), "/src/b.cs");
        assert_eq!(combine_paths(r"C:\src\a.cs", r"..\gen\b.cs"), r"C:\src\..\gen\b.cs");
        assert_eq!(normalize_path(r"C:\src\..\gen\b.cs"), r"C:\gen\b.cs");
        assert_eq!(combine_paths("/src/a.cs", "/abs/b.cs"), "/abs/b.cs");
        assert_eq!(normalize_path("/a/./b/../c.cs"), "/a/c.cs");
        assert_eq!(normalize_path("../x/./y.cs"), "../x/y.cs");
        assert_eq!(normalize_path("plain.cs"), "plain.cs");
        assert_eq!(normalize_path(r"C:\..\a.cs"), r"C:\a.cs");

        let registry = DocumentRegistry::new();
        let id = registry.resolve_relative("/src/a.cs", "b.cs");
        assert!(registry.get(id).unwrap().checksum.is_none());
        assert_eq!(registry.resolve_relative("/src/x.cs", "./b.cs"), id);
    }

    #[test]
    fn pragma_checksum() {
        let registry = DocumentRegistry::new();
        let id = registry.resolve_with_checksum(
            "/src/a.cs",
            "a.aspx",
            HashAlgorithm::Md5.guid(),
            vec![1, 2, 3],
        );
        let document = registry.get(id).unwrap();
        assert_eq!(document.name, "/src/a.aspx");
        assert_eq!(
            HashAlgorithm::from_guid(document.checksum.as_ref().unwrap().algorithm),
            Some(HashAlgorithm::Md5)
        );
    }

    #[test]
    fn generated_sources() {
        let registry = DocumentRegistry::new().with_embedded_sources(true);
        let text = SourceText::new("partial class C {}", SourceEncoding::Utf8 { bom: true });
        let id = registry
            .register_generated("C.g.cs", "MyGenerator", &text, HashAlgorithm::Sha256)
            .unwrap();

        let document = registry.get(id).unwrap();
        assert_eq!(document.name, "MyGenerator/C.g.cs");
        assert_eq!(document.generated.as_ref().unwrap().hint_name, "C.g.cs");
        assert_eq!(document.embedded_source.as_ref().unwrap()[..3], [0xEF, 0xBB, 0xBF]);
    }

    #[test]
    fn language_guids() {
        assert_eq!(
            DocumentLanguage::from_guid(DocumentLanguage::VisualBasic.guid()),
            DocumentLanguage::VisualBasic
        );
        let other = guid!("00000000-0000-0000-0000-000000000001");
        assert_eq!(DocumentLanguage::from_guid(other), DocumentLanguage::Other(other));
    }

    #[test]
    fn concurrent_registration_is_first_writer_wins() {
        let registry = Arc::new(DocumentRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let text = SourceText::new(format!("// {i}"), SourceEncoding::Utf8 { bom: false });
                    registry.register("/shared.cs", &text, HashAlgorithm::Sha1).unwrap()
                })
            })
            .collect();

        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(registry.len(), 1);
    }
}
