//! Compilation options and metadata references records.
//!
//! Both records are stored as module-level custom debug information so that a build can
//! be reproduced from its PDB. The serialized bytes are a pure function of the record:
//! keys are written in a fixed order and preprocessor symbols are sorted and deduplicated.
//!
//! # Compilation options blob
//!
//! A sequence of `key \0 value \0` UTF-8 pairs. Optional keys are omitted when unset.
//!
//! # Metadata references blob
//!
//! ```text
//! { FileName \0  ExternAliases (comma separated) \0  KindAndEmbedInteropTypes (u8)
//!   TimeStamp (u32)  ImageSize (u32)  MVID (16 bytes) }*
//! ```

use strum::{EnumCount, EnumIter, IntoEnumIterator};
use uguid::Guid;

use crate::{file::parser::Parser, Result};

/// Version of the compilation options format.
pub const COMPILATION_OPTIONS_VERSION: u32 = 2;

macro_rules! option_strings {
    ($name:ident { $($variant:ident => $text:literal),* $(,)? }) => {
        impl $name {
            /// The value written to the options blob.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),*
                }
            }

            /// Parses a value of the options blob.
            #[must_use]
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($name::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

/// Kind of binary produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, EnumIter, EnumCount)]
#[allow(missing_docs)]
pub enum OutputKind {
    ConsoleApplication,
    WindowsApplication,
    #[default]
    DynamicallyLinkedLibrary,
    NetModule,
    WindowsRuntimeMetadata,
    WindowsRuntimeApplication,
}

option_strings!(OutputKind {
    ConsoleApplication => "ConsoleApplication",
    WindowsApplication => "WindowsApplication",
    DynamicallyLinkedLibrary => "DynamicallyLinkedLibrary",
    NetModule => "NetModule",
    WindowsRuntimeMetadata => "WindowsRuntimeMetadata",
    WindowsRuntimeApplication => "WindowsRuntimeApplication",
});

/// Target platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, EnumIter, EnumCount)]
#[allow(missing_docs)]
pub enum Platform {
    #[default]
    AnyCpu,
    AnyCpu32BitPreferred,
    Arm,
    Arm64,
    Itanium,
    X86,
    X64,
}

option_strings!(Platform {
    AnyCpu => "anycpu",
    AnyCpu32BitPreferred => "anycpu32bitpreferred",
    Arm => "arm",
    Arm64 => "arm64",
    Itanium => "itanium",
    X86 => "x86",
    X64 => "x64",
});

/// Optimization level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, EnumIter, EnumCount)]
#[allow(missing_docs)]
pub enum OptimizationLevel {
    #[default]
    Debug,
    DebugPlus,
    Release,
}

option_strings!(OptimizationLevel {
    Debug => "debug",
    DebugPlus => "debug-plus",
    Release => "release",
});

/// Nullable reference types context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, EnumCount)]
#[allow(missing_docs)]
pub enum NullableContext {
    Disable,
    Enable,
    Warnings,
    Annotations,
}

option_strings!(NullableContext {
    Disable => "Disable",
    Enable => "Enable",
    Warnings => "Warnings",
    Annotations => "Annotations",
});

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    /// Assembly identity comparer portability flags
    pub struct PortabilityPolicy: u8 {
        /// Do not unify Silverlight platform assemblies
        const SUPPRESS_SILVERLIGHT_PLATFORM = 0x01;
        /// Do not unify Silverlight library assemblies
        const SUPPRESS_SILVERLIGHT_LIBRARY = 0x02;
    }
}

/// Options a compilation was built with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationOptionsRecord {
    /// Version of the compiler
    pub compiler_version: String,
    /// Source language, `C#` or `Visual Basic`
    pub language: String,
    /// Effective language version
    pub language_version: String,
    /// Arithmetic overflow checks by default
    pub checked: bool,
    /// Nullable context, unset for languages without one
    pub nullable: Option<NullableContext>,
    /// `unsafe` code allowed
    pub unsafe_code: bool,
    /// Optimization level
    pub optimization: OptimizationLevel,
    /// Output kind
    pub output_kind: OutputKind,
    /// Platform
    pub platform: Platform,
    /// Preprocessor symbols
    pub preprocessor_symbols: Vec<String>,
    /// Number of source files
    pub source_file_count: u32,
    /// Portability policy
    pub portability_policy: PortabilityPolicy,
    /// Runtime version of the compiler host
    pub runtime_version: Option<String>,
    /// Default source encoding, if given on the command line
    pub default_encoding: Option<String>,
    /// Fallback source encoding
    pub fallback_encoding: Option<String>,
}

impl Default for CompilationOptionsRecord {
    fn default() -> Self {
        CompilationOptionsRecord {
            compiler_version: String::new(),
            language: "C#".to_string(),
            language_version: String::new(),
            checked: false,
            nullable: None,
            unsafe_code: false,
            optimization: OptimizationLevel::default(),
            output_kind: OutputKind::default(),
            platform: Platform::default(),
            preprocessor_symbols: Vec::new(),
            source_file_count: 0,
            portability_policy: PortabilityPolicy::empty(),
            runtime_version: None,
            default_encoding: None,
            fallback_encoding: None,
        }
    }
}

impl CompilationOptionsRecord {
    /// Sets the compiler version.
    #[must_use]
    pub fn with_compiler_version(mut self, version: impl Into<String>) -> Self {
        self.compiler_version = version.into();
        self
    }

    /// Sets language and language version.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>, version: impl Into<String>) -> Self {
        self.language = language.into();
        self.language_version = version.into();
        self
    }

    /// Sets the checked default.
    #[must_use]
    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Sets the nullable context.
    #[must_use]
    pub fn with_nullable(mut self, nullable: NullableContext) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Allows unsafe code.
    #[must_use]
    pub fn with_unsafe(mut self, unsafe_code: bool) -> Self {
        self.unsafe_code = unsafe_code;
        self
    }

    /// Sets the optimization level.
    #[must_use]
    pub fn with_optimization(mut self, optimization: OptimizationLevel) -> Self {
        self.optimization = optimization;
        self
    }

    /// Sets the output kind.
    #[must_use]
    pub fn with_output_kind(mut self, output_kind: OutputKind) -> Self {
        self.output_kind = output_kind;
        self
    }

    /// Sets the platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Sets the preprocessor symbols.
    #[must_use]
    pub fn with_preprocessor_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preprocessor_symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the number of source files.
    #[must_use]
    pub fn with_source_file_count(mut self, count: u32) -> Self {
        self.source_file_count = count;
        self
    }

    /// Sets the portability policy.
    #[must_use]
    pub fn with_portability_policy(mut self, policy: PortabilityPolicy) -> Self {
        self.portability_policy = policy;
        self
    }

    /// Sets the runtime version.
    #[must_use]
    pub fn with_runtime_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = Some(version.into());
        self
    }

    /// Sets default and fallback source encodings.
    #[must_use]
    pub fn with_encodings(mut self, default: Option<String>, fallback: Option<String>) -> Self {
        self.default_encoding = default;
        self.fallback_encoding = fallback;
        self
    }

    /// Key/value pairs in blob order.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::with_capacity(16);
        let mut push = |key: &str, value: String| pairs.push((key.to_string(), value));

        push("version", COMPILATION_OPTIONS_VERSION.to_string());
        if let Some(encoding) = &self.fallback_encoding {
            push("fallback-encoding", encoding.clone());
        }
        if let Some(encoding) = &self.default_encoding {
            push("default-encoding", encoding.clone());
        }
        if !self.portability_policy.is_empty() {
            push("portability-policy", self.portability_policy.bits().to_string());
        }
        push("compiler-version", self.compiler_version.clone());
        if let Some(runtime) = &self.runtime_version {
            push("runtime-version", runtime.clone());
        }
        push("language", self.language.clone());
        push("source-file-count", self.source_file_count.to_string());
        push("output-kind", self.output_kind.as_str().to_string());
        push("platform", self.platform.as_str().to_string());
        push("optimization", self.optimization.as_str().to_string());
        push("language-version", self.language_version.clone());
        push("checked", self.checked.to_string());
        if let Some(nullable) = self.nullable {
            push("nullable", nullable.as_str().to_string());
        }
        push("unsafe", self.unsafe_code.to_string());

        let mut symbols: Vec<&str> = self
            .preprocessor_symbols
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        symbols.sort_unstable();
        symbols.dedup();
        if !symbols.is_empty() {
            push("define", symbols.join(","));
        }

        pairs
    }

    /// Serializes the `CompilationOptions` blob.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode_option_pairs(&self.to_pairs())
    }
}

/// Writes `key \0 value \0` pairs.
#[must_use]
pub fn encode_option_pairs(pairs: &[(String, String)]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(pairs.len() * 24);
    for (key, value) in pairs {
        blob.extend_from_slice(key.as_bytes());
        blob.push(0);
        blob.extend_from_slice(value.as_bytes());
        blob.push(0);
    }
    blob
}

/// Reads `key \0 value \0` pairs.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a key has no value.
pub fn parse_compilation_options(blob: &[u8]) -> Result<Vec<(String, String)>> {
    let mut parser = Parser::new(blob);
    let mut pairs = Vec::new();
    while parser.has_more_data() {
        let key = parser.read_string_utf8()?;
        if !parser.has_more_data() {
            return Err(malformed_error!("Compilation option '{}' has no value", key));
        }
        let value = parser.read_string_utf8()?;
        pairs.push((key, value));
    }
    Ok(pairs)
}

/// Enumerates every combination of the enumerable options on top of a base record.
///
/// The iterator is finite and restartable: cloning it, or calling
/// [`OptionCombinations::restart`], yields the same sequence again.
#[derive(Clone, Debug)]
pub struct OptionCombinations {
    base: CompilationOptionsRecord,
    index: usize,
}

const BOOL_COUNT: usize = 2;
const NULLABLE_COUNT: usize = NullableContext::COUNT + 1;

impl OptionCombinations {
    /// Total number of combinations.
    #[must_use]
    pub fn total() -> usize {
        OptimizationLevel::COUNT
            * Platform::COUNT
            * OutputKind::COUNT
            * NULLABLE_COUNT
            * BOOL_COUNT
            * BOOL_COUNT
    }

    /// Starts over.
    pub fn restart(&mut self) {
        self.index = 0;
    }

    fn combination(&self, index: usize) -> Option<CompilationOptionsRecord> {
        let mut rest = index;
        let mut digit = |radix: usize| {
            let value = rest % radix;
            rest /= radix;
            value
        };

        let optimization = OptimizationLevel::iter().nth(digit(OptimizationLevel::COUNT))?;
        let platform = Platform::iter().nth(digit(Platform::COUNT))?;
        let output_kind = OutputKind::iter().nth(digit(OutputKind::COUNT))?;
        let nullable = match digit(NULLABLE_COUNT) {
            0 => None,
            n => Some(NullableContext::iter().nth(n - 1)?),
        };
        let checked = digit(BOOL_COUNT) == 1;
        let unsafe_code = digit(BOOL_COUNT) == 1;

        Some(CompilationOptionsRecord {
            optimization,
            platform,
            output_kind,
            nullable,
            checked,
            unsafe_code,
            ..self.base.clone()
        })
    }
}

impl Iterator for OptionCombinations {
    type Item = CompilationOptionsRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= Self::total() {
            return None;
        }
        let record = self.combination(self.index);
        self.index += 1;
        record
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = Self::total().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for OptionCombinations {}

/// Every combination of optimization, platform, output kind, nullable context, checked and
/// unsafe on top of `base`.
#[must_use]
pub fn option_combinations(base: &CompilationOptionsRecord) -> OptionCombinations {
    OptionCombinations {
        base: base.clone(),
        index: 0,
    }
}

/// Kind of a referenced metadata image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataImageKind {
    /// An assembly manifest module
    Assembly,
    /// A net module
    Module,
}

/// A metadata reference of the compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataReferenceRecord {
    /// File name without directory
    pub file_name: String,
    /// Extern aliases
    pub extern_aliases: Vec<String>,
    /// Image kind
    pub kind: MetadataImageKind,
    /// Embed interop types
    pub embed_interop_types: bool,
    /// COFF header timestamp
    pub timestamp: u32,
    /// `SizeOfImage` of the PE
    pub image_size: u32,
    /// Module version id
    pub mvid: Guid,
}

impl MetadataReferenceRecord {
    /// An assembly reference without aliases.
    #[must_use]
    pub fn assembly(file_name: impl Into<String>, timestamp: u32, image_size: u32, mvid: Guid) -> Self {
        MetadataReferenceRecord {
            file_name: file_name.into(),
            extern_aliases: Vec::new(),
            kind: MetadataImageKind::Assembly,
            embed_interop_types: false,
            timestamp,
            image_size,
            mvid,
        }
    }

    /// Sets the extern aliases.
    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extern_aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Sets embed interop types.
    #[must_use]
    pub fn with_embed_interop_types(mut self, embed: bool) -> Self {
        self.embed_interop_types = embed;
        self
    }

    fn write(&self, blob: &mut Vec<u8>) {
        blob.extend_from_slice(self.file_name.as_bytes());
        blob.push(0);
        blob.extend_from_slice(self.extern_aliases.join(",").as_bytes());
        blob.push(0);

        let mut flags = 0u8;
        if self.kind == MetadataImageKind::Assembly {
            flags |= 0x01;
        }
        if self.embed_interop_types {
            flags |= 0x02;
        }
        blob.push(flags);
        blob.extend_from_slice(&self.timestamp.to_le_bytes());
        blob.extend_from_slice(&self.image_size.to_le_bytes());
        blob.extend_from_slice(&self.mvid.to_bytes());
    }
}

/// Serializes the `CompilationMetadataReferences` blob.
#[must_use]
pub fn encode_metadata_references(references: &[MetadataReferenceRecord]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(references.len() * 48);
    for reference in references {
        reference.write(&mut blob);
    }
    blob
}

/// Parses a `CompilationMetadataReferences` blob.
///
/// # Errors
/// Returns an error for truncated records.
pub fn parse_metadata_references(blob: &[u8]) -> Result<Vec<MetadataReferenceRecord>> {
    let mut parser = Parser::new(blob);
    let mut references = Vec::new();
    while parser.has_more_data() {
        let file_name = parser.read_string_utf8()?;
        let aliases = parser.read_string_utf8()?;
        let flags = parser.read_le::<u8>()?;
        let timestamp = parser.read_le::<u32>()?;
        let image_size = parser.read_le::<u32>()?;
        let mvid = parser.read_guid()?;

        references.push(MetadataReferenceRecord {
            file_name,
            extern_aliases: aliases
                .split(',')
                .filter(|alias| !alias.is_empty())
                .map(str::to_string)
                .collect(),
            kind: if flags & 0x01 != 0 {
                MetadataImageKind::Assembly
            } else {
                MetadataImageKind::Module
            },
            embed_interop_types: flags & 0x02 != 0,
            timestamp,
            image_size,
            mvid,
        });
    }
    Ok(references)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use uguid::guid;

    use super::*;

    fn base() -> CompilationOptionsRecord {
        CompilationOptionsRecord::default()
            .with_compiler_version("4.8.0-3.23524.11")
            .with_language("C#", "12.0")
            .with_source_file_count(3)
            .with_preprocessor_symbols(["TRACE", "DEBUG", "TRACE"])
    }

    #[test]
    fn options_blob_layout() {
        let blob = base().encode();
        let pairs = parse_compilation_options(&blob).unwrap();

        assert_eq!(pairs[0], ("version".to_string(), "2".to_string()));
        assert!(pairs.contains(&("define".to_string(), "DEBUG,TRACE".to_string())));
        assert!(pairs.contains(&("optimization".to_string(), "debug".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "nullable"));
        assert!(blob.starts_with(b"version\x002\x00"));
    }

    #[test]
    fn options_are_deterministic() {
        let a = base().with_preprocessor_symbols(["B", "A"]).encode();
        let b = base().with_preprocessor_symbols(["A", "B", "A"]).encode();
        assert_eq!(a, b);
        assert_eq!(base().encode(), base().encode());
    }

    #[test]
    fn combinations_are_complete_and_restartable() {
        let mut combinations = option_combinations(&base());
        assert_eq!(combinations.len(), OptionCombinations::total());

        let blobs: HashSet<Vec<u8>> = combinations.clone().map(|r| r.encode()).collect();
        assert_eq!(blobs.len(), OptionCombinations::total());

        let first = combinations.next().unwrap();
        combinations.restart();
        assert_eq!(combinations.next().unwrap(), first);
        assert_eq!(first.compiler_version, "4.8.0-3.23524.11");
    }

    #[test]
    fn enum_strings_round_trip() {
        for platform in Platform::iter() {
            assert_eq!(Platform::parse(platform.as_str()), Some(platform));
        }
        for kind in OutputKind::iter() {
            assert_eq!(OutputKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(OptimizationLevel::parse("debug-plus"), Some(OptimizationLevel::DebugPlus));
        assert_eq!(NullableContext::parse("bogus"), None);
    }

    #[test]
    fn missing_value_is_malformed() {
        assert!(parse_compilation_options(b"version\x00").is_err());
    }

    #[test]
    fn metadata_references() {
        let references = vec![
            MetadataReferenceRecord::assembly(
                "System.Runtime.dll",
                0x5E8C_1F2A,
                0x0001_2000,
                guid!("c1b0b6a4-3f59-4e21-9c8f-08e1c3d5a7b2"),
            ),
            MetadataReferenceRecord::assembly("Interop.dll", 1, 2, guid!("00000000-0000-0000-0000-000000000001"))
                .with_aliases(["A", "B"])
                .with_embed_interop_types(true),
        ];

        let blob = encode_metadata_references(&references);
        assert_eq!(&blob[..19], b"System.Runtime.dll\x00");
        assert_eq!(blob[19], 0);
        assert_eq!(blob[20], 0x01);
        assert_eq!(parse_metadata_references(&blob).unwrap(), references);
    }
}
