//! Custom debug information records of the native (Windows) PDB format.
//!
//! The native format stores all compiler specific information of a method in a single
//! `MD2` attribute blob:
//!
//! ```text
//! Header  ::= Version (u8 = 4)  Count (u8)  Padding (2 bytes)
//! Record  ::= Version (u8 = 4)  Kind (u8)  Reserved (u8)  AlignmentSize (u8)
//!             Size (i32, including the 8 byte header)  Payload  Padding
//! ```
//!
//! Payloads are padded to a multiple of four bytes; `AlignmentSize` holds the number of
//! padding bytes.
//!
//! Native symbol writers have no shared import table. A method either lists its using
//! namespaces (`UsingInfo` plus one using string per namespace, passed to the writer
//! separately) or forwards to another method with identical imports (`ForwardInfo`).

use widestring::U16CString;

use crate::{
    file::parser::Parser,
    metadata::{
        importscope::{ImportDeclaration, ImportsInfo},
        localscope::HoistedLocalScope,
        token::Token,
    },
    utils::pad_to,
    Result,
};

/// Version byte of the header and every record.
pub const CDI_VERSION: u8 = 4;

const HEADER_SIZE: usize = 4;
const RECORD_HEADER_SIZE: usize = 8;

/// Kind byte of a native record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum NativeRecordKind {
    UsingInfo = 0,
    ForwardInfo = 1,
    ForwardToModuleInfo = 2,
    StateMachineHoistedLocalScopes = 3,
    ForwardIterator = 4,
    DynamicLocals = 5,
    EncLocalSlotMap = 6,
    EncLambdaMap = 7,
}

impl NativeRecordKind {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => NativeRecordKind::UsingInfo,
            1 => NativeRecordKind::ForwardInfo,
            2 => NativeRecordKind::ForwardToModuleInfo,
            3 => NativeRecordKind::StateMachineHoistedLocalScopes,
            4 => NativeRecordKind::ForwardIterator,
            5 => NativeRecordKind::DynamicLocals,
            6 => NativeRecordKind::EncLocalSlotMap,
            7 => NativeRecordKind::EncLambdaMap,
            _ => return None,
        })
    }
}

/// A native custom debug information record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCustomDebugRecord {
    /// Number of using strings per nesting level, innermost first
    UsingInfo(Vec<u16>),
    /// Imports are the ones of this method
    ForwardInfo(Token),
    /// Module-level imports are attached to this method
    ForwardToModuleInfo(Token),
    /// Hoisted local scopes, written end-inclusive
    StateMachineHoistedLocalScopes(Vec<HoistedLocalScope>),
    /// Name of the iterator class whose `MoveNext` holds the debug information
    ForwardIterator(String),
    /// Raw `EncLocalSlotMap` blob
    EncLocalSlotMap(Vec<u8>),
    /// Raw `EncLambdaAndClosureMap` blob
    EncLambdaMap(Vec<u8>),
    /// Any other record, carried opaquely
    Unknown {
        /// Kind byte
        kind: u8,
        /// Payload without padding
        data: Vec<u8>,
    },
}

impl NativeCustomDebugRecord {
    /// Kind byte of the record.
    #[must_use]
    pub fn kind(&self) -> u8 {
        match self {
            NativeCustomDebugRecord::UsingInfo(_) => NativeRecordKind::UsingInfo as u8,
            NativeCustomDebugRecord::ForwardInfo(_) => NativeRecordKind::ForwardInfo as u8,
            NativeCustomDebugRecord::ForwardToModuleInfo(_) => {
                NativeRecordKind::ForwardToModuleInfo as u8
            }
            NativeCustomDebugRecord::StateMachineHoistedLocalScopes(_) => {
                NativeRecordKind::StateMachineHoistedLocalScopes as u8
            }
            NativeCustomDebugRecord::ForwardIterator(_) => NativeRecordKind::ForwardIterator as u8,
            NativeCustomDebugRecord::EncLocalSlotMap(_) => NativeRecordKind::EncLocalSlotMap as u8,
            NativeCustomDebugRecord::EncLambdaMap(_) => NativeRecordKind::EncLambdaMap as u8,
            NativeCustomDebugRecord::Unknown { kind, .. } => *kind,
        }
    }

    fn payload(&self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        match self {
            NativeCustomDebugRecord::UsingInfo(counts) => {
                let count = u16::try_from(counts.len())
                    .map_err(|_| malformed_error!("Too many using groups: {}", counts.len()))?;
                payload.extend_from_slice(&count.to_le_bytes());
                for group in counts {
                    payload.extend_from_slice(&group.to_le_bytes());
                }
            }
            NativeCustomDebugRecord::ForwardInfo(token)
            | NativeCustomDebugRecord::ForwardToModuleInfo(token) => {
                payload.extend_from_slice(&token.value().to_le_bytes());
            }
            NativeCustomDebugRecord::StateMachineHoistedLocalScopes(scopes) => {
                payload.extend_from_slice(&(scopes.len() as u32).to_le_bytes());
                for scope in scopes {
                    let (start, end) = if scope.is_empty() {
                        (0, 0)
                    } else {
                        (scope.start, scope.end - 1)
                    };
                    payload.extend_from_slice(&start.to_le_bytes());
                    payload.extend_from_slice(&end.to_le_bytes());
                }
            }
            NativeCustomDebugRecord::ForwardIterator(name) => {
                let wide = U16CString::from_str(name)
                    .map_err(|_| malformed_error!("Iterator name contains a nul character"))?;
                for unit in wide.as_slice_with_nul() {
                    payload.extend_from_slice(&unit.to_le_bytes());
                }
            }
            NativeCustomDebugRecord::EncLocalSlotMap(data)
            | NativeCustomDebugRecord::EncLambdaMap(data)
            | NativeCustomDebugRecord::Unknown { data, .. } => payload.extend_from_slice(data),
        }
        Ok(payload)
    }
}

/// Encodes records into a native custom debug information blob. No records produce an
/// empty blob.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for more than 255 records or unencodable payloads.
pub fn encode_native_records(records: &[NativeCustomDebugRecord]) -> Result<Vec<u8>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let count = u8::try_from(records.len())
        .map_err(|_| malformed_error!("Too many custom debug records: {}", records.len()))?;
    let mut blob = vec![CDI_VERSION, count, 0, 0];

    for record in records {
        let mut payload = record.payload()?;
        let unpadded = payload.len();
        pad_to(&mut payload, 4);
        let alignment = (payload.len() - unpadded) as u8;
        let size = u32::try_from(RECORD_HEADER_SIZE + payload.len())
            .map_err(|_| malformed_error!("Custom debug record too large"))?;

        blob.extend_from_slice(&[CDI_VERSION, record.kind(), 0, alignment]);
        blob.extend_from_slice(&size.to_le_bytes());
        blob.extend_from_slice(&payload);
    }

    Ok(blob)
}

/// Decodes a native custom debug information blob.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unsupported versions or inconsistent sizes.
pub fn parse_native_records(blob: &[u8]) -> Result<Vec<NativeCustomDebugRecord>> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }

    let mut parser = Parser::new(blob);
    let version = parser.read_le::<u8>()?;
    if version != CDI_VERSION {
        return Err(malformed_error!("Unsupported custom debug info version {}", version));
    }
    let count = parser.read_le::<u8>()?;
    parser.advance_by(HEADER_SIZE - 2)?;

    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let record_version = parser.read_le::<u8>()?;
        let kind = parser.read_le::<u8>()?;
        let _reserved = parser.read_le::<u8>()?;
        let alignment = parser.read_le::<u8>()? as usize;
        let size = parser.read_le::<u32>()? as usize;
        if size < RECORD_HEADER_SIZE || alignment > size - RECORD_HEADER_SIZE {
            return Err(malformed_error!("Invalid custom debug record size {}", size));
        }

        let body = parser.read_bytes(size - RECORD_HEADER_SIZE)?;
        if record_version != CDI_VERSION {
            log::debug!("Skipping custom debug record with version {}", record_version);
            continue;
        }
        let payload = &body[..body.len() - alignment];
        records.push(parse_record(kind, payload)?);
    }

    Ok(records)
}

fn parse_record(kind: u8, payload: &[u8]) -> Result<NativeCustomDebugRecord> {
    let mut parser = Parser::new(payload);
    Ok(match NativeRecordKind::from_u8(kind) {
        Some(NativeRecordKind::UsingInfo) => {
            let count = parser.read_le::<u16>()?;
            let mut counts = Vec::with_capacity(count as usize);
            for _ in 0..count {
                counts.push(parser.read_le::<u16>()?);
            }
            NativeCustomDebugRecord::UsingInfo(counts)
        }
        Some(NativeRecordKind::ForwardInfo) => {
            NativeCustomDebugRecord::ForwardInfo(Token::new(parser.read_le::<u32>()?))
        }
        Some(NativeRecordKind::ForwardToModuleInfo) => {
            NativeCustomDebugRecord::ForwardToModuleInfo(Token::new(parser.read_le::<u32>()?))
        }
        Some(NativeRecordKind::StateMachineHoistedLocalScopes) => {
            let count = parser.read_le::<u32>()?;
            let mut scopes = Vec::new();
            for _ in 0..count {
                let start = parser.read_le::<u32>()?;
                let end = parser.read_le::<u32>()?;
                scopes.push(if start == 0 && end == 0 {
                    HoistedLocalScope::EMPTY
                } else {
                    HoistedLocalScope::new(start, end + 1)
                });
            }
            NativeCustomDebugRecord::StateMachineHoistedLocalScopes(scopes)
        }
        Some(NativeRecordKind::ForwardIterator) => {
            NativeCustomDebugRecord::ForwardIterator(parser.read_string_utf16()?)
        }
        Some(NativeRecordKind::EncLocalSlotMap) => {
            NativeCustomDebugRecord::EncLocalSlotMap(payload.to_vec())
        }
        Some(NativeRecordKind::EncLambdaMap) => {
            NativeCustomDebugRecord::EncLambdaMap(payload.to_vec())
        }
        Some(NativeRecordKind::DynamicLocals) | None => NativeCustomDebugRecord::Unknown {
            kind,
            data: payload.to_vec(),
        },
    })
}

/// Renders one import as a native using string, or `None` if the native format cannot
/// express it. `resolve` names type and assembly tokens.
#[must_use]
pub fn using_string(
    declaration: &ImportDeclaration,
    resolve: &dyn Fn(Token) -> Option<String>,
) -> Option<String> {
    match declaration {
        ImportDeclaration::ImportNamespace { namespace }
        | ImportDeclaration::ImportAssemblyNamespace { namespace, .. } => {
            Some(format!("U{namespace}"))
        }
        ImportDeclaration::DefineNamespaceAlias { alias, namespace }
        | ImportDeclaration::DefineAssemblyNamespaceAlias {
            alias, namespace, ..
        } => Some(format!("A{alias} U{namespace}")),
        ImportDeclaration::ImportType { type_ref } => resolve(*type_ref).map(|t| format!("T{t}")),
        ImportDeclaration::DefineTypeAlias { alias, type_ref } => {
            resolve(*type_ref).map(|t| format!("A{alias} T{t}"))
        }
        ImportDeclaration::ImportAssemblyReferenceAlias { alias } => Some(format!("X{alias}")),
        ImportDeclaration::DefineAssemblyAlias {
            alias,
            assembly_ref,
        } => resolve(*assembly_ref).map(|a| format!("Z{alias} {a}")),
        ImportDeclaration::ImportXmlNamespace { .. } => None,
    }
}

/// Using strings of one scope, in declaration order.
#[must_use]
pub fn using_strings(imports: &ImportsInfo, resolve: &dyn Fn(Token) -> Option<String>) -> Vec<String> {
    imports
        .iter()
        .filter_map(|declaration| {
            let rendered = using_string(declaration, resolve);
            if rendered.is_none() {
                log::debug!("Import {:?} has no native using string", declaration.kind());
            }
            rendered
        })
        .collect()
}
