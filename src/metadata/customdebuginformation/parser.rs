//! Custom debug information blob parser.
//!
//! The blob layout depends on the kind GUID of the `CustomDebugInformation` row. Unknown
//! kinds, and the kinds this crate only recognizes, are returned as raw bytes.

use crate::{
    file::parser::Parser,
    metadata::{
        closures::{LambdaMap, LocalSlotMap},
        compilation::{parse_compilation_options, parse_metadata_references},
        customdebuginformation::types::{
            AsyncSteppingInfo, CustomDebugInfo, CustomDebugKind, EmbeddedSource,
        },
        localscope::HoistedLocalScope,
        statemachine::{decode_state_map, AwaitPoint},
        token::Token,
    },
    Result,
};

/// Parser over one custom debug information blob.
pub struct CustomDebugParser<'a> {
    parser: Parser<'a>,
    kind: CustomDebugKind,
}

impl<'a> CustomDebugParser<'a> {
    /// Creates a parser for a blob of the given kind.
    #[must_use]
    pub fn new(data: &'a [u8], kind: CustomDebugKind) -> Self {
        CustomDebugParser {
            parser: Parser::new(data),
            kind,
        }
    }

    /// Decodes the blob.
    ///
    /// # Errors
    /// Returns an error for truncated or inconsistent data.
    pub fn parse_debug_info(&mut self) -> Result<CustomDebugInfo> {
        Ok(match self.kind {
            CustomDebugKind::EncLocalSlotMap => {
                CustomDebugInfo::EncLocalSlotMap(LocalSlotMap::decode(self.parser.read_remaining())?)
            }
            CustomDebugKind::EncLambdaAndClosureMap => CustomDebugInfo::EncLambdaAndClosureMap(
                LambdaMap::decode(self.parser.read_remaining())?,
            ),
            CustomDebugKind::EncStateMachineStateMap => CustomDebugInfo::EncStateMachineStateMap(
                decode_state_map(self.parser.read_remaining())?,
            ),
            CustomDebugKind::StateMachineHoistedLocalScopes => {
                CustomDebugInfo::StateMachineHoistedLocalScopes(self.read_hoisted_scopes()?)
            }
            CustomDebugKind::AsyncMethodSteppingInformation => {
                CustomDebugInfo::AsyncMethodSteppingInformation(self.read_stepping_info()?)
            }
            CustomDebugKind::DynamicLocalVariables => {
                CustomDebugInfo::DynamicLocalVariables(self.parser.read_remaining().to_vec())
            }
            CustomDebugKind::TupleElementNames => {
                CustomDebugInfo::TupleElementNames(self.parser.read_remaining().to_vec())
            }
            CustomDebugKind::DefaultNamespace => {
                CustomDebugInfo::DefaultNamespace(self.read_utf8_string()?)
            }
            CustomDebugKind::EmbeddedSource => {
                let format = self.parser.read_le::<i32>()?;
                let uncompressed_size = u32::try_from(format)
                    .map_err(|_| malformed_error!("Invalid embedded source format {}", format))?;
                CustomDebugInfo::EmbeddedSource(EmbeddedSource {
                    uncompressed_size,
                    content: self.parser.read_remaining().to_vec(),
                })
            }
            CustomDebugKind::SourceLink => CustomDebugInfo::SourceLink(self.read_utf8_string()?),
            CustomDebugKind::CompilationOptions => CustomDebugInfo::CompilationOptions(
                parse_compilation_options(self.parser.read_remaining())?,
            ),
            CustomDebugKind::CompilationMetadataReferences => {
                CustomDebugInfo::CompilationMetadataReferences(parse_metadata_references(
                    self.parser.read_remaining(),
                )?)
            }
            CustomDebugKind::Unknown(_) => CustomDebugInfo::Unknown {
                kind: self.kind,
                data: self.parser.read_remaining().to_vec(),
            },
        })
    }

    fn read_utf8_string(&mut self) -> Result<String> {
        String::from_utf8(self.parser.read_remaining().to_vec())
            .map_err(|e| malformed_error!("Invalid UTF-8 in custom debug information - {}", e))
    }

    fn read_hoisted_scopes(&mut self) -> Result<Vec<HoistedLocalScope>> {
        if self.parser.remaining() % 8 != 0 {
            return Err(malformed_error!(
                "Hoisted local scopes blob of {} bytes",
                self.parser.len()
            ));
        }

        let mut scopes = Vec::with_capacity(self.parser.remaining() / 8);
        while self.parser.has_more_data() {
            let start = self.parser.read_le::<u32>()?;
            let length = self.parser.read_le::<u32>()?;
            let end = start
                .checked_add(length)
                .ok_or_else(|| malformed_error!("Hoisted scope overflows"))?;
            scopes.push(HoistedLocalScope::new(start, end));
        }
        Ok(scopes)
    }

    fn read_stepping_info(&mut self) -> Result<AsyncSteppingInfo> {
        let catch_handler = match self.parser.read_le::<u32>()? {
            0 => None,
            offset => Some(offset - 1),
        };

        let mut await_points = Vec::new();
        let mut move_next = Token::new(0);
        while self.parser.has_more_data() {
            let yield_offset = self.parser.read_le::<u32>()?;
            let resume_offset = self.parser.read_le::<u32>()?;
            move_next = Token::method_def(self.parser.read_compressed_uint()?);
            await_points.push(AwaitPoint {
                yield_offset,
                resume_offset,
            });
        }

        Ok(AsyncSteppingInfo {
            catch_handler,
            await_points,
            move_next,
        })
    }
}

/// Decodes a custom debug information blob of the given kind.
///
/// # Errors
/// See [`CustomDebugParser::parse_debug_info`].
pub fn parse_custom_debug_blob(data: &[u8], kind: CustomDebugKind) -> Result<CustomDebugInfo> {
    let mut parser = CustomDebugParser::new(data, kind);
    parser.parse_debug_info()
}
