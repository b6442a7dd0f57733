//! Custom debug information blob serializer.

use crate::{
    metadata::{
        compilation::{encode_metadata_references, encode_option_pairs},
        customdebuginformation::types::CustomDebugInfo,
        statemachine::encode_state_map,
    },
    utils::write_compressed_uint,
    Result,
};

/// Serializes a value into the blob stored in the `CustomDebugInformation` row.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if an EnC map cannot be encoded.
pub fn serialize(info: &CustomDebugInfo) -> Result<Vec<u8>> {
    Ok(match info {
        CustomDebugInfo::EncLocalSlotMap(map) => map.encode()?,
        CustomDebugInfo::EncLambdaAndClosureMap(map) => map.encode()?,
        CustomDebugInfo::EncStateMachineStateMap(slots) => encode_state_map(slots),
        CustomDebugInfo::StateMachineHoistedLocalScopes(scopes) => {
            let mut blob = Vec::with_capacity(scopes.len() * 8);
            for scope in scopes {
                blob.extend_from_slice(&scope.start.to_le_bytes());
                blob.extend_from_slice(&scope.length().to_le_bytes());
            }
            blob
        }
        CustomDebugInfo::AsyncMethodSteppingInformation(stepping) => {
            let mut blob = Vec::with_capacity(4 + stepping.await_points.len() * 10);
            let catch_handler = stepping.catch_handler.map_or(0, |offset| offset + 1);
            blob.extend_from_slice(&catch_handler.to_le_bytes());
            for point in &stepping.await_points {
                blob.extend_from_slice(&point.yield_offset.to_le_bytes());
                blob.extend_from_slice(&point.resume_offset.to_le_bytes());
                write_compressed_uint(stepping.move_next.row(), &mut blob);
            }
            blob
        }
        CustomDebugInfo::DynamicLocalVariables(data)
        | CustomDebugInfo::TupleElementNames(data)
        | CustomDebugInfo::Unknown { data, .. } => data.clone(),
        CustomDebugInfo::DefaultNamespace(text) | CustomDebugInfo::SourceLink(text) => {
            text.as_bytes().to_vec()
        }
        CustomDebugInfo::EmbeddedSource(source) => {
            let mut blob = Vec::with_capacity(4 + source.content.len());
            blob.extend_from_slice(&(source.uncompressed_size as i32).to_le_bytes());
            blob.extend_from_slice(&source.content);
            blob
        }
        CustomDebugInfo::CompilationOptions(pairs) => encode_option_pairs(pairs),
        CustomDebugInfo::CompilationMetadataReferences(references) => {
            encode_metadata_references(references)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        closures::{LambdaClosure, LambdaMapBuilder},
        customdebuginformation::{parse_custom_debug_blob, AsyncSteppingInfo, EmbeddedSource},
        localscope::HoistedLocalScope,
        statemachine::AwaitPoint,
        token::Token,
    };

    fn round_trip(info: CustomDebugInfo) {
        let blob = serialize(&info).unwrap();
        assert_eq!(parse_custom_debug_blob(&blob, info.kind()).unwrap(), info);
    }

    #[test]
    fn test_round_trip_known_kinds() {
        let mut lambdas = LambdaMapBuilder::new(2);
        let closure = lambdas.record_closure(0);
        lambdas
            .record_lambda(14, 0, LambdaClosure::Closure(closure))
            .unwrap();

        round_trip(CustomDebugInfo::EncLambdaAndClosureMap(lambdas.build().unwrap()));
        round_trip(CustomDebugInfo::StateMachineHoistedLocalScopes(vec![
            HoistedLocalScope::new(0, 12),
            HoistedLocalScope::EMPTY,
        ]));
        round_trip(CustomDebugInfo::AsyncMethodSteppingInformation(AsyncSteppingInfo {
            catch_handler: None,
            await_points: vec![AwaitPoint {
                yield_offset: 3,
                resume_offset: 9,
            }],
            move_next: Token::method_def(7),
        }));
        round_trip(CustomDebugInfo::DefaultNamespace("Company.Product".into()));
        round_trip(CustomDebugInfo::EmbeddedSource(
            EmbeddedSource::from_text("x".repeat(500).as_bytes()).unwrap(),
        ));
        round_trip(CustomDebugInfo::CompilationOptions(vec![(
            "version".into(),
            "2".into(),
        )]));
    }

    #[test]
    fn test_embedded_source_header() {
        let blob = serialize(&CustomDebugInfo::EmbeddedSource(
            EmbeddedSource::from_text(b"abc").unwrap(),
        ))
        .unwrap();
        assert_eq!(blob, [0, 0, 0, 0, b'a', b'b', b'c']);
    }
}
