use crate::{
    metadata::{
        closures::{LambdaMap, LocalSlotMap},
        customdebuginformation::{CustomDebugInfo, CustomDebugInfoSet},
        documents::DocumentId,
        importscope::ImportScopeId,
        localscope::{LocalConstantDefinition, LocalDefinition, LocalScopeBuilder, LocalScopeTree},
        sequencepoints::{SequenceMarker, SequencePointCollector, SequencePointTable},
        token::Token,
    },
    Result,
};

/// Part a method plays in a lowered state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StateMachineRole {
    /// An ordinary method
    #[default]
    None,
    /// The method the user called. Its sequence points are dropped unless it runs user code
    /// before the machine starts.
    Kickoff {
        /// The body has a synchronous user-code prefix
        synchronous_prefix: bool,
    },
    /// The generated `MoveNext`; its points are always kept
    MoveNext,
}

/// Debug information of one method body, as produced by the code generator.
///
/// ```rust
/// use dotpdb::emit::MethodDebugBody;
/// use dotpdb::metadata::{localscope::LocalDefinition, token::Token};
///
/// let body = MethodDebugBody::new(Token::method_def(1), 8)
///     .with_local(LocalDefinition::new("p", 0, 0, 8));
/// assert_eq!(body.locals.len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDebugBody {
    /// `MethodDef` token
    pub method: Token,
    /// `TypeDef` token of the declaring type
    pub containing_type: Token,
    /// Size of the IL body
    pub il_length: u32,
    /// Source document declaring the method. Hidden points outside any visible region are
    /// attributed to it, so a body under `#line hidden` keeps its stepping boundaries.
    pub document: Option<DocumentId>,
    /// Ordered `(offset, marker)` stream
    pub markers: Vec<(u32, SequenceMarker)>,
    /// `StandAloneSig` row of the local signature, 0 for none
    pub local_signature: u32,
    /// Locals with their live ranges
    pub locals: Vec<LocalDefinition>,
    /// Constants with their live ranges
    pub constants: Vec<LocalConstantDefinition>,
    /// Import scope in effect for the body
    pub import_scope: Option<ImportScopeId>,
    /// Lambda and closure map
    pub lambda_map: Option<LambdaMap>,
    /// Local slot map
    pub slot_map: Option<LocalSlotMap>,
    /// State machine role
    pub role: StateMachineRole,
    /// Further custom debug information, e.g. dynamic locals or tuple element names
    pub custom: Vec<CustomDebugInfo>,
}

impl MethodDebugBody {
    /// An empty body of `il_length` bytes.
    #[must_use]
    pub fn new(method: Token, il_length: u32) -> Self {
        MethodDebugBody {
            method,
            containing_type: Token::new(0),
            il_length,
            document: None,
            markers: Vec::new(),
            local_signature: 0,
            locals: Vec::new(),
            constants: Vec::new(),
            import_scope: None,
            lambda_map: None,
            slot_map: None,
            role: StateMachineRole::None,
            custom: Vec::new(),
        }
    }

    /// Sets the declaring type.
    #[must_use]
    pub fn with_containing_type(mut self, containing_type: Token) -> Self {
        self.containing_type = containing_type;
        self
    }

    /// Sets the declaring source document.
    #[must_use]
    pub fn with_document(mut self, document: DocumentId) -> Self {
        self.document = Some(document);
        self
    }

    /// Appends a marker.
    #[must_use]
    pub fn with_marker(mut self, offset: u32, marker: SequenceMarker) -> Self {
        self.markers.push((offset, marker));
        self
    }

    /// Replaces the marker stream.
    #[must_use]
    pub fn with_markers(mut self, markers: Vec<(u32, SequenceMarker)>) -> Self {
        self.markers = markers;
        self
    }

    /// Sets the local signature row.
    #[must_use]
    pub fn with_local_signature(mut self, row: u32) -> Self {
        self.local_signature = row;
        self
    }

    /// Adds a local.
    #[must_use]
    pub fn with_local(mut self, local: LocalDefinition) -> Self {
        self.locals.push(local);
        self
    }

    /// Adds a constant.
    #[must_use]
    pub fn with_constant(mut self, constant: LocalConstantDefinition) -> Self {
        self.constants.push(constant);
        self
    }

    /// Sets the import scope.
    #[must_use]
    pub fn with_import_scope(mut self, scope: ImportScopeId) -> Self {
        self.import_scope = Some(scope);
        self
    }

    /// Sets the lambda map.
    #[must_use]
    pub fn with_lambda_map(mut self, map: LambdaMap) -> Self {
        self.lambda_map = Some(map);
        self
    }

    /// Sets the local slot map.
    #[must_use]
    pub fn with_slot_map(mut self, map: LocalSlotMap) -> Self {
        self.slot_map = Some(map);
        self
    }

    /// Sets the state machine role.
    #[must_use]
    pub fn with_role(mut self, role: StateMachineRole) -> Self {
        self.role = role;
        self
    }

    /// Adds custom debug information.
    #[must_use]
    pub fn with_custom(mut self, info: CustomDebugInfo) -> Self {
        self.custom.push(info);
        self
    }
}

/// The processed debug information of one method, ready for serialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDebugRecord {
    /// `MethodDef` token
    pub method: Token,
    /// `TypeDef` token of the declaring type
    pub containing_type: Token,
    /// Collected sequence points, exact
    pub sequence_points: SequencePointTable,
    /// `StandAloneSig` row of the local signature
    pub local_signature: u32,
    /// Scope tree, `None` if the method declares nothing
    pub scopes: Option<LocalScopeTree>,
    /// Import scope in effect for the body
    pub import_scope: Option<ImportScopeId>,
    /// Custom debug information in serialization order
    pub custom: CustomDebugInfoSet,
    /// State machine role
    pub role: StateMachineRole,
}

impl MethodDebugRecord {
    /// Processes a body: collects sequence points, builds the scope tree and gathers custom
    /// debug information.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a marker stream going backwards or
    /// [`crate::Error::InvalidScope`] for overlapping locals.
    pub fn build(body: MethodDebugBody) -> Result<Self> {
        let sequence_points = match body.role {
            StateMachineRole::Kickoff {
                synchronous_prefix: false,
            } => {
                log::trace!("Dropping sequence points of kickoff method {}", body.method);
                SequencePointTable::default()
            }
            _ => SequencePointCollector::new()
                .with_fallback_document(body.document)
                .collect_from(body.markers)?,
        };

        let mut builder = LocalScopeBuilder::new(body.il_length);
        for local in body.locals {
            builder = builder.local(local);
        }
        for constant in body.constants {
            builder = builder.constant(constant);
        }
        if let Some(imports) = body.import_scope {
            builder = builder.imports(imports);
        }
        let tree = builder.build()?;

        let mut custom = CustomDebugInfoSet::new();
        if let Some(map) = body.slot_map.filter(|m| !m.is_empty()) {
            custom.insert(CustomDebugInfo::EncLocalSlotMap(map));
        }
        if let Some(map) = body.lambda_map.filter(|m| !m.is_empty()) {
            custom.insert(CustomDebugInfo::EncLambdaAndClosureMap(map));
        }
        for info in body.custom {
            custom.insert(info);
        }

        Ok(MethodDebugRecord {
            method: body.method,
            containing_type: body.containing_type,
            sequence_points,
            local_signature: body.local_signature,
            scopes: (!tree.is_empty()).then_some(tree),
            import_scope: body.import_scope,
            custom,
            role: body.role,
        })
    }

    /// A record without any information, for methods only known through a state machine.
    #[must_use]
    pub fn empty(method: Token) -> Self {
        MethodDebugRecord {
            method,
            containing_type: Token::new(0),
            sequence_points: SequencePointTable::default(),
            local_signature: 0,
            scopes: None,
            import_scope: None,
            custom: CustomDebugInfoSet::new(),
            role: StateMachineRole::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        documents::DocumentId,
        sequencepoints::SourceSpan,
    };

    fn visible(line: u32) -> SequenceMarker {
        SequenceMarker::Visible(SourceSpan::new(DocumentId::from_raw(1), line, 5, line, 9))
    }

    #[test]
    fn build_collects_points_and_scopes() {
        let body = MethodDebugBody::new(Token::method_def(1), 8)
            .with_marker(0, visible(1))
            .with_marker(1, visible(2))
            .with_marker(7, visible(3))
            .with_local(LocalDefinition::new("p", 0, 0, 8));

        let record = MethodDebugRecord::build(body).unwrap();
        assert_eq!(record.sequence_points.len(), 3);
        let tree = record.scopes.unwrap();
        assert_eq!(tree.root().locals[0].name, "p");
        assert_eq!((tree.root().start, tree.root().end), (0, 8));
    }

    #[test]
    fn kickoff_without_prefix_drops_points() {
        let body = MethodDebugBody::new(Token::method_def(2), 20)
            .with_marker(0, visible(1))
            .with_role(StateMachineRole::Kickoff {
                synchronous_prefix: false,
            });
        assert!(MethodDebugRecord::build(body).unwrap().sequence_points.is_empty());

        let body = MethodDebugBody::new(Token::method_def(2), 20)
            .with_marker(0, visible(1))
            .with_role(StateMachineRole::Kickoff {
                synchronous_prefix: true,
            });
        assert_eq!(MethodDebugRecord::build(body).unwrap().sequence_points.len(), 1);
    }

    #[test]
    fn move_next_keeps_hidden_points() {
        let body = MethodDebugBody::new(Token::method_def(3), 20)
            .with_marker(0, SequenceMarker::Hidden)
            .with_marker(6, visible(4))
            .with_marker(12, SequenceMarker::Hidden)
            .with_role(StateMachineRole::MoveNext);
        let record = MethodDebugRecord::build(body).unwrap();
        let points = record.sequence_points.points();
        assert_eq!(points.len(), 3);
        assert!(points[0].is_hidden());
        assert!(points[2].is_hidden());
    }

    #[test]
    fn hidden_only_move_next_keeps_points_in_declaring_document() {
        let body = MethodDebugBody::new(Token::method_def(2), 20)
            .with_document(DocumentId::from_raw(4))
            .with_marker(0, SequenceMarker::Hidden)
            .with_marker(8, SequenceMarker::Hidden)
            .with_role(StateMachineRole::MoveNext);
        let record = MethodDebugRecord::build(body).unwrap();
        let points = record.sequence_points.points();
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.is_hidden()));
        assert_eq!(record.sequence_points.single_document(), Some(DocumentId::from_raw(4)));
    }

    #[test]
    fn empty_maps_are_not_attached() {
        let body = MethodDebugBody::new(Token::method_def(1), 4)
            .with_slot_map(LocalSlotMap::new(Vec::new()))
            .with_custom(CustomDebugInfo::DynamicLocalVariables(vec![1]));
        let record = MethodDebugRecord::build(body).unwrap();
        assert_eq!(record.custom.len(), 1);
        assert!(record.scopes.is_none());
    }
}
