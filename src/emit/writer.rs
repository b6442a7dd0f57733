use std::{
    collections::{hash_map::Entry, BTreeMap, HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex},
};

use crossbeam_skiplist::SkipMap;
use dashmap::{DashMap, DashSet};
use rayon::prelude::*;

use crate::{
    emit::{
        debugdir::{DebugDirectoryEntry, DebugDirectoryInfo},
        method::{MethodDebugBody, MethodDebugRecord},
        options::{EmitOptions, SymbolFormat},
    },
    file::output::Output,
    metadata::{
        compilation::{CompilationOptionsRecord, MetadataReferenceRecord},
        customdebuginformation::{
            native::{encode_native_records, using_strings, NativeCustomDebugRecord},
            serialize, CustomDebugInfo, CustomDebugInfoSet, EmbeddedSource,
        },
        diagnostics::Diagnostics,
        documents::{Document, DocumentId, DocumentRegistry, SourceText},
        importscope::{encode_imports, ImportScopeId, ImportScopeRegistry},
        localscope::LocalScope,
        sequencepoints::{encode_sequence_points, FormatLimits},
        statemachine::StateMachineDescriptor,
        tables::TableId,
        token::Token,
    },
    pdb::{
        native::{
            NativeAsyncInfo, NativePdb, NativeSequencePoint, NativeSymWriter,
            NativeWriterCapabilities,
        },
        portable::{PdbIdMode, PortablePdb, PortablePdbBuilder},
    },
    utils::synchronization::CancellationToken,
    Error, Result,
};

/// What the PE writer needs from the symbol writer.
#[derive(Clone, Debug)]
pub struct SymbolOutput {
    /// Debug directory entries
    pub debug_directory: DebugDirectoryInfo,
    /// The symbol file, `None` when the symbols are embedded into the image
    pub symbol_stream: Option<Vec<u8>>,
}

impl SymbolOutput {
    /// Writes the symbol file to `path`. The file appears atomically or not at all.
    /// Returns `false` without writing anything for embedded symbols.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] or [`crate::Error::WriteFailed`] if the file
    /// cannot be written.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        let Some(stream) = &self.symbol_stream else {
            log::debug!("Symbols are embedded, no symbol file written");
            return Ok(false);
        };

        let mut output = Output::create(path, stream.len() as u64)?;
        output.write_at(0, stream)?;
        output.finalize()?;
        Ok(true)
    }
}

/// Converts a native writer failure into the error reported to the user, keeping the
/// writer's own message.
fn native_error(error: Error) -> Error {
    match error {
        Error::SymWriterFailed(_) => error,
        other => Error::SymWriterFailed(other.to_string()),
    }
}

fn sym<T>(result: Result<T>) -> Result<T> {
    result.map_err(native_error)
}

/// Everything gathered for a compilation, in serialization order.
struct EmitPlan {
    records: BTreeMap<Token, MethodDebugRecord>,
    state_machines: BTreeMap<Token, StateMachineDescriptor>,
    documents: Vec<DocumentId>,
}

/// The symbol writer of one compilation.
///
/// Method bodies are processed on any thread and merged by token, so the output does not
/// depend on the order workers finish in. [`SymbolWriter::finalize`] assigns document rows,
/// serializes the selected format and returns the symbol stream with the debug directory
/// data.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use dotpdb::emit::{EmitOptions, MethodDebugBody, SymbolWriter};
/// use dotpdb::metadata::{
///     documents::{DocumentRegistry, HashAlgorithm, SourceEncoding, SourceText},
///     importscope::ImportScopeRegistry,
///     sequencepoints::{SequenceMarker, SourceSpan},
///     token::Token,
/// };
///
/// let documents = Arc::new(DocumentRegistry::new());
/// let text = SourceText::new("class C {}", SourceEncoding::Utf8 { bom: true });
/// let doc = documents.register("/src/C.cs", &text, HashAlgorithm::Sha256)?;
///
/// let writer = SymbolWriter::new(
///     EmitOptions::default().with_deterministic(true),
///     documents,
///     ImportScopeRegistry::new(),
/// )?;
/// writer.emit_method(
///     MethodDebugBody::new(Token::method_def(1), 2)
///         .with_marker(0, SequenceMarker::Visible(SourceSpan::new(doc, 1, 1, 1, 10))),
/// )?;
/// let output = writer.finalize()?;
/// assert!(output.symbol_stream.is_some());
/// # Ok::<(), dotpdb::Error>(())
/// ```
pub struct SymbolWriter {
    options: EmitOptions,
    documents: Arc<DocumentRegistry>,
    imports: ImportScopeRegistry,
    methods: SkipMap<Token, MethodDebugRecord>,
    claimed: DashSet<Token>,
    state_machines: DashMap<Token, StateMachineDescriptor>,
    diagnostics: Diagnostics,
    reported_sources: DashSet<String>,
    native: Option<Mutex<Box<dyn NativeSymWriter>>>,
    entry_point: Option<Token>,
    source_link: Option<String>,
    compilation_options: Option<CompilationOptionsRecord>,
    metadata_references: Vec<MetadataReferenceRecord>,
}

impl SymbolWriter {
    /// Creates the writer. For [`SymbolFormat::Native`] the native writer is created and
    /// checked here, so an unusable writer fails the compilation before any work is done.
    ///
    /// # Errors
    /// - [`Error::SymWriterNotFound`] if no native writer is configured or available
    /// - [`Error::SymWriterNotDeterministic`] if deterministic output is requested from a
    ///   writer that cannot produce it
    /// - [`Error::SymWriterCapability`] if source embedding is requested from a writer that
    ///   cannot store it
    pub fn new(
        options: EmitOptions,
        documents: Arc<DocumentRegistry>,
        imports: ImportScopeRegistry,
    ) -> Result<Self> {
        let native = match options.format {
            SymbolFormat::Native => Some(Mutex::new(Self::create_native_writer(&options)?)),
            SymbolFormat::Portable | SymbolFormat::Embedded => None,
        };

        Ok(SymbolWriter {
            options,
            documents,
            imports,
            methods: SkipMap::new(),
            claimed: DashSet::new(),
            state_machines: DashMap::new(),
            diagnostics: Diagnostics::new(),
            reported_sources: DashSet::new(),
            native,
            entry_point: None,
            source_link: None,
            compilation_options: None,
            metadata_references: Vec::new(),
        })
    }

    fn create_native_writer(options: &EmitOptions) -> Result<Box<dyn NativeSymWriter>> {
        let Some(provider) = &options.native_writer else {
            return Err(Error::SymWriterNotFound(
                "no native symbol writer is configured".to_string(),
            ));
        };

        let writer = provider.create().map_err(|error| match error {
            Error::SymWriterNotFound(_) => error,
            other => native_error(other),
        })?;

        let info = writer.info();
        if options.deterministic && !info.supports_deterministic {
            return Err(Error::SymWriterNotDeterministic {
                version: info.version,
            });
        }
        if options.embed_all_sources
            && !info
                .capabilities
                .contains(NativeWriterCapabilities::EMBEDDED_SOURCE)
        {
            return Err(Error::SymWriterCapability {
                version: info.version,
                capability: "embedded source".to_string(),
            });
        }

        log::debug!("Using native symbol writer {}", info.version);
        Ok(writer)
    }

    /// The options the writer was created with.
    #[must_use]
    pub fn options(&self) -> &EmitOptions {
        &self.options
    }

    /// The document registry.
    #[must_use]
    pub fn documents(&self) -> &DocumentRegistry {
        &self.documents
    }

    /// The import scope registry.
    #[must_use]
    pub fn imports(&self) -> &ImportScopeRegistry {
        &self.imports
    }

    /// Diagnostics collected so far.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Registers a source with the configured checksum algorithm.
    ///
    /// A source that cannot be registered is reported once as a diagnostic and makes
    /// [`SymbolWriter::finalize`] fail; `None` is returned so the caller can keep going and
    /// collect further diagnostics.
    pub fn add_source(&self, path: &str, text: &SourceText) -> Option<DocumentId> {
        match self
            .documents
            .register(path, text, self.options.checksum_algorithm)
        {
            Ok(id) => Some(id),
            Err(error) => {
                if self.reported_sources.insert(path.to_string()) {
                    log::warn!("{error}");
                    self.diagnostics.report(&error);
                }
                None
            }
        }
    }

    /// Processes one method body and merges the result. Callable from any thread.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateMethod`] if the method was emitted before, or the error of
    /// [`MethodDebugRecord::build`].
    pub fn emit_method(&self, body: MethodDebugBody) -> Result<()> {
        let token = body.method;
        if !token.is_table(TableId::MethodDef) || token.row() == 0 {
            return Err(malformed_error!("Not a method definition - {}", token));
        }
        if !self.claimed.insert(token) {
            return Err(Error::DuplicateMethod(token));
        }

        // A body that fails to build releases its claim so a corrected body can follow.
        match MethodDebugRecord::build(body) {
            Ok(record) => {
                self.methods.insert(token, record);
                Ok(())
            }
            Err(error) => {
                self.claimed.remove(&token);
                Err(error)
            }
        }
    }

    /// Processes method bodies in parallel. Cancellation is checked before each method;
    /// records merged before it was noticed stay merged.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] on cancellation, otherwise the first error of
    /// [`SymbolWriter::emit_method`].
    pub fn emit_methods(
        &self,
        bodies: Vec<MethodDebugBody>,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        bodies.into_par_iter().try_for_each(|body| {
            cancellation.check()?;
            self.emit_method(body)
        })
    }

    /// Adds a state machine. Callable from any thread.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateMethod`] if the kickoff method already has a state machine.
    pub fn add_state_machine(&self, descriptor: StateMachineDescriptor) -> Result<()> {
        match self.state_machines.entry(descriptor.kickoff) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::DuplicateMethod(descriptor.kickoff))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(descriptor);
                Ok(())
            }
        }
    }

    /// Sets the entry point method.
    pub fn set_entry_point(&mut self, method: Token) {
        self.entry_point = Some(method);
    }

    /// Sets the Source Link JSON document.
    pub fn set_source_link(&mut self, json: impl Into<String>) {
        self.source_link = Some(json.into());
    }

    /// Records the compilation options.
    pub fn set_compilation_options(&mut self, options: CompilationOptionsRecord) {
        self.compilation_options = Some(options);
    }

    /// Records a metadata reference of the compilation.
    pub fn add_metadata_reference(&mut self, reference: MetadataReferenceRecord) {
        self.metadata_references.push(reference);
    }

    /// Serializes the symbols.
    ///
    /// # Errors
    /// - [`Error::EmitFailed`] if any diagnostic was reported
    /// - [`Error::SymWriterCapability`] if the native writer cannot store what the
    ///   compilation produced
    /// - [`Error::SymWriterFailed`] if the native writer fails
    /// - [`Error::Malformed`] if a record references something that was never registered
    pub fn finalize(mut self) -> Result<SymbolOutput> {
        if self.diagnostics.has_errors() {
            return Err(Error::EmitFailed(self.diagnostics.to_vec()));
        }

        let plan = self.plan()?;
        log::debug!(
            "Writing {:?} symbols: {} methods, {} documents, {} state machines",
            self.options.format,
            plan.records.len(),
            plan.documents.len(),
            plan.state_machines.len()
        );

        match self.native.take() {
            Some(writer) => {
                let writer = writer.into_inner().map_err(|_| {
                    Error::SymWriterFailed("native symbol writer lock poisoned".to_string())
                })?;
                self.finish_native(&plan, writer)
            }
            None => self.finish_portable(&plan),
        }
    }

    /// Finalizes and writes the symbol file to `path`.
    ///
    /// # Errors
    /// Returns the errors of [`SymbolWriter::finalize`] and [`SymbolOutput::write_to`].
    pub fn write_symbols<P: AsRef<Path>>(self, path: P) -> Result<SymbolOutput> {
        let output = self.finalize()?;
        output.write_to(path)?;
        Ok(output)
    }

    fn plan(&mut self) -> Result<EmitPlan> {
        let mut records: BTreeMap<Token, MethodDebugRecord> =
            std::mem::replace(&mut self.methods, SkipMap::new())
                .into_iter()
                .collect();
        let state_machines: BTreeMap<Token, StateMachineDescriptor> =
            std::mem::replace(&mut self.state_machines, DashMap::new())
                .into_iter()
                .collect();

        for descriptor in state_machines.values() {
            for method in [descriptor.kickoff, descriptor.move_next] {
                records
                    .entry(method)
                    .or_insert_with(|| MethodDebugRecord::empty(method));
            }
        }

        let documents = self.document_order(&records)?;
        Ok(EmitPlan {
            records,
            state_machines,
            documents,
        })
    }

    /// Registered sources in registration order, then `#line` targets in order of first
    /// reference, then unreferenced targets by name.
    fn document_order(
        &self,
        records: &BTreeMap<Token, MethodDebugRecord>,
    ) -> Result<Vec<DocumentId>> {
        let mut order: Vec<DocumentId> = self
            .documents
            .iter()
            .filter(|document| !document.directive)
            .map(|document| document.id)
            .collect();
        let mut seen: HashSet<DocumentId> = order.iter().copied().collect();

        for record in records.values() {
            for point in record.sequence_points.points() {
                if seen.insert(point.document) {
                    if self.documents.get(point.document).is_none() {
                        return Err(malformed_error!(
                            "Method {} references unregistered document {}",
                            record.method,
                            point.document
                        ));
                    }
                    order.push(point.document);
                }
            }
        }

        let mut unreferenced: Vec<&Document> = self
            .documents
            .iter()
            .filter(|document| !seen.contains(&document.id))
            .collect();
        unreferenced.sort_by(|a, b| a.name.cmp(&b.name));
        order.extend(unreferenced.into_iter().map(|document| document.id));
        Ok(order)
    }

    fn document(&self, id: DocumentId) -> Result<&Document> {
        self.documents
            .get(id)
            .ok_or_else(|| malformed_error!("Unknown document {}", id))
    }

    fn finish_portable(&self, plan: &EmitPlan) -> Result<SymbolOutput> {
        let mode = if self.options.deterministic {
            PdbIdMode::Deterministic
        } else {
            PdbIdMode::now()
        };
        let pdb = self.build_portable(plan, mode)?;

        let mut debug_directory = DebugDirectoryInfo::default();
        debug_directory.push(DebugDirectoryEntry::codeview(
            pdb.guid(),
            1,
            pdb.stamp(),
            &self.options.pdb_path,
            true,
        ));
        debug_directory.push(DebugDirectoryEntry::pdb_checksum(&pdb.bytes));
        if self.options.deterministic {
            debug_directory.push(DebugDirectoryEntry::reproducible());
        }

        let symbol_stream = match self.options.format {
            SymbolFormat::Embedded => {
                debug_directory.push(DebugDirectoryEntry::embedded_pdb(&pdb.bytes)?);
                None
            }
            SymbolFormat::Portable | SymbolFormat::Native => Some(pdb.bytes),
        };

        Ok(SymbolOutput {
            debug_directory,
            symbol_stream,
        })
    }

    fn build_portable(&self, plan: &EmitPlan, mode: PdbIdMode) -> Result<PortablePdb> {
        let mut builder = PortablePdbBuilder::new(self.options.type_system_rows.as_slice());
        let mut custom: BTreeMap<Token, CustomDebugInfoSet> = BTreeMap::new();

        let mut document_rows: HashMap<DocumentId, u32> = HashMap::new();
        for id in &plan.documents {
            let document = self.document(*id)?;
            let row = builder.add_document(
                &document.name,
                document.language.guid(),
                document.checksum.as_ref(),
            )?;
            document_rows.insert(*id, row);

            if self.options.embed_all_sources {
                if let Some(text) = &document.embedded_source {
                    custom
                        .entry(Token::from_parts(TableId::Document, row))
                        .or_default()
                        .insert(CustomDebugInfo::EmbeddedSource(EmbeddedSource::from_text(
                            text,
                        )?));
                }
            }
        }

        let mut import_rows: HashMap<ImportScopeId, u32> = HashMap::new();
        for (id, scope) in self.imports.iter() {
            let parent = scope
                .parent
                .and_then(|parent| import_rows.get(&parent).copied())
                .unwrap_or(0);
            let blob = encode_imports(&scope.imports, builder.blobs_mut())?;
            import_rows.insert(id, builder.add_import_scope(parent, &blob)?);
        }

        for record in plan.records.values() {
            if !record.sequence_points.is_empty() {
                let single = record.sequence_points.single_document();
                let blob = encode_sequence_points(
                    &record.sequence_points,
                    record.local_signature,
                    single.is_some(),
                    &|document| document_rows.get(&document).copied(),
                )?;
                let document = single
                    .and_then(|document| document_rows.get(&document).copied())
                    .unwrap_or(0);
                builder.set_method_debug_info(record.method, document, &blob)?;
            }

            if let Some(tree) = &record.scopes {
                let import_scope = record
                    .import_scope
                    .and_then(|id| import_rows.get(&id).copied())
                    .unwrap_or(0);
                for flat in tree.flatten() {
                    let scope = flat.scope;
                    builder.add_local_scope(
                        record.method,
                        import_scope,
                        scope.start,
                        scope.length(),
                    )?;
                    for local in &scope.locals {
                        builder.add_local_variable(
                            local.attributes.bits(),
                            local.slot,
                            &local.name,
                        )?;
                    }
                    for constant in &scope.constants {
                        builder.add_local_constant(&constant.name, &constant.signature)?;
                    }
                }
            }

            if !record.custom.is_empty() {
                let set = custom.entry(record.method).or_default();
                for info in &record.custom {
                    set.insert(info.clone());
                }
            }
        }

        for descriptor in plan.state_machines.values() {
            builder.add_state_machine(descriptor.move_next, descriptor.kickoff)?;

            let kickoff = custom.entry(descriptor.kickoff).or_default();
            if !descriptor.state_slots.is_empty() {
                kickoff.insert(CustomDebugInfo::EncStateMachineStateMap(
                    descriptor.state_slots.clone(),
                ));
            }
            if let Some(stepping) = descriptor.stepping_info() {
                kickoff.insert(CustomDebugInfo::AsyncMethodSteppingInformation(stepping));
            }
            if !descriptor.hoisted_locals.is_empty() {
                custom
                    .entry(descriptor.move_next)
                    .or_default()
                    .insert(CustomDebugInfo::StateMachineHoistedLocalScopes(
                        descriptor.hoisted_locals.clone(),
                    ));
            }
        }

        let module = Token::from_parts(TableId::Module, 1);
        if let Some(json) = &self.source_link {
            custom
                .entry(module)
                .or_default()
                .insert(CustomDebugInfo::SourceLink(json.clone()));
        }
        if let Some(options) = &self.compilation_options {
            custom
                .entry(module)
                .or_default()
                .insert(CustomDebugInfo::CompilationOptions(options.to_pairs()));
        }
        if !self.metadata_references.is_empty() {
            custom
                .entry(module)
                .or_default()
                .insert(CustomDebugInfo::CompilationMetadataReferences(
                    self.metadata_references.clone(),
                ));
        }

        for (parent, set) in &custom {
            for info in set {
                builder.add_custom_debug_info(*parent, info.kind().guid(), &serialize(info)?)?;
            }
        }

        if let Some(entry_point) = self.entry_point {
            builder.set_entry_point(entry_point);
        }

        builder.finish(mode)
    }

    fn finish_native(
        &self,
        plan: &EmitPlan,
        mut writer: Box<dyn NativeSymWriter>,
    ) -> Result<SymbolOutput> {
        let info = writer.info();
        if plan.state_machines.values().any(|d| d.kind.is_async())
            && !info
                .capabilities
                .contains(NativeWriterCapabilities::ASYNC_METHODS)
        {
            return Err(Error::SymWriterCapability {
                version: info.version,
                capability: "async methods".to_string(),
            });
        }
        if self.source_link.is_some()
            && !info
                .capabilities
                .contains(NativeWriterCapabilities::SOURCE_LINK)
        {
            return Err(Error::SymWriterCapability {
                version: info.version,
                capability: "Source Link".to_string(),
            });
        }

        // The native writer cannot hash its own output, so a deterministic id comes from
        // the portable image of the same content.
        let deterministic_id = if self.options.deterministic {
            let content = self.build_portable(plan, PdbIdMode::Deterministic)?;
            Some((content.guid(), content.stamp()))
        } else {
            None
        };

        let pdb = self.replay_native(plan, writer.as_mut(), deterministic_id)?;

        let mut debug_directory = DebugDirectoryInfo::default();
        debug_directory.push(DebugDirectoryEntry::codeview(
            pdb.guid,
            pdb.age,
            pdb.stamp,
            &self.options.pdb_path,
            false,
        ));
        if self.options.deterministic {
            debug_directory.push(DebugDirectoryEntry::reproducible());
        }

        Ok(SymbolOutput {
            debug_directory,
            symbol_stream: Some(pdb.bytes),
        })
    }

    fn replay_native(
        &self,
        plan: &EmitPlan,
        writer: &mut dyn NativeSymWriter,
        deterministic_id: Option<(uguid::Guid, u32)>,
    ) -> Result<NativePdb> {
        let mut handles: HashMap<DocumentId, u32> = HashMap::new();
        for id in &plan.documents {
            let document = self.document(*id)?;
            let handle = sym(writer.define_document(
                &document.name,
                document.language.guid(),
                document.checksum.as_ref(),
            ))?;
            handles.insert(*id, handle);

            if self.options.embed_all_sources {
                if let Some(text) = &document.embedded_source {
                    sym(writer.set_embedded_source(handle, text))?;
                }
            }
        }

        let by_move_next: HashMap<Token, &StateMachineDescriptor> = plan
            .state_machines
            .values()
            .map(|descriptor| (descriptor.move_next, descriptor))
            .collect();
        let resolve = |token: Token| self.options.token_names.get(&token).cloned();
        let mut using_owners: HashMap<(Token, ImportScopeId), Token> = HashMap::new();

        for record in plan.records.values() {
            sym(writer.open_method(record.method))?;

            let table = record.sequence_points.clamped(&FormatLimits::NATIVE);
            let points = table.points();
            let mut start = 0;
            while start < points.len() {
                let document = points[start].document;
                let end = points[start..]
                    .iter()
                    .position(|point| point.document != document)
                    .map_or(points.len(), |length| start + length);
                let handle = *handles.get(&document).ok_or_else(|| {
                    malformed_error!("No native document for {}", document)
                })?;
                let run: Vec<NativeSequencePoint> = points[start..end]
                    .iter()
                    .map(NativeSequencePoint::from_point)
                    .collect();
                sym(writer.define_sequence_points(handle, &run))?;
                start = end;
            }

            let mut records = Vec::new();
            let mut usings = Vec::new();
            if let Some(scope_id) = record.import_scope {
                match using_owners.entry((record.containing_type, scope_id)) {
                    Entry::Occupied(owner) => {
                        records.push(NativeCustomDebugRecord::ForwardInfo(*owner.get()));
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(record.method);
                        let mut counts = Vec::new();
                        for (_, scope) in self.imports.chain(scope_id).into_iter().rev() {
                            let strings = using_strings(&scope.imports, &resolve);
                            counts.push(u16::try_from(strings.len()).map_err(|_| {
                                malformed_error!("Import scope {} has too many imports", scope_id)
                            })?);
                            usings.extend(strings);
                        }
                        records.push(NativeCustomDebugRecord::UsingInfo(counts));
                    }
                }
            }

            if let Some(tree) = &record.scopes {
                replay_scope(writer, tree.root(), &usings)?;
            }

            if let Some(descriptor) = plan.state_machines.get(&record.method) {
                records.push(NativeCustomDebugRecord::ForwardIterator(
                    descriptor.type_name.clone(),
                ));
            }
            if let Some(descriptor) = by_move_next.get(&record.method) {
                if !descriptor.hoisted_locals.is_empty() {
                    records.push(NativeCustomDebugRecord::StateMachineHoistedLocalScopes(
                        descriptor.hoisted_locals.clone(),
                    ));
                }
                if descriptor.kind.is_async() {
                    sym(writer.set_async_info(&NativeAsyncInfo {
                        kickoff: descriptor.kickoff,
                        catch_handler: descriptor.stepping_catch_handler(),
                        yield_offsets: descriptor
                            .await_points
                            .iter()
                            .map(|point| point.yield_offset)
                            .collect(),
                        resume_offsets: descriptor
                            .await_points
                            .iter()
                            .map(|point| point.resume_offset)
                            .collect(),
                    }))?;
                }
            }

            for info in &record.custom {
                match info {
                    CustomDebugInfo::EncLocalSlotMap(map) => {
                        records.push(NativeCustomDebugRecord::EncLocalSlotMap(map.encode()?));
                    }
                    CustomDebugInfo::EncLambdaAndClosureMap(map) => {
                        records.push(NativeCustomDebugRecord::EncLambdaMap(map.encode()?));
                    }
                    other => log::debug!(
                        "{} of {} has no native form",
                        other.kind().name(),
                        record.method
                    ),
                }
            }

            if !records.is_empty() {
                sym(writer.define_custom_metadata(&encode_native_records(&records)?))?;
            }
            sym(writer.close_method())?;
        }

        if let Some(entry_point) = self.entry_point {
            sym(writer.set_entry_point(entry_point))?;
        }
        if let Some(json) = &self.source_link {
            sym(writer.set_source_link(json.as_bytes()))?;
        }

        sym(writer.commit(deterministic_id))
    }
}

fn replay_scope(writer: &mut dyn NativeSymWriter, scope: &LocalScope, usings: &[String]) -> Result<()> {
    sym(writer.open_scope(scope.start))?;
    for using in usings {
        sym(writer.using_namespace(using))?;
    }
    for local in &scope.locals {
        sym(writer.define_local_variable(local.slot, &local.name, local.attributes))?;
    }
    for constant in &scope.constants {
        sym(writer.define_local_constant(&constant.name, &constant.signature))?;
    }
    for child in &scope.children {
        replay_scope(writer, child, &[])?;
    }
    sym(writer.close_scope(scope.end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            documents::{HashAlgorithm, SourceEncoding},
            importscope::{ImportDeclaration, ImportsInfo},
            localscope::LocalDefinition,
            sequencepoints::{SequenceMarker, SourceSpan},
        },
        pdb::reader::PortablePdbReader,
    };

    fn registry_with(path: &str) -> (Arc<DocumentRegistry>, DocumentId) {
        let documents = Arc::new(DocumentRegistry::new());
        let id = documents
            .register(
                path,
                &SourceText::new("class C {}", SourceEncoding::Utf8 { bom: false }),
                HashAlgorithm::Sha256,
            )
            .unwrap();
        (documents, id)
    }

    fn body(row: u32, document: DocumentId) -> MethodDebugBody {
        MethodDebugBody::new(Token::method_def(row), 8).with_marker(
            0,
            SequenceMarker::Visible(SourceSpan::new(document, row, 5, row, 9)),
        )
    }

    #[test]
    fn duplicate_method_is_rejected() {
        let (documents, doc) = registry_with("/src/a.cs");
        let writer =
            SymbolWriter::new(EmitOptions::default(), documents, ImportScopeRegistry::new())
                .unwrap();
        writer.emit_method(body(1, doc)).unwrap();
        assert!(matches!(
            writer.emit_method(body(1, doc)),
            Err(Error::DuplicateMethod(_))
        ));
    }

    #[test]
    fn failed_body_can_be_emitted_again() {
        let (documents, doc) = registry_with("/src/a.cs");
        let writer =
            SymbolWriter::new(EmitOptions::default(), documents, ImportScopeRegistry::new())
                .unwrap();
        let backwards = body(1, doc)
            .with_marker(6, SequenceMarker::Hidden)
            .with_marker(2, SequenceMarker::Hidden);
        assert!(matches!(
            writer.emit_method(backwards),
            Err(Error::Malformed { .. })
        ));

        writer.emit_method(body(1, doc)).unwrap();
        assert!(matches!(
            writer.emit_method(body(1, doc)),
            Err(Error::DuplicateMethod(_))
        ));
    }

    #[test]
    fn methods_are_ordered_by_token() {
        let (documents, doc) = registry_with("/src/a.cs");
        let writer = SymbolWriter::new(
            EmitOptions::default().with_deterministic(true),
            documents,
            ImportScopeRegistry::new(),
        )
        .unwrap();
        writer
            .emit_methods(
                vec![body(3, doc), body(1, doc), body(2, doc)],
                &CancellationToken::new(),
            )
            .unwrap();

        let output = writer.finalize().unwrap();
        let bytes = output.symbol_stream.unwrap();
        let pdb = PortablePdbReader::read(&bytes).unwrap();
        assert_eq!(
            pdb.debug_methods(),
            vec![Token::method_def(1), Token::method_def(2), Token::method_def(3)]
        );
    }

    #[test]
    fn cancelled_before_any_method() {
        let (documents, doc) = registry_with("/src/a.cs");
        let writer =
            SymbolWriter::new(EmitOptions::default(), documents, ImportScopeRegistry::new())
                .unwrap();
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        assert!(matches!(
            writer.emit_methods(vec![body(1, doc)], &cancellation),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn missing_encoding_fails_finalize_once() {
        let (documents, _) = registry_with("/src/a.cs");
        let writer =
            SymbolWriter::new(EmitOptions::default(), documents, ImportScopeRegistry::new())
                .unwrap();
        let text = SourceText::without_encoding("class D {}");
        assert!(writer.add_source("/src/d.cs", &text).is_none());
        assert!(writer.add_source("/src/d.cs", &text).is_none());
        assert_eq!(writer.diagnostics().count(), 1);

        match writer.finalize() {
            Err(Error::EmitFailed(diagnostics)) => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].path.as_deref(), Some("/src/d.cs"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn native_without_writer() {
        let result = SymbolWriter::new(
            EmitOptions::default().with_format(SymbolFormat::Native),
            Arc::new(DocumentRegistry::new()),
            ImportScopeRegistry::new(),
        );
        assert!(matches!(result, Err(Error::SymWriterNotFound(_))));
    }

    #[test]
    fn import_scope_shared_by_methods() {
        let (documents, doc) = registry_with("/src/a.cs");
        let imports = ImportScopeRegistry::new();
        let scope = imports
            .add(
                None,
                ImportsInfo::with_declarations(vec![ImportDeclaration::namespace("System")]),
            )
            .unwrap();
        let writer = SymbolWriter::new(
            EmitOptions::default().with_deterministic(true),
            documents,
            imports,
        )
        .unwrap();
        for row in 1..=2 {
            writer
                .emit_method(
                    body(row, doc)
                        .with_import_scope(scope)
                        .with_local(LocalDefinition::new("x", 0, 0, 8)),
                )
                .unwrap();
        }

        let bytes = writer.finalize().unwrap().symbol_stream.unwrap();
        let pdb = PortablePdbReader::read(&bytes).unwrap();
        assert_eq!(pdb.import_scopes().unwrap().len(), 1);
        let first = pdb.local_scopes(Token::method_def(1)).unwrap();
        let second = pdb.local_scopes(Token::method_def(2)).unwrap();
        assert_eq!(first[0].import_scope, 1);
        assert_eq!(second[0].import_scope, 1);
    }
}
