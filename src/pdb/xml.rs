//! XML rendering of symbol information.
//!
//! Two producers share one vocabulary:
//!
//! - [`XmlSymWriter`] implements [`NativeSymWriter`] and renders whatever the symbol writer
//!   facade replays into it. It stands in for a native PDB writer in tests and tooling.
//! - [`portable_to_xml`] dumps a Portable PDB image.
//!
//! ```xml
//! <symbols>
//!   <files>
//!     <file id="1" name="/src/Program.cs" language="CSharp" checksumAlgorithm="SHA256" checksum="..."/>
//!   </files>
//!   <methods>
//!     <method token="0x06000001">
//!       <sequencePoints>
//!         <entry offset="0x0" startLine="1" startColumn="35" endLine="1" endColumn="36" document="1"/>
//!       </sequencePoints>
//!       <scope startOffset="0x0" endOffset="0x8">
//!         <local name="p" il_index="0" attributes="0"/>
//!       </scope>
//!     </method>
//!   </methods>
//! </symbols>
//! ```

use std::collections::BTreeMap;

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use uguid::Guid;

use crate::{
    metadata::{
        closures::{LambdaClosure, LambdaMap, LocalSlotMap},
        compilation::MetadataImageKind,
        customdebuginformation::{
            native::{parse_native_records, NativeCustomDebugRecord},
            CustomDebugInfo,
        },
        documents::{DocumentChecksum, DocumentLanguage, HashAlgorithm},
        importscope::{ImportDeclaration, ImportsInfo},
        localscope::{HoistedLocalScope, LocalVariableAttributes},
        statemachine::StateSlot,
        token::Token,
    },
    pdb::{
        native::{
            NativeAsyncInfo, NativePdb, NativeSequencePoint, NativeSymWriter,
            NativeWriterCapabilities, NativeWriterInfo,
        },
        portable::{compute_pdb_id, PdbIdMode},
        reader::{LocalScopeEntry, PortablePdbReader},
    },
    Error, Result,
};

/// Indented XML output with crate errors.
struct XmlOut {
    writer: Writer<Vec<u8>>,
}

fn xml_error(error: impl std::fmt::Display) -> Error {
    Error::WriteFailed {
        message: format!("XML output failed: {error}"),
    }
}

impl XmlOut {
    fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_error)?;
        Ok(XmlOut { writer })
    }

    fn element<'a>(name: &'a str, attributes: &[(&str, String)]) -> BytesStart<'a> {
        let mut element = BytesStart::new(name);
        for (key, value) in attributes {
            element.push_attribute((*key, value.as_str()));
        }
        element
    }

    fn start(&mut self, name: &str, attributes: &[(&str, String)]) -> Result<()> {
        self.writer
            .write_event(Event::Start(Self::element(name, attributes)))
            .map_err(xml_error)
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, String)]) -> Result<()> {
        self.writer
            .write_event(Event::Empty(Self::element(name, attributes)))
            .map_err(xml_error)
    }

    fn text_element(&mut self, name: &str, attributes: &[(&str, String)], text: &str) -> Result<()> {
        self.start(name, attributes)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_error)?;
        self.end(name)
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner()).map_err(xml_error)
    }
}

fn hex(value: u32) -> String {
    format!("0x{value:X}")
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join("-")
}

fn language_name(language: Guid) -> String {
    match DocumentLanguage::from_guid(language) {
        DocumentLanguage::Other(guid) => guid.to_string(),
        known => format!("{known:?}"),
    }
}

fn algorithm_name(algorithm: Guid) -> String {
    match HashAlgorithm::from_guid(algorithm) {
        Some(HashAlgorithm::Sha1) => "SHA1".to_string(),
        Some(HashAlgorithm::Sha256) => "SHA256".to_string(),
        Some(HashAlgorithm::Md5) => "MD5".to_string(),
        None => algorithm.to_string(),
    }
}

fn file_attributes(
    id: u32,
    name: &str,
    language: Guid,
    checksum: Option<(Guid, &[u8])>,
) -> Vec<(&'static str, String)> {
    let mut attributes = vec![
        ("id", id.to_string()),
        ("name", name.to_string()),
        ("language", language_name(language)),
    ];
    if let Some((algorithm, digest)) = checksum {
        attributes.push(("checksumAlgorithm", algorithm_name(algorithm)));
        attributes.push(("checksum", hex_bytes(digest)));
    }
    attributes
}

fn write_entry(xml: &mut XmlOut, document: u32, point: &NativeSequencePoint) -> Result<()> {
    if point.is_hidden() {
        return xml.empty(
            "entry",
            &[
                ("offset", hex(point.offset)),
                ("hidden", "true".to_string()),
                ("document", document.to_string()),
            ],
        );
    }

    xml.empty(
        "entry",
        &[
            ("offset", hex(point.offset)),
            ("startLine", point.start_line.to_string()),
            ("startColumn", point.start_column.to_string()),
            ("endLine", point.end_line.to_string()),
            ("endColumn", point.end_column.to_string()),
            ("document", document.to_string()),
        ],
    )
}

fn write_local(
    xml: &mut XmlOut,
    name: &str,
    slot: u16,
    attributes: LocalVariableAttributes,
) -> Result<()> {
    xml.empty(
        "local",
        &[
            ("name", name.to_string()),
            ("il_index", slot.to_string()),
            ("attributes", attributes.bits().to_string()),
        ],
    )
}

fn write_constant(xml: &mut XmlOut, name: &str, signature: &[u8]) -> Result<()> {
    xml.empty(
        "constant",
        &[
            ("name", name.to_string()),
            ("signature", hex_bytes(signature)),
        ],
    )
}

fn write_import(xml: &mut XmlOut, declaration: &ImportDeclaration) -> Result<()> {
    match declaration {
        ImportDeclaration::ImportNamespace { namespace } => {
            xml.empty("namespace", &[("name", namespace.clone())])
        }
        ImportDeclaration::ImportAssemblyNamespace {
            assembly_ref,
            namespace,
        } => xml.empty(
            "namespace",
            &[
                ("name", namespace.clone()),
                ("assembly", assembly_ref.to_string()),
            ],
        ),
        ImportDeclaration::ImportType { type_ref } => {
            xml.empty("type", &[("token", type_ref.to_string())])
        }
        ImportDeclaration::ImportXmlNamespace { alias, namespace } => xml.empty(
            "xmlNamespace",
            &[("prefix", alias.clone()), ("name", namespace.clone())],
        ),
        ImportDeclaration::ImportAssemblyReferenceAlias { alias } => {
            xml.empty("externAlias", &[("alias", alias.clone())])
        }
        ImportDeclaration::DefineAssemblyAlias {
            alias,
            assembly_ref,
        } => xml.empty(
            "externAlias",
            &[("alias", alias.clone()), ("assembly", assembly_ref.to_string())],
        ),
        ImportDeclaration::DefineNamespaceAlias { alias, namespace } => xml.empty(
            "alias",
            &[
                ("name", alias.clone()),
                ("target", namespace.clone()),
                ("kind", "namespace".to_string()),
            ],
        ),
        ImportDeclaration::DefineAssemblyNamespaceAlias {
            alias,
            assembly_ref,
            namespace,
        } => xml.empty(
            "alias",
            &[
                ("name", alias.clone()),
                ("target", namespace.clone()),
                ("assembly", assembly_ref.to_string()),
                ("kind", "namespace".to_string()),
            ],
        ),
        ImportDeclaration::DefineTypeAlias { alias, type_ref } => xml.empty(
            "alias",
            &[
                ("name", alias.clone()),
                ("target", type_ref.to_string()),
                ("kind", "type".to_string()),
            ],
        ),
    }
}

fn write_imports(xml: &mut XmlOut, imports: &ImportsInfo) -> Result<()> {
    imports.iter().try_for_each(|d| write_import(xml, d))
}

fn write_slot_map(xml: &mut XmlOut, map: &LocalSlotMap) -> Result<()> {
    xml.start("encLocalSlotMap", &[])?;
    for slot in &map.slots {
        match slot {
            None => xml.empty("slot", &[("kind", "temp".to_string())])?,
            Some(info) => {
                let mut attributes = vec![
                    ("kind", info.kind.0.to_string()),
                    ("offset", info.syntax_offset.to_string()),
                ];
                if info.ordinal != 0 {
                    attributes.push(("ordinal", info.ordinal.to_string()));
                }
                xml.empty("slot", &attributes)?;
            }
        }
    }
    xml.end("encLocalSlotMap")
}

fn write_lambda_map(xml: &mut XmlOut, map: &LambdaMap) -> Result<()> {
    xml.start("encLambdaMap", &[])?;
    xml.text_element("methodOrdinal", &[], &map.method_ordinal.to_string())?;
    for offset in &map.closures {
        xml.empty("closure", &[("offset", offset.to_string())])?;
    }
    for lambda in &map.lambdas {
        let mut attributes = vec![
            ("offset", lambda.syntax_offset.to_string()),
            ("ordinal", lambda.lambda_ordinal.to_string()),
        ];
        match lambda.closure {
            LambdaClosure::Static => {}
            LambdaClosure::ThisOnly => attributes.push(("closure", "this".to_string())),
            LambdaClosure::Closure(ordinal) => attributes.push(("closure", ordinal.to_string())),
        }
        xml.empty("lambda", &attributes)?;
    }
    xml.end("encLambdaMap")
}

fn write_state_map(xml: &mut XmlOut, slots: &[StateSlot]) -> Result<()> {
    xml.start("encStateMachineStateMap", &[])?;
    for slot in slots {
        xml.empty(
            "state",
            &[
                ("number", slot.state.to_string()),
                ("offset", slot.syntax_offset.to_string()),
            ],
        )?;
    }
    xml.end("encStateMachineStateMap")
}

fn write_hoisted_scopes(xml: &mut XmlOut, scopes: &[HoistedLocalScope]) -> Result<()> {
    xml.start("hoistedLocalScopes", &[])?;
    for scope in scopes {
        if scope.is_empty() {
            xml.empty("slot", &[])?;
        } else {
            xml.empty(
                "slot",
                &[
                    ("startOffset", hex(scope.start)),
                    ("endOffset", hex(scope.end)),
                ],
            )?;
        }
    }
    xml.end("hoistedLocalScopes")
}

fn write_custom_debug_info(xml: &mut XmlOut, info: &CustomDebugInfo) -> Result<()> {
    match info {
        CustomDebugInfo::EncLocalSlotMap(map) => write_slot_map(xml, map),
        CustomDebugInfo::EncLambdaAndClosureMap(map) => write_lambda_map(xml, map),
        CustomDebugInfo::EncStateMachineStateMap(slots) => write_state_map(xml, slots),
        CustomDebugInfo::StateMachineHoistedLocalScopes(scopes) => {
            write_hoisted_scopes(xml, scopes)
        }
        CustomDebugInfo::AsyncMethodSteppingInformation(stepping) => {
            xml.start("asyncInfo", &[])?;
            if let Some(offset) = stepping.catch_handler {
                xml.empty("catchHandler", &[("offset", hex(offset))])?;
            }
            for point in &stepping.await_points {
                xml.empty(
                    "await",
                    &[
                        ("yield", hex(point.yield_offset)),
                        ("resume", hex(point.resume_offset)),
                        ("method", stepping.move_next.to_string()),
                    ],
                )?;
            }
            xml.end("asyncInfo")
        }
        CustomDebugInfo::DynamicLocalVariables(data) => {
            xml.empty("dynamicLocals", &[("payload", hex_bytes(data))])
        }
        CustomDebugInfo::TupleElementNames(data) => {
            xml.empty("tupleElementNames", &[("payload", hex_bytes(data))])
        }
        CustomDebugInfo::DefaultNamespace(name) => {
            xml.empty("defaultNamespace", &[("name", name.clone())])
        }
        CustomDebugInfo::EmbeddedSource(source) => {
            let text = source.decompressed()?;
            xml.text_element(
                "embeddedSource",
                &[
                    ("length", text.len().to_string()),
                    ("compressed", (source.uncompressed_size != 0).to_string()),
                ],
                &String::from_utf8_lossy(&text),
            )
        }
        CustomDebugInfo::SourceLink(json) => xml.text_element("sourceLink", &[], json),
        CustomDebugInfo::CompilationOptions(pairs) => {
            xml.start("compilationOptions", &[])?;
            for (name, value) in pairs {
                xml.empty("option", &[("name", name.clone()), ("value", value.clone())])?;
            }
            xml.end("compilationOptions")
        }
        CustomDebugInfo::CompilationMetadataReferences(references) => {
            xml.start("compilationMetadataReferences", &[])?;
            for reference in references {
                let kind = match reference.kind {
                    MetadataImageKind::Assembly => "assembly",
                    MetadataImageKind::Module => "module",
                };
                xml.empty(
                    "reference",
                    &[
                        ("fileName", reference.file_name.clone()),
                        ("aliases", reference.extern_aliases.join(",")),
                        ("kind", kind.to_string()),
                        (
                            "embedInteropTypes",
                            reference.embed_interop_types.to_string(),
                        ),
                        ("timeStamp", hex(reference.timestamp)),
                        ("imageSize", hex(reference.image_size)),
                        ("mvid", reference.mvid.to_string()),
                    ],
                )?;
            }
            xml.end("compilationMetadataReferences")
        }
        CustomDebugInfo::Unknown { kind, data } => xml.empty(
            "unknown",
            &[("kind", kind.name()), ("payload", hex_bytes(data))],
        ),
    }
}

fn write_native_record(xml: &mut XmlOut, record: &NativeCustomDebugRecord) -> Result<()> {
    match record {
        NativeCustomDebugRecord::UsingInfo(counts) => {
            xml.start("using", &[])?;
            for count in counts {
                xml.empty("namespace", &[("usingCount", count.to_string())])?;
            }
            xml.end("using")
        }
        NativeCustomDebugRecord::ForwardInfo(token) => {
            xml.empty("forward", &[("token", token.to_string())])
        }
        NativeCustomDebugRecord::ForwardToModuleInfo(token) => {
            xml.empty("forwardToModule", &[("token", token.to_string())])
        }
        NativeCustomDebugRecord::StateMachineHoistedLocalScopes(scopes) => {
            write_hoisted_scopes(xml, scopes)
        }
        NativeCustomDebugRecord::ForwardIterator(name) => {
            xml.empty("forwardIterator", &[("name", name.clone())])
        }
        NativeCustomDebugRecord::EncLocalSlotMap(blob) => {
            write_slot_map(xml, &LocalSlotMap::decode(blob)?)
        }
        NativeCustomDebugRecord::EncLambdaMap(blob) => {
            write_lambda_map(xml, &LambdaMap::decode(blob)?)
        }
        NativeCustomDebugRecord::Unknown { kind, data } => xml.empty(
            "unknown",
            &[("kind", kind.to_string()), ("payload", hex_bytes(data))],
        ),
    }
}

/// Scope recorded by [`XmlSymWriter`].
#[derive(Debug, Default)]
struct RecordedScope {
    start: u32,
    end: u32,
    usings: Vec<String>,
    locals: Vec<(u16, String, LocalVariableAttributes)>,
    constants: Vec<(String, Vec<u8>)>,
    children: Vec<RecordedScope>,
}

/// Method recorded by [`XmlSymWriter`].
#[derive(Debug)]
struct RecordedMethod {
    token: Token,
    sequence_points: Vec<(u32, NativeSequencePoint)>,
    scopes: Vec<RecordedScope>,
    async_info: Option<NativeAsyncInfo>,
    custom_metadata: Option<Vec<u8>>,
}

#[derive(Debug)]
struct RecordedDocument {
    name: String,
    language: Guid,
    checksum: Option<DocumentChecksum>,
    embedded_source: Option<Vec<u8>>,
}

/// A [`NativeSymWriter`] that renders the replayed symbol information as XML.
///
/// # Examples
///
/// ```rust
/// use dotpdb::pdb::{native::NativeSymWriter, xml::XmlSymWriter};
/// use dotpdb::metadata::{documents::DocumentLanguage, token::Token};
///
/// let mut writer = XmlSymWriter::new();
/// writer.define_document("a.cs", DocumentLanguage::CSharp.guid(), None)?;
/// writer.open_method(Token::method_def(1))?;
/// writer.close_method()?;
/// let pdb = writer.commit(None)?;
/// assert!(String::from_utf8(pdb.bytes).unwrap().contains("0x06000001"));
/// # Ok::<(), dotpdb::Error>(())
/// ```
#[derive(Debug)]
pub struct XmlSymWriter {
    info: NativeWriterInfo,
    documents: Vec<RecordedDocument>,
    methods: Vec<RecordedMethod>,
    current: Option<RecordedMethod>,
    open_scopes: Vec<RecordedScope>,
    entry_point: Option<Token>,
    source_link: Option<String>,
}

impl Default for XmlSymWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlSymWriter {
    /// Creates a deterministic writer with every capability.
    #[must_use]
    pub fn new() -> Self {
        XmlSymWriter {
            info: NativeWriterInfo {
                version: format!("dotpdb-xml {}", env!("CARGO_PKG_VERSION")),
                supports_deterministic: true,
                capabilities: NativeWriterCapabilities::all(),
            },
            documents: Vec::new(),
            methods: Vec::new(),
            current: None,
            open_scopes: Vec::new(),
            entry_point: None,
            source_link: None,
        }
    }

    /// Overrides what the writer reports about itself.
    #[must_use]
    pub fn with_info(mut self, info: NativeWriterInfo) -> Self {
        self.info = info;
        self
    }

    fn method(&mut self) -> Result<&mut RecordedMethod> {
        self.current
            .as_mut()
            .ok_or_else(|| Error::SymWriterFailed("No method is open".to_string()))
    }

    fn render(&self) -> Result<String> {
        let mut xml = XmlOut::new()?;
        xml.start("symbols", &[])?;

        xml.start("files", &[])?;
        for (index, document) in self.documents.iter().enumerate() {
            let attributes = file_attributes(
                index as u32 + 1,
                &document.name,
                document.language,
                document
                    .checksum
                    .as_ref()
                    .map(|c| (c.algorithm, c.digest.as_slice())),
            );
            match &document.embedded_source {
                Some(source) => {
                    xml.start("file", &attributes)?;
                    xml.text_element(
                        "embeddedSource",
                        &[("length", source.len().to_string())],
                        &String::from_utf8_lossy(source),
                    )?;
                    xml.end("file")?;
                }
                None => xml.empty("file", &attributes)?,
            }
        }
        xml.end("files")?;

        if let Some(entry_point) = self.entry_point {
            xml.empty("entryPoint", &[("token", entry_point.to_string())])?;
        }

        xml.start("methods", &[])?;
        for method in &self.methods {
            xml.start("method", &[("token", method.token.to_string())])?;

            if let Some(blob) = &method.custom_metadata {
                xml.start("customDebugInfo", &[])?;
                for record in parse_native_records(blob)? {
                    write_native_record(&mut xml, &record)?;
                }
                xml.end("customDebugInfo")?;
            }

            if !method.sequence_points.is_empty() {
                xml.start("sequencePoints", &[])?;
                for (document, point) in &method.sequence_points {
                    write_entry(&mut xml, *document, point)?;
                }
                xml.end("sequencePoints")?;
            }

            for scope in &method.scopes {
                Self::render_scope(&mut xml, scope)?;
            }

            if let Some(info) = &method.async_info {
                xml.start("asyncInfo", &[])?;
                xml.empty("kickoffMethod", &[("token", info.kickoff.to_string())])?;
                if let Some(offset) = info.catch_handler {
                    xml.empty("catchHandler", &[("offset", hex(offset))])?;
                }
                for (yield_offset, resume_offset) in
                    info.yield_offsets.iter().zip(&info.resume_offsets)
                {
                    xml.empty(
                        "await",
                        &[
                            ("yield", hex(*yield_offset)),
                            ("resume", hex(*resume_offset)),
                            ("method", method.token.to_string()),
                        ],
                    )?;
                }
                xml.end("asyncInfo")?;
            }

            xml.end("method")?;
        }
        xml.end("methods")?;

        if let Some(json) = &self.source_link {
            xml.text_element("sourceLink", &[], json)?;
        }

        xml.end("symbols")?;
        xml.finish()
    }

    fn render_scope(xml: &mut XmlOut, scope: &RecordedScope) -> Result<()> {
        xml.start(
            "scope",
            &[("startOffset", hex(scope.start)), ("endOffset", hex(scope.end))],
        )?;
        for using in &scope.usings {
            xml.empty("using", &[("name", using.clone())])?;
        }
        for (slot, name, attributes) in &scope.locals {
            write_local(xml, name, *slot, *attributes)?;
        }
        for (name, signature) in &scope.constants {
            write_constant(xml, name, signature)?;
        }
        for child in &scope.children {
            Self::render_scope(xml, child)?;
        }
        xml.end("scope")
    }
}

impl NativeSymWriter for XmlSymWriter {
    fn info(&self) -> NativeWriterInfo {
        self.info.clone()
    }

    fn define_document(
        &mut self,
        name: &str,
        language: Guid,
        checksum: Option<&DocumentChecksum>,
    ) -> Result<u32> {
        self.documents.push(RecordedDocument {
            name: name.to_string(),
            language,
            checksum: checksum.cloned(),
            embedded_source: None,
        });
        Ok(self.documents.len() as u32)
    }

    fn open_method(&mut self, method: Token) -> Result<()> {
        if let Some(open) = &self.current {
            return Err(Error::SymWriterFailed(format!(
                "Method {} is still open",
                open.token
            )));
        }

        self.current = Some(RecordedMethod {
            token: method,
            sequence_points: Vec::new(),
            scopes: Vec::new(),
            async_info: None,
            custom_metadata: None,
        });
        Ok(())
    }

    fn close_method(&mut self) -> Result<()> {
        if !self.open_scopes.is_empty() {
            return Err(Error::SymWriterFailed(format!(
                "{} scopes are still open",
                self.open_scopes.len()
            )));
        }

        let method = self
            .current
            .take()
            .ok_or_else(|| Error::SymWriterFailed("No method is open".to_string()))?;
        self.methods.push(method);
        Ok(())
    }

    fn define_sequence_points(
        &mut self,
        document: u32,
        points: &[NativeSequencePoint],
    ) -> Result<()> {
        if document == 0 || document as usize > self.documents.len() {
            return Err(Error::SymWriterFailed(format!(
                "Unknown document handle {document}"
            )));
        }

        let method = self.method()?;
        method
            .sequence_points
            .extend(points.iter().map(|point| (document, *point)));
        Ok(())
    }

    fn open_scope(&mut self, start: u32) -> Result<()> {
        self.method()?;
        self.open_scopes.push(RecordedScope {
            start,
            ..RecordedScope::default()
        });
        Ok(())
    }

    fn close_scope(&mut self, end: u32) -> Result<()> {
        let mut scope = self
            .open_scopes
            .pop()
            .ok_or_else(|| Error::SymWriterFailed("No scope is open".to_string()))?;
        scope.end = end;

        match self.open_scopes.last_mut() {
            Some(parent) => parent.children.push(scope),
            None => self.method()?.scopes.push(scope),
        }
        Ok(())
    }

    fn define_local_variable(
        &mut self,
        slot: u16,
        name: &str,
        attributes: LocalVariableAttributes,
    ) -> Result<()> {
        let scope = self
            .open_scopes
            .last_mut()
            .ok_or_else(|| Error::SymWriterFailed("No scope is open".to_string()))?;
        scope.locals.push((slot, name.to_string(), attributes));
        Ok(())
    }

    fn define_local_constant(&mut self, name: &str, signature: &[u8]) -> Result<()> {
        let scope = self
            .open_scopes
            .last_mut()
            .ok_or_else(|| Error::SymWriterFailed("No scope is open".to_string()))?;
        scope.constants.push((name.to_string(), signature.to_vec()));
        Ok(())
    }

    fn using_namespace(&mut self, using: &str) -> Result<()> {
        let scope = self
            .open_scopes
            .last_mut()
            .ok_or_else(|| Error::SymWriterFailed("No scope is open".to_string()))?;
        scope.usings.push(using.to_string());
        Ok(())
    }

    fn set_async_info(&mut self, info: &NativeAsyncInfo) -> Result<()> {
        self.method()?.async_info = Some(info.clone());
        Ok(())
    }

    fn define_custom_metadata(&mut self, blob: &[u8]) -> Result<()> {
        self.method()?.custom_metadata = Some(blob.to_vec());
        Ok(())
    }

    fn set_entry_point(&mut self, method: Token) -> Result<()> {
        self.entry_point = Some(method);
        Ok(())
    }

    fn set_source_link(&mut self, json: &[u8]) -> Result<()> {
        self.source_link = Some(String::from_utf8_lossy(json).into_owned());
        Ok(())
    }

    fn set_embedded_source(&mut self, document: u32, source: &[u8]) -> Result<()> {
        let recorded = document
            .checked_sub(1)
            .and_then(|index| self.documents.get_mut(index as usize))
            .ok_or_else(|| Error::SymWriterFailed(format!("Unknown document handle {document}")))?;
        recorded.embedded_source = Some(source.to_vec());
        Ok(())
    }

    fn commit(&mut self, deterministic_id: Option<(Guid, u32)>) -> Result<NativePdb> {
        if let Some(open) = &self.current {
            return Err(Error::SymWriterFailed(format!(
                "Method {} was never closed",
                open.token
            )));
        }

        let bytes = self.render()?.into_bytes();
        let (guid, stamp) = match deterministic_id {
            Some(id) => id,
            None => {
                let id = compute_pdb_id(&bytes, PdbIdMode::Deterministic);
                let mut guid = [0u8; 16];
                guid.copy_from_slice(&id[..16]);
                (
                    Guid::from_bytes(guid),
                    u32::from_le_bytes([id[16], id[17], id[18], id[19]]),
                )
            }
        };

        Ok(NativePdb {
            bytes,
            guid,
            age: 1,
            stamp,
        })
    }
}

/// Renders a Portable PDB image as XML.
///
/// # Errors
/// Returns an error if the image cannot be read or a blob is malformed.
pub fn portable_to_xml(bytes: &[u8]) -> Result<String> {
    let pdb = PortablePdbReader::read(bytes)?;

    let mut custom: BTreeMap<u32, Vec<CustomDebugInfo>> = BTreeMap::new();
    for (parent, info) in pdb.custom_debug_entries()? {
        custom.entry(parent.value()).or_default().push(info);
    }
    let kickoffs: BTreeMap<u32, Token> = pdb
        .state_machine_methods()
        .into_iter()
        .map(|(move_next, kickoff)| (move_next.value(), kickoff))
        .collect();

    let mut xml = XmlOut::new()?;
    xml.start("symbols", &[])?;

    xml.start("files", &[])?;
    for document in pdb.documents()? {
        let attributes = file_attributes(
            document.row,
            &document.name,
            document.language,
            document.hash_algorithm.map(|a| (a, document.hash.as_slice())),
        );
        let token = Token::from_parts(crate::metadata::tables::TableId::Document, document.row);
        match custom.get(&token.value()) {
            Some(entries) => {
                xml.start("file", &attributes)?;
                for info in entries {
                    write_custom_debug_info(&mut xml, info)?;
                }
                xml.end("file")?;
            }
            None => xml.empty("file", &attributes)?,
        }
    }
    xml.end("files")?;

    if !pdb.entry_point().is_null() {
        xml.empty("entryPoint", &[("token", pdb.entry_point().to_string())])?;
    }

    let import_scopes = pdb.import_scopes()?;

    xml.start("methods", &[])?;
    for method in pdb.debug_methods() {
        let mut attributes = vec![("token", method.to_string())];
        if let Some(kickoff) = kickoffs.get(&method.value()) {
            attributes.push(("kickoffMethod", kickoff.to_string()));
        }
        xml.start("method", &attributes)?;

        if let Some(entries) = custom.get(&method.value()) {
            xml.start("customDebugInfo", &[])?;
            for info in entries {
                write_custom_debug_info(&mut xml, info)?;
            }
            xml.end("customDebugInfo")?;
        }

        if let Some(decoded) = pdb.sequence_points(method)? {
            xml.start("sequencePoints", &[])?;
            for point in decoded.table.points() {
                write_entry(
                    &mut xml,
                    point.document.value(),
                    &NativeSequencePoint::from_point(point),
                )?;
            }
            xml.end("sequencePoints")?;
        }

        write_portable_scopes(&mut xml, &pdb.local_scopes(method)?, &import_scopes)?;
        xml.end("method")?;
    }
    xml.end("methods")?;

    let module_entries: Vec<&CustomDebugInfo> = custom
        .iter()
        .filter(|(parent, _)| {
            let token = Token::new(**parent);
            !token.is_table(crate::metadata::tables::TableId::MethodDef)
                && !token.is_table(crate::metadata::tables::TableId::Document)
        })
        .flat_map(|(_, entries)| entries.iter())
        .collect();
    if !module_entries.is_empty() {
        xml.start("customDebugInfo", &[])?;
        for info in module_entries {
            write_custom_debug_info(&mut xml, info)?;
        }
        xml.end("customDebugInfo")?;
    }

    xml.end("symbols")?;
    xml.finish()
}

fn write_portable_scopes(
    xml: &mut XmlOut,
    scopes: &[LocalScopeEntry],
    import_scopes: &[crate::pdb::reader::ImportScopeEntry],
) -> Result<()> {
    let mut open_ends: Vec<u32> = Vec::new();
    for scope in scopes {
        while open_ends.last().is_some_and(|end| scope.start >= *end) {
            open_ends.pop();
            xml.end("scope")?;
        }

        xml.start(
            "scope",
            &[
                ("startOffset", hex(scope.start)),
                ("endOffset", hex(scope.end())),
            ],
        )?;
        open_ends.push(scope.end());

        let mut row = scope.import_scope;
        while row != 0 {
            let Some(entry) = import_scopes.iter().find(|e| e.row == row) else {
                return Err(malformed_error!("LocalScope references ImportScope {}", row));
            };
            xml.start("importScope", &[("row", row.to_string())])?;
            write_imports(xml, &entry.imports)?;
            xml.end("importScope")?;
            row = entry.parent;
        }

        for local in &scope.variables {
            write_local(xml, &local.name, local.index, local.attributes)?;
        }
        for constant in &scope.constants {
            write_constant(xml, &constant.name, &constant.signature)?;
        }
    }

    for _ in open_ends {
        xml.end("scope")?;
    }
    Ok(())
}
