//! BAML Decoder (Pull-Reader).
//!
//! [`BamlReader`] liest einen Record-Stream vorwärts und liefert pro
//! [`read`](BamlReader::read) genau einen Knoten. Tabellen-Records werden
//! still in die [`MapTable`] geladen, Property-Records eines Elements in
//! einem Puffer gesammelt (Cursor über `move_to_*_property`).
//!
//! Deferred Content (Dictionary-Werte hinter vorgezogenen Keys) wird beim
//! Lesen rekonstruiert: die Keys werden beim Marker gescannt und jedem Wert
//! über seinen relativen Byte-Offset als synthetisches `x:Key` zugeordnet.
//!
//! # Beispiel
//!
//! ```
//! use baml::encoder::{EncoderConfig, encode};
//! use baml::decoder::BamlReader;
//! use baml::namespaces::PRESENTATION_URI;
//! use baml::node::{MarkupNode, NodeType};
//!
//! let nodes = vec![
//!     MarkupNode::DocumentStart,
//!     MarkupNode::xmlns("", PRESENTATION_URI),
//!     MarkupNode::element(PRESENTATION_URI, "Button"),
//!     MarkupNode::property("Width", "20"),
//!     MarkupNode::ElementEnd,
//!     MarkupNode::DocumentEnd,
//! ];
//! let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
//!
//! let mut reader = BamlReader::new(bytes.as_slice());
//! assert!(reader.read().unwrap());
//! assert_eq!(reader.node_type(), NodeType::StartDocument);
//! assert!(reader.read().unwrap());
//! assert_eq!(reader.name(), "Button");
//! assert!(reader.move_to_first_property());
//! assert!(reader.move_to_next_property());
//! assert_eq!(reader.name(), "Width");
//! assert_eq!(reader.value(), Some("20"));
//! ```

mod api;
mod context;
mod key;
mod names;
mod stream;

pub use api::{NodeIter, decode, decode_iter, decode_with};

use std::collections::VecDeque;
use std::io::Read;
use std::rc::Rc;

use crate::bytestream::ByteReader;
use crate::error::LineInfo;
use crate::header::{self, BamlHeader};
use crate::map_table::MapTable;
use crate::namespaces::{NamespaceScope, PRESENTATION_OPTIONS_URI, XAML_URI};
use crate::node::{BamlNode, ComplexKind, NodeType};
use crate::record::{Record, RecordType};
use crate::reflect::TypeSystem;
use crate::{Error, Result};

use context::{DeferredBlock, KeyInfo, NodeInfo};
use names::{MemberDisplay, Names, literal_attribute};
use stream::{Fetched, RecordSource};

/// Decoder-Optionen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Unauflösbare Typen/Components nur loggen statt abbrechen.
    pub allow_unknown_types: bool,
    /// Jedes Attribut gegen den Host auflösen (nur mit Type-System).
    pub validate_members: bool,
    /// Synthetische `x:Key`/`x:Shared` Properties an Deferred-Werten.
    pub expand_deferred_keys: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self { allow_unknown_types: false, validate_members: true, expand_deferred_keys: true }
    }
}

impl DecoderOptions {
    pub fn with_allow_unknown_types(mut self) -> Self {
        self.allow_unknown_types = true;
        self
    }

    pub fn without_member_validation(mut self) -> Self {
        self.validate_members = false;
        self
    }

    pub fn without_key_expansion(mut self) -> Self {
        self.expand_deferred_keys = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Initial,
    Interactive,
    EndOfFile,
    Closed,
}

/// Property-Record oder bereits verdichteter Inline-Key.
enum Pending {
    Record(Record),
    Key { text: String, shared: Option<bool> },
}

/// Ergebnis des Property-Sub-Loops.
struct Collected {
    pending: Vec<Pending>,
    connection_id: Option<i32>,
}

/// Forward-only BAML reader.
pub struct BamlReader<R> {
    source: RecordSource<R>,
    tables: MapTable,
    scope: NamespaceScope,
    options: DecoderOptions,
    state: ReaderState,
    stack: Vec<NodeInfo>,
    blocks: Vec<DeferredBlock>,
    current: BamlNode,
    property_cursor: Option<usize>,
    header: Option<BamlHeader>,
}

impl<R: Read> BamlReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, DecoderOptions::default())
    }

    pub fn with_options(reader: R, options: DecoderOptions) -> Self {
        Self {
            source: RecordSource::new(ByteReader::new(reader)),
            tables: MapTable::new(),
            scope: NamespaceScope::new(),
            options,
            state: ReaderState::Initial,
            stack: Vec::new(),
            blocks: Vec::new(),
            current: BamlNode::default(),
            property_cursor: None,
            header: None,
        }
    }

    /// Löst Typen und Member zusätzlich über den Host auf.
    pub fn with_type_system(mut self, host: Rc<dyn TypeSystem>) -> Self {
        self.tables = std::mem::take(&mut self.tables).with_type_system(host);
        self
    }

    /// Verwendet vorhandene Tabellen (z.B. mit persistentem Cache) für diesen Pass.
    pub fn with_tables(mut self, tables: MapTable) -> Self {
        self.tables = tables;
        self
    }

    pub fn into_tables(self) -> MapTable {
        self.tables
    }

    pub fn tables(&self) -> &MapTable {
        &self.tables
    }

    /// Version header, once the first `read()` consumed it.
    pub fn header(&self) -> Option<&BamlHeader> {
        self.header.as_ref()
    }

    // ========================================================================
    // Read-Loop
    // ========================================================================

    /// Advances to the next node. `Ok(false)` at the end of the stream.
    ///
    /// Nach `Ok(false)`, einem Fehler oder [`close`](Self::close) liefert
    /// jeder weitere Aufruf [`Error::ReaderClosed`].
    pub fn read(&mut self) -> Result<bool> {
        if matches!(self.state, ReaderState::EndOfFile | ReaderState::Closed) {
            return Err(Error::ReaderClosed);
        }
        match self.advance() {
            Ok(more) => Ok(more),
            Err(e) => {
                self.state = ReaderState::Closed;
                Err(e.at(self.source.line(), self.source.position()))
            }
        }
    }

    fn advance(&mut self) -> Result<bool> {
        if self.state == ReaderState::Initial {
            let header = header::decode(self.source.reader_mut())?;
            log::debug!("BAML header: writer version {:?}", header.writer_version());
            self.header = Some(header);
            self.state = ReaderState::Interactive;
        }
        self.property_cursor = None;
        loop {
            let Some(fetched) = self.source.next()? else {
                if let Some(open) = self.stack.last() {
                    return Err(Error::UnclosedScope(open.kind));
                }
                self.state = ReaderState::EndOfFile;
                self.current = BamlNode::default();
                return Ok(false);
            };
            if let Some(node) = self.dispatch(fetched)? {
                self.current = node;
                return Ok(true);
            }
        }
    }

    /// Verarbeitet einen Record; `None` wenn kein Knoten entsteht.
    fn dispatch(&mut self, fetched: Fetched) -> Result<Option<BamlNode>> {
        let Fetched { record, start, end, replayed } = fetched;
        let node = match record {
            record if record.record_type().is_table() => {
                self.tables.load(&record)?;
                return Ok(None);
            }
            Record::ContentProperty { attribute_id } => {
                if let Some(top) = self.stack.last_mut() {
                    top.content_property = Some(attribute_id);
                }
                return Ok(None);
            }
            Record::DeferableContentStart { content_size } => {
                self.scan_keys(content_size, end)?;
                return Ok(None);
            }
            Record::StaticResourceId { static_resource_id } => {
                self.replay_resource(static_resource_id)?;
                return Ok(None);
            }
            Record::DocumentStart { .. } => {
                self.stack.push(NodeInfo::new(RecordType::DocumentStart));
                self.scope.push_scope();
                self.new_node(NodeType::StartDocument, 0)
            }
            Record::DocumentEnd => {
                self.pop_expect(RecordType::DocumentEnd)?;
                self.scope.pop_scope();
                self.new_node(NodeType::EndDocument, 0)
            }
            Record::PiMapping { xml_namespace, clr_namespace, assembly_id } => {
                let assembly = self.tables.component(assembly_id)?.to_string();
                let component = Some(assembly.as_str()).filter(|a| !a.is_empty());
                self.scope.add_mapping(&xml_namespace, &clr_namespace, component);
                let mut node = self.new_node(NodeType::PiMapping, self.scope_depth());
                node.name = "Mapping".to_string();
                node.xml_namespace = xml_namespace;
                node.clr_namespace = clr_namespace;
                node.assembly_name = assembly;
                node
            }
            Record::ElementStart { type_id, .. } => self.start_element(type_id, start, replayed)?,
            Record::ElementEnd => self.end_element(start)?,
            Record::PropertyComplexStart { attribute_id } => {
                self.start_complex(RecordType::PropertyComplexStart, ComplexKind::Object, attribute_id)?
            }
            Record::PropertyArrayStart { attribute_id } => {
                self.start_complex(RecordType::PropertyArrayStart, ComplexKind::Array, attribute_id)?
            }
            Record::PropertyIListStart { attribute_id } => {
                self.start_complex(RecordType::PropertyIListStart, ComplexKind::List, attribute_id)?
            }
            Record::PropertyIDictionaryStart { attribute_id } => {
                self.start_complex(RecordType::PropertyIDictionaryStart, ComplexKind::Dictionary, attribute_id)?
            }
            Record::PropertyComplexEnd
            | Record::PropertyArrayEnd
            | Record::PropertyIListEnd
            | Record::PropertyIDictionaryEnd => {
                let frame = self.pop_expect(record.record_type())?;
                let mut node = self.new_node(NodeType::EndComplexProperty, self.scope_depth());
                node.name = frame.name;
                node.local_name = frame.local_name;
                node
            }
            Record::ConstructorParametersStart => {
                let depth = self.scope_depth();
                self.stack.push(NodeInfo::new(RecordType::ConstructorParametersStart));
                self.new_node(NodeType::StartConstructor, depth)
            }
            Record::ConstructorParametersEnd => {
                self.pop_expect(RecordType::ConstructorParametersEnd)?;
                self.new_node(NodeType::EndConstructor, self.scope_depth())
            }
            Record::ConstructorParameterType { type_id } => {
                let name = Names::new(&self.tables, &self.scope).type_name(type_id)?;
                self.text_node(name.display(), None)
            }
            Record::Text { value } => self.text_node(value, None),
            Record::TextWithId { value_id } => {
                let value = self.tables.string(value_id)?.to_string();
                self.text_node(value, None)
            }
            Record::TextWithConverter { value, converter_type_id } => {
                let converter = Names::new(&self.tables, &self.scope).type_name(converter_type_id)?.local;
                self.text_node(value, Some(converter))
            }
            Record::LiteralContent { value, .. } => {
                let mut node = self.new_node(NodeType::LiteralContent, self.scope_depth());
                node.value = Some(value);
                node
            }
            other => return Err(Error::unexpected(other.record_type(), "outside a property list")),
        };
        Ok(Some(node))
    }

    fn new_node(&self, node_type: NodeType, depth: usize) -> BamlNode {
        BamlNode { node_type, depth, line: self.source.line(), ..BamlNode::default() }
    }

    fn text_node(&self, value: String, converter: Option<String>) -> BamlNode {
        let mut node = self.new_node(NodeType::Text, self.scope_depth());
        node.value = Some(value);
        node.converter = converter;
        node
    }

    /// Nesting depth below the document scope.
    fn scope_depth(&self) -> usize {
        self.stack.iter().filter(|f| f.kind != RecordType::DocumentStart).count()
    }

    fn pop_expect(&mut self, found: RecordType) -> Result<NodeInfo> {
        match self.stack.pop() {
            Some(frame) if frame.closing() == Some(found) => Ok(frame),
            top => Err(Error::scope_mismatch(found, top.and_then(|f| f.closing()))),
        }
    }

    /// Type of the innermost element scope.
    fn element_type(&self) -> Option<i16> {
        self.stack.iter().rev().find(|f| f.kind == RecordType::ElementStart).and_then(|f| f.type_id)
    }

    /// Degraded mode: unresolvable types are logged instead of failing.
    fn tolerate<T>(&self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e @ (Error::UnresolvedType(_) | Error::UnresolvedComponent(_))) if self.options.allow_unknown_types => {
                log::warn!("{e}; continuing as unknown type");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Elemente und Property-Scopes
    // ========================================================================

    fn start_element(&mut self, type_id: i16, start: u64, replayed: bool) -> Result<BamlNode> {
        let key = if replayed { None } else { self.match_deferred_key(start) };
        let depth = self.scope_depth();
        self.scope.push_scope();
        self.stack.push(NodeInfo::element(type_id));

        let collected = self.collect_properties()?;
        self.tolerate(self.tables.resolve_type(type_id))?;

        let name = Names::new(&self.tables, &self.scope).type_name(type_id)?;
        let mut node = self.new_node(NodeType::StartElement, depth);
        node.name = name.display();
        node.prefix = name.prefix.clone();
        node.local_name = name.local.clone();
        node.xml_namespace = name.xml_namespace.clone();
        node.clr_namespace = name.clr_namespace;
        node.assembly_name = name.assembly;
        node.connection_id = collected.connection_id;

        if let Some(frame) = self.stack.last_mut() {
            frame.name = node.name.clone();
            frame.local_name = name.local;
            frame.prefix = name.prefix;
            frame.xml_namespace = name.xml_namespace;
        }

        let mut properties = Vec::with_capacity(collected.pending.len() + 2);
        if let Some(key) = key
            && self.options.expand_deferred_keys
        {
            properties.push(self.key_node(key.text, depth + 1));
            if let Some(shared) = key.shared {
                properties.push(self.shared_node(shared, depth + 1));
            }
        }
        properties.extend(self.render(collected.pending, Some(type_id), depth + 1)?);
        node.properties = properties;
        Ok(node)
    }

    fn end_element(&mut self, start: u64) -> Result<BamlNode> {
        let frame = self.pop_expect(RecordType::ElementEnd)?;
        self.scope.pop_scope();
        if frame.owns_deferred {
            self.close_block(start)?;
        }
        let mut node = self.new_node(NodeType::EndElement, self.scope_depth());
        node.name = frame.name;
        node.prefix = frame.prefix;
        node.local_name = frame.local_name;
        node.xml_namespace = frame.xml_namespace;
        Ok(node)
    }

    fn start_complex(&mut self, kind: RecordType, complex: ComplexKind, attribute_id: i16) -> Result<BamlNode> {
        let element_type = self.element_type();
        let depth = self.scope_depth();
        let element_name = self.stack.iter().rev().find(|f| f.kind == RecordType::ElementStart).map(|f| f.name.clone());
        self.stack.push(NodeInfo::property(kind, attribute_id, element_type));

        let collected = self.collect_properties()?;
        self.validate_member(attribute_id)?;
        let member = Names::new(&self.tables, &self.scope).member(attribute_id, element_type)?;

        let mut node = self.new_node(NodeType::StartComplexProperty(complex), depth);
        node.local_name = member.local.clone();
        node.name = match (&member.owner, element_name) {
            (None, Some(element)) => format!("{element}.{}", member.local),
            _ => member.name.clone(),
        };
        apply_owner(&mut node, &member);
        if let Some(frame) = self.stack.last_mut() {
            frame.name = node.name.clone();
            frame.local_name = member.local;
        }
        node.properties = self.render(collected.pending, element_type, depth + 1)?;
        Ok(node)
    }

    /// Property-Sub-Loop: sammelt alle folgenden Property-artigen Records.
    ///
    /// Der erste andere Record wird zurückgelegt und vom Haupt-Loop gelesen.
    fn collect_properties(&mut self) -> Result<Collected> {
        let mut collected = Collected { pending: Vec::new(), connection_id: None };
        while let Some(fetched) = self.source.next()? {
            let Fetched { record, start, end, replayed } = fetched;
            match record {
                record if record.record_type().is_table() => self.tables.load(&record)?,
                Record::StaticResourceId { static_resource_id } => self.replay_resource(static_resource_id)?,
                Record::ContentProperty { attribute_id } => {
                    if let Some(top) = self.stack.last_mut() {
                        top.content_property = Some(attribute_id);
                    }
                }
                Record::ConnectionId { connection_id } => collected.connection_id = Some(connection_id),
                Record::XmlnsProperty { prefix, namespace, assembly_ids } => {
                    self.scope.declare(&prefix, &namespace);
                    collected.pending.push(Pending::Record(Record::XmlnsProperty { prefix, namespace, assembly_ids }));
                }
                Record::KeyElementStart { type_id, shared, shared_set, .. } => {
                    let text = key::compact(&mut self.source, &mut self.tables, &self.scope, type_id)?;
                    collected.pending.push(Pending::Key { text, shared: shared_set.then_some(shared) });
                }
                record if record.record_type().is_property_like() => collected.pending.push(Pending::Record(record)),
                record => {
                    self.source.push_back(Fetched { record, start, end, replayed });
                    break;
                }
            }
        }
        Ok(collected)
    }

    fn validate_member(&self, attribute_id: i16) -> Result<()> {
        if self.options.validate_members && self.tables.type_system().is_some() {
            self.tolerate(self.tables.resolve_member(attribute_id))?;
        }
        Ok(())
    }

    fn render(&self, pending: Vec<Pending>, element_type: Option<i16>, depth: usize) -> Result<Vec<BamlNode>> {
        let mut out = Vec::with_capacity(pending.len());
        for item in pending {
            let record = match item {
                Pending::Key { text, shared } => {
                    out.push(self.key_node(text, depth));
                    if let Some(shared) = shared {
                        out.push(self.shared_node(shared, depth));
                    }
                    continue;
                }
                Pending::Record(record) => record,
            };
            out.push(self.render_property(record, element_type, depth)?);
        }
        Ok(out)
    }

    fn render_property(&self, record: Record, element_type: Option<i16>, depth: usize) -> Result<BamlNode> {
        let names = Names::new(&self.tables, &self.scope);
        let (attribute_id, value, converter) = match record {
            Record::XmlnsProperty { prefix, namespace, .. } => {
                let mut node = self.new_node(NodeType::XmlnsProperty, depth);
                node.name = if prefix.is_empty() { "xmlns".to_string() } else { format!("xmlns:{prefix}") };
                node.prefix = "xmlns".to_string();
                node.local_name = prefix;
                node.value = Some(namespace);
                return Ok(node);
            }
            Record::DefAttribute { value, name_id } => {
                let local = self.tables.string(name_id)?.to_string();
                return Ok(self.directive_node(NodeType::DefAttribute, XAML_URI, local, value, depth));
            }
            Record::PresentationOptionsAttribute { value, name_id } => {
                let local = self.tables.string(name_id)?.to_string();
                return Ok(self.directive_node(
                    NodeType::PresentationOptions,
                    PRESENTATION_OPTIONS_URI,
                    local,
                    value,
                    depth,
                ));
            }
            Record::Property { attribute_id, value } => (attribute_id, literal_attribute(value), None),
            Record::PropertyWithConverter { attribute_id, value, converter_type_id } => {
                let converter = names.type_name(converter_type_id)?.local;
                (attribute_id, literal_attribute(value), Some(converter))
            }
            Record::PropertyStringReference { attribute_id, string_id } => {
                (attribute_id, literal_attribute(self.tables.string(string_id)?.to_string()), None)
            }
            Record::PropertyTypeReference { attribute_id, type_id } => {
                (attribute_id, names.type_reference(type_id)?, None)
            }
            Record::PropertyWithExtension { attribute_id, extension, value_id } => {
                (attribute_id, names.extension_value(extension, value_id)?, None)
            }
            Record::PropertyWithStaticResourceId { attribute_id, static_resource_id } => {
                (attribute_id, self.optimized_resource(&names, static_resource_id)?, None)
            }
            other => return Err(Error::unexpected(other.record_type(), "in a property list")),
        };
        self.validate_member(attribute_id)?;
        let member = names.member(attribute_id, element_type)?;
        let mut node = self.new_node(NodeType::Property, depth);
        node.name = member.name.clone();
        node.local_name = member.local.clone();
        node.value = Some(value);
        node.converter = converter;
        apply_owner(&mut node, &member);
        Ok(node)
    }

    fn directive_node(&self, kind: NodeType, uri: &str, local: String, value: String, depth: usize) -> BamlNode {
        let (name, prefix) = Names::new(&self.tables, &self.scope).directive(uri, &local);
        let mut node = self.new_node(kind, depth);
        node.name = name;
        node.prefix = prefix;
        node.local_name = local;
        node.xml_namespace = uri.to_string();
        node.value = Some(value);
        node
    }

    fn key_node(&self, text: String, depth: usize) -> BamlNode {
        self.directive_node(NodeType::DefAttribute, XAML_URI, "Key".to_string(), text, depth)
    }

    fn shared_node(&self, shared: bool, depth: usize) -> BamlNode {
        let value = if shared { "True" } else { "False" };
        self.directive_node(NodeType::DefAttribute, XAML_URI, "Shared".to_string(), value.to_string(), depth)
    }

    /// Cached content property name of the innermost element.
    pub fn content_property(&self) -> Option<&str> {
        let id = self.stack.iter().rev().find(|f| f.kind == RecordType::ElementStart)?.content_property?;
        self.tables.attribute(id).ok().map(|(_, name)| name)
    }

    // ========================================================================
    // Deferred Content
    // ========================================================================

    /// Scannt die vorgezogenen Keys hinter einem Deferred-Content-Marker.
    fn scan_keys(&mut self, content_size: i32, marker_end: u64) -> Result<()> {
        let content_size = u64::try_from(content_size)
            .map_err(|_| Error::unexpected(RecordType::DeferableContentStart, "negative content size"))?;
        match self.stack.last_mut() {
            Some(owner) if owner.kind == RecordType::ElementStart && !owner.owns_deferred => {
                owner.owns_deferred = true;
            }
            _ => return Err(Error::unexpected(RecordType::DeferableContentStart, "not directly inside an element")),
        }

        let mut keys: VecDeque<KeyInfo> = VecDeque::new();
        let value_region_start = loop {
            let Fetched { record, start, end, replayed } =
                self.source.next()?.ok_or(Error::PrematureEndOfStream)?;
            let (text, value_position, shared) = match record {
                record if record.record_type().is_table() => {
                    self.tables.load(&record)?;
                    continue;
                }
                Record::DefAttributeKeyString { value_id, value_position, shared, shared_set } => {
                    let text = literal_attribute(self.tables.string(value_id)?.to_string());
                    (text, value_position, shared_set.then_some(shared))
                }
                Record::DefAttributeKeyType { type_id, value_position, shared, shared_set, .. } => {
                    let text = Names::new(&self.tables, &self.scope).type_reference(type_id)?;
                    (text, value_position, shared_set.then_some(shared))
                }
                Record::KeyElementStart { type_id, value_position, shared, shared_set, .. } => {
                    let text = key::compact(&mut self.source, &mut self.tables, &self.scope, type_id)?;
                    (text, value_position, shared_set.then_some(shared))
                }
                Record::StaticResourceStart { .. } => {
                    let run = self.capture_run()?;
                    let key = keys.back_mut().ok_or_else(|| {
                        Error::unexpected(RecordType::StaticResourceStart, "resource run before the first key")
                    })?;
                    key.runs.push(run);
                    continue;
                }
                record => {
                    self.source.push_back(Fetched { record, start, end, replayed });
                    break start;
                }
            };
            keys.push_back(KeyInfo { text, value_position, shared, runs: Vec::new() });
        };

        log::debug!(
            "deferred block at byte {marker_end}: {} keys, {content_size} content bytes",
            keys.len()
        );
        self.blocks.push(DeferredBlock {
            depth: self.stack.len(),
            marker_end,
            content_size,
            value_region_start,
            keys,
            active_runs: Vec::new(),
        });
        Ok(())
    }

    /// Liest einen Ressourcen-Run bis zum passenden `StaticResourceEnd`.
    fn capture_run(&mut self) -> Result<Vec<Record>> {
        let mut run = Vec::new();
        let mut nesting = 0usize;
        loop {
            let fetched = self.source.next()?.ok_or(Error::PrematureEndOfStream)?;
            match fetched.record {
                record if record.record_type().is_table() => self.tables.load(&record)?,
                Record::StaticResourceEnd if nesting == 0 => return Ok(run),
                record => {
                    match record.record_type() {
                        RecordType::StaticResourceStart => nesting += 1,
                        RecordType::StaticResourceEnd => nesting -= 1,
                        _ => {}
                    }
                    run.push(record);
                }
            }
        }
    }

    fn match_deferred_key(&mut self, start: u64) -> Option<KeyInfo> {
        let depth = self.stack.len();
        let block = self.blocks.last_mut().filter(|b| b.depth == depth)?;
        let key = block.take_key_at(start);
        if key.is_none() {
            log::warn!("deferred value at byte {start} has no key");
        }
        key
    }

    fn close_block(&mut self, end_start: u64) -> Result<()> {
        let Some(block) = self.blocks.pop() else {
            return Ok(());
        };
        let actual = end_start.saturating_sub(block.marker_end);
        if actual != block.content_size {
            return Err(Error::DeferredContentMismatch { expected: block.content_size, actual });
        }
        if !block.keys.is_empty() {
            log::warn!("{} deferred keys without a value", block.keys.len());
        }
        log::debug!("deferred block closed after {actual} bytes");
        Ok(())
    }

    fn active_run(&self, id: i16) -> Result<&[Record]> {
        let index = usize::try_from(id).map_err(|_| Error::UnknownStaticResource(id))?;
        self.blocks
            .last()
            .and_then(|b| b.active_runs.get(index))
            .map(Vec::as_slice)
            .ok_or(Error::UnknownStaticResource(id))
    }

    /// Spielt einen vorgezogenen Ressourcen-Run anstelle des Haupt-Streams ab.
    fn replay_resource(&mut self, id: i16) -> Result<()> {
        let index = usize::try_from(id).map_err(|_| Error::UnknownStaticResource(id))?;
        let run = self
            .blocks
            .last()
            .and_then(|b| b.active_runs.get(index))
            .ok_or(Error::UnknownStaticResource(id))?;
        self.source.start_replay(run);
        Ok(())
    }

    fn optimized_resource(&self, names: &Names<'_>, id: i16) -> Result<String> {
        match self.active_run(id)? {
            [Record::OptimizedStaticResource { flags, value_id }] => names.optimized_resource(*flags, *value_id),
            _ => Err(Error::unexpected(RecordType::PropertyWithStaticResourceId, "run is not an optimized resource")),
        }
    }

    // ========================================================================
    // Cursor-Zugriff
    // ========================================================================

    fn cursor(&self) -> &BamlNode {
        self.property_cursor.and_then(|i| self.current.properties.get(i)).unwrap_or(&self.current)
    }

    pub fn node_type(&self) -> NodeType {
        self.cursor().node_type
    }

    pub fn name(&self) -> &str {
        &self.cursor().name
    }

    pub fn local_name(&self) -> &str {
        &self.cursor().local_name
    }

    pub fn prefix(&self) -> &str {
        &self.cursor().prefix
    }

    pub fn xml_namespace(&self) -> &str {
        &self.cursor().xml_namespace
    }

    pub fn clr_namespace(&self) -> &str {
        &self.cursor().clr_namespace
    }

    pub fn assembly_name(&self) -> &str {
        &self.cursor().assembly_name
    }

    pub fn value(&self) -> Option<&str> {
        self.cursor().value.as_deref()
    }

    pub fn converter(&self) -> Option<&str> {
        self.cursor().converter.as_deref()
    }

    pub fn connection_id(&self) -> Option<i32> {
        self.cursor().connection_id
    }

    pub fn depth(&self) -> usize {
        self.cursor().depth
    }

    pub fn line_info(&self) -> LineInfo {
        self.cursor().line
    }

    pub fn property_count(&self) -> usize {
        self.current.properties.len()
    }

    pub fn move_to_first_property(&mut self) -> bool {
        if self.current.properties.is_empty() {
            return false;
        }
        self.property_cursor = Some(0);
        true
    }

    pub fn move_to_next_property(&mut self) -> bool {
        let next = self.property_cursor.map_or(0, |i| i + 1);
        if next >= self.current.properties.len() {
            return false;
        }
        self.property_cursor = Some(next);
        true
    }

    /// Zurück vom Property-Cursor zum Element. True wenn der Cursor auf einem Property stand.
    pub fn move_to_element(&mut self) -> bool {
        self.property_cursor.take().is_some()
    }

    /// Current node, including its property buffer.
    pub fn node(&self) -> &BamlNode {
        &self.current
    }

    fn take_node(&mut self) -> BamlNode {
        self.property_cursor = None;
        std::mem::take(&mut self.current)
    }

    pub fn close(&mut self) {
        self.state = ReaderState::Closed;
        self.stack.clear();
        self.blocks.clear();
        self.current = BamlNode::default();
        self.property_cursor = None;
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ReaderState::EndOfFile | ReaderState::Closed)
    }
}

fn apply_owner(node: &mut BamlNode, member: &MemberDisplay) {
    if let Some(owner) = &member.owner {
        node.owner_name = Some(owner.local.clone());
        node.prefix = owner.prefix.clone();
        node.xml_namespace = owner.xml_namespace.clone();
        node.clr_namespace = owner.clr_namespace.clone();
        node.assembly_name = owner.assembly.clone();
    }
}

#[cfg(test)]
mod tests;
