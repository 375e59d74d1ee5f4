//! BAML Encoder.
//!
//! [`BamlWriter`] nimmt vorgeparste [`MarkupNode`]s entgegen und schreibt den
//! Record-Stream. Tabellen-Einträge werden beim ersten Gebrauch interniert
//! und ihr Info-Record direkt vor dem ersten Verweis geschrieben.
//!
//! Dictionaries mit Deferred Content werden gepuffert: Keys landen vor den
//! Werten, Werte-Offsets und Inhaltsgröße werden beim Schließen gepatcht.
//!
//! ```
//! use baml::encoder::{EncoderConfig, encode};
//! use baml::namespaces::PRESENTATION_URI;
//! use baml::node::MarkupNode;
//!
//! let nodes = [
//!     MarkupNode::DocumentStart,
//!     MarkupNode::element(PRESENTATION_URI, "Button"),
//!     MarkupNode::property("Width", "20"),
//!     MarkupNode::ElementEnd,
//!     MarkupNode::DocumentEnd,
//! ];
//! let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
//! assert!(bytes.len() > 20);
//! ```

mod config;
mod deferred;
#[cfg(test)]
mod tests;

pub use config::EncoderConfig;

use std::io::Write;
use std::rc::Rc;

use crate::bytestream::ByteWriter;
use crate::error::LineInfo;
use crate::extension::{
    self, Argument, AttributeText, BracketCharacters, ExtensionResolver, KnownExtension, ParsedExtension,
};
use crate::header::{self, BamlHeader};
use crate::known::{EXTENSION_SUFFIX, known};
use crate::map_table::{Converter, MapTable};
use crate::namespaces::{NamespaceScope, PRESENTATION_URI, XAML_URI, parse_clr_namespace, split_qualified};
use crate::node::{MarkupNode, MemberName, XamlName};
use crate::record::{
    AttributeUsage, EXTENSION_VALUE_STATIC, EXTENSION_VALUE_TYPE, Record, RecordType, STATIC_RESOURCE_STATIC,
    STATIC_RESOURCE_TYPE,
};
use crate::reflect::{TypeKind, TypeRef, TypeSystem};
use crate::{Error, Result};

use deferred::{Capture, CaptureKind, KeyForm, KeySlot, Region, Sink};

/// Kodiert eine komplette Knotenliste.
pub fn encode(nodes: &[MarkupNode], config: &EncoderConfig) -> Result<Vec<u8>> {
    encode_with(nodes, config, None)
}

/// Kodiert mit optionalem Host-Type-System.
pub fn encode_with(
    nodes: &[MarkupNode],
    config: &EncoderConfig,
    host: Option<Rc<dyn TypeSystem>>,
) -> Result<Vec<u8>> {
    let mut writer = BamlWriter::new(*config);
    if let Some(host) = host {
        writer = writer.with_type_system(host);
    }
    for node in nodes {
        writer.write_node(node)?;
    }
    writer.finish()
}

/// Kodiert Knoten mit Quellposition.
///
/// Jede Position wird vor ihrem Knoten gesetzt; mit `debug_info` entstehen
/// daraus Zeilen-Records. Positionen mit Zeile 0 gelten als unbekannt.
pub fn encode_positioned(nodes: &[(MarkupNode, LineInfo)], config: &EncoderConfig) -> Result<Vec<u8>> {
    let mut writer = BamlWriter::new(*config);
    for (node, line) in nodes {
        writer.set_line(*line);
        writer.write_node(node)?;
    }
    writer.finish()
}

// ============================================================================
// Scopes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Document,
    Element,
    Property,
    Constructor,
    /// Compiled key subtree being captured.
    Key,
}

struct Frame {
    kind: FrameKind,
    opening: RecordType,
    closing: Record,
    type_id: Option<i16>,
    /// Attribute phase is over.
    content_started: bool,
    /// Element pushed a [`Region`] for its content.
    owns_region: bool,
    /// Dictionary value: (sink index of the region, key slot).
    value_slot: Option<(usize, usize)>,
    /// Root of a key subtree; closes with `KeyElementEnd`.
    key_root: bool,
    /// Static resource element whose body goes into a run.
    run_capture: bool,
    /// Value of the type's dictionary key property, seen as an attribute.
    implicit_key: Option<String>,
    dictionary_key_property: Option<String>,
}

impl Frame {
    fn new(kind: FrameKind, opening: RecordType, closing: Record) -> Self {
        Self {
            kind,
            opening,
            closing,
            type_id: None,
            content_started: false,
            owns_region: false,
            value_slot: None,
            key_root: false,
            run_capture: false,
            implicit_key: None,
            dictionary_key_property: None,
        }
    }

    fn element(type_id: i16) -> Self {
        Self { type_id: Some(type_id), ..Self::new(FrameKind::Element, RecordType::ElementStart, Record::ElementEnd) }
    }
}

/// Destination buffer of the next record.
#[derive(Debug, Clone, Copy)]
enum Target {
    Main,
    Values(usize),
    Tables(usize),
    Capture(usize),
}

/// Argument of an optimized resource reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceValue {
    Text,
    Type,
    Static,
}

// ============================================================================
// Writer
// ============================================================================

/// Streaming encoder.
///
/// Records außerhalb von Deferred-Blöcken können jederzeit per
/// [`flush_to`](Self::flush_to) abgegeben werden.
pub struct BamlWriter {
    out: ByteWriter,
    tables: MapTable,
    scope: NamespaceScope,
    config: EncoderConfig,
    brackets: BracketCharacters,
    stack: Vec<Frame>,
    sinks: Vec<Sink>,
    /// Xmlns nodes seen before their element.
    pending_xmlns: Vec<(String, String)>,
    line: LineInfo,
    last_line: LineInfo,
}

impl BamlWriter {
    /// Creates a writer and emits the version header.
    pub fn new(config: EncoderConfig) -> Self {
        let mut out = ByteWriter::new();
        header::encode(&mut out, &BamlHeader::default());
        let mut tables = MapTable::new();
        tables.set_compile_only(config.compile_only);
        Self {
            out,
            tables,
            scope: NamespaceScope::new(),
            config,
            brackets: BracketCharacters::new(),
            stack: Vec::new(),
            sinks: Vec::new(),
            pending_xmlns: Vec::new(),
            line: LineInfo::default(),
            last_line: LineInfo::default(),
        }
    }

    pub fn with_type_system(mut self, host: Rc<dyn TypeSystem>) -> Self {
        self.tables = self.tables.with_type_system(host);
        self
    }

    /// Übernimmt vorhandene Tabellen, z. B. für mehrere Streams eines Builds.
    pub fn with_tables(mut self, mut tables: MapTable) -> Self {
        tables.set_compile_only(self.config.compile_only);
        self.tables = tables;
        self
    }

    pub fn with_brackets(mut self, brackets: BracketCharacters) -> Self {
        self.brackets = brackets;
        self
    }

    /// Source position of the next node, used for debug records and errors.
    pub fn set_line(&mut self, line: LineInfo) {
        self.line = line;
    }

    pub fn tables(&self) -> &MapTable {
        &self.tables
    }

    pub fn into_tables(self) -> MapTable {
        self.tables
    }

    /// Schreibt einen Knoten.
    ///
    /// Fehler tragen Zeile und Byte-Offset des Haupt-Streams.
    pub fn write_node(&mut self, node: &MarkupNode) -> Result<()> {
        self.write_inner(node).map_err(|e| e.at(self.line, self.out.position()))
    }

    /// Finished bytes not yet handed out by [`flush_to`](Self::flush_to).
    pub fn buffered_len(&self) -> usize {
        self.out.buffered_len()
    }

    /// Gibt die fertigen Bytes des Haupt-Streams an `sink` ab.
    pub fn flush_to(&mut self, sink: &mut impl Write) -> Result<()> {
        self.out.drain_to(sink)
    }

    /// Schließt den Stream; liefert die noch nicht abgegebenen Bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        if let Some(open) = self.stack.last() {
            return Err(Error::UnclosedScope(open.opening));
        }
        Ok(self.out.into_vec())
    }

    fn write_inner(&mut self, node: &MarkupNode) -> Result<()> {
        match node {
            MarkupNode::DocumentStart => {
                if !self.stack.is_empty() {
                    return Err(Error::invalid_sequence("nested document start"));
                }
                self.emit(&Record::DocumentStart {
                    load_async: false,
                    max_async_records: -1,
                    debug_baml: self.config.debug_info,
                });
                self.scope.push_scope();
                self.stack.push(Frame::new(FrameKind::Document, RecordType::DocumentStart, Record::DocumentEnd));
            }
            MarkupNode::DocumentEnd => {
                let frame = self.pop(FrameKind::Document)?;
                self.scope.pop_scope();
                self.pending_xmlns.clear();
                self.emit(&frame.closing);
            }
            MarkupNode::ElementStart(name) => self.start_element(name)?,
            MarkupNode::ElementEnd => self.end_element()?,
            MarkupNode::Xmlns { prefix, namespace } => self.xmlns(prefix, namespace)?,
            MarkupNode::PiMapping { xml_namespace, clr_namespace, assembly } => {
                self.scope.add_mapping(xml_namespace, clr_namespace, Some(assembly.as_str()).filter(|a| !a.is_empty()));
                let assembly_id = self.intern_component(assembly)?;
                self.emit(&Record::PiMapping {
                    xml_namespace: xml_namespace.clone(),
                    clr_namespace: clr_namespace.clone(),
                    assembly_id,
                });
            }
            MarkupNode::Property { member, value } => self.property(member, value)?,
            MarkupNode::DefAttribute { name, value } => self.def_attribute(name, value)?,
            MarkupNode::PresentationOptions { name, value } => {
                self.attribute_phase()?;
                let name_id = self.intern_string(name)?;
                self.emit(&Record::PresentationOptionsAttribute { value: value.clone(), name_id });
            }
            MarkupNode::ConnectionId(connection_id) => {
                self.attribute_phase()?;
                self.emit(&Record::ConnectionId { connection_id: *connection_id });
            }
            MarkupNode::PropertyElementStart(member) => self.start_property_element(member)?,
            MarkupNode::PropertyElementEnd => {
                let frame = self.pop(FrameKind::Property)?;
                self.emit(&frame.closing);
            }
            MarkupNode::ConstructorArgsStart => {
                self.begin_content()?;
                self.emit(&Record::ConstructorParametersStart);
                self.stack.push(Frame::new(
                    FrameKind::Constructor,
                    RecordType::ConstructorParametersStart,
                    Record::ConstructorParametersEnd,
                ));
            }
            MarkupNode::ConstructorArgsEnd => {
                let frame = self.pop(FrameKind::Constructor)?;
                self.emit(&frame.closing);
            }
            MarkupNode::Text(text) => self.text(text)?,
            MarkupNode::LiteralContent(text) => {
                self.begin_content()?;
                self.emit(&Record::LiteralContent {
                    value: text.clone(),
                    line_number: i32::try_from(self.line.line).unwrap_or_default(),
                    line_position: i32::try_from(self.line.position).unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Elements
    // ========================================================================

    fn start_element(&mut self, name: &XamlName) -> Result<()> {
        if self.stack.is_empty() {
            return Err(Error::invalid_sequence("element outside the document"));
        }
        self.begin_content()?;
        let type_id = self.resolve_element(name)?;
        let descriptor = self.tables.resolve_type(type_id)?;

        let value_level = self.at_value_level();
        let key_root = self.stack.last().is_some_and(|f| f.kind == FrameKind::Key);
        let run_capture = self.starts_run(type_id, value_level);

        let mut frame = Frame::element(type_id);
        frame.dictionary_key_property = descriptor.as_ref().and_then(|d| d.dictionary_key_property.clone());
        if value_level {
            let index = self.sinks.len() - 1;
            if let Some(Sink::Region(region)) = self.sinks.last_mut() {
                frame.value_slot = Some((index, region.begin_value()));
            }
        }

        if key_root {
            if let Some(Sink::Capture(capture)) = self.sinks.last_mut() {
                capture.root = Some(type_id);
            }
            frame.key_root = true;
        } else {
            self.emit(&Record::ElementStart { type_id, flags: 0 });
        }
        if run_capture {
            self.sinks.push(Sink::Capture(Capture::new(CaptureKind::Run)));
            frame.run_capture = true;
        }
        self.stack.push(frame);
        self.scope.push_scope();
        for (prefix, namespace) in std::mem::take(&mut self.pending_xmlns) {
            self.xmlns_record(&prefix, &namespace)?;
        }

        if self.config.defer_dictionaries && descriptor.is_some_and(|d| d.defers_content) {
            let owner = self.stack.len() - 1;
            self.sinks.push(Sink::Region(Region::new(owner)));
            if let Some(top) = self.stack.last_mut() {
                top.owns_region = true;
            }
            log::trace!("deferred region opened for type {type_id}");
        }
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        let frame = self.pop(FrameKind::Element)?;
        self.scope.pop_scope();

        if frame.owns_region {
            let region = match self.sinks.pop() {
                Some(Sink::Region(region)) if region.owner == self.stack.len() => region,
                _ => return Err(Error::invalid_sequence("deferred region closed out of order")),
            };
            let target = self.target();
            region.finish(self.buffer(target))?;
        }
        if frame.run_capture {
            let capture = match self.sinks.pop() {
                Some(Sink::Capture(capture)) if capture.kind == CaptureKind::Run => capture,
                _ => return Err(Error::invalid_sequence("resource run closed out of order")),
            };
            let mut run = ByteWriter::new();
            Record::StaticResourceStart { type_id: frame.type_id.unwrap_or_default(), flags: 0 }.write(&mut run);
            run.write_bytes(capture.bytes.bytes());
            Record::StaticResourceEnd.write(&mut run);
            let static_resource_id = self.value_key()?.push_run(run)?;
            self.emit(&Record::StaticResourceId { static_resource_id });
        }

        if frame.key_root {
            self.emit(&Record::KeyElementEnd);
        } else {
            self.emit(&Record::ElementEnd);
        }

        if let Some((region, slot)) = frame.value_slot
            && let Some(text) = frame.implicit_key
            && !self.slot(region, slot)?.is_filled()
        {
            self.fill_key((region, slot), &text, true)?;
        }
        Ok(())
    }

    /// Value-level position: directly inside a deferring dictionary.
    fn at_value_level(&self) -> bool {
        self.stack.last().is_some_and(|f| f.kind == FrameKind::Element && f.owns_region)
    }

    /// Static resource element inside a deferred value, not yet captured.
    fn starts_run(&self, type_id: i16, value_level: bool) -> bool {
        !value_level
            && KnownExtension::from_type_id(type_id) == Some(KnownExtension::StaticResource)
            && self.in_deferred_value()
    }

    fn in_deferred_value(&self) -> bool {
        matches!(self.sinks.last(), Some(Sink::Region(r)) if r.in_content)
    }

    /// Marks the end of the attribute phase; announces the content property.
    fn begin_content(&mut self) -> Result<()> {
        let Some(top) = self.stack.last_mut() else {
            return Err(Error::invalid_sequence("content outside the document"));
        };
        let first = top.kind == FrameKind::Element && !top.content_started;
        top.content_started = true;
        if !first {
            return Ok(());
        }
        let Some(type_id) = top.type_id else {
            return Ok(());
        };
        if let Some(descriptor) = self.tables.resolve_type(type_id)?
            && let Some(name) = &descriptor.content_property
        {
            let attribute_id = self.member_on(type_id, name, false)?;
            self.emit(&Record::ContentProperty { attribute_id });
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if self.at_value_level() {
            return Err(Error::invalid_sequence("text directly inside a deferred dictionary"));
        }
        self.begin_content()?;
        if self.in_type_arguments()
            && let Ok(type_id) = self.resolve_written_type(text)
        {
            self.emit(&Record::ConstructorParameterType { type_id });
            return Ok(());
        }
        self.emit(&Record::Text { value: text.to_string() });
        Ok(())
    }

    /// Constructor arguments of an `x:Type` element.
    fn in_type_arguments(&self) -> bool {
        match self.stack.as_slice() {
            [.., owner, args] => {
                args.kind == FrameKind::Constructor && owner.type_id.is_some() && owner.type_id == KnownExtension::Type.type_id()
            }
            _ => false,
        }
    }

    fn pop(&mut self, kind: FrameKind) -> Result<Frame> {
        match self.stack.pop() {
            Some(frame) if frame.kind == kind => Ok(frame),
            Some(frame) => Err(Error::invalid_sequence(format!("{kind:?} end inside an open {:?}", frame.kind))),
            None => Err(Error::invalid_sequence(format!("{kind:?} end without a start"))),
        }
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Type of the element whose attribute list is open.
    fn attribute_phase(&self) -> Result<i16> {
        match self.stack.last() {
            Some(f) if f.kind == FrameKind::Element && !f.content_started => {
                f.type_id.ok_or_else(|| Error::invalid_sequence("element without type"))
            }
            Some(f) if f.kind == FrameKind::Element => Err(Error::invalid_sequence("attribute after element content")),
            _ => Err(Error::invalid_sequence("attribute outside an element")),
        }
    }

    fn xmlns(&mut self, prefix: &str, namespace: &str) -> Result<()> {
        match self.stack.last() {
            Some(f) if f.kind == FrameKind::Element && !f.content_started => self.xmlns_record(prefix, namespace),
            _ => {
                self.pending_xmlns.push((prefix.to_string(), namespace.to_string()));
                Ok(())
            }
        }
    }

    fn xmlns_record(&mut self, prefix: &str, namespace: &str) -> Result<()> {
        self.scope.declare(prefix, namespace);
        let mut assembly_ids = Vec::new();
        if let Some(mapping) = parse_clr_namespace(namespace)
            && let Some(assembly) = mapping.assembly
        {
            assembly_ids.push(self.intern_component(&assembly)?);
        }
        self.emit(&Record::XmlnsProperty { prefix: prefix.to_string(), namespace: namespace.to_string(), assembly_ids });
        Ok(())
    }

    fn def_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        self.attribute_phase()?;
        let value_slot = self.stack.last().and_then(|f| f.value_slot);
        match (name, value_slot) {
            ("Key", Some(slot)) => self.fill_key(slot, value, false),
            ("Shared", Some((region, slot))) => {
                let shared = if value.eq_ignore_ascii_case("true") {
                    true
                } else if value.eq_ignore_ascii_case("false") {
                    false
                } else {
                    return Err(Error::invalid_sequence(format!("x:Shared expects True or False, got '{value}'")));
                };
                self.slot(region, slot)?.shared = Some(shared);
                Ok(())
            }
            _ => {
                let name_id = self.intern_string(name)?;
                self.emit(&Record::DefAttribute { value: value.to_string(), name_id });
                Ok(())
            }
        }
    }

    fn property(&mut self, member: &MemberName, value: &str) -> Result<()> {
        let element_type = self.attribute_phase()?;
        let attribute_id = self.resolve_member(member, Some(element_type))?;
        if let Some(top) = self.stack.last_mut()
            && top.value_slot.is_some()
            && member.owner.is_none()
            && top.dictionary_key_property.as_deref() == Some(member.name.as_str())
        {
            top.implicit_key = Some(value.to_string());
        }

        match extension::parse(value, &self.brackets, self.line)? {
            AttributeText::Literal(text) => self.literal_property(attribute_id, text),
            AttributeText::Extension(ext) => {
                if self.config.optimize_extensions && self.optimized_property(attribute_id, &ext)? {
                    return Ok(());
                }
                self.compiled_property(attribute_id, &ext)
            }
        }
    }

    fn literal_property(&mut self, attribute_id: i16, value: String) -> Result<()> {
        let record = match self.tables.property_converter(attribute_id)? {
            Some(Converter::Known(converter_type_id)) => {
                Record::PropertyWithConverter { attribute_id, value, converter_type_id }
            }
            Some(Converter::Host(converter)) => {
                let converter_type_id = self.intern_type_ref(&converter, false, None)?;
                Record::PropertyWithConverter { attribute_id, value, converter_type_id }
            }
            _ => match self.tables.find_string(&value) {
                Some(string_id) => Record::PropertyStringReference { attribute_id, string_id },
                None => Record::Property { attribute_id, value },
            },
        };
        self.emit(&record);
        Ok(())
    }

    /// Scalar form of a built-in extension; `false` if it does not apply.
    fn optimized_property(&mut self, attribute_id: i16, ext: &ParsedExtension) -> Result<bool> {
        let Some(kind) = self.extension_kind(ext) else {
            return Ok(false);
        };
        let (Some(argument), Some(wire)) = (ext.single_argument(kind.parameter()), kind.wire_id()) else {
            return Ok(false);
        };
        match (kind, argument) {
            (KnownExtension::Type, Argument::Text(name)) => {
                let type_id = self.resolve_written_type(name)?;
                self.emit(&Record::PropertyTypeReference { attribute_id, type_id });
            }
            (KnownExtension::Static, Argument::Text(path)) => {
                let Some(value_id) = self.static_member(path)? else {
                    return Ok(false);
                };
                self.emit(&Record::PropertyWithExtension { attribute_id, extension: wire, value_id });
            }
            (KnownExtension::TemplateBinding, Argument::Text(name)) => {
                let Some(value_id) = self.template_member(name)? else {
                    return Ok(false);
                };
                self.emit(&Record::PropertyWithExtension { attribute_id, extension: wire, value_id });
            }
            (KnownExtension::StaticResource | KnownExtension::DynamicResource, argument) => {
                let Some((form, value_id)) = self.resource_argument(argument)? else {
                    return Ok(false);
                };
                if kind == KnownExtension::StaticResource && self.in_deferred_value() {
                    let flags = match form {
                        ResourceValue::Text => 0,
                        ResourceValue::Type => STATIC_RESOURCE_TYPE,
                        ResourceValue::Static => STATIC_RESOURCE_STATIC,
                    };
                    let mut run = ByteWriter::new();
                    Record::StaticResourceStart { type_id: kind.type_id().unwrap_or_default(), flags: 0 }
                        .write(&mut run);
                    Record::OptimizedStaticResource { flags, value_id }.write(&mut run);
                    Record::StaticResourceEnd.write(&mut run);
                    let static_resource_id = self.value_key()?.push_run(run)?;
                    self.emit(&Record::PropertyWithStaticResourceId { attribute_id, static_resource_id });
                } else {
                    let extension = wire
                        | match form {
                            ResourceValue::Text => 0,
                            ResourceValue::Type => EXTENSION_VALUE_TYPE,
                            ResourceValue::Static => EXTENSION_VALUE_STATIC,
                        };
                    self.emit(&Record::PropertyWithExtension { attribute_id, extension, value_id });
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Schreibt die Extension als Element-Teilbaum unter `PropertyComplexStart`.
    fn compiled_property(&mut self, attribute_id: i16, ext: &ParsedExtension) -> Result<()> {
        let nodes = self.compile(ext)?;
        self.emit(&Record::PropertyComplexStart { attribute_id });
        self.stack.push(Frame::new(FrameKind::Property, RecordType::PropertyComplexStart, Record::PropertyComplexEnd));
        for node in &nodes {
            self.write_inner(node)?;
        }
        let frame = self.pop(FrameKind::Property)?;
        self.emit(&frame.closing);
        Ok(())
    }

    fn start_property_element(&mut self, member: &MemberName) -> Result<()> {
        let element_type = match self.stack.last() {
            Some(f) if f.kind == FrameKind::Element => f.type_id,
            _ => None,
        }
        .ok_or_else(|| Error::invalid_sequence("property element outside an element"))?;
        if self.in_deferred_value() && self.at_value_level() {
            return Err(Error::invalid_sequence("property element after deferred dictionary values"));
        }
        self.begin_content()?;
        let attribute_id = self.resolve_member(member, Some(element_type))?;
        let (start, end) = match self.property_kind(attribute_id)? {
            TypeKind::Array => (Record::PropertyArrayStart { attribute_id }, Record::PropertyArrayEnd),
            TypeKind::List => (Record::PropertyIListStart { attribute_id }, Record::PropertyIListEnd),
            TypeKind::Dictionary => (Record::PropertyIDictionaryStart { attribute_id }, Record::PropertyIDictionaryEnd),
            _ => (Record::PropertyComplexStart { attribute_id }, Record::PropertyComplexEnd),
        };
        self.emit(&start);
        self.stack.push(Frame::new(FrameKind::Property, start.record_type(), end));
        Ok(())
    }

    fn property_kind(&self, attribute_id: i16) -> Result<TypeKind> {
        let Some(member) = self.tables.resolve_member(attribute_id)? else {
            return Ok(TypeKind::Class);
        };
        let ty = &member.property_type;
        let k = known();
        if let Some(entry) = k.find_full_name(&ty.full_name, None).and_then(|id| k.type_entry(id)) {
            return Ok(entry.kind);
        }
        Ok(self
            .tables
            .type_system()
            .and_then(|host| host.resolve_type(&ty.component, &ty.full_name))
            .map(|d| d.kind)
            .unwrap_or_default())
    }

    // ========================================================================
    // Deferred keys
    // ========================================================================

    fn slot(&mut self, region: usize, slot: usize) -> Result<&mut KeySlot> {
        match self.sinks.get_mut(region) {
            Some(Sink::Region(r)) => r.keys.get_mut(slot),
            _ => None,
        }
        .ok_or_else(|| Error::invalid_sequence("dictionary value without key slot"))
    }

    /// Key slot of the innermost open dictionary value.
    fn value_key(&mut self) -> Result<&mut KeySlot> {
        let (region, slot) = self
            .stack
            .iter()
            .rev()
            .find_map(|f| f.value_slot)
            .ok_or_else(|| Error::invalid_sequence("resource run outside a dictionary value"))?;
        self.slot(region, slot)
    }

    /// Setzt den Key eines Werts aus `x:Key` oder der Key-Property des Typs.
    ///
    /// Implizite Keys sind Typnamen (`TargetType="Button"`).
    fn fill_key(&mut self, (region, slot): (usize, usize), text: &str, implicit: bool) -> Result<()> {
        let form = match extension::parse(text, &self.brackets, self.line)? {
            AttributeText::Literal(name) if implicit => KeyForm::Type { type_id: self.resolve_written_type(&name)? },
            AttributeText::Literal(value) => KeyForm::Text { value_id: self.intern_string(&value)? },
            AttributeText::Extension(ext) => match self.type_argument(&ext)? {
                Some(type_id) => KeyForm::Type { type_id },
                None => self.compile_key(&ext)?,
            },
        };
        self.slot(region, slot)?.form = form;
        Ok(())
    }

    fn compile_key(&mut self, ext: &ParsedExtension) -> Result<KeyForm> {
        let nodes = self.compile(ext)?;
        self.sinks.push(Sink::Capture(Capture::new(CaptureKind::Key)));
        self.stack.push(Frame::new(FrameKind::Key, RecordType::KeyElementStart, Record::KeyElementEnd));
        for node in &nodes {
            self.write_inner(node)?;
        }
        self.pop(FrameKind::Key)?;
        let capture = match self.sinks.pop() {
            Some(Sink::Capture(capture)) if capture.kind == CaptureKind::Key => capture,
            _ => return Err(Error::invalid_sequence("key capture closed out of order")),
        };
        let type_id = capture.root.ok_or_else(|| Error::invalid_sequence("empty key expression"))?;
        Ok(KeyForm::Subtree { type_id, body: capture.bytes })
    }

    // ========================================================================
    // Extension arguments
    // ========================================================================

    fn compile(&self, ext: &ParsedExtension) -> Result<Vec<MarkupNode>> {
        let resolver = Resolver { scope: &self.scope, tables: &self.tables };
        extension::compile(ext, &resolver, &self.brackets, self.line)
    }

    fn extension_kind(&self, ext: &ParsedExtension) -> Option<KnownExtension> {
        let (prefix, local) = split_qualified(&ext.type_name);
        let namespace = namespace_for(&self.scope, prefix).ok()?;
        KnownExtension::from_name(&namespace, local)
    }

    /// Type id of `{x:Type Name}` with a plain argument.
    fn type_argument(&mut self, ext: &ParsedExtension) -> Result<Option<i16>> {
        if self.extension_kind(ext) != Some(KnownExtension::Type) {
            return Ok(None);
        }
        match ext.single_argument(KnownExtension::Type.parameter()) {
            Some(Argument::Text(name)) => self.resolve_written_type(name).map(Some),
            _ => Ok(None),
        }
    }

    fn resource_argument(&mut self, argument: &Argument) -> Result<Option<(ResourceValue, i16)>> {
        let raw = match argument {
            Argument::Text(key) => return Ok(Some((ResourceValue::Text, self.intern_string(key)?))),
            Argument::Nested(raw) => raw,
        };
        let AttributeText::Extension(inner) = extension::parse(raw, &self.brackets, self.line)? else {
            return Ok(None);
        };
        if let Some(type_id) = self.type_argument(&inner)? {
            return Ok(Some((ResourceValue::Type, type_id)));
        }
        if self.extension_kind(&inner) == Some(KnownExtension::Static)
            && let Some(Argument::Text(path)) = inner.single_argument(KnownExtension::Static.parameter())
            && let Some(member_id) = self.static_member(path)?
        {
            return Ok(Some((ResourceValue::Static, member_id)));
        }
        Ok(None)
    }

    /// `Owner.Member` of an `x:Static` reference.
    fn static_member(&mut self, path: &str) -> Result<Option<i16>> {
        let Some((owner, name)) = path.rsplit_once('.') else {
            return Ok(None);
        };
        let owner_id = self.resolve_written_type(owner)?;
        self.member_on(owner_id, name, false).map(Some)
    }

    fn template_member(&mut self, name: &str) -> Result<Option<i16>> {
        if name.contains('.') {
            return self.static_member(name);
        }
        let k = known();
        Ok(k.type_id("Control").and_then(|control| k.find_member(control, name)))
    }

    // ========================================================================
    // Names and tables
    // ========================================================================

    fn resolve_element(&mut self, name: &XamlName) -> Result<i16> {
        let k = known();
        if let Some(id) = k.find_xml_type(&name.namespace, &name.local) {
            return Ok(id);
        }
        if let Some(id) = k.find_xml_extension(&name.namespace, &name.local) {
            return Ok(id);
        }
        if let Some(host) = self.tables.type_system().cloned() {
            let found = host.resolve_xml_type(&name.namespace, &name.local).or_else(|| {
                host.resolve_xml_type(&name.namespace, &format!("{}{EXTENSION_SUFFIX}", name.local))
            });
            if let Some(descriptor) = found {
                let serializer = match &descriptor.serializer {
                    Some(serializer) => Some(self.intern_type_ref(serializer, false, None)?),
                    None => None,
                };
                return self.intern_type_ref(&descriptor.type_ref, descriptor.is_internal, serializer);
            }
        }
        if let Some(mapping) = self.scope.clr_for(&name.namespace) {
            let full_name = if mapping.clr_namespace.is_empty() {
                name.local.clone()
            } else {
                format!("{}.{}", mapping.clr_namespace, name.local)
            };
            let component = mapping.assembly.unwrap_or_default();
            return self.intern_type_ref(&TypeRef::new(component, full_name), false, None);
        }
        Err(Error::UnresolvedType(format!("{{{}}}{}", name.namespace, name.local)))
    }

    /// Type written as `prefix:Name` in attribute text.
    fn resolve_written_type(&mut self, written: &str) -> Result<i16> {
        let (prefix, local) = split_qualified(written.trim());
        let namespace = namespace_for(&self.scope, prefix)?;
        self.resolve_element(&XamlName::new(namespace, local))
    }

    fn resolve_member(&mut self, member: &MemberName, element_type: Option<i16>) -> Result<i16> {
        let (owner_id, name) = match &member.owner {
            Some(owner) => (self.resolve_element(owner)?, member.name.as_str()),
            None => match member.name.rsplit_once('.') {
                Some((owner, name)) => (self.resolve_written_type(owner)?, name),
                None => (
                    element_type.ok_or_else(|| Error::invalid_sequence("member without owner"))?,
                    member.name.as_str(),
                ),
            },
        };
        self.member_on(owner_id, name, true)
    }

    /// Attribute id of `name` on `owner_id`.
    ///
    /// With `strict`, a host that knows the owner but not the member is an error.
    fn member_on(&mut self, owner_id: i16, name: &str, strict: bool) -> Result<i16> {
        if let Some(id) = known().find_member(owner_id, name) {
            return Ok(id);
        }
        if let Some(host) = self.tables.type_system().cloned()
            && let Some(owner) = self.tables.resolve_type(owner_id)?
        {
            match host.get_member(&owner, name) {
                Some(member) => {
                    let declaring = self.intern_type_ref(&member.owner, false, None)?;
                    return self.intern_attribute(declaring, name);
                }
                None if strict => {
                    return Err(Error::UnresolvedMember {
                        owner: owner.type_ref.full_name.clone(),
                        member: name.to_string(),
                    });
                }
                None => {}
            }
        }
        self.intern_attribute(owner_id, name)
    }

    fn intern_component(&mut self, name: &str) -> Result<i16> {
        let interned = self.tables.intern_component(name)?;
        if interned.is_new {
            let info = self.tables.component_info(interned.id)?;
            self.emit_table(&info);
        }
        Ok(interned.id)
    }

    fn intern_type_ref(&mut self, type_ref: &TypeRef, is_internal: bool, serializer: Option<i16>) -> Result<i16> {
        let component_id = self.intern_component(&type_ref.component)?;
        let interned = self.tables.intern_type(component_id, &type_ref.full_name, is_internal, serializer)?;
        if interned.is_new {
            let info = self.tables.type_info(interned.id)?;
            self.emit_table(&info);
        }
        Ok(interned.id)
    }

    fn intern_attribute(&mut self, owner_id: i16, name: &str) -> Result<i16> {
        let interned = self.tables.intern_attribute(owner_id, name, AttributeUsage::Default)?;
        if interned.is_new {
            let info = self.tables.attribute_info(interned.id)?;
            self.emit_table(&info);
        }
        Ok(interned.id)
    }

    fn intern_string(&mut self, text: &str) -> Result<i16> {
        let interned = self.tables.intern_string(text)?;
        if interned.is_new {
            let info = self.tables.string_info(interned.id)?;
            self.emit_table(&info);
        }
        Ok(interned.id)
    }

    // ========================================================================
    // Output routing
    // ========================================================================

    /// Innermost capture, else the innermost region that is in its value phase.
    fn target(&self) -> Target {
        for (index, sink) in self.sinks.iter().enumerate().rev() {
            match sink {
                Sink::Capture(_) => return Target::Capture(index),
                Sink::Region(r) if r.in_content => return Target::Values(index),
                Sink::Region(_) => {}
            }
        }
        Target::Main
    }

    /// Table records go in front of the outermost open deferred block.
    fn table_target(&self) -> Target {
        let outermost = self.sinks.iter().enumerate().find_map(|(index, sink)| match sink {
            Sink::Region(r) => Some((index, r.in_content)),
            Sink::Capture(_) => None,
        });
        match outermost {
            Some((index, true)) => Target::Tables(index),
            _ => self.target(),
        }
    }

    fn buffer(&mut self, target: Target) -> &mut ByteWriter {
        let index = match target {
            Target::Main => return &mut self.out,
            Target::Values(i) | Target::Tables(i) | Target::Capture(i) => i,
        };
        match (target, self.sinks.get_mut(index)) {
            (Target::Values(_), Some(Sink::Region(r))) => &mut r.values,
            (Target::Tables(_), Some(Sink::Region(r))) => &mut r.tables,
            (Target::Capture(_), Some(Sink::Capture(c))) => &mut c.bytes,
            _ => &mut self.out,
        }
    }

    fn emit(&mut self, record: &Record) {
        let line = self.line_record(record.record_type());
        let target = self.target();
        let w = self.buffer(target);
        record.write(w);
        if let Some(line) = line {
            line.write(w);
        }
    }

    fn emit_table(&mut self, record: &Record) {
        let target = self.table_target();
        record.write(self.buffer(target));
    }

    /// Debug record following `kind`, if the source position moved.
    fn line_record(&mut self, kind: RecordType) -> Option<Record> {
        if !self.config.debug_info || !kind.is_debug_tracked() || !self.line.is_known() || self.line == self.last_line {
            return None;
        }
        let record = if self.line.line == self.last_line.line {
            Record::LinePosition { position: self.line.position }
        } else {
            Record::LineNumberAndPosition { line: self.line.line, position: self.line.position }
        };
        self.last_line = self.line;
        Some(record)
    }
}

/// Namespace of a written prefix; `x` and the empty prefix have defaults.
fn namespace_for(scope: &NamespaceScope, prefix: &str) -> Result<String> {
    match scope.lookup_namespace(prefix) {
        Some(namespace) => Ok(namespace.to_string()),
        None if prefix.is_empty() => Ok(PRESENTATION_URI.to_string()),
        None if prefix == "x" => Ok(XAML_URI.to_string()),
        None => Err(Error::UnresolvedPrefix(prefix.to_string())),
    }
}

// ============================================================================
// Extension resolver
// ============================================================================

struct Resolver<'a> {
    scope: &'a NamespaceScope,
    tables: &'a MapTable,
}

impl ExtensionResolver for Resolver<'_> {
    fn resolve_extension(&self, written: &str) -> Result<XamlName> {
        let (prefix, local) = split_qualified(written);
        let namespace = namespace_for(self.scope, prefix)?;
        let k = known();
        if let Some(entry) = k.find_xml_extension(&namespace, local).and_then(|id| k.type_entry(id)) {
            return Ok(XamlName::new(namespace, entry.name));
        }
        if let Some(host) = self.tables.type_system()
            && !local.ends_with(EXTENSION_SUFFIX)
        {
            let long = format!("{local}{EXTENSION_SUFFIX}");
            if host.resolve_xml_type(&namespace, &long).is_some() {
                return Ok(XamlName::new(namespace, long));
            }
        }
        Ok(XamlName::new(namespace, local))
    }

    fn constructor_arities(&self, name: &XamlName) -> Vec<usize> {
        let k = known();
        if let Some(entry) = k.find_xml_type(&name.namespace, &name.local).and_then(|id| k.type_entry(id)) {
            return entry.constructor_arities.to_vec();
        }
        self.tables
            .type_system()
            .and_then(|host| host.resolve_xml_type(&name.namespace, &name.local))
            .map(|d| d.constructor_arities.clone())
            .unwrap_or_default()
    }
}
