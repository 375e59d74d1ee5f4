//! Verdichtung eines Key-Teilbaums zu Extension-Text.
//!
//! `KeyElementStart ... KeyElementEnd` wird als isolierter Teil-Parse
//! gelesen. Jede offene Element-Ebene hat einen eigenen Frame; Konstruktor-
//! Argumente und benannte Argumente werden getrennt gesammelt, damit die
//! Ausgabe immer `{T pos.., name=value..}` lautet.

use std::io::Read;

use super::names::Names;
use super::stream::RecordSource;
use crate::extension::argument_text;
use crate::map_table::MapTable;
use crate::namespaces::NamespaceScope;
use crate::record::{Record, RecordType};
use crate::{Error, Result};

#[derive(Debug)]
struct Frame {
    type_id: i16,
    type_name: String,
    in_ctor: bool,
    ctor: Vec<String>,
    named: Vec<String>,
    /// Named argument whose value is the next child element.
    pending_property: Option<String>,
}

impl Frame {
    fn new(type_id: i16, type_name: String) -> Self {
        Self { type_id, type_name, in_ctor: false, ctor: Vec::new(), named: Vec::new(), pending_property: None }
    }

    fn finish(self) -> String {
        let mut out = String::with_capacity(self.type_name.len() + 16);
        out.push('{');
        out.push_str(&self.type_name);
        for (i, item) in self.ctor.iter().chain(self.named.iter()).enumerate() {
            out.push_str(if i == 0 { " " } else { ", " });
            out.push_str(item);
        }
        out.push('}');
        out
    }

    /// Attaches the text of a closed child element.
    fn add_child(&mut self, text: String) {
        match &self.pending_property {
            Some(name) => self.named.push(format!("{name}={text}")),
            None => self.ctor.push(text),
        }
    }

    fn add_named(&mut self, names: &Names<'_>, attribute_id: i16, value: String) -> Result<()> {
        let member = names.member(attribute_id, Some(self.type_id))?;
        self.named.push(format!("{}={value}", member.name));
        Ok(())
    }

    fn apply(&mut self, record: Record, names: &Names<'_>, tables: &MapTable) -> Result<()> {
        match record {
            Record::Property { attribute_id, value } | Record::PropertyWithConverter { attribute_id, value, .. } => {
                self.add_named(names, attribute_id, argument_text(&value).into_owned())?;
            }
            Record::PropertyStringReference { attribute_id, string_id } => {
                let value = argument_text(tables.string(string_id)?).into_owned();
                self.add_named(names, attribute_id, value)?;
            }
            Record::PropertyTypeReference { attribute_id, type_id } => {
                self.add_named(names, attribute_id, names.type_reference(type_id)?)?;
            }
            Record::PropertyWithExtension { attribute_id, extension, value_id } => {
                self.add_named(names, attribute_id, names.extension_value(extension, value_id)?)?;
            }
            Record::PropertyComplexStart { attribute_id }
            | Record::PropertyArrayStart { attribute_id }
            | Record::PropertyIListStart { attribute_id }
            | Record::PropertyIDictionaryStart { attribute_id } => {
                self.pending_property = Some(names.member(attribute_id, Some(self.type_id))?.name);
            }
            Record::PropertyComplexEnd
            | Record::PropertyArrayEnd
            | Record::PropertyIListEnd
            | Record::PropertyIDictionaryEnd => self.pending_property = None,
            Record::ConstructorParametersStart => self.in_ctor = true,
            Record::ConstructorParametersEnd if self.in_ctor => self.in_ctor = false,
            Record::ConstructorParametersEnd => {
                return Err(Error::scope_mismatch(RecordType::ConstructorParametersEnd, None));
            }
            // Inhaltstext ausserhalb der Konstruktorliste zählt ebenfalls positional
            Record::Text { value } | Record::TextWithConverter { value, .. } => {
                self.ctor.push(argument_text(&value).into_owned());
            }
            Record::TextWithId { value_id } => self.ctor.push(argument_text(tables.string(value_id)?).into_owned()),
            Record::ConstructorParameterType { type_id } if self.in_ctor => {
                self.ctor.push(names.type_name(type_id)?.display());
            }
            Record::ContentProperty { .. } | Record::ConnectionId { .. } | Record::XmlnsProperty { .. } => {}
            other => return Err(Error::unexpected(other.record_type(), "inside a key subtree")),
        }
        Ok(())
    }
}

/// Reads up to the matching `KeyElementEnd` and returns the key text.
///
/// The opening `KeyElementStart` (of `type_id`) is already consumed.
/// Table records inside the subtree are loaded as they appear.
pub(super) fn compact<R: Read>(
    source: &mut RecordSource<R>,
    tables: &mut MapTable,
    scope: &NamespaceScope,
    type_id: i16,
) -> Result<String> {
    let root = Names::new(tables, scope).type_name(type_id)?.display();
    let mut stack = vec![Frame::new(type_id, root)];

    loop {
        let fetched = source.next()?.ok_or(Error::PrematureEndOfStream)?;
        let record = fetched.record;
        if record.record_type().is_table() {
            tables.load(&record)?;
            continue;
        }
        let names = Names::new(tables, scope);
        match record {
            Record::KeyElementEnd => {
                if stack.len() != 1 {
                    return Err(Error::scope_mismatch(RecordType::KeyElementEnd, Some(RecordType::ElementEnd)));
                }
                let frame = stack.pop().ok_or(Error::scope_mismatch(RecordType::KeyElementEnd, None))?;
                return Ok(frame.finish());
            }
            Record::ElementStart { type_id, .. } => {
                stack.push(Frame::new(type_id, names.type_name(type_id)?.display()));
            }
            Record::ElementEnd => {
                if stack.len() < 2 {
                    return Err(Error::scope_mismatch(RecordType::ElementEnd, Some(RecordType::KeyElementEnd)));
                }
                let text = stack.pop().map(Frame::finish).unwrap_or_default();
                if let Some(parent) = stack.last_mut() {
                    parent.add_child(text);
                }
            }
            other => {
                let top = stack.last_mut().ok_or(Error::scope_mismatch(other.record_type(), None))?;
                top.apply(other, &names, tables)?;
            }
        }
    }
}
