//! Markup-Extension-Engine.
//!
//! `{Typ args}` in Attributwerten wird in positionale und benannte Argumente
//! zerlegt ([`parse`]), in Markup-Knoten übersetzt ([`compile`]) und für die
//! Gegenrichtung wieder als Text formatiert ([`format`]).
//!
//! # Beispiel
//!
//! ```
//! use baml::extension::{parse, AttributeText, BracketCharacters};
//! use baml::LineInfo;
//!
//! let parsed = parse("{Binding Path=Name}", &BracketCharacters::new(), LineInfo::default()).unwrap();
//! let AttributeText::Extension(ext) = parsed else { panic!() };
//! assert_eq!(ext.type_name, "Binding");
//! assert_eq!(ext.named[0].0, "Path");
//! ```

pub mod compile;
pub mod format;
mod tokenizer;

#[cfg(test)]
mod tests;

pub use compile::{ExtensionResolver, compile};
pub use format::{argument_text, escape, format_extension};
pub use tokenizer::parse;

use crate::known::{EXTENSION_SUFFIX, known};
use crate::namespaces::{PRESENTATION_URI, XAML_URI, split_qualified};
use crate::{FastHashMap, FastIndexMap};

/// Result of tokenizing an attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeText {
    /// Plain text (including `{}`-escaped text, prefix removed).
    Literal(String),
    Extension(ParsedExtension),
}

/// One argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// Unescaped text.
    Text(String),
    /// Nested extension, kept as raw source for recursive processing.
    Nested(String),
}

impl Argument {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Nested(_) => None,
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, Self::Nested(_))
    }
}

/// Tokenized `{TypeName positional..., name=value...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedExtension {
    /// Type name as written (`x:Type`, `local:Foo`, `Binding`).
    pub type_name: String,
    pub positional: Vec<Argument>,
    /// Named arguments in source order; names are unique.
    pub named: Vec<(String, Argument)>,
}

impl ParsedExtension {
    pub fn named(&self, name: &str) -> Option<&Argument> {
        self.named.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    /// The only argument, if the list reduces to one positional token or to
    /// the single named parameter `parameter`.
    pub fn single_argument(&self, parameter: &str) -> Option<&Argument> {
        match (self.positional.as_slice(), self.named.as_slice()) {
            ([arg], []) => Some(arg),
            ([], [(name, arg)]) if name == parameter => Some(arg),
            _ => None,
        }
    }
}

/// Per-parameter bracket character pairs.
///
/// Registriert pro Extension-Typ (Kurzname, ohne Präfix) und Parameter eine
/// Liste von `(open, close)` Paaren. Innerhalb eines Paars verlieren `,` `=`
/// und `}` ihre Trennbedeutung.
#[derive(Debug, Clone, Default)]
pub struct BracketCharacters {
    by_extension: FastHashMap<String, FastIndexMap<String, Vec<(char, char)>>>,
}

impl BracketCharacters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: &str, parameter: &str, open: char, close: char) -> &mut Self {
        self.by_extension
            .entry(extension.to_string())
            .or_default()
            .entry(parameter.to_string())
            .or_default()
            .push((open, close));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }

    fn parameters(&self, type_name: &str) -> Option<&FastIndexMap<String, Vec<(char, char)>>> {
        let (_, local) = split_qualified(type_name);
        self.by_extension.get(local).or_else(|| {
            if local.ends_with(EXTENSION_SUFFIX) {
                return None;
            }
            self.by_extension.get(&format!("{local}{EXTENSION_SUFFIX}"))
        })
    }

    /// Pairs active for `parameter` of `type_name`.
    pub(crate) fn for_parameter(&self, type_name: &str, parameter: &str) -> Vec<(char, char)> {
        self.parameters(type_name).and_then(|p| p.get(parameter)).cloned().unwrap_or_default()
    }

    /// Union of all pairs of `type_name`, active while scanning names and
    /// positional arguments.
    pub(crate) fn union(&self, type_name: &str) -> Vec<(char, char)> {
        let mut out: Vec<(char, char)> = Vec::new();
        for pairs in self.parameters(type_name).into_iter().flat_map(|p| p.values()) {
            for pair in pairs {
                if !out.contains(pair) {
                    out.push(*pair);
                }
            }
        }
        out
    }
}

/// Built-in extensions with a scalar encoding.
///
/// Die Menge ist geschlossen; Extensions von Drittanbietern werden nie
/// optimiert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownExtension {
    /// `{x:Type T}`
    Type,
    /// `{x:Static Owner.Member}`
    Static,
    /// `{TemplateBinding Property}`
    TemplateBinding,
    /// `{StaticResource key}`
    StaticResource,
    /// `{DynamicResource key}`
    DynamicResource,
}

impl KnownExtension {
    pub const ALL: [KnownExtension; 5] =
        [Self::Type, Self::Static, Self::TemplateBinding, Self::StaticResource, Self::DynamicResource];

    /// Registry type name.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Type => "TypeExtension",
            Self::Static => "StaticExtension",
            Self::TemplateBinding => "TemplateBindingExtension",
            Self::StaticResource => "StaticResourceExtension",
            Self::DynamicResource => "DynamicResourceExtension",
        }
    }

    /// Conventional parameter accepted as the single named argument.
    pub fn parameter(self) -> &'static str {
        match self {
            Self::Type => "TypeName",
            Self::Static => "Member",
            Self::TemplateBinding => "Property",
            Self::StaticResource | Self::DynamicResource => "ResourceKey",
        }
    }

    pub fn xml_namespace(self) -> &'static str {
        match self {
            Self::Type | Self::Static => XAML_URI,
            _ => PRESENTATION_URI,
        }
    }

    /// Known type id of the extension type.
    pub fn type_id(self) -> Option<i16> {
        known().type_id(self.type_name())
    }

    pub fn from_type_id(id: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_id() == Some(id))
    }

    /// Recognises a written extension by its resolved xml namespace and local name.
    pub fn from_name(xml_namespace: &str, local: &str) -> Option<Self> {
        let id = known().find_xml_extension(xml_namespace, local)?;
        Self::from_type_id(id)
    }

    /// Positive id stored in `PropertyWithExtension.extension`.
    pub fn wire_id(self) -> Option<u16> {
        self.type_id().map(|id| (-i32::from(id)) as u16)
    }

    pub fn from_wire_id(id: u16) -> Option<Self> {
        let id = i16::try_from(-i32::from(id)).ok()?;
        Self::from_type_id(id)
    }

    pub fn is_resource(self) -> bool {
        matches!(self, Self::StaticResource | Self::DynamicResource)
    }
}
