//! Node-Modelle beider Richtungen.
//!
//! [`MarkupNode`] ist die Eingabe des Encoders: vorgeparste Markup-Events mit
//! Namespace-URIs statt Präfixen. [`BamlNode`] ist die Ausgabe des Decoders:
//! ein Snapshot des Cursors inklusive Property-Puffer.

use std::fmt;

use crate::error::LineInfo;

/// Namespace-qualified markup name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XamlName {
    pub namespace: String,
    pub local: String,
}

impl XamlName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), local: local.into() }
    }
}

/// Property name, optionally qualified by an owner type (`Grid.Row`).
///
/// `owner == None` bedeutet: Member des aktuellen Elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberName {
    pub owner: Option<XamlName>,
    pub name: String,
}

impl MemberName {
    pub fn new(name: impl Into<String>) -> Self {
        Self { owner: None, name: name.into() }
    }

    pub fn qualified(owner: XamlName, name: impl Into<String>) -> Self {
        Self { owner: Some(owner), name: name.into() }
    }

    /// Splits `Owner.Member`; the owner lands in `namespace`.
    pub fn parse(text: &str, namespace: &str) -> Self {
        match text.rsplit_once('.') {
            Some((owner, member)) => Self::qualified(XamlName::new(namespace, owner), member),
            None => Self::new(text),
        }
    }
}

/// Pre-resolved markup event, input of the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    DocumentStart,
    DocumentEnd,
    ElementStart(XamlName),
    ElementEnd,
    /// Namespace declaration on the next element (precedes `ElementStart`
    /// or follows it directly).
    Xmlns { prefix: String, namespace: String },
    /// Xml namespace ↔ clr namespace mapping, stream-wide.
    PiMapping { xml_namespace: String, clr_namespace: String, assembly: String },
    /// Attribute-form property.
    Property { member: MemberName, value: String },
    /// Language directive in the xaml namespace (`x:Key`, `x:Name`, ...).
    DefAttribute { name: String, value: String },
    PresentationOptions { name: String, value: String },
    PropertyElementStart(MemberName),
    PropertyElementEnd,
    ConstructorArgsStart,
    ConstructorArgsEnd,
    Text(String),
    LiteralContent(String),
    ConnectionId(i32),
}

impl MarkupNode {
    pub fn element(namespace: &str, local: &str) -> Self {
        Self::ElementStart(XamlName::new(namespace, local))
    }

    pub fn property(name: &str, value: &str) -> Self {
        Self::Property { member: MemberName::new(name), value: value.to_string() }
    }

    pub fn def_attribute(name: &str, value: &str) -> Self {
        Self::DefAttribute { name: name.to_string(), value: value.to_string() }
    }

    pub fn xmlns(prefix: &str, namespace: &str) -> Self {
        Self::Xmlns { prefix: prefix.to_string(), namespace: namespace.to_string() }
    }

    pub fn property_element(name: &str) -> Self {
        Self::PropertyElementStart(MemberName::new(name))
    }

    pub fn text(value: &str) -> Self {
        Self::Text(value.to_string())
    }

    /// True for nodes that belong to the attribute list of an element.
    pub fn is_attribute(&self) -> bool {
        matches!(
            self,
            Self::Xmlns { .. }
                | Self::Property { .. }
                | Self::DefAttribute { .. }
                | Self::PresentationOptions { .. }
                | Self::ConnectionId(_)
        )
    }
}

/// Complex property flavour, derived from the property type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComplexKind {
    Object,
    Array,
    List,
    Dictionary,
}

/// Node kind exposed by the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NodeType {
    #[default]
    None,
    StartDocument,
    EndDocument,
    StartElement,
    EndElement,
    Property,
    DefAttribute,
    XmlnsProperty,
    PresentationOptions,
    PiMapping,
    StartComplexProperty(ComplexKind),
    EndComplexProperty,
    StartConstructor,
    EndConstructor,
    Text,
    LiteralContent,
}

/// Owned snapshot of one reader position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BamlNode {
    pub node_type: NodeType,
    /// Display name as written in markup (`local:Gauge`, `x:Key`, `Grid.Row`).
    pub name: String,
    pub prefix: String,
    /// Type short name for elements, member name for properties.
    pub local_name: String,
    /// Qualifying owner type of a property, if the member is written `Owner.Member`.
    pub owner_name: Option<String>,
    pub xml_namespace: String,
    pub clr_namespace: String,
    pub assembly_name: String,
    pub value: Option<String>,
    /// Converter type name for converter-backed values.
    pub converter: Option<String>,
    pub depth: usize,
    pub line: LineInfo,
    pub connection_id: Option<i32>,
    /// Properties of an element or property scope, in stream order.
    pub properties: Vec<BamlNode>,
}

impl BamlNode {
    pub fn new(node_type: NodeType) -> Self {
        Self { node_type, ..Self::default() }
    }

    /// Erstes Property mit diesem Namen (Anzeige- oder lokaler Name).
    pub fn property(&self, name: &str) -> Option<&BamlNode> {
        self.properties.iter().find(|p| p.name == name || p.local_name == name)
    }

    /// Value of the synthesised or explicit `x:Key` definition attribute.
    pub fn key(&self) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.node_type == NodeType::DefAttribute && p.local_name == "Key")
            .and_then(|p| p.value.as_deref())
    }

    fn owner(&self) -> Option<XamlName> {
        self.owner_name.as_ref().map(|o| XamlName::new(self.xml_namespace.clone(), o.clone()))
    }

    fn member(&self) -> MemberName {
        MemberName { owner: self.owner(), name: self.local_name.clone() }
    }

    /// Maps one property entry back to an encoder node.
    fn attribute_to_markup(&self) -> Option<MarkupNode> {
        let value = self.value.clone().unwrap_or_default();
        Some(match self.node_type {
            NodeType::Property => MarkupNode::Property { member: self.member(), value },
            NodeType::DefAttribute => MarkupNode::DefAttribute { name: self.local_name.clone(), value },
            NodeType::PresentationOptions => {
                MarkupNode::PresentationOptions { name: self.local_name.clone(), value }
            }
            NodeType::XmlnsProperty => MarkupNode::Xmlns { prefix: self.local_name.clone(), namespace: value },
            _ => return None,
        })
    }
}

/// Converts a decoded node stream back into encoder input.
///
/// Namespaces are taken from the resolved nodes, so the result re-encodes
/// without the original prefix bindings being consulted.
pub fn to_markup(nodes: &[BamlNode]) -> Vec<MarkupNode> {
    let mut out = Vec::with_capacity(nodes.len() * 2);
    for node in nodes {
        match node.node_type {
            NodeType::None => {}
            NodeType::StartDocument => out.push(MarkupNode::DocumentStart),
            NodeType::EndDocument => out.push(MarkupNode::DocumentEnd),
            NodeType::StartElement => {
                out.push(MarkupNode::ElementStart(XamlName::new(
                    node.xml_namespace.clone(),
                    node.local_name.clone(),
                )));
                out.extend(node.properties.iter().filter_map(BamlNode::attribute_to_markup));
                if let Some(id) = node.connection_id {
                    out.push(MarkupNode::ConnectionId(id));
                }
            }
            NodeType::EndElement => out.push(MarkupNode::ElementEnd),
            NodeType::Property
            | NodeType::DefAttribute
            | NodeType::XmlnsProperty
            | NodeType::PresentationOptions => out.extend(node.attribute_to_markup()),
            NodeType::PiMapping => out.push(MarkupNode::PiMapping {
                xml_namespace: node.xml_namespace.clone(),
                clr_namespace: node.clr_namespace.clone(),
                assembly: node.assembly_name.clone(),
            }),
            NodeType::StartComplexProperty(_) => {
                out.push(MarkupNode::PropertyElementStart(node.member()));
                out.extend(node.properties.iter().filter_map(BamlNode::attribute_to_markup));
            }
            NodeType::EndComplexProperty => out.push(MarkupNode::PropertyElementEnd),
            NodeType::StartConstructor => out.push(MarkupNode::ConstructorArgsStart),
            NodeType::EndConstructor => out.push(MarkupNode::ConstructorArgsEnd),
            NodeType::Text => out.push(MarkupNode::Text(node.value.clone().unwrap_or_default())),
            NodeType::LiteralContent => {
                out.push(MarkupNode::LiteralContent(node.value.clone().unwrap_or_default()))
            }
        }
    }
    out
}

/// `prefix:local` oder `local` bei leerem Präfix.
pub fn qualified_name(prefix: &str, local: &str) -> String {
    if prefix.is_empty() { local.to_string() } else { format!("{prefix}:{local}") }
}

impl fmt::Display for BamlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = self.depth * 2;
        match self.node_type {
            NodeType::StartDocument => write!(f, "{:indent$}StartDocument", ""),
            NodeType::EndDocument => write!(f, "{:indent$}EndDocument", ""),
            NodeType::StartElement => {
                write!(f, "{:indent$}<{}", "", self.name)?;
                for p in &self.properties {
                    write!(f, " {}=\"{}\"", p.name, p.value.as_deref().unwrap_or_default())?;
                }
                if let Some(id) = self.connection_id {
                    write!(f, " [connection {id}]")?;
                }
                write!(f, ">")
            }
            NodeType::EndElement => write!(f, "{:indent$}</{}>", "", self.name),
            NodeType::StartComplexProperty(kind) => {
                write!(f, "{:indent$}<{}> ({kind:?})", "", self.name)
            }
            NodeType::EndComplexProperty => write!(f, "{:indent$}</{}>", "", self.name),
            NodeType::StartConstructor => write!(f, "{:indent$}(", ""),
            NodeType::EndConstructor => write!(f, "{:indent$})", ""),
            NodeType::Text | NodeType::LiteralContent => {
                let value = self.value.as_deref().unwrap_or_default();
                match &self.converter {
                    Some(c) => write!(f, "{:indent$}\"{value}\" via {c}", ""),
                    None => write!(f, "{:indent$}\"{value}\"", ""),
                }
            }
            NodeType::PiMapping => write!(
                f,
                "{:indent$}<?Mapping XmlNamespace=\"{}\" ClrNamespace=\"{}\" Assembly=\"{}\"?>",
                "", self.xml_namespace, self.clr_namespace, self.assembly_name
            ),
            NodeType::Property
            | NodeType::DefAttribute
            | NodeType::XmlnsProperty
            | NodeType::PresentationOptions => {
                write!(f, "{:indent$}{}=\"{}\"", "", self.name, self.value.as_deref().unwrap_or_default())
            }
            NodeType::None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::PRESENTATION_URI;

    #[test]
    fn member_name_parsing() {
        let m = MemberName::parse("Grid.Row", PRESENTATION_URI);
        assert_eq!(m.owner, Some(XamlName::new(PRESENTATION_URI, "Grid")));
        assert_eq!(m.name, "Row");
        assert_eq!(MemberName::parse("Width", PRESENTATION_URI).owner, None);
    }

    #[test]
    fn element_with_properties_maps_back() {
        let mut el = BamlNode::new(NodeType::StartElement);
        el.xml_namespace = PRESENTATION_URI.into();
        el.local_name = "Button".into();
        let mut width = BamlNode::new(NodeType::Property);
        width.local_name = "Width".into();
        width.value = Some("20".into());
        let mut key = BamlNode::new(NodeType::DefAttribute);
        key.local_name = "Key".into();
        key.value = Some("ok".into());
        el.properties = vec![key, width];
        el.connection_id = Some(3);

        let markup = to_markup(&[el.clone()]);
        assert_eq!(
            markup,
            vec![
                MarkupNode::element(PRESENTATION_URI, "Button"),
                MarkupNode::def_attribute("Key", "ok"),
                MarkupNode::property("Width", "20"),
                MarkupNode::ConnectionId(3),
            ]
        );
        assert_eq!(el.key(), Some("ok"));
    }

    #[test]
    fn display_indents_by_depth() {
        let mut t = BamlNode::new(NodeType::Text);
        t.depth = 2;
        t.value = Some("hi".into());
        assert_eq!(t.to_string(), "    \"hi\"");
    }
}
