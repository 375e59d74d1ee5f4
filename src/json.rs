//! JSON-Darstellung der Knotenströme (CLI-Ein- und Ausgabe).
//!
//! Encoder-Eingabe ist ein Array von Objekten mit einem `node`-Feld:
//!
//! ```json
//! [
//!   {"node": "DocumentStart"},
//!   {"node": "ElementStart", "namespace": "http://...", "name": "Button"},
//!   {"node": "Property", "name": "Width", "value": "20"},
//!   {"node": "ElementEnd"},
//!   {"node": "DocumentEnd"}
//! ]
//! ```
//!
//! Qualifizierte Member tragen zusätzlich `owner` als
//! `{"namespace": .., "name": ..}`. Ein optionales `"line": [zeile, spalte]`
//! liefert die Quellposition für Debug-Records.

use serde_json::{Map, Value, json};

use crate::node::{BamlNode, ComplexKind, MarkupNode, MemberName, NodeType, XamlName};
use crate::{Error, LineInfo, Result};

/// Parses a JSON array of markup nodes.
pub fn markup_from_json(text: &str) -> Result<Vec<MarkupNode>> {
    Ok(positioned_markup_from_json(text)?.into_iter().map(|(node, _)| node).collect())
}

/// Like [`markup_from_json`], keeping each node's `line` (unknown if absent).
pub fn positioned_markup_from_json(text: &str) -> Result<Vec<(MarkupNode, LineInfo)>> {
    let value: Value = serde_json::from_str(text).map_err(|e| Error::InvalidJson(format!("parse error: {e}")))?;
    let Value::Array(items) = value else {
        return Err(Error::InvalidJson("expected an array of nodes".into()));
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| Ok((markup_node(item, index)?, line_info(item, index)?)))
        .collect()
}

/// Inverse of [`markup_from_json`], pretty-printed.
pub fn markup_to_json(nodes: &[MarkupNode]) -> Result<String> {
    let items: Vec<Value> = nodes.iter().map(markup_value).collect();
    serde_json::to_string_pretty(&Value::Array(items)).map_err(|e| Error::InvalidJson(format!("encode error: {e}")))
}

/// Decoded nodes as a JSON array; properties are nested under their element.
pub fn nodes_to_json(nodes: &[BamlNode]) -> Result<String> {
    let items: Vec<Value> = nodes.iter().map(node_value).collect();
    serde_json::to_string_pretty(&Value::Array(items)).map_err(|e| Error::InvalidJson(format!("encode error: {e}")))
}

// ============================================================================
// Markup nodes
// ============================================================================

fn markup_node(item: &Value, index: usize) -> Result<MarkupNode> {
    let obj = item.as_object().ok_or_else(|| invalid(index, "node is not an object"))?;
    let kind = field(obj, "node", index)?;
    let text = |name: &str| field(obj, name, index).map(str::to_string);

    Ok(match kind {
        "DocumentStart" => MarkupNode::DocumentStart,
        "DocumentEnd" => MarkupNode::DocumentEnd,
        "ElementStart" => MarkupNode::ElementStart(XamlName::new(text("namespace")?, text("name")?)),
        "ElementEnd" => MarkupNode::ElementEnd,
        "Xmlns" => MarkupNode::Xmlns { prefix: text("prefix")?, namespace: text("namespace")? },
        "PiMapping" => MarkupNode::PiMapping {
            xml_namespace: text("namespace")?,
            clr_namespace: text("clr_namespace")?,
            assembly: optional(obj, "assembly").unwrap_or_default().to_string(),
        },
        "Property" => MarkupNode::Property { member: member(obj, index)?, value: text("value")? },
        "DefAttribute" => MarkupNode::DefAttribute { name: text("name")?, value: text("value")? },
        "PresentationOptions" => MarkupNode::PresentationOptions { name: text("name")?, value: text("value")? },
        "PropertyElementStart" => MarkupNode::PropertyElementStart(member(obj, index)?),
        "PropertyElementEnd" => MarkupNode::PropertyElementEnd,
        "ConstructorArgsStart" => MarkupNode::ConstructorArgsStart,
        "ConstructorArgsEnd" => MarkupNode::ConstructorArgsEnd,
        "Text" => MarkupNode::Text(text("value")?),
        "LiteralContent" => MarkupNode::LiteralContent(text("value")?),
        "ConnectionId" => {
            let id = obj
                .get("id")
                .and_then(Value::as_i64)
                .and_then(|id| i32::try_from(id).ok())
                .ok_or_else(|| invalid(index, "ConnectionId needs an integer 'id'"))?;
            MarkupNode::ConnectionId(id)
        }
        other => return Err(invalid(index, &format!("unknown node kind '{other}'"))),
    })
}

fn line_info(item: &Value, index: usize) -> Result<LineInfo> {
    let Some(line) = item.get("line") else {
        return Ok(LineInfo::default());
    };
    let part = |i: usize| line.get(i).and_then(Value::as_u64).and_then(|n| u32::try_from(n).ok());
    match (line.as_array().map(Vec::len), part(0), part(1)) {
        (Some(2), Some(line), Some(position)) => Ok(LineInfo::new(line, position)),
        _ => Err(invalid(index, "'line' must be [line, position]")),
    }
}

fn member(obj: &Map<String, Value>, index: usize) -> Result<MemberName> {
    let name = field(obj, "name", index)?;
    match obj.get("owner") {
        None | Some(Value::Null) => Ok(MemberName::new(name)),
        Some(Value::Object(owner)) => {
            let owner = XamlName::new(field(owner, "namespace", index)?, field(owner, "name", index)?);
            Ok(MemberName::qualified(owner, name))
        }
        Some(_) => Err(invalid(index, "'owner' must be an object")),
    }
}

fn markup_value(node: &MarkupNode) -> Value {
    match node {
        MarkupNode::DocumentStart => json!({"node": "DocumentStart"}),
        MarkupNode::DocumentEnd => json!({"node": "DocumentEnd"}),
        MarkupNode::ElementStart(name) => {
            json!({"node": "ElementStart", "namespace": name.namespace, "name": name.local})
        }
        MarkupNode::ElementEnd => json!({"node": "ElementEnd"}),
        MarkupNode::Xmlns { prefix, namespace } => json!({"node": "Xmlns", "prefix": prefix, "namespace": namespace}),
        MarkupNode::PiMapping { xml_namespace, clr_namespace, assembly } => json!({
            "node": "PiMapping",
            "namespace": xml_namespace,
            "clr_namespace": clr_namespace,
            "assembly": assembly,
        }),
        MarkupNode::Property { member, value } => {
            let mut v = member_value("Property", member);
            v["value"] = json!(value);
            v
        }
        MarkupNode::DefAttribute { name, value } => json!({"node": "DefAttribute", "name": name, "value": value}),
        MarkupNode::PresentationOptions { name, value } => {
            json!({"node": "PresentationOptions", "name": name, "value": value})
        }
        MarkupNode::PropertyElementStart(member) => member_value("PropertyElementStart", member),
        MarkupNode::PropertyElementEnd => json!({"node": "PropertyElementEnd"}),
        MarkupNode::ConstructorArgsStart => json!({"node": "ConstructorArgsStart"}),
        MarkupNode::ConstructorArgsEnd => json!({"node": "ConstructorArgsEnd"}),
        MarkupNode::Text(value) => json!({"node": "Text", "value": value}),
        MarkupNode::LiteralContent(value) => json!({"node": "LiteralContent", "value": value}),
        MarkupNode::ConnectionId(id) => json!({"node": "ConnectionId", "id": id}),
    }
}

fn member_value(kind: &str, member: &MemberName) -> Value {
    let mut v = json!({"node": kind, "name": member.name});
    if let Some(owner) = &member.owner {
        v["owner"] = json!({"namespace": owner.namespace, "name": owner.local});
    }
    v
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str, index: usize) -> Result<&'a str> {
    obj.get(name).and_then(Value::as_str).ok_or_else(|| invalid(index, &format!("missing string field '{name}'")))
}

fn optional<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    obj.get(name).and_then(Value::as_str)
}

fn invalid(index: usize, msg: &str) -> Error {
    Error::InvalidJson(format!("node {index}: {msg}"))
}

// ============================================================================
// Decoded nodes
// ============================================================================

fn node_value(node: &BamlNode) -> Value {
    let mut v = Map::new();
    v.insert("type".into(), json!(type_name(node.node_type)));
    if let NodeType::StartComplexProperty(kind) = node.node_type {
        v.insert("kind".into(), json!(complex_name(kind)));
    }
    if !node.name.is_empty() {
        v.insert("name".into(), json!(node.name));
    }
    if !node.xml_namespace.is_empty() {
        v.insert("namespace".into(), json!(node.xml_namespace));
    }
    if let Some(value) = &node.value {
        v.insert("value".into(), json!(value));
    }
    if let Some(converter) = &node.converter {
        v.insert("converter".into(), json!(converter));
    }
    v.insert("depth".into(), json!(node.depth));
    if node.line.is_known() {
        v.insert("line".into(), json!([node.line.line, node.line.position]));
    }
    if let Some(id) = node.connection_id {
        v.insert("connection_id".into(), json!(id));
    }
    if !node.properties.is_empty() {
        v.insert("properties".into(), Value::Array(node.properties.iter().map(node_value).collect()));
    }
    Value::Object(v)
}

fn type_name(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::None => "None",
        NodeType::StartDocument => "StartDocument",
        NodeType::EndDocument => "EndDocument",
        NodeType::StartElement => "StartElement",
        NodeType::EndElement => "EndElement",
        NodeType::Property => "Property",
        NodeType::DefAttribute => "DefAttribute",
        NodeType::XmlnsProperty => "XmlnsProperty",
        NodeType::PresentationOptions => "PresentationOptions",
        NodeType::PiMapping => "PiMapping",
        NodeType::StartComplexProperty(_) => "StartComplexProperty",
        NodeType::EndComplexProperty => "EndComplexProperty",
        NodeType::StartConstructor => "StartConstructor",
        NodeType::EndConstructor => "EndConstructor",
        NodeType::Text => "Text",
        NodeType::LiteralContent => "LiteralContent",
    }
}

fn complex_name(kind: ComplexKind) -> &'static str {
    match kind {
        ComplexKind::Object => "Object",
        ComplexKind::Array => "Array",
        ComplexKind::List => "List",
        ComplexKind::Dictionary => "Dictionary",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::PRESENTATION_URI;

    #[test]
    fn parse_element_with_qualified_member() {
        let text = r#"[
            {"node": "DocumentStart"},
            {"node": "ElementStart", "namespace": "urn:p", "name": "Button"},
            {"node": "Property", "name": "Row", "value": "1", "owner": {"namespace": "urn:p", "name": "Grid"}},
            {"node": "ConnectionId", "id": 7},
            {"node": "ElementEnd"},
            {"node": "DocumentEnd"}
        ]"#;
        let nodes = markup_from_json(text).unwrap();
        assert_eq!(nodes.len(), 6);
        assert_eq!(
            nodes[2],
            MarkupNode::Property {
                member: MemberName::qualified(XamlName::new("urn:p", "Grid"), "Row"),
                value: "1".into()
            }
        );
        assert_eq!(nodes[3], MarkupNode::ConnectionId(7));
    }

    #[test]
    fn markup_json_round_trip() {
        let nodes = vec![
            MarkupNode::DocumentStart,
            MarkupNode::element(PRESENTATION_URI, "Button"),
            MarkupNode::xmlns("", PRESENTATION_URI),
            MarkupNode::def_attribute("Key", "k"),
            MarkupNode::property_element("Content"),
            MarkupNode::text("hi"),
            MarkupNode::PropertyElementEnd,
            MarkupNode::ElementEnd,
            MarkupNode::DocumentEnd,
        ];
        let text = markup_to_json(&nodes).unwrap();
        assert_eq!(markup_from_json(&text).unwrap(), nodes);
    }

    #[test]
    fn errors_name_the_node() {
        let err = markup_from_json(r#"[{"node": "DocumentStart"}, {"node": "Bogus"}]"#).unwrap_err();
        assert!(matches!(&err, Error::InvalidJson(msg) if msg.starts_with("node 1")), "{err}");
        assert!(matches!(markup_from_json("{}"), Err(Error::InvalidJson(_))));
        assert!(matches!(markup_from_json("[1"), Err(Error::InvalidJson(_))));
    }

    #[test]
    fn line_fields_are_optional() {
        let text = r#"[
            {"node": "DocumentStart"},
            {"node": "ElementStart", "namespace": "urn:p", "name": "Button", "line": [3, 5]},
            {"node": "ElementEnd"}
        ]"#;
        let nodes = positioned_markup_from_json(text).unwrap();
        assert_eq!(nodes[0].1, LineInfo::default());
        assert_eq!(nodes[1], (MarkupNode::element("urn:p", "Button"), LineInfo::new(3, 5)));
        assert_eq!(markup_from_json(text).unwrap().len(), 3);

        let err = markup_from_json(r#"[{"node": "DocumentStart", "line": 3}]"#).unwrap_err();
        assert!(matches!(&err, Error::InvalidJson(msg) if msg.contains("'line'")), "{err}");
    }

    #[test]
    fn decoded_nodes_nest_properties() {
        let mut element = BamlNode::new(NodeType::StartElement);
        element.name = "Button".into();
        let mut width = BamlNode::new(NodeType::Property);
        width.name = "Width".into();
        width.value = Some("20".into());
        element.properties.push(width);

        let value: Value = serde_json::from_str(&nodes_to_json(&[element]).unwrap()).unwrap();
        assert_eq!(value[0]["type"], "StartElement");
        assert_eq!(value[0]["properties"][0]["value"], "20");
        assert!(value[0].get("line").is_none());
    }
}
