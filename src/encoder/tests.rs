use super::*;
use crate::bytestream::ByteReader;
use crate::decoder::decode;
use crate::known::known;
use crate::node::{BamlNode, NodeType};

// ============================================================================
// Helpers
// ============================================================================

fn el(local: &str) -> MarkupNode {
    MarkupNode::element(PRESENTATION_URI, local)
}

fn key(value: &str) -> MarkupNode {
    MarkupNode::def_attribute("Key", value)
}

/// Dokument mit `root` als Wurzel und den üblichen Präfixen.
fn doc(root: &str, body: Vec<MarkupNode>) -> Vec<MarkupNode> {
    let mut nodes = vec![
        MarkupNode::DocumentStart,
        el(root),
        MarkupNode::xmlns("", PRESENTATION_URI),
        MarkupNode::xmlns("x", XAML_URI),
    ];
    nodes.extend(body);
    nodes.push(MarkupNode::ElementEnd);
    nodes.push(MarkupNode::DocumentEnd);
    nodes
}

fn records(bytes: &[u8]) -> Vec<Record> {
    let mut r = ByteReader::new(bytes);
    header::decode(&mut r).unwrap();
    let mut out = Vec::new();
    while let Some((record, _)) = Record::read(&mut r).unwrap() {
        out.push(record);
    }
    out
}

fn kinds(bytes: &[u8]) -> Vec<RecordType> {
    records(bytes).iter().map(Record::record_type).collect()
}

fn elements(nodes: &[BamlNode]) -> Vec<&BamlNode> {
    nodes.iter().filter(|n| n.node_type == NodeType::StartElement).collect()
}

fn type_id(name: &str) -> i16 {
    known().type_id(name).unwrap()
}

// ============================================================================
// Elements and attributes
// ============================================================================

#[test]
fn test_literal_property_round_trip() {
    let nodes = doc("Button", vec![MarkupNode::property("Width", "20"), MarkupNode::property("Tag", "{}{braced}")]);
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();

    let decoded = decode(&bytes).unwrap();
    let button = elements(&decoded)[0];
    assert_eq!(button.name, "Button");
    assert_eq!(button.property("Width").unwrap().value.as_deref(), Some("20"));
    assert_eq!(button.property("Tag").unwrap().value.as_deref(), Some("{}{braced}"));
}

#[test]
fn test_xmlns_before_element_is_attached() {
    let nodes = vec![
        MarkupNode::DocumentStart,
        MarkupNode::xmlns("", PRESENTATION_URI),
        el("Button"),
        MarkupNode::ElementEnd,
        MarkupNode::DocumentEnd,
    ];
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    assert_eq!(
        kinds(&bytes),
        [
            RecordType::DocumentStart,
            RecordType::ElementStart,
            RecordType::XmlnsProperty,
            RecordType::ElementEnd,
            RecordType::DocumentEnd
        ]
    );
}

#[test]
fn test_known_string_becomes_reference() {
    let nodes = doc(
        "ResourceDictionary",
        vec![el("Button"), key("primary"), MarkupNode::property("Tag", "primary"), MarkupNode::ElementEnd],
    );
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    assert!(records(&bytes).iter().any(|r| matches!(r, Record::PropertyStringReference { .. })));
}

#[test]
fn test_attribute_after_content_rejected() {
    let nodes = doc(
        "StackPanel",
        vec![el("Button"), MarkupNode::ElementEnd, MarkupNode::property("Width", "1")],
    );
    let err = encode(&nodes, &EncoderConfig::default()).unwrap_err();
    assert!(matches!(err.root(), Error::InvalidNodeSequence(_)), "{err}");
}

#[test]
fn test_unknown_element_type() {
    let nodes = doc("Window", vec![MarkupNode::element("urn:nowhere", "Gadget"), MarkupNode::ElementEnd]);
    let err = encode(&nodes, &EncoderConfig::default()).unwrap_err();
    assert!(matches!(err.root(), Error::UnresolvedType(_)), "{err}");
}

#[test]
fn test_unclosed_scope_at_finish() {
    let mut writer = BamlWriter::new(EncoderConfig::default());
    writer.write_node(&MarkupNode::DocumentStart).unwrap();
    writer.write_node(&el("Button")).unwrap();
    assert!(matches!(writer.finish(), Err(Error::UnclosedScope(RecordType::ElementStart))));
}

#[test]
fn test_custom_type_announced_before_use() {
    let uri = "clr-namespace:Acme.Gauges;assembly=Acme";
    let nodes = doc(
        "StackPanel",
        vec![MarkupNode::xmlns("g", uri), MarkupNode::element(uri, "Dial"), MarkupNode::ElementEnd],
    );
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    let all = records(&bytes);

    let info = all.iter().position(|r| matches!(r, Record::TypeInfo { name, .. } if name == "Acme.Gauges.Dial"));
    let start = all.iter().position(|r| matches!(r, Record::ElementStart { type_id: 0, .. }));
    assert!(info.unwrap() < start.unwrap());
    assert!(all.iter().any(|r| matches!(r, Record::AssemblyInfo { name, .. } if name == "Acme")));

    let decoded = decode(&bytes).unwrap();
    assert_eq!(elements(&decoded)[1].name, "g:Dial");
}

#[test]
fn test_unoptimised_extension_compiles_to_subtree() {
    let nodes = doc("TextBlock", vec![MarkupNode::property("Tag", "{Binding}")]);
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    let all = records(&bytes);
    let complex = all.iter().position(|r| matches!(r, Record::PropertyComplexStart { .. })).unwrap();
    assert_eq!(all[complex + 1], Record::ElementStart { type_id: type_id("Binding"), flags: 0 });
}

#[test]
fn test_type_extension_becomes_type_reference() {
    let nodes = doc("Button", vec![MarkupNode::property("Tag", "{x:Type Button}")]);
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    assert!(records(&bytes).contains(&Record::PropertyTypeReference {
        attribute_id: known().find_member(type_id("Button"), "Tag").unwrap(),
        type_id: type_id("Button"),
    }));

    let plain = encode(&nodes, &EncoderConfig::default().without_extension_optimization()).unwrap();
    assert!(!kinds(&plain).contains(&RecordType::PropertyTypeReference));
}

#[test]
fn test_clr_type_extension_becomes_type_reference() {
    let uri = "clr-namespace:Acme.Gauges;assembly=Acme";
    let nodes = doc(
        "StackPanel",
        vec![
            MarkupNode::xmlns("local", uri),
            el("Button"),
            MarkupNode::property("Tag", "{x:Type local:Dial}"),
            MarkupNode::ElementEnd,
        ],
    );
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    let all = records(&bytes);

    let tag = known().find_member(type_id("Button"), "Tag").unwrap();
    let reference = all
        .iter()
        .position(|r| matches!(r, Record::PropertyTypeReference { attribute_id, type_id } if *attribute_id == tag && *type_id >= 0))
        .unwrap();
    let info = all.iter().position(|r| matches!(r, Record::TypeInfo { name, .. } if name == "Acme.Gauges.Dial"));
    assert!(info.unwrap() < reference);

    let decoded = decode(&bytes).unwrap();
    let button = elements(&decoded)[1];
    assert_eq!(button.property("Tag").and_then(|p| p.value.as_deref()), Some("{x:Type local:Dial}"));
}

#[test]
fn test_debug_info_line_records() {
    let mut writer = BamlWriter::new(EncoderConfig::default().with_debug_info());
    writer.write_node(&MarkupNode::DocumentStart).unwrap();
    writer.set_line(LineInfo::new(3, 5));
    writer.write_node(&el("Button")).unwrap();
    writer.set_line(LineInfo::new(3, 12));
    writer.write_node(&MarkupNode::property("Width", "20")).unwrap();
    writer.write_node(&MarkupNode::ElementEnd).unwrap();
    writer.write_node(&MarkupNode::DocumentEnd).unwrap();
    let all = records(&writer.finish().unwrap());

    assert!(all.contains(&Record::LineNumberAndPosition { line: 3, position: 5 }));
    assert!(all.contains(&Record::LinePosition { position: 12 }));
}

#[test]
fn test_flush_to_drains_main_stream() {
    let mut writer = BamlWriter::new(EncoderConfig::default());
    writer.write_node(&MarkupNode::DocumentStart).unwrap();
    let mut sink = Vec::new();
    writer.flush_to(&mut sink).unwrap();
    writer.write_node(&MarkupNode::DocumentEnd).unwrap();
    sink.extend(writer.finish().unwrap());

    let decoded = decode(&sink).unwrap();
    assert_eq!(decoded.len(), 2);
}

// ============================================================================
// Deferred content
// ============================================================================

#[test]
fn test_deferred_dictionary_round_trip() {
    let nodes = doc(
        "ResourceDictionary",
        vec![
            el("SolidColorBrush"),
            key("accent"),
            MarkupNode::ElementEnd,
            el("Style"),
            MarkupNode::property("TargetType", "Button"),
            MarkupNode::ElementEnd,
            el("Button"),
            key("primary"),
            MarkupNode::def_attribute("Shared", "False"),
            MarkupNode::ElementEnd,
        ],
    );
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    assert!(kinds(&bytes).contains(&RecordType::DeferableContentStart));

    let decoded = decode(&bytes).unwrap();
    let all = elements(&decoded);
    assert_eq!(all.len(), 4);
    assert_eq!(all[1].key(), Some("accent"));
    assert_eq!(all[2].key(), Some("{x:Type Button}"));
    assert_eq!(all[3].key(), Some("primary"));
    assert_eq!(all[3].property("x:Shared").unwrap().value.as_deref(), Some("False"));
}

#[test]
fn test_keys_precede_values() {
    let nodes = doc(
        "ResourceDictionary",
        vec![el("Button"), key("a"), MarkupNode::ElementEnd, el("Button"), key("b"), MarkupNode::ElementEnd],
    );
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    let order = kinds(&bytes);
    let marker = order.iter().position(|k| *k == RecordType::DeferableContentStart).unwrap();
    assert_eq!(order[marker + 1], RecordType::DefAttributeKeyString);
    assert_eq!(order[marker + 2], RecordType::DefAttributeKeyString);
    assert_eq!(order[marker + 3], RecordType::ElementStart);
}

#[test]
fn test_missing_dictionary_key() {
    let nodes = doc("ResourceDictionary", vec![el("Button"), MarkupNode::ElementEnd]);
    let err = encode(&nodes, &EncoderConfig::default()).unwrap_err();
    assert!(matches!(err.root(), Error::MissingDictionaryKey(0)), "{err}");
}

#[test]
fn test_without_deferral_writes_key_attribute() {
    let nodes = doc("ResourceDictionary", vec![el("Button"), key("accent"), MarkupNode::ElementEnd]);
    let bytes = encode(&nodes, &EncoderConfig::default().without_deferral()).unwrap();
    assert!(!kinds(&bytes).contains(&RecordType::DeferableContentStart));

    let decoded = decode(&bytes).unwrap();
    assert_eq!(elements(&decoded)[1].key(), Some("accent"));
}

#[test]
fn test_type_key_and_subtree_key() {
    let nodes = doc(
        "ResourceDictionary",
        vec![
            el("Button"),
            key("{x:Type Button}"),
            MarkupNode::ElementEnd,
            el("SolidColorBrush"),
            key("{ComponentResourceKey ResourceId=Accent}"),
            MarkupNode::ElementEnd,
        ],
    );
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    let order = kinds(&bytes);
    assert!(order.contains(&RecordType::DefAttributeKeyType));
    assert!(order.contains(&RecordType::KeyElementStart));

    let decoded = decode(&bytes).unwrap();
    let all = elements(&decoded);
    assert_eq!(all[1].key(), Some("{x:Type Button}"));
    assert_eq!(all[2].key(), Some("{ComponentResourceKey ResourceId=Accent}"));
}

#[test]
fn test_key_values_keep_quotes() {
    let empty = "{ComponentResourceKey ResourceId=''}";
    let padded = "{ComponentResourceKey ResourceId=' padded '}";
    let nodes = doc(
        "ResourceDictionary",
        vec![
            el("SolidColorBrush"),
            key(empty),
            MarkupNode::ElementEnd,
            el("SolidColorBrush"),
            key(padded),
            MarkupNode::ElementEnd,
        ],
    );
    for config in [EncoderConfig::default(), EncoderConfig::default().without_deferral()] {
        let bytes = encode(&nodes, &config).unwrap();
        let decoded = decode(&bytes).unwrap();
        let all = elements(&decoded);
        assert_eq!(all[1].key(), Some(empty));
        assert_eq!(all[2].key(), Some(padded));

        let parsed = extension::parse(all[2].key().unwrap(), &BracketCharacters::new(), LineInfo::default()).unwrap();
        let AttributeText::Extension(parsed) = parsed else { panic!("{parsed:?}") };
        assert_eq!(parsed.named("ResourceId"), Some(&Argument::Text(" padded ".into())));
    }
}

#[test]
fn test_static_resource_property_in_deferred_value() {
    let nodes = doc(
        "ResourceDictionary",
        vec![
            el("Button"),
            key("styled"),
            MarkupNode::property("Background", "{StaticResource brush}"),
            MarkupNode::ElementEnd,
        ],
    );
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    let all = records(&bytes);
    assert!(all.iter().any(|r| matches!(r, Record::PropertyWithStaticResourceId { static_resource_id: 0, .. })));
    assert!(all.iter().any(|r| matches!(r, Record::OptimizedStaticResource { flags: 0, .. })));

    let decoded = decode(&bytes).unwrap();
    let button = elements(&decoded)[1];
    assert_eq!(button.property("Background").unwrap().value.as_deref(), Some("{StaticResource brush}"));
}

#[test]
fn test_static_resource_element_in_deferred_value() {
    let nodes = doc(
        "ResourceDictionary",
        vec![
            el("Button"),
            key("styled"),
            MarkupNode::property_element("Background"),
            el("StaticResourceExtension"),
            MarkupNode::property("ResourceKey", "brush"),
            MarkupNode::ElementEnd,
            MarkupNode::PropertyElementEnd,
            MarkupNode::ElementEnd,
        ],
    );
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    let order = kinds(&bytes);
    let start = order.iter().position(|k| *k == RecordType::StaticResourceStart).unwrap();
    let id = order.iter().position(|k| *k == RecordType::StaticResourceId).unwrap();
    assert!(start < id);

    let decoded = decode(&bytes).unwrap();
    let resource = elements(&decoded)[2];
    assert_eq!(resource.name, "StaticResource");
    assert_eq!(resource.property("ResourceKey").unwrap().value.as_deref(), Some("brush"));
}

#[test]
fn test_static_resource_outside_dictionary_stays_inline() {
    let nodes = doc("Button", vec![MarkupNode::property("Background", "{StaticResource brush}")]);
    let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
    let order = kinds(&bytes);
    assert!(order.contains(&RecordType::PropertyWithExtension));
    assert!(!order.contains(&RecordType::StaticResourceStart));

    let decoded = decode(&bytes).unwrap();
    let button = elements(&decoded)[0];
    assert_eq!(button.property("Background").unwrap().value.as_deref(), Some("{StaticResource brush}"));
}

#[test]
fn test_text_inside_dictionary_rejected() {
    let nodes = doc("ResourceDictionary", vec![MarkupNode::text("loose")]);
    let err = encode(&nodes, &EncoderConfig::default()).unwrap_err();
    assert!(matches!(err.root(), Error::InvalidNodeSequence(_)), "{err}");
}
