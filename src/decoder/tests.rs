use super::*;
use crate::bytestream::ByteWriter;
use crate::known::known;
use crate::namespaces::PRESENTATION_URI;
use crate::record::AttributeUsage;

// ============================================================================
// Helpers
// ============================================================================

fn type_id(name: &str) -> i16 {
    known().type_id(name).unwrap()
}

fn member_id(owner: &str, name: &str) -> i16 {
    known().find_member(type_id(owner), name).unwrap()
}

fn bytes(records: &[Record]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    header::encode(&mut w, &BamlHeader::default());
    for r in records {
        r.write(&mut w);
    }
    w.into_vec()
}

fn size(records: &[Record]) -> i32 {
    let mut w = ByteWriter::new();
    for r in records {
        r.write(&mut w);
    }
    w.buffered_len() as i32
}

fn document(body: Vec<Record>) -> Vec<Record> {
    let mut out = vec![Record::DocumentStart { load_async: false, max_async_records: -1, debug_baml: false }];
    out.extend(body);
    out.push(Record::DocumentEnd);
    out
}

fn element(name: &str) -> Record {
    Record::ElementStart { type_id: type_id(name), flags: 0 }
}

fn xmlns(prefix: &str, namespace: &str) -> Record {
    Record::XmlnsProperty { prefix: prefix.into(), namespace: namespace.into(), assembly_ids: Vec::new() }
}

fn read_all(records: &[Record]) -> Result<Vec<BamlNode>> {
    decode_with(&bytes(records), DecoderOptions::default(), None)
}

fn elements(nodes: &[BamlNode]) -> Vec<&BamlNode> {
    nodes.iter().filter(|n| n.node_type == NodeType::StartElement).collect()
}

/// Dictionary with two values keyed by string and by type.
fn dictionary(content_delta: i32) -> Vec<Record> {
    let value_a = vec![element("SolidColorBrush"), Record::ElementEnd];
    let value_b = vec![element("Button"), Record::ElementEnd];
    let keys = vec![
        Record::DefAttributeKeyString { value_id: 0, value_position: 0, shared: false, shared_set: false },
        Record::DefAttributeKeyType {
            type_id: type_id("Button"),
            flags: 0,
            value_position: size(&value_a),
            shared: false,
            shared_set: true,
        },
    ];
    let content_size = size(&keys) + size(&value_a) + size(&value_b) + content_delta;

    let mut body = vec![
        Record::StringInfo { string_id: 0, value: "accent".into() },
        element("ResourceDictionary"),
        xmlns("", PRESENTATION_URI),
        xmlns("x", XAML_URI),
        Record::DeferableContentStart { content_size },
    ];
    body.extend(keys);
    body.extend(value_a);
    body.extend(value_b);
    body.push(Record::ElementEnd);
    document(body)
}

// ============================================================================
// Basic traversal
// ============================================================================

#[test]
fn test_element_with_properties() {
    let records = document(vec![
        element("Button"),
        xmlns("", PRESENTATION_URI),
        Record::Property { attribute_id: member_id("Button", "Width"), value: "20".into() },
        Record::ConnectionId { connection_id: 7 },
        Record::ElementEnd,
    ]);
    let data = bytes(&records);
    let mut reader = BamlReader::new(data.as_slice());

    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::StartDocument);
    assert!(reader.header().is_some());

    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::StartElement);
    assert_eq!(reader.name(), "Button");
    assert_eq!(reader.xml_namespace(), PRESENTATION_URI);
    assert_eq!(reader.connection_id(), Some(7));
    assert_eq!(reader.depth(), 0);
    assert_eq!(reader.property_count(), 2);

    assert!(reader.move_to_first_property());
    assert_eq!(reader.node_type(), NodeType::XmlnsProperty);
    assert!(reader.move_to_next_property());
    assert_eq!(reader.node_type(), NodeType::Property);
    assert_eq!(reader.name(), "Width");
    assert_eq!(reader.value(), Some("20"));
    assert_eq!(reader.depth(), 1);
    assert!(!reader.move_to_next_property());
    assert!(reader.move_to_element());
    assert_eq!(reader.name(), "Button");

    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::EndElement);
    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::EndDocument);
    assert!(!reader.read().unwrap());
}

#[test]
fn test_read_after_end_is_closed() {
    let data = bytes(&document(Vec::new()));
    let mut reader = BamlReader::new(data.as_slice());
    while reader.read().unwrap() {}
    assert!(reader.is_closed());
    assert!(matches!(reader.read(), Err(Error::ReaderClosed)));
}

#[test]
fn test_read_after_close() {
    let data = bytes(&document(Vec::new()));
    let mut reader = BamlReader::new(data.as_slice());
    assert!(reader.read().unwrap());
    reader.close();
    assert!(matches!(reader.read(), Err(Error::ReaderClosed)));
}

#[test]
fn test_attached_property_is_qualified() {
    let records = document(vec![
        element("Button"),
        xmlns("", PRESENTATION_URI),
        Record::Property { attribute_id: member_id("Grid", "Row"), value: "1".into() },
        Record::ElementEnd,
    ]);
    let nodes = read_all(&records).unwrap();
    let button = elements(&nodes)[0];
    let row = button.property("Row").unwrap();
    assert_eq!(row.name, "Grid.Row");
    assert_eq!(row.owner_name.as_deref(), Some("Grid"));
}

#[test]
fn test_literal_brace_value_is_escaped() {
    let records = document(vec![
        element("Button"),
        xmlns("", PRESENTATION_URI),
        Record::Property { attribute_id: member_id("Button", "Tag"), value: "{not an extension}".into() },
        Record::ElementEnd,
    ]);
    let nodes = read_all(&records).unwrap();
    let tag = elements(&nodes)[0].property("Tag").unwrap();
    assert_eq!(tag.value.as_deref(), Some("{}{not an extension}"));
}

#[test]
fn test_complex_property_scope() {
    let records = document(vec![
        element("Button"),
        xmlns("", PRESENTATION_URI),
        Record::PropertyComplexStart { attribute_id: member_id("Button", "Background") },
        element("SolidColorBrush"),
        Record::ElementEnd,
        Record::PropertyComplexEnd,
        Record::ElementEnd,
    ]);
    let nodes = read_all(&records).unwrap();
    let start = nodes
        .iter()
        .find(|n| n.node_type == NodeType::StartComplexProperty(ComplexKind::Object))
        .unwrap();
    assert_eq!(start.name, "Button.Background");
    assert_eq!(start.depth, 1);
    let brush = elements(&nodes)[1];
    assert_eq!(brush.depth, 2);
    let end = nodes.iter().find(|n| n.node_type == NodeType::EndComplexProperty).unwrap();
    assert_eq!(end.name, "Button.Background");
}

#[test]
fn test_text_with_converter() {
    let records = document(vec![
        element("TextBlock"),
        Record::TextWithConverter { value: "Hello".into(), converter_type_id: type_id("BrushConverter") },
        Record::ElementEnd,
    ]);
    let nodes = read_all(&records).unwrap();
    let text = nodes.iter().find(|n| n.node_type == NodeType::Text).unwrap();
    assert_eq!(text.value.as_deref(), Some("Hello"));
    assert_eq!(text.converter.as_deref(), Some("BrushConverter"));
    assert_eq!(text.depth, 1);
}

#[test]
fn test_line_info_from_debug_records() {
    let records = document(vec![
        element("Button"),
        Record::LineNumberAndPosition { line: 4, position: 9 },
        Record::ElementEnd,
    ]);
    let nodes = read_all(&records).unwrap();
    assert_eq!(elements(&nodes)[0].line, LineInfo::new(4, 9));
}

// ============================================================================
// Tables
// ============================================================================

#[test]
fn test_custom_type_from_tables() {
    let records = document(vec![
        Record::AssemblyInfo { assembly_id: 0, name: "Gauges".into() },
        Record::TypeInfo { type_id: 0, assembly_id: 0, is_internal: false, name: "Gauges.Dial".into() },
        Record::AttributeInfo {
            attribute_id: 0,
            owner_type_id: 0,
            usage: AttributeUsage::Default,
            name: "Level".into(),
        },
        Record::PiMapping { xml_namespace: "urn:gauges".into(), clr_namespace: "Gauges".into(), assembly_id: 0 },
        Record::ElementStart { type_id: 0, flags: 0 },
        xmlns("g", "urn:gauges"),
        Record::Property { attribute_id: 0, value: "3".into() },
        Record::ElementEnd,
    ]);
    let nodes = read_all(&records).unwrap();

    let mapping = nodes.iter().find(|n| n.node_type == NodeType::PiMapping).unwrap();
    assert_eq!(mapping.assembly_name, "Gauges");

    let dial = elements(&nodes)[0];
    assert_eq!(dial.name, "g:Dial");
    assert_eq!(dial.local_name, "Dial");
    assert_eq!(dial.clr_namespace, "Gauges");
    assert_eq!(dial.xml_namespace, "urn:gauges");
    assert_eq!(dial.property("Level").unwrap().value.as_deref(), Some("3"));
}

#[test]
fn test_unknown_type_id_fails() {
    let records = document(vec![Record::ElementStart { type_id: 5, flags: 0 }, Record::ElementEnd]);
    let err = read_all(&records).unwrap_err();
    assert!(matches!(err.root(), Error::UnknownTypeId(5)));
}

#[test]
fn test_table_out_of_order() {
    let records = document(vec![Record::StringInfo { string_id: 3, value: "late".into() }]);
    let err = read_all(&records).unwrap_err();
    assert!(matches!(err.root(), Error::TableOutOfOrder { .. }));
}

// ============================================================================
// Structural errors
// ============================================================================

#[test]
fn test_scope_mismatch() {
    let records = document(vec![element("Button"), Record::PropertyComplexEnd]);
    let err = read_all(&records).unwrap_err();
    assert!(matches!(
        err.root(),
        Error::ScopeMismatch { found: RecordType::PropertyComplexEnd, expected: Some(RecordType::ElementEnd) }
    ));
}

#[test]
fn test_unclosed_scope() {
    let records = vec![
        Record::DocumentStart { load_async: false, max_async_records: -1, debug_baml: false },
        element("Button"),
    ];
    let err = read_all(&records).unwrap_err();
    assert!(matches!(err.root(), Error::UnclosedScope(RecordType::ElementStart)));
}

#[test]
fn test_error_closes_reader() {
    let records = document(vec![element("Button"), Record::PropertyComplexEnd]);
    let data = bytes(&records);
    let mut reader = BamlReader::new(data.as_slice());
    let mut failed = false;
    for _ in 0..8 {
        match reader.read() {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => {
                assert!(matches!(e, Error::Located { .. }));
                failed = true;
                break;
            }
        }
    }
    assert!(failed);
    assert!(matches!(reader.read(), Err(Error::ReaderClosed)));
}

#[test]
fn test_property_outside_element() {
    let records = document(vec![Record::Property { attribute_id: member_id("Button", "Width"), value: "1".into() }]);
    let err = read_all(&records).unwrap_err();
    assert!(matches!(err.root(), Error::UnexpectedRecord { record: RecordType::Property, .. }));
}

// ============================================================================
// Deferred content
// ============================================================================

#[test]
fn test_deferred_keys_are_synthesised() {
    let nodes = read_all(&dictionary(0)).unwrap();
    let values = elements(&nodes);
    assert_eq!(values.len(), 3);

    let brush = values[1];
    assert_eq!(brush.key(), Some("accent"));
    assert_eq!(brush.properties[0].name, "x:Key");
    assert_eq!(brush.depth, 1);

    let button = values[2];
    assert_eq!(button.key(), Some("{x:Type Button}"));
    let shared = button.property("x:Shared").unwrap();
    assert_eq!(shared.value.as_deref(), Some("False"));
}

#[test]
fn test_deferred_keys_not_expanded() {
    let data = bytes(&dictionary(0));
    let options = DecoderOptions::default().without_key_expansion();
    let nodes = decode_with(&data, options, None).unwrap();
    assert!(elements(&nodes).iter().all(|n| n.key().is_none()));
}

#[test]
fn test_options_builders_touch_one_flag() {
    let defaults = DecoderOptions::default();
    assert!(!defaults.allow_unknown_types && defaults.validate_members && defaults.expand_deferred_keys);

    let options = DecoderOptions::default().with_allow_unknown_types();
    assert!(options.allow_unknown_types && options.validate_members && options.expand_deferred_keys);
    let options = DecoderOptions::default().without_member_validation();
    assert!(!options.allow_unknown_types && !options.validate_members && options.expand_deferred_keys);
    let options = DecoderOptions::default().without_key_expansion();
    assert!(!options.allow_unknown_types && options.validate_members && !options.expand_deferred_keys);
}

#[test]
fn test_deferred_content_size_mismatch() {
    let err = read_all(&dictionary(1)).unwrap_err();
    assert!(matches!(err.root(), Error::DeferredContentMismatch { .. }));
}

#[test]
fn test_compacted_key_subtree() {
    let value = vec![element("Button"), Record::ElementEnd];
    let key = vec![
        Record::KeyElementStart {
            type_id: type_id("TypeExtension"),
            flags: 0,
            value_position: 0,
            shared: false,
            shared_set: false,
        },
        Record::ConstructorParametersStart,
        Record::ConstructorParameterType { type_id: type_id("Button") },
        Record::ConstructorParametersEnd,
        Record::KeyElementEnd,
    ];
    let mut body = vec![
        element("ResourceDictionary"),
        xmlns("", PRESENTATION_URI),
        xmlns("x", XAML_URI),
        Record::DeferableContentStart { content_size: size(&key) + size(&value) },
    ];
    body.extend(key);
    body.extend(value);
    body.push(Record::ElementEnd);

    let nodes = read_all(&document(body)).unwrap();
    assert_eq!(elements(&nodes)[1].key(), Some("{x:Type Button}"));
}

#[test]
fn test_key_subtree_with_named_argument() {
    let value = vec![element("Button"), Record::ElementEnd];
    let key = vec![
        Record::KeyElementStart {
            type_id: type_id("ComponentResourceKey"),
            flags: 0,
            value_position: 0,
            shared: false,
            shared_set: false,
        },
        Record::Property { attribute_id: member_id("ComponentResourceKey", "ResourceId"), value: "Accent".into() },
        Record::KeyElementEnd,
    ];
    let mut body = vec![
        element("ResourceDictionary"),
        xmlns("", PRESENTATION_URI),
        Record::DeferableContentStart { content_size: size(&key) + size(&value) },
    ];
    body.extend(key);
    body.extend(value);
    body.push(Record::ElementEnd);

    let nodes = read_all(&document(body)).unwrap();
    assert_eq!(elements(&nodes)[1].key(), Some("{ComponentResourceKey ResourceId=Accent}"));
}

#[test]
fn test_optimized_static_resource_replay() {
    let value = vec![
        element("Button"),
        Record::PropertyWithStaticResourceId { attribute_id: member_id("Button", "Background"), static_resource_id: 0 },
        Record::ElementEnd,
    ];
    let keys = vec![
        Record::DefAttributeKeyString { value_id: 0, value_position: 0, shared: false, shared_set: false },
        Record::StaticResourceStart { type_id: type_id("StaticResourceExtension"), flags: 0 },
        Record::OptimizedStaticResource { flags: 0, value_id: 1 },
        Record::StaticResourceEnd,
    ];
    let mut body = vec![
        Record::StringInfo { string_id: 0, value: "styled".into() },
        Record::StringInfo { string_id: 1, value: "brush".into() },
        element("ResourceDictionary"),
        xmlns("", PRESENTATION_URI),
        Record::DeferableContentStart { content_size: size(&keys) + size(&value) },
    ];
    body.extend(keys);
    body.extend(value);
    body.push(Record::ElementEnd);

    let nodes = read_all(&document(body)).unwrap();
    let button = elements(&nodes)[1];
    assert_eq!(button.key(), Some("styled"));
    let background = button.property("Background").unwrap();
    assert_eq!(background.value.as_deref(), Some("{StaticResource brush}"));
}

#[test]
fn test_static_resource_element_replay() {
    let value = vec![
        element("Button"),
        Record::PropertyComplexStart { attribute_id: member_id("Button", "Background") },
        element("StaticResourceExtension"),
        Record::StaticResourceId { static_resource_id: 0 },
        Record::ElementEnd,
        Record::PropertyComplexEnd,
        Record::ElementEnd,
    ];
    let keys = vec![
        Record::DefAttributeKeyString { value_id: 0, value_position: 0, shared: false, shared_set: false },
        Record::StaticResourceStart { type_id: type_id("StaticResourceExtension"), flags: 0 },
        Record::Property {
            attribute_id: member_id("StaticResourceExtension", "ResourceKey"),
            value: "brush".into(),
        },
        Record::StaticResourceEnd,
    ];
    let mut body = vec![
        Record::StringInfo { string_id: 0, value: "styled".into() },
        element("ResourceDictionary"),
        xmlns("", PRESENTATION_URI),
        Record::DeferableContentStart { content_size: size(&keys) + size(&value) },
    ];
    body.extend(keys);
    body.extend(value);
    body.push(Record::ElementEnd);

    let nodes = read_all(&document(body)).unwrap();
    let resource = elements(&nodes)[2];
    assert_eq!(resource.name, "StaticResource");
    assert_eq!(resource.property("ResourceKey").unwrap().value.as_deref(), Some("brush"));
}

#[test]
fn test_unknown_static_resource_id() {
    let records = document(vec![
        element("Button"),
        Record::PropertyWithStaticResourceId { attribute_id: member_id("Button", "Background"), static_resource_id: 2 },
        Record::ElementEnd,
    ]);
    let err = read_all(&records).unwrap_err();
    assert!(matches!(err.root(), Error::UnknownStaticResource(2)));
}

#[test]
fn test_deferred_marker_outside_element() {
    let records = document(vec![Record::DeferableContentStart { content_size: 0 }]);
    let err = read_all(&records).unwrap_err();
    assert!(matches!(err.root(), Error::UnexpectedRecord { record: RecordType::DeferableContentStart, .. }));
}

// ============================================================================
// Iterator
// ============================================================================

#[test]
fn test_node_iter_stops_after_error() {
    let records = document(vec![element("Button"), Record::PropertyComplexEnd]);
    let data = bytes(&records);
    let results: Vec<_> = decode_iter(data.as_slice()).collect();
    assert!(results.last().unwrap().is_err());
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
}

#[test]
fn test_content_property_cached() {
    let records = document(vec![
        element("Button"),
        Record::ContentProperty { attribute_id: member_id("Button", "Content") },
        Record::Text { value: "OK".into() },
        Record::ElementEnd,
    ]);
    let data = bytes(&records);
    let mut reader = BamlReader::new(data.as_slice());
    assert!(reader.read().unwrap());
    assert!(reader.read().unwrap());
    assert_eq!(reader.content_property(), Some("Content"));
    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::Text);
    assert_eq!(reader.value(), Some("OK"));
}
