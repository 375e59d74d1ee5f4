use super::*;
use crate::error::{GrammarErrorKind, LineInfo};
use crate::namespaces::{PRESENTATION_URI, XAML_URI, split_qualified};
use crate::node::{MarkupNode, MemberName, XamlName};
use crate::Error;

fn no_brackets() -> BracketCharacters {
    BracketCharacters::new()
}

fn ext(text: &str) -> ParsedExtension {
    match parse(text, &no_brackets(), LineInfo::default()).unwrap() {
        AttributeText::Extension(e) => e,
        AttributeText::Literal(l) => panic!("expected extension, got literal {l:?}"),
    }
}

fn grammar_kind(text: &str) -> GrammarErrorKind {
    match parse(text, &no_brackets(), LineInfo::new(4, 9)) {
        Err(Error::Grammar { kind, text: t, line }) => {
            assert_eq!(t, text);
            assert_eq!(line, LineInfo::new(4, 9));
            kind
        }
        other => panic!("expected grammar error for {text:?}, got {other:?}"),
    }
}

struct Prefixes;

impl ExtensionResolver for Prefixes {
    fn resolve_extension(&self, written: &str) -> crate::Result<XamlName> {
        let (prefix, local) = split_qualified(written);
        let ns = match prefix {
            "" => PRESENTATION_URI,
            "x" => XAML_URI,
            "local" => "clr-namespace:Acme",
            other => return Err(Error::UnresolvedPrefix(other.to_string())),
        };
        let local = crate::known::known()
            .find_xml_extension(ns, local)
            .and_then(|id| crate::known::known().type_entry(id))
            .map_or(local, |t| t.name);
        Ok(XamlName::new(ns, local))
    }

    fn constructor_arities(&self, name: &XamlName) -> Vec<usize> {
        crate::known::known()
            .find_xml_type(&name.namespace, &name.local)
            .and_then(|id| crate::known::known().type_entry(id))
            .map(|t| t.constructor_arities.to_vec())
            .unwrap_or_default()
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[test]
fn test_literal_escape_is_not_an_extension() {
    let parsed = parse("{}Literal", &no_brackets(), LineInfo::default()).unwrap();
    assert_eq!(parsed, AttributeText::Literal("Literal".into()));
    let plain = parse("Hello {world}", &no_brackets(), LineInfo::default()).unwrap();
    assert_eq!(plain, AttributeText::Literal("Hello {world}".into()));
}

#[test]
fn test_type_extension_has_one_positional() {
    let e = ext("{x:Type local:Foo}");
    assert_eq!(e.type_name, "x:Type");
    assert_eq!(e.positional, vec![Argument::Text("local:Foo".into())]);
    assert!(e.named.is_empty());
    assert_eq!(
        e.single_argument(KnownExtension::Type.parameter()),
        Some(&Argument::Text("local:Foo".into()))
    );
}

#[test]
fn test_named_arguments_with_nested_extension() {
    let e = ext("{Binding Path=Name, Converter={StaticResource conv}}");
    assert_eq!(e.type_name, "Binding");
    assert!(e.positional.is_empty());
    assert_eq!(
        e.named,
        vec![
            ("Path".to_string(), Argument::Text("Name".into())),
            ("Converter".to_string(), Argument::Nested("{StaticResource conv}".into())),
        ]
    );
}

#[test]
fn test_bracket_characters_suppress_commas() {
    let mut brackets = BracketCharacters::new();
    brackets.register("Foo", "(a,b)", '(', ')');
    let AttributeText::Extension(e) = parse("{Foo (a,b)=1}", &brackets, LineInfo::default()).unwrap() else {
        panic!("not an extension");
    };
    assert_eq!(e.named, vec![("(a,b)".to_string(), Argument::Text("1".into()))]);
}

#[test]
fn test_bracket_characters_scope_to_their_parameter() {
    let mut brackets = BracketCharacters::new();
    brackets.register("FooExtension", "Path", '[', ']');
    let AttributeText::Extension(e) =
        parse("{Foo Path=a[x,y], Other=b}", &brackets, LineInfo::default()).unwrap()
    else {
        panic!("not an extension");
    };
    assert_eq!(e.named[0], ("Path".to_string(), Argument::Text("a[x,y]".into())));
    assert_eq!(e.named[1], ("Other".to_string(), Argument::Text("b".into())));
}

#[test]
fn test_mismatched_bracket_characters() {
    let mut brackets = BracketCharacters::new();
    brackets.register("Foo", "P", '(', ')');
    brackets.register("Foo", "P", '[', ']');
    let err = parse("{Foo P=(a]}", &brackets, LineInfo::default()).unwrap_err();
    assert!(matches!(err, Error::Grammar { kind: GrammarErrorKind::MalformedBracketCharacters, .. }));
    let err = parse("{Foo P=(a}", &brackets, LineInfo::default()).unwrap_err();
    assert!(matches!(err, Error::Grammar { .. }));
}

#[test]
fn test_escapes_apply_everywhere() {
    let e = ext(r"{Foo a\,b, 'q\'x', {Bar c\}d}}");
    assert_eq!(e.positional[0], Argument::Text("a,b".into()));
    assert_eq!(e.positional[1], Argument::Text("q'x".into()));
    // in verschachtelten Ausdrücken bleibt das Escape für die Rekursion erhalten
    assert_eq!(e.positional[2], Argument::Nested(r"{Bar c\}d}".into()));
}

#[test]
fn test_quotes_keep_delimiters_and_whitespace() {
    let e = ext("{Foo Text=' a, b = c ', Two=\"}\"}");
    assert_eq!(e.named[0].1, Argument::Text(" a, b = c ".into()));
    assert_eq!(e.named[1].1, Argument::Text("}".into()));
}

#[test]
fn test_inner_whitespace_is_kept_outer_trimmed() {
    let e = ext("{Foo   hello world  ,x }");
    assert_eq!(e.positional[0], Argument::Text("hello world".into()));
    assert_eq!(e.positional[1], Argument::Text("x".into()));
}

#[test]
fn test_escaped_literal_as_argument_value() {
    let e = ext("{Foo Value={}{literal}}");
    assert_eq!(e.named[0].1, Argument::Text("{literal}".into()));
}

#[test]
fn test_unterminated_extension_reports_text_and_line() {
    assert_eq!(grammar_kind("{Foo"), GrammarErrorKind::UnterminatedExtension);
    assert_eq!(grammar_kind("{Foo a, {Bar}"), GrammarErrorKind::UnterminatedExtension);
    let msg = parse("{Foo", &no_brackets(), LineInfo::new(12, 5)).unwrap_err().to_string();
    assert!(msg.contains("unterminated expression"), "{msg}");
    assert!(msg.contains("line 12, position 5"), "{msg}");
}

#[test]
fn test_grammar_errors() {
    assert_eq!(grammar_kind("{Foo ,a}"), GrammarErrorKind::DelimiterBeforeContent);
    assert_eq!(grammar_kind("{Foo a,,b}"), GrammarErrorKind::DelimiterBeforeContent);
    assert_eq!(grammar_kind("{Foo a,}"), GrammarErrorKind::DelimiterBeforeContent);
    assert_eq!(grammar_kind("{Foo =a}"), GrammarErrorKind::DelimiterBeforeContent);
    assert_eq!(grammar_kind("{Foo A=1, A=2}"), GrammarErrorKind::DuplicateNamedArgument);
    assert_eq!(grammar_kind("{Foo ab'c'}"), GrammarErrorKind::MisplacedQuote);
    assert_eq!(grammar_kind("{Foo 'a'b}"), GrammarErrorKind::MisplacedQuote);
    assert_eq!(grammar_kind("{Foo A=1, b}"), GrammarErrorKind::PositionalAfterNamed);
    assert_eq!(grammar_kind("{ }"), GrammarErrorKind::MissingTypeName);
    assert_eq!(grammar_kind("{Foo} tail"), GrammarErrorKind::TrailingText);
    assert_eq!(grammar_kind("{Foo 'open}"), GrammarErrorKind::UnterminatedQuote);
}

#[test]
fn test_no_argument_extension() {
    let e = ext("{x:Null}");
    assert_eq!(e.type_name, "x:Null");
    assert!(e.positional.is_empty() && e.named.is_empty());
}

// ============================================================================
// KnownExtension
// ============================================================================

#[test]
fn test_known_extensions_resolve_by_markup_name() {
    assert_eq!(KnownExtension::from_name(XAML_URI, "Type"), Some(KnownExtension::Type));
    assert_eq!(KnownExtension::from_name(XAML_URI, "Static"), Some(KnownExtension::Static));
    assert_eq!(
        KnownExtension::from_name(PRESENTATION_URI, "StaticResource"),
        Some(KnownExtension::StaticResource)
    );
    assert_eq!(KnownExtension::from_name(PRESENTATION_URI, "Binding"), None);
    for k in KnownExtension::ALL {
        let wire = k.wire_id().unwrap();
        assert!(wire & !crate::record::EXTENSION_ID_MASK == 0);
        assert_eq!(KnownExtension::from_wire_id(wire), Some(k));
    }
}

#[test]
fn test_single_argument_accepts_conventional_name() {
    let e = ext("{StaticResource ResourceKey=brush}");
    assert_eq!(e.single_argument("ResourceKey"), Some(&Argument::Text("brush".into())));
    assert_eq!(e.single_argument("Other"), None);
    let two = ext("{StaticResource a, b}");
    assert_eq!(two.single_argument("ResourceKey"), None);
}

// ============================================================================
// Compile / Format
// ============================================================================

#[test]
fn test_compile_orders_properties_arguments_and_nested() {
    let e = ext("{Binding Path=Name, Converter={StaticResource conv}}");
    let nodes = compile(&e, &Prefixes, &no_brackets(), LineInfo::default()).unwrap();
    let sre = XamlName::new(PRESENTATION_URI, "StaticResourceExtension");
    assert_eq!(
        nodes,
        vec![
            MarkupNode::ElementStart(XamlName::new(PRESENTATION_URI, "Binding")),
            MarkupNode::Property { member: MemberName::new("Path"), value: "Name".into() },
            MarkupNode::PropertyElementStart(MemberName::new("Converter")),
            MarkupNode::ElementStart(sre),
            MarkupNode::ConstructorArgsStart,
            MarkupNode::Text("conv".into()),
            MarkupNode::ConstructorArgsEnd,
            MarkupNode::ElementEnd,
            MarkupNode::PropertyElementEnd,
            MarkupNode::ElementEnd,
        ]
    );
}

#[test]
fn test_compile_checks_constructor_arity() {
    let e = ext("{x:Null a}");
    let err = compile(&e, &Prefixes, &no_brackets(), LineInfo::default()).unwrap_err();
    assert_eq!(err, Error::ConstructorArity { type_name: "x:Null".into(), count: 1 });
}

#[test]
fn test_compile_reports_unknown_prefix() {
    let e = ext("{nope:Thing}");
    let err = compile(&e, &Prefixes, &no_brackets(), LineInfo::default()).unwrap_err();
    assert_eq!(err, Error::UnresolvedPrefix("nope".into()));
}

#[test]
fn test_escape_only_allocates_when_needed() {
    assert!(matches!(escape("plain text"), std::borrow::Cow::Borrowed(_)));
    assert_eq!(escape("a{b}c,d=e'f\"g\\h"), r#"a\{b\}c\,d\=e\'f\"g\\h"#);
}

#[test]
fn test_formatted_text_parses_back() {
    let original = ParsedExtension {
        type_name: "local:Key".into(),
        positional: vec![Argument::Text("a,b".into()), Argument::Nested("{x:Type Button}".into())],
        named: vec![("Id".into(), Argument::Text("{odd}".into()))],
    };
    let text = format_extension(&original);
    assert_eq!(text, r"{local:Key a\,b, {x:Type Button}, Id=\{odd\}}");
    assert_eq!(ext(&text), original);
}

#[test]
fn test_argument_text_quotes_empty_and_padded() {
    assert_eq!(argument_text(""), "''");
    assert_eq!(argument_text(" padded "), "' padded '");
    assert_eq!(argument_text(" it's "), r"' it\'s '");
    assert!(matches!(argument_text("plain"), std::borrow::Cow::Borrowed(_)));

    let original = ParsedExtension {
        type_name: "ComponentResourceKey".into(),
        positional: Vec::new(),
        named: vec![("ResourceId".into(), Argument::Text(String::new())), ("Tag".into(), Argument::Text(" x ".into()))],
    };
    let text = format_extension(&original);
    assert_eq!(text, "{ComponentResourceKey ResourceId='', Tag=' x '}");
    assert_eq!(ext(&text), original);
}
