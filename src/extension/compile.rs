//! Übersetzt geparste Extensions in Markup-Knoten.
//!
//! Verschachtelte Extensions werden über einen expliziten Arbeitsstapel
//! expandiert, nicht rekursiv.

use super::{Argument, AttributeText, BracketCharacters, ParsedExtension, parse};
use crate::error::LineInfo;
use crate::node::{MarkupNode, MemberName, XamlName};
use crate::{Error, Result};

/// Name and constructor lookups needed while compiling.
pub trait ExtensionResolver {
    /// Resolves a written type name (`prefix:Name`) to the element name of
    /// the extension type, applying the `Extension` suffix rule.
    fn resolve_extension(&self, written: &str) -> Result<XamlName>;

    /// Accepted constructor argument counts; empty means unchecked.
    fn constructor_arities(&self, name: &XamlName) -> Vec<usize>;
}

enum Work {
    Expand(ParsedExtension),
    Parse(String),
    Emit(MarkupNode),
}

/// Expands `ext` into an element subtree.
///
/// Reihenfolge: ElementStart, einfache benannte Properties, Konstruktor-
/// Argumente, Property-Elemente für verschachtelte benannte Werte,
/// ElementEnd.
pub fn compile(
    ext: &ParsedExtension,
    resolver: &dyn ExtensionResolver,
    brackets: &BracketCharacters,
    line: LineInfo,
) -> Result<Vec<MarkupNode>> {
    let mut out = Vec::new();
    let mut stack = vec![Work::Expand(ext.clone())];

    while let Some(work) = stack.pop() {
        match work {
            Work::Emit(node) => out.push(node),
            Work::Parse(raw) => match parse(&raw, brackets, line)? {
                AttributeText::Extension(inner) => stack.push(Work::Expand(inner)),
                AttributeText::Literal(text) => stack.push(Work::Emit(MarkupNode::Text(text))),
            },
            Work::Expand(ext) => {
                let name = resolver.resolve_extension(&ext.type_name)?;
                let arities = resolver.constructor_arities(&name);
                let count = ext.positional.len();
                if !arities.is_empty() && !arities.contains(&count) {
                    return Err(Error::ConstructorArity { type_name: ext.type_name.clone(), count });
                }

                let mut items = vec![Work::Emit(MarkupNode::ElementStart(name))];
                for (member, arg) in &ext.named {
                    if let Argument::Text(value) = arg {
                        items.push(Work::Emit(MarkupNode::Property {
                            member: MemberName::new(member.as_str()),
                            value: literal_value(value),
                        }));
                    }
                }
                if count > 0 {
                    items.push(Work::Emit(MarkupNode::ConstructorArgsStart));
                    for arg in &ext.positional {
                        items.push(match arg {
                            Argument::Text(text) => Work::Emit(MarkupNode::Text(text.clone())),
                            Argument::Nested(raw) => Work::Parse(raw.clone()),
                        });
                    }
                    items.push(Work::Emit(MarkupNode::ConstructorArgsEnd));
                }
                for (member, arg) in &ext.named {
                    if let Argument::Nested(raw) = arg {
                        items.push(Work::Emit(MarkupNode::PropertyElementStart(MemberName::new(
                            member.as_str(),
                        ))));
                        items.push(Work::Parse(raw.clone()));
                        items.push(Work::Emit(MarkupNode::PropertyElementEnd));
                    }
                }
                items.push(Work::Emit(MarkupNode::ElementEnd));
                stack.extend(items.into_iter().rev());
            }
        }
    }
    Ok(out)
}

/// Text values that look like an extension get the `{}` escape back.
fn literal_value(value: &str) -> String {
    if value.starts_with('{') { format!("{{}}{value}") } else { value.to_string() }
}
