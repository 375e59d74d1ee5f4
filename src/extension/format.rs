//! Extension-Text für die Decoder-Richtung.

use std::borrow::Cow;

use super::{Argument, ParsedExtension};

/// Zeichen mit Sonderbedeutung innerhalb einer Extension.
const SPECIAL: [u8; 7] = [b'\\', b'{', b'}', b',', b'=', b'"', b'\''];

/// Escapes every character that would act as a delimiter inside `{...}`.
///
/// Grosse Bloecke ohne Sonderzeichen werden unverändert geliefert.
pub fn escape(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let first = [
        memchr::memchr3(SPECIAL[0], SPECIAL[1], SPECIAL[2], bytes),
        memchr::memchr3(SPECIAL[3], SPECIAL[4], SPECIAL[5], bytes),
        memchr::memchr(SPECIAL[6], bytes),
    ]
    .into_iter()
    .flatten()
    .min();
    let Some(first) = first else {
        return Cow::Borrowed(text);
    };
    let mut out = String::with_capacity(text.len() + 8);
    out.push_str(&text[..first]);
    for c in text[first..].chars() {
        if c.is_ascii() && SPECIAL.contains(&(c as u8)) {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Argument text that tokenizes back to `text`.
///
/// Leere oder von Whitespace umgebene Werte werden in `'...'` gesetzt,
/// sonst genügt [`escape`].
pub fn argument_text(text: &str) -> Cow<'_, str> {
    let padded = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
    if !text.is_empty() && !padded {
        return escape(text);
    }
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    Cow::Owned(out)
}

fn push_argument(out: &mut String, arg: &Argument) {
    match arg {
        Argument::Text(t) => out.push_str(&argument_text(t)),
        Argument::Nested(raw) => out.push_str(raw),
    }
}

/// Formats `{TypeName a, b, Name=value}`.
pub fn format_extension(ext: &ParsedExtension) -> String {
    let mut out = String::with_capacity(ext.type_name.len() + 16);
    out.push('{');
    out.push_str(&ext.type_name);
    let mut first = true;
    for arg in &ext.positional {
        out.push_str(if first { " " } else { ", " });
        first = false;
        push_argument(&mut out, arg);
    }
    for (name, arg) in &ext.named {
        out.push_str(if first { " " } else { ", " });
        first = false;
        out.push_str(name);
        out.push('=');
        push_argument(&mut out, arg);
    }
    out.push('}');
    out
}
