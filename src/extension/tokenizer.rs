//! Tokenizer für `{...}` Attributwerte.
//!
//! Regeln:
//! - `{}` am Anfang: Rest ist Literaltext.
//! - `\` maskiert immer das nächste Zeichen (auch in Quotes, verschachtelten
//!   Klammern und Bracket-Paaren).
//! - Quotes nur am Tokenanfang; nach dem schließenden Quote nur Whitespace.
//! - Verschachtelte `{}` werden balanciert und roh übernommen.
//! - Bracket-Paare eines Parameters unterdrücken `,` `=` `}`.

use super::{Argument, AttributeText, BracketCharacters, ParsedExtension};
use crate::error::{GrammarErrorKind as Kind, LineInfo};
use crate::{Error, Result};

const LITERAL_ESCAPE: &str = "{}";

/// Tokenizes an attribute value.
///
/// Text that does not start with `{` and text starting with the `{}`
/// escape are literals. Everything else must be a complete extension.
pub fn parse(text: &str, brackets: &BracketCharacters, line: LineInfo) -> Result<AttributeText> {
    if let Some(rest) = text.strip_prefix(LITERAL_ESCAPE) {
        return Ok(AttributeText::Literal(rest.to_string()));
    }
    if !text.starts_with('{') {
        return Ok(AttributeText::Literal(text.to_string()));
    }
    Tokenizer { text, chars: text.chars().collect(), pos: 1, brackets, line }
        .run()
        .map(AttributeText::Extension)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Comma,
    Equals,
    Close,
}

#[derive(Debug, Default)]
struct Token {
    value: String,
    /// Any content at all (quoted empty string counts).
    started: bool,
    quoted: bool,
    nested: bool,
}

impl Token {
    fn into_argument(self) -> Argument {
        if self.nested && !self.quoted {
            match self.value.strip_prefix(LITERAL_ESCAPE) {
                Some(rest) => Argument::Text(rest.to_string()),
                None => Argument::Nested(self.value),
            }
        } else {
            Argument::Text(self.value)
        }
    }
}

struct Tokenizer<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
    brackets: &'a BracketCharacters,
    line: LineInfo,
}

impl Tokenizer<'_> {
    fn err(&self, kind: Kind) -> Error {
        Error::grammar(kind, self.text, self.line)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn run(mut self) -> Result<ParsedExtension> {
        self.skip_whitespace();
        let type_name = self.scan_type_name()?;
        let union = self.brackets.union(&type_name);
        let mut ext = ParsedExtension { type_name, ..ParsedExtension::default() };

        let mut after_comma = false;
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.err(Kind::UnterminatedExtension)),
                Some('}') => {
                    if after_comma {
                        return Err(self.err(Kind::DelimiterBeforeContent));
                    }
                    self.pos += 1;
                    break;
                }
                Some(_) => {}
            }

            let (token, delimiter) = self.scan_token(&union, true)?;
            let delimiter = if delimiter == Delimiter::Equals {
                if !token.started {
                    return Err(self.err(Kind::DelimiterBeforeContent));
                }
                if token.quoted || token.nested {
                    return Err(self.err(Kind::MisplacedQuote));
                }
                let name = token.value;
                let pairs = self.brackets.for_parameter(&ext.type_name, &name);
                let (value, delimiter) = self.scan_token(&pairs, false)?;
                if !value.started {
                    return Err(self.err(Kind::DelimiterBeforeContent));
                }
                if ext.named.iter().any(|(n, _)| *n == name) {
                    return Err(self.err(Kind::DuplicateNamedArgument));
                }
                ext.named.push((name, value.into_argument()));
                delimiter
            } else {
                if !token.started {
                    return Err(self.err(Kind::DelimiterBeforeContent));
                }
                if !ext.named.is_empty() {
                    return Err(self.err(Kind::PositionalAfterNamed));
                }
                ext.positional.push(token.into_argument());
                delimiter
            };

            match delimiter {
                Delimiter::Comma => after_comma = true,
                Delimiter::Close => break,
                // scan_token(.., false) never stops at '='
                Delimiter::Equals => return Err(self.err(Kind::DelimiterBeforeContent)),
            }
        }

        if self.chars[self.pos..].iter().any(|c| !c.is_whitespace()) {
            return Err(self.err(Kind::TrailingText));
        }
        Ok(ext)
    }

    fn scan_type_name(&mut self) -> Result<String> {
        let mut name = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err(Kind::UnterminatedExtension)),
                Some(c) if c.is_whitespace() || c == '}' => break,
                Some(',' | '=') => return Err(self.err(Kind::DelimiterBeforeContent)),
                Some('"' | '\'') => return Err(self.err(Kind::MisplacedQuote)),
                Some('{' | '\\') => return Err(self.err(Kind::MissingTypeName)),
                Some(c) => {
                    name.push(c);
                    self.pos += 1;
                }
            }
        }
        if name.is_empty() {
            return Err(self.err(Kind::MissingTypeName));
        }
        Ok(name)
    }

    /// Scans one token up to (and consuming) its delimiter.
    fn scan_token(&mut self, pairs: &[(char, char)], stop_at_equals: bool) -> Result<(Token, Delimiter)> {
        self.skip_whitespace();
        let mut token = Token::default();
        // Länge des Puffers bis zum letzten signifikanten Zeichen
        let mut keep = 0usize;
        let mut quote: Option<char> = None;
        let mut quote_closed = false;
        let mut braces = 0usize;
        let mut stack: Vec<char> = Vec::new();

        let delimiter = loop {
            let Some(c) = self.peek() else {
                return Err(self.err(if quote.is_some() {
                    Kind::UnterminatedQuote
                } else {
                    Kind::UnterminatedExtension
                }));
            };
            self.pos += 1;

            if c == '\\' {
                let Some(next) = self.peek() else {
                    return Err(self.err(Kind::UnterminatedExtension));
                };
                self.pos += 1;
                if quote_closed {
                    return Err(self.err(Kind::MisplacedQuote));
                }
                if braces > 0 {
                    token.value.push('\\');
                }
                token.value.push(next);
                keep = token.value.len();
                token.started = true;
                continue;
            }

            if let Some(q) = quote {
                if c == q {
                    quote = None;
                    quote_closed = true;
                } else {
                    token.value.push(c);
                }
                keep = token.value.len();
                continue;
            }

            if braces > 0 {
                match c {
                    '{' => braces += 1,
                    '}' => braces -= 1,
                    _ => {}
                }
                token.value.push(c);
                keep = token.value.len();
                continue;
            }

            if let Some(&close) = stack.last() {
                if c == close {
                    stack.pop();
                } else if let Some(&(_, inner)) = pairs.iter().find(|(open, _)| *open == c) {
                    stack.push(inner);
                } else if pairs.iter().any(|(_, cl)| *cl == c) {
                    return Err(self.err(Kind::MalformedBracketCharacters));
                }
                token.value.push(c);
                keep = token.value.len();
                continue;
            }

            match c {
                ',' => break Delimiter::Comma,
                '=' if stop_at_equals => break Delimiter::Equals,
                '}' => break Delimiter::Close,
                '"' | '\'' => {
                    if token.started || quote_closed {
                        return Err(self.err(Kind::MisplacedQuote));
                    }
                    quote = Some(c);
                    token.quoted = true;
                    token.started = true;
                }
                c if c.is_whitespace() => {
                    if token.started && !quote_closed {
                        token.value.push(c);
                    }
                }
                c => {
                    if quote_closed {
                        return Err(self.err(Kind::MisplacedQuote));
                    }
                    if c == '{' {
                        token.nested |= !token.started;
                        braces = 1;
                    } else if let Some(&(_, close)) = pairs.iter().find(|(open, _)| *open == c) {
                        stack.push(close);
                    } else if pairs.iter().any(|(_, cl)| *cl == c) {
                        return Err(self.err(Kind::MalformedBracketCharacters));
                    }
                    token.value.push(c);
                    keep = token.value.len();
                    token.started = true;
                }
            }
        };

        if !stack.is_empty() {
            return Err(self.err(Kind::MalformedBracketCharacters));
        }
        token.value.truncate(keep);
        Ok((token, delimiter))
    }
}
