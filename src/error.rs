//! Central error types for the BAML codec.
//!
//! Drei Fehlerklassen: strukturelle Fehler (Scopes, Record-Tags, Stream-Ende),
//! Referenzfehler (IDs ohne Tabelleneintrag, unauflösbare Member) und
//! Grammatikfehler im Markup-Extension-Tokenizer. Alle sind für den
//! laufenden Pass fatal.

use core::fmt;
use std::borrow::Cow;

use crate::record::RecordType;

/// Source location of a markup construct (1-based line and column).
///
/// `line == 0` bedeutet: keine Debug-Information vorhanden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LineInfo {
    pub line: u32,
    pub position: u32,
}

impl LineInfo {
    pub const fn new(line: u32, position: u32) -> Self {
        Self { line, position }
    }

    /// True wenn Zeileninformation vorhanden ist.
    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Display for LineInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, position {}", self.line, self.position)
    }
}

/// Kind of a markup-extension grammar failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarErrorKind {
    /// `{Foo` without a closing brace.
    UnterminatedExtension,
    /// `,` or `=` before any token content.
    DelimiterBeforeContent,
    /// The same named argument appears twice.
    DuplicateNamedArgument,
    /// Open/close bracket characters do not nest.
    MalformedBracketCharacters,
    /// A quote that does not start a token, or text after a closing quote.
    MisplacedQuote,
    /// Positional argument after a named one.
    PositionalAfterNamed,
    /// Missing type name after `{`.
    MissingTypeName,
    /// Text after the closing brace of the extension.
    TrailingText,
    /// Unterminated quoted string.
    UnterminatedQuote,
}

impl GrammarErrorKind {
    fn describe(self) -> &'static str {
        match self {
            Self::UnterminatedExtension => "unterminated expression",
            Self::DelimiterBeforeContent => "delimiter before any content",
            Self::DuplicateNamedArgument => "duplicate named argument",
            Self::MalformedBracketCharacters => "malformed bracket characters",
            Self::MisplacedQuote => "badly placed quote",
            Self::PositionalAfterNamed => "positional argument after named argument",
            Self::MissingTypeName => "missing extension type name",
            Self::TrailingText => "text after closing brace",
            Self::UnterminatedQuote => "unterminated quoted string",
        }
    }
}

/// All errors raised while encoding or decoding BAML.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // ------------------------------------------------------------------
    // Strukturell
    // ------------------------------------------------------------------
    /// Version header names another format or an unsupported reader version.
    UnsupportedVersion(String),
    /// Version header could not be parsed.
    MalformedHeader,
    /// The stream ended inside a record or an open scope.
    PrematureEndOfStream,
    /// Record tag without a known record kind.
    UnknownRecord { tag: u8, offset: u64 },
    /// A record kind that is not legal at this position.
    UnexpectedRecord { record: RecordType, context: Cow<'static, str> },
    /// Declared body size does not match the decoded body.
    MalformedRecord { record: RecordType, declared: u64, actual: u64 },
    /// A close record that does not pair with the innermost open scope.
    ScopeMismatch { found: RecordType, expected: Option<RecordType> },
    /// Stream ended while a scope was still open.
    UnclosedScope(RecordType),
    /// Read on a reader that is closed or already at end of file.
    ReaderClosed,
    /// Deferred content block length disagrees with the bytes consumed.
    DeferredContentMismatch { expected: u64, actual: u64 },
    /// A deferred dictionary value without a key.
    MissingDictionaryKey(usize),
    /// Table entry arrived out of dense order.
    TableOutOfOrder { table: &'static str, expected: i16, found: i16 },
    /// More entries than a 16-bit id can address.
    TableOverflow(&'static str),
    /// A string payload is not valid UTF-8.
    InvalidString,
    /// A 7-bit encoded integer does not fit its target width.
    IntegerOverflow,
    /// Markup node sequence cannot be encoded at this point.
    InvalidNodeSequence(Cow<'static, str>),

    // ------------------------------------------------------------------
    // Referenzen
    // ------------------------------------------------------------------
    UnknownComponentId(i16),
    UnknownTypeId(i16),
    UnknownAttributeId(i16),
    UnknownStringId(i16),
    /// Static resource index not captured for the current key.
    UnknownStaticResource(i16),
    /// The host cannot load this component.
    UnresolvedComponent(String),
    /// The host cannot resolve this type.
    UnresolvedType(String),
    /// The owner type has no property or attached setter of this name.
    UnresolvedMember { owner: String, member: String },
    /// A namespace prefix without an in-scope declaration.
    UnresolvedPrefix(String),
    /// No constructor with this many arguments.
    ConstructorArity { type_name: String, count: usize },

    // ------------------------------------------------------------------
    // Grammatik
    // ------------------------------------------------------------------
    Grammar { kind: GrammarErrorKind, text: String, line: LineInfo },

    // ------------------------------------------------------------------
    // IO / Pipe
    // ------------------------------------------------------------------
    IoError(String),
    /// JSON node document could not be parsed or has the wrong shape.
    InvalidJson(String),
    /// Write or read on a closed pipe end.
    PipeClosed,
    /// Read outside the published range, or rewrite of published bytes.
    PipeOutOfRange { position: u64, published: u64 },

    /// Any of the above, annotated with where it happened.
    Located { line: u32, position: u64, inner: Box<Error> },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion(what) => write!(f, "unsupported BAML version: {what}"),
            Self::MalformedHeader => write!(f, "malformed BAML version header"),
            Self::PrematureEndOfStream => write!(f, "premature end of BAML stream"),
            Self::UnknownRecord { tag, offset } => {
                write!(f, "unknown record type {tag} at byte {offset}")
            }
            Self::UnexpectedRecord { record, context } => {
                if context.is_empty() {
                    write!(f, "unexpected {record:?} record")
                } else {
                    write!(f, "unexpected {record:?} record: {context}")
                }
            }
            Self::MalformedRecord { record, declared, actual } => write!(
                f,
                "malformed {record:?} record: declared size {declared}, decoded {actual}"
            ),
            Self::ScopeMismatch { found, expected: Some(expected) } => {
                write!(f, "scope mismatch: found {found:?}, expected {expected:?}")
            }
            Self::ScopeMismatch { found, expected: None } => {
                write!(f, "scope mismatch: found {found:?} with no open scope")
            }
            Self::UnclosedScope(kind) => write!(f, "stream ended inside open {kind:?} scope"),
            Self::ReaderClosed => write!(f, "reader closed"),
            Self::DeferredContentMismatch { expected, actual } => write!(
                f,
                "deferred content size mismatch: expected {expected} bytes, consumed {actual}"
            ),
            Self::MissingDictionaryKey(index) => {
                write!(f, "deferred dictionary value #{index} has no key")
            }
            Self::TableOutOfOrder { table, expected, found } => {
                write!(f, "{table} table entry {found} out of order, expected {expected}")
            }
            Self::TableOverflow(table) => write!(f, "{table} table exceeds 16-bit id space"),
            Self::InvalidString => write!(f, "string payload is not valid UTF-8"),
            Self::IntegerOverflow => write!(f, "encoded integer overflow"),
            Self::InvalidNodeSequence(msg) => write!(f, "invalid markup node sequence: {msg}"),
            Self::UnknownComponentId(id) => write!(f, "unknown component id {id}"),
            Self::UnknownTypeId(id) => write!(f, "unknown type id {id}"),
            Self::UnknownAttributeId(id) => write!(f, "unknown attribute id {id}"),
            Self::UnknownStringId(id) => write!(f, "unknown string id {id}"),
            Self::UnknownStaticResource(id) => write!(f, "unknown static resource id {id}"),
            Self::UnresolvedComponent(name) => write!(f, "cannot resolve component '{name}'"),
            Self::UnresolvedType(name) => write!(f, "cannot resolve type '{name}'"),
            Self::UnresolvedMember { owner, member } => {
                write!(f, "type '{owner}' has no property or attached property '{member}'")
            }
            Self::UnresolvedPrefix(prefix) => write!(f, "undeclared namespace prefix '{prefix}'"),
            Self::ConstructorArity { type_name, count } => {
                write!(f, "type '{type_name}' has no constructor taking {count} argument(s)")
            }
            Self::Grammar { kind, text, line } => {
                if line.is_known() {
                    write!(f, "{} in '{text}', {line}", kind.describe())
                } else {
                    write!(f, "{} in '{text}'", kind.describe())
                }
            }
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
            Self::InvalidJson(msg) => write!(f, "invalid JSON node document: {msg}"),
            Self::PipeClosed => write!(f, "byte pipe closed"),
            Self::PipeOutOfRange { position, published } => write!(
                f,
                "byte pipe position {position} outside published range (watermark {published})"
            ),
            Self::Located { line, position, inner } => {
                if *line == 0 {
                    write!(f, "{inner} (at byte {position})")
                } else {
                    write!(f, "{inner} (line {line}, position {position})")
                }
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::PrematureEndOfStream
        } else {
            Self::IoError(e.to_string())
        }
    }
}

impl Error {
    /// Erstellt einen `ScopeMismatch` Fehler.
    pub fn scope_mismatch(found: RecordType, expected: Option<RecordType>) -> Self {
        Self::ScopeMismatch { found, expected }
    }

    /// Erstellt einen `UnexpectedRecord` Fehler mit Kontext.
    pub fn unexpected(record: RecordType, context: impl Into<Cow<'static, str>>) -> Self {
        Self::UnexpectedRecord { record, context: context.into() }
    }

    /// Erstellt einen Grammatikfehler für den gegebenen Ausdruck.
    pub fn grammar(kind: GrammarErrorKind, text: impl Into<String>, line: LineInfo) -> Self {
        Self::Grammar { kind, text: text.into(), line }
    }

    pub fn invalid_sequence(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidNodeSequence(msg.into())
    }

    /// Annotiert den Fehler mit Zeile/Position. Bereits annotierte Fehler und
    /// Grammatikfehler (tragen ihre Position selbst) bleiben unverändert.
    pub fn at(self, line: LineInfo, byte_offset: u64) -> Self {
        match self {
            Self::Located { .. } | Self::Grammar { .. } => self,
            other if line.is_known() => Self::Located {
                line: line.line,
                position: u64::from(line.position),
                inner: Box::new(other),
            },
            other => Self::Located { line: 0, position: byte_offset, inner: Box::new(other) },
        }
    }

    /// Liefert den eigentlichen Fehler ohne Positionsannotation.
    pub fn root(&self) -> &Error {
        match self {
            Self::Located { inner, .. } => inner.root(),
            other => other,
        }
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_mismatch_names_both_kinds() {
        let e = Error::scope_mismatch(RecordType::PropertyComplexEnd, Some(RecordType::ElementEnd));
        let msg = e.to_string();
        assert!(msg.contains("PropertyComplexEnd"), "{msg}");
        assert!(msg.contains("ElementEnd"), "{msg}");
    }

    #[test]
    fn scope_mismatch_without_open_scope() {
        let msg = Error::scope_mismatch(RecordType::ElementEnd, None).to_string();
        assert!(msg.contains("no open scope"), "{msg}");
    }

    #[test]
    fn grammar_error_carries_text_and_position() {
        let e = Error::grammar(GrammarErrorKind::UnterminatedExtension, "{Foo", LineInfo::new(3, 17));
        let msg = e.to_string();
        assert!(msg.contains("unterminated"), "{msg}");
        assert!(msg.contains("{Foo"), "{msg}");
        assert!(msg.contains("line 3, position 17"), "{msg}");
    }

    #[test]
    fn located_with_line_info() {
        let e = Error::UnknownTypeId(42).at(LineInfo::new(7, 2), 100);
        let msg = e.to_string();
        assert!(msg.contains("line 7, position 2"), "{msg}");
        assert_eq!(e.root(), &Error::UnknownTypeId(42));
    }

    #[test]
    fn located_without_line_info_uses_byte_offset() {
        let e = Error::ReaderClosed.at(LineInfo::default(), 128);
        assert!(e.to_string().contains("at byte 128"), "{e}");
    }

    #[test]
    fn located_is_not_wrapped_twice() {
        let e = Error::PrematureEndOfStream.at(LineInfo::new(1, 1), 0).at(LineInfo::new(9, 9), 5);
        assert!(e.to_string().contains("line 1, position 1"), "{e}");
        assert!(!e.to_string().contains("line 9"), "{e}");
    }

    #[test]
    fn grammar_errors_keep_their_own_position() {
        let e = Error::grammar(GrammarErrorKind::MisplacedQuote, "{A b'c'}", LineInfo::new(2, 4))
            .at(LineInfo::new(8, 1), 0);
        assert!(matches!(e, Error::Grammar { .. }));
    }

    #[test]
    fn unresolved_member_names_owner_and_member() {
        let e = Error::UnresolvedMember { owner: "Button".into(), member: "Colour".into() };
        let msg = e.to_string();
        assert!(msg.contains("Button"), "{msg}");
        assert!(msg.contains("Colour"), "{msg}");
    }

    #[test]
    fn io_eof_maps_to_premature_end() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(Error::from(io), Error::PrematureEndOfStream);
    }

    #[test]
    fn error_implements_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(Error::ReaderClosed);
        assert_eq!(e.to_string(), "reader closed");
    }
}
