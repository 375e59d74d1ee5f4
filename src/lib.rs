//! baml – Binary Application Markup codec.
//!
//! Kompaktes Record-Format für vorkompiliertes, XML-basiertes UI-Markup:
//! Interning-Tabellen für Komponenten, Typen, Member und Strings, ein
//! Pull-Decoder mit Rekonstruktion von Deferred Content, der symmetrische
//! Encoder und der Tokenizer/Compiler für Markup-Extensions.
//!
//! # Beispiel
//!
//! ```
//! use baml::{EncoderConfig, MarkupNode, NodeType, decode, encode};
//! use baml::namespaces::PRESENTATION_URI;
//!
//! // Encode
//! let nodes = vec![
//!     MarkupNode::DocumentStart,
//!     MarkupNode::element(PRESENTATION_URI, "Button"),
//!     MarkupNode::xmlns("", PRESENTATION_URI),
//!     MarkupNode::property("Content", "Hello"),
//!     MarkupNode::ElementEnd,
//!     MarkupNode::DocumentEnd,
//! ];
//! let bytes = encode(&nodes, &EncoderConfig::default()).unwrap();
//!
//! // Decode
//! let decoded = decode(&bytes).unwrap();
//! assert_eq!(decoded.len(), 4);
//! assert_eq!(decoded[1].node_type, NodeType::StartElement);
//! assert_eq!(decoded[1].property("Content").unwrap().value.as_deref(), Some("Hello"));
//! ```

pub mod bytestream;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod extension;
pub mod header;
pub mod json;
pub mod known;
pub mod map_table;
pub mod namespaces;
pub mod node;
pub mod pipe;
pub mod record;
pub mod reflect;
pub mod unsigned_integer;

pub use error::{Error, LineInfo, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent; nur intern).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Nodes
pub use node::{BamlNode, ComplexKind, MarkupNode, MemberName, NodeType, XamlName};

// Public API: Header
pub use header::BamlHeader;

// Public API: Encoder/Decoder
pub use decoder::{BamlReader, DecoderOptions, NodeIter, decode, decode_iter, decode_with};
pub use encoder::{BamlWriter, EncoderConfig, encode, encode_positioned, encode_with};

// Public API: Types and tables
pub use map_table::{MapTable, ResolutionCache};
pub use reflect::{MemberDescriptor, StaticTypeSystem, TypeDescriptor, TypeKind, TypeRef, TypeSystem};

// Public API: Extensions
pub use extension::{AttributeText, BracketCharacters, KnownExtension, ParsedExtension};

// Public API: Streaming
pub use pipe::{PipeReader, PipeWriter, byte_pipe};
