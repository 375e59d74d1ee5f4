//! BAML Record Codec.
//!
//! Jeder Record beginnt mit einem 1-Byte Tag ([`RecordType`]). Records mit
//! variabler Länge (Strings, Listen) tragen danach ihre Body-Größe als 7-Bit
//! Integer; Festbreitenfelder sind little-endian, Strings sind UTF-8 mit
//! 7-Bit-Längenpräfix.
//!
//! Der Codec validiert nur strukturell: Tag bekannt, Body vollständig und
//! Body-Größe konsistent. IDs, Scopes und Tabellen prüft der Decoder.

use std::io::Read;

use crate::bytestream::{ByteReader, ByteWriter};
use crate::{Error, Result, unsigned_integer};

/// Record kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum RecordType {
    DocumentStart = 1,
    DocumentEnd = 2,
    ElementStart = 3,
    ElementEnd = 4,
    Property = 5,
    PropertyComplexStart = 7,
    PropertyComplexEnd = 8,
    PropertyArrayStart = 9,
    PropertyArrayEnd = 10,
    PropertyIListStart = 11,
    PropertyIListEnd = 12,
    PropertyIDictionaryStart = 13,
    PropertyIDictionaryEnd = 14,
    LiteralContent = 15,
    Text = 16,
    TextWithConverter = 17,
    XmlnsProperty = 20,
    DefAttribute = 25,
    PiMapping = 27,
    AssemblyInfo = 28,
    TypeInfo = 29,
    TypeSerializerInfo = 30,
    AttributeInfo = 31,
    StringInfo = 32,
    PropertyStringReference = 33,
    PropertyTypeReference = 34,
    PropertyWithExtension = 35,
    PropertyWithConverter = 36,
    DeferableContentStart = 37,
    DefAttributeKeyString = 38,
    DefAttributeKeyType = 39,
    KeyElementStart = 40,
    KeyElementEnd = 41,
    ConstructorParametersStart = 42,
    ConstructorParametersEnd = 43,
    ConstructorParameterType = 44,
    ConnectionId = 45,
    ContentProperty = 46,
    StaticResourceStart = 48,
    StaticResourceEnd = 49,
    StaticResourceId = 50,
    TextWithId = 51,
    PresentationOptionsAttribute = 52,
    LineNumberAndPosition = 53,
    LinePosition = 54,
    OptimizedStaticResource = 55,
    PropertyWithStaticResourceId = 56,
}

impl RecordType {
    /// Maps a wire tag to its kind; `None` for unassigned or unsupported tags.
    pub fn from_tag(tag: u8) -> Option<Self> {
        use RecordType::*;
        Some(match tag {
            1 => DocumentStart,
            2 => DocumentEnd,
            3 => ElementStart,
            4 => ElementEnd,
            5 => Property,
            7 => PropertyComplexStart,
            8 => PropertyComplexEnd,
            9 => PropertyArrayStart,
            10 => PropertyArrayEnd,
            11 => PropertyIListStart,
            12 => PropertyIListEnd,
            13 => PropertyIDictionaryStart,
            14 => PropertyIDictionaryEnd,
            15 => LiteralContent,
            16 => Text,
            17 => TextWithConverter,
            20 => XmlnsProperty,
            25 => DefAttribute,
            27 => PiMapping,
            28 => AssemblyInfo,
            29 => TypeInfo,
            30 => TypeSerializerInfo,
            31 => AttributeInfo,
            32 => StringInfo,
            33 => PropertyStringReference,
            34 => PropertyTypeReference,
            35 => PropertyWithExtension,
            36 => PropertyWithConverter,
            37 => DeferableContentStart,
            38 => DefAttributeKeyString,
            39 => DefAttributeKeyType,
            40 => KeyElementStart,
            41 => KeyElementEnd,
            42 => ConstructorParametersStart,
            43 => ConstructorParametersEnd,
            44 => ConstructorParameterType,
            45 => ConnectionId,
            46 => ContentProperty,
            48 => StaticResourceStart,
            49 => StaticResourceEnd,
            50 => StaticResourceId,
            51 => TextWithId,
            52 => PresentationOptionsAttribute,
            53 => LineNumberAndPosition,
            54 => LinePosition,
            55 => OptimizedStaticResource,
            56 => PropertyWithStaticResourceId,
            _ => return None,
        })
    }

    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Records whose body carries a 7-bit size prefix.
    pub fn is_variable_size(self) -> bool {
        use RecordType::*;
        matches!(
            self,
            Property
                | PropertyWithConverter
                | LiteralContent
                | Text
                | TextWithConverter
                | XmlnsProperty
                | DefAttribute
                | PresentationOptionsAttribute
                | PiMapping
                | AssemblyInfo
                | TypeInfo
                | TypeSerializerInfo
                | AttributeInfo
                | StringInfo
        )
    }

    /// Table-maintenance kinds, absorbed by the decoder.
    pub fn is_table(self) -> bool {
        use RecordType::*;
        matches!(self, AssemblyInfo | TypeInfo | TypeSerializerInfo | AttributeInfo | StringInfo)
    }

    pub fn is_debug(self) -> bool {
        matches!(self, Self::LineNumberAndPosition | Self::LinePosition)
    }

    /// Kinds after which the encoder may emit a line/position record.
    pub fn is_debug_tracked(self) -> bool {
        use RecordType::*;
        matches!(
            self,
            ElementStart
                | PropertyComplexStart
                | PropertyArrayStart
                | PropertyIListStart
                | PropertyIDictionaryStart
                | Property
                | PropertyWithConverter
                | PropertyStringReference
                | PropertyTypeReference
                | PropertyWithExtension
                | PropertyWithStaticResourceId
                | Text
                | TextWithConverter
                | TextWithId
                | LiteralContent
        )
    }

    /// Kinds collected by the decoder's property sub-loop.
    pub fn is_property_like(self) -> bool {
        use RecordType::*;
        matches!(
            self,
            Property
                | PropertyWithConverter
                | PropertyStringReference
                | PropertyTypeReference
                | PropertyWithExtension
                | PropertyWithStaticResourceId
                | XmlnsProperty
                | DefAttribute
                | PresentationOptionsAttribute
                | ContentProperty
                | ConnectionId
                | KeyElementStart
        )
    }

    /// Closing kind paired with a scope-opening kind.
    pub fn closing(self) -> Option<RecordType> {
        use RecordType::*;
        Some(match self {
            DocumentStart => DocumentEnd,
            ElementStart => ElementEnd,
            PropertyComplexStart => PropertyComplexEnd,
            PropertyArrayStart => PropertyArrayEnd,
            PropertyIListStart => PropertyIListEnd,
            PropertyIDictionaryStart => PropertyIDictionaryEnd,
            KeyElementStart => KeyElementEnd,
            ConstructorParametersStart => ConstructorParametersEnd,
            StaticResourceStart => StaticResourceEnd,
            _ => return None,
        })
    }

    pub fn is_scope_end(self) -> bool {
        use RecordType::*;
        matches!(
            self,
            DocumentEnd
                | ElementEnd
                | PropertyComplexEnd
                | PropertyArrayEnd
                | PropertyIListEnd
                | PropertyIDictionaryEnd
                | KeyElementEnd
                | ConstructorParametersEnd
                | StaticResourceEnd
        )
    }
}

/// Usage tag of an attribute-info entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AttributeUsage {
    #[default]
    Default,
    XmlLang,
    XmlSpace,
    /// The member aliases the language-reserved `Name` directive.
    RuntimeName,
}

impl AttributeUsage {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::XmlLang,
            2 => Self::XmlSpace,
            3 => Self::RuntimeName,
            _ => Self::Default,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::XmlLang => 1,
            Self::XmlSpace => 2,
            Self::RuntimeName => 3,
        }
    }
}

/// Flag im `extension`-Feld von `PropertyWithExtension`: Wert ist eine Typ-ID.
pub const EXTENSION_VALUE_TYPE: u16 = 0x4000;
/// Flag im `extension`-Feld von `PropertyWithExtension`: Wert ist eine Attribut-ID.
pub const EXTENSION_VALUE_STATIC: u16 = 0x2000;
/// Maske für die (positive) Known-Type-ID der Extension.
pub const EXTENSION_ID_MASK: u16 = 0x0FFF;

/// `OptimizedStaticResource.flags`: Wert ist eine Typ-ID.
pub const STATIC_RESOURCE_TYPE: u8 = 0x01;
/// `OptimizedStaticResource.flags`: Wert ist eine Attribut-ID.
pub const STATIC_RESOURCE_STATIC: u8 = 0x02;

/// Decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    DocumentStart { load_async: bool, max_async_records: i32, debug_baml: bool },
    DocumentEnd,
    ElementStart { type_id: i16, flags: u8 },
    ElementEnd,
    KeyElementStart { type_id: i16, flags: u8, value_position: i32, shared: bool, shared_set: bool },
    KeyElementEnd,
    PropertyComplexStart { attribute_id: i16 },
    PropertyComplexEnd,
    PropertyArrayStart { attribute_id: i16 },
    PropertyArrayEnd,
    PropertyIListStart { attribute_id: i16 },
    PropertyIListEnd,
    PropertyIDictionaryStart { attribute_id: i16 },
    PropertyIDictionaryEnd,
    Property { attribute_id: i16, value: String },
    PropertyWithConverter { attribute_id: i16, value: String, converter_type_id: i16 },
    PropertyStringReference { attribute_id: i16, string_id: i16 },
    PropertyTypeReference { attribute_id: i16, type_id: i16 },
    PropertyWithExtension { attribute_id: i16, extension: u16, value_id: i16 },
    PropertyWithStaticResourceId { attribute_id: i16, static_resource_id: i16 },
    ContentProperty { attribute_id: i16 },
    XmlnsProperty { prefix: String, namespace: String, assembly_ids: Vec<i16> },
    PiMapping { xml_namespace: String, clr_namespace: String, assembly_id: i16 },
    DefAttribute { value: String, name_id: i16 },
    PresentationOptionsAttribute { value: String, name_id: i16 },
    DefAttributeKeyString { value_id: i16, value_position: i32, shared: bool, shared_set: bool },
    DefAttributeKeyType { type_id: i16, flags: u8, value_position: i32, shared: bool, shared_set: bool },
    ConnectionId { connection_id: i32 },
    ConstructorParametersStart,
    ConstructorParametersEnd,
    ConstructorParameterType { type_id: i16 },
    Text { value: String },
    TextWithId { value_id: i16 },
    TextWithConverter { value: String, converter_type_id: i16 },
    LiteralContent { value: String, line_number: i32, line_position: i32 },
    DeferableContentStart { content_size: i32 },
    StaticResourceStart { type_id: i16, flags: u8 },
    StaticResourceEnd,
    StaticResourceId { static_resource_id: i16 },
    OptimizedStaticResource { flags: u8, value_id: i16 },
    AssemblyInfo { assembly_id: i16, name: String },
    TypeInfo { type_id: i16, assembly_id: i16, is_internal: bool, name: String },
    TypeSerializerInfo {
        type_id: i16,
        assembly_id: i16,
        is_internal: bool,
        name: String,
        serializer_type_id: i16,
    },
    AttributeInfo { attribute_id: i16, owner_type_id: i16, usage: AttributeUsage, name: String },
    StringInfo { string_id: i16, value: String },
    LineNumberAndPosition { line: u32, position: u32 },
    LinePosition { position: u32 },
}

/// Where a record landed in the output, for back-patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenRecord {
    /// Absolute offset of the tag byte.
    pub start: u64,
    /// Absolute offset of the record's patchable `i32` field, if any
    /// (`value_position` of key records, `content_size` of the marker).
    pub patch_at: Option<u64>,
    /// Offset directly behind the record.
    pub end: u64,
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        use RecordType as T;
        match self {
            Self::DocumentStart { .. } => T::DocumentStart,
            Self::DocumentEnd => T::DocumentEnd,
            Self::ElementStart { .. } => T::ElementStart,
            Self::ElementEnd => T::ElementEnd,
            Self::KeyElementStart { .. } => T::KeyElementStart,
            Self::KeyElementEnd => T::KeyElementEnd,
            Self::PropertyComplexStart { .. } => T::PropertyComplexStart,
            Self::PropertyComplexEnd => T::PropertyComplexEnd,
            Self::PropertyArrayStart { .. } => T::PropertyArrayStart,
            Self::PropertyArrayEnd => T::PropertyArrayEnd,
            Self::PropertyIListStart { .. } => T::PropertyIListStart,
            Self::PropertyIListEnd => T::PropertyIListEnd,
            Self::PropertyIDictionaryStart { .. } => T::PropertyIDictionaryStart,
            Self::PropertyIDictionaryEnd => T::PropertyIDictionaryEnd,
            Self::Property { .. } => T::Property,
            Self::PropertyWithConverter { .. } => T::PropertyWithConverter,
            Self::PropertyStringReference { .. } => T::PropertyStringReference,
            Self::PropertyTypeReference { .. } => T::PropertyTypeReference,
            Self::PropertyWithExtension { .. } => T::PropertyWithExtension,
            Self::PropertyWithStaticResourceId { .. } => T::PropertyWithStaticResourceId,
            Self::ContentProperty { .. } => T::ContentProperty,
            Self::XmlnsProperty { .. } => T::XmlnsProperty,
            Self::PiMapping { .. } => T::PiMapping,
            Self::DefAttribute { .. } => T::DefAttribute,
            Self::PresentationOptionsAttribute { .. } => T::PresentationOptionsAttribute,
            Self::DefAttributeKeyString { .. } => T::DefAttributeKeyString,
            Self::DefAttributeKeyType { .. } => T::DefAttributeKeyType,
            Self::ConnectionId { .. } => T::ConnectionId,
            Self::ConstructorParametersStart => T::ConstructorParametersStart,
            Self::ConstructorParametersEnd => T::ConstructorParametersEnd,
            Self::ConstructorParameterType { .. } => T::ConstructorParameterType,
            Self::Text { .. } => T::Text,
            Self::TextWithId { .. } => T::TextWithId,
            Self::TextWithConverter { .. } => T::TextWithConverter,
            Self::LiteralContent { .. } => T::LiteralContent,
            Self::DeferableContentStart { .. } => T::DeferableContentStart,
            Self::StaticResourceStart { .. } => T::StaticResourceStart,
            Self::StaticResourceEnd => T::StaticResourceEnd,
            Self::StaticResourceId { .. } => T::StaticResourceId,
            Self::OptimizedStaticResource { .. } => T::OptimizedStaticResource,
            Self::AssemblyInfo { .. } => T::AssemblyInfo,
            Self::TypeInfo { .. } => T::TypeInfo,
            Self::TypeSerializerInfo { .. } => T::TypeSerializerInfo,
            Self::AttributeInfo { .. } => T::AttributeInfo,
            Self::StringInfo { .. } => T::StringInfo,
            Self::LineNumberAndPosition { .. } => T::LineNumberAndPosition,
            Self::LinePosition { .. } => T::LinePosition,
        }
    }

    /// Byte offset of the patchable `i32` field relative to the tag byte.
    fn patch_offset(&self) -> Option<u64> {
        match self {
            Self::DeferableContentStart { .. } => Some(1),
            // tag, value_id i16
            Self::DefAttributeKeyString { .. } => Some(3),
            // tag, type_id i16, flags u8
            Self::DefAttributeKeyType { .. } | Self::KeyElementStart { .. } => Some(4),
            _ => None,
        }
    }

    /// Setzt `value_position` eines Key-Records (No-op für andere Kinds).
    pub fn set_value_position(&mut self, position: i32) {
        match self {
            Self::DefAttributeKeyString { value_position, .. }
            | Self::DefAttributeKeyType { value_position, .. }
            | Self::KeyElementStart { value_position, .. } => *value_position = position,
            _ => {}
        }
    }

    /// Setzt `shared`/`shared_set` eines Key-Records (No-op für andere Kinds).
    pub fn set_shared(&mut self, value: bool) {
        match self {
            Self::DefAttributeKeyString { shared, shared_set, .. }
            | Self::DefAttributeKeyType { shared, shared_set, .. }
            | Self::KeyElementStart { shared, shared_set, .. } => {
                *shared = value;
                *shared_set = true;
            }
            _ => {}
        }
    }

    /// Schreibt den Record und liefert Start-, Patch- und End-Offset.
    pub fn write(&self, w: &mut ByteWriter) -> WrittenRecord {
        let start = w.position();
        let kind = self.record_type();
        w.write_u8(kind.tag());
        if kind.is_variable_size() {
            let mut body = ByteWriter::new();
            self.write_body(&mut body);
            unsigned_integer::encode(w, body.buffered_len() as u64);
            w.write_bytes(body.bytes());
        } else {
            self.write_body(w);
        }
        WrittenRecord {
            start,
            patch_at: self.patch_offset().map(|o| start + o),
            end: w.position(),
        }
    }

    fn write_body(&self, w: &mut ByteWriter) {
        match self {
            Self::DocumentStart { load_async, max_async_records, debug_baml } => {
                w.write_bool(*load_async);
                w.write_i32(*max_async_records);
                w.write_bool(*debug_baml);
            }
            Self::DocumentEnd
            | Self::ElementEnd
            | Self::KeyElementEnd
            | Self::PropertyComplexEnd
            | Self::PropertyArrayEnd
            | Self::PropertyIListEnd
            | Self::PropertyIDictionaryEnd
            | Self::ConstructorParametersStart
            | Self::ConstructorParametersEnd
            | Self::StaticResourceEnd => {}
            Self::ElementStart { type_id, flags } | Self::StaticResourceStart { type_id, flags } => {
                w.write_i16(*type_id);
                w.write_u8(*flags);
            }
            Self::KeyElementStart { type_id, flags, value_position, shared, shared_set }
            | Self::DefAttributeKeyType { type_id, flags, value_position, shared, shared_set } => {
                w.write_i16(*type_id);
                w.write_u8(*flags);
                w.write_i32(*value_position);
                w.write_bool(*shared);
                w.write_bool(*shared_set);
            }
            Self::PropertyComplexStart { attribute_id }
            | Self::PropertyArrayStart { attribute_id }
            | Self::PropertyIListStart { attribute_id }
            | Self::PropertyIDictionaryStart { attribute_id }
            | Self::ContentProperty { attribute_id } => w.write_i16(*attribute_id),
            Self::Property { attribute_id, value } => {
                w.write_i16(*attribute_id);
                w.write_string(value);
            }
            Self::PropertyWithConverter { attribute_id, value, converter_type_id } => {
                w.write_i16(*attribute_id);
                w.write_string(value);
                w.write_i16(*converter_type_id);
            }
            Self::PropertyStringReference { attribute_id, string_id: other }
            | Self::PropertyTypeReference { attribute_id, type_id: other }
            | Self::PropertyWithStaticResourceId { attribute_id, static_resource_id: other } => {
                w.write_i16(*attribute_id);
                w.write_i16(*other);
            }
            Self::PropertyWithExtension { attribute_id, extension, value_id } => {
                w.write_i16(*attribute_id);
                w.write_u16(*extension);
                w.write_i16(*value_id);
            }
            Self::XmlnsProperty { prefix, namespace, assembly_ids } => {
                w.write_string(prefix);
                w.write_string(namespace);
                w.write_u16(assembly_ids.len() as u16);
                for id in assembly_ids {
                    w.write_i16(*id);
                }
            }
            Self::PiMapping { xml_namespace, clr_namespace, assembly_id } => {
                w.write_string(xml_namespace);
                w.write_string(clr_namespace);
                w.write_i16(*assembly_id);
            }
            Self::DefAttribute { value, name_id }
            | Self::PresentationOptionsAttribute { value, name_id } => {
                w.write_string(value);
                w.write_i16(*name_id);
            }
            Self::DefAttributeKeyString { value_id, value_position, shared, shared_set } => {
                w.write_i16(*value_id);
                w.write_i32(*value_position);
                w.write_bool(*shared);
                w.write_bool(*shared_set);
            }
            Self::ConnectionId { connection_id } => w.write_i32(*connection_id),
            Self::ConstructorParameterType { type_id } => w.write_i16(*type_id),
            Self::Text { value } => w.write_string(value),
            Self::TextWithId { value_id } => w.write_i16(*value_id),
            Self::TextWithConverter { value, converter_type_id } => {
                w.write_string(value);
                w.write_i16(*converter_type_id);
            }
            Self::LiteralContent { value, line_number, line_position } => {
                w.write_string(value);
                w.write_i32(*line_number);
                w.write_i32(*line_position);
            }
            Self::DeferableContentStart { content_size } => w.write_i32(*content_size),
            Self::StaticResourceId { static_resource_id } => w.write_i16(*static_resource_id),
            Self::OptimizedStaticResource { flags, value_id } => {
                w.write_u8(*flags);
                w.write_i16(*value_id);
            }
            Self::AssemblyInfo { assembly_id, name } => {
                w.write_i16(*assembly_id);
                w.write_string(name);
            }
            Self::TypeInfo { type_id, assembly_id, is_internal, name } => {
                w.write_i16(*type_id);
                w.write_i16(*assembly_id);
                w.write_bool(*is_internal);
                w.write_string(name);
            }
            Self::TypeSerializerInfo { type_id, assembly_id, is_internal, name, serializer_type_id } => {
                w.write_i16(*type_id);
                w.write_i16(*assembly_id);
                w.write_bool(*is_internal);
                w.write_string(name);
                w.write_i16(*serializer_type_id);
            }
            Self::AttributeInfo { attribute_id, owner_type_id, usage, name } => {
                w.write_i16(*attribute_id);
                w.write_i16(*owner_type_id);
                w.write_u8(usage.as_u8());
                w.write_string(name);
            }
            Self::StringInfo { string_id, value } => {
                w.write_i16(*string_id);
                w.write_string(value);
            }
            Self::LineNumberAndPosition { line, position } => {
                w.write_u32(*line);
                w.write_u32(*position);
            }
            Self::LinePosition { position } => w.write_u32(*position),
        }
    }

    /// Liest den nächsten Record.
    ///
    /// Returns `Ok(None)` am sauberen Stream-Ende (vor einem Tag), sonst den
    /// Record und seinen absoluten Start-Offset.
    pub fn read<R: Read>(r: &mut ByteReader<R>) -> Result<Option<(Record, u64)>> {
        let start = r.position();
        let Some(tag) = r.try_read_u8()? else {
            return Ok(None);
        };
        let kind = RecordType::from_tag(tag).ok_or(Error::UnknownRecord { tag, offset: start })?;
        let record = if kind.is_variable_size() {
            let declared = unsigned_integer::decode(r)?;
            let body_start = r.position();
            let record = Self::read_body(kind, r)?;
            let actual = r.position() - body_start;
            if actual != declared {
                return Err(Error::MalformedRecord { record: kind, declared, actual });
            }
            record
        } else {
            Self::read_body(kind, r)?
        };
        Ok(Some((record, start)))
    }

    fn read_body<R: Read>(kind: RecordType, r: &mut ByteReader<R>) -> Result<Record> {
        use RecordType as T;
        Ok(match kind {
            T::DocumentStart => Self::DocumentStart {
                load_async: r.read_bool()?,
                max_async_records: r.read_i32()?,
                debug_baml: r.read_bool()?,
            },
            T::DocumentEnd => Self::DocumentEnd,
            T::ElementStart => Self::ElementStart { type_id: r.read_i16()?, flags: r.read_u8()? },
            T::ElementEnd => Self::ElementEnd,
            T::KeyElementStart => Self::KeyElementStart {
                type_id: r.read_i16()?,
                flags: r.read_u8()?,
                value_position: r.read_i32()?,
                shared: r.read_bool()?,
                shared_set: r.read_bool()?,
            },
            T::KeyElementEnd => Self::KeyElementEnd,
            T::PropertyComplexStart => Self::PropertyComplexStart { attribute_id: r.read_i16()? },
            T::PropertyComplexEnd => Self::PropertyComplexEnd,
            T::PropertyArrayStart => Self::PropertyArrayStart { attribute_id: r.read_i16()? },
            T::PropertyArrayEnd => Self::PropertyArrayEnd,
            T::PropertyIListStart => Self::PropertyIListStart { attribute_id: r.read_i16()? },
            T::PropertyIListEnd => Self::PropertyIListEnd,
            T::PropertyIDictionaryStart => {
                Self::PropertyIDictionaryStart { attribute_id: r.read_i16()? }
            }
            T::PropertyIDictionaryEnd => Self::PropertyIDictionaryEnd,
            T::Property => Self::Property { attribute_id: r.read_i16()?, value: r.read_string()? },
            T::PropertyWithConverter => Self::PropertyWithConverter {
                attribute_id: r.read_i16()?,
                value: r.read_string()?,
                converter_type_id: r.read_i16()?,
            },
            T::PropertyStringReference => Self::PropertyStringReference {
                attribute_id: r.read_i16()?,
                string_id: r.read_i16()?,
            },
            T::PropertyTypeReference => Self::PropertyTypeReference {
                attribute_id: r.read_i16()?,
                type_id: r.read_i16()?,
            },
            T::PropertyWithExtension => Self::PropertyWithExtension {
                attribute_id: r.read_i16()?,
                extension: r.read_u16()?,
                value_id: r.read_i16()?,
            },
            T::PropertyWithStaticResourceId => Self::PropertyWithStaticResourceId {
                attribute_id: r.read_i16()?,
                static_resource_id: r.read_i16()?,
            },
            T::ContentProperty => Self::ContentProperty { attribute_id: r.read_i16()? },
            T::XmlnsProperty => {
                let prefix = r.read_string()?;
                let namespace = r.read_string()?;
                let count = r.read_u16()?;
                let mut assembly_ids = Vec::with_capacity(usize::from(count).min(64));
                for _ in 0..count {
                    assembly_ids.push(r.read_i16()?);
                }
                Self::XmlnsProperty { prefix, namespace, assembly_ids }
            }
            T::PiMapping => Self::PiMapping {
                xml_namespace: r.read_string()?,
                clr_namespace: r.read_string()?,
                assembly_id: r.read_i16()?,
            },
            T::DefAttribute => Self::DefAttribute { value: r.read_string()?, name_id: r.read_i16()? },
            T::PresentationOptionsAttribute => Self::PresentationOptionsAttribute {
                value: r.read_string()?,
                name_id: r.read_i16()?,
            },
            T::DefAttributeKeyString => Self::DefAttributeKeyString {
                value_id: r.read_i16()?,
                value_position: r.read_i32()?,
                shared: r.read_bool()?,
                shared_set: r.read_bool()?,
            },
            T::DefAttributeKeyType => Self::DefAttributeKeyType {
                type_id: r.read_i16()?,
                flags: r.read_u8()?,
                value_position: r.read_i32()?,
                shared: r.read_bool()?,
                shared_set: r.read_bool()?,
            },
            T::ConnectionId => Self::ConnectionId { connection_id: r.read_i32()? },
            T::ConstructorParametersStart => Self::ConstructorParametersStart,
            T::ConstructorParametersEnd => Self::ConstructorParametersEnd,
            T::ConstructorParameterType => Self::ConstructorParameterType { type_id: r.read_i16()? },
            T::Text => Self::Text { value: r.read_string()? },
            T::TextWithId => Self::TextWithId { value_id: r.read_i16()? },
            T::TextWithConverter => Self::TextWithConverter {
                value: r.read_string()?,
                converter_type_id: r.read_i16()?,
            },
            T::LiteralContent => Self::LiteralContent {
                value: r.read_string()?,
                line_number: r.read_i32()?,
                line_position: r.read_i32()?,
            },
            T::DeferableContentStart => Self::DeferableContentStart { content_size: r.read_i32()? },
            T::StaticResourceStart => {
                Self::StaticResourceStart { type_id: r.read_i16()?, flags: r.read_u8()? }
            }
            T::StaticResourceEnd => Self::StaticResourceEnd,
            T::StaticResourceId => Self::StaticResourceId { static_resource_id: r.read_i16()? },
            T::OptimizedStaticResource => Self::OptimizedStaticResource {
                flags: r.read_u8()?,
                value_id: r.read_i16()?,
            },
            T::AssemblyInfo => Self::AssemblyInfo { assembly_id: r.read_i16()?, name: r.read_string()? },
            T::TypeInfo => Self::TypeInfo {
                type_id: r.read_i16()?,
                assembly_id: r.read_i16()?,
                is_internal: r.read_bool()?,
                name: r.read_string()?,
            },
            T::TypeSerializerInfo => Self::TypeSerializerInfo {
                type_id: r.read_i16()?,
                assembly_id: r.read_i16()?,
                is_internal: r.read_bool()?,
                name: r.read_string()?,
                serializer_type_id: r.read_i16()?,
            },
            T::AttributeInfo => Self::AttributeInfo {
                attribute_id: r.read_i16()?,
                owner_type_id: r.read_i16()?,
                usage: AttributeUsage::from_u8(r.read_u8()?),
                name: r.read_string()?,
            },
            T::StringInfo => Self::StringInfo { string_id: r.read_i16()?, value: r.read_string()? },
            T::LineNumberAndPosition => Self::LineNumberAndPosition {
                line: r.read_u32()?,
                position: r.read_u32()?,
            },
            T::LinePosition => Self::LinePosition { position: r.read_u32()? },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_all(records: &[Record]) -> Vec<u8> {
        let mut w = ByteWriter::new();
        for r in records {
            r.write(&mut w);
        }
        w.into_vec()
    }

    fn read_all(data: &[u8]) -> Result<Vec<Record>> {
        let mut r = ByteReader::new(data);
        let mut out = Vec::new();
        while let Some((rec, _)) = Record::read(&mut r)? {
            out.push(rec);
        }
        Ok(out)
    }

    #[test]
    fn every_tag_maps_back() {
        for tag in 0..=u8::MAX {
            if let Some(kind) = RecordType::from_tag(tag) {
                assert_eq!(kind.tag(), tag);
            }
        }
        assert_eq!(RecordType::from_tag(0), None);
        assert_eq!(RecordType::from_tag(18), None);
    }

    #[test]
    fn scope_pairs() {
        assert_eq!(RecordType::KeyElementStart.closing(), Some(RecordType::KeyElementEnd));
        assert_eq!(
            RecordType::PropertyIDictionaryStart.closing(),
            Some(RecordType::PropertyIDictionaryEnd)
        );
        assert_eq!(RecordType::Property.closing(), None);
        assert!(RecordType::StaticResourceEnd.is_scope_end());
    }

    #[test]
    fn mixed_sequence_reads_back() {
        let records = vec![
            Record::DocumentStart { load_async: false, max_async_records: -1, debug_baml: true },
            Record::AssemblyInfo { assembly_id: 0, name: "MyApp".into() },
            Record::TypeSerializerInfo {
                type_id: 0,
                assembly_id: 0,
                is_internal: true,
                name: "MyApp.FancyStyle".into(),
                serializer_type_id: -24,
            },
            Record::ElementStart { type_id: 0, flags: 0 },
            Record::XmlnsProperty {
                prefix: "local".into(),
                namespace: "clr-namespace:MyApp".into(),
                assembly_ids: vec![0, -1],
            },
            Record::PropertyWithExtension { attribute_id: -3, extension: 0x4000 | 29, value_id: 7 },
            Record::LiteralContent { value: "<x/>".into(), line_number: 3, line_position: 9 },
            Record::ElementEnd,
            Record::DocumentEnd,
        ];
        assert_eq!(read_all(&write_all(&records)).unwrap(), records);
    }

    #[test]
    fn patch_offsets_point_at_i32_fields() {
        let mut w = ByteWriter::new();
        w.write_u8(0xAA);
        let rec = Record::DefAttributeKeyType {
            type_id: -5,
            flags: 0,
            value_position: 0,
            shared: false,
            shared_set: false,
        };
        let at = rec.write(&mut w);
        assert_eq!(at.start, 1);
        assert_eq!(at.patch_at, Some(5));
        w.patch_i32(5, 0x1234).unwrap();
        let data = w.into_vec();
        let got = read_all(&data[1..]).unwrap();
        assert!(matches!(got[0], Record::DefAttributeKeyType { value_position: 0x1234, .. }));
    }

    #[test]
    fn unknown_tag_reports_offset() {
        let data = write_all(&[Record::DocumentEnd]);
        let mut bytes = data.clone();
        bytes.push(0xEE);
        assert_eq!(read_all(&bytes), Err(Error::UnknownRecord { tag: 0xEE, offset: 1 }));
    }

    #[test]
    fn truncated_record_is_premature_end() {
        let data = write_all(&[Record::ConnectionId { connection_id: 5 }]);
        assert_eq!(read_all(&data[..3]), Err(Error::PrematureEndOfStream));
    }

    #[test]
    fn inconsistent_body_size_is_malformed() {
        let mut data = write_all(&[Record::Text { value: "abc".into() }]);
        // Body: 1 Byte Längenpräfix + 3 Bytes; deklariert 4 → auf 5 setzen
        data[1] = 5;
        data.push(0);
        let err = read_all(&data).unwrap_err();
        assert!(
            matches!(err, Error::MalformedRecord { record: RecordType::Text, declared: 5, actual: 4 }),
            "{err:?}"
        );
    }

    #[test]
    fn shared_and_position_setters() {
        let mut rec = Record::DefAttributeKeyString {
            value_id: 1,
            value_position: 0,
            shared: true,
            shared_set: false,
        };
        rec.set_shared(false);
        rec.set_value_position(42);
        assert_eq!(
            rec,
            Record::DefAttributeKeyString {
                value_id: 1,
                value_position: 42,
                shared: false,
                shared_set: true
            }
        );
    }
}
