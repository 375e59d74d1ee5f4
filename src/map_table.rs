//! Interning-Tabellen eines Passes.
//!
//! Vier dichte Tabellen (Components, Typen, Attribute, Strings), deren
//! Position gleich der ID ist. Negative IDs verweisen auf die statische
//! Registry ([`crate::known`]) und berühren die Tabellen nie.
//!
//! Beim Encodieren werden Einträge bei erster Verwendung angelegt
//! (`intern_*`), beim Decodieren in Stream-Reihenfolge geladen (`load`).
//! Eine optionale [`ResolutionCache`] überlebt `reset()` und spart
//! Host-Lookups über mehrere Pässe.

use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use crate::known::{KNOWN_COMPONENT_ID, known};
use crate::record::{AttributeUsage, Record};
use crate::reflect::{ComponentHandle, MemberDescriptor, TypeDescriptor, TypeKind, TypeRef, TypeSystem};
use crate::{Error, FastHashMap, Result};

/// Result of an intern operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interned {
    pub id: i16,
    /// True if a table entry was appended (the caller owes an info record).
    pub is_new: bool,
}

impl Interned {
    fn existing(id: i16) -> Self {
        Self { id, is_new: false }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentRecord {
    pub id: i16,
    pub name: String,
    resolved: OnceCell<Option<ComponentHandle>>,
}

#[derive(Debug, Clone)]
pub struct TypeRecord {
    pub id: i16,
    pub component_id: i16,
    pub full_name: String,
    pub is_internal: bool,
    pub serializer_type_id: Option<i16>,
    resolved: OnceCell<Option<Rc<TypeDescriptor>>>,
}

#[derive(Debug, Clone)]
pub struct AttributeRecord {
    pub id: i16,
    pub owner_type_id: i16,
    pub name: String,
    pub usage: AttributeUsage,
    resolved: OnceCell<Option<MemberDescriptor>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringRecord {
    pub id: i16,
    pub text: String,
}

/// Resolved converter for a property or type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Converter {
    /// Built-in converter type (negative id).
    Known(i16),
    /// Host converter type; the encoder interns it before use.
    Host(TypeRef),
    /// Enum conversion; needs the enum type, no scalar converter id.
    Enum(TypeRef),
    /// Optional value conversion; carries the underlying type.
    Nullable(TypeRef),
}

impl Converter {
    /// True if the converter can be written as a single type id.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Known(_) | Self::Host(_))
    }
}

/// Cross-pass resolution cache, owned outside the table.
///
/// Wird bei `MapTable::reset()` aus den aufgelösten Einträgen befüllt und
/// vor jedem Host-Lookup konsultiert.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    types: FastHashMap<(String, String), Rc<TypeDescriptor>>,
    members: FastHashMap<(String, String), MemberDescriptor>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn clear(&mut self) {
        self.types.clear();
        self.members.clear();
    }
}

/// Per-pass interning tables.
///
/// `Clone` ist eine tiefe Kopie aller Pass-Tabellen; Host und Cache werden
/// geteilt.
#[derive(Clone, Default)]
pub struct MapTable {
    components: Vec<ComponentRecord>,
    types: Vec<TypeRecord>,
    attributes: Vec<AttributeRecord>,
    strings: Vec<StringRecord>,
    component_index: FastHashMap<String, i16>,
    type_index: FastHashMap<(i16, String), i16>,
    attribute_index: FastHashMap<(i16, String), i16>,
    string_index: FastHashMap<String, i16>,
    property_converters: FastHashMap<i16, Option<Converter>>,
    type_converters: FastHashMap<TypeRef, Option<Converter>>,
    host: Option<Rc<dyn TypeSystem>>,
    cache: Option<Rc<RefCell<ResolutionCache>>>,
    compile_only: bool,
}

impl std::fmt::Debug for MapTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapTable")
            .field("components", &self.components.len())
            .field("types", &self.types.len())
            .field("attributes", &self.attributes.len())
            .field("strings", &self.strings.len())
            .field("has_host", &self.host.is_some())
            .finish()
    }
}

fn next_id(len: usize, table: &'static str) -> Result<i16> {
    i16::try_from(len).map_err(|_| Error::TableOverflow(table))
}

fn check_dense(table: &'static str, len: usize, found: i16) -> Result<()> {
    let expected = next_id(len, table)?;
    if found != expected {
        return Err(Error::TableOutOfOrder { table, expected, found });
    }
    Ok(())
}

impl MapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type_system(mut self, host: Rc<dyn TypeSystem>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_cache(mut self, cache: Rc<RefCell<ResolutionCache>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Known-type lookups ignore component identity (compiler passes).
    pub fn set_compile_only(&mut self, compile_only: bool) {
        self.compile_only = compile_only;
    }

    pub fn type_system(&self) -> Option<&Rc<dyn TypeSystem>> {
        self.host.as_ref()
    }

    /// Clears the per-pass tables. Resolved entries move into the
    /// persistent cache first, if one is attached.
    pub fn reset(&mut self) {
        if let Some(cache) = &self.cache {
            let mut cache = cache.borrow_mut();
            for t in &self.types {
                if let Some(Some(desc)) = t.resolved.get() {
                    let component = self.component(t.component_id).unwrap_or_default().to_string();
                    cache.types.insert((component, t.full_name.clone()), desc.clone());
                }
            }
            for a in &self.attributes {
                if let Some(Some(member)) = a.resolved.get() {
                    cache
                        .members
                        .insert((member.owner.full_name.clone(), a.name.clone()), member.clone());
                }
            }
            log::debug!(
                "map table reset: cache holds {} types, {} members",
                cache.types.len(),
                cache.members.len()
            );
        }
        self.components.clear();
        self.types.clear();
        self.attributes.clear();
        self.strings.clear();
        self.component_index.clear();
        self.type_index.clear();
        self.attribute_index.clear();
        self.string_index.clear();
        self.clear_converter_cache();
    }

    pub fn clear_converter_cache(&mut self) {
        self.property_converters.clear();
        self.type_converters.clear();
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    // ========================================================================
    // Intern (Encoder)
    // ========================================================================

    pub fn intern_component(&mut self, name: &str) -> Result<Interned> {
        if name == crate::known::KNOWN_COMPONENT {
            return Ok(Interned::existing(KNOWN_COMPONENT_ID));
        }
        if let Some(&id) = self.component_index.get(name) {
            return Ok(Interned::existing(id));
        }
        let id = next_id(self.components.len(), "component")?;
        self.components.push(ComponentRecord { id, name: name.to_string(), resolved: OnceCell::new() });
        self.component_index.insert(name.to_string(), id);
        Ok(Interned { id, is_new: true })
    }

    /// Interns a type. `serializer` is recorded only for new entries.
    pub fn intern_type(
        &mut self,
        component_id: i16,
        full_name: &str,
        is_internal: bool,
        serializer: Option<i16>,
    ) -> Result<Interned> {
        let component = if self.compile_only { None } else { Some(self.component(component_id)?) };
        if let Some(id) = known().find_full_name(full_name, component) {
            return Ok(Interned::existing(id));
        }
        let key = (component_id, full_name.to_string());
        if let Some(&id) = self.type_index.get(&key) {
            return Ok(Interned::existing(id));
        }
        let id = next_id(self.types.len(), "type")?;
        self.types.push(TypeRecord {
            id,
            component_id,
            full_name: full_name.to_string(),
            is_internal,
            serializer_type_id: serializer,
            resolved: OnceCell::new(),
        });
        self.type_index.insert(key, id);
        Ok(Interned { id, is_new: true })
    }

    pub fn intern_attribute(&mut self, owner_type_id: i16, name: &str, usage: AttributeUsage) -> Result<Interned> {
        if let Some(id) = known().find_property(owner_type_id, name) {
            return Ok(Interned::existing(id));
        }
        self.type_name(owner_type_id)?;
        let key = (owner_type_id, name.to_string());
        if let Some(&id) = self.attribute_index.get(&key) {
            return Ok(Interned::existing(id));
        }
        let id = next_id(self.attributes.len(), "attribute")?;
        self.attributes.push(AttributeRecord {
            id,
            owner_type_id,
            name: name.to_string(),
            usage,
            resolved: OnceCell::new(),
        });
        self.attribute_index.insert(key, id);
        Ok(Interned { id, is_new: true })
    }

    pub fn intern_string(&mut self, text: &str) -> Result<Interned> {
        if let Some(id) = self.find_string(text) {
            return Ok(Interned::existing(id));
        }
        let id = next_id(self.strings.len(), "string")?;
        self.strings.push(StringRecord { id, text: text.to_string() });
        self.string_index.insert(text.to_string(), id);
        Ok(Interned { id, is_new: true })
    }

    /// String id without interning.
    pub fn find_string(&self, text: &str) -> Option<i16> {
        known().string_id(text).or_else(|| self.string_index.get(text).copied())
    }

    /// Info record announcing a freshly interned table entry.
    pub fn component_info(&self, id: i16) -> Result<Record> {
        let c = self.components.get(id as usize).filter(|_| id >= 0).ok_or(Error::UnknownComponentId(id))?;
        Ok(Record::AssemblyInfo { assembly_id: c.id, name: c.name.clone() })
    }

    pub fn type_info(&self, id: i16) -> Result<Record> {
        let t = self.type_record(id)?;
        Ok(match t.serializer_type_id {
            Some(serializer_type_id) => Record::TypeSerializerInfo {
                type_id: t.id,
                assembly_id: t.component_id,
                is_internal: t.is_internal,
                name: t.full_name.clone(),
                serializer_type_id,
            },
            None => Record::TypeInfo {
                type_id: t.id,
                assembly_id: t.component_id,
                is_internal: t.is_internal,
                name: t.full_name.clone(),
            },
        })
    }

    pub fn attribute_info(&self, id: i16) -> Result<Record> {
        let a = self.attributes.get(id as usize).filter(|_| id >= 0).ok_or(Error::UnknownAttributeId(id))?;
        Ok(Record::AttributeInfo {
            attribute_id: a.id,
            owner_type_id: a.owner_type_id,
            usage: a.usage,
            name: a.name.clone(),
        })
    }

    pub fn string_info(&self, id: i16) -> Result<Record> {
        let s = self.strings.get(id as usize).filter(|_| id >= 0).ok_or(Error::UnknownStringId(id))?;
        Ok(Record::StringInfo { string_id: s.id, value: s.text.clone() })
    }

    // ========================================================================
    // Load (Decoder)
    // ========================================================================

    /// Appends a table-maintenance record read from the stream.
    pub fn load(&mut self, record: &Record) -> Result<()> {
        match record {
            Record::AssemblyInfo { assembly_id, name } => {
                check_dense("component", self.components.len(), *assembly_id)?;
                self.components.push(ComponentRecord {
                    id: *assembly_id,
                    name: name.clone(),
                    resolved: OnceCell::new(),
                });
                self.component_index.insert(name.clone(), *assembly_id);
            }
            Record::TypeInfo { type_id, assembly_id, is_internal, name } => {
                self.load_type(*type_id, *assembly_id, *is_internal, name, None)?;
            }
            Record::TypeSerializerInfo { type_id, assembly_id, is_internal, name, serializer_type_id } => {
                self.load_type(*type_id, *assembly_id, *is_internal, name, Some(*serializer_type_id))?;
            }
            Record::AttributeInfo { attribute_id, owner_type_id, usage, name } => {
                check_dense("attribute", self.attributes.len(), *attribute_id)?;
                self.type_name(*owner_type_id)?;
                self.attributes.push(AttributeRecord {
                    id: *attribute_id,
                    owner_type_id: *owner_type_id,
                    name: name.clone(),
                    usage: *usage,
                    resolved: OnceCell::new(),
                });
                self.attribute_index.insert((*owner_type_id, name.clone()), *attribute_id);
            }
            Record::StringInfo { string_id, value } => {
                check_dense("string", self.strings.len(), *string_id)?;
                self.strings.push(StringRecord { id: *string_id, text: value.clone() });
                self.string_index.entry(value.clone()).or_insert(*string_id);
            }
            other => return Err(Error::unexpected(other.record_type(), "not a table record")),
        }
        Ok(())
    }

    fn load_type(
        &mut self,
        type_id: i16,
        component_id: i16,
        is_internal: bool,
        name: &str,
        serializer: Option<i16>,
    ) -> Result<()> {
        check_dense("type", self.types.len(), type_id)?;
        self.component(component_id)?;
        if let Some(s) = serializer
            && s >= 0
            && s as usize >= self.types.len()
        {
            return Err(Error::UnknownTypeId(s));
        }
        self.types.push(TypeRecord {
            id: type_id,
            component_id,
            full_name: name.to_string(),
            is_internal,
            serializer_type_id: serializer,
            resolved: OnceCell::new(),
        });
        self.type_index.insert((component_id, name.to_string()), type_id);
        Ok(())
    }

    // ========================================================================
    // Resolve (beide Richtungen)
    // ========================================================================

    pub fn component(&self, id: i16) -> Result<&str> {
        if id < 0 {
            return known().component(id).ok_or(Error::UnknownComponentId(id));
        }
        self.components.get(id as usize).map(|c| c.name.as_str()).ok_or(Error::UnknownComponentId(id))
    }

    /// Table entry of a non-negative type id.
    pub fn type_record(&self, id: i16) -> Result<&TypeRecord> {
        if id < 0 {
            return Err(Error::UnknownTypeId(id));
        }
        self.types.get(id as usize).ok_or(Error::UnknownTypeId(id))
    }

    /// `(component, full name)` of a type id from either id space.
    pub fn type_name(&self, id: i16) -> Result<(&str, String)> {
        if id < 0 {
            let t = known().type_ref(id).ok_or(Error::UnknownTypeId(id))?;
            return Ok((crate::known::KNOWN_COMPONENT, t.full_name));
        }
        let t = self.type_record(id)?;
        Ok((self.component(t.component_id)?, t.full_name.clone()))
    }

    pub fn type_ref(&self, id: i16) -> Result<TypeRef> {
        let (component, full_name) = self.type_name(id)?;
        Ok(TypeRef::new(component, full_name))
    }

    /// `(owner type id, member name)` of an attribute id.
    pub fn attribute(&self, id: i16) -> Result<(i16, &str)> {
        if id < 0 {
            let k = known();
            let p = k.property_entry(id).ok_or(Error::UnknownAttributeId(id))?;
            let owner = k.property_owner(id).ok_or(Error::UnknownAttributeId(id))?;
            return Ok((owner, p.name));
        }
        self.attributes
            .get(id as usize)
            .map(|a| (a.owner_type_id, a.name.as_str()))
            .ok_or(Error::UnknownAttributeId(id))
    }

    pub fn attribute_usage(&self, id: i16) -> AttributeUsage {
        if id < 0 {
            return AttributeUsage::Default;
        }
        self.attributes.get(id as usize).map(|a| a.usage).unwrap_or_default()
    }

    pub fn string(&self, id: i16) -> Result<&str> {
        if id < 0 {
            return known().string(id).ok_or(Error::UnknownStringId(id));
        }
        self.strings.get(id as usize).map(|s| s.text.as_str()).ok_or(Error::UnknownStringId(id))
    }

    /// Resolves the host descriptor of a type id.
    ///
    /// Known ids never consult the host. Table ids consult the persistent
    /// cache first, then the host. `Ok(None)` when no host is attached.
    pub fn resolve_type(&self, id: i16) -> Result<Option<Rc<TypeDescriptor>>> {
        if id < 0 {
            return Ok(Some(Rc::new(known().descriptor(id).ok_or(Error::UnknownTypeId(id))?)));
        }
        let t = self.type_record(id)?;
        if let Some(resolved) = t.resolved.get() {
            return Ok(resolved.clone());
        }
        let component = self.component(t.component_id)?;
        let resolved = self.lookup_type(t.component_id, component, &t.full_name)?;
        let _ = t.resolved.set(resolved.clone());
        Ok(resolved)
    }

    fn lookup_type(&self, component_id: i16, component: &str, full_name: &str) -> Result<Option<Rc<TypeDescriptor>>> {
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.borrow().types.get(&(component.to_string(), full_name.to_string()))
        {
            return Ok(Some(hit.clone()));
        }
        let Some(host) = &self.host else {
            return Ok(None);
        };
        if component_id >= 0 {
            let c = &self.components[component_id as usize];
            let handle = c.resolved.get_or_init(|| host.resolve_component(&c.name));
            if handle.is_none() {
                return Err(Error::UnresolvedComponent(c.name.clone()));
            }
        }
        host.resolve_type(component, full_name)
            .map(Some)
            .ok_or_else(|| Error::UnresolvedType(full_name.to_string()))
    }

    /// Resolves the member behind an attribute id.
    ///
    /// Known properties resolve statically. Table attributes ask the host;
    /// a host that knows the owner but not the member is a fatal error
    /// naming both. Without a host the result is `Ok(None)`.
    pub fn resolve_member(&self, id: i16) -> Result<Option<MemberDescriptor>> {
        if id < 0 {
            return known().member_descriptor(id).map(Some).ok_or(Error::UnknownAttributeId(id));
        }
        let a = self.attributes.get(id as usize).ok_or(Error::UnknownAttributeId(id))?;
        if let Some(resolved) = a.resolved.get() {
            return Ok(resolved.clone());
        }
        let owner_ref = self.type_ref(a.owner_type_id)?;
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.borrow().members.get(&(owner_ref.full_name.clone(), a.name.clone()))
        {
            let _ = a.resolved.set(Some(hit.clone()));
            return Ok(Some(hit.clone()));
        }
        let Some(host) = &self.host else {
            return Ok(None);
        };
        let Some(owner) = self.resolve_type(a.owner_type_id)? else {
            return Ok(None);
        };
        let member = host.get_member(&owner, &a.name).ok_or_else(|| Error::UnresolvedMember {
            owner: owner_ref.full_name.clone(),
            member: a.name.clone(),
        })?;
        let _ = a.resolved.set(Some(member.clone()));
        Ok(Some(member))
    }

    /// Descriptor for a type reference: known registry, else host.
    fn describe(&self, type_ref: &TypeRef) -> Option<Rc<TypeDescriptor>> {
        let component = if self.compile_only { None } else { Some(type_ref.component.as_str()) };
        if let Some(id) = known().find_full_name(&type_ref.full_name, component) {
            return known().descriptor(id).map(Rc::new);
        }
        if let Some(cache) = &self.cache
            && let Some(hit) =
                cache.borrow().types.get(&(type_ref.component.clone(), type_ref.full_name.clone()))
        {
            return Some(hit.clone());
        }
        self.host.as_ref()?.resolve_type(&type_ref.component, &type_ref.full_name)
    }

    /// Converter for values of a type.
    ///
    /// Reihenfolge: fest eingebaute Always-Custom-Typen, dann Enum/Nullable
    /// (kein Skalar), dann Host-Converter des Typs.
    pub fn value_converter(&mut self, type_ref: &TypeRef) -> Option<Converter> {
        if let Some(hit) = self.type_converters.get(type_ref) {
            return hit.clone();
        }
        let converter = self.compute_value_converter(type_ref);
        self.type_converters.insert(type_ref.clone(), converter.clone());
        converter
    }

    fn compute_value_converter(&self, type_ref: &TypeRef) -> Option<Converter> {
        let k = known();
        if let Some(id) = k.find_full_name(&type_ref.full_name, None)
            && let Some(entry) = k.type_entry(id)
        {
            if entry.always_custom || entry.converter.is_some() {
                return k.converter_id(id).map(Converter::Known);
            }
            if entry.kind == TypeKind::Enum {
                return Some(Converter::Enum(type_ref.clone()));
            }
        }
        let desc = self.describe(type_ref)?;
        match desc.kind {
            TypeKind::Enum => return Some(Converter::Enum(type_ref.clone())),
            TypeKind::Nullable => {
                let inner = desc.underlying.clone().unwrap_or_else(|| type_ref.clone());
                return Some(Converter::Nullable(inner));
            }
            _ => {}
        }
        let host = self.host.as_ref()?;
        host.value_converter(&desc).map(|c| self.classify_converter(c))
    }

    fn classify_converter(&self, converter: TypeRef) -> Converter {
        match known().find_full_name(&converter.full_name, Some(&converter.component)) {
            Some(id) => Converter::Known(id),
            None => Converter::Host(converter),
        }
    }

    /// Converter for a property's values, cached by attribute id.
    ///
    /// Always-custom property types win over everything; enum and nullable
    /// types yield their non-scalar converter; then the host's per-property
    /// converter, then the property type's converter.
    pub fn property_converter(&mut self, attribute_id: i16) -> Result<Option<Converter>> {
        if let Some(hit) = self.property_converters.get(&attribute_id) {
            return Ok(hit.clone());
        }
        let converter = match self.resolve_member(attribute_id)? {
            None => None,
            Some(member) => {
                let k = known();
                let always_custom = k
                    .find_full_name(&member.property_type.full_name, None)
                    .and_then(|id| k.type_entry(id))
                    .is_some_and(|t| t.always_custom);
                let value = self.value_converter(&member.property_type);
                if always_custom || matches!(value, Some(Converter::Enum(_) | Converter::Nullable(_))) {
                    value
                } else if let Some(c) = self.host.as_ref().and_then(|h| h.property_converter(&member)) {
                    Some(self.classify_converter(c))
                } else {
                    value
                }
            }
        };
        self.property_converters.insert(attribute_id, converter.clone());
        Ok(converter)
    }
}
