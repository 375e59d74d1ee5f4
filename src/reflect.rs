//! Host type-system interface.
//!
//! The codec never inspects host types itself. Everything it needs (type
//! lookup, member lookup, converters) goes through [`TypeSystem`], and the
//! interning tables cache the results per pass. [`StaticTypeSystem`] is an
//! in-memory implementation for tools and tests.

use std::rc::Rc;

use crate::namespaces::parse_clr_namespace;
use crate::{FastHashMap, FastIndexMap};

/// Component-qualified type identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef {
    pub component: String,
    /// `Namespace.Name`
    pub full_name: String,
}

impl TypeRef {
    pub fn new(component: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self { component: component.into(), full_name: full_name.into() }
    }

    /// Short name (after the last `.`).
    pub fn name(&self) -> &str {
        split_full_name(&self.full_name).1
    }

    /// CLR namespace (before the last `.`).
    pub fn namespace(&self) -> &str {
        split_full_name(&self.full_name).0
    }
}

/// `A.B.C` → `("A.B", "C")`.
pub fn split_full_name(full_name: &str) -> (&str, &str) {
    match full_name.rsplit_once('.') {
        Some((ns, name)) => (ns, name),
        None => ("", full_name),
    }
}

/// Structural category of a type, as far as the codec cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TypeKind {
    #[default]
    Class,
    Enum,
    /// Optional value wrapper; `TypeDescriptor::underlying` names the inner type.
    Nullable,
    List,
    Dictionary,
    Array,
}

/// Host-provided description of a type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeDescriptor {
    pub type_ref: TypeRef,
    /// Xml namespace the type is published under, if any.
    pub xml_namespace: Option<String>,
    pub kind: TypeKind,
    pub underlying: Option<TypeRef>,
    pub base: Option<TypeRef>,
    pub is_internal: bool,
    pub is_extension: bool,
    /// Per-type value converter.
    pub converter: Option<TypeRef>,
    /// Custom binary serializer (style/template kinds).
    pub serializer: Option<TypeRef>,
    /// Accepted constructor argument counts; empty means unchecked.
    pub constructor_arities: Vec<usize>,
    pub content_property: Option<String>,
    pub dictionary_key_property: Option<String>,
    pub defers_content: bool,
}

impl TypeDescriptor {
    pub fn new(component: &str, full_name: &str) -> Self {
        Self { type_ref: TypeRef::new(component, full_name), ..Self::default() }
    }

    pub fn name(&self) -> &str {
        self.type_ref.name()
    }

    pub fn with_xml_namespace(mut self, uri: &str) -> Self {
        self.xml_namespace = Some(uri.to_string());
        self
    }

    pub fn with_kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_base(mut self, base: TypeRef) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_converter(mut self, converter: TypeRef) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_constructors(mut self, arities: &[usize]) -> Self {
        self.constructor_arities = arities.to_vec();
        self
    }

    pub fn with_content_property(mut self, name: &str) -> Self {
        self.content_property = Some(name.to_string());
        self
    }

    pub fn as_extension(mut self) -> Self {
        self.is_extension = true;
        self
    }

    pub fn deferring(mut self) -> Self {
        self.defers_content = true;
        self
    }
}

/// How a member is attached to its owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MemberKind {
    #[default]
    Property,
    /// Attached property (static getter/setter pair on the owner).
    Attached,
}

/// Host-provided description of a property or attached property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescriptor {
    /// Declaring type.
    pub owner: TypeRef,
    pub name: String,
    pub kind: MemberKind,
    pub property_type: TypeRef,
    /// Per-property converter, overriding the property type's converter.
    pub converter: Option<TypeRef>,
}

impl MemberDescriptor {
    pub fn new(owner: TypeRef, name: &str, property_type: TypeRef) -> Self {
        Self { owner, name: name.to_string(), kind: MemberKind::Property, property_type, converter: None }
    }
}

/// Loaded component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentHandle {
    pub name: String,
}

/// Host type-reflection provider.
///
/// Alle Methoden sind reine Lookups; `None` bedeutet "nicht auflösbar".
pub trait TypeSystem {
    fn resolve_component(&self, name: &str) -> Option<ComponentHandle>;

    fn resolve_type(&self, component: &str, full_name: &str) -> Option<Rc<TypeDescriptor>>;

    /// Resolves a type published under an xml namespace.
    fn resolve_xml_type(&self, xml_namespace: &str, local_name: &str) -> Option<Rc<TypeDescriptor>>;

    /// Property or attached property `name` on `owner` (inherited members included).
    fn get_member(&self, owner: &TypeDescriptor, name: &str) -> Option<MemberDescriptor>;

    fn value_converter(&self, ty: &TypeDescriptor) -> Option<TypeRef> {
        ty.converter.clone()
    }

    fn property_converter(&self, member: &MemberDescriptor) -> Option<TypeRef> {
        member.converter.clone()
    }
}

/// In-memory [`TypeSystem`].
///
/// # Beispiel
///
/// ```
/// use baml::reflect::{StaticTypeSystem, TypeDescriptor, TypeSystem};
///
/// let mut types = StaticTypeSystem::new();
/// types.add_type(TypeDescriptor::new("MyApp", "MyApp.Gauge"));
/// assert!(types.resolve_type("MyApp", "MyApp.Gauge").is_some());
/// assert!(types.resolve_xml_type("clr-namespace:MyApp;assembly=MyApp", "Gauge").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticTypeSystem {
    types: FastIndexMap<TypeRef, Rc<TypeDescriptor>>,
    members: FastHashMap<(TypeRef, String), MemberDescriptor>,
    xml_namespaces: FastHashMap<String, Vec<(String, String)>>,
}

impl StaticTypeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, ty: TypeDescriptor) -> &mut Self {
        if let Some(uri) = &ty.xml_namespace {
            let entry = self.xml_namespaces.entry(uri.clone()).or_default();
            let target = (ty.type_ref.component.clone(), ty.type_ref.namespace().to_string());
            if !entry.contains(&target) {
                entry.push(target);
            }
        }
        self.types.insert(ty.type_ref.clone(), Rc::new(ty));
        self
    }

    pub fn add_member(&mut self, member: MemberDescriptor) -> &mut Self {
        self.members.insert((member.owner.clone(), member.name.clone()), member);
        self
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeSystem for StaticTypeSystem {
    fn resolve_component(&self, name: &str) -> Option<ComponentHandle> {
        self.types
            .keys()
            .any(|t| t.component == name)
            .then(|| ComponentHandle { name: name.to_string() })
    }

    fn resolve_type(&self, component: &str, full_name: &str) -> Option<Rc<TypeDescriptor>> {
        self.types.get(&TypeRef::new(component, full_name)).cloned()
    }

    fn resolve_xml_type(&self, xml_namespace: &str, local_name: &str) -> Option<Rc<TypeDescriptor>> {
        if let Some(m) = parse_clr_namespace(xml_namespace) {
            let full = format!("{}.{local_name}", m.clr_namespace);
            return match m.assembly {
                Some(asm) => self.resolve_type(&asm, &full),
                None => self.types.values().find(|t| t.type_ref.full_name == full).cloned(),
            };
        }
        self.xml_namespaces.get(xml_namespace)?.iter().find_map(|(component, ns)| {
            let full = if ns.is_empty() { local_name.to_string() } else { format!("{ns}.{local_name}") };
            self.resolve_type(component, &full)
        })
    }

    fn get_member(&self, owner: &TypeDescriptor, name: &str) -> Option<MemberDescriptor> {
        let mut current = Some(owner.type_ref.clone());
        // Basisklassen-Kette ablaufen; Zyklen über Tiefenlimit abfangen.
        for _ in 0..64 {
            let ty = current?;
            if let Some(m) = self.members.get(&(ty.clone(), name.to_string())) {
                return Some(m.clone());
            }
            current = self.types.get(&ty).and_then(|d| d.base.clone());
        }
        None
    }
}
