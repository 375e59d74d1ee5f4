//! Anzeigenamen für Typen, Member und optimierte Extension-Werte.
//!
//! Alles hier ist reine Lookup-Logik über Tabellen und Namespace-Scope;
//! Host-Validierung passiert im Decoder selbst.

use crate::extension::{KnownExtension, argument_text};
use crate::known::{KNOWN_COMPONENT, known};
use crate::map_table::MapTable;
use crate::namespaces::{NamespaceScope, XAML_URI, clr_namespace_uri};
use crate::node::qualified_name;
use crate::record::{
    EXTENSION_ID_MASK, EXTENSION_VALUE_STATIC, EXTENSION_VALUE_TYPE, RecordType, STATIC_RESOURCE_STATIC,
    STATIC_RESOURCE_TYPE,
};
use crate::reflect::split_full_name;
use crate::{Error, Result};

/// Fully resolved type name.
#[derive(Debug, Clone, Default)]
pub(super) struct TypeName {
    pub(super) prefix: String,
    pub(super) local: String,
    pub(super) xml_namespace: String,
    pub(super) clr_namespace: String,
    pub(super) assembly: String,
}

impl TypeName {
    pub(super) fn display(&self) -> String {
        qualified_name(&self.prefix, &self.local)
    }
}

/// Member name as written on a given element.
#[derive(Debug, Clone)]
pub(super) struct MemberDisplay {
    /// `Width` or `Grid.Row` / `local:Gauge.Level`.
    pub(super) name: String,
    pub(super) local: String,
    /// Qualifying owner, if the member does not belong to the element.
    pub(super) owner: Option<TypeName>,
}

/// Text values that look like an extension get the `{}` escape.
pub(super) fn literal_attribute(value: String) -> String {
    if value.starts_with('{') { format!("{{}}{value}") } else { value }
}

pub(super) struct Names<'a> {
    tables: &'a MapTable,
    scope: &'a NamespaceScope,
}

impl<'a> Names<'a> {
    pub(super) fn new(tables: &'a MapTable, scope: &'a NamespaceScope) -> Self {
        Self { tables, scope }
    }

    /// Präfix für `uri`; ohne Deklaration `x` für den Xaml-Namespace, sonst leer.
    fn prefix_for(&self, uri: &str) -> String {
        match self.scope.lookup_prefix(uri) {
            Some(p) => p.to_string(),
            None if uri == XAML_URI => "x".to_string(),
            None => {
                log::warn!("no prefix in scope for namespace '{uri}'");
                String::new()
            }
        }
    }

    /// `x:Key`-artige Direktive im Namespace `uri`.
    pub(super) fn directive(&self, uri: &str, local: &str) -> (String, String) {
        let prefix = self.prefix_for(uri);
        (qualified_name(&prefix, local), prefix)
    }

    pub(super) fn type_name(&self, id: i16) -> Result<TypeName> {
        if id < 0 {
            let k = known();
            let entry = k.type_entry(id).ok_or(Error::UnknownTypeId(id))?;
            let local = k.display_name(id).unwrap_or(entry.name).to_string();
            let xml_namespace = if entry.xml_namespace.is_empty() {
                clr_namespace_uri(entry.namespace, Some(KNOWN_COMPONENT))
            } else {
                entry.xml_namespace.to_string()
            };
            return Ok(TypeName {
                prefix: self.prefix_for(&xml_namespace),
                local,
                xml_namespace,
                clr_namespace: entry.namespace.to_string(),
                assembly: KNOWN_COMPONENT.to_string(),
            });
        }
        let record = self.tables.type_record(id)?;
        let component = self.tables.component(record.component_id)?;
        let (clr_namespace, local) = split_full_name(&record.full_name);
        let assembly = Some(component).filter(|c| !c.is_empty());
        let published = self.tables.resolve_type(id).ok().flatten().and_then(|d| d.xml_namespace.clone());
        let xml_namespace =
            published.unwrap_or_else(|| self.scope.xml_namespace_for(clr_namespace, assembly));
        Ok(TypeName {
            prefix: self.prefix_for(&xml_namespace),
            local: local.to_string(),
            xml_namespace,
            clr_namespace: clr_namespace.to_string(),
            assembly: component.to_string(),
        })
    }

    /// True if `attribute_id` is reachable unqualified on `element_type`.
    fn belongs_to(&self, element_type: i16, owner: i16, attribute_id: i16, name: &str) -> bool {
        if element_type == owner {
            return true;
        }
        if element_type < 0 {
            return known().find_member(element_type, name) == Some(attribute_id);
        }
        let (Ok(Some(element)), Some(host)) = (self.tables.resolve_type(element_type), self.tables.type_system())
        else {
            return false;
        };
        let Ok(owner_ref) = self.tables.type_ref(owner) else {
            return false;
        };
        host.get_member(&element, name).is_some_and(|m| m.owner == owner_ref)
    }

    pub(super) fn member(&self, attribute_id: i16, element_type: Option<i16>) -> Result<MemberDisplay> {
        let (owner, name) = self.tables.attribute(attribute_id)?;
        if element_type.is_some_and(|t| self.belongs_to(t, owner, attribute_id, name)) {
            return Ok(MemberDisplay { name: name.to_string(), local: name.to_string(), owner: None });
        }
        let owner = self.type_name(owner)?;
        Ok(MemberDisplay { name: format!("{}.{name}", owner.display()), local: name.to_string(), owner: Some(owner) })
    }

    /// `p:Owner.Member`
    pub(super) fn member_path(&self, attribute_id: i16) -> Result<String> {
        let (owner, name) = self.tables.attribute(attribute_id)?;
        Ok(format!("{}.{name}", self.type_name(owner)?.display()))
    }

    fn extension_name(&self, kind: KnownExtension) -> String {
        let local = kind.type_id().and_then(|id| known().display_name(id)).unwrap_or(kind.type_name());
        self.directive(kind.xml_namespace(), local).0
    }

    /// `{x:Type p:T}`
    pub(super) fn type_reference(&self, type_id: i16) -> Result<String> {
        Ok(format!("{{{} {}}}", self.extension_name(KnownExtension::Type), self.type_name(type_id)?.display()))
    }

    /// `{x:Static p:Owner.Member}`
    pub(super) fn static_reference(&self, attribute_id: i16) -> Result<String> {
        Ok(format!("{{{} {}}}", self.extension_name(KnownExtension::Static), self.member_path(attribute_id)?))
    }

    fn template_property(&self, attribute_id: i16) -> Result<String> {
        let (_, name) = self.tables.attribute(attribute_id)?;
        let on_control = known().type_id("Control").and_then(|c| known().find_member(c, name));
        if on_control == Some(attribute_id) { Ok(name.to_string()) } else { self.member_path(attribute_id) }
    }

    /// Text of a `PropertyWithExtension` value.
    pub(super) fn extension_value(&self, extension: u16, value_id: i16) -> Result<String> {
        let wire = extension & EXTENSION_ID_MASK;
        let kind = KnownExtension::from_wire_id(wire).ok_or_else(|| {
            Error::unexpected(RecordType::PropertyWithExtension, format!("unknown extension id {wire}"))
        })?;
        let argument = if extension & EXTENSION_VALUE_TYPE != 0 {
            self.type_reference(value_id)?
        } else if extension & EXTENSION_VALUE_STATIC != 0 {
            self.static_reference(value_id)?
        } else {
            match kind {
                KnownExtension::StaticResource | KnownExtension::DynamicResource => {
                    argument_text(self.tables.string(value_id)?).into_owned()
                }
                KnownExtension::Static => self.member_path(value_id)?,
                KnownExtension::TemplateBinding => self.template_property(value_id)?,
                KnownExtension::Type => self.type_name(value_id)?.display(),
            }
        };
        Ok(format!("{{{} {argument}}}", self.extension_name(kind)))
    }

    /// Text of a front-loaded `OptimizedStaticResource`.
    pub(super) fn optimized_resource(&self, flags: u8, value_id: i16) -> Result<String> {
        let argument = if flags & STATIC_RESOURCE_TYPE != 0 {
            self.type_reference(value_id)?
        } else if flags & STATIC_RESOURCE_STATIC != 0 {
            self.static_reference(value_id)?
        } else {
            argument_text(self.tables.string(value_id)?).into_owned()
        };
        Ok(format!("{{{} {argument}}}", self.extension_name(KnownExtension::StaticResource)))
    }
}
