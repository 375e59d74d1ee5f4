//! Statische Registry der eingebauten Typen, Properties und Strings.
//!
//! Eingebaute Einträge haben negative IDs (`-1 - index`) und berühren nie die
//! Tabellen eines Passes. Die Registry wird einmal pro Prozess aufgebaut
//! ([`known()`]) und danach nur noch gelesen.

use std::sync::LazyLock;

use crate::namespaces::{PRESENTATION_URI, XAML_URI};
use crate::reflect::{MemberDescriptor, MemberKind, TypeDescriptor, TypeKind, TypeRef};
use crate::FastHashMap;

/// Id of the single built-in component.
pub const KNOWN_COMPONENT_ID: i16 = -1;
/// Name of the single built-in component.
pub const KNOWN_COMPONENT: &str = "PresentationFramework";

/// Built-in strings (`-1 - index`).
const KNOWN_STRINGS: &[&str] = &["Name", "Uid"];

/// Suffix, den Extension-Typnamen im Markup weglassen dürfen.
pub const EXTENSION_SUFFIX: &str = "Extension";

/// Built-in type entry.
#[derive(Debug, Clone, Copy)]
pub struct KnownType {
    pub name: &'static str,
    pub namespace: &'static str,
    /// Xml namespace; empty for types that are never written as elements.
    pub xml_namespace: &'static str,
    pub base: Option<&'static str>,
    pub kind: TypeKind,
    /// Converter type (another known type).
    pub converter: Option<&'static str>,
    /// Always converted by its fixed converter, regardless of host metadata.
    pub always_custom: bool,
    pub is_extension: bool,
    pub constructor_arities: &'static [usize],
    pub content_property: Option<&'static str>,
    pub dictionary_key_property: Option<&'static str>,
    pub serializer: Option<&'static str>,
    pub defers_content: bool,
}

const CLASS: KnownType = KnownType {
    name: "",
    namespace: "",
    xml_namespace: "",
    base: None,
    kind: TypeKind::Class,
    converter: None,
    always_custom: false,
    is_extension: false,
    constructor_arities: &[],
    content_property: None,
    dictionary_key_property: None,
    serializer: None,
    defers_content: false,
};

const fn class(name: &'static str, namespace: &'static str, xml_namespace: &'static str) -> KnownType {
    KnownType { name, namespace, xml_namespace, ..CLASS }
}

const fn extension(name: &'static str, namespace: &'static str, xml_namespace: &'static str) -> KnownType {
    KnownType {
        name,
        namespace,
        xml_namespace,
        base: Some("MarkupExtension"),
        is_extension: true,
        constructor_arities: &[0, 1],
        ..CLASS
    }
}

const SYS: &str = "System";
const WIN: &str = "System.Windows";
const CTL: &str = "System.Windows.Controls";
const MEDIA: &str = "System.Windows.Media";
const MARKUP: &str = "System.Windows.Markup";
const DATA: &str = "System.Windows.Data";
const P: &str = PRESENTATION_URI;
const X: &str = XAML_URI;

static TYPES: &[KnownType] = &[
    class("Object", SYS, X),
    class("String", SYS, X),
    KnownType { always_custom: true, converter: Some("BooleanConverter"), ..class("Boolean", SYS, X) },
    KnownType { converter: Some("Int32Converter"), ..class("Int32", SYS, X) },
    KnownType { converter: Some("DoubleConverter"), ..class("Double", SYS, X) },
    class("Type", SYS, X),
    class("BooleanConverter", "System.ComponentModel", ""),
    class("Int32Converter", "System.ComponentModel", ""),
    class("DoubleConverter", "System.ComponentModel", ""),
    class("DependencyObject", WIN, P),
    KnownType {
        always_custom: true,
        converter: Some("DependencyPropertyConverter"),
        ..class("DependencyProperty", WIN, P)
    },
    class("DependencyPropertyConverter", MARKUP, ""),
    KnownType { base: Some("DependencyObject"), ..class("UIElement", WIN, P) },
    KnownType { base: Some("UIElement"), ..class("FrameworkElement", WIN, P) },
    KnownType { base: Some("FrameworkElement"), ..class("Control", CTL, P) },
    KnownType {
        base: Some("Control"),
        content_property: Some("Content"),
        ..class("ContentControl", CTL, P)
    },
    KnownType { base: Some("ContentControl"), content_property: Some("Content"), ..class("Button", CTL, P) },
    KnownType { base: Some("ContentControl"), content_property: Some("Content"), ..class("Window", WIN, P) },
    KnownType { base: Some("FrameworkElement"), content_property: Some("Text"), ..class("TextBlock", CTL, P) },
    KnownType { base: Some("FrameworkElement"), content_property: Some("Children"), ..class("Panel", CTL, P) },
    KnownType { base: Some("Panel"), content_property: Some("Children"), ..class("Grid", CTL, P) },
    KnownType { base: Some("Panel"), content_property: Some("Children"), ..class("StackPanel", CTL, P) },
    KnownType { base: Some("FrameworkElement"), content_property: Some("Child"), ..class("Border", CTL, P) },
    KnownType { kind: TypeKind::Dictionary, defers_content: true, ..class("ResourceDictionary", WIN, P) },
    KnownType {
        serializer: Some("XamlStyleSerializer"),
        dictionary_key_property: Some("TargetType"),
        content_property: Some("Setters"),
        ..class("Style", WIN, P)
    },
    class("XamlStyleSerializer", MARKUP, ""),
    class("FrameworkTemplate", WIN, ""),
    KnownType {
        base: Some("FrameworkTemplate"),
        serializer: Some("XamlTemplateSerializer"),
        dictionary_key_property: Some("TargetType"),
        ..class("ControlTemplate", CTL, P)
    },
    KnownType {
        base: Some("FrameworkTemplate"),
        serializer: Some("XamlTemplateSerializer"),
        dictionary_key_property: Some("DataType"),
        ..class("DataTemplate", WIN, P)
    },
    class("XamlTemplateSerializer", MARKUP, ""),
    class("Setter", WIN, P),
    KnownType { converter: Some("BrushConverter"), ..class("Brush", MEDIA, P) },
    class("BrushConverter", MEDIA, ""),
    KnownType { base: Some("Brush"), constructor_arities: &[0, 1], ..class("SolidColorBrush", MEDIA, P) },
    KnownType { converter: Some("ThicknessConverter"), ..class("Thickness", WIN, P) },
    class("ThicknessConverter", WIN, ""),
    KnownType { kind: TypeKind::Enum, ..class("Visibility", WIN, P) },
    class("MarkupExtension", MARKUP, ""),
    extension("TypeExtension", MARKUP, X),
    extension("StaticExtension", MARKUP, X),
    KnownType { constructor_arities: &[0], ..extension("NullExtension", MARKUP, X) },
    KnownType { content_property: Some("Items"), ..extension("ArrayExtension", MARKUP, X) },
    extension("StaticResourceExtension", WIN, P),
    extension("DynamicResourceExtension", WIN, P),
    extension("TemplateBindingExtension", WIN, P),
    extension("Binding", DATA, P),
    extension("RelativeSource", DATA, P),
    KnownType { constructor_arities: &[0, 2], ..extension("ComponentResourceKey", WIN, P) },
    KnownType { kind: TypeKind::List, ..class("UIElementCollection", CTL, "") },
    KnownType { kind: TypeKind::List, ..class("SetterBaseCollection", WIN, "") },
];

/// Built-in property entry.
#[derive(Debug, Clone, Copy)]
pub struct KnownProperty {
    pub owner: &'static str,
    pub name: &'static str,
    pub property_type: &'static str,
    pub attached: bool,
}

const fn prop(owner: &'static str, name: &'static str, property_type: &'static str) -> KnownProperty {
    KnownProperty { owner, name, property_type, attached: false }
}

const fn attached(owner: &'static str, name: &'static str, property_type: &'static str) -> KnownProperty {
    KnownProperty { owner, name, property_type, attached: true }
}

static PROPERTIES: &[KnownProperty] = &[
    prop("FrameworkElement", "Name", "String"),
    prop("FrameworkElement", "Width", "Double"),
    prop("FrameworkElement", "Height", "Double"),
    prop("FrameworkElement", "Margin", "Thickness"),
    prop("FrameworkElement", "Style", "Style"),
    prop("FrameworkElement", "Resources", "ResourceDictionary"),
    prop("FrameworkElement", "Tag", "Object"),
    prop("FrameworkElement", "DataContext", "Object"),
    prop("UIElement", "Visibility", "Visibility"),
    prop("UIElement", "IsEnabled", "Boolean"),
    prop("Control", "Background", "Brush"),
    prop("Control", "Foreground", "Brush"),
    prop("Control", "Template", "ControlTemplate"),
    prop("Control", "Padding", "Thickness"),
    prop("ContentControl", "Content", "Object"),
    prop("Window", "Title", "String"),
    prop("TextBlock", "Text", "String"),
    prop("TextBlock", "Foreground", "Brush"),
    prop("TextBlock", "Background", "Brush"),
    prop("Panel", "Children", "UIElementCollection"),
    prop("Panel", "Background", "Brush"),
    attached("Grid", "Row", "Int32"),
    attached("Grid", "Column", "Int32"),
    prop("Border", "Child", "UIElement"),
    prop("Border", "Background", "Brush"),
    prop("Border", "BorderBrush", "Brush"),
    prop("Border", "BorderThickness", "Thickness"),
    prop("ResourceDictionary", "Source", "String"),
    prop("Style", "TargetType", "Type"),
    prop("Style", "BasedOn", "Style"),
    prop("Style", "Setters", "SetterBaseCollection"),
    prop("ControlTemplate", "TargetType", "Type"),
    prop("DataTemplate", "DataType", "Object"),
    prop("Setter", "Property", "DependencyProperty"),
    prop("Setter", "Value", "Object"),
    prop("Binding", "Path", "String"),
    prop("Binding", "Converter", "Object"),
    prop("Binding", "ElementName", "String"),
    prop("Binding", "RelativeSource", "RelativeSource"),
    prop("TypeExtension", "TypeName", "String"),
    prop("TypeExtension", "Type", "Type"),
    prop("StaticExtension", "Member", "String"),
    prop("StaticResourceExtension", "ResourceKey", "Object"),
    prop("DynamicResourceExtension", "ResourceKey", "Object"),
    prop("TemplateBindingExtension", "Property", "DependencyProperty"),
    prop("ComponentResourceKey", "TypeInTargetAssembly", "Object"),
    prop("ComponentResourceKey", "ResourceId", "Object"),
    prop("RelativeSource", "AncestorType", "Type"),
];

/// Process-wide read-only registry.
pub struct KnownRegistry {
    /// Indizes in `TYPES`, sortiert nach (Name, Namespace).
    by_name: Vec<u16>,
    properties: FastHashMap<(&'static str, &'static str), i16>,
}

static REGISTRY: LazyLock<KnownRegistry> = LazyLock::new(KnownRegistry::build);

/// The shared built-in registry.
pub fn known() -> &'static KnownRegistry {
    &REGISTRY
}

#[inline]
fn index_to_id(index: usize) -> i16 {
    -1 - index as i16
}

#[inline]
fn id_to_index(id: i16) -> Option<usize> {
    if id < 0 { Some((-1 - i32::from(id)) as usize) } else { None }
}

impl KnownRegistry {
    fn build() -> Self {
        let mut by_name: Vec<u16> = (0..TYPES.len() as u16).collect();
        by_name.sort_by(|&a, &b| {
            let (ta, tb) = (&TYPES[a as usize], &TYPES[b as usize]);
            ta.name.cmp(tb.name).then(ta.namespace.cmp(tb.namespace))
        });
        let properties = PROPERTIES
            .iter()
            .enumerate()
            .map(|(i, p)| ((p.owner, p.name), index_to_id(i)))
            .collect();
        Self { by_name, properties }
    }

    pub fn type_count(&self) -> usize {
        TYPES.len()
    }

    pub fn property_count(&self) -> usize {
        PROPERTIES.len()
    }

    /// Known type by id (negative ids only).
    pub fn type_entry(&self, id: i16) -> Option<&'static KnownType> {
        TYPES.get(id_to_index(id)?)
    }

    pub fn property_entry(&self, id: i16) -> Option<&'static KnownProperty> {
        PROPERTIES.get(id_to_index(id)?)
    }

    pub fn string(&self, id: i16) -> Option<&'static str> {
        KNOWN_STRINGS.get(id_to_index(id)?).copied()
    }

    pub fn string_id(&self, text: &str) -> Option<i16> {
        KNOWN_STRINGS.iter().position(|s| *s == text).map(index_to_id)
    }

    pub fn component(&self, id: i16) -> Option<&'static str> {
        (id == KNOWN_COMPONENT_ID).then_some(KNOWN_COMPONENT)
    }

    /// Sucht einen Typ per Binärsuche über den Kurznamen.
    ///
    /// Gleichnamige Einträge werden über den CLR-Namespace und, sofern
    /// `component` angegeben ist, über die Component-Identität unterschieden.
    pub fn find_type(&self, name: &str, namespace: Option<&str>, component: Option<&str>) -> Option<i16> {
        if component.is_some_and(|c| c != KNOWN_COMPONENT) {
            return None;
        }
        let lo = self.by_name.partition_point(|&i| TYPES[i as usize].name < name);
        self.by_name[lo..]
            .iter()
            .map(|&i| i as usize)
            .take_while(|&i| TYPES[i].name == name)
            .find(|&i| namespace.is_none_or(|ns| TYPES[i].namespace == ns))
            .map(index_to_id)
    }

    /// Sucht einen Typ über seinen vollen Namen (`Namespace.Name`).
    pub fn find_full_name(&self, full_name: &str, component: Option<&str>) -> Option<i16> {
        let (ns, name) = crate::reflect::split_full_name(full_name);
        self.find_type(name, Some(ns), component)
    }

    /// Typ, der unter `xml_namespace` als `local` veröffentlicht ist.
    pub fn find_xml_type(&self, xml_namespace: &str, local: &str) -> Option<i16> {
        let lo = self.by_name.partition_point(|&i| TYPES[i as usize].name < local);
        self.by_name[lo..]
            .iter()
            .map(|&i| i as usize)
            .take_while(|&i| TYPES[i].name == local)
            .find(|&i| !TYPES[i].xml_namespace.is_empty() && TYPES[i].xml_namespace == xml_namespace)
            .map(index_to_id)
    }

    /// Wie [`find_xml_type`](Self::find_xml_type), probiert zuerst `local + "Extension"`.
    pub fn find_xml_extension(&self, xml_namespace: &str, local: &str) -> Option<i16> {
        if !local.ends_with(EXTENSION_SUFFIX) {
            let long = format!("{local}{EXTENSION_SUFFIX}");
            if let Some(id) = self.find_xml_type(xml_namespace, &long) {
                return Some(id);
            }
        }
        self.find_xml_type(xml_namespace, local)
    }

    /// Known property declared exactly on `owner`.
    pub fn find_property(&self, owner_id: i16, name: &str) -> Option<i16> {
        let owner = self.type_entry(owner_id)?;
        self.properties.get(&(owner.name, name)).copied()
    }

    /// Known property on `type_id` or one of its known base types.
    pub fn find_member(&self, type_id: i16, name: &str) -> Option<i16> {
        let mut current = Some(type_id);
        while let Some(id) = current {
            if let Some(p) = self.find_property(id, name) {
                return Some(p);
            }
            let base = self.type_entry(id)?.base?;
            current = self.find_type(base, None, None);
        }
        None
    }

    /// Owner type id of a known property.
    pub fn property_owner(&self, property_id: i16) -> Option<i16> {
        let p = self.property_entry(property_id)?;
        self.find_type(p.owner, None, None)
    }

    pub fn type_ref(&self, id: i16) -> Option<TypeRef> {
        let t = self.type_entry(id)?;
        Some(TypeRef::new(KNOWN_COMPONENT, full_name(t)))
    }

    /// Name in markup: extension types without the `Extension` suffix.
    pub fn display_name(&self, id: i16) -> Option<&'static str> {
        let t = self.type_entry(id)?;
        Some(if t.is_extension { t.name.strip_suffix(EXTENSION_SUFFIX).unwrap_or(t.name) } else { t.name })
    }

    /// Descriptor view of a known type, for host calls and converter lookup.
    pub fn descriptor(&self, id: i16) -> Option<TypeDescriptor> {
        let t = self.type_entry(id)?;
        let by_name = |n: &str| self.find_type(n, None, None).and_then(|i| self.type_ref(i));
        Some(TypeDescriptor {
            type_ref: TypeRef::new(KNOWN_COMPONENT, full_name(t)),
            xml_namespace: (!t.xml_namespace.is_empty()).then(|| t.xml_namespace.to_string()),
            kind: t.kind,
            underlying: None,
            base: t.base.and_then(by_name),
            is_internal: false,
            is_extension: t.is_extension,
            converter: t.converter.and_then(by_name),
            serializer: t.serializer.and_then(by_name),
            constructor_arities: t.constructor_arities.to_vec(),
            content_property: t.content_property.map(str::to_string),
            dictionary_key_property: t.dictionary_key_property.map(str::to_string),
            defers_content: t.defers_content,
        })
    }

    pub fn member_descriptor(&self, property_id: i16) -> Option<MemberDescriptor> {
        let p = self.property_entry(property_id)?;
        let owner = self.type_ref(self.find_type(p.owner, None, None)?)?;
        let property_type = self.type_ref(self.find_type(p.property_type, None, None)?)?;
        Some(MemberDescriptor {
            owner,
            name: p.name.to_string(),
            kind: if p.attached { MemberKind::Attached } else { MemberKind::Property },
            property_type,
            converter: None,
        })
    }

    /// Known converter type id for a known type (its own fixed converter).
    pub fn converter_id(&self, type_id: i16) -> Option<i16> {
        let conv = self.type_entry(type_id)?.converter?;
        self.find_type(conv, None, None)
    }

    /// Id of a known type by short name; panics never, `None` if absent.
    pub fn type_id(&self, name: &str) -> Option<i16> {
        self.find_type(name, None, None)
    }
}

fn full_name(t: &KnownType) -> String {
    if t.namespace.is_empty() { t.name.to_string() } else { format!("{}.{}", t.namespace, t.name) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_negative_and_dense() {
        let k = known();
        assert_eq!(k.type_entry(-1).unwrap().name, "Object");
        assert!(k.type_entry(0).is_none());
        assert!(k.type_entry(-(k.type_count() as i16) - 1).is_none());
        assert_eq!(k.string(-1), Some("Name"));
        assert_eq!(k.string_id("Uid"), Some(-2));
        assert_eq!(k.component(-1), Some(KNOWN_COMPONENT));
        assert_eq!(k.component(0), None);
    }

    #[test]
    fn binary_search_by_short_name() {
        let k = known();
        let id = k.find_type("Button", None, None).unwrap();
        assert_eq!(k.type_entry(id).unwrap().namespace, "System.Windows.Controls");
        assert_eq!(k.find_type("Button", Some("Other.Ns"), None), None);
        assert_eq!(k.find_type("Button", None, Some("SomeOtherAssembly")), None);
        assert_eq!(k.find_full_name("System.Windows.Style", Some(KNOWN_COMPONENT)), k.type_id("Style"));
        assert_eq!(k.find_type("Zzz", None, None), None);
    }

    #[test]
    fn xml_lookup_and_extension_suffix() {
        let k = known();
        assert_eq!(k.find_xml_type(PRESENTATION_URI, "Grid"), k.type_id("Grid"));
        assert_eq!(k.find_xml_type(XAML_URI, "Grid"), None);
        assert_eq!(k.find_xml_extension(XAML_URI, "Type"), k.type_id("TypeExtension"));
        assert_eq!(k.find_xml_extension(PRESENTATION_URI, "Binding"), k.type_id("Binding"));
        let sre = k.type_id("StaticResourceExtension").unwrap();
        assert_eq!(k.display_name(sre), Some("StaticResource"));
        // Converter-Typen sind nicht als Element erreichbar.
        assert_eq!(k.find_xml_type("", "BrushConverter"), None);
    }

    #[test]
    fn members_found_through_base_chain() {
        let k = known();
        let button = k.type_id("Button").unwrap();
        let bg = k.find_member(button, "Background").unwrap();
        assert_eq!(k.property_owner(bg), k.type_id("Control"));
        assert_eq!(k.find_property(button, "Background"), None);
        assert_eq!(k.find_member(button, "Nope"), None);
    }

    #[test]
    fn descriptors_carry_metadata() {
        let k = known();
        let style = k.descriptor(k.type_id("Style").unwrap()).unwrap();
        assert_eq!(style.dictionary_key_property.as_deref(), Some("TargetType"));
        assert_eq!(style.serializer.unwrap().name(), "XamlStyleSerializer");
        let rd = k.descriptor(k.type_id("ResourceDictionary").unwrap()).unwrap();
        assert!(rd.defers_content);
        let row = k.member_descriptor(k.find_member(k.type_id("Grid").unwrap(), "Row").unwrap()).unwrap();
        assert_eq!(row.kind, MemberKind::Attached);
        assert_eq!(row.property_type.full_name, "System.Int32");
    }

    #[test]
    fn converters_for_always_custom_types() {
        let k = known();
        let b = k.type_id("Boolean").unwrap();
        assert!(k.type_entry(b).unwrap().always_custom);
        assert_eq!(k.converter_id(b), k.type_id("BooleanConverter"));
        assert_eq!(k.converter_id(k.type_id("Object").unwrap()), None);
    }
}
