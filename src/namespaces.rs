//! XML-Namespace-Scope und CLR-Namespace-Mappings.
//!
//! Präfix-Deklarationen (`XmlnsProperty`) gelten für das deklarierende
//! Element und alle Nachfahren. Mappings (`PiMapping`) gelten ab ihrem
//! Auftreten für den Rest des Streams.

use crate::FastIndexMap;

/// Default-Namespace der Präsentations-Typen.
pub const PRESENTATION_URI: &str = "http://schemas.microsoft.com/winfx/2006/xaml/presentation";
/// Namespace der Sprach-Direktiven (`x:Key`, `x:Type`, ...).
pub const XAML_URI: &str = "http://schemas.microsoft.com/winfx/2006/xaml";
/// Namespace der Presentation-Options-Attribute (`po:Freeze`).
pub const PRESENTATION_OPTIONS_URI: &str =
    "http://schemas.microsoft.com/winfx/2006/xaml/presentation/options";

const CLR_NAMESPACE_PREFIX: &str = "clr-namespace:";
const ASSEMBLY_PART: &str = ";assembly=";

/// Target of an xml namespace: CLR namespace plus optional component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClrMapping {
    pub clr_namespace: String,
    pub assembly: Option<String>,
}

/// Zerlegt `clr-namespace:Ns;assembly=Asm`.
pub fn parse_clr_namespace(uri: &str) -> Option<ClrMapping> {
    let rest = uri.strip_prefix(CLR_NAMESPACE_PREFIX)?;
    let (ns, assembly) = match rest.split_once(ASSEMBLY_PART) {
        Some((ns, asm)) if !asm.is_empty() => (ns, Some(asm.to_string())),
        Some((ns, _)) => (ns, None),
        None => (rest, None),
    };
    Some(ClrMapping { clr_namespace: ns.to_string(), assembly })
}

/// Baut die `clr-namespace:` URI für einen CLR-Namespace.
pub fn clr_namespace_uri(clr_namespace: &str, assembly: Option<&str>) -> String {
    match assembly {
        Some(asm) if !asm.is_empty() => format!("{CLR_NAMESPACE_PREFIX}{clr_namespace}{ASSEMBLY_PART}{asm}"),
        _ => format!("{CLR_NAMESPACE_PREFIX}{clr_namespace}"),
    }
}

/// Splits `prefix:Local` into `("prefix", "Local")`; no colon → `("", name)`.
pub fn split_qualified(name: &str) -> (&str, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", name),
    }
}

/// Prefix scope stack plus stream-wide xml↔clr mappings.
#[derive(Debug, Clone, Default)]
pub struct NamespaceScope {
    frames: Vec<Vec<(String, String)>>,
    mappings: FastIndexMap<String, ClrMapping>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop_scope(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Deklariert `prefix` im innersten Scope (öffnet bei Bedarf einen).
    pub fn declare(&mut self, prefix: &str, uri: &str) {
        if self.frames.is_empty() {
            self.frames.push(Vec::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.push((prefix.to_string(), uri.to_string()));
        }
    }

    /// Namespace URI bound to `prefix`, innermost declaration wins.
    pub fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .flat_map(|f| f.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Präfix, unter dem `uri` aktuell erreichbar ist (nicht verschattet).
    pub fn lookup_prefix(&self, uri: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .flat_map(|f| f.iter().rev())
            .filter(|(_, u)| u == uri)
            .map(|(p, _)| p.as_str())
            .find(|p| self.lookup_namespace(p) == Some(uri))
    }

    /// Registriert ein `PiMapping` (xml namespace → clr namespace/component).
    pub fn add_mapping(&mut self, xml_namespace: &str, clr_namespace: &str, assembly: Option<&str>) {
        self.mappings.insert(
            xml_namespace.to_string(),
            ClrMapping {
                clr_namespace: clr_namespace.to_string(),
                assembly: assembly.map(str::to_string),
            },
        );
    }

    /// CLR target of an xml namespace: explicit mapping or `clr-namespace:` URI.
    pub fn clr_for(&self, xml_namespace: &str) -> Option<ClrMapping> {
        self.mappings.get(xml_namespace).cloned().or_else(|| parse_clr_namespace(xml_namespace))
    }

    /// Xml namespace for a CLR namespace: reverse mapping or `clr-namespace:` URI.
    pub fn xml_namespace_for(&self, clr_namespace: &str, assembly: Option<&str>) -> String {
        self.mappings
            .iter()
            .find(|(_, m)| m.clr_namespace == clr_namespace && m.assembly.as_deref() == assembly)
            .map(|(xml, _)| xml.clone())
            .unwrap_or_else(|| clr_namespace_uri(clr_namespace, assembly))
    }

    /// Stellt `local` das für `uri` gebundene Präfix voran.
    pub fn qualify(&self, uri: &str, local: &str) -> Option<String> {
        self.lookup_prefix(uri).map(|p| if p.is_empty() { local.to_string() } else { format!("{p}:{local}") })
    }
}
