use std::collections::VecDeque;

use crate::record::{Record, RecordType};

/// Offener Scope auf dem Decoder-Stack.
#[derive(Debug, Clone)]
pub(super) struct NodeInfo {
    /// Öffnender Record-Typ; bestimmt den erwarteten schließenden Typ.
    pub(super) kind: RecordType,
    /// Element-Typ (Elemente) bzw. Typ des Eigentümers (Property-Scopes).
    pub(super) type_id: Option<i16>,
    pub(super) attribute_id: Option<i16>,
    /// Anzeigename für den End-Knoten.
    pub(super) name: String,
    pub(super) local_name: String,
    pub(super) prefix: String,
    pub(super) xml_namespace: String,
    /// Zuletzt gesehener ContentProperty-Record dieses Elements.
    pub(super) content_property: Option<i16>,
    /// Dieser Scope besitzt einen Deferred-Content-Block.
    pub(super) owns_deferred: bool,
}

impl NodeInfo {
    pub(super) fn new(kind: RecordType) -> Self {
        Self {
            kind,
            type_id: None,
            attribute_id: None,
            name: String::new(),
            local_name: String::new(),
            prefix: String::new(),
            xml_namespace: String::new(),
            content_property: None,
            owns_deferred: false,
        }
    }

    pub(super) fn element(type_id: i16) -> Self {
        Self { type_id: Some(type_id), ..Self::new(RecordType::ElementStart) }
    }

    pub(super) fn property(kind: RecordType, attribute_id: i16, owner: Option<i16>) -> Self {
        Self { attribute_id: Some(attribute_id), type_id: owner, ..Self::new(kind) }
    }

    pub(super) fn closing(&self) -> Option<RecordType> {
        self.kind.closing()
    }
}

/// Dictionary key gathered by the key scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct KeyInfo {
    /// Key expression text (literal, `{x:Type ..}` or compacted subtree).
    pub(super) text: String,
    /// Offset of the value relative to the value region start.
    pub(super) value_position: i32,
    pub(super) shared: Option<bool>,
    /// Front-loaded resource runs referenced from the value, by index.
    pub(super) runs: Vec<Vec<Record>>,
}

/// State of an open deferred-content block.
#[derive(Debug, Clone)]
pub(super) struct DeferredBlock {
    /// Stack depth at which values start (owner scope on top).
    pub(super) depth: usize,
    pub(super) marker_end: u64,
    pub(super) content_size: u64,
    pub(super) value_region_start: u64,
    pub(super) keys: VecDeque<KeyInfo>,
    /// Runs of the key whose value is currently being read.
    pub(super) active_runs: Vec<Vec<Record>>,
}

impl DeferredBlock {
    /// Pops the head key if `offset` (absolute) is its value's start.
    pub(super) fn take_key_at(&mut self, offset: u64) -> Option<KeyInfo> {
        let relative = offset.checked_sub(self.value_region_start)?;
        let head = self.keys.front()?;
        if u64::try_from(head.value_position).ok()? != relative {
            return None;
        }
        let key = self.keys.pop_front()?;
        self.active_runs = key.runs.clone();
        Some(key)
    }
}
