//! Puffer für Deferred Content und vorgezogene Ressourcen-Runs.
//!
//! Eine [`Region`] sammelt Keys und Werte eines Dictionaries getrennt. Beim
//! Schließen werden Marker, Keys (mit ihren Runs) und Werte hintereinander
//! geschrieben; Werte-Offsets und Inhaltsgröße werden nachträglich gepatcht.

use crate::bytestream::ByteWriter;
use crate::record::Record;
use crate::{Error, Result};

/// Key expression of one dictionary value.
#[derive(Default)]
pub(super) enum KeyForm {
    #[default]
    Missing,
    /// Interned literal text.
    Text { value_id: i16 },
    /// `{x:Type T}`
    Type { type_id: i16 },
    /// Compiled key subtree; `body` holds everything after the root record.
    Subtree { type_id: i16, body: ByteWriter },
}

#[derive(Default)]
pub(super) struct KeySlot {
    pub(super) form: KeyForm,
    pub(super) shared: Option<bool>,
    /// Wrapped runs (`StaticResourceStart .. StaticResourceEnd`), by index.
    pub(super) runs: Vec<ByteWriter>,
}

impl KeySlot {
    pub(super) fn is_filled(&self) -> bool {
        !matches!(self.form, KeyForm::Missing)
    }

    /// Index of the next captured run.
    pub(super) fn push_run(&mut self, run: ByteWriter) -> Result<i16> {
        let id = i16::try_from(self.runs.len()).map_err(|_| Error::TableOverflow("static resource"))?;
        self.runs.push(run);
        Ok(id)
    }

    /// Writes the key record and its runs; returns the patch offset of `value_position`.
    fn write(&self, w: &mut ByteWriter, index: usize) -> Result<Option<u64>> {
        let (shared, shared_set) = (self.shared.unwrap_or(true), self.shared.is_some());
        let written = match &self.form {
            KeyForm::Missing => return Err(Error::MissingDictionaryKey(index)),
            KeyForm::Text { value_id } => {
                Record::DefAttributeKeyString { value_id: *value_id, value_position: 0, shared, shared_set }
                    .write(w)
            }
            KeyForm::Type { type_id } => Record::DefAttributeKeyType {
                type_id: *type_id,
                flags: 0,
                value_position: 0,
                shared,
                shared_set,
            }
            .write(w),
            KeyForm::Subtree { type_id, body } => {
                let written = Record::KeyElementStart {
                    type_id: *type_id,
                    flags: 0,
                    value_position: 0,
                    shared,
                    shared_set,
                }
                .write(w);
                w.write_bytes(body.bytes());
                written
            }
        };
        for run in &self.runs {
            w.write_bytes(run.bytes());
        }
        Ok(written.patch_at)
    }
}

/// Open deferred-content block of one dictionary element.
pub(super) struct Region {
    /// Stack index of the owning element frame.
    pub(super) owner: usize,
    /// Values have started; records now go into `values`.
    pub(super) in_content: bool,
    /// Table records hoisted in front of the block (outermost region only).
    pub(super) tables: ByteWriter,
    pub(super) keys: Vec<KeySlot>,
    pub(super) values: ByteWriter,
    /// Start of each value, relative to the value region.
    pub(super) value_starts: Vec<u64>,
}

impl Region {
    pub(super) fn new(owner: usize) -> Self {
        Self {
            owner,
            in_content: false,
            tables: ByteWriter::new(),
            keys: Vec::new(),
            values: ByteWriter::new(),
            value_starts: Vec::new(),
        }
    }

    /// Allocates the key slot of a new value; returns its index.
    pub(super) fn begin_value(&mut self) -> usize {
        self.in_content = true;
        self.value_starts.push(self.values.position());
        self.keys.push(KeySlot::default());
        self.keys.len() - 1
    }

    /// Writes tables, marker, keys and values into `w`.
    ///
    /// Das abschließende `ElementEnd` schreibt der Aufrufer.
    pub(super) fn finish(self, w: &mut ByteWriter) -> Result<()> {
        if let Some(missing) = self.keys.iter().position(|k| !k.is_filled()) {
            return Err(Error::MissingDictionaryKey(missing));
        }
        w.write_bytes(self.tables.bytes());

        let marker = Record::DeferableContentStart { content_size: 0 }.write(w);
        let mut patches = Vec::with_capacity(self.keys.len());
        for (index, key) in self.keys.iter().enumerate() {
            patches.push(key.write(w, index)?);
        }
        for (patch, start) in patches.into_iter().zip(&self.value_starts) {
            if let Some(at) = patch {
                w.patch_i32(at, to_i32(*start)?)?;
            }
        }
        w.write_bytes(self.values.bytes());

        let content_size = w.position() - marker.end;
        if let Some(at) = marker.patch_at {
            w.patch_i32(at, to_i32(content_size)?)?;
        }
        log::debug!("deferred block flushed: {} keys, {content_size} content bytes", self.keys.len());
        Ok(())
    }
}

fn to_i32(value: u64) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::IntegerOverflow)
}

/// Was ein Capture-Puffer aufnimmt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CaptureKind {
    /// Compiled key subtree; its root element becomes `KeyElementStart`.
    Key,
    /// Body of a front-loaded static resource element.
    Run,
}

pub(super) struct Capture {
    pub(super) kind: CaptureKind,
    pub(super) bytes: ByteWriter,
    /// Root type of a key subtree, once its start was seen.
    pub(super) root: Option<i16>,
}

impl Capture {
    pub(super) fn new(kind: CaptureKind) -> Self {
        Self { kind, bytes: ByteWriter::new(), root: None }
    }
}

/// Puffer-Stapel des Encoders; der oberste nimmt die Records auf.
pub(super) enum Sink {
    Region(Region),
    Capture(Capture),
}
