use std::io::Read;
use std::rc::Rc;

use crate::Result;
use crate::node::BamlNode;
use crate::reflect::TypeSystem;

use super::{BamlReader, DecoderOptions};

/// Dekodiert einen kompletten BAML-Stream in eine Knotenliste.
pub fn decode(data: &[u8]) -> Result<Vec<BamlNode>> {
    decode_with(data, DecoderOptions::default(), None)
}

/// Dekodiert mit Optionen und optionalem Host-Type-System.
pub fn decode_with(
    data: &[u8],
    options: DecoderOptions,
    host: Option<Rc<dyn TypeSystem>>,
) -> Result<Vec<BamlNode>> {
    let mut reader = BamlReader::with_options(data, options);
    if let Some(host) = host {
        reader = reader.with_type_system(host);
    }
    NodeIter { reader: Some(reader) }.collect()
}

/// Erstellt einen Knoten-Iterator über einen beliebigen Byte-Strom.
pub fn decode_iter<R: Read>(reader: R) -> NodeIter<R> {
    NodeIter { reader: Some(BamlReader::new(reader)) }
}

/// Iterator über die Knoten eines Readers.
///
/// Nach dem letzten Knoten oder dem ersten Fehler ist der Iterator
/// erschöpft; der Reader wird dabei freigegeben.
pub struct NodeIter<R> {
    reader: Option<BamlReader<R>>,
}

impl<R: Read> NodeIter<R> {
    pub fn new(reader: BamlReader<R>) -> Self {
        Self { reader: Some(reader) }
    }

    /// Underlying reader, `None` once the iterator is exhausted.
    pub fn into_reader(self) -> Option<BamlReader<R>> {
        self.reader
    }
}

impl<R: Read> Iterator for NodeIter<R> {
    type Item = Result<BamlNode>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        match reader.read() {
            Ok(true) => Some(Ok(reader.take_node())),
            Ok(false) => {
                self.reader = None;
                None
            }
            Err(e) => {
                self.reader = None;
                Some(Err(e))
            }
        }
    }
}
