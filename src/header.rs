//! BAML Version Header.
//!
//! Der Header steht am Anfang jedes Streams:
//! - Feature-ID: u32 Byte-Länge + UTF-16LE Code Units (`"MSBAML"`)
//! - Reader-Version: u16 major + u16 minor
//! - Updater-Version: u16 major + u16 minor
//! - Writer-Version: u16 major + u16 minor
//!
//! Ein Decoder akzeptiert nur Streams, deren Reader-Version exakt seiner
//! eigenen entspricht.
//!
//! # Beispiel
//!
//! ```
//! use baml::header::BamlHeader;
//!
//! let header = BamlHeader::default();
//! assert_eq!(header.feature_id(), "MSBAML");
//! assert_eq!(header.reader_version(), (0, 96));
//! ```

use std::io::Read;

use crate::bytestream::{ByteReader, ByteWriter};
use crate::{Error, Result};

/// Feature-ID aller BAML-Streams.
pub const FEATURE_ID: &str = "MSBAML";

/// Format version written and accepted by this crate.
pub const FORMAT_VERSION: (u16, u16) = (0, 96);

/// Obergrenze für die Feature-ID-Länge (Schutz vor manipulierten Headern).
const MAX_FEATURE_ID_BYTES: u32 = 256;

/// BAML version header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BamlHeader {
    feature_id: String,
    reader: (u16, u16),
    updater: (u16, u16),
    writer: (u16, u16),
}

impl Default for BamlHeader {
    fn default() -> Self {
        Self {
            feature_id: FEATURE_ID.to_string(),
            reader: FORMAT_VERSION,
            updater: FORMAT_VERSION,
            writer: FORMAT_VERSION,
        }
    }
}

impl BamlHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }

    pub fn reader_version(&self) -> (u16, u16) {
        self.reader
    }

    pub fn updater_version(&self) -> (u16, u16) {
        self.updater
    }

    pub fn writer_version(&self) -> (u16, u16) {
        self.writer
    }

    /// Setzt die Writer-Version (Reader bleibt kompatibel solange die
    /// Reader-Version unverändert ist).
    pub fn with_writer_version(mut self, major: u16, minor: u16) -> Self {
        self.writer = (major, minor);
        self
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + self.feature_id.encode_utf16().count() * 2 + 12
    }
}

/// Schreibt den Version Header.
pub fn encode(writer: &mut ByteWriter, header: &BamlHeader) {
    let units: Vec<u16> = header.feature_id.encode_utf16().collect();
    writer.write_u32((units.len() * 2) as u32);
    for unit in units {
        writer.write_u16(unit);
    }
    for (major, minor) in [header.reader, header.updater, header.writer] {
        writer.write_u16(major);
        writer.write_u16(minor);
    }
}

/// Liest und validiert den Version Header.
pub fn decode<R: Read>(reader: &mut ByteReader<R>) -> Result<BamlHeader> {
    let byte_len = reader.read_u32()?;
    if byte_len % 2 != 0 || byte_len > MAX_FEATURE_ID_BYTES {
        return Err(Error::MalformedHeader);
    }
    let mut units = Vec::with_capacity(byte_len as usize / 2);
    for _ in 0..byte_len / 2 {
        units.push(reader.read_u16()?);
    }
    let feature_id = String::from_utf16(&units).map_err(|_| Error::MalformedHeader)?;
    if feature_id != FEATURE_ID {
        return Err(Error::UnsupportedVersion(format!("feature id '{feature_id}'")));
    }

    let mut versions = [(0u16, 0u16); 3];
    for v in &mut versions {
        *v = (reader.read_u16()?, reader.read_u16()?);
    }
    let [reader_v, updater, writer] = versions;
    if reader_v != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(format!(
            "reader version {}.{}",
            reader_v.0, reader_v.1
        )));
    }
    Ok(BamlHeader { feature_id, reader: reader_v, updater, writer })
}
