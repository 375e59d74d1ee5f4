//! Byte-level stream reader and writer for BAML records.
//!
//! Alle Festbreitenfelder sind little-endian. Der Writer puffert in einem
//! `Vec<u8>` und erlaubt das nachträgliche Patchen bereits geschriebener
//! Felder (Deferred-Content-Offsets). Der Reader liest vorwärts aus einer
//! beliebigen `Read`-Quelle und zählt die absolute Stream-Position mit.

use std::io::{Read, Write};

use crate::{Error, Result, unsigned_integer};

/// Writes fixed-width little-endian fields into a growable buffer.
///
/// `base` ist die absolute Stream-Position des ersten Bytes in `buf`;
/// nach `drain_to()` wandert sie mit, so dass `position()` absolut bleibt.
pub struct ByteWriter {
    buf: Vec<u8>,
    base: u64,
}

impl ByteWriter {
    /// Creates a new empty `ByteWriter`.
    pub fn new() -> Self {
        Self { buf: Vec::new(), base: 0 }
    }

    #[inline]
    pub fn write_u8(&mut self, val: u8) {
        self.buf.push(val);
    }

    #[inline]
    pub fn write_bool(&mut self, val: bool) {
        self.buf.push(u8::from(val));
    }

    #[inline]
    pub fn write_u16(&mut self, val: u16) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn write_i16(&mut self, val: i16) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn write_u32(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn write_i32(&mut self, val: i32) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Schreibt einen String mit 7-Bit-kodiertem Längenpräfix (UTF-8 Bytes).
    pub fn write_string(&mut self, value: &str) {
        unsigned_integer::encode(self, value.len() as u64);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Absolute stream position of the next byte to be written.
    pub fn position(&self) -> u64 {
        self.base + self.buf.len() as u64
    }

    /// Überschreibt ein bereits geschriebenes `i32`-Feld an absoluter Position.
    pub fn patch_i32(&mut self, position: u64, val: i32) -> Result<()> {
        let start = self.local_index(position, 4)?;
        self.buf[start..start + 4].copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    fn local_index(&self, position: u64, width: usize) -> Result<usize> {
        let published = self.base;
        let rel = position
            .checked_sub(self.base)
            .ok_or(Error::PipeOutOfRange { position, published })?;
        let rel = usize::try_from(rel).map_err(|_| Error::IntegerOverflow)?;
        if rel + width > self.buf.len() {
            return Err(Error::PipeOutOfRange { position, published });
        }
        Ok(rel)
    }

    /// Anzahl gepufferter, noch nicht geflushter Bytes.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Schreibt alle gepufferten Bytes nach `out` und leert den Puffer.
    /// Die absolute Position bleibt erhalten.
    pub fn drain_to(&mut self, out: &mut impl Write) -> Result<()> {
        out.write_all(&self.buf).map_err(|e| Error::IoError(e.to_string()))?;
        self.base += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads fixed-width little-endian fields from any `Read` source.
pub struct ByteReader<R> {
    source: R,
    position: u64,
}

impl<R: Read> ByteReader<R> {
    pub fn new(source: R) -> Self {
        Self { source, position: 0 }
    }

    /// Absolute position of the next unread byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Liest ein Byte; `None` am sauberen Stream-Ende (zwischen Records).
    pub fn try_read_u8(&mut self) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        loop {
            match self.source.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(b[0]));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.source.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.try_read_u8()?.ok_or(Error::PrematureEndOfStream)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(i16::from_le_bytes(b))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    /// Liest einen String mit 7-Bit-kodiertem Längenpräfix.
    pub fn read_string(&mut self) -> Result<String> {
        let len = unsigned_integer::decode(self)?;
        let len = usize::try_from(len).map_err(|_| Error::IntegerOverflow)?;
        // Kein Vorab-Alloziieren anhand manipulierter Längen: Take + read_to_end.
        let mut bytes = Vec::with_capacity(len.min(4096));
        let read = (&mut self.source).take(len as u64).read_to_end(&mut bytes)?;
        self.position += read as u64;
        if read != len {
            return Err(Error::PrematureEndOfStream);
        }
        String::from_utf8(bytes).map_err(|_| Error::InvalidString)
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}
