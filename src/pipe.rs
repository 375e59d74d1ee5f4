//! Byte-Pipe zwischen einem Encoder- und einem Decoder-Thread.
//!
//! Beide Seiten teilen eine Liste fester Chunks. Der Writer darf alles ab
//! dem veröffentlichten Wasserstand schreiben und überschreiben; mit
//! [`PipeWriter::publish`] wird ein Bereich für den Reader sichtbar und
//! danach unveränderlich. Der Reader gibt gelesene Bereiche mit
//! [`PipeReader::release_to`] frei, erst dann werden Chunks verworfen.
//!
//! Back-Pressure: sind `max_chunks` Chunks belegt, blockiert der Writer bis
//! der Reader Platz schafft.
//!
//! ```
//! use std::io::{Read, Write};
//!
//! let (mut writer, mut reader) = baml::pipe::byte_pipe(4, 2);
//! let producer = std::thread::spawn(move || {
//!     writer.write_all(b"hello pipe").unwrap();
//! });
//! let mut text = String::new();
//! reader.read_to_string(&mut text).unwrap();
//! producer.join().unwrap();
//! assert_eq!(text, "hello pipe");
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::{Error, Result};

/// Creates a connected writer/reader pair.
///
/// `chunk_size` and `max_chunks` are clamped to at least 1.
pub fn byte_pipe(chunk_size: usize, max_chunks: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::default()),
        changed: Condvar::new(),
        chunk_size: chunk_size.max(1),
        max_chunks: max_chunks.max(1),
    });
    (PipeWriter { shared: Arc::clone(&shared) }, PipeReader { shared, position: 0 })
}

#[derive(Default)]
struct State {
    chunks: VecDeque<Box<[u8]>>,
    /// Absolute offset of `chunks[0]`.
    base: u64,
    /// End of the highest byte written so far.
    written: u64,
    published: u64,
    released: u64,
    closed: bool,
    reader_gone: bool,
}

impl State {
    /// Drops chunks that lie entirely below the released position.
    fn evict(&mut self, chunk_size: u64) {
        while self.base + chunk_size <= self.released && !self.chunks.is_empty() {
            self.chunks.pop_front();
            self.base += chunk_size;
        }
    }

    fn copy_out(&self, position: u64, buf: &mut [u8], chunk_size: u64) {
        let mut offset = position - self.base;
        let mut done = 0;
        while done < buf.len() {
            let (index, within) = ((offset / chunk_size) as usize, (offset % chunk_size) as usize);
            let chunk = &self.chunks[index];
            let n = (chunk.len() - within).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&chunk[within..within + n]);
            done += n;
            offset += n as u64;
        }
    }
}

struct Shared {
    state: Mutex<State>,
    changed: Condvar,
    chunk_size: usize,
    max_chunks: usize,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| Error::PipeClosed)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State>) -> Result<MutexGuard<'a, State>> {
        self.changed.wait(guard).map_err(|_| Error::PipeClosed)
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Producer side.
///
/// `io::Write` hängt am Ende an und veröffentlicht sofort.
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Writes `data` at `position`, which must not lie below the published mark.
    ///
    /// Blockiert, solange für den Bereich keine Chunks frei sind. Ein
    /// unveröffentlichter Bereich darf daher nicht größer als der Puffer sein.
    pub fn write_at(&self, position: u64, data: &[u8]) -> Result<()> {
        let chunk_size = self.shared.chunk_size as u64;
        let mut state = self.shared.lock()?;
        if state.closed {
            return Err(Error::PipeClosed);
        }
        if position < state.published {
            return Err(Error::PipeOutOfRange { position, published: state.published });
        }
        let end = position + data.len() as u64;
        let mut offset = position;
        while offset < end {
            while ((offset - state.base) / chunk_size) as usize >= state.chunks.len() {
                if state.reader_gone {
                    return Err(Error::PipeClosed);
                }
                if state.chunks.len() < self.shared.max_chunks {
                    state.chunks.push_back(vec![0; self.shared.chunk_size].into_boxed_slice());
                } else {
                    log::trace!("pipe full at {} chunks, writer waits", state.chunks.len());
                    state = self.shared.wait(state)?;
                }
            }
            // Eviction may have moved the base while waiting.
            let relative = offset - state.base;
            let (index, within) = ((relative / chunk_size) as usize, (relative % chunk_size) as usize);
            let n = (self.shared.chunk_size - within).min((end - offset) as usize);
            let from = (offset - position) as usize;
            state.chunks[index][within..within + n].copy_from_slice(&data[from..from + n]);
            offset += n as u64;
        }
        state.written = state.written.max(end);
        Ok(())
    }

    /// Makes everything below `upto` visible to the reader.
    ///
    /// Der Wasserstand wächst monoton; kleinere Werte werden ignoriert.
    pub fn publish(&self, upto: u64) -> Result<()> {
        let mut state = self.shared.lock()?;
        if upto > state.written {
            return Err(Error::PipeOutOfRange { position: upto, published: state.written });
        }
        if upto > state.published {
            state.published = upto;
            self.shared.changed.notify_all();
        }
        Ok(())
    }

    /// Reader-visible length.
    pub fn published(&self) -> u64 {
        self.shared.lock().map(|s| s.published).unwrap_or_default()
    }

    /// Ends the stream; reads past the final mark report end of data.
    pub fn close(&self) {
        if let Ok(mut state) = self.shared.lock() {
            state.closed = true;
        }
        self.shared.changed.notify_all();
    }
}

impl io::Write for PipeWriter {
    /// Writes at most up to the next chunk boundary.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let end = self.shared.lock().map_err(io::Error::other)?.written;
        let room = self.shared.chunk_size - (end % self.shared.chunk_size as u64) as usize;
        let n = buf.len().min(room);
        self.write_at(end, &buf[..n]).map_err(io::Error::other)?;
        self.publish(end + n as u64).map_err(io::Error::other)?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Consumer side.
pub struct PipeReader {
    shared: Arc<Shared>,
    /// Cursor of the `io::Read` implementation.
    position: u64,
}

impl PipeReader {
    /// Copies published bytes at `position` without blocking.
    pub fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<()> {
        let state = self.shared.lock()?;
        let end = position + buf.len() as u64;
        if position < state.base || end > state.published {
            return Err(Error::PipeOutOfRange { position: end, published: state.published });
        }
        state.copy_out(position, buf, self.shared.chunk_size as u64);
        Ok(())
    }

    /// Declares everything below `position` consumed.
    pub fn release_to(&self, position: u64) -> Result<()> {
        let mut state = self.shared.lock()?;
        let position = position.min(state.published);
        if position > state.released {
            state.released = position;
            state.evict(self.shared.chunk_size as u64);
            self.shared.changed.notify_all();
        }
        Ok(())
    }

    /// Reader-visible length.
    pub fn published(&self) -> u64 {
        self.shared.lock().map(|s| s.published).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().map(|s| s.closed).unwrap_or(true)
    }
}

impl io::Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.lock().map_err(io::Error::other)?;
        while state.published <= self.position && !state.closed {
            state = self.shared.wait(state).map_err(io::Error::other)?;
        }
        let available = state.published.saturating_sub(self.position);
        if available == 0 {
            return Ok(0);
        }
        if self.position < state.base {
            let error = Error::PipeOutOfRange { position: self.position, published: state.published };
            return Err(io::Error::other(error));
        }
        let n = buf.len().min(available as usize);
        state.copy_out(self.position, &mut buf[..n], self.shared.chunk_size as u64);
        self.position += n as u64;
        state.released = state.released.max(self.position);
        state.evict(self.shared.chunk_size as u64);
        self.shared.changed.notify_all();
        Ok(n)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.lock() {
            state.reader_gone = true;
        }
        self.shared.changed.notify_all();
    }
}
