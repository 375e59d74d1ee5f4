//! Record-Quelle des Decoders: Haupt-Stream plus Push-back und Replay.
//!
//! Debug-Records werden hier geschluckt. Damit die Zeileninformation eines
//! Records schon beim Ausliefern bekannt ist, liest die Quelle einen Record
//! im Voraus (die nachfolgenden Debug-Records gehören zum aktuellen).

use std::collections::VecDeque;
use std::io::Read;

use crate::Result;
use crate::bytestream::ByteReader;
use crate::error::LineInfo;
use crate::record::Record;

/// A record with its stream placement.
#[derive(Debug, Clone)]
pub(super) struct Fetched {
    pub(super) record: Record,
    /// Absolute offset of the tag byte.
    pub(super) start: u64,
    /// Offset behind the record.
    pub(super) end: u64,
    /// Came from a front-loaded resource run, not from the main stream.
    pub(super) replayed: bool,
}

pub(super) struct RecordSource<R> {
    reader: ByteReader<R>,
    lookahead: Option<Fetched>,
    pushed_back: Option<Fetched>,
    replay: VecDeque<Record>,
    line: LineInfo,
}

impl<R: Read> RecordSource<R> {
    pub(super) fn new(reader: ByteReader<R>) -> Self {
        Self { reader, lookahead: None, pushed_back: None, replay: VecDeque::new(), line: LineInfo::default() }
    }

    pub(super) fn reader_mut(&mut self) -> &mut ByteReader<R> {
        &mut self.reader
    }

    pub(super) fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Line info of the record delivered last (or an earlier one).
    pub(super) fn line(&self) -> LineInfo {
        self.line
    }

    /// Next non-debug record: push-back first, then replay, then the stream.
    pub(super) fn next(&mut self) -> Result<Option<Fetched>> {
        if let Some(f) = self.pushed_back.take() {
            return Ok(Some(f));
        }
        if let Some(record) = self.replay.pop_front() {
            let at = self.lookahead.as_ref().map_or(self.reader.position(), |f| f.start);
            return Ok(Some(Fetched { record, start: at, end: at, replayed: true }));
        }
        let fetched = match self.lookahead.take() {
            Some(f) => Some(f),
            None => self.read_record()?,
        };
        if fetched.is_some() {
            self.lookahead = self.read_record()?;
        }
        Ok(fetched)
    }

    fn read_record(&mut self) -> Result<Option<Fetched>> {
        loop {
            let Some((record, start)) = Record::read(&mut self.reader)? else {
                return Ok(None);
            };
            match record {
                Record::LineNumberAndPosition { line, position } => {
                    self.line = LineInfo::new(line, position);
                }
                Record::LinePosition { position } => self.line.position = position,
                record => {
                    log::trace!("record {:?} at {start}", record.record_type());
                    return Ok(Some(Fetched { record, start, end: self.reader.position(), replayed: false }));
                }
            }
        }
    }

    /// Gibt einen gelesenen Record zurück; er wird als nächster geliefert.
    pub(super) fn push_back(&mut self, fetched: Fetched) {
        debug_assert!(self.pushed_back.is_none());
        self.pushed_back = Some(fetched);
    }

    /// Queues a captured run; its records are served before the main stream.
    pub(super) fn start_replay(&mut self, run: &[Record]) {
        for record in run.iter().rev() {
            self.replay.push_front(record.clone());
        }
    }
}
