//! File-backed replay source.
//!
//! A stream is a pair of files under the tape directory:
//! `<stream>.schema.json` (the stream's type set) and `<stream>.tape`
//! (length-prefixed record frames). Frame layout, all little-endian:
//!
//! ```text
//! u32 frame_len | i64 timestamp | u16 type_tag | u32 key_len | key | body
//! ```
//!
//! Tapes are bounded: a cursor replays existing frames and reports
//! exhaustion at the end.

use std::fs;
use std::path::{Path, PathBuf};

use siphon_api::error::ReplicaError;
use siphon_api::schema::StreamSchema;
use siphon_api::source::{AvailabilityCallback, RawRecord, SourceClient, SourceCursor};

pub struct TapeSource {
    dir: PathBuf,
}

impl TapeSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn schema_path(&self, stream: &str) -> PathBuf {
        self.dir.join(format!("{stream}.schema.json"))
    }

    fn tape_path(&self, stream: &str) -> PathBuf {
        self.dir.join(format!("{stream}.tape"))
    }
}

impl SourceClient for TapeSource {
    fn describe(&self, stream: &str) -> Result<StreamSchema, ReplicaError> {
        let path = self.schema_path(stream);
        let content = fs::read_to_string(&path)
            .map_err(|e| ReplicaError::config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| ReplicaError::schema(format!("{}: {e}", path.display())))
    }

    fn open_cursor(
        &self,
        stream: &str,
        from_exclusive: Option<i64>,
        live: bool,
        _on_available: AvailabilityCallback,
    ) -> Result<Box<dyn SourceCursor>, ReplicaError> {
        if live {
            tracing::warn!(stream = %stream, "tape sources are bounded; live tailing becomes a replay");
        }
        let path = self.tape_path(stream);
        let data =
            fs::read(&path).map_err(|e| ReplicaError::config(format!("{}: {e}", path.display())))?;
        Ok(Box::new(TapeCursor { data, pos: 0, from_exclusive }))
    }
}

struct TapeCursor {
    data: Vec<u8>,
    pos: usize,
    from_exclusive: Option<i64>,
}

impl TapeCursor {
    fn take(&mut self, n: usize) -> Result<&[u8], ReplicaError> {
        if self.data.len() - self.pos < n {
            return Err(ReplicaError::decode(format!(
                "truncated tape: need {n} bytes at offset {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn next_frame(&mut self) -> Result<Option<RawRecord>, ReplicaError> {
        if self.pos == self.data.len() {
            return Ok(None);
        }
        let frame_len = u32::from_le_bytes(self.take(4)?.try_into().unwrap()) as usize;
        let frame_end = self.pos + frame_len;
        let timestamp = i64::from_le_bytes(self.take(8)?.try_into().unwrap());
        let type_tag = u16::from_le_bytes(self.take(2)?.try_into().unwrap());
        let key_len = u32::from_le_bytes(self.take(4)?.try_into().unwrap()) as usize;
        let instrument = std::str::from_utf8(self.take(key_len)?)?.to_owned();
        if frame_end < self.pos || frame_end > self.data.len() {
            return Err(ReplicaError::decode(format!(
                "corrupt tape frame at offset {}",
                self.pos
            )));
        }
        let body = self.data[self.pos..frame_end].to_vec();
        self.pos = frame_end;
        Ok(Some(RawRecord { timestamp, instrument, type_tag, body }))
    }
}

impl SourceCursor for TapeCursor {
    fn poll_next(&mut self) -> Result<Option<RawRecord>, ReplicaError> {
        while let Some(record) = self.next_frame()? {
            if let Some(from) = self.from_exclusive {
                if record.timestamp <= from {
                    continue;
                }
            }
            return Ok(Some(record));
        }
        Ok(None)
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }
}

/// Assembles a tape file; the counterpart of [`TapeCursor`].
#[derive(Default)]
pub struct TapeWriter {
    buf: Vec<u8>,
}

impl TapeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: &RawRecord) -> Result<(), ReplicaError> {
        let key = record.instrument.as_bytes();
        let frame_len = 8 + 2 + 4 + key.len() + record.body.len();
        if frame_len > u32::MAX as usize {
            return Err(ReplicaError::decode(format!("record of {frame_len} bytes exceeds the frame limit")));
        }
        self.buf.extend_from_slice(&(frame_len as u32).to_le_bytes());
        self.buf.extend_from_slice(&record.timestamp.to_le_bytes());
        self.buf.extend_from_slice(&record.type_tag.to_le_bytes());
        self.buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(key);
        self.buf.extend_from_slice(&record.body);
        Ok(())
    }

    pub fn write_to(self, path: &Path) -> Result<(), ReplicaError> {
        fs::write(path, self.buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use siphon_api::schema::{Encoding, SourceField, SourceType};
    use siphon_api::wire::WireWriter;

    fn record(timestamp: i64, size: i64) -> RawRecord {
        let mut w = WireWriter::new();
        w.write_i64(Some(size)).unwrap();
        RawRecord { timestamp, instrument: "BTCUSD".into(), type_tag: 0, body: w.into_bytes() }
    }

    fn write_stream(dir: &Path, stream: &str, records: &[RawRecord]) {
        let schema = StreamSchema {
            top_types: vec!["Trade".into()],
            types: vec![SourceType {
                name: "Trade".into(),
                parent: None,
                is_abstract: false,
                fields: vec![SourceField::scalar("size", Encoding::Int64, false)],
            }],
        };
        fs::write(
            dir.join(format!("{stream}.schema.json")),
            serde_json::to_string(&schema).unwrap(),
        )
        .unwrap();
        let mut tape = TapeWriter::new();
        for r in records {
            tape.append(r).unwrap();
        }
        tape.write_to(&dir.join(format!("{stream}.tape"))).unwrap();
    }

    #[test]
    fn replays_frames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_stream(dir.path(), "trades", &[record(10, 1), record(20, 2)]);

        let source = TapeSource::new(dir.path());
        assert_eq!(source.describe("trades").unwrap().types.len(), 1);

        let mut cursor =
            source.open_cursor("trades", None, false, Arc::new(|| {})).unwrap();
        assert_eq!(cursor.poll_next().unwrap().unwrap().timestamp, 10);
        assert_eq!(cursor.poll_next().unwrap().unwrap().timestamp, 20);
        assert!(cursor.poll_next().unwrap().is_none());
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn resume_point_skips_earlier_frames() {
        let dir = tempfile::tempdir().unwrap();
        write_stream(dir.path(), "trades", &[record(10, 1), record(20, 2), record(30, 3)]);

        let source = TapeSource::new(dir.path());
        let mut cursor =
            source.open_cursor("trades", Some(20), false, Arc::new(|| {})).unwrap();
        assert_eq!(cursor.poll_next().unwrap().unwrap().timestamp, 30);
        assert!(cursor.poll_next().unwrap().is_none());
    }

    #[test]
    fn missing_stream_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = TapeSource::new(dir.path());
        assert!(source.describe("absent").is_err());
    }
}
