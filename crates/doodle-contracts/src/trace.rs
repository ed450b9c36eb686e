use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type TracePayload = Map<String, Value>;

/// Append-only writer for the pipeline trace (`events.jsonl`).
///
/// One compact JSON object per line. Each record carries `event`,
/// `session_id`, a monotonically increasing `seq`, and an RFC 3339 `ts`;
/// the caller payload is merged in afterwards and cannot shadow those
/// keys. Clones share the same sequence and file lock.
#[derive(Debug, Clone)]
pub struct TraceWriter {
    inner: Arc<TraceWriterInner>,
}

#[derive(Debug)]
struct TraceWriterInner {
    path: PathBuf,
    session_id: String,
    seq: AtomicU64,
    lock: Mutex<()>,
}

impl TraceWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TraceWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                seq: AtomicU64::new(0),
                lock: Mutex::new(()),
            }),
        }
    }

    /// A writer for a freshly minted pipeline session.
    pub fn for_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, uuid::Uuid::new_v4().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn record(&self, event: &str, payload: TracePayload) -> anyhow::Result<Value> {
        let mut row = Map::new();
        row.insert("event".to_string(), Value::String(event.to_string()));
        row.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        row.insert(
            "seq".to_string(),
            Value::Number(self.inner.seq.fetch_add(1, Ordering::SeqCst).into()),
        );
        row.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            if !row.contains_key(&key) {
                row.insert(key, value);
            }
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&row)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("trace writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(row))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::{Map, Value};

    use super::{TracePayload, TraceWriter};

    #[test]
    fn record_writes_one_compact_line_per_event() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let trace = TraceWriter::new(&path, "sess-1");

        let mut payload = TracePayload::new();
        payload.insert(
            "command".to_string(),
            Value::String("draw a red circle".to_string()),
        );
        let recorded = trace.record("command_received", payload)?;

        let content = fs::read_to_string(&path)?;
        let parsed: Value = serde_json::from_str(content.lines().next().unwrap_or(""))?;
        assert_eq!(parsed, recorded);
        assert_eq!(parsed["event"], "command_received");
        assert_eq!(parsed["session_id"], "sess-1");
        assert_eq!(parsed["command"], "draw a red circle");
        DateTime::parse_from_rfc3339(parsed["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn seq_increases_and_payload_cannot_shadow_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let trace = TraceWriter::new(temp.path().join("events.jsonl"), "sess-2");

        let first = trace.record("one", Map::new())?;
        let mut payload = TracePayload::new();
        payload.insert("event".to_string(), Value::String("smuggled".to_string()));
        payload.insert("seq".to_string(), Value::Number(99.into()));
        let second = trace.record("two", payload)?;

        assert_eq!(first["seq"], 0);
        assert_eq!(second["seq"], 1);
        assert_eq!(second["event"], "two");
        Ok(())
    }

    #[test]
    fn clones_share_the_sequence() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let trace = TraceWriter::for_new_session(temp.path().join("events.jsonl"));
        let other = trace.clone();

        trace.record("a", Map::new())?;
        let row = other.record("b", Map::new())?;
        assert_eq!(row["seq"], 1);
        assert_eq!(row["session_id"].as_str(), Some(trace.session_id()));
        Ok(())
    }
}
