//! Append-only JSON-lines audit log. Buffered, redacts sensitive argument
//! keys, and tolerates write failures by counting them rather than crashing
//! the server — gaps are reported once on shutdown.

use regex::Regex;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use warden_common::{AuditRecord, AuditStatus};

const FLUSH_EVERY_N: usize = 50;
const FLUSH_EVERY: Duration = Duration::from_secs(5);

fn redaction_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)password|token|secret|api[_-]?key|authorization|private[_-]?key")
            .expect("redaction pattern is a valid regex")
    })
}

/// Pure transformation: returns a new `Value` with every object key that
/// matches the sensitive-key pattern replaced by the literal `"***"`.
/// Never mutates its argument. Idempotent: `redact(redact(x)) == redact(x)`.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if redaction_pattern().is_match(k) {
                    out.insert(k.clone(), Value::String("***".to_string()));
                } else {
                    out.insert(k.clone(), redact(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

struct Inner {
    file: Option<File>,
    buffer: Vec<String>,
    last_flush: Instant,
}

/// Scoped audit-log handle. `Open` on construction, `Close` (or `Drop`) on
/// release; both flush the buffer.
pub struct AuditLog {
    inner: Mutex<Inner>,
    gap_count: AtomicU64,
}

impl AuditLog {
    /// Opens `log_path` in append mode, creating parent directories on
    /// demand. A missing `log_path` disables the log entirely (every
    /// operation becomes a no-op, not a startup failure, since the policy
    /// allows an unset path).
    pub fn open(log_path: Option<&Path>) -> std::io::Result<Self> {
        let file = match log_path {
            None => None,
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Some(OpenOptions::new().create(true).append(true).open(path)?)
            }
        };
        Ok(Self {
            inner: Mutex::new(Inner {
                file,
                buffer: Vec::with_capacity(FLUSH_EVERY_N),
                last_flush: Instant::now(),
            }),
            gap_count: AtomicU64::new(0),
        })
    }

    pub fn log_request(&self, request_id: Value, tool: &str, arguments: &Value) {
        let record = AuditRecord::Request {
            ts: chrono::Utc::now(),
            request_id,
            tool: tool.to_string(),
            arguments: redact(arguments),
        };
        self.push(record);
    }

    pub fn log_response(&self, request_id: Value, status: AuditStatus, duration_ms: u64) {
        let record = AuditRecord::Response {
            ts: chrono::Utc::now(),
            request_id,
            status,
            duration_ms,
        };
        self.push(record);
    }

    pub fn log_security_event(&self, event_type: &str, detail: Value) {
        let record = AuditRecord::SecurityEvent {
            ts: chrono::Utc::now(),
            event_type: event_type.to_string(),
            detail: redact(&detail),
        };
        self.push(record);
    }

    fn push(&self, record: AuditRecord) {
        let Ok(line) = serde_json::to_string(&record) else {
            self.gap_count.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.buffer.push(line);
        let should_flush =
            inner.buffer.len() >= FLUSH_EVERY_N || inner.last_flush.elapsed() >= FLUSH_EVERY;
        if should_flush {
            self.flush_locked(&mut inner);
        }
    }

    /// Force a flush regardless of the buffering thresholds.
    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.flush_locked(&mut inner);
    }

    fn flush_locked(&self, inner: &mut Inner) {
        inner.last_flush = Instant::now();
        let Some(file) = inner.file.as_mut() else {
            inner.buffer.clear();
            return;
        };
        for line in inner.buffer.drain(..) {
            if let Err(e) = writeln!(file, "{line}") {
                self.gap_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "audit log write failed, gap recorded");
            }
        }
        if let Err(e) = file.flush() {
            self.gap_count.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "audit log flush failed, gap recorded");
        }
    }

    /// Flush and report any accumulated write gaps. Call once at shutdown.
    pub fn close(&self) {
        self.flush();
        let gaps = self.gap_count.load(Ordering::Relaxed);
        if gaps > 0 {
            tracing::warn!(gaps, "audit log had write failures during this session");
        }
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        self.flush();
    }
}
