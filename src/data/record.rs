use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A log document returned by the search backend.
///
/// Documents are immutable once fetched and shared between the rolling
/// buffer and the events drawn from them, so cloning is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    doc: Arc<serde_json::Value>,
}

impl Record {
    pub fn new(doc: serde_json::Value) -> Self {
        Self { doc: Arc::new(doc) }
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.doc
    }

    /// Look up a value by path.
    ///
    /// The path is first tried as a literal top-level key, since log
    /// documents commonly carry dotted keys such as `kubernetes.pod.name`.
    /// Otherwise it is split on `.` and walked through nested objects and
    /// array indices.
    pub fn lookup(&self, path: &str) -> Option<&serde_json::Value> {
        if let Some(value) = self.doc.get(path) {
            return Some(value);
        }

        let mut current = self.doc.as_ref();
        for segment in path.split('.') {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// String rendering of the value at `path`.
    ///
    /// Strings are returned as-is, scalars and containers as their JSON
    /// text. `null` and missing paths are absent.
    pub fn get_string(&self, path: &str) -> Option<String> {
        match self.lookup(path)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Timestamp at `path` in epoch milliseconds.
    pub fn time_millis(&self, path: &str) -> Result<i64, TimeParseError> {
        let value = self.lookup(path).ok_or_else(|| TimeParseError {
            path: path.to_string(),
            value: "<missing>".to_string(),
        })?;
        parse_time_value(value).ok_or_else(|| TimeParseError {
            path: path.to_string(),
            value: value.to_string(),
        })
    }
}

impl From<serde_json::Value> for Record {
    fn from(doc: serde_json::Value) -> Self {
        Self::new(doc)
    }
}

/// Parse an RFC 3339 string or an integer of epoch milliseconds.
pub fn parse_time_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.timestamp_millis()),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse {value} at '{path}' as a timestamp")]
pub struct TimeParseError {
    pub path: String,
    pub value: String,
}

/// Closed time interval in epoch milliseconds; both bounds are inclusive
/// when sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub begin: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(begin: i64, end: i64) -> Self {
        debug_assert!(begin <= end, "window begin {} after end {}", begin, end);
        Self { begin, end }
    }

    /// The window of `duration_ms` ending at `now_ms`.
    pub fn ending_at(now_ms: i64, duration_ms: i64) -> Self {
        Self::new(now_ms - duration_ms, now_ms)
    }

    /// Number of milliseconds covered, bounds included.
    pub fn len_ms(&self) -> i64 {
        self.end - self.begin + 1
    }

    pub fn is_single_point(&self) -> bool {
        self.begin == self.end
    }

    pub fn contains(&self, t: i64) -> bool {
        self.begin <= t && t <= self.end
    }

    /// Cut the window into consecutive, disjoint chunks of `step` ms.
    /// When `step` does not divide the window, a final shorter chunk holds
    /// the remainder.
    pub fn split(&self, step: i64) -> Vec<TimeWindow> {
        let step = step.max(1);
        let mut parts = Vec::new();
        let mut a = self.begin;
        while a <= self.end {
            let b = a.saturating_add(step - 1).min(self.end);
            parts.push(TimeWindow::new(a, b));
            if b == self.end {
                break;
            }
            a = b + 1;
        }
        parts
    }
}
