//! Rolling retention of already-fetched records
//!
//! Keeps the records still inside the configured duration so each cycle
//! only asks the backend for what arrived since the newest retained record.

use super::record::{Record, TimeParseError};

/// Records retained across cycles, ascending by `time_key`.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    time_key: String,
    records: Vec<Record>,
}

impl RollingBuffer {
    pub fn new(time_key: impl Into<String>) -> Self {
        Self {
            time_key: time_key.into(),
            records: Vec::new(),
        }
    }

    pub fn time_key(&self) -> &str {
        &self.time_key
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Start of the next incremental fetch.
    ///
    /// Returns 0 when nothing is retained (or the newest record has no
    /// readable timestamp), otherwise one millisecond past the newest
    /// retained record so the boundary record is not fetched twice.
    pub fn next_fetch_start(&self) -> i64 {
        self.records
            .last()
            .and_then(|last| last.time_millis(&self.time_key).ok())
            .map(|t| t + 1)
            .unwrap_or(0)
    }

    /// Drop leading records older than `min_time`.
    ///
    /// Returns the number of records dropped. On error the buffer is left
    /// untouched.
    pub fn trim(&mut self, min_time: i64) -> Result<usize, BufferError> {
        if self.records.is_empty() {
            return Err(BufferError::Empty);
        }

        let mut keep_from = self.records.len();
        for (idx, record) in self.records.iter().enumerate() {
            if record.time_millis(&self.time_key)? >= min_time {
                keep_from = idx;
                break;
            }
        }

        self.records.drain(..keep_from);
        Ok(keep_from)
    }

    /// Retire records older than `window_begin` and append `fetched`.
    ///
    /// An empty buffer adopts the fetched records. A buffer holding a
    /// record with an unreadable timestamp is discarded and replaced by
    /// the fetched records.
    pub fn advance(&mut self, window_begin: i64, fetched: Vec<Record>) {
        match self.trim(window_begin) {
            Ok(dropped) => {
                if dropped > 0 {
                    tracing::debug!(dropped, retained = self.records.len(), "Trimmed rolling buffer");
                }
                self.records.extend(fetched);
            }
            Err(BufferError::Empty) => {
                self.records = fetched;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding retained records");
                self.records = fetched;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("no retained records")]
    Empty,

    #[error(transparent)]
    TimeParse(#[from] TimeParseError),
}
