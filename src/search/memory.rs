//! In-process search backend over a fixed record set, for tests

use async_trait::async_trait;
use parking_lot::Mutex;

use super::client::{SearchBackend, SearchError, SearchPage, SearchRequest};
use crate::data::{Record, TimeWindow};

/// Serves queries from memory with the same contract as Elasticsearch:
/// ascending by the range field, `total` counts every match, at most
/// `size` records are returned.
///
/// Every request is logged so callers can inspect how a window was split.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<Vec<Record>>,
    calls: Mutex<Vec<(TimeWindow, usize, usize)>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    /// Add records; they are served in range-field order regardless of
    /// insertion order.
    pub fn push(&self, records: impl IntoIterator<Item = Record>) {
        self.records.lock().extend(records);
    }

    /// Make the next search fail with a backend error.
    pub fn fail_next(&self, reason: impl Into<String>) {
        *self.fail_next.lock() = Some(reason.into());
    }

    /// `(window, requested size, returned count)` per search, in call order
    pub fn calls(&self) -> Vec<(TimeWindow, usize, usize)> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage, SearchError> {
        if let Some(reason) = self.fail_next.lock().take() {
            return Err(SearchError::Backend(reason));
        }

        let mut matches: Vec<(i64, Record)> = self
            .records
            .lock()
            .iter()
            .filter_map(|record| {
                let t = record.time_millis(request.range_field).ok()?;
                if !request.window.contains(t) {
                    return None;
                }
                let accepted = request.terms.iter().all(|term| {
                    record
                        .get_string(&term.key)
                        .map(|v| term.values.contains(&v))
                        .unwrap_or(false)
                });
                accepted.then(|| (t, record.clone()))
            })
            .collect();
        matches.sort_by_key(|(t, _)| *t);

        let total = matches.len();
        let records: Vec<Record> = matches
            .into_iter()
            .take(request.size)
            .map(|(_, r)| r)
            .collect();

        self.calls
            .lock()
            .push((request.window, request.size, records.len()));

        Ok(SearchPage { total, records })
    }
}
