//! Complete retrieval of a time window from a page-bounded backend
//!
//! When a window matches more records than one page holds, it is cut into
//! `ceil(total / page_size)` disjoint sub-windows which are fetched in
//! order, splitting again wherever a sub-window is still too dense.

use super::client::{RetrievalConfig, SearchBackend, SearchError, SearchRequest};
use crate::data::{Record, TimeWindow};

/// Searches allowed per page the top-level window needs. A window whose
/// split would exceed the budget is fetched with an enlarged page instead.
pub const SPLIT_CALLS_PER_PAGE: usize = 16;

/// Fetches every record of a window, in ascending time order
pub struct RangeFetcher<'a, B: ?Sized> {
    backend: &'a B,
    config: &'a RetrievalConfig,
}

impl<'a, B: SearchBackend + ?Sized> RangeFetcher<'a, B> {
    pub fn new(backend: &'a B, config: &'a RetrievalConfig) -> Self {
        Self { backend, config }
    }

    /// Fetch all records in `window`.
    ///
    /// Sub-windows are visited depth-first from an explicit stack so the
    /// output keeps the backend's ascending order. Every search issued or
    /// queued counts against a budget fixed by the first response, so a
    /// backend whose totals never shrink costs at most twice the budget.
    pub async fn fetch(&self, window: TimeWindow) -> Result<Vec<Record>, SearchError> {
        let page_size = self.config.page_size.max(1);
        let mut result = Vec::new();
        let mut stack = vec![window];
        let mut calls = 0usize;
        let mut budget = None;

        while let Some(window) = stack.pop() {
            let page = self
                .backend
                .search(&SearchRequest::new(self.config, window, page_size))
                .await?;
            calls += 1;

            tracing::debug!(
                begin = window.begin,
                end = window.end,
                size = page_size,
                total = page.total,
                "Fetched page"
            );

            if page.total <= page_size {
                result.extend(page.records);
                continue;
            }

            let parts = split_count(page.total, page_size);
            let limit = *budget.get_or_insert(parts.saturating_mul(SPLIT_CALLS_PER_PAGE));

            if window.is_single_point() {
                result.extend(self.fetch_enlarged(window, page.total).await?);
                calls += 1;
                continue;
            }

            let step = (window.len_ms() / parts as i64).max(1);
            let subs = window.split(step);
            if calls + stack.len() + subs.len() > limit {
                tracing::warn!(
                    begin = window.begin,
                    end = window.end,
                    total = page.total,
                    calls,
                    budget = limit,
                    "Split budget exhausted, fetching window in one page"
                );
                result.extend(self.fetch_enlarged(window, page.total).await?);
                calls += 1;
                continue;
            }

            stack.extend(subs.into_iter().rev());
        }

        Ok(result)
    }

/// Re-query a window that cannot be split with a page large enough for
    /// all of its matches, up to `max_page_size`.
    async fn fetch_enlarged(
        &self,
        window: TimeWindow,
        total: usize,
    ) -> Result<Vec<Record>, SearchError> {
        let size = total.min(self.config.max_page_size.max(self.config.page_size));
        if size < total {
            tracing::warn!(
                begin = window.begin,
                end = window.end,
                total,
                size,
                dropped = total - size,
                "Window exceeds maximum page size, records left behind"
            );
        }

        let page = self
            .backend
            .search(&SearchRequest::new(self.config, window, size))
            .await?;
        Ok(page.records)
    }
}

/// `ceil(total / page_size)`
fn split_count(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size).max(1)
}
