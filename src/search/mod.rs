//! Retrieval from the log store
//!
//! [`SearchBackend`] is the page-bounded query capability; [`RangeFetcher`]
//! turns it into complete, ordered retrieval of a time window.

pub mod client;
pub mod fetcher;
#[cfg(test)]
pub mod memory;

pub use client::{
    ElasticClient, RetrievalConfig, SearchBackend, SearchError, SearchPage, SearchRequest, Term,
};
pub use fetcher::{RangeFetcher, SPLIT_CALLS_PER_PAGE};
#[cfg(test)]
pub use memory::MemoryBackend;
