//! Logwarden: Incremental Log Alerting
//!
//! Polls an Elasticsearch-compatible search backend on a fixed interval,
//! keeps a rolling window of recent log records in memory, evaluates
//! pattern rules over them and notifies chat bots and webhooks when the set
//! of matching event groups changes.
//!
//! # Features
//!
//! - **Complete Retrieval**: Time ranges denser than one page are split
//!   recursively so no record is lost to paging limits
//! - **Incremental Fetching**: Each cycle only asks for records newer than
//!   the last one retained
//! - **Grouped Change Detection**: Alerts only when a group is new or has a
//!   newer event than in the previous cycle
//! - **Heartbeats and Recovery**: A quiet period is confirmed once a day and
//!   cleared errors are announced once
//! - **Notifiers**: Lark, DingTalk (signed) and generic JSON webhooks
//!
//! # Example
//!
//! ```no_run
//! use logwarden::config::AppConfig;
//! use logwarden::monitor::Reporter;
//! use logwarden::rules::PatternEngine;
//! use logwarden::search::ElasticClient;
//! use logwarden::alerts::Notifier;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(AppConfig::load("payments.toml")?);
//! let client = ElasticClient::new(
//!     config.es.address.clone(),
//!     config.es.username.clone(),
//!     config.es.password.clone(),
//!     std::time::Duration::from_secs(config.es.timeout_secs),
//! )?;
//! let engine = PatternEngine::new(config.time_key.clone());
//! let notifier = Notifier::new(config.targets())?;
//!
//! let mut reporter = Reporter::new(config, client, engine, notifier);
//! let outcome = reporter.run_cycle(chrono::Utc::now().timestamp_millis()).await?;
//! println!("Cycle: {:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod config;
pub mod data;
pub mod monitor;
pub mod rules;
pub mod search;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError};
pub use data::{Record, RollingBuffer, TimeWindow};
pub use monitor::{CycleError, CycleOutcome, Reporter};
pub use search::{RangeFetcher, SearchBackend, SearchError};
