//! Alert decisions and delivery
//!
//! Groups events, detects when a group changed since the previous cycle,
//! and delivers notifications to the configured targets.

pub mod config;
pub mod detector;
pub mod notifier;

pub use config::{Notification, NotifyTarget};
pub use detector::{
    group_events, group_key, has_changed, render_report, ChangeDetector, GroupKey, GroupSnapshot,
    Grouping,
};
pub use notifier::{Dispatcher, Notifier, NotifierError};
