//! Rule evaluation: turns records into events

pub mod config;
pub mod engine;
pub mod event;

pub use config::Rule;
pub use engine::{validate_rules, EngineError, PatternEngine, RuleEngine};
pub use event::Event;
