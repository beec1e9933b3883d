//! Cycle control
//!
//! One [`Reporter`] per configured rule-set, each polling on its own
//! interval until shutdown.

pub mod cycle;
pub mod runner;

pub use cycle::{CycleError, CycleOutcome, CycleState, Reporter};
pub use runner::{run_reporters, shutdown_signal};
