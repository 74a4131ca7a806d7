//! Batch orchestration.
//!
//! The orchestrator validates a batch of request specs, runs the valid ones
//! through the phase handlers on a bounded worker pool and aggregates every
//! row's terminal outcome into a [`BatchReport`].

mod config;
mod runner;
mod types;

pub use config::{OrchestratorConfig, TierWaitBudgets};
pub use runner::RestoreOrchestrator;
pub use types::{BatchReport, RecordReport};
