//! Workflow orchestration.
//!
//! The [`ScanOrchestrator`] owns the hash → lookup → upload → poll state
//! machine, its timing and its cancellation.

mod orchestrator;

pub use orchestrator::{OrchestratorConfig, ScanOrchestrator, ScanOrchestratorBuilder};
