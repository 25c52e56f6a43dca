//! # Cachescan
//!
//! A cache-first client for multi-engine malware scanning services.
//!
//! ## Overview
//!
//! Uploading a file for scanning is slow and spends quota; most files have
//! been seen by the service before. Cachescan therefore:
//!
//! - Fingerprints the file with a streamed SHA-256 digest
//! - Asks the service for a cached verdict under that fingerprint
//! - Uploads the file only when the service has never seen it
//! - Polls the scan until it completes, then fetches the fresh verdict
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cachescan::prelude::*;
//! use cachescan::backends::{MetaDefenderClient, MetaDefenderConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MetaDefenderClient::new(MetaDefenderConfig::from_env()?)?;
//!
//!     let orchestrator = ScanOrchestrator::builder()
//!         .service(client)
//!         .build()?;
//!
//!     let report = orchestrator
//!         .run("suspicious.exe".as_ref(), &CancellationToken::new())
//!         .await?;
//!
//!     print!("{}", TextFormatter.render(&report.verdict));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `default` - Includes the `cli` feature
//! - `cli` - Builds the `cachescan` command-line binary
//!
//! ## Architecture
//!
//! - **Core**: Fingerprints, verdicts, the `ScanService` trait, errors
//! - **Backends**: MetaDefender Cloud client and a scripted mock
//! - **Manager**: The workflow state machine with polling and cancellation
//! - **Report**: Text and JSON rendering of verdicts
//! - **Audit**: Structured logging of workflow milestones

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod core;
pub mod manager;
pub mod report;

// Re-export commonly used types at the crate root
pub use crate::core::{
    EngineResult, FileFingerprint, FileHasher, LookupOutcome, ScanError, ScanProgress,
    ScanReport, ScanService, ScanVerdict, UploadHandle, WorkflowState,
};

pub use crate::manager::{OrchestratorConfig, ScanOrchestrator};
pub use crate::report::{JsonFormatter, OutputFormat, TextFormatter, VerdictFormatter};

/// Prelude module for convenient imports.
///
/// ```rust
/// use cachescan::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        EngineResult, FileFingerprint, FileHasher, LookupOutcome, ScanError, ScanProgress,
        ScanReport, ScanService, ScanVerdict, UploadHandle, WorkflowState,
    };
    pub use crate::manager::{OrchestratorConfig, ScanOrchestrator};
    pub use crate::report::{JsonFormatter, OutputFormat, TextFormatter, VerdictFormatter};
}
