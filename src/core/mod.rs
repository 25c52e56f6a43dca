//! Core types and traits for the cachescan library.
//!
//! - [`types`] - Fingerprints, upload handles, progress values, verdicts
//! - [`traits`] - The `ScanService` trait
//! - [`error`] - Structured error types
//! - [`hasher`] - Streaming SHA-256 fingerprinting
//! - [`result`] - The report produced by one workflow run

pub mod error;
pub mod hasher;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{ScanError, ScanResult};
pub use hasher::FileHasher;
pub use result::ScanReport;
pub use traits::{ArcScanService, BoxedScanService, LookupOutcome, ScanService};
pub use types::{
    EngineResult, FileFingerprint, ScanProgress, ScanVerdict, UploadHandle, WorkflowState,
};
