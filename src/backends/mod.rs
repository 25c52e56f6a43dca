//! Scan service implementations.
//!
//! This module contains implementations of the `ScanService` trait.
//!
//! ## Available Backends
//!
//! - [`mock`] - A scripted service for testing
//! - [`metadefender`] - MetaDefender Cloud v4 REST API
//!
//! ## Implementing a Custom Backend
//!
//! Any service that can look up verdicts by SHA-256, accept uploads and
//! report scan progress can drive the orchestrator:
//!
//! ```rust,ignore
//! use cachescan::core::{FileFingerprint, LookupOutcome, ScanError, ScanProgress, ScanService, UploadHandle};
//! use async_trait::async_trait;
//! use std::path::Path;
//!
//! #[derive(Debug)]
//! pub struct MyService;
//!
//! #[async_trait]
//! impl ScanService for MyService {
//!     fn name(&self) -> &str {
//!         "my-service"
//!     }
//!
//!     async fn lookup_by_hash(&self, fingerprint: &FileFingerprint) -> Result<LookupOutcome, ScanError> {
//!         todo!()
//!     }
//!
//!     async fn upload(&self, path: &Path) -> Result<UploadHandle, ScanError> {
//!         todo!()
//!     }
//!
//!     async fn fetch_status(&self, handle: &UploadHandle) -> Result<ScanProgress, ScanError> {
//!         todo!()
//!     }
//! }
//! ```

pub mod metadefender;
pub mod mock;

pub use metadefender::{MetaDefenderClient, MetaDefenderConfig};
pub use mock::{MockReply, MockScanService};
