//! The `ScanService` trait implemented by remote scanning backends.

use crate::core::error::ScanError;
use crate::core::types::{FileFingerprint, ScanProgress, ScanVerdict, UploadHandle};

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;

/// Result of a hash lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The service already has a verdict for this content.
    Found(ScanVerdict),
    /// The service has never seen this content; it must be uploaded.
    NotFound,
}

impl LookupOutcome {
    /// Returns `true` for a cache hit.
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Returns the verdict of a cache hit.
    pub fn into_verdict(self) -> Option<ScanVerdict> {
        match self {
            Self::Found(verdict) => Some(verdict),
            Self::NotFound => None,
        }
    }
}

/// A remote multi-engine scanning service with a content-hash cache.
///
/// # Implementation Notes
///
/// - Each method performs exactly one outbound request. Repetition and
///   waiting belong to the caller.
/// - Implementations hold no per-workflow state and must be safe to share
///   between independent workflows.
/// - Credentials must never appear in logs or error messages.
/// - Implementations should never panic; all errors are returned as `ScanError`.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use cachescan::core::{FileFingerprint, LookupOutcome, ScanError, ScanProgress, ScanService, UploadHandle};
/// use async_trait::async_trait;
/// use std::path::Path;
///
/// #[derive(Debug)]
/// struct MyService;
///
/// #[async_trait]
/// impl ScanService for MyService {
///     fn name(&self) -> &str {
///         "my-service"
///     }
///
///     async fn lookup_by_hash(&self, fingerprint: &FileFingerprint) -> Result<LookupOutcome, ScanError> {
///         Ok(LookupOutcome::NotFound)
///     }
///
///     async fn upload(&self, path: &Path) -> Result<UploadHandle, ScanError> {
///         todo!()
///     }
///
///     async fn fetch_status(&self, handle: &UploadHandle) -> Result<ScanProgress, ScanError> {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait ScanService: Send + Sync + Debug {
    /// Returns a stable, human-readable name for the service.
    fn name(&self) -> &str;

    /// Asks the service for a cached verdict.
    ///
    /// # Errors
    ///
    /// - `RemoteService` - Any non-success response other than "not found".
    /// - `MalformedResponse` - A success response without a usable verdict.
    async fn lookup_by_hash(&self, fingerprint: &FileFingerprint)
        -> Result<LookupOutcome, ScanError>;

    /// Submits the file at `path` for scanning.
    ///
    /// # Errors
    ///
    /// - `FileNotFound` / `Io` - The file cannot be opened.
    /// - `RemoteService` - The service rejected the upload.
    /// - `MalformedResponse` - The response lacks an upload handle.
    async fn upload(&self, path: &Path) -> Result<UploadHandle, ScanError>;

    /// Asks the service how far the scan behind `handle` has progressed.
    ///
    /// # Errors
    ///
    /// - `RemoteService` - Non-success response or transport failure.
    /// - `MalformedResponse` - The response lacks a valid progress value.
    async fn fetch_status(&self, handle: &UploadHandle) -> Result<ScanProgress, ScanError>;
}

/// A boxed scan service for type-erased storage.
pub type BoxedScanService = Box<dyn ScanService>;

/// An arc-wrapped scan service for shared ownership.
pub type ArcScanService = std::sync::Arc<dyn ScanService>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_outcome_accessors() {
        let hit = LookupOutcome::Found(ScanVerdict::new("a.txt", "No Threat Detected"));
        assert!(hit.is_found());
        assert_eq!(hit.into_verdict().unwrap().filename, "a.txt");

        assert!(!LookupOutcome::NotFound.is_found());
        assert!(LookupOutcome::NotFound.into_verdict().is_none());
    }
}
