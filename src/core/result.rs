//! The report produced by one workflow run.

use crate::core::types::{FileFingerprint, ScanVerdict, UploadHandle};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a completed scan workflow.
///
/// Besides the verdict itself this records how it was obtained: straight
/// from the service's cache, or after an upload and a number of status
/// checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Unique identifier of this run, used to correlate log lines.
    pub run_id: String,

    /// Fingerprint the verdict was looked up by.
    pub fingerprint: FileFingerprint,

    /// The service's verdict.
    pub verdict: ScanVerdict,

    /// Whether the verdict came from the service cache without an upload.
    pub cached: bool,

    /// Handle of the upload, when one was needed.
    pub upload_handle: Option<UploadHandle>,

    /// Number of status checks performed while polling.
    pub status_checks: u32,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// How long the run took.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl ScanReport {
    /// Creates a report for a cache hit.
    pub fn cached(
        run_id: impl Into<String>,
        fingerprint: FileFingerprint,
        verdict: ScanVerdict,
        duration: Duration,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            fingerprint,
            verdict,
            cached: true,
            upload_handle: None,
            status_checks: 0,
            started_at: started_at(duration),
            duration,
        }
    }

    /// Creates a report for a verdict obtained after uploading.
    pub fn uploaded(
        run_id: impl Into<String>,
        fingerprint: FileFingerprint,
        verdict: ScanVerdict,
        handle: UploadHandle,
        status_checks: u32,
        duration: Duration,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            fingerprint,
            verdict,
            cached: false,
            upload_handle: Some(handle),
            status_checks,
            started_at: started_at(duration),
            duration,
        }
    }

    /// Returns `true` if no engine reported a threat.
    pub fn is_clean(&self) -> bool {
        self.verdict.is_clean()
    }
}

fn started_at(duration: Duration) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::from_std(duration).unwrap_or_default()
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FileHasher;

    #[test]
    fn test_cached_report() {
        let fp = FileHasher::new().hash_bytes(b"data");
        let report = ScanReport::cached(
            "run-1",
            fp.clone(),
            ScanVerdict::new("data.bin", "No Threat Detected"),
            Duration::from_millis(120),
        );
        assert!(report.cached);
        assert_eq!(report.status_checks, 0);
        assert!(report.upload_handle.is_none());
        assert_eq!(report.fingerprint, fp);
        assert!(report.is_clean());
    }

    #[test]
    fn test_report_serializes_duration_as_millis() {
        let fp = FileHasher::new().hash_bytes(b"data");
        let report = ScanReport::uploaded(
            "run-2",
            fp,
            ScanVerdict::new("data.bin", "No Threat Detected"),
            UploadHandle::new("d-1"),
            3,
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["upload_handle"], "d-1");
        assert_eq!(json["status_checks"], 3);
        assert_eq!(json["cached"], false);
    }
}
