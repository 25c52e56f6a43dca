//! Audit event types and emission functions.

use crate::core::{FileFingerprint, ScanError, ScanReport, UploadHandle, WorkflowState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit event for a finished workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Workflow run ID.
    pub run_id: String,

    /// SHA-256 fingerprint of the file.
    pub fingerprint: String,

    /// File name as reported by the service.
    pub filename: String,

    /// Overall classification from the service.
    pub overall_result: String,

    /// Number of engines that reported.
    pub engine_count: usize,

    /// Engines that reported a threat.
    pub detections: Vec<DetectionSummary>,

    /// Whether the verdict came from the service cache.
    pub cached: bool,

    /// Upload handle, when the file had to be uploaded.
    pub upload_handle: Option<String>,

    /// Number of status checks while polling.
    pub status_checks: u32,

    /// Workflow duration in milliseconds.
    pub duration_ms: u64,
}

/// A single engine detection for audit logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Engine that reported the threat.
    pub engine: String,
    /// Threat label.
    pub threat: String,
}

impl From<&ScanReport> for VerdictAuditEvent {
    fn from(report: &ScanReport) -> Self {
        let detections = report
            .verdict
            .engines
            .iter()
            .filter(|(_, result)| !result.is_clean())
            .map(|(engine, result)| DetectionSummary {
                engine: engine.clone(),
                threat: result.threat_label().to_string(),
            })
            .collect();

        Self {
            timestamp: Utc::now(),
            run_id: report.run_id.clone(),
            fingerprint: report.fingerprint.to_string(),
            filename: report.verdict.filename.clone(),
            overall_result: report.verdict.overall_result.clone(),
            engine_count: report.verdict.engines.len(),
            detections,
            cached: report.cached,
            upload_handle: report.upload_handle.as_ref().map(ToString::to_string),
            status_checks: report.status_checks,
            duration_ms: report.duration.as_millis() as u64,
        }
    }
}

impl AuditEvent for VerdictAuditEvent {
    fn event_type(&self) -> &'static str {
        "scan_verdict"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for a workflow starting.
pub fn emit_workflow_started(run_id: &str, path: &Path, service: &str) {
    tracing::info!(
        target: "cachescan::audit",
        event_type = "workflow_started",
        run_id = %run_id,
        path = %path.display(),
        service = %service,
        "Scan workflow started"
    );
}

/// Emits an audit event for a hash lookup.
pub fn emit_lookup(run_id: &str, fingerprint: &FileFingerprint, hit: bool) {
    tracing::info!(
        target: "cachescan::audit",
        event_type = "hash_lookup",
        run_id = %run_id,
        fingerprint = %fingerprint,
        cache_hit = hit,
        "Hash lookup completed"
    );
}

/// Emits an audit event for an accepted upload.
pub fn emit_upload(run_id: &str, fingerprint: &FileFingerprint, handle: &UploadHandle) {
    tracing::info!(
        target: "cachescan::audit",
        event_type = "file_uploaded",
        run_id = %run_id,
        fingerprint = %fingerprint,
        handle = %handle,
        "File uploaded for scanning"
    );
}

/// Emits an audit event for a finished workflow.
pub fn emit_verdict(report: &ScanReport) {
    let event = VerdictAuditEvent::from(report);

    tracing::info!(
        target: "cachescan::audit",
        event_type = event.event_type(),
        run_id = %event.run_id,
        fingerprint = %event.fingerprint,
        filename = %event.filename,
        overall_result = %event.overall_result,
        engine_count = event.engine_count,
        detections = ?event.detections,
        detection_count = event.detections.len(),
        cached = event.cached,
        upload_handle = ?event.upload_handle,
        status_checks = event.status_checks,
        duration_ms = event.duration_ms,
        "Scan verdict received"
    );
}

/// Emits an audit event for a failed workflow.
pub fn emit_workflow_failed(run_id: &str, stage: WorkflowState, error: &ScanError) {
    tracing::warn!(
        target: "cachescan::audit",
        event_type = "workflow_failed",
        run_id = %run_id,
        stage = %stage,
        status = ?error.status(),
        error = %error,
        "Scan workflow failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EngineResult, FileHasher, ScanVerdict};
    use std::time::Duration;

    #[test]
    fn test_verdict_event_from_report() {
        let verdict = ScanVerdict::new("sample.exe", "Infected")
            .with_engine("EngineX", EngineResult::new(Some(String::new()), 0))
            .with_engine("EngineY", EngineResult::new(Some("Trojan.Agent".into()), 1));
        let report = ScanReport::uploaded(
            "run-9",
            FileHasher::new().hash_bytes(b"x"),
            verdict,
            UploadHandle::new("d-1"),
            2,
            Duration::from_millis(42),
        );

        let event = VerdictAuditEvent::from(&report);
        assert_eq!(event.event_type(), "scan_verdict");
        assert_eq!(event.engine_count, 2);
        assert_eq!(
            event.detections,
            vec![DetectionSummary {
                engine: "EngineY".into(),
                threat: "Trojan.Agent".into(),
            }]
        );
        assert_eq!(event.upload_handle.as_deref(), Some("d-1"));
        assert_eq!(event.duration_ms, 42);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["cached"], false);
        assert_eq!(json["status_checks"], 2);
    }
}
