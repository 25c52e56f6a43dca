//! Core types used throughout the cachescan library.
//!
//! This module defines the fingerprint that keys the remote cache, the
//! upload handle and progress values of an in-flight scan, and the verdict
//! structure returned by the scanning service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Length of a hex-encoded SHA-256 digest.
const FINGERPRINT_LEN: usize = 64;

/// Lowercase hex SHA-256 digest identifying file content.
///
/// Used as the cache key for hash lookups and as the correlation key across
/// upload and polling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileFingerprint(String);

impl FileFingerprint {
    /// Wraps a digest produced by [`FileHasher`](crate::core::FileHasher).
    pub(crate) fn from_digest(hex: String) -> Self {
        Self(hex)
    }

    /// Parses a fingerprint from a foreign string.
    ///
    /// Accepts 64 hex characters in either case and normalizes to lowercase.
    /// Returns `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.len() != FINGERPRINT_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(value.to_ascii_lowercase()))
    }

    /// Returns the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque identifier the service assigns to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadHandle(String);

impl UploadHandle {
    /// Creates a handle from the service-provided identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Completion percentage of an in-flight scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScanProgress(u8);

impl ScanProgress {
    /// Scan finished.
    pub const COMPLETE: Self = Self(100);

    /// Creates a progress value, rejecting anything above 100.
    pub fn new(percent: u8) -> Option<Self> {
        (percent <= 100).then_some(Self(percent))
    }

    /// Coerces a JSON value into a progress value.
    ///
    /// The service reports progress either as a number or as a numeric
    /// string; both are accepted as long as they fall within 0–100.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let percent = match value {
            serde_json::Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))?,
            serde_json::Value::String(s) => s.trim().parse::<u64>().ok()?,
            _ => return None,
        };
        u8::try_from(percent).ok().and_then(Self::new)
    }

    /// Returns the percentage.
    pub fn percent(&self) -> u8 {
        self.0
    }

    /// Returns `true` once the scan has finished.
    pub fn is_complete(&self) -> bool {
        self.0 == 100
    }
}

impl fmt::Display for ScanProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Per-engine result within a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineResult {
    /// Threat name reported by the engine; empty or absent means clean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_found: Option<String>,

    /// Numeric result code reported by the engine.
    pub scan_result: i64,

    /// Timestamp of the engine's definition set, as reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub def_time: Option<String>,
}

impl EngineResult {
    /// Creates a result with the given threat label and result code.
    pub fn new(threat_found: Option<String>, scan_result: i64) -> Self {
        Self {
            threat_found,
            scan_result,
            def_time: None,
        }
    }

    /// Sets the definition timestamp.
    pub fn with_def_time(mut self, def_time: impl Into<String>) -> Self {
        self.def_time = Some(def_time.into());
        self
    }

    /// Returns `true` if the engine reported no threat.
    pub fn is_clean(&self) -> bool {
        self.threat_found
            .as_deref()
            .map_or(true, |label| label.trim().is_empty())
    }

    /// Returns the threat label for display, `"Clean"` when none was reported.
    pub fn threat_label(&self) -> &str {
        match self.threat_found.as_deref() {
            Some(label) if !label.trim().is_empty() => label,
            _ => "Clean",
        }
    }

    /// Parses the definition timestamp, if present and RFC 3339 formatted.
    pub fn def_time_parsed(&self) -> Option<DateTime<Utc>> {
        self.def_time
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// The service's verdict for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanVerdict {
    /// Display name of the scanned file as known to the service.
    pub filename: String,

    /// Overall classification (e.g. "No Threat Detected", "Infected").
    pub overall_result: String,

    /// Results keyed by engine name.
    pub engines: BTreeMap<String, EngineResult>,
}

impl ScanVerdict {
    /// Creates a verdict without engine results.
    pub fn new(filename: impl Into<String>, overall_result: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            overall_result: overall_result.into(),
            engines: BTreeMap::new(),
        }
    }

    /// Adds an engine result.
    pub fn with_engine(mut self, engine: impl Into<String>, result: EngineResult) -> Self {
        self.engines.insert(engine.into(), result);
        self
    }

    /// Returns the number of engines that reported a threat.
    pub fn detection_count(&self) -> usize {
        self.engines.values().filter(|r| !r.is_clean()).count()
    }

    /// Returns `true` if no engine reported a threat.
    pub fn is_clean(&self) -> bool {
        self.detection_count() == 0
    }
}

/// States of the scan workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Computing the file fingerprint.
    Hashing,
    /// Waiting for the hash lookup.
    LookupPending,
    /// Waiting for the upload to be accepted.
    UploadPending,
    /// Waiting for the remote scan to finish.
    PollingPending,
    /// Verdict available.
    ResultReady,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hashing => write!(f, "hashing"),
            Self::LookupPending => write!(f, "looking up"),
            Self::UploadPending => write!(f, "uploading"),
            Self::PollingPending => write!(f, "polling"),
            Self::ResultReady => write!(f, "done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_parse_normalizes_case() {
        let upper = "A".repeat(64);
        let fp = FileFingerprint::parse(&upper).unwrap();
        assert_eq!(fp.as_str(), "a".repeat(64));

        assert!(FileFingerprint::parse("abc123").is_none());
        assert!(FileFingerprint::parse(&"g".repeat(64)).is_none());
    }

    #[test]
    fn test_progress_coercion() {
        assert_eq!(ScanProgress::from_json(&json!(50)), ScanProgress::new(50));
        assert_eq!(ScanProgress::from_json(&json!("100")), Some(ScanProgress::COMPLETE));
        assert_eq!(ScanProgress::from_json(&json!(" 7 ")), ScanProgress::new(7));
        assert_eq!(ScanProgress::from_json(&json!(100.0)), Some(ScanProgress::COMPLETE));
        assert_eq!(ScanProgress::from_json(&json!(101)), None);
        assert_eq!(ScanProgress::from_json(&json!(-1)), None);
        assert_eq!(ScanProgress::from_json(&json!("soon")), None);
        assert_eq!(ScanProgress::from_json(&json!(null)), None);
    }

    #[test]
    fn test_progress_completion() {
        assert!(!ScanProgress::new(99).unwrap().is_complete());
        assert!(ScanProgress::COMPLETE.is_complete());
        assert!(ScanProgress::new(101).is_none());
    }

    #[test]
    fn test_engine_result_threat_label() {
        assert_eq!(EngineResult::new(Some(String::new()), 0).threat_label(), "Clean");
        assert_eq!(EngineResult::new(None, 0).threat_label(), "Clean");
        let infected = EngineResult::new(Some("EICAR-Test-File".into()), 1);
        assert_eq!(infected.threat_label(), "EICAR-Test-File");
        assert!(!infected.is_clean());
    }

    #[test]
    fn test_def_time_parsing() {
        let result = EngineResult::new(None, 0).with_def_time("2024-03-01T06:12:00.000Z");
        assert!(result.def_time_parsed().is_some());

        let odd = EngineResult::new(None, 0).with_def_time("yesterday");
        assert!(odd.def_time_parsed().is_none());
    }

    #[test]
    fn test_verdict_detection_count() {
        let verdict = ScanVerdict::new("sample.exe", "Infected")
            .with_engine("EngineX", EngineResult::new(Some(String::new()), 0))
            .with_engine("EngineY", EngineResult::new(Some("Trojan.Agent".into()), 1));
        assert_eq!(verdict.detection_count(), 1);
        assert!(!verdict.is_clean());
    }

    #[test]
    fn test_workflow_state_display() {
        assert_eq!(WorkflowState::LookupPending.to_string(), "looking up");
        assert_eq!(WorkflowState::ResultReady.to_string(), "done");
    }
}
