//! Structured audit logging.
//!
//! Workflow milestones are emitted as `tracing` events under the
//! `cachescan::audit` target, so any subscriber (JSON file, OpenTelemetry,
//! etc.) can capture them separately from diagnostic logs.

mod events;

pub use events::{
    emit_lookup, emit_upload, emit_verdict, emit_workflow_failed, emit_workflow_started,
    AuditEvent, DetectionSummary, VerdictAuditEvent,
};
