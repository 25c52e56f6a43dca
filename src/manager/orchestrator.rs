//! The cache-first scan workflow.
//!
//! ```text
//! Hashing -> LookupPending -> ResultReady                      (cache hit)
//!                          -> UploadPending -> PollingPending  (cache miss)
//!                                              -> ResultReady  (progress 100, re-lookup)
//! ```

use crate::audit;
use crate::core::{
    ArcScanService, FileFingerprint, FileHasher, LookupOutcome, ScanError, ScanReport,
    ScanService, UploadHandle, WorkflowState,
};

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause between two status checks.
    pub poll_interval: Duration,

    /// Upper bound on the whole polling phase. `None` polls until the scan
    /// completes or the run is cancelled.
    pub max_poll_time: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_poll_time: Some(Duration::from_secs(15 * 60)),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pause between status checks.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the polling budget.
    pub fn with_max_poll_time(mut self, limit: Option<Duration>) -> Self {
        self.max_poll_time = limit;
        self
    }

    fn validate(&self) -> Result<(), ScanError> {
        if self.poll_interval.is_zero() {
            return Err(ScanError::configuration("poll interval must be greater than zero"));
        }
        if self.max_poll_time.is_some_and(|limit| limit.is_zero()) {
            return Err(ScanError::configuration("max poll time must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for creating a `ScanOrchestrator`.
pub struct ScanOrchestratorBuilder {
    service: Option<ArcScanService>,
    config: OrchestratorConfig,
}

impl ScanOrchestratorBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            service: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Sets the scan service.
    pub fn service<S: ScanService + 'static>(mut self, service: S) -> Self {
        self.service = Some(Arc::new(service));
        self
    }

    /// Sets a scan service wrapped in an Arc.
    pub fn arc_service(mut self, service: ArcScanService) -> Self {
        self.service = Some(service);
        self
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the orchestrator.
    pub fn build(self) -> Result<ScanOrchestrator, ScanError> {
        let service = self
            .service
            .ok_or_else(|| ScanError::configuration("a scan service is required"))?;
        self.config.validate()?;

        Ok(ScanOrchestrator {
            service,
            config: self.config,
            hasher: FileHasher::new(),
        })
    }
}

impl Default for ScanOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one file through lookup, optional upload and polling.
///
/// An orchestrator can be reused for many files; each call to
/// [`run`](Self::run) is an independent workflow with its own state.
pub struct ScanOrchestrator {
    service: ArcScanService,
    config: OrchestratorConfig,
    hasher: FileHasher,
}

impl ScanOrchestrator {
    /// Creates a new builder.
    pub fn builder() -> ScanOrchestratorBuilder {
        ScanOrchestratorBuilder::new()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Scans the file at `path`, preferring the service's cached verdict.
    ///
    /// The file is hashed once. If the service already knows the hash its
    /// verdict is returned without uploading anything. Otherwise the file is
    /// uploaded, its progress polled until it reaches 100%, and the verdict
    /// looked up again by the same fingerprint.
    ///
    /// Cancelling `cancel` aborts the run at the next suspension point with
    /// [`ScanError::Cancelled`].
    ///
    /// # Errors
    ///
    /// - `FileNotFound` / `Io` - The file cannot be read.
    /// - `RemoteService` / `MalformedResponse` - Any remote operation failed;
    ///   nothing is retried.
    /// - `MalformedResponse` - The scan completed but the final lookup found
    ///   no verdict.
    /// - `Timeout` - Polling exceeded `max_poll_time`.
    /// - `Cancelled` - The token was cancelled.
    pub async fn run(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ScanReport, ScanError> {
        let mut workflow = Workflow {
            orchestrator: self,
            path,
            cancel,
            run_id: Uuid::new_v4().to_string(),
            state: WorkflowState::Hashing,
            started: Instant::now(),
        };

        audit::emit_workflow_started(&workflow.run_id, path, self.service.name());

        match workflow.execute().await {
            Ok(report) => {
                audit::emit_verdict(&report);
                Ok(report)
            }
            Err(err) => {
                audit::emit_workflow_failed(&workflow.run_id, workflow.state, &err);
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("service", &self.service.name())
            .field("config", &self.config)
            .finish()
    }
}

/// State of a single run.
struct Workflow<'a> {
    orchestrator: &'a ScanOrchestrator,
    path: &'a Path,
    cancel: &'a CancellationToken,
    run_id: String,
    state: WorkflowState,
    started: Instant,
}

impl Workflow<'_> {
    async fn execute(&mut self) -> Result<ScanReport, ScanError> {
        let orchestrator = self.orchestrator;
        let service = &orchestrator.service;

        let fingerprint = self
            .guarded(orchestrator.hasher.hash_file_async(self.path))
            .await?;
        self.advance(WorkflowState::LookupPending);

        let outcome = self.guarded(service.lookup_by_hash(&fingerprint)).await?;
        audit::emit_lookup(&self.run_id, &fingerprint, outcome.is_found());

        if let LookupOutcome::Found(verdict) = outcome {
            self.advance(WorkflowState::ResultReady);
            return Ok(ScanReport::cached(
                self.run_id.clone(),
                fingerprint,
                verdict,
                self.started.elapsed(),
            ));
        }

        self.advance(WorkflowState::UploadPending);
        let handle = self.guarded(service.upload(self.path)).await?;
        audit::emit_upload(&self.run_id, &fingerprint, &handle);

        self.advance(WorkflowState::PollingPending);
        let status_checks = self.poll_until_complete(&handle).await?;

        // The handle is done with; the verdict is keyed by content.
        let verdict = match self.guarded(service.lookup_by_hash(&fingerprint)).await? {
            LookupOutcome::Found(verdict) => verdict,
            LookupOutcome::NotFound => return Err(missing_after_scan(&fingerprint, &handle)),
        };
        self.advance(WorkflowState::ResultReady);

        Ok(ScanReport::uploaded(
            self.run_id.clone(),
            fingerprint,
            verdict,
            handle,
            status_checks,
            self.started.elapsed(),
        ))
    }

    /// Checks progress until it reaches 100%, returning the number of checks.
    async fn poll_until_complete(&self, handle: &UploadHandle) -> Result<u32, ScanError> {
        let config = &self.orchestrator.config;

        let poll = async {
            let mut checks = 0u32;
            loop {
                let progress = self
                    .guarded(self.orchestrator.service.fetch_status(handle))
                    .await?;
                checks += 1;

                tracing::debug!(
                    run_id = %self.run_id,
                    handle = %handle,
                    progress = progress.percent(),
                    check = checks,
                    "scan progress"
                );

                if progress.is_complete() {
                    return Ok(checks);
                }

                self.guarded(async {
                    tokio::time::sleep(config.poll_interval).await;
                    Ok(())
                })
                .await?;
            }
        };

        match config.max_poll_time {
            Some(limit) => tokio::time::timeout(limit, poll).await.unwrap_or_else(|_| {
                Err(ScanError::Timeout {
                    operation: "polling",
                    elapsed: limit,
                })
            }),
            None => poll.await,
        }
    }

    /// Races `operation` against cancellation.
    async fn guarded<T, F>(&self, operation: F) -> Result<T, ScanError>
    where
        F: Future<Output = Result<T, ScanError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScanError::Cancelled { stage: self.state }),
            result = operation => result,
        }
    }

    fn advance(&mut self, next: WorkflowState) {
        tracing::debug!(
            run_id = %self.run_id,
            from = %self.state,
            to = %next,
            "workflow transition"
        );
        self.state = next;
    }
}

fn missing_after_scan(fingerprint: &FileFingerprint, handle: &UploadHandle) -> ScanError {
    ScanError::malformed(
        "lookup",
        fingerprint.as_str(),
        format!("scan {handle} completed but the service has no verdict for this hash"),
    )
}
