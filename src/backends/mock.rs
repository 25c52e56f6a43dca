//! Mock scan service for testing.
//!
//! This module provides a scripted in-process [`ScanService`] that can be
//! used in tests to simulate cache hits, cache misses, upload failures and
//! polling sequences without a real scanning service. It records how often
//! each operation was called.

use crate::core::{
    FileFingerprint, LookupOutcome, ScanError, ScanProgress, ScanService, ScanVerdict,
    UploadHandle,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One scripted reply of the mock service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply<T> {
    /// Succeed with the value.
    Ok(T),
    /// Fail as if the service answered with this HTTP status and body.
    Status(u16, String),
    /// Fail as if the service answered with an unusable body.
    Malformed(String),
}

impl<T> MockReply<T> {
    fn into_result(self, operation: &'static str, subject: &str) -> Result<T, ScanError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Status(status, body) => Err(ScanError::remote(operation, subject, status, body)),
            Self::Malformed(details) => Err(ScanError::malformed(operation, subject, details)),
        }
    }
}

/// A scripted scan service for testing purposes.
///
/// Lookups and status checks are answered from queues in order. Once a
/// queue holds a single reply, that reply is repeated for every further
/// call.
///
/// # Examples
///
/// ```rust
/// use cachescan::backends::MockScanService;
/// use cachescan::core::{ScanProgress, ScanVerdict};
///
/// // Cache hit
/// let service = MockScanService::new()
///     .with_cached_verdict(ScanVerdict::new("a.txt", "No Threat Detected"));
///
/// // Cache miss, upload, two polls, then the fresh verdict
/// let service = MockScanService::new()
///     .with_not_found()
///     .with_cached_verdict(ScanVerdict::new("a.txt", "No Threat Detected"))
///     .with_upload_handle("d-1")
///     .with_progress([50, 100]);
/// ```
#[derive(Debug)]
pub struct MockScanService {
    /// Name of this service instance.
    name: String,
    /// Replies to `lookup_by_hash`.
    lookups: Mutex<VecDeque<MockReply<Option<ScanVerdict>>>>,
    /// Reply to `upload`.
    upload: Mutex<MockReply<String>>,
    /// Replies to `fetch_status`.
    statuses: Mutex<VecDeque<MockReply<u8>>>,
    /// Simulated latency for every call.
    latency: Option<Duration>,
    lookup_calls: AtomicU32,
    upload_calls: AtomicU32,
    status_calls: AtomicU32,
    /// Fingerprints passed to `lookup_by_hash`, in call order.
    looked_up: Mutex<Vec<FileFingerprint>>,
}

impl MockScanService {
    /// Creates a mock that misses every lookup and completes scans at once.
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            lookups: Mutex::new(VecDeque::new()),
            upload: Mutex::new(MockReply::Ok("mock-data-id".to_string())),
            statuses: Mutex::new(VecDeque::new()),
            latency: None,
            lookup_calls: AtomicU32::new(0),
            upload_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            looked_up: Mutex::new(Vec::new()),
        }
    }

    /// Sets the name of this service.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Queues a lookup reply carrying a cached verdict.
    pub fn with_cached_verdict(self, verdict: ScanVerdict) -> Self {
        self.with_lookup_reply(MockReply::Ok(Some(verdict)))
    }

    /// Queues a lookup reply saying the hash is unknown.
    pub fn with_not_found(self) -> Self {
        self.with_lookup_reply(MockReply::Ok(None))
    }

    /// Queues an arbitrary lookup reply.
    pub fn with_lookup_reply(self, reply: MockReply<Option<ScanVerdict>>) -> Self {
        locked(&self.lookups).push_back(reply);
        self
    }

    /// Makes uploads succeed with the given handle.
    pub fn with_upload_handle(self, handle: impl Into<String>) -> Self {
        self.with_upload_reply(MockReply::Ok(handle.into()))
    }

    /// Sets the upload reply.
    pub fn with_upload_reply(self, reply: MockReply<String>) -> Self {
        *locked(&self.upload) = reply;
        self
    }

    /// Queues progress values for successive status checks.
    pub fn with_progress(self, percents: impl IntoIterator<Item = u8>) -> Self {
        {
            let mut statuses = locked(&self.statuses);
            statuses.extend(percents.into_iter().map(MockReply::Ok));
        }
        self
    }

    /// Queues an arbitrary status reply.
    pub fn with_status_reply(self, reply: MockReply<u8>) -> Self {
        locked(&self.statuses).push_back(reply);
        self
    }

    /// Sets the simulated latency for every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the number of lookups performed.
    pub fn lookup_count(&self) -> u32 {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of uploads performed.
    pub fn upload_count(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of status checks performed.
    pub fn status_count(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Returns the fingerprints that were looked up, in call order.
    pub fn looked_up(&self) -> Vec<FileFingerprint> {
        locked(&self.looked_up).clone()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MockScanService {
    fn default() -> Self {
        Self::new()
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pops the next reply, repeating the last one once the queue runs dry.
fn next_reply<T: Clone>(queue: &Mutex<VecDeque<MockReply<T>>>, fallback: MockReply<T>) -> MockReply<T> {
    let mut queue = locked(queue);
    if queue.len() > 1 {
        queue.pop_front().unwrap_or(fallback)
    } else {
        queue.front().cloned().unwrap_or(fallback)
    }
}

#[async_trait]
impl ScanService for MockScanService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup_by_hash(
        &self,
        fingerprint: &FileFingerprint,
    ) -> Result<LookupOutcome, ScanError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.looked_up).push(fingerprint.clone());
        self.simulate_latency().await;

        let reply = next_reply(&self.lookups, MockReply::Ok(None));
        Ok(match reply.into_result("lookup", fingerprint.as_str())? {
            Some(verdict) => LookupOutcome::Found(verdict),
            None => LookupOutcome::NotFound,
        })
    }

    async fn upload(&self, path: &Path) -> Result<UploadHandle, ScanError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let subject = path.display().to_string();
        let reply = locked(&self.upload).clone();
        reply.into_result("upload", &subject).map(UploadHandle::new)
    }

    async fn fetch_status(&self, handle: &UploadHandle) -> Result<ScanProgress, ScanError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let reply = next_reply(&self.statuses, MockReply::Ok(100));
        let percent = reply.into_result("status", handle.as_str())?;
        ScanProgress::new(percent).ok_or_else(|| {
            ScanError::malformed("status", handle.as_str(), format!("progress {percent} out of range"))
        })
    }
}
