//! MetaDefender Cloud scanning backend.
//!
//! Talks to the MetaDefender v4 REST API:
//!
//! 1. `GET /hash/{sha256}` looks up a cached verdict (404 means unknown)
//! 2. `POST /file` uploads the file as a multipart attachment
//! 3. `GET /file/{data_id}` reports scan progress
//!
//! Every request carries the API key in the `apikey` header. The key is held
//! as a [`SecretString`] and never appears in logs or errors.

use crate::core::{
    EngineResult, FileFingerprint, LookupOutcome, ScanError, ScanProgress, ScanService,
    ScanVerdict, UploadHandle,
};

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

/// Public MetaDefender Cloud endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.metadefender.com/v4";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "METADEFENDER_API_KEY";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "METADEFENDER_BASE_URL";

const API_KEY_HEADER: &str = "apikey";

/// Longest slice of an error body kept in a `RemoteService` error.
const MAX_ERROR_BODY: usize = 1024;

/// MetaDefender client configuration.
#[derive(Debug, Clone)]
pub struct MetaDefenderConfig {
    /// API key (kept secret).
    pub api_key: SecretString,

    /// Base URL for the API, without a trailing slash.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// User agent sent with every request.
    pub user_agent: String,
}

impl MetaDefenderConfig {
    /// Creates a configuration with the given API key.
    ///
    /// There is no default key; an empty or blank key is rejected.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ScanError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ScanError::configuration("MetaDefender API key must not be empty"));
        }

        Ok(Self {
            api_key: SecretString::new(api_key.trim().to_string().into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    /// Builds a configuration from `METADEFENDER_API_KEY` and, optionally,
    /// `METADEFENDER_BASE_URL`.
    pub fn from_env() -> Result<Self, ScanError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            ScanError::configuration(format!("{API_KEY_ENV} is not set"))
        })?;

        let config = Self::new(api_key)?;
        match std::env::var(BASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Ok(config.with_base_url(url)),
            _ => Ok(config),
        }
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim().trim_end_matches('/').to_string();
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// MetaDefender Cloud client.
///
/// Cloning is cheap and clones share the underlying connection pool. The
/// client keeps no per-workflow state, so one instance can serve any number
/// of independent workflows.
///
/// # Example
///
/// ```rust,ignore
/// use cachescan::backends::metadefender::{MetaDefenderClient, MetaDefenderConfig};
///
/// let config = MetaDefenderConfig::new("your-api-key")?;
/// let client = MetaDefenderClient::new(config)?;
/// ```
#[derive(Debug, Clone)]
pub struct MetaDefenderClient {
    config: MetaDefenderConfig,
    client: reqwest::Client,
}

impl MetaDefenderClient {
    /// Creates a client with the given configuration.
    pub fn new(config: MetaDefenderConfig) -> Result<Self, ScanError> {
        reqwest::Url::parse(&config.base_url).map_err(|e| {
            ScanError::configuration(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ScanError::configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(API_KEY_HEADER, self.config.api_key.expose_secret())
    }

    async fn send(
        &self,
        request: RequestBuilder,
        operation: &'static str,
        subject: &str,
    ) -> Result<Response, ScanError> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| ScanError::transport(operation, subject, e.to_string()))
    }
}

/// Reads the body of a successful response as text.
async fn success_body(
    response: Response,
    operation: &'static str,
    subject: &str,
) -> Result<String, ScanError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ScanError::remote(
            operation,
            subject,
            status.as_u16(),
            truncate(body),
        ));
    }

    response
        .text()
        .await
        .map_err(|e| ScanError::transport(operation, subject, e.to_string()))
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

#[derive(Debug, Deserialize)]
struct HashLookupBody {
    file_info: Option<FileInfoBody>,
    process_info: Option<ProcessInfoBody>,
    scan_results: Option<ScanResultsBody>,
}

#[derive(Debug, Deserialize)]
struct FileInfoBody {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessInfoBody {
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScanResultsBody {
    scan_details: Option<BTreeMap<String, EngineDetailBody>>,
}

#[derive(Debug, Deserialize)]
struct EngineDetailBody {
    threat_found: Option<String>,
    scan_result_i: Option<i64>,
    def_time: Option<String>,
}

/// Parses a hash lookup body into a verdict.
pub(crate) fn parse_verdict(subject: &str, body: &str) -> Result<ScanVerdict, ScanError> {
    const OP: &str = "lookup";

    let parsed: HashLookupBody = serde_json::from_str(body)
        .map_err(|e| ScanError::malformed(OP, subject, format!("invalid JSON: {e}")))?;

    let filename = parsed
        .file_info
        .and_then(|info| info.display_name)
        .ok_or_else(|| ScanError::malformed(OP, subject, "missing file_info.display_name"))?;

    let overall_result = parsed
        .process_info
        .and_then(|info| info.result)
        .ok_or_else(|| ScanError::malformed(OP, subject, "missing process_info.result"))?;

    let details = parsed
        .scan_results
        .and_then(|results| results.scan_details)
        .ok_or_else(|| ScanError::malformed(OP, subject, "missing scan_results.scan_details"))?;

    let mut verdict = ScanVerdict::new(filename, overall_result);
    for (engine, detail) in details {
        let code = detail.scan_result_i.ok_or_else(|| {
            ScanError::malformed(OP, subject, format!("engine '{engine}' has no scan_result_i"))
        })?;
        verdict.engines.insert(
            engine,
            EngineResult {
                threat_found: detail.threat_found,
                scan_result: code,
                def_time: detail.def_time,
            },
        );
    }

    Ok(verdict)
}

/// Extracts the upload handle from a `POST /file` body.
pub(crate) fn parse_upload_handle(subject: &str, body: &str) -> Result<UploadHandle, ScanError> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ScanError::malformed("upload", subject, format!("invalid JSON: {e}")))?;

    match json.get("data_id") {
        Some(serde_json::Value::String(id)) if !id.trim().is_empty() => {
            Ok(UploadHandle::new(id.trim()))
        }
        Some(serde_json::Value::Number(id)) => Ok(UploadHandle::new(id.to_string())),
        _ => Err(ScanError::malformed("upload", subject, "missing data_id")),
    }
}

/// Extracts the scan progress from a `GET /file/{data_id}` body.
pub(crate) fn parse_progress(subject: &str, body: &str) -> Result<ScanProgress, ScanError> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ScanError::malformed("status", subject, format!("invalid JSON: {e}")))?;

    let raw = json
        .pointer("/scan_results/progress_percentage")
        .ok_or_else(|| {
            ScanError::malformed("status", subject, "missing scan_results.progress_percentage")
        })?;

    ScanProgress::from_json(raw).ok_or_else(|| {
        ScanError::malformed("status", subject, format!("invalid progress value {raw}"))
    })
}

#[async_trait]
impl ScanService for MetaDefenderClient {
    fn name(&self) -> &str {
        "metadefender"
    }

    async fn lookup_by_hash(
        &self,
        fingerprint: &FileFingerprint,
    ) -> Result<LookupOutcome, ScanError> {
        let subject = fingerprint.as_str();
        let request = self.client.get(self.url(&format!("hash/{subject}")));
        let response = self.send(request, "lookup", subject).await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(fingerprint = %subject, "hash not cached by service");
            return Ok(LookupOutcome::NotFound);
        }

        let body = success_body(response, "lookup", subject).await?;
        parse_verdict(subject, &body).map(LookupOutcome::Found)
    }

    async fn upload(&self, path: &Path) -> Result<UploadHandle, ScanError> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ScanError::file_open(path, e))?;
        let length = file.metadata().await?.len();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = reqwest::multipart::Part::stream_with_length(body, length)
            .file_name(filename.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| ScanError::configuration(format!("invalid upload content type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        tracing::debug!(filename = %filename, bytes = length, "uploading file");

        let request = self.client.post(self.url("file")).multipart(form);
        let response = self.send(request, "upload", &filename).await?;
        let body = success_body(response, "upload", &filename).await?;
        parse_upload_handle(&filename, &body)
    }

    async fn fetch_status(&self, handle: &UploadHandle) -> Result<ScanProgress, ScanError> {
        let subject = handle.as_str();
        let request = self.client.get(self.url(&format!("file/{subject}")));
        let response = self.send(request, "status", subject).await?;
        let body = success_body(response, "status", subject).await?;
        parse_progress(subject, &body)
    }
}
