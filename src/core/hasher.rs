//! Streaming SHA-256 file fingerprinting.
//!
//! The scanning service keys its cache by SHA-256, so that is the only
//! digest computed. Files are streamed in fixed-size chunks and never loaded
//! into memory whole.

use crate::core::error::ScanError;
use crate::core::types::FileFingerprint;

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read buffer size for streaming digests.
const CHUNK_SIZE: usize = 64 * 1024;

/// Computes [`FileFingerprint`]s.
///
/// The fingerprint depends only on file content; the name, timestamps and
/// permissions of the file never enter the digest.
///
/// # Examples
///
/// ```rust
/// use cachescan::core::FileHasher;
///
/// let hasher = FileHasher::new();
/// let fp = hasher.hash_bytes(b"hello world");
/// assert_eq!(
///     fp.as_str(),
///     "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileHasher;

impl FileHasher {
    /// Creates a new `FileHasher`.
    pub fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of in-memory data.
    pub fn hash_bytes(&self, data: &[u8]) -> FileFingerprint {
        FileFingerprint::from_digest(format!("{:x}", Sha256::digest(data)))
    }

    /// Computes the fingerprint of a file, blocking the current thread.
    pub fn hash_file(&self, path: &Path) -> Result<FileFingerprint, ScanError> {
        let file = std::fs::File::open(path).map_err(|e| ScanError::file_open(path, e))?;
        let mut reader = std::io::BufReader::new(file);
        self.hash_reader(&mut reader)
    }

    /// Computes the fingerprint of everything a synchronous reader yields.
    pub fn hash_reader<R: Read>(&self, reader: &mut R) -> Result<FileFingerprint, ScanError> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(FileFingerprint::from_digest(format!("{:x}", hasher.finalize())))
    }

    /// Computes the fingerprint of a file on the tokio runtime.
    ///
    /// Every chunk read is an await point, so dropping the returned future
    /// stops hashing and closes the file immediately.
    pub async fn hash_file_async(&self, path: &Path) -> Result<FileFingerprint, ScanError> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ScanError::file_open(path, e))?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let bytes_read = file.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(FileFingerprint::from_digest(format!("{:x}", hasher.finalize())))
    }
}
