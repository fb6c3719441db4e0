//! Scan-metadata API boundary
//!
//! [`ScanApi`] is the contract the pipeline relies on; [`HttpScanApi`] is the
//! reqwest implementation. [`ArtifactFetcher`] downloads artifact payloads
//! through it and decrypts them when the scan version requires it.

pub mod client;
pub mod crypto;
pub mod fetcher;

use async_trait::async_trait;
use bytes::Bytes;
use cgm_rg_common::{ProcessingError, ResultRecord, ScanMetadata, Workflow};
use thiserror::Error;

pub use client::HttpScanApi;
pub use fetcher::ArtifactFetcher;

/// Errors raised at the scan API boundary
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Scan version {0} is encrypted but no decryption key is configured")]
    MissingDecryptionKey(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<ApiError> for ProcessingError {
    fn from(err: ApiError) -> Self {
        ProcessingError::Other(err.to_string())
    }
}

/// Operations the pipeline needs from the scan-metadata service.
///
/// Every call is fallible; a non-2xx response surfaces as [`ApiError::Status`].
#[async_trait]
pub trait ScanApi: Send + Sync {
    /// Metadata, artifacts and existing results of one scan
    async fn get_scan_metadata(&self, scan_id: &str) -> Result<ScanMetadata, ApiError>;

    /// The full workflow registry
    async fn get_workflows(&self) -> Result<Vec<Workflow>, ApiError>;

    /// Raw bytes of a stored file
    async fn get_file(&self, file_id: &str) -> Result<Bytes, ApiError>;

    /// Store a file and return its id
    async fn post_file(&self, data: Bytes, mime_type: &str) -> Result<String, ApiError>;

    /// Store a batch of result records
    async fn post_results(&self, results: &[ResultRecord]) -> Result<(), ApiError>;
}
