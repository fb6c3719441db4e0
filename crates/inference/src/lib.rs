//! Inference boundary
//!
//! Every model the pipeline uses sits behind [`InferenceService`]. Calls are
//! addressed by service name (a workflow's `service_name`), so one HTTP
//! implementation serves all models. [`RateLimitedInference`] enforces the
//! concurrency ceilings and [`RetryPolicy`] the backoff schedule.

pub mod batch;
pub mod http;
pub mod limits;
pub mod retry;

use async_trait::async_trait;
use bytes::Bytes;
use cgm_rg_imaging::BoundingBox;
use ndarray::{Array2, Array3, Array4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use batch::predict_in_batches;
pub use http::HttpInference;
pub use limits::RateLimitedInference;
pub use retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service {service} returned {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {service}: {reason}")]
    Malformed { service: String, reason: String },

    #[error("No endpoint configured for service {0}")]
    UnknownService(String),

    #[error("Invalid input tensor: {0}")]
    InvalidInput(String),
}

impl InferenceError {
    /// Transport failures, 5xx and 429 responses are worth another attempt
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            InferenceError::Transport(e) => !e.is_builder(),
            InferenceError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub(crate) fn malformed(service: &str, reason: impl Into<String>) -> Self {
        InferenceError::Malformed {
            service: service.to_string(),
            reason: reason.into(),
        }
    }
}

/// One detected face with the raw attributes the detector returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// One detected person box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonDetection {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Model calls the analysis flows depend on
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Face boxes in an encoded (JPEG) image
    async fn detect_faces(
        &self,
        service: &str,
        image: Bytes,
    ) -> Result<Vec<FaceDetection>, InferenceError>;

    /// Person boxes in an encoded (JPEG) image
    async fn detect_people(
        &self,
        service: &str,
        image: Bytes,
    ) -> Result<Vec<PersonDetection>, InferenceError>;

    /// `(joints, h, w)` heatmaps for one `(1, 3, H, W)` person crop
    async fn keypoint_heatmaps(
        &self,
        service: &str,
        input: Array4<f32>,
    ) -> Result<Array3<f32>, InferenceError>;

    /// Standing probability per image of an `(n, h, w, 3)` batch
    async fn classify_standing_laying(
        &self,
        service: &str,
        batch: Array4<f32>,
    ) -> Result<Vec<f32>, InferenceError>;

    /// One scalar prediction per item of an `(n, h, w, c)` batch
    async fn regress(&self, service: &str, batch: Array4<f32>) -> Result<Vec<f32>, InferenceError>;

    /// Segmentation labels for a depth map, same shape as the input
    async fn segment_depth(
        &self,
        service: &str,
        depth: Array2<f32>,
    ) -> Result<Array2<u8>, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |status| InferenceError::Status {
            service: "height".into(),
            status,
            body: String::new(),
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!InferenceError::UnknownService("x".into()).is_retryable());
        assert!(!InferenceError::malformed("x", "bad").is_retryable());
    }
}
