//! Pipeline configuration loaded from YAML with environment overrides

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::{ProcessingError, Result};

/// Name and version of a registered workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRef {
    pub name: String,
    pub version: String,
}

impl WorkflowRef {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub workflows: WorkflowsConfig,
    #[serde(default)]
    pub depth: DepthConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    /// XOR key for encrypted scan versions
    #[serde(default)]
    pub decryption_key: Option<String>,
    #[serde(default = "default_max_concurrent_scans")]
    pub max_concurrent_scans: usize,
}

fn default_max_concurrent_scans() -> usize {
    2
}

/// Scan-metadata API connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

fn default_api_timeout() -> u64 {
    60
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            api_key: None,
            timeout_secs: default_api_timeout(),
        }
    }
}

/// Inference endpoints and the limits applied when calling them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Service name (from workflow metadata) → endpoint URL
    pub endpoints: HashMap<String, String>,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
    /// Ceiling on in-flight pose calls
    pub max_concurrent_pose: usize,
    /// Cap on face-detection requests per second
    pub face_requests_per_second: f64,
    /// Items per inference request for batched models
    pub batch_size: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            timeout_secs: 120,
            max_concurrent_pose: 4,
            face_requests_per_second: 5.0,
            batch_size: 9,
        }
    }
}

/// Workflow (name, version) used by each analysis flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    pub blur: WorkflowRef,
    pub faces: WorkflowRef,
    pub pose: WorkflowRef,
    pub standing_laying: WorkflowRef,
    pub depth_image: WorkflowRef,
    pub depth_features: WorkflowRef,
    pub alignment: WorkflowRef,
    pub height: WorkflowRef,
    pub height_mean: WorkflowRef,
    pub weight: WorkflowRef,
    pub weight_mean: WorkflowRef,
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            blur: WorkflowRef::new("rgb_blur"),
            faces: WorkflowRef::new("face_detection"),
            pose: WorkflowRef::new("pose_prediction"),
            standing_laying: WorkflowRef::new("standing_laying"),
            depth_image: WorkflowRef::new("depthmap_image"),
            depth_features: WorkflowRef::new("depth_features"),
            alignment: WorkflowRef::new("rgb_depth_alignment"),
            height: WorkflowRef::new("height_prediction"),
            height_mean: WorkflowRef::new("height_mean"),
            weight: WorkflowRef::new("weight_prediction"),
            weight_mean: WorkflowRef::new("weight_mean"),
        }
    }
}

/// Depth decoding and model-input preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    /// Frame size of raw `u16` depth payloads (ir scan versions)
    pub ir_width: usize,
    pub ir_height: usize,
    pub ir_depth_scale: f32,
    /// Model input shape
    pub target_height: usize,
    pub target_width: usize,
    /// Divisor for point-cloud-era models
    pub pointcloud_normalization: f32,
    /// Divisor for depth-image models
    pub depth_image_normalization: f32,
    /// Half-width of the uniform band used by row/column fills (meters)
    pub row_fill_delta: f32,
    pub rng_seed: u64,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            ir_width: 256,
            ir_height: 192,
            ir_depth_scale: 0.001,
            target_height: 240,
            target_width: 180,
            pointcloud_normalization: 7.5,
            depth_image_normalization: 3.0,
            row_fill_delta: 0.02,
            rng_seed: 42,
        }
    }
}

/// Pose estimation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Minimum person-detector score
    pub person_threshold: f32,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            person_threshold: 0.9,
            input_width: 192,
            input_height: 256,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file, apply environment overrides and validate
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: PipelineConfig = serde_yaml::from_str(&contents)?;
        debug!("Loaded pipeline config from {}", path.display());
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `RG_API_URL`, `RG_API_KEY` and `RG_DECRYPTION_KEY`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RG_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(key) = std::env::var("RG_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("RG_DECRYPTION_KEY") {
            self.decryption_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(ProcessingError::InvalidConfig(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            )));
        }
        if self.inference.batch_size == 0 {
            return Err(ProcessingError::InvalidConfig(
                "inference.batch_size must be > 0".to_string(),
            ));
        }
        if self.inference.max_concurrent_pose == 0 {
            return Err(ProcessingError::InvalidConfig(
                "inference.max_concurrent_pose must be > 0".to_string(),
            ));
        }
        if self.inference.face_requests_per_second <= 0.0 {
            return Err(ProcessingError::InvalidConfig(
                "inference.face_requests_per_second must be > 0".to_string(),
            ));
        }
        if self.max_concurrent_scans == 0 {
            return Err(ProcessingError::InvalidConfig(
                "max_concurrent_scans must be > 0".to_string(),
            ));
        }
        if self.depth.ir_width == 0 || self.depth.ir_height == 0 {
            return Err(ProcessingError::InvalidConfig(
                "depth.ir_width and depth.ir_height must be > 0".to_string(),
            ));
        }
        if self.decryption_key.as_deref() == Some("") {
            return Err(ProcessingError::InvalidConfig(
                "decryption_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
