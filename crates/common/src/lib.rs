/// Common types and utilities for scan result generation
use thiserror::Error;

pub mod config;
pub mod model;
pub mod result;
pub mod stats;
pub mod workflow;

pub use config::{PipelineConfig, WorkflowRef};
pub use model::{
    Artifact, ArtifactFormat, CaptureAngle, PoseType, ScanMetadata, ScanType, ScanVersion,
};
pub use result::{ExistingResults, PostedResult, ResultBuilder, ResultPayload, ResultRecord};
pub use workflow::{Workflow, WorkflowMeta, WorkflowRegistry};

/// Raised when a scan-type code maps to neither standing nor lying.
///
/// This is a precondition failure: it aborts the whole scan rather than a
/// single analysis flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown scan type: {0}")]
pub struct UnknownScanTypeError(pub String);

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    UnknownScanType(#[from] UnknownScanTypeError),

    #[error("Workflow not found: {name} (version {version})")]
    WorkflowNotFound { name: String, version: String },

    #[error("Workflow {name} (version {version}) resolves to both {first} and {second}")]
    AmbiguousWorkflow {
        name: String,
        version: String,
        first: String,
        second: String,
    },

    #[error("Artifact {0} has no downloaded payload")]
    ArtifactNotFetched(String),

    #[error("Result for scan {0} has no source artifacts")]
    EmptyResultSources(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;
