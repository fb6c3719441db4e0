//! Scan metadata, artifacts and scan-type classification

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::result::PostedResult;
use crate::UnknownScanTypeError;

/// Artifact format, accepted under its legacy spellings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Rgb,
    Depth,
}

impl ArtifactFormat {
    /// Parse a format string as sent by the scan API.
    ///
    /// Returns `None` for formats no flow consumes (calibration files, etc.).
    #[must_use]
    pub fn parse(format: &str) -> Option<Self> {
        match format.trim().to_ascii_lowercase().as_str() {
            "rgb" | "image/jpeg" | "image/jpg" => Some(Self::Rgb),
            "depth" | "application/zip" | "depthmap" => Some(Self::Depth),
            _ => None,
        }
    }
}

/// One captured frame of a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    /// Format string as reported by the API; see [`ArtifactFormat::parse`]
    pub format: String,
    /// File id used to download the payload
    pub file: String,
    /// Position in the capture sequence
    #[serde(default)]
    pub order: Option<i64>,
    /// Owning scan, filled in by [`ScanMetadata::attach_scan_ids`] when the API omits it
    #[serde(default)]
    pub scan_id: String,
    /// Downloaded payload, absent until fetched
    #[serde(skip)]
    pub raw_file: Option<Bytes>,
}

impl Artifact {
    #[must_use]
    pub fn kind(&self) -> Option<ArtifactFormat> {
        ArtifactFormat::parse(&self.format)
    }

    /// Downloaded payload or an error naming the artifact
    pub fn payload(&self) -> crate::Result<&Bytes> {
        self.raw_file
            .as_ref()
            .ok_or_else(|| crate::ProcessingError::ArtifactNotFetched(self.id.clone()))
    }
}

/// Body orientation of the child during capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseType {
    Standing,
    Lying,
}

impl PoseType {
    /// Largest depth (meters) considered valid for inpainting
    #[must_use]
    pub fn max_depth(&self) -> f32 {
        match self {
            PoseType::Standing => 3.0,
            PoseType::Lying => 1.5,
        }
    }
}

impl fmt::Display for PoseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoseType::Standing => f.write_str("standing"),
            PoseType::Lying => f.write_str("lying"),
        }
    }
}

/// Capture angle encoded in the last digit of the scan-type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureAngle {
    Front,
    Turn360,
    Back,
}

/// Classified scan-type code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanType {
    pub code: String,
    pub pose: PoseType,
    pub angle: CaptureAngle,
}

impl ScanType {
    /// Classify a scan-type code (`"100"`-`"102"` standing, `"200"`-`"202"` lying).
    ///
    /// # Errors
    /// Returns [`UnknownScanTypeError`] for any other code.
    pub fn classify(code: &str) -> Result<Self, UnknownScanTypeError> {
        let code = code.trim();
        let (pose, angle) = match code {
            "100" => (PoseType::Standing, CaptureAngle::Front),
            "101" => (PoseType::Standing, CaptureAngle::Turn360),
            "102" => (PoseType::Standing, CaptureAngle::Back),
            "200" => (PoseType::Lying, CaptureAngle::Front),
            "201" => (PoseType::Lying, CaptureAngle::Turn360),
            "202" => (PoseType::Lying, CaptureAngle::Back),
            _ => return Err(UnknownScanTypeError(code.to_string())),
        };
        Ok(Self {
            code: code.to_string(),
            pose,
            angle,
        })
    }
}

/// Capture-format version string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanVersion(pub String);

impl ScanVersion {
    const ENCRYPTED_PREFIXES: [&'static str; 2] = ["ir-2.", "v3."];

    /// Payloads of these versions are XOR-encrypted at rest
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        Self::ENCRYPTED_PREFIXES
            .iter()
            .any(|prefix| self.0.starts_with(prefix))
    }

    /// Depth payloads of these versions are raw `u16` buffers
    #[must_use]
    pub fn is_ir(&self) -> bool {
        self.0.starts_with("ir")
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Aggregate root for one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub id: String,
    pub version: ScanVersion,
    #[serde(rename = "type", deserialize_with = "string_or_number")]
    pub scan_type: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub results: Vec<PostedResult>,
    #[serde(default)]
    pub person: Option<String>,
}

impl ScanMetadata {
    /// Classify this scan's type code
    pub fn classify(&self) -> Result<ScanType, UnknownScanTypeError> {
        ScanType::classify(&self.scan_type)
    }

    /// Fill `scan_id` on artifacts that arrived without one
    pub fn attach_scan_ids(&mut self) {
        for artifact in &mut self.artifacts {
            if artifact.scan_id.is_empty() {
                artifact.scan_id = self.id.clone();
            }
        }
    }

    /// Split artifacts into (rgb, depth), preserving capture order within each list.
    ///
    /// Artifacts of unrecognised formats are dropped.
    #[must_use]
    pub fn partition_artifacts(&self) -> (Vec<Artifact>, Vec<Artifact>) {
        let mut rgb = Vec::new();
        let mut depth = Vec::new();
        for artifact in &self.artifacts {
            match artifact.kind() {
                Some(ArtifactFormat::Rgb) => rgb.push(artifact.clone()),
                Some(ArtifactFormat::Depth) => depth.push(artifact.clone()),
                None => tracing::debug!(
                    "Ignoring artifact {} with format {}",
                    artifact.id,
                    artifact.format
                ),
            }
        }
        (rgb, depth)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Text(String),
        Int(i64),
    }

    Ok(match Code::deserialize(deserializer)? {
        Code::Text(s) => s,
        Code::Int(n) => n.to_string(),
    })
}
