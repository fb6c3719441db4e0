//! Shared fixtures for integration tests: in-memory scan API, canned model
//! responses, and artifact payload builders.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use cgm_result_generation::api::{ApiError, ScanApi};
use cgm_result_generation::common::{
    Artifact, PipelineConfig, PostedResult, ResultPayload, ResultRecord, ScanMetadata, ScanVersion,
    Workflow, WorkflowMeta,
};
use cgm_result_generation::depthmap::codec::encode;
use cgm_result_generation::depthmap::DepthHeader;
use cgm_result_generation::imaging::BoundingBox;
use cgm_result_generation::inference::{
    FaceDetection, InferenceError, InferenceService, PersonDetection,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{Array2, Array3, Array4};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const DEPTH_WIDTH: usize = 8;
pub const DEPTH_HEIGHT: usize = 6;

/// Registry id of a configured workflow name
pub fn workflow_id(name: &str) -> String {
    format!("wf-{name}")
}

/// One registered workflow per configured flow, all at the default version
pub fn registry(config: &PipelineConfig) -> Vec<Workflow> {
    let w = &config.workflows;
    [
        &w.blur,
        &w.faces,
        &w.pose,
        &w.standing_laying,
        &w.depth_image,
        &w.depth_features,
        &w.alignment,
        &w.height,
        &w.height_mean,
        &w.weight,
        &w.weight_mean,
    ]
    .into_iter()
    .map(|reference| Workflow {
        id: workflow_id(&reference.name),
        name: reference.name.clone(),
        version: reference.version.clone(),
        data: WorkflowMeta::default(),
    })
    .collect()
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        max_concurrent_scans: 2,
        ..PipelineConfig::default()
    }
}

pub fn jpeg(width: u32, height: u32) -> Bytes {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 4) as u8, (y * 4) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    Bytes::from(out.into_inner())
}

/// Depth zip with a level device pose and every sample at `meters`
pub fn depth_zip(meters: f32) -> Bytes {
    let header = DepthHeader {
        width: DEPTH_WIDTH,
        height: DEPTH_HEIGHT,
        depth_scale: 0.001,
        max_confidence: 7.0,
        rotation: Some([0.0, 0.0, 0.0, 1.0]),
        position: Some([0.0, 1.0, 0.0]),
    };
    let samples = Array2::from_elem((DEPTH_WIDTH, DEPTH_HEIGHT), meters);
    Bytes::from(encode(&header, &samples, None).unwrap())
}

pub fn artifact(id: &str, format: &str, order: i64) -> Artifact {
    Artifact {
        id: id.to_string(),
        format: format.to_string(),
        file: format!("file-{id}"),
        order: Some(order),
        scan_id: String::new(),
        raw_file: None,
    }
}

/// A scan with `pairs` rgb/depth artifact pairs (`rgb-i` / `depth-i`)
pub fn scan(id: &str, scan_type: &str, pairs: usize) -> ScanMetadata {
    let mut artifacts = Vec::with_capacity(pairs * 2);
    for i in 0..pairs {
        artifacts.push(artifact(&format!("{id}-rgb-{i}"), "rgb", i as i64));
        artifacts.push(artifact(&format!("{id}-depth-{i}"), "depth", i as i64));
    }
    ScanMetadata {
        id: id.to_string(),
        version: ScanVersion("v1.0".to_string()),
        scan_type: scan_type.to_string(),
        artifacts,
        results: Vec::new(),
        person: Some("person-1".to_string()),
    }
}

pub fn existing_result(workflow: &str, artifacts: &[&str]) -> PostedResult {
    PostedResult {
        id: format!("existing-{workflow}"),
        workflow: workflow_id(workflow),
        source_artifacts: artifacts.iter().map(|a| (*a).to_string()).collect(),
        data: Some(serde_json::json!({})),
        file: None,
    }
}

/// In-memory scan API that records everything posted to it
#[derive(Default)]
pub struct MockScanApi {
    scans: HashMap<String, ScanMetadata>,
    workflows: Vec<Workflow>,
    files: HashMap<String, Bytes>,
    /// Result posts for this workflow id are rejected
    reject_workflow: Option<String>,
    next_file: AtomicUsize,
    pub posted_results: Mutex<Vec<ResultRecord>>,
    pub posted_files: Mutex<Vec<(String, Bytes)>>,
}

impl MockScanApi {
    pub fn new(workflows: Vec<Workflow>) -> Self {
        Self {
            workflows,
            ..Self::default()
        }
    }

    /// Register a scan and fill payloads for its artifacts
    pub fn with_scan(mut self, scan: ScanMetadata) -> Self {
        for artifact in &scan.artifacts {
            let payload = match artifact.format.as_str() {
                "rgb" => jpeg(64, 48),
                "depth" => depth_zip(1.2),
                _ => continue,
            };
            self.files.entry(artifact.file.clone()).or_insert(payload);
        }
        self.scans.insert(scan.id.clone(), scan);
        self
    }

    pub fn with_file(mut self, file_id: &str, payload: Bytes) -> Self {
        self.files.insert(file_id.to_string(), payload);
        self
    }

    pub fn rejecting_results_for(mut self, workflow_id: String) -> Self {
        self.reject_workflow = Some(workflow_id);
        self
    }

    pub fn results(&self) -> Vec<ResultRecord> {
        self.posted_results.lock().unwrap().clone()
    }

    pub fn results_for(&self, workflow_name: &str) -> Vec<ResultRecord> {
        let id = workflow_id(workflow_name);
        self.results()
            .into_iter()
            .filter(|record| record.workflow == id)
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.posted_files.lock().unwrap().len()
    }
}

#[async_trait]
impl ScanApi for MockScanApi {
    async fn get_scan_metadata(&self, scan_id: &str) -> Result<ScanMetadata, ApiError> {
        self.scans
            .get(scan_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("/api/scans/{scan_id}")))
    }

    async fn get_workflows(&self) -> Result<Vec<Workflow>, ApiError> {
        Ok(self.workflows.clone())
    }

    async fn get_file(&self, file_id: &str) -> Result<Bytes, ApiError> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("/api/files/{file_id}")))
    }

    async fn post_file(&self, data: Bytes, mime_type: &str) -> Result<String, ApiError> {
        let id = self.next_file.fetch_add(1, Ordering::SeqCst);
        self.posted_files
            .lock()
            .unwrap()
            .push((mime_type.to_string(), data));
        Ok(format!("posted-{id}"))
    }

    async fn post_results(&self, results: &[ResultRecord]) -> Result<(), ApiError> {
        if let Some(rejected) = &self.reject_workflow {
            if results.iter().any(|record| &record.workflow == rejected) {
                return Err(ApiError::Status {
                    method: "POST",
                    url: "/api/results".to_string(),
                    status: 500,
                    body: "rejected".to_string(),
                });
            }
        }
        self.posted_results
            .lock()
            .unwrap()
            .extend_from_slice(results);
        Ok(())
    }
}

/// Deterministic model responses
#[derive(Default)]
pub struct MockInference {
    pub fail_faces: bool,
    pub regress_calls: AtomicUsize,
}

impl MockInference {
    pub fn failing_faces() -> Self {
        Self {
            fail_faces: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl InferenceService for MockInference {
    async fn detect_faces(
        &self,
        service: &str,
        _image: Bytes,
    ) -> Result<Vec<FaceDetection>, InferenceError> {
        if self.fail_faces {
            return Err(InferenceError::Status {
                service: service.to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(vec![FaceDetection {
            bbox: BoundingBox::new(4.0, 4.0, 20.0, 20.0),
            confidence: 0.93,
            attributes: serde_json::Map::new(),
        }])
    }

    async fn detect_people(
        &self,
        _service: &str,
        _image: Bytes,
    ) -> Result<Vec<PersonDetection>, InferenceError> {
        Ok(vec![
            PersonDetection {
                bbox: BoundingBox::new(6.0, 8.0, 40.0, 58.0),
                score: 0.97,
            },
            PersonDetection {
                bbox: BoundingBox::new(0.0, 0.0, 5.0, 5.0),
                score: 0.2,
            },
        ])
    }

    async fn keypoint_heatmaps(
        &self,
        _service: &str,
        input: Array4<f32>,
    ) -> Result<Array3<f32>, InferenceError> {
        let (_, _, h, w) = input.dim();
        let mut heatmaps = Array3::zeros((17, h / 4, w / 4));
        for joint in 0..17 {
            heatmaps[[joint, h / 8, w / 8]] = 0.8;
        }
        Ok(heatmaps)
    }

    async fn classify_standing_laying(
        &self,
        _service: &str,
        batch: Array4<f32>,
    ) -> Result<Vec<f32>, InferenceError> {
        Ok(vec![0.8; batch.dim().0])
    }

    async fn regress(&self, _service: &str, batch: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        self.regress_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![95.0; batch.dim().0])
    }

    async fn segment_depth(
        &self,
        _service: &str,
        depth: Array2<f32>,
    ) -> Result<Array2<u8>, InferenceError> {
        Ok(Array2::from_elem(depth.dim(), 1))
    }
}

/// Source artifacts of every record, flattened
pub fn sources(records: &[ResultRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|record| record.source_artifacts.iter().cloned())
        .collect()
}

pub fn is_file(record: &ResultRecord) -> bool {
    matches!(record.payload, ResultPayload::File(_))
}
