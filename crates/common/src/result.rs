//! Result records posted to the scan API and the idempotency view over
//! already-posted ones

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::{ProcessingError, Result};

/// Payload of a result: either a posted file reference or a data map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultPayload {
    File(String),
    Data(serde_json::Value),
}

/// A result record as posted to the scan API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    pub scan: String,
    pub workflow: String,
    pub source_artifacts: Vec<String>,
    pub source_results: Vec<String>,
    pub generated: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: ResultPayload,
}

/// Builds result records for one (scan, workflow) pair.
///
/// The start time is captured when the builder is created, so every record
/// built by one flow run shares it.
#[derive(Debug, Clone)]
pub struct ResultBuilder {
    scan_id: String,
    workflow_id: String,
    start_time: DateTime<Utc>,
}

impl ResultBuilder {
    #[must_use]
    pub fn new(scan_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            workflow_id: workflow_id.into(),
            start_time: Utc::now(),
        }
    }

    #[must_use]
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Data result for a single artifact
    pub fn artifact_data<T: Serialize>(&self, artifact_id: &str, data: &T) -> Result<ResultRecord> {
        let data = serde_json::to_value(data)?;
        self.build(vec![artifact_id.to_string()], ResultPayload::Data(data))
    }

    /// File result for a single artifact
    pub fn artifact_file(&self, artifact_id: &str, file_id: impl Into<String>) -> Result<ResultRecord> {
        self.build(
            vec![artifact_id.to_string()],
            ResultPayload::File(file_id.into()),
        )
    }

    /// Data result derived from several artifacts (pairs, scan-level aggregates)
    pub fn multi_data<T: Serialize>(
        &self,
        source_artifacts: Vec<String>,
        data: &T,
    ) -> Result<ResultRecord> {
        let data = serde_json::to_value(data)?;
        self.build(source_artifacts, ResultPayload::Data(data))
    }

    fn build(&self, source_artifacts: Vec<String>, payload: ResultPayload) -> Result<ResultRecord> {
        if source_artifacts.is_empty() {
            return Err(ProcessingError::EmptyResultSources(self.scan_id.clone()));
        }
        let now = Utc::now();
        Ok(ResultRecord {
            id: Uuid::new_v4().to_string(),
            scan: self.scan_id.clone(),
            workflow: self.workflow_id.clone(),
            source_artifacts,
            source_results: Vec::new(),
            generated: now,
            start_time: self.start_time,
            end_time: now,
            payload,
        })
    }
}

/// A result already stored for a scan, as returned inside scan metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedResult {
    pub id: String,
    pub workflow: String,
    #[serde(default)]
    pub source_artifacts: Vec<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub file: Option<String>,
}

/// Workflow → covered artifact ids, built from a scan's existing results
#[derive(Debug, Clone, Default)]
pub struct ExistingResults {
    covered: HashMap<String, HashSet<String>>,
}

impl ExistingResults {
    #[must_use]
    pub fn new(results: &[PostedResult]) -> Self {
        let mut covered: HashMap<String, HashSet<String>> = HashMap::new();
        for result in results {
            covered
                .entry(result.workflow.clone())
                .or_default()
                .extend(result.source_artifacts.iter().cloned());
        }
        Self { covered }
    }

    /// True when the workflow has at least one posted result for this scan
    #[must_use]
    pub fn check_if_results_exists(&self, workflow_id: &str) -> bool {
        self.covered.contains_key(workflow_id)
    }

    /// True when an existing result of the workflow lists the artifact as a source
    #[must_use]
    pub fn covers(&self, workflow_id: &str, artifact_id: &str) -> bool {
        self.covered
            .get(workflow_id)
            .is_some_and(|ids| ids.contains(artifact_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_data_shape() {
        let builder = ResultBuilder::new("scan-1", "wf-1");
        let record = builder
            .artifact_data("a1", &serde_json::json!({"faces_detected": 2}))
            .unwrap();

        let json = serde_json::to_value(&record).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "id",
            "scan",
            "workflow",
            "source_artifacts",
            "source_results",
            "generated",
            "start_time",
            "end_time",
            "data",
        ] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert!(!obj.contains_key("file"));
        assert_eq!(obj["data"]["faces_detected"], 2);
        assert_eq!(obj["source_artifacts"], serde_json::json!(["a1"]));
    }

    #[test]
    fn test_file_result_has_no_data() {
        let builder = ResultBuilder::new("scan-1", "wf-1");
        let record = builder.artifact_file("a1", "file-9").unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["file"], "file-9");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_empty_sources_rejected() {
        let builder = ResultBuilder::new("scan-1", "wf-1");
        let err = builder
            .multi_data(Vec::new(), &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, ProcessingError::EmptyResultSources(_)));
    }

    #[test]
    fn test_record_ids_are_unique() {
        let builder = ResultBuilder::new("scan-1", "wf-1");
        let a = builder.artifact_file("a1", "f").unwrap();
        let b = builder.artifact_file("a1", "f").unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.start_time, b.start_time);
    }

    #[test]
    fn test_existing_results_coverage() {
        let existing = ExistingResults::new(&[PostedResult {
            id: "r1".into(),
            workflow: "wf-blur".into(),
            source_artifacts: vec!["a1".into()],
            data: None,
            file: Some("f1".into()),
        }]);

        assert!(existing.check_if_results_exists("wf-blur"));
        assert!(!existing.check_if_results_exists("wf-pose"));
        assert!(existing.covers("wf-blur", "a1"));
        assert!(!existing.covers("wf-blur", "a2"));
        assert!(!existing.covers("wf-pose", "a1"));
    }
}
