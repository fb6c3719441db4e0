//! Per-scan state shared by all flows of that scan

use cgm_rg_api::ScanApi;
use cgm_rg_common::config::WorkflowRef;
use cgm_rg_common::{
    Artifact, ExistingResults, PipelineConfig, ResultRecord, ScanMetadata, ScanType, Workflow,
    WorkflowRegistry,
};
use cgm_rg_inference::InferenceService;
use std::sync::Arc;
use tracing::{debug, info};

use crate::FlowError;

/// Read-only view of one scan plus the collaborators flows call
#[derive(Clone)]
pub struct FlowContext {
    pub scan: Arc<ScanMetadata>,
    pub scan_type: ScanType,
    pub rgb: Arc<Vec<Artifact>>,
    pub depth: Arc<Vec<Artifact>>,
    pub existing: Arc<ExistingResults>,
    pub registry: Arc<WorkflowRegistry>,
    pub config: Arc<PipelineConfig>,
    pub api: Arc<dyn ScanApi>,
    pub inference: Arc<dyn InferenceService>,
}

impl FlowContext {
    /// Build the context for a scan whose artifacts have been fetched
    ///
    /// # Errors
    /// Returns [`cgm_rg_common::UnknownScanTypeError`] (as a processing error)
    /// if the scan type cannot be classified.
    pub fn new(
        scan: ScanMetadata,
        registry: Arc<WorkflowRegistry>,
        config: Arc<PipelineConfig>,
        api: Arc<dyn ScanApi>,
        inference: Arc<dyn InferenceService>,
    ) -> Result<Self, FlowError> {
        let scan_type = scan.classify().map_err(cgm_rg_common::ProcessingError::from)?;
        let (rgb, depth) = scan.partition_artifacts();
        let existing = ExistingResults::new(&scan.results);
        Ok(Self {
            scan: Arc::new(scan),
            scan_type,
            rgb: Arc::new(rgb),
            depth: Arc::new(depth),
            existing: Arc::new(existing),
            registry,
            config,
            api,
            inference,
        })
    }

    #[must_use]
    pub fn scan_id(&self) -> &str {
        &self.scan.id
    }

    /// Resolve a configured workflow in the registry snapshot
    pub fn workflow(&self, reference: &WorkflowRef) -> Result<&Workflow, FlowError> {
        Ok(self
            .registry
            .resolve(&reference.name, &reference.version)?)
    }

    /// Artifacts without an existing result of `workflow_id`, and the skip count
    #[must_use]
    pub fn pending<'a>(
        &self,
        artifacts: &'a [Artifact],
        workflow_id: &str,
    ) -> (Vec<&'a Artifact>, usize) {
        let pending: Vec<&Artifact> = artifacts
            .iter()
            .filter(|artifact| !self.existing.covers(workflow_id, &artifact.id))
            .collect();
        let skipped = artifacts.len() - pending.len();
        if skipped > 0 {
            info!(
                "Scan {}: skipping {} artifacts with existing {} results",
                self.scan_id(),
                skipped,
                workflow_id
            );
        }
        (pending, skipped)
    }

    /// True when the scan already has a result of `workflow_id`
    #[must_use]
    pub fn already_processed(&self, workflow_id: &str) -> bool {
        let exists = self.existing.check_if_results_exists(workflow_id);
        if exists {
            info!(
                "Scan {}: results for workflow {} already exist, skipping",
                self.scan_id(),
                workflow_id
            );
        }
        exists
    }

    /// Post a batch of records; an empty batch is not sent
    pub async fn post(&self, records: &[ResultRecord]) -> Result<usize, FlowError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.api.post_results(records).await?;
        debug!("Scan {}: posted {} results", self.scan_id(), records.len());
        Ok(records.len())
    }
}

/// Service name used for inference calls of a workflow
#[must_use]
pub fn service_name(workflow: &Workflow) -> &str {
    workflow
        .data
        .service_name
        .as_deref()
        .unwrap_or(&workflow.name)
}

/// String option from a workflow's metadata, or `default`
#[must_use]
pub fn workflow_option<'a>(workflow: &'a Workflow, key: &str, default: &'a str) -> &'a str {
    workflow
        .data
        .extra
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or(default)
}
