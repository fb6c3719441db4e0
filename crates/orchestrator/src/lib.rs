//! Scan Orchestrator
//!
//! Runs result generation for a batch of scans. The workflow registry is
//! fetched once per batch; each scan is fetched, its artifacts downloaded,
//! and every analysis flow spawned as its own task. A failing flow is logged
//! and reported without affecting its siblings. An unknown scan type aborts
//! that scan only.

use cgm_rg_api::{ApiError, ArtifactFetcher, ScanApi};
use cgm_rg_common::{PipelineConfig, ProcessingError, UnknownScanTypeError, WorkflowRegistry};
use cgm_rg_flows::{default_flows, AnalysisFlow, FlowContext, FlowError, FlowReport, FlowState};
use cgm_rg_inference::InferenceService;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that abort a scan (or, for the registry, the whole batch)
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Scan API error: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    UnknownScanType(#[from] UnknownScanTypeError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScanStatus {
    Completed,
    Aborted { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub status: ScanStatus,
    pub flows: Vec<FlowReport>,
}

impl ScanReport {
    #[must_use]
    pub fn failed_flows(&self) -> usize {
        self.flows
            .iter()
            .filter(|flow| flow.state == FlowState::Failed)
            .count()
    }
}

/// Outcome of one [`ScanOrchestrator::run`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub scans: Vec<ScanReport>,
}

impl BatchReport {
    #[must_use]
    pub fn completed(&self) -> usize {
        self.scans
            .iter()
            .filter(|scan| scan.status == ScanStatus::Completed)
            .count()
    }

    #[must_use]
    pub fn aborted(&self) -> usize {
        self.scans.len() - self.completed()
    }

    /// Result records posted across all scans
    #[must_use]
    pub fn posted(&self) -> usize {
        self.scans
            .iter()
            .flat_map(|scan| &scan.flows)
            .map(|flow| flow.posted)
            .sum()
    }

    #[must_use]
    pub fn scan(&self, scan_id: &str) -> Option<&ScanReport> {
        self.scans.iter().find(|scan| scan.scan_id == scan_id)
    }
}

/// Drives all analysis flows for batches of scans
pub struct ScanOrchestrator {
    api: Arc<dyn ScanApi>,
    inference: Arc<dyn InferenceService>,
    config: Arc<PipelineConfig>,
    fetcher: ArtifactFetcher,
    flows: Vec<Arc<dyn AnalysisFlow>>,
}

impl ScanOrchestrator {
    /// Create an orchestrator running the standard flows
    #[must_use]
    pub fn new(
        api: Arc<dyn ScanApi>,
        inference: Arc<dyn InferenceService>,
        config: PipelineConfig,
    ) -> Self {
        let fetcher = ArtifactFetcher::new(Arc::clone(&api), config.decryption_key.clone());
        Self {
            api,
            inference,
            config: Arc::new(config),
            fetcher,
            flows: default_flows(),
        }
    }

    /// Replace the set of flows
    #[must_use]
    pub fn with_flows(mut self, flows: Vec<Arc<dyn AnalysisFlow>>) -> Self {
        self.flows = flows;
        self
    }

    /// Process every scan in `scan_ids`.
    ///
    /// At most `max_concurrent_scans` scans are in flight. Scan-level failures
    /// are recorded in the report.
    ///
    /// # Errors
    /// Returns an error only if the workflow registry cannot be fetched or is
    /// inconsistent.
    pub async fn run(&self, scan_ids: &[String]) -> Result<BatchReport, OrchestratorError> {
        info!("Starting result generation for {} scans", scan_ids.len());
        let registry = Arc::new(WorkflowRegistry::new(self.api.get_workflows().await?)?);
        debug!("Workflow registry holds {} workflows", registry.len());

        let scans: Vec<ScanReport> = stream::iter(scan_ids)
            .map(|scan_id| {
                let registry = Arc::clone(&registry);
                async move {
                    match self.process_scan(scan_id, registry).await {
                        Ok(flows) => ScanReport {
                            scan_id: scan_id.clone(),
                            status: ScanStatus::Completed,
                            flows,
                        },
                        Err(e) => {
                            error!("Aborting scan {}: {}", scan_id, e);
                            ScanReport {
                                scan_id: scan_id.clone(),
                                status: ScanStatus::Aborted {
                                    reason: e.to_string(),
                                },
                                flows: Vec::new(),
                            }
                        }
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrent_scans.max(1))
            .collect()
            .await;

        let report = BatchReport { scans };
        info!(
            "Result generation complete: {}/{} scans completed, {} results posted",
            report.completed(),
            report.scans.len(),
            report.posted()
        );
        Ok(report)
    }

    /// Fetch, classify and download one scan, then run its flows
    async fn process_scan(
        &self,
        scan_id: &str,
        registry: Arc<WorkflowRegistry>,
    ) -> Result<Vec<FlowReport>, OrchestratorError> {
        info!("Processing scan {}", scan_id);
        let mut scan = self.api.get_scan_metadata(scan_id).await?;
        scan.attach_scan_ids();
        let scan_type = scan.classify()?;
        debug!("Scan {} is {} ({})", scan_id, scan_type.pose, scan_type.code);

        scan.artifacts.retain(|artifact| artifact.kind().is_some());
        self.fetcher
            .fetch_all(&mut scan.artifacts, &scan.version)
            .await?;

        let ctx = Arc::new(FlowContext::new(
            scan,
            registry,
            Arc::clone(&self.config),
            Arc::clone(&self.api),
            Arc::clone(&self.inference),
        )?);
        Ok(self.run_flows(ctx).await)
    }

    /// Spawn every flow and collect the reports; failures stay per flow
    async fn run_flows(&self, ctx: Arc<FlowContext>) -> Vec<FlowReport> {
        let mut handles = Vec::with_capacity(self.flows.len());
        for flow in &self.flows {
            let flow = Arc::clone(flow);
            let ctx = Arc::clone(&ctx);
            let name = flow.name();
            handles.push((name, tokio::spawn(async move { flow.run(&ctx).await })));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let report = match handle.await {
                Ok(Ok(report)) => {
                    info!(
                        "Scan {}: flow {} posted {} results ({} skipped)",
                        ctx.scan_id(),
                        name,
                        report.posted,
                        report.skipped
                    );
                    report
                }
                Ok(Err(e)) => {
                    error!("Scan {}: flow {} failed: {}", ctx.scan_id(), name, e);
                    FlowReport::failed(name)
                }
                Err(e) => {
                    error!("Scan {}: flow {} panicked: {}", ctx.scan_id(), name, e);
                    FlowReport::failed(name)
                }
            };
            reports.push(report);
        }

        let failed = reports
            .iter()
            .filter(|report| report.state == FlowState::Failed)
            .count();
        if failed > 0 {
            warn!(
                "Scan {} finished with {}/{} failed flows",
                ctx.scan_id(),
                failed,
                reports.len()
            );
        }
        reports
    }
}
