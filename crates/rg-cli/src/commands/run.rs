//! Run command: process scans end to end

use anyhow::{bail, Context as _, Result};
use cgm_rg_api::HttpScanApi;
use cgm_rg_common::PipelineConfig;
use cgm_rg_inference::{HttpInference, RateLimitedInference};
use cgm_rg_orchestrator::ScanOrchestrator;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Args)]
pub struct RunCommand {
    /// Scan ids to process
    #[arg(value_name = "SCAN_ID", required = true)]
    scan_ids: Vec<String>,

    /// Pipeline configuration (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override max_concurrent_scans from the configuration
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Print the batch report as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl RunCommand {
    pub async fn execute(self) -> Result<()> {
        let mut config = PipelineConfig::from_yaml(&self.config)
            .with_context(|| format!("Failed to load config {}", self.config.display()))?;
        if let Some(max_concurrent) = self.max_concurrent {
            config.max_concurrent_scans = max_concurrent;
            config.validate().context("Invalid --max-concurrent")?;
        }

        let api = Arc::new(HttpScanApi::new(&config.api).context("Failed to build scan API client")?);
        let http = Arc::new(
            HttpInference::new(&config.inference).context("Failed to build inference client")?,
        );
        let inference = Arc::new(RateLimitedInference::from_config(http, &config.inference));
        let orchestrator = ScanOrchestrator::new(api, inference, config);

        let start = Instant::now();
        let report = orchestrator.run(&self.scan_ids).await?;
        info!(
            "Processed {} scans in {:.2}s ({} completed, {} aborted, {} results posted)",
            report.scans.len(),
            start.elapsed().as_secs_f64(),
            report.completed(),
            report.aborted(),
            report.posted()
        );

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        if report.aborted() > 0 {
            bail!("{} of {} scans aborted", report.aborted(), report.scans.len());
        }
        Ok(())
    }
}
