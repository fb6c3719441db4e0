//! Child growth scan result generation
//!
//! Facade over the workspace crates:
//!
//! - [`common`]: scan, artifact, workflow and result models plus configuration
//! - [`depthmap`]: depth artifact codec, device pose geometry, model input transforms and inpainting
//! - [`imaging`]: rgb orientation, face blurring, pose crops and rgb/depth alignment
//! - [`api`]: scan API client and artifact fetching
//! - [`inference`]: model service clients with retry and rate limiting
//! - [`flows`]: the per-scan analysis flows
//! - [`orchestrator`]: batch driver running every flow for every scan
//!
//! ```no_run
//! use std::sync::Arc;
//! use cgm_result_generation::{api, common, inference, orchestrator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = common::PipelineConfig::from_yaml("config.yaml")?;
//! let scan_api = Arc::new(api::HttpScanApi::new(&config.api)?);
//! let http = Arc::new(inference::HttpInference::new(&config.inference)?);
//! let models = Arc::new(inference::RateLimitedInference::from_config(http, &config.inference));
//! let report = orchestrator::ScanOrchestrator::new(scan_api, models, config)
//!     .run(&["scan-id".to_string()])
//!     .await?;
//! println!("{} results posted", report.posted());
//! # Ok(())
//! # }
//! ```

pub use cgm_rg_api as api;
pub use cgm_rg_common as common;
pub use cgm_rg_depthmap as depthmap;
pub use cgm_rg_flows as flows;
pub use cgm_rg_imaging as imaging;
pub use cgm_rg_inference as inference;
pub use cgm_rg_orchestrator as orchestrator;

pub use cgm_rg_orchestrator::{BatchReport, ScanOrchestrator, ScanReport, ScanStatus};
