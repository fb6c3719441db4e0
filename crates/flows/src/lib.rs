//! Analysis flows
//!
//! Each flow turns a scan's fetched artifacts into posted results for one
//! (or a pair of) workflows. Flows share a [`FlowContext`], skip artifacts
//! that already have results, and report what they did in a [`FlowReport`].
//!
//! | Flow | Input | Results |
//! |------|-------|---------|
//! | [`BlurFlow`] | rgb | blurred image file, face detection data |
//! | [`PoseFlow`] | rgb | keypoints per detected person |
//! | [`StandingLayingFlow`] | rgb | standing probability |
//! | [`DepthImageFlow`] | depth | grayscale PNG |
//! | [`DepthFeatureFlow`] | depth | zero percentage, floor angle |
//! | [`AlignmentFlow`] | rgb + depth pairs | edge SSIM |
//! | [`HeightWeightFlow`] | depth | prediction per artifact, scan mean |

pub mod aggregate;
pub mod alignment;
pub mod blur;
pub mod context;
pub mod depth;
pub mod depth_features;
pub mod depth_image;
pub mod height_weight;
pub mod pose;
pub mod standing;
pub mod state;

use async_trait::async_trait;
use cgm_rg_api::ApiError;
use cgm_rg_common::ProcessingError;
use cgm_rg_depthmap::{DecodeError, InpaintError};
use cgm_rg_imaging::ImagingError;
use cgm_rg_inference::InferenceError;
use thiserror::Error;

pub use alignment::AlignmentFlow;
pub use blur::BlurFlow;
pub use context::FlowContext;
pub use depth_features::DepthFeatureFlow;
pub use depth_image::DepthImageFlow;
pub use height_weight::{HeightWeightFlow, Target};
pub use pose::PoseFlow;
pub use standing::StandingLayingFlow;
pub use state::{FlowReport, FlowRun, FlowState};

#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("Scan API error: {0}")]
    Api(#[from] ApiError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Depth decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Inpainting error: {0}")]
    Inpaint(#[from] InpaintError),

    #[error("Image error: {0}")]
    Imaging(#[from] ImagingError),

    #[error("Invalid flow transition: {from:?} -> {to:?}")]
    InvalidTransition { from: FlowState, to: FlowState },

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One analysis flow
///
/// Implementations must not post a result that references only artifacts
/// already covered by an existing result of the same workflow.
#[async_trait]
pub trait AnalysisFlow: Send + Sync {
    /// Flow name used in logs and reports
    fn name(&self) -> &'static str;

    /// Compute and post this flow's results for the scan in `ctx`
    async fn run(&self, ctx: &FlowContext) -> Result<FlowReport, FlowError>;
}

/// Run CPU-bound work on the blocking pool
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, FlowError>
where
    F: FnOnce() -> Result<T, FlowError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// The standard set of flows, in the order they are spawned
#[must_use]
pub fn default_flows() -> Vec<std::sync::Arc<dyn AnalysisFlow>> {
    vec![
        std::sync::Arc::new(BlurFlow),
        std::sync::Arc::new(PoseFlow),
        std::sync::Arc::new(StandingLayingFlow),
        std::sync::Arc::new(DepthImageFlow),
        std::sync::Arc::new(DepthFeatureFlow),
        std::sync::Arc::new(AlignmentFlow),
        std::sync::Arc::new(HeightWeightFlow::new(Target::Height)),
        std::sync::Arc::new(HeightWeightFlow::new(Target::Weight)),
    ]
}
