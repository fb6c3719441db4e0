//! Depth frame quality features: missing-reading share and floor angle

use async_trait::async_trait;
use cgm_rg_common::ResultBuilder;
use cgm_rg_depthmap::codec::percentage_of_zero;
use cgm_rg_depthmap::geometry::floor_angle;
use serde::Serialize;
use tracing::warn;

use crate::depth::{decode_depth, DecodedDepth};
use crate::{blocking, AnalysisFlow, FlowContext, FlowError, FlowReport, FlowRun};

/// Frames tilted further up than this (degrees) are not usable
pub const MAX_FLOOR_ANGLE: f64 = 10.0;
/// Frames tilted further down than this (degrees) are not usable
pub const MIN_FLOOR_ANGLE: f64 = -20.0;
/// Frames with a larger share of missing readings (percent) are not usable
pub const MAX_ZERO_PERCENTAGE: f64 = 15.0;

pub struct DepthFeatureFlow;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DepthFeatures {
    pub percentage_of_zero: f64,
    /// Absent when the artifact carries no device pose
    pub floor_angle: Option<f64>,
    pub usable: bool,
}

impl DepthFeatures {
    #[must_use]
    pub fn from_depth(depth: &DecodedDepth) -> Self {
        let zero = percentage_of_zero(&depth.samples);
        let angle = depth.device_pose.as_ref().map(floor_angle);
        let angle_ok = angle.map_or(true, |a| (MIN_FLOOR_ANGLE..=MAX_FLOOR_ANGLE).contains(&a));
        Self {
            percentage_of_zero: zero,
            floor_angle: angle,
            usable: angle_ok && zero <= MAX_ZERO_PERCENTAGE,
        }
    }
}

#[async_trait]
impl AnalysisFlow for DepthFeatureFlow {
    fn name(&self) -> &'static str {
        "depth_features"
    }

    async fn run(&self, ctx: &FlowContext) -> Result<FlowReport, FlowError> {
        let mut run = FlowRun::new(self.name());
        let workflow = ctx.workflow(&ctx.config.workflows.depth_features)?;
        let (pending, skipped) = ctx.pending(&ctx.depth, &workflow.id);
        run.fetched(skipped)?;
        if pending.is_empty() {
            return run.finish();
        }

        let results = ResultBuilder::new(ctx.scan_id(), &workflow.id);
        let mut records = Vec::with_capacity(pending.len());
        for artifact in pending {
            let payload = artifact.payload()?.clone();
            let version = ctx.scan.version.clone();
            let config = ctx.config.depth.clone();
            let features = blocking(move || {
                let depth = decode_depth(&payload, &version, &config)?;
                Ok(DepthFeatures::from_depth(&depth))
            })
            .await;
            match features {
                Ok(features) => records.push(results.artifact_data(&artifact.id, &features)?),
                Err(FlowError::Decode(e)) => {
                    warn!("Skipping undecodable depth artifact {}: {}", artifact.id, e);
                }
                Err(e) => return Err(e),
            }
        }
        run.computed()?;
        run.record_posted(ctx.post(&records).await?);
        run.finish()
    }
}
