//! RGB / depth alignment check
//!
//! Depth artifacts are paired with the rgb artifact of the same scan and
//! capture order. Depth artifacts without a partner are skipped silently.

use async_trait::async_trait;
use cgm_rg_common::{Artifact, ResultBuilder};
use cgm_rg_depthmap::transform::to_grayscale;
use cgm_rg_imaging::alignment::check_rgb_depth_alignment;
use cgm_rg_imaging::decode_rgb;
use tracing::{debug, warn};

use crate::depth::decode_depth;
use crate::{blocking, AnalysisFlow, FlowContext, FlowError, FlowReport, FlowRun};

pub struct AlignmentFlow;

/// The rgb artifact captured together with `depth`, matched on (scan, order)
#[must_use]
pub fn matching_rgb<'a>(rgb: &'a [Artifact], depth: &Artifact) -> Option<&'a Artifact> {
    let order = depth.order?;
    rgb.iter()
        .find(|candidate| candidate.order == Some(order) && candidate.scan_id == depth.scan_id)
}

#[async_trait]
impl AnalysisFlow for AlignmentFlow {
    fn name(&self) -> &'static str {
        "alignment"
    }

    async fn run(&self, ctx: &FlowContext) -> Result<FlowReport, FlowError> {
        let mut run = FlowRun::new(self.name());
        let workflow = ctx.workflow(&ctx.config.workflows.alignment)?;
        let (pending, skipped) = ctx.pending(&ctx.depth, &workflow.id);
        run.fetched(skipped)?;
        if pending.is_empty() {
            return run.finish();
        }

        let results = ResultBuilder::new(ctx.scan_id(), &workflow.id);
        let max_depth = ctx.scan_type.pose.max_depth();
        let mut records = Vec::new();
        for depth_artifact in pending {
            let Some(rgb_artifact) = matching_rgb(&ctx.rgb, depth_artifact) else {
                debug!(
                    "No rgb artifact matches depth artifact {} (order {:?})",
                    depth_artifact.id, depth_artifact.order
                );
                continue;
            };

            let depth_payload = depth_artifact.payload()?.clone();
            let rgb_payload = rgb_artifact.payload()?.clone();
            let version = ctx.scan.version.clone();
            let config = ctx.config.depth.clone();
            let report = blocking(move || {
                let depth = decode_depth(&depth_payload, &version, &config)?;
                let depth_image = to_grayscale(&depth.samples, max_depth);
                let rgb = decode_rgb(&rgb_payload)?;
                Ok(check_rgb_depth_alignment(&rgb, &depth_image))
            })
            .await;

            match report {
                Ok(report) => records.push(results.multi_data(
                    vec![rgb_artifact.id.clone(), depth_artifact.id.clone()],
                    &report,
                )?),
                Err(FlowError::Decode(e)) => {
                    warn!(
                        "Skipping undecodable depth artifact {}: {}",
                        depth_artifact.id, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        run.computed()?;
        run.record_posted(ctx.post(&records).await?);
        run.finish()
    }
}
