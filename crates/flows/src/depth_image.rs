//! Grayscale previews of depth artifacts

use async_trait::async_trait;
use bytes::Bytes;
use cgm_rg_common::ResultBuilder;
use cgm_rg_depthmap::transform::to_grayscale;
use cgm_rg_imaging::encode_image;
use image::{DynamicImage, ImageFormat};
use tracing::warn;

use crate::depth::decode_depth;
use crate::{blocking, AnalysisFlow, FlowContext, FlowError, FlowReport, FlowRun};

/// Posts one PNG per depth artifact. Scan-level idempotency: the whole flow is
/// skipped once any result of its workflow exists.
pub struct DepthImageFlow;

#[async_trait]
impl AnalysisFlow for DepthImageFlow {
    fn name(&self) -> &'static str {
        "depth_image"
    }

    async fn run(&self, ctx: &FlowContext) -> Result<FlowReport, FlowError> {
        let mut run = FlowRun::new(self.name());
        let workflow = ctx.workflow(&ctx.config.workflows.depth_image)?;
        if ctx.already_processed(&workflow.id) {
            run.fetched(ctx.depth.len())?;
            return run.finish();
        }
        run.fetched(0)?;

        let results = ResultBuilder::new(ctx.scan_id(), &workflow.id);
        let max_depth = ctx.scan_type.pose.max_depth();
        let mut records = Vec::with_capacity(ctx.depth.len());
        for artifact in ctx.depth.iter() {
            let payload = artifact.payload()?.clone();
            let version = ctx.scan.version.clone();
            let config = ctx.config.depth.clone();
            let png = blocking(move || {
                let depth = decode_depth(&payload, &version, &config)?;
                let image = to_grayscale(&depth.samples, max_depth);
                Ok(encode_image(DynamicImage::ImageLuma8(image), ImageFormat::Png)?)
            })
            .await;

            let png = match png {
                Ok(png) => png,
                Err(FlowError::Decode(e)) => {
                    warn!("Skipping undecodable depth artifact {}: {}", artifact.id, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let file_id = ctx.api.post_file(Bytes::from(png), "image/png").await?;
            records.push(results.artifact_file(&artifact.id, file_id)?);
        }
        run.computed()?;
        run.record_posted(ctx.post(&records).await?);
        run.finish()
    }
}
