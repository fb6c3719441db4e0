//! Face blurring
//!
//! Faces are detected on the image rotated for the scan's pose, blurred in
//! place, and the image is rotated back before upload. The blurred JPEG is a
//! `file` result of the blur workflow; the detections are a `data` result of
//! the faces workflow.

use async_trait::async_trait;
use bytes::Bytes;
use cgm_rg_common::{Artifact, ResultBuilder};
use cgm_rg_imaging::orientation::Rotation;
use cgm_rg_imaging::{blur::blur_regions, decode_rgb, encode_image};
use cgm_rg_inference::FaceDetection;
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use tracing::info;

use crate::context::service_name;
use crate::{blocking, AnalysisFlow, FlowContext, FlowError, FlowReport, FlowRun};

pub struct BlurFlow;

/// Data posted under the faces workflow
#[derive(Debug, Serialize)]
pub struct FaceReport {
    pub faces_detected: usize,
    pub faces: Vec<FaceDetection>,
}

#[async_trait]
impl AnalysisFlow for BlurFlow {
    fn name(&self) -> &'static str {
        "blur"
    }

    async fn run(&self, ctx: &FlowContext) -> Result<FlowReport, FlowError> {
        let mut run = FlowRun::new(self.name());
        let blur_workflow = ctx.workflow(&ctx.config.workflows.blur)?;
        let faces_workflow = ctx.workflow(&ctx.config.workflows.faces)?;
        let service = service_name(faces_workflow);
        let (pending, skipped) = ctx.pending(&ctx.rgb, &blur_workflow.id);
        run.fetched(skipped)?;
        if pending.is_empty() {
            return run.finish();
        }

        let blur_results = ResultBuilder::new(ctx.scan_id(), &blur_workflow.id);
        let face_results = ResultBuilder::new(ctx.scan_id(), &faces_workflow.id);
        let rotation = Rotation::for_pose(ctx.scan_type.pose);

        let mut file_records = Vec::with_capacity(pending.len());
        let mut face_records = Vec::with_capacity(pending.len());
        for artifact in pending {
            let (blurred, report) = blur_artifact(ctx, artifact, rotation, service).await?;
            let file_id = ctx.api.post_file(blurred, "image/jpeg").await?;
            file_records.push(blur_results.artifact_file(&artifact.id, file_id)?);
            if !ctx.existing.covers(&faces_workflow.id, &artifact.id) {
                face_records.push(face_results.artifact_data(&artifact.id, &report)?);
            }
        }
        run.computed()?;

        run.record_posted(ctx.post(&file_records).await?);
        run.record_posted(ctx.post(&face_records).await?);
        info!(
            "Scan {}: blurred {} images",
            ctx.scan_id(),
            file_records.len()
        );
        run.finish()
    }
}

/// Detect and blur faces of one artifact; returns the JPEG and the detections
async fn blur_artifact(
    ctx: &FlowContext,
    artifact: &Artifact,
    rotation: Rotation,
    service: &str,
) -> Result<(Bytes, FaceReport), FlowError> {
    let payload = artifact.payload()?.clone();
    let (rotated, jpeg) = blocking(move || {
        let rotated = rotation.apply(&decode_rgb(&payload)?);
        let jpeg = encode_image(DynamicImage::ImageRgb8(rotated.clone()), ImageFormat::Jpeg)?;
        Ok((rotated, jpeg))
    })
    .await?;

    let faces = ctx
        .inference
        .detect_faces(service, Bytes::from(jpeg))
        .await?;

    let boxes: Vec<_> = faces.iter().map(|face| face.bbox).collect();
    let blurred = blocking(move || {
        let mut image = rotated;
        blur_regions(&mut image, &boxes);
        let restored = rotation.inverse().apply(&image);
        Ok(encode_image(
            DynamicImage::ImageRgb8(restored),
            ImageFormat::Jpeg,
        )?)
    })
    .await?;

    Ok((
        Bytes::from(blurred),
        FaceReport {
            faces_detected: faces.len(),
            faces,
        },
    ))
}
