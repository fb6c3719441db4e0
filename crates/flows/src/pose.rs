//! Body keypoints
//!
//! Person boxes come from a detector run on the rotated image. Each box above
//! the score threshold is cropped, passed to the keypoint model, and the
//! decoded keypoints are mapped back to the unrotated artifact frame.

use async_trait::async_trait;
use bytes::Bytes;
use cgm_rg_common::{Artifact, ResultBuilder};
use cgm_rg_imaging::orientation::Rotation;
use cgm_rg_imaging::pose::{crop_to_tensor, keypoints_from_heatmaps, Keypoint, PersonCrop};
use cgm_rg_imaging::{decode_rgb, encode_image, BoundingBox};
use image::{DynamicImage, ImageFormat, RgbImage};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::context::{service_name, workflow_option};
use crate::{blocking, AnalysisFlow, FlowContext, FlowError, FlowReport, FlowRun};

const DEFAULT_DETECTOR_SERVICE: &str = "person_detection";

pub struct PoseFlow;

/// Keypoints of one detected person, in artifact pixel coordinates
#[derive(Debug, Clone, Serialize)]
pub struct PersonPose {
    pub bbox: BoundingBox,
    pub score: f32,
    pub keypoints: Vec<Keypoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoseReport {
    pub people_detected: usize,
    pub people: Vec<PersonPose>,
}

/// Map a box found on the rotated image back to the original frame
#[must_use]
pub fn unrotate_box(rotation: Rotation, bbox: &BoundingBox, width: u32, height: u32) -> BoundingBox {
    let (ax, ay) = rotation.unrotate_point(bbox.x1, bbox.y1, width, height);
    let (bx, by) = rotation.unrotate_point(bbox.x2, bbox.y2, width, height);
    BoundingBox::new(ax.min(bx), ay.min(by), ax.max(bx), ay.max(by))
}

#[async_trait]
impl AnalysisFlow for PoseFlow {
    fn name(&self) -> &'static str {
        "pose"
    }

    async fn run(&self, ctx: &FlowContext) -> Result<FlowReport, FlowError> {
        let mut run = FlowRun::new(self.name());
        let workflow = ctx.workflow(&ctx.config.workflows.pose)?;
        let (pending, skipped) = ctx.pending(&ctx.rgb, &workflow.id);
        run.fetched(skipped)?;
        if pending.is_empty() {
            return run.finish();
        }

        let results = ResultBuilder::new(ctx.scan_id(), &workflow.id);
        let mut records = Vec::with_capacity(pending.len());
        for artifact in pending {
            let report = estimate_pose(
                ctx,
                artifact,
                workflow_option(workflow, "detector_service", DEFAULT_DETECTOR_SERVICE),
                service_name(workflow),
            )
            .await?;
            records.push(results.artifact_data(&artifact.id, &report)?);
        }
        run.computed()?;
        run.record_posted(ctx.post(&records).await?);
        run.finish()
    }
}

async fn estimate_pose(
    ctx: &FlowContext,
    artifact: &Artifact,
    detector: &str,
    keypoint_service: &str,
) -> Result<PoseReport, FlowError> {
    let rotation = Rotation::for_pose(ctx.scan_type.pose);
    let payload = artifact.payload()?.clone();
    let (original, rotated, jpeg) = blocking(move || {
        let image = decode_rgb(&payload)?;
        let original = image.dimensions();
        let rotated = rotation.apply(&image);
        let jpeg = encode_image(DynamicImage::ImageRgb8(rotated.clone()), ImageFormat::Jpeg)?;
        Ok((original, rotated, jpeg))
    })
    .await?;
    let rotated: Arc<RgbImage> = Arc::new(rotated);

    let pose_config = &ctx.config.pose;
    let people: Vec<_> = ctx
        .inference
        .detect_people(detector, Bytes::from(jpeg))
        .await?
        .into_iter()
        .filter(|person| person.score >= pose_config.person_threshold)
        .collect();
    debug!(
        "Artifact {}: {} people above threshold",
        artifact.id,
        people.len()
    );

    let (width, height) = original;
    let mut poses = Vec::with_capacity(people.len());
    for person in people {
        let crop = PersonCrop::from_box(&person.bbox, pose_config.input_width, pose_config.input_height);
        let image = Arc::clone(&rotated);
        let (input_width, input_height) = (pose_config.input_width, pose_config.input_height);
        let tensor = blocking(move || {
            Ok(crop_to_tensor(&crop.crop(&image, input_width, input_height)?))
        })
        .await?;

        let heatmaps = ctx
            .inference
            .keypoint_heatmaps(keypoint_service, tensor)
            .await?;
        let keypoints = keypoints_from_heatmaps(&heatmaps, &crop)?
            .into_iter()
            .map(|kp| {
                let (x, y) = rotation.unrotate_point(kp.x, kp.y, width, height);
                Keypoint { x, y, ..kp }
            })
            .collect();

        poses.push(PersonPose {
            bbox: unrotate_box(rotation, &person.bbox, width, height),
            score: person.score,
            keypoints,
        });
    }

    Ok(PoseReport {
        people_detected: poses.len(),
        people: poses,
    })
}
