//! Height and weight regression
//!
//! Every decodable depth artifact is normalized (and, for depth-image models,
//! inpainted first using a segmentation of the frame), batched through the
//! regression model, and posted per artifact. The scan mean follows once the
//! artifact batch has been posted.

use async_trait::async_trait;
use cgm_rg_common::config::WorkflowRef;
use cgm_rg_common::{Artifact, PoseType, ResultBuilder};
use cgm_rg_depthmap::transform::normalize_for_model;
use cgm_rg_depthmap::{inpaint_all_masks, DepthMasks};
use cgm_rg_inference::predict_in_batches;
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::aggregate::ScanAggregate;
use crate::context::{service_name, workflow_option};
use crate::depth::decode_depth;
use crate::{blocking, AnalysisFlow, FlowContext, FlowError, FlowReport, FlowRun};

/// `input_format` of workflows whose model expects inpainted depth images
pub const INPAINTED_INPUT_FORMAT: &str = "depthmap-inpainted";
const DEFAULT_SEGMENTATION_SERVICE: &str = "depth_segmentation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Height,
    Weight,
}

impl Target {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Target::Height => "height",
            Target::Weight => "weight",
        }
    }
}

pub struct HeightWeightFlow {
    target: Target,
}

impl HeightWeightFlow {
    #[must_use]
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    fn workflow_refs<'a>(&self, ctx: &'a FlowContext) -> (&'a WorkflowRef, &'a WorkflowRef) {
        let workflows = &ctx.config.workflows;
        match self.target {
            Target::Height => (&workflows.height, &workflows.height_mean),
            Target::Weight => (&workflows.weight, &workflows.weight_mean),
        }
    }

    fn prediction_data(&self, prediction: f32) -> Value {
        let mut data = Map::new();
        data.insert(self.target.as_str().to_string(), Value::from(prediction));
        Value::Object(data)
    }
}

/// Model input preparation for one frame
struct ModelInput {
    pose: PoseType,
    target_height: usize,
    target_width: usize,
    normalization: f32,
    row_fill_delta: f32,
}

/// Inpaint `samples` with the segmentation `labels`; `None` if the frame is rejected
fn inpaint(
    samples: &Array2<f32>,
    labels: &Array2<u8>,
    input: &ModelInput,
    seed: u64,
) -> Result<Option<Array2<f32>>, FlowError> {
    let masks = DepthMasks::from_labels(labels);
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(inpaint_all_masks(
        samples,
        input.pose,
        &masks,
        input.pose.max_depth(),
        input.row_fill_delta,
        &mut rng,
    )?)
}

#[async_trait]
impl AnalysisFlow for HeightWeightFlow {
    fn name(&self) -> &'static str {
        self.target.as_str()
    }

    async fn run(&self, ctx: &FlowContext) -> Result<FlowReport, FlowError> {
        let mut run = FlowRun::new(self.name());
        let (artifact_ref, mean_ref) = self.workflow_refs(ctx);
        let workflow = ctx.workflow(artifact_ref)?;
        let mean_workflow = ctx.workflow(mean_ref)?;
        if ctx.already_processed(&mean_workflow.id) {
            run.fetched(ctx.depth.len())?;
            return run.finish();
        }
        run.fetched(0)?;

        let inpainted = workflow.data.input_format.as_deref() == Some(INPAINTED_INPUT_FORMAT);
        let depth_config = &ctx.config.depth;
        let input = std::sync::Arc::new(ModelInput {
            pose: ctx.scan_type.pose,
            target_height: depth_config.target_height,
            target_width: depth_config.target_width,
            normalization: if inpainted {
                depth_config.depth_image_normalization
            } else {
                depth_config.pointcloud_normalization
            },
            row_fill_delta: depth_config.row_fill_delta,
        });
        let segmentation = workflow_option(workflow, "segmentation_service", DEFAULT_SEGMENTATION_SERVICE);

        let mut used: Vec<&Artifact> = Vec::with_capacity(ctx.depth.len());
        let mut tensors: Vec<Array3<f32>> = Vec::with_capacity(ctx.depth.len());
        for (index, artifact) in ctx.depth.iter().enumerate() {
            let payload = artifact.payload()?.clone();
            let version = ctx.scan.version.clone();
            let config = depth_config.clone();
            let decoded = blocking(move || Ok(decode_depth(&payload, &version, &config)?)).await;
            let samples = match decoded {
                Ok(depth) => depth.samples,
                Err(FlowError::Decode(e)) => {
                    warn!("Skipping undecodable depth artifact {}: {}", artifact.id, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let labels = if inpainted {
                Some(
                    ctx.inference
                        .segment_depth(segmentation, samples.clone())
                        .await?,
                )
            } else {
                None
            };

            let input = std::sync::Arc::clone(&input);
            let seed = depth_config.rng_seed.wrapping_add(index as u64);
            let tensor = blocking(move || {
                let depth = match labels {
                    Some(labels) => match inpaint(&samples, &labels, &input, seed)? {
                        Some(depth) => depth,
                        None => return Ok(None),
                    },
                    None => samples,
                };
                Ok(Some(normalize_for_model(
                    &depth,
                    input.target_height,
                    input.target_width,
                    input.normalization,
                )))
            })
            .await?;

            match tensor {
                Some(tensor) => {
                    used.push(artifact);
                    tensors.push(tensor);
                }
                None => warn!(
                    "Depth artifact {} rejected by inpainting quality gate",
                    artifact.id
                ),
            }
        }

        let service = service_name(workflow);
        let predictions = predict_in_batches(&tensors, ctx.config.inference.batch_size, |batch| {
            ctx.inference.regress(service, batch)
        })
        .await?;
        run.computed()?;
        if predictions.is_empty() {
            return run.finish();
        }

        let results = ResultBuilder::new(ctx.scan_id(), &workflow.id);
        let records = used
            .iter()
            .zip(&predictions)
            .filter(|(artifact, _)| !ctx.existing.covers(&workflow.id, &artifact.id))
            .map(|(artifact, p)| results.artifact_data(&artifact.id, &self.prediction_data(*p)))
            .collect::<Result<Vec<_>, _>>()?;
        run.record_posted(ctx.post(&records).await?);

        let values: Vec<f64> = predictions.iter().map(|p| f64::from(*p)).collect();
        if let Some(aggregate) = ScanAggregate::compute(&values) {
            info!(
                "Scan {}: {} mean {:.2} (lof {:.2}) from {} artifacts",
                ctx.scan_id(),
                self.target.as_str(),
                aggregate.mean,
                aggregate.lof_mean,
                aggregate.samples
            );
            let sources = used.iter().map(|artifact| artifact.id.clone()).collect();
            let mean_results = ResultBuilder::new(ctx.scan_id(), &mean_workflow.id);
            let record = mean_results.multi_data(sources, &aggregate.to_data(self.target.as_str()))?;
            run.record_posted(ctx.post(&[record]).await?);
        }
        run.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgm_rg_depthmap::inpaint::labels;

    #[test]
    fn test_prediction_data_keyed_by_target() {
        let flow = HeightWeightFlow::new(Target::Weight);
        assert_eq!(flow.prediction_data(12.5)["weight"], 12.5);
        assert_eq!(flow.name(), "weight");
    }

    #[test]
    fn test_inpaint_fills_child_region() {
        let mut samples = Array2::from_elem((12, 12), 1.2f32);
        let mut label_map = Array2::from_elem((12, 12), labels::FLOOR);
        for x in 3..9 {
            for y in 2..10 {
                label_map[[x, y]] = labels::CHILD;
                samples[[x, y]] = 1.0;
            }
        }
        samples[[5, 5]] = 0.0;
        let input = ModelInput {
            pose: PoseType::Standing,
            target_height: 240,
            target_width: 180,
            normalization: 3.0,
            row_fill_delta: 0.02,
        };
        let filled = inpaint(&samples, &label_map, &input, 42).unwrap().unwrap();
        assert!(filled.iter().all(|v| *v > 0.0));
    }
}
