//! Standing / lying classification of rgb frames

use async_trait::async_trait;
use cgm_rg_common::ResultBuilder;
use cgm_rg_imaging::decode_rgb;
use cgm_rg_imaging::tensor::classifier_input;
use cgm_rg_inference::predict_in_batches;
use serde::Serialize;

use crate::context::service_name;
use crate::{blocking, AnalysisFlow, FlowContext, FlowError, FlowReport, FlowRun};

pub struct StandingLayingFlow;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StandingLayingPrediction {
    /// Probability that the child is standing
    pub prediction: f32,
    pub label: &'static str,
}

impl StandingLayingPrediction {
    #[must_use]
    pub fn new(prediction: f32) -> Self {
        Self {
            prediction,
            label: if prediction >= 0.5 { "standing" } else { "laying" },
        }
    }
}

#[async_trait]
impl AnalysisFlow for StandingLayingFlow {
    fn name(&self) -> &'static str {
        "standing_laying"
    }

    async fn run(&self, ctx: &FlowContext) -> Result<FlowReport, FlowError> {
        let mut run = FlowRun::new(self.name());
        let workflow = ctx.workflow(&ctx.config.workflows.standing_laying)?;
        let (pending, skipped) = ctx.pending(&ctx.rgb, &workflow.id);
        run.fetched(skipped)?;
        if pending.is_empty() {
            return run.finish();
        }

        let payloads = pending
            .iter()
            .map(|artifact| artifact.payload().cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let tensors = blocking(move || {
            payloads
                .iter()
                .map(|payload| Ok(classifier_input(&decode_rgb(payload)?)))
                .collect::<Result<Vec<_>, FlowError>>()
        })
        .await?;

        let service = service_name(workflow);
        let batch_size = ctx.config.inference.batch_size;
        let predictions = predict_in_batches(&tensors, batch_size, |batch| {
            ctx.inference.classify_standing_laying(service, batch)
        })
        .await?;
        run.computed()?;

        let results = ResultBuilder::new(ctx.scan_id(), &workflow.id);
        let records = pending
            .iter()
            .zip(predictions)
            .map(|(artifact, p)| {
                results.artifact_data(&artifact.id, &StandingLayingPrediction::new(p))
            })
            .collect::<Result<Vec<_>, _>>()?;
        run.record_posted(ctx.post(&records).await?);
        run.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_threshold() {
        assert_eq!(StandingLayingPrediction::new(0.9).label, "standing");
        assert_eq!(StandingLayingPrediction::new(0.5).label, "standing");
        assert_eq!(StandingLayingPrediction::new(0.1).label, "laying");
    }
}
