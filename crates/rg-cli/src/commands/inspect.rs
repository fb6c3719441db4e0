//! Inspect-depth command: decode a depth artifact from disk

use anyhow::{Context as _, Result};
use cgm_rg_depthmap::codec::decode;
use cgm_rg_depthmap::geometry::floor_angle;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args)]
pub struct InspectDepthCommand {
    /// Depth artifact (zip container with a `data` member)
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

#[derive(Debug, Serialize)]
struct DepthInspection {
    width: usize,
    height: usize,
    depth_scale: f32,
    max_confidence: f32,
    percentage_of_zero: f64,
    floor_angle: Option<f64>,
}

fn inspect(raw: &[u8]) -> Result<DepthInspection> {
    let frame = decode(raw)?;
    Ok(DepthInspection {
        width: frame.width,
        height: frame.height,
        depth_scale: frame.depth_scale,
        max_confidence: frame.max_confidence,
        percentage_of_zero: frame.percentage_of_zero(),
        floor_angle: frame.device_pose.as_ref().map(floor_angle),
    })
}

impl InspectDepthCommand {
    pub fn execute(self) -> Result<()> {
        let raw = std::fs::read(&self.input)
            .with_context(|| format!("Failed to read {}", self.input.display()))?;
        let inspection =
            inspect(&raw).with_context(|| format!("Failed to decode {}", self.input.display()))?;
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        Ok(())
    }
}
