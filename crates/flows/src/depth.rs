//! Depth artifact decoding shared by the depth flows

use cgm_rg_common::config::DepthConfig;
use cgm_rg_common::ScanVersion;
use cgm_rg_depthmap::{codec, DecodeError, PoseMatrix};
use ndarray::Array2;

/// Depth samples and device pose of one artifact
#[derive(Debug, Clone)]
pub struct DecodedDepth {
    pub samples: Array2<f32>,
    pub device_pose: Option<PoseMatrix>,
}

/// Decode a depth payload in the format of `version`.
///
/// `ir` versions carry a raw `u16` buffer with the frame size from `config`
/// and no pose; every other version uses the zip container with a header.
pub fn decode_depth(
    raw: &[u8],
    version: &ScanVersion,
    config: &DepthConfig,
) -> Result<DecodedDepth, DecodeError> {
    if version.is_ir() {
        let samples = codec::decode_ir(
            raw,
            config.ir_width,
            config.ir_height,
            config.ir_depth_scale,
        )?;
        return Ok(DecodedDepth {
            samples,
            device_pose: None,
        });
    }
    let frame = codec::decode(raw)?;
    Ok(DecodedDepth {
        samples: frame.samples,
        device_pose: frame.device_pose,
    })
}
