//! Depth artifact decoding, pose geometry and depth-surface repair
//!
//! Depth artifacts are zip archives holding a single `data` member. The
//! member starts with an ASCII header line and continues with packed
//! 3-byte samples (big-endian `u16` depth, `u8` confidence).
//!
//! # Example
//! ```no_run
//! use cgm_rg_depthmap::{codec, geometry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let raw = std::fs::read("depth.zip")?;
//! let frame = codec::decode(&raw)?;
//! println!("{}x{} zero={:.1}%", frame.width, frame.height, frame.percentage_of_zero());
//! if let Some(pose) = frame.device_pose {
//!     println!("floor angle: {:.1}", geometry::floor_angle(&pose));
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod geometry;
pub mod inpaint;
pub mod transform;

use thiserror::Error;

pub use codec::{DepthFrame, DepthHeader};
pub use geometry::{Intrinsics, PoseMatrix};
pub use inpaint::{inpaint_all_masks, DepthMasks};

/// Errors raised while decoding a depth artifact. Fatal to that artifact only.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Zip container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Depth archive has no 'data' member")]
    MissingDataMember,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid depth header: {0}")]
    InvalidHeader(String),

    #[error("Truncated depth payload: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Errors raised by mask-guided inpainting
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InpaintError {
    #[error("{name} mask has shape {found:?}, depth has shape {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
}
