//! Depth artifact codec
//!
//! Header line: `{width}x{height}_{depth_scale}_{max_confidence}`, optionally
//! followed by `_{qx}_{qy}_{qz}_{qw}_{px}_{py}_{pz}`. The payload that follows
//! holds `width * height` samples of 3 bytes each.

use ndarray::Array2;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::geometry::{pose_matrix, PoseMatrix, IDENTITY_POSE};
use crate::DecodeError;

const DATA_MEMBER: &str = "data";
const BYTES_PER_SAMPLE: usize = 3;
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Parsed header line of a depth artifact
#[derive(Debug, Clone, PartialEq)]
pub struct DepthHeader {
    pub width: usize,
    pub height: usize,
    /// Meters per packed depth unit
    pub depth_scale: f32,
    /// Confidence byte that maps to 1.0
    pub max_confidence: f32,
    /// `(x, y, z, w)`, present only in 10-field headers
    pub rotation: Option<[f32; 4]>,
    pub position: Option<[f32; 3]>,
}

impl DepthHeader {
    /// Parse an underscore-delimited header line
    pub fn parse(line: &str) -> Result<Self, DecodeError> {
        let fields: Vec<&str> = line.trim().split('_').collect();
        if fields.len() < 3 {
            return Err(DecodeError::InvalidHeader(format!(
                "expected at least 3 fields, got {} in '{line}'",
                fields.len()
            )));
        }

        let (width, height) = fields[0]
            .split_once('x')
            .ok_or_else(|| DecodeError::InvalidHeader(format!("bad dimensions '{}'", fields[0])))?;
        let width = parse_field::<usize>(width, "width")?;
        let height = parse_field::<usize>(height, "height")?;
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidHeader(format!(
                "empty frame {width}x{height}"
            )));
        }

        if frame_bytes(width, height, BYTES_PER_SAMPLE).is_none() {
            return Err(DecodeError::InvalidHeader(format!(
                "frame {width}x{height} is too large"
            )));
        }

        let depth_scale = parse_field::<f32>(fields[1], "depth_scale")?;
        let max_confidence = parse_field::<f32>(fields[2], "max_confidence")?;

        let (rotation, position) = if fields.len() >= 10 {
            let f = |i: usize, name: &str| parse_field::<f32>(fields[i], name);
            (
                Some([f(3, "qx")?, f(4, "qy")?, f(5, "qz")?, f(6, "qw")?]),
                Some([f(7, "px")?, f(8, "py")?, f(9, "pz")?]),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            width,
            height,
            depth_scale,
            max_confidence,
            rotation,
            position,
        })
    }

    /// Device pose implied by the header.
    ///
    /// Short headers yield the identity matrix. A position of exactly
    /// `(0, 0, 0)` is the "no pose recorded" sentinel and yields `None`, even
    /// though a device could in principle sit at the world origin.
    #[must_use]
    pub fn device_pose(&self) -> Option<PoseMatrix> {
        match (self.position, self.rotation) {
            (Some(position), _) if position == [0.0; 3] => None,
            (Some(position), Some(rotation)) => Some(pose_matrix(position, rotation)),
            _ => Some(IDENTITY_POSE),
        }
    }

    fn to_line(&self) -> String {
        let mut line = format!(
            "{}x{}_{}_{}",
            self.width, self.height, self.depth_scale, self.max_confidence
        );
        if let (Some(q), Some(p)) = (self.rotation, self.position) {
            for value in q.iter().chain(p.iter()) {
                line.push('_');
                line.push_str(&value.to_string());
            }
        }
        line
    }

    fn payload_len(&self) -> Result<usize, DecodeError> {
        frame_bytes(self.width, self.height, BYTES_PER_SAMPLE).ok_or_else(|| {
            DecodeError::InvalidHeader(format!(
                "frame {}x{} is too large",
                self.width, self.height
            ))
        })
    }
}

fn frame_bytes(width: usize, height: usize, bytes_per_sample: usize) -> Option<usize> {
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(bytes_per_sample))
}

fn parse_field<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, DecodeError> {
    value
        .trim()
        .parse()
        .map_err(|_| DecodeError::InvalidHeader(format!("cannot parse {name} from '{value}'")))
}

/// A decoded depth artifact
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub width: usize,
    pub height: usize,
    pub depth_scale: f32,
    pub max_confidence: f32,
    /// `None` when the artifact carries the origin sentinel
    pub device_pose: Option<PoseMatrix>,
    /// Depth in meters, shape `(width, height)`; `0.0` means no reading
    pub samples: Array2<f32>,
    /// Confidence in `[0, 1]`, same layout as `samples`
    pub confidence: Array2<f32>,
}

impl DepthFrame {
    /// Share of pixels without a reading, in percent
    #[must_use]
    pub fn percentage_of_zero(&self) -> f64 {
        percentage_of_zero(&self.samples)
    }
}

/// Share of exactly-zero pixels, in percent
#[must_use]
pub fn percentage_of_zero(samples: &Array2<f32>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let zeros = samples.iter().filter(|v| **v == 0.0).count();
    zeros as f64 / samples.len() as f64 * 100.0
}

/// Read the `data` member out of a depth zip
fn read_data_member(raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut archive = ZipArchive::new(Cursor::new(raw))?;
    let mut member = match archive.by_name(DATA_MEMBER) {
        Ok(member) => member,
        Err(zip::result::ZipError::FileNotFound) => return Err(DecodeError::MissingDataMember),
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::new();
    member.read_to_end(&mut data)?;
    Ok(data)
}

/// Decode a depth artifact.
///
/// # Errors
/// Returns [`DecodeError`] for a malformed zip, a missing `data` member, an
/// unparseable header or a payload shorter than the header promises.
pub fn decode(raw: &[u8]) -> Result<DepthFrame, DecodeError> {
    let data = read_data_member(raw)?;
    let newline = data
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| DecodeError::InvalidHeader("missing header line".to_string()))?;
    let line = std::str::from_utf8(&data[..newline])
        .map_err(|e| DecodeError::InvalidHeader(format!("header is not ASCII: {e}")))?;
    let header = DepthHeader::parse(line)?;
    let payload = &data[newline + 1..];

    let expected = header.payload_len()?;
    if payload.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: payload.len(),
        });
    }

    debug!(
        "Decoding {}x{} depth frame (scale {}, max confidence {})",
        header.width, header.height, header.depth_scale, header.max_confidence
    );

    let samples = decode_to_image(payload, header.width, header.height, header.depth_scale);
    let confidence = decode_confidence(payload, header.width, header.height, header.max_confidence);

    Ok(DepthFrame {
        width: header.width,
        height: header.height,
        depth_scale: header.depth_scale,
        max_confidence: header.max_confidence,
        device_pose: header.device_pose(),
        samples,
        confidence,
    })
}

/// Unpack the depth channel of a packed payload.
///
/// Returns shape `(width, height)` with the packed pixel `(cx, cy)` stored at
/// `[cx, height - 1 - cy]`. Missing trailing samples decode as zero.
#[must_use]
pub fn decode_to_image(payload: &[u8], width: usize, height: usize, depth_scale: f32) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((width, height));
    for cy in 0..height {
        for cx in 0..width {
            let offset = (cy * width + cx) * BYTES_PER_SAMPLE;
            if let Some(px) = payload.get(offset..offset + 2) {
                let packed = (u16::from(px[0]) << 8) | u16::from(px[1]);
                out[[cx, height - 1 - cy]] = f32::from(packed) * depth_scale;
            }
        }
    }
    out
}

/// Unpack the confidence channel, same layout as [`decode_to_image`]
#[must_use]
pub fn decode_confidence(
    payload: &[u8],
    width: usize,
    height: usize,
    max_confidence: f32,
) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((width, height));
    if max_confidence <= 0.0 {
        return out;
    }
    for cy in 0..height {
        for cx in 0..width {
            let offset = (cy * width + cx) * BYTES_PER_SAMPLE + 2;
            if let Some(c) = payload.get(offset) {
                out[[cx, height - 1 - cy]] = f32::from(*c) / max_confidence;
            }
        }
    }
    out
}

/// Encode a frame into the zip container.
///
/// `samples` and `confidence` use the decoded `(width, height)` layout.
/// Depth is quantised to `depth_scale` units and saturates at `u16::MAX`.
pub fn encode(
    header: &DepthHeader,
    samples: &Array2<f32>,
    confidence: Option<&Array2<f32>>,
) -> Result<Vec<u8>, DecodeError> {
    let (width, height) = samples.dim();
    if (width, height) != (header.width, header.height) {
        return Err(DecodeError::InvalidHeader(format!(
            "header declares {}x{}, samples are {width}x{height}",
            header.width, header.height
        )));
    }
    if header.depth_scale <= 0.0 {
        return Err(DecodeError::InvalidHeader(
            "depth_scale must be positive".to_string(),
        ));
    }

    let line = header.to_line();
    let mut data = Vec::with_capacity(line.len() + 1 + header.payload_len()?);
    data.extend_from_slice(line.as_bytes());
    data.push(b'\n');
    for cy in 0..height {
        for cx in 0..width {
            let y = height - 1 - cy;
            let packed = (samples[[cx, y]] / header.depth_scale)
                .round()
                .clamp(0.0, f32::from(u16::MAX)) as u16;
            let conf = confidence
                .map(|c| (c[[cx, y]] * header.max_confidence).round().clamp(0.0, 255.0) as u8)
                .unwrap_or(0);
            data.extend_from_slice(&packed.to_be_bytes());
            data.push(conf);
        }
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(
        DATA_MEMBER,
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    writer.write_all(&data)?;
    Ok(writer.finish()?.into_inner())
}

/// Decode a raw little-endian `u16` depth buffer (IR capture versions).
///
/// The buffer may sit inside the usual zip `data` member. The frame is
/// rotated 90° counter-clockwise: the result has shape `(width, height)` with
/// `out[[i, j]] = raw[j][width - 1 - i]` for row-major `raw` of `height` rows.
pub fn decode_ir(
    raw: &[u8],
    width: usize,
    height: usize,
    depth_scale: f32,
) -> Result<Array2<f32>, DecodeError> {
    let owned;
    let buffer = if raw.starts_with(ZIP_MAGIC) {
        owned = read_data_member(raw)?;
        owned.as_slice()
    } else {
        raw
    };

    let expected = frame_bytes(width, height, 2).ok_or_else(|| {
        DecodeError::InvalidHeader(format!("IR frame {width}x{height} is too large"))
    })?;
    if buffer.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: buffer.len(),
        });
    }

    let mut out = Array2::<f32>::zeros((width, height));
    for row in 0..height {
        for col in 0..width {
            let offset = (row * width + col) * 2;
            let value = u16::from_le_bytes([buffer[offset], buffer[offset + 1]]);
            out[[width - 1 - col, row]] = f32::from(value) * depth_scale;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_with(member: &str, data: &[u8]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(member, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_decode_4x2_scenario() {
        // Packed triplets in row-major (cy, cx) order
        let depths: [u16; 8] = [1000, 1200, 1400, 1600, 500, 0, 2500, 65535];
        let mut data = b"4x2_0.001_7\n".to_vec();
        for d in depths {
            data.extend_from_slice(&d.to_be_bytes());
            data.push(7);
        }
        assert_eq!(data.len() - 12, 24);

        let frame = decode(&zip_with("data", &data)).unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(frame.depth_scale, 0.001);
        assert_eq!(frame.max_confidence, 7.0);
        assert_eq!(frame.samples.dim(), (4, 2));
        assert_eq!(frame.device_pose, Some(IDENTITY_POSE));

        for cy in 0..2 {
            for cx in 0..4 {
                let expected = f32::from(depths[cy * 4 + cx]) * 0.001;
                let actual = frame.samples[[cx, 1 - cy]];
                assert!((actual - expected).abs() < 1e-6, "({cx},{cy}): {actual} vs {expected}");
                assert!((frame.confidence[[cx, 1 - cy]] - 1.0).abs() < 1e-6);
            }
        }
        assert!((frame.percentage_of_zero() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_origin_position_is_no_pose() {
        let header = DepthHeader::parse("2x2_0.001_7_0.1_0.2_0.3_0.9_0_0_0").unwrap();
        assert!(header.rotation.is_some());
        assert_eq!(header.device_pose(), None);

        let header = DepthHeader::parse("2x2_0.001_7_0_0_0_1_0_-1_0").unwrap();
        let pose = header.device_pose().unwrap();
        assert_eq!(pose[7], -1.0);
    }

    #[test]
    fn test_missing_data_member() {
        let raw = zip_with("depth", b"2x2_0.001_7\n");
        assert!(matches!(decode(&raw), Err(DecodeError::MissingDataMember)));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(decode(b"nonsense"), Err(DecodeError::Zip(_))));
    }

    #[test]
    fn test_bad_header() {
        let raw = zip_with("data", b"4by2_0.001_7\n");
        assert!(matches!(decode(&raw), Err(DecodeError::InvalidHeader(_))));
        let raw = zip_with("data", b"4x2_abc_7\n");
        assert!(matches!(decode(&raw), Err(DecodeError::InvalidHeader(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let raw = zip_with("data", b"4x2_0.001_7\n\x00\x01\x07");
        assert!(matches!(
            decode(&raw),
            Err(DecodeError::Truncated {
                expected: 24,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_oversized_dimensions_are_rejected() {
        let raw = zip_with("data", b"4611686018427387904x4_0.001_7\n\x00\x01\x07");
        assert!(matches!(decode(&raw), Err(DecodeError::InvalidHeader(_))));

        let huge = format!("{}x2_0.001_7", usize::MAX);
        assert!(matches!(
            DepthHeader::parse(&huge),
            Err(DecodeError::InvalidHeader(_))
        ));
        assert!(matches!(
            decode_ir(&[0u8; 4], usize::MAX, 2, 1.0),
            Err(DecodeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_encode_decode_preserves_header_and_pose() {
        let header = DepthHeader {
            width: 3,
            height: 2,
            depth_scale: 0.001,
            max_confidence: 7.0,
            rotation: Some([0.0, 0.0, 0.0, 1.0]),
            position: Some([0.1, -1.0, 0.25]),
        };
        let samples = Array2::from_shape_fn((3, 2), |(x, y)| 0.5 + x as f32 * 0.25 + y as f32);
        let confidence = Array2::from_elem((3, 2), 1.0);
        let raw = encode(&header, &samples, Some(&confidence)).unwrap();

        let frame = decode(&raw).unwrap();
        assert_eq!(frame.depth_scale, header.depth_scale);
        assert_eq!(frame.max_confidence, header.max_confidence);
        assert_eq!(frame.device_pose, header.device_pose());
        for ((x, y), v) in samples.indexed_iter() {
            assert!((frame.samples[[x, y]] - v).abs() <= 0.0005 + 1e-6);
        }
    }

    #[test]
    fn test_decode_ir_rotates() {
        // 3 columns, 2 rows
        let values: [u16; 6] = [1, 2, 3, 4, 5, 6];
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = decode_ir(&raw, 3, 2, 1.0).unwrap();
        assert_eq!(out.dim(), (3, 2));
        // rot90: first output row is the last input column
        assert_eq!(out[[0, 0]], 3.0);
        assert_eq!(out[[0, 1]], 6.0);
        assert_eq!(out[[2, 0]], 1.0);
        assert_eq!(out[[2, 1]], 4.0);

        let zipped = decode_ir(&zip_with("data", &raw), 3, 2, 1.0).unwrap();
        assert_eq!(zipped, out);
        assert!(matches!(
            decode_ir(&raw[..4], 3, 2, 1.0),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
