//! Pinhole projection and device-pose geometry

/// Flattened row-major 4x4 transform, device to world
pub type PoseMatrix = [f32; 16];

pub const IDENTITY_POSE: PoseMatrix = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Camera intrinsics as fractions of the image size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Intrinsics {
    /// Scale to pixel units: `(fx·w, fy·h, cx·w, cy·h)`
    fn in_pixels(&self, width: usize, height: usize) -> (f32, f32, f32, f32) {
        let w = width as f32;
        let h = height as f32;
        (self.fx * w, self.fy * h, self.cx * w, self.cy * h)
    }
}

/// Back-project pixel `(x, y)` at depth `z` into camera space
#[must_use]
pub fn project_2d_to_3d(
    intrinsics: &Intrinsics,
    width: usize,
    height: usize,
    x: f32,
    y: f32,
    z: f32,
) -> [f32; 3] {
    let (fx, fy, cx, cy) = intrinsics.in_pixels(width, height);
    [(x - cx) * z / fx, (y - cy) * z / fy, z]
}

/// Project a camera-space point onto the image plane.
///
/// Returns `None` for points at or behind the camera.
#[must_use]
pub fn project_3d_to_2d(
    intrinsics: &Intrinsics,
    width: usize,
    height: usize,
    point: [f32; 3],
) -> Option<[f32; 2]> {
    let [x, y, z] = point;
    if z <= 0.0 {
        return None;
    }
    let (fx, fy, cx, cy) = intrinsics.in_pixels(width, height);
    Some([x * fx / z + cx, y * fy / z + cy])
}

/// Build the device-to-world matrix from a position and a unit quaternion `(x, y, z, w)`.
///
/// The quaternion is normalised first; a zero quaternion yields the identity rotation.
#[must_use]
pub fn pose_matrix(position: [f32; 3], rotation: [f32; 4]) -> PoseMatrix {
    let [qx, qy, qz, qw] = rotation.map(f64::from);
    let norm = (qx * qx + qy * qy + qz * qz + qw * qw).sqrt();
    let (x, y, z, w) = if norm > 0.0 {
        (qx / norm, qy / norm, qz / norm, qw / norm)
    } else {
        (0.0, 0.0, 0.0, 1.0)
    };

    let r = [
        [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - z * w),
            2.0 * (x * z + y * w),
        ],
        [
            2.0 * (x * y + z * w),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - x * w),
        ],
        [
            2.0 * (x * z - y * w),
            2.0 * (y * z + x * w),
            1.0 - 2.0 * (x * x + y * y),
        ],
    ];

    let mut m = IDENTITY_POSE;
    for (row, values) in r.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            m[row * 4 + col] = *value as f32;
        }
        m[row * 4 + 3] = position[row];
    }
    m
}

/// Apply a pose to a point (homogeneous `w = 1`)
#[must_use]
pub fn transform_point(pose: &PoseMatrix, point: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0f32; 3];
    for (row, value) in out.iter_mut().enumerate() {
        *value = pose[row * 4] * point[0]
            + pose[row * 4 + 1] * point[1]
            + pose[row * 4 + 2] * point[2]
            + pose[row * 4 + 3];
    }
    out
}

/// Camera pitch relative to the floor plane, in degrees.
///
/// Maps the camera origin `(0,0,0)` and the forward point `(0,0,1)` into world
/// space and takes `asin(camera.y - forward.y)`. Negative values mean the
/// camera is tilted toward the floor.
#[must_use]
pub fn floor_angle(pose: &PoseMatrix) -> f64 {
    let camera = transform_point(pose, [0.0, 0.0, 0.0]);
    let forward = transform_point(pose, [0.0, 0.0, 1.0]);
    let dy = f64::from(camera[1] - forward[1]).clamp(-1.0, 1.0);
    dy.asin().to_degrees()
}
