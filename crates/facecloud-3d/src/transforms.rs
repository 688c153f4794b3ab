use crate::linalg;

/// Tolerance used to validate unit length, orthogonality and determinant of rotations.
pub const ROTATION_TOLERANCE: f64 = 1e-6;

/// Error types for rotation matrices.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RotationError {
    /// The rows are not unit length or not mutually orthogonal
    #[error("Matrix is not orthonormal (max error {0:e})")]
    NotOrthonormal(f64),

    /// The matrix is orthonormal but its determinant is -1
    #[error("Matrix is an improper rotation (determinant {0})")]
    ReflectionDetected(f64),

    /// The axis has zero length
    #[error("Cannot compute rotation matrix from a zero vector")]
    ZeroAxis,
}

/// A proper 3x3 rotation matrix stored in row-major order.
///
/// Points are rotated by left multiplication, `p' = R * p`, so the rows of the matrix are the
/// axes of the target frame expressed in the source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationMatrix([[f64; 3]; 3]);

impl RotationMatrix {
    /// The identity rotation.
    pub const IDENTITY: RotationMatrix =
        RotationMatrix([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    /// Create a rotation from its rows, validating that it is a proper rotation.
    ///
    /// # Errors
    ///
    /// * [`RotationError::NotOrthonormal`] if a row is not unit length or two rows are not
    ///   orthogonal within [`ROTATION_TOLERANCE`].
    /// * [`RotationError::ReflectionDetected`] if the matrix is orthonormal with determinant -1.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Result<Self, RotationError> {
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(RotationError::NotOrthonormal(f64::INFINITY));
        }

        let error = orthonormality_error(&rows);
        if error > ROTATION_TOLERANCE {
            return Err(RotationError::NotOrthonormal(error));
        }

        let det = linalg::determinant3(&rows);
        if (det - 1.0).abs() > ROTATION_TOLERANCE {
            return Err(RotationError::ReflectionDetected(det));
        }

        Ok(Self(rows))
    }

    /// Get the rows of the matrix.
    pub fn rows(&self) -> &[[f64; 3]; 3] {
        &self.0
    }

    /// Get the determinant of the matrix.
    pub fn determinant(&self) -> f64 {
        linalg::determinant3(&self.0)
    }

    /// Get the inverse rotation.
    pub fn transpose(&self) -> Self {
        let m = &self.0;
        Self([
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ])
    }

    /// Rotate a single point.
    pub fn apply(&self, p: &[f64; 3]) -> [f64; 3] {
        [
            linalg::dot(&self.0[0], p),
            linalg::dot(&self.0[1], p),
            linalg::dot(&self.0[2], p),
        ]
    }

    /// Rotate a set of points.
    pub fn apply_points(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        let mut dst_points = vec![[0.0; 3]; points.len()];
        linalg::transform_points(points, &self.0, &[0.0; 3], &mut dst_points);
        dst_points
    }
}

/// Largest deviation of the rows of `m` from an orthonormal basis.
///
/// This is the maximum over `| |r_i| - 1 |` and `|r_i . r_j|` for `i != j`.
pub fn orthonormality_error(m: &[[f64; 3]; 3]) -> f64 {
    let mut error: f64 = 0.0;
    for i in 0..3 {
        error = error.max((linalg::norm(&m[i]) - 1.0).abs());
        for j in (i + 1)..3 {
            error = error.max(linalg::dot(&m[i], &m[j]).abs());
        }
    }
    error
}

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation, normalized internally.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The rotation matrix.
///
/// Example:
///
/// ```
/// use facecloud_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = [0.0, 0.0, 1.0];
/// let rotation = axis_angle_to_rotation_matrix(&axis, std::f64::consts::FRAC_PI_2).unwrap();
/// let p = rotation.apply(&[1.0, 0.0, 0.0]);
/// assert!((p[1] - 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<RotationMatrix, RotationError> {
    let [x, y, z] = linalg::normalize(axis).ok_or(RotationError::ZeroAxis)?;

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    let m00 = c + x * x * t;
    let m11 = c + y * y * t;
    let m22 = c + z * z * t;

    let tmp1 = x * y * t;
    let tmp2 = z * s;

    let m10 = tmp1 + tmp2;
    let m01 = tmp1 - tmp2;

    let tmp3 = x * z * t;
    let tmp4 = y * s;

    let m20 = tmp3 - tmp4;
    let m02 = tmp3 + tmp4;

    let tmp5 = y * z * t;
    let tmp6 = x * s;

    let m12 = tmp5 - tmp6;
    let m21 = tmp5 + tmp6;

    RotationMatrix::from_rows([[m00, m01, m02], [m10, m11, m12], [m20, m21, m22]])
}
