//! Pose alignment of a point cloud into a canonical, reproducible frame.
//!
//! Two strategies are supported:
//!
//! * [`AlignmentMode::Covariance`]: the canonical axes are the eigenvectors of the covariance
//!   matrix of the points. With eigenvalues sorted as `λ0 <= λ1 <= λ2`, the canonical axes are
//!   `x = v1`, `y = v2` (largest spread, the vertical axis of a face) and `z = v0` (smallest
//!   spread, the depth axis).
//! * [`AlignmentMode::Normal`]: the canonical depth axis is the surface normal estimated at the
//!   landmark, completed to a right-handed frame with the world axes.
//!
//! Eigenvectors are only defined up to sign, so every axis goes through the same rule:
//!
//! 1. the depth axis points along the landmark normal when one is available,
//! 2. otherwise the axis points towards the heavier tail of the points, i.e. the sign making
//!    the third moment `Σ (p · axis)³` positive,
//! 3. otherwise (symmetric distribution) the largest component of the axis is made positive.
//!
//! If the signed axes form a left-handed frame the `x` axis is negated, which is reported as
//! [`AlignmentWarning::ReflectionCorrected`].
//!
//! The resulting [`RotationMatrix`] is applied by left multiplication, `p' = R * p`.

use serde::{Deserialize, Serialize};

use crate::linalg::{self, cross, dot, normalize};
use crate::pointcloud::PointCloud;
use crate::transforms::{RotationError, RotationMatrix};

/// Relative tolerance below which the third moment is considered zero.
const SKEW_TOLERANCE: f64 = 1e-9;

/// Above this `|dot(world_x, normal)|` the frame is completed with the world Y axis.
const WORLD_AXIS_PARALLEL_LIMIT: f64 = 0.9;

/// Strategy used to estimate the canonical orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentMode {
    /// Principal axes of the covariance matrix.
    #[default]
    Covariance,
    /// Landmark surface normal as depth axis.
    Normal,
}

/// Non-fatal conditions found while estimating the alignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentWarning {
    /// Two eigenvalues are too close: the corresponding axes are not well defined and the
    /// rotation is a best effort.
    DegenerateEigenvalues {
        /// Eigenvalues in ascending order.
        eigenvalues: [f64; 3],
        /// Smallest gap between consecutive eigenvalues, relative to the largest one.
        relative_gap: f64,
    },
    /// The signed eigenvectors formed a reflection; the `x` axis was flipped.
    ReflectionCorrected,
    /// Normal mode was requested without a landmark normal; covariance mode was used.
    MissingNormal,
}

impl std::fmt::Display for AlignmentWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignmentWarning::DegenerateEigenvalues {
                eigenvalues,
                relative_gap,
            } => write!(
                f,
                "degenerate alignment: eigenvalues {eigenvalues:?}, relative gap {relative_gap:e}"
            ),
            AlignmentWarning::ReflectionCorrected => {
                write!(f, "improper rotation corrected by flipping the x axis")
            }
            AlignmentWarning::MissingNormal => {
                write!(f, "no landmark normal, fell back to covariance alignment")
            }
        }
    }
}

/// Error types for the pose module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PoseError {
    /// The cloud has no points
    #[error("Cannot align an empty point cloud")]
    EmptyCloud,

    /// The estimated axes do not form a valid rotation
    #[error("Invalid rotation estimated")]
    Rotation(#[from] RotationError),
}

/// Rotation estimated for a point cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationEstimate {
    /// Rotation mapping the input frame onto the canonical frame.
    pub rotation: RotationMatrix,
    /// Strategy actually used.
    pub mode: AlignmentMode,
    /// Covariance eigenvalues in ascending order, when covariance mode was used.
    pub eigenvalues: Option<[f64; 3]>,
    /// Non-fatal conditions found during the estimation.
    pub warnings: Vec<AlignmentWarning>,
}

/// A point cloud rotated into the canonical frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// The rotated point cloud.
    pub pointcloud: PointCloud,
    /// The rotation that was applied.
    pub estimate: RotationEstimate,
}

/// Estimate the rotation that maps the cloud onto its canonical frame.
///
/// # Arguments
///
/// * `pointcloud` - The (recentered) point cloud.
/// * `mode` - The alignment strategy.
/// * `normal` - The landmark surface normal, if one was estimated.
/// * `gap_threshold` - Relative eigenvalue gap under which the alignment is flagged as
///   degenerate.
///
/// # Errors
///
/// * [`PoseError::EmptyCloud`] if the cloud has no points.
/// * [`PoseError::Rotation`] if the axes could not be turned into a proper rotation.
pub fn estimate_rotation(
    pointcloud: &PointCloud,
    mode: AlignmentMode,
    normal: Option<&[f64; 3]>,
    gap_threshold: f64,
) -> Result<RotationEstimate, PoseError> {
    if pointcloud.is_empty() {
        return Err(PoseError::EmptyCloud);
    }

    let normal = normal.and_then(normalize);

    match (mode, normal) {
        (AlignmentMode::Normal, Some(n)) => {
            let rotation = rotation_from_normal(&n)?;
            Ok(RotationEstimate {
                rotation,
                mode: AlignmentMode::Normal,
                eigenvalues: None,
                warnings: Vec::new(),
            })
        }
        (AlignmentMode::Normal, None) => {
            log::warn!("normal alignment requested without a landmark normal");
            let mut estimate = covariance_rotation(pointcloud.points(), None, gap_threshold)?;
            estimate.warnings.insert(0, AlignmentWarning::MissingNormal);
            Ok(estimate)
        }
        (AlignmentMode::Covariance, n) => {
            covariance_rotation(pointcloud.points(), n.as_ref(), gap_threshold)
        }
    }
}

/// Estimate the canonical rotation of the cloud and apply it to every point.
///
/// See [`estimate_rotation`] for the arguments and errors.
///
/// Example:
///
/// ```
/// use facecloud_3d::pointcloud::PointCloud;
/// use facecloud_3d::pose::{align_pose, AlignmentMode};
///
/// let cloud = PointCloud::new(vec![
///     [0.0, 4.0, 0.0],
///     [0.0, -4.0, 0.0],
///     [2.0, 0.0, 0.0],
///     [-2.0, 0.0, 0.0],
///     [0.0, 0.0, 1.0],
///     [0.0, 0.0, -0.5],
/// ]);
/// let alignment = align_pose(&cloud, AlignmentMode::Covariance, None, 1e-3).unwrap();
/// assert_eq!(alignment.pointcloud.len(), cloud.len());
/// assert!((alignment.estimate.rotation.determinant() - 1.0).abs() < 1e-6);
/// ```
pub fn align_pose(
    pointcloud: &PointCloud,
    mode: AlignmentMode,
    normal: Option<&[f64; 3]>,
    gap_threshold: f64,
) -> Result<Alignment, PoseError> {
    let estimate = estimate_rotation(pointcloud, mode, normal, gap_threshold)?;
    let points = estimate.rotation.apply_points(pointcloud.points());

    Ok(Alignment {
        pointcloud: PointCloud::new(points),
        estimate,
    })
}

fn covariance_rotation(
    points: &[[f64; 3]],
    normal: Option<&[f64; 3]>,
    gap_threshold: f64,
) -> Result<RotationEstimate, PoseError> {
    let cov = linalg::covariance_matrix(points).ok_or(PoseError::EmptyCloud)?;
    let eig = linalg::symmetric_eigen3(&cov);
    let [l0, l1, l2] = eig.eigenvalues;

    let mut warnings = Vec::new();

    let relative_gap = if l2 > f64::EPSILON * l2.abs().max(1.0) {
        ((l1 - l0) / l2).min((l2 - l1) / l2)
    } else {
        0.0
    };
    if relative_gap < gap_threshold {
        log::warn!(
            "degenerate covariance: eigenvalues {:?}, relative gap {:e}",
            eig.eigenvalues,
            relative_gap
        );
        warnings.push(AlignmentWarning::DegenerateEigenvalues {
            eigenvalues: eig.eigenvalues,
            relative_gap,
        });
    }

    let z = orient_axis(&eig.eigenvectors[0], points, normal);
    let y = orient_axis(&eig.eigenvectors[2], points, None);
    let mut x = orient_axis(&eig.eigenvectors[1], points, None);

    if dot(&x, &cross(&y, &z)) < 0.0 {
        log::warn!("signed eigenvectors form a reflection, flipping the x axis");
        x = [-x[0], -x[1], -x[2]];
        warnings.push(AlignmentWarning::ReflectionCorrected);
    }

    let rotation = RotationMatrix::from_rows([x, y, z])?;

    Ok(RotationEstimate {
        rotation,
        mode: AlignmentMode::Covariance,
        eigenvalues: Some(eig.eigenvalues),
        warnings,
    })
}

/// Resolve the sign ambiguity of an axis.
fn orient_axis(axis: &[f64; 3], points: &[[f64; 3]], reference: Option<&[f64; 3]>) -> [f64; 3] {
    let flip = |v: &[f64; 3]| [-v[0], -v[1], -v[2]];

    if let Some(reference) = reference {
        let d = dot(axis, reference);
        if d.abs() > SKEW_TOLERANCE {
            return if d > 0.0 { *axis } else { flip(axis) };
        }
    }

    let (skew, magnitude) = points.iter().fold((0.0, 0.0), |(s, m), p| {
        let t = dot(p, axis);
        (s + t * t * t, m + (t * t * t).abs())
    });
    if magnitude > 0.0 && skew.abs() > SKEW_TOLERANCE * magnitude {
        return if skew > 0.0 { *axis } else { flip(axis) };
    }

    // first component with the largest magnitude
    let mut largest = 0;
    for i in 1..3 {
        if axis[i].abs() > axis[largest].abs() {
            largest = i;
        }
    }
    if axis[largest] >= 0.0 {
        *axis
    } else {
        flip(axis)
    }
}

fn rotation_from_normal(normal: &[f64; 3]) -> Result<RotationMatrix, PoseError> {
    let z = *normal;

    // project a world axis on the plane orthogonal to the normal
    let world = if dot(&[1.0, 0.0, 0.0], &z).abs() > WORLD_AXIS_PARALLEL_LIMIT {
        [0.0, 1.0, 0.0]
    } else {
        [1.0, 0.0, 0.0]
    };
    let d = dot(&world, &z);
    let projected = [world[0] - d * z[0], world[1] - d * z[1], world[2] - d * z[2]];
    let x = normalize(&projected).ok_or(RotationError::ZeroAxis)?;
    let y = cross(&z, &x);

    Ok(RotationMatrix::from_rows([x, y, z])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::euclidean_distance;
    use crate::transforms::{axis_angle_to_rotation_matrix, orthonormality_error};
    use approx::assert_relative_eq;
    use rand::Rng;

    /// An anisotropic blob with distinct spreads along x, y and z and some skew.
    fn anisotropic_cloud(n: usize) -> PointCloud {
        let mut rng = rand::rng();
        let points = (0..n)
            .map(|_| {
                let z: f64 = rng.random_range(0.0..1.0);
                [
                    rng.random_range(-3.0..3.0),
                    rng.random_range(-6.0..6.0),
                    z * z,
                ]
            })
            .collect();
        PointCloud::new(points)
    }

    fn assert_proper_rotation(rotation: &RotationMatrix) {
        let rows = rotation.rows();
        for i in 0..3 {
            assert_relative_eq!(linalg::norm(&rows[i]), 1.0, epsilon = 1e-6);
            for j in (i + 1)..3 {
                assert!(dot(&rows[i], &rows[j]).abs() < 1e-6);
            }
        }
        assert!(orthonormality_error(rows) < 1e-6);
        assert_relative_eq!(rotation.determinant(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rotation_is_proper() -> Result<(), Box<dyn std::error::Error>> {
        for _ in 0..20 {
            let cloud = anisotropic_cloud(300);
            let estimate = estimate_rotation(&cloud, AlignmentMode::Covariance, None, 1e-3)?;
            assert_proper_rotation(&estimate.rotation);
        }
        Ok(())
    }

    #[test]
    fn test_planar_cloud_depth_axis() -> Result<(), Box<dyn std::error::Error>> {
        // rectangular grid on z = 0 with distinct spreads along x and y
        let mut points = vec![];
        for i in -10..=10 {
            for j in -5..=5 {
                points.push([i as f64 * 0.5, j as f64 * 0.3, 0.0]);
            }
        }
        let cloud = PointCloud::new(points);

        let first = estimate_rotation(&cloud, AlignmentMode::Covariance, None, 1e-3)?;
        assert_eq!(first.rotation.rows()[2], [0.0, 0.0, 1.0]);
        assert_eq!(first.eigenvalues.map(|e| e[0]), Some(0.0));

        for _ in 0..5 {
            let again = estimate_rotation(&cloud, AlignmentMode::Covariance, None, 1e-3)?;
            assert_eq!(again.rotation, first.rotation);
        }
        Ok(())
    }

    #[test]
    fn test_planar_cloud_sign_follows_normal() -> Result<(), Box<dyn std::error::Error>> {
        let mut points = vec![];
        for i in -10..=10 {
            for j in -5..=5 {
                points.push([i as f64 * 0.5, j as f64 * 0.3, 0.0]);
            }
        }
        let cloud = PointCloud::new(points);
        let estimate =
            estimate_rotation(&cloud, AlignmentMode::Covariance, Some(&[0.0, 0.1, -2.0]), 1e-3)?;
        assert_eq!(estimate.rotation.rows()[2], [0.0, 0.0, -1.0]);
        assert_proper_rotation(&estimate.rotation);
        Ok(())
    }

    #[test]
    fn test_rotationally_symmetric_cloud_is_degenerate() -> Result<(), Box<dyn std::error::Error>>
    {
        // circle in the xy plane: the two in-plane eigenvalues are equal
        let points = (0..360)
            .map(|i| {
                let t = (i as f64).to_radians();
                [t.cos() * 5.0, t.sin() * 5.0, 0.0]
            })
            .collect();
        let cloud = PointCloud::new(points);

        let estimate = estimate_rotation(&cloud, AlignmentMode::Covariance, None, 1e-3)?;
        assert!(estimate
            .warnings
            .iter()
            .any(|w| matches!(w, AlignmentWarning::DegenerateEigenvalues { .. })));
        // still a best effort proper rotation
        assert_proper_rotation(&estimate.rotation);
        Ok(())
    }

    #[test]
    fn test_left_handed_axes_are_corrected() -> Result<(), Box<dyn std::error::Error>> {
        // centered on the origin with diagonal covariance, spread z < x < y
        // third moments: negative along x, positive along y and z
        let points = vec![
            [-4.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, -6.0, 0.0],
            [0.0, -6.0, 0.0],
            [0.0, 12.0, 0.0],
            [0.0, 0.0, -1.0],
            [0.0, 0.0, -1.0],
            [0.0, 0.0, 2.0],
        ];
        // signed on its own the x axis points to -x, making (x, y, z) left-handed
        assert_eq!(orient_axis(&[1.0, 0.0, 0.0], &points, None), [-1.0, 0.0, 0.0]);

        let cloud = PointCloud::new(points);
        let estimate = estimate_rotation(&cloud, AlignmentMode::Covariance, None, 1e-3)?;
        assert_eq!(estimate.warnings, vec![AlignmentWarning::ReflectionCorrected]);

        let rows = estimate.rotation.rows();
        assert_eq!(rows[0], [1.0, 0.0, 0.0]);
        assert_eq!(rows[1], [0.0, 1.0, 0.0]);
        assert_eq!(rows[2], [0.0, 0.0, 1.0]);
        assert_relative_eq!(estimate.rotation.determinant(), 1.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_single_point_is_degenerate() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = PointCloud::new(vec![[1.0, 2.0, 3.0]]);
        let estimate = estimate_rotation(&cloud, AlignmentMode::Covariance, None, 1e-3)?;
        assert!(matches!(
            estimate.warnings.first(),
            Some(AlignmentWarning::DegenerateEigenvalues { .. })
        ));
        assert_proper_rotation(&estimate.rotation);
        Ok(())
    }

    #[test]
    fn test_empty_cloud() {
        let res = estimate_rotation(&PointCloud::default(), AlignmentMode::Covariance, None, 1e-3);
        assert_eq!(res, Err(PoseError::EmptyCloud));
    }

    #[test]
    fn test_alignment_is_pose_invariant() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = anisotropic_cloud(2000);
        let centroid = cloud.centroid().unwrap();
        let cloud = crate::ops::recenter(&cloud, &centroid);

        let rotation = axis_angle_to_rotation_matrix(&[0.3, -1.0, 0.5], 1.2)?;
        let rotated = PointCloud::new(rotation.apply_points(cloud.points()));

        let a = align_pose(&cloud, AlignmentMode::Covariance, None, 1e-3)?;
        let b = align_pose(&rotated, AlignmentMode::Covariance, None, 1e-3)?;

        // both scans end up in the same canonical frame
        for (p, q) in a.pointcloud.points().iter().zip(b.pointcloud.points()) {
            for i in 0..3 {
                assert_relative_eq!(p[i], q[i], epsilon = 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn test_alignment_preserves_distances() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = anisotropic_cloud(200);
        let aligned = align_pose(&cloud, AlignmentMode::Covariance, None, 1e-3)?;
        let (src, dst) = (cloud.points(), aligned.pointcloud.points());
        for (i, j) in [(0, 1), (10, 100), (42, 199), (7, 8)] {
            assert_relative_eq!(
                euclidean_distance(&src[i], &src[j]),
                euclidean_distance(&dst[i], &dst[j]),
                epsilon = 1e-9
            );
        }
        Ok(())
    }

    #[test]
    fn test_normal_mode() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = anisotropic_cloud(50);
        let normal = [1.0, 2.0, 2.0];
        let estimate = estimate_rotation(&cloud, AlignmentMode::Normal, Some(&normal), 1e-3)?;
        assert_eq!(estimate.mode, AlignmentMode::Normal);
        assert!(estimate.warnings.is_empty());
        assert_proper_rotation(&estimate.rotation);

        // the normal becomes the depth axis
        let mapped = estimate.rotation.apply(&[1.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0]);
        assert_relative_eq!(mapped[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(mapped[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(mapped[2], 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_normal_mode_parallel_to_world_x() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = anisotropic_cloud(10);
        let estimate =
            estimate_rotation(&cloud, AlignmentMode::Normal, Some(&[-1.0, 0.0, 0.0]), 1e-3)?;
        assert_proper_rotation(&estimate.rotation);
        assert_eq!(estimate.rotation.rows()[2], [-1.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_normal_mode_without_normal_falls_back() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = anisotropic_cloud(100);
        let estimate = estimate_rotation(&cloud, AlignmentMode::Normal, None, 1e-3)?;
        assert_eq!(estimate.mode, AlignmentMode::Covariance);
        assert_eq!(estimate.warnings.first(), Some(&AlignmentWarning::MissingNormal));

        // a zero normal counts as missing
        let estimate =
            estimate_rotation(&cloud, AlignmentMode::Normal, Some(&[0.0, 0.0, 0.0]), 1e-3)?;
        assert_eq!(estimate.mode, AlignmentMode::Covariance);
        Ok(())
    }

    #[test]
    fn test_orient_axis_rules() {
        let axis = [0.0, 0.0, -1.0];
        // reference wins
        assert_eq!(orient_axis(&axis, &[], Some(&[0.0, 0.0, -3.0])), [0.0, 0.0, -1.0]);
        // skew: most of the mass near zero, long tail towards +z
        let points = [[0.0, 0.0, -1.0], [0.0, 0.0, -1.0], [0.0, 0.0, 2.0]];
        assert_eq!(orient_axis(&axis, &points, None), [0.0, 0.0, 1.0]);
        // symmetric: largest component positive
        let points = [[0.0, 0.0, -1.0], [0.0, 0.0, 1.0]];
        assert_eq!(orient_axis(&axis, &points, None), [0.0, 0.0, 1.0]);
    }
}
