use crate::pointcloud::PointCloud;

/// Utility function to compute the Euclidean distance between two points.
///
/// # Arguments
///
/// * `a` - A point in 3D space.
/// * `b` - Another point in 3D space.
///
/// # Returns
///
/// The Euclidean distance between the two points.
///
/// Example:
/// ```
/// use facecloud_3d::ops::euclidean_distance;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 5.0, 6.0];
/// let dst = euclidean_distance(&a, &b);
/// ```
pub fn euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Squared Euclidean distance between two points.
#[inline]
pub fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Compute the centroid (arithmetic mean) of a set of points.
///
/// Returns `None` if the set is empty.
pub fn centroid(points: &[[f64; 3]]) -> Option<[f64; 3]> {
    if points.is_empty() {
        return None;
    }

    let sum = points.iter().fold([0.0; 3], |mut acc, p| {
        acc[0] += p[0];
        acc[1] += p[1];
        acc[2] += p[2];
        acc
    });
    let n = points.len() as f64;

    Some([sum[0] / n, sum[1] / n, sum[2] / n])
}

/// Translate the point cloud so that `reference` ends up at the origin.
///
/// Every point is moved by `origin - reference`. The number and order of the points is
/// unchanged and no rotation or scaling is applied.
///
/// Example:
///
/// ```
/// use facecloud_3d::ops::recenter;
/// use facecloud_3d::pointcloud::PointCloud;
///
/// let cloud = PointCloud::new(vec![[1.0, 2.0, 3.0], [2.0, 2.0, 2.0]]);
/// let centered = recenter(&cloud, &[1.0, 2.0, 3.0]);
/// assert_eq!(centered.points()[0], [0.0, 0.0, 0.0]);
/// assert_eq!(centered.points()[1], [1.0, 0.0, -1.0]);
/// ```
pub fn recenter(pointcloud: &PointCloud, reference: &[f64; 3]) -> PointCloud {
    let points = pointcloud
        .points()
        .iter()
        .map(|p| [p[0] - reference[0], p[1] - reference[1], p[2] - reference[2]])
        .collect();
    PointCloud::new(points)
}
