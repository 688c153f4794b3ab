use crate::ops::squared_distance;
use crate::pointcloud::PointCloud;

/// Keep the points within `radius` of `center`, boundary included.
///
/// The relative order of the kept points is preserved.
pub fn crop_around(pointcloud: &PointCloud, center: &[f64; 3], radius: f64) -> PointCloud {
    let sq_radius = radius * radius;
    let mask = pointcloud
        .points()
        .iter()
        .map(|p| squared_distance(p, center) <= sq_radius)
        .collect::<Vec<_>>();
    pointcloud.select(&mask)
}

/// Keep the points whose distance to the origin is at most `radius`.
///
/// Meant to run after recentering, so the origin is the landmark of the cloud. Cropping is
/// idempotent.
///
/// Example:
///
/// ```
/// use facecloud_3d::filters::radial_crop;
/// use facecloud_3d::pointcloud::PointCloud;
///
/// let cloud = PointCloud::new(vec![[0.0, 0.0, 1.0], [0.0, 3.0, 4.0], [0.0, 0.0, 6.0]]);
/// let cropped = radial_crop(&cloud, 5.0);
/// assert_eq!(cropped.points(), &[[0.0, 0.0, 1.0], [0.0, 3.0, 4.0]]);
/// ```
pub fn radial_crop(pointcloud: &PointCloud, radius: f64) -> PointCloud {
    crop_around(pointcloud, &[0.0; 3], radius)
}
