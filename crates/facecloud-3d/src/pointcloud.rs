/// An ordered set of 3D points.
///
/// The order of the points carries no geometric meaning, but every operation in this crate
/// preserves it so that the same input always produces the same output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
}

impl PointCloud {
    /// Create a new point cloud from a list of points.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Consume the point cloud and return the points.
    pub fn into_points(self) -> Vec<[f64; 3]> {
        self.points
    }

    /// Get the centroid of the point cloud, or `None` if the cloud is empty.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        crate::ops::centroid(&self.points)
    }

    /// Get the minimum bound of the point cloud, or `None` if the cloud is empty.
    pub fn min_bound(&self) -> Option<[f64; 3]> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold(first, |acc, p| {
            [acc[0].min(p[0]), acc[1].min(p[1]), acc[2].min(p[2])]
        }))
    }

    /// Get the maximum bound of the point cloud, or `None` if the cloud is empty.
    pub fn max_bound(&self) -> Option<[f64; 3]> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold(first, |acc, p| {
            [acc[0].max(p[0]), acc[1].max(p[1]), acc[2].max(p[2])]
        }))
    }

    /// Create a new point cloud keeping only the points whose mask entry is `true`.
    ///
    /// PRECONDITION: `mask` has one entry per point.
    pub(crate) fn select(&self, mask: &[bool]) -> PointCloud {
        debug_assert_eq!(mask.len(), self.points.len());
        let points = self
            .points
            .iter()
            .zip(mask.iter())
            .filter_map(|(p, &keep)| keep.then_some(*p))
            .collect();
        PointCloud::new(points)
    }
}

impl From<Vec<[f64; 3]>> for PointCloud {
    fn from(points: Vec<[f64; 3]>) -> Self {
        Self::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointcloud() {
        let pointcloud = PointCloud::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);

        assert_eq!(pointcloud.len(), 2);
        assert!(!pointcloud.is_empty());

        if let Some(p0) = pointcloud.points().first() {
            assert_eq!(p0[0], 0.0);
            assert_eq!(p0[1], 0.0);
            assert_eq!(p0[2], 0.0);
        }

        if let Some(p1) = pointcloud.points().last() {
            assert_eq!(p1[0], 1.0);
            assert_eq!(p1[1], 0.0);
            assert_eq!(p1[2], 0.0);
        }
    }

    #[test]
    fn test_pointcloud_bounds() {
        let pointcloud = PointCloud::new(vec![[1.0, -2.0, 3.0], [-1.0, 4.0, 0.5]]);
        assert_eq!(pointcloud.min_bound(), Some([-1.0, -2.0, 0.5]));
        assert_eq!(pointcloud.max_bound(), Some([1.0, 4.0, 3.0]));
        assert_eq!(pointcloud.centroid(), Some([0.0, 1.0, 1.75]));
    }

    #[test]
    fn test_pointcloud_empty() {
        let pointcloud = PointCloud::default();
        assert!(pointcloud.is_empty());
        assert_eq!(pointcloud.min_bound(), None);
        assert_eq!(pointcloud.centroid(), None);
    }

    #[test]
    fn test_pointcloud_select_keeps_order() {
        let pointcloud = PointCloud::new(vec![[0.0; 3], [1.0; 3], [2.0; 3], [3.0; 3]]);
        let selected = pointcloud.select(&[true, false, true, true]);
        assert_eq!(selected.points(), &[[0.0; 3], [2.0; 3], [3.0; 3]]);
    }
}
