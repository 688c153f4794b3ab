use std::collections::HashMap;

use super::FilterError;
use crate::pointcloud::PointCloud;

#[derive(Debug, Clone)]
struct Voxel {
    sum: [f64; 3],
    count: usize,
}

/// A voxel grid for organizing and downsampling point clouds.
///
/// Voxels are cubes of side `leaf_size` anchored at `origin`. The grid remembers the order in
/// which voxels were first occupied so that downsampling is deterministic.
pub struct VoxelGrid {
    leaf_size: f64,
    origin: [f64; 3],
    index: HashMap<[i64; 3], usize>,
    voxels: Vec<Voxel>,
}

impl VoxelGrid {
    /// Create a new VoxelGrid with the specified leaf size and origin.
    ///
    /// # Errors
    ///
    /// [`FilterError::InvalidParameter`] if `leaf_size` is not a positive finite number.
    pub fn new(leaf_size: f64, origin: [f64; 3]) -> Result<Self, FilterError> {
        if !(leaf_size > 0.0 && leaf_size.is_finite()) {
            return Err(FilterError::InvalidParameter {
                name: "leaf_size",
                value: leaf_size,
            });
        }
        Ok(Self {
            leaf_size,
            origin,
            index: HashMap::new(),
            voxels: Vec::new(),
        })
    }

    /// Add points from a point cloud to the voxel grid.
    pub fn add_points(&mut self, pointcloud: &PointCloud) {
        for point in pointcloud.points() {
            let voxel_index = self.compute_voxel_index(point);
            let slot = *self.index.entry(voxel_index).or_insert_with(|| {
                self.voxels.push(Voxel {
                    sum: [0.0; 3],
                    count: 0,
                });
                self.voxels.len() - 1
            });
            let voxel = &mut self.voxels[slot];
            voxel.sum[0] += point[0];
            voxel.sum[1] += point[1];
            voxel.sum[2] += point[2];
            voxel.count += 1;
        }
    }

    /// Compute the voxel index for a given point.
    pub fn compute_voxel_index(&self, point: &[f64; 3]) -> [i64; 3] {
        [
            ((point[0] - self.origin[0]) / self.leaf_size).floor() as i64,
            ((point[1] - self.origin[1]) / self.leaf_size).floor() as i64,
            ((point[2] - self.origin[2]) / self.leaf_size).floor() as i64,
        ]
    }

    /// Number of occupied voxels.
    pub fn num_voxels(&self) -> usize {
        self.voxels.len()
    }

    /// Downsample the point cloud by averaging points in each voxel.
    ///
    /// Voxels are emitted in the order they were first occupied.
    pub fn downsample(&self) -> PointCloud {
        let points = self
            .voxels
            .iter()
            .map(|voxel| {
                let n = voxel.count as f64;
                [voxel.sum[0] / n, voxel.sum[1] / n, voxel.sum[2] / n]
            })
            .collect();
        PointCloud::new(points)
    }
}

/// Replace all the points falling in the same cube of side `leaf_size` by their centroid.
///
/// The grid is anchored at the minimum bound of the cloud. The output never has more points
/// than the input.
///
/// Example:
///
/// ```
/// use facecloud_3d::filters::voxel_downsample;
/// use facecloud_3d::pointcloud::PointCloud;
///
/// let cloud = PointCloud::new(vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5], [3.0, 3.0, 3.0]]);
/// let downsampled = voxel_downsample(&cloud, 1.0).unwrap();
/// assert_eq!(downsampled.points(), &[[0.25, 0.25, 0.25], [3.0, 3.0, 3.0]]);
/// ```
pub fn voxel_downsample(pointcloud: &PointCloud, leaf_size: f64) -> Result<PointCloud, FilterError> {
    let Some(origin) = pointcloud.min_bound() else {
        return Ok(PointCloud::default());
    };

    let mut voxel_grid = VoxelGrid::new(leaf_size, origin)?;
    voxel_grid.add_points(pointcloud);
    let downsampled = voxel_grid.downsample();

    log::debug!(
        "voxel downsample (leaf {}): {} -> {} points",
        leaf_size,
        pointcloud.len(),
        downsampled.len()
    );

    Ok(downsampled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    #[test]
    fn test_voxel_grid() -> Result<(), FilterError> {
        let pointcloud = PointCloud::new(vec![
            [0.0, 0.0, 0.0],
            [0.1, 0.1, 0.1],
            [1.0, 1.0, 1.0],
            [1.1, 1.1, 1.1],
        ]);

        let mut voxel_grid = VoxelGrid::new(1.0, [0.0, 0.0, 0.0])?;
        voxel_grid.add_points(&pointcloud);
        let downsampled = voxel_grid.downsample();

        assert_eq!(voxel_grid.num_voxels(), 2);
        assert_eq!(downsampled.len(), 2);
        assert_relative_eq!(downsampled.points()[0][0], 0.05);
        assert_relative_eq!(downsampled.points()[1][2], 1.05);
        Ok(())
    }

    #[test]
    fn test_voxel_grid_invalid_leaf() {
        assert!(VoxelGrid::new(0.0, [0.0; 3]).is_err());
        assert!(VoxelGrid::new(-1.0, [0.0; 3]).is_err());
        assert!(VoxelGrid::new(f64::NAN, [0.0; 3]).is_err());
        assert!(voxel_downsample(&PointCloud::new(vec![[0.0; 3]]), 0.0).is_err());
    }

    #[test]
    fn test_voxel_downsample_matches_direct_average() -> Result<(), FilterError> {
        let mut rng = rand::rng();
        let points = (0..2000)
            .map(|_| {
                [
                    rng.random_range(-5.0..5.0),
                    rng.random_range(-5.0..5.0),
                    rng.random_range(-5.0..5.0),
                ]
            })
            .collect::<Vec<[f64; 3]>>();
        let cloud = PointCloud::new(points);
        let leaf = 1.5;
        let downsampled = voxel_downsample(&cloud, leaf)?;

        // direct implementation: group by voxel in a sorted map and average
        let origin = cloud.min_bound().unwrap();
        let mut groups: std::collections::BTreeMap<[i64; 3], Vec<[f64; 3]>> =
            Default::default();
        for p in cloud.points() {
            let idx = [
                ((p[0] - origin[0]) / leaf).floor() as i64,
                ((p[1] - origin[1]) / leaf).floor() as i64,
                ((p[2] - origin[2]) / leaf).floor() as i64,
            ];
            groups.entry(idx).or_default().push(*p);
        }

        assert!(downsampled.len() <= cloud.len());
        assert_eq!(downsampled.len(), groups.len());

        for expected in groups.values() {
            let c = crate::ops::centroid(expected).unwrap();
            let found = downsampled
                .points()
                .iter()
                .any(|p| (0..3).all(|i| (p[i] - c[i]).abs() < 1e-9));
            assert!(found, "missing voxel centroid {c:?}");
        }

        Ok(())
    }

    #[test]
    fn test_voxel_downsample_is_deterministic() -> Result<(), FilterError> {
        let cloud = PointCloud::new(
            (0..500)
                .map(|i| {
                    let t = i as f64 * 0.37;
                    [t.sin() * 10.0, t.cos() * 10.0, t * 0.1]
                })
                .collect(),
        );
        let a = voxel_downsample(&cloud, 0.8)?;
        let b = voxel_downsample(&cloud, 0.8)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_voxel_downsample_empty() -> Result<(), FilterError> {
        let downsampled = voxel_downsample(&PointCloud::default(), 1.0)?;
        assert!(downsampled.is_empty());
        Ok(())
    }
}
