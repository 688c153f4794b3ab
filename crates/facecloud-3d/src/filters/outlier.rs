use std::num::NonZeroUsize;

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

use super::FilterError;
use crate::pointcloud::PointCloud;

type PointTree = ImmutableKdTree<f64, u32, 3, 32>;

/// Compute for every point the mean distance to its `k` nearest neighbors.
///
/// The point itself is not counted as a neighbor. Clouds with `k` points or fewer use all the
/// other points. A cloud with a single point gets a mean distance of zero.
///
/// PRECONDITION: `k >= 1`.
pub fn mean_neighbor_distances(points: &[[f64; 3]], k: usize) -> Vec<f64> {
    if points.len() < 2 {
        return vec![0.0; points.len()];
    }

    let kdtree: PointTree = ImmutableKdTree::new_from_slice(points);

    // query one extra neighbor since the point finds itself
    let num_neighbors = k.min(points.len() - 1);
    let Some(query_size) = NonZeroUsize::new(num_neighbors + 1) else {
        return vec![0.0; points.len()];
    };

    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let neighbors = kdtree.nearest_n::<SquaredEuclidean>(p, query_size);
            let mut sum = 0.0;
            let mut count = 0usize;
            for nn in neighbors.iter() {
                if count == num_neighbors {
                    break;
                }
                if nn.item as usize == i {
                    continue;
                }
                sum += nn.distance.sqrt();
                count += 1;
            }
            if count == 0 {
                0.0
            } else {
                sum / count as f64
            }
        })
        .collect()
}

/// Remove the points that are far from their neighbors compared to the rest of the cloud.
///
/// For every point the mean distance to its `k` nearest neighbors is computed using a k-d
/// tree. With μ and σ the mean and sample standard deviation of these distances, the points
/// whose mean distance exceeds `μ + std_ratio * σ` are removed. Surviving points keep their
/// order.
///
/// # Arguments
///
/// * `pointcloud` - The input point cloud.
/// * `k` - The number of neighbors to analyze for each point.
/// * `std_ratio` - The standard deviation multiplier of the rejection threshold.
///
/// # Errors
///
/// * [`FilterError::InvalidParameter`] if `k == 0` or `std_ratio` is not positive.
/// * [`FilterError::Exhausted`] if no point survives.
///
/// Example:
///
/// ```
/// use facecloud_3d::filters::statistical_outlier_removal;
/// use facecloud_3d::pointcloud::PointCloud;
///
/// let mut points = vec![];
/// for i in 0..5 {
///     for j in 0..5 {
///         points.push([i as f64, j as f64, 0.0]);
///     }
/// }
/// points.push([100.0, 100.0, 100.0]);
///
/// let filtered = statistical_outlier_removal(&PointCloud::new(points), 4, 1.0).unwrap();
/// assert_eq!(filtered.len(), 25);
/// ```
pub fn statistical_outlier_removal(
    pointcloud: &PointCloud,
    k: usize,
    std_ratio: f64,
) -> Result<PointCloud, FilterError> {
    if k == 0 {
        return Err(FilterError::InvalidParameter {
            name: "k",
            value: 0.0,
        });
    }
    if !(std_ratio > 0.0) {
        return Err(FilterError::InvalidParameter {
            name: "std_ratio",
            value: std_ratio,
        });
    }
    if pointcloud.is_empty() {
        return Err(FilterError::Exhausted(0));
    }

    let distances = mean_neighbor_distances(pointcloud.points(), k);

    let n = distances.len() as f64;
    let mean = distances.iter().sum::<f64>() / n;
    let std = if distances.len() > 1 {
        let var = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    } else {
        0.0
    };
    let threshold = mean + std_ratio * std;

    let mask = distances.iter().map(|&d| d <= threshold).collect::<Vec<_>>();
    let filtered = pointcloud.select(&mask);

    log::debug!(
        "statistical outlier removal: mean {:.6}, std {:.6}, kept {}/{}",
        mean,
        std,
        filtered.len(),
        pointcloud.len()
    );

    if filtered.is_empty() {
        return Err(FilterError::Exhausted(pointcloud.len()));
    }

    Ok(filtered)
}

/// Remove the points that have fewer than `min_neighbors` other points within `radius`.
///
/// # Arguments
///
/// * `pointcloud` - The input point cloud.
/// * `min_neighbors` - The minimum number of neighbors a point needs to be kept.
/// * `radius` - The radius of the neighborhood sphere.
///
/// # Errors
///
/// * [`FilterError::InvalidParameter`] if `min_neighbors == 0` or `radius` is not positive.
/// * [`FilterError::Exhausted`] if no point survives.
pub fn radius_outlier_removal(
    pointcloud: &PointCloud,
    min_neighbors: usize,
    radius: f64,
) -> Result<PointCloud, FilterError> {
    if min_neighbors == 0 {
        return Err(FilterError::InvalidParameter {
            name: "min_neighbors",
            value: 0.0,
        });
    }
    if !(radius > 0.0) {
        return Err(FilterError::InvalidParameter {
            name: "radius",
            value: radius,
        });
    }
    if pointcloud.is_empty() {
        return Err(FilterError::Exhausted(0));
    }

    let kdtree: PointTree = ImmutableKdTree::new_from_slice(pointcloud.points());
    let radius_sq = radius * radius;

    let mask = pointcloud
        .points()
        .iter()
        .map(|p| {
            // the query point is always among the results
            let found = kdtree.within_unsorted::<SquaredEuclidean>(p, radius_sq).len();
            found.saturating_sub(1) >= min_neighbors
        })
        .collect::<Vec<_>>();
    let filtered = pointcloud.select(&mask);

    log::debug!(
        "radius outlier removal: kept {}/{}",
        filtered.len(),
        pointcloud.len()
    );

    if filtered.is_empty() {
        return Err(FilterError::Exhausted(pointcloud.len()));
    }

    Ok(filtered)
}
