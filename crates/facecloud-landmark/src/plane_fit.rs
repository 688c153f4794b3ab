use facecloud_3d::linalg::{dot, normalize};
use facecloud_3d::pointcloud::PointCloud;

use crate::{Landmark, LandmarkLocator, LocatorError};

/// Locates the nose tip as the point farthest from the best fit plane of the face.
///
/// The plane goes through the centroid of the cloud. Its normal is taken from the dispersion
/// matrix of the points: the axis whose cofactor determinant is the largest is solved for, which
/// gives the least squares plane without an eigen-decomposition. The nose tip is the point with
/// the largest signed distance on the positive side of the plane and the plane normal is
/// reported as the landmark normal.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneFitLocator;

/// A plane given by a point and a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// A point of the plane.
    pub point: [f64; 3],
    /// Unit normal of the plane.
    pub normal: [f64; 3],
}

/// Fit a plane through `reference` minimizing the squared distances to `points`.
///
/// Returns `None` for fewer than three points or when the points are collinear.
pub fn dispersion_plane(points: &[[f64; 3]], reference: &[f64; 3]) -> Option<Plane> {
    if points.len() < 3 {
        return None;
    }

    let (mut xx, mut xy, mut xz, mut yy, mut yz, mut zz) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    for p in points {
        let r = [p[0] - reference[0], p[1] - reference[1], p[2] - reference[2]];
        xx += r[0] * r[0];
        xy += r[0] * r[1];
        xz += r[0] * r[2];
        yy += r[1] * r[1];
        yz += r[1] * r[2];
        zz += r[2] * r[2];
    }

    let det_x = yy * zz - yz * yz;
    let det_y = xx * zz - xz * xz;
    let det_z = xx * yy - xy * xy;

    let det_max = det_x.max(det_y).max(det_z);
    if !(det_max > 0.0) {
        return None;
    }

    let normal = if det_max == det_x {
        [det_x, xz * yz - xy * zz, xy * yz - xz * yy]
    } else if det_max == det_y {
        [xz * yz - xy * zz, det_y, xy * xz - yz * xx]
    } else {
        [xy * yz - xz * yy, xy * xz - yz * xx, det_z]
    };

    Some(Plane {
        point: *reference,
        normal: normalize(&normal)?,
    })
}

/// Find the point with the largest signed distance to `plane`, only looking at the positive
/// side. On ties the last point wins.
pub fn farthest_from_plane(points: &[[f64; 3]], plane: &Plane) -> Option<[f64; 3]> {
    let mut best: Option<([f64; 3], f64)> = None;
    for p in points {
        let r = [
            p[0] - plane.point[0],
            p[1] - plane.point[1],
            p[2] - plane.point[2],
        ];
        let d = dot(&r, &plane.normal);
        if d < 0.0 {
            continue;
        }
        if best.map_or(true, |(_, max)| d >= max) {
            best = Some((*p, d));
        }
    }
    best.map(|(p, _)| p)
}

impl LandmarkLocator for PlaneFitLocator {
    fn locate(&self, pointcloud: &PointCloud) -> Result<Option<Landmark>, LocatorError> {
        let Some(centroid) = pointcloud.centroid() else {
            return Ok(None);
        };
        let Some(plane) = dispersion_plane(pointcloud.points(), &centroid) else {
            log::debug!("no best fit plane for {} points", pointcloud.len());
            return Ok(None);
        };

        let landmark = farthest_from_plane(pointcloud.points(), &plane).map(|tip| Landmark {
            position: tip,
            normal: Some(plane.normal),
        });

        log::debug!("plane fit landmark: {:?}", landmark);

        Ok(landmark)
    }
}
