/// Maximum number of Jacobi sweeps for the symmetric eigen-decomposition.
const MAX_JACOBI_SWEEPS: usize = 64;

/// Transform a set of points using a rotation and translation as `dst = R * src + t`.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A row-major rotation matrix.
/// * `dst_t_src` - A translation vector.
/// * `dst_points` - A pre-allocated vector to store the transformed points.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
///
/// Example:
///
/// ```
/// use facecloud_3d::linalg::transform_points;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [0.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points(&src_points, &rotation, &translation, &mut dst_points);
/// assert_eq!(dst_points, src_points);
/// ```
pub fn transform_points(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    dst_points: &mut [[f64; 3]],
) {
    assert_eq!(src_points.len(), dst_points.len());

    if src_points.is_empty() {
        return;
    }

    // create a view of the rotation matrix
    let dst_r_src_mat = {
        // SAFETY: [[f64; 3]; 3] is laid out as 9 contiguous f64 values
        let rotation_slice =
            unsafe { std::slice::from_raw_parts(dst_r_src.as_ptr() as *const f64, 9) };
        faer::mat::from_row_major_slice(rotation_slice, 3, 3)
    };

    // create view of the source points
    let points_in_src = {
        // SAFETY: src_points_slice is a Nx3 row-major matrix where each row is a 3D point
        let src_points_slice = unsafe {
            std::slice::from_raw_parts(src_points.as_ptr() as *const f64, src_points.len() * 3)
        };
        faer::mat::from_row_major_slice(src_points_slice, src_points.len(), 3)
    };

    // create a mutable view of the destination points
    let mut points_in_dst = {
        // SAFETY: dst_points_slice is a 3xN column-major matrix where each column is a 3D point
        let dst_points_slice = unsafe {
            std::slice::from_raw_parts_mut(
                dst_points.as_mut_ptr() as *mut f64,
                dst_points.len() * 3,
            )
        };
        faer::mat::from_column_major_slice_mut(dst_points_slice, 3, dst_points.len())
    };

    // perform the matrix multiplication
    faer::linalg::matmul::matmul(
        &mut points_in_dst,
        dst_r_src_mat,
        points_in_src.transpose(),
        None,
        1.0,
        faer::Parallelism::None,
    );

    for p in dst_points.iter_mut() {
        p[0] += dst_t_src[0];
        p[1] += dst_t_src[1];
        p[2] += dst_t_src[2];
    }
}

/// Dot product of two 3D vectors.
#[inline]
pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Cross product of two 3D vectors.
#[inline]
pub fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Euclidean norm of a 3D vector.
#[inline]
pub fn norm(v: &[f64; 3]) -> f64 {
    dot(v, v).sqrt()
}

/// Scale a vector to unit length. Returns `None` for (near) zero vectors.
pub fn normalize(v: &[f64; 3]) -> Option<[f64; 3]> {
    let n = norm(v);
    if !n.is_finite() || n < 1e-12 {
        return None;
    }
    Some([v[0] / n, v[1] / n, v[2] / n])
}

/// Determinant of a 3x3 matrix.
pub fn determinant3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Compute the covariance matrix of a set of points around their centroid.
///
/// The covariance is normalized by the number of points. Returns `None` for an empty set.
///
/// Example:
///
/// ```
/// use facecloud_3d::linalg::covariance_matrix;
///
/// let points = vec![[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]];
/// let cov = covariance_matrix(&points).unwrap();
/// assert_eq!(cov[0][0], 1.0);
/// assert_eq!(cov[1][1], 0.0);
/// ```
pub fn covariance_matrix(points: &[[f64; 3]]) -> Option<[[f64; 3]; 3]> {
    let centroid = crate::ops::centroid(points)?;

    let mut cov = [[0.0; 3]; 3];
    for p in points {
        let d = [p[0] - centroid[0], p[1] - centroid[1], p[2] - centroid[2]];
        for i in 0..3 {
            for j in i..3 {
                cov[i][j] += d[i] * d[j];
            }
        }
    }

    let n = points.len() as f64;
    for i in 0..3 {
        for j in i..3 {
            cov[i][j] /= n;
            cov[j][i] = cov[i][j];
        }
    }

    Some(cov)
}

/// Result of the eigen-decomposition of a symmetric 3x3 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricEigen3 {
    /// Eigenvalues sorted in ascending order.
    pub eigenvalues: [f64; 3],
    /// Unit eigenvectors, `eigenvectors[i]` belongs to `eigenvalues[i]`.
    pub eigenvectors: [[f64; 3]; 3],
}

/// Compute the eigen-decomposition of a symmetric 3x3 matrix with cyclic Jacobi rotations.
///
/// Only the upper triangle of `matrix` is read. Eigenpairs are sorted by ascending eigenvalue;
/// equal eigenvalues keep the order of the input axes. The sign of each eigenvector is not
/// normalized, callers must resolve it.
///
/// Example:
///
/// ```
/// use facecloud_3d::linalg::symmetric_eigen3;
///
/// let m = [[3.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 2.0]];
/// let eig = symmetric_eigen3(&m);
/// assert_eq!(eig.eigenvalues, [1.0, 2.0, 3.0]);
/// assert_eq!(eig.eigenvectors[0], [0.0, 1.0, 0.0]);
/// ```
pub fn symmetric_eigen3(matrix: &[[f64; 3]; 3]) -> SymmetricEigen3 {
    let mut a = [
        [matrix[0][0], matrix[0][1], matrix[0][2]],
        [matrix[0][1], matrix[1][1], matrix[1][2]],
        [matrix[0][2], matrix[1][2], matrix[2][2]],
    ];
    // columns of v are the eigenvectors
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    for _ in 0..MAX_JACOBI_SWEEPS {
        let off_diag = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        let diag = a[0][0] * a[0][0] + a[1][1] * a[1][1] + a[2][2] * a[2][2];
        if off_diag == 0.0 || off_diag <= f64::EPSILON * f64::EPSILON * diag {
            break;
        }

        for (p, q) in [(0, 1), (0, 2), (1, 2)] {
            if a[p][q] == 0.0 {
                continue;
            }

            // rotation angle that annihilates a[p][q]
            let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            // a = a * J
            for row in a.iter_mut() {
                let (akp, akq) = (row[p], row[q]);
                row[p] = c * akp - s * akq;
                row[q] = s * akp + c * akq;
            }
            // a = J^T * a
            for k in 0..3 {
                let (apk, aqk) = (a[p][k], a[q][k]);
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            a[p][q] = 0.0;
            a[q][p] = 0.0;

            // v = v * J
            for row in v.iter_mut() {
                let (vkp, vkq) = (row[p], row[q]);
                row[p] = c * vkp - s * vkq;
                row[q] = s * vkp + c * vkq;
            }
        }
    }

    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| a[i][i].total_cmp(&a[j][j]));

    let mut eigenvalues = [0.0; 3];
    let mut eigenvectors = [[0.0; 3]; 3];
    for (dst, &src) in order.iter().enumerate() {
        eigenvalues[dst] = a[src][src];
        eigenvectors[dst] = [v[0][src], v[1][src], v[2][src]];
    }

    SymmetricEigen3 {
        eigenvalues,
        eigenvectors,
    }
}
