#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Point cloud filters: outlier removal, voxel downsampling and radial cropping.
pub mod filters;

/// I/O utilities for reading and writing point clouds.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Operations on 3D data processing.
pub mod ops;

/// Point cloud container.
pub mod pointcloud;

/// Pose alignment of point clouds into a canonical frame.
pub mod pose;

/// 3D transforms algorithms.
pub mod transforms;
