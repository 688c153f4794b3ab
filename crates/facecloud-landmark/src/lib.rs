#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

use facecloud_3d::pointcloud::PointCloud;

/// Nose tip estimation by running an external program.
pub mod external;

/// Parser for the output of landmark programs.
pub mod parser;

/// Native nose tip estimation from a best fit plane.
pub mod plane_fit;

pub use external::ExternalLocator;
pub use parser::parse_locator_output;
pub use plane_fit::PlaneFitLocator;

/// A reference point of a face scan with an optional surface normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// Location of the landmark, in the frame of the input cloud.
    pub position: [f64; 3],
    /// Unit surface normal at the landmark, if it could be estimated.
    pub normal: Option<[f64; 3]>,
}

impl Landmark {
    /// Create a landmark without normal.
    pub fn new(position: [f64; 3]) -> Self {
        Self {
            position,
            normal: None,
        }
    }

    /// Attach a normal to the landmark. Zero normals are dropped and others scaled to unit
    /// length.
    pub fn with_normal(mut self, normal: [f64; 3]) -> Self {
        self.normal = facecloud_3d::linalg::normalize(&normal);
        self
    }
}

/// Error types for the landmark locators.
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    /// Reading or writing the exchange files failed
    #[error("Locator I/O error")]
    Io(#[from] std::io::Error),

    /// The locator program did not terminate in time
    #[error("Locator program timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The locator program could not be started
    #[error("Failed to spawn locator program {program}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Estimates the landmark of a point cloud.
///
/// Implementations must be idempotent: locating the same cloud twice returns the same result.
/// A landmark that cannot be found is `Ok(None)`, errors are reserved for failures of the
/// locator itself.
pub trait LandmarkLocator: Send + Sync {
    /// Locate the landmark of `pointcloud`.
    fn locate(&self, pointcloud: &PointCloud) -> Result<Option<Landmark>, LocatorError>;
}

impl<T: LandmarkLocator + ?Sized> LandmarkLocator for Box<T> {
    fn locate(&self, pointcloud: &PointCloud) -> Result<Option<Landmark>, LocatorError> {
        (**self).locate(pointcloud)
    }
}

impl<T: LandmarkLocator + ?Sized> LandmarkLocator for std::sync::Arc<T> {
    fn locate(&self, pointcloud: &PointCloud) -> Result<Option<Landmark>, LocatorError> {
        (**self).locate(pointcloud)
    }
}
