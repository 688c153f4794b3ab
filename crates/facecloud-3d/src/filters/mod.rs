mod crop;
mod outlier;
mod voxel;

pub use crop::*;
pub use outlier::*;
pub use voxel::*;

/// Error types for the filters module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    /// The filter would remove every point of the cloud
    #[error("Filter removed all {0} points, check the filter parameters")]
    Exhausted(usize),

    /// A filter parameter is out of range
    #[error("Invalid filter parameter {name}: {value}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
}
