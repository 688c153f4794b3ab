#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Batch processing of a directory of point clouds.
pub mod batch;

/// Validated pipeline configuration.
pub mod config;

/// Canonicalization of a single point cloud.
pub mod pipeline;

pub use batch::{BatchError, BatchRunner, BatchSummary, FileReport, FileStatus};
pub use config::{ConfigError, PipelineConfig, RadiusOutlierParams, StageToggles};
pub use pipeline::{
    CancelToken, Pipeline, PipelineError, PipelineOutput, PipelineReport, Reference,
    ReferenceSource,
};
