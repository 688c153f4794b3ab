use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use facecloud_3d::filters::{self, FilterError};
use facecloud_3d::io::xyz::{self, XyzError};
use facecloud_3d::ops;
use facecloud_3d::pointcloud::PointCloud;
use facecloud_3d::pose::{self, AlignmentMode, AlignmentWarning, PoseError};
use facecloud_3d::transforms::RotationMatrix;
use facecloud_landmark::{Landmark, LandmarkLocator};

use crate::config::PipelineConfig;

/// Error types for a single run of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input cloud could not be loaded
    #[error("Failed to load the point cloud")]
    Load(#[source] XyzError),

    /// The output cloud could not be written
    #[error("Failed to write the point cloud")]
    Write(#[source] XyzError),

    /// The input cloud has no points
    #[error("The input point cloud is empty")]
    EmptyInput,

    /// A denoising filter failed
    #[error("Denoising failed")]
    Filter(#[from] FilterError),

    /// The pose alignment failed
    #[error("Pose alignment failed")]
    Pose(#[from] PoseError),

    /// The run was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// No point is left after cropping
    #[error("No point within {radius} of the reference")]
    EmptyResult {
        /// The crop radius.
        radius: f64,
    },
}

/// Shared flag used to stop runs early.
///
/// Cloning the token shares the flag. The pipeline checks it before every stage.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the cancellation of the runs sharing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if the cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

/// Where the recentering reference comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSource {
    /// The landmark returned by the locator.
    Landmark,
    /// The centroid of the cloud, used when no landmark was found or no locator ran.
    CentroidFallback,
}

/// The point moved to the origin by the recentering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reference {
    /// The reference point, in the frame of the input cloud.
    pub point: [f64; 3],
    /// Where the point comes from.
    pub source: ReferenceSource,
}

/// Summary of a single run of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    /// Number of points of the input cloud.
    pub input_points: usize,
    /// Number of points after outlier removal, if it ran.
    pub denoised_points: Option<usize>,
    /// Number of points after voxel downsampling, if it ran.
    pub downsampled_points: Option<usize>,
    /// The landmark returned by the locator, if any.
    pub landmark: Option<Landmark>,
    /// The recentering reference.
    pub reference: Reference,
    /// The applied rotation, if the alignment ran.
    pub rotation: Option<RotationMatrix>,
    /// The alignment strategy actually used, if the alignment ran.
    pub alignment_mode: Option<AlignmentMode>,
    /// Non-fatal alignment conditions.
    pub warnings: Vec<AlignmentWarning>,
    /// Number of points of the output cloud.
    pub output_points: usize,
}

/// The canonicalized cloud and the report of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// The canonicalized cloud.
    pub pointcloud: PointCloud,
    /// What happened during the run.
    pub report: PipelineReport,
}

/// Canonicalization pipeline for a single face scan.
///
/// The stages run in a fixed order: outlier removal, voxel downsampling, landmark location,
/// recentering, pose alignment and radial crop. Every stage except the recentering can be
/// disabled through [`crate::config::StageToggles`].
pub struct Pipeline {
    config: PipelineConfig,
    locator: Option<Box<dyn LandmarkLocator>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("locator", &self.locator.is_some())
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline without landmark locator: the centroid is used as reference.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            locator: None,
        }
    }

    /// Set the landmark locator.
    pub fn with_locator(mut self, locator: impl LandmarkLocator + 'static) -> Self {
        self.locator = Some(Box::new(locator));
        self
    }

    /// Get the configuration of the pipeline.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Canonicalize a point cloud.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::EmptyInput`] if the cloud has no points.
    /// * [`PipelineError::Filter`] if the denoising removed every point.
    /// * [`PipelineError::EmptyResult`] if no point is left after cropping.
    /// * [`PipelineError::Cancelled`] if `cancel` was triggered.
    pub fn run(
        &self,
        pointcloud: &PointCloud,
        cancel: &CancelToken,
    ) -> Result<PipelineOutput, PipelineError> {
        let start = Instant::now();
        let stages = self.config.stages();

        if pointcloud.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let mut cloud = pointcloud.clone();
        let mut denoised_points = None;
        let mut downsampled_points = None;

        if stages.denoise {
            cancel.check()?;
            cloud = filters::statistical_outlier_removal(
                &cloud,
                self.config.outlier_neighbor_count(),
                self.config.outlier_std_ratio(),
            )?;
            if let Some(params) = self.config.radius_outlier() {
                cloud = filters::radius_outlier_removal(&cloud, params.min_neighbors, params.radius)?;
            }
            denoised_points = Some(cloud.len());
        }

        if stages.downsample {
            cancel.check()?;
            cloud = filters::voxel_downsample(&cloud, self.config.voxel_leaf_size())?;
            downsampled_points = Some(cloud.len());
        }

        cancel.check()?;
        let landmark = if stages.locate_landmark {
            self.locate(&cloud)
        } else {
            None
        };

        let reference = match landmark {
            Some(landmark) => Reference {
                point: landmark.position,
                source: ReferenceSource::Landmark,
            },
            None => {
                let point = cloud.centroid().ok_or(PipelineError::EmptyInput)?;
                log::debug!("using the centroid {point:?} as reference");
                Reference {
                    point,
                    source: ReferenceSource::CentroidFallback,
                }
            }
        };

        cloud = ops::recenter(&cloud, &reference.point);

        let mut rotation = None;
        let mut alignment_mode = None;
        let mut warnings = Vec::new();

        if stages.align {
            cancel.check()?;
            let normal = landmark.and_then(|l| l.normal);
            let alignment = pose::align_pose(
                &cloud,
                self.config.alignment_mode(),
                normal.as_ref(),
                self.config.degenerate_gap_threshold(),
            )?;
            cloud = alignment.pointcloud;
            rotation = Some(alignment.estimate.rotation);
            alignment_mode = Some(alignment.estimate.mode);
            warnings = alignment.estimate.warnings;
        }

        if stages.crop {
            cancel.check()?;
            cloud = filters::radial_crop(&cloud, self.config.crop_radius());
            if cloud.is_empty() {
                return Err(PipelineError::EmptyResult {
                    radius: self.config.crop_radius(),
                });
            }
        }

        log::debug!(
            "canonicalized {} -> {} points in {:?}",
            pointcloud.len(),
            cloud.len(),
            start.elapsed()
        );

        let report = PipelineReport {
            input_points: pointcloud.len(),
            denoised_points,
            downsampled_points,
            landmark,
            reference,
            rotation,
            alignment_mode,
            warnings,
            output_points: cloud.len(),
        };

        Ok(PipelineOutput {
            pointcloud: cloud,
            report,
        })
    }

    /// Canonicalize the cloud stored in `input` and write the result to `output`.
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::run`], plus [`PipelineError::Load`] and [`PipelineError::Write`].
    pub fn run_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        cancel: &CancelToken,
    ) -> Result<PipelineReport, PipelineError> {
        let pointcloud = xyz::read_xyz(input).map_err(PipelineError::Load)?;
        let result = self.run(&pointcloud, cancel)?;
        // nothing is written once cancelled
        cancel.check()?;
        xyz::write_xyz(output, &result.pointcloud).map_err(PipelineError::Write)?;
        Ok(result.report)
    }

    fn locate(&self, cloud: &PointCloud) -> Option<Landmark> {
        let locator = self.locator.as_ref()?;
        match locator.locate(cloud) {
            Ok(Some(landmark)) => {
                log::debug!("landmark found at {:?}", landmark.position);
                Some(landmark)
            }
            Ok(None) => {
                log::warn!("landmark not found, falling back to the centroid");
                None
            }
            Err(e) => {
                log::warn!("landmark locator failed ({e}), falling back to the centroid");
                None
            }
        }
    }
}
