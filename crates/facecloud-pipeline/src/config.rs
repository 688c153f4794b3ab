use std::path::Path;

use facecloud_3d::pose::AlignmentMode;
use serde::{Deserialize, Serialize};

/// Error types for the pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value is out of its valid range
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        name: &'static str,
        /// What is wrong with the value.
        reason: String,
    },

    /// The configuration file could not be read
    #[error("Failed to read the configuration file")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for a configuration
    #[error("Failed to parse the configuration")]
    Json(#[from] serde_json::Error),
}

/// Parameters of the radius outlier filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RadiusOutlierParams {
    /// Minimum number of other points a point needs within `radius` to be kept.
    pub min_neighbors: usize,
    /// Radius of the neighborhood.
    pub radius: f64,
}

/// Enables or disables the individual stages of the pipeline.
///
/// Recentering always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageToggles {
    /// Outlier removal.
    pub denoise: bool,
    /// Voxel grid downsampling.
    pub downsample: bool,
    /// Landmark location. When disabled the centroid is the reference.
    pub locate_landmark: bool,
    /// Pose alignment.
    pub align: bool,
    /// Radial crop around the reference.
    pub crop: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            denoise: true,
            downsample: true,
            locate_landmark: true,
            align: true,
            crop: true,
        }
    }
}

/// Raw configuration as read from a file, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    voxel_leaf_size: f64,
    outlier_neighbor_count: usize,
    outlier_std_ratio: f64,
    crop_radius: f64,
    alignment_mode: AlignmentMode,
    degenerate_gap_threshold: f64,
    radius_outlier: Option<RadiusOutlierParams>,
    stages: StageToggles,
}

impl Default for RawConfig {
    fn default() -> Self {
        let c = PipelineConfig::default();
        Self {
            voxel_leaf_size: c.voxel_leaf_size,
            outlier_neighbor_count: c.outlier_neighbor_count,
            outlier_std_ratio: c.outlier_std_ratio,
            crop_radius: c.crop_radius,
            alignment_mode: c.alignment_mode,
            degenerate_gap_threshold: c.degenerate_gap_threshold,
            radius_outlier: c.radius_outlier,
            stages: c.stages,
        }
    }
}

impl TryFrom<RawConfig> for PipelineConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let mut builder = PipelineConfig::builder()
            .voxel_leaf_size(raw.voxel_leaf_size)
            .outlier_neighbor_count(raw.outlier_neighbor_count)
            .outlier_std_ratio(raw.outlier_std_ratio)
            .crop_radius(raw.crop_radius)
            .alignment_mode(raw.alignment_mode)
            .degenerate_gap_threshold(raw.degenerate_gap_threshold)
            .stages(raw.stages);
        if let Some(params) = raw.radius_outlier {
            builder = builder.radius_outlier(params.min_neighbors, params.radius);
        }
        builder.build()
    }
}

/// Validated configuration of the canonicalization pipeline.
///
/// A configuration can only be obtained through [`PipelineConfig::builder`], deserialization or
/// [`Default`], all of which validate the values. It is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct PipelineConfig {
    voxel_leaf_size: f64,
    outlier_neighbor_count: usize,
    outlier_std_ratio: f64,
    crop_radius: f64,
    alignment_mode: AlignmentMode,
    degenerate_gap_threshold: f64,
    radius_outlier: Option<RadiusOutlierParams>,
    stages: StageToggles,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            voxel_leaf_size: 2.0,
            outlier_neighbor_count: 50,
            outlier_std_ratio: 1.0,
            crop_radius: 80.0,
            alignment_mode: AlignmentMode::Covariance,
            degenerate_gap_threshold: 1e-3,
            radius_outlier: None,
            stages: StageToggles::default(),
        }
    }
}

impl PipelineConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: PipelineConfig::default(),
        }
    }

    /// Parse a configuration from a JSON string. Missing fields take their default value.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a configuration from a JSON file. Missing fields take their default value.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Side of the voxels used for downsampling.
    pub fn voxel_leaf_size(&self) -> f64 {
        self.voxel_leaf_size
    }

    /// Number of neighbors of the statistical outlier filter.
    pub fn outlier_neighbor_count(&self) -> usize {
        self.outlier_neighbor_count
    }

    /// Standard deviation multiplier of the statistical outlier filter.
    pub fn outlier_std_ratio(&self) -> f64 {
        self.outlier_std_ratio
    }

    /// Radius of the crop around the reference point.
    pub fn crop_radius(&self) -> f64 {
        self.crop_radius
    }

    /// Strategy of the pose alignment.
    pub fn alignment_mode(&self) -> AlignmentMode {
        self.alignment_mode
    }

    /// Relative eigenvalue gap under which the alignment is reported as degenerate.
    pub fn degenerate_gap_threshold(&self) -> f64 {
        self.degenerate_gap_threshold
    }

    /// Parameters of the optional radius outlier filter.
    pub fn radius_outlier(&self) -> Option<RadiusOutlierParams> {
        self.radius_outlier
    }

    /// Enabled stages.
    pub fn stages(&self) -> StageToggles {
        self.stages
    }

    fn validate(&self) -> Result<(), ConfigError> {
        positive("voxel_leaf_size", self.voxel_leaf_size)?;
        if self.outlier_neighbor_count == 0 {
            return Err(ConfigError::InvalidValue {
                name: "outlier_neighbor_count",
                reason: "must be at least 1".to_string(),
            });
        }
        positive("outlier_std_ratio", self.outlier_std_ratio)?;
        positive("crop_radius", self.crop_radius)?;
        positive("degenerate_gap_threshold", self.degenerate_gap_threshold)?;
        if let Some(params) = self.radius_outlier {
            if params.min_neighbors == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "radius_outlier.min_neighbors",
                    reason: "must be at least 1".to_string(),
                });
            }
            positive("radius_outlier.radius", params.radius)?;
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            name,
            reason: format!("must be a positive finite number, got {value}"),
        })
    }
}

/// Builder of [`PipelineConfig`], validating on [`PipelineConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the side of the voxels used for downsampling.
    pub fn voxel_leaf_size(mut self, value: f64) -> Self {
        self.config.voxel_leaf_size = value;
        self
    }

    /// Set the number of neighbors of the statistical outlier filter.
    pub fn outlier_neighbor_count(mut self, value: usize) -> Self {
        self.config.outlier_neighbor_count = value;
        self
    }

    /// Set the standard deviation multiplier of the statistical outlier filter.
    pub fn outlier_std_ratio(mut self, value: f64) -> Self {
        self.config.outlier_std_ratio = value;
        self
    }

    /// Set the radius of the crop around the reference point.
    pub fn crop_radius(mut self, value: f64) -> Self {
        self.config.crop_radius = value;
        self
    }

    /// Set the pose alignment strategy.
    pub fn alignment_mode(mut self, value: AlignmentMode) -> Self {
        self.config.alignment_mode = value;
        self
    }

    /// Set the relative eigenvalue gap under which the alignment is reported as degenerate.
    pub fn degenerate_gap_threshold(mut self, value: f64) -> Self {
        self.config.degenerate_gap_threshold = value;
        self
    }

    /// Enable the radius outlier filter, run after the statistical one.
    pub fn radius_outlier(mut self, min_neighbors: usize, radius: f64) -> Self {
        self.config.radius_outlier = Some(RadiusOutlierParams {
            min_neighbors,
            radius,
        });
        self
    }

    /// Set the enabled stages.
    pub fn stages(mut self, stages: StageToggles) -> Self {
        self.config.stages = stages;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
