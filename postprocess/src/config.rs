//! Tunable parameters of the refinement pipeline.
//!
//! Defaults reproduce the thresholds the pipeline was tuned with. They are
//! empirical and instrument specific; override them through a JSON file
//! rather than editing the constants.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading, saving or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Parameters of the chunked result loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Number of ranked trajectories requested per engine call
    pub chunk_size: usize,
    /// Likelihood floor; loading stops at the first trajectory below it and
    /// the outlier stage drops recomputed likelihoods below it
    pub likelihood_threshold: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500_000,
            likelihood_threshold: 10.0,
        }
    }
}

/// Parameters of the recursive flux filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluxFilterConfig {
    /// Growth of the error variance between consecutive samples
    pub process_noise: f64,
    /// Samples whose normalised deviation reaches this value are outliers
    pub max_deviation: f64,
    /// Minimum number of kept samples for a trajectory to survive
    pub min_kept_samples: usize,
    /// Value substituted for masked (zero) phi entries before dividing
    pub masked_phi: f64,
    /// Phi values below this floor are treated as unusable
    pub negative_phi_floor: f64,
    /// Value substituted for phi entries below the floor
    pub negative_phi_replacement: f64,
}

impl Default for FluxFilterConfig {
    fn default() -> Self {
        Self {
            process_noise: 1.0,
            max_deviation: 5.0,
            min_kept_samples: 3,
            masked_phi: 1e9,
            negative_phi_floor: -999.0,
            negative_phi_replacement: 9_999_999.0,
        }
    }
}

/// Acceptance thresholds for stacked stamp shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeFilterConfig {
    /// Upper bound on the second-order central moment along each axis
    pub max_second_moment: f64,
    /// Upper bound on the magnitude of the cross moment
    pub max_cross_moment: f64,
    /// Upper bound on the magnitude of each first-order moment
    pub max_first_moment: f64,
    /// Maximum distance in pixels between brightest pixel and stamp center,
    /// per axis
    pub max_peak_offset: f64,
    /// Peak pixel must carry more than this fraction of the raw stamp sum
    pub min_peak_fraction: f64,
}

impl Default for ShapeFilterConfig {
    fn default() -> Self {
        Self {
            max_second_moment: 35.5,
            max_cross_moment: 1.0,
            max_first_moment: 0.25,
            max_peak_offset: 2.0,
            min_peak_fraction: 0.03,
        }
    }
}

/// Density clustering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Neighbourhood radius in normalised feature space
    pub eps: f64,
    /// Minimum neighbourhood size of a core point, counting the point
    /// itself. `None` makes every point a core point.
    pub min_samples: Option<usize>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            eps: 0.03,
            min_samples: None,
        }
    }
}

/// Full configuration of a refinement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    pub loader: LoaderConfig,
    pub flux_filter: FluxFilterConfig,
    /// Stamps are `2 * stamp_half_width + 1` pixels square
    pub stamp_half_width: usize,
    pub shape_filter: ShapeFilterConfig,
    pub clustering: ClusterConfig,
    /// Worker pool size; `None` uses one thread per available CPU
    pub worker_threads: Option<usize>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            loader: LoaderConfig::default(),
            flux_filter: FluxFilterConfig::default(),
            stamp_half_width: 10,
            shape_filter: ShapeFilterConfig::default(),
            clustering: ClusterConfig::default(),
            worker_threads: None,
        }
    }
}

impl RefineConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: RefineConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Save this configuration as pretty-printed JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Check that every parameter is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            }
        }

        if self.loader.chunk_size == 0 {
            return Err(invalid("loader.chunk_size", "must be at least 1"));
        }
        if !self.loader.likelihood_threshold.is_finite() {
            return Err(invalid("loader.likelihood_threshold", "must be finite"));
        }
        if !(self.flux_filter.process_noise >= 0.0) {
            return Err(invalid("flux_filter.process_noise", "must not be negative"));
        }
        if !(self.flux_filter.max_deviation > 0.0) {
            return Err(invalid("flux_filter.max_deviation", "must be positive"));
        }
        if self.flux_filter.min_kept_samples == 0 {
            return Err(invalid("flux_filter.min_kept_samples", "must be at least 1"));
        }
        if self.flux_filter.masked_phi == 0.0 || !self.flux_filter.masked_phi.is_finite() {
            return Err(invalid("flux_filter.masked_phi", "must be finite and non-zero"));
        }
        if !(self.shape_filter.max_peak_offset > 0.0) {
            return Err(invalid("shape_filter.max_peak_offset", "must be positive"));
        }
        if !(self.clustering.eps > 0.0) {
            return Err(invalid("clustering.eps", "must be positive"));
        }
        if self.clustering.min_samples == Some(0) {
            return Err(invalid("clustering.min_samples", "must be at least 1"));
        }
        let shape = &self.shape_filter;
        let shape_thresholds = [
            ("shape_filter.max_second_moment", shape.max_second_moment),
            ("shape_filter.max_cross_moment", shape.max_cross_moment),
            ("shape_filter.max_first_moment", shape.max_first_moment),
            ("shape_filter.min_peak_fraction", shape.min_peak_fraction),
        ];
        if let Some((field, _)) = shape_thresholds.iter().find(|(_, v)| v.is_nan()) {
            return Err(invalid(*field, "must be a number"));
        }
        if self.worker_threads == Some(0) {
            return Err(invalid("worker_threads", "must be at least 1"));
        }
        Ok(())
    }
}
