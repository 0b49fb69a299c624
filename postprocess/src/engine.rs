//! Contracts of the external collaborators the refinement stage consumes.
//!
//! The brute-force trajectory search is opaque to this crate. It is reached
//! only through [`SearchEngine`], which hands out ranked trajectories, their
//! psi/phi curves and per-epoch postage stamps. Image-level metadata that the
//! ingestion side computes (epochs, frame size, search bounds) arrives as an
//! [`ImageParams`] value.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::curve::CurvePair;

/// A square postage stamp, indexed `[row, column]`.
pub type Stamp = Array2<f64>;

/// A candidate trajectory as ranked by the search engine.
///
/// Produced by the engine and never mutated by the refinement stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Starting x pixel position
    pub x: f64,
    /// Starting y pixel position
    pub y: f64,
    /// Velocity along x in pixels per unit time
    pub x_v: f64,
    /// Velocity along y in pixels per unit time
    pub y_v: f64,
    /// Likelihood assigned by the search
    pub lh: f64,
    /// Estimated flux reported by the search
    pub flux: f64,
    /// Number of epochs the search used for this trajectory
    pub obs_count: usize,
}

impl Trajectory {
    /// Trajectory with the given position, velocity and likelihood.
    pub fn new(x: f64, y: f64, x_v: f64, y_v: f64, lh: f64) -> Self {
        Self {
            x,
            y,
            x_v,
            y_v,
            lh,
            flux: 0.0,
            obs_count: 0,
        }
    }

    /// Magnitude of the velocity vector.
    pub fn speed(&self) -> f64 {
        (self.x_v * self.x_v + self.y_v * self.y_v).sqrt()
    }

    /// Direction of motion as `atan(y_v / x_v)`, folded into (-π/2, π/2].
    ///
    /// A stationary trajectory has angle 0.
    pub fn angle(&self) -> f64 {
        let angle = (self.y_v / self.x_v).atan();
        if angle.is_nan() {
            0.0
        } else {
            angle
        }
    }
}

/// Image-stack metadata needed by the refinement stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    /// Observation epochs, one per image, in stack order
    pub times: Vec<f64>,
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
    /// Speed bounds of the search as (min, max)
    pub vel_lims: (f64, f64),
    /// Angle bounds of the search in radians as (min, max)
    pub ang_lims: (f64, f64),
}

impl ImageParams {
    /// Number of epochs in the stack.
    pub fn epoch_count(&self) -> usize {
        self.times.len()
    }
}

/// Failures reported by a [`SearchEngine`] implementation.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no data available for trajectory: {0}")]
    MissingData(String),
    #[error("engine backend failure: {0}")]
    Backend(String),
}

/// The trajectory search engine as seen by the refinement pipeline.
///
/// All calls are synchronous. The engine guarantees that ranks are ordered
/// by non-increasing likelihood across the whole result list.
pub trait SearchEngine {
    /// Fetch up to `count` trajectories starting at rank `start_rank`.
    fn fetch_ranked(&self, start_rank: usize, count: usize)
        -> Result<Vec<Trajectory>, EngineError>;

    /// Psi/phi curves sampled at every epoch along `trajectory`.
    fn curve_pair_for(&self, trajectory: &Trajectory) -> Result<CurvePair, EngineError>;

    /// One science stamp per epoch, each `2 * half_width + 1` pixels square.
    fn stamps_for(
        &self,
        trajectory: &Trajectory,
        half_width: usize,
    ) -> Result<Vec<Stamp>, EngineError>;
}
