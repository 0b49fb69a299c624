//! Chunked retrieval of ranked search results.
//!
//! The search engine ranks trajectories by likelihood. Results are pulled in
//! chunks, and the psi/phi curve of every trajectory is copied into a pair of
//! curve matrices (one row per trajectory, one column per epoch). Loading
//! stops at the first trajectory whose likelihood falls below the floor.

use log::info;
use ndarray::{s, Array2, ArrayView1, Axis};

use crate::config::LoaderConfig;
use crate::curve::CurvePair;
use crate::engine::{ImageParams, SearchEngine, Trajectory};
use crate::error::RefineError;

/// Trajectories examined by the loader and their raw curves.
///
/// Row `i` of both matrices belongs to `trajectories[i]`.
#[derive(Debug, Clone)]
pub struct RawResults {
    pub trajectories: Vec<Trajectory>,
    pub psi_curves: Array2<f64>,
    pub phi_curves: Array2<f64>,
}

impl RawResults {
    /// No trajectories, with curves of `epochs` samples.
    pub fn empty(epochs: usize) -> Self {
        Self {
            trajectories: Vec::new(),
            psi_curves: Array2::zeros((0, epochs)),
            phi_curves: Array2::zeros((0, epochs)),
        }
    }

    /// Build from per-trajectory curves, checking that every curve is
    /// consistent with `epochs`.
    pub fn from_curves(
        trajectories: Vec<Trajectory>,
        curves: &[CurvePair],
        epochs: usize,
    ) -> Result<Self, RefineError> {
        let mut psi_curves = Array2::zeros((curves.len(), epochs));
        let mut phi_curves = Array2::zeros((curves.len(), epochs));
        for (ordinal, curve) in curves.iter().enumerate() {
            check_curve(ordinal, curve, epochs)?;
            psi_curves.row_mut(ordinal).assign(&ArrayView1::from(&curve.psi));
            phi_curves.row_mut(ordinal).assign(&ArrayView1::from(&curve.phi));
        }
        Ok(Self {
            trajectories,
            psi_curves,
            phi_curves,
        })
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    /// Number of epochs per curve.
    pub fn epochs(&self) -> usize {
        self.psi_curves.ncols()
    }

    /// Curve pair of the trajectory at `ordinal`.
    pub fn curve_pair(&self, ordinal: usize) -> CurvePair {
        CurvePair::new(
            self.psi_curves.row(ordinal).to_vec(),
            self.phi_curves.row(ordinal).to_vec(),
        )
    }

    /// All curve pairs in ordinal order.
    pub fn curve_pairs(&self) -> Vec<CurvePair> {
        (0..self.len()).map(|i| self.curve_pair(i)).collect()
    }
}

fn check_curve(ordinal: usize, curve: &CurvePair, epochs: usize) -> Result<(), RefineError> {
    curve.check_lengths(ordinal)?;
    if curve.len() != epochs {
        return Err(RefineError::EpochCountMismatch {
            ordinal,
            expected: epochs,
            found: curve.len(),
        });
    }
    Ok(())
}

/// Pull ranked results from `engine` until the likelihood floor is crossed.
///
/// Each chunk is requested with `fetch_ranked`, and the curves of its
/// trajectories are copied row by row until one falls below
/// `config.likelihood_threshold`. That trajectory is included in the
/// returned set; nothing after it is examined.
///
/// # Arguments
///
/// * `engine` - Ranked result source
/// * `params` - Image stack metadata; its epoch count fixes the curve length
/// * `config` - Chunk size and likelihood floor
///
/// # Returns
///
/// The examined trajectories and their psi/phi curve matrices, one row per
/// trajectory in rank order.
///
/// # Errors
///
/// * `RefineError::EmptyBatch` - a chunk came back empty, including when the
///   ranking runs out before the floor is reached
/// * `RefineError::Engine` - a `fetch_ranked` or `curve_pair_for` call failed
/// * `RefineError::CurveLengthMismatch`, `RefineError::EpochCountMismatch` - a
///   curve has the wrong length
pub fn load_results<E>(
    engine: &E,
    params: &ImageParams,
    config: &LoaderConfig,
) -> Result<RawResults, RefineError>
where
    E: SearchEngine + ?Sized,
{
    info!("Retrieving results");

    let epochs = params.epoch_count();
    let mut raw = RawResults::empty(epochs);
    let mut start_rank = 0;
    let mut examined = 0;

    loop {
        let chunk = engine
            .fetch_ranked(start_rank, config.chunk_size)
            .map_err(RefineError::engine("fetch_ranked"))?;

        let (Some(first), Some(last)) = (chunk.first(), chunk.last()) else {
            return Err(RefineError::EmptyBatch {
                start_rank,
                count: config.chunk_size,
            });
        };
        info!(
            "Chunk start = {start_rank}, chunk max likelihood = {:.2}, chunk min likelihood = {:.2}",
            first.lh, last.lh
        );

        let mut psi_chunk = Array2::zeros((chunk.len(), epochs));
        let mut phi_chunk = Array2::zeros((chunk.len(), epochs));
        let mut limit_reached = false;

        for (row, trajectory) in chunk.iter().enumerate() {
            let ordinal = start_rank + row;
            let curve = engine
                .curve_pair_for(trajectory)
                .map_err(RefineError::engine("curve_pair_for"))?;
            check_curve(ordinal, &curve, epochs)?;

            psi_chunk.row_mut(row).assign(&ArrayView1::from(&curve.psi));
            phi_chunk.row_mut(row).assign(&ArrayView1::from(&curve.phi));
            examined += 1;

            if trajectory.lh < config.likelihood_threshold {
                limit_reached = true;
                break;
            }
        }

        raw.psi_curves
            .append(Axis(0), psi_chunk.view())
            .expect("chunk rows share the epoch count");
        raw.phi_curves
            .append(Axis(0), phi_chunk.view())
            .expect("chunk rows share the epoch count");
        raw.trajectories.extend_from_slice(&chunk);
        start_rank += chunk.len();

        if limit_reached {
            break;
        }
    }

    raw.psi_curves = raw.psi_curves.slice(s![..examined, ..]).to_owned();
    raw.phi_curves = raw.phi_curves.slice(s![..examined, ..]).to_owned();
    raw.trajectories.truncate(examined);

    info!("Retrieved {} results", raw.len());
    Ok(raw)
}
