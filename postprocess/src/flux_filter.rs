//! Robust recursive flux filter for a single trajectory.
//!
//! A one-dimensional recursive least-squares estimator is run along the
//! light curve of a trajectory. Samples that sit too many standard errors
//! away from the running estimate are outliers. The estimator runs in both
//! time directions, because a bright first sample seeds the forward pass and
//! drags the estimate for several steps; the direction that keeps more
//! samples wins. The likelihood is then recomputed from the inliers only.
//!
//! Filtering is a pure function of its inputs and can be run for many
//! trajectories in parallel; the ordinal passes through untouched so results
//! can be matched back after out-of-order completion.

use log::trace;

use crate::config::FluxFilterConfig;
use crate::curve::CurvePair;

/// Outcome of filtering one curve pair.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterVerdict {
    /// Too few usable samples, or the estimator diverged.
    Reject,
    /// Inlier epochs in ascending order and the likelihood they support.
    Keep {
        kept_indices: Vec<usize>,
        likelihood: f64,
    },
}

impl FilterVerdict {
    pub fn is_reject(&self) -> bool {
        matches!(self, FilterVerdict::Reject)
    }

    /// Recomputed likelihood, or `None` for a rejected curve.
    pub fn likelihood(&self) -> Option<f64> {
        match self {
            FilterVerdict::Reject => None,
            FilterVerdict::Keep { likelihood, .. } => Some(*likelihood),
        }
    }
}

/// Running estimate and its error variance after each sample.
struct RecursiveEstimate {
    estimate: Vec<f64>,
    error_variance: Vec<f64>,
}

/// Run the estimator over `obs` with per-sample measurement variance `var`.
///
/// Returns `None` if the error variance ever goes negative.
fn recursive_estimate(obs: &[f64], var: &[f64], process_noise: f64) -> Option<RecursiveEstimate> {
    let n = obs.len();
    let mut estimate = vec![0.0; n];
    let mut error_variance = vec![0.0; n];

    estimate[0] = obs[0];
    error_variance[0] = var[0];

    for k in 1..n {
        let predicted = estimate[k - 1];
        let predicted_variance = error_variance[k - 1] + process_noise;

        let gain = predicted_variance / (predicted_variance + var[k]);
        estimate[k] = predicted + gain * (obs[k] - predicted);
        error_variance[k] = (1.0 - gain) * predicted_variance;
    }

    if error_variance.iter().any(|&p| p < 0.0) {
        return None;
    }

    Some(RecursiveEstimate {
        estimate,
        error_variance,
    })
}

/// Positions in `obs` whose normalised deviation from the running estimate
/// is below `max_deviation`.
fn inlier_positions(obs: &[f64], var: &[f64], config: &FluxFilterConfig) -> Option<Vec<usize>> {
    let fit = recursive_estimate(obs, var, config.process_noise)?;

    let positions = obs
        .iter()
        .zip(fit.estimate.iter().zip(&fit.error_variance))
        .enumerate()
        .filter(|(_, (&o, (&x, &p)))| (x - o).abs() / p.sqrt() < config.max_deviation)
        .map(|(i, _)| i)
        .collect();

    Some(positions)
}

/// Measurement variance `1 / phi` of one epoch. Phi below the floor is
/// replaced first.
fn measurement_variance(phi: f64, config: &FluxFilterConfig) -> f64 {
    if phi < config.negative_phi_floor {
        1.0 / config.negative_phi_replacement
    } else {
        1.0 / phi
    }
}

/// Filter one curve pair and recompute its likelihood from the inliers.
///
/// The filter works on the usable epochs only, in three steps:
/// 1. Drop masked epochs (phi == 0) and epochs with zero flux
/// 2. Run the recursive estimator forward and over the reversed curve,
///    keeping samples whose deviation from the estimate stays below
///    `config.max_deviation` standard errors
/// 3. Keep the pass with more inliers (forward on ties) and recompute the
///    likelihood over those epochs from the raw psi and phi
///
/// # Arguments
///
/// * `ordinal` - Position of the trajectory in the loaded set, returned unchanged
/// * `curve` - Raw psi/phi curves of the trajectory
/// * `config` - Estimator and masking parameters
///
/// # Returns
///
/// * `(ordinal, FilterVerdict::Keep { .. })` - Kept epochs in ascending order
///   and the likelihood they support
/// * `(ordinal, FilterVerdict::Reject)` - Fewer than two usable epochs, or the
///   error variance of either pass went negative
pub fn filter_curve(
    ordinal: usize,
    curve: &CurvePair,
    config: &FluxFilterConfig,
) -> (usize, FilterVerdict) {
    let masked_phi = curve.masked_phi(config.masked_phi);
    let light_curve = curve.light_curve(config.masked_phi);

    let usable: Vec<usize> = light_curve
        .iter()
        .zip(&curve.phi)
        .enumerate()
        .filter(|(_, (&flux, &phi))| flux != 0.0 && phi != 0.0)
        .map(|(i, _)| i)
        .collect();

    if usable.len() < 2 {
        trace!("trajectory {ordinal}: {} usable epochs", usable.len());
        return (ordinal, FilterVerdict::Reject);
    }

    let fluxes: Vec<f64> = usable.iter().map(|&i| light_curve[i]).collect();
    let variances: Vec<f64> = usable
        .iter()
        .map(|&i| measurement_variance(masked_phi[i], config))
        .collect();

    let Some(forward) = inlier_positions(&fluxes, &variances, config) else {
        trace!("trajectory {ordinal}: forward pass diverged");
        return (ordinal, FilterVerdict::Reject);
    };

    let reversed_fluxes: Vec<f64> = fluxes.iter().rev().copied().collect();
    let reversed_variances: Vec<f64> = variances.iter().rev().copied().collect();
    let Some(backward) = inlier_positions(&reversed_fluxes, &reversed_variances, config) else {
        trace!("trajectory {ordinal}: backward pass diverged");
        return (ordinal, FilterVerdict::Reject);
    };

    let positions: Vec<usize> = if forward.len() >= backward.len() {
        forward
    } else {
        let last = usable.len() - 1;
        backward.iter().rev().map(|&p| last - p).collect()
    };

    let kept_indices: Vec<usize> = positions.iter().map(|&p| usable[p]).collect();
    let likelihood = curve.likelihood_at(&kept_indices);

    (
        ordinal,
        FilterVerdict::Keep {
            kept_indices,
            likelihood,
        },
    )
}
