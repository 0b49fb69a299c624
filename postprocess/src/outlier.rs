//! Outlier rejection stage.
//!
//! Every loaded trajectory goes through the recursive flux filter on the
//! worker pool. After fan-in, trajectories with too few kept epochs or a
//! recomputed likelihood below the floor are dropped; the rest get their
//! stamps fetched and stacked and are appended to a fresh aggregate.

use log::{debug, info};
use ndarray::Array2;

use crate::config::RefineConfig;
use crate::engine::{ImageParams, SearchEngine, Stamp};
use crate::error::RefineError;
use crate::flux_filter::{filter_curve, FilterVerdict};
use crate::loader::RawResults;
use crate::pool::WorkerPool;
use crate::results::{ResultEntry, ResultsAggregate};

/// Sum of `stamps` at `indices`, each `side` pixels square.
fn stack_stamps(stamps: &[Stamp], indices: &[usize], side: usize) -> Stamp {
    let mut stacked = Array2::zeros((side, side));
    for &i in indices {
        stacked += &stamps[i];
    }
    stacked
}

fn check_stamps(
    ordinal: usize,
    stamps: &[Stamp],
    epochs: usize,
    side: usize,
) -> Result<(), RefineError> {
    if stamps.len() != epochs {
        return Err(RefineError::StampCountMismatch {
            ordinal,
            expected: epochs,
            found: stamps.len(),
        });
    }
    if let Some(bad) = stamps.iter().find(|s| s.dim() != (side, side)) {
        let (rows, cols) = bad.dim();
        return Err(RefineError::StampShapeMismatch {
            ordinal,
            side,
            rows,
            cols,
        });
    }
    Ok(())
}

/// Filter every trajectory in `raw` and collect the survivors.
///
/// A trajectory survives when its curve is not rejected, keeps at least
/// `min_kept_samples` epochs and its recomputed likelihood reaches the
/// loader's likelihood floor. Survivors get their stamps fetched and the
/// stamps of the kept epochs summed.
///
/// # Arguments
///
/// * `raw` - Trajectories and curves from the loader
/// * `engine` - Source of the per-epoch stamps
/// * `params` - Image stack metadata; must list one time per curve epoch
/// * `config` - Filter thresholds and stamp size
/// * `pool` - Workers for the per-trajectory filter
///
/// # Returns
///
/// A new aggregate holding the survivors in loader order, all selected.
///
/// # Errors
///
/// * `RefineError::EpochCountMismatch` - `params` and `raw` disagree on the epoch count
/// * `RefineError::Engine` - a stamp request failed
/// * `RefineError::StampCountMismatch`, `RefineError::StampShapeMismatch` - the
///   engine returned the wrong stamps
pub fn apply_outlier_rejection<E>(
    raw: &RawResults,
    engine: &E,
    params: &ImageParams,
    config: &RefineConfig,
    pool: &WorkerPool,
) -> Result<ResultsAggregate, RefineError>
where
    E: SearchEngine + ?Sized,
{
    if params.epoch_count() != raw.epochs() {
        return Err(RefineError::EpochCountMismatch {
            ordinal: 0,
            expected: params.epoch_count(),
            found: raw.epochs(),
        });
    }

    info!("Applying recursive flux filter to {} results", raw.len());

    let curves = raw.curve_pairs();
    let verdicts = pool.map_by_ordinal(&curves, |ordinal, curve| {
        filter_curve(ordinal, curve, &config.flux_filter)
    });

    let side = 2 * config.stamp_half_width + 1;
    let mut aggregate = ResultsAggregate::new();

    for (ordinal, verdict) in verdicts.into_iter().enumerate() {
        let (kept_indices, likelihood) = match verdict {
            FilterVerdict::Reject => continue,
            FilterVerdict::Keep {
                kept_indices,
                likelihood,
            } => (kept_indices, likelihood),
        };
        if kept_indices.len() < config.flux_filter.min_kept_samples {
            debug!("trajectory {ordinal}: only {} epochs kept", kept_indices.len());
            continue;
        }
        // NaN likelihoods fail this comparison too
        if !(likelihood >= config.loader.likelihood_threshold) {
            debug!("trajectory {ordinal}: filtered likelihood {likelihood:.2} below floor");
            continue;
        }

        let trajectory = raw.trajectories[ordinal];
        let stamps = engine
            .stamps_for(&trajectory, config.stamp_half_width)
            .map_err(RefineError::engine("stamps_for"))?;
        check_stamps(ordinal, &stamps, raw.epochs(), side)?;

        let curve = &curves[ordinal];
        let stacked_stamp = stack_stamps(&stamps, &kept_indices, side);
        let kept_times = kept_indices.iter().map(|&i| params.times[i]).collect();

        aggregate.push(ResultEntry {
            trajectory,
            likelihood,
            light_curve: curve.light_curve(config.flux_filter.masked_phi),
            kept_indices,
            curve: curve.clone(),
            stacked_stamp,
            stamps,
            kept_times,
        });
    }

    info!("Recursive flux filter keeps {} results", aggregate.len());
    Ok(aggregate.select_all())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurvePair;
    use crate::engine::Trajectory;
    use crate::synthetic::{gaussian_stamp, SyntheticEngine, SyntheticObject};
    use approx::assert_relative_eq;

    const EPOCHS: usize = 10;

    fn params() -> ImageParams {
        ImageParams {
            times: (0..EPOCHS).map(|i| 57000.0 + i as f64).collect(),
            width: 200,
            height: 200,
            vel_lims: (0.0, 10.0),
            ang_lims: (-1.0, 1.0),
        }
    }

    fn object(x: f64, psi: Vec<f64>) -> SyntheticObject {
        let curve = CurvePair::new(psi, vec![1.0; EPOCHS]);
        let stamps = (0..EPOCHS)
            .map(|_| gaussian_stamp(10, 10.0, 10.0, 50.0, 1.5, 0.0))
            .collect();
        SyntheticObject {
            trajectory: Trajectory::new(x, 10.0, 1.0, 0.5, curve.likelihood()),
            curve,
            stamps,
        }
    }

    fn run(objects: Vec<SyntheticObject>, config: &RefineConfig) -> ResultsAggregate {
        let engine = SyntheticEngine::new(objects, 10);
        let raw = RawResults::from_curves(
            engine.objects().iter().map(|o| o.trajectory).collect(),
            &engine.objects().iter().map(|o| o.curve.clone()).collect::<Vec<_>>(),
            EPOCHS,
        )
        .unwrap();
        let pool = WorkerPool::new(Some(2)).unwrap();
        apply_outlier_rejection(&raw, &engine, &params(), config, &pool).unwrap()
    }

    #[test]
    fn test_survivors_are_complete_and_aligned() {
        let mut spiky = vec![5.0; EPOCHS];
        spiky[5] = 100.0;
        let objects = vec![
            object(10.0, vec![6.0; EPOCHS]),
            object(20.0, spiky),
            object(30.0, vec![0.0; EPOCHS]),
        ];
        let agg = run(objects, &RefineConfig::default());

        // The all-zero curve has no usable epochs
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.final_selection(), &[0, 1]);

        for entry in agg.entries() {
            assert_eq!(entry.light_curve.len(), EPOCHS);
            assert_eq!(entry.stamps.len(), EPOCHS);
            assert_eq!(entry.kept_times.len(), entry.kept_indices.len());
            assert_eq!(entry.stacked_stamp.dim(), (21, 21));
        }

        let spike_entry = agg
            .entries()
            .iter()
            .find(|e| e.trajectory.x == 20.0)
            .unwrap();
        assert_eq!(spike_entry.kept_indices, vec![0, 1, 2, 3, 4, 8, 9]);
        assert_eq!(
            spike_entry.kept_times,
            vec![57000.0, 57001.0, 57002.0, 57003.0, 57004.0, 57008.0, 57009.0]
        );
        assert_relative_eq!(spike_entry.likelihood, 35.0 / 7f64.sqrt(), epsilon = 1e-12);

        // Stack covers the kept epochs only
        let single = gaussian_stamp(10, 10.0, 10.0, 50.0, 1.5, 0.0);
        assert_relative_eq!(
            spike_entry.stacked_stamp[[10, 10]],
            7.0 * single[[10, 10]],
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_low_likelihood_rejected() {
        let mut config = RefineConfig::default();
        config.loader.likelihood_threshold = 10.0;

        let objects = vec![object(10.0, vec![6.0; EPOCHS]), object(20.0, vec![2.0; EPOCHS])];
        let agg = run(objects, &config);

        // 2 * 10 / sqrt(10) is below the floor
        assert_eq!(agg.len(), 1);
        assert_eq!(agg.entries()[0].trajectory.x, 10.0);
    }

    #[test]
    fn test_too_few_kept_epochs_rejected() {
        let mut psi = vec![0.0; EPOCHS];
        psi[2] = 40.0;
        psi[7] = 40.0;
        let agg = run(vec![object(10.0, psi)], &RefineConfig::default());
        assert!(agg.is_empty());
        assert!(agg.final_selection().is_empty());
    }

    #[test]
    fn test_empty_input_gives_empty_aggregate() {
        let engine = SyntheticEngine::new(Vec::new(), 10);
        let raw = RawResults::empty(EPOCHS);
        let pool = WorkerPool::new(Some(2)).unwrap();
        let agg =
            apply_outlier_rejection(&raw, &engine, &params(), &RefineConfig::default(), &pool)
                .unwrap();
        assert!(agg.is_empty());
    }

    #[test]
    fn test_short_epoch_table_is_fatal() {
        let obj = object(10.0, vec![6.0; EPOCHS]);
        let raw = RawResults::from_curves(vec![obj.trajectory], &[obj.curve.clone()], EPOCHS)
            .unwrap();
        let engine = SyntheticEngine::new(vec![obj], 10);
        let short = ImageParams {
            times: vec![0.0; 5],
            ..params()
        };
        let pool = WorkerPool::new(Some(1)).unwrap();

        let err = apply_outlier_rejection(&raw, &engine, &short, &RefineConfig::default(), &pool)
            .unwrap_err();
        assert!(matches!(
            err,
            RefineError::EpochCountMismatch {
                expected: 5,
                found: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_stamp_count_mismatch_is_fatal() {
        let mut obj = object(10.0, vec![6.0; EPOCHS]);
        obj.stamps.truncate(4);
        let engine = SyntheticEngine::new(vec![obj], 10);
        let raw = RawResults::from_curves(
            vec![engine.objects()[0].trajectory],
            &[engine.objects()[0].curve.clone()],
            EPOCHS,
        )
        .unwrap();
        let pool = WorkerPool::new(Some(1)).unwrap();
        let err =
            apply_outlier_rejection(&raw, &engine, &params(), &RefineConfig::default(), &pool)
                .unwrap_err();
        assert!(matches!(
            err,
            RefineError::StampCountMismatch {
                ordinal: 0,
                expected: 10,
                found: 4
            }
        ));
    }
}
