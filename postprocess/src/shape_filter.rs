//! Shape filter for stacked postage stamps.
//!
//! A real moving source stacks into a compact, centered, roughly round blob.
//! Each stacked stamp is shifted to be non-negative and normalised to unit
//! sum, then judged by its central moments about the stamp center, the
//! position of its brightest pixel and how much of the raw flux that pixel
//! holds.

use log::info;

use crate::config::ShapeFilterConfig;
use crate::engine::Stamp;
use crate::moments::{central_moments, geometric_center, peak_offset, CentralMoments};
use crate::pool::WorkerPool;
use crate::results::ResultsAggregate;

/// Shape measurements of one stacked stamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampShape {
    /// Moments of the shifted, unit-sum stamp about its geometric center
    pub moments: CentralMoments,
    /// Row and column distance of the brightest pixel from the center
    pub peak_offset: (f64, f64),
    /// Brightest pixel of the raw stamp as a fraction of the raw sum
    pub peak_fraction: f64,
}

impl StampShape {
    /// Measure `stamp`. Returns `None` when it has no dynamic range.
    pub fn measure(stamp: &Stamp) -> Option<Self> {
        let min = stamp.iter().copied().fold(f64::INFINITY, f64::min);
        let mut shifted = stamp.mapv(|v| v - min);
        let total = shifted.sum();
        if !(total > 0.0) {
            return None;
        }
        shifted /= total;

        let center = geometric_center(shifted.view());
        let moments = central_moments(shifted.view(), center);
        let peak_offset = peak_offset(shifted.view(), center)?;

        let raw_sum = stamp.sum();
        let peak_fraction = stamp
            .iter()
            .map(|v| v / raw_sum)
            .fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            moments,
            peak_offset,
            peak_fraction,
        })
    }

    /// Whether this shape is plausibly a point source.
    pub fn is_point_like(&self, config: &ShapeFilterConfig) -> bool {
        let m = &self.moments;
        m.m20 < config.max_second_moment
            && m.m02 < config.max_second_moment
            && m.m11.abs() < config.max_cross_moment
            && m.m10.abs() < config.max_first_moment
            && m.m01.abs() < config.max_first_moment
            && self.peak_offset.0 < config.max_peak_offset
            && self.peak_offset.1 < config.max_peak_offset
            && self.peak_fraction > config.min_peak_fraction
    }
}

/// Accept or reject a single stacked stamp.
pub fn stamp_passes(stamp: &Stamp, config: &ShapeFilterConfig) -> bool {
    StampShape::measure(stamp).is_some_and(|shape| shape.is_point_like(config))
}

/// Narrow the final selection to likelihood-sorted entries whose stacked
/// stamp looks like a point source.
///
/// # Arguments
///
/// * `aggregate` - Results after outlier rejection
/// * `config` - Moment, peak offset and peak fraction thresholds
/// * `pool` - Workers for the per-stamp measurement
///
/// # Returns
///
/// The same aggregate with its selection ordered by descending recomputed
/// likelihood (ties keep their previous order) and reduced to the entries
/// that pass [`StampShape::is_point_like`]. Entries themselves are untouched.
pub fn apply_shape_filter(
    aggregate: ResultsAggregate,
    config: &ShapeFilterConfig,
    pool: &WorkerPool,
) -> ResultsAggregate {
    let mut sorted = aggregate.final_selection().to_vec();
    let entries = aggregate.entries();
    sorted.sort_by(|&a, &b| entries[b].likelihood.total_cmp(&entries[a].likelihood));

    info!("Stamp filtering {} results", sorted.len());
    let verdicts = pool.map(&sorted, |&i| stamp_passes(&entries[i].stacked_stamp, config));

    let selection: Vec<usize> = sorted
        .into_iter()
        .zip(verdicts)
        .filter_map(|(i, keep)| keep.then_some(i))
        .collect();

    info!("Keeping {} results", selection.len());
    aggregate.with_selection(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurvePair;
    use crate::engine::Trajectory;
    use crate::results::ResultEntry;
    use crate::synthetic::gaussian_stamp;
    use ndarray::Array2;

    fn config() -> ShapeFilterConfig {
        ShapeFilterConfig::default()
    }

    #[test]
    fn test_centered_gaussian_passes() {
        let stamp = gaussian_stamp(10, 10.0, 10.0, 100.0, 1.5, 0.0);
        assert!(stamp_passes(&stamp, &config()));

        let shape = StampShape::measure(&stamp).unwrap();
        assert_eq!(shape.peak_offset, (0.0, 0.0));
        assert!(shape.moments.m11.abs() < 1e-9);
    }

    #[test]
    fn test_corner_peak_fails() {
        let stamp = gaussian_stamp(10, 2.0, 2.0, 100.0, 1.5, 0.0);
        assert!(!stamp_passes(&stamp, &config()));

        let shape = StampShape::measure(&stamp).unwrap();
        assert_eq!(shape.peak_offset, (8.0, 8.0));
    }

    #[test]
    fn test_off_center_gaussian_fails_first_moment() {
        let off = gaussian_stamp(10, 11.0, 10.0, 100.0, 1.5, 0.0);
        let shape = StampShape::measure(&off).unwrap();
        assert_eq!(shape.peak_offset, (1.0, 0.0));
        // Peak is close enough, but the mean row is a full pixel away
        assert!(shape.moments.m10 > 0.25);
        assert!(!shape.is_point_like(&config()));
    }

    #[test]
    fn test_flat_stamp_fails() {
        let stamp = Array2::from_elem((21, 21), 3.0);
        assert!(StampShape::measure(&stamp).is_none());
        assert!(!stamp_passes(&stamp, &config()));
    }

    #[test]
    fn test_diffuse_stamp_fails_peak_fraction() {
        // Wide blob: moments and peak are fine but no pixel holds 3% of the flux
        let stamp = gaussian_stamp(10, 10.0, 10.0, 100.0, 4.0, 0.0);
        let shape = StampShape::measure(&stamp).unwrap();
        assert!(shape.peak_fraction < 0.03);
        assert!(!shape.is_point_like(&config()));
    }

    #[test]
    fn test_diagonal_streak_fails() {
        let mut stamp = Array2::zeros((21, 21));
        for i in 0..21 {
            stamp[[i, i]] = 10.0;
        }
        let shape = StampShape::measure(&stamp).unwrap();
        assert!(shape.moments.m11 > 1.0);
        assert!(!shape.is_point_like(&config()));
    }

    #[test]
    fn test_decision_is_deterministic() {
        let pool = WorkerPool::new(Some(4)).unwrap();
        let stamps: Vec<Stamp> = (0..32)
            .map(|i| gaussian_stamp(10, 10.0, 10.0 + (i % 3) as f64, 50.0, 1.5, 0.1))
            .collect();
        let first = pool.map(&stamps, |s| stamp_passes(s, &config()));
        for _ in 0..5 {
            assert_eq!(pool.map(&stamps, |s| stamp_passes(s, &config())), first);
        }
    }

    fn entry(lh: f64, stamp: Stamp) -> ResultEntry {
        ResultEntry {
            trajectory: Trajectory::new(0.0, 0.0, 1.0, 0.0, lh),
            likelihood: lh,
            light_curve: vec![1.0; 3],
            kept_indices: vec![0, 1, 2],
            curve: CurvePair::new(vec![1.0; 3], vec![1.0; 3]),
            stacked_stamp: stamp,
            stamps: Vec::new(),
            kept_times: vec![0.0, 1.0, 2.0],
        }
    }

    #[test]
    fn test_selection_sorted_by_likelihood() {
        let good = gaussian_stamp(10, 10.0, 10.0, 100.0, 1.5, 0.0);
        let bad = gaussian_stamp(10, 2.0, 2.0, 100.0, 1.5, 0.0);

        let mut agg = ResultsAggregate::new();
        agg.push(entry(12.0, good.clone()));
        agg.push(entry(30.0, bad));
        agg.push(entry(20.0, good.clone()));
        agg.push(entry(20.0, good));
        let agg = agg.select_all();

        let pool = WorkerPool::new(Some(2)).unwrap();
        let agg = apply_shape_filter(agg, &config(), &pool);
        // Equal likelihoods keep their earlier order
        assert_eq!(agg.final_selection(), &[2, 3, 0]);
        assert_eq!(agg.len(), 4);
    }

    #[test]
    fn test_empty_selection_stays_empty() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        let agg = apply_shape_filter(ResultsAggregate::new(), &config(), &pool);
        assert!(agg.final_selection().is_empty());
    }
}
