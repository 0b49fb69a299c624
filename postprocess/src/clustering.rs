//! Density clustering of surviving trajectories.
//!
//! The search reports many near-copies of every real mover, differing by a
//! pixel or a small velocity step. Trajectories are mapped into a
//! normalised (x, y, speed, angle) space and grouped with DBSCAN; one
//! representative per group is kept. The first member of a group in
//! selection order is its representative, which after the shape filter is
//! the most likely one.

use std::collections::HashSet;

use log::info;

use crate::config::ClusterConfig;
use crate::engine::{ImageParams, Trajectory};
use crate::results::ResultsAggregate;

/// Label of points that belong to no cluster.
pub const NOISE: i64 = -1;

/// Normalised clustering coordinates of one trajectory.
pub type Feature = [f64; 4];

/// Map `value` onto [0, 1] over `bounds`; a degenerate range maps to 0.
fn scale(value: f64, bounds: (f64, f64)) -> f64 {
    let span = bounds.1 - bounds.0;
    if span == 0.0 {
        0.0
    } else {
        (value - bounds.0) / span
    }
}

/// Position relative to the image size, speed and angle relative to the
/// search bounds.
pub fn normalized_feature(trajectory: &Trajectory, params: &ImageParams) -> Feature {
    [
        scale(trajectory.x, (0.0, params.width as f64)),
        scale(trajectory.y, (0.0, params.height as f64)),
        scale(trajectory.speed(), params.vel_lims),
        scale(trajectory.angle(), params.ang_lims),
    ]
}

fn distance(a: &Feature, b: &Feature) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Label `points` with DBSCAN.
///
/// Two points are neighbours when their distance is at most `eps`. A point
/// is core when its neighbourhood, itself included, holds at least
/// `min_samples` points; `None` makes every point core, so clusters are the
/// connected components of the neighbour graph. Clusters are numbered in
/// order of their first core point. Non-core points reached from a core
/// point join the first cluster that reaches them, the rest are [`NOISE`].
pub fn dbscan(points: &[Feature], eps: f64, min_samples: Option<usize>) -> Vec<i64> {
    let neighbours: Vec<Vec<usize>> = points
        .iter()
        .map(|p| {
            points
                .iter()
                .enumerate()
                .filter(|(_, q)| distance(p, q) <= eps)
                .map(|(j, _)| j)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighbours
        .iter()
        .map(|n| min_samples.map_or(true, |m| n.len() >= m))
        .collect();

    let mut labels = vec![NOISE; points.len()];
    let mut next_label = 0;

    for seed in 0..points.len() {
        if labels[seed] != NOISE || !is_core[seed] {
            continue;
        }

        let mut stack = vec![seed];
        while let Some(p) = stack.pop() {
            if labels[p] != NOISE {
                continue;
            }
            labels[p] = next_label;
            if is_core[p] {
                stack.extend(neighbours[p].iter().copied().filter(|&q| labels[q] == NOISE));
            }
        }
        next_label += 1;
    }

    labels
}

/// Positions of the first point carrying each distinct label, in order of
/// first appearance. Noise counts as one label.
pub fn representatives(labels: &[i64]) -> Vec<usize> {
    let mut seen = HashSet::new();
    labels
        .iter()
        .enumerate()
        .filter(|(_, label)| seen.insert(**label))
        .map(|(position, _)| position)
        .collect()
}

/// Narrow the final selection to one trajectory per cluster.
///
/// # Arguments
///
/// * `aggregate` - Results after the shape filter; the selection order decides
///   which member represents each cluster
/// * `params` - Image size and search bounds used to normalise the features
/// * `config` - Neighbourhood radius and optional core-point minimum
///
/// # Returns
///
/// The same aggregate with the first selected member of every label kept, in
/// order of first appearance. Noise counts as a single label. An empty
/// selection is returned unchanged.
pub fn apply_clustering(
    aggregate: ResultsAggregate,
    params: &ImageParams,
    config: &ClusterConfig,
) -> ResultsAggregate {
    let selection = aggregate.final_selection().to_vec();
    info!("Clustering {} results", selection.len());
    if selection.is_empty() {
        return aggregate;
    }

    let features: Vec<Feature> = aggregate
        .selected()
        .map(|(_, entry)| normalized_feature(&entry.trajectory, params))
        .collect();
    let labels = dbscan(&features, config.eps, config.min_samples);

    let kept: Vec<usize> = representatives(&labels)
        .into_iter()
        .map(|position| selection[position])
        .collect();

    info!("Keeping {} results", kept.len());
    aggregate.with_selection(kept)
}
