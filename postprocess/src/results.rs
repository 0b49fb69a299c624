//! The results aggregate threaded through the refinement stages.
//!
//! Per-trajectory data is stored as one record per trajectory, so the
//! trajectory, its curves, stamps and kept epochs can never fall out of
//! step. Entries are append-only; later stages only narrow the final
//! selection, an ordered list of indices into the entries.

use crate::curve::CurvePair;
use crate::engine::{Stamp, Trajectory};

/// Everything retained about one trajectory that survived outlier rejection.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEntry {
    pub trajectory: Trajectory,
    /// Likelihood recomputed from the kept epochs only
    pub likelihood: f64,
    /// Per-epoch flux `psi / phi` with masked epochs near zero
    pub light_curve: Vec<f64>,
    /// Epochs that passed the recursive filter, ascending
    pub kept_indices: Vec<usize>,
    /// Raw psi/phi curves as delivered by the engine
    pub curve: CurvePair,
    /// Sum of the stamps at the kept epochs
    pub stacked_stamp: Stamp,
    /// One stamp per epoch
    pub stamps: Vec<Stamp>,
    /// Observation times of the kept epochs
    pub kept_times: Vec<f64>,
}

/// Accepted trajectories and the ordered final selection over them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsAggregate {
    entries: Vec<ResultEntry>,
    final_selection: Vec<usize>,
}

impl ResultsAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its index. The new entry is not selected.
    pub fn push(&mut self, entry: ResultEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    pub fn likelihoods(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|e| e.likelihood)
    }

    /// Indices of the entries to persist, in output order.
    pub fn final_selection(&self) -> &[usize] {
        &self.final_selection
    }

    /// Select every entry in append order.
    pub fn select_all(mut self) -> Self {
        self.final_selection = (0..self.entries.len()).collect();
        self
    }

    /// Replace the final selection. Stages only pass indices of existing
    /// entries.
    ///
    /// # Panics
    /// If any index does not name an entry.
    pub(crate) fn with_selection(mut self, selection: Vec<usize>) -> Self {
        if let Some(&bad) = selection.iter().find(|&&i| i >= self.entries.len()) {
            panic!(
                "selection index {bad} out of range for {} entries",
                self.entries.len()
            );
        }
        self.final_selection = selection;
        self
    }

    /// Selected entries in selection order.
    pub fn selected(&self) -> impl Iterator<Item = (usize, &ResultEntry)> + '_ {
        self.final_selection.iter().map(|&i| (i, &self.entries[i]))
    }
}
