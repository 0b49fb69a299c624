//! End-to-end refinement of a search run.
//!
//! Stages run strictly in order: load, outlier rejection, shape filter,
//! clustering. Each one consumes the aggregate the previous stage produced;
//! an empty intermediate result flows through to an empty final selection.

use std::fmt;

use log::info;

use crate::clustering::apply_clustering;
use crate::config::RefineConfig;
use crate::engine::{ImageParams, SearchEngine};
use crate::error::RefineError;
use crate::loader::load_results;
use crate::outlier::apply_outlier_rejection;
use crate::pool::WorkerPool;
use crate::results::ResultsAggregate;
use crate::shape_filter::apply_shape_filter;

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    OutlierRejection,
    ShapeFilter,
    Clustering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::OutlierRejection => "outlier rejection",
            Stage::ShapeFilter => "shape filter",
            Stage::Clustering => "clustering",
        };
        f.write_str(name)
    }
}

/// Trajectory counts entering and leaving one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub input: usize,
    pub kept: usize,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RefineOutcome {
    /// Surviving entries; the final selection names the detections
    pub results: ResultsAggregate,
    pub stages: Vec<StageReport>,
}

impl RefineOutcome {
    pub fn report(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}

/// Configured pipeline with its worker pool.
pub struct RefinePipeline {
    config: RefineConfig,
    pool: WorkerPool,
}

impl RefinePipeline {
    /// Validate `config` and start the worker pool.
    pub fn new(config: RefineConfig) -> Result<Self, RefineError> {
        config.validate()?;
        let pool = WorkerPool::new(config.worker_threads)?;
        Ok(Self { config, pool })
    }

    /// Refine the ranked results of `engine` over the image stack `params`.
    ///
    /// Runs, in order:
    /// - [`load_results`] with the loader config
    /// - [`apply_outlier_rejection`] on the worker pool
    /// - [`apply_shape_filter`] on the worker pool
    /// - [`apply_clustering`]
    ///
    /// # Returns
    ///
    /// The final aggregate and one [`StageReport`] per stage. A run in which
    /// every candidate is rejected still succeeds, with an empty selection.
    ///
    /// # Errors
    ///
    /// Any fatal error of the loader or the outlier stage, unchanged.
    pub fn run<E>(&self, engine: &E, params: &ImageParams) -> Result<RefineOutcome, RefineError>
    where
        E: SearchEngine + ?Sized,
    {
        let mut stages = Vec::with_capacity(4);

        let raw = load_results(engine, params, &self.config.loader)?;
        stages.push(StageReport {
            stage: Stage::Load,
            input: raw.len(),
            kept: raw.len(),
        });

        let aggregate = apply_outlier_rejection(&raw, engine, params, &self.config, &self.pool)?;
        stages.push(StageReport {
            stage: Stage::OutlierRejection,
            input: raw.len(),
            kept: aggregate.final_selection().len(),
        });
        drop(raw);

        let input = aggregate.final_selection().len();
        let aggregate = apply_shape_filter(aggregate, &self.config.shape_filter, &self.pool);
        stages.push(StageReport {
            stage: Stage::ShapeFilter,
            input,
            kept: aggregate.final_selection().len(),
        });

        let input = aggregate.final_selection().len();
        let aggregate = apply_clustering(aggregate, params, &self.config.clustering);
        stages.push(StageReport {
            stage: Stage::Clustering,
            input,
            kept: aggregate.final_selection().len(),
        });

        for report in &stages {
            info!("{}: {} -> {}", report.stage, report.input, report.kept);
        }

        Ok(RefineOutcome {
            results: aggregate,
            stages,
        })
    }
}
