//! Post-processing of moving-object search results
//!
//! Takes the ranked trajectories of a brute-force shift-and-stack search
//! and separates real detections from noise: robust per-epoch outlier
//! rejection on each flux curve, a point-source test on the stacked
//! postage stamp, and density clustering that collapses near-duplicate
//! trajectories to one representative each.

pub mod clustering;
pub mod config;
pub mod curve;
pub mod engine;
pub mod error;
pub mod flux_filter;
pub mod loader;
pub mod moments;
pub mod outlier;
pub mod pipeline;
pub mod pool;
pub mod results;
pub mod shape_filter;
pub mod synthetic;

pub use config::{ClusterConfig, FluxFilterConfig, LoaderConfig, RefineConfig, ShapeFilterConfig};
pub use curve::CurvePair;
pub use engine::{EngineError, ImageParams, SearchEngine, Stamp, Trajectory};
pub use error::RefineError;
pub use flux_filter::{filter_curve, FilterVerdict};
pub use pipeline::{RefineOutcome, RefinePipeline, Stage, StageReport};
pub use results::{ResultEntry, ResultsAggregate};
