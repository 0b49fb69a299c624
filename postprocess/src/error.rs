//! Fatal error taxonomy of the refinement pipeline.
//!
//! Only conditions that make a run meaningless live here. Trajectories that
//! fail a filter are expected outcomes and are dropped silently by the stage
//! that rejects them.

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;

/// Errors that abort a refinement run.
#[derive(Error, Debug)]
pub enum RefineError {
    #[error("search engine returned no trajectories for ranks {start_rank}..{}", .start_rank + .count)]
    EmptyBatch { start_rank: usize, count: usize },

    #[error("engine call `{call}` failed: {source}")]
    Engine {
        call: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("trajectory {ordinal}: psi curve has {psi} samples but phi curve has {phi}")]
    CurveLengthMismatch {
        ordinal: usize,
        psi: usize,
        phi: usize,
    },

    #[error("trajectory {ordinal}: expected {expected} epochs, curve has {found}")]
    EpochCountMismatch {
        ordinal: usize,
        expected: usize,
        found: usize,
    },

    #[error("trajectory {ordinal}: expected {expected} stamps, engine returned {found}")]
    StampCountMismatch {
        ordinal: usize,
        expected: usize,
        found: usize,
    },

    #[error("trajectory {ordinal}: expected {side}x{side} stamps, engine returned {rows}x{cols}")]
    StampShapeMismatch {
        ordinal: usize,
        side: usize,
        rows: usize,
        cols: usize,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl RefineError {
    /// Wrap an engine failure with the name of the call that produced it.
    pub fn engine(call: &'static str) -> impl FnOnce(EngineError) -> RefineError {
        move |source| RefineError::Engine { call, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch_message_names_ranks() {
        let err = RefineError::EmptyBatch {
            start_rank: 500,
            count: 100,
        };
        assert_eq!(
            err.to_string(),
            "search engine returned no trajectories for ranks 500..600"
        );
    }

    #[test]
    fn test_engine_error_names_call() {
        let err = RefineError::engine("stamps_for")(EngineError::Backend("gpu lost".into()));
        let msg = err.to_string();
        assert!(msg.contains("stamps_for"));
        assert!(msg.contains("gpu lost"));
    }
}
