//! Bounded worker pool for per-trajectory fan-out.
//!
//! Stages hand the pool a slice of read-only inputs and a pure function of
//! `(ordinal, &input)`. Results are placed by the ordinal each task reports,
//! so the caller sees the same ordering no matter which worker finishes
//! first. Nothing shared is mutated from inside a task.

use log::debug;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::RefineError;

/// Fixed-size rayon pool owned by the pipeline.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Build a pool with `threads` workers, or one per CPU when `None`.
    pub fn new(threads: Option<usize>) -> Result<Self, RefineError> {
        let threads = threads.unwrap_or_else(num_cpus::get).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("refine-worker-{i}"))
            .build()?;
        debug!("Worker pool started with {threads} threads");
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Apply `task` to every item in parallel and collect results by ordinal.
    ///
    /// `task` receives the item's position in `items` and must return it
    /// alongside its result. Every ordinal must be returned exactly once.
    pub fn map_by_ordinal<T, R, F>(&self, items: &[T], task: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> (usize, R) + Sync,
    {
        let completed: Vec<(usize, R)> = self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(ordinal, item)| task(ordinal, item))
                .collect()
        });

        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();
        for (ordinal, result) in completed {
            debug_assert!(slots[ordinal].is_none(), "ordinal {ordinal} returned twice");
            slots[ordinal] = Some(result);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(ordinal, slot)| {
                slot.unwrap_or_else(|| panic!("worker task for ordinal {ordinal} returned no result"))
            })
            .collect()
    }

    /// Apply `task` to every item in parallel, keeping input order.
    pub fn map<T, R, F>(&self, items: &[T], task: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        self.pool.install(|| items.par_iter().map(&task).collect())
    }
}
