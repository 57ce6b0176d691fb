use std::num::NonZeroUsize;

use crate::error::{Error, Result};

/// What the producer does with a trailing group of fewer than `batch_size` lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TailPolicy {
    /// Emit the remainder as a short final batch.
    #[default]
    Flush,
    /// Discard the remainder.
    Drop,
}

/// How listeners share the key to statistics mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// One mutex around the whole mapping.
    #[default]
    Locked,
    /// Keys hashed onto independently locked maps, merged at the end.
    Sharded { shards: usize },
    /// A single thread owns the mapping and multiplexes every worker queue.
    Actor,
}

/// Run parameters, fixed for the duration of a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub tail: TailPolicy,
    pub strategy: Strategy,
    /// Batches buffered between producer and workers. `0` is a synchronous hand-off.
    pub batch_queue: usize,
    /// Records buffered on each worker's output queue.
    pub record_queue: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            workers,
            batch_size: 1000,
            tail: TailPolicy::Flush,
            strategy: Strategy::Locked,
            batch_queue: workers * 2,
            record_queue: 1024,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("worker count must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".into()));
        }
        if let Strategy::Sharded { shards: 0 } = self.strategy {
            return Err(Error::Config("shard count must be at least 1".into()));
        }
        Ok(())
    }
}
