//! The producer → workers → aggregator topology of one run.
//!
//! ```text
//! lines ─▶ producer ─▶ [batch queue] ─┬▶ worker-0 ─▶ [records] ─┐
//!                                     ├▶ worker-1 ─▶ [records] ─┼▶ aggregator ─▶ StatsMap
//!                                     └▶ worker-N ─▶ [records] ─┘
//! ```
//!
//! All stages run on scoped threads, so batches and records borrow straight
//! from the input bytes.

use std::thread::{self, Scope};
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;

use crate::aggregator::Aggregator;
use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::producer::{produce, Batches, ProducerSummary};
use crate::stats::StatsMap;
use crate::worker::WorkerPool;

/// Counters of one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub lines: u64,
    pub batches: u64,
    pub records: u64,
    pub rejected: u64,
    pub folded: u64,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct Aggregation {
    pub stats: StatsMap,
    pub summary: RunSummary,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline { config }
    }

    /// Aggregates every `<key>;<value>` line of `lines`.
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires before the run completes;
    /// there is no partial result.
    pub fn run<'a, I>(&self, lines: I, cancel: &CancelToken) -> Result<Aggregation>
    where
        I: IntoIterator<Item = &'a [u8]>,
        I::IntoIter: Send,
    {
        self.config.validate()?;
        let started = Instant::now();
        let lines = lines.into_iter();
        let (stats, mut summary) = thread::scope(|scope| self.run_scoped(scope, lines, cancel))?;
        summary.elapsed = started.elapsed();

        if cancel.is_cancelled() {
            tracing::warn!(?summary, "run cancelled");
            return Err(Error::Cancelled);
        }
        debug_assert_eq!(summary.records, summary.folded);
        if summary.rejected > 0 {
            tracing::warn!(rejected = summary.rejected, "discarded malformed lines");
        }
        tracing::info!(
            lines = summary.lines,
            batches = summary.batches,
            keys = stats.len(),
            elapsed = ?summary.elapsed,
            "run complete"
        );
        Ok(Aggregation { stats, summary })
    }

    fn run_scoped<'scope, 'env, 'a, I>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        lines: I,
        cancel: &'env CancelToken,
    ) -> Result<(StatsMap, RunSummary)>
    where
        'a: 'env,
        I: Iterator<Item = &'a [u8]> + Send + 'env,
    {
        let config = &self.config;
        tracing::debug!(
            workers = config.workers,
            batch_size = config.batch_size,
            strategy = ?config.strategy,
            "starting pipeline"
        );
        let (batch_tx, batch_rx) = bounded(config.batch_queue);
        let batches = Batches::new(lines, config.batch_size, config.tail, cancel);
        let producer = thread::Builder::new()
            .name("producer".into())
            .spawn_scoped(scope, move || produce(batches, batch_tx, cancel))
            .map_err(|source| Error::Spawn {
                stage: "producer".into(),
                source,
            })?;

        let (pool, outputs) =
            match WorkerPool::spawn(scope, config.workers, config.record_queue, batch_rx, cancel) {
                Ok(spawned) => spawned,
                Err(err) => {
                    // Releases the producer if it is blocked on the batch queue.
                    cancel.cancel();
                    return Err(err);
                }
            };

        let collected = Aggregator::new(config.strategy).collect(outputs, cancel);
        if collected.is_err() {
            cancel.cancel();
        }
        let produced = producer
            .join()
            .map_err(|_| Error::StagePanicked("producer".into()));
        let parsed = pool.join();

        let collected = collected?;
        let ProducerSummary { lines, batches } = produced?;
        let parsed = parsed?;

        let summary = RunSummary {
            lines,
            batches,
            records: parsed.iter().map(|w| w.records).sum(),
            rejected: parsed.iter().map(|w| w.rejected).sum(),
            folded: collected.folded,
            elapsed: Duration::ZERO,
        };
        Ok((collected.stats, summary))
    }
}
