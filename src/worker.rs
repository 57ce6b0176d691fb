//! Parser worker pool.
//!
//! N workers compete for batches on one shared queue; each batch goes to
//! exactly one worker. Every worker owns a private output queue, so parsing
//! never contends on a lock.

use std::thread::{self, Scope, ScopedJoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::cancel::{CancelToken, Delivery};
use crate::error::{Error, Result};
use crate::producer::Batch;
use crate::record::{parse_line, Record};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub batches: u64,
    pub records: u64,
    pub rejected: u64,
}

/// Parses batches until the distribution queue is closed and drained or the
/// run is cancelled. Returning drops `records`, closing this worker's queue.
pub fn parse_batches<'a>(
    id: usize,
    batches: &Receiver<Batch<'a>>,
    records: Sender<Record<'a>>,
    cancel: &CancelToken,
) -> WorkerSummary {
    let mut summary = WorkerSummary::default();
    'batches: while let Some(Batch { seq, lines }) = cancel.recv(batches) {
        summary.batches += 1;
        for line in lines {
            if cancel.is_cancelled() {
                break 'batches;
            }
            match parse_line(line) {
                Ok(record) => match cancel.send(&records, record) {
                    Delivery::Sent => summary.records += 1,
                    Delivery::Cancelled | Delivery::Closed => break 'batches,
                },
                Err(error) => {
                    summary.rejected += 1;
                    tracing::debug!(
                        worker = id,
                        batch = seq,
                        %error,
                        line = %String::from_utf8_lossy(line),
                        "discarding malformed line"
                    );
                }
            }
        }
    }
    tracing::trace!(worker = id, ?summary, "worker finished");
    summary
}

/// Running workers of one pipeline run. [`WorkerPool::join`] is the shutdown
/// barrier for the parsing stage.
pub struct WorkerPool<'scope> {
    handles: Vec<ScopedJoinHandle<'scope, WorkerSummary>>,
}

impl<'scope> WorkerPool<'scope> {
    /// Starts `workers` threads on `batches` and returns the pool together with
    /// one output receiver per worker.
    pub fn spawn<'env, 'a: 'env>(
        scope: &'scope Scope<'scope, 'env>,
        workers: usize,
        record_queue: usize,
        batches: Receiver<Batch<'a>>,
        cancel: &'env CancelToken,
    ) -> Result<(Self, Vec<Receiver<Record<'a>>>)> {
        let mut handles = Vec::with_capacity(workers);
        let mut outputs = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = bounded(record_queue);
            let batches = batches.clone();
            let stage = format!("worker-{id}");
            let handle = thread::Builder::new()
                .name(stage.clone())
                .spawn_scoped(scope, move || parse_batches(id, &batches, tx, cancel))
                .map_err(|source| Error::Spawn { stage, source })?;
            handles.push(handle);
            outputs.push(rx);
        }
        Ok((WorkerPool { handles }, outputs))
    }

    /// Waits for every worker. Joins all of them even if one panicked.
    pub fn join(self) -> Result<Vec<WorkerSummary>> {
        let mut summaries = Vec::with_capacity(self.handles.len());
        let mut panicked = None;
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            match handle.join() {
                Ok(summary) => summaries.push(summary),
                Err(_) => panicked = Some(name),
            }
        }
        match panicked {
            Some(name) => Err(Error::StagePanicked(name)),
            None => Ok(summaries),
        }
    }
}
