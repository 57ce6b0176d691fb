//! Batch producer: groups a sequential line source into fixed-size batches and
//! feeds them to the shared distribution queue.

use crossbeam_channel::Sender;

use crate::cancel::{CancelToken, Delivery};
use crate::config::TailPolicy;

/// Upper bound on the up-front reservation for one batch buffer. Larger
/// batches grow on demand.
const MAX_PREALLOC: usize = 4096;

/// A run of consecutive raw lines, moved to exactly one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<'a> {
    pub seq: u64,
    pub lines: Vec<&'a [u8]>,
}

/// Lazily cuts a line iterator into batches of `batch_size` lines.
///
/// Cancellation is checked before every line and ends the sequence without
/// emitting the partially filled buffer.
pub struct Batches<'c, I> {
    lines: I,
    batch_size: usize,
    tail: TailPolicy,
    cancel: &'c CancelToken,
    next_seq: u64,
    lines_read: u64,
    done: bool,
}

impl<'c, 'a, I> Batches<'c, I>
where
    I: Iterator<Item = &'a [u8]>,
{
    pub fn new(lines: I, batch_size: usize, tail: TailPolicy, cancel: &'c CancelToken) -> Self {
        Batches {
            lines,
            batch_size,
            tail,
            cancel,
            next_seq: 0,
            lines_read: 0,
            done: false,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    fn emit(&mut self, lines: Vec<&'a [u8]>) -> Batch<'a> {
        let seq = self.next_seq;
        self.next_seq += 1;
        Batch { seq, lines }
    }
}

impl<'c, 'a, I> Iterator for Batches<'c, I>
where
    I: Iterator<Item = &'a [u8]>,
{
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buffer = Vec::with_capacity(self.batch_size.min(MAX_PREALLOC));
        loop {
            if self.cancel.is_cancelled() {
                self.done = true;
                return None;
            }
            match self.lines.next() {
                Some(line) => {
                    self.lines_read += 1;
                    buffer.push(line);
                    if buffer.len() == self.batch_size {
                        return Some(self.emit(buffer));
                    }
                }
                None => {
                    self.done = true;
                    return match self.tail {
                        TailPolicy::Flush if !buffer.is_empty() => Some(self.emit(buffer)),
                        TailPolicy::Flush => None,
                        TailPolicy::Drop => {
                            if !buffer.is_empty() {
                                tracing::debug!(
                                    lines = buffer.len(),
                                    "dropping trailing partial batch"
                                );
                            }
                            None
                        }
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerSummary {
    pub lines: u64,
    pub batches: u64,
}

/// Drives `batches` into the distribution queue. Returning drops `tx`, which
/// is how workers observe end of input.
pub fn produce<'a, I>(
    mut batches: Batches<'_, I>,
    tx: Sender<Batch<'a>>,
    cancel: &CancelToken,
) -> ProducerSummary
where
    I: Iterator<Item = &'a [u8]>,
{
    let mut sent = 0;
    for batch in batches.by_ref() {
        match cancel.send(&tx, batch) {
            Delivery::Sent => sent += 1,
            Delivery::Cancelled => {
                tracing::debug!(sent, "producer cancelled");
                break;
            }
            Delivery::Closed => {
                tracing::warn!(sent, "distribution queue closed before end of input");
                break;
            }
        }
    }
    ProducerSummary {
        lines: batches.lines_read(),
        batches: sent,
    }
}
