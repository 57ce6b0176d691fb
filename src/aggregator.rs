//! Fan-in aggregation of per-worker record queues into one [`StatsMap`].
//!
//! With [`Strategy::Locked`] and [`Strategy::Sharded`] one listener thread per
//! queue folds records into a shared [`Table`]. With [`Strategy::Actor`] the
//! calling thread alone owns the map and multiplexes every queue.
//!
//! Listeners drain their queue until it closes even after cancellation; the
//! records are then discarded unfolded. A worker blocked on a full output
//! queue is therefore always released.

use std::hash::{Hash, Hasher};
use std::thread;

use crossbeam_channel::{Receiver, Select};
use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::config::Strategy;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::stats::StatsMap;

/// Shared mapping that listeners fold into concurrently.
pub trait Table: Sync {
    fn fold(&self, record: Record<'_>);

    fn into_map(self) -> StatsMap;
}

/// One lock around the whole mapping, held for each read-modify-write.
#[derive(Default)]
pub struct LockedTable {
    map: Mutex<StatsMap>,
}

impl Table for LockedTable {
    fn fold(&self, record: Record<'_>) {
        self.map
            .lock()
            .entry_ref(record.key)
            .or_default()
            .fold(record.value);
    }

    fn into_map(self) -> StatsMap {
        self.map.into_inner()
    }
}

/// Keys partitioned over independently locked maps.
pub struct ShardedTable {
    shards: Vec<Mutex<StatsMap>>,
}

impl ShardedTable {
    pub fn new(shards: usize) -> Self {
        ShardedTable {
            shards: (0..shards.max(1)).map(|_| Mutex::default()).collect(),
        }
    }

    fn shard_of(&self, key: &str) -> usize {
        let mut hasher = ahash::AHasher::default();
        key.hash(&mut hasher);
        hasher.finish() as usize % self.shards.len()
    }
}

impl Table for ShardedTable {
    fn fold(&self, record: Record<'_>) {
        let idx = self.shard_of(record.key);
        self.shards[idx]
            .lock()
            .entry_ref(record.key)
            .or_default()
            .fold(record.value);
    }

    fn into_map(self) -> StatsMap {
        // A key only ever lands in one shard, so shards never overlap.
        self.shards
            .into_iter()
            .map(Mutex::into_inner)
            .reduce(|mut acc, shard| {
                acc.extend(shard);
                acc
            })
            .unwrap_or_default()
    }
}

/// Result of draining every worker queue.
#[derive(Debug, Default)]
pub struct Collected {
    pub stats: StatsMap,
    pub folded: u64,
}

pub struct Aggregator {
    strategy: Strategy,
}

impl Aggregator {
    pub fn new(strategy: Strategy) -> Self {
        Aggregator { strategy }
    }

    /// Consumes `inputs` until every queue is closed, then returns the
    /// completed mapping. Nothing is returned before all listeners have exited.
    pub fn collect(
        &self,
        inputs: Vec<Receiver<Record<'_>>>,
        cancel: &CancelToken,
    ) -> Result<Collected> {
        match self.strategy {
            Strategy::Locked => listen_all(LockedTable::default(), inputs, cancel),
            Strategy::Sharded { shards } => {
                listen_all(ShardedTable::new(shards), inputs, cancel)
            }
            Strategy::Actor => Ok(own(inputs, cancel)),
        }
    }
}

fn listen<T: Table>(rx: Receiver<Record<'_>>, table: &T, cancel: &CancelToken) -> u64 {
    let mut folded = 0;
    for record in rx.iter() {
        if cancel.is_cancelled() {
            continue;
        }
        table.fold(record);
        folded += 1;
    }
    folded
}

fn listen_all<T: Table>(
    table: T,
    inputs: Vec<Receiver<Record<'_>>>,
    cancel: &CancelToken,
) -> Result<Collected> {
    let folded = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(inputs.len());
        let mut failure = None;
        for (id, rx) in inputs.into_iter().enumerate() {
            let table = &table;
            let spawned = thread::Builder::new()
                .name(format!("listener-{id}"))
                .spawn_scoped(scope, move || listen(rx, table, cancel));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    // The matching worker sees its queue closed; everyone else
                    // is told to stop.
                    cancel.cancel();
                    failure = Some(Error::Spawn {
                        stage: format!("listener-{id}"),
                        source,
                    });
                    break;
                }
            }
        }

        let mut folded = 0;
        for handle in handles {
            let name = handle.thread().name().unwrap_or("listener").to_string();
            match handle.join() {
                Ok(n) => folded += n,
                Err(_) => {
                    failure.get_or_insert(Error::StagePanicked(name));
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(folded),
        }
    })?;

    Ok(Collected {
        stats: table.into_map(),
        folded,
    })
}

/// Single-owner fan-in: the only writer of the map, so no lock is taken.
fn own(inputs: Vec<Receiver<Record<'_>>>, cancel: &CancelToken) -> Collected {
    let mut collected = Collected::default();
    let mut select = Select::new();
    for rx in &inputs {
        select.recv(rx);
    }
    let mut open = inputs.len();
    while open > 0 {
        let op = select.select();
        let index = op.index();
        match op.recv(&inputs[index]) {
            Ok(record) => {
                if cancel.is_cancelled() {
                    continue;
                }
                collected
                    .stats
                    .entry_ref(record.key)
                    .or_default()
                    .fold(record.value);
                collected.folded += 1;
            }
            Err(_) => {
                select.remove(index);
                open -= 1;
            }
        }
    }
    collected
}
