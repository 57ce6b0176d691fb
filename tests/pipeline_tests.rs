use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use brc_pipeline::{
    parse_line, CancelToken, Error, MappedFile, Pipeline, PipelineConfig, Report, Stats, StatsMap,
    Strategy, TailPolicy,
};
use hashbrown::HashMap;
use tempfile::NamedTempFile;

const STATIONS: [&str; 7] = [
    "Adana",
    "Ankara",
    "Bursa",
    "Izmir",
    "St. John's",
    "Zürich",
    "Ürümqi",
];

/// Deterministic input with a sprinkling of malformed lines.
fn measurements(lines: usize) -> String {
    let mut out = String::new();
    for i in 0..lines {
        let station = STATIONS[(i * 7 + i / 3) % STATIONS.len()];
        match i % 97 {
            13 => out.push_str("garbage\n"),
            41 => out.push_str(&format!("{station};not-a-number\n")),
            _ => {
                let value = ((i * 37) % 1999) as f32 / 10.0 - 99.9;
                out.push_str(&format!("{station};{value:.1}\n"));
            }
        }
    }
    out
}

/// Single-threaded reference.
fn reference(input: &str) -> HashMap<String, (u64, f32, f32)> {
    let mut result: HashMap<String, (u64, f32, f32)> = HashMap::new();
    for line in input.lines() {
        let Ok(record) = parse_line(line.as_bytes()) else {
            continue;
        };
        result
            .entry(record.key.to_string())
            .and_modify(|e| {
                e.0 += 1;
                e.1 = e.1.min(record.value);
                e.2 = e.2.max(record.value);
            })
            .or_insert((1, record.value, record.value));
    }
    result
}

fn config(workers: usize, batch_size: usize, strategy: Strategy) -> PipelineConfig {
    PipelineConfig {
        workers,
        batch_size,
        strategy,
        batch_queue: workers,
        record_queue: 64,
        ..Default::default()
    }
}

fn assert_matches_reference(stats: &StatsMap, input: &str) {
    let expected = reference(input);
    assert_eq!(stats.len(), expected.len());
    for (key, (count, min, max)) in expected {
        let got = &stats[key.as_str()];
        assert_eq!(got.count(), count, "{key}");
        assert_eq!(got.min(), min, "{key}");
        assert_eq!(got.max(), max, "{key}");
    }
}

#[test]
fn matches_single_threaded_reference_for_every_strategy() {
    let input = measurements(20_011);
    let cancel = CancelToken::new();
    for strategy in [
        Strategy::Locked,
        Strategy::Sharded { shards: 5 },
        Strategy::Actor,
    ] {
        for (workers, batch_size) in [(1, 1000), (4, 7), (8, 1000)] {
            let aggregation = Pipeline::new(config(workers, batch_size, strategy))
                .run(input.lines().map(str::as_bytes), &cancel)
                .unwrap();
            assert_matches_reference(&aggregation.stats, &input);
            let summary = aggregation.summary;
            assert_eq!(summary.lines, 20_011);
            assert_eq!(summary.records + summary.rejected, summary.lines);
            assert_eq!(summary.folded, summary.records);
        }
    }
}

#[test]
fn runs_over_a_mapped_file() {
    let input = measurements(5_000);
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(input.as_bytes()).unwrap();

    let mapped = MappedFile::open(file.path()).unwrap();
    let cancel = CancelToken::new();
    let aggregation = Pipeline::new(config(3, 64, Strategy::Locked))
        .run(mapped.lines(), &cancel)
        .unwrap();
    assert_matches_reference(&aggregation.stats, &input);
}

#[test]
fn report_lists_every_key_once_in_order() {
    let input = "Izmir;10.0\nAdana;1.0\nAdana;3.0\nIzmir;20.0\nBursa;-2.5\n";
    let cancel = CancelToken::new();
    let aggregation = Pipeline::new(config(2, 2, Strategy::Locked))
        .run(input.lines().map(str::as_bytes), &cancel)
        .unwrap();
    assert_eq!(
        Report::new(aggregation.stats).to_string(),
        "Adana: 1.00/2.00/3.00\nBursa: -2.50/-2.50/-2.50\nIzmir: 10.00/15.00/20.00\n"
    );
}

#[test]
fn tail_shorter_than_batch_is_flushed_by_default() {
    // 10 lines with a batch size of 4 leaves a 2-line tail holding the only "Tail" key.
    let mut input = String::new();
    for _ in 0..8 {
        input.push_str("Head;1.0\n");
    }
    input.push_str("Tail;2.0\nTail;4.0\n");

    let cancel = CancelToken::new();
    let default_tail = PipelineConfig {
        workers: 2,
        batch_size: 4,
        ..Default::default()
    };
    assert_eq!(default_tail.tail, TailPolicy::Flush);
    let aggregation = Pipeline::new(default_tail)
        .run(input.lines().map(str::as_bytes), &cancel)
        .unwrap();
    assert_eq!(aggregation.stats["Head"].count(), 8);
    assert_eq!(aggregation.stats["Tail"].count(), 2);
    assert_eq!(aggregation.stats["Tail"].mean(), Some(3.0));

    let dropping = PipelineConfig {
        workers: 2,
        batch_size: 4,
        tail: TailPolicy::Drop,
        ..Default::default()
    };
    let aggregation = Pipeline::new(dropping)
        .run(input.lines().map(str::as_bytes), &cancel)
        .unwrap();
    assert_eq!(aggregation.summary.lines, 10);
    assert_eq!(aggregation.stats.len(), 1);
    assert!(!aggregation.stats.contains_key("Tail"));
}

#[test]
fn only_malformed_lines_yield_empty_map() {
    let input = "nope\n;1.0\nAdana;abc\nAdana;1;2\nAdana;NaN\n";
    let cancel = CancelToken::new();
    let aggregation = Pipeline::new(config(2, 2, Strategy::Locked))
        .run(input.lines().map(str::as_bytes), &cancel)
        .unwrap();
    assert!(aggregation.stats.is_empty());
    assert_eq!(aggregation.summary.rejected, 5);
}

/// An endless source can only terminate through cancellation, so reaching a
/// result at all shows that no stage stayed blocked.
fn cancel_endless_run(strategy: Strategy, batch_queue: usize, record_queue: usize) {
    const BUDGET: Duration = Duration::from_secs(10);

    let cancel = CancelToken::new();
    let seen = AtomicU64::new(0);
    let (done_tx, done_rx) = mpsc::channel();
    let trigger = cancel.clone();
    let worker_cancel = cancel.clone();

    let runner = thread::spawn(move || {
        let lines = std::iter::repeat(&b"Adana;12.5"[..]).inspect(|_| {
            if seen.fetch_add(1, Ordering::Relaxed) == 50_000 {
                trigger.cancel();
            }
        });
        let config = PipelineConfig {
            workers: 4,
            batch_size: 100,
            strategy,
            batch_queue,
            record_queue,
            ..Default::default()
        };
        let result = Pipeline::new(config).run(lines, &worker_cancel);
        let _ = done_tx.send(result.map(|a| a.summary));
    });

    let outcome = done_rx
        .recv_timeout(BUDGET)
        .expect("pipeline did not stop after cancellation");
    assert!(matches!(outcome, Err(Error::Cancelled)));
    assert!(cancel.is_cancelled());
    runner.join().unwrap();
}

#[test]
fn cancellation_terminates_endless_input() {
    cancel_endless_run(Strategy::Locked, 8, 64);
}

#[test]
fn cancellation_terminates_with_synchronous_queues() {
    cancel_endless_run(Strategy::Locked, 0, 0);
    cancel_endless_run(Strategy::Sharded { shards: 3 }, 0, 0);
    cancel_endless_run(Strategy::Actor, 0, 0);
}

#[test]
fn fold_order_does_not_change_count_min_max() {
    let values = [3.5f32, -1.25, 40.0, 0.0, 12.75, -1.25];
    let mut forward = Stats::default();
    for &v in &values {
        forward.fold(v);
    }
    let mut backward = Stats::default();
    for &v in values.iter().rev() {
        backward.fold(v);
    }
    assert_eq!(forward.count(), backward.count());
    assert_eq!(forward.min(), backward.min());
    assert_eq!(forward.max(), backward.max());
    assert!((forward.sum() - backward.sum()).abs() < 1e-9);
}
