use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use brc_pipeline::cancel::cancel_on_signals;
use brc_pipeline::{
    logging, CancelToken, MappedFile, Pipeline, PipelineConfig, Report, Strategy, TailPolicy,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// One lock around the whole mapping
    Locked,
    /// Keys spread over independently locked shards
    Sharded,
    /// One thread owns the mapping
    Actor,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TailArg {
    /// Emit the trailing partial batch
    Flush,
    /// Discard the trailing partial batch
    Drop,
}

/// Per-key min/mean/max over a `<key>;<value>` file.
#[derive(Debug, Parser)]
#[command(name = "brc", version)]
struct Args {
    /// Input file, one `<key>;<value>` per line
    #[arg(default_value = "measurements.txt")]
    input: PathBuf,

    /// Parser threads [default: available parallelism]
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Lines per batch
    #[arg(short = 'b', long, default_value_t = 1000)]
    batch_size: usize,

    /// Trailing partial batch policy
    #[arg(long, value_enum, default_value_t = TailArg::Flush)]
    tail: TailArg,

    /// How listeners share the result map
    #[arg(long, value_enum, default_value_t = StrategyArg::Locked)]
    strategy: StrategyArg,

    /// Shard count for `--strategy sharded`
    #[arg(long, default_value_t = 16)]
    shards: usize,

    /// Batches buffered ahead of the workers (0 = synchronous hand-off)
    #[arg(long)]
    batch_queue: Option<usize>,

    /// Records buffered per worker
    #[arg(long, default_value_t = 1024)]
    record_queue: usize,

    /// Repeat the run and report the mean wall time
    #[arg(long, default_value_t = 1)]
    runs: u32,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        let workers = self.workers.unwrap_or(defaults.workers);
        PipelineConfig {
            workers,
            batch_size: self.batch_size,
            tail: match self.tail {
                TailArg::Flush => TailPolicy::Flush,
                TailArg::Drop => TailPolicy::Drop,
            },
            strategy: match self.strategy {
                StrategyArg::Locked => Strategy::Locked,
                StrategyArg::Sharded => Strategy::Sharded {
                    shards: self.shards,
                },
                StrategyArg::Actor => Strategy::Actor,
            },
            batch_queue: self.batch_queue.unwrap_or(workers * 2),
            record_queue: self.record_queue,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = args.pipeline_config();
    config.validate()?;
    let input = MappedFile::open(&args.input)?;
    let cancel = CancelToken::new();
    cancel_on_signals(&cancel).context("installing signal handlers")?;

    let pipeline = Pipeline::new(config);
    let mut last = None;
    let elapsed = timeit(args.runs.max(1), || -> Result<()> {
        let aggregation = pipeline
            .run(input.lines(), &cancel)
            .with_context(|| format!("aggregating {}", input.path().display()))?;
        last = Some(aggregation);
        Ok(())
    })?;
    tracing::info!(runs = args.runs.max(1), ?elapsed, "mean wall time");

    if let Some(aggregation) = last {
        Report::new(aggregation.stats)
            .write_to(BufWriter::new(io::stdout().lock()))
            .context("writing report")?;
    }
    Ok(())
}

fn timeit<F: FnMut() -> Result<()>>(count: u32, mut f: F) -> Result<Duration> {
    let start = Instant::now();
    for _ in 0..count {
        f()?;
    }
    Ok(start.elapsed() / count)
}
