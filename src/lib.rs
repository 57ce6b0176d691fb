//! Concurrent min/mean/max aggregation of `<key>;<value>` lines.
//!
//! A [`producer`] cuts the input into batches, a [`worker`] pool parses them in
//! parallel, and the [`aggregator`] folds every parsed record into one
//! [`StatsMap`]. [`Pipeline`] wires the three together.

pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod producer;
pub mod record;
pub mod report;
pub mod source;
pub mod stats;
pub mod worker;

pub use cancel::CancelToken;
pub use config::{PipelineConfig, Strategy, TailPolicy};
pub use error::{Error, ParseError, Result};
pub use pipeline::{Aggregation, Pipeline, RunSummary};
pub use record::{parse_line, Record};
pub use report::Report;
pub use source::MappedFile;
pub use stats::{Stats, StatsMap};
