use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open input {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot map input {path:?}")]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to spawn {stage} thread")]
    Spawn {
        stage: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} thread panicked")]
    StagePanicked(String),
    #[error("run cancelled")]
    Cancelled,
}

/// Why a single line did not become a record. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("missing ';' delimiter")]
    MissingDelimiter,
    #[error("more than two fields")]
    TooManyFields,
    #[error("empty key")]
    EmptyKey,
    #[error("key is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("non-finite value {0:?}")]
    NonFinite(String),
}

pub type Result<T> = std::result::Result<T, Error>;
