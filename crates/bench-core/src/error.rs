use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a benchmark run before or while it starts.
///
/// Per-send failures never surface here; they are counted in
/// [`StatCounters`](crate::StatCounters) and the worker keeps going.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config file {path:?}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("sender startup failed: {0}")]
    Startup(String),

    #[error("benchmark task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, BenchError>;
