use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub ordered: OrderedConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| BenchError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Checks everything the time-boxed producer benchmark needs.
    pub fn validate_producer(&self) -> Result<()> {
        self.target.validate()?;
        if self.producer.instance_count == 0 {
            return Err(BenchError::Config(
                "instance count must be positive integer".into(),
            ));
        }
        if self.producer.duration_ms == 0 {
            return Err(BenchError::Config("test time must be positive integer".into()));
        }
        if self.producer.body_size == 0 {
            return Err(BenchError::Config("body size must be positive integer".into()));
        }
        self.report.validate()
    }

    /// Checks everything the ordered dispatcher needs.
    pub fn validate_ordered(&self) -> Result<()> {
        self.target.validate()?;
        self.ordered.validate()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Name server (broker discovery) address
    #[serde(default)]
    pub name_server: String,
    #[serde(default)]
    pub topic: String,
    /// Producer group identifier
    #[serde(default)]
    pub group_id: String,
}

impl TargetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.topic.is_empty() {
            return Err(BenchError::Config("empty topic".into()));
        }
        if self.group_id.is_empty() {
            return Err(BenchError::Config("empty group id".into()));
        }
        if self.name_server.is_empty() {
            return Err(BenchError::Config("empty name server address".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Number of concurrent send loops
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
    /// Wall-clock deadline of the run in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Size of each message body in bytes
    #[serde(default = "default_body_size")]
    pub body_size: usize,
    /// Pause after a failed send. Zero retries immediately.
    #[serde(default)]
    pub retry_backoff_ms: u64,
}

impl ProducerConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            instance_count: default_instance_count(),
            duration_ms: default_duration_ms(),
            body_size: default_body_size(),
            retry_backoff_ms: 0,
        }
    }
}

fn default_instance_count() -> u32 {
    1
}

fn default_duration_ms() -> u64 {
    10 * 60 * 1000
}

fn default_body_size() -> usize {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
}

impl ReportConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.snapshot_interval_ms == 0 || self.report_interval_ms == 0 {
            return Err(BenchError::Config("report intervals must be positive".into()));
        }
        Ok(())
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: default_snapshot_interval_ms(),
            report_interval_ms: default_report_interval_ms(),
        }
    }
}

fn default_snapshot_interval_ms() -> u64 {
    1000
}

fn default_report_interval_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedConfig {
    #[serde(default)]
    pub body: String,
    /// Total messages drained across all workers
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub worker_count: u32,
    /// Partition key carried by every message
    #[serde(default = "default_order_key")]
    pub order_key: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl OrderedConfig {
    pub fn validate(&self) -> Result<()> {
        if self.body.is_empty() {
            return Err(BenchError::Config("empty body".into()));
        }
        if self.message_count == 0 {
            return Err(BenchError::Config("zero message count".into()));
        }
        if self.worker_count == 0 {
            return Err(BenchError::Config("zero worker count".into()));
        }
        Ok(())
    }
}

impl Default for OrderedConfig {
    fn default() -> Self {
        Self {
            body: String::new(),
            message_count: 0,
            worker_count: 0,
            order_key: default_order_key(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_order_key() -> u64 {
    7
}

fn default_max_retries() -> u32 {
    3
}
