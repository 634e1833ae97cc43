//! Configuration of the sync committee.
//!
//! Loaded from a TOML file; every field has a default, so a missing section or key falls back
//! to it. A handful of fields can be overridden from the command line (see [`crate::args`]).

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use committee_batch_types::ConstraintConfig;
use committee_core::{AggregatorConfig, ProposerConfig};
use committee_db_store_sled::SledDbConfig;
use committee_primitives::Hash;
use committee_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};

/// Default data directory for the sled database.
const DEFAULT_DATADIR: &str = "sync-committee-data";

/// Default RPC host to listen on.
const DEFAULT_RPC_HOST: &str = "127.0.0.1";

/// Default RPC port to listen on.
const DEFAULT_RPC_PORT: u16 = 8530;

/// Default number of attempts of a conflicting storage transaction.
const DEFAULT_DB_RETRY_COUNT: u16 = 10;

/// Default bounds of the jittered delay between transaction attempts.
const DEFAULT_DB_RETRY_MIN_DELAY_MS: u64 = 20;
const DEFAULT_DB_RETRY_MAX_DELAY_MS: u64 = 100;

/// Default time a task may run before it is handed to another executor.
const DEFAULT_EXECUTION_TIMEOUT_S: u64 = 300;

/// Default period of the hanging task sweep.
const DEFAULT_RESCHEDULE_INTERVAL_S: u64 = 30;

/// Default age at which a non-empty batch gets sealed.
const DEFAULT_SEALING_TIMEOUT_S: u64 = 600;

/// Default number of blocks a batch may hold.
const DEFAULT_MAX_BLOCKS_COUNT: usize = 1000;

/// Default number of batches stored at once.
const DEFAULT_BATCH_CAPACITY: u32 = 100;

/// Default URL of the shard node serving blocks.
const DEFAULT_BLOCK_SOURCE_URL: &str = "http://127.0.0.1:8529";

/// Default period of block fetching.
const DEFAULT_FETCH_INTERVAL_MS: u64 = 1_000;

/// Default number of main blocks fetched per round.
const DEFAULT_MAX_FETCH_SIZE: u64 = 100;

/// Default period of proposal attempts.
const DEFAULT_PROPOSE_INTERVAL_S: u64 = 10;

/// Default port of the prometheus endpoint.
const DEFAULT_METRICS_PORT: u16 = 9530;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Config {
    /// Directory holding the sled database.
    #[serde(default = "default_values::datadir")]
    pub(crate) datadir: PathBuf,

    #[serde(default)]
    pub(crate) rpc: RpcConfig,

    #[serde(default)]
    pub(crate) db: DbConfig,

    #[serde(default)]
    pub(crate) scheduler: SchedulerSection,

    #[serde(default)]
    pub(crate) batch: BatchConfig,

    #[serde(default)]
    pub(crate) aggregator: AggregatorSection,

    #[serde(default)]
    pub(crate) proposer: ProposerSection,

    #[serde(default)]
    pub(crate) l1: L1Config,

    #[serde(default)]
    pub(crate) metrics: MetricsConfig,

    #[serde(default)]
    pub(crate) logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RpcConfig {
    #[serde(default = "default_values::rpc_host")]
    pub(crate) host: String,

    #[serde(default = "default_values::rpc_port")]
    pub(crate) port: u16,

    /// Serve the `DebugTasks` namespace next to the executor API.
    #[serde(default = "default_values::enabled")]
    pub(crate) enable_debug_rpc: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DbConfig {
    #[serde(default = "default_values::db_retry_count")]
    pub(crate) retry_count: u16,

    #[serde(default = "default_values::db_retry_min_delay_ms")]
    pub(crate) retry_min_delay_ms: u64,

    #[serde(default = "default_values::db_retry_max_delay_ms")]
    pub(crate) retry_max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SchedulerSection {
    #[serde(default = "default_values::execution_timeout_s")]
    pub(crate) execution_timeout_s: u64,

    #[serde(default = "default_values::reschedule_interval_s")]
    pub(crate) reschedule_interval_s: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BatchConfig {
    #[serde(default = "default_values::sealing_timeout_s")]
    pub(crate) sealing_timeout_s: u64,

    #[serde(default = "default_values::max_blocks_count")]
    pub(crate) max_blocks_count: usize,

    /// Batches stored at once before fetching pauses.
    #[serde(default = "default_values::capacity_limit")]
    pub(crate) capacity_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AggregatorSection {
    #[serde(default = "default_values::block_source_url")]
    pub(crate) block_source_url: String,

    #[serde(default = "default_values::fetch_interval_ms")]
    pub(crate) fetch_interval_ms: u64,

    #[serde(default = "default_values::max_fetch_size")]
    pub(crate) max_fetch_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProposerSection {
    #[serde(default = "default_values::propose_interval_s")]
    pub(crate) propose_interval_s: u64,
}

/// Which L1 contract the proposer talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum L1Mode {
    /// In-process contract, finalizing updates immediately.
    #[default]
    Local,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct L1Config {
    #[serde(default)]
    pub(crate) mode: L1Mode,

    /// State root the local contract starts from.
    #[serde(default)]
    pub(crate) genesis_root: Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MetricsConfig {
    #[serde(default)]
    pub(crate) enabled: bool,

    #[serde(default = "default_values::rpc_host")]
    pub(crate) host: String,

    #[serde(default = "default_values::metrics_port")]
    pub(crate) port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct LoggingConfig {
    #[serde(default)]
    pub(crate) json_format: bool,

    /// Also write logs to rolling files in this directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) log_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) log_file_prefix: Option<String>,
}

/// Default value functions to make [`serde`] happy and make the [`super`] code mess easy to read.
mod default_values {
    use super::*;

    pub(super) fn datadir() -> PathBuf {
        PathBuf::from(DEFAULT_DATADIR)
    }

    pub(super) fn rpc_host() -> String {
        DEFAULT_RPC_HOST.to_string()
    }

    pub(super) fn rpc_port() -> u16 {
        DEFAULT_RPC_PORT
    }

    pub(super) fn enabled() -> bool {
        true
    }

    pub(super) fn db_retry_count() -> u16 {
        DEFAULT_DB_RETRY_COUNT
    }

    pub(super) fn db_retry_min_delay_ms() -> u64 {
        DEFAULT_DB_RETRY_MIN_DELAY_MS
    }

    pub(super) fn db_retry_max_delay_ms() -> u64 {
        DEFAULT_DB_RETRY_MAX_DELAY_MS
    }

    pub(super) fn execution_timeout_s() -> u64 {
        DEFAULT_EXECUTION_TIMEOUT_S
    }

    pub(super) fn reschedule_interval_s() -> u64 {
        DEFAULT_RESCHEDULE_INTERVAL_S
    }

    pub(super) fn sealing_timeout_s() -> u64 {
        DEFAULT_SEALING_TIMEOUT_S
    }

    pub(super) fn max_blocks_count() -> usize {
        DEFAULT_MAX_BLOCKS_COUNT
    }

    pub(super) fn capacity_limit() -> u32 {
        DEFAULT_BATCH_CAPACITY
    }

    pub(super) fn block_source_url() -> String {
        DEFAULT_BLOCK_SOURCE_URL.to_string()
    }

    pub(super) fn fetch_interval_ms() -> u64 {
        DEFAULT_FETCH_INTERVAL_MS
    }

    pub(super) fn max_fetch_size() -> u64 {
        DEFAULT_MAX_FETCH_SIZE
    }

    pub(super) fn propose_interval_s() -> u64 {
        DEFAULT_PROPOSE_INTERVAL_S
    }

    pub(super) fn metrics_port() -> u16 {
        DEFAULT_METRICS_PORT
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datadir: default_values::datadir(),
            rpc: RpcConfig::default(),
            db: DbConfig::default(),
            scheduler: SchedulerSection::default(),
            batch: BatchConfig::default(),
            aggregator: AggregatorSection::default(),
            proposer: ProposerSection::default(),
            l1: L1Config::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: default_values::rpc_host(),
            port: default_values::rpc_port(),
            enable_debug_rpc: default_values::enabled(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            retry_count: default_values::db_retry_count(),
            retry_min_delay_ms: default_values::db_retry_min_delay_ms(),
            retry_max_delay_ms: default_values::db_retry_max_delay_ms(),
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            execution_timeout_s: default_values::execution_timeout_s(),
            reschedule_interval_s: default_values::reschedule_interval_s(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            sealing_timeout_s: default_values::sealing_timeout_s(),
            max_blocks_count: default_values::max_blocks_count(),
            capacity_limit: default_values::capacity_limit(),
        }
    }
}

impl Default for AggregatorSection {
    fn default() -> Self {
        Self {
            block_source_url: default_values::block_source_url(),
            fetch_interval_ms: default_values::fetch_interval_ms(),
            max_fetch_size: default_values::max_fetch_size(),
        }
    }
}

impl Default for ProposerSection {
    fn default() -> Self {
        Self {
            propose_interval_s: default_values::propose_interval_s(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_values::rpc_host(),
            port: default_values::metrics_port(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub(crate) fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub(crate) fn rpc_listen_addr(&self) -> String {
        format!("{}:{}", self.rpc.host, self.rpc.port)
    }

    pub(crate) fn metrics_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.metrics.host, self.metrics.port);
        addr.parse()
            .with_context(|| format!("invalid metrics address {addr}"))
    }

    pub(crate) fn db_config(&self) -> SledDbConfig {
        SledDbConfig::new_with_jitter_backoff(
            self.db.retry_count,
            self.db.retry_min_delay_ms,
            self.db.retry_max_delay_ms,
        )
    }

    pub(crate) fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(
            Duration::from_secs(self.scheduler.execution_timeout_s),
            Duration::from_secs(self.scheduler.reschedule_interval_s),
        )
    }

    pub(crate) fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            fetch_interval: Duration::from_millis(self.aggregator.fetch_interval_ms),
            max_fetch_size: self.aggregator.max_fetch_size,
            constraints: ConstraintConfig {
                sealing_timeout: Duration::from_secs(self.batch.sealing_timeout_s),
                max_blocks_count: self.batch.max_blocks_count,
            },
        }
    }

    pub(crate) fn proposer_config(&self) -> ProposerConfig {
        ProposerConfig {
            propose_interval: Duration::from_secs(self.proposer.propose_interval_s),
        }
    }
}
