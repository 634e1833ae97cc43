//! CLI argument parsing.

use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;

use crate::config::Config;

#[derive(Clone, Debug, FromArgs)]
#[argh(description = "Sync committee of the sharded rollup")]
pub(crate) struct Args {
    // Config non-overriding args
    #[argh(option, short = 'c', description = "path to configuration")]
    pub config: Option<PathBuf>,

    // Config overriding args
    /// Data directory path that will override the path in the config toml.
    #[argh(option, short = 'd', description = "datadir path used for the database")]
    pub datadir: Option<PathBuf>,

    /// Rpc host that the committee will listen to.
    #[argh(option, description = "rpc host")]
    pub rpc_host: Option<String>,

    /// Rpc port that the committee will listen to.
    #[argh(option, description = "rpc port")]
    pub rpc_port: Option<u16>,

    #[argh(switch, description = "log in JSON format")]
    pub json_logs: bool,
}

impl Args {
    /// Reads the config file, if any, and applies the overrides given on the command line.
    pub(crate) fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(datadir) = &self.datadir {
            config.datadir = datadir.clone();
        }
        if let Some(host) = &self.rpc_host {
            config.rpc.host = host.clone();
        }
        if let Some(port) = self.rpc_port {
            config.rpc.port = port;
        }
        if self.json_logs {
            config.logging.json_format = true;
        }

        Ok(config)
    }
}
