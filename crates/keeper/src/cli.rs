use clap::{ArgAction, Parser, Subcommand};
use keeper_ensemble::MemberId;
use std::path::PathBuf;

/// Default watch-loop period in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(
    name = "keeper",
    version,
    about = "Bootstraps and maintains a quorum coordination ensemble"
)]
pub struct Cli {
    /// Node configuration file (TOML) [default: /etc/keeper/keeper.toml]
    #[arg(long, env = "KEEPER_CONFIG", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "KEEPER_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to file (in addition to stderr)
    #[arg(long, env = "KEEPER_LOG_FILE", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(keeper_common::paths::default_config_path)
    }

    /// Effective log filter directive after `-v` flags.
    pub fn log_directive(&self) -> &str {
        match self.verbose {
            0 => self.log_level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run one reconcile cycle and print the resulting status (default)
    Reconcile,
    /// Reconcile periodically until interrupted
    Run {
        /// Seconds between cycles
        #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_INTERVAL_SECS)]
        interval: u64,
    },
    /// Drop a departed member and reconcile
    Depart {
        /// Member id of the departed peer
        id: MemberId,
    },
    /// Show membership and service status without changing anything
    Status,
}
