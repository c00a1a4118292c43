//! Command-line surface

use std::path::PathBuf;
use clap::{Args, Parser, Subcommand};

use crate::logic::config::{Config, ConfigError};
use crate::logic::policy::PolicyConfig;

#[derive(Parser, Debug)]
#[command(name = "flowguard")]
#[command(version)]
#[command(about = "Windowed flow aggregation with anomaly detection and automatic blocking")]
pub struct Cli {
    /// Audit log location (default: <data dir>/flowguard/audit_log.jsonl)
    #[arg(long, global = true)]
    pub audit_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pipeline over replayed packet observations
    Run(RunArgs),
    /// Push the canonical synthetic windows through the engine
    Simulate(SimulateArgs),
    /// Show audit entries, newest first
    Audit(AuditArgs),
    /// Send a one-off prompt to the advisory service
    Advise(AdviseArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON Lines observations; `-` reads stdin
    #[arg(short, long, default_value = "-", env = "FLOWGUARD_INPUT")]
    pub input: String,

    /// Log blocks instead of applying them
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Policy JSON file (thresholds, auto-mitigate labels)
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// Aggregation window in seconds
    #[arg(long)]
    pub window: Option<f64>,

    /// Feature queue capacity
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Leave open windows unflushed on exit
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_flush_on_shutdown: bool,

    /// Run iptables directly instead of through sudo
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_sudo: bool,
}

impl RunArgs {
    /// CLI flags win over environment and defaults
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(path) = &self.policy {
            config.policy = PolicyConfig::from_file(path)?;
        }
        if let Some(window) = self.window {
            config.window_secs = window;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if self.no_flush_on_shutdown {
            config.flush_on_shutdown = false;
        }
        if self.no_sudo {
            config.use_sudo = false;
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Apply real iptables blocks instead of logging them
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub enforce: bool,

    /// Policy JSON file
    #[arg(long)]
    pub policy: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Maximum entries to print
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Print JSON instead of a table
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AdviseArgs {
    /// Prompt text
    pub prompt: String,
}
