//! Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(version, about = "Run and supervise a game server on a pseudo-terminal")]
pub struct Cli {
    /// Settings file (defaults to <config dir>/kiln/kiln.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level used when KILN_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Launch a process and relay its terminal until it exits
    Run(RunArgs),
    /// Print the effective settings as TOML
    Settings,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Environment root directory; created if missing
    #[arg(short, long)]
    pub root: PathBuf,

    /// Working directory relative to the root
    #[arg(short, long, default_value = "")]
    pub workdir: String,

    /// Extra environment variable for the process (KEY=VALUE, repeatable)
    #[arg(short = 'e', long = "env", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Seconds to wait after SIGTERM before killing on Ctrl-C
    #[arg(long, default_value_t = 30)]
    pub grace_secs: u64,

    /// Log a stats snapshot every N seconds
    #[arg(long)]
    pub stats_secs: Option<u64>,

    /// Program and arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Parse `KEY=VALUE`; the value may itself contain `=`
pub fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
