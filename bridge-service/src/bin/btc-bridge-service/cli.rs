use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "btc-bridge-service")]
#[command(about = "Multi-notary Bitcoin custody bridge service", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override data directory
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Apply `[profiles.<name>]` overrides from the config file
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Run with the in-process ledger, mock chain node and a seeded genesis
    #[arg(long)]
    pub devnet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
