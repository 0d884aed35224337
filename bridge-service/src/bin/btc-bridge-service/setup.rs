use crate::cli::Cli;
use bridge_core::foundation::{BridgeError, Result};
use bridge_core::infrastructure::audit::{init_audit_logger, StructuredAuditLogger};
use bridge_core::infrastructure::config::{self, BridgeConfig};
use log::warn;
use std::path::PathBuf;

pub fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .map_err(|err| BridgeError::Message(err.to_string()))?;
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
    init_audit_logger(Box::new(StructuredAuditLogger));
    Ok(())
}

pub fn load_config(args: &Cli) -> Result<BridgeConfig> {
    let data_dir = args.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let config = match (&args.config, &args.profile) {
        (Some(path), profile) => config::load_config_from_file(path, &data_dir, profile.as_deref())?,
        (None, Some(profile)) => config::load_config_with_profile(&data_dir, profile)?,
        (None, None) => config::load_config(&data_dir)?,
    };
    if let Err(problems) = config.validate() {
        for problem in problems {
            warn!("config validation error: {}", problem);
        }
    }
    Ok(config)
}
