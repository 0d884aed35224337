#[path = "btc-bridge-service/cli.rs"]
mod cli;
#[path = "btc-bridge-service/devnet.rs"]
mod devnet;
#[path = "btc-bridge-service/setup.rs"]
mod setup;

use crate::cli::Cli;
use log::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse_args();
    setup::init_logging(&args.log_level)?;
    info!("btc-bridge-service starting log_level={}", args.log_level);

    let config = setup::load_config(&args)?;
    info!(
        "config loaded notary_id={} network={} confidence_level={} api_enabled={}",
        config.service.notary_id, config.chain.network, config.chain.confidence_level, config.api.enabled
    );

    if args.devnet {
        return devnet::run(config).await.map_err(Into::into);
    }

    warn!("no production ledger adapter is wired in this build; run with --devnet for the in-process stack");
    Ok(())
}
