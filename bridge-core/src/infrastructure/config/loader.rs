//! Configuration loader using Figment for layered config management.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. Profile overrides from `[profiles.<name>]`
//! 4. Environment variables (BRIDGE_* prefix, `__` for nesting)

use crate::foundation::{BridgeError, Result};
use crate::infrastructure::config::types::BridgeConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::value::{Dict, Map};
use figment::{Figment, Profile};
use log::{debug, info};
use serde::Deserialize;
use std::path::Path;

/// Environment variable prefix for config overrides.
///
/// Example: `BRIDGE_CHAIN__CONFIDENCE_LEVEL` -> `chain.confidence_level`
const ENV_PREFIX: &str = "BRIDGE_";

const CONFIG_FILE_NAME: &str = "bridge-config.toml";

#[derive(Clone, Debug, Default, Deserialize)]
struct BridgeConfigRaw {
    #[serde(flatten)]
    config: BridgeConfig,
    #[serde(default)]
    profiles: Option<Map<String, Dict>>,
}

/// Load configuration from the default file in `data_dir`.
pub fn load_config(data_dir: &Path) -> Result<BridgeConfig> {
    load_config_from_file(&data_dir.join(CONFIG_FILE_NAME), data_dir, None)
}

/// Load configuration from the default file in `data_dir` with a profile.
pub fn load_config_with_profile(data_dir: &Path, profile: &str) -> Result<BridgeConfig> {
    load_config_from_file(&data_dir.join(CONFIG_FILE_NAME), data_dir, Some(profile))
}

/// Load configuration from a specific file path, optionally applying
/// `[profiles.<name>]` overrides.
pub fn load_config_from_file(path: &Path, data_dir: &Path, profile: Option<&str>) -> Result<BridgeConfig> {
    info!(
        "loading configuration path={} data_dir={} profile={}",
        path.display(),
        data_dir.display(),
        profile.unwrap_or("-")
    );

    let mut figment = figment_base(path);
    if let Some(profile) = profile {
        // Extract once to access `profiles.<name>` overrides from the file.
        let base: BridgeConfigRaw =
            figment_base(path).extract().map_err(|e| BridgeError::ConfigError(format!("config extraction failed: {e}")))?;
        let overrides = profile_overrides(&base, profile)?;
        figment = figment.merge(Serialized::from(overrides, Profile::Default));
    }
    let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let raw: BridgeConfigRaw =
        figment.extract().map_err(|e| BridgeError::ConfigError(format!("config extraction failed: {e}")))?;
    let mut config = raw.config;
    postprocess(&mut config, data_dir);

    debug!(
        "configuration loaded notary_id={} network={} confidence_level={} finalize_policy={}",
        config.service.notary_id, config.chain.network, config.chain.confidence_level, config.keygen.finalize_policy
    );
    Ok(config)
}

fn figment_base(path: &Path) -> Figment {
    Figment::from(Serialized::from(BridgeConfigRaw::default(), Profile::Default)).merge(Toml::file(path))
}

fn profile_overrides(base: &BridgeConfigRaw, profile: &str) -> Result<Dict> {
    let profiles = base
        .profiles
        .as_ref()
        .ok_or_else(|| BridgeError::ConfigError(format!("profile '{profile}' requested but no [profiles] section exists")))?;
    profiles
        .get(profile)
        .cloned()
        .ok_or_else(|| BridgeError::ConfigError(format!("profile '{profile}' not found in [profiles]")))
}

fn postprocess(config: &mut BridgeConfig, data_dir: &Path) {
    if config.service.data_dir.trim().is_empty() {
        config.service.data_dir = data_dir.display().to_string();
    }
    if config.service.wallet_file.is_none() {
        config.service.wallet_file = Some(format!("{}/wallet.json", config.service.data_dir.trim_end_matches('/')));
    }
}

impl serde::Serialize for BridgeConfigRaw {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // Profiles never round-trip back into the figment; only the config does.
        self.config.serialize(serializer)
    }
}
