use crate::foundation::BridgeError;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp_millis_env(env_var: Option<&str>) -> Result<u64, BridgeError> {
    if let Some(var) = env_var {
        if let Ok(value) = std::env::var(var) {
            return value.parse::<u64>().map_err(|err| BridgeError::Message(err.to_string()));
        }
    }
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|err| BridgeError::Message(err.to_string()))?;
    Ok(now.as_secs().saturating_mul(1_000).saturating_add(u64::from(now.subsec_millis())))
}

/// Returns the current wall-clock timestamp in milliseconds.
///
/// For test determinism, this respects `TEST_NOW_MS_ENV_VAR` when set.
pub fn now_millis() -> u64 {
    current_timestamp_millis_env(Some(crate::foundation::constants::TEST_NOW_MS_ENV_VAR))
        .or_else(|_| current_timestamp_millis_env(None))
        .unwrap_or(0)
}

/// True when `timestamp_ms` lies more than `window_ms` before `now_ms`.
pub fn is_older_than(timestamp_ms: u64, window_ms: u64, now_ms: u64) -> bool {
    timestamp_ms < now_ms.saturating_sub(window_ms)
}
