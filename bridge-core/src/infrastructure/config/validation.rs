use crate::infrastructure::config::types::{BridgeConfig, FinalizePolicy};

impl BridgeConfig {
    /// Collects every human-readable configuration problem. The binary logs
    /// these as warnings at startup rather than refusing to boot.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.service.notary_id.trim().is_empty() {
            errors.push("service.notary_id must be set".to_string());
        }
        if self.service.account.trim().is_empty() {
            errors.push("service.account must be set".to_string());
        }

        if self.network().is_err() {
            errors.push(format!("chain.network '{}' is not a known network", self.chain.network));
        }
        if self.chain.confidence_level == 0 {
            errors.push("chain.confidence_level must be > 0".to_string());
        }
        if self.chain.processed_block_capacity == 0 {
            errors.push("chain.processed_block_capacity must be > 0".to_string());
        }

        for (field, value) in [
            ("ledger.trigger_account", &self.ledger.trigger_account),
            ("ledger.peers_account", &self.ledger.peers_account),
            ("ledger.withdrawal_account", &self.ledger.withdrawal_account),
            ("ledger.reserve_account", &self.ledger.reserve_account),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{field} must be set"));
            }
        }
        if self.ledger.asset.trim().is_empty() {
            errors.push("ledger.asset must be set".to_string());
        }
        if self.ledger.quorum_retry_attempts == 0 {
            errors.push("ledger.quorum_retry_attempts must be > 0".to_string());
        }

        if self.keygen.finalize_policy == FinalizePolicy::AnyPresent && self.keygen.session_finalize_timeout_secs.is_some() {
            errors.push("keygen.session_finalize_timeout_secs has no effect with finalize_policy=any_present".to_string());
        }
        if self.keygen.sweep_interval_secs == 0 {
            errors.push("keygen.sweep_interval_secs must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
