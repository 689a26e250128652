use std::{collections::HashMap, fs, time::Duration};

use anyhow::{anyhow, Context};
use client_core::GatewayConfig;
use shared::domain::Address;
use url::Url;

const SETTINGS_FILE: &str = "voting.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc_url: String,
    pub contract_address: Option<String>,
    pub from_block: u64,
    pub request_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    pub confirmation_timeout_secs: u64,
    pub tally_batch_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".into(),
            contract_address: None,
            from_block: 0,
            request_timeout_secs: 15,
            receipt_poll_interval_ms: 1000,
            confirmation_timeout_secs: 120,
            tally_batch_size: 100,
        }
    }
}

impl Settings {
    pub fn gateway_config(&self) -> anyhow::Result<GatewayConfig> {
        let rpc_url = Url::parse(&self.rpc_url)
            .with_context(|| format!("invalid rpc url '{}'", self.rpc_url))?;
        let raw_address = self.contract_address.as_deref().ok_or_else(|| {
            anyhow!(
                "contract address is not configured; \
                 set VOTING_CONTRACT_ADDRESS or contract_address in {SETTINGS_FILE}"
            )
        })?;
        let contract_address: Address = raw_address
            .trim()
            .parse()
            .with_context(|| format!("invalid contract address '{raw_address}'"))?;

        Ok(GatewayConfig {
            rpc_url,
            contract_address,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            receipt_poll_interval: Duration::from_millis(self.receipt_poll_interval_ms),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
        })
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the settings file, then environment overrides. Values
/// that fail to parse are ignored.
pub fn load_settings_from(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) {
            let text = |key: &str| file_cfg.get(key).map(value_text);
            if let Some(v) = text("rpc_url") {
                settings.rpc_url = v;
            }
            if let Some(v) = text("contract_address") {
                settings.contract_address = Some(v);
            }
            apply_number(&mut settings.from_block, text("from_block"));
            apply_number(&mut settings.request_timeout_secs, text("request_timeout_secs"));
            apply_number(
                &mut settings.receipt_poll_interval_ms,
                text("receipt_poll_interval_ms"),
            );
            apply_number(
                &mut settings.confirmation_timeout_secs,
                text("confirmation_timeout_secs"),
            );
            apply_number(&mut settings.tally_batch_size, text("tally_batch_size"));
        }
    }

    if let Some(v) = env("VOTING_RPC_URL") {
        settings.rpc_url = v;
    }
    if let Some(v) = env("APP__RPC_URL") {
        settings.rpc_url = v;
    }

    if let Some(v) = env("VOTING_CONTRACT_ADDRESS") {
        settings.contract_address = Some(v);
    }
    if let Some(v) = env("APP__CONTRACT_ADDRESS") {
        settings.contract_address = Some(v);
    }

    apply_number(&mut settings.from_block, env("APP__FROM_BLOCK"));
    apply_number(
        &mut settings.request_timeout_secs,
        env("APP__REQUEST_TIMEOUT_SECS"),
    );
    apply_number(
        &mut settings.receipt_poll_interval_ms,
        env("APP__RECEIPT_POLL_INTERVAL_MS"),
    );
    apply_number(
        &mut settings.confirmation_timeout_secs,
        env("APP__CONFIRMATION_TIMEOUT_SECS"),
    );
    apply_number(&mut settings.tally_batch_size, env("APP__TALLY_BATCH_SIZE"));

    settings
}

fn value_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply_number(target: &mut u64, raw: Option<String>) {
    if let Some(parsed) = raw.and_then(|v| v.trim().parse::<u64>().ok()) {
        *target = parsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        assert_eq!(load_settings_from(None, env_from(&[])), Settings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let file = r#"
            rpc_url = "http://node.local:8545"
            contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            from_block = 1200
            tally_batch_size = "25"
        "#;

        let settings = load_settings_from(Some(file), env_from(&[]));

        assert_eq!(settings.rpc_url, "http://node.local:8545");
        assert_eq!(
            settings.contract_address.as_deref(),
            Some("0x5FbDB2315678afecb367f032d93F642f64180aa3")
        );
        assert_eq!(settings.from_block, 1200);
        assert_eq!(settings.tally_batch_size, 25);
        assert_eq!(settings.request_timeout_secs, 15);
    }

    #[test]
    fn env_overrides_file_and_app_prefix_wins() {
        let file = r#"rpc_url = "http://from-file:8545""#;
        let settings = load_settings_from(
            Some(file),
            env_from(&[
                ("VOTING_RPC_URL", "http://voting-env:8545"),
                ("APP__RPC_URL", "http://app-env:8545"),
                ("APP__CONFIRMATION_TIMEOUT_SECS", "30"),
                ("APP__FROM_BLOCK", "not-a-number"),
            ]),
        );

        assert_eq!(settings.rpc_url, "http://app-env:8545");
        assert_eq!(settings.confirmation_timeout_secs, 30);
        assert_eq!(settings.from_block, 0);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let settings = load_settings_from(Some("rpc_url = "), env_from(&[]));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn gateway_config_requires_contract_address() {
        let err = Settings::default().gateway_config().expect_err("must fail");
        assert!(err.to_string().contains("contract address"), "{err}");
    }

    #[test]
    fn gateway_config_rejects_bad_values() {
        let settings = Settings {
            rpc_url: "not a url".into(),
            contract_address: Some("0x5FbDB2315678afecb367f032d93F642f64180aa3".into()),
            ..Settings::default()
        };
        assert!(settings.gateway_config().is_err());

        let settings = Settings {
            contract_address: Some("0x1234".into()),
            ..Settings::default()
        };
        assert!(settings.gateway_config().is_err());
    }

    #[test]
    fn gateway_config_converts_units() {
        let settings = Settings {
            contract_address: Some("0x5fbdb2315678afecb367f032d93f642f64180aa3".into()),
            receipt_poll_interval_ms: 250,
            ..Settings::default()
        };

        let config = settings.gateway_config().expect("config");

        assert_eq!(config.rpc_url.as_str(), "http://127.0.0.1:8545/");
        assert_eq!(
            config.contract_address,
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
                .parse::<Address>()
                .expect("address")
        );
        assert_eq!(config.receipt_poll_interval, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }
}
