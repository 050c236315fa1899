use crate::channel::NodeId;
use crate::manager::ManagerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub guardrails: GuardrailsConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub important_nodes: Vec<ImportantNode>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Asset ticker used in metric labels
    #[serde(default = "default_asset")]
    pub asset: String,
    /// Public key of our own node
    pub node_id: String,
    /// Display name used instead of our node id
    pub node_name: String,
    /// Availability check interval in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Daily report interval in seconds
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

/// USD ceilings. All required: running without explicit guardrails is a
/// configuration error.
#[derive(Debug, Deserialize)]
pub struct GuardrailsConfig {
    pub min_channel_size_usd: f64,
    pub max_channel_size_usd: f64,
    pub max_close_spending_per_day_usd: f64,
    pub max_open_spending_per_day_usd: f64,
    pub max_commit_fee_usd: f64,
    pub max_limbo_usd: f64,
    pub max_stuck_balance_usd: f64,
}

#[derive(Debug, Deserialize)]
pub struct OracleConfig {
    /// Bitcoin price ticker endpoint
    #[serde(default = "default_ticker_url")]
    pub ticker_url: String,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Path of the append-only update log
    pub update_log_file: PathBuf,
}

/// A counterparty the manager always keeps funded channels with.
#[derive(Debug, Deserialize)]
pub struct ImportantNode {
    pub name: String,
    pub node_id: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_asset() -> String {
    "BTC".to_string()
}
fn default_check_interval() -> u64 {
    25
}
fn default_report_interval() -> u64 {
    86_400
}
fn default_ticker_url() -> String {
    crate::price::DEFAULT_TICKER_URL.to_string()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            ticker_url: default_ticker_url(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.general.node_id.is_empty() {
            anyhow::bail!("node_id must be set");
        }
        if self.general.node_name.is_empty() {
            anyhow::bail!("node_name must be set");
        }
        if self.general.check_interval_secs == 0 {
            anyhow::bail!("check_interval_secs must be non-zero");
        }
        if self.general.report_interval_secs == 0 {
            anyhow::bail!("report_interval_secs must be non-zero");
        }

        let g = &self.guardrails;
        for (name, value) in [
            ("min_channel_size_usd", g.min_channel_size_usd),
            ("max_channel_size_usd", g.max_channel_size_usd),
            ("max_close_spending_per_day_usd", g.max_close_spending_per_day_usd),
            ("max_open_spending_per_day_usd", g.max_open_spending_per_day_usd),
            ("max_commit_fee_usd", g.max_commit_fee_usd),
            ("max_limbo_usd", g.max_limbo_usd),
            ("max_stuck_balance_usd", g.max_stuck_balance_usd),
        ] {
            if value <= 0.0 {
                anyhow::bail!("{name} must be positive");
            }
        }
        if g.min_channel_size_usd > g.max_channel_size_usd {
            anyhow::bail!("min_channel_size_usd > max_channel_size_usd");
        }

        if self.log.update_log_file.as_os_str().is_empty() {
            anyhow::bail!("update_log_file must be set");
        }

        for node in &self.important_nodes {
            if node.name.is_empty() || node.node_id.is_empty() {
                anyhow::bail!("important node entries need both name and node_id");
            }
        }
        Ok(())
    }

    /// Controller configuration derived from this file.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            asset: self.general.asset.clone(),
            our_node_id: NodeId(self.general.node_id.clone()),
            our_name: self.general.node_name.clone(),
            min_channel_size_usd: self.guardrails.min_channel_size_usd,
            max_channel_size_usd: self.guardrails.max_channel_size_usd,
            max_close_spending_per_day_usd: self.guardrails.max_close_spending_per_day_usd,
            max_open_spending_per_day_usd: self.guardrails.max_open_spending_per_day_usd,
            max_commit_fee_usd: self.guardrails.max_commit_fee_usd,
            max_limbo_usd: self.guardrails.max_limbo_usd,
            max_stuck_balance_usd: self.guardrails.max_stuck_balance_usd,
            check_interval: Duration::from_secs(self.general.check_interval_secs),
            report_interval: Duration::from_secs(self.general.report_interval_secs),
        }
    }

    /// Create a config with sensible values for testing purposes.
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            general: GeneralConfig {
                log_level: default_log_level(),
                asset: default_asset(),
                node_id: "our_node".to_string(),
                node_name: "Hub".to_string(),
                check_interval_secs: default_check_interval(),
                report_interval_secs: default_report_interval(),
            },
            guardrails: GuardrailsConfig {
                min_channel_size_usd: 50.0,
                max_channel_size_usd: 400.0,
                max_close_spending_per_day_usd: 1.0,
                max_open_spending_per_day_usd: 1.0,
                max_commit_fee_usd: 10.0,
                max_limbo_usd: 300.0,
                max_stuck_balance_usd: 300.0,
            },
            oracle: OracleConfig::default(),
            log: LogConfig {
                update_log_file: PathBuf::from("updates.log"),
            },
            important_nodes: Vec::new(),
        }
    }
}
