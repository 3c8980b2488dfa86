use crate::types::chain_data::PoolKind;
use crate::types::network::NetworkId;
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct EvmNetwork {
    pub chain_id: u64,
    pub primary_rpc_url: String,
    pub backup_rpc_url: String,
    /// Pool holding the token against the native asset
    pub pool_address: String,
    #[serde(default = "default_pool_kind")]
    pub pool_kind: PoolKind,
    pub token_address: String,
    /// Wrapped native asset paired in the pool (WETH)
    pub native_token_address: String,
}

fn default_pool_kind() -> PoolKind {
    PoolKind::ConstantProduct
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvmNetworks {
    pub ethereum: EvmNetwork,
    pub optimism: EvmNetwork,
    pub base: EvmNetwork,
}

impl EvmNetworks {
    pub fn get(&self, network: NetworkId) -> Option<&EvmNetwork> {
        match network {
            NetworkId::Ethereum => Some(&self.ethereum),
            NetworkId::Optimism => Some(&self.optimism),
            NetworkId::Base => Some(&self.base),
            NetworkId::Osmosis => None,
        }
    }

    fn get_mut(&mut self, network: NetworkId) -> Option<&mut EvmNetwork> {
        match network {
            NetworkId::Ethereum => Some(&mut self.ethereum),
            NetworkId::Optimism => Some(&mut self.optimism),
            NetworkId::Base => Some(&mut self.base),
            NetworkId::Osmosis => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DenomEntry {
    pub denom: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Osmosis {
    pub lcd_base_url: String,
    pub analytics_api_url: String,
    pub pool_id: u64,
    /// Denom of the tracked token on Osmosis (usually an `ibc/...` hash)
    pub denom: String,
    #[serde(default = "default_native_denom")]
    pub native_denom: String,
    #[serde(default)]
    pub denoms: Vec<DenomEntry>,
}

fn default_native_denom() -> String {
    "uosmo".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Cache {
    #[serde(default = "default_tvl_ttl_ms")]
    pub tvl_ttl_ms: u64,
    /// How long one EVM pool read is shared between the TVL and price lookups
    #[serde(default = "default_pool_reading_ttl_ms")]
    pub pool_reading_ttl_ms: u64,
}

fn default_tvl_ttl_ms() -> u64 {
    300_000 // 5 minutos
}

fn default_pool_reading_ttl_ms() -> u64 {
    2_000
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            tvl_ttl_ms: default_tvl_ttl_ms(),
            pool_reading_ttl_ms: default_pool_reading_ttl_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Retry {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_backoff_factor() -> u32 {
    2
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Upper bound for a whole snapshot computation (0 = no deadline)
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_request_deadline_ms() -> u64 {
    30_000
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            request_deadline_ms: default_request_deadline_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_qps_limit")]
    pub qps_limit: u32,
}

fn default_qps_limit() -> u32 {
    10
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            qps_limit: default_qps_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceFeeds {
    #[serde(default = "default_coingecko_base_url")]
    pub coingecko_base_url: String,
    #[serde(default = "default_native_asset_id")]
    pub native_asset_id: String,
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
    #[serde(default = "default_price_feed_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

fn default_coingecko_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_native_asset_id() -> String {
    "ethereum".to_string()
}
fn default_vs_currency() -> String {
    "usd".to_string()
}
fn default_price_feed_cache_ttl_seconds() -> u64 {
    10
}

impl Default for PriceFeeds {
    fn default() -> Self {
        Self {
            coingecko_base_url: default_coingecko_base_url(),
            native_asset_id: default_native_asset_id(),
            vs_currency: default_vs_currency(),
            cache_ttl_seconds: default_price_feed_cache_ttl_seconds(),
        }
    }
}

/// What to do when an Osmosis TVL or spot price lookup fails.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CosmosFailurePolicy {
    /// Abort the whole refresh and keep the previous cache
    #[default]
    Propagate,
    /// Treat Osmosis like the EVM networks: degrade to 0
    Degrade,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Tvl {
    #[serde(default)]
    pub cosmos_failure_policy: CosmosFailurePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Supply {
    pub circulating: f64,
    pub total: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub networks: EvmNetworks,
    pub osmosis: Osmosis,
    pub supply: Supply,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub price_feeds: PriceFeeds,
    #[serde(default)]
    pub tvl: Tvl,
}

impl Settings {
    /// Loads `Config.toml` from the working directory.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_path("Config.toml")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Toml))
            .build()?;
        Self::finish(s)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        Self::finish(s)
    }

    fn finish(s: Config) -> Result<Self, ConfigError> {
        let mut settings: Self = s.try_deserialize()?;
        apply_env_overrides(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    pub fn tvl_ttl(&self) -> Duration {
        Duration::from_millis(self.cache.tvl_ttl_ms)
    }

    pub fn pool_reading_ttl(&self) -> Duration {
        Duration::from_millis(self.cache.pool_reading_ttl_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_timeout_ms)
    }

    pub fn request_deadline(&self) -> Option<Duration> {
        match self.timeouts.request_deadline_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for network in NetworkId::EVM {
            if let Some(cfg) = self.networks.get(network) {
                check_url(&format!("networks.{}.primary_rpc_url", network), &cfg.primary_rpc_url)?;
                check_url(&format!("networks.{}.backup_rpc_url", network), &cfg.backup_rpc_url)?;
            }
        }
        check_url("osmosis.lcd_base_url", &self.osmosis.lcd_base_url)?;
        check_url("osmosis.analytics_api_url", &self.osmosis.analytics_api_url)?;
        check_url("price_feeds.coingecko_base_url", &self.price_feeds.coingecko_base_url)?;

        if !(self.supply.circulating >= 0.0 && self.supply.total >= 0.0) {
            return Err(ConfigError::Message(
                "supply.circulating and supply.total must be non-negative".to_string(),
            ));
        }
        if self.supply.circulating > self.supply.total {
            return Err(ConfigError::Message(format!(
                "supply.circulating ({}) exceeds supply.total ({})",
                self.supply.circulating, self.supply.total
            )));
        }
        if self.rpc.qps_limit == 0 {
            return Err(ConfigError::Message("rpc.qps_limit must be non-zero".to_string()));
        }
        if self.retry.backoff_factor == 0 {
            return Err(ConfigError::Message("retry.backoff_factor must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn check_url(key: &str, raw: &str) -> Result<(), ConfigError> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|e| ConfigError::Message(format!("{} is not a valid URL ({}): {}", key, raw, e)))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Environment variable overrides for endpoints (same convention as `.env` files)
fn apply_env_overrides(settings: &mut Settings) {
    for network in NetworkId::EVM {
        let prefix = network.env_prefix();
        if let Some(cfg) = settings.networks.get_mut(network) {
            if let Some(url) = non_empty_env(&format!("{}_PRIMARY_RPC_URL", prefix)) {
                cfg.primary_rpc_url = url;
            }
            if let Some(url) = non_empty_env(&format!("{}_BACKUP_RPC_URL", prefix)) {
                cfg.backup_rpc_url = url;
            }
        }
    }
    if let Some(url) = non_empty_env("SDK_OSMOSIS_LCD_URL") {
        settings.osmosis.lcd_base_url = url;
    }
    if let Some(url) = non_empty_env("SDK_OSMOSIS_ANALYTICS_URL") {
        settings.osmosis.analytics_api_url = url;
    }
    if let Some(raw) = non_empty_env("SDK_CACHE_TVL_TTL_MS") {
        match raw.parse::<u64>() {
            Ok(ms) => settings.cache.tvl_ttl_ms = ms,
            Err(e) => log::warn!("Ignoring SDK_CACHE_TVL_TTL_MS={}: {}", raw, e),
        }
    }
}
