//! Configuration loading tests
//!
//! Tests cover:
//! - Loading from a TOML file on disk
//! - Defaults for optional sections
//! - Environment overrides for RPC endpoints
//! - Validation failures

use multichain_market_sdk::settings::CosmosFailurePolicy;
use multichain_market_sdk::types::PoolKind;
use multichain_market_sdk::Settings;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
[networks.ethereum]
chain_id = 1
primary_rpc_url = "https://eth.primary.example"
backup_rpc_url = "https://eth.backup.example"
pool_address = "0x0000000000000000000000000000000000000a01"
token_address = "0x0000000000000000000000000000000000000b01"
native_token_address = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"

[networks.optimism]
chain_id = 10
primary_rpc_url = "https://op.primary.example"
backup_rpc_url = "https://op.backup.example"
pool_address = "0x0000000000000000000000000000000000000a02"
pool_kind = "concentrated"
token_address = "0x0000000000000000000000000000000000000b02"
native_token_address = "0x4200000000000000000000000000000000000006"

[networks.base]
chain_id = 8453
primary_rpc_url = "https://base.primary.example"
backup_rpc_url = "https://base.backup.example"
pool_address = "0x0000000000000000000000000000000000000a03"
token_address = "0x0000000000000000000000000000000000000b03"
native_token_address = "0x4200000000000000000000000000000000000006"

[osmosis]
lcd_base_url = "https://lcd.osmosis.example"
analytics_api_url = "https://analytics.osmosis.example"
pool_id = 1
denom = "ibc/TOKEN"

[[osmosis.denoms]]
denom = "ibc/TOKEN"
symbol = "TKN"
decimals = 18

[supply]
circulating = 500000000
total = 1000000000
"#;

fn write_config(raw: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(raw.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file_with_defaults() {
    let file = write_config(CONFIG);
    let settings = Settings::from_path(file.path()).unwrap();

    assert_eq!(settings.networks.ethereum.chain_id, 1);
    assert_eq!(settings.networks.optimism.pool_kind, PoolKind::Concentrated);
    assert_eq!(settings.osmosis.denoms.len(), 1);
    assert_eq!(settings.osmosis.denoms[0].decimals, 18);
    assert_eq!(settings.supply.total, 1_000_000_000.0);

    assert_eq!(settings.tvl_ttl(), Duration::from_secs(300));
    assert_eq!(settings.pool_reading_ttl(), Duration::from_secs(2));
    assert_eq!(settings.probe_timeout(), Duration::from_secs(5));
    assert_eq!(settings.request_timeout(), Duration::from_secs(10));
    assert_eq!(settings.rpc.qps_limit, 10);
    assert_eq!(settings.price_feeds.native_asset_id, "ethereum");
    assert_eq!(settings.price_feeds.cache_ttl_seconds, 10);
    assert_eq!(settings.tvl.cosmos_failure_policy, CosmosFailurePolicy::Propagate);
}

#[test]
fn test_explicit_sections_override_defaults() {
    let raw = format!(
        "{}\n[cache]\ntvl_ttl_ms = 60000\npool_reading_ttl_ms = 0\n\n[retry]\nmax_retries = 5\ninitial_delay_ms = 250\nbackoff_factor = 3\n\n[tvl]\ncosmos_failure_policy = \"degrade\"\n",
        CONFIG
    );
    let settings = Settings::from_toml_str(&raw).unwrap();

    assert_eq!(settings.tvl_ttl(), Duration::from_secs(60));
    assert_eq!(settings.pool_reading_ttl(), Duration::ZERO);
    assert_eq!(settings.retry.max_retries, 5);
    assert_eq!(settings.retry.initial_delay_ms, 250);
    assert_eq!(settings.retry.backoff_factor, 3);
    assert_eq!(settings.tvl.cosmos_failure_policy, CosmosFailurePolicy::Degrade);
}

#[test]
fn test_env_overrides_rpc_url() {
    std::env::set_var("SDK_BASE_BACKUP_RPC_URL", "https://base.env.example");
    let settings = Settings::from_toml_str(CONFIG);
    std::env::remove_var("SDK_BASE_BACKUP_RPC_URL");

    let settings = settings.unwrap();
    assert_eq!(settings.networks.base.backup_rpc_url, "https://base.env.example");
    assert_eq!(settings.networks.ethereum.backup_rpc_url, "https://eth.backup.example");
}

#[test]
fn test_missing_file_is_error() {
    assert!(Settings::from_path("/definitely/not/here/Config.toml").is_err());
}

#[test]
fn test_missing_required_section_is_error() {
    let raw = CONFIG.replace("[supply]\ncirculating = 500000000\ntotal = 1000000000\n", "");
    assert!(Settings::from_toml_str(&raw).is_err());
}

#[test]
fn test_invalid_values_rejected() {
    let bad_url = CONFIG.replace("https://op.backup.example", "op-backup");
    let err = Settings::from_toml_str(&bad_url).unwrap_err();
    assert!(err.to_string().contains("networks.optimism.backup_rpc_url"));

    let zero_qps = format!("{}\n[rpc]\nqps_limit = 0\n", CONFIG);
    assert!(Settings::from_toml_str(&zero_qps).is_err());

    let bad_policy = format!("{}\n[tvl]\ncosmos_failure_policy = \"ignore\"\n", CONFIG);
    assert!(Settings::from_toml_str(&bad_policy).is_err());
}
