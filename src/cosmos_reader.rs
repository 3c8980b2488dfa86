// src/cosmos_reader.rs

use crate::chain_reader::ChainReader;
use crate::error::MarketError;
use crate::metrics;
use crate::settings::{DenomEntry, Osmosis};
use crate::types::chain_data::{Amount, CosmosPoolAsset, PoolState, TokenMetadata};
use crate::types::conversions::parse_integer_amount;
use crate::types::network::NetworkId;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Decimals assumed for a denom nobody told us about (Cosmos convention).
pub const DEFAULT_DENOM_DECIMALS: u8 = 6;
/// Symbol shown for a denom without registry entry.
pub const UNKNOWN_DENOM_SYMBOL: &str = "IBC";

/// denom -> (symbol, decimals). Seeded with the chain's native asset and
/// extended from configuration.
#[derive(Debug, Default)]
pub struct DenomRegistry {
    entries: DashMap<String, (String, u8)>,
}

impl DenomRegistry {
    pub fn with_builtins() -> Self {
        let registry = Self::default();
        registry.register("uosmo", "OSMO", 6);
        registry.register("uion", "ION", 6);
        registry
    }

    pub fn register(&self, denom: &str, symbol: &str, decimals: u8) {
        self.entries.insert(denom.to_string(), (symbol.to_string(), decimals));
    }

    pub fn extend<'a>(&self, entries: impl IntoIterator<Item = &'a DenomEntry>) {
        for entry in entries {
            self.register(&entry.denom, &entry.symbol, entry.decimals);
        }
    }

    /// Never fails: unknown denoms resolve to the 6-decimal placeholder.
    pub fn resolve(&self, denom: &str) -> (String, u8) {
        if let Some(entry) = self.entries.get(denom) {
            return entry.value().clone();
        }
        warn!(
            "⚠️ Unknown denom {}, assuming {} decimals and symbol {}",
            denom, DEFAULT_DENOM_DECIMALS, UNKNOWN_DENOM_SYMBOL
        );
        (UNKNOWN_DENOM_SYMBOL.to_string(), DEFAULT_DENOM_DECIMALS)
    }
}

/// Per-asset row of the analytics pool endpoint. USD figures.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PoolAssetStat {
    pub denom: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub amount: f64,
    /// Whole-pool liquidity in USD (repeated on every row)
    #[serde(default)]
    pub liquidity: f64,
    #[serde(default)]
    pub price: f64,
}

#[derive(Debug, Deserialize)]
struct Coin {
    denom: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Coin,
}

#[derive(Debug, Deserialize)]
struct SupplyResponse {
    amount: Coin,
}

#[derive(Debug, Deserialize)]
struct PoolResponse {
    pool: RawPool,
}

#[derive(Debug, Deserialize)]
struct WeightedAsset {
    token: Coin,
}

// Weighted (pool_assets), stableswap (pool_liquidity) and concentrated pools
// share the endpoint; only the relevant fields are present.
#[derive(Debug, Deserialize)]
struct RawPool {
    #[serde(default)]
    pool_assets: Vec<WeightedAsset>,
    #[serde(default)]
    pool_liquidity: Vec<Coin>,
    #[serde(default)]
    token0: Option<String>,
    #[serde(default)]
    token1: Option<String>,
    #[serde(default)]
    current_tick: Option<String>,
    #[serde(default)]
    current_tick_liquidity: Option<String>,
}

/// `ChainReader` over a Cosmos LCD REST gateway plus a pool analytics API.
///
/// Stateless apart from the denom registry: every call is one HTTP GET.
pub struct CosmosReader {
    network: NetworkId,
    lcd_base_url: String,
    analytics_api_url: String,
    native_denom: String,
    client: reqwest::Client,
    registry: DenomRegistry,
}

impl CosmosReader {
    pub fn new(
        lcd_base_url: &str,
        analytics_api_url: &str,
        native_denom: &str,
        request_timeout: Duration,
    ) -> Result<Self, MarketError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MarketError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            network: NetworkId::Osmosis,
            lcd_base_url: lcd_base_url.trim_end_matches('/').to_string(),
            analytics_api_url: analytics_api_url.trim_end_matches('/').to_string(),
            native_denom: native_denom.to_string(),
            client,
            registry: DenomRegistry::with_builtins(),
        })
    }

    pub fn from_settings(osmosis: &Osmosis, request_timeout: Duration) -> Result<Self, MarketError> {
        let reader = Self::new(
            &osmosis.lcd_base_url,
            &osmosis.analytics_api_url,
            &osmosis.native_denom,
            request_timeout,
        )?;
        reader.registry.extend(&osmosis.denoms);
        Ok(reader)
    }

    pub fn registry(&self) -> &DenomRegistry {
        &self.registry
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        method: &'static str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, MarketError> {
        let start = Instant::now();
        let response = self.client.get(url).query(query).send().await;
        metrics::increment_rpc_call(self.network.as_str(), method);
        metrics::record_rpc_call_latency(self.network.as_str(), method, start.elapsed());

        let response = response.map_err(|e| MarketError::Transport {
            url: url.to_string(),
            detail: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("[osmosis] {} -> HTTP {}", url, status.as_u16());
            return Err(MarketError::Api {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| MarketError::Transport {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        serde_json::from_slice(&body).map_err(|e| MarketError::data_shape(url, e))
    }

    fn parse_coin(&self, context: &str, coin: &Coin, decimals: u8) -> Result<Amount, MarketError> {
        let raw = parse_integer_amount(&coin.amount)
            .map_err(|e| MarketError::data_shape(context, format!("{}: {}", coin.denom, e)))?;
        Ok(Amount::new(raw, decimals))
    }

    async fn denom_balance(&self, address: &str, denom: &str) -> Result<Amount, MarketError> {
        if address.trim().is_empty() || denom.trim().is_empty() {
            return Err(MarketError::InvalidInput("empty address or denom".to_string()));
        }
        let url = format!("{}/cosmos/bank/v1beta1/balances/{}/by_denom", self.lcd_base_url, address);
        let response: BalanceResponse = self.get_json("bank_balance", &url, &[("denom", denom)]).await?;
        let (_, decimals) = self.registry.resolve(denom);
        self.parse_coin(&url, &response.balance, decimals)
    }

    /// Per-asset liquidity and price (USD) from the analytics API.
    pub async fn pool_stats(&self, pool_id: u64) -> Result<Vec<PoolAssetStat>, MarketError> {
        let url = format!("{}/pools/v2/{}", self.analytics_api_url, pool_id);
        let stats: Vec<PoolAssetStat> = self.get_json("pool_stats", &url, &[]).await?;
        if stats.is_empty() {
            return Err(MarketError::data_shape(url, "empty pool stats"));
        }
        debug!("[osmosis] pool {} stats: {} assets", pool_id, stats.len());
        Ok(stats)
    }
}

fn parse_pool_id(pool: &str) -> Result<u64, MarketError> {
    pool.trim()
        .parse::<u64>()
        .map_err(|e| MarketError::InvalidInput(format!("pool id {:?}: {}", pool, e)))
}

#[async_trait]
impl ChainReader for CosmosReader {
    fn network(&self) -> NetworkId {
        self.network
    }

    async fn get_balance(&self, address: &str) -> Result<Amount, MarketError> {
        self.denom_balance(address, &self.native_denom).await
    }

    async fn get_token_balance(&self, token: &str, owner: &str) -> Result<Amount, MarketError> {
        self.denom_balance(owner, token).await
    }

    async fn get_token_metadata(&self, token: &str) -> Result<TokenMetadata, MarketError> {
        if token.trim().is_empty() {
            return Err(MarketError::InvalidInput("empty denom".to_string()));
        }
        let (symbol, decimals) = self.registry.resolve(token);
        let url = format!("{}/cosmos/bank/v1beta1/supply/by_denom", self.lcd_base_url);
        let response: SupplyResponse = self.get_json("bank_supply", &url, &[("denom", token)]).await?;

        Ok(TokenMetadata {
            decimals,
            symbol,
            total_supply: self.parse_coin(&url, &response.amount, decimals)?,
        })
    }

    async fn get_pool_state(&self, pool: &str) -> Result<PoolState, MarketError> {
        let pool_id = parse_pool_id(pool)?;
        let url = format!("{}/osmosis/poolmanager/v1beta1/pools/{}", self.lcd_base_url, pool_id);
        let response: PoolResponse = self.get_json("pool", &url, &[]).await?;
        let raw = response.pool;

        let coin_asset = |coin: &Coin| -> Result<CosmosPoolAsset, MarketError> {
            Ok(CosmosPoolAsset {
                denom: coin.denom.clone(),
                amount: parse_integer_amount(&coin.amount)
                    .map_err(|e| MarketError::data_shape(&url, format!("{}: {}", coin.denom, e)))?,
            })
        };

        let assets = if !raw.pool_assets.is_empty() {
            raw.pool_assets
                .iter()
                .map(|a| coin_asset(&a.token))
                .collect::<Result<Vec<_>, _>>()?
        } else if !raw.pool_liquidity.is_empty() {
            raw.pool_liquidity.iter().map(coin_asset).collect::<Result<Vec<_>, _>>()?
        } else if let (Some(token0), Some(token1)) = (&raw.token0, &raw.token1) {
            // CL pools do not report balances on this endpoint
            vec![
                CosmosPoolAsset {
                    denom: token0.clone(),
                    amount: Default::default(),
                },
                CosmosPoolAsset {
                    denom: token1.clone(),
                    amount: Default::default(),
                },
            ]
        } else {
            return Err(MarketError::data_shape(&url, "pool has no recognizable assets"));
        };

        let current_tick = raw
            .current_tick
            .as_deref()
            .map(|tick| {
                tick.parse::<i64>()
                    .map_err(|e| MarketError::data_shape(&url, format!("current_tick {:?}: {}", tick, e)))
            })
            .transpose()?;

        Ok(PoolState::Cosmos {
            pool_id,
            assets,
            current_tick,
            liquidity: raw.current_tick_liquidity,
        })
    }

    async fn call_raw(
        &self,
        target: &str,
        method: &str,
        args: &[String],
    ) -> Result<serde_json::Value, MarketError> {
        if !method.eq_ignore_ascii_case("GET") {
            return Err(MarketError::InvalidInput(format!(
                "only GET is supported on the LCD gateway, got {}",
                method
            )));
        }
        let query = args
            .iter()
            .map(|arg| {
                arg.split_once('=')
                    .ok_or_else(|| MarketError::InvalidInput(format!("expected key=value, got {:?}", arg)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let url = format!("{}/{}", self.lcd_base_url, target.trim_start_matches('/'));
        self.get_json("call_raw", &url, &query).await
    }
}
