// src/pool_market.rs

use crate::chain_reader::ChainReader;
use crate::cosmos_reader::CosmosReader;
use crate::error::MarketError;
use crate::price::SpotPriceSource;
use crate::tvl::TvlSource;
use crate::types::chain_data::{Amount, PoolState};
use crate::types::conversions::sqrt_price_x96_to_price;
use crate::metrics;
use crate::types::network::NetworkId;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_READING_TTL: Duration = Duration::from_secs(2);

/// Token price and pool TVL derived from one pool read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolQuote {
    /// Token price in the native asset
    pub price_native: f64,
    pub price_usd: f64,
    pub tvl_usd: f64,
}

/// Pool amounts in token units, independent of the USD reference.
#[derive(Debug, Clone, Copy)]
struct PoolReading {
    price_native: f64,
    token_amount: f64,
    native_amount: f64,
    read_at: Instant,
}

/// The token/native pool on an EVM network.
///
/// TVL and spot price of one snapshot come from the same pool read: the
/// reading is shared for `reading_ttl` and concurrent callers wait on a
/// single in-flight read.
pub struct EvmPoolMarket {
    network: NetworkId,
    reader: Arc<dyn ChainReader>,
    pool: String,
    token: String,
    native_token: String,
    reading_ttl: Duration,
    last_reading: ArcSwapOption<PoolReading>,
    read_gate: Mutex<()>,
}

impl EvmPoolMarket {
    pub fn new(reader: Arc<dyn ChainReader>, pool: &str, token: &str, native_token: &str) -> Self {
        Self {
            network: reader.network(),
            reader,
            pool: pool.to_string(),
            token: token.to_lowercase(),
            native_token: native_token.to_lowercase(),
            reading_ttl: DEFAULT_READING_TTL,
            last_reading: ArcSwapOption::empty(),
            read_gate: Mutex::new(()),
        }
    }

    /// `Duration::ZERO` reads the pool on every call.
    pub fn with_reading_ttl(mut self, ttl: Duration) -> Self {
        self.reading_ttl = ttl;
        self
    }

    fn shape_error(&self, detail: impl ToString) -> MarketError {
        MarketError::data_shape(format!("{} pool {}", self.network, self.pool), detail)
    }

    /// Whether the tracked token is `token0` of the pool.
    fn token_is_token0(&self, token0: &str, token1: &str) -> Result<bool, MarketError> {
        let (token0, token1) = (token0.to_lowercase(), token1.to_lowercase());
        if token0 == self.token && token1 == self.native_token {
            Ok(true)
        } else if token1 == self.token && token0 == self.native_token {
            Ok(false)
        } else {
            Err(self.shape_error(format!(
                "pool pairs {}/{}, expected {}/{}",
                token0, token1, self.token, self.native_token
            )))
        }
    }

    fn fresh_reading(&self) -> Option<Arc<PoolReading>> {
        self.last_reading
            .load_full()
            .filter(|reading| reading.read_at.elapsed() < self.reading_ttl)
    }

    async fn reading(&self) -> Result<Arc<PoolReading>, MarketError> {
        if let Some(reading) = self.fresh_reading() {
            metrics::increment_cache_hit("pool_reading");
            return Ok(reading);
        }

        let _guard = self.read_gate.lock().await;
        if let Some(reading) = self.fresh_reading() {
            metrics::increment_cache_hit("pool_reading");
            return Ok(reading);
        }
        metrics::increment_cache_miss("pool_reading");

        let reading = Arc::new(self.read_pool().await?);
        self.last_reading.store(Some(Arc::clone(&reading)));
        Ok(reading)
    }

    async fn read_pool(&self) -> Result<PoolReading, MarketError> {
        let state = self.reader.get_pool_state(&self.pool).await?;
        let (token0, token1) = state
            .tokens()
            .ok_or_else(|| self.shape_error(format!("{} pool without a token pair", state.kind_name())))?;
        let token_is_0 = self.token_is_token0(token0, token1)?;
        let (token_meta, native_meta) = futures::try_join!(
            self.reader.get_token_metadata(&self.token),
            self.reader.get_token_metadata(&self.native_token),
        )?;

        let (price_native, token_amount, native_amount) = match &state {
            PoolState::ConstantProduct { reserve0, reserve1, .. } => {
                let (token_reserve, native_reserve) = if token_is_0 {
                    (*reserve0, *reserve1)
                } else {
                    (*reserve1, *reserve0)
                };
                let token_amount = Amount::new(token_reserve, token_meta.decimals).to_f64();
                let native_amount = Amount::new(native_reserve, native_meta.decimals).to_f64();
                if token_amount <= 0.0 {
                    return Err(self.shape_error("empty token reserve"));
                }
                (native_amount / token_amount, token_amount, native_amount)
            }
            PoolState::Concentrated { sqrt_price_x96, .. } => {
                let (decimals0, decimals1) = if token_is_0 {
                    (token_meta.decimals, native_meta.decimals)
                } else {
                    (native_meta.decimals, token_meta.decimals)
                };
                let price0_in_1 = sqrt_price_x96_to_price(*sqrt_price_x96, decimals0, decimals1);
                if !(price0_in_1.is_finite() && price0_in_1 > 0.0) {
                    return Err(self.shape_error(format!("unusable sqrtPriceX96 {}", sqrt_price_x96)));
                }
                let price_native = if token_is_0 { price0_in_1 } else { 1.0 / price0_in_1 };

                let (token_balance, native_balance) = futures::try_join!(
                    self.reader.get_token_balance(&self.token, &self.pool),
                    self.reader.get_token_balance(&self.native_token, &self.pool),
                )?;
                (price_native, token_balance.to_f64(), native_balance.to_f64())
            }
            PoolState::Cosmos { .. } => {
                return Err(self.shape_error("expected an EVM pool, got a Cosmos pool"));
            }
        };

        debug!(
            "[{}] {} pool read: price {:.6} native, {:.4} token / {:.4} native",
            self.network,
            state.kind_name(),
            price_native,
            token_amount,
            native_amount
        );
        Ok(PoolReading {
            price_native,
            token_amount,
            native_amount,
            read_at: Instant::now(),
        })
    }

    pub async fn quote(&self, native_usd: f64) -> Result<PoolQuote, MarketError> {
        let reading = self.reading().await?;
        let price_usd = reading.price_native * native_usd;
        let tvl_usd = reading.native_amount * native_usd + reading.token_amount * price_usd;
        debug!(
            "[{}] quote: ${:.6}, TVL ${:.2} (reading age {:?})",
            self.network,
            price_usd,
            tvl_usd,
            reading.read_at.elapsed()
        );

        Ok(PoolQuote {
            price_native: reading.price_native,
            price_usd,
            tvl_usd,
        })
    }
}

#[async_trait]
impl TvlSource for EvmPoolMarket {
    async fn fetch_tvl(&self, native_usd: f64) -> Result<f64, MarketError> {
        Ok(self.quote(native_usd).await?.tvl_usd)
    }
}

#[async_trait]
impl SpotPriceSource for EvmPoolMarket {
    async fn spot_price(&self, native_usd: f64) -> Result<f64, MarketError> {
        Ok(self.quote(native_usd).await?.price_usd)
    }
}

/// The tracked Osmosis pool, priced by the analytics API (already in USD).
pub struct OsmosisPoolMarket {
    reader: Arc<CosmosReader>,
    pool_id: u64,
    denom: String,
}

impl OsmosisPoolMarket {
    pub fn new(reader: Arc<CosmosReader>, pool_id: u64, denom: &str) -> Self {
        Self {
            reader,
            pool_id,
            denom: denom.to_string(),
        }
    }

    fn shape_error(&self, detail: impl ToString) -> MarketError {
        MarketError::data_shape(format!("osmosis pool {}", self.pool_id), detail)
    }
}

#[async_trait]
impl TvlSource for OsmosisPoolMarket {
    async fn fetch_tvl(&self, _native_usd: f64) -> Result<f64, MarketError> {
        let stats = self.reader.pool_stats(self.pool_id).await?;
        let liquidity = stats
            .first()
            .map(|stat| stat.liquidity)
            .ok_or_else(|| self.shape_error("no liquidity entry"))?;
        Ok(liquidity)
    }
}

#[async_trait]
impl SpotPriceSource for OsmosisPoolMarket {
    async fn spot_price(&self, _native_usd: f64) -> Result<f64, MarketError> {
        let stats = self.reader.pool_stats(self.pool_id).await?;
        stats
            .iter()
            .find(|stat| stat.denom == self.denom)
            .map(|stat| stat.price)
            .ok_or_else(|| self.shape_error(format!("denom {} not in pool", self.denom)))
    }
}
