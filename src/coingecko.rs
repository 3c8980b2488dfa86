// src/coingecko.rs

use crate::error::MarketError;
use crate::metrics;
use crate::price::ReferencePriceSource;
use crate::settings::PriceFeeds;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

// CoinGecko devuelve { "<id>": { "<vs_currency>": price } }
type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

#[derive(Debug)]
struct CachedPrice {
    price: f64,
    fetched_at: Instant,
}

/// Native asset (ETH) price from CoinGecko `simple/price`.
///
/// Keeps the last answer for `cache_ttl` so a burst of snapshot requests
/// costs one upstream call.
pub struct CoinGeckoPriceSource {
    client: reqwest::Client,
    base_url: String,
    asset_id: String,
    vs_currency: String,
    cache_ttl: Duration,
    cache: ArcSwapOption<CachedPrice>,
}

impl CoinGeckoPriceSource {
    pub fn new(
        base_url: &str,
        asset_id: &str,
        vs_currency: &str,
        cache_ttl: Duration,
        request_timeout: Duration,
    ) -> Result<Self, MarketError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MarketError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            asset_id: asset_id.to_string(),
            vs_currency: vs_currency.to_lowercase(),
            cache_ttl,
            cache: ArcSwapOption::empty(),
        })
    }

    pub fn from_settings(feeds: &PriceFeeds, request_timeout: Duration) -> Result<Self, MarketError> {
        info!(
            "🚀 CoinGecko reference price: {} in {} (ttl {}s)",
            feeds.native_asset_id, feeds.vs_currency, feeds.cache_ttl_seconds
        );
        Self::new(
            &feeds.coingecko_base_url,
            &feeds.native_asset_id,
            &feeds.vs_currency,
            Duration::from_secs(feeds.cache_ttl_seconds),
            request_timeout,
        )
    }

    async fn fetch(&self) -> Result<f64, MarketError> {
        let url = format!("{}/simple/price", self.base_url);
        let start = Instant::now();
        let response = self
            .client
            .get(&url)
            .query(&[("ids", self.asset_id.as_str()), ("vs_currencies", self.vs_currency.as_str())])
            .send()
            .await?;
        metrics::increment_rpc_call("coingecko", "simple_price");
        metrics::record_rpc_call_latency("coingecko", "simple_price", start.elapsed());

        let status = response.status();
        if !status.is_success() {
            return Err(MarketError::Api {
                status: status.as_u16(),
                url,
            });
        }

        let body: SimplePriceResponse = response.json().await?;
        let price = body
            .get(&self.asset_id)
            .and_then(|quotes| quotes.get(&self.vs_currency))
            .copied()
            .ok_or_else(|| {
                MarketError::data_shape(&url, format!("no {} quote for {}", self.vs_currency, self.asset_id))
            })?;

        if !price.is_finite() || price <= 0.0 {
            return Err(MarketError::data_shape(url, format!("non-positive price {}", price)));
        }

        debug!("✅ [CoinGecko] {} = {} {} ({:?})", self.asset_id, price, self.vs_currency, start.elapsed());
        Ok(price)
    }
}

#[async_trait]
impl ReferencePriceSource for CoinGeckoPriceSource {
    async fn native_usd(&self) -> Result<f64, MarketError> {
        if let Some(cached) = self.cache.load_full() {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                metrics::increment_cache_hit("reference_price");
                return Ok(cached.price);
            }
        }
        metrics::increment_cache_miss("reference_price");

        let price = self.fetch().await?;
        self.cache.store(Some(Arc::new(CachedPrice {
            price,
            fetched_at: Instant::now(),
        })));
        Ok(price)
    }
}
