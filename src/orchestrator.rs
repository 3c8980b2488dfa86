//! # Market Orchestrator
//!
//! The `Orchestrator` is the long-lived service object behind every snapshot
//! request. It is built once per process from `Settings` and owns the
//! connection manager, the TVL aggregator (and its cache) and the price
//! aggregator.
//!
//! ## Snapshot pipeline
//!
//! 1. Reference price of the native asset (ETH/USD)
//! 2. TVL snapshot (cached) and spot prices, concurrently
//! 3. TVL weights; a network without TVL or without a price weighs 0
//! 4. Weighted price, market cap and FDV
//!
//! The whole pipeline runs under the request deadline; when it expires every
//! in-flight acquisition and retry is dropped.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use multichain_market_sdk::{Orchestrator, Settings};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::new()?;
//! let orchestrator = Orchestrator::from_settings(&settings)?;
//! let snapshot = orchestrator.market_snapshot().await?;
//! println!("{}", serde_json::to_string_pretty(&snapshot)?);
//! # Ok(())
//! # }
//! ```

use crate::{
    coingecko::CoinGeckoPriceSource,
    connection_manager::ConnectionManager,
    cosmos_reader::CosmosReader,
    error::MarketError,
    evm_reader::EvmReader,
    metrics,
    pool_market::{EvmPoolMarket, OsmosisPoolMarket},
    price::{PriceAggregator, SpotPriceSource},
    retry::RetryPolicy,
    settings::Settings,
    tvl::{TvlAggregator, TvlSource},
    types::conversions::string_to_address,
    types::network::{NetworkId, PerNetwork},
    types::snapshot::MarketSnapshot,
};
use chrono::Utc;
use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

pub struct Orchestrator {
    connections: Option<Arc<ConnectionManager>>,
    tvl: TvlAggregator,
    prices: PriceAggregator,
    deadline: Option<Duration>,
}

impl Orchestrator {
    /// Wires readers, pool markets and aggregators from configuration.
    /// Performs no network I/O; connections are established on first use.
    pub fn from_settings(settings: &Settings) -> Result<Self, MarketError> {
        let manager = Arc::new(ConnectionManager::from_settings(settings)?);
        let retry = RetryPolicy::from_settings(&settings.retry);

        let ethereum = evm_market(settings, &manager, retry, NetworkId::Ethereum)?;
        let optimism = evm_market(settings, &manager, retry, NetworkId::Optimism)?;
        let base = evm_market(settings, &manager, retry, NetworkId::Base)?;

        let cosmos = Arc::new(CosmosReader::from_settings(&settings.osmosis, settings.request_timeout())?);
        let osmosis = Arc::new(OsmosisPoolMarket::new(
            cosmos,
            settings.osmosis.pool_id,
            &settings.osmosis.denom,
        ));

        let tvl_sources: PerNetwork<Arc<dyn TvlSource>> = PerNetwork {
            ethereum: ethereum.clone(),
            optimism: optimism.clone(),
            base: base.clone(),
            osmosis: osmosis.clone(),
        };
        let price_sources: PerNetwork<Arc<dyn SpotPriceSource>> = PerNetwork {
            ethereum,
            optimism,
            base,
            osmosis,
        };

        let reference = Arc::new(CoinGeckoPriceSource::from_settings(
            &settings.price_feeds,
            settings.request_timeout(),
        )?);

        let tvl = TvlAggregator::new(tvl_sources, settings.tvl_ttl(), settings.tvl.cosmos_failure_policy);
        let prices = PriceAggregator::new(price_sources, reference, &settings.supply)
            .with_cosmos_policy(settings.tvl.cosmos_failure_policy);

        info!(
            "🚀 Orchestrator ready: TVL ttl {:?}, deadline {:?}, cosmos policy {:?}",
            settings.tvl_ttl(),
            settings.request_deadline(),
            settings.tvl.cosmos_failure_policy
        );

        Ok(Self {
            connections: Some(manager),
            tvl,
            prices,
            deadline: settings.request_deadline(),
        })
    }

    /// Assembles an orchestrator from prebuilt aggregators (no connection manager).
    pub fn with_components(tvl: TvlAggregator, prices: PriceAggregator, deadline: Option<Duration>) -> Self {
        Self {
            connections: None,
            tvl,
            prices,
            deadline,
        }
    }

    pub fn connections(&self) -> Option<&Arc<ConnectionManager>> {
        self.connections.as_ref()
    }

    pub fn tvl(&self) -> &TvlAggregator {
        &self.tvl
    }

    pub fn prices(&self) -> &PriceAggregator {
        &self.prices
    }

    /// Current market snapshot, using the cached TVL while it is fresh.
    pub async fn market_snapshot(&self) -> Result<MarketSnapshot, MarketError> {
        self.with_deadline(self.assemble(false)).await
    }

    /// Like `market_snapshot`, but always re-reads TVL.
    pub async fn refresh(&self) -> Result<MarketSnapshot, MarketError> {
        self.with_deadline(self.assemble(true)).await
    }

    /// Drops the TVL cache and every cached connection.
    pub fn invalidate(&self) {
        self.tvl.invalidate();
        if let Some(manager) = &self.connections {
            manager.invalidate(None);
        }
    }

    async fn with_deadline<T>(&self, work: impl Future<Output = Result<T, MarketError>>) -> Result<T, MarketError> {
        match self.deadline {
            Some(limit) => timeout(limit, work).await.map_err(|_| {
                warn!("⏱️ Snapshot exceeded deadline of {:?}, in-flight calls dropped", limit);
                MarketError::DeadlineExceeded(limit)
            })?,
            None => work.await,
        }
    }

    async fn assemble(&self, force_refresh: bool) -> Result<MarketSnapshot, MarketError> {
        let start = Instant::now();
        let native_usd = self.prices.reference_price().await?;
        // Los tres EVM cotizan contra ETH; Osmosis ya viene en USD
        let price_inputs = PerNetwork::splat(native_usd);

        let tvl_future = async {
            if force_refresh {
                self.tvl.refresh(&price_inputs).await
            } else {
                self.tvl.fetch_all_tvl(&price_inputs).await
            }
        };
        // join, no try_join: el refresh de TVL termina y publica aunque falle un precio
        let (tvl, spot_prices) = futures::join!(tvl_future, self.prices.fetch_prices(native_usd));
        let (tvl, spot_prices) = (tvl?, spot_prices?);

        // Sin precio la red no pondera: TVL a 0 solo en esta respuesta, el cache queda intacto
        let tvl = tvl.with_degraded(spot_prices.failed_keys());
        let weights = self.tvl.calculate_tvl_weights(&tvl);
        let prices = spot_prices.to_per_network();
        let valuation = self.prices.compute_weighted_price(&prices, &weights);
        let price_snapshot = self.prices.price_snapshot(prices, &weights, native_usd);
        metrics::set_weighted_price(valuation.weighted_price);

        info!(
            "✅ Snapshot in {:?}: weighted ${:.6}, TVL ${:.2}, degraded {:?}",
            start.elapsed(),
            valuation.weighted_price,
            tvl.total(),
            tvl.degraded
        );

        Ok(MarketSnapshot {
            timestamp: Utc::now(),
            prices: price_snapshot.prices,
            weighted_price: valuation.weighted_price,
            reference_price: price_snapshot.reference_price,
            tvl: tvl.tvl,
            total_tvl: tvl.total(),
            weights,
            market_cap: valuation.market_cap,
            fdv: valuation.fully_diluted_valuation,
            circulating_supply: self.prices.circulating_supply(),
            total_supply: self.prices.total_supply(),
            degraded_networks: tvl.degraded,
        })
    }
}

fn evm_market(
    settings: &Settings,
    manager: &Arc<ConnectionManager>,
    retry: RetryPolicy,
    network: NetworkId,
) -> Result<Arc<EvmPoolMarket>, MarketError> {
    let cfg = settings
        .networks
        .get(network)
        .ok_or_else(|| MarketError::Config(format!("{} is not an EVM network", network)))?;

    let reader = EvmReader::new(network, Arc::clone(manager), retry)
        .with_pool_kind(string_to_address(&cfg.pool_address)?, cfg.pool_kind);

    Ok(Arc::new(
        EvmPoolMarket::new(
            Arc::new(reader),
            &cfg.pool_address,
            &cfg.token_address,
            &cfg.native_token_address,
        )
        .with_reading_ttl(settings.pool_reading_ttl()),
    ))
}
