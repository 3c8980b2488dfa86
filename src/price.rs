// src/price.rs

use crate::error::MarketError;
use crate::metrics;
use crate::settings::{CosmosFailurePolicy, Supply};
use crate::types::network::{NetworkId, PerNetwork};
use crate::types::snapshot::{PriceSnapshot, Valuation, WeightMap};
use crate::utils::{join_isolated, Settled};
use crate::weighting;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;

/// Token spot price (USD) on one network.
#[async_trait]
pub trait SpotPriceSource: Send + Sync {
    async fn spot_price(&self, native_usd: f64) -> Result<f64, MarketError>;
}

/// USD price of the native asset the EVM pools are paired against.
#[async_trait]
pub trait ReferencePriceSource: Send + Sync {
    async fn native_usd(&self) -> Result<f64, MarketError>;
}

/// Spot prices of one request; failed networks carry 0 and are listed in `failed`.
pub type SpotPrices = Settled<NetworkId, f64>;

impl SpotPrices {
    pub fn to_per_network(&self) -> PerNetwork<f64> {
        PerNetwork::from_fn(|network| self.value(&network).copied().unwrap_or(0.0))
    }
}

/// Per-network spot prices blended with TVL weights.
///
/// EVM price failures are isolated the same way TVL failures are: the network
/// is reported as failed and the caller drops its weight. Osmosis follows the
/// configured [`CosmosFailurePolicy`]. The request only fails when no network
/// produced a price.
pub struct PriceAggregator {
    sources: PerNetwork<Arc<dyn SpotPriceSource>>,
    reference: Arc<dyn ReferencePriceSource>,
    circulating_supply: f64,
    total_supply: f64,
    cosmos_policy: CosmosFailurePolicy,
}

impl PriceAggregator {
    pub fn new(
        sources: PerNetwork<Arc<dyn SpotPriceSource>>,
        reference: Arc<dyn ReferencePriceSource>,
        supply: &Supply,
    ) -> Self {
        Self {
            sources,
            reference,
            circulating_supply: supply.circulating,
            total_supply: supply.total,
            cosmos_policy: CosmosFailurePolicy::Propagate,
        }
    }

    pub fn with_cosmos_policy(mut self, policy: CosmosFailurePolicy) -> Self {
        self.cosmos_policy = policy;
        self
    }

    pub fn circulating_supply(&self) -> f64 {
        self.circulating_supply
    }

    pub fn total_supply(&self) -> f64 {
        self.total_supply
    }

    pub async fn reference_price(&self) -> Result<f64, MarketError> {
        self.reference.native_usd().await
    }

    async fn spot(&self, network: NetworkId, native_usd: f64) -> Result<f64, MarketError> {
        let price = self.sources[network].spot_price(native_usd).await?;
        if !price.is_finite() || price < 0.0 {
            return Err(MarketError::data_shape(
                format!("{} spot price", network),
                format!("invalid price {}", price),
            ));
        }
        debug!("[{}] spot price {}", network, price);
        Ok(price)
    }

    /// All four spot prices, fetched concurrently.
    pub async fn fetch_prices(&self, native_usd: f64) -> Result<SpotPrices, MarketError> {
        let mut isolated: Vec<NetworkId> = NetworkId::EVM.to_vec();
        let propagate_osmosis = self.cosmos_policy == CosmosFailurePolicy::Propagate;
        if !propagate_osmosis {
            isolated.push(NetworkId::Osmosis);
        }

        let tasks = isolated
            .iter()
            .map(|&network| (network, self.spot(network, native_usd)))
            .collect::<Vec<_>>();
        let osmosis = async {
            if propagate_osmosis {
                self.spot(NetworkId::Osmosis, native_usd).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (osmosis, mut settled) = futures::join!(osmosis, join_isolated(tasks, 0.0));

        if let Some(price) = osmosis.map_err(|e| {
            warn!("❌ Osmosis spot price failed, aborting request: {}", e);
            e
        })? {
            settled.values.push((NetworkId::Osmosis, price));
        }

        if settled.failed.len() == settled.values.len() {
            // Ninguna red respondió: no hay nada que ponderar
            if let Some((network, e)) = settled.failed.drain(..).next() {
                warn!("❌ Every spot price failed (first: {})", network);
                return Err(e);
            }
        }
        for (network, e) in &settled.failed {
            warn!("⚠️ [{}] spot price failed, dropping its weight: {}", network, e);
            metrics::increment_network_degraded("price", network.as_str(), e.kind());
        }
        if !settled.is_complete() {
            debug!(
                "Spot prices degraded on {:?}",
                settled.failed_keys().collect::<Vec<_>>()
            );
        }
        Ok(settled)
    }

    pub fn compute_weighted_price(&self, prices: &PerNetwork<f64>, weights: &WeightMap) -> Valuation {
        weighting::compute_weighted_price(prices, weights, self.circulating_supply, self.total_supply)
    }

    pub fn price_snapshot(&self, prices: PerNetwork<f64>, weights: &WeightMap, reference_price: f64) -> PriceSnapshot {
        let weighted_price = weighting::weighted_price(&prices, weights);
        PriceSnapshot {
            prices,
            weighted_price,
            reference_price,
            timestamp: Utc::now(),
        }
    }
}
