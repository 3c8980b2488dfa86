use crate::types::network::{NetworkId, PerNetwork};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Normalized per-network contribution used to blend prices. Sums to 1.0.
pub type WeightMap = PerNetwork<f64>;

/// TVL (USD) of every network at one point in time.
///
/// Networks whose lookup failed carry 0 and are listed in `degraded`.
/// Snapshots are never mutated after publication; a refresh replaces them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TvlSnapshot {
    pub tvl: PerNetwork<f64>,
    pub degraded: Vec<NetworkId>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    captured_at: Instant,
}

impl TvlSnapshot {
    pub fn new(tvl: PerNetwork<f64>, degraded: Vec<NetworkId>) -> Self {
        Self {
            tvl,
            degraded,
            timestamp: Utc::now(),
            captured_at: Instant::now(),
        }
    }

    pub fn total(&self) -> f64 {
        self.tvl.sum()
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }

    pub fn is_partial(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Copy with `networks` zeroed and added to `degraded`; keeps the capture time.
    pub fn with_degraded<'a>(&self, networks: impl IntoIterator<Item = &'a NetworkId>) -> Self {
        let mut out = self.clone();
        for network in networks {
            out.tvl[*network] = 0.0;
            if !out.degraded.contains(network) {
                out.degraded.push(*network);
            }
        }
        out.degraded.sort();
        out
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub prices: PerNetwork<f64>,
    pub weighted_price: f64,
    /// Native asset (ETH) price in the quote currency
    pub reference_price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Output of the blending step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub weighted_price: f64,
    pub market_cap: f64,
    pub fully_diluted_valuation: f64,
}

/// Everything the boundary layer serializes for the dashboard / public API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub prices: PerNetwork<f64>,
    pub weighted_price: f64,
    pub reference_price: f64,
    pub tvl: PerNetwork<f64>,
    pub total_tvl: f64,
    pub weights: WeightMap,
    pub market_cap: f64,
    pub fdv: f64,
    pub circulating_supply: f64,
    pub total_supply: f64,
    pub degraded_networks: Vec<NetworkId>,
}
