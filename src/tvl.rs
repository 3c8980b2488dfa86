// src/tvl.rs

use crate::error::MarketError;
use crate::metrics;
use crate::settings::CosmosFailurePolicy;
use crate::types::network::{NetworkId, PerNetwork};
use crate::types::snapshot::{TvlSnapshot, WeightMap};
use crate::utils::join_isolated;
use crate::weighting;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// TVL (USD) of the tracked pool on one network.
#[async_trait]
pub trait TvlSource: Send + Sync {
    /// `native_usd` is the USD price of the network's native asset.
    async fn fetch_tvl(&self, native_usd: f64) -> Result<f64, MarketError>;
}

/// Observable state of the TVL cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvlState {
    /// No snapshot published yet
    Empty,
    Fresh,
    /// A refresh is running; readers still get the previous snapshot
    StaleRefreshing,
    /// Cached snapshot is older than the TTL and nobody is refreshing it
    Expired,
    /// Fresh, but at least one network was substituted with 0
    FailedPartial,
}

/// Per-network TVL with a fixed-interval cache.
///
/// Osmosis is fetched first; the EVM networks are fanned out concurrently and
/// a failure on one of them contributes 0 instead of aborting the batch.
/// Refreshes are single-flight and a failed refresh leaves the cache as it was.
pub struct TvlAggregator {
    sources: PerNetwork<Arc<dyn TvlSource>>,
    ttl: Duration,
    cosmos_policy: CosmosFailurePolicy,
    cached: ArcSwapOption<TvlSnapshot>,
    refresh_gate: Mutex<()>,
    refreshing: AtomicBool,
}

impl TvlAggregator {
    pub fn new(sources: PerNetwork<Arc<dyn TvlSource>>, ttl: Duration, cosmos_policy: CosmosFailurePolicy) -> Self {
        Self {
            sources,
            ttl,
            cosmos_policy,
            cached: ArcSwapOption::empty(),
            refresh_gate: Mutex::new(()),
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Last published snapshot, fresh or not.
    pub fn cached(&self) -> Option<Arc<TvlSnapshot>> {
        self.cached.load_full()
    }

    fn fresh(&self) -> Option<Arc<TvlSnapshot>> {
        self.cached.load_full().filter(|snapshot| snapshot.is_fresh(self.ttl))
    }

    pub fn state(&self) -> TvlState {
        let cached = self.cached.load_full();
        match cached {
            None => TvlState::Empty,
            Some(_) if self.refreshing.load(Ordering::Acquire) => TvlState::StaleRefreshing,
            Some(snapshot) if !snapshot.is_fresh(self.ttl) => TvlState::Expired,
            Some(snapshot) if snapshot.is_partial() => TvlState::FailedPartial,
            Some(_) => TvlState::Fresh,
        }
    }

    /// Drops the cached snapshot; the next call fetches.
    pub fn invalidate(&self) {
        self.cached.store(None);
        debug!("TVL cache invalidated");
    }

    /// Cached snapshot while fresh, otherwise a new one.
    pub async fn fetch_all_tvl(&self, price_inputs: &PerNetwork<f64>) -> Result<Arc<TvlSnapshot>, MarketError> {
        if let Some(snapshot) = self.fresh() {
            metrics::increment_cache_hit("tvl");
            debug!("TVL cache hit (age {:?})", snapshot.age());
            return Ok(snapshot);
        }

        let _guard = self.refresh_gate.lock().await;
        // Otro caller pudo haber publicado mientras esperábamos el gate
        if let Some(snapshot) = self.fresh() {
            metrics::increment_cache_hit("tvl");
            return Ok(snapshot);
        }
        metrics::increment_cache_miss("tvl");
        self.refresh_locked(price_inputs).await
    }

    /// Fetches regardless of cache age.
    pub async fn refresh(&self, price_inputs: &PerNetwork<f64>) -> Result<Arc<TvlSnapshot>, MarketError> {
        let _guard = self.refresh_gate.lock().await;
        self.refresh_locked(price_inputs).await
    }

    /// Degraded networks weigh 0, even in the equal-share fallback.
    pub fn calculate_tvl_weights(&self, snapshot: &TvlSnapshot) -> WeightMap {
        weighting::calculate_tvl_weights_excluding(&snapshot.tvl, &snapshot.degraded)
    }

    async fn refresh_locked(&self, price_inputs: &PerNetwork<f64>) -> Result<Arc<TvlSnapshot>, MarketError> {
        let start = Instant::now();
        let collected = {
            let _flag = RefreshingFlag::raise(&self.refreshing);
            self.collect(price_inputs).await
        };

        let snapshot = Arc::new(collected?);
        self.cached.store(Some(Arc::clone(&snapshot)));

        for (network, value) in snapshot.tvl.iter() {
            metrics::set_network_tvl(network.as_str(), *value);
        }
        info!(
            "✅ TVL refreshed in {:?}: total ${:.2} ({} degraded)",
            start.elapsed(),
            snapshot.total(),
            snapshot.degraded.len()
        );
        Ok(snapshot)
    }

    async fn fetch_one(&self, network: NetworkId, native_usd: f64) -> Result<f64, MarketError> {
        let value = self.sources[network].fetch_tvl(native_usd).await?;
        if !value.is_finite() || value < 0.0 {
            return Err(MarketError::data_shape(
                format!("{} tvl", network),
                format!("invalid TVL {}", value),
            ));
        }
        Ok(value)
    }

    async fn collect(&self, price_inputs: &PerNetwork<f64>) -> Result<TvlSnapshot, MarketError> {
        let mut tvl = PerNetwork::splat(0.0);
        let mut isolated: Vec<NetworkId> = NetworkId::EVM.to_vec();

        match self.cosmos_policy {
            CosmosFailurePolicy::Propagate => {
                tvl.osmosis = self
                    .fetch_one(NetworkId::Osmosis, price_inputs[NetworkId::Osmosis])
                    .await
                    .map_err(|e| {
                        warn!("❌ Osmosis TVL failed, aborting refresh: {}", e);
                        e
                    })?;
            }
            CosmosFailurePolicy::Degrade => isolated.insert(0, NetworkId::Osmosis),
        }

        let tasks = isolated
            .iter()
            .map(|&network| (network, self.fetch_one(network, price_inputs[network])))
            .collect::<Vec<_>>();
        let settled = join_isolated(tasks, 0.0).await;

        for (network, value) in &settled.values {
            tvl[*network] = *value;
        }
        let mut degraded = Vec::with_capacity(settled.failed.len());
        for (network, e) in &settled.failed {
            warn!("⚠️ [{}] TVL lookup failed, contributing 0: {}", network, e);
            metrics::increment_network_degraded("tvl", network.as_str(), e.kind());
            degraded.push(*network);
        }

        Ok(TvlSnapshot::new(tvl, degraded))
    }
}

/// Holds `refreshing` up while alive; dropping the refresh future lowers it too.
struct RefreshingFlag<'a>(&'a AtomicBool);

impl<'a> RefreshingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RefreshingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
