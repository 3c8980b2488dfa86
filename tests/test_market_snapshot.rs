//! End-to-end snapshot tests with in-memory price / TVL sources
//!
//! Tests cover:
//! - Weighted price, market cap and FDV from known inputs
//! - A failing EVM network degrading to zero weight
//! - Spot price failures isolated per network, TVL refresh still published
//! - Osmosis failure policy (propagate vs degrade)
//! - TVL cache reuse across snapshots and forced refresh
//! - Request deadline
//! - CoinGecko reference price (cache TTL, HTTP errors)

use async_trait::async_trait;
use multichain_market_sdk::coingecko::CoinGeckoPriceSource;
use multichain_market_sdk::price::{PriceAggregator, ReferencePriceSource, SpotPriceSource};
use multichain_market_sdk::settings::{CosmosFailurePolicy, Supply};
use multichain_market_sdk::tvl::{TvlAggregator, TvlSource};
use multichain_market_sdk::{MarketError, NetworkId, Orchestrator, PerNetwork};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fixed answer source; `None` fails with HTTP 503.
struct Fixed {
    value: Option<f64>,
    delay: Duration,
    calls: AtomicUsize,
}

impl Fixed {
    fn ok(value: f64) -> Arc<Self> {
        Arc::new(Self {
            value: Some(value),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            value: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(value: f64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            value: Some(value),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self) -> Result<f64, MarketError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.value.ok_or_else(|| MarketError::Api {
            status: 503,
            url: "http://stub.test".to_string(),
        })
    }
}

#[async_trait]
impl TvlSource for Fixed {
    async fn fetch_tvl(&self, _native_usd: f64) -> Result<f64, MarketError> {
        self.answer().await
    }
}

#[async_trait]
impl SpotPriceSource for Fixed {
    async fn spot_price(&self, _native_usd: f64) -> Result<f64, MarketError> {
        self.answer().await
    }
}

#[async_trait]
impl ReferencePriceSource for Fixed {
    async fn native_usd(&self) -> Result<f64, MarketError> {
        self.answer().await
    }
}

fn tvl_sources(sources: [Arc<Fixed>; 4]) -> PerNetwork<Arc<dyn TvlSource>> {
    let [ethereum, optimism, base, osmosis] = sources;
    PerNetwork {
        ethereum: ethereum as Arc<dyn TvlSource>,
        optimism: optimism as Arc<dyn TvlSource>,
        base: base as Arc<dyn TvlSource>,
        osmosis: osmosis as Arc<dyn TvlSource>,
    }
}

fn price_sources(sources: [Arc<Fixed>; 4]) -> PerNetwork<Arc<dyn SpotPriceSource>> {
    let [ethereum, optimism, base, osmosis] = sources;
    PerNetwork {
        ethereum: ethereum as Arc<dyn SpotPriceSource>,
        optimism: optimism as Arc<dyn SpotPriceSource>,
        base: base as Arc<dyn SpotPriceSource>,
        osmosis: osmosis as Arc<dyn SpotPriceSource>,
    }
}

fn default_prices() -> PerNetwork<Arc<dyn SpotPriceSource>> {
    price_sources([Fixed::ok(10.0), Fixed::ok(11.0), Fixed::ok(9.0), Fixed::ok(10.0)])
}

fn supply() -> Supply {
    Supply {
        circulating: 1_000.0,
        total: 4_000.0,
    }
}

fn orchestrator(
    tvl: PerNetwork<Arc<dyn TvlSource>>,
    policy: CosmosFailurePolicy,
    reference: Arc<dyn ReferencePriceSource>,
    deadline: Option<Duration>,
) -> Orchestrator {
    orchestrator_with_prices(tvl, default_prices(), policy, reference, deadline)
}

fn orchestrator_with_prices(
    tvl: PerNetwork<Arc<dyn TvlSource>>,
    prices: PerNetwork<Arc<dyn SpotPriceSource>>,
    policy: CosmosFailurePolicy,
    reference: Arc<dyn ReferencePriceSource>,
    deadline: Option<Duration>,
) -> Orchestrator {
    Orchestrator::with_components(
        TvlAggregator::new(tvl, Duration::from_secs(300), policy),
        PriceAggregator::new(prices, reference, &supply()).with_cosmos_policy(policy),
        deadline,
    )
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[tokio::test]
async fn test_snapshot_blends_prices_by_tvl() {
    let orchestrator = orchestrator(
        tvl_sources([Fixed::ok(400.0), Fixed::ok(300.0), Fixed::ok(200.0), Fixed::ok(100.0)]),
        CosmosFailurePolicy::Propagate,
        Fixed::ok(3_000.0),
        Some(Duration::from_secs(5)),
    );

    let snapshot = orchestrator.market_snapshot().await.unwrap();
    assert!(close(snapshot.weights.ethereum, 0.4));
    assert!(close(snapshot.weights.osmosis, 0.1));
    assert!(close(snapshot.weighted_price, 10.1));
    assert!(close(snapshot.market_cap, 10_100.0));
    assert!(close(snapshot.fdv, 40_400.0));
    assert_eq!(snapshot.total_tvl, 1_000.0);
    assert_eq!(snapshot.reference_price, 3_000.0);
    assert!(snapshot.degraded_networks.is_empty());

    let json = serde_json::to_value(&snapshot).unwrap();
    for key in [
        "weightedPrice",
        "referencePrice",
        "totalTvl",
        "marketCap",
        "fdv",
        "circulatingSupply",
        "totalSupply",
        "degradedNetworks",
    ] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(json["tvl"]["base"], json!(200.0));
}

#[tokio::test]
async fn test_failed_evm_network_gets_zero_weight() {
    let orchestrator = orchestrator(
        tvl_sources([Fixed::ok(400.0), Fixed::ok(300.0), Fixed::failing(), Fixed::ok(100.0)]),
        CosmosFailurePolicy::Propagate,
        Fixed::ok(3_000.0),
        None,
    );

    let snapshot = orchestrator.market_snapshot().await.unwrap();
    assert_eq!(snapshot.tvl.base, 0.0);
    assert_eq!(snapshot.weights.base, 0.0);
    assert_eq!(snapshot.degraded_networks, vec![NetworkId::Base]);
    // 0.5 * 10 + 0.375 * 11 + 0.125 * 10
    assert!(close(snapshot.weighted_price, 10.375));
}

#[tokio::test]
async fn test_network_down_for_tvl_and_price_degrades() {
    // la misma fuente sirve TVL y precio, como EvmPoolMarket en producción
    let base = Fixed::failing();
    let orchestrator = orchestrator_with_prices(
        tvl_sources([Fixed::ok(400.0), Fixed::ok(300.0), base.clone(), Fixed::ok(100.0)]),
        price_sources([Fixed::ok(10.0), Fixed::ok(11.0), base.clone(), Fixed::ok(10.0)]),
        CosmosFailurePolicy::Propagate,
        Fixed::ok(3_000.0),
        Some(Duration::from_secs(5)),
    );

    let snapshot = orchestrator.market_snapshot().await.unwrap();
    assert_eq!(snapshot.degraded_networks, vec![NetworkId::Base]);
    assert_eq!(snapshot.prices.base, 0.0);
    assert_eq!(snapshot.weights.base, 0.0);
    assert!(close(snapshot.weighted_price, 10.375));
    assert_eq!(base.calls(), 2);

    // el refresh de TVL se publicó
    let cached = orchestrator.tvl().cached().unwrap();
    assert_eq!(cached.degraded, vec![NetworkId::Base]);
    assert_eq!(cached.total(), 800.0);
}

#[tokio::test]
async fn test_price_only_failure_zeroes_weight_but_keeps_cache() {
    let orchestrator = orchestrator_with_prices(
        tvl_sources([Fixed::ok(400.0), Fixed::ok(300.0), Fixed::ok(200.0), Fixed::ok(100.0)]),
        price_sources([Fixed::ok(10.0), Fixed::failing(), Fixed::ok(9.0), Fixed::ok(10.0)]),
        CosmosFailurePolicy::Propagate,
        Fixed::ok(3_000.0),
        None,
    );

    let snapshot = orchestrator.market_snapshot().await.unwrap();
    assert_eq!(snapshot.degraded_networks, vec![NetworkId::Optimism]);
    assert_eq!(snapshot.tvl.optimism, 0.0);
    assert_eq!(snapshot.total_tvl, 700.0);
    assert_eq!(snapshot.weights.optimism, 0.0);
    assert!((snapshot.weights.sum() - 1.0).abs() < 1e-9);
    // (400 * 10 + 200 * 9 + 100 * 10) / 700
    assert!(close(snapshot.weighted_price, 6_800.0 / 700.0));

    // el cache conserva el TVL real de Optimism
    let cached = orchestrator.tvl().cached().unwrap();
    assert_eq!(cached.tvl.optimism, 300.0);
    assert!(cached.degraded.is_empty());
}

#[tokio::test]
async fn test_every_price_failing_fails_snapshot_but_publishes_tvl() {
    let orchestrator = orchestrator_with_prices(
        tvl_sources([Fixed::ok(400.0), Fixed::ok(300.0), Fixed::ok(200.0), Fixed::ok(100.0)]),
        price_sources([Fixed::failing(), Fixed::failing(), Fixed::failing(), Fixed::failing()]),
        CosmosFailurePolicy::Degrade,
        Fixed::ok(3_000.0),
        None,
    );

    let err = orchestrator.market_snapshot().await.unwrap_err();
    assert!(matches!(err, MarketError::Api { status: 503, .. }));
    assert_eq!(orchestrator.tvl().cached().unwrap().total(), 1_000.0);
}

#[tokio::test]
async fn test_osmosis_failure_policy() {
    let propagate = orchestrator(
        tvl_sources([Fixed::ok(400.0), Fixed::ok(300.0), Fixed::ok(200.0), Fixed::failing()]),
        CosmosFailurePolicy::Propagate,
        Fixed::ok(3_000.0),
        None,
    );
    let err = propagate.market_snapshot().await.unwrap_err();
    assert!(matches!(err, MarketError::Api { status: 503, .. }));
    assert!(propagate.tvl().cached().is_none());

    let degrade = orchestrator(
        tvl_sources([Fixed::ok(400.0), Fixed::ok(300.0), Fixed::ok(200.0), Fixed::failing()]),
        CosmosFailurePolicy::Degrade,
        Fixed::ok(3_000.0),
        None,
    );
    let snapshot = degrade.market_snapshot().await.unwrap();
    assert_eq!(snapshot.degraded_networks, vec![NetworkId::Osmosis]);
    assert_eq!(snapshot.weights.osmosis, 0.0);
}

#[tokio::test]
async fn test_all_tvl_zero_falls_back_to_equal_weights() {
    let orchestrator = orchestrator(
        tvl_sources([Fixed::ok(0.0), Fixed::ok(0.0), Fixed::ok(0.0), Fixed::ok(0.0)]),
        CosmosFailurePolicy::Propagate,
        Fixed::ok(3_000.0),
        None,
    );

    let snapshot = orchestrator.market_snapshot().await.unwrap();
    assert_eq!(snapshot.weights, PerNetwork::splat(0.25));
    // (10 + 11 + 9 + 10) / 4
    assert!(close(snapshot.weighted_price, 10.0));
}

#[tokio::test]
async fn test_tvl_cached_between_snapshots() {
    let ethereum = Fixed::ok(400.0);
    let orchestrator = orchestrator(
        tvl_sources([ethereum.clone(), Fixed::ok(300.0), Fixed::ok(200.0), Fixed::ok(100.0)]),
        CosmosFailurePolicy::Propagate,
        Fixed::ok(3_000.0),
        None,
    );

    orchestrator.market_snapshot().await.unwrap();
    orchestrator.market_snapshot().await.unwrap();
    assert_eq!(ethereum.calls(), 1);

    orchestrator.refresh().await.unwrap();
    assert_eq!(ethereum.calls(), 2);

    orchestrator.invalidate();
    assert!(orchestrator.tvl().cached().is_none());
    orchestrator.market_snapshot().await.unwrap();
    assert_eq!(ethereum.calls(), 3);
}

#[tokio::test]
async fn test_reference_failure_fails_snapshot() {
    let orchestrator = orchestrator(
        tvl_sources([Fixed::ok(400.0), Fixed::ok(300.0), Fixed::ok(200.0), Fixed::ok(100.0)]),
        CosmosFailurePolicy::Propagate,
        Fixed::failing(),
        None,
    );
    assert!(orchestrator.market_snapshot().await.is_err());
}

#[tokio::test]
async fn test_deadline_exceeded() {
    let orchestrator = orchestrator(
        tvl_sources([Fixed::ok(400.0), Fixed::ok(300.0), Fixed::ok(200.0), Fixed::ok(100.0)]),
        CosmosFailurePolicy::Propagate,
        Fixed::slow(3_000.0, Duration::from_millis(500)),
        Some(Duration::from_millis(20)),
    );

    let err = orchestrator.market_snapshot().await.unwrap_err();
    assert!(matches!(err, MarketError::DeadlineExceeded(d) if d == Duration::from_millis(20)));
    assert_eq!(err.kind(), "deadline");
    assert!(orchestrator.tvl().cached().is_none());
}

fn coingecko(server: &MockServer, ttl: Duration) -> CoinGeckoPriceSource {
    CoinGeckoPriceSource::new(&server.uri(), "ethereum", "USD", ttl, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_coingecko_price_cached_within_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("ids", "ethereum"))
        .and(query_param("vs_currencies", "usd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ethereum": {"usd": 3012.5}})))
        .expect(1)
        .mount(&server)
        .await;

    let source = coingecko(&server, Duration::from_secs(60));
    assert_eq!(source.native_usd().await.unwrap(), 3012.5);
    assert_eq!(source.native_usd().await.unwrap(), 3012.5);
}

#[tokio::test]
async fn test_coingecko_zero_ttl_refetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ethereum": {"usd": 2999.0}})))
        .expect(2)
        .mount(&server)
        .await;

    let source = coingecko(&server, Duration::ZERO);
    source.native_usd().await.unwrap();
    source.native_usd().await.unwrap();
}

#[tokio::test]
async fn test_coingecko_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    let err = coingecko(&server, Duration::from_secs(60)).native_usd().await.unwrap_err();
    assert!(matches!(err, MarketError::Api { status: 429, .. }));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bitcoin": {"usd": 60000.0}})))
        .mount(&server)
        .await;
    let err = coingecko(&server, Duration::from_secs(60)).native_usd().await.unwrap_err();
    assert_eq!(err.kind(), "data_shape");
}
