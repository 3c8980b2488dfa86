// src/connection_manager.rs

use crate::error::MarketError;
use crate::metrics;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::settings::Settings;
use crate::types::network::NetworkId;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use ethers::middleware::Middleware;
use ethers::prelude::{Http, Provider};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Which configured endpoint a connection is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    Primary,
    Backup,
}

impl EndpointRole {
    fn as_str(&self) -> &'static str {
        match self {
            EndpointRole::Primary => "primary",
            EndpointRole::Backup => "backup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub primary: String,
    pub backup: String,
}

/// A probed, live client bound to one network and one endpoint.
pub struct Connection<C> {
    network: NetworkId,
    role: EndpointRole,
    url: String,
    client: Arc<C>,
    head_block: u64,
    established_at: Instant,
}

impl<C> Connection<C> {
    pub fn network(&self) -> NetworkId {
        self.network
    }

    pub fn role(&self) -> EndpointRole {
        self.role
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client(&self) -> Arc<C> {
        Arc::clone(&self.client)
    }

    /// Block height reported by the liveness probe
    pub fn head_block(&self) -> u64 {
        self.head_block
    }

    pub fn age(&self) -> Duration {
        self.established_at.elapsed()
    }
}

impl<C> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("network", &self.network)
            .field("role", &self.role)
            .field("url", &self.url)
            .field("head_block", &self.head_block)
            .finish()
    }
}

/// Creates clients for an endpoint URL and checks that they answer.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Client: Send + Sync + 'static;

    /// Builds a client. Must not perform network I/O.
    fn connect(&self, url: &str) -> Result<Self::Client, String>;

    /// Cheap liveness call; returns the current block height.
    async fn probe(&self, client: &Self::Client) -> Result<u64, String>;
}

/// JSON-RPC connector backed by `ethers` HTTP providers.
#[derive(Debug, Clone)]
pub struct EthersConnector {
    request_timeout: Duration,
}

impl EthersConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl Connector for EthersConnector {
    type Client = Provider<Http>;

    fn connect(&self, url: &str) -> Result<Provider<Http>, String> {
        let parsed = url::Url::parse(url).map_err(|e| format!("invalid url {}: {}", url, e))?;
        let http_client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;
        Ok(Provider::new(Http::new_with_client(parsed, http_client)))
    }

    async fn probe(&self, client: &Provider<Http>) -> Result<u64, String> {
        client
            .get_block_number()
            .await
            .map(|block| block.as_u64())
            .map_err(|e| e.to_string())
    }
}

struct Slot<C> {
    endpoints: Endpoints,
    cached: ArcSwapOption<Connection<C>>,
    // Serializa los refresh por red: como mucho un probe en vuelo
    gate: Mutex<()>,
    limiter: DefaultDirectRateLimiter,
}

/// Per-network connection lifecycle with primary/backup failover.
///
/// Connections are created lazily on first demand, validated with a liveness
/// probe, and cached until invalidated. Readers see either the previous or the
/// new connection, never a half-built one.
///
/// ## Usage
///
/// ```rust,no_run
/// # use multichain_market_sdk::{connection_manager::ConnectionManager, retry::RetryPolicy, settings::Settings, NetworkId};
/// # async fn run(settings: Settings) -> Result<(), multichain_market_sdk::MarketError> {
/// let manager = ConnectionManager::from_settings(&settings)?;
/// let conn = manager.acquire_with_retry(NetworkId::Base, &RetryPolicy::default()).await?;
/// println!("connected to {} at block {}", conn.url(), conn.head_block());
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<C: Connector = EthersConnector> {
    connector: C,
    slots: HashMap<NetworkId, Slot<C::Client>>,
    probe_timeout: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl ConnectionManager<EthersConnector> {
    pub fn from_settings(settings: &Settings) -> Result<Self, MarketError> {
        let endpoints = NetworkId::EVM
            .into_iter()
            .filter_map(|network| {
                settings.networks.get(network).map(|cfg| {
                    (
                        network,
                        Endpoints {
                            primary: cfg.primary_rpc_url.clone(),
                            backup: cfg.backup_rpc_url.clone(),
                        },
                    )
                })
            })
            .collect();

        Self::new(
            EthersConnector::new(settings.request_timeout()),
            endpoints,
            settings.probe_timeout(),
            settings.rpc.qps_limit,
        )
    }
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        endpoints: HashMap<NetworkId, Endpoints>,
        probe_timeout: Duration,
        qps_limit: u32,
    ) -> Result<Self, MarketError> {
        let quota = Quota::per_second(
            NonZeroU32::new(qps_limit).ok_or_else(|| MarketError::Config("QPS must be non-zero".to_string()))?,
        );

        let slots = endpoints
            .into_iter()
            .map(|(network, endpoints)| {
                let slot = Slot {
                    endpoints,
                    cached: ArcSwapOption::empty(),
                    gate: Mutex::new(()),
                    limiter: RateLimiter::direct(quota),
                };
                (network, slot)
            })
            .collect();

        Ok(Self {
            connector,
            slots,
            probe_timeout,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn networks(&self) -> impl Iterator<Item = NetworkId> + '_ {
        self.slots.keys().copied()
    }

    fn slot(&self, network: NetworkId) -> Result<&Slot<C::Client>, MarketError> {
        self.slots
            .get(&network)
            .ok_or_else(|| MarketError::Config(format!("no RPC endpoints configured for {}", network)))
    }

    /// Cached connection for `network`, if one is live.
    pub fn cached(&self, network: NetworkId) -> Option<Arc<Connection<C::Client>>> {
        self.slots.get(&network).and_then(|slot| slot.cached.load_full())
    }

    /// Returns the cached connection, or establishes one (primary first, then backup).
    pub async fn acquire(&self, network: NetworkId) -> Result<Arc<Connection<C::Client>>, MarketError> {
        let slot = self.slot(network)?;

        if let Some(conn) = slot.cached.load_full() {
            metrics::increment_cache_hit("connection");
            return Ok(conn);
        }

        let _guard = slot.gate.lock().await;
        // Otro caller pudo publicar mientras esperábamos el gate
        if let Some(conn) = slot.cached.load_full() {
            metrics::increment_cache_hit("connection");
            return Ok(conn);
        }
        metrics::increment_cache_miss("connection");

        let primary_err = match self.establish(network, EndpointRole::Primary, &slot.endpoints.primary).await {
            Ok(conn) => return Ok(Self::publish(slot, conn)),
            Err(e) => e,
        };
        warn!("⚠️ [{}] Primary RPC unavailable ({}), trying backup", network, primary_err);

        match self.establish(network, EndpointRole::Backup, &slot.endpoints.backup).await {
            Ok(conn) => {
                metrics::increment_failover(network.as_str());
                Ok(Self::publish(slot, conn))
            }
            Err(backup_err) => Err(MarketError::Connectivity {
                network,
                primary: primary_err,
                backup: backup_err,
            }),
        }
    }

    /// `acquire` with exponential backoff.
    ///
    /// Every failed attempt is followed by a backoff wait, and the cached entry
    /// is dropped before each retry. Only connectivity failures are retried.
    pub async fn acquire_with_retry(
        &self,
        network: NetworkId,
        policy: &RetryPolicy,
    ) -> Result<Arc<Connection<C::Client>>, MarketError> {
        let mut last_err = None;

        for (attempt, delay) in policy.delays().enumerate() {
            if attempt > 0 {
                self.invalidate(Some(network));
            }

            match self.acquire(network).await {
                Ok(conn) => {
                    if attempt > 0 {
                        info!("✅ [{}] Connected on attempt {}/{}", network, attempt + 1, policy.attempts());
                    }
                    return Ok(conn);
                }
                Err(e @ MarketError::Connectivity { .. }) => {
                    warn!(
                        "[{}] Connection attempt {}/{} failed, retrying in {:?}: {}",
                        network,
                        attempt + 1,
                        policy.attempts(),
                        delay,
                        e
                    );
                    last_err = Some(e);
                    self.sleeper.sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| MarketError::Connectivity {
            network,
            primary: "no attempt made".to_string(),
            backup: "no attempt made".to_string(),
        }))
    }

    /// Evicts one cached connection, or all of them with `None`.
    pub fn invalidate(&self, network: Option<NetworkId>) {
        match network {
            Some(network) => {
                if let Some(slot) = self.slots.get(&network) {
                    if slot.cached.swap(None).is_some() {
                        debug!("[{}] Connection cache invalidated", network);
                    }
                }
            }
            None => {
                for slot in self.slots.values() {
                    slot.cached.store(None);
                }
                debug!("All cached connections invalidated");
            }
        }
    }

    /// Drops `conn` from the cache only if it is still the published one.
    pub fn invalidate_if_current(&self, conn: &Arc<Connection<C::Client>>) {
        if let Some(slot) = self.slots.get(&conn.network) {
            let current = slot.cached.load_full();
            if current.map_or(false, |c| Arc::ptr_eq(&c, conn)) {
                slot.cached.store(None);
                debug!("[{}] Evicted failing connection to {}", conn.network, conn.url);
            }
        }
    }

    /// Waits until the per-network rate limiter admits one more call.
    pub async fn throttle(&self, network: NetworkId) {
        if let Some(slot) = self.slots.get(&network) {
            slot.limiter.until_ready().await;
        }
    }

    async fn establish(
        &self,
        network: NetworkId,
        role: EndpointRole,
        url: &str,
    ) -> Result<Connection<C::Client>, String> {
        let start = Instant::now();
        let client = self.connector.connect(url)?;

        let probe = timeout(self.probe_timeout, self.connector.probe(&client)).await;
        metrics::increment_rpc_call(network.as_str(), "liveness_probe");
        metrics::record_rpc_call_latency(network.as_str(), "liveness_probe", start.elapsed());

        let head_block = match probe {
            Ok(Ok(block)) => block,
            Ok(Err(e)) => {
                metrics::increment_probe_failure(network.as_str(), role.as_str());
                return Err(e);
            }
            Err(_) => {
                metrics::increment_probe_failure(network.as_str(), role.as_str());
                return Err(format!("liveness probe timed out after {:?}", self.probe_timeout));
            }
        };

        debug!(
            "[{}] {} endpoint {} alive at block {} ({:?})",
            network,
            role.as_str(),
            url,
            head_block,
            start.elapsed()
        );

        Ok(Connection {
            network,
            role,
            url: url.to_string(),
            client: Arc::new(client),
            head_block,
            established_at: Instant::now(),
        })
    }

    fn publish(slot: &Slot<C::Client>, conn: Connection<C::Client>) -> Arc<Connection<C::Client>> {
        let conn = Arc::new(conn);
        slot.cached.store(Some(Arc::clone(&conn)));
        conn
    }
}
