//! # Multichain Market SDK
//!
//! Aggregates a token's on-chain price and liquidity (TVL) across three EVM
//! networks (Ethereum, Optimism, Base) and one Cosmos-SDK network (Osmosis)
//! into a single TVL-weighted market metric.
//!
//! ## Overview
//!
//! - **Connections**: per-network JSON-RPC clients with primary/backup
//!   failover, liveness probes and exponential-backoff retry
//! - **Chain reading**: one `ChainReader` trait over EVM contracts and Cosmos
//!   REST gateways
//! - **TVL**: per-network pool TVL with a fixed-interval cache; one failing EVM
//!   network contributes 0 instead of failing the snapshot
//! - **Blending**: TVL weights, weighted price, market cap and FDV
//!
//! ## Architecture
//!
//! ### Connection Layer
//! `ConnectionManager` hands out validated connections; `RetryPolicy` drives
//! `acquire_with_retry`.
//!
//! ### Reader Layer
//! `EvmReader` (ethers + abigen bindings) and `CosmosReader` (reqwest).
//!
//! ### Market Layer
//! Pool markets turn reader answers into spot price and TVL; `TvlAggregator`
//! and `PriceAggregator` combine them per network.
//!
//! ### Service Layer
//! `Orchestrator` assembles a `MarketSnapshot` under a request deadline.

// Core Types
/// Network ids, per-network maps, chain data and snapshots
pub mod types;
/// Error type shared by every layer
pub mod error;

// Connection Layer
/// Per-network connection lifecycle with failover
pub mod connection_manager;
/// Backoff schedule and sleeper abstraction
pub mod retry;

// Reader Layer
/// Chain-agnostic read trait
pub mod chain_reader;
/// EVM implementation of `ChainReader`
pub mod evm_reader;
/// Cosmos LCD implementation of `ChainReader`
pub mod cosmos_reader;

// Market Layer
/// Pool-level price and TVL per network
pub mod pool_market;
/// TVL aggregation and cache
pub mod tvl;
/// Spot prices and blending
pub mod price;
/// Pure weighting functions
pub mod weighting;
/// CoinGecko reference price
pub mod coingecko;

// Service Layer
/// Snapshot orchestration
pub mod orchestrator;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Fan-out helpers
pub mod utils;

// Contracts (Public ABIs Only)
/// Smart contract ABIs (read-only)
pub mod contracts;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use chain_reader::ChainReader;
pub use error::MarketError;
pub use orchestrator::Orchestrator;
pub use settings::Settings;
pub use types::{MarketSnapshot, NetworkId, PerNetwork, TvlSnapshot, WeightMap};
