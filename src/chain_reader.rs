//! # Chain Reader Trait
//!
//! Uniform read capability over both chain families. Upper layers (pool
//! markets, TVL aggregation) only talk to `dyn ChainReader` and never need to
//! know whether the answer came from a JSON-RPC node or a Cosmos REST gateway.
//!
//! ## Implementations
//!
//! - [`EvmReader`](crate::evm_reader::EvmReader): ERC-20 and pool contracts over
//!   connections handed out by the `ConnectionManager`.
//! - [`CosmosReader`](crate::cosmos_reader::CosmosReader): stateless HTTP GETs
//!   against an LCD gateway and a pool analytics API.
//!
//! References are plain strings: hex addresses on EVM, denoms and numeric pool
//! ids on Cosmos. Malformed references fail with `MarketError::InvalidInput`.

use crate::error::MarketError;
use crate::types::chain_data::{Amount, PoolState, TokenMetadata};
use crate::types::network::NetworkId;
use async_trait::async_trait;

#[async_trait]
pub trait ChainReader: Send + Sync {
    fn network(&self) -> NetworkId;

    /// Native asset balance of `address`.
    async fn get_balance(&self, address: &str) -> Result<Amount, MarketError>;

    async fn get_token_balance(&self, token: &str, owner: &str) -> Result<Amount, MarketError>;

    async fn get_token_metadata(&self, token: &str) -> Result<TokenMetadata, MarketError>;

    async fn get_pool_state(&self, pool: &str) -> Result<PoolState, MarketError>;

    /// Escape hatch for chain-specific reads.
    ///
    /// EVM: `method` is a human-readable Solidity signature and the result is
    /// the decoded output tokens. Cosmos: `target` is an LCD path, `method`
    /// must be `GET` and `args` are `key=value` query parameters.
    async fn call_raw(
        &self,
        target: &str,
        method: &str,
        args: &[String],
    ) -> Result<serde_json::Value, MarketError>;
}
