pub mod chain_data;
pub mod conversions;
pub mod network;
pub mod snapshot;

pub use chain_data::{Amount, CosmosPoolAsset, PoolKind, PoolState, TokenMetadata};
pub use network::{NetworkId, PerNetwork};
pub use snapshot::{MarketSnapshot, PriceSnapshot, TvlSnapshot, Valuation, WeightMap};
