use crate::types::conversions::{u256_to_decimal, u256_to_f64, ConversionError};
use ethers::types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw on-chain integer amount together with the decimals needed to scale it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Amount {
    pub raw: U256,
    pub decimals: u8,
}

impl Amount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn zero(decimals: u8) -> Self {
        Self::new(U256::zero(), decimals)
    }

    pub fn to_decimal(&self) -> Result<Decimal, ConversionError> {
        u256_to_decimal(self.raw, self.decimals)
    }

    pub fn to_f64(&self) -> f64 {
        u256_to_f64(self.raw, self.decimals)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenMetadata {
    pub decimals: u8,
    pub symbol: String,
    pub total_supply: Amount,
}

/// How an EVM pool exposes its liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// `getReserves()` pairs (Uniswap V2 and forks)
    ConstantProduct,
    /// `slot0()` pools (Uniswap V3 and forks)
    Concentrated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CosmosPoolAsset {
    pub denom: String,
    pub amount: U256,
}

/// Liquidity data for a pool, shaped by the protocol that holds it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolState {
    ConstantProduct {
        token0: String,
        token1: String,
        reserve0: U256,
        reserve1: U256,
    },
    Concentrated {
        token0: String,
        token1: String,
        sqrt_price_x96: U256,
        tick: i32,
        liquidity: u128,
    },
    Cosmos {
        pool_id: u64,
        assets: Vec<CosmosPoolAsset>,
        current_tick: Option<i64>,
        liquidity: Option<String>,
    },
}

impl PoolState {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PoolState::ConstantProduct { .. } => "constant_product",
            PoolState::Concentrated { .. } => "concentrated",
            PoolState::Cosmos { .. } => "cosmos",
        }
    }

    /// (token0, token1) for EVM pools; first two assets for Cosmos pools.
    pub fn tokens(&self) -> Option<(&str, &str)> {
        match self {
            PoolState::ConstantProduct { token0, token1, .. }
            | PoolState::Concentrated { token0, token1, .. } => Some((token0, token1)),
            PoolState::Cosmos { assets, .. } => match assets.as_slice() {
                [a, b, ..] => Some((&a.denom, &b.denom)),
                _ => None,
            },
        }
    }
}
