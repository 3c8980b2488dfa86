// src/evm_reader.rs

use crate::chain_reader::ChainReader;
use crate::connection_manager::{Connection, ConnectionManager};
use crate::contracts::{Erc20, IUniswapV2Pair, IUniswapV3Pool};
use crate::contracts::i_uniswap_v3_pool::validate_slot0;
use crate::error::MarketError;
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::types::chain_data::{Amount, PoolKind, PoolState, TokenMetadata};
use crate::types::conversions::{address_to_string, string_to_address};
use crate::types::network::NetworkId;
use async_trait::async_trait;
use dashmap::DashMap;
use ethers::abi::token::{LenientTokenizer, Tokenizer};
use ethers::abi::{AbiParser, Token};
use ethers::contract::ContractError;
use ethers::middleware::Middleware;
use ethers::prelude::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionRequest, I256};
use ethers::utils::hex;
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

type EvmConnection = Arc<Connection<Provider<Http>>>;

/// `ChainReader` for EVM networks.
///
/// Each operation acquires a connection from the shared `ConnectionManager`
/// (with retry) and issues read-only calls. Token decimals and symbols are
/// immutable on chain and cached per token; total supply and balances are
/// always re-read.
pub struct EvmReader {
    network: NetworkId,
    manager: Arc<ConnectionManager>,
    retry: RetryPolicy,
    pool_kinds: DashMap<Address, PoolKind>,
    // (decimals, symbol)
    token_info_cache: DashMap<Address, (u8, String)>,
}

impl EvmReader {
    pub fn new(network: NetworkId, manager: Arc<ConnectionManager>, retry: RetryPolicy) -> Self {
        Self {
            network,
            manager,
            retry,
            pool_kinds: DashMap::new(),
            token_info_cache: DashMap::new(),
        }
    }

    /// Registers the protocol of a pool so `get_pool_state` skips detection.
    pub fn with_pool_kind(self, pool: Address, kind: PoolKind) -> Self {
        self.pool_kinds.insert(pool, kind);
        self
    }

    async fn connection(&self) -> Result<EvmConnection, MarketError> {
        let conn = self.manager.acquire_with_retry(self.network, &self.retry).await?;
        self.manager.throttle(self.network).await;
        Ok(conn)
    }

    async fn timed<T, E>(&self, method: &'static str, call: impl Future<Output = Result<T, E>>) -> Result<T, E> {
        let start = Instant::now();
        let result = call.await;
        metrics::increment_rpc_call(self.network.as_str(), method);
        metrics::record_rpc_call_latency(self.network.as_str(), method, start.elapsed());
        result
    }

    /// Decode problems are payload errors; anything else is the transport, and
    /// the connection that produced it is evicted so the next call re-probes.
    fn contract_error(
        &self,
        conn: &EvmConnection,
        method: &str,
        e: ContractError<Provider<Http>>,
    ) -> MarketError {
        match e {
            ContractError::DecodingError(_)
            | ContractError::AbiError(_)
            | ContractError::DetokenizationError(_)
            | ContractError::Revert(_)
            | ContractError::ContractNotDeployed => {
                MarketError::data_shape(format!("{} {}", self.network, method), e)
            }
            other => self.transport_error(conn, method, other),
        }
    }

    fn transport_error(&self, conn: &EvmConnection, method: &str, e: impl ToString) -> MarketError {
        warn!("[{}] {} failed on {}: {}", self.network, method, conn.url(), e.to_string());
        self.manager.invalidate_if_current(conn);
        MarketError::Rpc {
            network: self.network,
            method: method.to_string(),
            detail: e.to_string(),
        }
    }

    async fn token_info(&self, conn: &EvmConnection, token: Address) -> Result<(u8, String), MarketError> {
        if let Some(info) = self.token_info_cache.get(&token) {
            metrics::increment_cache_hit("token_info");
            return Ok(info.value().clone());
        }
        metrics::increment_cache_miss("token_info");

        let erc20 = Erc20::new(token, conn.client());
        let decimals_call = erc20.decimals();
        let symbol_call = erc20.symbol();
        let (decimals, symbol) = futures::try_join!(
            self.timed("decimals", decimals_call.call()),
            self.timed("symbol", symbol_call.call()),
        )
        .map_err(|e| self.contract_error(conn, "decimals/symbol", e))?;

        self.token_info_cache.insert(token, (decimals, symbol.clone()));
        Ok((decimals, symbol))
    }

    async fn constant_product_state(&self, pool: Address) -> Result<PoolState, MarketError> {
        let conn = self.connection().await?;
        let pair = IUniswapV2Pair::new(pool, conn.client());
        let reserves_call = pair.get_reserves();
        let token0_call = pair.token_0();
        let token1_call = pair.token_1();

        let ((reserve0, reserve1, _), token0, token1) = futures::try_join!(
            self.timed("getReserves", reserves_call.call()),
            self.timed("token0", token0_call.call()),
            self.timed("token1", token1_call.call()),
        )
        .map_err(|e| self.contract_error(&conn, "getReserves", e))?;

        Ok(PoolState::ConstantProduct {
            token0: address_to_string(token0),
            token1: address_to_string(token1),
            reserve0: reserve0.into(),
            reserve1: reserve1.into(),
        })
    }

    async fn concentrated_state(&self, pool: Address) -> Result<PoolState, MarketError> {
        let conn = self.connection().await?;
        let v3 = IUniswapV3Pool::new(pool, conn.client());
        let slot0_call = v3.slot_0();
        let liquidity_call = v3.liquidity();
        let token0_call = v3.token_0();
        let token1_call = v3.token_1();

        let ((sqrt_price_x96, tick, ..), liquidity, token0, token1) = futures::try_join!(
            self.timed("slot0", slot0_call.call()),
            self.timed("liquidity", liquidity_call.call()),
            self.timed("token0", token0_call.call()),
            self.timed("token1", token1_call.call()),
        )
        .map_err(|e| self.contract_error(&conn, "slot0", e))?;

        validate_slot0(sqrt_price_x96, tick)
            .map_err(|detail| MarketError::data_shape(format!("{} slot0 {:?}", self.network, pool), detail))?;

        Ok(PoolState::Concentrated {
            token0: address_to_string(token0),
            token1: address_to_string(token1),
            sqrt_price_x96,
            tick,
            liquidity,
        })
    }
}

#[async_trait]
impl ChainReader for EvmReader {
    fn network(&self) -> NetworkId {
        self.network
    }

    async fn get_balance(&self, address: &str) -> Result<Amount, MarketError> {
        let address = string_to_address(address)?;
        let conn = self.connection().await?;
        let client = conn.client();
        let balance = self
            .timed("eth_getBalance", client.get_balance(address, None))
            .await
            .map_err(|e| self.transport_error(&conn, "eth_getBalance", e))?;
        Ok(Amount::new(balance, 18))
    }

    async fn get_token_balance(&self, token: &str, owner: &str) -> Result<Amount, MarketError> {
        let token = string_to_address(token)?;
        let owner = string_to_address(owner)?;
        let conn = self.connection().await?;

        let erc20 = Erc20::new(token, conn.client());
        let balance_call = erc20.balance_of(owner);
        let (balance, (decimals, _)) = futures::try_join!(
            async {
                self.timed("balanceOf", balance_call.call())
                    .await
                    .map_err(|e| self.contract_error(&conn, "balanceOf", e))
            },
            self.token_info(&conn, token),
        )?;
        Ok(Amount::new(balance, decimals))
    }

    async fn get_token_metadata(&self, token: &str) -> Result<TokenMetadata, MarketError> {
        let token = string_to_address(token)?;
        let conn = self.connection().await?;

        let erc20 = Erc20::new(token, conn.client());
        let supply_call = erc20.total_supply();
        let (total_supply, (decimals, symbol)) = futures::try_join!(
            async {
                self.timed("totalSupply", supply_call.call())
                    .await
                    .map_err(|e| self.contract_error(&conn, "totalSupply", e))
            },
            self.token_info(&conn, token),
        )?;

        Ok(TokenMetadata {
            decimals,
            symbol,
            total_supply: Amount::new(total_supply, decimals),
        })
    }

    async fn get_pool_state(&self, pool: &str) -> Result<PoolState, MarketError> {
        let pool = string_to_address(pool)?;
        let known = self.pool_kinds.get(&pool).map(|kind| *kind);

        match known {
            Some(PoolKind::ConstantProduct) => self.constant_product_state(pool).await,
            Some(PoolKind::Concentrated) => self.concentrated_state(pool).await,
            None => match self.constant_product_state(pool).await {
                Ok(state) => {
                    self.pool_kinds.insert(pool, PoolKind::ConstantProduct);
                    Ok(state)
                }
                Err(MarketError::DataShape { detail, .. }) => {
                    debug!("[{}] {:?} is not a V2 pair ({}), trying slot0", self.network, pool, detail);
                    let state = self.concentrated_state(pool).await?;
                    self.pool_kinds.insert(pool, PoolKind::Concentrated);
                    Ok(state)
                }
                Err(e) => Err(e),
            },
        }
    }

    async fn call_raw(
        &self,
        target: &str,
        method: &str,
        args: &[String],
    ) -> Result<serde_json::Value, MarketError> {
        let to = string_to_address(target)?;
        let function = AbiParser::default()
            .parse_function(method)
            .map_err(|e| MarketError::InvalidInput(format!("bad method descriptor {:?}: {}", method, e)))?;

        if function.inputs.len() != args.len() {
            return Err(MarketError::InvalidInput(format!(
                "{} expects {} arguments, got {}",
                function.name,
                function.inputs.len(),
                args.len()
            )));
        }

        let tokens = function
            .inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                LenientTokenizer::tokenize(&param.kind, arg)
                    .map_err(|e| MarketError::InvalidInput(format!("argument {}={:?}: {}", param.name, arg, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let data = function
            .encode_input(&tokens)
            .map_err(|e| MarketError::InvalidInput(e.to_string()))?;

        let conn = self.connection().await?;
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        let client = conn.client();
        let raw = self
            .timed("eth_call", client.call(&tx, None))
            .await
            .map_err(|e| self.transport_error(&conn, &function.name, e))?;

        let decoded = function
            .decode_output(&raw)
            .map_err(|e| MarketError::data_shape(format!("{} {}", self.network, function.name), e))?;

        Ok(serde_json::Value::Array(decoded.iter().map(token_to_json).collect()))
    }
}

/// Scalars become strings (uints and ints in decimal, addresses and bytes
/// 0x-prefixed); arrays and tuples become nested arrays.
fn token_to_json(token: &Token) -> serde_json::Value {
    use serde_json::Value;
    match token {
        Token::Address(addr) => Value::String(address_to_string(*addr)),
        Token::Uint(value) => Value::String(value.to_string()),
        Token::Int(value) => Value::String(I256::from_raw(*value).to_string()),
        Token::Bool(flag) => Value::String(flag.to_string()),
        Token::String(text) => Value::String(text.clone()),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => {
            Value::Array(items.iter().map(token_to_json).collect())
        }
    }
}
