//! Integration tests for the EVM reader against a mocked JSON-RPC node
//!
//! Tests cover:
//! - Failover from a dead primary endpoint to the backup
//! - ERC-20 metadata and the per-token decimals/symbol cache
//! - Pool kind detection (getReserves first, slot0 fallback)
//! - call_raw encoding/decoding
//! - Connectivity errors after retries

use ethers::abi::{self, Token};
use ethers::types::{Address, U256};
use ethers::utils::hex;
use multichain_market_sdk::chain_reader::ChainReader;
use multichain_market_sdk::connection_manager::{ConnectionManager, EndpointRole, Endpoints, EthersConnector};
use multichain_market_sdk::evm_reader::EvmReader;
use multichain_market_sdk::retry::RetryPolicy;
use multichain_market_sdk::types::{PoolKind, PoolState};
use multichain_market_sdk::{MarketError, NetworkId};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TOKEN: &str = "0x1111111111111111111111111111111111111111";
const WETH: &str = "0x4200000000000000000000000000000000000006";
const V2_PAIR: &str = "0x2222222222222222222222222222222222222222";
const V3_POOL: &str = "0x3333333333333333333333333333333333333333";

// 4-byte selectors
const DECIMALS: &str = "313ce567";
const SYMBOL: &str = "95d89b41";
const TOTAL_SUPPLY: &str = "18160ddd";
const BALANCE_OF: &str = "70a08231";
const GET_RESERVES: &str = "0902f1ac";
const TOKEN0: &str = "0dfe1681";
const TOKEN1: &str = "d21220a7";
const SLOT0: &str = "3850c7bd";
const LIQUIDITY: &str = "1a686502";

fn encoded(tokens: &[Token]) -> String {
    format!("0x{}", hex::encode(abi::encode(tokens)))
}

fn address(raw: &str) -> Address {
    Address::from_str(raw).unwrap()
}

/// Minimal JSON-RPC node: answers eth_blockNumber, eth_getBalance and
/// eth_call by (target, selector). Unknown calls return empty data.
struct JsonRpcNode {
    calls: Vec<(Option<&'static str>, &'static str, String)>,
}

impl JsonRpcNode {
    fn erc20_and_pools() -> Self {
        let mut calls = vec![
            (Some(TOKEN), DECIMALS, encoded(&[Token::Uint(U256::from(6))])),
            (Some(TOKEN), SYMBOL, encoded(&[Token::String("TKN".to_string())])),
            (
                Some(TOKEN),
                TOTAL_SUPPLY,
                encoded(&[Token::Uint(U256::from(1_000_000u64) * U256::exp10(6))]),
            ),
            (Some(TOKEN), BALANCE_OF, encoded(&[Token::Uint(U256::from(42_500_000u64))])),
            (
                Some(V2_PAIR),
                GET_RESERVES,
                encoded(&[
                    Token::Uint(U256::from(1_000u64)),
                    Token::Uint(U256::from(2_000u64)),
                    Token::Uint(U256::from(1_700_000_000u64)),
                ]),
            ),
            (
                Some(V3_POOL),
                SLOT0,
                encoded(&[
                    Token::Uint(U256::from(2u8).pow(U256::from(96u8))),
                    Token::Int(U256::zero()),
                    Token::Uint(U256::one()),
                    Token::Uint(U256::one()),
                    Token::Uint(U256::one()),
                    Token::Uint(U256::zero()),
                    Token::Bool(true),
                ]),
            ),
            (Some(V3_POOL), LIQUIDITY, encoded(&[Token::Uint(U256::from(123_456u64))])),
        ];
        // Ambos pools emparejan TOKEN (token0) con WETH (token1)
        for pool in [V2_PAIR, V3_POOL] {
            calls.push((Some(pool), TOKEN0, encoded(&[Token::Address(address(TOKEN))])));
            calls.push((Some(pool), TOKEN1, encoded(&[Token::Address(address(WETH))])));
        }
        Self { calls }
    }

    fn eth_call(&self, params: &Value) -> String {
        let call = params[0].to_string().to_lowercase();
        self.calls
            .iter()
            .find(|(target, selector, _)| {
                call.contains(selector) && target.map_or(true, |t| call.contains(&t.to_lowercase()))
            })
            .map(|(_, _, output)| output.clone())
            .unwrap_or_else(|| "0x".to_string())
    }
}

impl Respond for JsonRpcNode {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let result = match body["method"].as_str() {
            Some("eth_blockNumber") => json!("0x1234"),
            Some("eth_getBalance") => json!("0xde0b6b3a7640000"),
            Some("eth_call") => json!(self.eth_call(&body["params"])),
            other => panic!("unexpected method {:?}", other),
        };
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": body["id"],
            "result": result,
        }))
    }
}

async fn dead_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    server
}

async fn live_node() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(JsonRpcNode::erc20_and_pools())
        .mount(&server)
        .await;
    server
}

fn manager(primary: &MockServer, backup: &MockServer) -> Arc<ConnectionManager> {
    let endpoints = HashMap::from([(
        NetworkId::Base,
        Endpoints {
            primary: primary.uri(),
            backup: backup.uri(),
        },
    )]);
    Arc::new(
        ConnectionManager::new(
            EthersConnector::new(Duration::from_secs(2)),
            endpoints,
            Duration::from_secs(2),
            1_000,
        )
        .unwrap(),
    )
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1))
}

async fn calls_with_selector(server: &MockServer, selector: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|req| String::from_utf8_lossy(&req.body).contains(selector))
        .count()
}

#[tokio::test]
async fn test_failover_to_backup_and_token_metadata() {
    let primary = dead_server().await;
    let backup = live_node().await;
    let manager = manager(&primary, &backup);
    let reader = EvmReader::new(NetworkId::Base, manager.clone(), fast_retry());

    let metadata = reader.get_token_metadata(TOKEN).await.unwrap();
    assert_eq!(metadata.decimals, 6);
    assert_eq!(metadata.symbol, "TKN");
    assert_eq!(metadata.total_supply.to_f64(), 1_000_000.0);

    let conn = manager.cached(NetworkId::Base).unwrap();
    assert_eq!(conn.role(), EndpointRole::Backup);
    assert_eq!(conn.head_block(), 0x1234);
}

#[tokio::test]
async fn test_decimals_and_symbol_cached_supply_reread() {
    let node = live_node().await;
    let reader = EvmReader::new(NetworkId::Base, manager(&node, &node), fast_retry());

    reader.get_token_metadata(TOKEN).await.unwrap();
    reader.get_token_metadata(TOKEN).await.unwrap();
    let balance = reader.get_token_balance(TOKEN, WETH).await.unwrap();
    assert_eq!(balance.to_f64(), 42.5);

    assert_eq!(calls_with_selector(&node, DECIMALS).await, 1);
    assert_eq!(calls_with_selector(&node, SYMBOL).await, 1);
    assert_eq!(calls_with_selector(&node, TOTAL_SUPPLY).await, 2);
}

#[tokio::test]
async fn test_native_balance() {
    let node = live_node().await;
    let reader = EvmReader::new(NetworkId::Base, manager(&node, &node), fast_retry());

    let balance = reader.get_balance(WETH).await.unwrap();
    assert_eq!(balance.decimals, 18);
    assert_eq!(balance.to_f64(), 1.0);
}

#[tokio::test]
async fn test_registered_constant_product_pool() {
    let node = live_node().await;
    let reader = EvmReader::new(NetworkId::Base, manager(&node, &node), fast_retry())
        .with_pool_kind(address(V2_PAIR), PoolKind::ConstantProduct);

    match reader.get_pool_state(V2_PAIR).await.unwrap() {
        PoolState::ConstantProduct {
            token0,
            token1,
            reserve0,
            reserve1,
        } => {
            assert_eq!(token0, TOKEN);
            assert_eq!(token1, WETH);
            assert_eq!(reserve0, U256::from(1_000u64));
            assert_eq!(reserve1, U256::from(2_000u64));
        }
        other => panic!("expected constant product state, got {:?}", other),
    }
    assert_eq!(calls_with_selector(&node, SLOT0).await, 0);
}

#[tokio::test]
async fn test_unregistered_pool_falls_back_to_slot0() {
    let node = live_node().await;
    let reader = EvmReader::new(NetworkId::Base, manager(&node, &node), fast_retry());

    match reader.get_pool_state(V3_POOL).await.unwrap() {
        PoolState::Concentrated {
            sqrt_price_x96,
            tick,
            liquidity,
            token1,
            ..
        } => {
            assert_eq!(sqrt_price_x96, U256::from(2u8).pow(U256::from(96u8)));
            assert_eq!(tick, 0);
            assert_eq!(liquidity, 123_456);
            assert_eq!(token1, WETH);
        }
        other => panic!("expected concentrated state, got {:?}", other),
    }

    // Detected kind is remembered: no second getReserves probe
    reader.get_pool_state(V3_POOL).await.unwrap();
    assert_eq!(calls_with_selector(&node, GET_RESERVES).await, 1);
}

#[tokio::test]
async fn test_call_raw_decodes_outputs() {
    let node = live_node().await;
    let reader = EvmReader::new(NetworkId::Base, manager(&node, &node), fast_retry());

    let out = reader
        .call_raw(
            TOKEN,
            "function balanceOf(address owner) view returns (uint256)",
            &[WETH.to_string()],
        )
        .await
        .unwrap();
    assert_eq!(out, json!(["42500000"]));

    let err = reader
        .call_raw(TOKEN, "function balanceOf(address owner) view returns (uint256)", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidInput(_)));
}

#[tokio::test]
async fn test_invalid_address_is_invalid_input() {
    let node = live_node().await;
    let reader = EvmReader::new(NetworkId::Base, manager(&node, &node), fast_retry());

    let err = reader.get_token_metadata("not-an-address").await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidInput(_)));
}

#[tokio::test]
async fn test_both_endpoints_down_is_connectivity_error() {
    let primary = dead_server().await;
    let backup = dead_server().await;
    let reader = EvmReader::new(NetworkId::Base, manager(&primary, &backup), fast_retry());

    let err = reader.get_token_metadata(TOKEN).await.unwrap_err();
    match err {
        MarketError::Connectivity { network, .. } => assert_eq!(network, NetworkId::Base),
        other => panic!("expected connectivity error, got {:?}", other),
    }
    // Dos intentos, cada uno prueba primary y backup
    assert_eq!(primary.received_requests().await.unwrap().len(), 2);
    assert_eq!(backup.received_requests().await.unwrap().len(), 2);
}
