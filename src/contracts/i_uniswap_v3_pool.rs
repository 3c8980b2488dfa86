use ethers::prelude::abigen;
use ethers::types::U256;

// Tipos EXACTOS del contrato de Solidity: uint160 sqrtPriceX96, int24 tick,
// uint128 liquidity. Cualquier desviación rompe la decodificación en silencio.
abigen!(
    IUniswapV3Pool,
    r#"[
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked)
        function liquidity() external view returns (uint128)
        function token0() external view returns (address)
        function token1() external view returns (address)
    ]"#
);

pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

/// Rejects slot0 values no initialized pool can report.
pub fn validate_slot0(sqrt_price_x96: U256, tick: i32) -> Result<(), String> {
    if sqrt_price_x96.is_zero() {
        return Err("sqrtPriceX96 is zero (pool not initialized)".to_string());
    }
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(format!("tick {} outside [{}, {}]", tick, MIN_TICK, MAX_TICK));
    }
    Ok(())
}
