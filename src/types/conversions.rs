use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use std::str::FromStr;

// Para cantidades on-chain que se exponen en la API (precisión exacta)
pub fn u256_to_decimal(value: U256, decimals: u8) -> Result<Decimal, ConversionError> {
    let mut decimal_value = Decimal::from_str(&value.to_string())
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;
    decimal_value
        .set_scale(decimals as u32)
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;
    Ok(decimal_value.normalize())
}

// Para cálculos de TVL/precio, donde f64 es suficiente y nunca desborda
pub fn u256_to_f64(value: U256, decimals: u8) -> f64 {
    let raw = value.to_string().parse::<f64>().unwrap_or(f64::MAX);
    raw / 10f64.powi(decimals as i32)
}

/// Price of token0 denominated in token1, from a Uniswap V3 style `sqrtPriceX96`.
pub fn sqrt_price_x96_to_price(sqrt_price_x96: U256, decimals0: u8, decimals1: u8) -> f64 {
    let sqrt = u256_to_f64(sqrt_price_x96, 0) / 2f64.powi(96);
    sqrt * sqrt * 10f64.powi(decimals0 as i32 - decimals1 as i32)
}

// Cosmos devuelve cantidades como strings decimales ("123456")
pub fn parse_integer_amount(raw: &str) -> Result<U256, ConversionError> {
    U256::from_dec_str(raw.trim()).map_err(|e| ConversionError::InvalidDecimal(format!("{}: {}", raw, e)))
}

// Para addresses
pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(format!("{}: {}", s, e)))
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl From<ConversionError> for crate::error::MarketError {
    fn from(e: ConversionError) -> Self {
        crate::error::MarketError::InvalidInput(e.to_string())
    }
}
