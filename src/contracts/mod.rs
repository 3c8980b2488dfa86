// Contracts Module - read-only ABIs

pub mod erc20;
pub mod i_uniswap_v2_pair;
pub mod i_uniswap_v3_pool;

pub use erc20::Erc20;
pub use i_uniswap_v2_pair::IUniswapV2Pair;
pub use i_uniswap_v3_pool::IUniswapV3Pool;
