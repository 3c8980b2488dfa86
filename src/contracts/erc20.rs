use ethers::prelude::abigen;

// Interfaz de lectura ERC-20 (solo view functions)
abigen!(
    Erc20,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
        function decimals() external view returns (uint8)
        function symbol() external view returns (string)
        function totalSupply() external view returns (uint256)
    ]"#
);
