use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// One of the four networks the SDK aggregates over.
///
/// Used as the key of every per-network map. The three EVM networks share
/// the same reader implementation; Osmosis goes through the Cosmos REST reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Ethereum,
    Optimism,
    Base,
    Osmosis,
}

impl NetworkId {
    pub const ALL: [NetworkId; 4] = [
        NetworkId::Ethereum,
        NetworkId::Optimism,
        NetworkId::Base,
        NetworkId::Osmosis,
    ];

    pub const EVM: [NetworkId; 3] = [NetworkId::Ethereum, NetworkId::Optimism, NetworkId::Base];

    pub fn is_evm(&self) -> bool {
        !matches!(self, NetworkId::Osmosis)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkId::Ethereum => "ethereum",
            NetworkId::Optimism => "optimism",
            NetworkId::Base => "base",
            NetworkId::Osmosis => "osmosis",
        }
    }

    /// Prefix used for environment overrides (`SDK_ETHEREUM_PRIMARY_RPC_URL`, ...)
    pub fn env_prefix(&self) -> String {
        format!("SDK_{}", self.as_str().to_uppercase())
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(NetworkId::Ethereum),
            "optimism" | "op" => Ok(NetworkId::Optimism),
            "base" => Ok(NetworkId::Base),
            "osmosis" | "osmo" => Ok(NetworkId::Osmosis),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

/// Total map from `NetworkId` to `T`.
///
/// Every network always has a value, so snapshots built from it can never be
/// missing a key. Serializes as an object keyed by network name.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerNetwork<T> {
    pub ethereum: T,
    pub optimism: T,
    pub base: T,
    pub osmosis: T,
}

impl<T> PerNetwork<T> {
    pub fn from_fn(mut f: impl FnMut(NetworkId) -> T) -> Self {
        Self {
            ethereum: f(NetworkId::Ethereum),
            optimism: f(NetworkId::Optimism),
            base: f(NetworkId::Base),
            osmosis: f(NetworkId::Osmosis),
        }
    }

    pub fn splat(value: T) -> Self
    where
        T: Clone,
    {
        Self::from_fn(|_| value.clone())
    }

    pub fn get(&self, network: NetworkId) -> &T {
        match network {
            NetworkId::Ethereum => &self.ethereum,
            NetworkId::Optimism => &self.optimism,
            NetworkId::Base => &self.base,
            NetworkId::Osmosis => &self.osmosis,
        }
    }

    pub fn get_mut(&mut self, network: NetworkId) -> &mut T {
        match network {
            NetworkId::Ethereum => &mut self.ethereum,
            NetworkId::Optimism => &mut self.optimism,
            NetworkId::Base => &mut self.base,
            NetworkId::Osmosis => &mut self.osmosis,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NetworkId, &T)> {
        NetworkId::ALL.into_iter().map(move |n| (n, self.get(n)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(NetworkId, &T) -> U) -> PerNetwork<U> {
        PerNetwork::from_fn(|n| f(n, self.get(n)))
    }
}

impl PerNetwork<f64> {
    pub fn sum(&self) -> f64 {
        self.iter().map(|(_, v)| *v).sum()
    }
}

impl<T> Index<NetworkId> for PerNetwork<T> {
    type Output = T;

    fn index(&self, network: NetworkId) -> &T {
        self.get(network)
    }
}

impl<T> IndexMut<NetworkId> for PerNetwork<T> {
    fn index_mut(&mut self, network: NetworkId) -> &mut T {
        self.get_mut(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parse_and_display() {
        assert_eq!("Ethereum".parse::<NetworkId>().unwrap(), NetworkId::Ethereum);
        assert_eq!("op".parse::<NetworkId>().unwrap(), NetworkId::Optimism);
        assert_eq!("osmo".parse::<NetworkId>().unwrap(), NetworkId::Osmosis);
        assert!("solana".parse::<NetworkId>().is_err());
        assert_eq!(NetworkId::Base.to_string(), "base");
        assert_eq!(NetworkId::Optimism.env_prefix(), "SDK_OPTIMISM");
    }

    #[test]
    fn test_only_osmosis_is_not_evm() {
        let evm: Vec<_> = NetworkId::ALL.iter().filter(|n| n.is_evm()).copied().collect();
        assert_eq!(evm, NetworkId::EVM.to_vec());
    }

    #[test]
    fn test_per_network_index_and_sum() {
        let mut tvl = PerNetwork::splat(1.5);
        tvl[NetworkId::Osmosis] = 4.0;
        assert_eq!(tvl.osmosis, 4.0);
        assert_eq!(tvl.sum(), 8.5);

        let doubled = tvl.map(|_, v| v * 2.0);
        assert_eq!(doubled[NetworkId::Ethereum], 3.0);
    }

    #[test]
    fn test_per_network_serializes_all_keys() {
        let value = serde_json::to_value(PerNetwork::splat(0.0)).unwrap();
        let obj = value.as_object().unwrap();
        for network in NetworkId::ALL {
            assert!(obj.contains_key(network.as_str()), "missing {}", network);
        }
    }
}
