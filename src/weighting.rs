//! TVL weighting and price blending.
//!
//! Pure functions, no I/O: TVL map -> weight map -> weighted price, market
//! cap and fully diluted valuation.

use crate::types::network::{NetworkId, PerNetwork};
use crate::types::snapshot::{Valuation, WeightMap};
use log::debug;

/// Equal share used when TVL cannot discriminate between networks.
pub const EQUAL_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
enum WeightComputationError {
    #[error("total TVL is not positive: {0}")]
    NonPositiveTotal(f64),
    #[error("total TVL is not finite")]
    NonFiniteTotal,
}

fn proportional_weights(tvl: &PerNetwork<f64>) -> Result<WeightMap, WeightComputationError> {
    // Valores negativos o NaN no aportan peso
    let sanitized = tvl.map(|_, v| if v.is_finite() && *v > 0.0 { *v } else { 0.0 });
    let total = sanitized.sum();

    if !total.is_finite() {
        return Err(WeightComputationError::NonFiniteTotal);
    }
    if total <= 0.0 {
        return Err(WeightComputationError::NonPositiveTotal(total));
    }
    Ok(sanitized.map(|_, v| v / total))
}

/// `tvl[n] / total`, or 0.25 everywhere when the total is not positive.
pub fn calculate_tvl_weights(tvl: &PerNetwork<f64>) -> WeightMap {
    proportional_weights(tvl).unwrap_or_else(|e| {
        debug!("Falling back to equal weights: {}", e);
        PerNetwork::splat(EQUAL_WEIGHT)
    })
}

/// Same as [`calculate_tvl_weights`], but `excluded` networks always weigh 0
/// and the equal-share fallback is split among the remaining ones.
pub fn calculate_tvl_weights_excluding(tvl: &PerNetwork<f64>, excluded: &[NetworkId]) -> WeightMap {
    let eligible = tvl.map(|network, v| if excluded.contains(&network) { 0.0 } else { *v });
    proportional_weights(&eligible).unwrap_or_else(|e| {
        let remaining = NetworkId::ALL.iter().filter(|n| !excluded.contains(n)).count();
        if remaining == 0 {
            return PerNetwork::splat(EQUAL_WEIGHT);
        }
        debug!("Falling back to equal weights over {} networks: {}", remaining, e);
        let share = 1.0 / remaining as f64;
        PerNetwork::from_fn(|network| if excluded.contains(&network) { 0.0 } else { share })
    })
}

/// Σ price[n] × weight[n] (weights are used as given, no renormalization).
pub fn weighted_price(prices: &PerNetwork<f64>, weights: &WeightMap) -> f64 {
    prices.iter().map(|(network, price)| price * weights[network]).sum()
}

pub fn compute_weighted_price(
    prices: &PerNetwork<f64>,
    weights: &WeightMap,
    circulating_supply: f64,
    total_supply: f64,
) -> Valuation {
    let weighted_price = weighted_price(prices, weights);
    Valuation {
        weighted_price,
        market_cap: weighted_price * circulating_supply,
        fully_diluted_valuation: weighted_price * total_supply,
    }
}
