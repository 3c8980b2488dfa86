// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!("rpc_calls_total", Unit::Count, "Read calls issued, labeled by network and method.");
    describe_histogram!("rpc_call_latency_ms", Unit::Milliseconds, "Latency of read calls in milliseconds.");
    describe_counter!(
        "connection_probe_failures_total",
        Unit::Count,
        "Liveness probes that failed or timed out, labeled by network and endpoint."
    );
    describe_counter!(
        "connection_failover_total",
        Unit::Count,
        "Connections established on the backup endpoint after the primary failed."
    );
    describe_counter!("cache_hits_total", Unit::Count, "Cache hits, labeled by cache.");
    describe_counter!("cache_miss_total", Unit::Count, "Cache misses, labeled by cache.");
    describe_counter!(
        "network_degraded_total",
        Unit::Count,
        "Networks dropped from a TVL refresh or a price request, labeled by lookup."
    );
    describe_gauge!("network_tvl_usd", "Last published TVL per network (USD).");
    describe_gauge!("weighted_price_usd", "Last TVL-weighted token price (USD).");
}

// --- Helper functions to update metrics ---

pub fn increment_rpc_call(network: &str, method: &str) {
    counter!("rpc_calls_total", 1, "network" => network.to_string(), "method" => method.to_string());
}

pub fn record_rpc_call_latency(network: &str, method: &str, duration: std::time::Duration) {
    histogram!("rpc_call_latency_ms", duration.as_millis() as f64,
               "network" => network.to_string(),
               "method" => method.to_string());
}

pub fn increment_probe_failure(network: &str, endpoint: &str) {
    counter!("connection_probe_failures_total", 1, "network" => network.to_string(), "endpoint" => endpoint.to_string());
}

pub fn increment_failover(network: &str) {
    counter!("connection_failover_total", 1, "network" => network.to_string());
}

pub fn increment_cache_hit(cache_name: &str) {
    counter!("cache_hits_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_miss(cache_name: &str) {
    counter!("cache_miss_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_network_degraded(lookup: &str, network: &str, reason: &str) {
    counter!(
        "network_degraded_total",
        1,
        "lookup" => lookup.to_string(),
        "network" => network.to_string(),
        "reason" => reason.to_string()
    );
}

pub fn set_network_tvl(network: &str, value: f64) {
    gauge!("network_tvl_usd", value, "network" => network.to_string());
}

pub fn set_weighted_price(value: f64) {
    gauge!("weighted_price_usd", value);
}
