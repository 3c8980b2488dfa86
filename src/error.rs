use crate::types::network::NetworkId;
use std::time::Duration;

/// Structured failures surfaced by readers, aggregators and the orchestrator.
///
/// Readers never fail with bare strings: the TVL aggregator relies on the
/// variant to tell connectivity problems apart from malformed responses.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MarketError {
    #[error("No reachable endpoint for {network} (primary: {primary}; backup: {backup})")]
    Connectivity {
        network: NetworkId,
        primary: String,
        backup: String,
    },
    #[error("HTTP {status} from {url}")]
    Api { status: u16, url: String },
    #[error("Unexpected response shape from {context}: {detail}")]
    DataShape { context: String, detail: String },
    #[error("RPC call {method} failed on {network}: {detail}")]
    Rpc {
        network: NetworkId,
        method: String,
        detail: String,
    },
    #[error("Request to {url} failed: {detail}")]
    Transport { url: String, detail: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MarketError {
    pub fn data_shape(context: impl Into<String>, detail: impl ToString) -> Self {
        MarketError::DataShape {
            context: context.into(),
            detail: detail.to_string(),
        }
    }

    /// Short label used for metrics and log lines
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::Connectivity { .. } => "connectivity",
            MarketError::Api { .. } => "api",
            MarketError::DataShape { .. } => "data_shape",
            MarketError::Rpc { .. } => "rpc",
            MarketError::Transport { .. } => "transport",
            MarketError::InvalidInput(_) => "invalid_input",
            MarketError::DeadlineExceeded(_) => "deadline",
            MarketError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for MarketError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        match e.status() {
            Some(status) => MarketError::Api {
                status: status.as_u16(),
                url,
            },
            None if e.is_decode() => MarketError::data_shape(url, e),
            None => MarketError::Transport {
                url,
                detail: e.to_string(),
            },
        }
    }
}
