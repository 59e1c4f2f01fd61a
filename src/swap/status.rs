//! Typed view over the aggregator's exchange lifecycle

use super::SwapAggregator;
use crate::error::{ErrorCode, WalletError};
use std::sync::Arc;

/// Exchange lifecycle as this wallet models it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStatus {
    /// Deposit seen or awaited, not yet exchanged
    Confirming,
    /// Aggregator is exchanging or sending the counter-asset
    Exchanging,
    Finished,
    Failed,
    Refunded,
}

impl SwapStatus {
    /// Map an aggregator-native status string; `None` for statuses this
    /// wallet does not know
    pub fn from_aggregator(raw: &str) -> Option<Self> {
        match raw {
            "waiting" | "confirming" => Some(SwapStatus::Confirming),
            "exchanging" | "sending" | "verifying" => Some(SwapStatus::Exchanging),
            "finished" => Some(SwapStatus::Finished),
            "expired" | "failed" => Some(SwapStatus::Failed),
            "refunded" => Some(SwapStatus::Refunded),
            _ => None,
        }
    }
}

/// Status of one exchange, with both legs' transaction hashes when known
#[derive(Debug, Clone)]
pub struct SwapStatusResponse {
    pub status: SwapStatus,
    pub tx_from: Option<String>,
    pub tx_to: Option<String>,
}

/// Polls the aggregator for exchange progress
pub struct SwapStatusService {
    aggregator: Arc<dyn SwapAggregator>,
}

impl SwapStatusService {
    pub fn new(aggregator: Arc<dyn SwapAggregator>) -> Self {
        Self { aggregator }
    }

    pub async fn status(&self, id: &str) -> Result<SwapStatusResponse, WalletError> {
        let info = self
            .aggregator
            .exchange(id)
            .await
            .map_err(WalletError::normalize)?;

        let status = SwapStatus::from_aggregator(&info.status).ok_or_else(|| {
            WalletError::new(
                ErrorCode::Unexpected,
                format!("unknown exchange status `{}`", info.status),
            )
        })?;

        Ok(SwapStatusResponse {
            status,
            tx_from: info.tx_from,
            tx_to: info.tx_to,
        })
    }
}
