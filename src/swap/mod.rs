//! Swap orchestration over an open liquidity aggregator
//!
//! Unlike the bridge, the swap side works against an open set of
//! currencies and networks declared by a third-party aggregator. The
//! aggregator contract is fixed here as a trait; [`api::HttpSwapAggregator`]
//! is the REST implementation.

pub mod api;
mod orchestrator;
mod status;

pub use orchestrator::{
    SwapFields, SwapOrchestrator, SwapOrchestratorParams, SwapOutcome, DEFAULT_CURRENCY_DECIMALS,
};
pub use status::{SwapStatus, SwapStatusResponse, SwapStatusService};

use crate::types::ChainTag;
use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};

/// A tradable unit as known to the aggregator, optionally resolved to a
/// local chain and token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapCurrency {
    /// Aggregator-side identity, `"{ticker}:{network}"`
    pub id: String,
    pub ticker: String,
    pub symbol: String,
    pub name: String,
    /// The aggregator's network identifier, which may or may not map to a
    /// chain this wallet knows
    pub network: String,
    /// Contract hash, when resolved to a local token
    pub hash: Option<String>,
    pub decimals: Option<u32>,
    /// The local chain this currency resolved to, if any
    pub chain: Option<ChainTag>,
    pub has_extra_id: bool,
    /// Regular expression a destination address must match
    pub validation_address: String,
    /// Regular expression an extra-id must match, when the currency uses one
    pub validation_extra: Option<String>,
}

impl SwapCurrency {
    pub fn matches(&self, other: &SwapCurrency) -> bool {
        self.id == other.id
    }
}

/// Aggregator-quoted transferable range, already adjusted to the token's
/// precision by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRange {
    pub min: String,
    /// Aggregators quote no maximum for deep pairs
    pub max: Option<String>,
}

/// Parameters for creating an exchange with the aggregator
#[derive(Debug, Clone)]
pub struct CreateExchangeParams {
    pub currency_from: SwapCurrency,
    pub currency_to: SwapCurrency,
    pub amount: String,
    /// Where the aggregator refunds if the exchange fails
    pub refund_address: String,
    pub address: String,
    pub extra_id: Option<String>,
}

/// A created exchange: funds sent to `deposit_address` trigger it
#[derive(Debug, Clone)]
pub struct CreatedExchange {
    pub id: String,
    pub deposit_address: String,
    /// Raw aggregator response, kept for support tooling
    pub log: Option<String>,
}

/// Point-in-time state of an exchange
#[derive(Debug, Clone)]
pub struct ExchangeInfo {
    /// Aggregator-native status string
    pub status: String,
    pub tx_from: Option<String>,
    pub tx_to: Option<String>,
    pub log: Option<String>,
}

/// The third-party liquidity aggregator boundary
#[async_trait]
pub trait SwapAggregator: Send + Sync {
    /// Full currency catalog
    async fn currencies(&self) -> Result<Vec<SwapCurrency>>;

    /// Currencies tradable against `ticker` on `network`
    async fn pairs(&self, ticker: &str, network: &str) -> Result<Vec<SwapCurrency>>;

    /// Quoted min/max for a pair, in the source currency
    async fn range(&self, from: &SwapCurrency, to: &SwapCurrency) -> Result<SwapRange>;

    /// Estimated receive amount for swapping `amount` of `from`
    async fn estimate(&self, from: &SwapCurrency, to: &SwapCurrency, amount: &str)
        -> Result<String>;

    async fn create_exchange(&self, params: CreateExchangeParams) -> Result<CreatedExchange>;

    async fn exchange(&self, id: &str) -> Result<ExchangeInfo>;
}
