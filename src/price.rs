//! Token price sources
//!
//! Price retrieval is an external concern; this module only fixes the
//! strategy seam. [`FallbackPriceSource`] composes two sources by explicit
//! delegation: the primary is tried first and its failure is logged before
//! the secondary is consulted.

use crate::types::Token;
use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// A token price in a reference currency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPrice {
    pub token_hash: String,
    pub symbol: String,
    /// Price in the requested currency, as a decimal string
    pub price: String,
    pub currency: String,
}

/// Strategy interface for price retrieval
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn token_prices(&self, tokens: &[Token], currency: &str) -> Result<Vec<TokenPrice>>;
}

/// Primary-then-secondary price retrieval
pub struct FallbackPriceSource {
    primary: Arc<dyn PriceSource>,
    secondary: Arc<dyn PriceSource>,
}

impl FallbackPriceSource {
    pub fn new(primary: Arc<dyn PriceSource>, secondary: Arc<dyn PriceSource>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl PriceSource for FallbackPriceSource {
    async fn token_prices(&self, tokens: &[Token], currency: &str) -> Result<Vec<TokenPrice>> {
        match self.primary.token_prices(tokens, currency).await {
            Ok(prices) => Ok(prices),
            Err(error) => {
                warn!(%error, "primary price source failed, delegating to secondary");
                self.secondary.token_prices(tokens, currency).await
            }
        }
    }
}
