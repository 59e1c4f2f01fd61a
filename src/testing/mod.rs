//! Mock collaborators for tests
//!
//! In-memory implementations of the chain, bridge, and aggregator
//! boundaries with call counters and failure switches, plus ready-made
//! fixtures for a two-chain bridge pair and a one-chain swap setup.

mod mock_bridge;
mod mock_chain;
mod mock_swap;

pub use mock_bridge::MockBridgeChain;
pub use mock_chain::MockChainService;
pub use mock_swap::MockSwapAggregator;

use crate::services::ChainService;
use crate::swap::{SwapOrchestrator, SwapOrchestratorParams};
use crate::types::{BridgeToken, ChainTag, Token};
use std::collections::HashMap;
use std::sync::Arc;

pub const NEO3_GAS_HASH: &str = "0xd2a4cff31913016155e38e474a2c06d08be276cf";
pub const NEO3_NEO_HASH: &str = "0xef4073a0f2b305a38ec4050e4d3d28bc40ea63f5";
pub const NEOX_GAS_HASH: &str = "0x10a1de3cfd2b6c2da5d37c63e9aa0a0b1e7f5f0c";
pub const NEOX_NEO_HASH: &str = "0x9a1f3e8d0c4b72e6a5503d9b61f08f3ce1a24b77";

/// A GAS-like bridgeable token (8 decimals, the fee token) on `chain`
pub fn gas_token(chain: &str) -> BridgeToken {
    let hash = if chain == "neox" { NEOX_GAS_HASH } else { NEO3_GAS_HASH };
    BridgeToken {
        token: Token {
            symbol: "GAS".to_string(),
            name: "GAS".to_string(),
            hash: hash.to_string(),
            decimals: 8,
            chain: ChainTag::from(chain),
        },
        pair_id: "gas".to_string(),
    }
}

/// A NEO-like bridgeable token (0 decimals) on `chain`
pub fn neo_token(chain: &str) -> BridgeToken {
    let hash = if chain == "neox" { NEOX_NEO_HASH } else { NEO3_NEO_HASH };
    BridgeToken {
        token: Token {
            symbol: "NEO".to_string(),
            name: "NEO".to_string(),
            hash: hash.to_string(),
            decimals: 0,
            chain: ChainTag::from(chain),
        },
        pair_id: "neo".to_string(),
    }
}

/// A neo3/neox-style bridge pair sharing GAS and NEO as bridgeable tokens
pub fn mock_bridge_pair() -> (Arc<MockBridgeChain>, Arc<MockBridgeChain>) {
    (
        Arc::new(MockBridgeChain::new("neo3")),
        Arc::new(MockBridgeChain::new("neox")),
    )
}

/// A chain service carrying the GAS and NEO tokens of `chain`; passing a
/// fee makes the service advertise the fee-calculation capability
pub fn swap_chain_service(chain: &str, fee: Option<&str>) -> Arc<MockChainService> {
    Arc::new(MockChainService::new(
        chain,
        vec![gas_token(chain).token, neo_token(chain).token],
        gas_token(chain).token,
        fee,
    ))
}

/// A swap orchestrator over one known chain (neo3) and the standard mock
/// aggregator catalog, already initialized
pub async fn swap_setup() -> (
    SwapOrchestrator,
    Arc<MockSwapAggregator>,
    Arc<MockChainService>,
) {
    let chain = swap_chain_service("neo3", Some("0.0112"));
    let aggregator = Arc::new(MockSwapAggregator::standard());

    let mut services: HashMap<ChainTag, Arc<dyn ChainService>> = HashMap::new();
    services.insert(ChainTag::from("neo3"), chain.clone());
    let mut networks_by_chain: HashMap<ChainTag, Vec<String>> = HashMap::new();
    networks_by_chain.insert(ChainTag::from("neo3"), vec!["neo3".to_string()]);

    let orchestrator = SwapOrchestrator::new(SwapOrchestratorParams {
        aggregator: aggregator.clone(),
        services,
        networks_by_chain,
    });
    orchestrator.init().await.expect("mock catalog loads");

    (orchestrator, aggregator, chain)
}

/// Install a test subscriber honoring `RUST_LOG`; safe to call repeatedly
#[cfg(test)]
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
