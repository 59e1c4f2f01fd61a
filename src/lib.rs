//! Multiwallet-RS: Multi-Chain Wallet Abstraction
//!
//! This crate provides the cross-chain value-transfer core of a
//! multi-chain wallet:
//!
//! - **Bridge Orchestrator** - reactive state machine moving a token
//!   between a fixed pair of chains through a bridge service
//! - **Swap Orchestrator** - reactive state machine exchanging assets
//!   across an open set of chains through a liquidity aggregator
//! - **Observable Fields** - `{value, loading, error, valid}` snapshots
//!   published to subscribers on every change
//! - **Amount Engine** - arbitrary-precision decimal formatting, unit
//!   conversion, and range math
//! - **Confirmation Polling** - bounded fixed-delay retry with explicit
//!   timed-out outcomes
//! - **Collaborator Traits** - chain, bridge, aggregator, and price-feed
//!   boundaries implemented by per-chain adapter crates
//! - **Testing Module** - in-memory mock collaborators for tests
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! multiwallet-rs = { path = "../multiwallet-rs" }
//! ```
//!
//! Orchestrators must be driven from within a Tokio runtime: debounced
//! recomputation runs on spawned timer tasks.
//!
//! ## Feature Flags
//!
//! - `testing` - Enable the mock collaborators for downstream tests

pub mod bridge;
pub mod debounce;
pub mod decimal;
pub mod error;
pub mod observable;
pub mod price;
pub mod retry;
pub mod services;
pub mod swap;
pub mod types;

// Mock collaborators (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used items at the crate root
pub use bridge::{BridgeFields, BridgeMirror, BridgeOrchestrator, BridgeWaitParams};
pub use error::{ErrorCode, WalletError};
pub use observable::{LoadableValue, Observable, ObserverList, SubscriptionId, ValidatableValue};
pub use retry::{retry, wait_for, Confirmation, RetryOptions};
pub use services::{BridgeChainService, BridgeService, ChainService, FeeCalculator};
pub use swap::{
    SwapAggregator, SwapCurrency, SwapFields, SwapOrchestrator, SwapOrchestratorParams,
    SwapOutcome, SwapRange, SwapStatus, SwapStatusService,
};
pub use types::{
    Account, Balance, BridgeConstants, BridgeParams, BridgeToken, ChainTag, Token, TransferIntent,
    TransferParams,
};
