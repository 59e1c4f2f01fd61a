//! Collaborator trait boundaries
//!
//! The orchestrators never talk to a chain directly; they consume these
//! capability interfaces. Concrete adapters (per-chain signing, RPC,
//! balance retrieval) live outside this crate. All async methods return
//! `eyre::Result`; the orchestrators normalize failures into
//! [`crate::error::WalletError`] at the boundary.

use crate::types::{
    Account, ApprovalFeeParams, Balance, BridgeConstants, BridgeParams, BridgeToken, ChainTag,
    Token, TransferParams,
};
use async_trait::async_trait;
use eyre::Result;

/// Optional fee-calculation capability of a chain.
///
/// Probed via [`ChainService::fee_calculator`]; chains without it simply
/// report a zero fee.
#[async_trait]
pub trait FeeCalculator: Send + Sync {
    async fn calculate_transfer_fee(&self, params: &TransferParams) -> Result<String>;
}

/// One chain's wallet-facing capabilities
#[async_trait]
pub trait ChainService: Send + Sync {
    /// The chain this service is bound to
    fn chain(&self) -> &ChainTag;

    /// Tokens natively known to this chain
    fn tokens(&self) -> Vec<Token>;

    /// The token network/bridge fees are paid in
    fn fee_token(&self) -> Token;

    fn validate_address(&self, address: &str) -> bool;

    fn generate_account_from_key(&self, key: &str) -> Result<Account>;

    /// Balances of all known tokens held by `address`
    async fn balances(&self, address: &str) -> Result<Vec<Balance>>;

    /// Metadata of a token by contract hash
    async fn token_info(&self, hash: &str) -> Result<Token>;

    /// Submit a transfer; resolves to the transaction hashes, one per intent
    async fn transfer(&self, params: TransferParams) -> Result<Vec<String>>;

    /// Capability probe, `None` when the chain cannot estimate fees
    fn fee_calculator(&self) -> Option<&dyn FeeCalculator> {
        None
    }
}

/// The bridge-specific capabilities of a chain pair member
#[async_trait]
pub trait BridgeService: Send + Sync {
    /// The fixed set of bridgeable tokens declared on this side
    fn tokens(&self) -> Vec<BridgeToken>;

    /// Fee and min/max bounds for bridging `token`. Never cached by the
    /// orchestrator; refetched on every balance change.
    async fn bridge_constants(&self, token: &BridgeToken) -> Result<BridgeConstants>;

    /// Fee for the approval step, where the chain requires one
    async fn approval_fee(&self, params: ApprovalFeeParams) -> Result<String>;

    /// Execute the bridge operation; resolves to the source transaction hash
    async fn bridge(&self, params: BridgeParams) -> Result<String>;

    /// Nonce the source chain assigned to a submitted bridge transaction
    async fn nonce_by_transaction(&self, token: &BridgeToken, transaction_hash: &str)
        -> Result<String>;

    /// Hash of the mirrored transaction for a nonce on the destination chain
    async fn transaction_hash_by_nonce(&self, token: &BridgeToken, nonce: &str) -> Result<String>;
}

/// A chain service that also participates in a fixed bridge pair
pub trait BridgeChainService: ChainService {
    fn bridge_service(&self) -> &dyn BridgeService;
}
