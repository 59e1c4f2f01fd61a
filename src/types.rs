//! Common types for multi-chain wallet operations
//!
//! Shared across the bridge and swap orchestrators and the collaborator
//! trait boundaries: chain binding, tokens, accounts, balances, and the
//! parameter structs handed to chain/bridge services.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Chain binding
// ============================================================================

/// Identifies the chain a token, account, or service is bound to.
///
/// Chains are identified by the registered service name (e.g. `"neo3"`,
/// `"neox"`), not by a numeric network id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainTag(String);

impl ChainTag {
    pub fn new(name: impl Into<String>) -> Self {
        ChainTag(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainTag {
    fn from(name: &str) -> Self {
        ChainTag(name.to_string())
    }
}

// ============================================================================
// Tokens and accounts
// ============================================================================

/// Lowercase a contract hash and ensure the `0x` prefix, so hashes compare
/// equal regardless of how an upstream API spells them
pub fn normalize_token_hash(hash: &str) -> String {
    let prefixed = if hash.starts_with("0x") || hash.starts_with("0X") {
        hash.to_string()
    } else {
        format!("0x{hash}")
    };
    prefixed.to_lowercase()
}

/// A token as known to one chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub name: String,
    pub hash: String,
    pub decimals: u32,
    pub chain: ChainTag,
}

impl Token {
    /// Identity predicate: normalized hash first, case-insensitive symbol as
    /// a fallback
    pub fn matches(&self, other: &Token) -> bool {
        if self.matches_hash(&other.hash) {
            return true;
        }
        self.symbol.eq_ignore_ascii_case(&other.symbol)
    }

    /// Strict identity predicate on the normalized hash only
    pub fn matches_hash(&self, hash: &str) -> bool {
        normalize_token_hash(&self.hash) == normalize_token_hash(hash)
    }
}

/// A token eligible for bridging, paired with its mirrored representation on
/// the other chain through `pair_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeToken {
    #[serde(flatten)]
    pub token: Token,
    /// Shared identifier linking a token to its counterpart on the paired
    /// chain
    pub pair_id: String,
}

impl BridgeToken {
    pub fn matches(&self, other: &BridgeToken) -> bool {
        self.token.matches(&other.token)
    }
}

/// An account on one chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub key: String,
    pub chain: ChainTag,
    #[serde(default)]
    pub is_hardware: bool,
}

impl Account {
    /// Identity predicate: same address on the same chain
    pub fn matches(&self, other: &Account) -> bool {
        self.address == other.address && self.chain == other.chain
    }
}

/// A balance entry as returned by a chain's data service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub token: Token,
    /// Major-unit amount as a decimal string
    pub amount: String,
}

// ============================================================================
// Bridge parameters
// ============================================================================

/// Per-token constants declared by the bridge service. Not cached;
/// revalidated on every balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConstants {
    pub fee: BigDecimal,
    pub min_amount: BigDecimal,
    pub max_amount: BigDecimal,
}

/// One transfer leg: amount of a token to a receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferIntent {
    pub amount: String,
    pub receiver_address: String,
    pub token_hash: String,
    pub token_decimals: u32,
}

/// Parameters for a chain transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferParams {
    pub sender: Account,
    pub intents: Vec<TransferIntent>,
}

/// Parameters for executing a bridge operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeParams {
    pub account: Account,
    pub token: BridgeToken,
    pub amount: String,
    pub receiver_address: String,
    pub bridge_fee: String,
}

/// Parameters for probing the approval fee of a bridge operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalFeeParams {
    pub account: Account,
    pub token: BridgeToken,
    pub amount: String,
}
