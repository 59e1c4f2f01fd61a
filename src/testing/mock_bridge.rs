//! In-memory bridge pair member

use super::{gas_token, neo_token};
use crate::services::{BridgeChainService, BridgeService, ChainService, FeeCalculator};
use crate::types::{
    Account, ApprovalFeeParams, Balance, BridgeConstants, BridgeParams, BridgeToken, ChainTag,
    Token, TransferParams,
};
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

/// A chain service that also plays one side of a bridge pair.
///
/// Carries GAS (fee token, 8 decimals) and NEO (0 decimals) as its
/// bridgeable tokens. Constants, approval fee, nonce, and mirrored
/// transaction are all configurable, with call counters and failure
/// budgets for exercising the confirmation poller.
pub struct MockBridgeChain {
    chain: ChainTag,
    tokens: Vec<Token>,
    fee_token: Token,
    bridge_tokens: Mutex<Vec<BridgeToken>>,
    constants: Mutex<Option<BridgeConstants>>,
    fail_constants: AtomicBool,
    constants_calls: AtomicU32,
    approval_fee: Mutex<Option<String>>,
    approval_fee_calls: AtomicU32,
    bridge_transaction_hash: String,
    bridge_calls: AtomicU32,
    nonce: Mutex<Option<String>>,
    nonce_fail_remaining: AtomicU32,
    nonce_calls: AtomicU32,
    mirrored_transaction: Mutex<Option<String>>,
    mirrored_fail_remaining: AtomicU32,
}

impl MockBridgeChain {
    pub fn new(chain: &str) -> Self {
        Self {
            chain: ChainTag::from(chain),
            tokens: vec![gas_token(chain).token, neo_token(chain).token],
            fee_token: gas_token(chain).token,
            bridge_tokens: Mutex::new(vec![gas_token(chain), neo_token(chain)]),
            constants: Mutex::new(None),
            fail_constants: AtomicBool::new(false),
            constants_calls: AtomicU32::new(0),
            approval_fee: Mutex::new(Some("0".to_string())),
            approval_fee_calls: AtomicU32::new(0),
            bridge_transaction_hash: format!("0x{chain}bridgetx"),
            bridge_calls: AtomicU32::new(0),
            nonce: Mutex::new(None),
            nonce_fail_remaining: AtomicU32::new(0),
            nonce_calls: AtomicU32::new(0),
            mirrored_transaction: Mutex::new(None),
            mirrored_fail_remaining: AtomicU32::new(0),
        }
    }

    pub fn bridge_tokens(&self) -> Vec<BridgeToken> {
        self.bridge_tokens.lock().expect("tokens lock poisoned").clone()
    }

    pub fn clear_bridge_tokens(&self) {
        self.bridge_tokens
            .lock()
            .expect("tokens lock poisoned")
            .clear();
    }

    pub fn set_constants(&self, constants: BridgeConstants) {
        *self.constants.lock().expect("constants lock poisoned") = Some(constants);
    }

    pub fn fail_constants(&self, fail: bool) {
        self.fail_constants.store(fail, Ordering::Relaxed);
    }

    pub fn constants_calls(&self) -> u32 {
        self.constants_calls.load(Ordering::Relaxed)
    }

    pub fn set_approval_fee(&self, fee: &str) {
        *self.approval_fee.lock().expect("approval lock poisoned") = Some(fee.to_string());
    }

    /// Make the approval-fee probe fail, as on chains without an approval
    /// step
    pub fn unsupported_approval_fee(&self) {
        *self.approval_fee.lock().expect("approval lock poisoned") = None;
    }

    pub fn approval_fee_calls(&self) -> u32 {
        self.approval_fee_calls.load(Ordering::Relaxed)
    }

    pub fn bridge_transaction_hash(&self) -> String {
        self.bridge_transaction_hash.clone()
    }

    pub fn bridge_calls(&self) -> u32 {
        self.bridge_calls.load(Ordering::Relaxed)
    }

    pub fn set_nonce(&self, nonce: &str) {
        *self.nonce.lock().expect("nonce lock poisoned") = Some(nonce.to_string());
    }

    /// Fail the next `times` nonce lookups before serving the configured
    /// nonce
    pub fn fail_nonce_times(&self, times: u32) {
        self.nonce_fail_remaining.store(times, Ordering::Relaxed);
    }

    pub fn nonce_calls(&self) -> u32 {
        self.nonce_calls.load(Ordering::Relaxed)
    }

    pub fn set_mirrored_transaction(&self, hash: &str) {
        *self
            .mirrored_transaction
            .lock()
            .expect("mirrored lock poisoned") = Some(hash.to_string());
    }

    pub fn fail_mirrored_times(&self, times: u32) {
        self.mirrored_fail_remaining.store(times, Ordering::Relaxed);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        let remaining = counter.load(Ordering::Relaxed);
        if remaining > 0 {
            counter.store(remaining.saturating_sub(1), Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl ChainService for MockBridgeChain {
    fn chain(&self) -> &ChainTag {
        &self.chain
    }

    fn tokens(&self) -> Vec<Token> {
        self.tokens.clone()
    }

    fn fee_token(&self) -> Token {
        self.fee_token.clone()
    }

    fn validate_address(&self, address: &str) -> bool {
        address.starts_with(&format!("{}-", self.chain))
    }

    fn generate_account_from_key(&self, key: &str) -> Result<Account> {
        Ok(Account {
            address: format!("{}-{}", self.chain, key),
            key: key.to_string(),
            chain: self.chain.clone(),
            is_hardware: false,
        })
    }

    async fn balances(&self, _address: &str) -> Result<Vec<Balance>> {
        Ok(Vec::new())
    }

    async fn token_info(&self, hash: &str) -> Result<Token> {
        self.tokens
            .iter()
            .find(|token| token.matches_hash(hash))
            .cloned()
            .ok_or_else(|| eyre!("token {hash} is not known to {}", self.chain))
    }

    async fn transfer(&self, _params: TransferParams) -> Result<Vec<String>> {
        Ok(vec![format!("0x{}transfer", self.chain)])
    }

    fn fee_calculator(&self) -> Option<&dyn FeeCalculator> {
        None
    }
}

#[async_trait]
impl BridgeService for MockBridgeChain {
    fn tokens(&self) -> Vec<BridgeToken> {
        self.bridge_tokens()
    }

    async fn bridge_constants(&self, _token: &BridgeToken) -> Result<BridgeConstants> {
        self.constants_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_constants.load(Ordering::Relaxed) {
            return Err(eyre!("bridge constants are unavailable"));
        }
        self.constants
            .lock()
            .expect("constants lock poisoned")
            .clone()
            .ok_or_else(|| eyre!("bridge constants are not configured"))
    }

    async fn approval_fee(&self, _params: ApprovalFeeParams) -> Result<String> {
        self.approval_fee_calls.fetch_add(1, Ordering::Relaxed);
        self.approval_fee
            .lock()
            .expect("approval lock poisoned")
            .clone()
            .ok_or_else(|| eyre!("approval fees are not supported on {}", self.chain))
    }

    async fn bridge(&self, _params: BridgeParams) -> Result<String> {
        self.bridge_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.bridge_transaction_hash.clone())
    }

    async fn nonce_by_transaction(
        &self,
        _token: &BridgeToken,
        _transaction_hash: &str,
    ) -> Result<String> {
        self.nonce_calls.fetch_add(1, Ordering::Relaxed);
        if Self::take_failure(&self.nonce_fail_remaining) {
            return Err(eyre!("nonce is not yet assigned"));
        }
        self.nonce
            .lock()
            .expect("nonce lock poisoned")
            .clone()
            .ok_or_else(|| eyre!("nonce is not yet assigned"))
    }

    async fn transaction_hash_by_nonce(&self, _token: &BridgeToken, _nonce: &str) -> Result<String> {
        if Self::take_failure(&self.mirrored_fail_remaining) {
            return Err(eyre!("mirrored transaction has not appeared"));
        }
        self.mirrored_transaction
            .lock()
            .expect("mirrored lock poisoned")
            .clone()
            .ok_or_else(|| eyre!("mirrored transaction has not appeared"))
    }
}

impl BridgeChainService for MockBridgeChain {
    fn bridge_service(&self) -> &dyn BridgeService {
        self
    }
}
