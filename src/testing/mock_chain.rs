//! In-memory chain service

use crate::services::{ChainService, FeeCalculator};
use crate::types::{Account, Balance, ChainTag, Token, TransferParams};
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

/// A chain whose addresses are `"{chain}-..."` strings. Transfers succeed
/// with a synthetic hash unless failure is switched on, and every accepted
/// transfer is recorded for inspection.
pub struct MockChainService {
    chain: ChainTag,
    tokens: Vec<Token>,
    fee_token: Token,
    fee: Option<String>,
    balances: Mutex<Vec<Balance>>,
    transfers: Mutex<Vec<TransferParams>>,
    transfer_counter: AtomicU32,
    fail_transfers: AtomicBool,
}

impl MockChainService {
    pub fn new(chain: &str, tokens: Vec<Token>, fee_token: Token, fee: Option<&str>) -> Self {
        Self {
            chain: ChainTag::from(chain),
            tokens,
            fee_token,
            fee: fee.map(str::to_string),
            balances: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            transfer_counter: AtomicU32::new(0),
            fail_transfers: AtomicBool::new(false),
        }
    }

    pub fn set_balances(&self, balances: Vec<Balance>) {
        *self.balances.lock().expect("balances lock poisoned") = balances;
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::Relaxed);
    }

    /// Transfers accepted so far, in submission order
    pub fn transfers(&self) -> Vec<TransferParams> {
        self.transfers.lock().expect("transfers lock poisoned").clone()
    }
}

#[async_trait]
impl ChainService for MockChainService {
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
        Ok(self.balances.lock().expect("balances lock poisoned").clone())
    }

    async fn token_info(&self, hash: &str) -> Result<Token> {
        self.tokens
            .iter()
            .find(|token| token.matches_hash(hash))
            .cloned()
            .ok_or_else(|| eyre!("token {hash} is not known to {}", self.chain))
    }

    async fn transfer(&self, params: TransferParams) -> Result<Vec<String>> {
        if self.fail_transfers.load(Ordering::Relaxed) {
            return Err(eyre!("transfer rejected by {}", self.chain));
        }

        let n = self.transfer_counter.fetch_add(1, Ordering::Relaxed);
        self.transfers
            .lock()
            .expect("transfers lock poisoned")
            .push(params);
        Ok(vec![format!("0x{}transfer{n}", self.chain)])
    }

    fn fee_calculator(&self) -> Option<&dyn FeeCalculator> {
        if self.fee.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl FeeCalculator for MockChainService {
    async fn calculate_transfer_fee(&self, _params: &TransferParams) -> Result<String> {
        self.fee
            .clone()
            .ok_or_else(|| eyre!("{} cannot estimate fees", self.chain))
    }
}
