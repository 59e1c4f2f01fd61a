//! Reactive state machine for bridging a token between two fixed chains

use crate::debounce::{DebounceMap, DEBOUNCE_DELAY};
use crate::decimal;
use crate::error::{ErrorCode, WalletError};
use crate::observable::{LoadableValue, Observable, ValidatableValue};
use crate::retry::{retry, Confirmation, RetryOptions};
use crate::services::BridgeChainService;
use crate::types::{Account, ApprovalFeeParams, Balance, BridgeParams, BridgeToken};
use bigdecimal::{BigDecimal, Zero};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Attempts spent polling each side for the bridge confirmation artifacts
pub const WAIT_ATTEMPTS: u32 = 10;
/// Fixed delay between confirmation polls
pub const WAIT_DELAY: Duration = Duration::from_secs(30);

const AMOUNT_TO_USE_FIELD: &str = "bridge.amount_to_use";
const ADDRESS_TO_RECEIVE_FIELD: &str = "bridge.address_to_receive";

/// The observable fields of one bridge orchestrator instance.
///
/// Subscribing to a field is the public event surface: every write
/// republishes that field's full snapshot.
#[derive(Default)]
pub struct BridgeFields {
    pub available_tokens_to_use: Observable<LoadableValue<Vec<BridgeToken>>>,
    pub token_to_use: Observable<LoadableValue<BridgeToken>>,
    pub account_to_use: Observable<LoadableValue<Account>>,
    pub amount_to_use: Observable<ValidatableValue<String>>,
    pub amount_to_use_min: Observable<LoadableValue<String>>,
    pub amount_to_use_max: Observable<LoadableValue<String>>,
    pub token_to_receive: Observable<LoadableValue<BridgeToken>>,
    pub address_to_receive: Observable<ValidatableValue<String>>,
    pub amount_to_receive: Observable<LoadableValue<String>>,
    pub token_to_use_balance: Observable<LoadableValue<Balance>>,
    pub bridge_fee: Observable<LoadableValue<String>>,
}

struct ServicePair {
    from: Arc<dyn BridgeChainService>,
    to: Arc<dyn BridgeChainService>,
}

struct BridgeInner {
    services: Mutex<ServicePair>,
    fields: BridgeFields,
    balances: Mutex<Option<Vec<Balance>>>,
    fee_token_balance: Mutex<Option<Balance>>,
    debounce: DebounceMap,
}

/// Parameters for [`BridgeOrchestrator::wait`]
pub struct BridgeWaitParams {
    pub token_to_use: BridgeToken,
    pub token_to_receive: BridgeToken,
    pub transaction_hash: String,
    pub from_service: Arc<dyn BridgeChainService>,
    pub to_service: Arc<dyn BridgeChainService>,
}

/// The confirmation artifacts of a completed bridge operation
#[derive(Debug, Clone)]
pub struct BridgeMirror {
    /// Nonce assigned by the source chain
    pub nonce: String,
    /// Hash of the mirrored transaction on the destination chain
    pub transaction_hash: String,
}

enum TokenSelection {
    Unchanged,
    Selected { pair: Option<BridgeToken> },
}

/// Coordinates a single fixed pair of chains exchanging a small fixed set
/// of bridgeable tokens.
///
/// `init()` must be awaited before any setter is used. Setters validate
/// synchronously, then mark derived fields loading and recompute them
/// asynchronously; consumers observe the fields, not the returned futures.
pub struct BridgeOrchestrator {
    inner: Arc<BridgeInner>,
}

impl BridgeOrchestrator {
    pub fn new(from: Arc<dyn BridgeChainService>, to: Arc<dyn BridgeChainService>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                services: Mutex::new(ServicePair { from, to }),
                fields: BridgeFields::default(),
                balances: Mutex::new(None),
                fee_token_balance: Mutex::new(None),
                debounce: DebounceMap::new(),
            }),
        }
    }

    pub fn fields(&self) -> &BridgeFields {
        &self.inner.fields
    }

    /// The chain currently bridged from
    pub fn from_chain(&self) -> crate::types::ChainTag {
        self.inner.services().0.chain().clone()
    }

    /// The chain currently bridged to
    pub fn to_chain(&self) -> crate::types::ChainTag {
        self.inner.services().1.chain().clone()
    }

    /// Reset every field and repopulate the bridgeable token list
    pub async fn init(&self) {
        self.inner.debounce.cancel_all();

        let tokens = self.inner.services().0.bridge_service().tokens();
        let fields = &self.inner.fields;

        fields.available_tokens_to_use.update(|f| {
            f.reset();
            f.value = Some(tokens);
        });
        fields.token_to_use.update(LoadableValue::reset);
        fields.account_to_use.update(LoadableValue::reset);
        fields.amount_to_use.update(ValidatableValue::reset);
        fields.amount_to_use_min.update(LoadableValue::reset);
        fields.amount_to_use_max.update(LoadableValue::reset);
        fields.token_to_receive.update(LoadableValue::reset);
        fields.address_to_receive.update(ValidatableValue::reset);
        fields.amount_to_receive.update(LoadableValue::reset);
        fields.token_to_use_balance.update(LoadableValue::reset);
        fields.bridge_fee.update(LoadableValue::reset);

        *self.inner.balances.lock().expect("balances lock poisoned") = None;
        *self
            .inner
            .fee_token_balance
            .lock()
            .expect("fee balance lock poisoned") = None;
    }

    /// Swap the pair orientation and re-select the previously received
    /// token as the new token to use. Calling twice restores the original
    /// orientation.
    pub async fn switch_tokens(&self) -> Result<(), WalletError> {
        {
            let mut services = self.inner.services.lock().expect("services lock poisoned");
            let services = &mut *services;
            std::mem::swap(&mut services.from, &mut services.to);
        }

        let previous_receive = self.inner.fields.token_to_receive.get().value;

        self.init().await;
        self.set_token_to_use(previous_receive.as_ref()).await
    }

    /// Select the token to bridge, resolving its fixed pair token on the
    /// destination chain. No-op when the token is already selected.
    pub async fn set_token_to_use(&self, token: Option<&BridgeToken>) -> Result<(), WalletError> {
        let pair = match self.resolve_token_selection(token) {
            Ok(TokenSelection::Unchanged) => return Ok(()),
            Ok(TokenSelection::Selected { pair }) => pair,
            Err(error) => {
                self.inner
                    .fields
                    .token_to_use
                    .update(|f| f.error = Some(error.clone()));
                return Err(error);
            }
        };

        self.inner.fields.token_to_receive.update(|f| {
            f.value = pair;
            f.error = None;
        });
        self.inner.fields.token_to_use.update(|f| {
            f.value = token.cloned();
            f.error = None;
        });

        // a token change invalidates everything derived downstream
        let fields = &self.inner.fields;
        fields.account_to_use.update(LoadableValue::reset);
        fields.amount_to_receive.update(LoadableValue::reset);
        fields.amount_to_use_min.update(LoadableValue::reset);
        fields.amount_to_use_max.update(LoadableValue::reset);
        fields.bridge_fee.update(LoadableValue::reset);
        fields.token_to_use_balance.update(LoadableValue::reset);

        // re-derive balances for the new token; both legs run even if one fails
        let balances = self.inner.balances.lock().expect("balances lock poisoned").clone();
        let _ = futures::future::join(self.set_balances(balances), self.set_amount_to_use(None)).await;

        Ok(())
    }

    /// Select the account paying for the bridge. The account must live on
    /// the current "from" chain.
    pub async fn set_account_to_use(&self, account: Option<&Account>) -> Result<(), WalletError> {
        if let Some(account) = account {
            if let Some(current) = self.inner.fields.account_to_use.get().value.as_ref() {
                if current.matches(account) {
                    return Ok(());
                }
            }

            let from_chain = self.inner.services().0.chain().clone();
            if from_chain != account.chain {
                let error = WalletError::new(
                    ErrorCode::AccountNotCompatibleWithToken,
                    "the account is not compatible with the selected token",
                );
                self.inner
                    .fields
                    .account_to_use
                    .update(|f| f.error = Some(error.clone()));
                return Err(error);
            }
        }

        self.inner.fields.account_to_use.update(|f| {
            f.value = account.cloned();
            f.error = None;
        });

        let _ = futures::future::join(self.set_balances(None), self.set_amount_to_use(None)).await;

        Ok(())
    }

    /// Feed a fresh balance snapshot. Locates the entry for the selected
    /// token and re-derives fee and min/max from the bridge constants;
    /// the three fields enter and leave `loading` together.
    pub async fn set_balances(&self, balances: Option<Vec<Balance>>) -> Result<(), WalletError> {
        *self.inner.balances.lock().expect("balances lock poisoned") = balances.clone();

        let token = self.inner.fields.token_to_use.get().value;
        let (from, fee_token) = {
            let services = self.inner.services.lock().expect("services lock poisoned");
            (Arc::clone(&services.from), services.from.fee_token())
        };

        let token_balance = match (&token, &balances) {
            (Some(token), Some(balances)) => balances
                .iter()
                .find(|entry| token.token.matches_hash(&entry.token.hash))
                .cloned(),
            _ => None,
        };
        self.inner
            .fields
            .token_to_use_balance
            .update(|f| f.value = token_balance.clone());

        let fee_balance = balances.as_ref().and_then(|balances| {
            balances
                .iter()
                .find(|entry| fee_token.matches_hash(&entry.token.hash))
                .cloned()
        });
        *self
            .inner
            .fee_token_balance
            .lock()
            .expect("fee balance lock poisoned") = fee_balance;

        let (Some(token), Some(_)) = (token, balances) else {
            return Ok(());
        };

        let fields = &self.inner.fields;
        fields.amount_to_use_max.update(|f| {
            f.loading = true;
            f.error = None;
        });
        fields.amount_to_use_min.update(|f| {
            f.loading = true;
            f.error = None;
        });
        fields.bridge_fee.update(|f| {
            f.loading = true;
            f.error = None;
        });

        let outcome = match from.bridge_service().bridge_constants(&token).await {
            Ok(constants) => {
                fields
                    .amount_to_use_min
                    .update(|f| f.value = Some(constants.min_amount.to_plain_string()));
                fields
                    .bridge_fee
                    .update(|f| f.value = Some(constants.fee.to_plain_string()));

                let balance_amount = token_balance
                    .as_ref()
                    .and_then(|entry| decimal::parse(&entry.amount))
                    .unwrap_or_else(BigDecimal::zero);

                // the fee eats into the transferable balance only when the
                // bridged token is the fee token itself
                let spendable = if token.token.matches_hash(&fee_token.hash) {
                    balance_amount - &constants.fee
                } else {
                    balance_amount
                };
                let max = decimal::clamp(&spendable, &BigDecimal::zero(), &constants.max_amount);

                fields
                    .amount_to_use_max
                    .update(|f| f.value = Some(decimal::format_decimal(&max, token.token.decimals)));
                Ok(())
            }
            Err(report) => {
                let error = WalletError::normalize(report);
                for field in [
                    &fields.amount_to_use_max,
                    &fields.amount_to_use_min,
                    &fields.bridge_fee,
                ] {
                    field.update(|f| {
                        f.value = None;
                        f.error = Some(error.clone());
                    });
                }
                Err(error)
            }
        };

        fields.amount_to_use_max.update(|f| f.loading = false);
        fields.amount_to_use_min.update(|f| f.loading = false);
        fields.bridge_fee.update(|f| f.loading = false);

        outcome
    }

    /// Record the destination address and validate it against the "to"
    /// chain after the debounce window
    pub async fn set_address_to_receive(&self, address: Option<&str>) {
        let address = address.map(str::to_string);

        self.inner.fields.address_to_receive.update(|f| {
            f.loading = address.is_some();
            f.value = address;
            f.valid = None;
            f.error = None;
        });

        let inner = Arc::clone(&self.inner);
        self.inner
            .debounce
            .schedule(ADDRESS_TO_RECEIVE_FIELD, DEBOUNCE_DELAY, async move {
                let Some(value) = inner.fields.address_to_receive.get().value else {
                    return;
                };
                let to = {
                    let services = inner.services.lock().expect("services lock poisoned");
                    Arc::clone(&services.to)
                };
                let valid = to.validate_address(&value);
                inner.fields.address_to_receive.update(|f| {
                    f.valid = Some(valid);
                    f.loading = false;
                });
            });
    }

    /// Record the amount to bridge. Clearing it synchronously clears the
    /// mirrored receive amount; otherwise validation runs after the
    /// debounce window and reports through the field, never by panicking
    /// or returning an error from the delayed task.
    pub async fn set_amount_to_use(&self, amount: Option<&str>) {
        let amount = amount.map(str::to_string);
        self.inner
            .fields
            .amount_to_use
            .update(|f| f.value = amount.clone());

        let Some(amount) = amount else {
            self.inner.debounce.cancel(AMOUNT_TO_USE_FIELD);
            self.inner.fields.amount_to_use.update(|f| {
                f.valid = None;
                f.loading = false;
            });
            self.inner.fields.amount_to_receive.update(|f| {
                f.value = None;
                f.loading = false;
            });
            return;
        };

        let inner = Arc::clone(&self.inner);
        self.inner
            .debounce
            .schedule(AMOUNT_TO_USE_FIELD, DEBOUNCE_DELAY, async move {
                validate_amount(inner, amount).await;
            });
    }

    /// Execute the bridge. All fields must be set and the amount valid.
    pub async fn bridge(&self) -> Result<String, WalletError> {
        let fields = &self.inner.fields;

        let account = fields.account_to_use.get().value;
        let token = fields.token_to_use.get().value;
        let token_to_receive = fields.token_to_receive.get().value;
        let amount = fields.amount_to_use.get();
        let amount_to_receive = fields.amount_to_receive.get().value;
        let address = fields.address_to_receive.get().value;
        let fee = fields.bridge_fee.get().value;

        let (Some(account), Some(token), Some(_), Some(amount_value), Some(_), Some(address), Some(fee)) = (
            account,
            token,
            token_to_receive,
            amount.value,
            amount_to_receive,
            address,
            fee,
        ) else {
            return Err(WalletError::new(
                ErrorCode::BridgeNotReady,
                "required parameters are not set for bridging",
            ));
        };

        if amount.valid != Some(true) {
            return Err(WalletError::new(
                ErrorCode::BridgeNotReady,
                "required parameters are not set for bridging",
            ));
        }

        let from = {
            let services = self.inner.services.lock().expect("services lock poisoned");
            Arc::clone(&services.from)
        };

        from.bridge_service()
            .bridge(BridgeParams {
                account,
                token,
                amount: amount_value,
                receiver_address: address,
                bridge_fee: fee,
            })
            .await
            .map_err(WalletError::normalize)
    }

    /// Poll for the two confirmation artifacts of a submitted bridge
    /// transaction: the nonce the source chain assigns, then the mirrored
    /// transaction the destination chain records under that nonce.
    /// Exhausting either retry budget reports [`Confirmation::TimedOut`].
    pub async fn wait(params: BridgeWaitParams) -> Confirmation<BridgeMirror> {
        let options = RetryOptions::new(WAIT_ATTEMPTS, WAIT_DELAY);
        let BridgeWaitParams {
            token_to_use,
            token_to_receive,
            transaction_hash,
            from_service,
            to_service,
        } = params;

        let nonce_result = retry(&options, || {
            let service = Arc::clone(&from_service);
            let token = token_to_use.clone();
            let transaction_hash = transaction_hash.clone();
            async move {
                service
                    .bridge_service()
                    .nonce_by_transaction(&token, &transaction_hash)
                    .await
            }
        })
        .await;

        let nonce = match nonce_result {
            Ok(nonce) => nonce,
            Err(last_error) => {
                return Confirmation::TimedOut {
                    attempts: options.retries,
                    last_error,
                }
            }
        };
        debug!(%nonce, "source chain assigned a bridge nonce");

        let mirrored = retry(&options, || {
            let service = Arc::clone(&to_service);
            let token = token_to_receive.clone();
            let nonce = nonce.clone();
            async move {
                service
                    .bridge_service()
                    .transaction_hash_by_nonce(&token, &nonce)
                    .await
            }
        })
        .await;

        match mirrored {
            Ok(transaction_hash) => Confirmation::Confirmed(BridgeMirror {
                nonce,
                transaction_hash,
            }),
            Err(last_error) => Confirmation::TimedOut {
                attempts: options.retries,
                last_error,
            },
        }
    }

    fn resolve_token_selection(
        &self,
        token: Option<&BridgeToken>,
    ) -> Result<TokenSelection, WalletError> {
        let available = self
            .inner
            .fields
            .available_tokens_to_use
            .get()
            .value
            .ok_or_else(|| {
                WalletError::new(ErrorCode::NoAvailableTokens, "no available tokens to use")
            })?;

        let Some(token) = token else {
            return Ok(TokenSelection::Selected { pair: None });
        };

        if let Some(current) = self.inner.fields.token_to_use.get().value.as_ref() {
            if current.matches(token) {
                return Ok(TokenSelection::Unchanged);
            }
        }

        if !available.iter().any(|candidate| candidate.matches(token)) {
            return Err(WalletError::new(
                ErrorCode::TokenNotAvailable,
                "the token is not among the available tokens to use",
            ));
        }

        let pair = self
            .inner
            .services()
            .1
            .bridge_service()
            .tokens()
            .into_iter()
            .find(|candidate| candidate.pair_id == token.pair_id)
            .ok_or_else(|| WalletError::new(ErrorCode::PairTokenNotFound, "pair token not found"))?;

        Ok(TokenSelection::Selected { pair: Some(pair) })
    }
}

impl BridgeInner {
    fn services(&self) -> (Arc<dyn BridgeChainService>, Arc<dyn BridgeChainService>) {
        let services = self.services.lock().expect("services lock poisoned");
        (Arc::clone(&services.from), Arc::clone(&services.to))
    }
}

/// Debounced amount validation. Failures land on `amount_to_use.error`;
/// nothing is re-raised from the delayed task.
async fn validate_amount(inner: Arc<BridgeInner>, amount: String) {
    let Some(token) = inner.fields.token_to_use.get().value else {
        return;
    };
    let decimals = token.token.decimals;

    // mirror the amount 1:1 before validating; a bridge has no slippage
    let formatted = decimal::format(&amount, decimals);
    inner
        .fields
        .amount_to_receive
        .update(|f| f.value = Some(formatted.clone()));
    inner
        .fields
        .amount_to_use
        .update(|f| f.value = Some(formatted.clone()));

    let min = inner.fields.amount_to_use_min.get().value;
    let max = inner.fields.amount_to_use_max.get().value;
    let fee = inner.fields.bridge_fee.get().value;
    let account = inner.fields.account_to_use.get().value;
    let fee_balance = inner
        .fee_token_balance
        .lock()
        .expect("fee balance lock poisoned")
        .clone();

    // cannot validate until every upstream quantity has resolved
    let (Some(min), Some(max), Some(fee), Some(account), Some(fee_balance)) =
        (min, max, fee, account, fee_balance)
    else {
        return;
    };

    inner.fields.amount_to_use.update(|f| f.loading = true);
    inner.fields.bridge_fee.update(|f| f.loading = true);

    let (from, fee_token) = {
        let services = inner.services.lock().expect("services lock poisoned");
        (Arc::clone(&services.from), services.from.fee_token())
    };

    let outcome: Result<(), WalletError> = async {
        let amount_value = decimal::parse(&formatted).unwrap_or_else(BigDecimal::zero);
        let min_value = decimal::parse(&min).unwrap_or_else(BigDecimal::zero);
        let max_value = decimal::parse(&max).unwrap_or_else(BigDecimal::zero);

        if amount_value < min_value {
            return Err(WalletError::new(
                ErrorCode::AmountBelowMinimum,
                "amount is below the minimum",
            ));
        }
        if amount_value > max_value {
            return Err(WalletError::new(
                ErrorCode::AmountAboveMaximum,
                "amount is above the maximum",
            ));
        }

        // chains without an approval step report a zero fee
        let approval_fee = from
            .bridge_service()
            .approval_fee(ApprovalFeeParams {
                account: account.clone(),
                token: token.clone(),
                amount: formatted.clone(),
            })
            .await
            .unwrap_or_else(|_| "0".to_string());

        let total_fee = decimal::parse(&fee).unwrap_or_else(BigDecimal::zero)
            + decimal::parse(&approval_fee).unwrap_or_else(BigDecimal::zero);
        inner
            .fields
            .bridge_fee
            .update(|f| f.value = Some(decimal::format_decimal(&total_fee, fee_token.decimals)));

        let required = if token.token.matches_hash(&fee_token.hash) {
            &total_fee + &amount_value
        } else {
            total_fee.clone()
        };
        let available = decimal::parse(&fee_balance.amount).unwrap_or_else(BigDecimal::zero);
        if required > available {
            return Err(WalletError::new(
                ErrorCode::InsufficientFeeTokenBalance,
                "the fee token balance does not cover the bridge fee",
            ));
        }

        inner.fields.amount_to_use.update(|f| {
            f.valid = Some(true);
            f.error = None;
        });
        Ok(())
    }
    .await;

    if let Err(error) = outcome {
        debug!(code = %error.code(), "amount validation failed");
        inner.fields.amount_to_use.update(|f| {
            f.valid = Some(false);
            f.error = Some(error);
        });
    }

    inner.fields.amount_to_use.update(|f| f.loading = false);
    inner.fields.bridge_fee.update(|f| f.loading = false);
}
