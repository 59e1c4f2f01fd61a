//! Reactive state machine for swapping assets through the aggregator

use super::{CreateExchangeParams, SwapAggregator, SwapCurrency, SwapRange};
use crate::debounce::{DebounceMap, DEBOUNCE_DELAY};
use crate::decimal;
use crate::error::{ErrorCode, WalletError};
use crate::observable::{LoadableValue, Observable, ObserverList, SubscriptionId, ValidatableValue};
use crate::services::ChainService;
use crate::types::{Account, ChainTag, TransferIntent, TransferParams};
use bigdecimal::{BigDecimal, Zero};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decimals assumed for a currency whose precision cannot be resolved
/// from any chain
pub const DEFAULT_CURRENCY_DECIMALS: u32 = 6;

const AMOUNT_TO_USE_FIELD: &str = "swap.amount_to_use";

/// The observable fields of one swap orchestrator instance
#[derive(Default)]
pub struct SwapFields {
    pub available_tokens_to_use: Observable<LoadableValue<Vec<SwapCurrency>>>,
    pub token_to_use: Observable<LoadableValue<SwapCurrency>>,
    pub account_to_use: Observable<ValidatableValue<Account>>,
    pub amount_to_use: Observable<LoadableValue<String>>,
    pub amount_to_use_min_max: Observable<LoadableValue<SwapRange>>,
    pub available_tokens_to_receive: Observable<LoadableValue<Vec<SwapCurrency>>>,
    pub token_to_receive: Observable<LoadableValue<SwapCurrency>>,
    pub address_to_receive: Observable<ValidatableValue<String>>,
    pub extra_id_to_receive: Observable<ValidatableValue<String>>,
    pub amount_to_receive: Observable<LoadableValue<String>>,
}

/// Construction parameters for [`SwapOrchestrator`]
pub struct SwapOrchestratorParams {
    pub aggregator: Arc<dyn SwapAggregator>,
    /// Chain services by the chain they are bound to
    pub services: HashMap<ChainTag, Arc<dyn ChainService>>,
    /// Aggregator network identifiers that map onto each known chain
    pub networks_by_chain: HashMap<ChainTag, Vec<String>>,
}

/// Result of [`SwapOrchestrator::swap`].
///
/// An exchange, once created with the aggregator, exists externally and is
/// not rolled back; a transfer failure after creation is therefore
/// reported rather than thrown, with the exchange id kept for retry.
#[derive(Debug, Clone)]
pub enum SwapOutcome {
    /// Exchange created and the deposit transfer submitted
    Completed {
        exchange_id: String,
        transaction_hash: String,
    },
    /// Exchange exists with the aggregator but the deposit transfer was
    /// not submitted; it can be retried against `deposit_address`
    TransferFailed {
        exchange_id: String,
        deposit_address: String,
        error: WalletError,
    },
    /// The exchange could not be created at all
    Failed { error: WalletError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recalc {
    AvailableTokensToReceive,
    AmountToUseMinMax,
    AmountToUse,
    AmountToReceive,
}

struct SwapInner {
    aggregator: Arc<dyn SwapAggregator>,
    services: HashMap<ChainTag, Arc<dyn ChainService>>,
    networks_by_chain: HashMap<ChainTag, Vec<String>>,
    fields: SwapFields,
    debounce: DebounceMap,
    errors: ObserverList<WalletError>,
}

/// Coordinates an open set of tokens and chains through the swap
/// aggregator.
///
/// `init()` must be awaited before any setter is used. Batch
/// recomputation failures land on the affected fields and are also
/// broadcast on the orchestrator's error channel for consumers that show
/// global feedback.
pub struct SwapOrchestrator {
    inner: Arc<SwapInner>,
}

impl SwapOrchestrator {
    pub fn new(params: SwapOrchestratorParams) -> Self {
        Self {
            inner: Arc::new(SwapInner {
                aggregator: params.aggregator,
                services: params.services,
                networks_by_chain: params.networks_by_chain,
                fields: SwapFields::default(),
                debounce: DebounceMap::new(),
                errors: ObserverList::new(),
            }),
        }
    }

    pub fn fields(&self) -> &SwapFields {
        &self.inner.fields
    }

    /// Subscribe to recomputation failures that are not attributable to a
    /// single field the user is looking at
    pub fn on_error(
        &self,
        listener: impl Fn(&WalletError) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.errors.subscribe(listener)
    }

    pub fn unsubscribe_error(&self, id: SubscriptionId) -> bool {
        self.inner.errors.unsubscribe(id)
    }

    /// Clear every field and load the catalog of currencies resolvable to
    /// a known chain
    pub async fn init(&self) -> Result<(), WalletError> {
        self.inner.debounce.cancel_all();

        let fields = &self.inner.fields;
        fields.token_to_use.update(LoadableValue::reset);
        fields.account_to_use.update(ValidatableValue::reset);
        fields.amount_to_use.update(LoadableValue::reset);
        fields.amount_to_use_min_max.update(LoadableValue::reset);
        fields.available_tokens_to_receive.update(LoadableValue::reset);
        fields.token_to_receive.update(LoadableValue::reset);
        fields.address_to_receive.update(ValidatableValue::reset);
        fields.extra_id_to_receive.update(ValidatableValue::reset);
        fields.amount_to_receive.update(LoadableValue::reset);

        fields.available_tokens_to_use.update(|f| {
            f.reset();
            f.loading = true;
        });

        match self.inner.aggregator.currencies().await {
            Ok(catalog) => {
                let tokens: Vec<SwapCurrency> = catalog
                    .into_iter()
                    .map(|currency| self.inner.resolve_currency(currency))
                    .filter(|currency| currency.chain.is_some() && currency.hash.is_some())
                    .collect();
                debug!(count = tokens.len(), "loaded swappable currency catalog");
                fields.available_tokens_to_use.update(|f| {
                    f.loading = false;
                    f.value = Some(tokens);
                });
                Ok(())
            }
            Err(report) => {
                let error = WalletError::normalize(report);
                fields.available_tokens_to_use.update(|f| {
                    f.loading = false;
                    f.value = Some(Vec::new());
                });
                self.inner.errors.emit(&error);
                Err(error)
            }
        }
    }

    /// Select the currency to swap away. Triggers recomputation of the
    /// pair list, min/max, default amount, and estimate as one batch.
    pub async fn set_token_to_use(&self, token: Option<&SwapCurrency>) -> Result<(), WalletError> {
        let fields = &self.inner.fields;

        if let (Some(token), Some(current)) = (token, fields.token_to_use.get().value.as_ref()) {
            if current.matches(token) {
                return Ok(());
            }
        }

        // a token change invalidates every derived amount
        self.inner.debounce.cancel(AMOUNT_TO_USE_FIELD);
        fields.amount_to_use.update(|f| {
            f.loading = false;
            f.value = None;
        });
        fields.amount_to_receive.update(|f| {
            f.loading = false;
            f.value = None;
        });
        fields.amount_to_use_min_max.update(|f| {
            f.loading = false;
            f.value = None;
        });
        fields.token_to_use.update(|f| f.loading = true);

        let selected = match self.inner.select_token_to_use(token).await {
            Ok(selected) => selected,
            Err(error) => {
                fields.token_to_use.update(|f| {
                    f.loading = false;
                    f.error = Some(error.clone());
                });
                return Err(error);
            }
        };

        fields.token_to_use.update(|f| {
            f.loading = false;
            f.value = selected.clone();
            f.error = None;
        });

        // an account on the wrong chain cannot pay for this swap
        let selected_chain = selected.as_ref().and_then(|currency| currency.chain.clone());
        let account_chain = fields.account_to_use.get().value.map(|account| account.chain);
        if account_chain != selected_chain {
            fields.account_to_use.update(|f| {
                f.loading = false;
                f.value = None;
            });
        }

        self.inner
            .recalculate(&[
                Recalc::AmountToReceive,
                Recalc::AvailableTokensToReceive,
                Recalc::AmountToUseMinMax,
                Recalc::AmountToUse,
            ])
            .await
    }

    /// Select the currency to receive. Clears any previously entered
    /// extra-id and recomputes min/max, default amount, and estimate.
    pub async fn set_token_to_receive(
        &self,
        token: Option<&SwapCurrency>,
    ) -> Result<(), WalletError> {
        let fields = &self.inner.fields;

        if let (Some(token), Some(current)) = (token, fields.token_to_receive.get().value.as_ref())
        {
            if current.matches(token) {
                return Ok(());
            }
        }

        fields.extra_id_to_receive.update(|f| {
            f.value = None;
            f.valid = None;
        });
        fields.amount_to_receive.update(|f| {
            f.loading = false;
            f.value = None;
        });
        fields.amount_to_use_min_max.update(|f| {
            f.loading = false;
            f.value = None;
        });

        let available = fields
            .available_tokens_to_receive
            .get()
            .value
            .ok_or_else(|| {
                WalletError::new(
                    ErrorCode::NoAvailableTokens,
                    "available tokens to receive is not set",
                )
            })?;

        let selected = match token {
            Some(token) => Some(
                available
                    .iter()
                    .find(|candidate| candidate.matches(token))
                    .cloned()
                    .ok_or_else(|| {
                        WalletError::new(
                            ErrorCode::TokenNotAvailable,
                            "the token is not among the available tokens to receive",
                        )
                    })?,
            ),
            None => None,
        };

        fields.token_to_receive.update(|f| {
            f.value = selected;
            f.error = None;
        });

        self.inner
            .recalculate(&[
                Recalc::AmountToReceive,
                Recalc::AmountToUseMinMax,
                Recalc::AmountToUse,
            ])
            .await
    }

    /// Select the paying account; validated against the selected token's
    /// chain without any network calls
    pub async fn set_account_to_use(&self, account: Option<&Account>) -> Result<(), WalletError> {
        self.inner
            .fields
            .account_to_use
            .update(|f| f.value = account.cloned());
        self.inner.recalculate(&[]).await
    }

    /// Record the amount to swap; reformatted to the token's precision and
    /// re-estimated after the debounce window
    pub async fn set_amount_to_use(&self, amount: Option<&str>) {
        self.inner
            .fields
            .amount_to_use
            .update(|f| f.value = amount.map(str::to_string));

        if amount.is_none() {
            self.inner.debounce.cancel(AMOUNT_TO_USE_FIELD);
            self.inner.fields.amount_to_receive.update(|f| {
                f.value = None;
                f.loading = false;
            });
            return;
        }

        let inner = Arc::clone(&self.inner);
        self.inner
            .debounce
            .schedule(AMOUNT_TO_USE_FIELD, DEBOUNCE_DELAY, async move {
                if let Some(current) = inner.fields.amount_to_use.get().value {
                    if let Some(decimals) = inner
                        .fields
                        .token_to_use
                        .get()
                        .value
                        .and_then(|currency| currency.decimals)
                    {
                        let formatted = decimal::format(&current, decimals);
                        inner
                            .fields
                            .amount_to_use
                            .update(|f| f.value = Some(formatted));
                    }
                }

                if let Err(error) = inner.recalculate(&[Recalc::AmountToReceive]).await {
                    debug!(code = %error.code(), "debounced swap recomputation failed");
                }
            });
    }

    /// Record the destination address; validated synchronously against the
    /// receive currency's address pattern
    pub async fn set_address_to_receive(&self, address: Option<&str>) -> Result<(), WalletError> {
        self.inner.fields.address_to_receive.update(|f| {
            f.loading = false;
            f.value = address.map(str::to_string);
            f.valid = None;
        });
        self.inner.recalculate(&[]).await
    }

    /// Record the extra-id (memo/destination tag); ignored entirely when
    /// the receive currency does not use one
    pub async fn set_extra_id_to_receive(&self, extra_id: Option<&str>) -> Result<(), WalletError> {
        let requires_extra = self
            .inner
            .fields
            .token_to_receive
            .get()
            .value
            .map(|currency| currency.has_extra_id)
            .unwrap_or(false);
        if !requires_extra {
            return Ok(());
        }

        self.inner.fields.extra_id_to_receive.update(|f| {
            f.value = extra_id.map(str::to_string).filter(|value| !value.is_empty());
            f.valid = None;
        });
        self.inner.recalculate(&[]).await
    }

    /// Create the exchange and submit the deposit transfer.
    ///
    /// `Err` is returned only when the preconditions are not met; runtime
    /// failures are reported inside [`SwapOutcome`].
    pub async fn swap(&self) -> Result<SwapOutcome, WalletError> {
        let fields = &self.inner.fields;

        let token_to_use = fields.token_to_use.get().value;
        let token_to_receive = fields.token_to_receive.get().value;
        let account = fields.account_to_use.get().value;
        let address = fields.address_to_receive.get();
        let amount = fields.amount_to_use.get().value;
        let amount_to_receive = fields.amount_to_receive.get().value;
        let extra_id = fields.extra_id_to_receive.get();

        let not_ready = || {
            WalletError::new(
                ErrorCode::SwapNotReady,
                "not all required fields are set for swapping",
            )
        };

        let (
            Some(token_to_use),
            Some(token_to_receive),
            Some(account),
            Some(address_value),
            Some(amount),
            Some(_),
        ) = (
            token_to_use,
            token_to_receive,
            account,
            address.value,
            amount,
            amount_to_receive,
        )
        else {
            return Err(not_ready());
        };

        if address.valid != Some(true) {
            return Err(not_ready());
        }
        let Some(token_hash) = token_to_use.hash.clone() else {
            return Err(not_ready());
        };
        if token_to_receive.has_extra_id {
            let has_value = extra_id
                .value
                .as_deref()
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false);
            if extra_id.valid != Some(true) || !has_value {
                return Err(not_ready());
            }
        }

        let exchange = match self
            .inner
            .aggregator
            .create_exchange(CreateExchangeParams {
                currency_from: token_to_use.clone(),
                currency_to: token_to_receive.clone(),
                amount: amount.clone(),
                refund_address: account.address.clone(),
                address: address_value,
                extra_id: extra_id.value.clone(),
            })
            .await
        {
            Ok(exchange) => exchange,
            Err(report) => {
                let error = WalletError::normalize(report);
                warn!(code = %error.code(), "exchange creation failed");
                return Ok(SwapOutcome::Failed { error });
            }
        };

        let Some(service) = self.inner.services.get(&account.chain) else {
            return Ok(SwapOutcome::TransferFailed {
                exchange_id: exchange.id,
                deposit_address: exchange.deposit_address,
                error: WalletError::new(
                    ErrorCode::Unexpected,
                    format!("no chain service registered for {}", account.chain),
                ),
            });
        };

        let transfer = service
            .transfer(TransferParams {
                sender: account.clone(),
                intents: vec![TransferIntent {
                    amount: amount.clone(),
                    receiver_address: exchange.deposit_address.clone(),
                    token_hash,
                    token_decimals: token_to_use.decimals.unwrap_or(DEFAULT_CURRENCY_DECIMALS),
                }],
            })
            .await;

        match transfer {
            Ok(hashes) => match hashes.into_iter().next() {
                Some(transaction_hash) => Ok(SwapOutcome::Completed {
                    exchange_id: exchange.id,
                    transaction_hash,
                }),
                None => Ok(SwapOutcome::TransferFailed {
                    exchange_id: exchange.id,
                    deposit_address: exchange.deposit_address,
                    error: WalletError::new(
                        ErrorCode::Unexpected,
                        "transfer resolved without a transaction hash",
                    ),
                }),
            },
            Err(report) => {
                let error = WalletError::normalize(report);
                warn!(code = %error.code(), "deposit transfer failed after exchange creation");
                Ok(SwapOutcome::TransferFailed {
                    exchange_id: exchange.id,
                    deposit_address: exchange.deposit_address,
                    error,
                })
            }
        }
    }

    /// Fee for the deposit transfer, `"0"` when the chain cannot estimate
    /// fees
    pub async fn calculate_fee(&self) -> Result<String, WalletError> {
        let fields = &self.inner.fields;

        let token_to_use = fields.token_to_use.get().value;
        let token_to_receive = fields.token_to_receive.get().value;
        let account = fields.account_to_use.get().value;
        let address = fields.address_to_receive.get();
        let amount = fields.amount_to_use.get().value;
        let amount_to_receive = fields.amount_to_receive.get().value;

        let not_ready = || {
            WalletError::new(
                ErrorCode::SwapNotReady,
                "not all required fields are set for swapping",
            )
        };

        let (
            Some(token_to_use),
            Some(token_to_receive),
            Some(account),
            Some(address_value),
            Some(amount),
            Some(_),
        ) = (
            token_to_use,
            token_to_receive,
            account,
            address.value,
            amount,
            amount_to_receive,
        )
        else {
            return Err(not_ready());
        };

        if address.valid != Some(true) {
            return Err(not_ready());
        }
        let Some(token_hash) = token_to_use.hash.clone() else {
            return Err(not_ready());
        };

        let service = self.inner.services.get(&account.chain).ok_or_else(|| {
            WalletError::new(
                ErrorCode::Unexpected,
                format!("no chain service registered for {}", account.chain),
            )
        })?;

        let Some(calculator) = service.fee_calculator() else {
            return Ok("0".to_string());
        };

        // a cross-chain receive address means the deposit leg pays to the
        // aggregator, so estimate against the sender's own chain address
        let receiver_address = if token_to_receive.chain.as_ref() == Some(&account.chain) {
            address_value
        } else {
            account.address.clone()
        };

        calculator
            .calculate_transfer_fee(&TransferParams {
                sender: account.clone(),
                intents: vec![TransferIntent {
                    amount,
                    receiver_address,
                    token_hash,
                    token_decimals: token_to_use.decimals.unwrap_or(DEFAULT_CURRENCY_DECIMALS),
                }],
            })
            .await
            .map_err(WalletError::normalize)
    }
}

impl SwapInner {
    /// Bind an aggregator currency to a known chain and local token
    /// metadata, when its network maps onto one
    fn resolve_currency(&self, mut currency: SwapCurrency) -> SwapCurrency {
        if currency.chain.is_none() {
            currency.chain = self
                .networks_by_chain
                .iter()
                .find(|(_, networks)| networks.iter().any(|network| network == &currency.network))
                .map(|(chain, _)| chain.clone());
        }

        let Some(service) = currency
            .chain
            .as_ref()
            .and_then(|chain| self.services.get(chain))
        else {
            return currency;
        };

        let known = service
            .tokens()
            .into_iter()
            .find(|token| match &currency.hash {
                Some(hash) => token.matches_hash(hash),
                None => token.symbol.eq_ignore_ascii_case(&currency.ticker),
            });

        if let Some(token) = known {
            currency.hash = Some(token.hash);
            currency.decimals = Some(token.decimals);
            currency.symbol = token.symbol;
            currency.name = token.name;
        }
        currency
    }

    async fn select_token_to_use(
        &self,
        token: Option<&SwapCurrency>,
    ) -> Result<Option<SwapCurrency>, WalletError> {
        let available = self.fields.available_tokens_to_use.get().value.ok_or_else(|| {
            WalletError::new(
                ErrorCode::NoAvailableTokens,
                "available tokens to use is not set",
            )
        })?;

        let Some(token) = token else {
            return Ok(None);
        };

        let mut currency = available
            .iter()
            .find(|candidate| candidate.matches(token))
            .cloned()
            .ok_or_else(|| {
                WalletError::new(
                    ErrorCode::TokenNotAvailable,
                    "the token is not among the available tokens to use",
                )
            })?;

        if currency.decimals.is_none() {
            let (Some(chain), Some(hash)) = (currency.chain.clone(), currency.hash.clone()) else {
                return Err(WalletError::new(
                    ErrorCode::TokenNotAvailable,
                    "the token is missing a chain binding or contract hash",
                ));
            };

            let resolved = match self.services.get(&chain) {
                Some(service) => service
                    .token_info(&hash)
                    .await
                    .ok()
                    .map(|token| token.decimals),
                None => None,
            };
            currency.decimals = Some(resolved.unwrap_or(DEFAULT_CURRENCY_DECIMALS));
        }

        Ok(Some(currency))
    }

    /// Recompute the requested derived fields. The four async fields enter
    /// `loading` together and are cleared together, whatever happens in
    /// between.
    async fn recalculate(&self, targets: &[Recalc]) -> Result<(), WalletError> {
        let result = self.recalculate_inner(targets).await;

        let fields = &self.fields;
        fields.available_tokens_to_receive.update(|f| f.loading = false);
        fields.amount_to_use_min_max.update(|f| f.loading = false);
        fields.amount_to_use.update(|f| f.loading = false);
        fields.amount_to_receive.update(|f| f.loading = false);

        result
    }

    async fn recalculate_inner(&self, targets: &[Recalc]) -> Result<(), WalletError> {
        let fields = &self.fields;
        let Some(token_to_use) = fields.token_to_use.get().value else {
            return Ok(());
        };

        let token_to_receive = fields.token_to_receive.get().value;

        // synchronous validations first; they never suspend
        if let (Some(address), Some(receive)) =
            (fields.address_to_receive.get().value, token_to_receive.as_ref())
        {
            let valid = match Regex::new(&receive.validation_address) {
                Ok(pattern) => pattern.is_match(&address),
                Err(error) => {
                    warn!(%error, currency = %receive.id, "invalid address validation pattern");
                    false
                }
            };
            fields.address_to_receive.update(|f| f.valid = Some(valid));
        }

        if let (Some(extra_id), Some(receive)) =
            (fields.extra_id_to_receive.get().value, token_to_receive.as_ref())
        {
            let trimmed = extra_id.trim();
            let valid = if trimmed.is_empty() {
                true
            } else {
                match receive.validation_extra.as_deref() {
                    None => true,
                    Some(pattern) => Regex::new(pattern)
                        .map(|pattern| pattern.is_match(trimmed))
                        .unwrap_or(false),
                }
            };
            fields.extra_id_to_receive.update(|f| f.valid = Some(valid));
        }

        if let Some(account) = fields.account_to_use.get().value {
            let valid = token_to_use.chain.as_ref() == Some(&account.chain);
            fields.account_to_use.update(|f| f.valid = Some(valid));
        }

        let should_pairs = targets.contains(&Recalc::AvailableTokensToReceive);
        let should_amount_to_use = targets.contains(&Recalc::AmountToUse)
            && fields.amount_to_use.get().value.is_none()
            && token_to_receive.is_some();
        let should_amount_to_receive =
            targets.contains(&Recalc::AmountToReceive) && token_to_receive.is_some();
        let should_min_max =
            targets.contains(&Recalc::AmountToUseMinMax) && token_to_receive.is_some();

        fields
            .available_tokens_to_receive
            .update(|f| f.loading = should_pairs);
        fields
            .amount_to_use_min_max
            .update(|f| f.loading = should_min_max);
        fields.amount_to_use.update(|f| f.loading = should_amount_to_use);
        fields
            .amount_to_receive
            .update(|f| f.loading = should_amount_to_receive);

        if should_pairs {
            match self
                .aggregator
                .pairs(&token_to_use.ticker, &token_to_use.network)
                .await
            {
                Ok(raw_pairs) => {
                    let pairs: Vec<SwapCurrency> = raw_pairs
                        .into_iter()
                        .map(|currency| self.resolve_currency(currency))
                        .collect();
                    fields
                        .available_tokens_to_receive
                        .update(|f| f.value = Some(pairs.clone()));

                    // a receive token that is no longer pairable is dropped
                    if let Some(receive) = fields.token_to_receive.get().value {
                        if !pairs.iter().any(|pair| pair.matches(&receive)) {
                            fields.token_to_receive.update(|f| f.value = None);
                        }
                    }
                }
                Err(report) => {
                    let error = WalletError::normalize(report);
                    self.errors.emit(&error);
                    fields.available_tokens_to_receive.update(|f| f.value = None);
                    fields.token_to_receive.update(|f| f.value = None);
                    fields.amount_to_use_min_max.update(|f| f.value = None);
                    fields.amount_to_receive.update(|f| f.value = None);
                    fields.address_to_receive.update(|f| {
                        f.value = None;
                        f.valid = None;
                    });
                    fields.extra_id_to_receive.update(|f| {
                        f.value = None;
                        f.valid = None;
                    });
                    return Err(error);
                }
            }
        }

        if should_min_max || should_amount_to_use || should_amount_to_receive {
            let token_to_receive = fields.token_to_receive.get().value;

            if let Err(error) = self
                .recompute_range(
                    &token_to_use,
                    token_to_receive.as_ref(),
                    should_min_max,
                    should_amount_to_use,
                )
                .await
            {
                self.errors.emit(&error);
                fields.amount_to_use_min_max.update(|f| f.value = None);
                fields.amount_to_receive.update(|f| f.value = None);
                return Err(error);
            }

            if should_amount_to_receive {
                let amount = fields.amount_to_use.get().value;
                if let (Some(receive), Some(amount)) = (token_to_receive.as_ref(), amount) {
                    match self.aggregator.estimate(&token_to_use, receive, &amount).await {
                        Ok(estimate) => {
                            fields.amount_to_receive.update(|f| f.value = Some(estimate));
                        }
                        Err(report) => {
                            let error = WalletError::normalize(report);
                            self.errors.emit(&error);
                            fields.amount_to_receive.update(|f| f.value = None);
                            return Err(error);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Refresh the quoted range (with the safety-margin uplift) and default
    /// the amount to the computed minimum when asked to
    async fn recompute_range(
        &self,
        token_to_use: &SwapCurrency,
        token_to_receive: Option<&SwapCurrency>,
        should_min_max: bool,
        should_amount_to_use: bool,
    ) -> Result<(), WalletError> {
        let fields = &self.fields;
        let mut range = fields.amount_to_use_min_max.get().value;

        if should_min_max || range.is_none() {
            if let Some(receive) = token_to_receive {
                let decimals = token_to_use.decimals.unwrap_or(DEFAULT_CURRENCY_DECIMALS);
                let quoted = self
                    .aggregator
                    .range(token_to_use, receive)
                    .await
                    .map_err(WalletError::normalize)?;

                let quoted_min = decimal::parse(&quoted.min).unwrap_or_else(BigDecimal::zero);
                let min = decimal::format_decimal(
                    &decimal::min_with_safety_margin(&quoted_min, decimals),
                    decimals,
                );
                let max = quoted.max.map(|max| decimal::format(&max, decimals));
                range = Some(SwapRange { min, max });
            }
        }

        fields.amount_to_use_min_max.update(|f| f.value = range.clone());

        if should_amount_to_use {
            if let Some(range) = range.as_ref() {
                fields
                    .amount_to_use
                    .update(|f| f.value = Some(range.min.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{swap_chain_service, swap_setup, MockSwapAggregator};
    use std::sync::Mutex;

    fn account(chain: &str) -> Account {
        Account {
            address: format!("{chain}-address-1"),
            key: "key".to_string(),
            chain: ChainTag::from(chain),
            is_hardware: false,
        }
    }

    fn currency_by_id(orchestrator: &SwapOrchestrator, id: &str) -> SwapCurrency {
        orchestrator
            .fields()
            .available_tokens_to_use
            .get()
            .value
            .unwrap()
            .into_iter()
            .find(|currency| currency.id == id)
            .unwrap()
    }

    fn receive_currency_by_id(orchestrator: &SwapOrchestrator, id: &str) -> SwapCurrency {
        orchestrator
            .fields()
            .available_tokens_to_receive
            .get()
            .value
            .unwrap()
            .into_iter()
            .find(|currency| currency.id == id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_init_keeps_only_resolvable_currencies() {
        let (orchestrator, _, _) = swap_setup().await;

        let available = orchestrator
            .fields()
            .available_tokens_to_use
            .get()
            .value
            .unwrap();
        let ids: Vec<&str> = available.iter().map(|c| c.id.as_str()).collect();

        // btc:bitcoin and xrp:ripple have no known chain and are filtered out
        assert_eq!(ids, vec!["gas:neo3", "neo:neo3"]);
        assert!(available.iter().all(|c| c.chain.is_some() && c.hash.is_some()));
        assert_eq!(available[0].decimals, Some(8));
    }

    #[tokio::test]
    async fn test_init_failure_broadcasts_on_the_error_channel() {
        let (orchestrator, aggregator, _) = swap_setup().await;
        aggregator.fail_currencies(true);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        orchestrator.on_error(move |error| sink.lock().unwrap().push(error.code()));

        let error = orchestrator.init().await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::Unexpected);
        let available = orchestrator.fields().available_tokens_to_use.get();
        assert!(available.value.unwrap().is_empty());
        assert!(!available.loading);
        assert_eq!(*seen.lock().unwrap(), vec![ErrorCode::Unexpected]);
    }

    #[tokio::test]
    async fn test_set_token_to_use_loads_pairs() {
        let (orchestrator, aggregator, _) = swap_setup().await;

        let gas = currency_by_id(&orchestrator, "gas:neo3");
        orchestrator.set_token_to_use(Some(&gas)).await.unwrap();

        assert_eq!(aggregator.pairs_calls(), 1);
        let pairs = orchestrator
            .fields()
            .available_tokens_to_receive
            .get()
            .value
            .unwrap();
        let ids: Vec<&str> = pairs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["btc:bitcoin", "neo:neo3", "xrp:ripple"]);

        // no receive token yet, so no range or estimate was requested
        assert_eq!(aggregator.range_calls(), 0);
        assert_eq!(aggregator.estimate_calls(), 0);
        assert!(orchestrator.fields().amount_to_use_min_max.get().value.is_none());
    }

    #[tokio::test]
    async fn test_reselecting_the_same_token_is_a_noop() {
        let (orchestrator, aggregator, _) = swap_setup().await;

        let gas = currency_by_id(&orchestrator, "gas:neo3");
        orchestrator.set_token_to_use(Some(&gas)).await.unwrap();
        assert_eq!(aggregator.pairs_calls(), 1);

        orchestrator.set_token_to_use(Some(&gas)).await.unwrap();
        assert_eq!(aggregator.pairs_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let (orchestrator, _, _) = swap_setup().await;

        let mut unknown = currency_by_id(&orchestrator, "gas:neo3");
        unknown.id = "doge:dogecoin".to_string();

        let error = orchestrator.set_token_to_use(Some(&unknown)).await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::TokenNotAvailable);
        assert!(!orchestrator.fields().token_to_use.get().loading);
    }

    #[tokio::test]
    async fn test_receive_token_computes_uplifted_range_and_estimate() {
        let (orchestrator, aggregator, _) = swap_setup().await;
        aggregator.set_range("10", Some("1000"));

        let gas = currency_by_id(&orchestrator, "gas:neo3");
        orchestrator.set_token_to_use(Some(&gas)).await.unwrap();

        let btc = receive_currency_by_id(&orchestrator, "btc:bitcoin");
        orchestrator.set_token_to_receive(Some(&btc)).await.unwrap();

        // GAS has 8 decimals: 10 * 1.01 = 10.1, plus one smallest unit
        let range = orchestrator
            .fields()
            .amount_to_use_min_max
            .get()
            .value
            .unwrap();
        assert_eq!(range.min, "10.10000001");
        assert_eq!(range.max.as_deref(), Some("1000"));

        // the amount defaults to the computed minimum and is estimated
        assert_eq!(
            orchestrator.fields().amount_to_use.get().value.as_deref(),
            Some("10.10000001")
        );
        assert_eq!(aggregator.estimate_calls(), 1);
        assert_eq!(
            orchestrator.fields().amount_to_receive.get().value.as_deref(),
            Some("20.20000002")
        );
    }

    #[tokio::test]
    async fn test_zero_decimal_token_minimum_stays_integral() {
        let (orchestrator, aggregator, _) = swap_setup().await;
        aggregator.set_range("10", None);

        let neo = currency_by_id(&orchestrator, "neo:neo3");
        orchestrator.set_token_to_use(Some(&neo)).await.unwrap();

        let gas = receive_currency_by_id(&orchestrator, "gas:neo3");
        orchestrator.set_token_to_receive(Some(&gas)).await.unwrap();

        let range = orchestrator
            .fields()
            .amount_to_use_min_max
            .get()
            .value
            .unwrap();
        assert_eq!(range.min, "11");
        assert!(!range.min.contains('.'));
        assert!(range.max.is_none());
    }

    #[tokio::test]
    async fn test_pairs_failure_clears_and_broadcasts() {
        let (orchestrator, aggregator, _) = swap_setup().await;
        aggregator.fail_pairs(true);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        orchestrator.on_error(move |error| sink.lock().unwrap().push(error.code()));

        let gas = currency_by_id(&orchestrator, "gas:neo3");
        let error = orchestrator.set_token_to_use(Some(&gas)).await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::Unexpected);

        let fields = orchestrator.fields();
        assert!(fields.available_tokens_to_receive.get().value.is_none());
        assert!(fields.token_to_receive.get().value.is_none());
        assert!(!fields.available_tokens_to_receive.get().loading);
        assert_eq!(*seen.lock().unwrap(), vec![ErrorCode::Unexpected]);
    }

    #[tokio::test]
    async fn test_account_validation_tracks_token_chain() {
        let (orchestrator, _, _) = swap_setup().await;

        let gas = currency_by_id(&orchestrator, "gas:neo3");
        orchestrator.set_token_to_use(Some(&gas)).await.unwrap();
        orchestrator
            .set_account_to_use(Some(&account("neo3")))
            .await
            .unwrap();
        assert_eq!(orchestrator.fields().account_to_use.get().valid, Some(true));

        orchestrator
            .set_account_to_use(Some(&account("neox")))
            .await
            .unwrap();
        assert_eq!(orchestrator.fields().account_to_use.get().valid, Some(false));

        // clearing the token clears an account bound to its chain
        orchestrator
            .set_account_to_use(Some(&account("neo3")))
            .await
            .unwrap();
        orchestrator.set_token_to_use(None).await.unwrap();
        assert!(orchestrator.fields().account_to_use.get().value.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_amount_is_debounced_and_reformatted() {
        let (orchestrator, aggregator, _) = swap_setup().await;

        let gas = currency_by_id(&orchestrator, "gas:neo3");
        orchestrator.set_token_to_use(Some(&gas)).await.unwrap();
        let btc = receive_currency_by_id(&orchestrator, "btc:bitcoin");
        orchestrator.set_token_to_receive(Some(&btc)).await.unwrap();

        let baseline = aggregator.estimate_calls();
        orchestrator.set_amount_to_use(Some("20")).await;
        orchestrator.set_amount_to_use(Some("30")).await;
        orchestrator
            .set_amount_to_use(Some("25.123456789"))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(1600)).await;

        assert_eq!(aggregator.estimate_calls(), baseline + 1);
        assert_eq!(
            orchestrator.fields().amount_to_use.get().value.as_deref(),
            Some("25.12345678")
        );
        assert_eq!(
            orchestrator.fields().amount_to_receive.get().value.as_deref(),
            Some("50.24691356")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearing_the_amount_clears_the_estimate() {
        let (orchestrator, _, _) = swap_setup().await;

        let gas = currency_by_id(&orchestrator, "gas:neo3");
        orchestrator.set_token_to_use(Some(&gas)).await.unwrap();
        let btc = receive_currency_by_id(&orchestrator, "btc:bitcoin");
        orchestrator.set_token_to_receive(Some(&btc)).await.unwrap();
        assert!(orchestrator.fields().amount_to_receive.get().value.is_some());

        orchestrator.set_amount_to_use(None).await;
        tokio::time::sleep(std::time::Duration::from_millis(1600)).await;

        assert!(orchestrator.fields().amount_to_use.get().value.is_none());
        assert!(orchestrator.fields().amount_to_receive.get().value.is_none());
    }

    #[tokio::test]
    async fn test_address_and_extra_id_validate_against_patterns() {
        let (orchestrator, _, _) = swap_setup().await;

        let gas = currency_by_id(&orchestrator, "gas:neo3");
        orchestrator.set_token_to_use(Some(&gas)).await.unwrap();
        let xrp = receive_currency_by_id(&orchestrator, "xrp:ripple");
        orchestrator.set_token_to_receive(Some(&xrp)).await.unwrap();

        orchestrator
            .set_address_to_receive(Some("rPEPPER7kfTD9w2To4CQk6UCfuHM9c6GDY"))
            .await
            .unwrap();
        assert_eq!(orchestrator.fields().address_to_receive.get().valid, Some(true));

        orchestrator
            .set_address_to_receive(Some("not-an-address"))
            .await
            .unwrap();
        assert_eq!(
            orchestrator.fields().address_to_receive.get().valid,
            Some(false)
        );

        orchestrator
            .set_extra_id_to_receive(Some("12345"))
            .await
            .unwrap();
        assert_eq!(
            orchestrator.fields().extra_id_to_receive.get().valid,
            Some(true)
        );

        orchestrator
            .set_extra_id_to_receive(Some("tag-abc"))
            .await
            .unwrap();
        assert_eq!(
            orchestrator.fields().extra_id_to_receive.get().valid,
            Some(false)
        );

        // whitespace counts as empty, and empty is always acceptable
        orchestrator
            .set_extra_id_to_receive(Some("   "))
            .await
            .unwrap();
        assert_eq!(
            orchestrator.fields().extra_id_to_receive.get().valid,
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_changing_the_receive_token_clears_the_extra_id() {
        let (orchestrator, _, _) = swap_setup().await;

        let gas = currency_by_id(&orchestrator, "gas:neo3");
        orchestrator.set_token_to_use(Some(&gas)).await.unwrap();
        let xrp = receive_currency_by_id(&orchestrator, "xrp:ripple");
        orchestrator.set_token_to_receive(Some(&xrp)).await.unwrap();
        orchestrator
            .set_extra_id_to_receive(Some("12345"))
            .await
            .unwrap();

        let btc = receive_currency_by_id(&orchestrator, "btc:bitcoin");
        orchestrator.set_token_to_receive(Some(&btc)).await.unwrap();

        let extra = orchestrator.fields().extra_id_to_receive.get();
        assert!(extra.value.is_none());
        assert!(extra.valid.is_none());
    }

    async fn ready_for_swap(
        orchestrator: &SwapOrchestrator,
        receive_id: &str,
        address: &str,
    ) {
        let gas = currency_by_id(orchestrator, "gas:neo3");
        orchestrator.set_token_to_use(Some(&gas)).await.unwrap();
        let receive = receive_currency_by_id(orchestrator, receive_id);
        orchestrator.set_token_to_receive(Some(&receive)).await.unwrap();
        orchestrator
            .set_account_to_use(Some(&account("neo3")))
            .await
            .unwrap();
        orchestrator
            .set_address_to_receive(Some(address))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_swap_executes_and_transfers_to_the_deposit_address() {
        let (orchestrator, aggregator, chain) = swap_setup().await;

        ready_for_swap(&orchestrator, "btc:bitcoin", "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7k").await;

        let outcome = orchestrator.swap().await.unwrap();
        let SwapOutcome::Completed {
            exchange_id,
            transaction_hash,
        } = outcome
        else {
            panic!("expected a completed swap, got {outcome:?}");
        };
        assert_eq!(exchange_id, "exchange-1");
        assert!(!transaction_hash.is_empty());

        // the deposit transfer went to the aggregator's deposit address
        let transfers = chain.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(
            transfers[0].intents[0].receiver_address,
            aggregator.deposit_address()
        );
        assert_eq!(transfers[0].sender.address, "neo3-address-1");

        let created = aggregator.created_exchanges();
        assert_eq!(created[0].refund_address, "neo3-address-1");
        assert!(created[0].extra_id.is_none());
    }

    #[tokio::test]
    async fn test_swap_without_a_required_extra_id_rejects() {
        let (orchestrator, _, _) = swap_setup().await;

        ready_for_swap(&orchestrator, "xrp:ripple", "rPEPPER7kfTD9w2To4CQk6UCfuHM9c6GDY").await;

        // setExtraIdToReceive was never called
        let error = orchestrator.swap().await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::SwapNotReady);

        orchestrator
            .set_extra_id_to_receive(Some("12345"))
            .await
            .unwrap();
        assert!(orchestrator.swap().await.is_ok());
    }

    #[tokio::test]
    async fn test_swap_transfer_failure_keeps_the_exchange() {
        let (orchestrator, _, chain) = swap_setup().await;
        chain.fail_transfers(true);

        ready_for_swap(&orchestrator, "btc:bitcoin", "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7k").await;

        let outcome = orchestrator.swap().await.unwrap();
        let SwapOutcome::TransferFailed {
            exchange_id,
            deposit_address,
            error,
        } = outcome
        else {
            panic!("expected a transfer failure, got {outcome:?}");
        };
        assert_eq!(exchange_id, "exchange-1");
        assert!(!deposit_address.is_empty());
        assert_eq!(error.code(), ErrorCode::Unexpected);
    }

    #[tokio::test]
    async fn test_swap_exchange_creation_failure_is_reported_not_thrown() {
        let (orchestrator, aggregator, _) = swap_setup().await;
        aggregator.fail_create(true);

        ready_for_swap(&orchestrator, "btc:bitcoin", "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7k").await;

        let outcome = orchestrator.swap().await.unwrap();
        assert!(matches!(outcome, SwapOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_calculate_fee_probes_the_capability() {
        let (orchestrator, _, _) = swap_setup().await;

        ready_for_swap(&orchestrator, "btc:bitcoin", "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7k").await;

        // the mock chain estimates fees
        assert_eq!(orchestrator.calculate_fee().await.unwrap(), "0.0112");

        // a chain without the capability reports zero
        let (orchestrator, _, _) = swap_setup_without_fees().await;
        ready_for_swap(&orchestrator, "btc:bitcoin", "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7k").await;
        assert_eq!(orchestrator.calculate_fee().await.unwrap(), "0");
    }

    async fn swap_setup_without_fees(
    ) -> (SwapOrchestrator, Arc<MockSwapAggregator>, Arc<crate::testing::MockChainService>) {
        let chain = swap_chain_service("neo3", None);
        let aggregator = Arc::new(MockSwapAggregator::standard());

        let mut services: HashMap<ChainTag, Arc<dyn ChainService>> = HashMap::new();
        services.insert(ChainTag::from("neo3"), chain.clone());
        let mut networks: HashMap<ChainTag, Vec<String>> = HashMap::new();
        networks.insert(ChainTag::from("neo3"), vec!["neo3".to_string()]);

        let orchestrator = SwapOrchestrator::new(SwapOrchestratorParams {
            aggregator: aggregator.clone(),
            services,
            networks_by_chain: networks,
        });
        orchestrator.init().await.unwrap();
        (orchestrator, aggregator, chain)
    }
}
