//! In-memory swap aggregator

use super::{NEO3_GAS_HASH, NEO3_NEO_HASH};
use crate::decimal;
use crate::swap::{
    CreateExchangeParams, CreatedExchange, ExchangeInfo, SwapAggregator, SwapCurrency, SwapRange,
};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

fn currency(
    ticker: &str,
    network: &str,
    hash: Option<&str>,
    has_extra_id: bool,
    validation_address: &str,
    validation_extra: Option<&str>,
) -> SwapCurrency {
    SwapCurrency {
        id: format!("{ticker}:{network}"),
        ticker: ticker.to_string(),
        symbol: ticker.to_string(),
        name: ticker.to_string(),
        network: network.to_string(),
        hash: hash.map(str::to_string),
        decimals: None,
        chain: None,
        has_extra_id,
        validation_address: validation_address.to_string(),
        validation_extra: validation_extra.map(str::to_string),
    }
}

/// An aggregator with a small fixed catalog, a configurable quoted range,
/// and a linear estimate (`amount * rate`). Exchange creation hands out
/// sequential ids and a fixed deposit address.
pub struct MockSwapAggregator {
    currencies: Mutex<Vec<SwapCurrency>>,
    pairs: Mutex<HashMap<String, Vec<String>>>,
    range: Mutex<SwapRange>,
    rate: BigDecimal,
    deposit_address: String,
    fail_currencies: AtomicBool,
    fail_pairs: AtomicBool,
    fail_range: AtomicBool,
    fail_estimate: AtomicBool,
    fail_create: AtomicBool,
    pairs_calls: AtomicU32,
    range_calls: AtomicU32,
    estimate_calls: AtomicU32,
    create_calls: AtomicU32,
    created: Mutex<Vec<CreateExchangeParams>>,
    exchanges: Mutex<HashMap<String, ExchangeInfo>>,
}

impl MockSwapAggregator {
    /// Catalog: gas/neo on the neo3 network (resolvable), btc and xrp on
    /// networks no chain service maps to; xrp requires an extra-id
    pub fn standard() -> Self {
        let catalog = vec![
            currency(
                "gas",
                "neo3",
                Some(NEO3_GAS_HASH),
                false,
                "^N[0-9a-zA-Z]{33}$",
                None,
            ),
            currency(
                "neo",
                "neo3",
                Some(NEO3_NEO_HASH),
                false,
                "^N[0-9a-zA-Z]{33}$",
                None,
            ),
            currency("btc", "bitcoin", None, false, "^bc1[0-9a-z]{25,39}$", None),
            currency(
                "xrp",
                "ripple",
                None,
                true,
                "^r[0-9a-zA-Z]{24,34}$",
                Some("^[0-9]+$"),
            ),
        ];

        let mut pairs = HashMap::new();
        pairs.insert(
            "gas:neo3".to_string(),
            vec![
                "btc:bitcoin".to_string(),
                "neo:neo3".to_string(),
                "xrp:ripple".to_string(),
            ],
        );
        pairs.insert("neo:neo3".to_string(), vec!["gas:neo3".to_string()]);

        Self {
            currencies: Mutex::new(catalog),
            pairs: Mutex::new(pairs),
            range: Mutex::new(SwapRange {
                min: "10".to_string(),
                max: Some("1000".to_string()),
            }),
            rate: BigDecimal::from_str("2").expect("constant parses"),
            deposit_address: "neo3-aggregator-deposit".to_string(),
            fail_currencies: AtomicBool::new(false),
            fail_pairs: AtomicBool::new(false),
            fail_range: AtomicBool::new(false),
            fail_estimate: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            pairs_calls: AtomicU32::new(0),
            range_calls: AtomicU32::new(0),
            estimate_calls: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            created: Mutex::new(Vec::new()),
            exchanges: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_range(&self, min: &str, max: Option<&str>) {
        *self.range.lock().expect("range lock poisoned") = SwapRange {
            min: min.to_string(),
            max: max.map(str::to_string),
        };
    }

    pub fn fail_currencies(&self, fail: bool) {
        self.fail_currencies.store(fail, Ordering::Relaxed);
    }

    pub fn fail_pairs(&self, fail: bool) {
        self.fail_pairs.store(fail, Ordering::Relaxed);
    }

    pub fn fail_range(&self, fail: bool) {
        self.fail_range.store(fail, Ordering::Relaxed);
    }

    pub fn fail_estimate(&self, fail: bool) {
        self.fail_estimate.store(fail, Ordering::Relaxed);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::Relaxed);
    }

    pub fn pairs_calls(&self) -> u32 {
        self.pairs_calls.load(Ordering::Relaxed)
    }

    pub fn range_calls(&self) -> u32 {
        self.range_calls.load(Ordering::Relaxed)
    }

    pub fn estimate_calls(&self) -> u32 {
        self.estimate_calls.load(Ordering::Relaxed)
    }

    pub fn deposit_address(&self) -> String {
        self.deposit_address.clone()
    }

    /// Exchange creations accepted so far, in order
    pub fn created_exchanges(&self) -> Vec<CreateExchangeParams> {
        self.created.lock().expect("created lock poisoned").clone()
    }

    pub fn set_exchange(&self, id: &str, info: ExchangeInfo) {
        self.exchanges
            .lock()
            .expect("exchanges lock poisoned")
            .insert(id.to_string(), info);
    }
}

#[async_trait]
impl SwapAggregator for MockSwapAggregator {
    async fn currencies(&self) -> Result<Vec<SwapCurrency>> {
        if self.fail_currencies.load(Ordering::Relaxed) {
            return Err(eyre!("currency catalog is unavailable"));
        }
        Ok(self.currencies.lock().expect("currencies lock poisoned").clone())
    }

    async fn pairs(&self, ticker: &str, network: &str) -> Result<Vec<SwapCurrency>> {
        self.pairs_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_pairs.load(Ordering::Relaxed) {
            return Err(eyre!("pair listing is unavailable"));
        }

        let ids = self
            .pairs
            .lock()
            .expect("pairs lock poisoned")
            .get(&format!("{ticker}:{network}"))
            .cloned()
            .unwrap_or_default();

        let catalog = self.currencies.lock().expect("currencies lock poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| catalog.iter().find(|currency| &currency.id == id).cloned())
            .collect())
    }

    async fn range(&self, _from: &SwapCurrency, _to: &SwapCurrency) -> Result<SwapRange> {
        self.range_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_range.load(Ordering::Relaxed) {
            return Err(eyre!("range quote is unavailable"));
        }
        Ok(self.range.lock().expect("range lock poisoned").clone())
    }

    async fn estimate(
        &self,
        _from: &SwapCurrency,
        _to: &SwapCurrency,
        amount: &str,
    ) -> Result<String> {
        self.estimate_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_estimate.load(Ordering::Relaxed) {
            return Err(eyre!("estimate is unavailable"));
        }

        let amount = decimal::parse(amount).unwrap_or_else(BigDecimal::zero);
        Ok((amount * &self.rate).normalized().to_plain_string())
    }

    async fn create_exchange(&self, params: CreateExchangeParams) -> Result<CreatedExchange> {
        if self.fail_create.load(Ordering::Relaxed) {
            return Err(eyre!("exchange creation was rejected"));
        }

        let n = self.create_calls.fetch_add(1, Ordering::Relaxed) + 1;
        self.created
            .lock()
            .expect("created lock poisoned")
            .push(params);
        Ok(CreatedExchange {
            id: format!("exchange-{n}"),
            deposit_address: self.deposit_address.clone(),
            log: None,
        })
    }

    async fn exchange(&self, id: &str) -> Result<ExchangeInfo> {
        self.exchanges
            .lock()
            .expect("exchanges lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| eyre!("exchange {id} does not exist"))
    }
}
