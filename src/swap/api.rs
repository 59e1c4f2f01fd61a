//! REST client for the swap aggregator
//!
//! Wire shapes follow the aggregator's camelCase JSON, with every payload
//! wrapped in a `result` envelope. The full currency catalog is cached
//! after the first fetch; pair responses reference currencies by their
//! `"{ticker}:{network}"` id and are served from that cache.

use super::{
    CreateExchangeParams, CreatedExchange, ExchangeInfo, SwapAggregator, SwapCurrency, SwapRange,
};
use crate::types::normalize_token_hash;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ResultEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrencyWire {
    #[serde(default)]
    ticker: Option<String>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    has_extra_id: bool,
    #[serde(default)]
    validation_address: Option<String>,
    #[serde(default)]
    validation_extra: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeWire {
    min: String,
    #[serde(default)]
    max: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateWire {
    estimated_amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateExchangeWire<'a> {
    ticker_from: &'a str,
    network_from: &'a str,
    ticker_to: &'a str,
    network_to: &'a str,
    amount: &'a str,
    user_refund_address: &'a str,
    address_to: &'a str,
    extra_id_to: Option<&'a str>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeWire {
    id: String,
    #[serde(default)]
    address_from: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tx_from: Option<String>,
    #[serde(default)]
    tx_to: Option<String>,
}

/// HTTP implementation of [`SwapAggregator`]
pub struct HttpSwapAggregator {
    base_url: Url,
    client: reqwest::Client,
    catalog: Mutex<HashMap<String, SwapCurrency>>,
}

impl HttpSwapAggregator {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).wrap_err("invalid swap aggregator base url")?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("failed to create HTTP client")?;

        Ok(Self {
            base_url,
            client,
            catalog: Mutex::new(HashMap::new()),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| eyre!("swap aggregator base url cannot carry path segments"))?
            .extend(segments);
        Ok(url)
    }

    fn currency_from_wire(wire: CurrencyWire) -> Option<SwapCurrency> {
        let ticker = wire.ticker?;
        let network = wire.network?;
        let name = wire.name?;
        let validation_address = wire.validation_address?;

        Some(SwapCurrency {
            id: format!("{ticker}:{network}"),
            symbol: ticker.clone(),
            ticker,
            name,
            network,
            hash: wire.contract_address.map(|hash| normalize_token_hash(&hash)),
            decimals: None,
            chain: None,
            has_extra_id: wire.has_extra_id,
            validation_address,
            validation_extra: wire.validation_extra,
        })
    }

    async fn fetch_catalog(&self) -> Result<Vec<SwapCurrency>> {
        let response = self
            .client
            .get(self.endpoint(&["currencies"])?)
            .send()
            .await?;
        let wires: Vec<CurrencyWire> = parse_result(response).await?;

        let currencies: Vec<SwapCurrency> = wires
            .into_iter()
            .filter_map(Self::currency_from_wire)
            .collect();
        debug!(count = currencies.len(), "fetched swap currency catalog");

        let mut catalog = self.catalog.lock().expect("catalog lock poisoned");
        for currency in &currencies {
            catalog.insert(currency.id.clone(), currency.clone());
        }
        Ok(currencies)
    }
}

#[async_trait]
impl SwapAggregator for HttpSwapAggregator {
    async fn currencies(&self) -> Result<Vec<SwapCurrency>> {
        {
            let catalog = self.catalog.lock().expect("catalog lock poisoned");
            if !catalog.is_empty() {
                return Ok(catalog.values().cloned().collect());
            }
        }
        self.fetch_catalog().await
    }

    async fn pairs(&self, ticker: &str, network: &str) -> Result<Vec<SwapCurrency>> {
        // pair responses are id references into the catalog
        if self.catalog.lock().expect("catalog lock poisoned").is_empty() {
            self.fetch_catalog().await?;
        }

        let response = self
            .client
            .get(self.endpoint(&["pairs", ticker, network])?)
            .send()
            .await?;
        let pairs_by_id: HashMap<String, Vec<String>> = parse_result(response).await?;

        let ids = pairs_by_id
            .get(&format!("{ticker}:{network}"))
            .cloned()
            .unwrap_or_default();

        let catalog = self.catalog.lock().expect("catalog lock poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| catalog.get(id).cloned())
            .collect())
    }

    async fn range(&self, from: &SwapCurrency, to: &SwapCurrency) -> Result<SwapRange> {
        let mut url = self.endpoint(&["ranges"])?;
        url.query_pairs_mut()
            .append_pair("tickerFrom", &from.ticker)
            .append_pair("tickerTo", &to.ticker)
            .append_pair("networkFrom", &from.network)
            .append_pair("networkTo", &to.network);

        let response = self.client.get(url).send().await?;
        let wire: RangeWire = parse_result(response).await?;
        Ok(SwapRange {
            min: wire.min,
            max: wire.max,
        })
    }

    async fn estimate(
        &self,
        from: &SwapCurrency,
        to: &SwapCurrency,
        amount: &str,
    ) -> Result<String> {
        let mut url = self.endpoint(&["estimates"])?;
        url.query_pairs_mut()
            .append_pair("tickerFrom", &from.ticker)
            .append_pair("tickerTo", &to.ticker)
            .append_pair("networkFrom", &from.network)
            .append_pair("networkTo", &to.network)
            .append_pair("amount", amount);

        let response = self.client.get(url).send().await?;
        let wire: EstimateWire = parse_result(response).await?;
        Ok(wire.estimated_amount)
    }

    async fn create_exchange(&self, params: CreateExchangeParams) -> Result<CreatedExchange> {
        let body = CreateExchangeWire {
            ticker_from: &params.currency_from.ticker,
            network_from: &params.currency_from.network,
            ticker_to: &params.currency_to.ticker,
            network_to: &params.currency_to.network,
            amount: &params.amount,
            user_refund_address: &params.refund_address,
            address_to: &params.address,
            extra_id_to: params.extra_id.as_deref().map(str::trim),
        };

        let response = self
            .client
            .post(self.endpoint(&["exchanges"])?)
            .json(&body)
            .send()
            .await?;
        let wire: ExchangeWire = parse_result(response).await?;

        let deposit_address = wire
            .address_from
            .clone()
            .ok_or_else(|| eyre!("exchange response is missing the deposit address"))?;
        Ok(CreatedExchange {
            id: wire.id.clone(),
            deposit_address,
            log: serde_json::to_string(&wire).ok(),
        })
    }

    async fn exchange(&self, id: &str) -> Result<ExchangeInfo> {
        let response = self
            .client
            .get(self.endpoint(&["exchanges", id])?)
            .send()
            .await?;
        let wire: ExchangeWire = parse_result(response).await?;

        Ok(ExchangeInfo {
            status: wire
                .status
                .clone()
                .ok_or_else(|| eyre!("exchange response is missing a status"))?,
            tx_from: wire.tx_from.clone(),
            tx_to: wire.tx_to.clone(),
            log: serde_json::to_string(&wire).ok(),
        })
    }
}

/// Unwrap the `result` envelope, surfacing the aggregator's own error
/// message when it provides one
async fn parse_result<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<ApiError>()
            .await
            .ok()
            .and_then(|error| error.message);
        return Err(match message {
            Some(message) => eyre!(message),
            None => eyre!("swap aggregator request failed with status {status}"),
        });
    }

    Ok(response.json::<ResultEnvelope<T>>().await?.result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(
        ticker: Option<&str>,
        network: Option<&str>,
        validation: Option<&str>,
    ) -> CurrencyWire {
        CurrencyWire {
            ticker: ticker.map(str::to_string),
            network: network.map(str::to_string),
            name: ticker.map(str::to_string),
            contract_address: Some("0xD2A4cff31913016155e38e474a2c06d08be276cf".to_string()),
            has_extra_id: false,
            validation_address: validation.map(str::to_string),
            validation_extra: None,
        }
    }

    #[test]
    fn test_currency_requires_ticker_network_and_pattern() {
        assert!(HttpSwapAggregator::currency_from_wire(wire(
            Some("gas"),
            Some("neo3"),
            Some("^N[0-9a-zA-Z]{33}$")
        ))
        .is_some());
        assert!(HttpSwapAggregator::currency_from_wire(wire(None, Some("neo3"), Some("."))).is_none());
        assert!(HttpSwapAggregator::currency_from_wire(wire(Some("gas"), None, Some("."))).is_none());
        assert!(HttpSwapAggregator::currency_from_wire(wire(Some("gas"), Some("neo3"), None)).is_none());
    }

    #[test]
    fn test_currency_id_and_hash_normalization() {
        let currency = HttpSwapAggregator::currency_from_wire(wire(
            Some("gas"),
            Some("neo3"),
            Some("^N[0-9a-zA-Z]{33}$"),
        ))
        .unwrap();

        assert_eq!(currency.id, "gas:neo3");
        assert_eq!(
            currency.hash.as_deref(),
            Some("0xd2a4cff31913016155e38e474a2c06d08be276cf")
        );
        assert!(currency.chain.is_none());
        assert!(currency.decimals.is_none());
    }

    #[test]
    fn test_endpoint_building() {
        let api = HttpSwapAggregator::new("https://aggregator.example/api/v2/swap").unwrap();
        let url = api.endpoint(&["pairs", "gas", "neo3"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://aggregator.example/api/v2/swap/pairs/gas/neo3"
        );
    }
}
