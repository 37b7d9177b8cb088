use crate::stake::StakeRecord;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::{BTreeSet, HashMap};

pub const COINGECKO_API: &str = "https://api.coingecko.com/api/v3";

/// Asset identifier -> price in the session currency.
pub type PriceMap = HashMap<String, f64>;

/// Where current prices come from.
///
/// Implementations never fail: whatever could not be priced is simply
/// absent from the returned map.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_prices(&self, asset_ids: &BTreeSet<String>) -> PriceMap;
}

/// Distinct, non-empty price identifiers referenced by `records`.
pub fn asset_ids(records: &[StakeRecord]) -> BTreeSet<String> {
    records
        .iter()
        .map(StakeRecord::price_key)
        .filter(|id| !id.is_empty())
        .collect()
}

pub struct CoinGecko {
    client: Client,
    base_url: String,
    currency: String,
}

impl CoinGecko {
    pub fn new(base_url: &str, currency: &str) -> Self {
        CoinGecko {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            currency: currency.trim().to_lowercase(),
        }
    }

    fn simple_price_url(&self, asset_ids: &BTreeSet<String>) -> Result<reqwest::Url, String> {
        let ids = asset_ids.iter().cloned().collect::<Vec<_>>().join(",");
        let params = [("ids", ids.as_str()), ("vs_currencies", self.currency.as_str())];
        reqwest::Url::parse_with_params(&format!("{}/simple/price", self.base_url), &params)
            .map_err(|e| format!("Failed to build price URL: {e}"))
    }

    async fn request(&self, asset_ids: &BTreeSet<String>) -> Result<PriceMap, String> {
        let url = self.simple_price_url(asset_ids)?;
        log::debug!("Fetching prices: {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Price request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!(
                "Price API returned status {} (rate limited or unavailable)",
                response.status()
            ));
        }

        let data: SimplePrice = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse price response: {e}"))?;

        Ok(prices_in(data, &self.currency))
    }
}

#[async_trait]
impl PriceSource for CoinGecko {
    fn name(&self) -> &'static str {
        "CoinGecko"
    }

    async fn fetch_prices(&self, asset_ids: &BTreeSet<String>) -> PriceMap {
        if asset_ids.is_empty() {
            return PriceMap::new();
        }

        match self.request(asset_ids).await {
            Ok(prices) => {
                log::info!(
                    "Prices updated for {}/{} assets",
                    prices.len(),
                    asset_ids.len()
                );
                prices
            }
            Err(e) => {
                log::warn!("{e}; valuing all stakes at 0");
                PriceMap::new()
            }
        }
    }
}

/// A `/simple/price` body: `{"id": {"eur": 1.0}}`.
type SimplePrice = HashMap<String, HashMap<String, serde_json::Value>>;

/// Entries without a usable price for `currency` are dropped.
fn prices_in(data: SimplePrice, currency: &str) -> PriceMap {
    let currency = currency.to_lowercase();
    data.into_iter()
        .filter_map(|(id, quotes)| {
            let price = quotes.get(&currency)?.as_f64()?;
            (price.is_finite() && price >= 0.0).then_some((id, price))
        })
        .collect()
}

/// A fixed price table. With an empty table every stake values at 0.
#[derive(Debug, Clone, Default)]
pub struct StaticPrices(pub PriceMap);

#[async_trait]
impl PriceSource for StaticPrices {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn fetch_prices(&self, asset_ids: &BTreeSet<String>) -> PriceMap {
        asset_ids
            .iter()
            .filter_map(|id| self.0.get(id).map(|price| (id.clone(), *price)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prices_in_keeps_usable_quotes() {
        let body = r#"{
            "ethereum": {"eur": 2000.5},
            "usd-coin": {"usd": 1.0},
            "weird": {"eur": "n/a"}
        }"#;
        let prices = prices_in(serde_json::from_str(body).unwrap(), "EUR");
        assert_eq!(prices.len(), 1);
        assert_eq!(prices.get("ethereum"), Some(&2000.5));
    }

    #[tokio::test]
    async fn test_malformed_body_yields_empty_map() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let source = CoinGecko::new(&server.uri(), "eur");
        assert!(source.fetch_prices(&ids(&["ethereum"])).await.is_empty());
    }

    #[test]
    fn test_asset_ids_are_distinct_and_non_empty() {
        let body = r#"[
            {"platform": "Lido", "stakedToken": "ETH", "priceAssetId": "ethereum", "stakedQuantity": 1.5, "yieldRate": 3.5},
            {"platform": "Rocket Pool", "stakedToken": "ETH", "priceAssetId": "ethereum", "stakedQuantity": 2.0, "yieldRate": 3.1},
            {"platform": "Manual", "stakedToken": "XYZ", "priceAssetId": "", "stakedQuantity": 5.0, "yieldRate": 1.0},
            {"platform": "Kraken", "stakedToken": "DOT", "priceAssetId": " Polkadot ", "stakedQuantity": 10.0, "yieldRate": 12.0}
        ]"#;
        let records = crate::stake::from_string(body).unwrap();
        assert_eq!(asset_ids(&records), ids(&["ethereum", "polkadot"]));
    }

    #[tokio::test]
    async fn test_fetch_prices_batches_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "ethereum,usd-coin"))
            .and(query_param("vs_currencies", "eur"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"ethereum": {"eur": 2000}, "usd-coin": {"eur": 0.92}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = CoinGecko::new(&server.uri(), "EUR");
        let prices = source
            .fetch_prices(&ids(&["usd-coin", "ethereum"]))
            .await;
        assert_eq!(prices.get("ethereum"), Some(&2000.0));
        assert_eq!(prices.get("usd-coin"), Some(&0.92));
    }

    #[tokio::test]
    async fn test_unrecognized_ids_are_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"ethereum": {"eur": 2000}}"#),
            )
            .mount(&server)
            .await;

        let source = CoinGecko::new(&server.uri(), "eur");
        let prices = source
            .fetch_prices(&ids(&["ethereum", "not-a-coin"]))
            .await;
        assert_eq!(prices.len(), 1);
        assert!(!prices.contains_key("not-a-coin"));
    }

    #[tokio::test]
    async fn test_error_status_yields_empty_map() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let source = CoinGecko::new(&server.uri(), "eur");
        assert!(source.fetch_prices(&ids(&["ethereum"])).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_ids_make_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(0)
            .mount(&server)
            .await;

        let source = CoinGecko::new(&server.uri(), "eur");
        assert!(source.fetch_prices(&BTreeSet::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_yields_empty_map() {
        // nothing listens on port 9 locally
        let source = CoinGecko::new("http://127.0.0.1:9", "eur");
        assert!(source.fetch_prices(&ids(&["ethereum"])).await.is_empty());
    }

    #[tokio::test]
    async fn test_static_prices_only_returns_requested_ids() {
        let source = StaticPrices(PriceMap::from([
            ("ethereum".to_string(), 2000.0),
            ("polkadot".to_string(), 6.0),
        ]));
        let prices = source.fetch_prices(&ids(&["ethereum", "solana"])).await;
        assert_eq!(prices, PriceMap::from([("ethereum".to_string(), 2000.0)]));
    }
}
