//! REST Fallback Module
//!
//! HTTP client for the market data REST API, used while the streaming
//! transport is down.
//!
//! Two read endpoints are consumed:
//!
//! - `GET {base}/markets/{symbol}/price` — current price for one symbol,
//!   wrapped in a `{"success":bool,"data":{...}}` envelope.
//! - `GET {base}/markets/stats` — statistics rows for all symbols, as a
//!   bare array or wrapped in the same envelope.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{FetchError, MarketDataSource};
use crate::domain::price::PriceUpdate;
use crate::infrastructure::config::RestSettings;

// =============================================================================
// Wire shapes
// =============================================================================

/// Current-price payload for one symbol.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentPriceData {
    symbol: String,
    price: Decimal,
    #[serde(default)]
    change24h: Option<Decimal>,
    #[serde(default)]
    change_percent24h: Option<Decimal>,
    #[serde(default)]
    high24h: Option<Decimal>,
    #[serde(default)]
    low24h: Option<Decimal>,
    #[serde(default)]
    volume24h: Option<Decimal>,
}

impl From<CurrentPriceData> for PriceUpdate {
    fn from(data: CurrentPriceData) -> Self {
        Self {
            symbol: data.symbol,
            price: data.price,
            change_24h: data.change24h,
            change_percent_24h: data.change_percent24h,
            high_24h: data.high24h,
            low_24h: data.low24h,
            volume_24h: data.volume24h,
            timestamp: None,
        }
    }
}

/// Envelope around the current-price payload.
#[derive(Debug, Deserialize)]
struct CurrentPriceResponse {
    success: bool,
    #[serde(default)]
    data: Option<CurrentPriceData>,
}

/// One market statistics row.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketStatsRow {
    symbol: String,
    price: Decimal,
    #[serde(default)]
    price_change24h: Option<Decimal>,
    #[serde(default)]
    price_change_percent24h: Option<Decimal>,
    #[serde(default)]
    volume24h: Option<Decimal>,
    #[serde(default)]
    high24h: Option<Decimal>,
    #[serde(default)]
    low24h: Option<Decimal>,
}

impl From<MarketStatsRow> for PriceUpdate {
    fn from(row: MarketStatsRow) -> Self {
        Self {
            symbol: row.symbol,
            price: row.price,
            change_24h: row.price_change24h,
            change_percent_24h: row.price_change_percent24h,
            high_24h: row.high24h,
            low_24h: row.low24h,
            volume_24h: row.volume24h,
            timestamp: None,
        }
    }
}

/// Stats payload, bare or enveloped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatsResponse {
    Enveloped {
        #[allow(dead_code)]
        success: bool,
        data: Vec<MarketStatsRow>,
    },
    Bare(Vec<MarketStatsRow>),
}

impl StatsResponse {
    fn into_rows(self) -> Vec<MarketStatsRow> {
        match self {
            Self::Enveloped { data, .. } | Self::Bare(data) => data,
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Market data source backed by the REST API.
#[derive(Debug)]
pub struct RestMarketData {
    client: reqwest::Client,
    base_url: String,
}

impl RestMarketData {
    /// Create a new adapter.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Request`] if the HTTP client cannot be
    /// built.
    pub fn new(settings: &RestSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.rest_base_url.clone(),
        })
    }

    async fn get_checked(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Api { status, message });
        }
        Ok(response)
    }
}

#[async_trait]
impl MarketDataSource for RestMarketData {
    async fn latest_price(&self, symbol: &str) -> Result<Option<PriceUpdate>, FetchError> {
        let url = format!("{}/markets/{symbol}/price", self.base_url);
        let response = self.get_checked(&url).await?;

        let payload: CurrentPriceResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        if !payload.success {
            return Ok(None);
        }
        Ok(payload.data.map(PriceUpdate::from))
    }

    async fn market_stats(&self) -> Result<Vec<PriceUpdate>, FetchError> {
        let url = format!("{}/markets/stats", self.base_url);
        let response = self.get_checked(&url).await?;

        let payload: StatsResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(payload
            .into_rows()
            .into_iter()
            .map(PriceUpdate::from)
            .collect())
    }
}
