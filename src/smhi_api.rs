//! # SMHI Point Forecast Client
//!
//! Fetches the `pmp3g` point forecast:
//!
//! ```text
//! GET {base_url}/geotype/point/lon/{longitude}/lat/{latitude}/data.json
//! ```
//!
//! The response's `timeSeries` array is already ordered by validity time.

use crate::http::{self, FetchError};
use crate::weather::{ForecastEntry, ForecastSource};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastResponse {
    time_series: Vec<ForecastEntry>,
}

/// Build the forecast URL for a coordinate.
///
/// SMHI accepts at most six decimals.
fn forecast_url(base_url: &str, latitude: f64, longitude: f64) -> String {
    format!(
        "{}/geotype/point/lon/{:.6}/lat/{:.6}/data.json",
        base_url.trim_end_matches('/'),
        longitude,
        latitude
    )
}

/// HTTP client for the SMHI forecast API.
pub struct SmhiClient {
    client: reqwest::Client,
    base_url: String,
}

impl SmhiClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        SmhiClient { client, base_url }
    }
}

#[async_trait]
impl ForecastSource for SmhiClient {
    async fn fetch_forecast(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<ForecastEntry>, FetchError> {
        let url = forecast_url(&self.base_url, latitude, longitude);
        let no_query: [(&str, &str); 0] = [];
        let response: ForecastResponse = http::get_json(&self.client, &url, &no_query).await?;
        Ok(response.time_series)
    }
}
