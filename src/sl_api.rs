//! # SL Real-time Departures Client
//!
//! Fetches departures from the SL "realtimedeparturesV4" API:
//!
//! ```text
//! GET {base_url}?key={api_key}&siteid={site_id}&timewindow={minutes}
//! ```
//!
//! Only the bus list is used. The API reports errors in-band with a
//! `StatusCode`/`Message` pair and a null `ResponseData`; both surface as
//! [`FetchError::Malformed`].

use crate::http::{self, FetchError};
use crate::transit::{DepartureSource, RawDeparture};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeparturesResponse {
    #[serde(default)]
    status_code: i64,
    #[serde(default)]
    message: Option<String>,
    response_data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseData {
    buses: Vec<BusDeparture>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BusDeparture {
    line_number: String,
    journey_direction: u8,
    time_tabled_date_time: String,
    expected_date_time: String,
    destination: String,
}

impl From<BusDeparture> for RawDeparture {
    fn from(bus: BusDeparture) -> Self {
        RawDeparture {
            line: bus.line_number,
            direction_code: bus.journey_direction,
            scheduled: bus.time_tabled_date_time,
            expected: bus.expected_date_time,
            destination: bus.destination,
        }
    }
}

/// Parse a departures response body into raw departures.
fn parse_response(response: DeparturesResponse) -> Result<Vec<RawDeparture>, FetchError> {
    let data = response.response_data.ok_or_else(|| {
        FetchError::Malformed(format!(
            "no ResponseData (status {}: {})",
            response.status_code,
            response.message.as_deref().unwrap_or("no message")
        ))
    })?;
    Ok(data.buses.into_iter().map(RawDeparture::from).collect())
}

/// HTTP client for the SL departures API.
pub struct SlClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SlClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        SlClient {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl DepartureSource for SlClient {
    async fn fetch_departures(
        &self,
        site_id: u32,
        window_minutes: u32,
    ) -> Result<Vec<RawDeparture>, FetchError> {
        let site_id = site_id.to_string();
        let window = window_minutes.to_string();
        let query = [
            ("key", self.api_key.as_str()),
            ("siteid", site_id.as_str()),
            ("timewindow", window.as_str()),
        ];
        let response: DeparturesResponse =
            http::get_json(&self.client, &self.base_url, &query[..]).await?;
        parse_response(response)
    }
}
