//! Shared HTTP plumbing for the polling workers.

use std::time::Duration;
use thiserror::Error;

/// Errors from fetching and decoding an HTTP API response.
///
/// Workers treat every variant the same way: log it and skip the cycle.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network, TLS or protocol failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The body did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Build the HTTP client shared by the API adapters.
pub fn client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("status-board/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// GET `url` with `query` and decode the JSON body into `T`.
///
/// Decoding errors surface as [`FetchError::Malformed`] so a missing key is
/// reported separately from a network failure.
pub async fn get_json<T, Q>(
    client: &reqwest::Client,
    url: &str,
    query: &Q,
) -> Result<T, FetchError>
where
    T: serde::de::DeserializeOwned,
    Q: serde::Serialize + ?Sized,
{
    let response = client.get(url).query(query).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))
}
