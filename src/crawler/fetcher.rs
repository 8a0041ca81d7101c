//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests made by page sources, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests for HTML listings
//! - JSON POST requests for API listings
//! - Error classification into `HarvestError::Transport` / `Parse`
//!
//! There is no retry here: a failed request ends the walk that made it.

use crate::config::UserAgentConfig;
use crate::HarvestError;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use pagewalk::config::UserAgentConfig;
/// use pagewalk::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "pagewalk".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Format: Name/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Maps a request failure to a transport error
fn classify(url: &str, error: reqwest::Error) -> HarvestError {
    if error.is_timeout() {
        HarvestError::transport(url, "request timeout")
    } else if error.is_connect() {
        HarvestError::transport(url, "connection refused")
    } else {
        HarvestError::transport(url, error)
    }
}

/// Rejects non-2xx responses
fn check_status(url: &str, response: Response) -> Result<Response, HarvestError> {
    let status = response.status();
    if !status.is_success() {
        return Err(HarvestError::transport(url, format!("HTTP {}", status.as_u16())));
    }
    Ok(response)
}

/// Fetches a page body as text
///
/// # Returns
///
/// * `Ok(String)` - The response body
/// * `Err(HarvestError::Transport)` - Network failure or non-2xx status
pub async fn fetch_text(client: &Client, url: &str) -> Result<String, HarvestError> {
    tracing::debug!("GET {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify(url, e))?;
    let response = check_status(url, response)?;

    response.text().await.map_err(|e| classify(url, e))
}

/// Posts a JSON body and decodes a JSON response
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The endpoint
/// * `body` - Request payload
/// * `headers` - Extra request headers (session tokens and the like)
///
/// # Returns
///
/// * `Ok(Value)` - The decoded response
/// * `Err(HarvestError::Transport)` - Network failure or non-2xx status
/// * `Err(HarvestError::Parse)` - The body was not JSON
pub async fn post_json(
    client: &Client,
    url: &str,
    body: &Value,
    headers: &[(&str, &str)],
) -> Result<Value, HarvestError> {
    tracing::debug!("POST {}", url);

    let mut request = client.post(url).json(body);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let response = request.send().await.map_err(|e| classify(url, e))?;
    let response = check_status(url, response)?;
    let text = response.text().await.map_err(|e| classify(url, e))?;

    serde_json::from_str(&text)
        .map_err(|e| HarvestError::parse(format!("invalid JSON from {}: {}", url, e)))
}
