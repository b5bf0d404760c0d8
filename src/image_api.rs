//! Image lookup client
//!
//! One GET against a fixed endpoint; a 200 with a non-empty `url` field is
//! the only success.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during an image lookup
#[derive(Debug, Error)]
pub enum ImageApiError {
    /// Connectivity failure or timeout
    #[error("Network error: {0}")]
    Network(String),
    /// Non-200 status
    #[error("Api endpoint returned status {0}")]
    Status(u16),
    /// Body is not the expected JSON
    #[error("Malformed response: {0}")]
    Malformed(String),
    /// Body parsed but carried no url
    #[error("Api endpoint did not respond with a url")]
    EmptyUrl,
}

/// Source of image URLs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch one image URL
    async fn fetch_url(&self) -> Result<String, ImageApiError>;
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    url: String,
}

/// Interpret a raw response from the image endpoint.
///
/// # Errors
///
/// Returns `Status` for anything but 200, `Malformed` if the body does not
/// parse, and `EmptyUrl` if the `url` field is missing or empty.
pub fn interpret_response(status: StatusCode, body: &[u8]) -> Result<String, ImageApiError> {
    if status != StatusCode::OK {
        return Err(ImageApiError::Status(status.as_u16()));
    }

    let parsed: ApiResponse =
        serde_json::from_slice(body).map_err(|e| ImageApiError::Malformed(e.to_string()))?;

    if parsed.url.is_empty() {
        return Err(ImageApiError::EmptyUrl);
    }
    Ok(parsed.url)
}

/// [`ImageSource`] backed by the HTTP endpoint
pub struct HttpImageSource {
    client: HttpClient,
    endpoint: String,
}

impl HttpImageSource {
    /// Creates a client with an explicit request timeout.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| HttpClient::new());

        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch_url(&self) -> Result<String, ImageApiError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| ImageApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ImageApiError::Network(e.to_string()))?;

        interpret_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_with_url() {
        let url = interpret_response(StatusCode::OK, br#"{"url":"https://i.example/f.jpg"}"#);
        assert_eq!(url.ok().as_deref(), Some("https://i.example/f.jpg"));
    }

    #[test]
    fn test_non_200_is_failure() {
        let err = interpret_response(StatusCode::SERVICE_UNAVAILABLE, br#"{"url":"x"}"#);
        assert!(matches!(err, Err(ImageApiError::Status(503))));

        // Other 2xx codes are not accepted either
        let err = interpret_response(StatusCode::NO_CONTENT, b"");
        assert!(matches!(err, Err(ImageApiError::Status(204))));
    }

    #[test]
    fn test_malformed_body() {
        let err = interpret_response(StatusCode::OK, b"<html>oops</html>");
        assert!(matches!(err, Err(ImageApiError::Malformed(_))));
    }

    #[test]
    fn test_missing_or_empty_url() {
        let err = interpret_response(StatusCode::OK, br#"{"url":""}"#);
        assert!(matches!(err, Err(ImageApiError::EmptyUrl)));

        let err = interpret_response(StatusCode::OK, br#"{"id":7}"#);
        assert!(matches!(err, Err(ImageApiError::EmptyUrl)));
    }
}
