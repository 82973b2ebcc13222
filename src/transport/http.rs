//! HTTP transport for Redfish services

use super::{Response, Transport};
use crate::model::Locator;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, ETAG, IF_MATCH};
use reqwest::{Client, RequestBuilder};
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and drops non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Basic credentials sent with every request
#[derive(Clone)]
struct Credentials {
    username: String,
    password: Option<String>,
}

/// `reqwest`-backed [`Transport`]
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    /// Create a transport for the service at `base`
    pub fn new(base: Url) -> Result<Self> {
        Self::builder(base, false)
    }

    /// Create a transport that accepts self-signed certificates
    ///
    /// BMCs ship with self-signed certificates more often than not.
    pub fn insecure(base: Url) -> Result<Self> {
        Self::builder(base, true)
    }

    fn builder(base: Url, accept_invalid_certs: bool) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("rfgraph/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base,
            credentials: None,
        })
    }

    /// Send HTTP basic credentials with every request
    pub fn with_basic_auth(mut self, username: &str, password: Option<&str>) -> Self {
        self.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.map(str::to_string),
        });
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for a locator
    pub fn url_for(&self, locator: &Locator) -> Result<Url> {
        self.base
            .join(locator.as_str())
            .with_context(|| format!("Invalid locator: {}", locator))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, creds.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, method: &str, url: &Url, request: RequestBuilder) -> Result<Response> {
        tracing::debug!("{} {}", method, url);

        let response = self
            .authorize(request)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let etag = etag_header(response.headers());
        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?
            .to_vec();

        if !status.is_success() {
            // Only log a sanitized, truncated body
            tracing::error!(
                "API error: {} - {}",
                status,
                sanitize_for_log(&String::from_utf8_lossy(&body))
            );
        }

        Ok(Response {
            status: status.as_u16(),
            body,
            etag,
        })
    }
}

fn etag_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, locator: &Locator) -> Result<Response> {
        let url = self.url_for(locator)?;
        let request = self.client.get(url.clone());
        self.send("GET", &url, request).await
    }

    async fn patch(
        &self,
        locator: &Locator,
        body: &[u8],
        if_match: Option<&str>,
    ) -> Result<Response> {
        let url = self.url_for(locator)?;
        let mut request = self
            .client
            .patch(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec());
        if let Some(etag) = if_match {
            request = request.header(IF_MATCH, etag);
        }
        self.send("PATCH", &url, request).await
    }

    async fn post(&self, locator: &Locator, body: &[u8]) -> Result<Response> {
        let url = self.url_for(locator)?;
        let request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec());
        self.send("POST", &url, request).await
    }

    async fn delete(&self, locator: &Locator) -> Result<Response> {
        let url = self.url_for(locator)?;
        let request = self.client.delete(url.clone());
        self.send("DELETE", &url, request).await
    }
}

/// Format a transport failure for display
///
/// `status` is the HTTP status when the service answered, `None` when the
/// request never completed. Raw service messages are not shown to users.
pub fn format_transport_error(status: Option<u16>) -> String {
    match status {
        Some(401) => "Authentication failed. Check the username and RFGRAPH_PASSWORD.".to_string(),
        Some(403) => "Permission denied. The account lacks the required privilege.".to_string(),
        Some(404) => "Resource not found.".to_string(),
        Some(405) => "Operation not supported by this resource.".to_string(),
        Some(409) => "Resource conflict. The resource may be in use.".to_string(),
        Some(412) => "Resource changed since it was read. Fetch it again and retry.".to_string(),
        Some(429) => "Rate limit exceeded. Please try again later.".to_string(),
        Some(400) => "Invalid request. Check your parameters.".to_string(),
        Some(500) | Some(503) => "Service temporarily unavailable. Please try again.".to_string(),
        Some(code) => format!("Request failed with HTTP {}.", code),
        None => "Request failed. Check your network connection and try again.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.contains("500 bytes total"));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("a\nb\tc d"), "abc d");
    }

    #[test]
    fn test_url_for_joins_against_base() {
        let transport = HttpTransport::new(Url::parse("https://bmc.example").unwrap()).unwrap();
        let url = transport
            .url_for(&Locator::new("/redfish/v1/Chassis/1"))
            .unwrap();
        assert_eq!(url.as_str(), "https://bmc.example/redfish/v1/Chassis/1");
    }

    #[test]
    fn test_format_transport_error() {
        assert_eq!(format_transport_error(Some(404)), "Resource not found.");
        assert!(format_transport_error(Some(401)).contains("Authentication"));
        assert!(format_transport_error(Some(418)).contains("418"));
        assert!(format_transport_error(None).contains("network"));
    }
}
