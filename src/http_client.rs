use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{redirect, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::CredentialManager;
use crate::config::ClientConfig;
use crate::error::{GraphError, Result};

/// Per-call transport options passed through to the request unchanged
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Extra headers; these win over the managed Authorization header
    pub headers: HeaderMap,

    /// Query string pairs
    pub query: Vec<(String, String)>,

    /// Request body
    pub body: Option<Vec<u8>>,

    /// Follow redirects (default: true)
    pub follow_redirects: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            follow_redirects: true,
        }
    }
}

/// HTTP client for Graph that attaches the application token
/// and retries once when the token is rejected
pub struct GraphHttpClient {
    /// Shared HTTP client with connection pooling (follows redirects)
    client: Client,

    /// Same settings, redirects disabled
    no_redirect_client: Client,

    /// Credential manager
    credentials: Arc<CredentialManager>,

    /// Graph base URL, without trailing slash
    base_url: String,
}

impl GraphHttpClient {
    /// Create a new dispatcher
    pub fn new(credentials: Arc<CredentialManager>, config: &ClientConfig) -> Result<Self> {
        let builder = || {
            Client::builder()
                .pool_max_idle_per_host(config.max_connections)
                .connect_timeout(Duration::from_secs(config.connect_timeout))
                .timeout(Duration::from_secs(config.request_timeout))
        };

        let client = builder().build()?;
        let no_redirect_client = builder().redirect(redirect::Policy::none()).build()?;

        Ok(Self {
            client,
            no_redirect_client,
            credentials,
            base_url: config.graph_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full URL for a path relative to the Graph base
    pub fn url(&self, path_suffix: &str) -> String {
        format!("{}{}", self.base_url, path_suffix)
    }

    /// Credential manager backing this dispatcher
    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    /// Execute an authenticated request
    /// Handles 401 by forcing a token refresh and reissuing the request once.
    /// Any other non-2xx status is returned as `GraphError::Http` without retry.
    pub fn execute(
        &self,
        method: Method,
        path_suffix: &str,
        options: &RequestOptions,
    ) -> Result<Response> {
        let url = self.url(path_suffix);
        tracing::debug!(method = %method, url = %url, "Sending Graph request");

        let token = self.credentials.current()?;
        let mut response = self.send(&method, &url, options, &token)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(url = %url, "Received 401, refreshing token and retrying once...");
            self.credentials.mark_rejected();

            let token = self.credentials.force_refresh()?;
            response = self.send(&method, &url, options, &token)?;

            if response.status() == StatusCode::UNAUTHORIZED {
                self.credentials.mark_rejected();
            }
        }

        let status = response.status();
        if status.is_success() {
            tracing::debug!(status = %status, "Request successful");
            return Ok(response);
        }

        let error_text = response.text().unwrap_or_default();
        tracing::warn!(
            status = status.as_u16(),
            url = %url,
            response_body = %error_text,
            "Graph request failed with error response"
        );

        Err(GraphError::Http {
            status: status.as_u16(),
            body: error_text,
        })
    }

    /// Issue one attempt with the given bearer token
    fn send(
        &self,
        method: &Method,
        url: &str,
        options: &RequestOptions,
        token: &str,
    ) -> Result<Response> {
        let headers = merge_headers(&options.headers, token)?;

        let client = if options.follow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };

        let mut request = client.request(method.clone(), url).headers(headers);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(ref body) = options.body {
            request = request.body(body.clone());
        }

        let response = request.send()?;
        tracing::debug!(status = %response.status(), "Received HTTP response");
        Ok(response)
    }
}

/// Caller headers plus `Authorization: Bearer`, caller wins on collision
fn merge_headers(caller: &HeaderMap, token: &str) -> Result<HeaderMap> {
    let mut headers = caller.clone();
    if !headers.contains_key(AUTHORIZATION) {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            GraphError::Authentication {
                status: None,
                message: "access token is not a valid header value".to_string(),
            }
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}
