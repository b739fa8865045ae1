// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP client wrapper with authentication and status mapping.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};

use crate::config::{AuthMethod, CalDavConfig};
use crate::error::CalDavError;
use crate::response::has_precondition;
use crate::types::Href;

/// Precondition element a server reports when it rejects a sync token.
const VALID_SYNC_TOKEN: &str = "valid-sync-token";

/// HTTP client for `CalDAV` operations.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    config: CalDavConfig,
}

impl HttpClient {
    /// Creates a new HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: CalDavConfig) -> Result<Self, CalDavError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self { client, config })
    }

    /// Builds a request with authentication headers.
    pub fn build_request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut req = self.client.request(method, url);

        match &self.config.auth {
            AuthMethod::Basic { username, password } => {
                req = req.basic_auth(username, Some(password));
            }
            AuthMethod::Bearer { token } => {
                req = req.bearer_auth(token);
            }
            AuthMethod::None => {}
        }

        req
    }

    /// Builds a request for an extension method such as PROPFIND or REPORT.
    ///
    /// # Errors
    ///
    /// Returns an error if the method name is not a valid HTTP token.
    pub fn build_dav_request(&self, method: &str, url: &str) -> Result<RequestBuilder, CalDavError> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| CalDavError::Http(format!("Invalid method: {e}")))?;
        Ok(self
            .build_request(method, url)
            .header("Content-Type", "application/xml; charset=utf-8"))
    }

    /// Executes a request and maps error statuses to [`CalDavError`].
    ///
    /// `href` names the resource the request targets and is carried in
    /// resource-specific errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or returns an error status code.
    /// A `DAV:valid-sync-token` precondition in a 4xx body becomes
    /// [`CalDavError::InvalidSyncToken`].
    pub async fn execute(&self, req: RequestBuilder, href: &Href) -> Result<Response, CalDavError> {
        let resp = req.send().await?;

        match resp.status() {
            StatusCode::OK
            | StatusCode::CREATED
            | StatusCode::NO_CONTENT
            | StatusCode::MULTI_STATUS => Ok(resp),
            StatusCode::NOT_FOUND => Err(CalDavError::NotFound(href.clone())),
            StatusCode::UNAUTHORIZED => Err(CalDavError::Auth(format!(
                "server rejected credentials for {href}"
            ))),
            status if status.is_client_error() => {
                let text = resp.text().await.unwrap_or_default();
                if has_precondition(&text, VALID_SYNC_TOKEN) {
                    Err(CalDavError::InvalidSyncToken(href.clone()))
                } else if status == StatusCode::FORBIDDEN {
                    Err(CalDavError::Auth(format!("access to {href} forbidden")))
                } else {
                    Err(CalDavError::Http(format!("{status}: {text}")))
                }
            }
            status => {
                let text = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read response".to_string());
                Err(CalDavError::Http(format!("{status}: {text}")))
            }
        }
    }
}
