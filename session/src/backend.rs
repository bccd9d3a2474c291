//! Backend identity API: the collaborator contract and its HTTP client.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session controller only talks to the backend through
//! [`IdentityBackend`], so tests swap in a scripted mock and the app plugs in
//! [`HttpBackend`]. Every request carries `Authorization: Bearer <credential>`
//! when a credential is in play.
//!
//! ERROR HANDLING
//! ==============
//! A 401 always maps to [`BackendError::Unauthorized`] regardless of the
//! endpoint; the controller turns that into a session-wide clear.

use std::time::Duration;

use serde::Deserialize;

use crate::config::{HttpTimeouts, SessionConfig};
use crate::identity::{Credential, UserIdentity};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by backend calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Transport failure: connection refused, DNS, timeout.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered 401 for the presented credential.
    #[error("backend rejected credential: unauthorized")]
    Unauthorized,

    /// The backend answered with another non-success status.
    #[error("backend rejected request: status {status}")]
    Rejected { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("backend response invalid: {0}")]
    InvalidResponse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl BackendError {
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================

/// Identity endpoints consumed by the session engine. Enables mocking in tests.
#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Exchange an identity-provider token for a backend credential.
    /// `Ok(None)` means the backend accepted the token but issued nothing new.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the call fails or is rejected.
    async fn verify(
        &self,
        provider_token: &Credential,
        bearer: Option<&Credential>,
    ) -> Result<Option<Credential>, BackendError>;

    /// Fetch the identity record the backend holds for `bearer`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the call fails or is rejected.
    async fn who_am_i(&self, bearer: &Credential) -> Result<UserIdentity, BackendError>;

    /// Tell the backend the session is over.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the call fails or is rejected.
    async fn logout(&self, bearer: Option<&Credential>) -> Result<(), BackendError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

/// [`IdentityBackend`] over HTTP+JSON.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    /// Build a client from parsed session config.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn from_config(config: &SessionConfig) -> Result<Self, BackendError> {
        Self::new(&config.api_url, config.timeouts)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        bearer: Option<&Credential>,
    ) -> Result<String, BackendError> {
        let request = match bearer {
            Some(credential) => request.bearer_auth(credential.expose()),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        check_status(status, body)
    }
}

#[async_trait::async_trait]
impl IdentityBackend for HttpBackend {
    async fn verify(
        &self,
        provider_token: &Credential,
        bearer: Option<&Credential>,
    ) -> Result<Option<Credential>, BackendError> {
        let request = self
            .http
            .post(endpoint(&self.base_url, VERIFY_PATH))
            .json(&serde_json::json!({ "token": provider_token.expose() }));
        let body = self.send(request, bearer).await?;
        parse_verify_response(&body)
    }

    async fn who_am_i(&self, bearer: &Credential) -> Result<UserIdentity, BackendError> {
        let request = self.http.get(endpoint(&self.base_url, ME_PATH));
        let body = self.send(request, Some(bearer)).await?;
        parse_me_response(&body)
    }

    async fn logout(&self, bearer: Option<&Credential>) -> Result<(), BackendError> {
        let request = self.http.post(endpoint(&self.base_url, LOGOUT_PATH));
        self.send(request, bearer).await?;
        Ok(())
    }
}

// =============================================================================
// WIRE HELPERS
// =============================================================================

const VERIFY_PATH: &str = "/auth/verify";
const ME_PATH: &str = "/auth/me";
const LOGOUT_PATH: &str = "/auth/logout";

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{base_url}{path}")
}

fn check_status(status: u16, body: String) -> Result<String, BackendError> {
    match status {
        200..=299 => Ok(body),
        401 => Err(BackendError::Unauthorized),
        _ => Err(BackendError::Rejected { status, body }),
    }
}

#[derive(Deserialize)]
struct MeResponse {
    user: UserIdentity,
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    token: Option<String>,
}

fn parse_me_response(body: &str) -> Result<UserIdentity, BackendError> {
    serde_json::from_str::<MeResponse>(body)
        .map(|resp| resp.user)
        .map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

fn parse_verify_response(body: &str) -> Result<Option<Credential>, BackendError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let resp: VerifyResponse = serde_json::from_str(body).map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
    Ok(resp.token.as_deref().and_then(Credential::parse))
}

#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;
