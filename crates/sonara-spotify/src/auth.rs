// SPDX-License-Identifier: GPL-3.0-or-later

//! Access-token providers and the shared credential context.
//!
//! Two OAuth2 flows are supported: client credentials (app-only token, no
//! user context) and authorization code (user-scoped token that can be
//! refreshed). A fixed bearer token is accepted as well.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::AuthError;

pub const TOKEN_URL: &str = sonara_config::DEFAULT_TOKEN_URL;
pub const AUTHORIZE_URL: &str = sonara_config::DEFAULT_AUTHORIZE_URL;

/// Tokens are treated as expired this long before the server says so.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The token to attach to the next request, acquiring one if needed.
    async fn current_token(&self) -> Result<String, AuthError>;

    /// Obtain a new token, replacing the current one.
    async fn refresh(&self) -> Result<String, AuthError>;

    fn supports_refresh(&self) -> bool {
        true
    }
}

/// A fixed bearer token that cannot be renewed.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn current_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        Err(AuthError::NotRefreshable("static access token"))
    }

    fn supports_refresh(&self) -> bool {
        false
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn from_response(response: &TokenResponse) -> Self {
        Self {
            access_token: response.access_token.clone(),
            expires_at: response
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs).saturating_sub(EXPIRY_SKEW)),
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// POST a form to the token endpoint with HTTP Basic client authentication.
async fn request_token(
    http: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, AuthError> {
    debug!(target: "auth", grant_type = form[0].1, "requesting access token");

    let response = http
        .post(token_url)
        .basic_auth(client_id, Some(client_secret))
        .form(form)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = match serde_json::from_str::<TokenErrorBody>(&body) {
            Ok(parsed) => match parsed.error_description {
                Some(description) => format!("{}: {}", parsed.error, description),
                None => parsed.error,
            },
            Err(_) if body.is_empty() => "unknown error".to_string(),
            Err(_) => body,
        };
        return Err(AuthError::TokenEndpoint {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| AuthError::TokenEndpoint {
        status: status.as_u16(),
        message: format!("malformed token response: {e}"),
    })
}

/// App-only token obtained with the client-credentials grant.
#[derive(Debug)]
pub struct ClientCredentials {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<CachedToken>>,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            token_url: TOKEN_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: RwLock::new(None),
        }
    }

    /// Set a custom token endpoint (useful for testing with mock servers).
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    async fn fetch_locked(&self, slot: &mut Option<CachedToken>) -> Result<String, AuthError> {
        let response = request_token(
            &self.http,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &[("grant_type", "client_credentials")],
        )
        .await?;
        let cached = CachedToken::from_response(&response);
        let token = cached.access_token.clone();
        *slot = Some(cached);
        info!(target: "auth", "client credentials token acquired");
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn current_token(&self) -> Result<String, AuthError> {
        if let Some(cached) = self.token.read().await.as_ref().filter(|t| t.is_fresh()) {
            return Ok(cached.access_token.clone());
        }

        let mut slot = self.token.write().await;
        // Another caller may have fetched while we waited for the write lock.
        if let Some(cached) = slot.as_ref().filter(|t| t.is_fresh()) {
            return Ok(cached.access_token.clone());
        }
        self.fetch_locked(&mut slot).await
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        let mut slot = self.token.write().await;
        self.fetch_locked(&mut slot).await
    }
}

#[derive(Debug, Default)]
struct UserTokens {
    access: Option<CachedToken>,
    refresh_token: Option<String>,
}

/// User-scoped token obtained with the authorization-code grant.
///
/// Either start from a stored refresh token with [`with_refresh_token`], or
/// send the user to [`authorize_url`] and complete the flow with
/// [`exchange_code`].
///
/// [`with_refresh_token`]: AuthorizationCode::with_refresh_token
/// [`authorize_url`]: AuthorizationCode::authorize_url
/// [`exchange_code`]: AuthorizationCode::exchange_code
#[derive(Debug)]
pub struct AuthorizationCode {
    http: Client,
    token_url: String,
    authorize_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    tokens: RwLock<UserTokens>,
}

impl AuthorizationCode {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            token_url: TOKEN_URL.to_string(),
            authorize_url: AUTHORIZE_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            tokens: RwLock::new(UserTokens::default()),
        }
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn authorize_endpoint(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.tokens.get_mut().refresh_token = Some(refresh_token.into());
        self
    }

    /// URL the user must visit to grant access.
    pub fn authorize_url(
        &self,
        scopes: &[&str],
        state: &str,
        show_dialog: bool,
    ) -> Result<String, AuthError> {
        let scope = scopes.join(" ");
        let mut query = vec![
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("state", state),
        ];
        if !scope.is_empty() {
            query.push(("scope", scope.as_str()));
        }
        if show_dialog {
            query.push(("show_dialog", "true"));
        }

        Url::parse_with_params(&self.authorize_url, &query)
            .map(String::from)
            .map_err(|e| AuthError::InvalidUrl(e.to_string()))
    }

    /// Complete the flow with the `code` and `state` the redirect carried.
    pub async fn exchange_code(
        &self,
        code: &str,
        returned_state: &str,
        expected_state: &str,
    ) -> Result<String, AuthError> {
        if returned_state != expected_state {
            return Err(AuthError::StateMismatch);
        }

        let response = request_token(
            &self.http,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.redirect_uri),
            ],
        )
        .await?;

        let mut tokens = self.tokens.write().await;
        tokens.access = Some(CachedToken::from_response(&response));
        if response.refresh_token.is_some() {
            tokens.refresh_token = response.refresh_token;
        }
        info!(target: "auth", "authorization code exchanged");
        Ok(response.access_token)
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens.read().await.refresh_token.clone()
    }

    async fn refresh_locked(&self, tokens: &mut UserTokens) -> Result<String, AuthError> {
        let refresh_token = tokens
            .refresh_token
            .clone()
            .ok_or(AuthError::Missing("refresh token"))?;

        let response = request_token(
            &self.http,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", &refresh_token),
            ],
        )
        .await?;

        tokens.access = Some(CachedToken::from_response(&response));
        // Spotify may rotate the refresh token; keep the newest one.
        if response.refresh_token.is_some() {
            tokens.refresh_token = response.refresh_token;
        }
        info!(target: "auth", "user access token refreshed");
        Ok(response.access_token)
    }
}

#[async_trait]
impl TokenProvider for AuthorizationCode {
    async fn current_token(&self) -> Result<String, AuthError> {
        if let Some(cached) = self.tokens.read().await.access.as_ref().filter(|t| t.is_fresh()) {
            return Ok(cached.access_token.clone());
        }

        let mut tokens = self.tokens.write().await;
        if let Some(cached) = tokens.access.as_ref().filter(|t| t.is_fresh()) {
            return Ok(cached.access_token.clone());
        }
        self.refresh_locked(&mut tokens).await
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        let mut tokens = self.tokens.write().await;
        self.refresh_locked(&mut tokens).await
    }
}

/// Credential context shared by every request a client issues.
///
/// Reads are concurrent. Refreshes triggered by a rejected token go through
/// a single gate: the first caller refreshes, later callers that were
/// rejected with the same stale token pick up the new one instead.
#[derive(Clone, Default)]
pub struct Credentials {
    provider: Option<Arc<dyn TokenProvider>>,
    refresh_gate: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("authenticated", &self.provider.is_some())
            .finish()
    }
}

impl Credentials {
    /// No `Authorization` header is sent.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(provider: impl TokenProvider + 'static) -> Self {
        Self::from_provider(Arc::new(provider))
    }

    pub fn from_provider(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider: Some(provider),
            refresh_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new(StaticToken::new(token))
    }

    pub async fn token(&self) -> Result<Option<String>, AuthError> {
        match &self.provider {
            Some(provider) => provider.current_token().await.map(Some),
            None => Ok(None),
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.provider
            .as_ref()
            .is_some_and(|provider| provider.supports_refresh())
    }

    /// Replace `stale` with a fresh token, at most one refresh in flight.
    pub async fn refresh_after(&self, stale: &str) -> Result<String, AuthError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(AuthError::NotRefreshable("anonymous client"))?;

        let _gate = self.refresh_gate.lock().await;

        let current = provider.current_token().await?;
        if current != stale {
            debug!(target: "auth", "token already refreshed by a concurrent request");
            return Ok(current);
        }

        warn!(target: "auth", "access token rejected, refreshing");
        provider.refresh().await
    }
}
