// SPDX-License-Identifier: GPL-3.0-or-later

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use sonara_config::AppConfig;

use crate::auth::{AuthorizationCode, ClientCredentials, Credentials};
use crate::dispatch::{dispatch_all, AllOptions};
use crate::endpoint::{EndpointDescriptor, EndpointId};
use crate::error::{ClientError, Result};
use crate::handle::RequestHandle;
use crate::ids::{extract_list, find_item};
use crate::params::{render, Params};
use crate::transport::{ApiRequest, HttpTransport, RetryPolicy, Transport, TransportResponse, SPOTIFY_API_BASE};

/// Transport and credentials shared by every call a client issues.
pub(crate) struct ClientContext {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
}

impl ClientContext {
    /// Perform one rendered request, retrying once with a new token on 401.
    pub(crate) async fn execute(&self, endpoint: &str, request: &ApiRequest) -> Result<Value> {
        let token = self.credentials.token().await?;
        trace!(target: "spotify", endpoint, "{} {}", request.verb.as_str(), request.path);

        let mut response = self.transport.request(request, token.as_deref()).await?;

        if response.status == 401 && self.credentials.can_refresh() {
            if let Some(stale) = token.as_deref() {
                warn!(target: "spotify", endpoint, "request unauthorized, retrying with a new token");
                let fresh = self.credentials.refresh_after(stale).await?;
                response = self.transport.request(request, Some(&fresh)).await?;
            }
        }

        if !response.is_success() {
            debug!(target: "spotify", endpoint, status = response.status, "request failed");
            return Err(remote_error(endpoint, response));
        }
        Ok(response.body)
    }
}

fn remote_error(endpoint: &str, response: TransportResponse) -> ClientError {
    let message = match &response.body {
        Value::String(text) if !text.trim().is_empty() => text.clone(),
        Value::Object(_) => {
            let error = response.body.get("error");
            error
                .and_then(|e| e.get("message"))
                .or(error)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| "unknown error".to_string())
        }
        _ => "unknown error".to_string(),
    };
    ClientError::Remote {
        endpoint: endpoint.to_string(),
        status: response.status,
        message,
    }
}

/// Asynchronous Spotify Web API client.
///
/// Every call returns a [`RequestHandle`] immediately; the request runs on
/// the tokio runtime while the caller does other work. Calls must be made
/// from within a runtime.
///
/// # Example
/// ```no_run
/// # use sonara_spotify::{AllOptions, EndpointId, Params, SpotifyClient};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SpotifyClient::new("access-token")?;
///
/// let me = client.endpoint(EndpointId::Me).call(Params::new())?;
/// let saved = client
///     .endpoint(EndpointId::CurrentUserSavedTracks)
///     .all(Params::new(), AllOptions::default())?;
///
/// println!("{}", me.fetch("display_name").await?);
/// println!("{} saved tracks", saved.fetch("items").await?.as_array().map_or(0, Vec::len));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SpotifyClient {
    ctx: Arc<ClientContext>,
}

impl SpotifyClient {
    /// Client with default transport settings and a fixed bearer token.
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::builder().credentials(Credentials::bearer(access_token)).build()
    }

    pub fn builder() -> SpotifyClientBuilder {
        SpotifyClientBuilder::default()
    }

    /// Client over an arbitrary transport, e.g. a test double.
    pub fn with_transport(transport: impl Transport + 'static, credentials: Credentials) -> Self {
        Self {
            ctx: Arc::new(ClientContext {
                transport: Arc::new(transport),
                credentials,
            }),
        }
    }

    /// Build a client from layered configuration.
    ///
    /// Credentials are chosen from what is configured: a refresh token with
    /// client id and secret uses the authorization-code flow, a client id and
    /// secret alone use client credentials, an access token is sent as is,
    /// and with none of these the client is anonymous.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let auth = &config.auth;
        let credentials = match (
            auth.client_id.as_deref(),
            auth.client_secret.as_deref(),
            auth.refresh_token.as_deref(),
            auth.access_token.as_deref(),
        ) {
            (Some(id), Some(secret), Some(refresh_token), _) => {
                info!(target: "spotify", "using authorization code credentials");
                Credentials::new(
                    AuthorizationCode::new(id, secret, auth.redirect_uri.clone().unwrap_or_default())
                        .token_url(auth.token_url.clone())
                        .authorize_endpoint(auth.authorize_url.clone())
                        .with_refresh_token(refresh_token),
                )
            }
            (Some(id), Some(secret), None, _) => {
                info!(target: "spotify", "using client credentials");
                Credentials::new(ClientCredentials::new(id, secret).token_url(auth.token_url.clone()))
            }
            (_, _, _, Some(token)) => Credentials::bearer(token),
            _ => {
                warn!(target: "spotify", "no credentials configured, requests are anonymous");
                Credentials::anonymous()
            }
        };

        Self::builder()
            .base_url(config.api.base_url.clone())
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .pool_size(config.api.pool_size)
            .min_interval(Duration::from_millis(config.api.min_interval_ms))
            .retry_policy(RetryPolicy::from(&config.retry))
            .credentials(credentials)
            .build()
    }

    pub fn endpoint(&self, id: EndpointId) -> Endpoint<'_> {
        Endpoint { client: self, id }
    }

    /// Look an endpoint up by its name, e.g. `"artist_albums"`.
    pub fn endpoint_named(&self, name: &str) -> Result<Endpoint<'_>> {
        Ok(self.endpoint(name.parse()?))
    }

    pub fn call(&self, id: EndpointId, params: Params) -> Result<RequestHandle> {
        self.endpoint(id).call(params)
    }

    pub fn all(&self, id: EndpointId, params: Params, options: AllOptions) -> Result<RequestHandle> {
        self.endpoint(id).all(params, options)
    }

    /// Request the page after `page`, if there is one.
    pub fn next(&self, page: &Value) -> Option<RequestHandle> {
        self.follow(page, "next")
    }

    /// Request the page before `page`, if there is one.
    pub fn previous(&self, page: &Value) -> Option<RequestHandle> {
        self.follow(page, "previous")
    }

    fn follow(&self, page: &Value, link: &'static str) -> Option<RequestHandle> {
        let url = find_item(link, page)?.as_str()?;
        let request = ApiRequest::get(url);
        let ctx = self.ctx.clone();
        Some(RequestHandle::spawn(link, async move { ctx.execute(link, &request).await }))
    }

    /// Await independent handles in order.
    ///
    /// With `extract`, each result is reduced to its item list and the lists
    /// are concatenated; results without one contribute nothing.
    pub async fn join_many(&self, handles: &[RequestHandle], extract: bool) -> Result<Vec<Value>> {
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let value = handle.fetch(None).await?;
            if extract {
                results.extend(extract_list(&value).into_iter().flatten().cloned());
            } else {
                results.push(value);
            }
        }
        Ok(results)
    }
}

impl fmt::Debug for SpotifyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyClient")
            .field("credentials", &self.ctx.credentials)
            .finish()
    }
}

/// An endpoint bound to a client.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    client: &'a SpotifyClient,
    id: EndpointId,
}

impl Endpoint<'_> {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn descriptor(&self) -> &'static EndpointDescriptor {
        self.id.descriptor()
    }

    /// Issue one request. Parameters are validated before anything is sent.
    pub fn call(&self, params: Params) -> Result<RequestHandle> {
        let descriptor = self.descriptor();
        let request = render(descriptor, &params)?;
        let ctx = self.client.ctx.clone();
        let name = descriptor.name;
        Ok(RequestHandle::spawn(name, async move { ctx.execute(name, &request).await }))
    }

    /// Fetch every page, or every chunk of an ID list, as one merged result.
    pub fn all(&self, params: Params, options: AllOptions) -> Result<RequestHandle> {
        dispatch_all(self.client.ctx.clone(), self.descriptor(), params, options)
    }
}

/// Builder for configuring a [`SpotifyClient`].
pub struct SpotifyClientBuilder {
    base_url: String,
    timeout: Duration,
    pool_size: usize,
    min_interval: Duration,
    retry: RetryPolicy,
    credentials: Credentials,
}

impl Default for SpotifyClientBuilder {
    fn default() -> Self {
        Self {
            base_url: SPOTIFY_API_BASE.to_string(),
            timeout: Duration::from_secs(10),
            pool_size: 5,
            min_interval: Duration::ZERO,
            retry: RetryPolicy::default(),
            credentials: Credentials::anonymous(),
        }
    }
}

impl SpotifyClientBuilder {
    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum requests in flight.
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Minimum spacing between request starts.
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn build(self) -> Result<SpotifyClient> {
        let transport = HttpTransport::builder()
            .base_url(self.base_url)
            .timeout(self.timeout)
            .pool_size(self.pool_size)
            .min_interval(self.min_interval)
            .retry_policy(self.retry)
            .build()?;

        debug!(target: "spotify", base_url = transport.base_url(), "client built");
        Ok(SpotifyClient::with_transport(transport, self.credentials))
    }
}

impl fmt::Debug for SpotifyClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyClientBuilder")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("pool_size", &self.pool_size)
            .field("credentials", &self.credentials)
            .finish()
    }
}
