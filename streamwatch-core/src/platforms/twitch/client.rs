// File: streamwatch-core/src/platforms/twitch/client.rs

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::Error;
use crate::platforms::twitch::requests::token::{ensure_valid_token, AppToken};

pub const HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";
pub const OAUTH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Entry point for all Helix calls, authenticated with an app access token
/// obtained through the client-credentials flow.
pub struct TwitchHelixClient {
    http: Arc<ReqwestClient>,
    client_id: String,
    client_secret: String,
    base_url: String,
    token_url: String,
    token: Mutex<Option<AppToken>>,
}

impl TwitchHelixClient {
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self, Error> {
        Self::with_urls(client_id, client_secret, HELIX_BASE_URL, OAUTH_TOKEN_URL)
    }

    /// Same as [`new`](Self::new) against other endpoints (used by tests).
    pub fn with_urls(client_id: &str, client_secret: &str, base_url: &str, token_url: &str) -> Result<Self, Error> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http: Arc::new(http),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            token: Mutex::new(None),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn http_client(&self) -> Arc<ReqwestClient> {
        self.http.clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn bearer_token(&self) -> Result<String, Error> {
        let mut guard = self.token.lock().await;
        let token = ensure_valid_token(
            &self.http,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            guard.as_ref(),
            600,
        )
            .await?;
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Sends an authenticated request built by `build`. A 401 drops the
    /// cached token and retries once.
    pub async fn send<F>(&self, method: Method, path: &str, ctx: &str, build: F) -> Result<Response, Error>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        for attempt in 0..2 {
            let token = self.bearer_token().await?;
            let req = self
                .http
                .request(method.clone(), self.url(path))
                .header("Client-Id", &self.client_id)
                .header("Authorization", format!("Bearer {}", token));

            let resp = build(req)
                .send()
                .await
                .map_err(|e| Error::Unavailable(format!("{} network error: {}", ctx, e)))?;

            if resp.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                warn!("{}: app token rejected; fetching a new one", ctx);
                self.invalidate_token().await;
                continue;
            }
            return check_status(resp, ctx).await;
        }
        Err(Error::Auth(format!("{}: app token rejected twice", ctx)))
    }
}

/// Maps Helix status codes onto our error kinds.
pub async fn check_status(resp: Response, ctx: &str) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        debug!("{}: HTTP {}", ctx, status);
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let msg = format!("{}: HTTP {} => {}", ctx, status, body);
    Err(match status {
        StatusCode::NOT_FOUND => Error::NotFound(msg),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(msg),
        StatusCode::TOO_MANY_REQUESTS => Error::Unavailable(msg),
        s if s.is_server_error() => Error::Unavailable(msg),
        _ => Error::Platform(msg),
    })
}
