// App access token helper: fetch via client credentials, refresh shortly
// before expiry.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use tracing::{debug, info};

use crate::Error;
use crate::platforms::twitch::client::check_status;

#[derive(Debug, Clone)]
pub struct AppToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Returns `current` if it is valid for more than `margin_secs`, otherwise
/// fetches a fresh app token.
pub async fn ensure_valid_token(
    http:          &ReqwestClient,
    token_url:     &str,
    client_id:     &str,
    client_secret: &str,
    current:       Option<&AppToken>,
    margin_secs:   i64,
) -> Result<AppToken, Error> {
    if let Some(tok) = current {
        if tok.expires_at - Utc::now() > Duration::seconds(margin_secs) {
            return Ok(tok.clone());
        }
        debug!("app token expires within {}s; refreshing", margin_secs);
    }

    let resp = http
        .post(token_url)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "client_credentials"),
        ])
        .send()
        .await
        .map_err(|e| Error::Unavailable(format!("token request network error: {}", e)))?;

    let resp = check_status(resp, "app token").await.map_err(|e| match e {
        Error::Platform(m) | Error::NotFound(m) => Error::Auth(m),
        other => other,
    })?;

    let body: TokenResponse = resp.json().await?;
    info!("obtained Twitch app token, valid for {}s", body.expires_in);
    Ok(AppToken {
        access_token: body.access_token,
        expires_at: Utc::now() + Duration::seconds(body.expires_in),
    })
}
