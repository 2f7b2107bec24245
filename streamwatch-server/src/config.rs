//! streamwatch-server/src/config.rs
//!
//! Validated runtime configuration built from the command line / environment.

use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use streamwatch_core::Error;

use crate::Args;

/// EventSub requires webhook secrets of 10 to 100 ASCII characters.
const SECRET_MIN: usize = 10;
const SECRET_MAX: usize = 100;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub callback_url: String,
    pub webhook_path: String,
    pub webhook_secret: String,
    pub twitch_client_id: String,
    pub twitch_client_secret: String,
    pub discord_token: String,
    pub dev_user_id: Option<String>,
    pub purge_concurrency: usize,
    pub resync_interval: Duration,
}

fn required(value: &Option<String>, name: &str) -> Result<String, Error> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::Config(format!("{} is required", name))),
    }
}

impl ServerConfig {
    pub fn from_args(args: &Args) -> Result<Self, Error> {
        let database_url = required(&args.database_url, "DATABASE_URL")?;
        let webhook_secret = required(&args.webhook_secret, "TWITCH_WEBHOOK_SECRET")?;
        if !(SECRET_MIN..=SECRET_MAX).contains(&webhook_secret.len()) || !webhook_secret.is_ascii() {
            return Err(Error::Config(format!(
                "TWITCH_WEBHOOK_SECRET must be {}-{} ASCII characters",
                SECRET_MIN, SECRET_MAX
            )));
        }

        let listen_addr: SocketAddr = args
            .listen_addr
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address '{}': {}", args.listen_addr, e)))?;

        let webhook_path = if args.webhook_path.starts_with('/') {
            args.webhook_path.clone()
        } else {
            format!("/{}", args.webhook_path)
        };

        // The public callback is the base URL plus the webhook path.
        let base = required(&args.callback_url, "TWITCH_CALLBACK_URL")?;
        let callback = Url::parse(&base)
            .and_then(|u| u.join(&webhook_path))
            .map_err(|e| Error::Config(format!("invalid callback URL '{}': {}", base, e)))?;
        if callback.scheme() != "https" {
            return Err(Error::Config("EventSub callbacks must use https".into()));
        }

        if args.purge_concurrency == 0 {
            return Err(Error::Config("purge concurrency must be at least 1".into()));
        }

        Ok(Self {
            database_url,
            listen_addr,
            callback_url: callback.to_string(),
            webhook_path,
            webhook_secret,
            twitch_client_id: required(&args.twitch_client_id, "TWITCH_CLIENT_ID")?,
            twitch_client_secret: required(&args.twitch_client_secret, "TWITCH_CLIENT_SECRET")?,
            discord_token: required(&args.discord_token, "DISCORD_TOKEN")?,
            dev_user_id: args.dev_user_id.clone().filter(|s| !s.trim().is_empty()),
            purge_concurrency: args.purge_concurrency,
            resync_interval: Duration::from_secs(args.resync_interval_secs.max(60)),
        })
    }
}
