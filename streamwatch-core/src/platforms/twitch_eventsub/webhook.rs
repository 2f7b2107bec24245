// File: streamwatch-core/src/platforms/twitch_eventsub/webhook.rs
//
// EventSub webhook transport: signature check, callback verification,
// notification dispatch and revocation logging.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::platforms::twitch_eventsub::events::{parse_stream_notification, EventSubNotificationEnvelope};
use crate::services::notification_queue::NotificationQueue;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_MESSAGE_ID: &str = "Twitch-Eventsub-Message-Id";
pub const HEADER_MESSAGE_TIMESTAMP: &str = "Twitch-Eventsub-Message-Timestamp";
pub const HEADER_MESSAGE_SIGNATURE: &str = "Twitch-Eventsub-Message-Signature";
pub const HEADER_MESSAGE_TYPE: &str = "Twitch-Eventsub-Message-Type";

const MAX_MESSAGE_AGE_MINUTES: i64 = 10;
const RECENT_ID_CAPACITY: usize = 1024;

/// `sha256=<hex>` over `message_id || timestamp || body`, compared in
/// constant time.
pub fn verify_signature(secret: &str, message_id: &str, timestamp: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_sig) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message_id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Message ids seen recently; Twitch redelivers on slow acknowledgements.
struct RecentIds {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentIds {
    fn new() -> Self {
        Self {
            order: VecDeque::with_capacity(RECENT_ID_CAPACITY),
            seen: HashSet::with_capacity(RECENT_ID_CAPACITY),
        }
    }

    /// `false` if the id was already seen.
    fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() >= RECENT_ID_CAPACITY {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }
}

pub struct WebhookState {
    secret: String,
    queue: Arc<NotificationQueue>,
    recent: Mutex<RecentIds>,
}

impl WebhookState {
    pub fn new(secret: &str, queue: Arc<NotificationQueue>) -> Self {
        Self {
            secret: secret.to_string(),
            queue,
            recent: Mutex::new(RecentIds::new()),
        }
    }
}

pub fn router(path: &str, state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(path, post(handle_eventsub))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_stale(timestamp: &str) -> bool {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(ts) => Utc::now() - ts.with_timezone(&Utc) > Duration::minutes(MAX_MESSAGE_AGE_MINUTES),
        Err(_) => true,
    }
}

async fn handle_eventsub(State(state): State<Arc<WebhookState>>, headers: HeaderMap, body: Bytes) -> Response {
    let (Some(message_id), Some(timestamp), Some(signature), Some(message_type)) = (
        header_str(&headers, HEADER_MESSAGE_ID),
        header_str(&headers, HEADER_MESSAGE_TIMESTAMP),
        header_str(&headers, HEADER_MESSAGE_SIGNATURE),
        header_str(&headers, HEADER_MESSAGE_TYPE),
    ) else {
        debug!("[EventSub] request without EventSub headers");
        return StatusCode::BAD_REQUEST.into_response();
    };

    if !verify_signature(&state.secret, message_id, timestamp, &body, signature) {
        warn!("[EventSub] bad signature on message {}", message_id);
        return StatusCode::FORBIDDEN.into_response();
    }
    if is_stale(timestamp) {
        warn!("[EventSub] message {} is too old ({})", message_id, timestamp);
        return StatusCode::FORBIDDEN.into_response();
    }

    let env: EventSubNotificationEnvelope = match serde_json::from_slice(&body) {
        Ok(env) => env,
        Err(e) => {
            warn!("[EventSub] malformed body for message {}: {}", message_id, e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match message_type {
        "webhook_callback_verification" => {
            let Some(challenge) = env.challenge else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            info!(
                "[EventSub] verified callback for {} subscription {}",
                env.subscription.sub_type, env.subscription.id
            );
            ([(header::CONTENT_TYPE, "text/plain")], challenge).into_response()
        }
        "notification" => {
            if !state.recent.lock().insert(message_id) {
                debug!("[EventSub] duplicate message {}", message_id);
                return StatusCode::NO_CONTENT.into_response();
            }
            match parse_stream_notification(&env) {
                Ok(Some(notification)) => state.queue.enqueue(notification),
                Ok(None) => debug!("[EventSub] ignoring {}", env.subscription.sub_type),
                Err(e) => warn!("[EventSub] could not parse {} event: {}", env.subscription.sub_type, e),
            }
            StatusCode::NO_CONTENT.into_response()
        }
        "revocation" => {
            warn!(
                "[EventSub] subscription {} ({}) revoked: {}",
                env.subscription.id, env.subscription.sub_type, env.subscription.status
            );
            StatusCode::NO_CONTENT.into_response()
        }
        other => {
            debug!("[EventSub] unknown message type {}", other);
            StatusCode::NO_CONTENT.into_response()
        }
    }
}
