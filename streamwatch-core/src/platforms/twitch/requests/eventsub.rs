// ========================================================
// File: streamwatch-core/src/platforms/twitch/requests/eventsub.rs
// ========================================================
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::Error;
use crate::platforms::twitch::client::TwitchHelixClient;
use crate::platforms::twitch_eventsub::events::SubscriptionData;

#[derive(Debug, Deserialize, Default)]
pub struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionsResponse {
    pub data: Vec<SubscriptionData>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Creates a webhook-transport subscription for one broadcaster.
pub async fn create_subscription(
    client: &TwitchHelixClient,
    sub_type: &str,
    broadcaster_user_id: &str,
    callback: &str,
    secret: &str,
) -> Result<SubscriptionData, Error> {
    let body = json!({
        "type": sub_type,
        "version": "1",
        "condition": { "broadcaster_user_id": broadcaster_user_id },
        "transport": {
            "method": "webhook",
            "callback": callback,
            "secret": secret,
        }
    });
    debug!("Subscribing to {} for {}", sub_type, broadcaster_user_id);

    let resp = client
        .send(Method::POST, "eventsub/subscriptions", "create_subscription", |r| r.json(&body))
        .await?;
    let parsed: SubscriptionsResponse = resp.json().await?;
    parsed
        .data
        .into_iter()
        .next()
        .ok_or_else(|| Error::Platform(format!("create_subscription: empty response for {}", sub_type)))
}

pub async fn delete_subscription(client: &TwitchHelixClient, id: &str) -> Result<(), Error> {
    client
        .send(Method::DELETE, "eventsub/subscriptions", "delete_subscription", |r| r.query(&[("id", id)]))
        .await?;
    Ok(())
}

/// Every subscription of this application, following the `after` cursor.
pub async fn list_subscriptions(client: &TwitchHelixClient) -> Result<Vec<SubscriptionData>, Error> {
    let mut out = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let after = cursor.clone();
        let resp = client
            .send(Method::GET, "eventsub/subscriptions", "list_subscriptions", |r| match &after {
                Some(c) => r.query(&[("after", c.as_str())]),
                None => r,
            })
            .await?;
        let page: SubscriptionsResponse = resp.json().await?;
        let n = page.data.len();
        out.extend(page.data);

        match page.pagination.cursor {
            Some(c) if !c.is_empty() && n > 0 => cursor = Some(c),
            _ => break,
        }
    }
    Ok(out)
}
