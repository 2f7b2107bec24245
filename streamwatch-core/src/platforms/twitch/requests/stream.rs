// ========================================================
// File: streamwatch-core/src/platforms/twitch/requests/stream.rs
// ========================================================
use reqwest::Method;
use serde::Deserialize;

use crate::Error;
use crate::platforms::twitch::client::TwitchHelixClient;

/// Response from "Get Streams" endpoint.
#[derive(Debug, Deserialize)]
pub struct StreamsResponse {
    pub data: Vec<StreamData>,
}

#[derive(Debug, Deserialize)]
pub struct StreamData {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    #[serde(rename = "type", default)]
    pub type_field: String, // "live", or "" on error
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub started_at: Option<String>,
}

/// The broadcaster's current stream, `None` when offline.
pub async fn get_stream(client: &TwitchHelixClient, user_id: &str) -> Result<Option<StreamData>, Error> {
    let resp = client
        .send(Method::GET, "streams", "get_stream", |r| r.query(&[("user_id", user_id)]))
        .await?;
    let body: StreamsResponse = resp.json().await?;
    Ok(body.data.into_iter().find(|s| s.user_id == user_id))
}
