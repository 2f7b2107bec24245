use reqwest::Method;
use serde::Deserialize;

use crate::Error;
use crate::platforms::twitch::client::TwitchHelixClient;

/// Response from "Get Users" endpoint.
#[derive(Debug, Deserialize)]
pub struct UsersResponse {
    pub data: Vec<UserData>,
}

#[derive(Debug, Deserialize)]
pub struct UserData {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

pub async fn get_user_by_login(client: &TwitchHelixClient, login: &str) -> Result<Option<UserData>, Error> {
    let resp = client
        .send(Method::GET, "users", "get_user_by_login", |r| r.query(&[("login", login)]))
        .await?;
    let body: UsersResponse = resp.json().await?;
    Ok(body.data.into_iter().next())
}
