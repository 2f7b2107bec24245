// File: streamwatch-core/src/platforms/twitch/mod.rs

pub mod client;
pub mod provider;
pub mod requests;

pub use client::TwitchHelixClient;
pub use provider::{parse_login, TwitchSubscriptionProvider};
