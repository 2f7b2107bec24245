// File: streamwatch-core/src/platforms/twitch_eventsub/mod.rs

pub mod events;
pub mod webhook;

pub use events::{EventSubNotificationEnvelope, StreamOffline, StreamOnline, SubscriptionData};
pub use webhook::{router, verify_signature, WebhookState};
