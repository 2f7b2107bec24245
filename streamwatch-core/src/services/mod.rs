// File: streamwatch-core/src/services/mod.rs

pub mod guild_service;
pub mod link_manager;
pub mod live_state;
pub mod notification_queue;
pub mod roles;
pub mod subscriptions;

pub use guild_service::{AdminCheck, GuildService};
pub use link_manager::{LinkManager, LinkOutcome};
pub use live_state::{LiveStateDispatcher, LiveTransition};
pub use notification_queue::NotificationQueue;
pub use roles::RoleRuleEngine;
pub use subscriptions::SubscriptionReconciler;
