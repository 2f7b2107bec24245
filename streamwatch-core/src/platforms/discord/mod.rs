pub mod client;
pub mod gateway;

pub use client::DiscordGuildGateway;
pub use gateway::spawn_reaction_listener;
