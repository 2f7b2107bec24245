// File: streamwatch-common/src/traits/mod.rs
pub mod guild_traits;
pub mod provider_traits;
pub mod repository_traits;
