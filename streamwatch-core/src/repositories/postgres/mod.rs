// File: streamwatch-core/src/repositories/postgres/mod.rs

pub mod role_rules;
pub mod stream_registry;

pub use role_rules::PostgresRoleRuleRepository;
pub use stream_registry::PostgresStreamRegistry;
