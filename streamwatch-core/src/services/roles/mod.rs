pub mod member_pages;
pub mod rule_engine;

pub use member_pages::MemberPages;
pub use rule_engine::RoleRuleEngine;
