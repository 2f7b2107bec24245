// File: streamwatch-common/src/models/mod.rs
pub mod batch;
pub mod guild;
pub mod member;
pub mod provider;
pub mod purge;
pub mod role_rule;
pub mod stream;
pub mod subscription;

pub use batch::{BatchFailure, BatchReport, ItemFailure, ItemOutcome};
pub use guild::{GuildConfig, GuildMember};
pub use member::{LinkSwap, MemberLink};
pub use provider::{BroadcasterProfile, LiveStatus, StreamNotification};
pub use purge::{FailedMemberRemoval, FailedRuleUndo, PurgeReport};
pub use role_rule::{AssignmentKind, ManagedRoleRule, ReactionEvent, ReactionRoleParams, RoleAssignment};
pub use stream::{AlertPost, BroadcasterId, StreamState};
pub use subscription::{
    ProviderSubscription, SubscriptionDirection, SubscriptionHandles, SubscriptionPair, SubscriptionStatus,
};
