pub mod diff;
pub mod reconciler;

pub use diff::{diff, Diff};
pub use reconciler::SubscriptionReconciler;
