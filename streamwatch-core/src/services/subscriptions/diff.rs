use std::collections::BTreeSet;

use streamwatch_common::models::stream::BroadcasterId;

/// What has to change to turn `observed` into `desired`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub to_add: BTreeSet<BroadcasterId>,
    pub to_remove: BTreeSet<BroadcasterId>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

pub fn diff<'a, D, O>(desired: D, observed: O) -> Diff
where
    D: IntoIterator<Item = &'a BroadcasterId>,
    O: IntoIterator<Item = &'a BroadcasterId>,
{
    let desired: BTreeSet<BroadcasterId> = desired.into_iter().cloned().collect();
    let observed: BTreeSet<BroadcasterId> = observed.into_iter().cloned().collect();

    Diff {
        to_add: desired.difference(&observed).cloned().collect(),
        to_remove: observed.difference(&desired).cloned().collect(),
    }
}
