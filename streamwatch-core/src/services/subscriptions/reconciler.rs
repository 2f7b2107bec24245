// File: streamwatch-core/src/services/subscriptions/reconciler.rs

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use streamwatch_common::models::batch::BatchReport;
use streamwatch_common::models::stream::BroadcasterId;
use streamwatch_common::models::subscription::{
    ProviderSubscription, SubscriptionDirection, SubscriptionHandles, SubscriptionPair,
};
use streamwatch_common::traits::provider_traits::SubscriptionProvider;

use crate::Error;
use crate::services::subscriptions::diff::diff;
use crate::utils::KeyedLocks;

pub const DEFAULT_RESYNC_CONCURRENCY: usize = 4;

/// Keeps the provider's `stream.online` / `stream.offline` subscriptions in
/// line with the set of broadcasters we want to watch.
///
/// The handle map is the only copy of the pairs; it is rebuilt from the
/// provider's listing by [`refresh_from_provider`](Self::refresh_from_provider).
/// Every mutation for one broadcaster runs under that broadcaster's lock.
pub struct SubscriptionReconciler {
    provider: Arc<dyn SubscriptionProvider>,
    pairs: DashMap<BroadcasterId, SubscriptionHandles>,
    locks: KeyedLocks<BroadcasterId>,
    concurrency: usize,
}

impl SubscriptionReconciler {
    pub fn new(provider: Arc<dyn SubscriptionProvider>) -> Self {
        Self::with_concurrency(provider, DEFAULT_RESYNC_CONCURRENCY)
    }

    pub fn with_concurrency(provider: Arc<dyn SubscriptionProvider>, concurrency: usize) -> Self {
        Self {
            provider,
            pairs: DashMap::new(),
            locks: KeyedLocks::new(),
            concurrency: concurrency.max(1),
        }
    }

    /// Every broadcaster with at least one handle, sorted.
    pub fn watched(&self) -> Vec<BroadcasterId> {
        let mut ids: Vec<BroadcasterId> = self.pairs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_watched(&self, broadcaster_id: &BroadcasterId) -> bool {
        self.pairs
            .get(broadcaster_id)
            .map(|h| h.is_complete())
            .unwrap_or(false)
    }

    pub fn pair(&self, broadcaster_id: &BroadcasterId) -> Option<SubscriptionPair> {
        let handles = self.pairs.get(broadcaster_id)?.clone();
        SubscriptionPair::from_handles(broadcaster_id, &handles)
    }

    pub fn handles(&self, broadcaster_id: &BroadcasterId) -> Option<SubscriptionHandles> {
        self.pairs.get(broadcaster_id).map(|h| h.clone())
    }

    fn incomplete(&self) -> HashSet<BroadcasterId> {
        self.pairs
            .iter()
            .filter(|e| !e.value().is_complete())
            .map(|e| e.key().clone())
            .collect()
    }

    /// Deletes one provider handle. A handle the provider no longer knows
    /// is as good as deleted.
    async fn delete_handle(&self, broadcaster_id: &BroadcasterId, handle: &str) -> Result<(), Error> {
        match self.provider.delete_subscription(handle).await {
            Ok(()) => Ok(()),
            Err(Error::NotFound(_)) => {
                debug!("subscription {} for {} was already gone", handle, broadcaster_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Makes sure a complete online/offline pair exists for the broadcaster.
    pub async fn ensure_watched(&self, broadcaster_id: &BroadcasterId) -> Result<(), Error> {
        let _guard = self.locks.lock(broadcaster_id).await;

        if let Some(existing) = self.handles(broadcaster_id) {
            if existing.is_complete() {
                debug!("{} already watched", broadcaster_id);
                return Ok(());
            }

            error!(
                "half-created subscription pair for {} (online={:?}, offline={:?}); recreating",
                broadcaster_id, existing.online, existing.offline
            );
            let mut remaining = existing.clone();
            for direction in SubscriptionDirection::ALL {
                if let Some(handle) = existing.get(direction) {
                    if let Err(e) = self.delete_handle(broadcaster_id, handle).await {
                        remaining.touched_at = Instant::now();
                        self.pairs.insert(broadcaster_id.clone(), remaining);
                        return Err(e);
                    }
                    remaining.clear(direction);
                }
            }
            self.pairs.remove(broadcaster_id);
        }

        let online = self
            .provider
            .create_subscription(SubscriptionDirection::Online, broadcaster_id)
            .await?;

        let offline = match self
            .provider
            .create_subscription(SubscriptionDirection::Offline, broadcaster_id)
            .await
        {
            Ok(sub) => sub,
            Err(e) => {
                warn!(
                    "offline subscription for {} failed ({}); rolling back online subscription {}",
                    broadcaster_id, e, online.id
                );
                if let Err(rollback) = self.delete_handle(broadcaster_id, &online.id).await {
                    // Keep the half pair so a later ensure_watched cleans it up.
                    error!(
                        "rollback of online subscription {} for {} failed: {}",
                        online.id, broadcaster_id, rollback
                    );
                    let mut half = SubscriptionHandles::default();
                    half.set(SubscriptionDirection::Online, online.id);
                    self.pairs.insert(broadcaster_id.clone(), half);
                }
                return Err(e);
            }
        };

        info!(
            "watching {} (online={}, offline={})",
            broadcaster_id, online.id, offline.id
        );
        self.pairs.insert(
            broadcaster_id.clone(),
            SubscriptionHandles::complete(online.id, offline.id),
        );
        Ok(())
    }

    /// Deletes both handles of the broadcaster's pair. Both deletes are
    /// attempted; the first error is returned and the failed handle is kept.
    pub async fn ensure_unwatched(&self, broadcaster_id: &BroadcasterId) -> Result<(), Error> {
        let _guard = self.locks.lock(broadcaster_id).await;

        let Some(existing) = self.handles(broadcaster_id) else {
            debug!("{} not watched", broadcaster_id);
            return Ok(());
        };

        let mut remaining = existing.clone();
        let mut first_err: Option<Error> = None;
        for direction in SubscriptionDirection::ALL {
            let Some(handle) = existing.get(direction) else {
                continue;
            };
            match self.delete_handle(broadcaster_id, handle).await {
                Ok(()) => {
                    remaining.clear(direction);
                }
                Err(e) => {
                    warn!("could not delete {} subscription {} for {}: {}", direction, handle, broadcaster_id, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        if remaining.is_empty() {
            self.pairs.remove(broadcaster_id);
            info!("stopped watching {}", broadcaster_id);
        } else {
            remaining.touched_at = Instant::now();
            self.pairs.insert(broadcaster_id.clone(), remaining);
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Brings the watched set in line with `desired`. Every item is attempted;
    /// if any failed the result is `Error::PartialFailure`.
    pub async fn resync(&self, desired: &[BroadcasterId]) -> Result<BatchReport, Error> {
        let watched = self.watched();
        let mut plan = diff(desired, &watched);

        // Half pairs that are still wanted are healed by ensure_watched.
        let incomplete = self.incomplete();
        for id in desired {
            if incomplete.contains(id) {
                plan.to_add.insert(id.clone());
            }
        }

        if plan.is_empty() {
            debug!("resync: {} broadcasters already in sync", watched.len());
            return BatchReport::new("resync").into_result();
        }

        info!(
            "resync: watching {} new, dropping {}",
            plan.to_add.len(),
            plan.to_remove.len()
        );

        let added: Vec<(BroadcasterId, Result<(), Error>)> = stream::iter(plan.to_add)
            .map(|id| async move {
                let res = self.ensure_watched(&id).await;
                (id, res)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let removed: Vec<(BroadcasterId, Result<(), Error>)> = stream::iter(plan.to_remove)
            .map(|id| async move {
                let res = self.ensure_unwatched(&id).await;
                (id, res)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = BatchReport::new("resync");
        for (id, res) in added.iter().chain(removed.iter()) {
            if let Err(e) = res {
                warn!("resync: {} failed: {}", id, e);
            }
            report.record(id, res);
        }
        self.locks.prune();

        report.into_result()
    }

    /// Rebuilds the handle map from the provider's listing, deleting
    /// duplicates and broken subscriptions and recreating what is missing.
    ///
    /// Entries touched after the listing was requested are newer than the
    /// listing and are left alone.
    pub async fn refresh_from_provider(&self) -> Result<BatchReport, Error> {
        let listed_at = Instant::now();
        let subs = self.provider.list_subscriptions().await?;
        info!("refresh: provider lists {} stream subscriptions", subs.len());

        let mut by_broadcaster: BTreeMap<BroadcasterId, Vec<ProviderSubscription>> = BTreeMap::new();
        for sub in subs {
            by_broadcaster.entry(sub.broadcaster_id.clone()).or_default().push(sub);
        }

        let mut report = BatchReport::new("refresh_from_provider");
        for (broadcaster_id, subs) in &by_broadcaster {
            let _guard = self.locks.lock(broadcaster_id).await;

            let touched_later = self
                .pairs
                .get(broadcaster_id)
                .map(|h| h.touched_at > listed_at)
                .unwrap_or(false);
            if touched_later {
                debug!("refresh: {} changed since listing, skipping", broadcaster_id);
                continue;
            }

            let mut handles = SubscriptionHandles::default();
            let mut broken: BTreeSet<SubscriptionDirection> = BTreeSet::new();

            for sub in subs {
                let item = format!("{} {} {}", broadcaster_id, sub.direction, sub.id);
                if !sub.status.is_healthy() {
                    warn!(
                        "refresh: {} subscription {} for {} is {:?}; replacing",
                        sub.direction, sub.id, broadcaster_id, sub.status
                    );
                    broken.insert(sub.direction);
                    let res = self.delete_handle(broadcaster_id, &sub.id).await;
                    report.record(item, &res);
                } else if handles.get(sub.direction).is_some() {
                    warn!(
                        "refresh: duplicate {} subscription {} for {}; deleting",
                        sub.direction, sub.id, broadcaster_id
                    );
                    let res = self.delete_handle(broadcaster_id, &sub.id).await;
                    report.record(item, &res);
                } else {
                    handles.set(sub.direction, sub.id.clone());
                }
            }

            for direction in handles.missing() {
                if !broken.contains(&direction) {
                    debug!("refresh: {} has no {} subscription; creating", broadcaster_id, direction);
                }
                let item = format!("{} {} (create)", broadcaster_id, direction);
                match self.provider.create_subscription(direction, broadcaster_id).await {
                    Ok(sub) => {
                        handles.set(direction, sub.id);
                        report.record_ok(item);
                    }
                    Err(e) => {
                        warn!("refresh: could not create {} for {}: {}", direction, broadcaster_id, e);
                        report.record_failure(item, &e);
                    }
                }
            }

            if handles.is_empty() {
                self.pairs.remove(broadcaster_id);
            } else {
                handles.touched_at = Instant::now();
                self.pairs.insert(broadcaster_id.clone(), handles);
            }
        }

        // Pairs the provider no longer has.
        let vanished: Vec<BroadcasterId> = self
            .pairs
            .iter()
            .filter(|e| !by_broadcaster.contains_key(e.key()) && e.value().touched_at <= listed_at)
            .map(|e| e.key().clone())
            .collect();
        for broadcaster_id in vanished {
            let _guard = self.locks.lock(&broadcaster_id).await;
            if self
                .pairs
                .remove_if(&broadcaster_id, |_, h| h.touched_at <= listed_at)
                .is_some()
            {
                warn!("refresh: provider has no subscriptions for {}; forgetting pair", broadcaster_id);
            }
        }

        self.locks.prune();
        info!(
            "refresh: {} broadcasters watched, {} actions, {} failed",
            self.pairs.len(),
            report.outcomes.len(),
            report.failures().len()
        );
        Ok(report)
    }
}
