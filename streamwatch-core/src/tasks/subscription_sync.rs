use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use streamwatch_common::traits::repository_traits::StreamRegistry;

use crate::Error;
use crate::services::live_state::LiveStateDispatcher;
use crate::services::subscriptions::SubscriptionReconciler;

const POLL_CONCURRENCY: usize = 4;

/// Refresh from the provider, then resync against the linked broadcasters.
/// Item failures are logged; only a failed listing is an error.
pub async fn sync_subscriptions(
    registry: &Arc<dyn StreamRegistry>,
    reconciler: &SubscriptionReconciler,
) -> Result<(), Error> {
    let refreshed = reconciler.refresh_from_provider().await?;
    for failure in refreshed.failures() {
        warn!("refresh: {} failed: {}", failure.item, failure.cause);
    }

    let desired = registry.list_linked_broadcasters().await?;
    match reconciler.resync(&desired).await {
        Ok(report) => debug!("resync: {} items ok", report.succeeded()),
        Err(Error::PartialFailure(f)) => warn!("{}", f),
        Err(e) => return Err(e),
    }
    Ok(())
}

/// Runs before the webhook starts serving: rebuilds the subscription map,
/// converges it, and polls every linked broadcaster so streams that changed
/// while we were down are caught up.
pub async fn startup_sync(
    registry: Arc<dyn StreamRegistry>,
    reconciler: Arc<SubscriptionReconciler>,
    dispatcher: Arc<LiveStateDispatcher>,
) -> Result<(), Error> {
    info!("Running startup subscription sync...");
    sync_subscriptions(&registry, &reconciler).await?;

    let desired = registry.list_linked_broadcasters().await?;
    let polled: Vec<_> = stream::iter(desired)
        .map(|id| {
            let dispatcher = dispatcher.clone();
            async move {
                let res = dispatcher.force_poll(&id).await;
                (id, res)
            }
        })
        .buffer_unordered(POLL_CONCURRENCY)
        .collect()
        .await;

    let mut failed = 0;
    for (id, res) in polled {
        match res {
            Ok(t) => debug!("startup poll {} => {:?}", id, t),
            Err(e) => {
                failed += 1;
                warn!("startup poll of {} failed: {}", id, e);
            }
        }
    }
    info!("Startup subscription sync completed ({} poll failures)", failed);
    Ok(())
}

/// Periodic refresh + resync. Idle per-broadcaster locks are dropped after
/// each pass.
pub fn spawn_subscription_sync_task(
    registry: Arc<dyn StreamRegistry>,
    reconciler: Arc<SubscriptionReconciler>,
    dispatcher: Arc<LiveStateDispatcher>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; startup_sync already covered it.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match sync_subscriptions(&registry, &reconciler).await {
                Ok(()) => {}
                Err(e) if e.is_retryable() => warn!("Periodic subscription sync failed, retrying next tick: {}", e),
                Err(e) => error!("Periodic subscription sync failed: {:?}", e),
            }
            dispatcher.prune_locks();
        }
    })
}
