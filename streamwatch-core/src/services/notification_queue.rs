// File: streamwatch-core/src/services/notification_queue.rs

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};

use streamwatch_common::models::provider::StreamNotification;
use streamwatch_common::models::stream::BroadcasterId;

use crate::services::live_state::LiveStateDispatcher;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// FIFO in front of the dispatcher, one worker per broadcaster.
///
/// `enqueue` is synchronous, so notifications for one broadcaster are
/// dispatched in the order they were enqueued, one at a time. A worker exits
/// after sitting idle; the next notification starts a fresh one.
pub struct NotificationQueue {
    dispatcher: Arc<LiveStateDispatcher>,
    workers: Arc<DashMap<BroadcasterId, UnboundedSender<StreamNotification>>>,
    idle_timeout: Duration,
}

impl NotificationQueue {
    pub fn new(dispatcher: Arc<LiveStateDispatcher>) -> Self {
        Self::with_idle_timeout(dispatcher, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(dispatcher: Arc<LiveStateDispatcher>, idle_timeout: Duration) -> Self {
        Self {
            dispatcher,
            workers: Arc::new(DashMap::new()),
            idle_timeout,
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, notification: StreamNotification) {
        let id = notification.broadcaster_id().clone();

        // The shard guard is held across the send; a worker only retires
        // under the same guard, and only with an empty channel.
        let entry = self
            .workers
            .entry(id.clone())
            .or_insert_with(|| self.spawn_worker(id.clone()));
        if entry.send(notification).is_err() {
            error!("notification worker for {} is gone; dropping notification", id);
        }
    }

    /// Broadcasters with a running worker.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    fn spawn_worker(&self, id: BroadcasterId) -> UnboundedSender<StreamNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(
            id,
            rx,
            self.dispatcher.clone(),
            self.workers.clone(),
            self.idle_timeout,
        ));
        tx
    }
}

async fn run_worker(
    id: BroadcasterId,
    mut rx: UnboundedReceiver<StreamNotification>,
    dispatcher: Arc<LiveStateDispatcher>,
    workers: Arc<DashMap<BroadcasterId, UnboundedSender<StreamNotification>>>,
    idle_timeout: Duration,
) {
    debug!("notification worker for {} started", id);
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(notification)) => match dispatcher.handle_notification(notification).await {
                Ok(t) => debug!("[EventSub] {} => {:?}", id, t),
                Err(e) => error!("[EventSub] dispatch for {} failed: {}", id, e),
            },
            Ok(None) => break,
            Err(_) => {
                if workers.remove_if(&id, |_, _| rx.is_empty()).is_some() {
                    break;
                }
            }
        }
    }
    debug!("notification worker for {} stopped", id);
}
