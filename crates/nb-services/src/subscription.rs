//! Per-post fan-out of comment lifecycle events.
//!
//! The registry maps post id -> subscriber id -> entry; each entry owns the
//! only long-lived sender of its subscriber's bounded channel, so removing
//! the entry is what closes the stream. Publishing snapshots the bucket
//! under the read lock and sends after releasing it, so a slow consumer can
//! never stall a producer: a full channel drops the event and bumps a
//! counter instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nb_core::config::CoreConfig;
use nb_core::error::{AppError, Result};
use nb_core::models::{Comment, CommentEvent};
use nb_core::traits::CommentNotifier;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct SubscriberEntry {
    sender: mpsc::Sender<CommentEvent>,
    created_at: DateTime<Utc>,
    /// Unix seconds of the last successful delivery; shared with in-flight
    /// publish snapshots so they can stamp it without the write lock.
    last_seen: Arc<AtomicI64>,
}

struct Inner {
    registry: RwLock<HashMap<Uuid, HashMap<Uuid, SubscriberEntry>>>,
    channel_capacity: usize,
    max_idle_time: Duration,
    // invariant: equals the sum of bucket sizes; mutated only under the
    // registry write lock, which is what health_check verifies
    total_subscribers: AtomicUsize,
    subscriptions_total: AtomicU64,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Snapshot of the notifier's counters.
#[derive(Debug, Clone)]
pub struct SubscriptionMetrics {
    pub total_subscribers: usize,
    pub active_connections: HashMap<Uuid, usize>,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub subscriptions_total: u64,
}

/// Receive half of a subscription. Yields events until the subscriber is
/// unsubscribed, reaped, or the service shuts down; closure is observed as
/// `recv()` returning `None`.
#[derive(Debug)]
pub struct CommentStream {
    post_id: Uuid,
    subscriber_id: Uuid,
    receiver: mpsc::Receiver<CommentEvent>,
}

impl CommentStream {
    pub fn post_id(&self) -> Uuid {
        self.post_id
    }

    pub fn subscriber_id(&self) -> Uuid {
        self.subscriber_id
    }

    pub async fn recv(&mut self) -> Option<CommentEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> std::result::Result<CommentEvent, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Single-process pub/sub service for comment events.
pub struct SubscriptionService {
    inner: Arc<Inner>,
    shutdown: CancellationToken,
}

impl SubscriptionService {
    /// Builds the service and starts the idle-subscriber reaper. Must be
    /// called from within a runtime.
    pub fn new(config: &CoreConfig) -> Self {
        let inner = Arc::new(Inner {
            registry: RwLock::new(HashMap::new()),
            channel_capacity: config.subscriber_channel_capacity,
            max_idle_time: config.subscriber_max_idle_time,
            total_subscribers: AtomicUsize::new(0),
            subscriptions_total: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        });

        let service = SubscriptionService {
            inner,
            shutdown: CancellationToken::new(),
        };
        service.spawn_reaper(config.subscriber_cleanup_interval);

        log::info!(
            "subscription service initialized: capacity={} cleanup_interval={:?} max_idle={:?}",
            config.subscriber_channel_capacity,
            config.subscriber_cleanup_interval,
            config.subscriber_max_idle_time
        );
        service
    }

    /// Registers a subscriber for a post's events.
    ///
    /// A watcher task ties the subscription to `cancel`: when the token
    /// fires - even if it already has - the subscriber is removed and its
    /// stream closed, the destructor-by-cancellation pattern.
    pub async fn subscribe(
        &self,
        cancel: CancellationToken,
        post_id: Uuid,
    ) -> Result<CommentStream> {
        if post_id.is_nil() {
            log::warn!("subscribe rejected: nil post id");
            return Err(AppError::validation("post_id", "post ID is required"));
        }

        let (sender, receiver) = mpsc::channel(self.inner.channel_capacity);
        let subscriber_id = Uuid::now_v7();
        let now = Utc::now();

        {
            let mut registry = self.inner.registry.write().await;
            registry.entry(post_id).or_default().insert(
                subscriber_id,
                SubscriberEntry {
                    sender,
                    created_at: now,
                    last_seen: Arc::new(AtomicI64::new(now.timestamp())),
                },
            );
            self.inner.total_subscribers.fetch_add(1, Ordering::SeqCst);
            self.inner.subscriptions_total.fetch_add(1, Ordering::Relaxed);
        }

        log::info!("subscription created: post={post_id} subscriber={subscriber_id}");

        let inner = Arc::clone(&self.inner);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!(
                        "caller cancelled, unsubscribing: post={post_id} subscriber={subscriber_id}"
                    );
                    inner.unsubscribe(post_id, subscriber_id).await;
                }
                _ = shutdown.cancelled() => {}
            }
        });

        Ok(CommentStream {
            post_id,
            subscriber_id,
            receiver,
        })
    }

    /// Removes a subscriber and closes its stream. Idempotent: unknown ids
    /// are a no-op.
    pub async fn unsubscribe(&self, post_id: Uuid, subscriber_id: Uuid) {
        self.inner.unsubscribe(post_id, subscriber_id).await;
    }

    /// Fans an event out to the post's current subscribers without ever
    /// blocking on a consumer.
    pub async fn publish(&self, post_id: Uuid, event: CommentEvent) {
        self.inner.publish(post_id, event).await;
    }

    pub async fn subscriber_count(&self, post_id: Uuid) -> usize {
        let registry = self.inner.registry.read().await;
        registry.get(&post_id).map(|bucket| bucket.len()).unwrap_or(0)
    }

    pub fn total_subscriber_count(&self) -> usize {
        self.inner.total_subscribers.load(Ordering::SeqCst)
    }

    pub async fn metrics(&self) -> SubscriptionMetrics {
        let registry = self.inner.registry.read().await;
        let active_connections = registry
            .iter()
            .map(|(post_id, bucket)| (*post_id, bucket.len()))
            .collect();

        SubscriptionMetrics {
            total_subscribers: self.inner.total_subscribers.load(Ordering::SeqCst),
            active_connections,
            messages_sent: self.inner.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.inner.messages_dropped.load(Ordering::Relaxed),
            subscriptions_total: self.inner.subscriptions_total.load(Ordering::Relaxed),
        }
    }

    /// Verifies the registry/counter invariant.
    pub async fn health_check(&self) -> Result<()> {
        let registry = self.inner.registry.read().await;
        let actual: usize = registry.values().map(|bucket| bucket.len()).sum();
        let counted = self.inner.total_subscribers.load(Ordering::SeqCst);

        if actual != counted {
            log::error!(
                "subscription metrics mismatch: registry={actual} counter={counted}"
            );
            return Err(AppError::internal(
                "subscription service metrics inconsistency",
            ));
        }
        Ok(())
    }

    /// Closes every stream, clears the registry, stops the reaper and the
    /// subscriber watchers. Completed when this returns.
    pub async fn shutdown(&self) {
        log::info!("shutting down subscription service");
        self.shutdown.cancel();

        let mut registry = self.inner.registry.write().await;
        let closed: usize = registry.drain().map(|(_, bucket)| bucket.len()).sum();
        self.inner.total_subscribers.store(0, Ordering::SeqCst);

        log::info!(
            "subscription service shutdown: closed={closed} sent={} dropped={} lifetime_subscriptions={}",
            self.inner.messages_sent.load(Ordering::Relaxed),
            self.inner.messages_dropped.load(Ordering::Relaxed),
            self.inner.subscriptions_total.load(Ordering::Relaxed)
        );
    }

    fn spawn_reaper(&self, cleanup_interval: Duration) {
        let inner = Arc::clone(&self.inner);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately; skip it so a reap only
            // ever happens a full interval after startup
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => inner.reap_idle().await,
                }
            }
        });
    }
}

impl Inner {
    async fn unsubscribe(&self, post_id: Uuid, subscriber_id: Uuid) {
        let mut registry = self.registry.write().await;
        let Some(bucket) = registry.get_mut(&post_id) else {
            return;
        };
        let Some(entry) = bucket.remove(&subscriber_id) else {
            return;
        };

        let lifetime = Utc::now().signed_duration_since(entry.created_at);
        // the entry owned the only long-lived sender; dropping it closes
        // the subscriber's stream
        drop(entry);

        self.total_subscribers.fetch_sub(1, Ordering::SeqCst);
        let remaining = bucket.len();
        if remaining == 0 {
            registry.remove(&post_id);
        }

        log::info!(
            "subscription removed: post={post_id} subscriber={subscriber_id} \
             lifetime={}s remaining_on_post={remaining}",
            lifetime.num_seconds()
        );
    }

    async fn publish(&self, post_id: Uuid, event: CommentEvent) {
        let snapshot: Vec<(Uuid, mpsc::Sender<CommentEvent>, Arc<AtomicI64>)> = {
            let registry = self.registry.read().await;
            match registry.get(&post_id) {
                Some(bucket) => bucket
                    .iter()
                    .map(|(id, entry)| (*id, entry.sender.clone(), entry.last_seen.clone()))
                    .collect(),
                None => return,
            }
        };

        let mut sent = 0u64;
        let mut dropped = 0u64;
        for (subscriber_id, sender, last_seen) in snapshot {
            match sender.try_send(event.clone()) {
                Ok(()) => {
                    sent += 1;
                    last_seen.store(Utc::now().timestamp(), Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    dropped += 1;
                    log::warn!(
                        "event dropped for slow subscriber {subscriber_id} on post {post_id} \
                         (action {})",
                        event.action
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // unsubscribed between snapshot and send
                    dropped += 1;
                }
            }
        }

        self.messages_sent.fetch_add(sent, Ordering::Relaxed);
        self.messages_dropped.fetch_add(dropped, Ordering::Relaxed);

        log::debug!(
            "published {} to post {post_id}: sent={sent} dropped={dropped}",
            event.action
        );
    }

    async fn reap_idle(&self) {
        let now = Utc::now().timestamp();
        let max_idle = self.max_idle_time.as_secs() as i64;

        let mut registry = self.registry.write().await;
        let mut reaped = 0usize;
        registry.retain(|post_id, bucket| {
            bucket.retain(|subscriber_id, entry| {
                let idle = now - entry.last_seen.load(Ordering::Relaxed);
                if idle > max_idle {
                    log::debug!(
                        "reaping idle subscriber {subscriber_id} on post {post_id} (idle {idle}s)"
                    );
                    reaped += 1;
                    false
                } else {
                    true
                }
            });
            !bucket.is_empty()
        });

        if reaped > 0 {
            self.total_subscribers.fetch_sub(reaped, Ordering::SeqCst);
            log::info!(
                "idle subscriber cleanup: reaped={reaped} remaining={}",
                self.total_subscribers.load(Ordering::SeqCst)
            );
        }
    }
}

#[async_trait]
impl CommentNotifier for SubscriptionService {
    async fn notify_created(&self, comment: &Comment) -> Result<()> {
        self.inner
            .publish(comment.post_id, CommentEvent::created(comment.clone()))
            .await;
        Ok(())
    }

    async fn notify_updated(&self, comment: &Comment) -> Result<()> {
        self.inner
            .publish(comment.post_id, CommentEvent::updated(comment.clone()))
            .await;
        Ok(())
    }

    async fn notify_deleted(&self, post_id: Uuid, comment_id: Uuid) -> Result<()> {
        self.inner
            .publish(post_id, CommentEvent::deleted(post_id, comment_id))
            .await;
        Ok(())
    }
}
