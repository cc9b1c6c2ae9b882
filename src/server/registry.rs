//! Subscriber registry: the single shared mutable resource
//!
//! The broadcast loop reads the full subscriber set every cycle while
//! connection handlers add and remove entries concurrently. A subscriber's
//! whole state (mode + private reference frame + outbound queue) lives in
//! one map entry, so registration and removal are atomic and removal is
//! idempotent no matter which side triggers it first: the handler noticing
//! a closed control channel, or the loop noticing a dead outbound queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use image::GrayImage;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Outbound queue depth per subscriber. Small on purpose: a viewer that
/// falls this many frames behind starts losing frames instead of stalling
/// the fan-out.
pub const FRAME_QUEUE_DEPTH: usize = 8;

/// Unique identity of one connected viewer, assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A viewer's requested display behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Plain grayscale stream
    #[default]
    Normal,
    /// Grayscale with motion annotations burned in
    Secure,
}

impl ViewMode {
    /// Map an inbound control message to a mode. Unknown values yield
    /// `None` and are ignored by the caller.
    pub fn from_control(message: &str) -> Option<Self> {
        match message {
            "secure" => Some(Self::Secure),
            "normal" => Some(Self::Normal),
            _ => None,
        }
    }
}

/// Outcome of one delivery attempt to a subscriber's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Payload queued for the connection
    Delivered,
    /// Queue full (slow consumer); frame skipped, subscriber kept
    Dropped,
    /// Receiver gone; the subscriber must be removed
    Disconnected,
}

/// Statistics snapshot (read from lock-free counters).
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryStats {
    pub subscribers: usize,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
}

struct AtomicStats {
    subscribers: AtomicUsize,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            subscribers: AtomicUsize::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> RegistryStats {
        RegistryStats {
            subscribers: self.subscribers.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Per-subscriber state. Lives and dies as one unit.
struct SubscriberState {
    mode: ViewMode,
    /// Private detection baseline; never shared across subscribers
    reference: Option<GrayImage>,
    /// Bounded queue drained by the connection's forward task
    tx: mpsc::Sender<String>,
}

struct RegistryInner {
    subscribers: RwLock<HashMap<SubscriberId, SubscriberState>>,
    next_id: AtomicU64,
    stats: AtomicStats,
}

/// Cheaply cloneable handle to the shared registry.
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                stats: AtomicStats::new(),
            }),
        }
    }

    /// Register a new subscriber with mode `Normal` and no reference frame.
    /// `tx` is the sending half of the connection's outbound queue.
    pub async fn register(&self, tx: mpsc::Sender<String>) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.write().await.insert(
            id,
            SubscriberState {
                mode: ViewMode::default(),
                reference: None,
                tx,
            },
        );
        self.inner.stats.subscribers.fetch_add(1, Ordering::Relaxed);
        info!(subscriber = %id, "Subscriber registered");
        id
    }

    /// Remove a subscriber and all of its state. Idempotent: removing an
    /// absent id is a no-op, so the handler and the broadcast loop can race
    /// on cleanup safely.
    pub async fn remove(&self, id: SubscriberId) {
        if self.inner.subscribers.write().await.remove(&id).is_some() {
            self.inner.stats.subscribers.fetch_sub(1, Ordering::Relaxed);
            info!(subscriber = %id, "Subscriber removed");
        } else {
            debug!(subscriber = %id, "Subscriber already removed");
        }
    }

    /// Change a subscriber's mode. Returns false if the subscriber is gone.
    pub async fn set_mode(&self, id: SubscriberId, mode: ViewMode) -> bool {
        match self.inner.subscribers.write().await.get_mut(&id) {
            Some(state) => {
                if state.mode != mode {
                    debug!(subscriber = %id, ?mode, "Mode changed");
                }
                state.mode = mode;
                true
            }
            None => false,
        }
    }

    /// Current mode of a subscriber, if still registered.
    pub async fn mode(&self, id: SubscriberId) -> Option<ViewMode> {
        self.inner
            .subscribers
            .read()
            .await
            .get(&id)
            .map(|s| s.mode)
    }

    /// Stable snapshot of the subscriber set for one fan-out pass.
    /// Registrations and removals after the snapshot do not corrupt the
    /// iteration; a subscriber removed mid-cycle simply fails delivery.
    pub async fn snapshot(&self) -> Vec<(SubscriberId, ViewMode)> {
        self.inner
            .subscribers
            .read()
            .await
            .iter()
            .map(|(id, s)| (*id, s.mode))
            .collect()
    }

    /// Copy of a subscriber's private reference frame.
    pub async fn reference(&self, id: SubscriberId) -> Option<GrayImage> {
        self.inner
            .subscribers
            .read()
            .await
            .get(&id)
            .and_then(|s| s.reference.clone())
    }

    /// Store the updated reference frame for a subscriber. Silently dropped
    /// when the subscriber was removed mid-cycle.
    pub async fn store_reference(&self, id: SubscriberId, reference: GrayImage) {
        if let Some(state) = self.inner.subscribers.write().await.get_mut(&id) {
            state.reference = Some(reference);
        }
    }

    /// Attempt a non-blocking delivery to a subscriber's outbound queue.
    pub async fn try_deliver(&self, id: SubscriberId, payload: String) -> SendOutcome {
        let subscribers = self.inner.subscribers.read().await;
        let Some(state) = subscribers.get(&id) else {
            return SendOutcome::Disconnected;
        };
        match state.tx.try_send(payload) {
            Ok(()) => {
                self.inner
                    .stats
                    .frames_delivered
                    .fetch_add(1, Ordering::Relaxed);
                SendOutcome::Delivered
            }
            Err(TrySendError::Full(_)) => {
                self.inner
                    .stats
                    .frames_dropped
                    .fetch_add(1, Ordering::Relaxed);
                SendOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Disconnected,
        }
    }

    /// Number of registered subscribers (lock-free).
    pub fn subscriber_count(&self) -> usize {
        self.inner.stats.subscribers.load(Ordering::Relaxed)
    }

    /// True when nobody is connected (lock-free; the broadcast loop checks
    /// this every tick before touching the camera).
    pub fn is_empty(&self) -> bool {
        self.subscriber_count() == 0
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> RegistryStats {
        self.inner.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(FRAME_QUEUE_DEPTH)
    }

    // ========== Registration lifecycle ==========

    #[tokio::test]
    async fn register_defaults_to_normal_mode_without_reference() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = queue();

        let id = registry.register(tx).await;

        assert_eq!(registry.mode(id).await, Some(ViewMode::Normal));
        assert!(registry.reference(id).await.is_none());
        assert_eq!(registry.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn ids_are_unique_and_monotonic() {
        let registry = ClientRegistry::new();
        let (tx1, _rx1) = queue();
        let (tx2, _rx2) = queue();

        let a = registry.register(tx1).await;
        let b = registry.register(tx2).await;
        assert!(a < b);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = queue();
        let id = registry.register(tx).await;

        registry.remove(id).await;
        assert_eq!(registry.subscriber_count(), 0);

        // Second removal (racing trigger) leaves the registry unchanged
        registry.remove(id).await;
        assert_eq!(registry.subscriber_count(), 0);
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn remove_discards_mode_and_reference_together() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = queue();
        let id = registry.register(tx).await;

        registry.set_mode(id, ViewMode::Secure).await;
        registry.store_reference(id, GrayImage::new(4, 4)).await;
        registry.remove(id).await;

        assert_eq!(registry.mode(id).await, None);
        assert!(registry.reference(id).await.is_none());
    }

    // ========== Modes ==========

    #[tokio::test]
    async fn set_mode_round_trip_and_noop_repeat() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = queue();
        let id = registry.register(tx).await;

        assert!(registry.set_mode(id, ViewMode::Secure).await);
        assert!(registry.set_mode(id, ViewMode::Secure).await);
        assert_eq!(registry.mode(id).await, Some(ViewMode::Secure));

        assert!(registry.set_mode(id, ViewMode::Normal).await);
        assert_eq!(registry.mode(id).await, Some(ViewMode::Normal));
    }

    #[tokio::test]
    async fn set_mode_on_removed_subscriber_returns_false() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = queue();
        let id = registry.register(tx).await;
        registry.remove(id).await;

        assert!(!registry.set_mode(id, ViewMode::Secure).await);
    }

    #[tokio::test]
    async fn mode_switch_keeps_reference_frame() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = queue();
        let id = registry.register(tx).await;

        registry.set_mode(id, ViewMode::Secure).await;
        registry.store_reference(id, GrayImage::new(4, 4)).await;

        // Leaving and re-entering secure mode resumes detection
        registry.set_mode(id, ViewMode::Normal).await;
        registry.set_mode(id, ViewMode::Secure).await;
        assert!(registry.reference(id).await.is_some());
    }

    #[test]
    fn view_mode_from_control_messages() {
        assert_eq!(ViewMode::from_control("secure"), Some(ViewMode::Secure));
        assert_eq!(ViewMode::from_control("normal"), Some(ViewMode::Normal));
        assert_eq!(ViewMode::from_control(""), None);
        assert_eq!(ViewMode::from_control("SECURE"), None);
    }

    // ========== Reference isolation ==========

    #[tokio::test]
    async fn references_are_private_per_subscriber() {
        let registry = ClientRegistry::new();
        let (tx1, _rx1) = queue();
        let (tx2, _rx2) = queue();
        let a = registry.register(tx1).await;
        let b = registry.register(tx2).await;

        registry
            .store_reference(a, GrayImage::from_pixel(2, 2, image::Luma([11])))
            .await;

        assert!(registry.reference(b).await.is_none());
        registry
            .store_reference(b, GrayImage::from_pixel(2, 2, image::Luma([99])))
            .await;

        assert_eq!(registry.reference(a).await.unwrap().get_pixel(0, 0)[0], 11);
        assert_eq!(registry.reference(b).await.unwrap().get_pixel(0, 0)[0], 99);
    }

    #[tokio::test]
    async fn store_reference_after_removal_is_dropped() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = queue();
        let id = registry.register(tx).await;
        registry.remove(id).await;

        // Loop finishes a cycle for a subscriber the handler just removed
        registry.store_reference(id, GrayImage::new(4, 4)).await;
        assert!(registry.reference(id).await.is_none());
        assert_eq!(registry.subscriber_count(), 0);
    }

    // ========== Delivery ==========

    #[tokio::test]
    async fn try_deliver_reaches_the_queue() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = queue();
        let id = registry.register(tx).await;

        let outcome = registry.try_deliver(id, "payload".into()).await;
        assert_eq!(outcome, SendOutcome::Delivered);
        assert_eq!(rx.recv().await.as_deref(), Some("payload"));
        assert_eq!(registry.stats().frames_delivered, 1);
    }

    #[tokio::test]
    async fn try_deliver_full_queue_drops_without_removal() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let id = registry.register(tx).await;

        assert_eq!(
            registry.try_deliver(id, "a".into()).await,
            SendOutcome::Delivered
        );
        assert_eq!(
            registry.try_deliver(id, "b".into()).await,
            SendOutcome::Dropped
        );

        // Slow consumer stays registered
        assert_eq!(registry.subscriber_count(), 1);
        assert_eq!(registry.stats().frames_dropped, 1);
    }

    #[tokio::test]
    async fn try_deliver_closed_queue_reports_disconnected() {
        let registry = ClientRegistry::new();
        let (tx, rx) = queue();
        let id = registry.register(tx).await;
        drop(rx);

        assert_eq!(
            registry.try_deliver(id, "a".into()).await,
            SendOutcome::Disconnected
        );
    }

    #[tokio::test]
    async fn try_deliver_unknown_id_reports_disconnected() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = queue();
        let id = registry.register(tx).await;
        registry.remove(id).await;

        assert_eq!(
            registry.try_deliver(id, "a".into()).await,
            SendOutcome::Disconnected
        );
    }

    // ========== Snapshot ==========

    #[tokio::test]
    async fn snapshot_reflects_modes_at_call_time() {
        let registry = ClientRegistry::new();
        let (tx1, _rx1) = queue();
        let (tx2, _rx2) = queue();
        let a = registry.register(tx1).await;
        let b = registry.register(tx2).await;
        registry.set_mode(b, ViewMode::Secure).await;

        let mut snap = registry.snapshot().await;
        snap.sort_by_key(|(id, _)| *id);
        assert_eq!(snap, vec![(a, ViewMode::Normal), (b, ViewMode::Secure)]);

        // Later mutations do not affect the snapshot already taken
        registry.remove(a).await;
        assert_eq!(snap.len(), 2);
    }
}
