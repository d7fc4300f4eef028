//! Query cache using moka
//!
//! Holds the last backend response per query key so that views can read
//! without refetching. Workflow mutations invalidate every key of the
//! affected document; subscribers are told about each write and each
//! invalidation so they can refetch.
//!
//! The cache is an injected collaborator ([`QueryCache`]), never a global.

use crate::types::{
    ApprovalHistoryEntry, DocumentId, DocumentSnapshot, Transition, WorkflowStatus,
};
use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Key of a cached query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// `workflow-status` of a document
    WorkflowStatus(DocumentId),
    /// `available-transitions` of a document
    Transitions(DocumentId),
    /// Approval history of a document
    ApprovalHistory(DocumentId),
    /// The document itself
    Document(DocumentId),
}

impl CacheKey {
    /// Every key that depends on the given document
    #[must_use]
    pub fn all_for(document_id: DocumentId) -> [CacheKey; 4] {
        [
            Self::WorkflowStatus(document_id),
            Self::Transitions(document_id),
            Self::ApprovalHistory(document_id),
            Self::Document(document_id),
        ]
    }

    /// Document this key belongs to
    #[inline]
    #[must_use]
    pub fn document_id(&self) -> DocumentId {
        match *self {
            Self::WorkflowStatus(id)
            | Self::Transitions(id)
            | Self::ApprovalHistory(id)
            | Self::Document(id) => id,
        }
    }
}

/// Cached response body
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    WorkflowStatus(WorkflowStatus),
    Transitions(Vec<Transition>),
    ApprovalHistory(Vec<ApprovalHistoryEntry>),
    Document(DocumentSnapshot),
}

/// What happened to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// A fresh value was stored
    Updated(CacheKey),
    /// The value was dropped and must be refetched
    Invalidated(CacheKey),
}

impl CacheEvent {
    /// Key the event refers to
    #[inline]
    #[must_use]
    pub fn key(&self) -> CacheKey {
        match *self {
            Self::Updated(k) | Self::Invalidated(k) => k,
        }
    }
}

/// Subscription handle returned by [`QueryCache::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber callback
pub type CacheCallback = Arc<dyn Fn(CacheEvent) + Send + Sync>;

/// Request/response cache shared by readers and dispatchers
///
/// Implementations serialise access internally; callers never lock.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Read the cached value for a key
    async fn read(&self, key: &CacheKey) -> Option<CachedValue>;

    /// Store a value, replacing any previous one
    async fn write(&self, key: CacheKey, value: CachedValue);

    /// Drop the value for a key and notify subscribers
    async fn invalidate(&self, key: &CacheKey);

    /// Register a callback for events on a key
    fn subscribe(&self, key: CacheKey, callback: CacheCallback) -> SubscriptionId;

    /// Remove a callback; returns whether it existed
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Invalidate every key of a document, each exactly once
    async fn invalidate_document(&self, document_id: DocumentId) {
        for key in CacheKey::all_for(document_id) {
            self.invalidate(&key).await;
        }
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
    /// Number of live subscriptions
    pub subscriber_count: usize,
}

/// moka-backed [`QueryCache`]
#[derive(Clone)]
pub struct MokaQueryCache {
    inner: Cache<CacheKey, CachedValue>,
    subscribers: Arc<DashMap<CacheKey, Vec<(SubscriptionId, CacheCallback)>>>,
    next_subscription: Arc<AtomicU64>,
}

impl std::fmt::Debug for MokaQueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaQueryCache")
            .field("entry_count", &self.inner.entry_count())
            .field("subscribed_keys", &self.subscribers.len())
            .finish()
    }
}

impl MokaQueryCache {
    /// Create new cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self::from_cache(Cache::new(max_capacity))
    }

    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self::from_cache(
            Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        )
    }

    fn from_cache(inner: Cache<CacheKey, CachedValue>) -> Self {
        Self {
            inner,
            subscribers: Arc::new(DashMap::new()),
            next_subscription: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            subscriber_count: self.subscribers.iter().map(|e| e.value().len()).sum(),
        }
    }

    fn publish(&self, event: CacheEvent) {
        // Clone the callbacks out so no shard lock is held while user code runs.
        let callbacks: Vec<CacheCallback> = self
            .subscribers
            .get(&event.key())
            .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        for callback in callbacks {
            callback(event);
        }
    }
}

impl Default for MokaQueryCache {
    /// Create cache with default capacity (1,000 entries)
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[async_trait]
impl QueryCache for MokaQueryCache {
    async fn read(&self, key: &CacheKey) -> Option<CachedValue> {
        self.inner.get(key).await
    }

    async fn write(&self, key: CacheKey, value: CachedValue) {
        self.inner.insert(key, value).await;
        tracing::debug!(?key, "cache entry updated");
        self.publish(CacheEvent::Updated(key));
    }

    async fn invalidate(&self, key: &CacheKey) {
        self.inner.invalidate(key).await;
        tracing::debug!(?key, "cache entry invalidated");
        self.publish(CacheEvent::Invalidated(*key));
    }

    fn subscribe(&self, key: CacheKey, callback: CacheCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.entry(key).or_default().push((id, callback));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.subscribers.iter_mut() {
            let before = entry.value().len();
            entry.value_mut().retain(|(sid, _)| *sid != id);
            removed |= entry.value().len() != before;
        }
        self.subscribers.retain(|_, subs| !subs.is_empty());
        removed
    }
}
