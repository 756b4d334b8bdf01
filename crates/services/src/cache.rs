//! # View Cache
//!
//! Buckets of previously fetched views, keyed by [`ViewKey`]. A bucket lives
//! only while at least one [`ViewHandle`] for its key is alive. Reads of a
//! key nobody is viewing go straight to the backend and are not kept.
//!
//! Every fetch for a live bucket carries a [`Ticket`]. The response is kept
//! only if the ticket is still the newest one for the same bucket
//! generation and no invalidation happened after it was issued; anything
//! else is dropped on arrival.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use domains::{AppError, ContentBackend, Entity, EntityId, Result, ViewKey};
use tracing::debug;

/// Contents of a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewData {
    List(Vec<Entity>),
    Single(Entity),
}

impl ViewData {
    pub fn into_list(self) -> Result<Vec<Entity>> {
        match self {
            Self::List(entities) => Ok(entities),
            Self::Single(entity) => Err(AppError::request_failed(format!(
                "expected a list, got entity {}",
                entity.id
            ))),
        }
    }

    pub fn into_single(self) -> Result<Entity> {
        match self {
            Self::Single(entity) => Ok(entity),
            Self::List(_) => Err(AppError::request_failed("expected a single entity, got a list")),
        }
    }

    pub fn find(&self, id: &EntityId) -> Option<&Entity> {
        match self {
            Self::Single(entity) => (&entity.id == id).then_some(entity),
            Self::List(entities) => entities.iter().find(|e| &e.id == id),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    /// Generation of this bucket; a torn-down and re-opened view gets a new one
    epoch: u64,
    viewers: usize,
    data: Option<ViewData>,
    stale: bool,
    /// Sequence of the newest ticket issued
    issued: u64,
    /// Tickets below this were issued before the last invalidation
    valid_from: u64,
}

/// Identity of one in-flight fetch.
#[derive(Debug, Clone)]
struct Ticket {
    key: ViewKey,
    epoch: u64,
    seq: u64,
}

struct CacheInner {
    backend: Arc<dyn ContentBackend>,
    buckets: DashMap<ViewKey, Bucket>,
    next_epoch: AtomicU64,
}

/// Shared view cache. Cloning is cheap and every clone sees the same buckets.
#[derive(Clone)]
pub struct ViewCache {
    inner: Arc<CacheInner>,
}

/// Keeps a bucket alive. Dropping the last handle for a key tears the view
/// down; responses still in flight for it are discarded.
#[derive(Debug)]
pub struct ViewHandle {
    key: ViewKey,
    epoch: u64,
    inner: Weak<CacheInner>,
}

impl std::fmt::Debug for CacheInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInner")
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl ViewHandle {
    pub fn key(&self) -> &ViewKey {
        &self.key
    }
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if let Some(mut bucket) = inner.buckets.get_mut(&self.key) {
            if bucket.epoch == self.epoch {
                bucket.viewers = bucket.viewers.saturating_sub(1);
            }
        }
        let removed = inner
            .buckets
            .remove_if(&self.key, |_, b| b.epoch == self.epoch && b.viewers == 0);
        if removed.is_some() {
            debug!(key = %self.key, "view torn down");
        }
    }
}

impl ViewCache {
    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                backend,
                buckets: DashMap::new(),
                next_epoch: AtomicU64::new(1),
            }),
        }
    }

    pub fn backend(&self) -> Arc<dyn ContentBackend> {
        Arc::clone(&self.inner.backend)
    }

    /// Registers a view of `key`, creating its bucket if needed.
    pub fn open(&self, key: ViewKey) -> ViewHandle {
        let mut bucket = self.inner.buckets.entry(key.clone()).or_insert_with(|| Bucket {
            epoch: self.inner.next_epoch.fetch_add(1, Ordering::Relaxed),
            viewers: 0,
            data: None,
            stale: false,
            issued: 0,
            valid_from: 0,
        });
        bucket.viewers += 1;
        let epoch = bucket.epoch;
        drop(bucket);

        ViewHandle {
            key,
            epoch,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the view's data, from memory when the bucket is live and
    /// fresh, otherwise from the backend.
    pub async fn read(&self, key: &ViewKey) -> Result<ViewData> {
        let ticket = match self.inner.buckets.get_mut(key) {
            Some(mut bucket) => {
                if let (false, Some(data)) = (bucket.stale, &bucket.data) {
                    debug!(%key, "cache hit");
                    return Ok(data.clone());
                }
                bucket.issued += 1;
                Some(Ticket {
                    key: key.clone(),
                    epoch: bucket.epoch,
                    seq: bucket.issued,
                })
            }
            None => None,
        };

        let data = self.fetch(key).await?;
        if let Some(ticket) = ticket {
            self.commit(ticket, &data);
        }
        Ok(data)
    }

    async fn fetch(&self, key: &ViewKey) -> Result<ViewData> {
        debug!(%key, "fetching view");
        let backend = &self.inner.backend;
        Ok(match key {
            ViewKey::Feed => ViewData::List(backend.feed().await?),
            ViewKey::Post(id) => ViewData::Single(backend.entity(id).await?),
            ViewKey::Comments(parent) => ViewData::List(backend.children(parent).await?),
            ViewKey::Profile(username) => ViewData::List(backend.profile_posts(username).await?),
        })
    }

    fn commit(&self, ticket: Ticket, data: &ViewData) {
        let Some(mut bucket) = self.inner.buckets.get_mut(&ticket.key) else {
            debug!(key = %ticket.key, "response for torn-down view discarded");
            return;
        };
        if bucket.epoch != ticket.epoch {
            debug!(key = %ticket.key, "response for a previous view generation discarded");
            return;
        }
        if ticket.seq != bucket.issued || ticket.seq < bucket.valid_from {
            debug!(key = %ticket.key, seq = ticket.seq, "superseded response discarded");
            return;
        }
        bucket.data = Some(data.clone());
        bucket.stale = false;
    }

    /// Marks the given buckets stale. Contents are left untouched; the next
    /// read refetches. Returns how many live buckets were affected.
    pub fn invalidate<'a>(&self, keys: impl IntoIterator<Item = &'a ViewKey>) -> usize {
        let mut marked = 0;
        for key in keys {
            if let Some(mut bucket) = self.inner.buckets.get_mut(key) {
                bucket.stale = true;
                bucket.valid_from = bucket.issued + 1;
                marked += 1;
                debug!(%key, "bucket marked stale");
            }
        }
        marked
    }

    pub fn is_live(&self, key: &ViewKey) -> bool {
        self.inner.buckets.contains_key(key)
    }

    /// `None` when no view of `key` is open.
    pub fn is_stale(&self, key: &ViewKey) -> Option<bool> {
        self.inner.buckets.get(key).map(|b| b.stale)
    }

    /// Cached contents, stale or not, without touching the backend.
    pub fn peek(&self, key: &ViewKey) -> Option<ViewData> {
        self.inner.buckets.get(key).and_then(|b| b.data.clone())
    }

    /// Looks the entity up in every live bucket.
    pub fn find_entity(&self, id: &EntityId) -> Option<Entity> {
        self.inner.buckets.iter().find_map(|bucket| {
            bucket
                .data
                .as_ref()
                .and_then(|data| data.find(id))
                .cloned()
        })
    }

    /// Like [`ViewCache::find_entity`], but only from buckets that are not
    /// stale.
    pub fn find_fresh_entity(&self, id: &EntityId) -> Option<Entity> {
        self.inner.buckets.iter().find_map(|bucket| {
            if bucket.stale {
                return None;
            }
            bucket.data.as_ref().and_then(|data| data.find(id)).cloned()
        })
    }
}
