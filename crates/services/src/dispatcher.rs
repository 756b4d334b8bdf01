//! # Mutation Dispatcher
//!
//! Runs create, delete and vote operations against the backend. Each
//! operation holds an in-flight key for its target while it is outstanding;
//! a repeat of the same key is rejected instead of reaching the backend.
//! On success the affected buckets are marked stale, on failure nothing the
//! caller can observe has changed. A mutation dropped while its request is
//! outstanding may still have been applied remotely, so the buckets it could
//! have touched are marked stale as well.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use domains::{
    AppError, Content, ContentBackend, Entity, EntityId, ErrorKind, OperationKind, Result, UserId,
    ViewKey, Viewer, VoteDirection, VoteState,
};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::cache::ViewCache;
use crate::invalidator;

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationTarget {
    Entity(EntityId),
    /// New top-level posts have no entity yet; they are keyed by author.
    Author(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Vote,
    Delete,
    Comment,
    Post,
}

/// Logical identity of an outstanding mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub target: MutationTarget,
    pub kind: MutationKind,
}

impl MutationKey {
    pub fn entity(id: &EntityId, kind: MutationKind) -> Self {
        Self {
            target: MutationTarget::Entity(id.clone()),
            kind,
        }
    }
}

impl fmt::Display for MutationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MutationKind::Vote => "vote",
            MutationKind::Delete => "delete",
            MutationKind::Comment => "comment",
            MutationKind::Post => "post",
        };
        match &self.target {
            MutationTarget::Entity(id) => write!(f, "{kind} on {id}"),
            MutationTarget::Author(user) => write!(f, "{kind} by {user}"),
        }
    }
}

/// Result of a successful mutation and the buckets it made stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<T> {
    pub value: T,
    pub invalidated: BTreeSet<ViewKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// User-facing notification for one finished mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub kind: Option<ErrorKind>,
}

/// Releases the in-flight key when the mutation finishes or is dropped.
struct InFlight<'a> {
    keys: &'a DashSet<MutationKey>,
    key: MutationKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}

/// Removes an optimistic vote overlay, whatever the outcome.
struct Overlay<'a> {
    pending: &'a DashMap<EntityId, Entity>,
    id: EntityId,
}

impl Drop for Overlay<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Marks the buckets a mutation could have touched stale unless the request
/// came back, in which case the outcome decides.
struct Unsettled<'a> {
    cache: &'a ViewCache,
    keys: Option<BTreeSet<ViewKey>>,
}

impl Unsettled<'_> {
    fn settle(mut self) {
        self.keys = None;
    }
}

impl Drop for Unsettled<'_> {
    fn drop(&mut self) {
        if let Some(keys) = self.keys.take() {
            let marked = self.cache.invalidate(&keys);
            debug!(buckets = keys.len(), live = marked, "mutation abandoned in flight");
        }
    }
}

pub struct MutationDispatcher {
    backend: Arc<dyn ContentBackend>,
    cache: ViewCache,
    in_flight: DashSet<MutationKey>,
    /// Optimistic copies of entities with a vote outstanding
    pending: DashMap<EntityId, Entity>,
    notices: broadcast::Sender<Notice>,
}

impl MutationDispatcher {
    pub fn new(cache: ViewCache) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            backend: cache.backend(),
            cache,
            in_flight: DashSet::new(),
            pending: DashMap::new(),
            notices,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn is_in_flight(&self, key: &MutationKey) -> bool {
        self.in_flight.contains(key)
    }

    /// The entity as the user should currently see it, including a vote
    /// that is still on its way to the backend.
    pub fn effective(&self, entity: &Entity) -> Entity {
        self.pending
            .get(&entity.id)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| entity.clone())
    }

    pub fn vote_state(&self, entity: &Entity, viewer: &Viewer) -> VoteState {
        self.effective(entity).vote_state(viewer)
    }

    #[instrument(skip_all, fields(id = %id, direction = direction.as_str()))]
    pub async fn vote(
        &self,
        viewer: &Viewer,
        id: &EntityId,
        direction: VoteDirection,
    ) -> Result<Applied<Entity>> {
        let operation = OperationKind::Vote(direction);
        let result = self.try_vote(viewer, id, direction).await;
        self.report(operation, &result);
        result
    }

    async fn try_vote(
        &self,
        viewer: &Viewer,
        id: &EntityId,
        direction: VoteDirection,
    ) -> Result<Applied<Entity>> {
        let user = viewer.require_user()?;
        let _guard = self.acquire(MutationKey::entity(id, MutationKind::Vote))?;

        let operation = OperationKind::Vote(direction);
        let known = self.cache.find_entity(id);
        let unsettled = self.unsettled(match &known {
            Some(entity) => invalidator::on_mutation_success(entity, operation, viewer),
            None => BTreeSet::from([ViewKey::Post(id.clone())]),
        });

        // Stale copies may predate this user's last vote.
        let _overlay = self.cache.find_fresh_entity(id).map(|mut optimistic| {
            optimistic.cast_vote(&user.id, direction);
            self.pending.insert(id.clone(), optimistic);
            Overlay {
                pending: &self.pending,
                id: id.clone(),
            }
        });

        let result = self.backend.vote(id, direction).await;
        unsettled.settle();
        Ok(self.finish(result?, operation, viewer, None))
    }

    #[instrument(skip_all, fields(parent = %parent))]
    pub async fn create_comment(
        &self,
        viewer: &Viewer,
        parent: &EntityId,
        content: Content,
    ) -> Result<Applied<Entity>> {
        let result = self.try_create_comment(viewer, parent, content).await;
        self.report(OperationKind::CreateComment, &result);
        result
    }

    async fn try_create_comment(
        &self,
        viewer: &Viewer,
        parent: &EntityId,
        content: Content,
    ) -> Result<Applied<Entity>> {
        viewer.require_user()?;
        content.validate()?;
        let _guard = self.acquire(MutationKey::entity(parent, MutationKind::Comment))?;

        let unsettled = self.unsettled(BTreeSet::from([ViewKey::Comments(parent.clone())]));
        let result = self.backend.create_comment(parent, content).await;
        unsettled.settle();
        Ok(self.finish(
            result?,
            OperationKind::CreateComment,
            viewer,
            Some(ViewKey::Comments(parent.clone())),
        ))
    }

    #[instrument(skip_all)]
    pub async fn create_post(&self, viewer: &Viewer, content: Content) -> Result<Applied<Entity>> {
        let result = self.try_create_post(viewer, content).await;
        self.report(OperationKind::CreatePost, &result);
        result
    }

    async fn try_create_post(&self, viewer: &Viewer, content: Content) -> Result<Applied<Entity>> {
        let user = viewer.require_user()?;
        content.validate()?;
        let _guard = self.acquire(MutationKey {
            target: MutationTarget::Author(user.id.clone()),
            kind: MutationKind::Post,
        })?;

        let unsettled = self.unsettled(BTreeSet::from([
            ViewKey::Feed,
            ViewKey::Profile(user.username.clone()),
        ]));
        let result = self.backend.create_post(content).await;
        unsettled.settle();
        Ok(self.finish(result?, OperationKind::CreatePost, viewer, None))
    }

    /// Deletes a post or comment. Returns the entity as it was removed.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn delete_post(&self, viewer: &Viewer, id: &EntityId) -> Result<Applied<Entity>> {
        let result = self.try_delete(viewer, id).await;
        self.report(OperationKind::Delete, &result);
        result
    }

    async fn try_delete(&self, viewer: &Viewer, id: &EntityId) -> Result<Applied<Entity>> {
        let user = viewer.require_user()?;
        let known = self.cache.find_entity(id);
        if let Some(known) = &known {
            if !known.is_authored_by(&user.id) {
                return Err(AppError::forbidden("only the author can delete this post"));
            }
        }
        let _guard = self.acquire(MutationKey::entity(id, MutationKind::Delete))?;

        let unsettled = self.unsettled(match &known {
            Some(entity) => invalidator::on_mutation_success(entity, OperationKind::Delete, viewer),
            None => BTreeSet::from([ViewKey::Feed, ViewKey::Post(id.clone())]),
        });
        let result = self.backend.delete(id).await;
        unsettled.settle();
        Ok(self.finish(result?, OperationKind::Delete, viewer, None))
    }

    fn acquire(&self, key: MutationKey) -> Result<InFlight<'_>> {
        if !self.in_flight.insert(key.clone()) {
            return Err(AppError::AlreadyInFlight(key.to_string()));
        }
        Ok(InFlight {
            keys: &self.in_flight,
            key,
        })
    }

    fn unsettled(&self, keys: BTreeSet<ViewKey>) -> Unsettled<'_> {
        Unsettled {
            cache: &self.cache,
            keys: Some(keys),
        }
    }

    fn finish(
        &self,
        entity: Entity,
        operation: OperationKind,
        viewer: &Viewer,
        extra: Option<ViewKey>,
    ) -> Applied<Entity> {
        let mut invalidated = invalidator::on_mutation_success(&entity, operation, viewer);
        invalidated.extend(extra);
        let marked = self.cache.invalidate(&invalidated);
        info!(
            id = %entity.id,
            operation = operation.as_str(),
            buckets = invalidated.len(),
            live = marked,
            "mutation applied"
        );
        Applied {
            value: entity,
            invalidated,
        }
    }

    fn report<T>(&self, operation: OperationKind, result: &Result<T>) {
        let notice = match result {
            Ok(_) => Notice {
                level: NoticeLevel::Success,
                message: success_message(operation).to_string(),
                kind: None,
            },
            Err(err) => {
                warn!(operation = operation.as_str(), error = %err, "mutation failed");
                Notice {
                    level: NoticeLevel::Error,
                    message: err.notice(),
                    kind: Some(err.kind()),
                }
            }
        };
        // Nobody listening is fine.
        let _ = self.notices.send(notice);
    }
}

fn success_message(operation: OperationKind) -> &'static str {
    match operation {
        OperationKind::Vote(VoteDirection::Up) => "Post upvoted successfully",
        OperationKind::Vote(VoteDirection::Down) => "Post downvoted successfully",
        OperationKind::Delete => "Post deleted successfully",
        OperationKind::CreateComment => "Comment added successfully",
        OperationKind::CreatePost => "Post created successfully",
    }
}
