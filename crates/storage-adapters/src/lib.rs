//! # storage-adapters
//!
//! In-process implementation of [`ContentBackend`].
//! Plays the remote service for the demo binary and the test suites:
//! sessions, access rules, cascading deletes and image persistence all
//! behave the way the real service is expected to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use domains::{
    AppError, Content, ContentBackend, Entity, EntityId, Image, Result, UserId, UserSummary,
    VoteDirection, VoteTally,
};
use tracing::debug;
use uuid::Uuid;

const IMAGE_URL_PREFIX: &str = "memory://images";

#[derive(Debug, Clone)]
struct Stored {
    /// Insertion order; listings come back in this order
    seq: u64,
    entity: Entity,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entities: DashMap<EntityId, Stored>,
    users: DashMap<UserId, UserSummary>,
    images: DashMap<String, (mime::Mime, Bytes)>,
    session: RwLock<Option<UserId>>,
    next_seq: AtomicU64,
    /// Reads need a session too
    private_reads: bool,
    calls: DashMap<&'static str, usize>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read requires a signed-in session, like the hosted service.
    pub fn with_private_reads(mut self) -> Self {
        self.private_reads = true;
        self
    }

    pub fn register_user(&self, user: UserSummary) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn sign_in(&self, user: &UserId) -> Result<()> {
        if !self.users.contains_key(user) {
            return Err(AppError::not_found("user", user));
        }
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        Ok(())
    }

    pub fn sign_out(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// How many times the named backend operation was called.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.get(operation).map(|c| *c).unwrap_or(0)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn image(&self, url: &str) -> Option<(mime::Mime, Bytes)> {
        self.images.get(url).map(|i| i.value().clone())
    }

    /// Stores an entity as-is, bypassing sessions and validation. For seeding.
    pub fn seed(&self, entity: Entity) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entities.insert(entity.id.clone(), Stored { seq, entity });
    }

    /// Seeds a post or comment authored by a registered user.
    pub fn seed_entity(&self, author: &UserId, parent: Option<&EntityId>, text: &str) -> Result<Entity> {
        let author = self.user(author)?;
        let entity = Entity {
            id: EntityId::new(Uuid::new_v4().to_string()),
            author,
            content: Content::text(text),
            parent: parent.cloned(),
            created_at: Utc::now(),
            votes: VoteTally::default(),
        };
        self.seed(entity.clone());
        Ok(entity)
    }

    /// Casts a vote on behalf of any user. For seeding.
    pub fn seed_vote(&self, id: &EntityId, user: &UserId, direction: VoteDirection) -> Result<Entity> {
        let mut stored = self
            .entities
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("post", id))?;
        stored.entity.cast_vote(user, direction);
        Ok(stored.entity.clone())
    }

    fn count(&self, operation: &'static str) {
        *self.calls.entry(operation).or_insert(0) += 1;
    }

    fn user(&self, id: &UserId) -> Result<UserSummary> {
        self.users
            .get(id)
            .map(|u| u.value().clone())
            .ok_or_else(|| AppError::not_found("user", id))
    }

    fn session_user(&self) -> Result<UserSummary> {
        let session = self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match session {
            Some(id) => self.user(&id),
            None => Err(AppError::unauthorized("no active session")),
        }
    }

    fn check_read(&self) -> Result<()> {
        if self.private_reads {
            self.session_user()?;
        }
        Ok(())
    }

    fn get(&self, id: &EntityId) -> Result<Entity> {
        self.entities
            .get(id)
            .map(|s| s.entity.clone())
            .ok_or_else(|| AppError::not_found("post", id))
    }

    /// Entities matching `filter`, in insertion order.
    fn list(&self, filter: impl Fn(&Entity) -> bool) -> Vec<Entity> {
        let mut found: Vec<Stored> = self
            .entities
            .iter()
            .filter(|s| filter(&s.entity))
            .map(|s| s.value().clone())
            .collect();
        found.sort_by_key(|s| s.seq);
        found.into_iter().map(|s| s.entity).collect()
    }

    /// Replaces an inline image with a retrievable URL.
    fn persist_image(&self, content: Content) -> Result<Content> {
        match content.image {
            Some(image @ Image::Inline(_)) => {
                let (content_type, data) = image.decode_inline()?;
                let url = format!("{IMAGE_URL_PREFIX}/{}", Uuid::new_v4());
                debug!(%url, bytes = data.len(), "image stored");
                self.images.insert(url.clone(), (content_type, data));
                Ok(Content {
                    text: content.text,
                    image: Some(Image::Url(url)),
                })
            }
            _ => Ok(content),
        }
    }

    fn create(&self, parent: Option<&EntityId>, content: Content) -> Result<Entity> {
        let author = self.session_user()?;
        content.validate()?;
        if let Some(parent) = parent {
            self.get(parent)?;
        }
        let entity = Entity {
            id: EntityId::new(Uuid::new_v4().to_string()),
            author,
            content: self.persist_image(content)?,
            parent: parent.cloned(),
            created_at: Utc::now(),
            votes: VoteTally::default(),
        };
        self.seed(entity.clone());
        Ok(entity)
    }
}

#[async_trait]
impl ContentBackend for InMemoryBackend {
    async fn current_user(&self) -> Result<UserSummary> {
        self.count("current_user");
        self.session_user()
    }

    async fn entity(&self, id: &EntityId) -> Result<Entity> {
        self.count("entity");
        self.check_read()?;
        self.get(id)
    }

    async fn children(&self, parent: &EntityId) -> Result<Vec<Entity>> {
        self.count("children");
        self.check_read()?;
        self.get(parent)?;
        Ok(self.list(|e| e.parent.as_ref() == Some(parent)))
    }

    /// Top-level posts, newest first.
    async fn feed(&self) -> Result<Vec<Entity>> {
        self.count("feed");
        self.check_read()?;
        let mut posts = self.list(|e| e.parent.is_none());
        posts.reverse();
        Ok(posts)
    }

    async fn profile_posts(&self, username: &str) -> Result<Vec<Entity>> {
        self.count("profile_posts");
        self.check_read()?;
        if !self.users.iter().any(|u| u.username == username) {
            return Err(AppError::not_found("profile", username));
        }
        let mut posts = self.list(|e| e.parent.is_none() && e.author.username == username);
        posts.reverse();
        Ok(posts)
    }

    async fn vote(&self, id: &EntityId, direction: VoteDirection) -> Result<Entity> {
        self.count("vote");
        let user = self.session_user()?;
        self.seed_vote(id, &user.id, direction)
    }

    async fn create_comment(&self, parent: &EntityId, content: Content) -> Result<Entity> {
        self.count("create_comment");
        self.create(Some(parent), content)
    }

    async fn create_post(&self, content: Content) -> Result<Entity> {
        self.count("create_post");
        self.create(None, content)
    }

    /// Removes the entity and every comment beneath it.
    async fn delete(&self, id: &EntityId) -> Result<Entity> {
        self.count("delete");
        let user = self.session_user()?;
        let entity = self.get(id)?;
        if !entity.is_authored_by(&user.id) {
            return Err(AppError::forbidden("only the author can delete this post"));
        }

        let mut doomed = vec![id.clone()];
        while let Some(next) = doomed.pop() {
            self.entities.remove(&next);
            doomed.extend(
                self.list(|e| e.parent.as_ref() == Some(&next))
                    .into_iter()
                    .map(|e| e.id),
            );
        }
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::ErrorKind;

    fn user(id: &str) -> UserSummary {
        UserSummary {
            id: UserId::from(id),
            username: id.to_string(),
            display_name: id.to_uppercase(),
            avatar: None,
            bio: None,
        }
    }

    fn backend_with(users: &[&str]) -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        for id in users {
            backend.register_user(user(id));
        }
        backend
    }

    #[tokio::test]
    async fn mutations_require_a_session() {
        let backend = backend_with(&["ruth"]);
        let post = backend.seed_entity(&UserId::from("ruth"), None, "hello").unwrap();

        let err = backend.vote(&post.id, VoteDirection::Up).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn only_the_author_may_delete() {
        let backend = backend_with(&["ruth", "naomi"]);
        let post = backend.seed_entity(&UserId::from("ruth"), None, "hello").unwrap();
        backend.sign_in(&UserId::from("naomi")).unwrap();

        let err = backend.delete(&post.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(backend.contains(&post.id));
    }

    #[tokio::test]
    async fn delete_cascades_to_comments() {
        let backend = backend_with(&["ruth", "naomi"]);
        let ruth = UserId::from("ruth");
        let post = backend.seed_entity(&ruth, None, "hello").unwrap();
        let comment = backend.seed_entity(&UserId::from("naomi"), Some(&post.id), "hi").unwrap();
        let reply = backend.seed_entity(&ruth, Some(&comment.id), "hey").unwrap();
        backend.sign_in(&ruth).unwrap();

        backend.delete(&post.id).await.unwrap();

        assert!(!backend.contains(&comment.id));
        assert!(!backend.contains(&reply.id));
    }

    #[tokio::test]
    async fn inline_images_are_stored_and_replaced_by_urls() {
        let backend = backend_with(&["ruth"]);
        let ruth = UserId::from("ruth");
        let post = backend.seed_entity(&ruth, None, "hello").unwrap();
        backend.sign_in(&ruth).unwrap();

        let image = Image::inline(&mime::IMAGE_JPEG, Bytes::from_static(b"\xff\xd8\xff")).unwrap();
        let comment = backend
            .create_comment(&post.id, Content::text("look").with_image(image))
            .await
            .unwrap();

        let Some(Image::Url(url)) = comment.content.image else {
            panic!("image should have been persisted");
        };
        let (content_type, data) = backend.image(&url).unwrap();
        assert_eq!(content_type, mime::IMAGE_JPEG);
        assert_eq!(&data[..], b"\xff\xd8\xff");
    }

    #[tokio::test]
    async fn children_keep_insertion_order() {
        let backend = backend_with(&["ruth"]);
        let ruth = UserId::from("ruth");
        let post = backend.seed_entity(&ruth, None, "hello").unwrap();
        let ids: Vec<EntityId> = (0..5)
            .map(|i| backend.seed_entity(&ruth, Some(&post.id), &i.to_string()).unwrap().id)
            .collect();

        let children = backend.children(&post.id).await.unwrap();
        assert_eq!(children.into_iter().map(|c| c.id).collect::<Vec<_>>(), ids);
    }

    #[tokio::test]
    async fn private_reads_need_a_session() {
        let backend = backend_with(&["ruth"]).with_private_reads();
        let err = backend.feed().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
