//! Shared fixtures for the cross-crate tests.
//!
//! [`GatedBackend`] wraps the in-memory backend and can hold chosen
//! operations until the test releases them, which is how the tests observe
//! the core while a request is still outstanding. Reads are answered first
//! and held on the way back; mutations are held before they reach the store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use domains::{
    Content, ContentBackend, Entity, EntityId, Result, UserId, UserSummary, Viewer, VoteDirection,
};
use services::ContentServices;
use storage_adapters::InMemoryBackend;
use tokio::sync::{Notify, Semaphore};

pub fn user(id: &str) -> UserSummary {
    UserSummary {
        id: UserId::from(id),
        username: id.to_string(),
        display_name: id.to_uppercase(),
        avatar: None,
        bio: None,
    }
}

pub struct GatedBackend {
    inner: Arc<InMemoryBackend>,
    held: DashSet<&'static str>,
    entered: Notify,
    release: Semaphore,
}

impl GatedBackend {
    pub fn new(inner: Arc<InMemoryBackend>) -> Self {
        Self {
            inner,
            held: DashSet::new(),
            entered: Notify::new(),
            release: Semaphore::new(0),
        }
    }

    /// Calls to `operation` wait for [`GatedBackend::release`] from now on.
    pub fn hold(&self, operation: &'static str) {
        self.held.insert(operation);
    }

    pub fn unhold(&self, operation: &'static str) {
        self.held.remove(operation);
    }

    /// Resolves once a held call has arrived.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets one held call through.
    pub fn release(&self) {
        self.release.add_permits(1);
    }

    async fn pass(&self, operation: &'static str) {
        if self.held.contains(operation) {
            self.entered.notify_one();
            if let Ok(permit) = self.release.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl ContentBackend for GatedBackend {
    async fn current_user(&self) -> Result<UserSummary> {
        let answer = self.inner.current_user().await;
        self.pass("current_user").await;
        answer
    }

    async fn entity(&self, id: &EntityId) -> Result<Entity> {
        let answer = self.inner.entity(id).await;
        self.pass("entity").await;
        answer
    }

    async fn children(&self, parent: &EntityId) -> Result<Vec<Entity>> {
        let answer = self.inner.children(parent).await;
        self.pass("children").await;
        answer
    }

    async fn feed(&self) -> Result<Vec<Entity>> {
        let answer = self.inner.feed().await;
        self.pass("feed").await;
        answer
    }

    async fn profile_posts(&self, username: &str) -> Result<Vec<Entity>> {
        let answer = self.inner.profile_posts(username).await;
        self.pass("profile_posts").await;
        answer
    }

    async fn vote(&self, id: &EntityId, direction: VoteDirection) -> Result<Entity> {
        self.pass("vote").await;
        self.inner.vote(id, direction).await
    }

    async fn create_comment(&self, parent: &EntityId, content: Content) -> Result<Entity> {
        self.pass("create_comment").await;
        self.inner.create_comment(parent, content).await
    }

    async fn create_post(&self, content: Content) -> Result<Entity> {
        self.pass("create_post").await;
        self.inner.create_post(content).await
    }

    async fn delete(&self, id: &EntityId) -> Result<Entity> {
        self.pass("delete").await;
        self.inner.delete(id).await
    }
}

/// A backend with registered users and the content core wired on top.
pub struct World {
    pub store: Arc<InMemoryBackend>,
    pub gate: Arc<GatedBackend>,
    pub core: Arc<ContentServices>,
}

impl World {
    pub fn new(users: &[&str]) -> Self {
        let store = Arc::new(InMemoryBackend::new());
        for id in users {
            store.register_user(user(id));
        }
        let gate = Arc::new(GatedBackend::new(Arc::clone(&store)));
        let core = Arc::new(ContentServices::new(gate.clone()));
        Self { store, gate, core }
    }

    /// Signs `id` in on the backend and returns the matching viewer.
    pub fn sign_in(&self, id: &str) -> Viewer {
        self.store
            .sign_in(&UserId::from(id))
            .expect("fixture user is registered");
        Viewer::User(user(id))
    }

    pub fn post(&self, author: &str, text: &str) -> Entity {
        self.store
            .seed_entity(&UserId::from(author), None, text)
            .expect("fixture user is registered")
    }

    pub fn comment(&self, author: &str, parent: &EntityId, text: &str) -> Entity {
        self.store
            .seed_entity(&UserId::from(author), Some(parent), text)
            .expect("fixture user is registered")
    }

    pub fn seed_vote(&self, id: &EntityId, voter: &str, direction: VoteDirection) {
        self.store
            .seed_vote(id, &UserId::from(voter), direction)
            .expect("fixture entity exists");
    }
}
