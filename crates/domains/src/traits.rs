//! # Core Traits (Ports)
//!
//! Any backend adapter must implement these traits to be used by the services.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Content, Entity, EntityId, UserSummary};
use crate::votes::VoteDirection;

/// Request contract to the remote content service.
///
/// Implementations normalize whatever error shape their transport produces
/// into [`crate::AppError`] before returning. Access rules, persistence and
/// cascading deletes belong to the implementation.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// The signed-in user behind the current session.
    async fn current_user(&self) -> Result<UserSummary>;

    // Reads
    async fn entity(&self, id: &EntityId) -> Result<Entity>;
    async fn children(&self, parent: &EntityId) -> Result<Vec<Entity>>;
    async fn feed(&self) -> Result<Vec<Entity>>;
    async fn profile_posts(&self, username: &str) -> Result<Vec<Entity>>;

    // Mutations
    /// Applies toggle semantics server-side and returns the updated entity.
    async fn vote(&self, id: &EntityId, direction: VoteDirection) -> Result<Entity>;
    async fn create_comment(&self, parent: &EntityId, content: Content) -> Result<Entity>;
    async fn create_post(&self, content: Content) -> Result<Entity>;
    /// Removes the entity and returns it as it was just before removal.
    async fn delete(&self, id: &EntityId) -> Result<Entity>;
}
