//! # Entity Model
//!
//! Typed reads over the view cache. Everything handed out here has been
//! checked against the entity invariants the rest of the core relies on.

use std::collections::HashSet;

use domains::{AppError, Entity, EntityId, Result, ViewKey};
use tracing::instrument;

use crate::cache::ViewCache;

#[derive(Clone)]
pub struct EntityModel {
    cache: ViewCache,
}

impl EntityModel {
    pub fn new(cache: ViewCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ViewCache {
        &self.cache
    }

    pub async fn fetch_entity(&self, id: &EntityId) -> Result<Entity> {
        let entity = self.cache.read(&ViewKey::Post(id.clone())).await?.into_single()?;
        if &entity.id != id {
            return Err(AppError::request_failed(format!(
                "asked for {id}, backend answered with {}",
                entity.id
            )));
        }
        Ok(entity)
    }

    pub async fn fetch_children(&self, parent: &EntityId) -> Result<Vec<Entity>> {
        let children = self
            .cache
            .read(&ViewKey::Comments(parent.clone()))
            .await?
            .into_list()?;
        for child in &children {
            if &child.id == parent || child.parent.as_ref() != Some(parent) {
                return Err(AppError::validation(format!(
                    "{} is not a comment of {parent}",
                    child.id
                )));
            }
        }
        Ok(children)
    }

    pub async fn fetch_feed(&self) -> Result<Vec<Entity>> {
        let posts = self.cache.read(&ViewKey::Feed).await?.into_list()?;
        if let Some(comment) = posts.iter().find(|p| p.is_comment()) {
            return Err(AppError::validation(format!(
                "feed contains comment {}",
                comment.id
            )));
        }
        Ok(posts)
    }

    pub async fn fetch_profile_posts(&self, username: &str) -> Result<Vec<Entity>> {
        self.cache
            .read(&ViewKey::Profile(username.to_string()))
            .await?
            .into_list()
    }

    /// Follows parent references up to the top-level post.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn resolve_root(&self, id: &EntityId) -> Result<Entity> {
        let mut seen = HashSet::new();
        let mut current = self.fetch_entity(id).await?;
        while let Some(parent) = current.parent.clone() {
            if !seen.insert(current.id.clone()) || parent == current.id {
                return Err(AppError::validation(format!(
                    "parent chain of {id} loops back on {parent}"
                )));
            }
            current = self.fetch_entity(&parent).await?;
        }
        Ok(current)
    }
}
