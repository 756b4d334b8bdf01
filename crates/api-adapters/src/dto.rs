//! Wire shapes of the content service and their mapping to domain models.

use chrono::{DateTime, Utc};
use domains::{AppError, Content, Entity, EntityId, Image, Result, UserId, UserSummary, VoteTally};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePost {
    #[serde(rename = "_id")]
    pub id: String,
    pub author: WireUser,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub up_votes: Vec<String>,
    #[serde(default)]
    pub down_votes: Vec<String>,
}

/// Body of comment and post submissions.
#[derive(Debug, Clone, Serialize)]
pub struct WireContent {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<WireUser> for UserSummary {
    fn from(user: WireUser) -> Self {
        Self {
            display_name: non_empty(user.name).unwrap_or_else(|| user.username.clone()),
            id: UserId::new(user.id),
            username: user.username,
            avatar: non_empty(user.profile_image),
            bio: non_empty(user.bio),
        }
    }
}

impl TryFrom<WirePost> for Entity {
    type Error = AppError;

    fn try_from(post: WirePost) -> Result<Self> {
        let votes = VoteTally::new(
            post.up_votes.into_iter().map(UserId::new).collect(),
            post.down_votes.into_iter().map(UserId::new).collect(),
        )
        .map_err(|e| AppError::request_failed(format!("malformed post {}: {e}", post.id)))?;

        let image = non_empty(post.image).map(|src| {
            if src.starts_with("data:") {
                Image::Inline(src)
            } else {
                Image::Url(src)
            }
        });

        Ok(Self {
            id: EntityId::new(post.id),
            author: post.author.into(),
            content: Content {
                text: post.content,
                image,
            },
            parent: non_empty(post.parent).map(EntityId::new),
            created_at: post.created_at,
            votes,
        })
    }
}

impl From<Content> for WireContent {
    fn from(content: Content) -> Self {
        Self {
            content: content.text,
            image: content.image.map(|i| i.as_str().to_string()),
        }
    }
}

pub fn into_entities(posts: Vec<WirePost>) -> Result<Vec<Entity>> {
    posts.into_iter().map(Entity::try_from).collect()
}
