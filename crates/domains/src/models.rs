//! # Domain Models
//!
//! These structs represent the core entities of Refuge.
//! A post and a comment are the same [`Entity`]; a comment simply carries a
//! `parent` id. Nesting is resolved by id lookup, never by owning children.

use std::fmt;

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::votes::{VoteDirection, VoteOutcome, VoteState, VoteTally};

/// Server-issued identifier of a post or comment. The client never mints one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of the author taken when the entity was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    /// The profile slug (e.g., "ruth" for /profile/ruth)
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
}

/// Who is looking at the content. Passed explicitly into every vote and
/// mutation call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Viewer {
    #[default]
    Anonymous,
    User(UserSummary),
}

impl Viewer {
    pub fn user(&self) -> Option<&UserSummary> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user),
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user().map(|u| &u.id)
    }

    /// The signed-in user, or `Unauthorized` for anonymous viewers.
    pub fn require_user(&self) -> Result<&UserSummary> {
        self.user()
            .ok_or_else(|| AppError::unauthorized("sign in to post, comment or vote"))
    }
}

/// Attached picture. Inline images are base64 data URLs that the backend
/// persists and replaces with a retrievable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Image {
    Url(String),
    Inline(String),
}

impl Image {
    /// Encodes raw image bytes as a `data:<mime>;base64,<payload>` URL.
    pub fn inline(content_type: &mime::Mime, data: Bytes) -> Result<Self> {
        if content_type.type_() != mime::IMAGE {
            return Err(AppError::validation(format!(
                "attachments must be images, got {content_type}"
            )));
        }
        if data.is_empty() {
            return Err(AppError::validation("image attachment is empty"));
        }
        let payload = base64::engine::general_purpose::STANDARD.encode(&data);
        Ok(Self::Inline(format!(
            "data:{};base64,{payload}",
            content_type.essence_str()
        )))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(url) | Self::Inline(url) => url,
        }
    }

    /// Splits an inline data URL into its MIME type and decoded bytes.
    pub fn decode_inline(&self) -> Result<(mime::Mime, Bytes)> {
        let Self::Inline(data_url) = self else {
            return Err(AppError::validation("image is not inline data"));
        };
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| AppError::validation("inline image must be a data URL"))?;
        let (content_type, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| AppError::validation("inline image must be base64 encoded"))?;
        let content_type: mime::Mime = content_type
            .parse()
            .map_err(|_| AppError::validation(format!("bad image type {content_type}")))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| AppError::validation(format!("bad image payload: {e}")))?;
        Ok((content_type, Bytes::from(bytes)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    pub image: Option<Image>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: Image) -> Self {
        self.image = Some(image);
        self
    }

    /// Rejects blank bodies before anything goes over the wire.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(AppError::validation("content must not be empty"));
        }
        Ok(())
    }
}

/// A post or a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub author: UserSummary,
    pub content: Content,
    /// `None` for top-level posts
    pub parent: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub votes: VoteTally,
}

impl Entity {
    pub fn is_comment(&self) -> bool {
        self.parent.is_some()
    }

    pub fn score(&self) -> i64 {
        self.votes.score()
    }

    pub fn is_authored_by(&self, user: &UserId) -> bool {
        &self.author.id == user
    }

    pub fn vote_state(&self, viewer: &Viewer) -> VoteState {
        viewer
            .user_id()
            .map(|id| self.votes.state_of(id))
            .unwrap_or_default()
    }

    /// Entry point of the Vote Engine for a whole entity.
    pub fn cast_vote(&mut self, user: &UserId, direction: VoteDirection) -> VoteOutcome {
        self.votes.cast(user, direction)
    }
}
