//! View bucket keys and the operations that make them stale.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::EntityId;
use crate::votes::VoteDirection;

/// Key of an independently cached view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViewKey {
    /// The global list of top-level posts
    Feed,
    /// A single post's detail page
    Post(EntityId),
    /// Direct comments of a post or comment
    Comments(EntityId),
    /// Posts listed on a user's profile, keyed by username
    Profile(String),
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feed => f.write_str("feed"),
            Self::Post(id) => write!(f, "post:{id}"),
            Self::Comments(parent) => write!(f, "comments:{parent}"),
            Self::Profile(username) => write!(f, "profile:{username}"),
        }
    }
}

/// A successful mutation, as seen by the invalidator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Vote(VoteDirection),
    Delete,
    CreateComment,
    CreatePost,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vote(VoteDirection::Up) => "upvote",
            Self::Vote(VoteDirection::Down) => "downvote",
            Self::Delete => "delete",
            Self::CreateComment => "create_comment",
            Self::CreatePost => "create_post",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_as_bucket_names() {
        let id = EntityId::from("p1");
        assert_eq!(ViewKey::Feed.to_string(), "feed");
        assert_eq!(ViewKey::Post(id.clone()).to_string(), "post:p1");
        assert_eq!(ViewKey::Comments(id).to_string(), "comments:p1");
        assert_eq!(ViewKey::Profile("ruth".into()).to_string(), "profile:ruth");
    }
}
