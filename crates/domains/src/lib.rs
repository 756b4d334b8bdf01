//! refuge/crates/domains/src/lib.rs
//!
//! The central domain logic and interface definitions for Refuge:
//! the recursive post/comment entity, the vote engine, view keys and the
//! backend port.

pub mod error;
pub mod models;
pub mod traits;
pub mod views;
pub mod votes;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;
pub use views::*;
pub use votes::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn author() -> UserSummary {
        UserSummary {
            id: UserId::from("u1"),
            username: "ruth".into(),
            display_name: "Ruth".into(),
            avatar: None,
            bio: Some("gleaning".into()),
        }
    }

    #[test]
    fn comment_is_an_entity_with_a_parent() {
        let comment = Entity {
            id: EntityId::from("c1"),
            author: author(),
            content: Content::text("Hello Rust!"),
            parent: Some(EntityId::from("p1")),
            created_at: Utc::now(),
            votes: VoteTally::default(),
        };
        assert!(comment.is_comment());
        assert!(comment.is_authored_by(&UserId::from("u1")));
        assert_eq!(comment.score(), 0);
    }

    #[test]
    fn entity_json_carries_votes_and_parent() {
        let mut post = Entity {
            id: EntityId::from("p1"),
            author: author(),
            content: Content::text("first"),
            parent: None,
            created_at: Utc::now(),
            votes: VoteTally::default(),
        };
        post.cast_vote(&UserId::from("u2"), VoteDirection::Up);

        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["votes"]["up"], serde_json::json!(["u2"]));
        assert!(json["parent"].is_null());

        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, post);
    }
}
