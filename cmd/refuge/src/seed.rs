//! Sample community for the in-memory backend.

use domains::{EntityId, Result, UserId, UserSummary, VoteDirection};
use storage_adapters::InMemoryBackend;

fn member(id: &str, name: &str, bio: &str) -> UserSummary {
    UserSummary {
        id: UserId::from(id),
        username: id.to_string(),
        display_name: name.to_string(),
        avatar: None,
        bio: Some(bio.to_string()),
    }
}

/// Registers three members, a few posts and a small comment thread, and
/// returns the member the demo session signs in as.
pub fn seed(backend: &InMemoryBackend) -> Result<UserId> {
    let ruth = UserId::from("ruth");
    let naomi = UserId::from("naomi");
    let boaz = UserId::from("boaz");
    backend.register_user(member("ruth", "Ruth", "Gleaning in the fields"));
    backend.register_user(member("naomi", "Naomi", "Back in Bethlehem"));
    backend.register_user(member("boaz", "Boaz", "Owner of the barley field"));

    let post = backend.seed_entity(&naomi, None, "Where do you find rest this week?")?;
    backend.seed_entity(&boaz, None, "Harvest starts Monday, all hands welcome.")?;

    let first = backend.seed_entity(&ruth, Some(&post.id), "In the evenings, after the work is done.")?;
    let second = backend.seed_entity(&boaz, Some(&post.id), "At the threshing floor, honestly.")?;
    backend.seed_entity(&naomi, Some(&first.id), "Same here.")?;

    vote(backend, &post.id, &[(&ruth, VoteDirection::Up), (&boaz, VoteDirection::Up)])?;
    vote(backend, &second.id, &[(&ruth, VoteDirection::Up), (&naomi, VoteDirection::Up)])?;
    vote(backend, &first.id, &[(&boaz, VoteDirection::Down)])?;

    Ok(ruth)
}

fn vote(backend: &InMemoryBackend, id: &EntityId, votes: &[(&UserId, VoteDirection)]) -> Result<()> {
    for (user, direction) in votes {
        backend.seed_vote(id, user, *direction)?;
    }
    Ok(())
}
