//! In-flight deduplication, optimistic votes and notices, driven through
//! the gated backend so requests can be observed while outstanding.

use std::sync::Arc;

use domains::{Content, EntityId, ErrorKind, ViewKey, Viewer, VoteDirection, VoteState};
use integration_tests::World;
use services::{Applied, MutationKey, MutationKind, NoticeLevel};
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

fn spawn_vote(
    world: &World,
    viewer: &Viewer,
    id: &EntityId,
    direction: VoteDirection,
) -> JoinHandle<domains::Result<Applied<domains::Entity>>> {
    let core = Arc::clone(&world.core);
    let (viewer, id) = (viewer.clone(), id.clone());
    tokio::spawn(async move { core.mutations.vote(&viewer, &id, direction).await })
}

#[tokio::test]
async fn repeated_vote_while_outstanding_reaches_the_backend_once() {
    let world = World::new(&["ruth", "naomi"]);
    let post = world.post("naomi", "first");
    let viewer = world.sign_in("ruth");
    let mut notices = world.core.mutations.subscribe();

    world.gate.hold("vote");
    let first = spawn_vote(&world, &viewer, &post.id, VoteDirection::Up);
    world.gate.entered().await;

    let key = MutationKey::entity(&post.id, MutationKind::Vote);
    assert!(world.core.mutations.is_in_flight(&key));
    let second = world
        .core
        .mutations
        .vote(&viewer, &post.id, VoteDirection::Up)
        .await;
    assert_eq!(second.unwrap_err().kind(), ErrorKind::AlreadyInFlight);

    let rejected = notices.recv().await.unwrap();
    assert_eq!(rejected.level, NoticeLevel::Error);
    assert_eq!(rejected.kind, Some(ErrorKind::AlreadyInFlight));

    world.gate.release();
    let applied = assert_ok!(first.await.unwrap());
    assert_eq!(applied.value.score(), 1);
    assert_eq!(world.store.calls("vote"), 1);
    assert!(!world.core.mutations.is_in_flight(&key));

    let done = notices.recv().await.unwrap();
    assert_eq!(done.level, NoticeLevel::Success);
    assert_eq!(done.message, "Post upvoted successfully");
}

#[tokio::test]
async fn different_operations_on_one_entity_do_not_block_each_other() {
    let world = World::new(&["ruth", "naomi"]);
    let post = world.post("naomi", "first");
    let viewer = world.sign_in("ruth");

    world.gate.hold("vote");
    let vote = spawn_vote(&world, &viewer, &post.id, VoteDirection::Down);
    world.gate.entered().await;

    let comment = world
        .core
        .mutations
        .create_comment(&viewer, &post.id, Content::text("still here"))
        .await
        .unwrap();
    assert_eq!(comment.value.parent.as_ref(), Some(&post.id));

    world.gate.release();
    assert_eq!(vote.await.unwrap().unwrap().value.score(), -1);
}

#[tokio::test]
async fn optimistic_vote_is_visible_until_the_backend_answers() {
    let world = World::new(&["ruth", "naomi"]);
    let post = world.post("naomi", "first");
    let viewer = world.sign_in("ruth");
    let _feed = world.core.cache.open(ViewKey::Feed);
    world.core.model.fetch_feed().await.unwrap();
    let cached = world.core.cache.find_entity(&post.id).unwrap();

    world.gate.hold("vote");
    let vote = spawn_vote(&world, &viewer, &post.id, VoteDirection::Up);
    world.gate.entered().await;

    assert_eq!(world.core.mutations.vote_state(&cached, &viewer), VoteState::Up);
    assert_eq!(world.core.mutations.effective(&cached).score(), 1);
    // The cache itself is untouched until the refetch.
    assert_eq!(cached.score(), 0);

    world.gate.release();
    vote.await.unwrap().unwrap();
    assert_eq!(world.core.mutations.effective(&cached), cached);
    assert_eq!(world.core.cache.is_stale(&ViewKey::Feed), Some(true));

    let feed = world.core.model.fetch_feed().await.unwrap();
    assert_eq!(feed[0].score(), 1);
    assert_eq!(feed[0].vote_state(&viewer), VoteState::Up);
}

#[tokio::test]
async fn failed_vote_leaves_nothing_behind() {
    let world = World::new(&["ruth", "naomi"]);
    let post = world.post("naomi", "first");
    let viewer = world.sign_in("ruth");
    let _feed = world.core.cache.open(ViewKey::Feed);
    world.core.model.fetch_feed().await.unwrap();
    let cached = world.core.cache.find_entity(&post.id).unwrap();
    let mut notices = world.core.mutations.subscribe();

    world.gate.hold("vote");
    let vote = spawn_vote(&world, &viewer, &post.id, VoteDirection::Up);
    world.gate.entered().await;
    assert_eq!(world.core.mutations.effective(&cached).score(), 1);

    // Session expires while the request is outstanding.
    world.store.sign_out();
    world.gate.release();

    let err = vote.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(world.core.mutations.effective(&cached).score(), 0);
    assert_eq!(world.core.mutations.vote_state(&cached, &viewer), VoteState::Neutral);
    assert_eq!(world.core.cache.is_stale(&ViewKey::Feed), Some(false));
    assert_eq!(world.core.cache.find_entity(&post.id), Some(cached));

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.kind, Some(ErrorKind::Unauthorized));
}

#[tokio::test]
async fn cancelled_vote_releases_its_key() {
    let world = World::new(&["ruth", "naomi"]);
    let post = world.post("naomi", "first");
    let viewer = world.sign_in("ruth");
    let _feed = world.core.cache.open(ViewKey::Feed);
    world.core.model.fetch_feed().await.unwrap();
    let cached = world.core.cache.find_entity(&post.id).unwrap();

    world.gate.hold("vote");
    let vote = spawn_vote(&world, &viewer, &post.id, VoteDirection::Up);
    world.gate.entered().await;
    vote.abort();
    assert!(vote.await.unwrap_err().is_cancelled());

    let key = MutationKey::entity(&post.id, MutationKind::Vote);
    assert!(!world.core.mutations.is_in_flight(&key));
    assert_eq!(world.core.mutations.effective(&cached).score(), 0);
    // The vote may have landed remotely.
    assert_eq!(world.core.cache.is_stale(&ViewKey::Feed), Some(true));

    let retry = spawn_vote(&world, &viewer, &post.id, VoteDirection::Up);
    world.gate.release();
    assert_eq!(retry.await.unwrap().unwrap().value.score(), 1);
    assert_eq!(world.store.calls("vote"), 1);
}

#[tokio::test]
async fn second_vote_is_previewed_from_fresh_data_only() {
    let world = World::new(&["ruth", "naomi"]);
    let post = world.post("naomi", "first");
    let viewer = world.sign_in("ruth");
    let _feed = world.core.cache.open(ViewKey::Feed);
    world.core.model.fetch_feed().await.unwrap();
    let before_vote = world.core.cache.find_entity(&post.id).unwrap();

    world
        .core
        .mutations
        .vote(&viewer, &post.id, VoteDirection::Up)
        .await
        .unwrap();
    assert_eq!(world.core.cache.is_stale(&ViewKey::Feed), Some(true));

    // The feed still holds the copy without the upvote, so no preview.
    world.gate.hold("vote");
    let toggle = spawn_vote(&world, &viewer, &post.id, VoteDirection::Up);
    world.gate.entered().await;
    assert_eq!(world.core.mutations.effective(&before_vote), before_vote);
    world.gate.release();
    let applied = toggle.await.unwrap().unwrap();
    assert_eq!(applied.value.vote_state(&viewer), VoteState::Neutral);

    // Once refetched, the preview agrees with what the backend answers.
    let fresh = world.core.model.fetch_feed().await.unwrap().remove(0);
    assert_eq!(fresh.vote_state(&viewer), VoteState::Neutral);
    let again = spawn_vote(&world, &viewer, &post.id, VoteDirection::Up);
    world.gate.entered().await;
    assert_eq!(world.core.mutations.vote_state(&fresh, &viewer), VoteState::Up);
    world.gate.release();
    let applied = again.await.unwrap().unwrap();
    assert_eq!(applied.value.vote_state(&viewer), VoteState::Up);
}

#[tokio::test]
async fn abandoned_mutations_mark_their_views_stale() {
    let world = World::new(&["ruth", "naomi"]);
    let post = world.post("naomi", "first");
    let viewer = world.sign_in("ruth");
    let _feed = world.core.cache.open(ViewKey::Feed);
    let _comments = world.core.cache.open(ViewKey::Comments(post.id.clone()));
    world.core.model.fetch_feed().await.unwrap();
    world.core.model.fetch_children(&post.id).await.unwrap();

    world.gate.hold("create_comment");
    let comment = tokio::spawn({
        let core = Arc::clone(&world.core);
        let (viewer, parent) = (viewer.clone(), post.id.clone());
        async move {
            core.mutations
                .create_comment(&viewer, &parent, Content::text("lost?"))
                .await
        }
    });
    world.gate.entered().await;
    assert_eq!(world.core.cache.is_stale(&ViewKey::Comments(post.id.clone())), Some(false));

    comment.abort();
    assert!(comment.await.unwrap_err().is_cancelled());
    assert_eq!(world.core.cache.is_stale(&ViewKey::Comments(post.id.clone())), Some(true));
    assert_eq!(world.core.cache.is_stale(&ViewKey::Feed), Some(false));
}

#[tokio::test]
async fn anonymous_mutations_never_reach_the_backend() {
    let world = World::new(&["naomi"]);
    let post = world.post("naomi", "first");
    let anonymous = Viewer::Anonymous;

    let vote = world
        .core
        .mutations
        .vote(&anonymous, &post.id, VoteDirection::Up)
        .await;
    let created = world
        .core
        .mutations
        .create_post(&anonymous, Content::text("hello"))
        .await;

    assert_eq!(assert_err!(vote).kind(), ErrorKind::Unauthorized);
    assert_eq!(assert_err!(created).kind(), ErrorKind::Unauthorized);
    assert_eq!(world.store.calls("vote"), 0);
    assert_eq!(world.store.calls("create_post"), 0);
}

#[tokio::test]
async fn new_post_shows_up_at_the_top_of_the_feed() {
    let world = World::new(&["ruth", "naomi"]);
    world.post("naomi", "older");
    let viewer = world.sign_in("ruth");
    let _feed = world.core.cache.open(ViewKey::Feed);
    let _profile = world.core.cache.open(ViewKey::Profile("ruth".into()));
    world.core.model.fetch_feed().await.unwrap();
    world.core.model.fetch_profile_posts("ruth").await.unwrap();

    let applied = world
        .core
        .mutations
        .create_post(&viewer, Content::text("fresh"))
        .await
        .unwrap();

    assert!(applied.invalidated.contains(&ViewKey::Feed));
    assert!(applied.invalidated.contains(&ViewKey::Profile("ruth".into())));
    let feed = world.core.model.fetch_feed().await.unwrap();
    assert_eq!(feed[0].id, applied.value.id);
    let profile = world.core.model.fetch_profile_posts("ruth").await.unwrap();
    assert_eq!(profile.len(), 1);
}
