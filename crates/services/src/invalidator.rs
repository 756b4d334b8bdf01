//! # View Cache Invalidator
//!
//! Decides which buckets a successful mutation made stale. It never reads or
//! patches bucket contents; the cache refetches whatever is marked.

use std::collections::BTreeSet;

use domains::{Entity, OperationKind, ViewKey, Viewer};

/// Buckets to mark stale after `operation` succeeded on `entity`.
///
/// For `CreateComment`, `entity` is the new comment. A vote on a top-level
/// post also refreshes the voting viewer's own profile, since a profile
/// page lists posts that viewer may just have voted on.
pub fn on_mutation_success(
    entity: &Entity,
    operation: OperationKind,
    viewer: &Viewer,
) -> BTreeSet<ViewKey> {
    let mut keys = BTreeSet::new();

    match (operation, &entity.parent) {
        (OperationKind::Vote(_), None) => {
            keys.insert(ViewKey::Feed);
            keys.insert(ViewKey::Post(entity.id.clone()));
            keys.insert(ViewKey::Profile(entity.author.username.clone()));
            if let Some(user) = viewer.user() {
                keys.insert(ViewKey::Profile(user.username.clone()));
            }
        }
        (OperationKind::Delete, None) => {
            keys.insert(ViewKey::Feed);
        }
        (OperationKind::Vote(_) | OperationKind::Delete | OperationKind::CreateComment, Some(parent)) => {
            keys.insert(ViewKey::Comments(parent.clone()));
        }
        (OperationKind::CreateComment, None) => {}
        (OperationKind::CreatePost, _) => {
            keys.insert(ViewKey::Feed);
            keys.insert(ViewKey::Profile(entity.author.username.clone()));
        }
    }

    keys
}
