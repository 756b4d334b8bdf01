//! # services
//!
//! Client-side consistency logic for Refuge: the view cache, typed entity
//! reads, comment trees, mutation dispatch and invalidation.

pub mod cache;
pub mod dispatcher;
pub mod invalidator;
pub mod model;
pub mod session;
pub mod tree;

use std::sync::Arc;

use domains::ContentBackend;

pub use cache::{ViewCache, ViewData, ViewHandle};
pub use dispatcher::{Applied, MutationDispatcher, MutationKey, MutationKind, Notice, NoticeLevel};
pub use model::EntityModel;
pub use tree::{CommentTree, TreeBuilder};

/// Everything a view layer needs, wired to one backend.
pub struct ContentServices {
    pub cache: ViewCache,
    pub model: EntityModel,
    pub trees: TreeBuilder,
    pub mutations: MutationDispatcher,
}

impl ContentServices {
    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        let cache = ViewCache::new(backend);
        let model = EntityModel::new(cache.clone());
        Self {
            trees: TreeBuilder::new(model.clone()),
            mutations: MutationDispatcher::new(cache.clone()),
            model,
            cache,
        }
    }
}
