//! # Comment Tree Builder
//!
//! Builds the comment tree under a post on demand. Nodes live in an arena
//! keyed by id; a node only knows its children's ids, and only after it has
//! been expanded.

use std::collections::{HashMap, VecDeque};

use domains::{AppError, Entity, EntityId, Result};
use tracing::{debug, instrument};

use crate::model::EntityModel;

#[derive(Debug, Clone)]
struct TreeNode {
    entity: Entity,
    /// `None` until expanded
    children: Option<Vec<EntityId>>,
}

/// Comments under one parent, lazily expandable.
#[derive(Debug, Clone)]
pub struct CommentTree {
    root: EntityId,
    top: Vec<EntityId>,
    nodes: HashMap<EntityId, TreeNode>,
}

/// Orders siblings: highest score first, then earliest created, then the
/// order the backend listed them in.
pub fn order_by_score(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort_by(|a, b| {
        b.score()
            .cmp(&a.score())
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    entities
}

impl CommentTree {
    fn empty(root: EntityId) -> Self {
        Self {
            root,
            top: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    /// Id whose comments form the first level.
    pub fn root(&self) -> &EntityId {
        &self.root
    }

    pub fn top_level(&self) -> Vec<&Entity> {
        self.entities(&self.top)
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.nodes.get(id).map(|n| &n.entity)
    }

    pub fn is_expanded(&self, id: &EntityId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.children.is_some())
    }

    /// Direct comments of `id`, or `None` if it has not been expanded.
    pub fn children_of(&self, id: &EntityId) -> Option<Vec<&Entity>> {
        if id == &self.root {
            return Some(self.top_level());
        }
        let children = self.nodes.get(id)?.children.as_ref()?;
        Some(self.entities(children))
    }

    /// Number of direct comments known for `id`.
    pub fn comment_count(&self, id: &EntityId) -> Option<usize> {
        if id == &self.root {
            return Some(self.top.len());
        }
        self.nodes.get(id)?.children.as_ref().map(Vec::len)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first display order with each node's depth (0 for the first level).
    pub fn walk(&self) -> Vec<(usize, &Entity)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, &EntityId)> = self.top.iter().rev().map(|id| (0, id)).collect();
        while let Some((depth, id)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            out.push((depth, &node.entity));
            if let Some(children) = &node.children {
                stack.extend(children.iter().rev().map(|c| (depth + 1, c)));
            }
        }
        out
    }

    /// Ids of expanded nodes, parents before their descendants.
    fn expanded_ids(&self) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut queue: VecDeque<&EntityId> = self.top.iter().collect();
        while let Some(id) = queue.pop_front() {
            if let Some(children) = self.nodes.get(id).and_then(|n| n.children.as_ref()) {
                out.push(id.clone());
                queue.extend(children.iter());
            }
        }
        out
    }

    fn entities(&self, ids: &[EntityId]) -> Vec<&Entity> {
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    fn insert_children(&mut self, parent: &EntityId, children: Vec<Entity>) -> Vec<EntityId> {
        let ids: Vec<EntityId> = children.iter().map(|c| c.id.clone()).collect();
        let previous = if parent == &self.root {
            std::mem::replace(&mut self.top, ids.clone())
        } else {
            match self.nodes.get_mut(parent) {
                Some(node) => node.children.replace(ids.clone()).unwrap_or_default(),
                None => Vec::new(),
            }
        };
        for gone in previous.iter().filter(|id| !ids.contains(id)) {
            self.remove_subtree(gone);
        }
        for child in children {
            let expanded = self.nodes.remove(&child.id).and_then(|n| n.children);
            self.nodes.insert(
                child.id.clone(),
                TreeNode {
                    entity: child,
                    children: expanded,
                },
            );
        }
        ids
    }

    fn remove_subtree(&mut self, id: &EntityId) {
        let mut pending = vec![id.clone()];
        while let Some(id) = pending.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                pending.extend(node.children.unwrap_or_default());
            }
        }
    }
}

/// Reads comments through the entity model and shapes them into trees.
#[derive(Clone)]
pub struct TreeBuilder {
    model: EntityModel,
}

impl TreeBuilder {
    pub fn new(model: EntityModel) -> Self {
        Self { model }
    }

    /// First level of comments under `parent`, ordered by score.
    #[instrument(skip_all, fields(parent = %parent))]
    pub async fn build_tree(&self, parent: &EntityId) -> Result<CommentTree> {
        let mut tree = CommentTree::empty(parent.clone());
        let children = order_by_score(self.model.fetch_children(parent).await?);
        tree.insert_children(parent, children);
        debug!(comments = tree.len(), "tree built");
        Ok(tree)
    }

    /// Fetches the direct comments of one node. Only that node is touched.
    pub async fn expand(&self, tree: &mut CommentTree, id: &EntityId) -> Result<()> {
        if id != &tree.root && !tree.nodes.contains_key(id) {
            return Err(AppError::not_found("comment", id));
        }
        let children = order_by_score(self.model.fetch_children(id).await?);
        tree.insert_children(id, children);
        Ok(())
    }

    pub fn collapse(&self, tree: &mut CommentTree, id: &EntityId) {
        let Some(children) = tree.nodes.get_mut(id).and_then(|n| n.children.take()) else {
            return;
        };
        for child in children {
            tree.remove_subtree(&child);
        }
    }

    /// Rebuilds the tree from scratch, re-expanding every node that was
    /// expanded before and still exists.
    pub async fn refresh(&self, tree: &mut CommentTree) -> Result<()> {
        let expanded = tree.expanded_ids();
        let mut fresh = self.build_tree(&tree.root).await?;
        for id in expanded {
            if fresh.nodes.contains_key(&id) {
                self.expand(&mut fresh, &id).await?;
            }
        }
        *tree = fresh;
        Ok(())
    }
}
