//! Grouping of a flat annotation list into highlight-rooted threads.
//!
//! The list is indexed once (`id -> position`, `parent -> children`) and every
//! question about the tree is answered from that index. Comments whose parent
//! chain does not reach a highlight in the list are orphans: they belong to no
//! thread and are never an error.

use std::collections::{HashMap, HashSet};

use crate::models::{AnnotationId, AnnotationThread, AnnotationWithUser};

/// A comment placed in its thread's reply tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentNode<'a> {
    pub comment: &'a AnnotationWithUser,
    /// 0 for direct replies to the highlight.
    pub depth: usize,
}

/// Lookup structure over one snapshot of a document's annotations.
#[derive(Debug)]
pub struct ThreadIndex<'a> {
    annotations: &'a [AnnotationWithUser],
    by_id: HashMap<AnnotationId, usize>,
    children: HashMap<AnnotationId, Vec<usize>>,
    roots: HashMap<AnnotationId, AnnotationId>,
}

impl<'a> ThreadIndex<'a> {
    pub fn new(annotations: &'a [AnnotationWithUser]) -> Self {
        let mut by_id = HashMap::with_capacity(annotations.len());
        let mut children: HashMap<AnnotationId, Vec<usize>> = HashMap::new();

        for (position, annotation) in annotations.iter().enumerate() {
            by_id.entry(annotation.id).or_insert(position);
            if annotation.is_comment()
                && let Some(parent) = annotation.parent_id
            {
                children.entry(parent).or_default().push(position);
            }
        }

        let mut index = Self {
            annotations,
            by_id,
            children,
            roots: HashMap::new(),
        };

        let mut orphans = 0;
        for annotation in annotations.iter().filter(|a| a.is_comment()) {
            match index.walk_to_root(annotation) {
                Some(root) => {
                    index.roots.insert(annotation.id, root);
                }
                None => orphans += 1,
            }
        }
        if orphans > 0 {
            tracing::debug!(orphans, "comments without a reachable highlight");
        }

        index
    }

    /// Looks up an annotation by id.
    pub fn get(&self, id: AnnotationId) -> Option<&'a AnnotationWithUser> {
        self.by_id.get(&id).map(|&i| &self.annotations[i])
    }

    /// The highlight a comment's parent chain terminates at.
    ///
    /// Highlights resolve to themselves. Orphaned or cyclic chains resolve to
    /// nothing.
    pub fn root_of(&self, id: AnnotationId) -> Option<AnnotationId> {
        let annotation = self.get(id)?;
        if annotation.is_highlight() {
            Some(id)
        } else {
            self.roots.get(&id).copied()
        }
    }

    fn walk_to_root(&self, comment: &AnnotationWithUser) -> Option<AnnotationId> {
        let mut seen = HashSet::new();
        let mut current = comment;
        seen.insert(current.id);

        while let Some(parent_id) = current.parent_id {
            let parent = self.get(parent_id)?;
            if parent.is_highlight() {
                return Some(parent.id);
            }
            if !seen.insert(parent.id) {
                tracing::warn!(comment = %comment.id, "cycle in comment parent chain");
                return None;
            }
            current = parent;
        }

        None
    }

    /// Direct replies to `id`, in list order.
    pub fn children(&self, id: AnnotationId) -> impl Iterator<Item = &'a AnnotationWithUser> + '_ {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&i| &self.annotations[i])
    }

    /// Whether any comment's parent chain resolves to this highlight.
    pub fn has_replies(&self, highlight_id: AnnotationId) -> bool {
        self.children(highlight_id).next().is_some()
    }

    /// Every highlight with the comments that resolve to it, newest
    /// highlight first. Comments keep list order.
    pub fn threads(&self) -> Vec<AnnotationThread> {
        let mut grouped: HashMap<AnnotationId, Vec<AnnotationWithUser>> = HashMap::new();
        for comment in self.annotations.iter().filter(|a| a.is_comment()) {
            if let Some(root) = self.roots.get(&comment.id) {
                grouped.entry(*root).or_default().push(comment.clone());
            }
        }

        let mut threads: Vec<AnnotationThread> = self
            .annotations
            .iter()
            .filter(|a| a.is_highlight())
            .map(|highlight| AnnotationThread {
                highlight: highlight.clone(),
                comments: grouped.remove(&highlight.id).unwrap_or_default(),
            })
            .collect();

        threads.sort_by(|a, b| b.highlight.created_at.cmp(&a.highlight.created_at));
        threads
    }

    /// Comments that belong to no thread.
    pub fn orphans(&self) -> Vec<&'a AnnotationWithUser> {
        self.annotations
            .iter()
            .filter(|a| a.is_comment() && !self.roots.contains_key(&a.id))
            .collect()
    }

    /// Pre-order walk of the reply tree under a highlight, with depths for
    /// indentation.
    pub fn comment_tree(&self, highlight_id: AnnotationId) -> Vec<CommentNode<'a>> {
        let mut nodes = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<CommentNode<'a>> = self
            .children(highlight_id)
            .map(|comment| CommentNode { comment, depth: 0 })
            .collect();
        stack.reverse();

        while let Some(node) = stack.pop() {
            if !visited.insert(node.comment.id) {
                continue;
            }
            nodes.push(node);
            let mut replies: Vec<CommentNode<'a>> = self
                .children(node.comment.id)
                .map(|comment| CommentNode {
                    comment,
                    depth: node.depth + 1,
                })
                .collect();
            replies.reverse();
            stack.extend(replies);
        }

        nodes
    }
}

/// Groups a flat annotation list into threads for sidebar display.
pub fn build_threads(annotations: &[AnnotationWithUser]) -> Vec<AnnotationThread> {
    ThreadIndex::new(annotations).threads()
}
