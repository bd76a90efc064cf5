use std::collections::HashMap;

use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::entities::Bucket;

/// Tree node in the arena-based bucket hierarchy.
#[derive(Debug, Clone)]
pub struct BucketNode {
    /// Bucket data for this node
    pub data: Bucket,
    /// Index of parent node in the arena, None for root nodes
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, in declaration order
    pub children: Vec<Index>,
    /// Depth from the node's root (root = 0)
    pub level: usize,
}

impl BucketNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena-based forest of buckets.
///
/// Nodes own nothing: the arena owns every node, parents refer to children by
/// index and children point back to their parent by index. Each root starts
/// an independent tree.
#[derive(Debug, Clone, Default)]
pub struct BucketArena {
    /// Arena storage for all tree nodes
    arena: Arena<BucketNode>,
    /// Root nodes in insertion order
    roots: Vec<Index>,
    /// Label lookup
    labels: HashMap<String, Index>,
}

impl BucketArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node below `parent` (or as a new root) and return its index.
    ///
    /// The level is derived from the parent. Labels are assumed unique; the
    /// builder checks that before inserting.
    #[instrument(level = "trace", skip(self, data), fields(label = %data.label))]
    pub fn insert_node(&mut self, data: Bucket, parent: Option<Index>) -> Index {
        let level = parent
            .and_then(|p| self.arena.get(p))
            .map(|p| p.level + 1)
            .unwrap_or(0);
        let label = data.label.clone();
        let node = BucketNode {
            data,
            parent,
            children: Vec::new(),
            level,
        };
        let node_idx = self.arena.insert(node);

        if let Some(parent_idx) = parent {
            if let Some(parent) = self.arena.get_mut(parent_idx) {
                parent.children.push(node_idx);
            }
        } else {
            self.roots.push(node_idx);
        }
        self.labels.insert(label, node_idx);

        node_idx
    }

    pub fn get_node(&self, idx: Index) -> Option<&BucketNode> {
        self.arena.get(idx)
    }

    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut BucketNode> {
        self.arena.get_mut(idx)
    }

    pub fn roots(&self) -> &[Index] {
        &self.roots
    }

    pub fn find(&self, label: &str) -> Option<Index> {
        self.labels.get(label).copied()
    }

    pub fn get_by_label(&self, label: &str) -> Option<&BucketNode> {
        self.find(label).and_then(|idx| self.get_node(idx))
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.get_node(idx)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, idx: Index) -> Option<Index> {
        self.get_node(idx).and_then(|n| n.parent)
    }

    pub fn level(&self, idx: Index) -> Option<usize> {
        self.get_node(idx).map(|n| n.level)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Pre-order walk (parent before children) over every tree of the forest.
    pub fn iter(&self) -> PreOrderIterator<'_> {
        PreOrderIterator::new(self)
    }

    /// Post-order walk (children before parent) over every tree of the forest.
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Number of levels of the deepest tree; 0 for an empty arena.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.roots
            .iter()
            .map(|&root| self.calculate_depth(root))
            .max()
            .unwrap_or(0)
    }

    fn calculate_depth(&self, node_idx: Index) -> usize {
        if let Some(node) = self.get_node(node_idx) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Labels of all leaf nodes, left to right.
    pub fn leaf_labels(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, node)| node.is_leaf())
            .map(|(_, node)| node.data.label.clone())
            .collect()
    }
}

pub struct PreOrderIterator<'a> {
    arena: &'a BucketArena,
    stack: Vec<Index>,
}

impl<'a> PreOrderIterator<'a> {
    fn new(arena: &'a BucketArena) -> Self {
        // Roots reversed so the first root is popped first
        let stack = arena.roots().iter().rev().copied().collect();
        Self { arena, stack }
    }
}

impl<'a> Iterator for PreOrderIterator<'a> {
    type Item = (Index, &'a BucketNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    arena: &'a BucketArena,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a BucketArena) -> Self {
        let stack = arena.roots().iter().rev().map(|&r| (r, false)).collect();
        Self { arena, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a BucketNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}
