//! Frame Tree Builder: folded stacks → weighted call tree
//!
//! ## Structure
//!
//! Nodes live in an arena (`Vec<FrameNode>`) and are addressed by
//! [`NodeId`]; the root is always `NodeId(0)`. Each node maps child names
//! to ids in a `BTreeMap`, which gives exact, case-sensitive lookup and
//! name-sorted iteration for deterministic layout.
//!
//! ## Counting
//!
//! Inserting a path with count `n` adds `n` to the inclusive count of the
//! root and of every node along the path, and to the self count of the
//! last node only. So for every node:
//!
//! ```text
//! inclusive == self + sum(child.inclusive)
//! ```
//!
//! ## Child Cap
//!
//! A parent holds at most `max_children` distinctly named children. Names
//! arriving after the cap is reached are folded into one `[other]` child
//! (created past the cap if needed) and the rest of their path continues
//! beneath it. Counts are never lost; a warning is logged once per parent.

use log::warn;
use std::collections::BTreeMap;

use super::folded::FoldedStacks;

/// Name of the root node
pub const ROOT_NAME: &str = "root";

/// Name of the child collecting names past the per-parent cap
pub const OVERFLOW_NAME: &str = "[other]";

/// Tree-building limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Maximum distinct children per node before collapsing into `[other]`
    pub max_children: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { max_children: 512 }
    }
}

/// Index of a node in its [`FrameTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct FrameNode {
    pub name: String,
    /// Samples in this frame or any descendant
    pub inclusive: u64,
    /// Samples with this frame as the leaf
    pub self_count: u64,
    /// Distance from the root (root is 0)
    pub depth: usize,
    children: BTreeMap<String, NodeId>,
    overflowed: bool,
}

impl FrameNode {
    fn new(name: String, depth: usize) -> Self {
        Self { name, inclusive: 0, self_count: 0, depth, children: BTreeMap::new(), overflowed: false }
    }

    /// Children ids in name order
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FrameTree {
    nodes: Vec<FrameNode>,
    config: TreeConfig,
    max_depth: usize,
    overflowed_parents: usize,
}

impl FrameTree {
    #[must_use]
    pub fn new(config: TreeConfig) -> Self {
        Self {
            nodes: vec![FrameNode::new(ROOT_NAME.to_string(), 0)],
            config,
            max_depth: 0,
            overflowed_parents: 0,
        }
    }

    /// Build a tree from a complete folded profile
    #[must_use]
    pub fn from_folded(folded: &FoldedStacks, config: TreeConfig) -> Self {
        let mut tree = Self::new(config);
        for stack in folded.iter() {
            tree.insert(stack.frames(), stack.count);
        }
        tree
    }

    /// Add `count` observations of a root-first path
    ///
    /// Empty paths and zero counts are ignored.
    pub fn insert<I, S>(&mut self, path: I, count: u64)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if count == 0 {
            return;
        }

        let root = self.root();
        let mut current = root;
        for name in path {
            current = self.find_or_create_child(current, name.as_ref());
            self.nodes[current.0].inclusive += count;
        }
        if current == root {
            return;
        }

        self.nodes[root.0].inclusive += count;
        self.nodes[current.0].self_count += count;
    }

    fn find_or_create_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        if let Some(&id) = self.nodes[parent.0].children.get(name) {
            return id;
        }

        let name = if self.nodes[parent.0].children.len() >= self.config.max_children {
            let node = &mut self.nodes[parent.0];
            if !node.overflowed {
                node.overflowed = true;
                self.overflowed_parents += 1;
                warn!(
                    "Frame '{}' has more than {} distinct children; collapsing the rest into {OVERFLOW_NAME}",
                    node.name, self.config.max_children
                );
            }
            if let Some(&id) = self.nodes[parent.0].children.get(OVERFLOW_NAME) {
                return id;
            }
            OVERFLOW_NAME
        } else {
            name
        };

        let depth = self.nodes[parent.0].depth + 1;
        let id = NodeId(self.nodes.len());
        self.nodes.push(FrameNode::new(name.to_string(), depth));
        self.nodes[parent.0].children.insert(name.to_string(), id);
        self.max_depth = self.max_depth.max(depth);
        id
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &FrameNode {
        &self.nodes[id.0]
    }

    /// Node reached by following a root-first path of names
    #[must_use]
    pub fn find(&self, path: &[&str]) -> Option<&FrameNode> {
        let mut current = self.root();
        for name in path {
            current = *self.node(current).children.get(*name)?;
        }
        Some(self.node(current))
    }

    /// Root inclusive count
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.node(self.root()).inclusive
    }

    /// Depth of the deepest node (0 for a root-only tree)
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Number of nodes including the root
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_samples() == 0
    }

    /// Parents whose children were collapsed into `[other]`
    #[must_use]
    pub fn overflowed_parents(&self) -> usize {
        self.overflowed_parents
    }

    /// Check `inclusive == self + sum(children)` on every node
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.nodes.iter().all(|node| {
            let children: u64 = node.children().map(|id| self.node(id).inclusive).sum();
            node.inclusive == node.self_count + children
        })
    }
}

impl Default for FrameTree {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}
