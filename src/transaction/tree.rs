//! Granularity tree: the rooted hierarchy of lockable resources.
//!
//! Nodes live in arena storage owned by the tree; [`NodeId`] is a stable,
//! `Copy`, non-owning handle. The tree's shape is built once by the caller
//! (via [`GranularityTree::add_child`]) and is never mutated by the lock
//! protocol — only the per-node lock multisets mutate, and only through
//! [`super::lock_manager::LockManager`].

use std::collections::HashMap;

use crate::common::TransactionId;

use super::types::LockMode;

/// Stable, `Copy` handle into a [`GranularityTree`]'s arena.
///
/// Valid only for the tree it was produced by; indices are never reused
/// within a tree's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Per-node bookkeeping: identity, tree position, and held locks.
#[derive(Debug)]
pub struct NodeData {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    is_root: bool,
    /// Transactions currently holding each mode at this node.
    locks: HashMap<LockMode, Vec<TransactionId>>,
    /// Reference count of how many still-held descendant grants require a
    /// given intention mode on behalf of a given transaction. Without this,
    /// releasing one descendant lock would incorrectly drop an intention
    /// lock still owed by a sibling descendant.
    intention_refs: HashMap<(TransactionId, LockMode), usize>,
}

impl NodeData {
    fn new(name: impl Into<String>, parent: Option<NodeId>, is_root: bool) -> Self {
        let mut locks = HashMap::with_capacity(LockMode::ALL.len());
        for mode in LockMode::ALL {
            locks.insert(mode, Vec::new());
        }
        Self {
            name: name.into(),
            parent,
            children: Vec::new(),
            is_root,
            locks,
            intention_refs: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Transactions currently holding `mode` at this node.
    pub fn holders(&self, mode: LockMode) -> &[TransactionId] {
        self.locks.get(&mode).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub(super) fn add_holder(&mut self, mode: LockMode, txn: TransactionId) {
        let holders = self.locks.entry(mode).or_default();
        if !holders.contains(&txn) {
            holders.push(txn);
        }
    }

    pub(super) fn remove_holder(&mut self, mode: LockMode, txn: TransactionId) {
        if let Some(holders) = self.locks.get_mut(&mode) {
            holders.retain(|&t| t != txn);
        }
    }

    pub(super) fn bump_intention_ref(&mut self, txn: TransactionId, mode: LockMode) -> usize {
        let count = self.intention_refs.entry((txn, mode)).or_insert(0);
        *count += 1;
        *count
    }

    /// Decrements the reference count; returns the count after decrementing.
    /// A return of `0` means the intention lock should now be released.
    pub(super) fn drop_intention_ref(&mut self, txn: TransactionId, mode: LockMode) -> usize {
        match self.intention_refs.get_mut(&(txn, mode)) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                self.intention_refs.remove(&(txn, mode));
                0
            }
            None => 0,
        }
    }
}

/// Arena-owned rooted tree of lockable resources.
#[derive(Debug)]
pub struct GranularityTree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl GranularityTree {
    /// Creates a new tree with a single root node named `name`.
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = NodeData::new(root_name, None, true);
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Attaches a new child named `name` under `parent`, returning its id.
    ///
    /// Panics if `parent` is not a valid id in this tree; the tree's shape
    /// is built once by a trusted caller before any transaction runs.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData::new(name, Some(parent), false));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    pub(super) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    /// Strict ancestors of `id`, nearest first, ending at (and including)
    /// the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.nodes[id.0].parent;
        while let Some(p) = current {
            out.push(p);
            current = self.nodes[p.0].parent;
        }
        out
    }

    /// All strict descendants of `id`. Order is deterministic but
    /// otherwise unspecified; callers must not depend on traversal order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut frontier = self.nodes[id.0].children.clone();
        while let Some(next) = frontier.pop() {
            out.push(next);
            frontier.extend(self.nodes[next.0].children.iter().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (GranularityTree, NodeId, NodeId, NodeId, NodeId, NodeId) {
        let mut tree = GranularityTree::new("Database");
        let root = tree.root();
        let area = tree.add_child(root, "Area1");
        let table = tree.add_child(area, "Table1");
        let page1 = tree.add_child(table, "Page1");
        let tuple1 = tree.add_child(page1, "Tuple1");
        (tree, root, area, table, page1, tuple1)
    }

    #[test]
    fn ancestors_walk_to_root() {
        let (tree, root, area, table, page1, tuple1) = sample_tree();
        assert_eq!(tree.ancestors(tuple1), vec![page1, table, area, root]);
    }

    #[test]
    fn descendants_cover_whole_subtree() {
        let (tree, _root, _area, table, page1, tuple1) = sample_tree();
        let mut desc = tree.descendants(table);
        desc.sort_by_key(|n| n.0);
        let mut expected = vec![page1, tuple1];
        expected.sort_by_key(|n| n.0);
        assert_eq!(desc, expected);
    }

    #[test]
    fn intention_ref_counting_tracks_multiple_descendants() {
        let mut tree = GranularityTree::new("Database");
        let root = tree.root();
        let node = tree.node_mut(root);
        assert_eq!(node.bump_intention_ref(1, LockMode::IWL), 1);
        assert_eq!(node.bump_intention_ref(1, LockMode::IWL), 2);
        assert_eq!(node.drop_intention_ref(1, LockMode::IWL), 1);
        assert_eq!(node.drop_intention_ref(1, LockMode::IWL), 0);
    }
}
