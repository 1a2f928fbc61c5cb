//! Wait-for graph: directed graph over transaction ids, used to detect
//! deadlock cycles among blocked transactions.

use std::collections::{HashMap, HashSet};

use crate::common::TransactionId;

use super::tree::NodeId;

/// Directed graph recording `waiter -> holder` edges.
///
/// Each edge also carries the node the waiter is blocked on, so
/// [`WaitForGraph::waiters_of`] can report `(waiter, pending_node)` pairs
/// without a second synchronized side table.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    /// Adjacency list: waiter -> [(holder, pending_node)]. Used for
    /// membership checks and DFS cycle detection; iteration over this map's
    /// keys is not insertion-ordered, so [`Self::waiters_of`] does not use
    /// it to decide output order.
    edges: HashMap<TransactionId, Vec<(TransactionId, NodeId)>>,
    /// Every currently-live edge, in the order it was inserted. Scanned by
    /// [`Self::waiters_of`] so cascading wake-ups process waiters in the
    /// order they started waiting, independent of `HashMap` iteration order.
    order: Vec<(TransactionId, TransactionId, NodeId)>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `id` has an (possibly empty) adjacency entry.
    pub fn add_vertex(&mut self, id: TransactionId) {
        self.edges.entry(id).or_default();
    }

    /// Inserts a `waiter -> holder` edge. Returns `false` (no-op) if
    /// `waiter == holder` or the edge already exists; `true` otherwise.
    pub fn add_edge(&mut self, waiter: TransactionId, holder: TransactionId, pending_node: NodeId) -> bool {
        if waiter == holder {
            return false;
        }
        let out = self.edges.entry(waiter).or_default();
        if out.iter().any(|(h, _)| *h == holder) {
            return false;
        }
        out.push((holder, pending_node));
        self.edges.entry(holder).or_default();
        self.order.push((waiter, holder, pending_node));
        true
    }

    /// Removes the `waiter -> holder` edge, if present. No-op otherwise.
    pub fn remove_edge(&mut self, waiter: TransactionId, holder: TransactionId) {
        if let Some(out) = self.edges.get_mut(&waiter) {
            out.retain(|(h, _)| *h != holder);
        }
        self.order.retain(|&(w, h, _)| !(w == waiter && h == holder));
    }

    /// Removes `id` and every edge incident to it (as waiter or as holder).
    pub fn remove_vertex(&mut self, id: TransactionId) {
        self.edges.remove(&id);
        for out in self.edges.values_mut() {
            out.retain(|(h, _)| *h != id);
        }
        self.order.retain(|&(w, h, _)| w != id && h != id);
    }

    /// Transactions waiting directly on `holder`, in the order their edges
    /// were inserted, paired with the node each one is blocked on.
    pub fn waiters_of(&self, holder: TransactionId) -> Vec<(TransactionId, NodeId)> {
        self.order
            .iter()
            .filter(|&&(_, h, _)| h == holder)
            .map(|&(waiter, _, node)| (waiter, node))
            .collect()
    }

    /// True if the graph contains any directed cycle.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        for &start in self.edges.keys() {
            if !visited.contains(&start) && self.dfs_cycle(start, &mut visited, &mut on_stack) {
                return true;
            }
        }
        false
    }

    fn dfs_cycle(
        &self,
        node: TransactionId,
        visited: &mut HashSet<TransactionId>,
        on_stack: &mut HashSet<TransactionId>,
    ) -> bool {
        visited.insert(node);
        on_stack.insert(node);
        if let Some(out) = self.edges.get(&node) {
            for &(next, _) in out {
                if on_stack.contains(&next) {
                    return true;
                }
                if !visited.contains(&next) && self.dfs_cycle(next, visited, on_stack) {
                    return true;
                }
            }
        }
        on_stack.remove(&node);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::tree::GranularityTree;

    fn any_node() -> NodeId {
        GranularityTree::new("Database").root()
    }

    #[test]
    fn self_loop_rejected() {
        let mut g = WaitForGraph::new();
        assert!(!g.add_edge(1, 1, any_node()));
    }

    #[test]
    fn duplicate_edge_rejected() {
        let mut g = WaitForGraph::new();
        assert!(g.add_edge(1, 2, any_node()));
        assert!(!g.add_edge(1, 2, any_node()));
    }

    #[test]
    fn two_cycle_detected() {
        let mut g = WaitForGraph::new();
        g.add_edge(1, 2, any_node());
        g.add_edge(2, 1, any_node());
        assert!(g.has_cycle());
    }

    #[test]
    fn acyclic_chain_not_flagged() {
        let mut g = WaitForGraph::new();
        g.add_edge(1, 2, any_node());
        g.add_edge(2, 3, any_node());
        assert!(!g.has_cycle());
    }

    #[test]
    fn remove_vertex_clears_incident_edges() {
        let mut g = WaitForGraph::new();
        g.add_edge(1, 2, any_node());
        g.add_edge(3, 1, any_node());
        g.remove_vertex(1);
        assert!(g.waiters_of(2).is_empty());
        assert!(g.waiters_of(1).is_empty());
    }

    #[test]
    fn waiters_of_reports_pending_node() {
        let mut g = WaitForGraph::new();
        let node = any_node();
        g.add_edge(2, 1, node);
        let waiters = g.waiters_of(1);
        assert_eq!(waiters, vec![(2, node)]);
    }

    #[test]
    fn waiters_of_preserves_edge_insertion_order() {
        let mut g = WaitForGraph::new();
        let node = any_node();
        // Insert waiters on holder 1 out of numeric order, several times
        // over, to rule out the result being incidentally sorted by id.
        g.add_edge(5, 1, node);
        g.add_edge(2, 1, node);
        g.add_edge(9, 1, node);
        g.add_edge(3, 1, node);
        let waiters: Vec<TransactionId> = g.waiters_of(1).into_iter().map(|(w, _)| w).collect();
        assert_eq!(waiters, vec![5, 2, 9, 3]);
    }
}
