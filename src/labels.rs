//! Compact display identifiers for graph nodes.
//!
//! Raw node ids are large and unreadable. For presentation the session
//! assigns sequential ids starting at 1, with the route origin always
//! labeled 1. The assignment is a bijection and is only used for display;
//! engines and caches keep working in raw ids.

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
pub struct NodeLabels {
    forward: FxHashMap<i64, usize>,
    inverse: FxHashMap<usize, i64>,
}

impl NodeLabels {
    /// Assign display ids over `nodes` with `anchor` mapped to 1 and the
    /// remaining nodes numbered 2.. in iteration order.
    ///
    /// `anchor` must be one of the nodes; duplicates in the input are the
    /// caller's bug and would break the bijection.
    pub fn assign(nodes: impl IntoIterator<Item = i64>, anchor: i64) -> Self {
        let mut labels = Self::default();
        labels.insert(anchor, 1);
        let mut next = 2;
        for node in nodes {
            if node == anchor {
                continue;
            }
            labels.insert(node, next);
            next += 1;
        }
        labels
    }

    fn insert(&mut self, node: i64, id: usize) {
        self.forward.insert(node, id);
        self.inverse.insert(id, node);
    }

    pub fn display_id(&self, node: i64) -> Option<usize> {
        self.forward.get(&node).copied()
    }

    pub fn node_for(&self, id: usize) -> Option<i64> {
        self.inverse.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// "Node {id}" text for a raw node, with a placeholder for strangers.
    pub fn name(&self, node: i64) -> String {
        match self.display_id(node) {
            Some(id) => format!("Node {id}"),
            None => "Node ?".to_string(),
        }
    }
}
