//! Loop-nesting forest.
//!
//! Computes the forest described by G. Ramalingam, "On Loops, Dominators,
//! and Dominance Frontiers", via recursive strongly-connected-component
//! partitioning: every non-trivial SCC becomes a `LoopHeader`, its
//! region is decomposed again with the edges into the header continuations
//! removed, and trivial SCCs become `LoopLeaf` nodes. The forest is
//! pooled into a tree under a synthetic root header of depth -1.
//!
//! Leaves are numbered in creation order; a header's `[dfs_begin,
//! dfs_end)` interval spans exactly the leaves of its region, which makes
//! the containment test two comparisons.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

use rill_ir::DefId;

use crate::scope::Scope;

/// Index of a node in the forest's pool.
pub type LoopNodeId = usize;

/// A control-flow edge recorded on a header's region boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopEdge {
    pub src: DefId,
    pub dst: DefId,
}

/// An interior node: a loop region.
#[derive(Debug)]
pub struct LoopHeader {
    pub parent: Option<LoopNodeId>,
    /// -1 for the synthetic root, 0 for top-level loops, and so on.
    pub depth: i32,
    /// The header continuations of this loop (empty for the root).
    pub lambdas: Vec<DefId>,
    pub children: Vec<LoopNodeId>,
    /// Leaf-index interval covered by this region.
    pub dfs_begin: usize,
    pub dfs_end: usize,
    /// Edges from outside the region into it.
    pub entries: Vec<LoopEdge>,
    /// Edges leaving the region.
    pub exits: Vec<LoopEdge>,
    /// Edges from inside the region to one of its headers.
    pub backedges: Vec<LoopEdge>,
}

/// A leaf: a single continuation.
#[derive(Debug)]
pub struct LoopLeaf {
    pub parent: LoopNodeId,
    pub depth: i32,
    pub lambda: DefId,
    pub dfs_index: usize,
}

/// A node of the forest.
#[derive(Debug)]
pub enum LoopTreeNode {
    Header(LoopHeader),
    Leaf(LoopLeaf),
}

/// The loop-nesting forest of a Scope.
pub struct LoopTree {
    nodes: Vec<LoopTreeNode>,
    root: LoopNodeId,
    leaf_of: FxHashMap<DefId, LoopNodeId>,
    dfs_leaves: Vec<LoopNodeId>,
}

impl LoopTree {
    /// Compute the forest of the scope's forward graph.
    pub fn new(scope: &Scope) -> Self {
        let mut tree = LoopTree {
            nodes: Vec::new(),
            root: 0,
            leaf_of: FxHashMap::default(),
            dfs_leaves: Vec::new(),
        };
        tree.root = tree.push_header(None, -1, Vec::new());

        let all: Vec<DefId> = scope.rpo().to_vec();
        let no_headers = FxHashSet::default();
        tree.build_region(scope, tree.root, &all, &no_headers, 0);

        let total = tree.dfs_leaves.len();
        if let LoopTreeNode::Header(root) = &mut tree.nodes[tree.root] {
            root.dfs_begin = 0;
            root.dfs_end = total;
        }
        tree
    }

    fn push_header(
        &mut self,
        parent: Option<LoopNodeId>,
        depth: i32,
        lambdas: Vec<DefId>,
    ) -> LoopNodeId {
        let id = self.nodes.len();
        self.nodes.push(LoopTreeNode::Header(LoopHeader {
            parent,
            depth,
            lambdas,
            children: Vec::new(),
            dfs_begin: self.dfs_leaves.len(),
            dfs_end: self.dfs_leaves.len(),
            entries: Vec::new(),
            exits: Vec::new(),
            backedges: Vec::new(),
        }));
        if let Some(p) = parent {
            self.header_mut(p).children.push(id);
        }
        id
    }

    fn push_leaf(&mut self, parent: LoopNodeId, depth: i32, lambda: DefId) {
        let id = self.nodes.len();
        let dfs_index = self.dfs_leaves.len();
        self.nodes.push(LoopTreeNode::Leaf(LoopLeaf {
            parent,
            depth,
            lambda,
            dfs_index,
        }));
        self.dfs_leaves.push(id);
        self.leaf_of.insert(lambda, id);
        self.header_mut(parent).children.push(id);
    }

    fn header_mut(&mut self, id: LoopNodeId) -> &mut LoopHeader {
        match &mut self.nodes[id] {
            LoopTreeNode::Header(h) => h,
            LoopTreeNode::Leaf(_) => panic!("expected a loop header"),
        }
    }

    /// Decompose `region` into SCCs, ignoring edges into
    /// `ignored_headers`. Non-trivial SCCs become headers and recurse;
    /// trivial ones become leaves.
    fn build_region(
        &mut self,
        scope: &Scope,
        parent: LoopNodeId,
        region: &[DefId],
        ignored_headers: &FxHashSet<DefId>,
        depth: i32,
    ) {
        let member: FxHashSet<DefId> = region.iter().copied().collect();

        let mut graph: DiGraph<DefId, ()> = DiGraph::new();
        let mut index: FxHashMap<DefId, NodeIndex> = FxHashMap::default();
        for &l in region {
            index.insert(l, graph.add_node(l));
        }
        for &l in region {
            for &s in scope.succs(l) {
                if member.contains(&s) && !ignored_headers.contains(&s) {
                    graph.add_edge(index[&l], index[&s], ());
                }
            }
        }

        // tarjan_scc yields reverse topological order over the condensed
        // graph; process in topological order.
        let sccs = tarjan_scc(&graph);
        for scc in sccs.iter().rev() {
            let mut lambdas: Vec<DefId> = scc.iter().map(|&ix| graph[ix]).collect();
            lambdas.sort_by_key(|l| scope.sid(*l));

            let trivial = lambdas.len() == 1 && {
                let only = index[&lambdas[0]];
                !graph.contains_edge(only, only)
            };
            if trivial {
                self.push_leaf(parent, depth, lambdas[0]);
                continue;
            }

            let scc_set: FxHashSet<DefId> = lambdas.iter().copied().collect();
            let headers: Vec<DefId> = lambdas
                .iter()
                .copied()
                .filter(|&l| {
                    scope.is_entry(l) || scope.preds(l).iter().any(|p| !scc_set.contains(p))
                })
                .collect();
            // A region reachable only through the removed back edges
            // still needs a deterministic header.
            let headers = if headers.is_empty() {
                vec![lambdas[0]]
            } else {
                headers
            };

            let node = self.push_header(Some(parent), depth, headers.clone());

            let header_set: FxHashSet<DefId> = headers.into_iter().collect();
            for &l in &lambdas {
                for &p in scope.preds(l) {
                    if !scc_set.contains(&p) {
                        self.header_mut(node).entries.push(LoopEdge { src: p, dst: l });
                    }
                }
                for &s in scope.succs(l) {
                    if !scc_set.contains(&s) {
                        self.header_mut(node).exits.push(LoopEdge { src: l, dst: s });
                    } else if header_set.contains(&s) {
                        self.header_mut(node).backedges.push(LoopEdge { src: l, dst: s });
                    }
                }
            }

            self.build_region(scope, node, &lambdas, &header_set, depth + 1);
            let end = self.dfs_leaves.len();
            self.header_mut(node).dfs_end = end;
        }
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// The synthetic root header.
    pub fn root(&self) -> &LoopHeader {
        match &self.nodes[self.root] {
            LoopTreeNode::Header(h) => h,
            LoopTreeNode::Leaf(_) => unreachable!(),
        }
    }

    /// A node of the pool.
    pub fn node(&self, id: LoopNodeId) -> &LoopTreeNode {
        &self.nodes[id]
    }

    /// The leaf of a member continuation.
    pub fn leaf(&self, lam: DefId) -> Option<&LoopLeaf> {
        self.leaf_of.get(&lam).map(|&id| match &self.nodes[id] {
            LoopTreeNode::Leaf(leaf) => leaf,
            LoopTreeNode::Header(_) => unreachable!(),
        })
    }

    /// Loop depth of a continuation: 0 outside any loop, 1 inside one
    /// loop, and so on.
    pub fn depth(&self, lam: DefId) -> i32 {
        self.leaf(lam).map(|l| l.depth).unwrap_or(0)
    }

    /// DFS index of a continuation's leaf.
    pub fn dfs_index(&self, lam: DefId) -> Option<usize> {
        self.leaf(lam).map(|l| l.dfs_index)
    }

    /// Whether the header's region contains the continuation.
    pub fn contains(&self, header: &LoopHeader, lam: DefId) -> bool {
        match self.dfs_index(lam) {
            Some(dfs) => header.dfs_begin <= dfs && dfs < header.dfs_end,
            None => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
