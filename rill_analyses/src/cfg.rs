//! Control-flow views over a Scope.
//!
//! A `Cfg` is a direction-parametric view: forward edges follow the
//! call-graph successors, backward edges the predecessors. A virtual
//! root node fronts the entries (the exits, backward) so that dominance
//! always has a single root, and nodes carry dense indices with a
//! reverse-post-order numbering.

use rustc_hash::FxHashMap;

use rill_ir::{DefId, Id};

use crate::scope::Scope;

/// A node of the control-flow view.
#[derive(Debug)]
pub struct CfgNode {
    /// The continuation, or None for the virtual root.
    pub lambda: Option<DefId>,
    preds: Vec<CfgNodeId>,
    succs: Vec<CfgNodeId>,
    rpo_id: usize,
}

/// Dense node index.
pub type CfgNodeId = Id<CfgNode>;

/// A control-flow view of a Scope in one direction.
pub struct Cfg {
    forward: bool,
    nodes: Vec<CfgNode>,
    /// All reachable nodes in reverse post-order; the virtual root is
    /// first.
    rpo: Vec<CfgNodeId>,
    lookup: FxHashMap<DefId, CfgNodeId>,
}

impl Cfg {
    /// Build the forward view: root -> entries, edges along succs.
    pub fn forward(scope: &Scope) -> Self {
        Self::build(scope, true)
    }

    /// Build the backward view: root -> exits, edges along preds.
    pub fn backward(scope: &Scope) -> Self {
        Self::build(scope, false)
    }

    fn build(scope: &Scope, forward: bool) -> Self {
        let mut nodes: Vec<CfgNode> = Vec::with_capacity(scope.len() + 1);
        let mut lookup: FxHashMap<DefId, CfgNodeId> = FxHashMap::default();

        nodes.push(CfgNode {
            lambda: None,
            preds: Vec::new(),
            succs: Vec::new(),
            rpo_id: usize::MAX,
        });

        for &lam in scope.rpo() {
            let id = CfgNodeId::new(nodes.len() as u32);
            lookup.insert(lam, id);
            nodes.push(CfgNode {
                lambda: Some(lam),
                preds: Vec::new(),
                succs: Vec::new(),
                rpo_id: usize::MAX,
            });
        }

        let root = CfgNodeId::new(0);
        let add_edge = |nodes: &mut Vec<CfgNode>, from: CfgNodeId, to: CfgNodeId| {
            nodes[from.as_usize()].succs.push(to);
            nodes[to.as_usize()].preds.push(from);
        };

        let roots: &[DefId] = if forward { scope.entries() } else { scope.exits() };
        for &r in roots {
            add_edge(&mut nodes, root, lookup[&r]);
        }
        for &lam in scope.rpo() {
            let from = lookup[&lam];
            let targets = if forward {
                scope.succs(lam)
            } else {
                scope.preds(lam)
            };
            for &t in targets {
                add_edge(&mut nodes, from, lookup[&t]);
            }
        }

        let mut cfg = Cfg {
            forward,
            nodes,
            rpo: Vec::new(),
            lookup,
        };
        cfg.compute_rpo(root);
        cfg
    }

    /// Iterative DFS post-order from the root, reversed and numbered.
    fn compute_rpo(&mut self, root: CfgNodeId) {
        let mut visited = vec![false; self.nodes.len()];
        let mut post: Vec<CfgNodeId> = Vec::with_capacity(self.nodes.len());

        visited[root.as_usize()] = true;
        let mut stack: Vec<(CfgNodeId, usize)> = vec![(root, 0)];
        while let Some(&mut (node, ref mut idx)) = stack.last_mut() {
            let succs = &self.nodes[node.as_usize()].succs;
            if *idx < succs.len() {
                let next = succs[*idx];
                *idx += 1;
                if !visited[next.as_usize()] {
                    visited[next.as_usize()] = true;
                    stack.push((next, 0));
                }
            } else {
                post.push(node);
                stack.pop();
            }
        }

        post.reverse();
        for (i, &id) in post.iter().enumerate() {
            self.nodes[id.as_usize()].rpo_id = i;
        }
        self.rpo = post;
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// The virtual root node.
    #[inline]
    pub fn root(&self) -> CfgNodeId {
        CfgNodeId::new(0)
    }

    /// Whether this is the forward view.
    #[inline]
    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// Total number of nodes, including the virtual root.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All reachable nodes in reverse post-order; the root is first.
    #[inline]
    pub fn rpo(&self) -> &[CfgNodeId] {
        &self.rpo
    }

    /// The continuation of a node (None for the root).
    #[inline]
    pub fn lambda(&self, id: CfgNodeId) -> Option<DefId> {
        self.nodes[id.as_usize()].lambda
    }

    /// The node of a member continuation.
    #[inline]
    pub fn node_of(&self, lam: DefId) -> CfgNodeId {
        self.lookup[&lam]
    }

    /// Edge sources of a node.
    #[inline]
    pub fn preds(&self, id: CfgNodeId) -> &[CfgNodeId] {
        &self.nodes[id.as_usize()].preds
    }

    /// Edge targets of a node.
    #[inline]
    pub fn succs(&self, id: CfgNodeId) -> &[CfgNodeId] {
        &self.nodes[id.as_usize()].succs
    }

    /// RPO number of a node; `usize::MAX` if unreachable from the root.
    #[inline]
    pub fn rpo_id(&self, id: CfgNodeId) -> usize {
        self.nodes[id.as_usize()].rpo_id
    }
}

// =============================================================================
// Tests
// =============================================================================
