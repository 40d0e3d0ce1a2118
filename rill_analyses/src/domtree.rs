//! Dominator tree over a control-flow view.
//!
//! The iterative Cooper-Harvey-Kennedy algorithm on the RPO numbering:
//! seed each node's idom with its first earlier-in-RPO predecessor, then
//! iterate the LCA fold over all predecessors until stable. Children,
//! depths and subtree RPO intervals are materialized afterwards, so
//! `dominates` is two comparisons.

use crate::cfg::{Cfg, CfgNodeId};

/// Immediate-dominator tree for a `Cfg`.
pub struct DomTree<'c> {
    cfg: &'c Cfg,
    idom: Vec<CfgNodeId>,
    children: Vec<Vec<CfgNodeId>>,
    depth: Vec<u32>,
    /// Subtree interval: `rpo_id(n)` and the largest RPO id in n's
    /// dominator subtree.
    rpo_exit: Vec<usize>,
}

impl<'c> DomTree<'c> {
    /// Build the dominator tree of the view's root.
    pub fn new(cfg: &'c Cfg) -> Self {
        let n = cfg.len();
        let root = cfg.root();

        let mut idom = vec![CfgNodeId::INVALID; n];
        idom[root.as_usize()] = root;

        // Initial pass: the first predecessor that appears earlier in RPO.
        for &node in &cfg.rpo()[1..] {
            for &pred in cfg.preds(node) {
                if cfg.rpo_id(pred) < cfg.rpo_id(node) {
                    idom[node.as_usize()] = pred;
                    break;
                }
            }
            debug_assert!(
                idom[node.as_usize()].is_valid(),
                "every reachable non-root node has an earlier predecessor"
            );
        }

        // Iterate to a fixed point.
        let mut changed = true;
        while changed {
            changed = false;
            for &node in &cfg.rpo()[1..] {
                let mut new_idom = CfgNodeId::INVALID;
                for &pred in cfg.preds(node) {
                    if !idom[pred.as_usize()].is_valid() {
                        continue;
                    }
                    new_idom = if new_idom.is_valid() {
                        intersect(cfg, &idom, new_idom, pred)
                    } else {
                        pred
                    };
                }
                debug_assert!(new_idom.is_valid());
                if idom[node.as_usize()] != new_idom {
                    idom[node.as_usize()] = new_idom;
                    changed = true;
                }
            }
        }

        // Children lists.
        let mut children: Vec<Vec<CfgNodeId>> = vec![Vec::new(); n];
        for &node in &cfg.rpo()[1..] {
            children[idom[node.as_usize()].as_usize()].push(node);
        }

        // Depth in RPO order (parents precede children), intervals in
        // reverse RPO order (children precede parents).
        let mut depth = vec![0u32; n];
        for &node in &cfg.rpo()[1..] {
            depth[node.as_usize()] = depth[idom[node.as_usize()].as_usize()] + 1;
        }
        let mut rpo_exit: Vec<usize> = vec![0; n];
        for &node in cfg.rpo().iter().rev() {
            let mut max = cfg.rpo_id(node);
            for &child in &children[node.as_usize()] {
                max = max.max(rpo_exit[child.as_usize()]);
            }
            rpo_exit[node.as_usize()] = max;
        }

        DomTree {
            cfg,
            idom,
            children,
            depth,
            rpo_exit,
        }
    }

    /// The immediate dominator. The root is its own idom.
    #[inline]
    pub fn idom(&self, node: CfgNodeId) -> CfgNodeId {
        self.idom[node.as_usize()]
    }

    /// Dominator-tree children.
    #[inline]
    pub fn children(&self, node: CfgNodeId) -> &[CfgNodeId] {
        &self.children[node.as_usize()]
    }

    /// Distance from the root.
    #[inline]
    pub fn depth(&self, node: CfgNodeId) -> u32 {
        self.depth[node.as_usize()]
    }

    /// Lowest common ancestor in the dominator tree.
    pub fn lca(&self, a: CfgNodeId, b: CfgNodeId) -> CfgNodeId {
        intersect(self.cfg, &self.idom, a, b)
    }

    /// Whether `a` dominates `b`, by subtree RPO interval.
    #[inline]
    pub fn dominates(&self, a: CfgNodeId, b: CfgNodeId) -> bool {
        let entry = self.cfg.rpo_id(a);
        let id = self.cfg.rpo_id(b);
        entry <= id && id <= self.rpo_exit[a.as_usize()]
    }

    /// Whether `a` dominates `b` and differs from it.
    #[inline]
    pub fn strictly_dominates(&self, a: CfgNodeId, b: CfgNodeId) -> bool {
        a != b && self.dominates(a, b)
    }
}

/// Walk two nodes up the idom chain until they meet, comparing RPO
/// numbers (smaller is closer to the root).
fn intersect(cfg: &Cfg, idom: &[CfgNodeId], mut a: CfgNodeId, mut b: CfgNodeId) -> CfgNodeId {
    while a != b {
        while cfg.rpo_id(a) > cfg.rpo_id(b) {
            a = idom[a.as_usize()];
        }
        while cfg.rpo_id(b) > cfg.rpo_id(a) {
            b = idom[b.as_usize()];
        }
    }
    a
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use rill_ir::{DefId, World};

    /// entry -> a; a -> b, a -> c; b -> d, c -> d; d -> exit.
    fn double_diamond() -> (World, DefId, [DefId; 5]) {
        let mut w = World::new();
        let bool_ty = w.type_bool();
        let pi_b = w.pi(&[bool_ty]);

        let exit = w.lambda(w.pi0());
        let d = w.lambda(w.pi0());
        w.jump(d, exit, &[]).unwrap();
        let b = w.lambda(w.pi0());
        w.jump(b, d, &[]).unwrap();
        let c = w.lambda(w.pi0());
        w.jump(c, d, &[]).unwrap();
        let a = w.lambda(pi_b);
        let cond = w.param(a, 0).unwrap();
        w.branch(a, cond, b, c).unwrap();
        let entry = w.lambda(w.pi0());
        let entry_cond = w.lit_bool(true);
        w.jump(entry, a, &[entry_cond]).unwrap();
        (w, entry, [a, b, c, d, exit])
    }

    #[test]
    fn test_diamond_idoms() {
        let (w, entry, [a, b, c, d, exit]) = double_diamond();
        let scope = Scope::new(&w, entry);
        let cfg = Cfg::forward(&scope);
        let dom = DomTree::new(&cfg);

        let n = |l| cfg.node_of(l);
        assert_eq!(dom.idom(n(a)), n(entry));
        assert_eq!(dom.idom(n(b)), n(a));
        assert_eq!(dom.idom(n(c)), n(a));
        // The join point is dominated by the branch, not by either arm.
        assert_eq!(dom.idom(n(d)), n(a));
        assert_eq!(dom.idom(n(exit)), n(d));
    }

    #[test]
    fn test_dominates_and_depth() {
        let (w, entry, [a, b, _c, d, exit]) = double_diamond();
        let scope = Scope::new(&w, entry);
        let cfg = Cfg::forward(&scope);
        let dom = DomTree::new(&cfg);

        let n = |l| cfg.node_of(l);
        assert!(dom.dominates(n(entry), n(exit)));
        assert!(dom.dominates(n(a), n(d)));
        assert!(dom.dominates(n(a), n(a)));
        assert!(!dom.dominates(n(b), n(d)));
        assert!(!dom.strictly_dominates(n(a), n(a)));

        assert_eq!(dom.depth(cfg.root()), 0);
        assert_eq!(dom.depth(n(entry)), 1);
        assert_eq!(dom.depth(n(a)), 2);
        assert_eq!(dom.depth(n(b)), 3);
        assert_eq!(dom.depth(n(d)), 3);
        assert_eq!(dom.depth(n(exit)), 4);
    }

    #[test]
    fn test_lca() {
        let (w, entry, [a, b, c, d, _exit]) = double_diamond();
        let scope = Scope::new(&w, entry);
        let cfg = Cfg::forward(&scope);
        let dom = DomTree::new(&cfg);

        let n = |l| cfg.node_of(l);
        assert_eq!(dom.lca(n(b), n(c)), n(a));
        assert_eq!(dom.lca(n(b), n(d)), n(a));
        assert_eq!(dom.lca(n(a), n(b)), n(a));
        assert_eq!(dom.lca(n(entry), n(d)), n(entry));
    }

    #[test]
    fn test_backward_domtree_roots_at_exit() {
        let (w, entry, [a, b, c, d, exit]) = double_diamond();
        let scope = Scope::new(&w, entry);
        let cfg = Cfg::backward(&scope);
        let dom = DomTree::new(&cfg);

        let n = |l| cfg.node_of(l);
        // In the backward view, the join point post-dominates the arms.
        assert_eq!(dom.idom(n(d)), n(exit));
        assert_eq!(dom.idom(n(b)), n(d));
        assert_eq!(dom.idom(n(c)), n(d));
        assert_eq!(dom.idom(n(a)), n(d));
        assert_eq!(dom.idom(n(entry)), n(a));
    }
}
