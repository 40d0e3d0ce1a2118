//! Scope: the reachable subgraph of a set of entry continuations.
//!
//! A Scope contains the continuations reachable from its entries via the
//! callee/argument graph, plus the Defs that occur within them: their
//! live params and everything their jumps mention, transitively. It
//! provides forward and backward reverse-post-order numberings and the
//! pred/succ relation induced on the members.
//!
//! All member lists are gid-sorted or construction-ordered, so the
//! numbering is deterministic for a given graph.

use rustc_hash::{FxHashMap, FxHashSet};

use rill_ir::{DefId, World};

/// The reachable subgraph of one or more entry continuations.
pub struct Scope<'w> {
    world: &'w World,
    num_entries: usize,
    /// Forward RPO over the member continuations, entries first.
    rpo: Vec<DefId>,
    sid: FxHashMap<DefId, usize>,
    /// Backward RPO, exits first.
    backward_rpo: Vec<DefId>,
    backward_sid: FxHashMap<DefId, usize>,
    num_exits: usize,
    /// Membership for any Def (continuations, params, ops).
    set: FxHashSet<DefId>,
    preds: FxHashMap<DefId, Vec<DefId>>,
    succs: FxHashMap<DefId, Vec<DefId>>,
}

impl<'w> Scope<'w> {
    /// Build the scope of a single entry.
    pub fn new(world: &'w World, entry: DefId) -> Self {
        Self::with_entries(world, &[entry])
    }

    /// Build the scope of a set of entries.
    pub fn with_entries(world: &'w World, entries: &[DefId]) -> Self {
        assert!(!entries.is_empty(), "a scope needs at least one entry");
        assert!(
            entries.iter().all(|&e| world.def(e).is_lambda()),
            "scope entries must be continuations"
        );

        // Member continuations: closure of the entries under succs.
        let mut members: FxHashSet<DefId> = FxHashSet::default();
        let mut stack: Vec<DefId> = entries.to_vec();
        while let Some(l) = stack.pop() {
            if !members.insert(l) {
                continue;
            }
            stack.extend(world.succs(l));
        }

        // Induced edges, gid-sorted for deterministic traversal.
        let mut preds: FxHashMap<DefId, Vec<DefId>> = FxHashMap::default();
        let mut succs: FxHashMap<DefId, Vec<DefId>> = FxHashMap::default();
        for &l in &members {
            let mut ss: Vec<DefId> = world
                .succs(l)
                .into_iter()
                .filter(|s| members.contains(s))
                .collect();
            ss.sort();
            let mut ps: Vec<DefId> = world
                .preds(l)
                .into_iter()
                .filter(|p| members.contains(p))
                .collect();
            ps.sort();
            succs.insert(l, ss);
            preds.insert(l, ps);
        }

        // Forward RPO, entries pinned to the first slots.
        let rpo = numbered_rpo(entries, &succs);
        let sid: FxHashMap<DefId, usize> =
            rpo.iter().enumerate().map(|(i, &l)| (l, i)).collect();

        // Exits: members without in-scope successors. An endless loop has
        // none; fall back to the last member in forward RPO.
        let mut exits: Vec<DefId> = rpo
            .iter()
            .copied()
            .filter(|l| succs[l].is_empty())
            .collect();
        if exits.is_empty() {
            exits.push(*rpo.last().expect("non-empty scope"));
        }
        let num_exits = exits.len();

        let backward_rpo = numbered_rpo(&exits, &preds);
        let backward_sid: FxHashMap<DefId, usize> = backward_rpo
            .iter()
            .enumerate()
            .map(|(i, &l)| (l, i))
            .collect();

        // Def membership: members, their live params, and everything the
        // members' jumps mention. Params owned outside the scope are free
        // variables, not members.
        let mut set: FxHashSet<DefId> = FxHashSet::default();
        let mut work: Vec<DefId> = Vec::new();
        for &l in &rpo {
            set.insert(l);
            for (_, p) in world.params(l) {
                set.insert(p);
            }
            work.extend(world.ops(l).iter().copied().filter(|op| op.is_valid()));
        }
        while let Some(d) = work.pop() {
            if set.contains(&d) || !world.is_alive(d) {
                continue;
            }
            let def = world.def(d);
            if def.is_lambda() {
                continue;
            }
            if let rill_ir::DefKind::Param { lambda, .. } = def.kind {
                if !members.contains(&lambda) {
                    continue;
                }
            }
            set.insert(d);
            work.extend(def.ops.iter().copied().filter(|op| op.is_valid()));
        }

        Scope {
            world,
            num_entries: entries.len(),
            rpo,
            sid,
            backward_rpo,
            backward_sid,
            num_exits,
            set,
            preds,
            succs,
        }
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// The backing world.
    #[inline]
    pub fn world(&self) -> &'w World {
        self.world
    }

    /// Number of member continuations.
    #[inline]
    pub fn len(&self) -> usize {
        self.rpo.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rpo.is_empty()
    }

    /// All member continuations in forward reverse post-order, entries
    /// first.
    #[inline]
    pub fn rpo(&self) -> &[DefId] {
        &self.rpo
    }

    /// The entry continuations.
    #[inline]
    pub fn entries(&self) -> &[DefId] {
        &self.rpo[..self.num_entries]
    }

    /// The first entry.
    #[inline]
    pub fn entry(&self) -> DefId {
        self.rpo[0]
    }

    /// The member continuations excluding the entries.
    #[inline]
    pub fn body(&self) -> &[DefId] {
        &self.rpo[self.num_entries..]
    }

    /// All member continuations in backward reverse post-order, exits
    /// first.
    #[inline]
    pub fn backward_rpo(&self) -> &[DefId] {
        &self.backward_rpo
    }

    /// The exit continuations.
    #[inline]
    pub fn exits(&self) -> &[DefId] {
        &self.backward_rpo[..self.num_exits]
    }

    /// Check entry membership.
    pub fn is_entry(&self, lam: DefId) -> bool {
        self.entries().contains(&lam)
    }

    /// Check exit membership.
    pub fn is_exit(&self, lam: DefId) -> bool {
        self.exits().contains(&lam)
    }

    /// Forward RPO number of a member continuation.
    pub fn sid(&self, lam: DefId) -> Option<usize> {
        self.sid.get(&lam).copied()
    }

    /// Backward RPO number of a member continuation.
    pub fn backward_sid(&self, lam: DefId) -> Option<usize> {
        self.backward_sid.get(&lam).copied()
    }

    /// In-scope successors of a member.
    pub fn succs(&self, lam: DefId) -> &[DefId] {
        self.succs.get(&lam).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// In-scope predecessors of a member.
    pub fn preds(&self, lam: DefId) -> &[DefId] {
        self.preds.get(&lam).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Membership test for any Def.
    pub fn contains(&self, def: DefId) -> bool {
        self.set.contains(&def)
    }
}

/// Reverse post-order from the given roots, with the roots pinned to the
/// first slots in their given order.
fn numbered_rpo(roots: &[DefId], succs: &FxHashMap<DefId, Vec<DefId>>) -> Vec<DefId> {
    let mut post: Vec<DefId> = Vec::new();
    let mut visited: FxHashSet<DefId> = FxHashSet::default();

    for &root in roots {
        if visited.contains(&root) {
            continue;
        }
        visited.insert(root);
        let mut stack: Vec<(DefId, usize)> = vec![(root, 0)];
        while let Some(&mut (node, ref mut idx)) = stack.last_mut() {
            let children = succs.get(&node).map(|v| v.as_slice()).unwrap_or(&[]);
            if *idx < children.len() {
                let next = children[*idx];
                *idx += 1;
                if visited.insert(next) {
                    stack.push((next, 0));
                }
            } else {
                post.push(node);
                stack.pop();
            }
        }
    }

    let mut rpo: Vec<DefId> = Vec::with_capacity(post.len());
    rpo.extend_from_slice(roots);
    rpo.extend(post.iter().rev().copied().filter(|l| !roots.contains(l)));
    rpo
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rill_ir::{ArithOpKind, PrimTypeKind};

    #[test]
    fn test_scope_membership() {
        let mut w = World::new();
        let u32t = w.prim_type(PrimTypeKind::U32);
        let pi1 = w.pi(&[u32t]);

        let exit = w.lambda(pi1);
        let mid = w.lambda(pi1);
        let mid_x = w.param(mid, 0).unwrap();
        let one = w.lit(PrimTypeKind::U32, 1);
        let sum = w.arithop(ArithOpKind::Add, one, mid_x).unwrap();
        w.jump(mid, exit, &[sum]).unwrap();

        let entry = w.lambda(pi1);
        let x = w.param(entry, 0).unwrap();
        w.jump(entry, mid, &[x]).unwrap();

        // A continuation unrelated to the entry.
        let stranger = w.lambda(pi1);

        let scope = Scope::new(&w, entry);
        assert_eq!(scope.entry(), entry);
        assert_eq!(scope.entries(), &[entry]);
        assert!(scope.rpo().contains(&mid));
        assert!(scope.rpo().contains(&exit));
        assert!(!scope.rpo().contains(&stranger));
        assert_eq!(scope.body(), &[mid, exit]);

        assert!(scope.contains(sum));
        assert!(scope.contains(mid_x));
        assert!(scope.contains(x));
        assert!(scope.contains(one));
        assert!(!scope.contains(stranger));
    }

    #[test]
    fn test_rpo_order_on_diamond() {
        let mut w = World::new();
        let bool_ty = w.type_bool();
        let pi_b = w.pi(&[bool_ty]);

        let exit = w.lambda(w.pi0());
        let b = w.lambda(w.pi0());
        w.jump(b, exit, &[]).unwrap();
        let c = w.lambda(w.pi0());
        w.jump(c, exit, &[]).unwrap();

        let entry = w.lambda(pi_b);
        let cond = w.param(entry, 0).unwrap();
        w.branch(entry, cond, b, c).unwrap();

        let scope = Scope::new(&w, entry);
        let sid = |l| scope.sid(l).unwrap();
        assert_eq!(sid(entry), 0);
        assert!(sid(b) < sid(exit));
        assert!(sid(c) < sid(exit));

        // Exits and backward numbering.
        assert_eq!(scope.exits(), &[exit]);
        assert_eq!(scope.backward_sid(exit), Some(0));
        assert!(scope.backward_sid(entry).unwrap() > scope.backward_sid(b).unwrap());
    }

    #[test]
    fn test_preds_succs_induced() {
        let mut w = World::new();
        let exit = w.lambda(w.pi0());
        let a = w.lambda(w.pi0());
        w.jump(a, exit, &[]).unwrap();
        let entry = w.lambda(w.pi0());
        w.jump(entry, a, &[]).unwrap();

        let scope = Scope::new(&w, entry);
        assert_eq!(scope.succs(entry), &[a]);
        assert_eq!(scope.succs(a), &[exit]);
        assert_eq!(scope.preds(exit), &[a]);
        assert_eq!(scope.preds(a), &[entry]);
        assert_eq!(scope.preds(entry), &[] as &[DefId]);
    }

    #[test]
    fn test_endless_loop_gets_fallback_exit() {
        let mut w = World::new();
        let l1 = w.lambda(w.pi0());
        let l2 = w.lambda(w.pi0());
        w.jump(l1, l2, &[]).unwrap();
        w.jump(l2, l1, &[]).unwrap();

        let scope = Scope::new(&w, l1);
        assert_eq!(scope.len(), 2);
        assert_eq!(scope.exits().len(), 1);
        assert_eq!(scope.backward_rpo().len(), 2);
    }
}
