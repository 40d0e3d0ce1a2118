//! Schedule: placement of pure ops into continuation blocks.
//!
//! Value ops float freely in the graph; code generation needs each one
//! pinned to a block. Three placement policies:
//!
//! - **Early**: the deepest dominator of the operands' placements.
//! - **Late**: the least common dominator-tree ancestor of the users'
//!   placements.
//! - **Smart**: walk from late up to early and pick the block with the
//!   smallest loop depth, breaking ties toward late. This sinks work out
//!   of loops while keeping it dominated by its operands.
//!
//! Params are fixed to their owning continuation. Every in-scope op is
//! placed exactly once; within a block, operands precede their users.

use rustc_hash::{FxHashMap, FxHashSet};

use rill_ir::{DefId, Use, World};

use crate::cfg::{Cfg, CfgNodeId};
use crate::domtree::DomTree;
use crate::looptree::LoopTree;
use crate::scope::Scope;

/// Placement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Early,
    Late,
    Smart,
}

/// One block of the schedule: a continuation and its ops in
/// operand-before-use order.
#[derive(Debug)]
pub struct Block {
    pub lambda: DefId,
    pub primops: Vec<DefId>,
}

/// A complete placement of the scope's ops.
pub struct Schedule {
    strategy: Strategy,
    blocks: Vec<Block>,
    placement: FxHashMap<DefId, DefId>,
}

impl Schedule {
    /// Place every in-scope op according to `strategy`. Blocks appear in
    /// the scope's forward RPO.
    pub fn new(scope: &Scope, strategy: Strategy) -> Self {
        let world = scope.world();
        let cfg = Cfg::forward(scope);
        let domtree = DomTree::new(&cfg);
        let looptree = LoopTree::new(scope);
        let def2uses = compute_def2uses(scope);

        let mut ctx = Placer {
            world,
            scope,
            cfg: &cfg,
            domtree: &domtree,
            looptree: &looptree,
            def2uses: &def2uses,
            early: FxHashMap::default(),
            late: FxHashMap::default(),
        };

        // Deterministic placement order: gid.
        let mut keys: Vec<DefId> = def2uses.keys().copied().collect();
        keys.sort();

        let mut placement: FxHashMap<DefId, DefId> = FxHashMap::default();
        for def in keys {
            let d = world.def(def);
            if d.is_lambda() || d.is_param() {
                continue;
            }
            let lam = match strategy {
                Strategy::Early => ctx.early(def),
                Strategy::Late => ctx.late(def),
                Strategy::Smart => ctx.smart(def),
            };
            placement.insert(def, lam);
        }

        // Materialize blocks in RPO with a local operand-before-use order.
        let mut blocks: Vec<Block> = Vec::with_capacity(scope.len());
        for &lam in scope.rpo() {
            let mut members: Vec<DefId> = placement
                .iter()
                .filter(|(_, &b)| b == lam)
                .map(|(&d, _)| d)
                .collect();
            members.sort();
            let primops = order_block(world, &members);
            blocks.push(Block { lambda: lam, primops });
        }

        Schedule {
            strategy,
            blocks,
            placement,
        }
    }

    /// The placement policy this schedule was built with.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The blocks in forward RPO.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The block a placed op was assigned to.
    pub fn location(&self, def: DefId) -> Option<DefId> {
        self.placement.get(&def).copied()
    }

    /// Number of placed ops.
    pub fn num_placed(&self) -> usize {
        self.placement.len()
    }
}

/// In-scope uses of every Def reachable from the member continuations'
/// operands. Continuations themselves are walked but never registered.
fn compute_def2uses(scope: &Scope) -> FxHashMap<DefId, Vec<Use>> {
    let world = scope.world();
    let mut map: FxHashMap<DefId, Vec<Use>> = FxHashMap::default();
    let mut done: FxHashSet<DefId> = FxHashSet::default();
    let mut queue: Vec<DefId> = Vec::new();

    for &lam in scope.rpo() {
        done.insert(lam);
        queue.push(lam);
    }

    while let Some(def) = queue.pop() {
        let ops: Vec<(usize, DefId)> = world
            .ops(def)
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, op)| op.is_valid())
            .collect();
        for (i, op) in ops {
            if world.def(op).is_lambda() || !scope.contains(op) {
                continue;
            }
            map.entry(op).or_default().push(Use { user: def, index: i });
            if done.insert(op) {
                queue.push(op);
            }
        }
    }
    map
}

/// Operand-before-use order within one block: depth-first over the
/// operands that live in the same block.
fn order_block(world: &World, members: &[DefId]) -> Vec<DefId> {
    let member_set: FxHashSet<DefId> = members.iter().copied().collect();
    let mut visited: FxHashSet<DefId> = FxHashSet::default();
    let mut out: Vec<DefId> = Vec::with_capacity(members.len());

    for &start in members {
        if visited.contains(&start) {
            continue;
        }
        let mut stack: Vec<(DefId, usize)> = vec![(start, 0)];
        visited.insert(start);
        while let Some(&mut (node, ref mut idx)) = stack.last_mut() {
            let ops = world.ops(node);
            if *idx < ops.len() {
                let op = ops[*idx];
                *idx += 1;
                if op.is_valid() && member_set.contains(&op) && visited.insert(op) {
                    stack.push((op, 0));
                }
            } else {
                out.push(node);
                stack.pop();
            }
        }
    }
    out
}

/// Memoized early/late/smart placement.
struct Placer<'a, 'w> {
    world: &'w World,
    scope: &'a Scope<'w>,
    cfg: &'a Cfg,
    domtree: &'a DomTree<'a>,
    looptree: &'a LoopTree,
    def2uses: &'a FxHashMap<DefId, Vec<Use>>,
    early: FxHashMap<DefId, DefId>,
    late: FxHashMap<DefId, DefId>,
}

impl Placer<'_, '_> {
    /// The shallowest block that is dominated by all operand placements:
    /// the deepest dominator among them. Params are fixed to their owner.
    fn early(&mut self, def: DefId) -> DefId {
        if let Some(&lam) = self.early.get(&def) {
            return lam;
        }
        if let rill_ir::DefKind::Param { lambda, .. } = self.world.def(def).kind {
            self.early.insert(def, lambda);
            return lambda;
        }

        let mut result = self.scope.entry();
        let ops: Vec<DefId> = self.world.ops(def).to_vec();
        for op in ops {
            if !op.is_valid()
                || self.world.def(op).is_lambda()
                || !self.def2uses.contains_key(&op)
            {
                continue;
            }
            let candidate = self.early(op);
            let deeper = self.domtree.depth(self.cfg.node_of(candidate))
                > self.domtree.depth(self.cfg.node_of(result));
            if deeper {
                result = candidate;
            }
        }

        self.early.insert(def, result);
        result
    }

    /// The least common ancestor of the users' placements in the
    /// dominator tree. A continuation user anchors at itself.
    fn late(&mut self, def: DefId) -> DefId {
        if let Some(&lam) = self.late.get(&def) {
            return lam;
        }
        let d = self.world.def(def);
        if d.is_lambda() {
            self.late.insert(def, def);
            return def;
        }
        if let rill_ir::DefKind::Param { lambda, .. } = d.kind {
            self.late.insert(def, lambda);
            return lambda;
        }

        let uses: Vec<DefId> = self.def2uses[&def].iter().map(|u| u.user).collect();
        let mut result: Option<CfgNodeId> = None;
        for user in uses {
            let user_lam = self.late(user);
            let node = self.cfg.node_of(user_lam);
            result = Some(match result {
                None => node,
                Some(acc) => self.domtree.lca(acc, node),
            });
        }
        let node = result.expect("a scheduled op has at least one use");
        let lam = self
            .cfg
            .lambda(node)
            .expect("lca of member blocks is a member block");

        self.late.insert(def, lam);
        lam
    }

    /// Between late and early, the block with the smallest loop depth;
    /// ties break toward late.
    fn smart(&mut self, def: DefId) -> DefId {
        let early = self.early(def);
        let late = self.late(def);

        let early_node = self.cfg.node_of(early);
        let late_node = self.cfg.node_of(late);

        let mut result = late_node;
        let mut depth = self.looptree.depth(late);
        let mut i = late_node;
        while i != early_node {
            let up = self.domtree.idom(i);
            if up == i {
                // Ran into the root without meeting early; keep late.
                log::warn!(
                    "no dominating placement for {}; keeping the late block",
                    self.world.def_to_string(def)
                );
                result = late_node;
                break;
            }
            i = up;
            let Some(lam) = self.cfg.lambda(i) else {
                log::warn!(
                    "placement walk for {} reached the virtual root",
                    self.world.def_to_string(def)
                );
                result = late_node;
                break;
            };
            let d = self.looptree.depth(lam);
            if d < depth {
                result = i;
                depth = d;
            }
        }

        self.cfg
            .lambda(result)
            .expect("smart placement lands on a member block")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rill_ir::{ArithOpKind, PrimTypeKind, World};

    #[test]
    fn test_schedule_places_every_op_once() {
        let mut w = World::new();
        let u32t = w.prim_type(PrimTypeKind::U32);
        let pi1 = w.pi(&[u32t]);

        let exit = w.lambda(pi1);
        let mid = w.lambda(pi1);
        let mx = w.param(mid, 0).unwrap();
        let two = w.lit(PrimTypeKind::U32, 2);
        let doubled = w.arithop(ArithOpKind::Mul, two, mx).unwrap();
        w.jump(mid, exit, &[doubled]).unwrap();

        let entry = w.lambda(pi1);
        let x = w.param(entry, 0).unwrap();
        let one = w.lit(PrimTypeKind::U32, 1);
        let sum = w.arithop(ArithOpKind::Add, one, x).unwrap();
        w.jump(entry, mid, &[sum]).unwrap();

        let scope = Scope::new(&w, entry);
        for strategy in [Strategy::Early, Strategy::Late, Strategy::Smart] {
            let sched = Schedule::new(&scope, strategy);
            let placed: Vec<DefId> = sched
                .blocks()
                .iter()
                .flat_map(|b| b.primops.iter().copied())
                .collect();
            // Exactly once each.
            let mut unique = placed.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), placed.len());
            assert_eq!(placed.len(), sched.num_placed());
            assert!(sched.location(sum).is_some());
            assert!(sched.location(doubled).is_some());
        }
    }

    #[test]
    fn test_operands_precede_uses_within_block() {
        let mut w = World::new();
        let u32t = w.prim_type(PrimTypeKind::U32);
        let pi1 = w.pi(&[u32t]);

        let exit = w.lambda(pi1);
        let entry = w.lambda(pi1);
        let x = w.param(entry, 0).unwrap();
        let one = w.lit(PrimTypeKind::U32, 1);
        let a = w.arithop(ArithOpKind::Add, one, x).unwrap();
        let b = w.arithop(ArithOpKind::Mul, a, a).unwrap();
        let c = w.arithop(ArithOpKind::Add, b, a).unwrap();
        w.jump(entry, exit, &[c]).unwrap();

        let scope = Scope::new(&w, entry);
        let sched = Schedule::new(&scope, Strategy::Early);

        let block = &sched.blocks()[0];
        assert_eq!(block.lambda, entry);
        let pos = |d: DefId| block.primops.iter().position(|&p| p == d).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
        assert!(pos(a) < pos(c));
    }

    #[test]
    fn test_late_sinks_into_user_block() {
        let mut w = World::new();
        let u32t = w.prim_type(PrimTypeKind::U32);
        let bool_ty = w.type_bool();
        let pi_e = w.pi(&[u32t, bool_ty]);

        let exit = w.lambda(w.pi0());
        // then-branch uses the computation; else-branch does not.
        let u_pi = w.pi(&[u32t]);
        let sink = w.lambda(u_pi);
        w.make_external(sink);
        let then_b = w.lambda(w.pi0());
        let else_b = w.lambda(w.pi0());
        w.jump(else_b, exit, &[]).unwrap();

        let entry = w.lambda(pi_e);
        let x = w.param(entry, 0).unwrap();
        let c = w.param(entry, 1).unwrap();
        let one = w.lit(PrimTypeKind::U32, 1);
        let costly = w.arithop(ArithOpKind::Add, one, x).unwrap();
        w.jump(then_b, sink, &[costly]).unwrap();
        w.branch(entry, c, then_b, else_b).unwrap();

        let scope = Scope::new(&w, entry);

        let early = Schedule::new(&scope, Strategy::Early);
        assert_eq!(early.location(costly), Some(entry));

        let late = Schedule::new(&scope, Strategy::Late);
        assert_eq!(late.location(costly), Some(then_b));

        // Smart agrees with late here (no loops to avoid).
        let smart = Schedule::new(&scope, Strategy::Smart);
        assert_eq!(smart.location(costly), Some(then_b));
    }

    #[test]
    fn test_smart_hoists_out_of_loop() {
        let mut w = World::new();
        let u32t = w.prim_type(PrimTypeKind::U32);
        let bool_ty = w.type_bool();
        let pi_e = w.pi(&[u32t, bool_ty]);
        let pi_u = w.pi(&[u32t]);

        // entry(x, c) -> head(v); head -> body | exit; body -> head.
        // body jumps back with add(1, x), which is loop-invariant.
        let exit = w.lambda(w.pi0());
        let head = w.lambda(pi_u);
        let body = w.lambda(w.pi0());

        let entry = w.lambda(pi_e);
        let x = w.param(entry, 0).unwrap();
        let c = w.param(entry, 1).unwrap();

        let one = w.lit(PrimTypeKind::U32, 1);
        let invariant = w.arithop(ArithOpKind::Add, one, x).unwrap();

        w.branch(head, c, body, exit).unwrap();
        w.jump(body, head, &[invariant]).unwrap();
        w.jump(entry, head, &[x]).unwrap();

        let scope = Scope::new(&w, entry);
        let tree = LoopTree::new(&scope);
        assert_eq!(tree.depth(body), 1);

        let late = Schedule::new(&scope, Strategy::Late);
        assert_eq!(late.location(invariant), Some(body));

        // Smart walks from the loop body up to the entry and settles on
        // the shallowest loop depth.
        let smart = Schedule::new(&scope, Strategy::Smart);
        let smart_block = smart.location(invariant).unwrap();
        assert_eq!(smart_block, entry);
        assert_eq!(tree.depth(smart_block), 0);
    }
}
