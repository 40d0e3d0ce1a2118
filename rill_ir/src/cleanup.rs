//! Cleanup: unreachable-code and dead-code elimination.
//!
//! UCE removes continuations the external entries cannot reach through
//! the call graph. DCE removes every Def that no external-rooted
//! computation keeps alive. Both are mark-sweep over the arena; the sweep
//! iterates a snapshot of the arena in gid order, so deletion order is
//! deterministic.

use rustc_hash::FxHashSet;

use crate::def::{DefId, DefKind};
use crate::world::World;

impl World {
    /// Unreachable-code elimination: delete every continuation that no
    /// external continuation reaches via the call graph.
    pub fn uce(&mut self) {
        let mut reachable: FxHashSet<DefId> = FxHashSet::default();
        let mut stack: Vec<DefId> = self.externals();

        while let Some(l) = stack.pop() {
            if !reachable.insert(l) {
                continue;
            }
            for succ in self.succs(l) {
                if !reachable.contains(&succ) {
                    stack.push(succ);
                }
            }
        }

        let dead: Vec<DefId> = self
            .lambdas()
            .filter(|l| !reachable.contains(l))
            .collect();
        for &l in &dead {
            self.delete_def(l);
        }
        if !dead.is_empty() {
            log::debug!("uce: removed {} unreachable continuations", dead.len());
        }
    }

    /// Dead-code elimination. Seeds: the cached base types, every external
    /// continuation, and every user of an external continuation's params.
    /// Marks propagate through the type edge and the operands; for
    /// continuations additionally through their callers, and for params
    /// through the phi edges (the argument at the param's index in each
    /// caller, plus the caller itself).
    pub fn dce(&mut self) {
        let mut live: FxHashSet<DefId> = FxHashSet::default();
        let mut stack: Vec<DefId> = Vec::new();

        stack.extend(self.prim_types.iter().copied());
        stack.push(self.unit);
        stack.push(self.pi0);

        // External continuations and their params interface the outside
        // world, so both are roots, along with every in-world user of
        // those params.
        for lam in self.externals() {
            stack.push(lam);
            for (_, param) in self.params(lam) {
                stack.push(param);
                let users: Vec<DefId> = self.uses(param).iter().map(|u| u.user).collect();
                stack.extend(users);
            }
        }

        while let Some(id) = stack.pop() {
            if !self.is_alive(id) || !live.insert(id) {
                continue;
            }

            let def = self.def(id);
            if let Some(ty) = def.ty {
                stack.push(ty);
            }
            stack.extend(def.ops.iter().copied().filter(|op| op.is_valid()));

            match def.kind {
                DefKind::Lambda { .. } => {
                    stack.extend(self.preds(id));
                }
                DefKind::Param { lambda, index } => {
                    for caller in self.preds(lambda) {
                        stack.push(caller);
                        if self.calls(caller, lambda) {
                            if let Some(&arg) = self.ops(caller).get(1 + index) {
                                if arg.is_valid() {
                                    stack.push(arg);
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        let dead: Vec<DefId> = self.defs.ids().filter(|id| !live.contains(id)).collect();
        for &id in &dead {
            self.delete_def(id);
        }
        if !dead.is_empty() {
            log::debug!("dce: removed {} dead defs", dead.len());
        }
    }

    /// Whether `caller` jumps to `callee`, directly or through a value
    /// like a select in callee position.
    fn calls(&self, caller: DefId, callee: DefId) -> bool {
        if self.ops(caller).is_empty() {
            return false;
        }
        let mut stack = vec![self.op(caller, 0)];
        let mut seen: Vec<DefId> = Vec::new();
        while let Some(d) = stack.pop() {
            if !d.is_valid() || !self.is_alive(d) || seen.contains(&d) {
                continue;
            }
            seen.push(d);
            if d == callee {
                return true;
            }
            if !self.def(d).is_lambda() {
                stack.extend(self.ops(d).iter().copied());
            }
        }
        false
    }

    /// `uce` followed by `dce`. Idempotent: a second call is a no-op.
    pub fn cleanup(&mut self) {
        self.uce();
        self.dce();
    }
}

// =============================================================================
// Tests
// =============================================================================
