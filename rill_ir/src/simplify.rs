//! Control-flow simplification and parameter cleanup.
//!
//! `cfg_simplify` fuses jump chains: a continuation that jumps to a
//! non-external continuation with exactly one use absorbs the callee's
//! jump, substituting the callee's params with the call's arguments.
//! `param_opt` bottoms out caller arguments at positions whose param has
//! died, and `opt` strings the passes together around cleanups.

use crate::def::DefId;
use crate::world::World;

impl World {
    /// Fuse jump chains to a fixed point.
    ///
    /// A candidate is a sealed continuation `l` whose callee `t` is a
    /// non-external continuation with exactly one use (the call from
    /// `l`). The fusion builds a fresh continuation on `l`'s pi that
    /// performs `t`'s jump, globally replaces each param of `t` with the
    /// corresponding argument of `l`'s call, and replaces `l`.
    pub fn cfg_simplify(&mut self) {
        loop {
            let mut candidate = None;
            for l in self.lambdas() {
                let def = self.def(l);
                if !def.sealed || def.ops.is_empty() {
                    continue;
                }
                let callee = def.ops[0];
                if !self.is_alive(callee) || callee == l {
                    continue;
                }
                let callee_def = self.def(callee);
                if !callee_def.is_lambda() || callee_def.is_external() {
                    continue;
                }
                if callee_def.uses.len() != 1 {
                    continue;
                }
                candidate = Some((l, callee));
                break;
            }

            let Some((l, t)) = candidate else { break };

            log::debug!(
                "cfg_simplify: fusing {} into {}",
                self.def_to_string(t),
                self.def_to_string(l)
            );

            let pi = self.ty(l).expect("continuations carry a pi type");
            let t_callee = self.op(t, 0);
            let t_args: Vec<DefId> = self.ops(t)[1..].to_vec();

            let fused = self.lambda(pi);
            if self.is_external(l) {
                self.make_external(fused);
            }
            if let (Some(a), Some(b)) = (self.name(l), self.name(t)) {
                let combined = format!("{a}+{b}");
                self.set_name(fused, combined);
            }
            self.jump(fused, t_callee, &t_args)
                .expect("refused jump of an already well-typed call");

            // Substitute t's params with l's arguments. Re-read the
            // argument each round: a collision cascade may rewrite l's
            // operand list in place.
            for (index, param) in self.params(t) {
                let arg = self.op(l, 1 + index);
                self.replace(param, arg);
            }

            self.replace(l, fused);

            // t's single use died with l.
            debug_assert!(self.uses(t).is_empty());
            self.delete_def(t);
        }
    }

    /// For each continuation whose param index sequence has gaps, set the
    /// caller argument at every missing position to Bottom of the pi
    /// element type. The dead argument computation then falls to the next
    /// cleanup.
    pub fn param_opt(&mut self) {
        let lambdas: Vec<DefId> = self.lambdas().collect();
        for l in lambdas {
            if !self.is_alive(l) {
                continue;
            }
            let Some(pi) = self.ty(l) else { continue };
            let arity = self.ops(pi).len();

            for index in 0..arity {
                if self.param(l, index).is_some() {
                    continue;
                }
                let elem_ty = self.op(pi, index);
                for caller in self.direct_callers(l) {
                    if !self.is_alive(caller) || self.ops(caller).len() <= 1 + index {
                        continue;
                    }
                    let bot = self.bottom(elem_ty);
                    if self.op(caller, 1 + index) != bot {
                        log::debug!(
                            "param_opt: bottoming argument {} of {}",
                            index,
                            self.def_to_string(caller)
                        );
                        self.update(caller, 1 + index, bot);
                    }
                }
            }
        }
    }

    /// The standard pipeline: cleanup, fuse jump chains, cleanup, bottom
    /// dead params, cleanup.
    pub fn opt(&mut self) {
        self.cleanup();
        self.cfg_simplify();
        self.cleanup();
        self.param_opt();
        self.cleanup();
    }
}

// =============================================================================
// Tests
// =============================================================================
