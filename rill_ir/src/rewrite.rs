//! Graph rewriting: `replace` and `update`.
//!
//! Both primitives preserve the two load-bearing invariants: every operand
//! edge has exactly one matching use entry, and structural equality
//! implies object identity. Re-interning a mutated node can collide with
//! a resident twin; the collision cascades by rewiring the node's users
//! to the twin and dropping the node.
//!
//! Use lists are snapshotted before a rewrite, so mutation never races an
//! iteration.

use crate::def::{DefId, Ops, Use};
use crate::world::World;

impl World {
    /// Remove a Def's entry from the interner without destroying the Def.
    /// Only removes the entry if it maps to `id`: during a collision
    /// cascade the key may already belong to the twin.
    pub fn release(&mut self, id: DefId) {
        if let Some(key) = self.def(id).structural_key() {
            if self.interner.get(&key) == Some(&id) {
                self.interner.remove(&key);
            }
        }
    }

    /// Re-intern a Def after mutation. Returns the resident twin if the
    /// mutated node now equals another node; the caller must rewire users
    /// to the twin.
    pub(crate) fn reinsert(&mut self, id: DefId) -> Option<DefId> {
        let key = self.def(id).structural_key()?;
        match self.interner.get(&key) {
            Some(&twin) if twin != id => Some(twin),
            Some(_) => None,
            None => {
                self.interner.insert(key, id);
                None
            }
        }
    }

    /// Destroy a Def: drop its interner entry, unregister the uses of its
    /// operands, and free the arena slot.
    pub(crate) fn delete_def(&mut self, id: DefId) {
        self.release(id);
        let ops: Ops = self.def(id).ops.clone();
        for (i, &op) in ops.iter().enumerate() {
            if op.is_valid() {
                if let Some(target) = self.defs.get_mut(op) {
                    target.remove_use(id, i);
                }
            }
        }
        self.defs.remove(id);
    }

    /// Swap one operand of a Def. For a structural Def this releases,
    /// mutates and re-interns; a collision rewires the Def's users to the
    /// twin and drops the Def. Returns the canonical Def after the swap.
    pub fn update(&mut self, def: DefId, index: usize, op: DefId) -> DefId {
        if self.def(def).is_nominal() {
            self.set_op(def, index, op);
            return def;
        }

        self.release(def);
        self.set_op(def, index, op);
        match self.reinsert(def) {
            None => def,
            Some(twin) => {
                log::debug!(
                    "update collision: {} folds into {}",
                    self.def_to_string(def),
                    self.def_to_string(twin)
                );
                self.rewire_users(def, twin);
                self.delete_def(def);
                twin
            }
        }
    }

    /// Re-point every user of `what` to `with`, preserving operand
    /// indices, then destroy `what`. When both sides are continuations of
    /// compatible pi, Params are re-pointed by index as well.
    pub fn replace(&mut self, what: DefId, with: DefId) {
        if what == with {
            return;
        }
        debug_assert!(self.is_alive(with), "replace target must be alive");

        self.rewire_users(what, with);

        if self.def(what).is_lambda() && self.def(with).is_lambda() {
            let params: Vec<(usize, DefId)> = self.params(what);
            for (index, old_param) in params {
                if let Some(new_param) = self.param(with, index) {
                    if self.def(new_param).debug.name.is_none() {
                        if let Some(name) = self.def(old_param).debug.name.clone() {
                            self.set_name(new_param, name);
                        }
                    }
                    self.replace(old_param, new_param);
                }
            }
        }

        debug_assert!(
            self.uses(what).is_empty(),
            "all uses rewired before deletion"
        );
        self.delete_def(what);
    }

    /// Snapshot `what`'s use list and re-point each use to `with`.
    /// Structural users are released first and re-interned afterwards;
    /// collisions recurse through [`World::replace`]. The two phases stay
    /// separate: rewiring everything before re-interning anything keeps a
    /// user from colliding with a half-rewired sibling.
    fn rewire_users(&mut self, what: DefId, with: DefId) {
        let snapshot: Vec<Use> = self.def(what).uses.clone();

        let mut users: Vec<DefId> = Vec::new();
        for u in &snapshot {
            if !users.contains(&u.user) {
                users.push(u.user);
            }
        }

        for &user in &users {
            if !self.def(user).is_nominal() {
                self.release(user);
            }
        }

        for u in &snapshot {
            self.set_op(u.user, u.index, with);
        }

        for &user in &users {
            if !self.is_alive(user) || self.def(user).is_nominal() {
                continue;
            }
            if let Some(twin) = self.reinsert(user) {
                log::debug!(
                    "replace collision: {} folds into {}",
                    self.def_to_string(user),
                    self.def_to_string(twin)
                );
                self.replace(user, twin);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
