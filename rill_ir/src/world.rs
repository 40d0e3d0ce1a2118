//! The World: owner of the program graph.
//!
//! The World manages creation and destruction of all Defs. In particular:
//! - **Type unification**: there is exactly one Def per primitive type,
//!   per pi and per unnamed sigma. Named sigmas are nominal and never
//!   unified.
//! - **Value unification**: structural value Defs are hashed into an
//!   interner, which buys constant pooling, constant folding, common
//!   subexpression elimination and canonicalization in one mechanism.
//!   A PrimOp does not belong to any continuation; it implicitly belongs
//!   wherever its data dependencies place it, or it is dead.
//!
//! Construction of every node runs, in order: type check, literal fold,
//! Bottom propagation, canonicalization, unification.
//!
//! You can create several Worlds; they are completely independent. A
//! World is single-threaded; nothing here suspends or shares state.

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::arena::Arena;
use crate::def::{Def, DefId, DefKey, DefKind, Location, Ops, Use};
use crate::error::{BuildError, BuildResult};
use crate::fold::{self, Folded};
use crate::operators::{ArithOpKind, ConvOpKind, RelOpKind};
use crate::types::{PrimTypeKind, ALL_PRIM_TYPES, NUM_PRIM_TYPES};

// =============================================================================
// World
// =============================================================================

/// The program graph: arena, interner and cached base types.
pub struct World {
    /// All Defs. Slots are never reused; the slot index is the gid.
    pub(crate) defs: Arena<Def>,
    /// Structural identity -> canonical Def.
    pub(crate) interner: FxHashMap<DefKey, DefId>,
    /// One cached Def per primitive type kind.
    pub(crate) prim_types: [DefId; NUM_PRIM_TYPES],
    /// The unit type: the empty sigma.
    pub(crate) unit: DefId,
    /// The empty pi.
    pub(crate) pi0: DefId,
}

impl World {
    /// Create a fresh world with the base types interned.
    pub fn new() -> Self {
        let mut world = World {
            defs: Arena::with_capacity(256),
            interner: FxHashMap::default(),
            prim_types: [DefId::INVALID; NUM_PRIM_TYPES],
            unit: DefId::INVALID,
            pi0: DefId::INVALID,
        };

        for (i, kind) in ALL_PRIM_TYPES.iter().enumerate() {
            world.prim_types[i] =
                world.intern(Def::new(DefKind::PrimType(*kind), None, Ops::new()));
        }
        world.unit = world.intern(Def::new(DefKind::Sigma, None, Ops::new()));
        world.pi0 = world.intern(Def::new(DefKind::Pi, None, Ops::new()));

        world
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Get a live Def.
    #[inline]
    pub fn def(&self, id: DefId) -> &Def {
        &self.defs[id]
    }

    /// Get a Def if its slot is live.
    #[inline]
    pub fn try_def(&self, id: DefId) -> Option<&Def> {
        if id.is_valid() {
            self.defs.get(id)
        } else {
            None
        }
    }

    /// Check whether `id` refers to a live Def.
    #[inline]
    pub fn is_alive(&self, id: DefId) -> bool {
        id.is_valid() && self.defs.contains(id)
    }

    /// The type edge of a Def.
    #[inline]
    pub fn ty(&self, id: DefId) -> Option<DefId> {
        self.def(id).ty
    }

    /// The operand list of a Def.
    #[inline]
    pub fn ops(&self, id: DefId) -> &[DefId] {
        &self.def(id).ops
    }

    /// A single operand.
    #[inline]
    pub fn op(&self, id: DefId, index: usize) -> DefId {
        self.def(id).ops[index]
    }

    /// The use list of a Def.
    #[inline]
    pub fn uses(&self, id: DefId) -> &[Use] {
        &self.def(id).uses
    }

    /// Number of live Defs.
    pub fn num_defs(&self) -> usize {
        self.defs.len()
    }

    /// Iterate over all live Defs in gid order.
    pub fn iter_defs(&self) -> impl Iterator<Item = (DefId, &Def)> {
        self.defs.iter()
    }

    /// Iterate over all live continuations in gid order.
    pub fn lambdas(&self) -> impl Iterator<Item = DefId> + '_ {
        self.defs
            .iter()
            .filter(|(_, d)| d.is_lambda())
            .map(|(id, _)| id)
    }

    /// All external continuations, in gid order.
    pub fn externals(&self) -> Vec<DefId> {
        self.defs
            .iter()
            .filter(|(_, d)| d.is_external())
            .map(|(id, _)| id)
            .collect()
    }

    /// Attach a debug name.
    pub fn set_name(&mut self, id: DefId, name: impl Into<String>) {
        self.defs[id].debug.name = Some(name.into());
    }

    /// The debug name, if any.
    pub fn name(&self, id: DefId) -> Option<&str> {
        self.def(id).debug.name.as_deref()
    }

    /// Attach a source location.
    pub fn set_location(&mut self, id: DefId, line: u32, col: u32) {
        self.defs[id].debug.location = Some(Location { line, col });
    }

    /// Short diagnostic rendering of a Def.
    pub fn def_to_string(&self, id: DefId) -> String {
        let Some(def) = self.try_def(id) else {
            return format!("<dead {id}>");
        };
        let label = match &def.kind {
            DefKind::PrimType(k) => return k.name().to_string(),
            DefKind::Sigma if def.ops.is_empty() => return "unit".to_string(),
            DefKind::Sigma => "sigma",
            DefKind::NamedSigma { name } => return format!("sigma {name}"),
            DefKind::Pi => "pi",
            DefKind::Lit { bits } => return format!("lit {bits:#x} {id}"),
            DefKind::Bottom => "bottom",
            DefKind::Top => "top",
            DefKind::Arith(k) => k.name(),
            DefKind::Rel(k) => k.name(),
            DefKind::Conv(k) => k.name(),
            DefKind::Tuple => "tuple",
            DefKind::Extract { .. } => "extract",
            DefKind::Insert { .. } => "insert",
            DefKind::Select => "select",
            DefKind::Lambda { .. } => "lambda",
            DefKind::Param { .. } => "param",
            DefKind::Global => "global",
        };
        match def.debug.name.as_deref() {
            Some(name) => format!("{label} {name} {id}"),
            None => format!("{label} {id}"),
        }
    }

    // =========================================================================
    // Node insertion
    // =========================================================================

    /// Allocate a Def and register the uses of its valid operands. This is
    /// the only place use edges are created for fresh nodes.
    pub(crate) fn insert_def(&mut self, def: Def) -> DefId {
        let ops: Ops = def.ops.clone();
        let id = self.defs.alloc(def);
        for (i, &op) in ops.iter().enumerate() {
            if op.is_valid() {
                self.defs[op].add_use(id, i);
            }
        }
        id
    }

    /// Unify a structural candidate: return the resident twin if one
    /// exists, otherwise insert the candidate. A dropped candidate never
    /// touches any use list.
    pub(crate) fn intern(&mut self, def: Def) -> DefId {
        let key = def
            .structural_key()
            .expect("intern called on a nominal Def");
        if let Some(&existing) = self.interner.get(&key) {
            return existing;
        }
        let id = self.insert_def(def);
        self.interner.insert(key, id);
        id
    }

    /// The three-step operand swap: unregister the old use, assign, and
    /// register the new use.
    pub(crate) fn set_op(&mut self, def: DefId, index: usize, value: DefId) {
        let prior = self.defs[def].ops[index];
        if prior.is_valid() {
            if let Some(p) = self.defs.get_mut(prior) {
                p.remove_use(def, index);
            }
        }
        self.defs[def].ops[index] = value;
        self.defs[value].add_use(def, index);
    }

    // =========================================================================
    // Types
    // =========================================================================

    /// The unique Def of a primitive type.
    #[inline]
    pub fn prim_type(&self, kind: PrimTypeKind) -> DefId {
        self.prim_types[kind as usize]
    }

    /// The boolean type.
    #[inline]
    pub fn type_bool(&self) -> DefId {
        self.prim_type(PrimTypeKind::Bool)
    }

    /// The unit type: the empty sigma.
    #[inline]
    pub fn unit(&self) -> DefId {
        self.unit
    }

    /// An unnamed product type.
    pub fn sigma(&mut self, elems: &[DefId]) -> DefId {
        debug_assert!(elems.iter().all(|&e| self.def(e).is_type()));
        self.intern(Def::new(
            DefKind::Sigma,
            None,
            SmallVec::from_slice(elems),
        ))
    }

    /// A fresh named product type. Nominal: each call yields a distinct
    /// type even for identical contents, which permits recursion. Elements
    /// are assigned with [`World::set_elem`] and the type is sealed with
    /// [`World::finalize`].
    pub fn named_sigma(&mut self, arity: usize, name: impl Into<String>) -> DefId {
        self.insert_def(Def::new(
            DefKind::NamedSigma { name: name.into() },
            None,
            smallvec![DefId::INVALID; arity],
        ))
    }

    /// Assign one element type of an unsealed named sigma.
    pub fn set_elem(&mut self, sigma: DefId, index: usize, ty: DefId) {
        assert!(
            matches!(self.def(sigma).kind, DefKind::NamedSigma { .. }),
            "set_elem on a non-named-sigma Def"
        );
        assert!(!self.def(sigma).sealed, "set_elem on a sealed named sigma");
        debug_assert!(self.def(ty).is_type());
        self.set_op(sigma, index, ty);
    }

    /// Seal a nominal: all operands must be set.
    pub fn finalize(&mut self, nominal: DefId) {
        let def = &self.defs[nominal];
        assert!(def.is_nominal(), "finalize on a structural Def");
        assert!(
            def.ops.iter().all(|op| op.is_valid()),
            "finalize with unset operands"
        );
        self.defs[nominal].sealed = true;
    }

    /// The empty continuation type.
    #[inline]
    pub fn pi0(&self) -> DefId {
        self.pi0
    }

    /// A continuation type over the given parameter types.
    pub fn pi(&mut self, domain: &[DefId]) -> DefId {
        debug_assert!(domain.iter().all(|&e| self.def(e).is_type()));
        self.intern(Def::new(DefKind::Pi, None, SmallVec::from_slice(domain)))
    }

    // =========================================================================
    // Literals
    // =========================================================================

    /// A literal of a primitive kind. The payload is masked to the kind's
    /// width.
    pub fn lit(&mut self, kind: PrimTypeKind, bits: u64) -> DefId {
        let ty = self.prim_type(kind);
        self.intern(Def::new(
            DefKind::Lit {
                bits: bits & kind.bit_mask(),
            },
            Some(ty),
            Ops::new(),
        ))
    }

    /// A boolean literal.
    pub fn lit_bool(&mut self, value: bool) -> DefId {
        self.lit(PrimTypeKind::Bool, u64::from(value))
    }

    /// An f32 literal.
    pub fn lit_f32(&mut self, value: f32) -> DefId {
        self.lit(PrimTypeKind::F32, value.to_bits() as u64)
    }

    /// An f64 literal.
    pub fn lit_f64(&mut self, value: f64) -> DefId {
        self.lit(PrimTypeKind::F64, value.to_bits())
    }

    /// The unreachable/undefined value of a type.
    pub fn bottom(&mut self, ty: DefId) -> DefId {
        debug_assert!(self.def(ty).is_type());
        self.intern(Def::new(DefKind::Bottom, Some(ty), Ops::new()))
    }

    /// The unknown value of a type.
    pub fn top(&mut self, ty: DefId) -> DefId {
        debug_assert!(self.def(ty).is_type());
        self.intern(Def::new(DefKind::Top, Some(ty), Ops::new()))
    }

    // =========================================================================
    // Arithmetic and relational ops
    // =========================================================================

    fn prim_kind_of(&self, ty: DefId) -> Option<PrimTypeKind> {
        match self.def(ty).kind {
            DefKind::PrimType(k) => Some(k),
            _ => None,
        }
    }

    fn value_type(&self, v: DefId, what: &str) -> BuildResult<DefId> {
        self.ty(v).ok_or_else(|| BuildError::InvalidOperation {
            reason: format!("{what} applied to a type-level Def"),
        })
    }

    fn check_same_prim(&self, a: DefId, b: DefId, what: &str) -> BuildResult<PrimTypeKind> {
        let ta = self.value_type(a, what)?;
        let tb = self.value_type(b, what)?;
        if ta != tb {
            return Err(BuildError::TypeMismatch {
                expected: self.def_to_string(ta),
                found: self.def_to_string(tb),
            });
        }
        self.prim_kind_of(ta).ok_or_else(|| BuildError::InvalidOperation {
            reason: format!("{what} on non-primitive type {}", self.def_to_string(ta)),
        })
    }

    /// Whether the canonical order of a commutative op swaps `a` and `b`:
    /// a literal goes left; otherwise the smaller gid goes left.
    fn should_swap(&self, a: DefId, b: DefId) -> bool {
        (self.def(b).is_literal() || a.index() > b.index()) && !self.def(a).is_literal()
    }

    /// Build an arithmetic op.
    pub fn arithop(&mut self, kind: ArithOpKind, a: DefId, b: DefId) -> BuildResult<DefId> {
        let pk = self.check_same_prim(a, b, kind.name())?;
        if !kind.admits(pk) {
            return Err(BuildError::InvalidOperation {
                reason: format!("{} is not defined on {}", kind.name(), pk.name()),
            });
        }
        let ty = self.ty(a).unwrap();

        if let (Some(la), Some(lb)) = (self.def(a).lit_bits(), self.def(b).lit_bits()) {
            return Ok(match fold::arith(kind, pk, la, lb) {
                Folded::Val(v) => self.lit(pk, v),
                Folded::Bottom => self.bottom(ty),
            });
        }

        if self.def(a).is_bottom() || self.def(b).is_bottom() {
            return Ok(self.bottom(ty));
        }

        let (a, b) = if kind.is_commutative() && self.should_swap(a, b) {
            (b, a)
        } else {
            (a, b)
        };

        Ok(self.intern(Def::new(DefKind::Arith(kind), Some(ty), smallvec![a, b])))
    }

    /// Build a relational op. gt/ge normalize to lt/le by swapping.
    pub fn relop(&mut self, kind: RelOpKind, a: DefId, b: DefId) -> BuildResult<DefId> {
        let pk = self.check_same_prim(a, b, kind.name())?;
        if !kind.admits(pk) {
            return Err(BuildError::InvalidOperation {
                reason: format!("{} is not defined on {}", kind.name(), pk.name()),
            });
        }

        let (kind, swap) = kind.normalize();
        let (a, b) = if swap { (b, a) } else { (a, b) };

        if let (Some(la), Some(lb)) = (self.def(a).lit_bits(), self.def(b).lit_bits()) {
            let result = fold::rel(kind, pk, la, lb);
            return Ok(self.lit_bool(result));
        }

        if self.def(a).is_bottom() || self.def(b).is_bottom() {
            let bool_ty = self.type_bool();
            return Ok(self.bottom(bool_ty));
        }

        let (a, b) = if kind.is_commutative() && self.should_swap(a, b) {
            (b, a)
        } else {
            (a, b)
        };

        let bool_ty = self.type_bool();
        Ok(self.intern(Def::new(DefKind::Rel(kind), Some(bool_ty), smallvec![a, b])))
    }

    /// Build a conversion to the target primitive type `to`.
    pub fn convop(&mut self, kind: ConvOpKind, from: DefId, to: DefId) -> BuildResult<DefId> {
        let from_ty = self.value_type(from, kind.name())?;
        let pk_from = self.prim_kind_of(from_ty).ok_or_else(|| BuildError::InvalidOperation {
            reason: format!("{} of non-primitive value", kind.name()),
        })?;
        let pk_to = self.prim_kind_of(to).ok_or_else(|| BuildError::InvalidOperation {
            reason: format!("{} to non-primitive type", kind.name()),
        })?;

        let (wf, wt) = (pk_from.width(), pk_to.width());
        let ok = match kind {
            ConvOpKind::Trunc => pk_from.is_int() && pk_to.is_int() && wt < wf,
            ConvOpKind::Zext | ConvOpKind::Sext => pk_from.is_int() && pk_to.is_int() && wt > wf,
            ConvOpKind::Ftrunc => pk_from.is_float() && pk_to.is_float() && wt < wf,
            ConvOpKind::Fext => pk_from.is_float() && pk_to.is_float() && wt > wf,
            ConvOpKind::Stof | ConvOpKind::Utof => pk_from.is_int() && pk_to.is_float(),
            ConvOpKind::Ftos | ConvOpKind::Ftou => pk_from.is_float() && pk_to.is_int(),
            ConvOpKind::Bitcast => wf == wt,
        };
        if !ok {
            return Err(BuildError::InvalidOperation {
                reason: format!(
                    "{} from {} to {}",
                    kind.name(),
                    pk_from.name(),
                    pk_to.name()
                ),
            });
        }

        if self.def(from).is_bottom() {
            return Ok(self.bottom(to));
        }

        if let Some(bits) = self.def(from).lit_bits() {
            if let Some(v) = fold::conv(kind, pk_from, pk_to, bits) {
                return Ok(self.lit(pk_to, v));
            }
        }

        Ok(self.intern(Def::new(DefKind::Conv(kind), Some(to), smallvec![from])))
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Build a tuple. The empty tuple is the unit value.
    pub fn tuple(&mut self, args: &[DefId]) -> BuildResult<DefId> {
        let mut elem_tys = Vec::with_capacity(args.len());
        let mut bot = false;
        for &arg in args {
            elem_tys.push(self.value_type(arg, "tuple")?);
            if self.def(arg).is_bottom() {
                bot = true;
            }
        }
        let sigma = self.sigma(&elem_tys);
        if bot {
            return Ok(self.bottom(sigma));
        }
        Ok(self.intern(Def::new(
            DefKind::Tuple,
            Some(sigma),
            SmallVec::from_slice(args),
        )))
    }

    fn aggregate_elem_ty(&self, agg: DefId, index: usize, what: &str) -> BuildResult<DefId> {
        let agg_ty = self.value_type(agg, what)?;
        let elems = match self.def(agg_ty).kind {
            DefKind::Sigma | DefKind::NamedSigma { .. } => self.ops(agg_ty),
            _ => {
                return Err(BuildError::InvalidOperation {
                    reason: format!("{what} on non-aggregate type {}", self.def_to_string(agg_ty)),
                })
            }
        };
        if index >= elems.len() {
            return Err(BuildError::IndexOutOfRange {
                index,
                arity: elems.len(),
            });
        }
        Ok(elems[index])
    }

    /// Read the `index`-th element of an aggregate. Reading from a Tuple
    /// yields the element directly, without constructing a node; reading
    /// through an Insert either returns the inserted value or keeps
    /// looking in the aggregate underneath.
    pub fn extract(&mut self, agg: DefId, index: usize) -> BuildResult<DefId> {
        let elem_ty = self.aggregate_elem_ty(agg, index, "extract")?;

        if self.def(agg).is_bottom() {
            return Ok(self.bottom(elem_ty));
        }

        match self.def(agg).kind {
            DefKind::Tuple => return Ok(self.op(agg, index)),
            DefKind::Insert { index: i } if i == index => return Ok(self.op(agg, 1)),
            DefKind::Insert { .. } => {
                let underneath = self.op(agg, 0);
                return self.extract(underneath, index);
            }
            _ => {}
        }

        Ok(self.intern(Def::new(
            DefKind::Extract { index },
            Some(elem_ty),
            smallvec![agg],
        )))
    }

    /// Functional update of the `index`-th element. Updating a Tuple
    /// rebuilds the tuple with the element replaced.
    pub fn insert(&mut self, agg: DefId, index: usize, value: DefId) -> BuildResult<DefId> {
        let elem_ty = self.aggregate_elem_ty(agg, index, "insert")?;
        let value_ty = self.value_type(value, "insert")?;
        if value_ty != elem_ty {
            return Err(BuildError::TypeMismatch {
                expected: self.def_to_string(elem_ty),
                found: self.def_to_string(value_ty),
            });
        }
        let agg_ty = self.ty(agg).unwrap();

        if self.def(agg).is_bottom() || self.def(value).is_bottom() {
            return Ok(self.bottom(agg_ty));
        }

        if matches!(self.def(agg).kind, DefKind::Tuple) {
            let mut elems: Vec<DefId> = self.ops(agg).to_vec();
            elems[index] = value;
            return self.tuple(&elems);
        }

        Ok(self.intern(Def::new(
            DefKind::Insert { index },
            Some(agg_ty),
            smallvec![agg, value],
        )))
    }

    /// Value selection.
    pub fn select(&mut self, cond: DefId, tval: DefId, fval: DefId) -> BuildResult<DefId> {
        let cond_ty = self.value_type(cond, "select")?;
        if cond_ty != self.type_bool() {
            return Err(BuildError::TypeMismatch {
                expected: "bool".to_string(),
                found: self.def_to_string(cond_ty),
            });
        }
        let tt = self.value_type(tval, "select")?;
        let ft = self.value_type(fval, "select")?;
        if tt != ft {
            return Err(BuildError::TypeMismatch {
                expected: self.def_to_string(tt),
                found: self.def_to_string(ft),
            });
        }

        if let Some(bits) = self.def(cond).lit_bits() {
            return Ok(if bits != 0 { tval } else { fval });
        }
        if tval == fval {
            return Ok(tval);
        }
        if self.def(cond).is_bottom() || self.def(tval).is_bottom() || self.def(fval).is_bottom() {
            return Ok(self.bottom(tt));
        }

        Ok(self.intern(Def::new(
            DefKind::Select,
            Some(tt),
            smallvec![cond, tval, fval],
        )))
    }

    // =========================================================================
    // Continuations
    // =========================================================================

    /// Create a continuation of the given pi type. Params are materialized
    /// eagerly, one per element of the domain. The continuation stays
    /// unsealed until [`World::jump`] gives it a body.
    pub fn lambda(&mut self, pi: DefId) -> DefId {
        assert!(
            matches!(self.def(pi).kind, DefKind::Pi),
            "lambda requires a pi type"
        );
        let id = self.insert_def(Def::new(
            DefKind::Lambda {
                params: Vec::new(),
                external: false,
            },
            Some(pi),
            Ops::new(),
        ));

        let domain: Vec<DefId> = self.ops(pi).to_vec();
        let params: Vec<DefId> = domain
            .iter()
            .enumerate()
            .map(|(index, &ty)| {
                self.intern(Def::new(
                    DefKind::Param { lambda: id, index },
                    Some(ty),
                    Ops::new(),
                ))
            })
            .collect();

        match &mut self.defs[id].kind {
            DefKind::Lambda { params: slot, .. } => *slot = params,
            _ => unreachable!(),
        }
        id
    }

    /// The `index`-th parameter of a continuation, if it is still alive.
    pub fn param(&self, lam: DefId, index: usize) -> Option<DefId> {
        match &self.def(lam).kind {
            DefKind::Lambda { params, .. } => params
                .get(index)
                .copied()
                .filter(|&p| self.is_alive(p)),
            _ => None,
        }
    }

    /// The live parameters of a continuation with their indices.
    pub fn params(&self, lam: DefId) -> Vec<(usize, DefId)> {
        match &self.def(lam).kind {
            DefKind::Lambda { params, .. } => params
                .iter()
                .enumerate()
                .filter(|(_, &p)| self.is_alive(p))
                .map(|(i, &p)| (i, p))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Give a continuation its body: a jump to `callee` with `args`.
    /// Checks the callee's pi against the arguments and seals the
    /// continuation.
    pub fn jump(&mut self, lam: DefId, callee: DefId, args: &[DefId]) -> BuildResult<()> {
        assert!(self.def(lam).is_lambda(), "jump on a non-lambda Def");
        if self.def(lam).sealed {
            return Err(BuildError::InvalidOperation {
                reason: "jump on a sealed continuation".to_string(),
            });
        }

        let callee_ty = self.value_type(callee, "jump")?;
        if !matches!(self.def(callee_ty).kind, DefKind::Pi) {
            return Err(BuildError::TypeMismatch {
                expected: "pi".to_string(),
                found: self.def_to_string(callee_ty),
            });
        }
        let domain: Vec<DefId> = self.ops(callee_ty).to_vec();
        if domain.len() != args.len() {
            return Err(BuildError::ArityMismatch {
                expected: domain.len(),
                found: args.len(),
            });
        }
        for (i, (&arg, &expected)) in args.iter().zip(domain.iter()).enumerate() {
            let arg_ty = self.value_type(arg, "jump")?;
            if arg_ty != expected {
                return Err(BuildError::TypeMismatch {
                    expected: self.def_to_string(expected),
                    found: format!("{} (argument {i})", self.def_to_string(arg_ty)),
                });
            }
        }

        self.defs[lam].ops = smallvec![DefId::INVALID; 1 + args.len()];
        self.set_op(lam, 0, callee);
        for (i, &arg) in args.iter().enumerate() {
            self.set_op(lam, 1 + i, arg);
        }
        self.finalize(lam);
        Ok(())
    }

    /// Conditional jump: `jump(lam, select(cond, t, f), [])`.
    pub fn branch(&mut self, lam: DefId, cond: DefId, t: DefId, f: DefId) -> BuildResult<()> {
        let target = self.select(cond, t, f)?;
        self.jump(lam, target, &[])
    }

    /// Mark a continuation as a program entry/exit.
    pub fn make_external(&mut self, lam: DefId) {
        match &mut self.defs[lam].kind {
            DefKind::Lambda { external, .. } => *external = true,
            _ => panic!("make_external on a non-lambda Def"),
        }
    }

    /// Check the external flag.
    pub fn is_external(&self, lam: DefId) -> bool {
        self.def(lam).is_external()
    }

    /// Create a mutable global slot holding an initializer.
    pub fn global(&mut self, init: DefId) -> BuildResult<DefId> {
        let ty = self.value_type(init, "global")?;
        let id = self.insert_def(Def::new(DefKind::Global, Some(ty), smallvec![init]));
        self.defs[id].sealed = true;
        Ok(id)
    }

    // =========================================================================
    // Call graph
    // =========================================================================

    /// Control successors of a continuation: the continuations reachable
    /// through its jump's operands, without descending into found
    /// continuations.
    pub fn succs(&self, lam: DefId) -> Vec<DefId> {
        let mut result = Vec::new();
        let mut seen: SmallVec<[DefId; 8]> = SmallVec::new();
        let mut stack: Vec<DefId> = self
            .ops(lam)
            .iter()
            .rev()
            .copied()
            .filter(|op| op.is_valid())
            .collect();

        while let Some(d) = stack.pop() {
            if !self.is_alive(d) || seen.contains(&d) {
                continue;
            }
            seen.push(d);
            if self.def(d).is_lambda() {
                result.push(d);
            } else {
                stack.extend(self.ops(d).iter().rev().copied().filter(|op| op.is_valid()));
            }
        }
        result
    }

    /// Control predecessors of a continuation: continuations whose jump
    /// operands reach it, found by walking the use lists upward.
    pub fn preds(&self, lam: DefId) -> Vec<DefId> {
        let mut result = Vec::new();
        let mut seen: SmallVec<[DefId; 8]> = SmallVec::new();
        let mut stack: Vec<DefId> = self.uses(lam).iter().map(|u| u.user).collect();

        while let Some(d) = stack.pop() {
            if !self.is_alive(d) || seen.contains(&d) {
                continue;
            }
            seen.push(d);
            if self.def(d).is_lambda() {
                result.push(d);
            } else {
                stack.extend(self.uses(d).iter().map(|u| u.user));
            }
        }
        result
    }

    /// Continuations that jump to `lam` in callee position.
    pub fn direct_callers(&self, lam: DefId) -> Vec<DefId> {
        self.uses(lam)
            .iter()
            .filter(|u| u.index == 0 && self.is_alive(u.user) && self.def(u.user).is_lambda())
            .map(|u| u.user)
            .collect()
    }

    // =========================================================================
    // Consistency checking
    // =========================================================================

    /// Verify graph consistency: operand/use agreement, sealedness, and
    /// interner canonicity. Intended for tests and debugging.
    pub fn verify(&self) -> Result<(), String> {
        for (id, def) in self.defs.iter() {
            for (i, &op) in def.ops.iter().enumerate() {
                if !op.is_valid() {
                    if def.sealed {
                        return Err(format!("{}: unset operand {i} after sealing", self.def_to_string(id)));
                    }
                    continue;
                }
                let Some(target) = self.try_def(op) else {
                    return Err(format!("{}: operand {i} is dead", self.def_to_string(id)));
                };
                if !target.uses.iter().any(|u| u.user == id && u.index == i) {
                    return Err(format!(
                        "{}: operand {i} lacks the matching use entry",
                        self.def_to_string(id)
                    ));
                }
            }
            for u in &def.uses {
                let Some(user) = self.try_def(u.user) else {
                    return Err(format!("{}: use by dead Def", self.def_to_string(id)));
                };
                if user.ops.get(u.index).copied() != Some(id) {
                    return Err(format!(
                        "{}: stale use entry ({}, {})",
                        self.def_to_string(id),
                        u.user,
                        u.index
                    ));
                }
            }
            if let Some(key) = def.structural_key() {
                if self.interner.get(&key) != Some(&id) {
                    return Err(format!(
                        "{}: not the canonical Def for its structural key",
                        self.def_to_string(id)
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
