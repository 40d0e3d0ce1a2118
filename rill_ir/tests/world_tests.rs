//! End-to-end behavior of the builder, rewriter, cleanup and
//! simplification passes.

use rill_ir::{ArithOpKind, BuildError, DefId, DefKind, PrimTypeKind, World};

// =============================================================================
// Literal folding scenarios
// =============================================================================

#[test]
fn add_of_literals_folds_to_literal() {
    let mut w = World::new();
    let a = w.lit(PrimTypeKind::U32, 3);
    let b = w.lit(PrimTypeKind::U32, 4);
    let r = w.arithop(ArithOpKind::Add, a, b).unwrap();
    assert_eq!(w.def(r).lit_bits(), Some(7));
    assert_eq!(w.ty(r), Some(w.prim_type(PrimTypeKind::U32)));
}

#[test]
fn udiv_by_zero_is_bottom() {
    let mut w = World::new();
    let a = w.lit(PrimTypeKind::U32, 10);
    let z = w.lit(PrimTypeKind::U32, 0);
    let r = w.arithop(ArithOpKind::Udiv, a, z).unwrap();
    assert!(w.def(r).is_bottom());
    assert_eq!(w.ty(r), Some(w.prim_type(PrimTypeKind::U32)));

    let s = w.arithop(ArithOpKind::Sdiv, a, z).unwrap();
    assert!(w.def(s).is_bottom());
    let t = w.arithop(ArithOpKind::Srem, a, z).unwrap();
    assert!(w.def(t).is_bottom());
}

#[test]
fn sdiv_reinterprets_bit_patterns() {
    let mut w = World::new();
    let a = w.lit(PrimTypeKind::U32, 0xffff_ffff);
    let b = w.lit(PrimTypeKind::U32, 0x0000_0001);
    let r = w.arithop(ArithOpKind::Sdiv, a, b).unwrap();
    // -1 / 1 == -1 at width 32.
    assert_eq!(w.def(r).lit_bits(), Some(0xffff_ffff));
}

#[test]
fn frem_on_nan_is_a_nan_literal_not_bottom() {
    let mut w = World::new();
    let nan = w.lit_f64(f64::NAN);
    let two = w.lit_f64(2.0);
    let r = w.arithop(ArithOpKind::Frem, nan, two).unwrap();
    assert!(w.def(r).is_literal());
    assert!(!w.def(r).is_bottom());
    let bits = w.def(r).lit_bits().unwrap();
    assert!(f64::from_bits(bits).is_nan());
}

// =============================================================================
// Aggregates
// =============================================================================

#[test]
fn extract_of_tuple_reads_through() {
    let mut w = World::new();
    let u32t = w.prim_type(PrimTypeKind::U32);
    let pi = w.pi(&[u32t, u32t]);
    let lam = w.lambda(pi);
    let a = w.param(lam, 0).unwrap();
    let b = w.param(lam, 1).unwrap();

    let before = w.num_defs();
    let t = w.tuple(&[a, b]).unwrap();
    let r = w.extract(t, 1).unwrap();
    assert_eq!(r, b);
    // Only the tuple (and its sigma) were created; no Extract node.
    assert!(w
        .iter_defs()
        .all(|(_, d)| !matches!(d.kind, DefKind::Extract { .. })));
    assert!(w.num_defs() <= before + 2);
}

#[test]
fn empty_tuple_is_the_unit_value() {
    let mut w = World::new();
    let t = w.tuple(&[]).unwrap();
    assert_eq!(w.ty(t), Some(w.unit()));
    assert!(matches!(
        w.extract(t, 0),
        Err(BuildError::IndexOutOfRange { index: 0, arity: 0 })
    ));
}

#[test]
fn insert_extract_laws_hold_on_opaque_aggregates() {
    let mut w = World::new();
    let u32t = w.prim_type(PrimTypeKind::U32);
    let sigma = w.sigma(&[u32t, u32t]);
    let pi = w.pi(&[sigma, u32t]);
    let lam = w.lambda(pi);
    let agg = w.param(lam, 0).unwrap();
    let v = w.param(lam, 1).unwrap();

    let updated = w.insert(agg, 0, v).unwrap();
    let read_back = w.extract(updated, 0).unwrap();
    let untouched = w.extract(updated, 1).unwrap();

    // Reading the updated slot sees the value; reading the other slot
    // looks through the Insert into the original aggregate.
    assert!(matches!(w.def(updated).kind, DefKind::Insert { index: 0 }));
    assert_eq!(read_back, v);
    assert!(matches!(w.def(untouched).kind, DefKind::Extract { index: 1 }));
    assert_eq!(w.op(untouched, 0), agg);
    assert!(w.verify().is_ok());
}

// =============================================================================
// Structural unification
// =============================================================================

#[test]
fn same_construction_from_two_sites_is_one_object() {
    let mut w = World::new();
    let u32t = w.prim_type(PrimTypeKind::U32);
    let pi = w.pi(&[u32t, u32t]);
    let lam = w.lambda(pi);
    let a = w.param(lam, 0).unwrap();
    let b = w.param(lam, 1).unwrap();

    let site1 = w.arithop(ArithOpKind::Add, a, b).unwrap();
    let site2 = w.arithop(ArithOpKind::Add, a, b).unwrap();
    assert_eq!(site1, site2);

    // The commuted construction also lands on the same object.
    let site3 = w.arithop(ArithOpKind::Add, b, a).unwrap();
    assert_eq!(site1, site3);
}

#[test]
fn identical_worlds_allocate_identical_ids() {
    fn build(w: &mut World) -> Vec<DefId> {
        let u32t = w.prim_type(PrimTypeKind::U32);
        let pi = w.pi(&[u32t]);
        let exit = w.lambda(pi);
        let entry = w.lambda(pi);
        let x = w.param(entry, 0).unwrap();
        let one = w.lit(PrimTypeKind::U32, 1);
        let sum = w.arithop(ArithOpKind::Add, one, x).unwrap();
        w.jump(entry, exit, &[sum]).unwrap();
        vec![exit, entry, x, one, sum]
    }

    let mut w1 = World::new();
    let mut w2 = World::new();
    assert_eq!(build(&mut w1), build(&mut w2));
    assert_eq!(w1.num_defs(), w2.num_defs());
}

// =============================================================================
// Cleanup
// =============================================================================

#[test]
fn unrooted_cycle_is_deleted() {
    let mut w = World::new();
    let l1 = w.lambda(w.pi0());
    let l2 = w.lambda(w.pi0());
    w.jump(l1, l2, &[]).unwrap();
    w.jump(l2, l1, &[]).unwrap();

    w.cleanup();

    assert!(!w.is_alive(l1));
    assert!(!w.is_alive(l2));
    assert!(w.verify().is_ok());
}

#[test]
fn cleanup_twice_is_a_no_op() {
    let mut w = World::new();
    let u32t = w.prim_type(PrimTypeKind::U32);
    let pi = w.pi(&[u32t]);
    let exit = w.lambda(pi);
    w.make_external(exit);
    let entry = w.lambda(pi);
    w.make_external(entry);
    let x = w.param(entry, 0).unwrap();
    let one = w.lit(PrimTypeKind::U32, 1);
    let sum = w.arithop(ArithOpKind::Add, one, x).unwrap();
    w.jump(entry, exit, &[sum]).unwrap();

    // Some garbage to collect.
    let garbage = w.lambda(w.pi0());
    w.jump(garbage, exit, &[one]).unwrap();
    let dead_lit = w.lit(PrimTypeKind::U64, 99);
    let _ = (garbage, dead_lit);

    w.cleanup();
    let first = w.num_defs();
    w.cleanup();
    assert_eq!(w.num_defs(), first);
    assert!(w.is_alive(entry));
    assert!(w.is_alive(exit));
    assert!(w.verify().is_ok());
}

#[test]
fn survivors_are_reachable_from_externals() {
    let mut w = World::new();
    let u32t = w.prim_type(PrimTypeKind::U32);
    let pi = w.pi(&[u32t]);
    let exit = w.lambda(pi);
    w.make_external(exit);
    let entry = w.lambda(pi);
    w.make_external(entry);
    let x = w.param(entry, 0).unwrap();
    w.jump(entry, exit, &[x]).unwrap();

    // An unrooted island.
    let island = w.lambda(pi);
    let island_x = w.param(island, 0).unwrap();
    let ten = w.lit(PrimTypeKind::U32, 10);
    let island_sum = w.arithop(ArithOpKind::Add, ten, island_x).unwrap();
    w.jump(island, island, &[island_sum]).unwrap();

    w.cleanup();

    assert!(w.is_alive(entry));
    assert!(w.is_alive(exit));
    assert!(w.is_alive(x));
    assert!(!w.is_alive(island));
    assert!(!w.is_alive(island_x));
    assert!(!w.is_alive(island_sum));
    assert!(w.verify().is_ok());
}

// =============================================================================
// Rewriter idempotence
// =============================================================================

#[test]
fn replace_with_itself_is_a_no_op() {
    let mut w = World::new();
    let u32t = w.prim_type(PrimTypeKind::U32);
    let pi = w.pi(&[u32t]);
    let lam = w.lambda(pi);
    let x = w.param(lam, 0).unwrap();
    let one = w.lit(PrimTypeKind::U32, 1);
    let sum = w.arithop(ArithOpKind::Add, one, x).unwrap();

    let before = w.num_defs();
    w.replace(sum, sum);
    assert!(w.is_alive(sum));
    assert_eq!(w.num_defs(), before);
    assert!(w.verify().is_ok());
}

// =============================================================================
// Jump-chain fusion (cfg_simplify through opt)
// =============================================================================

#[test]
fn chain_through_single_use_callee_fuses() {
    let mut w = World::new();
    let u32t = w.prim_type(PrimTypeKind::U32);
    let pi = w.pi(&[u32t]);

    // exit is l2's original target.
    let exit = w.lambda(pi);
    w.make_external(exit);

    // l2 tail-calls exit with its param.
    let l2 = w.lambda(pi);
    let x2 = w.param(l2, 0).unwrap();
    w.jump(l2, exit, &[x2]).unwrap();

    // l1 tail-calls l2 (the only caller of l2) with param + 1.
    let l1 = w.lambda(pi);
    let x1 = w.param(l1, 0).unwrap();
    let one = w.lit(PrimTypeKind::U32, 1);
    let sum = w.arithop(ArithOpKind::Add, one, x1).unwrap();
    w.jump(l1, l2, &[sum]).unwrap();

    // External l0 calls l1.
    let l0 = w.lambda(pi);
    w.make_external(l0);
    let x0 = w.param(l0, 0).unwrap();
    w.jump(l0, l1, &[x0]).unwrap();

    w.cfg_simplify();
    w.cleanup();

    // The whole chain collapsed into one external continuation that
    // tail-calls exit with the substituted argument add(1, param).
    let externals = w.externals();
    assert_eq!(externals.len(), 2);
    let fused = *externals
        .iter()
        .find(|&&l| !w.ops(l).is_empty() && w.op(l, 0) == exit)
        .expect("a continuation jumping straight to exit");
    let arg = w.op(fused, 1);
    assert!(matches!(w.def(arg).kind, DefKind::Arith(ArithOpKind::Add)));
    let fused_param = w.param(fused, 0).unwrap();
    assert_eq!(w.op(arg, 0), one);
    assert_eq!(w.op(arg, 1), fused_param);

    assert!(!w.is_alive(l1));
    assert!(!w.is_alive(l2));
    assert!(w.verify().is_ok());
}

// =============================================================================
// Bottom propagation through aggregate ops
// =============================================================================

#[test]
fn bottom_flows_through_tuples_and_selects() {
    let mut w = World::new();
    let u32t = w.prim_type(PrimTypeKind::U32);
    let bot = w.bottom(u32t);
    let one = w.lit(PrimTypeKind::U32, 1);

    let t = w.tuple(&[one, bot]).unwrap();
    assert!(w.def(t).is_bottom());

    let pi = w.pi(&[w.type_bool()]);
    let lam = w.lambda(pi);
    let c = w.param(lam, 0).unwrap();
    let s = w.select(c, one, bot).unwrap();
    assert!(w.def(s).is_bottom());

    let bc = w.bottom(w.type_bool());
    let s2 = w.select(bc, one, one).unwrap();
    // select(c, x, x) == x fires before the Bottom rule.
    assert_eq!(s2, one);
}
