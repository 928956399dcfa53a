use assoc_search::{
    filter::{should_skip_expression, SkipReason},
    prover::{IsAssociative, Orientation, DEFAULT_TIMEOUT_MS},
    prove_associativity, AssociativeIds, AssocTuple, Arith, Bindings, Encoding, SlotExpr, Tree,
    Value, ValueType, VarName,
};
use egg::RecExpr;
use rand::{Rng, SeedableRng};

fn parse(exprs: &[&str]) -> Vec<RecExpr<Arith>> {
    exprs.iter().map(|s| s.parse().unwrap()).collect()
}

fn prove(exprs: &[&str], ty: ValueType) -> (IsAssociative, AssociativeIds) {
    let exprs = parse(exprs);
    let bindings = Bindings::new(exprs.len(), 1);
    prove_associativity(&exprs, &bindings, ty, Encoding::Bitvector, DEFAULT_TIMEOUT_MS)
}

fn plain_tuple(exprs: &[&str]) -> AssocTuple {
    AssocTuple(
        parse(exprs)
            .iter()
            .map(|e| SlotExpr::Plain(Tree::from_recexpr(e, exprs.len()).unwrap()))
            .collect(),
    )
}

fn assert_left_identity(tuple: &AssocTuple, ids: &AssociativeIds, ty: ValueType) {
    assert_eq!(ids.orientation, Orientation::Left);
    let e: Vec<Value> = ids.identities.iter().map(|id| id.value).collect();
    let mut rng = rand_pcg::Pcg64::seed_from_u64(5);
    for _ in 0..1000 {
        let y: Vec<Value> = (0..tuple.len()).map(|_| ty.wrap(rng.gen())).collect();
        let k = [ty.wrap(rng.gen())];
        assert_eq!(tuple.evaluate(ty, &e, &y, &k), y, "{} with identity {}", tuple, ids);
    }
}

/// The counterexample must make the two groupings differ.
fn assert_genuine_counterexample(tuple: &AssocTuple, verdict: &IsAssociative, ty: ValueType) {
    let cex = match verdict {
        IsAssociative::No(cex) => cex,
        other => panic!("expected {} to be disproved, got {:?}", tuple, other),
    };
    let n = tuple.len();
    let read = |f: fn(usize) -> VarName| -> Vec<Value> {
        (0..n).map(|i| cex.get(f(i)).unwrap()).collect()
    };
    let (x, y, z) = (read(VarName::x), read(VarName::y), read(VarName::z));
    let k = [cex.get(VarName::k(0)).unwrap()];
    let lhs = tuple.evaluate(ty, &tuple.evaluate(ty, &x, &y, &k), &z, &k);
    let rhs = tuple.evaluate(ty, &x, &tuple.evaluate(ty, &y, &z, &k), &k);
    assert_ne!(lhs, rhs, "{} is associative at {}", tuple, cex);
}

#[test]
fn max_has_int_min_identity() {
    let ty = ValueType::I32;
    let (verdict, ids) = prove(&["(max x0 y0)"], ty);
    assert_eq!(verdict, IsAssociative::Yes);
    assert_eq!(ids.identities[0].value, ty.min_value());
    assert_eq!(ids.to_string(), "{ -2147483648 }");
    assert_left_identity(&plain_tuple(&["(max x0 y0)"]), &ids, ty);
}

#[test]
fn min_has_int_max_identity() {
    let ty = ValueType::I32;
    let (verdict, ids) = prove(&["(min x0 y0)"], ty);
    assert_eq!(verdict, IsAssociative::Yes);
    assert_eq!(ids.identities[0].value, ty.max_value());
    assert_left_identity(&plain_tuple(&["(min x0 y0)"]), &ids, ty);
}

#[test]
fn add_has_zero_identity() {
    let ty = ValueType::I32;
    let (verdict, ids) = prove(&["(+ x0 y0)"], ty);
    assert_eq!(verdict, IsAssociative::Yes);
    assert_eq!(ids.identities[0].value, 0);
    assert_left_identity(&plain_tuple(&["(+ x0 y0)"]), &ids, ty);
}

#[test]
fn sub_is_disproved() {
    let ty = ValueType::I32;
    let (verdict, ids) = prove(&["(- x0 y0)"], ty);
    assert_eq!(ids.orientation, Orientation::Unknown);
    assert!(ids.identities.is_empty());
    assert_genuine_counterexample(&plain_tuple(&["(- x0 y0)"]), &verdict, ty);
}

#[test]
fn cross_slot_tuple_is_disproved_jointly() {
    let ty = ValueType::I32;
    let exprs = ["(max x0 y1)", "(min x0 y1)"];
    let (verdict, _) = prove(&exprs, ty);
    assert_genuine_counterexample(&plain_tuple(&exprs), &verdict, ty);
}

#[test]
fn argmin_is_associative() {
    let ty = ValueType::I32;
    let exprs = ["(min x0 y0)", "(select (< x0 y0) x1 y1)"];
    let (verdict, ids) = prove(&exprs, ty);
    assert_eq!(verdict, IsAssociative::Yes);
    assert_eq!(ids.identities[0].value, ty.max_value());
    assert!(!ids.identities[0].defaulted);
    // the index slot is never chosen once the minimum is the largest value
    assert!(ids.identities[1].defaulted);
    assert_eq!(ids.identities[1].value, 0);
    assert_eq!(ids.to_string(), "{ 2147483647, 0 (unconstrained) }");
    let tuple = AssocTuple(vec![
        SlotExpr::Plain(Tree::from_recexpr(&"(min x0 y0)".parse().unwrap(), 2).unwrap()),
        SlotExpr::Select {
            cond: Tree::from_recexpr(&"(< x0 y0)".parse().unwrap(), 2).unwrap(),
            then: Tree::from_recexpr(&"x1".parse().unwrap(), 2).unwrap(),
            otherwise: Tree::from_recexpr(&"y1".parse().unwrap(), 2).unwrap(),
        },
    ]);
    assert_left_identity(&tuple, &ids, ty);
}

#[test]
fn complex_multiplication_on_bytes() {
    let ty = ValueType::uint(8);
    let exprs = ["(- (* x0 y0) (* x1 y1))", "(+ (* x0 y1) (* x1 y0))"];
    let exprs_parsed = parse(&exprs);
    let (verdict, ids) = prove_associativity(
        &exprs_parsed,
        &Bindings::new(2, 1),
        ty,
        Encoding::Bitvector,
        60_000,
    );
    assert_eq!(verdict, IsAssociative::Yes);
    assert_eq!(ids.to_string(), "{ 1, 0 }");
    assert_left_identity(&plain_tuple(&exprs), &ids, ty);
}

#[test]
fn independent_slots_are_not_defaulted() {
    let (_, ids) = prove(&["(+ x0 y0)", "(max x1 y1)"], ValueType::uint(8));
    assert_eq!(ids.to_string(), "{ 0, 0 }");
    assert!(ids.identities.iter().all(|id| !id.defaulted));
}

#[test]
fn integer_encoding_ignores_wraparound() {
    let exprs = parse(&["(max x0 y0)"]);
    let bindings = Bindings::new(1, 1);
    let (bv, bv_ids) = prove_associativity(
        &exprs,
        &bindings,
        ValueType::I32,
        Encoding::Bitvector,
        DEFAULT_TIMEOUT_MS,
    );
    let (int, int_ids) = prove_associativity(
        &exprs,
        &bindings,
        ValueType::I32,
        Encoding::Integer,
        DEFAULT_TIMEOUT_MS,
    );
    assert_eq!(bv, IsAssociative::Yes);
    assert_eq!(int, IsAssociative::Yes);
    assert_eq!(bv_ids.orientation, Orientation::Left);
    // unbounded integers have no least element
    assert_eq!(int_ids.orientation, Orientation::Unknown);
}

#[test]
fn signedness_changes_the_identity() {
    let (_, signed) = prove(&["(max x0 y0)"], ValueType::int(8));
    let (_, unsigned) = prove(&["(max x0 y0)"], ValueType::uint(8));
    assert_eq!(signed.to_string(), "{ -128 }");
    assert_eq!(unsigned.to_string(), "{ 0 }");
}

#[test]
fn self_subtraction_never_reaches_the_prover() {
    let bindings = Bindings::new(1, 1);
    let slot = SlotExpr::Plain(Tree::from_recexpr(&"(- x0 x0)".parse().unwrap(), 1).unwrap());
    assert_eq!(
        should_skip_expression(&slot, &bindings),
        Err(SkipReason::MissingOperand {
            uses_x: true,
            uses_y: false
        })
    );
}

#[test]
#[should_panic]
fn misnamed_variables_are_fatal() {
    let exprs = parse(&["(+ x0 y0)"]);
    let bindings = Bindings {
        xs: vec![VarName::y(0)],
        ys: vec![VarName::x(0)],
        ks: vec![],
    };
    prove_associativity(
        &exprs,
        &bindings,
        ValueType::I32,
        Encoding::Bitvector,
        DEFAULT_TIMEOUT_MS,
    );
}
