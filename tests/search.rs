use assoc_search::{
    filter::should_skip_expression,
    prover::{IsAssociative, DEFAULT_TIMEOUT_MS},
    prove_associativity,
    screen::{fast_check_associativity, ScreenVerdict},
    time_fn_call,
    tree::generate,
    AssocTuple, Campaign, Encoding, HashSet, Orientation, Search, SearchConfig, ValueType,
};
use rand::SeedableRng;

/// Every tuple the screen calls non-associative is disproved by the prover.
#[test]
fn screen_rejections_are_sound() {
    let grammar = Campaign::Single.grammar();
    let bindings = grammar.bindings();
    let ty = ValueType::I32;
    let mut rng = rand_pcg::Pcg64::seed_from_u64(3);
    let mut rejected = 0;
    for leaves in 2..=3 {
        for index in 0..grammar.index_bound(leaves) {
            if rejected == 40 {
                return;
            }
            let (slot, remainder) = generate(&grammar, leaves, index);
            if remainder != 0 {
                continue;
            }
            let expr = match should_skip_expression(&slot, &bindings) {
                Ok(expr) => expr,
                Err(_) => continue,
            };
            let tuple = AssocTuple(vec![slot]);
            let verdict = fast_check_associativity(
                &tuple,
                ty,
                grammar.constants,
                250,
                &mut rng,
                &HashSet::default(),
            );
            if let ScreenVerdict::NotAssociative(_) = verdict {
                rejected += 1;
                let (proved, _) = prove_associativity(
                    &[expr],
                    &bindings,
                    ty,
                    Encoding::Bitvector,
                    DEFAULT_TIMEOUT_MS,
                );
                assert!(
                    matches!(proved, IsAssociative::No(_)),
                    "{} rejected by the screen but the prover says {:?}",
                    tuple,
                    proved
                );
            }
        }
    }
    assert!(rejected > 0);
}

#[test]
fn single_search_finds_the_classics() {
    let cfg = SearchConfig::default(Campaign::Single)
        .with_leaves(2, 2)
        .unwrap()
        .with_morton(0, 1)
        .with_iter_tile(32);
    let findings = time_fn_call!("single search", Search::new(cfg).run());
    let lines: Vec<String> = findings.iter().map(|f| f.tuple.to_string()).collect();
    for expected in &["{ (+ x0 y0) }", "{ (* x0 y0) }", "{ (min x0 y0) }", "{ (max x0 y0) }"] {
        assert!(
            lines.iter().any(|l| l == expected),
            "{} missing from {:?}",
            expected,
            lines
        );
    }
    assert!(!lines.iter().any(|l| l.contains('-')), "{:?}", lines);
    for finding in &findings {
        assert_ne!(finding.ids.orientation, Orientation::Unknown);
        assert_eq!(finding.coordinates.len(), 1);
    }
}

#[test]
fn tuple_search_pairs_slots() {
    let cfg = SearchConfig::default(Campaign::Tuple)
        .with_ty(ValueType::uint(8))
        .with_leaves(2, 2)
        .unwrap()
        .with_morton(0, 0)
        .with_iter_tile(60);
    let findings = Search::new(cfg).run();
    let pair = findings
        .iter()
        .find(|f| f.tuple.to_string() == "{ (+ x0 y0), (+ x1 y1) }")
        .unwrap();
    assert_eq!(pair.verdict, IsAssociative::Yes);
    assert_eq!(pair.ids.to_string(), "{ 0, 0 }");
    assert_eq!(pair.coordinates, vec![(2, 25), (2, 55)]);
    assert!(pair
        .to_string()
        .starts_with("Leaves0: 2, i0: 25, Leaves1: 2, i1: 55, { (+ x0 y0), (+ x1 y1) } -> "));
}

#[test]
fn decomposable_pairs_can_be_skipped() {
    let cfg = SearchConfig::default(Campaign::Tuple)
        .with_ty(ValueType::uint(8))
        .with_leaves(2, 2)
        .unwrap()
        .with_morton(0, 0)
        .with_iter_tile(60)
        .with_decompose(true);
    let findings = Search::new(cfg).run();
    assert!(findings
        .iter()
        .all(|f| f.tuple.to_string() != "{ (+ x0 y0), (+ x1 y1) }"));
}

#[test]
fn target_stops_the_search() {
    let cfg = SearchConfig::default(Campaign::Tuple)
        .with_ty(ValueType::uint(8))
        .with_leaves(2, 2)
        .unwrap()
        .with_morton(0, 3)
        .with_iter_tile(60)
        .with_target("(+ x0 y0); (+ x0 y0)")
        .unwrap();
    let findings = Search::new(cfg).run();
    // slot 0 never gets past index 25
    assert!(findings.iter().all(|f| f.coordinates[0].1 <= 25));
}
