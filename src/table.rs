//! Associative operators on `i32` that are already known, grouped by the root
//! operator of their first slot.

use egg::RecExpr;
use lazy_static::lazy_static;

use crate::{grammar::Op, lang::Arith, HashMap};

const I32_MAX: i64 = i32::MAX as i64;
const I32_MIN: i64 = i32::MIN as i64;

/// An operator and its identity, one entry per slot. `None` marks a slot
/// whose identity is unconstrained.
#[derive(Clone, Debug)]
pub struct KnownOp {
    pub exprs: Vec<RecExpr<Arith>>,
    pub identities: Vec<Option<i64>>,
}

const ENTRIES: &[(&[&str], &[Option<i64>])] = &[
    (&["(+ x0 y0)"], &[Some(0)]),
    (&["(+ (* x0 y0) (+ x0 y0))"], &[Some(0)]),
    (&["(* x0 y0)"], &[Some(1)]),
    (&["(max x0 y0)"], &[Some(I32_MIN)]),
    (&["(min x0 y0)"], &[Some(I32_MAX)]),
    // argmax, ties go to the right operand
    (
        &["(max x0 y0)", "(select (< y0 x0) x1 y1)"],
        &[Some(I32_MIN), None],
    ),
    // argmin
    (
        &["(min x0 y0)", "(select (< x0 y0) x1 y1)"],
        &[Some(I32_MAX), None],
    ),
    // complex multiplication
    (
        &["(- (* x0 y0) (* x1 y1))", "(+ (* x0 y1) (* x1 y0))"],
        &[Some(1), Some(0)],
    ),
];

fn root_op(expr: &RecExpr<Arith>) -> Option<Op> {
    expr.as_ref().last()?.op()
}

fn build_table() -> HashMap<Op, Vec<KnownOp>> {
    let mut table: HashMap<Op, Vec<KnownOp>> = HashMap::default();
    for (exprs, identities) in ENTRIES {
        let exprs: Vec<RecExpr<Arith>> = exprs
            .iter()
            .map(|s| match s.parse() {
                Ok(expr) => expr,
                Err(e) => panic!("bad table entry {}: {}", s, e),
            })
            .collect();
        assert_eq!(exprs.len(), identities.len());
        if let Some(op) = root_op(&exprs[0]) {
            table.entry(op).or_default().push(KnownOp {
                exprs,
                identities: identities.to_vec(),
            });
        }
    }
    table
}

lazy_static! {
    static ref TABLE: HashMap<Op, Vec<KnownOp>> = build_table();
}

/// All known operators whose first slot is rooted at `root`.
pub fn known_ops(root: Op) -> &'static [KnownOp] {
    TABLE.get(&root).map(|ops| ops.as_slice()).unwrap_or(&[])
}

/// The table entry that is syntactically equal to `exprs`, if any.
pub fn lookup(exprs: &[RecExpr<Arith>]) -> Option<&'static KnownOp> {
    let root = root_op(exprs.first()?)?;
    let rendered: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
    known_ops(root).iter().find(|known| {
        known.exprs.len() == rendered.len()
            && known
                .exprs
                .iter()
                .zip(&rendered)
                .all(|(k, r)| k.to_string() == *r)
    })
}
