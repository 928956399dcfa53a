use std::time::Duration;

use egg::{rewrite as rw, AstSize, CostFunction, Extractor, Id, Language, RecExpr, Rewrite, Runner};
use lazy_static::lazy_static;

use crate::grammar::{Op, Role, VarName};

egg::define_language! {
  pub enum Arith {
    "+" = Add([Id; 2]),
    "-" = Sub([Id; 2]),
    "*" = Mul([Id; 2]),
    "min" = Min([Id; 2]),
    "max" = Max([Id; 2]),
    "<" = Lt([Id; 2]),
    ">" = Gt([Id; 2]),
    "==" = Eq([Id; 2]),
    "!=" = Ne([Id; 2]),
    "select" = Select([Id; 3]),
    Lit(i64),
    Var(VarName),
  }
}

impl Arith {
    pub fn binary(op: Op, args: [Id; 2]) -> Self {
        match op {
            Op::Add => Arith::Add(args),
            Op::Sub => Arith::Sub(args),
            Op::Mul => Arith::Mul(args),
            Op::Min => Arith::Min(args),
            Op::Max => Arith::Max(args),
            Op::Lt => Arith::Lt(args),
            Op::Gt => Arith::Gt(args),
            Op::Eq => Arith::Eq(args),
            Op::Ne => Arith::Ne(args),
        }
    }

    /// The binary operator of this node, if it is one.
    pub fn op(&self) -> Option<Op> {
        match self {
            Arith::Add(_) => Some(Op::Add),
            Arith::Sub(_) => Some(Op::Sub),
            Arith::Mul(_) => Some(Op::Mul),
            Arith::Min(_) => Some(Op::Min),
            Arith::Max(_) => Some(Op::Max),
            Arith::Lt(_) => Some(Op::Lt),
            Arith::Gt(_) => Some(Op::Gt),
            Arith::Eq(_) => Some(Op::Eq),
            Arith::Ne(_) => Some(Op::Ne),
            Arith::Select(_) | Arith::Lit(_) | Arith::Var(_) => None,
        }
    }
}

/// Rewrites that hold for every width and signedness under wraparound.
pub fn rules() -> Vec<Rewrite<Arith, ()>> {
    vec![
        rw!("comm-add"; "(+ ?a ?b)" => "(+ ?b ?a)"),
        rw!("comm-mul"; "(* ?a ?b)" => "(* ?b ?a)"),
        rw!("comm-min"; "(min ?a ?b)" => "(min ?b ?a)"),
        rw!("comm-max"; "(max ?a ?b)" => "(max ?b ?a)"),
        rw!("comm-eq"; "(== ?a ?b)" => "(== ?b ?a)"),
        rw!("comm-ne"; "(!= ?a ?b)" => "(!= ?b ?a)"),
        rw!("assoc-add"; "(+ ?a (+ ?b ?c))" => "(+ (+ ?a ?b) ?c)"),
        rw!("assoc-add-rev"; "(+ (+ ?a ?b) ?c)" => "(+ ?a (+ ?b ?c))"),
        rw!("assoc-mul"; "(* ?a (* ?b ?c))" => "(* (* ?a ?b) ?c)"),
        rw!("assoc-mul-rev"; "(* (* ?a ?b) ?c)" => "(* ?a (* ?b ?c))"),
        rw!("assoc-min"; "(min ?a (min ?b ?c))" => "(min (min ?a ?b) ?c)"),
        rw!("assoc-min-rev"; "(min (min ?a ?b) ?c)" => "(min ?a (min ?b ?c))"),
        rw!("assoc-max"; "(max ?a (max ?b ?c))" => "(max (max ?a ?b) ?c)"),
        rw!("assoc-max-rev"; "(max (max ?a ?b) ?c)" => "(max ?a (max ?b ?c))"),
        rw!("add-zero"; "(+ ?a 0)" => "?a"),
        rw!("sub-zero"; "(- ?a 0)" => "?a"),
        rw!("mul-one"; "(* ?a 1)" => "?a"),
        rw!("mul-zero"; "(* ?a 0)" => "0"),
        rw!("sub-self"; "(- ?a ?a)" => "0"),
        rw!("sub-cancel"; "(+ (- ?a ?b) ?b)" => "?a"),
        rw!("add-cancel"; "(- (+ ?a ?b) ?b)" => "?a"),
        rw!("sub-sub-cancel"; "(- ?a (- ?a ?b))" => "?b"),
        rw!("sub-sub"; "(- (- ?a ?b) ?c)" => "(- ?a (+ ?b ?c))"),
        rw!("sub-of-sub"; "(- ?a (- ?b ?c))" => "(- (+ ?a ?c) ?b)"),
        rw!("add-of-sub"; "(+ ?a (- ?b ?c))" => "(- (+ ?a ?b) ?c)"),
        rw!("factor-add"; "(+ (* ?a ?b) (* ?a ?c))" => "(* ?a (+ ?b ?c))"),
        rw!("factor-sub"; "(- (* ?a ?b) (* ?a ?c))" => "(* ?a (- ?b ?c))"),
        rw!("min-self"; "(min ?a ?a)" => "?a"),
        rw!("max-self"; "(max ?a ?a)" => "?a"),
        rw!("min-absorb"; "(min ?a (max ?a ?b))" => "?a"),
        rw!("max-absorb"; "(max ?a (min ?a ?b))" => "?a"),
        rw!("min-distrib"; "(min (max ?a ?b) (max ?a ?c))" => "(max ?a (min ?b ?c))"),
        rw!("max-distrib"; "(max (min ?a ?b) (min ?a ?c))" => "(min ?a (max ?b ?c))"),
        rw!("min-plus-max"; "(+ (min ?a ?b) (max ?a ?b))" => "(+ ?a ?b)"),
        rw!("min-times-max"; "(* (min ?a ?b) (max ?a ?b))" => "(* ?a ?b)"),
        rw!("gt-flip"; "(> ?a ?b)" => "(< ?b ?a)"),
        rw!("select-same"; "(select ?c ?a ?a)" => "?a"),
    ]
}

lazy_static! {
    static ref RULES: Vec<Rewrite<Arith, ()>> = rules();
}

/// Grow an e-graph from `expr` with the simplification rules.
pub fn saturate(expr: &RecExpr<Arith>) -> Runner<Arith, ()> {
    Runner::default()
        .with_iter_limit(6)
        .with_node_limit(5_000)
        .with_time_limit(Duration::from_secs(2))
        .with_expr(expr)
        .run(RULES.iter())
}

/// The smallest expression equivalent to `expr` that the rules can find.
pub fn simplify(expr: &RecExpr<Arith>) -> RecExpr<Arith> {
    smallest(&saturate(expr))
}

pub fn smallest(runner: &Runner<Arith, ()>) -> RecExpr<Arith> {
    Extractor::new(&runner.egraph, AstSize)
        .find_best(runner.roots[0])
        .1
}

/// Prefers expressions that mention one variable fewer times, then smaller ones.
pub struct Occurrences(pub VarName);

impl CostFunction<Arith> for Occurrences {
    type Cost = (usize, usize);

    fn cost<C>(&mut self, enode: &Arith, mut costs: C) -> Self::Cost
    where
        C: FnMut(Id) -> Self::Cost,
    {
        let own = match enode {
            Arith::Var(v) if *v == self.0 => 1,
            _ => 0,
        };
        enode.fold((own, 1), |(count, size), id| {
            let (c, s) = costs(id);
            (count + c, size + s)
        })
    }
}

/// Rewrite the saturated expression so that `var` occurs as few times as
/// possible.
pub fn solve_for(runner: &Runner<Arith, ()>, var: VarName) -> RecExpr<Arith> {
    Extractor::new(&runner.egraph, Occurrences(var))
        .find_best(runner.roots[0])
        .1
}

/// Fold over the expression as a tree, so shared subterms count once per use.
fn tree_fold(expr: &RecExpr<Arith>, leaf: impl Fn(&Arith) -> usize) -> usize {
    let nodes = expr.as_ref();
    let mut totals: Vec<usize> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let total = node.fold(leaf(node), |acc, id| acc + totals[usize::from(id)]);
        totals.push(total);
    }
    totals.last().copied().unwrap_or(0)
}

/// Number of nodes of the expression written out as a tree.
pub fn tree_size(expr: &RecExpr<Arith>) -> usize {
    tree_fold(expr, |_| 1)
}

/// Number of times `var` appears in the expression written out as a tree.
pub fn occurrences(expr: &RecExpr<Arith>, var: VarName) -> usize {
    tree_fold(expr, |n| matches!(n, Arith::Var(v) if *v == var) as usize)
}

pub fn uses_vars(expr: &RecExpr<Arith>, role: Role) -> bool {
    expr.as_ref()
        .iter()
        .any(|n| matches!(n, Arith::Var(v) if v.role == role))
}

/// Every variable in `expr`, each once, in order of first appearance.
pub fn vars(expr: &RecExpr<Arith>) -> Vec<VarName> {
    let mut out = vec![];
    for node in expr.as_ref() {
        if let Arith::Var(v) = node {
            if !out.contains(v) {
                out.push(*v);
            }
        }
    }
    out
}
