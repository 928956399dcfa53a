//! Exact associativity proofs and identity synthesis.
//!
//! Comparisons lower to the values 0 and 1 and `select` tests its condition
//! against zero. Under the bitvector encoding a lowered expression computes
//! exactly what [`crate::tree::SlotExpr::evaluate`] computes; the integer
//! encoding drops the wraparound.

use std::{fmt, str::FromStr};

use egg::RecExpr;
use itertools::Itertools;
use z3::ast::{Ast, Bool, Int, BV};

use crate::{
    grammar::{Bindings, VarName},
    lang::{vars, Arith},
    value::{Value, ValueType},
    HashMap,
};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IsAssociative {
    Yes,
    /// Disproved. Carries an assignment on which the groupings differ.
    No(Counterexample),
    /// The solver gave up before the timeout.
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counterexample {
    pub ty: ValueType,
    pub assignment: Vec<(VarName, Value)>,
}

impl Counterexample {
    pub fn get(&self, var: VarName) -> Option<Value> {
        self.assignment
            .iter()
            .find(|(v, _)| *v == var)
            .map(|(_, value)| *value)
    }
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.ty;
        write!(
            f,
            "{}",
            self.assignment
                .iter()
                .map(|(v, value)| format!("{} = {}", v, ty.display(*value)))
                .join(", ")
        )
    }
}

/// Which side the identity element goes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// `f(e, y) = y`
    Left,
    /// `f(x, e) = x`
    Right,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identity {
    pub value: Value,
    pub ty: ValueType,
    /// Any value works in this slot once the others are fixed; zero was
    /// picked.
    pub defaulted: bool,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty.display(self.value))?;
        if self.defaulted {
            write!(f, " (unconstrained)")?;
        }
        Ok(())
    }
}

/// The identity found for a tuple, one element per slot. `identities` is
/// empty when the orientation is unknown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociativeIds {
    pub orientation: Orientation,
    pub identities: Vec<Identity>,
}

impl AssociativeIds {
    pub fn none() -> Self {
        Self {
            orientation: Orientation::Unknown,
            identities: vec![],
        }
    }
}

impl fmt::Display for AssociativeIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ {} }}", self.identities.iter().join(", "))
    }
}

/// How slot values are represented in the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Fixed-width bitvectors. Wraps exactly like the interpreter.
    Bitvector,
    /// Unbounded integers. Comparisons ignore signedness and nothing wraps.
    Integer,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Bitvector
    }
}

impl FromStr for Encoding {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bv" | "bitvector" => Ok(Encoding::Bitvector),
            "int" | "integer" => Ok(Encoding::Integer),
            _ => Err("Invalid encoding.".to_string()),
        }
    }
}

/// A solver sort that slot expressions can be lowered into.
pub trait Term<'ctx>: Ast<'ctx> + Clone {
    fn constant(ctx: &'ctx z3::Context, ty: ValueType, name: &str) -> Self;
    fn literal(ctx: &'ctx z3::Context, ty: ValueType, value: i64) -> Self;
    fn plus(&self, other: &Self) -> Self;
    fn minus(&self, other: &Self) -> Self;
    fn times(&self, other: &Self) -> Self;
    fn less_than(&self, other: &Self, ty: ValueType) -> Bool<'ctx>;
    /// The numeral this term denotes, brought into `ty`.
    fn numeral(&self, ty: ValueType) -> Option<Value>;
}

impl<'ctx> Term<'ctx> for BV<'ctx> {
    fn constant(ctx: &'ctx z3::Context, ty: ValueType, name: &str) -> Self {
        BV::new_const(ctx, name, ty.bits())
    }

    fn literal(ctx: &'ctx z3::Context, ty: ValueType, value: i64) -> Self {
        BV::from_i64(ctx, value, ty.bits())
    }

    fn plus(&self, other: &Self) -> Self {
        self.bvadd(other)
    }

    fn minus(&self, other: &Self) -> Self {
        self.bvsub(other)
    }

    fn times(&self, other: &Self) -> Self {
        self.bvmul(other)
    }

    fn less_than(&self, other: &Self, ty: ValueType) -> Bool<'ctx> {
        if ty.is_signed() {
            self.bvslt(other)
        } else {
            self.bvult(other)
        }
    }

    fn numeral(&self, ty: ValueType) -> Option<Value> {
        self.as_u64().map(|raw| ty.wrap(raw))
    }
}

impl<'ctx> Term<'ctx> for Int<'ctx> {
    fn constant(ctx: &'ctx z3::Context, _ty: ValueType, name: &str) -> Self {
        Int::new_const(ctx, name)
    }

    fn literal(ctx: &'ctx z3::Context, _ty: ValueType, value: i64) -> Self {
        Int::from_i64(ctx, value)
    }

    fn plus(&self, other: &Self) -> Self {
        Int::add(self.get_ctx(), &[self, other])
    }

    fn minus(&self, other: &Self) -> Self {
        Int::sub(self.get_ctx(), &[self, other])
    }

    fn times(&self, other: &Self) -> Self {
        Int::mul(self.get_ctx(), &[self, other])
    }

    fn less_than(&self, other: &Self, _ty: ValueType) -> Bool<'ctx> {
        self.lt(other)
    }

    fn numeral(&self, ty: ValueType) -> Option<Value> {
        self.as_i64().map(|v| ty.from_i64(v))
    }
}

/// Build the solver term for `expr`, looking up each variable in `env`.
///
/// Panics on a variable missing from `env`.
pub fn lower<'ctx, T: Term<'ctx>>(
    ctx: &'ctx z3::Context,
    ty: ValueType,
    expr: &RecExpr<Arith>,
    env: &HashMap<VarName, T>,
) -> T {
    let zero = T::literal(ctx, ty, 0);
    let one = T::literal(ctx, ty, 1);
    let mut buf: Vec<T> = vec![];
    for node in expr.as_ref().iter() {
        let term = match node {
            Arith::Lit(c) => T::literal(ctx, ty, *c),
            Arith::Var(v) => match env.get(v) {
                Some(term) => term.clone(),
                None => panic!("no binding for {}", v),
            },
            Arith::Select([c, t, e]) => {
                let c = &buf[usize::from(*c)];
                c._eq(&zero)
                    .ite(&buf[usize::from(*e)], &buf[usize::from(*t)])
            }
            Arith::Add([x, y])
            | Arith::Sub([x, y])
            | Arith::Mul([x, y])
            | Arith::Min([x, y])
            | Arith::Max([x, y])
            | Arith::Lt([x, y])
            | Arith::Gt([x, y])
            | Arith::Eq([x, y])
            | Arith::Ne([x, y]) => {
                let l = &buf[usize::from(*x)];
                let r = &buf[usize::from(*y)];
                match node {
                    Arith::Add(_) => l.plus(r),
                    Arith::Sub(_) => l.minus(r),
                    Arith::Mul(_) => l.times(r),
                    Arith::Min(_) => r.less_than(l, ty).ite(r, l),
                    Arith::Max(_) => l.less_than(r, ty).ite(r, l),
                    Arith::Lt(_) => l.less_than(r, ty).ite(&one, &zero),
                    Arith::Gt(_) => r.less_than(l, ty).ite(&one, &zero),
                    Arith::Eq(_) => l._eq(r).ite(&one, &zero),
                    _ => l._eq(r).ite(&zero, &one),
                }
            }
        };
        buf.push(term);
    }
    match buf.pop() {
        Some(root) => root,
        None => panic!("cannot lower an empty expression"),
    }
}

/// Symbolic constants for one prover query, plus the tuple being checked.
struct Query<'a, 'ctx, T> {
    ctx: &'ctx z3::Context,
    ty: ValueType,
    exprs: &'a [RecExpr<Arith>],
    bindings: &'a Bindings,
    ks: Vec<T>,
}

impl<'a, 'ctx, T: Term<'ctx>> Query<'a, 'ctx, T> {
    fn consts(&self, names: impl Iterator<Item = VarName>) -> Vec<T> {
        names
            .map(|v| T::constant(self.ctx, self.ty, &v.to_string()))
            .collect()
    }

    /// `f(x, y)` with the tuple's x and y slots bound to the given terms.
    fn apply(&self, x: &[T], y: &[T]) -> Vec<T> {
        let mut env = HashMap::default();
        for (name, term) in self.bindings.xs.iter().zip(x) {
            env.insert(*name, term.clone());
        }
        for (name, term) in self.bindings.ys.iter().zip(y) {
            env.insert(*name, term.clone());
        }
        for (name, term) in self.bindings.ks.iter().zip(&self.ks) {
            env.insert(*name, term.clone());
        }
        self.exprs
            .iter()
            .map(|e| lower(self.ctx, self.ty, e, &env))
            .collect()
    }

    /// `body` closed over `bound` and the constants.
    fn forall(&self, bound: &[T], body: &Bool<'ctx>) -> Bool<'ctx> {
        let bounds: Vec<&dyn Ast<'ctx>> = bound
            .iter()
            .chain(&self.ks)
            .map(|b| b as &dyn Ast<'ctx>)
            .collect();
        z3::ast::forall_const(self.ctx, &bounds, &[], body)
    }

    fn solver(&self) -> z3::Solver<'ctx> {
        z3::Solver::new(self.ctx)
    }

    /// Whether a closed formula is true. A timeout counts as no.
    fn is_valid(&self, formula: &Bool<'ctx>) -> bool {
        let solver = self.solver();
        solver.assert(formula);
        solver.check() == z3::SatResult::Sat
    }
}

fn all_equal<'ctx, T: Ast<'ctx>>(ctx: &'ctx z3::Context, lhs: &[T], rhs: &[T]) -> Bool<'ctx> {
    let eqs: Vec<Bool> = lhs.iter().zip(rhs).map(|(l, r)| l._eq(r)).collect();
    Bool::and(ctx, &eqs.iter().collect::<Vec<_>>())
}

/// Decide whether `f(f(x, y), z) = f(x, f(y, z))` for all inputs, where slot
/// `i` of `f` computes `exprs[i]`. Unless associativity is disproved, also
/// look for a left identity and then for a right identity.
///
/// Panics if `exprs` does not have one expression per slot of `bindings`, if
/// `bindings` is misnamed, or if an expression uses an undeclared variable.
pub fn prove_associativity(
    exprs: &[RecExpr<Arith>],
    bindings: &Bindings,
    ty: ValueType,
    encoding: Encoding,
    timeout_ms: u64,
) -> (IsAssociative, AssociativeIds) {
    bindings.validate();
    assert_eq!(
        exprs.len(),
        bindings.tuple_size(),
        "expected one expression per slot"
    );
    for e in exprs {
        for v in vars(e) {
            bindings.check_var(&v);
        }
    }

    let mut cfg = z3::Config::new();
    cfg.set_timeout_msec(timeout_ms);
    cfg.set_model_generation(true);
    let ctx = z3::Context::new(&cfg);

    match encoding {
        Encoding::Bitvector => decide::<BV>(&ctx, exprs, bindings, ty),
        Encoding::Integer => decide::<Int>(&ctx, exprs, bindings, ty),
    }
}

fn decide<'ctx, T: Term<'ctx>>(
    ctx: &'ctx z3::Context,
    exprs: &[RecExpr<Arith>],
    bindings: &Bindings,
    ty: ValueType,
) -> (IsAssociative, AssociativeIds) {
    let mut query: Query<T> = Query {
        ctx,
        ty,
        exprs,
        bindings,
        ks: vec![],
    };
    query.ks = query.consts(bindings.ks.iter().copied());

    let verdict = check_associativity(&query);
    log::debug!("associativity of {:?}: {:?}", exprs_to_strings(exprs), verdict);
    if let IsAssociative::No(_) = verdict {
        return (verdict, AssociativeIds::none());
    }
    (verdict, find_identity(&query))
}

fn exprs_to_strings(exprs: &[RecExpr<Arith>]) -> Vec<String> {
    exprs.iter().map(|e| e.to_string()).collect()
}

fn check_associativity<'ctx, T: Term<'ctx>>(query: &Query<'_, 'ctx, T>) -> IsAssociative {
    let size = query.bindings.tuple_size();
    let xs = query.consts(query.bindings.xs.iter().copied());
    let ys = query.consts(query.bindings.ys.iter().copied());
    let zs = query.consts((0..size).map(VarName::z));

    let f_xy = query.apply(&xs, &ys);
    let lhs = query.apply(&f_xy, &zs);
    let f_yz = query.apply(&ys, &zs);
    let rhs = query.apply(&xs, &f_yz);

    let solver = query.solver();
    solver.assert(&all_equal(query.ctx, &lhs, &rhs).not());
    match solver.check() {
        z3::SatResult::Unsat => IsAssociative::Yes,
        z3::SatResult::Unknown => IsAssociative::Unknown,
        z3::SatResult::Sat => {
            let model = match solver.get_model() {
                Some(model) => model,
                None => return IsAssociative::Unknown,
            };
            let names = query
                .bindings
                .xs
                .iter()
                .chain(&query.bindings.ys)
                .copied()
                .chain((0..size).map(VarName::z))
                .chain(query.bindings.ks.iter().copied());
            let consts = xs.iter().chain(&ys).chain(&zs).chain(&query.ks);
            let mut assignment = vec![];
            for (name, term) in names.zip(consts) {
                match model.eval(term, true).and_then(|v| v.numeral(query.ty)) {
                    Some(value) => assignment.push((name, value)),
                    None => return IsAssociative::Unknown,
                }
            }
            IsAssociative::No(Counterexample {
                ty: query.ty,
                assignment,
            })
        }
    }
}

fn find_identity<'ctx, T: Term<'ctx>>(query: &Query<'_, 'ctx, T>) -> AssociativeIds {
    let xs = query.consts(query.bindings.xs.iter().copied());
    let ys = query.consts(query.bindings.ys.iter().copied());

    // f(e, y) = y
    let left = |es: &[T]| all_equal(query.ctx, &query.apply(es, &ys), &ys);
    if let Some(identities) = solve_identity(query, &left, &ys) {
        return AssociativeIds {
            orientation: Orientation::Left,
            identities,
        };
    }
    // f(x, e) = x
    let right = |es: &[T]| all_equal(query.ctx, &query.apply(&xs, es), &xs);
    if let Some(identities) = solve_identity(query, &right, &xs) {
        return AssociativeIds {
            orientation: Orientation::Right,
            identities,
        };
    }
    AssociativeIds::none()
}

/// Find `e` such that `equation(e)` holds for every value of `bound` and of
/// the constants. A slot whose value does not matter once the others are
/// fixed is reset to zero and marked `defaulted`.
fn solve_identity<'ctx, T: Term<'ctx>>(
    query: &Query<'_, 'ctx, T>,
    equation: &dyn Fn(&[T]) -> Bool<'ctx>,
    bound: &[T],
) -> Option<Vec<Identity>> {
    let es = query.consts((0..query.bindings.tuple_size()).map(VarName::e));
    let solver = query.solver();
    solver.assert(&query.forall(bound, &equation(&es)));
    if solver.check() != z3::SatResult::Sat {
        return None;
    }
    let model = solver.get_model()?;
    let mut values = es
        .iter()
        .map(|e| model.eval(e, true))
        .collect::<Option<Vec<T>>>()?;

    let mut defaulted = vec![false; es.len()];
    for slot in 0..es.len() {
        let mut free = values.clone();
        free[slot] = es[slot].clone();
        let mut over = bound.to_vec();
        over.push(es[slot].clone());
        if query.is_valid(&query.forall(&over, &equation(&free))) {
            values[slot] = T::literal(query.ctx, query.ty, 0);
            defaulted[slot] = true;
        }
    }

    let ty = query.ty;
    values
        .iter()
        .zip(defaulted)
        .map(|(v, defaulted)| {
            Some(Identity {
                value: v.numeral(ty)?,
                ty,
                defaulted,
            })
        })
        .collect()
}
