use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use egg::{Id, Language, RecExpr};
use itertools::Itertools;

use crate::{
    decision::DecisionSource,
    grammar::{select_splits, Grammar, LeafContext, Op, Role, Shape, VarName},
    lang::Arith,
    value::{Value, ValueType},
};

/// Trees never grow past this many nodes.
pub const MAX_NODES: usize = 64;
/// Largest leaf count whose trees fit in [`MAX_NODES`].
pub const MAX_LEAVES: usize = (MAX_NODES + 1) / 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    Var(VarName),
    Op(Op),
}

/// Reads a prefix node sequence one node at a time.
pub struct Cursor<'a> {
    nodes: &'a [Node],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(nodes: &'a [Node]) -> Self {
        Self { nodes, pos: 0 }
    }

    pub fn is_done(&self) -> bool {
        self.pos == self.nodes.len()
    }

    fn expect_node(&mut self) -> Node {
        match self.next() {
            Some(node) => node,
            None => panic!("prefix encoding ended early at node {}", self.pos),
        }
    }
}

impl<'a> Iterator for Cursor<'a> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let node = *self.nodes.get(self.pos)?;
        self.pos += 1;
        Some(node)
    }
}

/// Whether a rendered subtree produces a number or a truth value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sort {
    Value,
    Bool,
}

/// A binary expression tree stored as its prefix node sequence.
///
/// Equality, ordering and hashing look only at the node sequence; the other
/// fields are derived from it.
#[derive(Clone, Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    leaves: usize,
    uses_x: Vec<bool>,
    uses_y: Vec<bool>,
    /// More than one comparison was used.
    fail: bool,
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl Eq for Tree {}

impl Hash for Tree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nodes.hash(state);
    }
}

impl PartialOrd for Tree {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tree {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nodes.cmp(&other.nodes)
    }
}

struct Builder<'g> {
    grammar: &'g Grammar,
    nodes: Vec<Node>,
}

impl<'g> Builder<'g> {
    fn context(&self) -> LeafContext {
        let n = self.nodes.len();
        if n > 1 {
            if let Node::Var(leaf) = self.nodes[n - 1] {
                let sibling_of = match self.nodes[n - 2] {
                    Node::Op(op) => Some(op),
                    Node::Var(_) => None,
                };
                return LeafContext::AfterLeaf { leaf, sibling_of };
            }
        }
        LeafContext::Free
    }

    fn create(&mut self, src: &mut DecisionSource, leaves: usize, top: &[Op]) {
        assert!(leaves > 0);
        let grammar = self.grammar;
        if leaves == 1 {
            let choices = grammar.leaf_choices(self.context());
            let leaf = choices[src.get(choices.len() as u64) as usize];
            self.nodes.push(Node::Var(leaf));
        } else {
            let op = top[src.get(top.len() as u64) as usize];
            self.nodes.push(Node::Op(op));
            let leaves_on_right = src.get(op.split_radix(leaves) as u64) as usize + 1;
            let leaves_on_left = leaves - leaves_on_right;
            self.create(src, leaves_on_left, &grammar.ops);
            self.create(src, leaves_on_right, &grammar.ops);
        }
    }
}

impl Tree {
    /// Decode a value tree with `leaves` leaves.
    pub fn create(grammar: &Grammar, src: &mut DecisionSource, leaves: usize) -> Self {
        Self::build(grammar, src, leaves, &grammar.ops)
    }

    /// Decode a select condition: the root is drawn from the condition
    /// operators, everything below it from the value operators.
    pub fn create_cond(grammar: &Grammar, src: &mut DecisionSource, leaves: usize) -> Self {
        Self::build(grammar, src, leaves, &grammar.cond_ops)
    }

    fn build(grammar: &Grammar, src: &mut DecisionSource, leaves: usize, top: &[Op]) -> Self {
        assert!(leaves <= MAX_LEAVES, "{} leaves do not fit in a tree", leaves);
        let mut builder = Builder {
            grammar,
            nodes: Vec::with_capacity(2 * leaves - 1),
        };
        builder.create(src, leaves, top);
        Self::from_nodes(builder.nodes, grammar.tuple_size)
    }

    /// Panics if `nodes` is not a complete prefix encoding.
    pub fn from_nodes(nodes: Vec<Node>, tuple_size: usize) -> Self {
        let mut open = 1usize;
        let mut leaves = 0;
        let mut comparisons = 0;
        let mut uses_x = vec![false; tuple_size];
        let mut uses_y = vec![false; tuple_size];
        for node in &nodes {
            assert!(open > 0, "trailing nodes after a complete tree");
            match node {
                Node::Var(v) => {
                    open -= 1;
                    leaves += 1;
                    match v.role {
                        Role::X => uses_x[v.index] = true,
                        Role::Y => uses_y[v.index] = true,
                        Role::K => {}
                        _ => panic!("{} cannot be a leaf", v),
                    }
                }
                Node::Op(op) => {
                    open += 1;
                    if op.is_comparison() {
                        comparisons += 1;
                    }
                }
            }
        }
        assert_eq!(open, 0, "incomplete prefix encoding");
        Self {
            nodes,
            leaves,
            uses_x,
            uses_y,
            fail: comparisons > 1,
        }
    }

    /// Convert a symbolic expression made of variables and binary operators.
    pub fn from_recexpr(expr: &RecExpr<Arith>, tuple_size: usize) -> Option<Self> {
        fn walk(expr: &RecExpr<Arith>, id: Id, out: &mut Vec<Node>) -> Option<()> {
            match &expr[id] {
                Arith::Var(v) => out.push(Node::Var(*v)),
                node => {
                    let op = node.op()?;
                    out.push(Node::Op(op));
                    for child in node.children() {
                        walk(expr, *child, out)?;
                    }
                }
            }
            Some(())
        }
        let root = Id::from(expr.as_ref().len().checked_sub(1)?);
        let mut nodes = vec![];
        walk(expr, root, &mut nodes)?;
        Some(Self::from_nodes(nodes, tuple_size))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.nodes)
    }

    pub fn leaves(&self) -> usize {
        self.leaves
    }

    pub fn uses_x(&self) -> &[bool] {
        &self.uses_x
    }

    pub fn uses_y(&self) -> &[bool] {
        &self.uses_y
    }

    pub fn fail(&self) -> bool {
        self.fail
    }

    /// Interpret the tree with wraparound arithmetic. Comparisons yield 0 or 1.
    pub fn evaluate(&self, ty: ValueType, x: &[Value], y: &[Value], k: &[Value]) -> Value {
        fn term(cursor: &mut Cursor, ty: ValueType, x: &[Value], y: &[Value], k: &[Value]) -> Value {
            match cursor.expect_node() {
                Node::Var(v) => match v.role {
                    Role::X => x[v.index],
                    Role::Y => y[v.index],
                    Role::K => k[v.index],
                    _ => panic!("{} cannot be a leaf", v),
                },
                Node::Op(op) => {
                    let a = term(cursor, ty, x, y, k);
                    let b = term(cursor, ty, x, y, k);
                    apply(ty, op, a, b)
                }
            }
        }
        term(&mut self.cursor(), ty, x, y, k)
    }

    /// Append this tree to `expr`, returning the root and its sort, or `None`
    /// if the tree is undefined: it failed, or a comparison was used as a number.
    pub fn render_into(&self, expr: &mut RecExpr<Arith>) -> Option<(Id, Sort)> {
        fn term(cursor: &mut Cursor, expr: &mut RecExpr<Arith>) -> Option<(Id, Sort)> {
            match cursor.next()? {
                Node::Var(v) => Some((expr.add(Arith::Var(v)), Sort::Value)),
                Node::Op(op) => {
                    let (a, a_sort) = term(cursor, expr)?;
                    let (b, b_sort) = term(cursor, expr)?;
                    if a_sort != Sort::Value || b_sort != Sort::Value {
                        return None;
                    }
                    let sort = if op.is_comparison() {
                        Sort::Bool
                    } else {
                        Sort::Value
                    };
                    Some((expr.add(Arith::binary(op, [a, b])), sort))
                }
            }
        }
        if self.fail {
            return None;
        }
        let mut cursor = self.cursor();
        let root = term(&mut cursor, expr)?;
        if cursor.is_done() {
            Some(root)
        } else {
            None
        }
    }

    /// The symbolic form of the tree, whatever its sort.
    pub fn to_recexpr(&self) -> Option<RecExpr<Arith>> {
        let mut expr = RecExpr::default();
        self.render_into(&mut expr)?;
        Some(expr)
    }
}

pub fn apply(ty: ValueType, op: Op, a: Value, b: Value) -> Value {
    match op {
        Op::Add => ty.add(a, b),
        Op::Sub => ty.sub(a, b),
        Op::Mul => ty.mul(a, b),
        Op::Min => ty.min(a, b),
        Op::Max => ty.max(a, b),
        Op::Lt => ty.lt(a, b) as Value,
        Op::Gt => ty.lt(b, a) as Value,
        Op::Eq => (a == b) as Value,
        Op::Ne => (a != b) as Value,
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn term(cursor: &mut Cursor, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match cursor.expect_node() {
                Node::Var(v) => write!(f, "{}", v),
                Node::Op(op) => {
                    write!(f, "({} ", op)?;
                    term(cursor, f)?;
                    write!(f, " ")?;
                    term(cursor, f)?;
                    write!(f, ")")
                }
            }
        }
        term(&mut self.cursor(), f)
    }
}

/// The expression computing one slot of the reduction state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotExpr {
    Plain(Tree),
    Select {
        cond: Tree,
        then: Tree,
        otherwise: Tree,
    },
}

impl SlotExpr {
    fn trees(&self) -> Vec<&Tree> {
        match self {
            SlotExpr::Plain(tree) => vec![tree],
            SlotExpr::Select {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
        }
    }

    pub fn leaves(&self) -> usize {
        self.trees().iter().map(|t| t.leaves()).sum()
    }

    pub fn fail(&self) -> bool {
        self.trees().iter().any(|t| t.fail())
    }

    pub fn uses_x(&self) -> Vec<bool> {
        merge_uses(self.trees().iter().map(|t| t.uses_x()))
    }

    pub fn uses_y(&self) -> Vec<bool> {
        merge_uses(self.trees().iter().map(|t| t.uses_y()))
    }

    pub fn evaluate(&self, ty: ValueType, x: &[Value], y: &[Value], k: &[Value]) -> Value {
        match self {
            SlotExpr::Plain(tree) => tree.evaluate(ty, x, y, k),
            SlotExpr::Select {
                cond,
                then,
                otherwise,
            } => {
                if cond.evaluate(ty, x, y, k) != 0 {
                    then.evaluate(ty, x, y, k)
                } else {
                    otherwise.evaluate(ty, x, y, k)
                }
            }
        }
    }

    /// The symbolic form, or `None` if the slot does not compute a number.
    pub fn to_recexpr(&self) -> Option<RecExpr<Arith>> {
        let mut expr = RecExpr::default();
        match self {
            SlotExpr::Plain(tree) => match tree.render_into(&mut expr)? {
                (_, Sort::Value) => Some(expr),
                (_, Sort::Bool) => None,
            },
            SlotExpr::Select {
                cond,
                then,
                otherwise,
            } => {
                let (c, c_sort) = cond.render_into(&mut expr)?;
                let (t, t_sort) = then.render_into(&mut expr)?;
                let (e, e_sort) = otherwise.render_into(&mut expr)?;
                if c_sort != Sort::Bool || t_sort != Sort::Value || e_sort != Sort::Value {
                    return None;
                }
                expr.add(Arith::Select([c, t, e]));
                Some(expr)
            }
        }
    }
}

fn merge_uses<'a>(uses: impl Iterator<Item = &'a [bool]>) -> Vec<bool> {
    let mut merged: Vec<bool> = vec![];
    for u in uses {
        if merged.len() < u.len() {
            merged.resize(u.len(), false);
        }
        for (m, b) in merged.iter_mut().zip(u) {
            *m |= *b;
        }
    }
    merged
}

impl fmt::Display for SlotExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotExpr::Plain(tree) => write!(f, "{}", tree),
            SlotExpr::Select {
                cond,
                then,
                otherwise,
            } => write!(f, "(select {} {} {})", cond, then, otherwise),
        }
    }
}

/// Decode the slot expression at `index` among those with `leaves` leaves.
/// Returns the expression and the decoder's remainder; the index names this
/// expression only if the remainder is zero.
pub fn generate(grammar: &Grammar, leaves: usize, index: u64) -> (SlotExpr, u64) {
    let mut src = DecisionSource::new(index);
    match grammar.shape {
        Shape::Plain => {
            let tree = Tree::create(grammar, &mut src, leaves);
            (SlotExpr::Plain(tree), src.remainder())
        }
        Shape::Select => {
            assert!(
                select_splits(leaves).next().is_some(),
                "a select needs at least 4 leaves, got {}",
                leaves
            );
            let cond_leaves = src.get(leaves as u64 - 3) as usize + 2;
            let rest = leaves - cond_leaves;
            let then_leaves = src.get(rest as u64 - 1) as usize + 1;
            let else_leaves = rest - then_leaves;

            let mut cond_src = src.fork();
            let mut then_src = src.fork();
            let cond = Tree::create_cond(grammar, &mut cond_src, cond_leaves);
            let then = Tree::create(grammar, &mut then_src, then_leaves);
            let otherwise = Tree::create(grammar, &mut src, else_leaves);
            let remainder = cond_src.remainder() | then_src.remainder() | src.remainder();
            (
                SlotExpr::Select {
                    cond,
                    then,
                    otherwise,
                },
                remainder,
            )
        }
    }
}

/// One expression per slot of the reduction state, over a shared namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssocTuple(pub Vec<SlotExpr>);

impl AssocTuple {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn evaluate(&self, ty: ValueType, x: &[Value], y: &[Value], k: &[Value]) -> Vec<Value> {
        self.0.iter().map(|e| e.evaluate(ty, x, y, k)).collect()
    }

    pub fn to_recexprs(&self) -> Option<Vec<RecExpr<Arith>>> {
        self.0.iter().map(|e| e.to_recexpr()).collect()
    }

    pub fn uses_x(&self) -> Vec<Vec<bool>> {
        self.0.iter().map(|e| e.uses_x()).collect()
    }

    pub fn uses_y(&self) -> Vec<Vec<bool>> {
        self.0.iter().map(|e| e.uses_y()).collect()
    }
}

impl fmt::Display for AssocTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ {} }}", self.0.iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Campaign;

    fn parse(s: &str, tuple_size: usize) -> Tree {
        Tree::from_recexpr(&s.parse().unwrap(), tuple_size).unwrap()
    }

    #[test]
    fn first_trees_of_the_single_campaign() {
        let g = Campaign::Single.grammar();
        let (slot, rest) = generate(&g, 2, 0);
        assert_eq!(rest, 0);
        assert_eq!(slot.to_string(), "(+ x0 y0)");
        // op digit 2 is mul, left leaf 1 is y0, right leaf 2 is k0
        let (slot, rest) = generate(&g, 2, 2 + 5 * (0 + 1 * (1 + 3 * 2)));
        assert_eq!(rest, 0);
        assert_eq!(slot.to_string(), "(* y0 k0)");
    }

    #[test]
    fn siblings_never_repeat_under_min() {
        let g = Campaign::Tuple.grammar();
        for i in 0..5000 {
            let (slot, _) = generate(&g, 3, i);
            if let SlotExpr::Plain(tree) = &slot {
                for w in tree.nodes().windows(3) {
                    if let [Node::Op(op), Node::Var(a), Node::Var(b)] = w {
                        if g.avoid_repeat.contains(op) {
                            assert_ne!(a, b, "{} repeats a leaf", slot);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn tracks_used_variables() {
        let tree = parse("(- (* x0 y1) k0)", 2);
        assert_eq!(tree.uses_x(), &[true, false]);
        assert_eq!(tree.uses_y(), &[false, true]);
        assert_eq!(tree.leaves(), 3);
        assert!(!tree.fail());
    }

    #[test]
    fn evaluates_with_wraparound() {
        let ty = ValueType::I32;
        let tree = parse("(* (+ x0 y0) y0)", 1);
        let x = [ty.max_value()];
        let y = [ty.from_i64(2)];
        // (MAX + 2) * 2 wraps twice
        let expected = ty.mul(ty.add(ty.max_value(), 2), 2);
        assert_eq!(tree.evaluate(ty, &x, &y, &[0]), expected);
        assert_eq!(ty.to_i128(expected), ((i32::MIN as i64 + 1) * 2) as i32 as i128);
    }

    #[test]
    fn second_comparison_fails() {
        let tree = parse("(< (< x0 y0) k0)", 1);
        assert!(tree.fail());
        assert!(tree.to_recexpr().is_none());
    }

    #[test]
    fn comparisons_are_not_numbers() {
        let cond = parse("(< x0 y0)", 1);
        let arith = parse("(+ (< x0 y0) k0)", 1);
        assert!(!arith.fail());
        assert!(arith.to_recexpr().is_none());
        assert!(cond.to_recexpr().is_some());
        assert!(SlotExpr::Plain(cond).to_recexpr().is_none());
    }

    #[test]
    fn select_renders_and_evaluates() {
        let ty = ValueType::I32;
        let slot = SlotExpr::Select {
            cond: parse("(< x0 y0)", 1),
            then: parse("x0", 1),
            otherwise: parse("y0", 1),
        };
        assert_eq!(
            slot.to_recexpr().unwrap().to_string(),
            "(select (< x0 y0) x0 y0)"
        );
        assert_eq!(slot.evaluate(ty, &[3], &[5], &[0]), 3);
        assert_eq!(slot.evaluate(ty, &[ty.from_i64(-3)], &[ty.from_i64(-5)], &[0]), ty.from_i64(-5));
        assert_eq!(slot.uses_x(), vec![true]);
    }

    #[test]
    fn select_slots_decode_every_branch() {
        let g = Campaign::Select.grammar();
        let mut found = 0;
        for i in 0..2000 {
            let (slot, rest) = generate(&g, 4, i);
            assert_eq!(slot.leaves(), 4);
            if rest == 0 {
                found += 1;
                assert!(slot.to_recexpr().is_some(), "{} should render", slot);
            }
        }
        assert!(found > 0);
    }

    #[test]
    #[should_panic]
    fn truncated_encoding_is_rejected() {
        Tree::from_nodes(vec![Node::Op(Op::Add), Node::Var(VarName::x(0))], 1);
    }
}
