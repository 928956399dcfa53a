use std::{cmp::max, convert::TryFrom, fmt, str::FromStr};

/// What a variable stands for in `f(x, y)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Left operand, one per tuple slot.
    X,
    /// Right operand, one per tuple slot.
    Y,
    /// Shared constant.
    K,
    /// Third operand, only introduced by the prover.
    Z,
    /// Identity unknown, only introduced by the prover.
    E,
}

impl Role {
    fn prefix(self) -> char {
        match self {
            Role::X => 'x',
            Role::Y => 'y',
            Role::K => 'k',
            Role::Z => 'z',
            Role::E => 'e',
        }
    }
}

/// A variable as a role plus a slot index. It is only turned into a string
/// when it crosses into the symbolic language or the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarName {
    pub role: Role,
    pub index: usize,
}

impl VarName {
    pub fn new(role: Role, index: usize) -> Self {
        Self { role, index }
    }

    pub fn x(index: usize) -> Self {
        Self::new(Role::X, index)
    }

    pub fn y(index: usize) -> Self {
        Self::new(Role::Y, index)
    }

    pub fn k(index: usize) -> Self {
        Self::new(Role::K, index)
    }

    pub fn z(index: usize) -> Self {
        Self::new(Role::Z, index)
    }

    pub fn e(index: usize) -> Self {
        Self::new(Role::E, index)
    }

    pub fn is_constant(&self) -> bool {
        self.role == Role::K
    }
}

impl fmt::Display for VarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.role.prefix(), self.index)
    }
}

impl FromStr for VarName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let role = match chars.next() {
            Some('x') => Role::X,
            Some('y') => Role::Y,
            Some('k') => Role::K,
            Some('z') => Role::Z,
            Some('e') => Role::E,
            _ => return Err(format!("Invalid variable name {}.", s)),
        };
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid variable name {}.", s));
        }
        let index = digits
            .parse()
            .map_err(|_| format!("Invalid variable index in {}.", s))?;
        Ok(Self { role, index })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Min,
    Max,
    Lt,
    Gt,
    Eq,
    Ne,
}

impl Op {
    pub fn is_comparison(self) -> bool {
        matches!(self, Op::Lt | Op::Gt | Op::Eq | Op::Ne)
    }

    /// Number of ways to hand leaves to the right child. Subtraction may put
    /// any number on the right; every other operator keeps the right side no
    /// larger than the left.
    pub fn split_radix(self, leaves: usize) -> usize {
        match self {
            Op::Sub => leaves - 1,
            _ => leaves / 2,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Min => "min",
            Op::Max => "max",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Eq => "==",
            Op::Ne => "!=",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// One value tree per slot.
    Plain,
    /// `select(cond, then, else)` per slot, with three independently decoded trees.
    Select,
}

/// What precedes a leaf in prefix order, as far as the leaf rule cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafContext {
    Free,
    /// The previous node is `leaf`. `sibling_of` is the operator right before
    /// it when `leaf` is the left sibling of the leaf being chosen.
    AfterLeaf {
        leaf: VarName,
        sibling_of: Option<Op>,
    },
}

/// Declarative description of one search campaign's expressions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grammar {
    pub tuple_size: usize,
    pub constants: usize,
    /// Operators of value trees.
    pub ops: Vec<Op>,
    /// Operators allowed at the root of a select condition.
    pub cond_ops: Vec<Op>,
    /// Operators that may not take the same leaf on both sides.
    pub avoid_repeat: Vec<Op>,
    /// Forbid a constant leaf right after another constant leaf.
    pub no_adjacent_constants: bool,
    pub shape: Shape,
}

impl Grammar {
    /// Leaf alternatives in decoding order: `x0.., y0.., k0..`.
    pub fn leaves(&self) -> Vec<VarName> {
        let mut leaves = Vec::with_capacity(2 * self.tuple_size + self.constants);
        leaves.extend((0..self.tuple_size).map(VarName::x));
        leaves.extend((0..self.tuple_size).map(VarName::y));
        leaves.extend((0..self.constants).map(VarName::k));
        leaves
    }

    fn leaf_position(&self, v: VarName) -> usize {
        match v.role {
            Role::X => v.index,
            Role::Y => self.tuple_size + v.index,
            Role::K => 2 * self.tuple_size + v.index,
            _ => panic!("{} is not a leaf of this grammar", v),
        }
    }

    pub fn bindings(&self) -> Bindings {
        Bindings::new(self.tuple_size, self.constants)
    }

    pub fn leaf_choices(&self, context: LeafContext) -> Vec<VarName> {
        let all = self.leaves();
        match context {
            LeafContext::AfterLeaf {
                leaf,
                sibling_of: Some(op),
            } if self.avoid_repeat.contains(&op) => {
                // avoid min(x, x)
                all.into_iter().filter(|v| *v != leaf).collect()
            }
            LeafContext::AfterLeaf { leaf, .. }
                if self.no_adjacent_constants && leaf.is_constant() =>
            {
                all.into_iter().filter(|v| !v.is_constant()).collect()
            }
            _ => all,
        }
    }

    /// Number of distinct value trees with `leaves` leaves.
    pub fn count_trees(&self, leaves: usize) -> u128 {
        let mut cache = vec![];
        self.tally(leaves, &self.ops, &mut cache).iter().sum()
    }

    /// Number of distinct select conditions with `leaves` leaves.
    pub fn count_cond_trees(&self, leaves: usize) -> u128 {
        let mut cache = vec![];
        self.tally(leaves, &self.cond_ops, &mut cache).iter().sum()
    }

    /// Number of distinct slot expressions with `leaves` leaves in total.
    pub fn count_slots(&self, leaves: usize) -> u128 {
        match self.shape {
            Shape::Plain => self.count_trees(leaves),
            Shape::Select => select_splits(leaves)
                .map(|(c, t, f)| {
                    self.count_cond_trees(c) * self.count_trees(t) * self.count_trees(f)
                })
                .sum(),
        }
    }

    /// Tree counts with `leaves` leaves, keyed by the position of the last leaf.
    fn tally(&self, leaves: usize, top: &[Op], cache: &mut Vec<Option<Vec<u128>>>) -> Vec<u128> {
        let alphabet = self.leaves();
        let mut out = vec![0u128; alphabet.len()];
        if leaves == 1 {
            out.iter_mut().for_each(|c| *c = 1);
            return out;
        }
        for &op in top {
            for right in 1..=op.split_radix(leaves) {
                let left = leaves - right;
                let lhs = self.value_tally(left, cache);
                if right == 1 {
                    for (a, &count) in lhs.iter().enumerate() {
                        if count == 0 {
                            continue;
                        }
                        let context = LeafContext::AfterLeaf {
                            leaf: alphabet[a],
                            sibling_of: if left == 1 { Some(op) } else { None },
                        };
                        for b in self.leaf_choices(context) {
                            out[self.leaf_position(b)] += count;
                        }
                    }
                } else {
                    let total: u128 = lhs.iter().sum();
                    let rhs = self.value_tally(right, cache);
                    for (b, &count) in rhs.iter().enumerate() {
                        out[b] += total * count;
                    }
                }
            }
        }
        out
    }

    fn value_tally(&self, leaves: usize, cache: &mut Vec<Option<Vec<u128>>>) -> Vec<u128> {
        if cache.len() <= leaves {
            cache.resize(leaves + 1, None);
        }
        if let Some(hit) = &cache[leaves] {
            return hit.clone();
        }
        let result = self.tally(leaves, &self.ops, cache);
        cache[leaves] = Some(result.clone());
        result
    }

    /// Largest product of digit bases over all decode paths of a tree whose
    /// root is drawn from `top`.
    fn path_bound(&self, leaves: usize, top: &[Op], cache: &mut Vec<Option<u128>>) -> u128 {
        if leaves == 1 {
            return self.leaves().len() as u128;
        }
        let mut best = 0u128;
        for &op in top {
            let radix = op.split_radix(leaves);
            for right in 1..=radix {
                let left = leaves - right;
                let product = (top.len() as u128)
                    .saturating_mul(radix as u128)
                    .saturating_mul(self.value_bound(left, cache))
                    .saturating_mul(self.value_bound(right, cache));
                best = max(best, product);
            }
        }
        best
    }

    fn value_bound(&self, leaves: usize, cache: &mut Vec<Option<u128>>) -> u128 {
        if cache.len() <= leaves {
            cache.resize(leaves + 1, None);
        }
        if let Some(hit) = cache[leaves] {
            return hit;
        }
        let result = self.path_bound(leaves, &self.ops, cache);
        cache[leaves] = Some(result);
        result
    }

    /// Every index at or above this bound decodes with a nonzero remainder.
    pub fn index_bound(&self, leaves: usize) -> u64 {
        let mut cache = vec![];
        let bound = match self.shape {
            Shape::Plain => self.value_bound(leaves, &mut cache),
            Shape::Select => {
                let mut best = 0u128;
                for (c, t, f) in select_splits(leaves) {
                    let rest = leaves - c;
                    let branches = interleave_bound(
                        self.value_bound(t, &mut cache),
                        self.value_bound(f, &mut cache),
                    );
                    let streams =
                        interleave_bound(self.path_bound(c, &self.cond_ops, &mut cache), branches);
                    let product = ((leaves - 3) as u128)
                        .saturating_mul((rest - 1) as u128)
                        .saturating_mul(streams);
                    best = max(best, product);
                }
                best
            }
        };
        u64::try_from(bound).unwrap_or(u64::MAX)
    }
}

/// All `(cond, then, else)` leaf splits of a select slot with `leaves` leaves.
pub fn select_splits(leaves: usize) -> impl Iterator<Item = (usize, usize, usize)> {
    let conds = if leaves >= 4 { 2..=leaves - 2 } else { 1..=0 };
    conds.flat_map(move |c| {
        let rest = leaves - c;
        (1..rest).map(move |t| (c, t, rest - t))
    })
}

fn bits_needed(bound: u128) -> u32 {
    128 - (bound - 1).leading_zeros()
}

/// Bound on a value whose even bits are below `even` and odd bits below `odd`.
fn interleave_bound(even: u128, odd: u128) -> u128 {
    if even == 0 || odd == 0 {
        return 0;
    }
    let e = bits_needed(even);
    let o = bits_needed(odd);
    let exp = max(if e > 0 { 2 * e - 1 } else { 0 }, 2 * o);
    if exp >= 127 {
        u128::MAX
    } else {
        1u128 << exp
    }
}

/// The variables a tuple of expressions may reference, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bindings {
    pub xs: Vec<VarName>,
    pub ys: Vec<VarName>,
    pub ks: Vec<VarName>,
}

impl Bindings {
    pub fn new(tuple_size: usize, constants: usize) -> Self {
        Self {
            xs: (0..tuple_size).map(VarName::x).collect(),
            ys: (0..tuple_size).map(VarName::y).collect(),
            ks: (0..constants).map(VarName::k).collect(),
        }
    }

    pub fn tuple_size(&self) -> usize {
        self.xs.len()
    }

    /// All declared names, innermost-declared last.
    pub fn all(&self) -> impl Iterator<Item = &VarName> {
        self.xs.iter().chain(self.ys.iter()).chain(self.ks.iter())
    }

    /// Panics unless every list is named `<role><position>` and the x and y
    /// lists have the same length.
    pub fn validate(&self) {
        assert_eq!(
            self.xs.len(),
            self.ys.len(),
            "x and y variable lists differ in size"
        );
        for (list, role) in [(&self.xs, Role::X), (&self.ys, Role::Y), (&self.ks, Role::K)].iter() {
            for (i, v) in list.iter().enumerate() {
                assert!(
                    v.role == *role && v.index == i,
                    "variable {} declared at position {} of the {:?} list",
                    v,
                    i,
                    role
                );
            }
        }
    }

    /// Panics unless `v` is one of the declared variables.
    pub fn check_var(&self, v: &VarName) {
        let declared = match v.role {
            Role::X => self.xs.len(),
            Role::Y => self.ys.len(),
            Role::K => self.ks.len(),
            _ => 0,
        };
        assert!(
            v.index < declared,
            "expression references undeclared variable {}",
            v
        );
    }
}

/// The search campaigns, one per kind of reduction being looked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Campaign {
    Single,
    Tuple,
    Triple,
    Select,
    SelectTuple,
}

impl FromStr for Campaign {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "tuple" => Ok(Self::Tuple),
            "triple" => Ok(Self::Triple),
            "select" => Ok(Self::Select),
            "select-tuple" => Ok(Self::SelectTuple),
            _ => Err("Invalid campaign.".to_string()),
        }
    }
}

impl Campaign {
    pub fn grammar(self) -> Grammar {
        use Op::*;
        let value_ops = vec![Add, Sub, Mul, Min, Max];
        match self {
            Campaign::Single | Campaign::Tuple => Grammar {
                tuple_size: if self == Campaign::Single { 1 } else { 2 },
                constants: 1,
                ops: value_ops,
                cond_ops: vec![],
                avoid_repeat: vec![Min, Max, Add, Sub],
                no_adjacent_constants: self == Campaign::Tuple,
                shape: Shape::Plain,
            },
            Campaign::Triple => Grammar {
                tuple_size: 3,
                constants: 1,
                ops: vec![Add, Mul],
                cond_ops: vec![],
                avoid_repeat: vec![Add],
                no_adjacent_constants: true,
                shape: Shape::Plain,
            },
            Campaign::Select => Grammar {
                tuple_size: 1,
                constants: 1,
                ops: value_ops,
                cond_ops: vec![Lt],
                avoid_repeat: vec![Min, Max, Add, Sub, Lt],
                no_adjacent_constants: true,
                shape: Shape::Select,
            },
            Campaign::SelectTuple => Grammar {
                tuple_size: 2,
                constants: 1,
                ops: value_ops,
                cond_ops: vec![Lt],
                avoid_repeat: vec![Min, Max, Add, Sub, Mul, Lt],
                no_adjacent_constants: true,
                shape: Shape::Select,
            },
        }
    }

    /// Inclusive leaf-count range searched by default.
    pub fn leaf_bounds(self) -> (usize, usize) {
        match self {
            Campaign::Single | Campaign::Tuple | Campaign::Triple => (2, 7),
            Campaign::Select | Campaign::SelectTuple => (4, 7),
        }
    }

    pub fn iter_tile(self) -> u64 {
        match self {
            Campaign::Single | Campaign::Tuple => 160_000,
            Campaign::Triple => 60_000,
            Campaign::Select | Campaign::SelectTuple => 85_000,
        }
    }

    /// Wide tuples are mostly independent slots glued together, so the
    /// triple campaign skips decomposable ones unless told otherwise.
    pub fn decompose_by_default(self) -> bool {
        self == Campaign::Triple
    }
}
