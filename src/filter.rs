use std::{collections::BTreeSet, fmt};

use egg::RecExpr;

use crate::{
    grammar::{Bindings, Role},
    lang::{occurrences, saturate, smallest, solve_for, tree_size, uses_vars, Arith},
    tree::SlotExpr,
};

/// Why a candidate never reaches the screen.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// More than one comparison in a tree.
    Failed,
    /// The expression is ill-typed.
    Undefined,
    MissingOperand { uses_x: bool, uses_y: bool },
    Boring { simplified: RecExpr<Arith> },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Failed => write!(f, "fail"),
            SkipReason::Undefined => write!(f, "undefined"),
            SkipReason::MissingOperand { uses_x, uses_y } => {
                write!(f, "uses_x: {}; uses_y: {}", uses_x, uses_y)
            }
            SkipReason::Boring { simplified } => write!(f, "boring -> {}", simplified),
        }
    }
}

/// Return the symbolic form of `slot` if it is worth checking.
pub fn should_skip_expression(
    slot: &SlotExpr,
    bindings: &Bindings,
) -> Result<RecExpr<Arith>, SkipReason> {
    if slot.fail() {
        return Err(SkipReason::Failed);
    }
    let uses_x = slot.uses_x().iter().any(|&u| u);
    let uses_y = slot.uses_y().iter().any(|&u| u);
    if !uses_x || !uses_y {
        return Err(SkipReason::MissingOperand { uses_x, uses_y });
    }

    let expr = slot.to_recexpr().ok_or(SkipReason::Undefined)?;
    let (boring, simplified) = is_boring(&expr, bindings);
    if boring {
        return Err(SkipReason::Boring { simplified });
    }
    let uses_x = uses_vars(&simplified, Role::X);
    let uses_y = uses_vars(&simplified, Role::Y);
    if !uses_x || !uses_y {
        return Err(SkipReason::MissingOperand { uses_x, uses_y });
    }
    Ok(expr)
}

/// An expression is boring when it is not already in reduced form: the
/// simplifier finds a smaller equivalent, or solving for one of the bound
/// variables (last declared first) needs fewer occurrences of it.
///
/// Also returns the simplified form, or the solved form that proved it boring.
pub fn is_boring(expr: &RecExpr<Arith>, bindings: &Bindings) -> (bool, RecExpr<Arith>) {
    let runner = saturate(expr);
    let simplified = smallest(&runner);
    if tree_size(&simplified) < tree_size(expr) {
        return (true, simplified);
    }
    let declared: Vec<_> = bindings.all().copied().collect();
    for var in declared.into_iter().rev() {
        let before = occurrences(expr, var);
        if before == 0 {
            continue;
        }
        let solved = solve_for(&runner, var);
        if occurrences(&solved, var) < before {
            return (true, solved);
        }
    }
    (false, simplified)
}

/// Whether the slots of a tuple fall apart into independent groups.
///
/// Slot `i` depends on slot `j` when it reads `x_j` or `y_j`. After taking
/// the transitive closure, the tuple is decomposable unless some slot depends
/// on every slot.
pub fn is_decomposable(uses_x: &[Vec<bool>], uses_y: &[Vec<bool>]) -> bool {
    assert_eq!(uses_x.len(), uses_y.len());
    let size = uses_x.len();
    let mut dependencies: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); size];
    for i in 0..size {
        assert_eq!(uses_x[i].len(), size);
        assert_eq!(uses_y[i].len(), size);
        for j in 0..size {
            if uses_x[i][j] || uses_y[i][j] {
                dependencies[i].insert(j);
            }
        }
    }

    let mut change = true;
    while change {
        change = false;
        for i in 0..size {
            for j in 0..size {
                if i == j || !dependencies[i].contains(&j) {
                    continue;
                }
                let inherited: Vec<usize> = dependencies[j]
                    .iter()
                    .filter(|idx| !dependencies[i].contains(*idx))
                    .copied()
                    .collect();
                if !inherited.is_empty() {
                    dependencies[i].extend(inherited);
                    change = true;
                }
            }
        }
    }

    !compute_subgraphs(&dependencies)
        .iter()
        .any(|s| s.len() == size)
}

/// Drop every dependency set contained in another one.
fn compute_subgraphs(dependencies: &[BTreeSet<usize>]) -> Vec<BTreeSet<usize>> {
    let mut subgraphs = vec![BTreeSet::new(); dependencies.len()];
    for (i, current) in dependencies.iter().enumerate() {
        if current.is_empty() {
            continue;
        }
        let mut should_remove = false;
        for (j, other) in dependencies.iter().enumerate() {
            // only a later set can absorb this one
            if i == j || current.len() > other.len() || j < i {
                continue;
            }
            if current.is_subset(other) {
                should_remove = true;
                break;
            }
        }
        if !should_remove {
            subgraphs[i] = current.clone();
        }
    }
    subgraphs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;

    fn slot(s: &str, tuple_size: usize) -> SlotExpr {
        SlotExpr::Plain(Tree::from_recexpr(&s.parse().unwrap(), tuple_size).unwrap())
    }

    #[test]
    fn keeps_plain_max() {
        let bindings = Bindings::new(1, 1);
        let kept = should_skip_expression(&slot("(max x0 y0)", 1), &bindings);
        assert_eq!(kept.map(|e| e.to_string()), Ok("(max x0 y0)".to_string()));
    }

    #[test]
    fn rejects_missing_operand() {
        let bindings = Bindings::new(1, 1);
        assert_eq!(
            should_skip_expression(&slot("(- x0 x0)", 1), &bindings),
            Err(SkipReason::MissingOperand {
                uses_x: true,
                uses_y: false
            })
        );
    }

    #[test]
    fn rejects_operands_that_cancel() {
        let bindings = Bindings::new(1, 1);
        let result = should_skip_expression(&slot("(+ (- x0 y0) y0)", 1), &bindings);
        assert!(matches!(result, Err(SkipReason::Boring { .. })), "{:?}", result);
    }

    #[test]
    fn rejects_expressions_that_factor() {
        let bindings = Bindings::new(1, 1);
        let expr = "(+ (* x0 y0) (* x0 k0))".parse().unwrap();
        let (boring, solved) = is_boring(&expr, &bindings);
        assert!(boring);
        assert_eq!(occurrences(&solved, crate::VarName::x(0)), 1);
    }

    #[test]
    fn keeps_complex_multiplication() {
        let bindings = Bindings::new(2, 1);
        for s in &["(- (* x0 y0) (* x1 y1))", "(+ (* x0 y1) (* x1 y0))"] {
            assert!(
                should_skip_expression(&slot(s, 2), &bindings).is_ok(),
                "{} should be kept",
                s
            );
        }
    }

    #[test]
    fn rejects_ill_typed() {
        let bindings = Bindings::new(1, 1);
        assert_eq!(
            should_skip_expression(&slot("(+ (< x0 y0) k0)", 1), &bindings),
            Err(SkipReason::Undefined)
        );
        assert_eq!(
            should_skip_expression(&slot("(< (< x0 y0) k0)", 1), &bindings),
            Err(SkipReason::Failed)
        );
    }

    fn flags(size: usize, on: &[usize]) -> Vec<bool> {
        (0..size).map(|i| on.contains(&i)).collect()
    }

    #[test]
    fn independent_slot_is_decomposable() {
        let uses_x = vec![flags(3, &[0]), flags(3, &[0]), flags(3, &[2])];
        let uses_y = vec![flags(3, &[0]), flags(3, &[1]), flags(3, &[2])];
        assert!(is_decomposable(&uses_x, &uses_y));
    }

    #[test]
    fn chained_slots_are_not_decomposable() {
        let uses_x = vec![
            flags(4, &[0, 1]),
            flags(4, &[0, 1]),
            flags(4, &[2, 3]),
            flags(4, &[2, 3]),
        ];
        let uses_y = vec![
            flags(4, &[0, 2]),
            flags(4, &[1, 3]),
            flags(4, &[0, 2]),
            flags(4, &[1, 3]),
        ];
        assert!(!is_decomposable(&uses_x, &uses_y));
    }

    #[test]
    fn complex_multiplication_is_not_decomposable() {
        let both = vec![flags(2, &[0, 1]), flags(2, &[0, 1])];
        assert!(!is_decomposable(&both, &both));
        let apart = vec![flags(2, &[0]), flags(2, &[1])];
        assert!(is_decomposable(&apart, &apart));
    }
}
