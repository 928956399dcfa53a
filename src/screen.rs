use rand::Rng;

use crate::{
    tree::AssocTuple,
    value::{Value, ValueType},
    HashSet,
};

pub const DEFAULT_TRIALS: usize = 250;

/// Inputs on which `f(f(x, y), z)` and `f(x, f(y, z))` disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness {
    pub x: Vec<Value>,
    pub y: Vec<Value>,
    pub z: Vec<Value>,
    pub k: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScreenVerdict {
    /// Already proven associative at this leaf count.
    Known,
    /// A concrete counterexample, so the tuple is certainly not associative.
    NotAssociative(Witness),
    /// Associative on every sample, but the result never changed with one
    /// of the operands.
    IgnoresOperand { uses_x: bool, uses_y: bool },
    Pass,
}

impl ScreenVerdict {
    /// Only a pass earns a trip to the exact prover.
    pub fn skip(&self) -> bool {
        !matches!(self, ScreenVerdict::Pass)
    }
}

/// Cheap randomized test of associativity.
///
/// A `NotAssociative` verdict is a proof; a `Pass` is only evidence.
pub fn fast_check_associativity<R: Rng>(
    tuple: &AssocTuple,
    ty: ValueType,
    constants: usize,
    trials: usize,
    rng: &mut R,
    known: &HashSet<AssocTuple>,
) -> ScreenVerdict {
    if known.contains(tuple) {
        return ScreenVerdict::Known;
    }
    let size = tuple.len();
    let mut uses_x = false;
    let mut uses_y = false;
    for _ in 0..trials {
        let mut draw = |n: usize| -> Vec<Value> { (0..n).map(|_| ty.sample(rng)).collect() };
        let x = draw(size);
        let y = draw(size);
        let z = draw(size);
        let k = draw(constants);

        // Check it depends on x and y in some meaningful way
        let v_xy = tuple.evaluate(ty, &x, &y, &k);
        let v_yz = tuple.evaluate(ty, &y, &z, &k);
        let v_xz = tuple.evaluate(ty, &x, &z, &k);
        if v_xy != v_xz {
            uses_y = true;
        }
        if v_xz != v_yz {
            uses_x = true;
        }

        let v_x_yz = tuple.evaluate(ty, &x, &v_yz, &k);
        let v_xy_z = tuple.evaluate(ty, &v_xy, &z, &k);
        if v_x_yz != v_xy_z {
            return ScreenVerdict::NotAssociative(Witness { x, y, z, k });
        }
    }
    if uses_x && uses_y {
        ScreenVerdict::Pass
    } else {
        ScreenVerdict::IgnoresOperand { uses_x, uses_y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{SlotExpr, Tree};
    use rand::SeedableRng;

    fn tuple(exprs: &[&str]) -> AssocTuple {
        AssocTuple(
            exprs
                .iter()
                .map(|s| {
                    SlotExpr::Plain(Tree::from_recexpr(&s.parse().unwrap(), exprs.len()).unwrap())
                })
                .collect(),
        )
    }

    fn screen(exprs: &[&str]) -> ScreenVerdict {
        let mut rng = rand_pcg::Pcg64::seed_from_u64(0);
        fast_check_associativity(
            &tuple(exprs),
            ValueType::I32,
            1,
            DEFAULT_TRIALS,
            &mut rng,
            &HashSet::default(),
        )
    }

    #[test]
    fn passes_associative_ops() {
        assert_eq!(screen(&["(max x0 y0)"]), ScreenVerdict::Pass);
        assert_eq!(screen(&["(+ (+ x0 y0) k0)"]), ScreenVerdict::Pass);
        assert_eq!(
            screen(&["(- (* x0 y0) (* x1 y1))", "(+ (* x0 y1) (* x1 y0))"]),
            ScreenVerdict::Pass
        );
    }

    #[test]
    fn subtraction_has_a_witness() {
        match screen(&["(- x0 y0)"]) {
            ScreenVerdict::NotAssociative(w) => {
                let ty = ValueType::I32;
                let lhs = ty.sub(ty.sub(w.x[0], w.y[0]), w.z[0]);
                let rhs = ty.sub(w.x[0], ty.sub(w.y[0], w.z[0]));
                assert_ne!(lhs, rhs);
            }
            other => panic!("expected a witness, got {:?}", other),
        }
    }

    #[test]
    fn notices_an_ignored_operand() {
        assert_eq!(
            screen(&["(+ x0 k0)"]),
            ScreenVerdict::IgnoresOperand {
                uses_x: true,
                uses_y: false
            }
        );
    }

    #[test]
    fn known_tuples_are_not_screened() {
        let t = tuple(&["(min x0 y0)"]);
        let mut known = HashSet::default();
        known.insert(t.clone());
        let mut rng = rand_pcg::Pcg64::seed_from_u64(0);
        let verdict = fast_check_associativity(&t, ValueType::I32, 1, 10, &mut rng, &known);
        assert_eq!(verdict, ScreenVerdict::Known);
        assert!(verdict.skip());
    }
}
