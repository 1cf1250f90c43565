//! Atomic factorization and comparison normalization.
//!
//! [`factor_out_atomic_formulas`] splits a boolean formula into a canonical
//! set of atomic conjuncts plus a residual, so that condition sets can be
//! treated as systems of (in)equalities. [`normalize_comparisons`] rewrites
//! every comparison into the `expr == 0` / `expr != 0` / `expr <= 0` shapes
//! the inequality solver consumes.

use zeroxide_ir::compare::sort_dedup;
use zeroxide_ir::expr::{ExprId, ExprKind, ExprManager, RangeMap};
use zeroxide_ir::simplify::simplify;
use zeroxide_ir::subst::map_children;

use crate::util::{all_of, difference_sorted, intersect_sorted, union_sorted};

/// A boolean formula split as `(∧ atomic_formulas) ∧ rest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicFactorization {
    /// Atomic conjuncts, structurally sorted and deduplicated. Atoms carry
    /// no top-level boolean connective: variables, calls, constants and
    /// comparisons.
    pub atomic_formulas: Vec<ExprId>,
    /// Everything that could not be factored.
    pub rest: ExprId,
}

impl AtomicFactorization {
    /// Rebuild the equivalent conjunction.
    pub fn to_expr(&self, tm: &mut ExprManager) -> ExprId {
        let mut res = self.rest;
        for &a in &self.atomic_formulas {
            res = tm.mk_and(a, res);
        }
        res
    }

    /// The atoms followed by the residual, as one condition list.
    pub fn to_conditions(&self) -> Vec<ExprId> {
        let mut res = self.atomic_formulas.clone();
        res.push(self.rest);
        res
    }
}

/// Split the boolean formula `e` into atomic conjuncts and a residual.
///
/// `Select` is interpreted as `(c && t) || (!c && f)`, which is only
/// meaningful for boolean branches; the boolean precondition on `e` covers
/// this.
pub fn factor_out_atomic_formulas(tm: &mut ExprManager, e: ExprId) -> AtomicFactorization {
    assert!(
        tm.dtype(e).is_bool(),
        "factor_out_atomic_formulas expects a boolean formula"
    );
    factor(tm, e)
}

fn atomic(tm: &mut ExprManager, e: ExprId) -> AtomicFactorization {
    let rest = tm.mk_one(tm.dtype(e));
    AtomicFactorization {
        atomic_formulas: vec![e],
        rest,
    }
}

fn factor(tm: &mut ExprManager, e: ExprId) -> AtomicFactorization {
    let kind = tm.kind(e).clone();
    match kind {
        ExprKind::And(a, b) => {
            let res_a = factor(tm, a);
            let res_b = factor(tm, b);
            let mut atoms = union_sorted(tm, &res_a.atomic_formulas, &res_b.atomic_formulas);
            sort_dedup(tm, &mut atoms);
            let rest = tm.mk_and(res_a.rest, res_b.rest);
            AtomicFactorization {
                atomic_formulas: atoms,
                rest,
            }
        }
        ExprKind::Mul(a, b) => {
            // Boolean products behave like conjunction.
            let as_and = tm.mk_and(a, b);
            factor(tm, as_and)
        }
        ExprKind::Or(a, b) => {
            let mut res_a = factor(tm, a);
            let mut res_b = factor(tm, b);

            // Shared atoms factor out of the disjunction; the leftovers
            // fold back into each side's residual.
            let shared = intersect_sorted(tm, &res_a.atomic_formulas, &res_b.atomic_formulas);
            res_a.atomic_formulas =
                difference_sorted(tm, &res_a.atomic_formulas, &shared);
            res_b.atomic_formulas =
                difference_sorted(tm, &res_b.atomic_formulas, &shared);
            let left = res_a.to_expr(tm);
            let right = res_b.to_expr(tm);
            let rest = tm.mk_or(left, right);
            AtomicFactorization {
                atomic_formulas: shared,
                rest,
            }
        }
        ExprKind::Not(a) => {
            let inner = tm.kind(a).clone();
            match inner {
                ExprKind::Or(x, y) => {
                    let nx = tm.mk_not(x);
                    let ny = tm.mk_not(y);
                    let pushed = tm.mk_and(nx, ny);
                    factor(tm, pushed)
                }
                ExprKind::And(x, y) => {
                    let nx = tm.mk_not(x);
                    let ny = tm.mk_not(y);
                    let pushed = tm.mk_or(nx, ny);
                    factor(tm, pushed)
                }
                ExprKind::Select {
                    cond,
                    true_value,
                    false_value,
                } => {
                    // !select(c, t, f) == (!c || !t) && (c || !f)
                    let nc = tm.mk_not(cond);
                    let nt = tm.mk_not(true_value);
                    let nf = tm.mk_not(false_value);
                    let left = tm.mk_or(nc, nt);
                    let right = tm.mk_or(cond, nf);
                    let pushed = tm.mk_and(left, right);
                    factor(tm, pushed)
                }
                _ => atomic(tm, e),
            }
        }
        ExprKind::Select {
            cond,
            true_value,
            false_value,
        } => {
            let nc = tm.mk_not(cond);
            let left = tm.mk_and(cond, true_value);
            let right = tm.mk_and(nc, false_value);
            let as_or = tm.mk_or(left, right);
            factor(tm, as_or)
        }
        _ => atomic(tm, e),
    }
}

/// Rewrite every comparison into `a == 0`, `a != 0` or `a <= 0` (with `<`
/// tightened to `<=` for integers); `>` and `>=` mirror through their duals.
pub fn normalize_comparisons(tm: &mut ExprManager, e: ExprId) -> ExprId {
    let kind = tm.kind(e).clone();
    match kind {
        ExprKind::Eq(a, b) => normalized(tm, ExprManager::mk_eq, a, b, false),
        ExprKind::Ne(a, b) => normalized(tm, ExprManager::mk_ne, a, b, false),
        ExprKind::Le(a, b) => normalized(tm, ExprManager::mk_le, a, b, false),
        ExprKind::Lt(a, b) => normalized(tm, ExprManager::mk_lt, a, b, true),
        ExprKind::Ge(a, b) => normalized(tm, ExprManager::mk_le, b, a, false),
        ExprKind::Gt(a, b) => normalized(tm, ExprManager::mk_lt, b, a, true),
        _ => map_children(tm, e, &mut |tm, c| normalize_comparisons(tm, c)),
    }
}

fn normalized(
    tm: &mut ExprManager,
    make: fn(&mut ExprManager, ExprId, ExprId) -> ExprId,
    a: ExprId,
    b: ExprId,
    strict: bool,
) -> ExprId {
    let dtype = tm.dtype(a);
    let diff = tm.mk_sub(a, b);
    if strict && dtype.is_int() {
        // a < b over the integers is a - b + 1 <= 0.
        let one = tm.mk_one(dtype);
        let bumped = tm.mk_add(diff, one);
        let lhs = simplify(tm, bumped, &RangeMap::default());
        let zero = tm.mk_zero(dtype);
        return tm.mk_le(lhs, zero);
    }
    let lhs = simplify(tm, diff, &RangeMap::default());
    let zero = tm.mk_zero(dtype);
    make(tm, lhs, zero)
}

/// Conjunction view of a factorization plus residual, mainly for tests.
pub fn conditions_to_expr(tm: &mut ExprManager, conds: &[ExprId]) -> ExprId {
    all_of(tm, conds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroxide_ir::DType;

    #[test]
    fn and_collects_atoms() {
        let mut tm = ExprManager::new();
        let x = tm.mk_var("x", DType::Int32);
        let y = tm.mk_var("y", DType::Int32);
        let zero = tm.mk_int(0);
        let five = tm.mk_int(5);
        let ten = tm.mk_int(10);
        let gx = tm.mk_gt(x, zero);
        let ly = tm.mk_lt(y, five);
        let gy = tm.mk_gt(y, ten);
        let disj = tm.mk_or(ly, gy);
        let e = tm.mk_and(gx, disj);

        let res = factor_out_atomic_formulas(&mut tm, e);
        assert_eq!(res.atomic_formulas, vec![gx]);
        // The residual keeps the disjunction (up to a true conjunct).
        assert!(matches!(
            tm.kind(res.rest),
            ExprKind::Or(..) | ExprKind::And(..)
        ));
    }

    #[test]
    fn or_factors_shared_atoms() {
        let mut tm = ExprManager::new();
        let x = tm.mk_var("x", DType::Int32);
        let y = tm.mk_var("y", DType::Int32);
        let zero = tm.mk_int(0);
        let five = tm.mk_int(5);
        let shared = tm.mk_gt(x, zero);
        let ly = tm.mk_lt(y, five);
        let gy = tm.mk_gt(y, five);
        let left = tm.mk_and(shared, ly);
        let right = tm.mk_and(shared, gy);
        let e = tm.mk_or(left, right);

        let res = factor_out_atomic_formulas(&mut tm, e);
        assert_eq!(res.atomic_formulas, vec![shared]);
    }

    #[test]
    fn normalization_shapes() {
        let mut tm = ExprManager::new();
        let x = tm.mk_var("x", DType::Int32);
        let ten = tm.mk_int(10);
        let lt = tm.mk_lt(x, ten);
        let n = normalize_comparisons(&mut tm, lt);
        // x < 10 becomes x - 9 <= 0.
        let ExprKind::Le(lhs, rhs) = *tm.kind(n) else {
            panic!("expected <=");
        };
        assert!(tm.is_const_int(rhs, 0));
        let nine = tm.mk_int(9);
        let expect = tm.mk_sub(x, nine);
        let expect = simplify(&mut tm, expect, &RangeMap::default());
        assert_eq!(lhs, expect);

        let ge = tm.mk_ge(x, ten);
        let n = normalize_comparisons(&mut tm, ge);
        let ExprKind::Le(..) = tm.kind(n) else {
            panic!("expected <= after mirroring");
        };
    }

    #[test]
    fn factorization_round_trips() {
        let mut tm = ExprManager::new();
        let x = tm.mk_var("x", DType::Bool);
        let y = tm.mk_var("y", DType::Bool);
        let z = tm.mk_var("z", DType::Bool);
        let xy = tm.mk_and(x, y);
        let e = tm.mk_or(xy, z);
        let res = factor_out_atomic_formulas(&mut tm, e);
        let back = res.to_expr(&mut tm);
        // Check equivalence by brute force over the three booleans.
        for bits in 0..8u8 {
            let mut env = zeroxide_ir::eval::VarEnv::default();
            env.insert(x, zeroxide_ir::eval::Value::Bool(bits & 1 != 0));
            env.insert(y, zeroxide_ir::eval::Value::Bool(bits & 2 != 0));
            env.insert(z, zeroxide_ir::eval::Value::Bool(bits & 4 != 0));
            let mut tf = |_: zeroxide_ir::Tensor, _: &[i64]| zeroxide_ir::eval::Value::Int(0);
            let a = zeroxide_ir::eval::eval_expr(&tm, e, &env, &mut tf).unwrap();
            let b = zeroxide_ir::eval::eval_expr(&tm, back, &env, &mut tf).unwrap();
            assert_eq!(a.as_bool().unwrap(), b.as_bool().unwrap());
        }
    }
}
