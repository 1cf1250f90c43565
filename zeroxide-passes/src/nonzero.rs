//! Nonzeroness conditions.
//!
//! Decomposes an expression into a boolean guard and a value such that the
//! original equals `select(guard, value, 0)`. Summation rewriting uses this
//! to move sparsity information out of reduction sources and into the
//! iteration domain.

use zeroxide_ir::expr::{CallOp, ExprId, ExprKind, ExprManager, RangeMap};
use zeroxide_ir::simplify::simplify;

use crate::util::select_else_zero;

/// Decomposition of an expression as `select(cond, value, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonzeroness {
    /// Guard that is true wherever the expression may be nonzero.
    pub cond: ExprId,
    /// The guarded value.
    pub value: ExprId,
}

impl Nonzeroness {
    /// Rebuild the equivalent guarded expression.
    pub fn to_expr(self, tm: &mut ExprManager) -> ExprId {
        select_else_zero(tm, self.cond, self.value)
    }
}

/// Decompose `e` into a [`Nonzeroness`] pair.
pub fn nonzeroness_condition(tm: &mut ExprManager, e: ExprId) -> Nonzeroness {
    if tm.dtype(e).is_bool() {
        // A boolean is nonzero exactly where it is true.
        let t = tm.mk_true();
        return Nonzeroness { cond: e, value: t };
    }
    let kind = tm.kind(e).clone();
    match kind {
        ExprKind::IntImm { value, .. } => constant(tm, e, value != 0),
        ExprKind::FloatImm { bits, .. } => constant(tm, e, f64::from_bits(bits) != 0.0),
        ExprKind::Add(a, b) => add_like(tm, e, ExprManager::mk_add, a, b),
        ExprKind::Sub(a, b) => add_like(tm, e, ExprManager::mk_sub, a, b),
        ExprKind::Min(a, b) => add_like(tm, e, ExprManager::mk_min, a, b),
        ExprKind::Max(a, b) => add_like(tm, e, ExprManager::mk_max, a, b),
        ExprKind::Mul(a, b) => mul_like(tm, e, ExprManager::mk_mul, a, b),
        ExprKind::TruncDiv(a, b) => div_like(tm, e, ExprManager::mk_truncdiv, a, b),
        ExprKind::TruncMod(a, b) => div_like(tm, e, ExprManager::mk_truncmod, a, b),
        ExprKind::FloorDiv(a, b) => div_like(tm, e, ExprManager::mk_floordiv, a, b),
        ExprKind::FloorMod(a, b) => div_like(tm, e, ExprManager::mk_floormod, a, b),
        ExprKind::Cast { dtype, value } => {
            let nz = nonzeroness_condition(tm, value);
            if nz.value == value {
                Nonzeroness { cond: nz.cond, value: e }
            } else {
                let value = tm.mk_cast(dtype, nz.value);
                Nonzeroness { cond: nz.cond, value }
            }
        }
        ExprKind::Select {
            cond,
            true_value,
            false_value,
        } => {
            let nz_a = nonzeroness_condition(tm, true_value);
            let nz_b = nonzeroness_condition(tm, false_value);
            let empty = RangeMap::default();

            // A zero branch lets the select collapse into the guard.
            if tm.is_const_zero(nz_b.value) {
                let guard = tm.mk_and(nz_a.cond, cond);
                let new_cond = simplify(tm, guard, &empty);
                return Nonzeroness {
                    cond: new_cond,
                    value: nz_a.value,
                };
            }
            if tm.is_const_zero(nz_a.value) {
                let not_cond = tm.mk_not(cond);
                let guard = tm.mk_and(nz_b.cond, not_cond);
                let new_cond = simplify(tm, guard, &empty);
                return Nonzeroness {
                    cond: new_cond,
                    value: nz_b.value,
                };
            }

            let new_cond = branch_guard(tm, cond, nz_a.cond, nz_b.cond);
            if nz_a.value == true_value && nz_b.value == false_value {
                Nonzeroness { cond: new_cond, value: e }
            } else {
                let value = tm.mk_select(cond, nz_a.value, nz_b.value);
                Nonzeroness { cond: new_cond, value }
            }
        }
        ExprKind::Call { op: CallOp::IfThenElse, args, .. } => {
            let (cond, true_value, false_value) = (args[0], args[1], args[2]);
            let nz_a = nonzeroness_condition(tm, true_value);
            let nz_b = nonzeroness_condition(tm, false_value);

            // Unlike a select, the lazy conditional must stay in place even
            // when a branch is zero.
            let new_cond = branch_guard(tm, cond, nz_a.cond, nz_b.cond);
            if nz_a.value == true_value && nz_b.value == false_value {
                Nonzeroness { cond: new_cond, value: e }
            } else {
                let value = tm.mk_if_then_else(cond, nz_a.value, nz_b.value);
                Nonzeroness { cond: new_cond, value }
            }
        }
        _ => default(tm, e),
    }
}

/// Rewrite `e` into the explicit `select(cond, value, 0)` form.
pub fn lift_nonzeroness_condition(tm: &mut ExprManager, e: ExprId) -> ExprId {
    let nz = nonzeroness_condition(tm, e);
    nz.to_expr(tm)
}

fn default(tm: &mut ExprManager, e: ExprId) -> Nonzeroness {
    // Always sound: the expression may be nonzero anywhere.
    let t = tm.mk_true();
    Nonzeroness { cond: t, value: e }
}

fn constant(tm: &mut ExprManager, e: ExprId, nonzero: bool) -> Nonzeroness {
    let cond = tm.mk_bool(nonzero);
    Nonzeroness { cond, value: e }
}

/// `(cond && ca) || (!cond && cb)`, simplified.
fn branch_guard(tm: &mut ExprManager, cond: ExprId, ca: ExprId, cb: ExprId) -> ExprId {
    let left = tm.mk_and(cond, ca);
    let not_cond = tm.mk_not(cond);
    let right = tm.mk_and(not_cond, cb);
    let or = tm.mk_or(left, right);
    simplify(tm, or, &RangeMap::default())
}

/// Addition-like operators may be nonzero when either operand is, so the
/// guards join with `||`.
fn add_like(
    tm: &mut ExprManager,
    e: ExprId,
    make: fn(&mut ExprManager, ExprId, ExprId) -> ExprId,
    a: ExprId,
    b: ExprId,
) -> Nonzeroness {
    let nz_a = nonzeroness_condition(tm, a);
    let nz_b = nonzeroness_condition(tm, b);

    if nz_a.cond == nz_b.cond {
        if nz_a.value == a && nz_b.value == b {
            return Nonzeroness {
                cond: nz_a.cond,
                value: e,
            };
        }
        let value = make(tm, nz_a.value, nz_b.value);
        return Nonzeroness {
            cond: nz_a.cond,
            value,
        };
    }

    let or = tm.mk_or(nz_a.cond, nz_b.cond);
    let new_cond = simplify(tm, or, &RangeMap::default());
    // Guard an operand with its own select only when its condition is
    // weaker than the combined one.
    let new_a = if nz_a.cond == new_cond {
        nz_a.value
    } else {
        nz_a.to_expr(tm)
    };
    let new_b = if nz_b.cond == new_cond {
        nz_b.value
    } else {
        nz_b.to_expr(tm)
    };
    let value = make(tm, new_a, new_b);
    Nonzeroness {
        cond: new_cond,
        value,
    }
}

/// Multiplication-like operators are nonzero only when both operands are,
/// so the guards join with `&&`.
fn mul_like(
    tm: &mut ExprManager,
    e: ExprId,
    make: fn(&mut ExprManager, ExprId, ExprId) -> ExprId,
    a: ExprId,
    b: ExprId,
) -> Nonzeroness {
    let nz_a = nonzeroness_condition(tm, a);
    let nz_b = nonzeroness_condition(tm, b);
    let and = tm.mk_and(nz_a.cond, nz_b.cond);
    let new_cond = simplify(tm, and, &RangeMap::default());
    if nz_a.value == a && nz_b.value == b {
        Nonzeroness {
            cond: new_cond,
            value: e,
        }
    } else {
        let value = make(tm, nz_a.value, nz_b.value);
        Nonzeroness {
            cond: new_cond,
            value,
        }
    }
}

/// Division-like operators take the numerator's guard; the denominator is
/// preserved untouched.
fn div_like(
    tm: &mut ExprManager,
    e: ExprId,
    make: fn(&mut ExprManager, ExprId, ExprId) -> ExprId,
    a: ExprId,
    b: ExprId,
) -> Nonzeroness {
    let nz_a = nonzeroness_condition(tm, a);
    if nz_a.value == a {
        Nonzeroness {
            cond: nz_a.cond,
            value: e,
        }
    } else {
        let value = make(tm, nz_a.value, b);
        Nonzeroness {
            cond: nz_a.cond,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroxide_ir::DType;

    #[test]
    fn select_with_zero_branch_collapses() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let three = tm.mk_int(3);
        let cond = tm.mk_eq(i, three);
        let a = tm.mk_var("a", DType::Float32);
        let zero = tm.mk_float(0.0, DType::Float32);
        let sel = tm.mk_select(cond, a, zero);

        let nz = nonzeroness_condition(&mut tm, sel);
        let expected_cond = zeroxide_ir::simplify::simplify(&mut tm, cond, &RangeMap::default());
        assert_eq!(nz.cond, expected_cond);
        assert_eq!(nz.value, a);
    }

    #[test]
    fn zero_constant_has_false_condition() {
        let mut tm = ExprManager::new();
        let zero = tm.mk_float(0.0, DType::Float32);
        let nz = nonzeroness_condition(&mut tm, zero);
        assert!(tm.is_false(nz.cond));
        let one = tm.mk_float(1.5, DType::Float32);
        let nz = nonzeroness_condition(&mut tm, one);
        assert!(tm.is_true(nz.cond));
    }

    #[test]
    fn mul_joins_with_and() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let j = tm.mk_var("j", DType::Int32);
        let ci = tm.mk_eq(i, j);
        let two = tm.mk_int(2);
        let j2 = tm.mk_mul(two, j);
        let cj = tm.mk_eq(i, j2);
        let a = tm.mk_var("a", DType::Float32);
        let b = tm.mk_var("b", DType::Float32);
        let ga = tm.mk_cast(DType::Float32, ci);
        let gb = tm.mk_cast(DType::Float32, cj);
        let left = tm.mk_mul(a, ga);
        let right = tm.mk_mul(b, gb);
        let prod = tm.mk_mul(left, right);

        let nz = nonzeroness_condition(&mut tm, prod);
        // The combined guard requires both equalities.
        let empty = RangeMap::default();
        let ci_s = zeroxide_ir::simplify::simplify(&mut tm, ci, &empty);
        let cj_s = zeroxide_ir::simplify::simplify(&mut tm, cj, &empty);
        let both = tm.mk_and(ci_s, cj_s);
        let both = zeroxide_ir::simplify::simplify(&mut tm, both, &empty);
        assert_eq!(nz.cond, both);
    }

    #[test]
    fn boolean_expressions_guard_themselves() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let j = tm.mk_var("j", DType::Int32);
        let cond = tm.mk_lt(i, j);
        let nz = nonzeroness_condition(&mut tm, cond);
        assert_eq!(nz.cond, cond);
        assert!(tm.is_true(nz.value));
    }
}
