//! Linear-form detection.
//!
//! Decides whether an expression is linear in a given set of variables and,
//! if so, produces the coefficients. Coefficients may be arbitrary
//! expressions as long as they are free of the target variables; the last
//! returned entry is the constant remainder.

use rustc_hash::FxHashSet;

use crate::expr::{ExprId, ExprKind, ExprManager, RangeMap};
use crate::visit::uses_any_var;

/// Detect a linear form of `e` over `vars`.
///
/// On success returns `vars.len() + 1` expressions: one coefficient per
/// variable followed by the constant remainder, each simplified and free of
/// `vars`. Returns `None` when `e` is not linear in `vars`.
pub fn detect_linear_equation(
    tm: &mut ExprManager,
    e: ExprId,
    vars: &[ExprId],
) -> Option<Vec<ExprId>> {
    let var_set: FxHashSet<ExprId> = vars.iter().copied().collect();
    let dtype = tm.dtype(e);
    if !dtype.is_int() {
        return None;
    }
    let mut coeffs = vec![None; vars.len()];
    let mut constant = None;
    collect(tm, e, vars, &var_set, 1, &mut coeffs, &mut constant)?;

    let empty = RangeMap::default();
    let mut out = Vec::with_capacity(vars.len() + 1);
    for c in coeffs {
        let c = c.unwrap_or_else(|| tm.mk_zero(dtype));
        out.push(crate::simplify::simplify(tm, c, &empty));
    }
    let c = constant.unwrap_or_else(|| tm.mk_zero(dtype));
    out.push(crate::simplify::simplify(tm, c, &empty));
    Some(out)
}

/// Accumulate `sign * e` into the coefficient table. `sign` is `1` or `-1`.
fn collect(
    tm: &mut ExprManager,
    e: ExprId,
    vars: &[ExprId],
    var_set: &FxHashSet<ExprId>,
    sign: i64,
    coeffs: &mut [Option<ExprId>],
    constant: &mut Option<ExprId>,
) -> Option<()> {
    if !uses_any_var(tm, e, var_set) {
        let signed = apply_sign(tm, e, sign);
        accumulate(tm, constant, signed);
        return Some(());
    }
    let kind = tm.kind(e).clone();
    match kind {
        ExprKind::Var { .. } => {
            let idx = vars.iter().position(|&v| v == e)?;
            let one = tm.mk_const(tm.dtype(e), sign);
            accumulate_at(tm, coeffs, idx, one);
            Some(())
        }
        ExprKind::Add(a, b) => {
            collect(tm, a, vars, var_set, sign, coeffs, constant)?;
            collect(tm, b, vars, var_set, sign, coeffs, constant)
        }
        ExprKind::Sub(a, b) => {
            collect(tm, a, vars, var_set, sign, coeffs, constant)?;
            collect(tm, b, vars, var_set, -sign, coeffs, constant)
        }
        ExprKind::Mul(a, b) => {
            // Exactly one factor may involve the variables; the other
            // becomes a (possibly symbolic) multiplier.
            let (factor, linear) = if !uses_any_var(tm, a, var_set) {
                (a, b)
            } else if !uses_any_var(tm, b, var_set) {
                (b, a)
            } else {
                return None;
            };
            let mut inner_coeffs = vec![None; coeffs.len()];
            let mut inner_constant = None;
            collect(
                tm,
                linear,
                vars,
                var_set,
                sign,
                &mut inner_coeffs,
                &mut inner_constant,
            )?;
            for (slot, inner) in coeffs.iter_mut().zip(inner_coeffs) {
                if let Some(inner) = inner {
                    let scaled = tm.mk_mul(inner, factor);
                    accumulate(tm, slot, scaled);
                }
            }
            if let Some(inner) = inner_constant {
                let scaled = tm.mk_mul(inner, factor);
                accumulate(tm, constant, scaled);
            }
            Some(())
        }
        _ => None,
    }
}

fn apply_sign(tm: &mut ExprManager, e: ExprId, sign: i64) -> ExprId {
    if sign >= 0 {
        e
    } else {
        let zero = tm.mk_zero(tm.dtype(e));
        tm.mk_sub(zero, e)
    }
}

fn accumulate(tm: &mut ExprManager, slot: &mut Option<ExprId>, e: ExprId) {
    *slot = Some(match *slot {
        Some(prev) => tm.mk_add(prev, e),
        None => e,
    });
}

fn accumulate_at(tm: &mut ExprManager, coeffs: &mut [Option<ExprId>], idx: usize, e: ExprId) {
    let mut slot = coeffs[idx].take();
    accumulate(tm, &mut slot, e);
    coeffs[idx] = slot;
}
