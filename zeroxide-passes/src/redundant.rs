//! Context-aware removal of redundant inequalities.
//!
//! Walks an expression with a set of known facts and replaces any
//! comparison already implied by them with `true`. Select and
//! `if_then_else` conditions enrich the known set for their true branch;
//! reductions contribute the range constraints of their axes. The false
//! branch is visited with the unrefined context: refining it with the
//! negated condition would be unsound when the condition has side effects.
//! This can propagate facts ordinary simplification misses, such as
//! divisibility conditions like `i % 3 == 0`.

use zeroxide_ir::expr::{CallOp, ExprId, ExprKind, ExprManager, RangeMap};
use zeroxide_ir::simplify::simplify;
use zeroxide_ir::subst::map_children;

use crate::atomic::factor_out_atomic_formulas;
use crate::util::{has_side_effect, itervars_to_inequalities};

/// Remove inequalities from `expr` that follow from the `known` facts.
pub fn remove_redundant_inequalities(
    tm: &mut ExprManager,
    expr: ExprId,
    known: &[ExprId],
) -> ExprId {
    let empty = RangeMap::default();
    let known: Vec<ExprId> = known
        .iter()
        .map(|&c| simplify(tm, c, &empty))
        .collect();
    mutate(tm, expr, &known)
}

fn mutate(tm: &mut ExprManager, e: ExprId, known: &[ExprId]) -> ExprId {
    let kind = tm.kind(e).clone();
    match kind {
        ExprKind::Eq(..)
        | ExprKind::Ne(..)
        | ExprKind::Lt(..)
        | ExprKind::Le(..)
        | ExprKind::Gt(..)
        | ExprKind::Ge(..) => {
            let simplified = simplify(tm, e, &RangeMap::default());
            if known.contains(&simplified) {
                tm.mk_true()
            } else {
                simplified
            }
        }
        ExprKind::And(a, b) => {
            let a = mutate(tm, a, known);
            let b = mutate(tm, b, known);
            tm.mk_and(a, b)
        }
        ExprKind::Select {
            cond,
            true_value,
            false_value,
        } => {
            let effectful = has_side_effect(tm, e);
            let mutated = mutate(tm, cond, known);
            let new_cond = simplify(tm, mutated, &RangeMap::default());
            if tm.is_true(new_cond) && !effectful {
                return mutate(tm, true_value, known);
            }
            if tm.is_false(new_cond) && !effectful {
                return mutate(tm, false_value, known);
            }
            let refined = refine(tm, known, new_cond);
            let t = mutate(tm, true_value, &refined);
            let f = mutate(tm, false_value, known);
            tm.mk_select(new_cond, t, f)
        }
        ExprKind::Call {
            op: CallOp::IfThenElse,
            args,
            ..
        } => {
            let mutated = mutate(tm, args[0], known);
            let new_cond = simplify(tm, mutated, &RangeMap::default());
            if tm.is_true(new_cond) {
                return mutate(tm, args[1], known);
            }
            if tm.is_false(new_cond) {
                return mutate(tm, args[2], known);
            }
            let refined = refine(tm, known, new_cond);
            let t = mutate(tm, args[1], &refined);
            let f = mutate(tm, args[2], known);
            tm.mk_if_then_else(new_cond, t, f)
        }
        ExprKind::Reduce {
            combiner,
            source,
            axis,
            condition,
            value_index,
        } => {
            let axis_facts = itervars_to_inequalities(tm, &axis);
            let empty = RangeMap::default();
            let mut with_axes = known.to_vec();
            with_axes.extend(axis_facts.iter().map(|&c| simplify(tm, c, &empty)));

            let new_cond = mutate(tm, condition, &with_axes);
            let refined = refine(tm, &with_axes, new_cond);
            let source: Vec<ExprId> = source
                .iter()
                .map(|&s| mutate(tm, s, &refined))
                .collect();
            tm.mk_reduce(combiner, source, axis, new_cond, value_index)
        }
        _ => map_children(tm, e, &mut |tm, c| mutate(tm, c, known)),
    }
}

/// Known facts extended with the atoms of a newly established condition.
fn refine(tm: &mut ExprManager, known: &[ExprId], cond: ExprId) -> Vec<ExprId> {
    let mut out = known.to_vec();
    if tm.dtype(cond).is_bool() {
        out.extend(factor_out_atomic_formulas(tm, cond).atomic_formulas);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroxide_ir::DType;

    #[test]
    fn known_comparisons_become_true() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let j = tm.mk_var("j", DType::Int32);
        let lt = tm.mk_lt(i, j);
        let out = remove_redundant_inequalities(&mut tm, lt, &[lt]);
        assert!(tm.is_true(out));
    }

    #[test]
    fn select_condition_refines_true_branch_only() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let j = tm.mk_var("j", DType::Int32);
        let lt = tm.mk_lt(i, j);
        let one = tm.mk_int(1);
        let zero = tm.mk_int(0);
        let t_val = tm.mk_select(lt, one, zero);
        let f_val = tm.mk_select(lt, one, zero);
        let outer = tm.mk_select(lt, t_val, f_val);

        let out = remove_redundant_inequalities(&mut tm, outer, &[]);
        let ExprKind::Select {
            true_value,
            false_value,
            ..
        } = *tm.kind(out)
        else {
            panic!("expected a select");
        };
        // In the true branch the inner condition is implied, so the inner
        // select folds to its true value.
        assert!(tm.is_const_int(true_value, 1));
        // The false branch keeps its select: the context is not refined
        // with the negation.
        assert!(matches!(tm.kind(false_value), ExprKind::Select { .. }));
    }
}
