//! Reduction rewriting.
//!
//! The headline pass: [`optimize_and_lift_nonzeroness_conditions`] takes a
//! compute tensor, lifts the nonzeroness condition of a summation's source
//! into the reduction guard, simplifies the reduction domain with the full
//! solver pipeline, splits the guard into a part independent of the
//! reduction axes (which moves outside as a `select`) and a residual, and
//! finally extracts the reduction into a separate tensor when the
//! simplified iteration space is provably smaller than the enclosing one.
//!
//! Everything here is conservative: any failure to infer or prove leaves
//! the corresponding subexpression exactly as it was.

use rustc_hash::FxHashSet;
use zeroxide_ir::dtype::DType;
use zeroxide_ir::expr::{
    CallOp, ExprId, ExprKind, ExprManager, IterVar, RangeMap, Tensor,
};
use zeroxide_ir::simplify::{can_prove, simplify};
use zeroxide_ir::subst::substitute;
use zeroxide_ir::tensor::{tensor_from_expr, transform_body};
use zeroxide_ir::visit::{free_vars, uses_any_var, uses_var};

use crate::atomic::factor_out_atomic_formulas;
use crate::combiner::{can_factor_zero_from_combiner, is_sum_combiner};
use crate::domain::{simplify_domain, Domain};
use crate::error::{Error, Result};
use crate::inequalities::solve_system_of_inequalities;
use crate::nonzero::nonzeroness_condition;
use crate::redundant::remove_redundant_inequalities;
use crate::util::{
    all_of, concat, itervars_from_map, itervars_to_inequalities, itervars_to_map,
    itervars_to_vars, merge_ranges, select_else_zero,
};

/// Simplify a reduction's iteration domain using its guard; mainly this
/// removes empty reductions and collapses solved axes. Non-reductions pass
/// through unchanged.
pub fn simplify_reduction_domain(
    tm: &mut ExprManager,
    expr: ExprId,
    outer_vranges: &RangeMap,
) -> Result<ExprId> {
    let ExprKind::Reduce {
        combiner,
        source,
        axis,
        condition,
        value_index,
    } = tm.kind(expr).clone()
    else {
        return Ok(expr);
    };

    let vranges = merge_ranges(outer_vranges, &itervars_to_map(&axis));
    let conditions = factor_out_atomic_formulas(tm, condition).to_conditions();
    let domain = Domain::new(itervars_to_vars(&axis), conditions, vranges);
    let res = simplify_domain(tm, &domain, true)?;

    let new_source: Vec<ExprId> = source
        .iter()
        .map(|&src| substitute(tm, src, &res.old_to_new))
        .collect();
    let new_axis = itervars_from_map(tm, &res.new_domain.variables, &res.new_domain.ranges)?;
    let new_cond = all_of(tm, &res.new_domain.conditions);

    let red = tm.mk_reduce(combiner, new_source, new_axis, new_cond, value_index);
    // This is where an empty or nullary reduction disappears.
    Ok(simplify(tm, red, &RangeMap::default()))
}

/// Split `cond` into an implied part free of `vars` and a residual, so that
/// `cond == first && second` and `first` never mentions `vars`.
pub fn implication_not_containing_vars(
    tm: &mut ExprManager,
    cond: ExprId,
    vars: &FxHashSet<ExprId>,
) -> (ExprId, ExprId) {
    debug_assert!(tm.dtype(cond).is_bool());
    let kind = tm.kind(cond).clone();
    match kind {
        ExprKind::And(a, b) => {
            let (a_out, a_in) = implication_not_containing_vars(tm, a, vars);
            let (b_out, b_in) = implication_not_containing_vars(tm, b, vars);
            let outer = tm.mk_and(a_out, b_out);
            let inner = tm.mk_and(a_in, b_in);
            (outer, inner)
        }
        ExprKind::Or(a, b) => {
            let (a_out, a_in) = implication_not_containing_vars(tm, a, vars);
            let (b_out, b_in) = implication_not_containing_vars(tm, b, vars);
            let outer = tm.mk_or(a_out, b_out);
            let t1 = tm.mk_or(a_out, b_in);
            let t2 = tm.mk_or(b_out, a_in);
            let t3 = tm.mk_or(a_in, b_in);
            let t12 = tm.mk_and(t1, t2);
            let inner = tm.mk_and(t12, t3);
            (outer, inner)
        }
        _ if !uses_any_var(tm, cond, vars) => {
            let t = tm.mk_true();
            (cond, t)
        }
        _ => {
            let t = tm.mk_true();
            (t, cond)
        }
    }
}

/// Rewrite `cond` with Fourier-Motzkin over reduction-then-outer variables
/// and split off the part that does not depend on the reduction axes.
pub fn lift_conditions_through_reduction(
    tm: &mut ExprManager,
    cond: ExprId,
    red_axis: &[IterVar],
    outer_axis: &[IterVar],
) -> Result<(ExprId, ExprId)> {
    let fact = factor_out_atomic_formulas(tm, cond);

    // Reduction variables come first so the surviving bounds for outer
    // variables never mention them.
    let allvars = concat(itervars_to_vars(red_axis), &itervars_to_vars(outer_axis));
    let vranges = merge_ranges(&itervars_to_map(red_axis), &itervars_to_map(outer_axis));

    let solved =
        solve_system_of_inequalities(tm, &fact.atomic_formulas, &allvars, &vranges);
    let atomics = solved.as_conditions(tm);

    let conj = all_of(tm, &atomics);
    let rewritten = tm.mk_and(conj, fact.rest);

    let vset: FxHashSet<ExprId> = red_axis.iter().map(|iv| iv.var).collect();
    Ok(implication_not_containing_vars(tm, rewritten, &vset))
}

/// Materialize `expr` guarded by `cond` as a separate tensor over the
/// simplified domain, if that domain is provably smaller than the enclosing
/// iteration space; otherwise return the input untouched.
pub fn extract_as_tensor_maybe(
    tm: &mut ExprManager,
    expr: ExprId,
    cond: ExprId,
    outer_axis: &[ExprId],
    vranges: &RangeMap,
) -> Result<ExprId> {
    let conditions = factor_out_atomic_formulas(tm, cond).to_conditions();
    let domain = Domain::new(outer_axis.to_vec(), conditions, vranges.clone());
    let res = simplify_domain(tm, &domain, true)?;

    let substituted = substitute(tm, expr, &res.old_to_new);
    let new_expr = simplify(tm, substituted, &res.new_domain.ranges);
    // The guard's consequences often make `if_then_else` chains inside the
    // body redundant; the plain simplifier does not see that.
    let new_expr = remove_redundant_inequalities(tm, new_expr, &res.new_domain.conditions);

    let used: Vec<ExprId> = res
        .new_domain
        .variables
        .iter()
        .copied()
        .filter(|&v| uses_var(tm, new_expr, v))
        .collect();

    // Variable-free results are cheaper inlined than materialized.
    if used.is_empty() {
        return Ok(new_expr);
    }

    // A plain tensor read gains nothing from another indirection.
    if let ExprKind::Call {
        op: CallOp::Tensor(_),
        ..
    } = tm.kind(new_expr)
    {
        return Ok(expr);
    }

    let mut old_volume = tm.mk_const(DType::Int64, 1);
    for &var in outer_axis {
        let range = vranges
            .get(&var)
            .ok_or_else(|| Error::MissingRange(tm.var_name(var).to_string()))?;
        let ext = tm.mk_cast(DType::Int64, range.extent);
        old_volume = tm.mk_mul(old_volume, ext);
    }
    let mut new_volume = tm.mk_const(DType::Int64, 1);
    for &var in &used {
        let range = res.new_domain.ranges[&var];
        let ext = tm.mk_cast(DType::Int64, range.extent);
        new_volume = tm.mk_mul(new_volume, ext);
    }

    // Extraction must strictly shrink the iteration space.
    let not_smaller = tm.mk_le(old_volume, new_volume);
    if can_prove(tm, not_smaller, vranges) {
        return Ok(expr);
    }

    let itervars = itervars_from_map(tm, &used, &res.new_domain.ranges)?;
    let tensor = tensor_from_expr(tm, new_expr, &itervars, "extracted_tensor", true);
    let args: Vec<ExprId> = used.iter().map(|v| res.new_to_old[v]).collect();
    Ok(tm.mk_tensor_call(tensor, &args))
}

struct ExtractReductions<'a> {
    outer_axis: Vec<ExprId>,
    vranges: RangeMap,
    name: &'a str,
}

impl ExtractReductions<'_> {
    fn mutate(&self, tm: &mut ExprManager, e: ExprId) -> Result<ExprId> {
        let ExprKind::Reduce {
            combiner,
            source,
            axis,
            condition,
            value_index,
        } = tm.kind(e).clone()
        else {
            return self.mutate_children(tm, e);
        };

        let inner = ExtractReductions {
            outer_axis: concat(itervars_to_vars(&axis), &self.outer_axis),
            vranges: merge_ranges(&self.vranges, &itervars_to_map(&axis)),
            name: self.name,
        };
        let new_source: Vec<ExprId> = source
            .iter()
            .map(|&s| inner.mutate(tm, s))
            .collect::<Result<_>>()?;

        let new_reduce = tm.mk_reduce(combiner, new_source, axis, condition, value_index);

        let fv: FxHashSet<ExprId> = free_vars(tm, new_reduce).into_iter().collect();
        let vars: Vec<ExprId> = self
            .outer_axis
            .iter()
            .copied()
            .filter(|v| fv.contains(v))
            .collect();
        let itervars = itervars_from_map(tm, &vars, &self.vranges)?;

        // Clone the tensor axes and simplify the body under their ranges
        // before materializing.
        let mut vmap = rustc_hash::FxHashMap::default();
        let mut new_axis = Vec::with_capacity(itervars.len());
        for iv in &itervars {
            let fresh = tm.var_with_suffix(iv.var, "");
            vmap.insert(iv.var, fresh);
            new_axis.push(IterVar {
                var: fresh,
                dom: iv.dom,
            });
        }
        let cloned = substitute(tm, new_reduce, &vmap);
        let body = simplify(tm, cloned, &itervars_to_map(&new_axis));

        let tensor = tensor_from_expr(tm, body, &new_axis, self.name, false);
        Ok(tm.mk_tensor_call(tensor, &vars))
    }

    fn mutate_children(&self, tm: &mut ExprManager, e: ExprId) -> Result<ExprId> {
        // map_children cannot thread a Result, so collect the failure out
        // of band.
        let mut failure = None;
        let out = zeroxide_ir::subst::map_children(tm, e, &mut |tm, c| {
            if failure.is_some() {
                return c;
            }
            match self.mutate(tm, c) {
                Ok(v) => v,
                Err(err) => {
                    failure = Some(err);
                    c
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

/// Extract every reduction inside `expr` as a separate tensor.
pub fn extract_reductions(
    tm: &mut ExprManager,
    expr: ExprId,
    outer_axis: &[ExprId],
    vranges: &RangeMap,
) -> Result<ExprId> {
    ExtractReductions {
        outer_axis: outer_axis.to_vec(),
        vranges: vranges.clone(),
        name: "extracted_reduction",
    }
    .mutate(tm, expr)
}

/// Extract reductions strictly below the top level: a top-level reduction
/// keeps its place but its sources and condition are processed.
pub fn extract_non_top_reductions(
    tm: &mut ExprManager,
    expr: ExprId,
    outer_axis: &[ExprId],
    vranges: &RangeMap,
) -> Result<ExprId> {
    let ExprKind::Reduce {
        combiner,
        source,
        axis,
        condition,
        value_index,
    } = tm.kind(expr).clone()
    else {
        return extract_reductions(tm, expr, outer_axis, vranges);
    };

    let new_outer = concat(itervars_to_vars(&axis), outer_axis);
    let new_vranges = merge_ranges(vranges, &itervars_to_map(&axis));

    let new_source: Vec<ExprId> = source
        .iter()
        .map(|&s| extract_reductions(tm, s, &new_outer, &new_vranges))
        .collect::<Result<_>>()?;
    let new_condition = extract_reductions(tm, condition, &new_outer, &new_vranges)?;

    Ok(tm.mk_reduce(combiner, new_source, axis, new_condition, value_index))
}

/// Expression-level driver; `axis` is the enclosing tensor's iteration
/// space and `vranges` ranges of further outer parameters.
pub fn optimize_and_lift_nonzeroness_conditions_expr(
    tm: &mut ExprManager,
    expr_orig: ExprId,
    axis: &[IterVar],
    vranges: &RangeMap,
) -> Result<ExprId> {
    let combined_vranges = merge_ranges(vranges, &itervars_to_map(axis));
    let outer_vars = itervars_to_vars(axis);

    // Mostly to put combiners into a recognizable shape.
    let expr = simplify(tm, expr_orig, &combined_vranges);

    let result = if let ExprKind::Reduce {
        combiner,
        source,
        axis: red_axis,
        condition,
        value_index,
    } = tm.kind(expr).clone()
    {
        let is_sum = is_sum_combiner(tm, &combiner, vranges);
        if !is_sum && !can_factor_zero_from_combiner(tm, &combiner, value_index, vranges) {
            return simplify_reduction_domain(tm, expr, &combined_vranges);
        }

        // For summations the source's nonzeroness becomes part of the
        // reduction guard before the domain is simplified.
        let mut cond = condition;
        let mut source = source;
        if is_sum {
            let nz = nonzeroness_condition(tm, source[value_index]);
            cond = tm.mk_and(nz.cond, cond);
            source[value_index] = nz.value;
        }

        let new_red = tm.mk_reduce(combiner, source, red_axis, cond, value_index);
        let new_red = simplify_reduction_domain(tm, new_red, &combined_vranges)?;

        let ExprKind::Reduce {
            combiner,
            source,
            axis: red_axis,
            condition,
            value_index,
        } = tm.kind(new_red).clone()
        else {
            // The reduction disappeared entirely; start over on what is
            // left.
            return optimize_and_lift_nonzeroness_conditions_expr(tm, new_red, axis, vranges);
        };

        let (mut outer_cond, reduce_cond) =
            lift_conditions_through_reduction(tm, condition, &red_axis, axis)?;

        let mut new_source = source;
        if !is_sum {
            // The nonzeroness condition was not lifted into the guard
            // above, so handle it here, on the source side.
            let nz = nonzeroness_condition(tm, new_source[value_index]);
            let nz_cond = tm.mk_and(reduce_cond, nz.cond);
            let (outer_nz, inner_nz) =
                lift_conditions_through_reduction(tm, nz_cond, &red_axis, axis)?;
            outer_cond = tm.mk_and(outer_cond, outer_nz);
            new_source[value_index] = select_else_zero(tm, inner_nz, nz.value);
        }

        let new_reduce =
            tm.mk_reduce(combiner, new_source, red_axis, reduce_cond, value_index);
        let new_reduce =
            extract_as_tensor_maybe(tm, new_reduce, outer_cond, &outer_vars, &combined_vranges)?;
        select_else_zero(tm, outer_cond, new_reduce)
    } else {
        let nz = nonzeroness_condition(tm, expr);
        let new_expr =
            extract_as_tensor_maybe(tm, nz.value, nz.cond, &outer_vars, &combined_vranges)?;
        select_else_zero(tm, nz.cond, new_expr)
    };

    // Range facts of the enclosing axes can discharge conditions that the
    // simplifier alone cannot, including divisibility facts.
    let axis_conds = itervars_to_inequalities(tm, axis);
    let result = remove_redundant_inequalities(tm, result, &axis_conds);

    // Extraction may have kept some reductions inline; they must not stay
    // nested inside non-reduction expressions.
    let result = extract_non_top_reductions(tm, result, &outer_vars, &combined_vranges)?;
    Ok(simplify(tm, result, &combined_vranges))
}

/// Rewrite a compute tensor so that summation over provably-zero regions is
/// eliminated and nonzeroness guards surround the result.
pub fn optimize_and_lift_nonzeroness_conditions(
    tm: &mut ExprManager,
    tensor: Tensor,
    vranges: &RangeMap,
) -> Result<Tensor> {
    transform_body(tm, tensor, |tm, body, axis| {
        optimize_and_lift_nonzeroness_conditions_expr(tm, body, axis, vranges)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroxide_ir::expr::{CommReducer, Range};

    fn sum_combiner(tm: &mut ExprManager) -> CommReducer {
        let x = tm.fresh_var("acc", DType::Float32);
        let y = tm.fresh_var("val", DType::Float32);
        let result = tm.mk_add(x, y);
        let zero = tm.mk_float(0.0, DType::Float32);
        CommReducer {
            lhs: vec![x],
            rhs: vec![y],
            result: vec![result],
            identity: vec![zero],
        }
    }

    #[test]
    fn implication_split_respects_variables() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let k = tm.mk_var("k", DType::Int32);
        let zero = tm.mk_int(0);
        let ci = tm.mk_ge(i, zero);
        let ck = tm.mk_ge(k, zero);
        let cond = tm.mk_and(ci, ck);
        let vars: FxHashSet<ExprId> = [k].into_iter().collect();
        let (outer, inner) = implication_not_containing_vars(&mut tm, cond, &vars);
        assert!(!uses_var(&tm, outer, k));
        assert!(uses_var(&tm, inner, k));
    }

    #[test]
    fn point_reduction_collapses() {
        // sum_{k=0..99} select(k == i, A[k], 0) reduces to a guarded read.
        let mut tm = ExprManager::new();
        let a_op = tm.placeholder_op("A", 1, DType::Float32);
        let a = Tensor {
            op: a_op,
            value_index: 0,
        };

        let i = tm.mk_var("i", DType::Int32);
        let k = tm.mk_var("k", DType::Int32);
        let zero = tm.mk_int(0);
        let hundred = tm.mk_int(100);
        let axis_i = IterVar {
            var: i,
            dom: Range {
                min: zero,
                extent: hundred,
            },
        };
        let axis_k = IterVar {
            var: k,
            dom: Range {
                min: zero,
                extent: hundred,
            },
        };

        let combiner = sum_combiner(&mut tm);
        let read = tm.mk_tensor_call(a, &[k]);
        let eq = tm.mk_eq(k, i);
        let source = select_else_zero(&mut tm, eq, read);
        let t = tm.mk_true();
        let red = tm.mk_reduce(combiner, vec![source], vec![axis_k], t, 0);

        let out = optimize_and_lift_nonzeroness_conditions_expr(
            &mut tm,
            red,
            &[axis_i],
            &RangeMap::default(),
        )
        .unwrap();

        // No reduction survives.
        fn contains_reduce(tm: &ExprManager, e: ExprId) -> bool {
            if matches!(tm.kind(e), ExprKind::Reduce { .. }) {
                return true;
            }
            zeroxide_ir::visit::children(tm.kind(e))
                .into_iter()
                .any(|c| contains_reduce(tm, c))
        }
        assert!(!contains_reduce(&tm, out));

        // And the result reads A at i wherever it is nonzero.
        let mut data = |_t: Tensor, coords: &[i64]| {
            zeroxide_ir::eval::Value::Float((coords[0] * 3 + 1) as f64)
        };
        for iv in [0i64, 1, 42, 99] {
            let mut env = zeroxide_ir::eval::VarEnv::default();
            env.insert(i, zeroxide_ir::eval::Value::Int(iv));
            let got = zeroxide_ir::eval::eval_expr(&tm, out, &env, &mut data).unwrap();
            assert_eq!(got, zeroxide_ir::eval::Value::Float((iv * 3 + 1) as f64));
        }
    }
}
