//! Domain deskewing.
//!
//! Rewrites each domain variable as `new_var + lower` for the provably
//! tightest lower bound available, giving every surviving variable a range
//! of the form `[0, extent)`. Bounds come from Fourier-Motzkin elimination
//! over the domain conditions; variables pinned by an equality disappear
//! entirely.
//!
//! Variables are processed in reverse order so that the replacement of a
//! later variable may refer to earlier ones, which is what makes dependent
//! (triangular) ranges expressible.

use rustc_hash::FxHashMap;
use zeroxide_ir::expr::{ExprId, ExprManager, Range, RangeMap};
use zeroxide_ir::intset::{eval_interval, interval_map_from_ranges, IntSet};
use zeroxide_ir::simplify::{can_prove, simplify};
use zeroxide_ir::subst::substitute;

use zeroxide_ir::compare::deep_compare;

use crate::domain::{Domain, DomainTransformation};
use crate::inequalities::solve_system_of_inequalities;
use crate::util::sorted_ranges;

/// Deskew `domain` using bounds derived from its conditions.
pub fn deskew_domain(tm: &mut ExprManager, domain: &Domain) -> DomainTransformation {
    let mut res_ranges = RangeMap::default();

    // Domain variables first, then outer variables from the range map, so
    // bounds for domain variables may mention the outer ones.
    let mut vars = domain.variables.clone();
    for (v, r) in sorted_ranges(tm, &domain.ranges) {
        if !vars.contains(&v) {
            vars.push(v);
            res_ranges.insert(v, r);
        }
    }

    let solved = solve_system_of_inequalities(tm, &domain.conditions, &vars, &domain.ranges);

    let mut res_old_to_new: FxHashMap<ExprId, ExprId> = FxHashMap::default();
    let mut res_new_to_old: FxHashMap<ExprId, ExprId> = FxHashMap::default();
    let mut res_variables: Vec<ExprId> = Vec::new();
    let mut res_conditions: Vec<ExprId> = Vec::new();
    let mut new_var_intsets = interval_map_from_ranges(tm, &domain.ranges);
    let mut vranges = domain.ranges.clone();

    for &var in domain.variables.iter().rev() {
        let bnd = solved.bounds[&var].substitute(tm, &res_old_to_new);

        if tm.is_const_int(bnd.coef, 1) && !bnd.equal.is_empty() {
            // Pinned by an equation; the list is sorted by complexity, so
            // the first entry is the simplest replacement.
            res_old_to_new.insert(var, bnd.equal[0]);
            continue;
        }

        let dtype = tm.dtype(var);
        let mut lowers = bnd.equal.clone();
        lowers.extend(bnd.lower.iter().copied());
        let mut uppers = bnd.equal.clone();
        uppers.extend(bnd.upper.iter().copied());
        lowers.sort_by(|a, b| deep_compare(tm, *a, *b));
        uppers.sort_by(|a, b| deep_compare(tm, *a, *b));

        let range = vranges[&var];
        let range_min = simplify(tm, range.min, &vranges);
        let mut best_lower = range_min;
        let one = tm.mk_one(dtype);
        let ext_minus_one = tm.mk_sub(range.extent, one);
        let mut best_diff_over = simplify(tm, ext_minus_one, &vranges);

        // Try every pair of bounds and keep the one with the provably
        // smallest over-approximated extent. Iteration order breaks ties
        // toward earlier (structurally simpler) pairs.
        for &low in &lowers {
            for &upp in &uppers {
                let num = tm.mk_sub(upp, low);
                let d1 = tm.mk_floordiv(num, bnd.coef);
                let diff_1 = simplify(tm, d1, &vranges);
                let set = eval_interval(tm, diff_1, &new_var_intsets, &vranges);
                let Some(over_1) = set.max else {
                    continue;
                };
                let mut diff_over_1 = simplify(tm, over_1, &vranges);

                // The lower bound constrains coef*v, so the bound on v
                // itself needs a rounding-up division.
                let bump = tm.mk_add(low, bnd.coef);
                let bump = tm.mk_sub(bump, one);
                let ld = tm.mk_floordiv(bump, bnd.coef);
                let low_divided = simplify(tm, ld, &vranges);

                // A second candidate that is sometimes tighter.
                let ud = tm.mk_floordiv(upp, bnd.coef);
                let d2 = tm.mk_sub(ud, low_divided);
                let diff_2 = simplify(tm, d2, &vranges);
                let set2 = eval_interval(tm, diff_2, &new_var_intsets, &vranges);
                if let Some(over_2) = set2.max {
                    let diff_over_2 = simplify(tm, over_2, &vranges);
                    let zero = tm.mk_zero(dtype);
                    let cmp = tm.mk_sub(diff_over_2, diff_over_1);
                    let better = tm.mk_lt(cmp, zero);
                    if can_prove(tm, better, &RangeMap::default()) {
                        diff_over_1 = diff_over_2;
                    }
                }

                let zero = tm.mk_zero(dtype);
                let cmp = tm.mk_sub(diff_over_1, best_diff_over);
                let strictly_better = tm.mk_lt(cmp, zero);
                if can_prove(tm, strictly_better, &vranges) {
                    best_lower = low_divided;
                    best_diff_over = diff_over_1;
                }
            }
        }

        let diff = simplify(tm, best_diff_over, &vranges);
        if tm.is_const_int(diff, 0) {
            // A single point; no iteration variable needed.
            res_old_to_new.insert(var, best_lower);
            continue;
        }

        let suffix = if best_lower == range_min { "" } else { ".shifted" };
        let new_var = tm.var_with_suffix(var, suffix);

        let replacement = tm.mk_add(new_var, best_lower);
        res_old_to_new.insert(var, replacement);
        // best_lower is phrased over new variables; the reverse map needs
        // it back in old terms.
        let back = substitute(tm, best_lower, &res_new_to_old);
        let to_old = tm.mk_sub(var, back);
        let to_old = simplify(tm, to_old, &vranges);
        res_new_to_old.insert(new_var, to_old);

        let zero = tm.mk_zero(dtype);
        new_var_intsets.insert(
            new_var,
            IntSet {
                min: Some(zero),
                max: Some(diff),
            },
        );
        let ext = tm.mk_add(diff, one);
        let extent = simplify(tm, ext, &vranges);
        let range = Range { min: zero, extent };
        res_variables.push(new_var);
        res_ranges.insert(new_var, range);
        vranges.insert(new_var, range);
    }

    for cond in solved.as_conditions(tm) {
        let subbed = substitute(tm, cond, &res_old_to_new);
        let new_cond = simplify(tm, subbed, &vranges);
        if !tm.is_true(new_cond) {
            res_conditions.push(new_cond);
        }
    }

    // Processing went from the most dependent variable backwards; restore
    // the original orientation.
    res_variables.reverse();

    let new_domain = Domain::new(res_variables, res_conditions, res_ranges);
    DomainTransformation {
        new_domain,
        old_domain: domain.clone(),
        new_to_old: res_new_to_old,
        old_to_new: res_old_to_new,
    }
}
