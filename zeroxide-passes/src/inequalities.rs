//! Fourier-Motzkin elimination over integer linear inequalities.
//!
//! Variables are eliminated in the given order: inequalities are classified
//! by the sign of the variable's coefficient, opposite-sign pairs combine
//! into variable-free consequences, and the surviving constraints are
//! re-expressed as per-variable bound bundles (`coef * v` between lower and
//! upper bound sets, with coinciding bounds promoted to equalities).
//!
//! The working set is kept sorted by structural comparison so neighbor
//! subsumption checks and the final output are deterministic. Variable
//! ranges participate as additional bounds and as the provability context
//! for subsumption, which prunes far more than syntactic checks alone.
//!
//! ## Complexity
//!
//! Worst case O(n^2) new constraints per eliminated variable; subsumption
//! keeps realistic systems small.
//!
//! ## References
//!
//! - Dantzig & Eaves: "Fourier-Motzkin Elimination and Its Dual" (1973)
//! - Pugh: "The Omega Test" (1992)

use num_integer::Integer;
use rustc_hash::FxHashMap;
use zeroxide_ir::compare::deep_compare;
use zeroxide_ir::expr::{ExprId, ExprKind, ExprManager, RangeMap};
use zeroxide_ir::linear::detect_linear_equation;
use zeroxide_ir::simplify::{can_prove, simplify};
use zeroxide_ir::subst::substitute;

use crate::atomic::normalize_comparisons;

/// Bounds gathered for one variable: `coef * v` lies in every `equal`,
/// above every `lower` and below every `upper`.
#[derive(Debug, Clone)]
pub struct VarBounds {
    /// Common positive multiplier of the variable.
    pub coef: ExprId,
    /// Exact values of `coef * v`.
    pub equal: Vec<ExprId>,
    /// Lower bounds of `coef * v`.
    pub lower: Vec<ExprId>,
    /// Upper bounds of `coef * v`.
    pub upper: Vec<ExprId>,
}

impl VarBounds {
    /// Apply a substitution to every bound expression.
    pub fn substitute(
        &self,
        tm: &mut ExprManager,
        map: &FxHashMap<ExprId, ExprId>,
    ) -> VarBounds {
        let apply = |tm: &mut ExprManager, es: &[ExprId]| -> Vec<ExprId> {
            es.iter().map(|&e| substitute(tm, e, map)).collect()
        };
        VarBounds {
            coef: substitute(tm, self.coef, map),
            equal: apply(tm, &self.equal),
            lower: apply(tm, &self.lower),
            upper: apply(tm, &self.upper),
        }
    }
}

/// Outcome of inequality solving.
#[derive(Debug, Clone)]
pub struct InequalitySolution {
    /// The variables, in elimination order.
    pub variables: Vec<ExprId>,
    /// Bound bundle per variable.
    pub bounds: FxHashMap<ExprId, VarBounds>,
    /// Conditions that are not linear bounds on the variables. A single
    /// `false` marks a provably empty system.
    pub other_conditions: Vec<ExprId>,
}

impl InequalitySolution {
    /// Flatten the solution back into a condition list.
    pub fn as_conditions(&self, tm: &mut ExprManager) -> Vec<ExprId> {
        let mut res = Vec::new();
        for &v in &self.variables {
            let bnds = &self.bounds[&v];
            let lhs = if tm.is_const_int(bnds.coef, 1) {
                v
            } else {
                tm.mk_mul(bnds.coef, v)
            };
            let (equal, lower, upper) =
                (bnds.equal.clone(), bnds.lower.clone(), bnds.upper.clone());
            for rhs in equal {
                res.push(tm.mk_eq(lhs, rhs));
            }
            for rhs in lower {
                res.push(tm.mk_ge(lhs, rhs));
            }
            for rhs in upper {
                res.push(tm.mk_le(lhs, rhs));
            }
        }
        res.extend(self.other_conditions.iter().copied());
        res
    }
}

/// A working set of normalized inequalities, sorted structurally.
struct SortedSet {
    items: Vec<ExprId>,
}

impl SortedSet {
    fn new() -> Self {
        SortedSet { items: Vec::new() }
    }

    fn position(&self, tm: &ExprManager, e: ExprId) -> Result<usize, usize> {
        self.items.binary_search_by(|&x| deep_compare(tm, x, e))
    }
}

/// Insert `new_ineq` unless it is redundant; drop neighbors it subsumes.
fn add_to_set(tm: &mut ExprManager, set: &mut SortedSet, vranges: &RangeMap, new_ineq: ExprId) {
    if can_prove(tm, new_ineq, vranges) {
        // Follows from the ranges alone.
        return;
    }
    let ExprKind::Le(new_lhs, _) = *tm.kind(new_ineq) else {
        if let Err(pos) = set.position(tm, new_ineq) {
            set.items.insert(pos, new_ineq);
        }
        return;
    };
    let mut pos = match set.position(tm, new_ineq) {
        Ok(_) => return,
        Err(pos) => pos,
    };
    let le_lhs_at = |tm: &ExprManager, e: ExprId| match tm.kind(e) {
        ExprKind::Le(lhs, _) => Some(*lhs),
        _ => None,
    };
    // Structurally adjacent inequalities usually differ only in their
    // constant part, so checking just the neighbors removes most
    // subsumption cheaply.
    if pos > 0
        && let Some(le_lhs) = le_lhs_at(tm, set.items[pos - 1])
    {
        let zero = tm.mk_zero(tm.dtype(new_lhs));
        let diff = tm.mk_sub(new_lhs, le_lhs);
        let implied = tm.mk_le(diff, zero);
        if can_prove(tm, implied, vranges) {
            return;
        }
        let diff = tm.mk_sub(le_lhs, new_lhs);
        let implies = tm.mk_le(diff, zero);
        if can_prove(tm, implies, vranges) {
            set.items.remove(pos - 1);
            pos -= 1;
        }
    }
    if pos < set.items.len()
        && let Some(le_lhs) = le_lhs_at(tm, set.items[pos])
    {
        let zero = tm.mk_zero(tm.dtype(new_lhs));
        let diff = tm.mk_sub(new_lhs, le_lhs);
        let implied = tm.mk_le(diff, zero);
        if can_prove(tm, implied, vranges) {
            return;
        }
        let diff = tm.mk_sub(le_lhs, new_lhs);
        let implies = tm.mk_le(diff, zero);
        if can_prove(tm, implies, vranges) {
            set.items.remove(pos);
        }
    }
    set.items.insert(pos, new_ineq);
}

/// Solve a system of inequalities over `variables` by Fourier-Motzkin
/// elimination, using `vranges` both as extra bounds and as the proving
/// context.
pub fn solve_system_of_inequalities(
    tm: &mut ExprManager,
    inequalities: &[ExprId],
    variables: &[ExprId],
    vranges: &RangeMap,
) -> InequalitySolution {
    let mut res = InequalitySolution {
        variables: variables.to_vec(),
        bounds: FxHashMap::default(),
        other_conditions: Vec::new(),
    };

    let mut current = SortedSet::new();
    let mut new_current = SortedSet::new();
    // Formulas nothing could be done with.
    let mut rest: Vec<ExprId> = Vec::new();

    for &ineq in inequalities {
        let s = simplify(tm, ineq, vranges);
        let n = normalize_comparisons(tm, s);
        add_to_set(tm, &mut new_current, vranges, n);
    }
    std::mem::swap(&mut current, &mut new_current);

    for &v in variables {
        assert!(
            !res.bounds.contains_key(&v),
            "variable {} appears twice in the elimination order",
            tm.var_name(v)
        );

        new_current.items.clear();
        // Formulas `c*v + e <= 0` split by the sign of c.
        let mut coef_pos: Vec<(i64, ExprId)> = Vec::new();
        let mut coef_neg: Vec<(i64, ExprId)> = Vec::new();

        // The variable's own range contributes a bound on each side.
        if let Some(&range) = vranges.get(&v) {
            let lbound = simplify(tm, range.min, vranges);
            let one = tm.mk_one(tm.dtype(range.min));
            let end = tm.mk_add(range.min, range.extent);
            let last = tm.mk_sub(end, one);
            let ubound = simplify(tm, last, vranges);
            let zero = tm.mk_zero(tm.dtype(ubound));
            let neg_ubound = tm.mk_sub(zero, ubound);
            coef_neg.push((-1, lbound));
            coef_pos.push((1, neg_ubound));
        }

        let items = current.items.clone();
        for &ineq in &items {
            let shape = match tm.kind(ineq) {
                ExprKind::Le(lhs, _) => Some((*lhs, false)),
                ExprKind::Eq(lhs, _) => Some((*lhs, true)),
                _ => None,
            };
            let classified = shape.and_then(|(lhs, is_eq)| {
                classify(tm, lhs, v).map(|(c, rest_expr)| (c, rest_expr, is_eq))
            });
            match classified {
                Some((0, _, _)) => add_to_set(tm, &mut new_current, vranges, ineq),
                Some((c, e, false)) => {
                    if c > 0 {
                        coef_pos.push((c, e));
                    } else {
                        coef_neg.push((c, e));
                    }
                }
                Some((c, e, true)) => {
                    // An equality is a pair of opposite inequalities.
                    let zero = tm.mk_zero(tm.dtype(e));
                    let neg_e = tm.mk_sub(zero, e);
                    if c > 0 {
                        coef_pos.push((c, e));
                        coef_neg.push((-c, neg_e));
                    } else {
                        coef_pos.push((-c, neg_e));
                        coef_neg.push((c, e));
                    }
                }
                None => rest.push(ineq),
            }
        }

        // Pairwise combination eliminates v.
        for &(pc, pe) in &coef_pos {
            for &(nc, ne) in &coef_neg {
                let g = pc.gcd(&-nc);
                let dtype = tm.dtype(pe);
                let c_pos = tm.mk_const(dtype, nc / g);
                let c_neg = tm.mk_const(dtype, pc / g);
                let left = tm.mk_mul(c_neg, ne);
                let right = tm.mk_mul(c_pos, pe);
                let new_lhs = tm.mk_sub(left, right);
                let zero = tm.mk_zero(dtype);
                let new_ineq = tm.mk_le(new_lhs, zero);
                let s = simplify(tm, new_ineq, vranges);
                let n = normalize_comparisons(tm, s);
                add_to_set(tm, &mut new_current, vranges, n);
            }
        }

        // Express the surviving bounds against the common multiplier.
        let mut coef_lcm: i64 = 1;
        for &(c, _) in &coef_pos {
            coef_lcm = coef_lcm.lcm(&c);
        }
        for &(c, _) in &coef_neg {
            coef_lcm = coef_lcm.lcm(&-c);
        }

        let dtype = tm.dtype(v);
        let mut upper_bounds: Vec<ExprId> = Vec::with_capacity(coef_pos.len());
        let mut lower_bounds: Vec<ExprId> = Vec::with_capacity(coef_neg.len());
        for &(c, e) in &coef_pos {
            let mult = tm.mk_const(dtype, -coef_lcm / c);
            let bound = tm.mk_mul(mult, e);
            let bound = simplify(tm, bound, vranges);
            push_bound(tm, &mut upper_bounds, bound, vranges, true);
        }
        for &(c, e) in &coef_neg {
            let mult = tm.mk_const(dtype, -coef_lcm / c);
            let bound = tm.mk_mul(mult, e);
            let bound = simplify(tm, bound, vranges);
            push_bound(tm, &mut lower_bounds, bound, vranges, false);
        }

        for bounds in [&mut upper_bounds, &mut lower_bounds] {
            bounds.sort_by(|a, b| deep_compare(tm, *a, *b));
            bounds.dedup();
        }

        let equal = crate::util::intersect_sorted(tm, &upper_bounds, &lower_bounds);
        let upper = crate::util::difference_sorted(tm, &upper_bounds, &equal);
        let lower = crate::util::difference_sorted(tm, &lower_bounds, &equal);

        res.bounds.insert(
            v,
            VarBounds {
                coef: tm.mk_const(dtype, coef_lcm),
                equal,
                lower,
                upper,
            },
        );

        std::mem::swap(&mut current, &mut new_current);
    }

    let leftover = current.items.clone();
    for &e in &leftover {
        let s = simplify(tm, e, vranges);
        if tm.is_false(s) {
            // The system is contradictory.
            res.other_conditions = vec![tm.mk_false()];
            return res;
        }
        if tm.is_true(s) {
            continue;
        }
        res.other_conditions.push(s);
    }
    res.other_conditions.extend(rest);
    res
}

/// Coefficient of `v` in `lhs` plus the variable-free remainder, when `lhs`
/// is linear in `v` with a constant coefficient.
fn classify(tm: &mut ExprManager, lhs: ExprId, v: ExprId) -> Option<(i64, ExprId)> {
    let coefs = detect_linear_equation(tm, lhs, &[v])?;
    let c = tm.as_const_int(coefs[0])?;
    Some((c, coefs[1]))
}

/// Keep only incomparable bounds: skip dominated newcomers, evict dominated
/// incumbents. `upper` selects the direction of domination.
fn push_bound(
    tm: &mut ExprManager,
    bounds: &mut Vec<ExprId>,
    bound: ExprId,
    vranges: &RangeMap,
    upper: bool,
) {
    let dominated = |tm: &mut ExprManager, o: ExprId, b: ExprId| -> bool {
        let zero = tm.mk_zero(tm.dtype(b));
        let diff = tm.mk_sub(o, b);
        let cond = if upper {
            tm.mk_le(diff, zero)
        } else {
            tm.mk_ge(diff, zero)
        };
        can_prove(tm, cond, vranges)
    };
    for i in 0..bounds.len() {
        let o = bounds[i];
        if dominated(tm, o, bound) {
            return;
        }
    }
    let mut kept = Vec::with_capacity(bounds.len() + 1);
    for &o in bounds.iter() {
        let zero = tm.mk_zero(tm.dtype(bound));
        let diff = tm.mk_sub(o, bound);
        let cond = if upper {
            tm.mk_ge(diff, zero)
        } else {
            tm.mk_le(diff, zero)
        };
        if !can_prove(tm, cond, vranges) {
            kept.push(o);
        }
    }
    kept.push(bound);
    *bounds = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroxide_ir::expr::Range;
    use zeroxide_ir::DType;

    #[test]
    fn single_variable_bounds() {
        // { x >= 0, x < 10, 2x >= 5 } over x with no ranges.
        let mut tm = ExprManager::new();
        let x = tm.mk_var("x", DType::Int32);
        let zero = tm.mk_int(0);
        let ten = tm.mk_int(10);
        let two = tm.mk_int(2);
        let five = tm.mk_int(5);
        let ineq1 = tm.mk_ge(x, zero);
        let ineq2 = tm.mk_lt(x, ten);
        let xx = tm.mk_mul(two, x);
        let ineq3 = tm.mk_ge(xx, five);

        let res = solve_system_of_inequalities(
            &mut tm,
            &[ineq1, ineq2, ineq3],
            &[x],
            &RangeMap::default(),
        );
        let bnds = &res.bounds[&x];
        assert!(tm.is_const_int(bnds.coef, 2));
        assert!(bnds.equal.is_empty());
        // 2x >= 5 survives; 2x >= 0 is dominated by it.
        assert_eq!(bnds.lower.len(), 1);
        assert!(tm.is_const_int(bnds.lower[0], 5));
        // x < 10 normalizes to x - 9 <= 0, i.e. 2x <= 18.
        assert_eq!(bnds.upper.len(), 1);
        assert!(tm.is_const_int(bnds.upper[0], 18));
        assert!(res.other_conditions.is_empty());
    }

    #[test]
    fn contradiction_is_reported_as_false() {
        let mut tm = ExprManager::new();
        let x = tm.mk_var("x", DType::Int32);
        let zero = tm.mk_int(0);
        let ten = tm.mk_int(10);
        let lt = tm.mk_lt(x, zero);
        let gt = tm.mk_gt(x, ten);
        let mut ranges = RangeMap::default();
        ranges.insert(
            x,
            Range {
                min: zero,
                extent: ten,
            },
        );
        let res = solve_system_of_inequalities(&mut tm, &[lt, gt], &[x], &ranges);
        let f = tm.mk_false();
        assert_eq!(res.other_conditions, vec![f]);
    }

    #[test]
    fn equalities_bound_both_sides() {
        // { x == y } with both in [0, 10).
        let mut tm = ExprManager::new();
        let x = tm.mk_var("x", DType::Int32);
        let y = tm.mk_var("y", DType::Int32);
        let zero = tm.mk_int(0);
        let ten = tm.mk_int(10);
        let mut ranges = RangeMap::default();
        ranges.insert(
            x,
            Range {
                min: zero,
                extent: ten,
            },
        );
        ranges.insert(
            y,
            Range {
                min: zero,
                extent: ten,
            },
        );
        let eq = tm.mk_eq(x, y);
        let res = solve_system_of_inequalities(&mut tm, &[eq], &[x, y], &ranges);
        let bx = &res.bounds[&x];
        assert!(tm.is_const_int(bx.coef, 1));
        assert_eq!(bx.equal.len(), 1);
        assert!(zeroxide_ir::visit::uses_var(&tm, bx.equal[0], y));
    }
}
