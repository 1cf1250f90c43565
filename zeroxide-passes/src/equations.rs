//! Integer linear equation solving.
//!
//! Extracts the equality conditions of a domain that are linear with
//! constant coefficients, diagonalizes the coefficient matrix with
//! unimodular row and column operations (a Smith-normal-form style
//! reduction), and re-parameterizes the domain over the free variables of
//! the solved system. Divisibility obligations that fall out of the
//! diagonal become conditions; a provably unsatisfiable obligation
//! collapses the result to the empty transformation.
//!
//! ## References
//!
//! - Schrijver: "Theory of Linear and Integer Programming" (1986), ch. 4
//! - Smith: "On systems of linear indeterminate equations and congruences"
//!   (1861)

use num_integer::Integer;
use rustc_hash::{FxHashMap, FxHashSet};
use zeroxide_ir::expr::{ExprId, ExprKind, ExprManager, RangeMap};
use zeroxide_ir::intset::{cover_range, eval_interval, interval_map_from_ranges};
use zeroxide_ir::linear::detect_linear_equation;
use zeroxide_ir::simplify::simplify;
use zeroxide_ir::subst::substitute;

use crate::domain::{empty_transformation, Domain, DomainTransformation};
use crate::util::sorted_ranges;

/// `(g, x, y)` with `g = gcd(a, b) > 0` and `g == x*a + y*b`.
fn xgcd(a: i64, b: i64) -> (i64, i64, i64) {
    let eg = a.extended_gcd(&b);
    if eg.gcd < 0 {
        (-eg.gcd, -eg.x, -eg.y)
    } else {
        (eg.gcd, eg.x, eg.y)
    }
}

/// Solve the equality conditions of `domain` over the integers.
pub fn solve_system_of_equations(tm: &mut ExprManager, domain: &Domain) -> DomainTransformation {
    let vars_size = domain.variables.len();

    // Conditions that are not constant-coefficient linear equalities.
    let mut rest: Vec<ExprId> = Vec::new();
    // Row-major coefficient matrix and its right-hand-side column.
    let mut matrix: Vec<Vec<i64>> = Vec::new();
    let mut rhs: Vec<ExprId> = Vec::new();
    // Maps between old and new variables, kept in matrix form for the old
    // side (each row is an old variable) and as expressions for the new.
    let mut old_to_new: Vec<Vec<i64>> = Vec::new();
    let mut new_to_old: Vec<ExprId> = Vec::new();

    for i in 0..vars_size {
        let mut row = vec![0i64; vars_size];
        row[i] = 1;
        old_to_new.push(row);
        new_to_old.push(domain.variables[i]);
    }

    for &formula in &domain.conditions {
        let equality = match tm.kind(formula) {
            ExprKind::Eq(a, b) => Some((*a, *b)),
            _ => None,
        };
        if let Some((a, b)) = equality {
            let diff = tm.mk_sub(a, b);
            let diff = simplify(tm, diff, &domain.ranges);
            if let Some(coefs) = detect_linear_equation(tm, diff, &domain.variables) {
                let row: Option<Vec<i64>> = coefs[..vars_size]
                    .iter()
                    .map(|&c| tm.as_const_int(c))
                    .collect();
                if let Some(row) = row {
                    matrix.push(row);
                    let last = coefs[vars_size];
                    let zero = tm.mk_zero(tm.dtype(last));
                    rhs.push(tm.mk_sub(zero, last));
                    continue;
                }
            }
        }
        rest.push(formula);
    }

    // Diagonalize. The invariant at `index` is that matrix[i][j] == 0 for
    // all i < index or j < index except the diagonal.
    let mut index = 0usize;
    while index < matrix.len().min(vars_size) {
        // Pick the row at or below `index` whose pivot-column entry has the
        // smallest nonzero magnitude, to keep the numbers tame.
        let mut best_i = index;
        for i in index..matrix.len() {
            let m_old = matrix[best_i][index];
            let m_new = matrix[i][index];
            if m_new != 0 && (m_old == 0 || m_new.abs() < m_old.abs()) {
                best_i = i;
            }
        }
        matrix.swap(index, best_i);
        rhs.swap(index, best_i);

        // Still zero: look right for a column to swap in, which renames the
        // corresponding new variables.
        if matrix[index][index] == 0 {
            for j in index + 1..vars_size {
                if matrix[index][j] != 0 {
                    for row in matrix.iter_mut().skip(index) {
                        row.swap(index, j);
                    }
                    new_to_old.swap(index, j);
                    for row in old_to_new.iter_mut() {
                        row.swap(index, j);
                    }
                    break;
                }
            }
        }

        // Both the row and the column are zero here; nothing to eliminate.
        if matrix[index][index] == 0 {
            index += 1;
            continue;
        }

        // Zero the pivot column below the diagonal by unimodular row
        // operations, built from the identity
        //
        //   [ a   n/g ][ m/g  n/g ]   [ 1  0 ]
        //   [ b  -m/g ][ b    -a  ] = [ 0  1 ]
        //
        // with g = gcd(m, n), g == a*m + b*n.
        for i in index + 1..matrix.len() {
            if matrix[i][index] == 0 {
                continue;
            }
            let m = matrix[index][index];
            let n = matrix[i][index];
            let (g, a, b) = if n % m != 0 {
                xgcd(m, n)
            } else {
                // Keep the pivot row fixed when it already divides; the
                // general identity could loop forever here.
                (m, 1, 0)
            };
            let m_g = m / g;
            let n_g = n / g;
            for j in index..vars_size {
                let new_index_j = a * matrix[index][j] + b * matrix[i][j];
                let new_i_j = n_g * matrix[index][j] - m_g * matrix[i][j];
                matrix[index][j] = new_index_j;
                matrix[i][j] = new_i_j;
            }
            let dtype = tm.dtype(rhs[index]);
            let ea = tm.mk_const(dtype, a);
            let eb = tm.mk_const(dtype, b);
            let e_m_g = tm.mk_const(dtype, m_g);
            let e_n_g = tm.mk_const(dtype, n_g);
            let t1 = tm.mk_mul(ea, rhs[index]);
            let t2 = tm.mk_mul(eb, rhs[i]);
            let new_index_rhs = tm.mk_add(t1, t2);
            let t3 = tm.mk_mul(e_n_g, rhs[index]);
            let t4 = tm.mk_mul(e_m_g, rhs[i]);
            let new_i_rhs = tm.mk_sub(t3, t4);
            rhs[index] = new_index_rhs;
            rhs[i] = new_i_rhs;
        }

        // Now zero the pivot row right of the diagonal by the dual column
        // operations. Columns are variables, so old_to_new follows the
        // matrix and new_to_old takes the inverse transform.
        let mut changed = false;
        for j in index + 1..vars_size {
            if matrix[index][j] == 0 {
                continue;
            }
            let m = matrix[index][index];
            let n = matrix[index][j];
            let (g, a, b) = if n % m != 0 {
                // Column mixing may disturb the zeroed column; redo the
                // whole index in that case.
                changed = true;
                xgcd(m, n)
            } else {
                (m, 1, 0)
            };
            let m_g = m / g;
            let n_g = n / g;
            for row in matrix.iter_mut().skip(index) {
                let new_i_index = a * row[index] + b * row[j];
                let new_i_j = n_g * row[index] - m_g * row[j];
                row[index] = new_i_index;
                row[j] = new_i_j;
            }
            for row in old_to_new.iter_mut() {
                let new_i_index = a * row[index] + b * row[j];
                let new_i_j = n_g * row[index] - m_g * row[j];
                row[index] = new_i_index;
                row[j] = new_i_j;
            }
            let dtype = tm.dtype(new_to_old[index]);
            let ea = tm.mk_const(dtype, a);
            let eb = tm.mk_const(dtype, b);
            let e_m_g = tm.mk_const(dtype, m_g);
            let e_n_g = tm.mk_const(dtype, n_g);
            let t1 = tm.mk_mul(e_m_g, new_to_old[index]);
            let t2 = tm.mk_mul(e_n_g, new_to_old[j]);
            let new_index = tm.mk_add(t1, t2);
            let t3 = tm.mk_mul(eb, new_to_old[index]);
            let t4 = tm.mk_mul(ea, new_to_old[j]);
            let new_j = tm.mk_sub(t3, t4);
            new_to_old[index] = new_index;
            new_to_old[j] = new_j;
        }

        if !changed {
            index += 1;
        }
    }

    for r in rhs.iter_mut() {
        *r = simplify(tm, *r, &domain.ranges);
    }

    // Solvability obligations from the diagonal form.
    let mut conditions: Vec<ExprId> = Vec::new();
    for j in 0..matrix.len() {
        let cond = if j >= vars_size || matrix[j][j] == 0 {
            // Zero row: solvable only with a zero right-hand side.
            let zero = tm.mk_zero(tm.dtype(rhs[j]));
            tm.mk_eq(rhs[j], zero)
        } else {
            // Nonzero diagonal: the entry must divide the right-hand side.
            let dtype = tm.dtype(rhs[j]);
            let d = tm.mk_const(dtype, matrix[j][j].abs());
            let rem = tm.mk_floormod(rhs[j], d);
            let zero = tm.mk_zero(dtype);
            tm.mk_eq(rem, zero)
        };
        let cond = simplify(tm, cond, &domain.ranges);
        if tm.is_false(cond) {
            return empty_transformation(tm, domain);
        }
        if !tm.is_true(cond) {
            conditions.push(cond);
        }
    }

    // Per-variable solutions: a pinned value where the diagonal is
    // nonzero, a fresh variable where it vanishes.
    let mut new_vars: Vec<ExprId> = Vec::new();
    let mut new_to_old_map: FxHashMap<ExprId, ExprId> = FxHashMap::default();
    let mut solution: Vec<ExprId> = Vec::with_capacity(vars_size);
    for j in 0..vars_size {
        if j >= matrix.len() || matrix[j][j] == 0 {
            let to_old = simplify(tm, new_to_old[j], &domain.ranges);
            let mut name = format!("n{}", new_vars.len());
            if let ExprKind::Var { name: old_name, .. } = tm.kind(to_old) {
                name = format!("{name}_{old_name}");
            }
            let v = tm.fresh_var(&name, tm.dtype(new_to_old[j]));
            solution.push(v);
            new_vars.push(v);
            new_to_old_map.insert(v, to_old);
        } else {
            let dtype = tm.dtype(rhs[j]);
            let d = matrix[j][j];
            // Negative divisors trip some simplifiers, so orient them away.
            let sol = if d >= 0 {
                let de = tm.mk_const(dtype, d);
                tm.mk_floordiv(rhs[j], de)
            } else {
                let de = tm.mk_const(dtype, -d);
                let zero = tm.mk_zero(dtype);
                let neg = tm.mk_sub(zero, rhs[j]);
                tm.mk_floordiv(neg, de)
            };
            solution.push(simplify(tm, sol, &domain.ranges));
        }
    }

    let mut old_to_new_map: FxHashMap<ExprId, ExprId> = FxHashMap::default();
    let empty_ranges = RangeMap::default();
    for (i, &old_var) in domain.variables.iter().enumerate() {
        let dtype = tm.dtype(old_var);
        let mut e = tm.mk_zero(dtype);
        for j in 0..vars_size {
            let c = old_to_new[i][j];
            if c == 0 {
                continue;
            }
            let ce = tm.mk_const(dtype, c);
            let term = tm.mk_mul(ce, solution[j]);
            e = tm.mk_add(e, term);
        }
        let e = simplify(tm, e, &empty_ranges);
        old_to_new_map.insert(old_var, e);
    }

    // Ranges: outer variables keep theirs, new variables get ranges
    // inferred from what they stand for.
    let sorted_domain_ranges = sorted_ranges(tm, &domain.ranges);
    let domain_var_set: FxHashSet<ExprId> = domain.variables.iter().copied().collect();
    let mut ranges = RangeMap::default();
    for &(v, r) in &sorted_domain_ranges {
        if !domain_var_set.contains(&v) {
            ranges.insert(v, r);
        }
    }
    let var_intsets = interval_map_from_ranges(tm, &domain.ranges);
    for &v in &new_vars {
        let to_old = new_to_old_map[&v];
        let set = eval_interval(tm, to_old, &var_intsets, &domain.ranges);
        if let Some(range) = cover_range(tm, set, &domain.ranges) {
            ranges.insert(v, range);
        }
    }

    // The old ranges usually constrain the new variables more tightly than
    // the inferred ranges, so they come back as conditions.
    for &(v, r) in &sorted_domain_ranges {
        if let Some(&in_terms_of_new) = old_to_new_map.get(&v) {
            let lower = tm.mk_le(r.min, in_terms_of_new);
            let lower = simplify(tm, lower, &ranges);
            let end = tm.mk_add(r.min, r.extent);
            let upper = tm.mk_lt(in_terms_of_new, end);
            let upper = simplify(tm, upper, &ranges);
            if !tm.is_true(lower) {
                conditions.push(lower);
            }
            if !tm.is_true(upper) {
                conditions.push(upper);
            }
        }
    }

    for &cond in &rest {
        conditions.push(substitute(tm, cond, &old_to_new_map));
    }

    let new_domain = Domain::new(new_vars, conditions, ranges);
    DomainTransformation {
        new_domain,
        old_domain: domain.clone(),
        new_to_old: new_to_old_map,
        old_to_new: old_to_new_map,
    }
}
