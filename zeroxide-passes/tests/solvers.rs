//! Brute-force soundness checks for the domain machinery: equation
//! solving, inequality solving, deskewing and the combined pipeline.

mod common;

use common::*;
use zeroxide_ir::expr::{ExprId, ExprManager, RangeMap};
use zeroxide_ir::DType;
use zeroxide_passes::domain::{simplify_domain, Domain};
use zeroxide_passes::equations::solve_system_of_equations;
use zeroxide_passes::inequalities::solve_system_of_inequalities;
use zeroxide_passes::util::{all_of, itervars_to_map, itervars_to_vars};

fn check_simplify_domain(
    tm: &mut ExprManager,
    conds: &[ExprId],
    axis: &[zeroxide_ir::expr::IterVar],
    outer: &[(ExprId, i64, i64)],
    expected_volume: Option<i64>,
) {
    let mut ranges = itervars_to_map(axis);
    for &(v, min, extent) in outer {
        ranges.insert(v, const_range(tm, min, extent));
    }
    let domain = Domain::new(itervars_to_vars(axis), conds.to_vec(), ranges);
    let tr = simplify_domain(tm, &domain, true).unwrap();
    check_domain_transformation(tm, &tr, outer);

    if let Some(volume) = expected_volume {
        assert_eq!(box_volume(tm, &tr.new_domain), volume);
    }

    // Simplifying again must not find further improvement of the box.
    let tr2 = simplify_domain(tm, &tr.new_domain, true).unwrap();
    check_domain_transformation(tm, &tr2, outer);
    if let (Some(v1), Some(v2)) = (
        try_box_volume(tm, &tr.new_domain),
        try_box_volume(tm, &tr2.new_domain),
    ) {
        assert_eq!(v1, v2, "a second simplification changed the volume");
    }
}

fn try_box_volume(tm: &ExprManager, domain: &Domain) -> Option<i64> {
    domain
        .variables
        .iter()
        .map(|v| tm.as_const_int(domain.ranges[v].extent))
        .product()
}

#[test]
fn equations_parameterize_a_line() {
    // { i + 2j == 4 } with i, j in [0, 8): one free variable remains.
    let mut tm = ExprManager::new();
    let i = tm.mk_var("i", DType::Int32);
    let j = tm.mk_var("j", DType::Int32);
    let two = tm.mk_int(2);
    let four = tm.mk_int(4);
    let jj = tm.mk_mul(two, j);
    let lhs = tm.mk_add(i, jj);
    let cond = tm.mk_eq(lhs, four);

    let mut ranges = RangeMap::default();
    ranges.insert(i, const_range(&mut tm, 0, 8));
    ranges.insert(j, const_range(&mut tm, 0, 8));
    let domain = Domain::new(vec![i, j], vec![cond], ranges);

    let tr = solve_system_of_equations(&mut tm, &domain);
    assert_eq!(tr.new_domain.variables.len(), 1);
    check_domain_transformation(&mut tm, &tr, &[]);

    // After the full pipeline the free direction has exactly the three
    // points (i, j) in { (4, 0), (2, 1), (0, 2) }.
    let mut tm = ExprManager::new();
    let i = tm.mk_var("i", DType::Int32);
    let j = tm.mk_var("j", DType::Int32);
    let two = tm.mk_int(2);
    let four = tm.mk_int(4);
    let jj = tm.mk_mul(two, j);
    let lhs = tm.mk_add(i, jj);
    let cond = tm.mk_eq(lhs, four);
    let mut ranges = RangeMap::default();
    ranges.insert(i, const_range(&mut tm, 0, 8));
    ranges.insert(j, const_range(&mut tm, 0, 8));
    let domain = Domain::new(vec![i, j], vec![cond], ranges);
    let tr = simplify_domain(&mut tm, &domain, true).unwrap();
    check_domain_transformation(&mut tm, &tr, &[]);
    assert_eq!(box_volume(&tm, &tr.new_domain), 3);
}

#[test]
fn inequalities_preserve_the_solution_set() {
    // { x >= 0, x < 10, 2x >= 5 } stays equivalent after solving.
    let mut tm = ExprManager::new();
    let x = tm.mk_var("x", DType::Int32);
    let zero = tm.mk_int(0);
    let ten = tm.mk_int(10);
    let two = tm.mk_int(2);
    let five = tm.mk_int(5);
    let f1 = tm.mk_ge(x, zero);
    let f2 = tm.mk_lt(x, ten);
    let xx = tm.mk_mul(two, x);
    let f3 = tm.mk_ge(xx, five);

    let before = all_of(&mut tm, &[f1, f2, f3]);
    let res = solve_system_of_inequalities(&mut tm, &[f1, f2, f3], &[x], &RangeMap::default());
    let conds = res.as_conditions(&mut tm);
    let after = all_of(&mut tm, &conds);

    let eq = tm.mk_eq(before, after);
    // x ranges wider than the system so both sides get exercised.
    check_bruteforce(&tm, eq, &[(x, -5, 25)], None);
}

#[test]
fn simplify_domain_volume_table() {
    // Equalities and inequalities from the original regression table.
    let mut tm = ExprManager::new();
    let k = iter_var(&mut tm, "k", 0, 5);
    let l = iter_var(&mut tm, "l", 0, 5);
    let n = iter_var(&mut tm, "n", 0, 5);
    let axis = [k, l, n];

    // k == l pins one variable: 5 * 5 points.
    let eq = tm.mk_eq(k.var, l.var);
    check_simplify_domain(&mut tm, &[eq], &axis, &[], Some(25));

    // k == l and l < n.
    let ln = tm.mk_lt(l.var, n.var);
    let both = tm.mk_and(eq, ln);
    check_simplify_domain(&mut tm, &[both], &axis, &[], None);

    // 2l == k: l in [0, 3), k determined.
    let two = tm.mk_int(2);
    let ll = tm.mk_mul(two, l.var);
    let eq2 = tm.mk_eq(ll, k.var);
    check_simplify_domain(&mut tm, &[eq2], &axis, &[], Some(15));
}

#[test]
fn simplify_domain_with_divmod() {
    // { n / 5 == k, n % 5 == l } couples three variables into one.
    let mut tm = ExprManager::new();
    let k = iter_var(&mut tm, "k", 0, 6);
    let l = iter_var(&mut tm, "l", 0, 5);
    let n = iter_var(&mut tm, "n", 0, 30);
    let five = tm.mk_int(5);
    let div = tm.mk_truncdiv(n.var, five);
    let c1 = tm.mk_eq(div, k.var);
    let rem = tm.mk_truncmod(n.var, five);
    let c2 = tm.mk_eq(rem, l.var);
    let cond = tm.mk_and(c1, c2);
    check_simplify_domain(&mut tm, &[cond], &[l, k, n], &[], Some(30));
}

#[test]
fn simplify_domain_with_linear_coupling() {
    // { k + 6l == n } with matching ranges: volume collapses to 30.
    let mut tm = ExprManager::new();
    let k = iter_var(&mut tm, "k", 0, 6);
    let l = iter_var(&mut tm, "l", 0, 5);
    let n = iter_var(&mut tm, "n", 0, 30);
    let six = tm.mk_int(6);
    let ll = tm.mk_mul(six, l.var);
    let lhs = tm.mk_add(k.var, ll);
    let cond = tm.mk_eq(lhs, n.var);
    check_simplify_domain(&mut tm, &[cond], &[k, l, n], &[], Some(30));
    // The variable order must not matter for soundness.
    let mut tm = ExprManager::new();
    let k = iter_var(&mut tm, "k", 0, 6);
    let l = iter_var(&mut tm, "l", 0, 5);
    let n = iter_var(&mut tm, "n", 0, 30);
    let six = tm.mk_int(6);
    let ll = tm.mk_mul(six, l.var);
    let lhs = tm.mk_add(k.var, ll);
    let cond = tm.mk_eq(lhs, n.var);
    check_simplify_domain(&mut tm, &[cond], &[n, k, l], &[], Some(30));
}

#[test]
fn simplify_domain_with_outer_parameter() {
    // { l - k < m, l >= k } for an outer parameter m.
    let mut tm = ExprManager::new();
    let k = iter_var(&mut tm, "k", 0, 5);
    let l = iter_var(&mut tm, "l", 0, 5);
    let m = tm.mk_var("m", DType::Int32);
    let diff = tm.mk_sub(l.var, k.var);
    let c1 = tm.mk_lt(diff, m);
    let c2 = tm.mk_ge(l.var, k.var);
    let cond = tm.mk_and(c1, c2);
    check_simplify_domain(&mut tm, &[cond], &[k, l], &[(m, 0, 3)], None);
}

#[test]
fn empty_domains_collapse() {
    // { k == 7 } with k in [0, 5) is unsatisfiable.
    let mut tm = ExprManager::new();
    let k = iter_var(&mut tm, "k", 0, 5);
    let seven = tm.mk_int(7);
    let cond = tm.mk_eq(k.var, seven);
    let mut ranges = RangeMap::default();
    ranges.insert(k.var, k.dom);
    let domain = Domain::new(vec![k.var], vec![cond], ranges);
    let tr = simplify_domain(&mut tm, &domain, true).unwrap();
    // Either the empty transformation or a domain with an unsatisfiable
    // condition; both must have no models.
    let mut models = 0;
    common::for_each_domain_point(
        &tm,
        &tr.new_domain,
        &zeroxide_ir::eval::VarEnv::default(),
        &mut |_| models += 1,
    );
    assert_eq!(models, 0);
    check_domain_transformation(&mut tm, &tr, &[]);
}
