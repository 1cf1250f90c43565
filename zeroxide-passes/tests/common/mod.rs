//! Shared brute-force checking utilities.
//!
//! Every soundness check here enumerates concrete assignments and runs the
//! reference interpreter, so the assertions hold for the actual semantics
//! rather than for a particular syntactic shape.

// Each integration test binary compiles this module separately and uses a
// different subset of it.
#![allow(dead_code)]

use rustc_hash::FxHashMap;
use zeroxide_ir::eval::{eval_expr, Value, VarEnv};
use zeroxide_ir::expr::{CommReducer, ExprId, ExprManager, IterVar, Range, RangeMap, Tensor};
use zeroxide_ir::DType;
use zeroxide_passes::domain::{Domain, DomainTransformation};

/// A concrete, constant range.
pub fn const_range(tm: &mut ExprManager, min: i64, extent: i64) -> Range {
    Range {
        min: tm.mk_int(min),
        extent: tm.mk_int(extent),
    }
}

/// Fresh integer iteration variable over `[min, min + extent)`.
pub fn iter_var(tm: &mut ExprManager, name: &str, min: i64, extent: i64) -> IterVar {
    let var = tm.mk_var(name, DType::Int32);
    let dom = const_range(tm, min, extent);
    IterVar { var, dom }
}

/// The ordinary floating summation combiner.
pub fn sum_combiner(tm: &mut ExprManager, dtype: DType) -> CommReducer {
    let x = tm.fresh_var("acc", dtype);
    let y = tm.fresh_var("val", dtype);
    let result = tm.mk_add(x, y);
    let zero = tm.mk_zero(dtype);
    CommReducer {
        lhs: vec![x],
        rhs: vec![y],
        result: vec![result],
        identity: vec![zero],
    }
}

fn tensor_stub(_t: Tensor, coords: &[i64]) -> Value {
    // Deterministic pseudo-data; integer-valued so comparisons are exact.
    let mut h: i64 = 17;
    for &c in coords {
        h = h.wrapping_mul(31).wrapping_add(c + 7);
    }
    Value::Float((h % 13) as f64)
}

/// Evaluate with the deterministic stub for placeholder tensors.
pub fn eval(tm: &ExprManager, e: ExprId, env: &VarEnv) -> Value {
    let mut tf = tensor_stub;
    eval_expr(tm, e, env, &mut tf)
        .unwrap_or_else(|err| panic!("evaluation failed: {err} on {}", tm.display(e)))
}

/// Evaluate a boolean expression.
pub fn eval_bool(tm: &ExprManager, e: ExprId, env: &VarEnv) -> bool {
    eval(tm, e, env).as_bool().unwrap()
}

/// Evaluate an integer expression.
pub fn eval_int(tm: &ExprManager, e: ExprId, env: &VarEnv) -> i64 {
    eval(tm, e, env).as_int().unwrap()
}

/// Call `f` for every assignment of `vars` within their constant ranges.
pub fn for_each_assignment(
    _tm: &ExprManager,
    vars: &[(ExprId, i64, i64)],
    f: &mut impl FnMut(&VarEnv),
) {
    fn rec(vars: &[(ExprId, i64, i64)], env: &mut VarEnv, f: &mut impl FnMut(&VarEnv)) {
        let Some(&(v, min, extent)) = vars.first() else {
            f(env);
            return;
        };
        for val in min..min + extent {
            env.insert(v, Value::Int(val));
            rec(&vars[1..], env, f);
        }
        env.remove(&v);
    }
    rec(vars, &mut VarEnv::default(), f);
}

/// Constant-range view of a range map, sorted by variable name for
/// reproducible enumeration order.
pub fn const_ranges(tm: &ExprManager, ranges: &RangeMap) -> Vec<(ExprId, i64, i64)> {
    let mut out: Vec<(ExprId, i64, i64)> = ranges
        .iter()
        .map(|(&v, r)| {
            let min = tm.as_const_int(r.min).expect("constant range min");
            let extent = tm.as_const_int(r.extent).expect("constant range extent");
            (v, min, extent)
        })
        .collect();
    out.sort_by(|a, b| tm.var_name(a.0).cmp(tm.var_name(b.0)));
    out
}

/// Assert that a boolean expression holds on every assignment within
/// `vranges` (optionally under a premise).
pub fn check_bruteforce(
    tm: &ExprManager,
    bool_expr: ExprId,
    vranges: &[(ExprId, i64, i64)],
    premise: Option<ExprId>,
) {
    for_each_assignment(tm, vranges, &mut |env| {
        if let Some(p) = premise
            && !eval_bool(tm, p, env)
        {
            return;
        }
        assert!(
            eval_bool(tm, bool_expr, env),
            "expression {} is false under {:?}",
            tm.display(bool_expr),
            describe_env(tm, env),
        );
    });
}

fn describe_env(tm: &ExprManager, env: &VarEnv) -> Vec<(String, i64)> {
    let mut out: Vec<(String, i64)> = env
        .iter()
        .filter_map(|(&v, val)| match val {
            Value::Int(i) => Some((tm.var_name(v).to_string(), *i)),
            _ => None,
        })
        .collect();
    out.sort();
    out
}

/// Enumerate the models of a domain under `base` (outer assignment),
/// calling `f` with the full environment for every point that satisfies
/// the conditions.
///
/// Ranges of later variables may be referenced by earlier ones, so the
/// variables are bound from the last to the first.
pub fn for_each_domain_point(
    tm: &ExprManager,
    domain: &Domain,
    base: &VarEnv,
    f: &mut impl FnMut(&VarEnv),
) {
    fn rec(
        tm: &ExprManager,
        domain: &Domain,
        idx: isize,
        env: &mut VarEnv,
        f: &mut impl FnMut(&VarEnv),
    ) {
        if idx < 0 {
            if domain
                .conditions
                .iter()
                .all(|&c| eval_bool(tm, c, env))
            {
                f(env);
            }
            return;
        }
        let v = domain.variables[idx as usize];
        let range = domain.ranges[&v];
        let min = eval_int(tm, range.min, env);
        let extent = eval_int(tm, range.extent, env);
        for val in min..min + extent {
            env.insert(v, Value::Int(val));
            rec(tm, domain, idx - 1, env, f);
        }
        env.remove(&v);
    }
    let mut env = base.clone();
    rec(
        tm,
        domain,
        domain.variables.len() as isize - 1,
        &mut env,
        f,
    );
}

/// Exhaustively verify a domain transformation: every model on one side
/// maps to a model on the other, round-trips back to itself, and a
/// checksum over all models matches (so the model sets correspond one to
/// one).
pub fn check_domain_transformation(
    tm: &mut ExprManager,
    tr: &DomainTransformation,
    outer: &[(ExprId, i64, i64)],
) {
    check_forward(tm, &tr.old_domain, &tr.new_domain, &tr.old_to_new, &tr.new_to_old, outer);
    check_forward(tm, &tr.new_domain, &tr.old_domain, &tr.new_to_old, &tr.old_to_new, outer);
}

fn check_forward(
    tm: &mut ExprManager,
    d1: &Domain,
    d2: &Domain,
    varmap: &FxHashMap<ExprId, ExprId>,
    backvarmap: &FxHashMap<ExprId, ExprId>,
    outer: &[(ExprId, i64, i64)],
) {
    let tm = &*tm;
    for_each_assignment(tm, outer, &mut |outer_env| {
        let mut checksum1: i64 = 0;
        let mut checksum2: i64 = 0;

        for_each_domain_point(tm, d1, outer_env, &mut |env| {
            // Transport the model to the other side.
            let mut env2 = outer_env.clone();
            for &v2 in &d2.variables {
                let back = backvarmap
                    .get(&v2)
                    .unwrap_or_else(|| panic!("no image for {}", tm.var_name(v2)));
                env2.insert(v2, Value::Int(eval_int(tm, *back, env)));
            }
            // It satisfies the other side's conditions and ranges.
            for &c in &d2.conditions {
                assert!(
                    eval_bool(tm, c, &env2),
                    "transported point violates condition {}",
                    tm.display(c)
                );
            }
            for &v2 in &d2.variables {
                if let Some(r) = d2.ranges.get(&v2) {
                    let val = env2[&v2].as_int().unwrap();
                    let min = eval_int(tm, r.min, &env2);
                    let extent = eval_int(tm, r.extent, &env2);
                    assert!(
                        val >= min && val < min + extent,
                        "transported {} = {val} outside [{min}; {})",
                        tm.var_name(v2),
                        min + extent
                    );
                }
            }
            // And it comes back to where it started.
            let mut merged = env2.clone();
            for (k, v) in env.iter() {
                merged.entry(*k).or_insert(*v);
            }
            for &v1 in &d1.variables {
                if let Some(&fwd) = varmap.get(&v1) {
                    let roundtrip = eval_int(tm, fwd, &merged);
                    assert_eq!(
                        roundtrip,
                        env[&v1].as_int().unwrap(),
                        "round trip failed for {}",
                        tm.var_name(v1)
                    );
                }
            }

            let mut acc: i64 = 0;
            for (i, &v) in d1.variables.iter().enumerate() {
                acc = acc.wrapping_add((i as i64 + 1).wrapping_mul(env[&v].as_int().unwrap()));
            }
            checksum1 ^= acc;
        });

        // The same weighted sum, transported through the map and folded
        // over the other domain's models.
        for_each_domain_point(tm, d2, outer_env, &mut |env| {
            let mut acc: i64 = 0;
            for (i, &v) in d1.variables.iter().enumerate() {
                let image = match varmap.get(&v) {
                    Some(&e) => eval_int(tm, e, env),
                    None => continue,
                };
                acc = acc.wrapping_add((i as i64 + 1).wrapping_mul(image));
            }
            checksum2 ^= acc;
        });

        assert_eq!(
            checksum1, checksum2,
            "model sets differ between the two domains"
        );
    });
}

/// Volume of a domain's box, when all extents are constant.
pub fn box_volume(tm: &ExprManager, domain: &Domain) -> i64 {
    domain
        .variables
        .iter()
        .map(|v| tm.as_const_int(domain.ranges[v].extent).expect("constant extent"))
        .product()
}
