//! Substitution and reduction cloning.

use rustc_hash::FxHashMap;

use crate::expr::{CommReducer, ExprId, ExprKind, ExprManager, IterVar, Range};

/// Rebuild a node with every immediate subexpression passed through `f`.
///
/// Binder structure is not interpreted here: bound variables themselves are
/// left untouched, but all subexpressions (including those under binders)
/// are transformed. Callers that need scoped behavior handle `Let` and
/// `Reduce` before falling back to this.
pub fn map_children(
    tm: &mut ExprManager,
    e: ExprId,
    f: &mut impl FnMut(&mut ExprManager, ExprId) -> ExprId,
) -> ExprId {
    let kind = tm.kind(e).clone();
    match kind {
        ExprKind::IntImm { .. }
        | ExprKind::FloatImm { .. }
        | ExprKind::StrImm(_)
        | ExprKind::Var { .. } => e,
        ExprKind::Cast { dtype, value } => {
            let value = f(tm, value);
            tm.mk_cast(dtype, value)
        }
        ExprKind::Not(a) => {
            let a = f(tm, a);
            tm.mk_not(a)
        }
        ExprKind::Add(a, b) => rebuild2(tm, ExprManager::mk_add, a, b, f),
        ExprKind::Sub(a, b) => rebuild2(tm, ExprManager::mk_sub, a, b, f),
        ExprKind::Mul(a, b) => rebuild2(tm, ExprManager::mk_mul, a, b, f),
        ExprKind::TruncDiv(a, b) => rebuild2(tm, ExprManager::mk_truncdiv, a, b, f),
        ExprKind::TruncMod(a, b) => rebuild2(tm, ExprManager::mk_truncmod, a, b, f),
        ExprKind::FloorDiv(a, b) => rebuild2(tm, ExprManager::mk_floordiv, a, b, f),
        ExprKind::FloorMod(a, b) => rebuild2(tm, ExprManager::mk_floormod, a, b, f),
        ExprKind::Min(a, b) => rebuild2(tm, ExprManager::mk_min, a, b, f),
        ExprKind::Max(a, b) => rebuild2(tm, ExprManager::mk_max, a, b, f),
        ExprKind::Eq(a, b) => rebuild2(tm, ExprManager::mk_eq, a, b, f),
        ExprKind::Ne(a, b) => rebuild2(tm, ExprManager::mk_ne, a, b, f),
        ExprKind::Lt(a, b) => rebuild2(tm, ExprManager::mk_lt, a, b, f),
        ExprKind::Le(a, b) => rebuild2(tm, ExprManager::mk_le, a, b, f),
        ExprKind::Gt(a, b) => rebuild2(tm, ExprManager::mk_gt, a, b, f),
        ExprKind::Ge(a, b) => rebuild2(tm, ExprManager::mk_ge, a, b, f),
        ExprKind::And(a, b) => rebuild2(tm, ExprManager::mk_and, a, b, f),
        ExprKind::Or(a, b) => rebuild2(tm, ExprManager::mk_or, a, b, f),
        ExprKind::Select {
            cond,
            true_value,
            false_value,
        } => {
            let cond = f(tm, cond);
            let t = f(tm, true_value);
            let fv = f(tm, false_value);
            tm.mk_select(cond, t, fv)
        }
        ExprKind::Let { var, value, body } => {
            let value = f(tm, value);
            let body = f(tm, body);
            tm.mk_let(var, value, body)
        }
        ExprKind::Call { op, args, dtype } => {
            let args: Vec<ExprId> = args.iter().map(|&a| f(tm, a)).collect();
            match op {
                crate::expr::CallOp::IfThenElse => tm.mk_if_then_else(args[0], args[1], args[2]),
                crate::expr::CallOp::Tensor(t) => tm.mk_tensor_call(t, &args),
                crate::expr::CallOp::Extern(name) => tm.mk_extern_call(&name, &args, dtype),
            }
        }
        ExprKind::Reduce {
            combiner,
            source,
            axis,
            condition,
            value_index,
        } => {
            let axis: Vec<IterVar> = axis
                .iter()
                .map(|iv| IterVar {
                    var: iv.var,
                    dom: Range {
                        min: f(tm, iv.dom.min),
                        extent: f(tm, iv.dom.extent),
                    },
                })
                .collect();
            let source: Vec<ExprId> = source.iter().map(|&s| f(tm, s)).collect();
            let condition = f(tm, condition);
            let combiner = CommReducer {
                lhs: combiner.lhs.clone(),
                rhs: combiner.rhs.clone(),
                result: combiner.result.iter().map(|&r| f(tm, r)).collect(),
                identity: combiner.identity.iter().map(|&r| f(tm, r)).collect(),
            };
            tm.mk_reduce(combiner, source, axis, condition, value_index)
        }
    }
}

fn rebuild2(
    tm: &mut ExprManager,
    make: fn(&mut ExprManager, ExprId, ExprId) -> ExprId,
    a: ExprId,
    b: ExprId,
    f: &mut impl FnMut(&mut ExprManager, ExprId) -> ExprId,
) -> ExprId {
    let a = f(tm, a);
    let b = f(tm, b);
    make(tm, a, b)
}

fn subst_rec(
    tm: &mut ExprManager,
    e: ExprId,
    map: &FxHashMap<ExprId, ExprId>,
    masked: &mut Vec<ExprId>,
) -> ExprId {
    let kind = tm.kind(e).clone();
    match kind {
        ExprKind::Var { .. } => {
            if masked.contains(&e) {
                e
            } else {
                map.get(&e).copied().unwrap_or(e)
            }
        }
        ExprKind::Let { var, value, body } => {
            let value = subst_rec(tm, value, map, masked);
            masked.push(var);
            let body = subst_rec(tm, body, map, masked);
            masked.pop();
            tm.mk_let(var, value, body)
        }
        ExprKind::Reduce {
            combiner,
            source,
            axis,
            condition,
            value_index,
        } => {
            // Axis ranges are outside the binder scope.
            let axis: Vec<IterVar> = axis
                .iter()
                .map(|iv| IterVar {
                    var: iv.var,
                    dom: Range {
                        min: subst_rec(tm, iv.dom.min, map, masked),
                        extent: subst_rec(tm, iv.dom.extent, map, masked),
                    },
                })
                .collect();
            let depth = masked.len();
            masked.extend(axis.iter().map(|iv| iv.var));
            let source: Vec<ExprId> = source
                .iter()
                .map(|&s| subst_rec(tm, s, map, masked))
                .collect();
            let condition = subst_rec(tm, condition, map, masked);
            masked.extend(combiner.lhs.iter().copied());
            masked.extend(combiner.rhs.iter().copied());
            let combiner = CommReducer {
                lhs: combiner.lhs.clone(),
                rhs: combiner.rhs.clone(),
                result: combiner
                    .result
                    .iter()
                    .map(|&r| subst_rec(tm, r, map, masked))
                    .collect(),
                identity: combiner
                    .identity
                    .iter()
                    .map(|&r| subst_rec(tm, r, map, masked))
                    .collect(),
            };
            masked.truncate(depth);
            tm.mk_reduce(combiner, source, axis, condition, value_index)
        }
        _ => map_children(tm, e, &mut |tm, child| subst_rec(tm, child, map, masked)),
    }
}

/// Replace free occurrences of the map's variables by their images.
pub fn substitute(tm: &mut ExprManager, e: ExprId, map: &FxHashMap<ExprId, ExprId>) -> ExprId {
    if map.is_empty() {
        return e;
    }
    subst_rec(tm, e, map, &mut Vec::new())
}

/// Substitute a single variable.
pub fn substitute_one(tm: &mut ExprManager, e: ExprId, var: ExprId, value: ExprId) -> ExprId {
    let mut map = FxHashMap::default();
    map.insert(var, value);
    substitute(tm, e, &map)
}

/// If `e` is a reduction, rename its axis variables to fresh ones so the
/// node can be duplicated without binder aliasing. Non-reductions are
/// returned unchanged.
pub fn clone_reduction(tm: &mut ExprManager, e: ExprId) -> ExprId {
    let ExprKind::Reduce {
        combiner,
        source,
        axis,
        condition,
        value_index,
    } = tm.kind(e).clone()
    else {
        return e;
    };

    let mut vmap = FxHashMap::default();
    let mut new_axis = Vec::with_capacity(axis.len());
    for iv in &axis {
        let fresh = tm.var_with_suffix(iv.var, "");
        vmap.insert(iv.var, fresh);
        new_axis.push(IterVar {
            var: fresh,
            dom: iv.dom,
        });
    }
    let source: Vec<ExprId> = source
        .iter()
        .map(|&s| substitute(tm, s, &vmap))
        .collect();
    let condition = substitute(tm, condition, &vmap);
    tm.mk_reduce(combiner, source, new_axis, condition, value_index)
}
