//! Expression traversal and free-variable queries.
//!
//! Binders are honored throughout: `Let` masks its variable inside the body,
//! `Reduce` masks its axis variables inside sources and condition, and a
//! combiner masks its accumulator/value variables inside the combination
//! expressions. Range expressions of a reduction axis are evaluated outside
//! the binder and are therefore visited unmasked.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::expr::{ExprId, ExprKind, ExprManager};

/// Immediate subexpressions of a node, binder structure ignored.
pub fn children(kind: &ExprKind) -> SmallVec<[ExprId; 4]> {
    let mut out = SmallVec::new();
    match kind {
        ExprKind::IntImm { .. }
        | ExprKind::FloatImm { .. }
        | ExprKind::StrImm(_)
        | ExprKind::Var { .. } => {}
        ExprKind::Cast { value, .. } | ExprKind::Not(value) => out.push(*value),
        ExprKind::Add(a, b)
        | ExprKind::Sub(a, b)
        | ExprKind::Mul(a, b)
        | ExprKind::TruncDiv(a, b)
        | ExprKind::TruncMod(a, b)
        | ExprKind::FloorDiv(a, b)
        | ExprKind::FloorMod(a, b)
        | ExprKind::Min(a, b)
        | ExprKind::Max(a, b)
        | ExprKind::Eq(a, b)
        | ExprKind::Ne(a, b)
        | ExprKind::Lt(a, b)
        | ExprKind::Le(a, b)
        | ExprKind::Gt(a, b)
        | ExprKind::Ge(a, b)
        | ExprKind::And(a, b)
        | ExprKind::Or(a, b) => {
            out.push(*a);
            out.push(*b);
        }
        ExprKind::Select {
            cond,
            true_value,
            false_value,
        } => {
            out.push(*cond);
            out.push(*true_value);
            out.push(*false_value);
        }
        ExprKind::Let { var, value, body } => {
            out.push(*var);
            out.push(*value);
            out.push(*body);
        }
        ExprKind::Call { args, .. } => out.extend(args.iter().copied()),
        ExprKind::Reduce {
            combiner,
            source,
            axis,
            condition,
            ..
        } => {
            for iv in axis {
                out.push(iv.dom.min);
                out.push(iv.dom.extent);
            }
            out.extend(source.iter().copied());
            out.push(*condition);
            out.extend(combiner.result.iter().copied());
            out.extend(combiner.identity.iter().copied());
        }
    }
    out
}

/// Visits every free variable of `e` in first-occurrence order. The callback
/// returns `false` to stop the traversal early.
fn walk_free_vars(
    tm: &ExprManager,
    e: ExprId,
    bound: &mut Vec<ExprId>,
    f: &mut impl FnMut(ExprId) -> bool,
) -> bool {
    let kind = tm.kind(e);
    match kind {
        ExprKind::Var { .. } => {
            if !bound.contains(&e) && !f(e) {
                return false;
            }
        }
        ExprKind::Let { var, value, body } => {
            if !walk_free_vars(tm, *value, bound, f) {
                return false;
            }
            bound.push(*var);
            let cont = walk_free_vars(tm, *body, bound, f);
            bound.pop();
            if !cont {
                return false;
            }
        }
        ExprKind::Reduce {
            combiner,
            source,
            axis,
            condition,
            ..
        } => {
            for iv in axis {
                if !walk_free_vars(tm, iv.dom.min, bound, f)
                    || !walk_free_vars(tm, iv.dom.extent, bound, f)
                {
                    return false;
                }
            }
            let depth = bound.len();
            bound.extend(axis.iter().map(|iv| iv.var));
            let mut cont = source
                .iter()
                .chain(std::iter::once(condition))
                .all(|&s| walk_free_vars(tm, s, bound, f));
            if cont {
                bound.extend(combiner.lhs.iter().copied());
                bound.extend(combiner.rhs.iter().copied());
                cont = combiner
                    .result
                    .iter()
                    .chain(combiner.identity.iter())
                    .all(|&s| walk_free_vars(tm, s, bound, f));
            }
            bound.truncate(depth);
            if !cont {
                return false;
            }
        }
        _ => {
            for child in children(kind) {
                if !walk_free_vars(tm, child, bound, f) {
                    return false;
                }
            }
        }
    }
    true
}

/// Free variables of `e`, unique, in first-occurrence order.
pub fn free_vars(tm: &ExprManager, e: ExprId) -> Vec<ExprId> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    walk_free_vars(tm, e, &mut Vec::new(), &mut |v| {
        if seen.insert(v) {
            out.push(v);
        }
        true
    });
    out
}

/// Whether `var` occurs free in `e`.
pub fn uses_var(tm: &ExprManager, e: ExprId, var: ExprId) -> bool {
    !walk_free_vars(tm, e, &mut Vec::new(), &mut |v| v != var)
}

/// Whether any variable from `vars` occurs free in `e`.
pub fn uses_any_var(tm: &ExprManager, e: ExprId, vars: &FxHashSet<ExprId>) -> bool {
    if vars.is_empty() {
        return false;
    }
    !walk_free_vars(tm, e, &mut Vec::new(), &mut |v| !vars.contains(&v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::expr::{CommReducer, IterVar, Range};

    #[test]
    fn free_vars_ordered_unique() {
        let mut tm = ExprManager::new();
        let a = tm.mk_var("a", DType::Int32);
        let b = tm.mk_var("b", DType::Int32);
        let ab = tm.mk_add(a, b);
        let e = tm.mk_mul(ab, a);
        assert_eq!(free_vars(&tm, e), vec![a, b]);
    }

    #[test]
    fn reduce_axis_is_bound() {
        let mut tm = ExprManager::new();
        let k = tm.mk_var("k", DType::Int32);
        let i = tm.mk_var("i", DType::Int32);
        let zero = tm.mk_int(0);
        let ten = tm.mk_int(10);
        let x = tm.mk_var("x", DType::Int32);
        let y = tm.mk_var("y", DType::Int32);
        let result = tm.mk_add(x, y);
        let combiner = CommReducer {
            lhs: vec![x],
            rhs: vec![y],
            result: vec![result],
            identity: vec![zero],
        };
        let body = tm.mk_add(k, i);
        let t = tm.mk_true();
        let red = tm.mk_reduce(
            combiner,
            vec![body],
            vec![IterVar {
                var: k,
                dom: Range {
                    min: zero,
                    extent: ten,
                },
            }],
            t,
            0,
        );
        assert_eq!(free_vars(&tm, red), vec![i]);
        assert!(!uses_var(&tm, red, k));
        assert!(uses_var(&tm, red, i));
    }

    #[test]
    fn let_masks_its_variable() {
        let mut tm = ExprManager::new();
        let v = tm.mk_var("v", DType::Int32);
        let w = tm.mk_var("w", DType::Int32);
        let body = tm.mk_add(v, w);
        let e = tm.mk_let(v, w, body);
        assert_eq!(free_vars(&tm, e), vec![w]);
    }
}
