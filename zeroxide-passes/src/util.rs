//! Shared helpers: conjunction folds, guarded selects, iteration-variable
//! conversions, deterministic map iteration and ordered set operations.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use zeroxide_ir::compare::deep_compare;
use zeroxide_ir::expr::{CallOp, ExprId, ExprKind, ExprManager, IterVar, Range, RangeMap};

use crate::error::{Error, Result};

/// Conjunction of all expressions; `true` for an empty sequence.
pub fn all_of(tm: &mut ExprManager, conds: &[ExprId]) -> ExprId {
    let mut res: Option<ExprId> = None;
    for &c in conds {
        res = Some(match res {
            Some(prev) => tm.mk_and(prev, c),
            None => c,
        });
    }
    res.unwrap_or_else(|| tm.mk_true())
}

/// `select(cond, on_true, 0)` with a zero of the value's type.
pub fn select_else_zero(tm: &mut ExprManager, cond: ExprId, on_true: ExprId) -> ExprId {
    let zero = tm.mk_zero(tm.dtype(on_true));
    tm.mk_select(cond, on_true, zero)
}

/// Merge two range maps, preferring `update` on conflict.
pub fn merge_ranges(original: &RangeMap, update: &RangeMap) -> RangeMap {
    let mut out = original.clone();
    for (&v, &r) in update {
        out.insert(v, r);
    }
    out
}

/// Concatenate two sequences.
pub fn concat<T: Clone>(mut a: Vec<T>, b: &[T]) -> Vec<T> {
    a.extend_from_slice(b);
    a
}

/// Range-map entries sorted by structural comparison of the variable.
pub fn sorted_ranges(tm: &ExprManager, ranges: &RangeMap) -> Vec<(ExprId, Range)> {
    let mut entries: Vec<(ExprId, Range)> = ranges.iter().map(|(v, r)| (*v, *r)).collect();
    entries.sort_by(|a, b| deep_compare(tm, a.0, b.0));
    entries
}

/// Variable-map entries sorted by structural comparison of the key.
pub fn sorted_var_map(
    tm: &ExprManager,
    map: &FxHashMap<ExprId, ExprId>,
) -> Vec<(ExprId, ExprId)> {
    let mut entries: Vec<(ExprId, ExprId)> = map.iter().map(|(v, e)| (*v, *e)).collect();
    entries.sort_by(|a, b| deep_compare(tm, a.0, b.0));
    entries
}

/// The range constraints of each iteration variable as inequalities.
pub fn itervars_to_inequalities(tm: &mut ExprManager, itervars: &[IterVar]) -> Vec<ExprId> {
    let mut res = Vec::with_capacity(itervars.len() * 2);
    for iv in itervars {
        res.push(tm.mk_ge(iv.var, iv.dom.min));
        let end = tm.mk_add(iv.dom.min, iv.dom.extent);
        res.push(tm.mk_lt(iv.var, end));
    }
    res
}

/// Range map of a sequence of iteration variables.
pub fn itervars_to_map(itervars: &[IterVar]) -> RangeMap {
    itervars.iter().map(|iv| (iv.var, iv.dom)).collect()
}

/// The variables of a sequence of iteration variables.
pub fn itervars_to_vars(itervars: &[IterVar]) -> Vec<ExprId> {
    itervars.iter().map(|iv| iv.var).collect()
}

/// Pair each variable with its range from `ranges`.
pub fn itervars_from_map(
    tm: &ExprManager,
    vars: &[ExprId],
    ranges: &RangeMap,
) -> Result<Vec<IterVar>> {
    vars.iter()
        .map(|&v| {
            let dom = *ranges
                .get(&v)
                .ok_or_else(|| Error::MissingRange(tm.var_name(v).to_string()))?;
            Ok(IterVar { var: v, dom })
        })
        .collect()
}

/// Union of two structurally-sorted expression sequences.
pub fn union_sorted(tm: &ExprManager, a: &[ExprId], b: &[ExprId]) -> Vec<ExprId> {
    merge_by(tm, a, b, true, true, true)
}

/// Intersection of two structurally-sorted expression sequences.
pub fn intersect_sorted(tm: &ExprManager, a: &[ExprId], b: &[ExprId]) -> Vec<ExprId> {
    merge_by(tm, a, b, false, false, true)
}

/// Elements of `a` not present in `b`; both inputs structurally sorted.
pub fn difference_sorted(tm: &ExprManager, a: &[ExprId], b: &[ExprId]) -> Vec<ExprId> {
    merge_by(tm, a, b, true, false, false)
}

fn merge_by(
    tm: &ExprManager,
    a: &[ExprId],
    b: &[ExprId],
    take_left: bool,
    take_right: bool,
    take_both: bool,
) -> Vec<ExprId> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match deep_compare(tm, a[i], b[j]) {
            Ordering::Less => {
                if take_left {
                    out.push(a[i]);
                }
                i += 1;
            }
            Ordering::Greater => {
                if take_right {
                    out.push(b[j]);
                }
                j += 1;
            }
            Ordering::Equal => {
                if take_both {
                    out.push(a[i]);
                }
                i += 1;
                j += 1;
            }
        }
    }
    if take_left {
        out.extend_from_slice(&a[i..]);
    }
    if take_right {
        out.extend_from_slice(&b[j..]);
    }
    out
}

/// Whether evaluating `e` may have observable effects. Only calls to
/// external functions are treated as effectful.
pub fn has_side_effect(tm: &ExprManager, e: ExprId) -> bool {
    match tm.kind(e) {
        ExprKind::Call {
            op: CallOp::Extern(_),
            ..
        } => true,
        kind => zeroxide_ir::visit::children(kind)
            .into_iter()
            .any(|c| has_side_effect(tm, c)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroxide_ir::DType;

    #[test]
    fn all_of_empty_is_true() {
        let mut tm = ExprManager::new();
        let t = all_of(&mut tm, &[]);
        assert!(tm.is_true(t));
    }

    #[test]
    fn concat_appends() {
        let mut tm = ExprManager::new();
        let a = tm.mk_var("a", DType::Int32);
        let b = tm.mk_var("b", DType::Int32);
        assert_eq!(concat(vec![a], &[b, a]), vec![a, b, a]);
    }

    #[test]
    fn sorted_set_ops() {
        let mut tm = ExprManager::new();
        let a = tm.mk_var("a", DType::Int32);
        let b = tm.mk_var("b", DType::Int32);
        let c = tm.mk_var("c", DType::Int32);
        let mut left = vec![a, b];
        let mut right = vec![b, c];
        zeroxide_ir::compare::sort_dedup(&tm, &mut left);
        zeroxide_ir::compare::sort_dedup(&tm, &mut right);
        assert_eq!(union_sorted(&tm, &left, &right), vec![a, b, c]);
        assert_eq!(intersect_sorted(&tm, &left, &right), vec![b]);
        assert_eq!(difference_sorted(&tm, &left, &right), vec![a]);
    }
}
