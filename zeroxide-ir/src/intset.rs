//! Symbolic interval evaluation.
//!
//! Evaluates an expression to an interval whose endpoints are themselves
//! expressions, given intervals for some of its variables. This is the
//! over-approximation the passes use to infer ranges for introduced
//! variables (div/mod replacements, solver parameterizations) and to bound
//! deskew extents. Unbounded sides are represented as `None`; any operation
//! the analysis does not understand widens to the unbounded interval, which
//! downstream code treats as "range cannot be inferred".

use rustc_hash::{FxHashMap, FxHashSet};

use crate::bound::const_bounds;
use crate::expr::{CallOp, ExprId, ExprKind, ExprManager, Range, RangeMap};
use crate::visit::uses_any_var;

/// Interval with symbolic endpoints; `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntSet {
    /// Inclusive lower endpoint.
    pub min: Option<ExprId>,
    /// Inclusive upper endpoint.
    pub max: Option<ExprId>,
}

impl IntSet {
    /// Interval containing exactly `e`.
    pub fn point(e: ExprId) -> Self {
        IntSet {
            min: Some(e),
            max: Some(e),
        }
    }

    /// The unbounded interval.
    pub fn everything() -> Self {
        IntSet {
            min: None,
            max: None,
        }
    }

    /// Whether both endpoints are known.
    pub fn is_bounded(self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    /// Interval of all values of a [`Range`].
    pub fn from_range(tm: &mut ExprManager, range: Range) -> Self {
        let one = tm.mk_one(tm.dtype(range.min));
        let hi = tm.mk_add(range.min, range.extent);
        let hi = tm.mk_sub(hi, one);
        IntSet {
            min: Some(range.min),
            max: Some(hi),
        }
    }
}

/// Per-variable intervals derived from a range map.
pub fn interval_map_from_ranges(
    tm: &mut ExprManager,
    ranges: &RangeMap,
) -> FxHashMap<ExprId, IntSet> {
    let entries: Vec<(ExprId, Range)> = ranges.iter().map(|(v, r)| (*v, *r)).collect();
    let mut out = FxHashMap::default();
    for (v, r) in entries {
        out.insert(v, IntSet::from_range(tm, r));
    }
    out
}

fn add_ends(tm: &mut ExprManager, a: Option<ExprId>, b: Option<ExprId>) -> Option<ExprId> {
    a.zip(b).map(|(a, b)| tm.mk_add(a, b))
}

fn sub_ends(tm: &mut ExprManager, a: Option<ExprId>, b: Option<ExprId>) -> Option<ExprId> {
    a.zip(b).map(|(a, b)| tm.mk_sub(a, b))
}

fn scale(tm: &mut ExprManager, set: IntSet, c: i64, c_expr: ExprId) -> IntSet {
    if c == 0 {
        let zero = tm.mk_zero(tm.dtype(c_expr));
        return IntSet::point(zero);
    }
    let mul = |tm: &mut ExprManager, e: Option<ExprId>| e.map(|e| tm.mk_mul(e, c_expr));
    if c > 0 {
        IntSet {
            min: mul(tm, set.min),
            max: mul(tm, set.max),
        }
    } else {
        IntSet {
            min: mul(tm, set.max),
            max: mul(tm, set.min),
        }
    }
}

fn combine2(
    tm: &mut ExprManager,
    a: IntSet,
    b: IntSet,
    make: fn(&mut ExprManager, ExprId, ExprId) -> ExprId,
    min_needs_both: bool,
    max_needs_both: bool,
) -> IntSet {
    // For min: lower endpoint is min of lowers (unbounded if either is),
    // upper endpoint is min of uppers (known if either is). Dually for max.
    let pick = |tm: &mut ExprManager, x: Option<ExprId>, y: Option<ExprId>, needs_both: bool| {
        match (x, y) {
            (Some(x), Some(y)) => Some(make(tm, x, y)),
            (Some(v), None) | (None, Some(v)) if !needs_both => Some(v),
            _ => None,
        }
    };
    IntSet {
        min: pick(tm, a.min, b.min, min_needs_both),
        max: pick(tm, a.max, b.max, max_needs_both),
    }
}

/// Evaluate `e` to an interval under per-variable intervals `intervals`.
///
/// `ranges` supplies the surrounding constant-range context used for sign
/// reasoning on truncated remainders.
pub fn eval_interval(
    tm: &mut ExprManager,
    e: ExprId,
    intervals: &FxHashMap<ExprId, IntSet>,
    ranges: &RangeMap,
) -> IntSet {
    let mapped: FxHashSet<ExprId> = intervals.keys().copied().collect();
    eval_rec(tm, e, intervals, &mapped, ranges)
}

fn eval_rec(
    tm: &mut ExprManager,
    e: ExprId,
    intervals: &FxHashMap<ExprId, IntSet>,
    mapped: &FxHashSet<ExprId>,
    ranges: &RangeMap,
) -> IntSet {
    if !uses_any_var(tm, e, mapped) {
        return IntSet::point(e);
    }
    let kind = tm.kind(e).clone();
    match kind {
        ExprKind::Var { .. } => intervals.get(&e).copied().unwrap_or_else(IntSet::everything),
        ExprKind::Add(a, b) => {
            let ia = eval_rec(tm, a, intervals, mapped, ranges);
            let ib = eval_rec(tm, b, intervals, mapped, ranges);
            IntSet {
                min: add_ends(tm, ia.min, ib.min),
                max: add_ends(tm, ia.max, ib.max),
            }
        }
        ExprKind::Sub(a, b) => {
            let ia = eval_rec(tm, a, intervals, mapped, ranges);
            let ib = eval_rec(tm, b, intervals, mapped, ranges);
            IntSet {
                min: sub_ends(tm, ia.min, ib.max),
                max: sub_ends(tm, ia.max, ib.min),
            }
        }
        ExprKind::Mul(a, b) => {
            if let Some(c) = tm.as_const_int(b) {
                let ia = eval_rec(tm, a, intervals, mapped, ranges);
                scale(tm, ia, c, b)
            } else if let Some(c) = tm.as_const_int(a) {
                let ib = eval_rec(tm, b, intervals, mapped, ranges);
                scale(tm, ib, c, a)
            } else {
                IntSet::everything()
            }
        }
        ExprKind::TruncDiv(a, b) | ExprKind::FloorDiv(a, b) => {
            let Some(c) = tm.as_const_int(b).filter(|&c| c != 0) else {
                return IntSet::everything();
            };
            let floor = matches!(tm.kind(e), ExprKind::FloorDiv(..));
            let ia = eval_rec(tm, a, intervals, mapped, ranges);
            let div = |tm: &mut ExprManager, x: Option<ExprId>| {
                x.map(|x| {
                    if floor {
                        tm.mk_floordiv(x, b)
                    } else {
                        tm.mk_truncdiv(x, b)
                    }
                })
            };
            if c > 0 {
                IntSet {
                    min: div(tm, ia.min),
                    max: div(tm, ia.max),
                }
            } else {
                IntSet {
                    min: div(tm, ia.max),
                    max: div(tm, ia.min),
                }
            }
        }
        ExprKind::FloorMod(_, b) => {
            let Some(c) = tm.as_const_int(b).filter(|&c| c > 0) else {
                return IntSet::everything();
            };
            let dt = tm.dtype(e);
            let zero = tm.mk_zero(dt);
            let hi = tm.mk_const(dt, c - 1);
            IntSet {
                min: Some(zero),
                max: Some(hi),
            }
        }
        ExprKind::TruncMod(a, b) => {
            let Some(c) = tm.as_const_int(b).filter(|&c| c > 0) else {
                return IntSet::everything();
            };
            let dt = tm.dtype(e);
            let num = const_bounds(tm, a, ranges);
            let zero = tm.mk_zero(dt);
            let hi = tm.mk_const(dt, c - 1);
            let lo = tm.mk_const(dt, -(c - 1));
            if num.min.is_some_and(|m| m >= 0) {
                IntSet {
                    min: Some(zero),
                    max: Some(hi),
                }
            } else if num.max.is_some_and(|m| m <= 0) {
                IntSet {
                    min: Some(lo),
                    max: Some(zero),
                }
            } else {
                IntSet {
                    min: Some(lo),
                    max: Some(hi),
                }
            }
        }
        ExprKind::Min(a, b) => {
            let ia = eval_rec(tm, a, intervals, mapped, ranges);
            let ib = eval_rec(tm, b, intervals, mapped, ranges);
            combine2(tm, ia, ib, ExprManager::mk_min, true, false)
        }
        ExprKind::Max(a, b) => {
            let ia = eval_rec(tm, a, intervals, mapped, ranges);
            let ib = eval_rec(tm, b, intervals, mapped, ranges);
            combine2(tm, ia, ib, ExprManager::mk_max, false, true)
        }
        ExprKind::Select {
            true_value,
            false_value,
            ..
        } => {
            let it = eval_rec(tm, true_value, intervals, mapped, ranges);
            let if_ = eval_rec(tm, false_value, intervals, mapped, ranges);
            IntSet {
                min: combine2(tm, it, if_, ExprManager::mk_min, true, true).min,
                max: combine2(tm, it, if_, ExprManager::mk_max, true, true).max,
            }
        }
        ExprKind::Call { op, args, .. } if matches!(op, CallOp::IfThenElse) => {
            let it = eval_rec(tm, args[1], intervals, mapped, ranges);
            let if_ = eval_rec(tm, args[2], intervals, mapped, ranges);
            IntSet {
                min: combine2(tm, it, if_, ExprManager::mk_min, true, true).min,
                max: combine2(tm, it, if_, ExprManager::mk_max, true, true).max,
            }
        }
        ExprKind::Cast { dtype, value } if dtype.is_int() && tm.dtype(value).is_int() => {
            let iv = eval_rec(tm, value, intervals, mapped, ranges);
            IntSet {
                min: iv.min.map(|m| tm.mk_cast(dtype, m)),
                max: iv.max.map(|m| tm.mk_cast(dtype, m)),
            }
        }
        _ => IntSet::everything(),
    }
}

/// Convert a bounded interval into a `Range`, simplifying the extent.
/// Returns `None` when either side is unbounded.
pub fn cover_range(tm: &mut ExprManager, set: IntSet, ranges: &RangeMap) -> Option<Range> {
    let (min, max) = (set.min?, set.max?);
    let min = crate::simplify::simplify(tm, min, ranges);
    let one = tm.mk_one(tm.dtype(min));
    let ext = tm.mk_sub(max, min);
    let ext = tm.mk_add(ext, one);
    let extent = crate::simplify::simplify(tm, ext, ranges);
    Some(Range { min, extent })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[test]
    fn divmod_intervals() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let zero = tm.mk_int(0);
        let sixteen = tm.mk_int(16);
        let mut ranges = RangeMap::default();
        ranges.insert(
            i,
            Range {
                min: zero,
                extent: sixteen,
            },
        );
        let intervals = interval_map_from_ranges(&mut tm, &ranges);

        let four = tm.mk_int(4);
        let div = tm.mk_truncdiv(i, four);
        let modulo = tm.mk_truncmod(i, four);

        let div_range = {
            let set = eval_interval(&mut tm, div, &intervals, &ranges);
            cover_range(&mut tm, set, &ranges).unwrap()
        };
        assert!(tm.is_const_int(div_range.min, 0));
        assert!(tm.is_const_int(div_range.extent, 4));

        let mod_range = {
            let set = eval_interval(&mut tm, modulo, &intervals, &ranges);
            cover_range(&mut tm, set, &ranges).unwrap()
        };
        assert!(tm.is_const_int(mod_range.min, 0));
        assert!(tm.is_const_int(mod_range.extent, 4));
    }

    #[test]
    fn unmapped_subterms_are_points() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let j = tm.mk_var("j", DType::Int32);
        let zero = tm.mk_int(0);
        let five = tm.mk_int(5);
        let mut ranges = RangeMap::default();
        ranges.insert(
            i,
            Range {
                min: zero,
                extent: five,
            },
        );
        let intervals = interval_map_from_ranges(&mut tm, &ranges);

        // j is not mapped, so i + j ranges over [j, j + 4].
        let e = tm.mk_add(i, j);
        let set = eval_interval(&mut tm, e, &intervals, &ranges);
        let r = cover_range(&mut tm, set, &ranges).unwrap();
        assert_eq!(r.min, j);
        assert!(tm.is_const_int(r.extent, 5));
    }
}
