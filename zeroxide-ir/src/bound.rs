//! Constant integer bound analysis.
//!
//! Computes a conservative `[min, max]` enclosure of an integer or boolean
//! expression under a variable range context. `None` on a side means
//! unbounded. All arithmetic is checked; overflow widens to unbounded
//! instead of wrapping.

use num_integer::Integer;

use crate::expr::{ExprId, ExprKind, ExprManager, RangeMap};

/// Conservative constant enclosure of an expression's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstBound {
    /// Greatest known lower bound.
    pub min: Option<i64>,
    /// Least known upper bound.
    pub max: Option<i64>,
}

impl ConstBound {
    /// The unbounded enclosure.
    pub fn everything() -> Self {
        ConstBound {
            min: None,
            max: None,
        }
    }

    /// A single point.
    pub fn single(v: i64) -> Self {
        ConstBound {
            min: Some(v),
            max: Some(v),
        }
    }

    fn union(self, other: ConstBound) -> ConstBound {
        ConstBound {
            min: self.min.zip(other.min).map(|(a, b)| a.min(b)),
            max: self.max.zip(other.max).map(|(a, b)| a.max(b)),
        }
    }
}

const MAX_DEPTH: u32 = 32;

fn add_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    a.zip(b).and_then(|(a, b)| a.checked_add(b))
}

fn sub_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    a.zip(b).and_then(|(a, b)| a.checked_sub(b))
}

fn mul_bound(a: ConstBound, b: ConstBound) -> ConstBound {
    let (Some(amin), Some(amax), Some(bmin), Some(bmax)) = (a.min, a.max, b.min, b.max) else {
        // A one-sided refinement would be possible when the other factor has
        // a known sign, but the passes never rely on it.
        return ConstBound::everything();
    };
    let mut lo: Option<i64> = None;
    let mut hi: Option<i64> = None;
    for x in [amin, amax] {
        for y in [bmin, bmax] {
            match x.checked_mul(y) {
                Some(p) => {
                    lo = Some(lo.map_or(p, |l: i64| l.min(p)));
                    hi = Some(hi.map_or(p, |h: i64| h.max(p)));
                }
                None => return ConstBound::everything(),
            }
        }
    }
    ConstBound { min: lo, max: hi }
}

fn bounds_rec(tm: &ExprManager, e: ExprId, ranges: &RangeMap, depth: u32) -> ConstBound {
    if depth > MAX_DEPTH {
        return ConstBound::everything();
    }
    let bool_bound = ConstBound {
        min: Some(0),
        max: Some(1),
    };
    match tm.kind(e) {
        ExprKind::IntImm { value, .. } => ConstBound::single(*value),
        ExprKind::Var { .. } => {
            if let Some(range) = ranges.get(&e) {
                let min_b = bounds_rec(tm, range.min, ranges, depth + 1);
                let ext_b = bounds_rec(tm, range.extent, ranges, depth + 1);
                // Largest value is min + extent - 1.
                let max = add_opt(min_b.max, ext_b.max).and_then(|v| v.checked_sub(1));
                ConstBound {
                    min: min_b.min,
                    max,
                }
            } else if tm.dtype(e).is_bool() {
                bool_bound
            } else {
                ConstBound::everything()
            }
        }
        ExprKind::Cast { value, dtype } => {
            if dtype.is_int() && tm.dtype(*value).is_int() || dtype.is_int() && tm.dtype(*value).is_bool() {
                bounds_rec(tm, *value, ranges, depth + 1)
            } else if dtype.is_bool() {
                bool_bound
            } else {
                ConstBound::everything()
            }
        }
        ExprKind::Add(a, b) => {
            let (a, b) = (
                bounds_rec(tm, *a, ranges, depth + 1),
                bounds_rec(tm, *b, ranges, depth + 1),
            );
            ConstBound {
                min: add_opt(a.min, b.min),
                max: add_opt(a.max, b.max),
            }
        }
        ExprKind::Sub(a, b) => {
            let (a, b) = (
                bounds_rec(tm, *a, ranges, depth + 1),
                bounds_rec(tm, *b, ranges, depth + 1),
            );
            ConstBound {
                min: sub_opt(a.min, b.max),
                max: sub_opt(a.max, b.min),
            }
        }
        ExprKind::Mul(a, b) => mul_bound(
            bounds_rec(tm, *a, ranges, depth + 1),
            bounds_rec(tm, *b, ranges, depth + 1),
        ),
        ExprKind::TruncDiv(a, b) => div_bound(tm, *a, *b, ranges, depth, false),
        ExprKind::FloorDiv(a, b) => div_bound(tm, *a, *b, ranges, depth, true),
        ExprKind::TruncMod(a, b) => {
            let Some(c) = tm.as_const_int(*b).filter(|&c| c > 0) else {
                return ConstBound::everything();
            };
            let num = bounds_rec(tm, *a, ranges, depth + 1);
            if num.min.is_some_and(|m| m >= 0) {
                ConstBound {
                    min: Some(0),
                    max: Some(c - 1),
                }
            } else if num.max.is_some_and(|m| m <= 0) {
                ConstBound {
                    min: Some(-(c - 1)),
                    max: Some(0),
                }
            } else {
                ConstBound {
                    min: Some(-(c - 1)),
                    max: Some(c - 1),
                }
            }
        }
        ExprKind::FloorMod(_, b) => {
            let Some(c) = tm.as_const_int(*b).filter(|&c| c > 0) else {
                return ConstBound::everything();
            };
            ConstBound {
                min: Some(0),
                max: Some(c - 1),
            }
        }
        ExprKind::Min(a, b) => {
            let (a, b) = (
                bounds_rec(tm, *a, ranges, depth + 1),
                bounds_rec(tm, *b, ranges, depth + 1),
            );
            ConstBound {
                min: a.min.zip(b.min).map(|(x, y)| x.min(y)),
                max: match (a.max, b.max) {
                    (Some(x), Some(y)) => Some(x.min(y)),
                    (Some(x), None) | (None, Some(x)) => Some(x),
                    (None, None) => None,
                },
            }
        }
        ExprKind::Max(a, b) => {
            let (a, b) = (
                bounds_rec(tm, *a, ranges, depth + 1),
                bounds_rec(tm, *b, ranges, depth + 1),
            );
            ConstBound {
                min: match (a.min, b.min) {
                    (Some(x), Some(y)) => Some(x.max(y)),
                    (Some(x), None) | (None, Some(x)) => Some(x),
                    (None, None) => None,
                },
                max: a.max.zip(b.max).map(|(x, y)| x.max(y)),
            }
        }
        ExprKind::Select {
            true_value,
            false_value,
            ..
        } => bounds_rec(tm, *true_value, ranges, depth + 1)
            .union(bounds_rec(tm, *false_value, ranges, depth + 1)),
        ExprKind::Call { op, args, .. } if matches!(op, crate::expr::CallOp::IfThenElse) => {
            bounds_rec(tm, args[1], ranges, depth + 1)
                .union(bounds_rec(tm, args[2], ranges, depth + 1))
        }
        ExprKind::Eq(..)
        | ExprKind::Ne(..)
        | ExprKind::Lt(..)
        | ExprKind::Le(..)
        | ExprKind::Gt(..)
        | ExprKind::Ge(..)
        | ExprKind::And(..)
        | ExprKind::Or(..)
        | ExprKind::Not(..) => bool_bound,
        _ => {
            if tm.dtype(e).is_bool() {
                bool_bound
            } else {
                ConstBound::everything()
            }
        }
    }
}

fn div_bound(
    tm: &ExprManager,
    a: ExprId,
    b: ExprId,
    ranges: &RangeMap,
    depth: u32,
    floor: bool,
) -> ConstBound {
    let Some(c) = tm.as_const_int(b).filter(|&c| c != 0) else {
        return ConstBound::everything();
    };
    let num = bounds_rec(tm, a, ranges, depth + 1);
    let apply = |v: i64| {
        if floor {
            Integer::div_floor(&v, &c)
        } else {
            v / c
        }
    };
    // Division by a nonzero constant is monotone in the dividend; direction
    // flips for negative divisors.
    let (lo, hi) = if c > 0 {
        (num.min.map(apply), num.max.map(apply))
    } else {
        (num.max.map(apply), num.min.map(apply))
    };
    ConstBound { min: lo, max: hi }
}

/// Bounds of `e` under `ranges`.
pub fn const_bounds(tm: &ExprManager, e: ExprId, ranges: &RangeMap) -> ConstBound {
    bounds_rec(tm, e, ranges, 0)
}
