//! Range-aware expression simplification.
//!
//! The entry points are [`simplify`] and [`can_prove`]. Simplification is a
//! memoized bottom-up rewrite combining three mechanisms:
//!
//! - **Constant folding** over every arithmetic, comparison, boolean and
//!   cast kind;
//! - **Linear normalization** of integer terms: sums are flattened into
//!   `c0 + Σ ci * atom_i` with atoms sorted structurally, so syntactically
//!   different spellings of the same affine form collapse to one id;
//! - **Bound propagation**: comparisons, `Min`/`Max` and divisions are
//!   resolved when the constant enclosure of the operands decides them.
//!
//! Variables whose range has a single value are substituted by their minimum
//! before rewriting; range contexts often carry such degenerate entries and
//! downstream reasoning improves when they disappear early.

use num_integer::Integer;
use rustc_hash::FxHashMap;

use crate::bound::const_bounds;
use crate::dtype::DType;
use crate::expr::{CallOp, ExprId, ExprKind, ExprManager, RangeMap};
use crate::subst::substitute;

/// Simplify `e` under the variable ranges `vranges`.
pub fn simplify(tm: &mut ExprManager, e: ExprId, vranges: &RangeMap) -> ExprId {
    let mut single = FxHashMap::default();
    for (&v, r) in vranges.iter() {
        if tm.is_const_int(r.extent, 1) {
            single.insert(v, r.min);
        }
    }
    let e = if single.is_empty() {
        e
    } else {
        substitute(tm, e, &single)
    };
    Simplifier {
        tm,
        ranges: vranges,
        cache: FxHashMap::default(),
    }
    .simp(e)
}

/// Whether `e` simplifies to the constant `true` under `vranges`.
pub fn can_prove(tm: &mut ExprManager, e: ExprId, vranges: &RangeMap) -> bool {
    let s = simplify(tm, e, vranges);
    tm.is_true(s)
}

/// Affine view of an integer expression: `constant + Σ coef * atom`.
struct LinForm {
    /// Non-constant terms, keyed by atom, sorted structurally.
    terms: Vec<(ExprId, i64)>,
    constant: i64,
}

struct Simplifier<'a> {
    tm: &'a mut ExprManager,
    ranges: &'a RangeMap,
    cache: FxHashMap<ExprId, ExprId>,
}

impl Simplifier<'_> {
    fn simp(&mut self, e: ExprId) -> ExprId {
        if let Some(&r) = self.cache.get(&e) {
            return r;
        }
        let out = self.simp_uncached(e);
        self.cache.insert(e, out);
        out
    }

    fn simp_uncached(&mut self, e: ExprId) -> ExprId {
        let kind = self.tm.kind(e).clone();
        match kind {
            ExprKind::IntImm { .. }
            | ExprKind::FloatImm { .. }
            | ExprKind::StrImm(_)
            | ExprKind::Var { .. } => e,
            ExprKind::Add(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                self.arith(ExprKind::Add(a, b), ExprManager::mk_add, |x, y| {
                    x.checked_add(y)
                })
            }
            ExprKind::Sub(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                self.arith(ExprKind::Sub(a, b), ExprManager::mk_sub, |x, y| {
                    x.checked_sub(y)
                })
            }
            ExprKind::Mul(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                self.arith(ExprKind::Mul(a, b), ExprManager::mk_mul, |x, y| {
                    x.checked_mul(y)
                })
            }
            ExprKind::TruncDiv(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                self.division(a, b, false)
            }
            ExprKind::FloorDiv(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                self.division(a, b, true)
            }
            ExprKind::TruncMod(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                self.remainder(a, b, false)
            }
            ExprKind::FloorMod(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                self.remainder(a, b, true)
            }
            ExprKind::Min(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                self.min_max(a, b, true)
            }
            ExprKind::Max(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                self.min_max(a, b, false)
            }
            ExprKind::Eq(a, b)
            | ExprKind::Ne(a, b)
            | ExprKind::Lt(a, b)
            | ExprKind::Le(a, b)
            | ExprKind::Gt(a, b)
            | ExprKind::Ge(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                self.comparison(&kind, a, b)
            }
            ExprKind::And(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                if self.tm.is_false(a) || self.tm.is_false(b) {
                    self.tm.mk_false()
                } else if self.tm.is_true(a) {
                    b
                } else if self.tm.is_true(b) || a == b {
                    a
                } else {
                    self.tm.mk_and(a, b)
                }
            }
            ExprKind::Or(a, b) => {
                let (a, b) = (self.simp(a), self.simp(b));
                if self.tm.is_true(a) || self.tm.is_true(b) {
                    self.tm.mk_true()
                } else if self.tm.is_false(a) {
                    b
                } else if self.tm.is_false(b) || a == b {
                    a
                } else {
                    self.tm.mk_or(a, b)
                }
            }
            ExprKind::Not(a) => {
                let a = self.simp(a);
                self.negation(a)
            }
            ExprKind::Select {
                cond,
                true_value,
                false_value,
            } => {
                let cond = self.simp(cond);
                if self.tm.is_true(cond) {
                    return self.simp(true_value);
                }
                if self.tm.is_false(cond) {
                    return self.simp(false_value);
                }
                let t = self.simp(true_value);
                let f = self.simp(false_value);
                if t == f {
                    return t;
                }
                if self.tm.dtype(t).is_bool() && self.tm.is_true(t) && self.tm.is_false(f) {
                    return cond;
                }
                self.tm.mk_select(cond, t, f)
            }
            ExprKind::Cast { dtype, value } => {
                let value = self.simp(value);
                self.cast(dtype, value)
            }
            ExprKind::Let { var, value, body } => {
                let value = self.simp(value);
                let body = self.simp(body);
                self.tm.mk_let(var, value, body)
            }
            ExprKind::Call { op, args, .. } => {
                let args: Vec<ExprId> = args.iter().map(|&a| self.simp(a)).collect();
                if let CallOp::IfThenElse = op {
                    if self.tm.is_true(args[0]) {
                        return args[1];
                    }
                    if self.tm.is_false(args[0]) {
                        return args[2];
                    }
                    if args[1] == args[2] {
                        return args[1];
                    }
                }
                match op {
                    CallOp::IfThenElse => self.tm.mk_if_then_else(args[0], args[1], args[2]),
                    CallOp::Tensor(t) => self.tm.mk_tensor_call(t, &args),
                    CallOp::Extern(name) => {
                        let dtype = self.tm.dtype(e);
                        self.tm.mk_extern_call(&name, &args, dtype)
                    }
                }
            }
            ExprKind::Reduce { .. } => self.reduce(e),
        }
    }

    fn reduce(&mut self, e: ExprId) -> ExprId {
        let ExprKind::Reduce {
            combiner,
            source,
            axis,
            condition,
            value_index,
        } = self.tm.kind(e).clone()
        else {
            unreachable!()
        };
        let axis: Vec<crate::expr::IterVar> = axis
            .iter()
            .map(|iv| crate::expr::IterVar {
                var: iv.var,
                dom: crate::expr::Range {
                    min: self.simp(iv.dom.min),
                    extent: self.simp(iv.dom.extent),
                },
            })
            .collect();
        let source: Vec<ExprId> = source.iter().map(|&s| self.simp(s)).collect();
        let condition = self.simp(condition);
        let combiner = crate::expr::CommReducer {
            lhs: combiner.lhs.clone(),
            rhs: combiner.rhs.clone(),
            result: combiner.result.iter().map(|&r| self.simp(r)).collect(),
            identity: combiner.identity.iter().map(|&r| self.simp(r)).collect(),
        };

        // An unsatisfiable guard or an empty axis range empties the domain.
        let empty_axis = axis
            .iter()
            .any(|iv| self.tm.as_const_int(iv.dom.extent).is_some_and(|v| v <= 0));
        if self.tm.is_false(condition) || empty_axis {
            return combiner.identity[value_index];
        }
        // A nullary iteration space folds the identity with the single
        // source point, which by the identity law is the source itself.
        if axis.is_empty() {
            let sel = self
                .tm
                .mk_select(condition, source[value_index], combiner.identity[value_index]);
            return self.simp(sel);
        }
        self.tm
            .mk_reduce(combiner, source, axis, condition, value_index)
    }

    /// Add/Sub/Mul after child simplification.
    fn arith(
        &mut self,
        kind: ExprKind,
        make: fn(&mut ExprManager, ExprId, ExprId) -> ExprId,
        fold: fn(i64, i64) -> Option<i64>,
    ) -> ExprId {
        let (a, b) = match kind {
            ExprKind::Add(a, b) | ExprKind::Sub(a, b) | ExprKind::Mul(a, b) => (a, b),
            _ => unreachable!(),
        };
        let dtype = self.tm.dtype(a);
        if let (Some(x), Some(y)) = (self.tm.as_const_int(a), self.tm.as_const_int(b))
            && let Some(v) = fold(x, y)
        {
            return self.tm.mk_const(dtype, v);
        }
        if dtype.is_float() {
            return self.float_arith(&kind, make, a, b);
        }
        if dtype.is_int() {
            let node = make(self.tm, a, b);
            return self.canonicalize_int(node);
        }
        make(self.tm, a, b)
    }

    fn float_arith(
        &mut self,
        kind: &ExprKind,
        make: fn(&mut ExprManager, ExprId, ExprId) -> ExprId,
        a: ExprId,
        b: ExprId,
    ) -> ExprId {
        let fa = self.as_const_float(a);
        let fb = self.as_const_float(b);
        let dtype = self.tm.dtype(a);
        if let (Some(x), Some(y)) = (fa, fb) {
            let v = match kind {
                ExprKind::Add(..) => x + y,
                ExprKind::Sub(..) => x - y,
                ExprKind::Mul(..) => x * y,
                _ => unreachable!(),
            };
            return self.tm.mk_float(v, dtype);
        }
        match kind {
            ExprKind::Add(..) => {
                if fa == Some(0.0) {
                    return b;
                }
                if fb == Some(0.0) {
                    return a;
                }
            }
            ExprKind::Sub(..) => {
                if fb == Some(0.0) {
                    return a;
                }
            }
            ExprKind::Mul(..) => {
                if fa == Some(1.0) {
                    return b;
                }
                if fb == Some(1.0) {
                    return a;
                }
                if fa == Some(0.0) || fb == Some(0.0) {
                    return self.tm.mk_float(0.0, dtype);
                }
            }
            _ => {}
        }
        make(self.tm, a, b)
    }

    fn as_const_float(&self, e: ExprId) -> Option<f64> {
        match self.tm.kind(e) {
            ExprKind::FloatImm { bits, .. } => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    fn division(&mut self, a: ExprId, b: ExprId, floor: bool) -> ExprId {
        let dtype = self.tm.dtype(a);
        if !dtype.is_int() {
            return if floor {
                self.tm.mk_floordiv(a, b)
            } else {
                self.tm.mk_truncdiv(a, b)
            };
        }
        if let Some(c) = self.tm.as_const_int(b).filter(|&c| c != 0) {
            if let Some(x) = self.tm.as_const_int(a) {
                let v = if floor { Integer::div_floor(&x, &c) } else { x / c };
                return self.tm.mk_const(dtype, v);
            }
            if c == 1 {
                return a;
            }
            // An exactly divisible affine form divides termwise, and then
            // flooring and truncation agree.
            let lin = self.linearize(a);
            if lin.constant % c == 0 && lin.terms.iter().all(|(_, k)| k % c == 0) {
                let divided = LinForm {
                    terms: lin.terms.iter().map(|&(t, k)| (t, k / c)).collect(),
                    constant: lin.constant / c,
                };
                return self.rebuild(divided, dtype);
            }
            // The quotient is constant when the dividend's enclosure fits a
            // single block of the divisor.
            let bounds = const_bounds(self.tm, a, self.ranges);
            if let (Some(lo), Some(hi)) = (bounds.min, bounds.max) {
                let (qlo, qhi) = if floor {
                    (Integer::div_floor(&lo, &c), Integer::div_floor(&hi, &c))
                } else {
                    (lo / c, hi / c)
                };
                let straddles_zero = !floor && lo < 0 && hi > 0;
                if qlo == qhi && !straddles_zero {
                    return self.tm.mk_const(dtype, qlo);
                }
            }
        }
        if floor {
            self.tm.mk_floordiv(a, b)
        } else {
            self.tm.mk_truncdiv(a, b)
        }
    }

    fn remainder(&mut self, a: ExprId, b: ExprId, floor: bool) -> ExprId {
        let dtype = self.tm.dtype(a);
        if !dtype.is_int() {
            return if floor {
                self.tm.mk_floormod(a, b)
            } else {
                self.tm.mk_truncmod(a, b)
            };
        }
        if let Some(c) = self.tm.as_const_int(b).filter(|&c| c != 0) {
            if let Some(x) = self.tm.as_const_int(a) {
                let v = if floor { x.mod_floor(&c) } else { x % c };
                return self.tm.mk_const(dtype, v);
            }
            if c == 1 || c == -1 {
                return self.tm.mk_zero(dtype);
            }
            if c > 0 {
                let bounds = const_bounds(self.tm, a, self.ranges);
                if bounds.min.is_some_and(|lo| lo >= 0) && bounds.max.is_some_and(|hi| hi < c) {
                    return a;
                }
                if floor {
                    // Multiples of the divisor vanish under flooring
                    // remainder; the same is not true for truncation.
                    let lin = self.linearize(a);
                    let kept: Vec<(ExprId, i64)> = lin
                        .terms
                        .iter()
                        .copied()
                        .filter(|(_, k)| k % c != 0)
                        .collect();
                    let constant = lin.constant.mod_floor(&c);
                    if kept.len() < lin.terms.len() || constant != lin.constant {
                        let reduced = self.rebuild(
                            LinForm {
                                terms: kept,
                                constant,
                            },
                            dtype,
                        );
                        let node = self.tm.mk_floormod(reduced, b);
                        return self.simp(node);
                    }
                }
            }
        }
        if floor {
            self.tm.mk_floormod(a, b)
        } else {
            self.tm.mk_truncmod(a, b)
        }
    }

    fn min_max(&mut self, a: ExprId, b: ExprId, is_min: bool) -> ExprId {
        if a == b {
            return a;
        }
        let dtype = self.tm.dtype(a);
        if dtype.is_int() {
            let diff = self.tm.mk_sub(a, b);
            let diff = self.canonicalize_int(diff);
            let bounds = const_bounds(self.tm, diff, self.ranges);
            if bounds.max.is_some_and(|hi| hi <= 0) {
                // a <= b everywhere
                return if is_min { a } else { b };
            }
            if bounds.min.is_some_and(|lo| lo >= 0) {
                return if is_min { b } else { a };
            }
        }
        if is_min {
            self.tm.mk_min(a, b)
        } else {
            self.tm.mk_max(a, b)
        }
    }

    fn comparison(&mut self, kind: &ExprKind, a: ExprId, b: ExprId) -> ExprId {
        let make: fn(&mut ExprManager, ExprId, ExprId) -> ExprId = match kind {
            ExprKind::Eq(..) => ExprManager::mk_eq,
            ExprKind::Ne(..) => ExprManager::mk_ne,
            ExprKind::Lt(..) => ExprManager::mk_lt,
            ExprKind::Le(..) => ExprManager::mk_le,
            ExprKind::Gt(..) => ExprManager::mk_gt,
            ExprKind::Ge(..) => ExprManager::mk_ge,
            _ => unreachable!(),
        };
        let dtype = self.tm.dtype(a);
        if dtype.is_float() {
            if let (Some(x), Some(y)) = (self.as_const_float(a), self.as_const_float(b)) {
                let v = match kind {
                    ExprKind::Eq(..) => x == y,
                    ExprKind::Ne(..) => x != y,
                    ExprKind::Lt(..) => x < y,
                    ExprKind::Le(..) => x <= y,
                    ExprKind::Gt(..) => x > y,
                    ExprKind::Ge(..) => x >= y,
                    _ => unreachable!(),
                };
                return self.tm.mk_bool(v);
            }
            return make(self.tm, a, b);
        }
        if !dtype.is_int() {
            if a == b && matches!(kind, ExprKind::Eq(..) | ExprKind::Le(..) | ExprKind::Ge(..)) {
                return self.tm.mk_true();
            }
            return make(self.tm, a, b);
        }

        let diff_expr = self.tm.mk_sub(a, b);
        let mut lin = self.linearize(diff_expr);
        if lin.terms.is_empty() {
            let c = lin.constant;
            let v = match kind {
                ExprKind::Eq(..) => c == 0,
                ExprKind::Ne(..) => c != 0,
                ExprKind::Lt(..) => c < 0,
                ExprKind::Le(..) => c <= 0,
                ExprKind::Gt(..) => c > 0,
                ExprKind::Ge(..) => c >= 0,
                _ => unreachable!(),
            };
            return self.tm.mk_bool(v);
        }

        let equality = matches!(kind, ExprKind::Eq(..) | ExprKind::Ne(..));
        if equality {
            let g = lin
                .terms
                .iter()
                .fold(0i64, |acc, &(_, k)| acc.gcd(&k.abs()));
            if g > 1 {
                if lin.constant % g != 0 {
                    // No integer solution.
                    return self
                        .tm
                        .mk_bool(matches!(kind, ExprKind::Ne(..)));
                }
                lin = LinForm {
                    terms: lin.terms.iter().map(|&(t, k)| (t, k / g)).collect(),
                    constant: lin.constant / g,
                };
            }
            // Orient the leading coefficient positive so `a == b` and
            // `b == a` meet at one id.
            if lin.terms[0].1 < 0 {
                lin = LinForm {
                    terms: lin.terms.iter().map(|&(t, k)| (t, -k)).collect(),
                    constant: -lin.constant,
                };
            }
        }

        let lhs = self.rebuild(
            LinForm {
                terms: lin.terms.clone(),
                constant: 0,
            },
            dtype,
        );
        let bounds = const_bounds(self.tm, lhs, self.ranges);
        // The comparison reads `lhs OP -constant`.
        let rhs_val = -lin.constant;
        let decided = match kind {
            ExprKind::Eq(..) => match (bounds.min, bounds.max) {
                (Some(lo), _) if lo > rhs_val => Some(false),
                (_, Some(hi)) if hi < rhs_val => Some(false),
                (Some(lo), Some(hi)) if lo == rhs_val && hi == rhs_val => Some(true),
                _ => None,
            },
            ExprKind::Ne(..) => match (bounds.min, bounds.max) {
                (Some(lo), _) if lo > rhs_val => Some(true),
                (_, Some(hi)) if hi < rhs_val => Some(true),
                (Some(lo), Some(hi)) if lo == rhs_val && hi == rhs_val => Some(false),
                _ => None,
            },
            ExprKind::Lt(..) => match (bounds.min, bounds.max) {
                (_, Some(hi)) if hi < rhs_val => Some(true),
                (Some(lo), _) if lo >= rhs_val => Some(false),
                _ => None,
            },
            ExprKind::Le(..) => match (bounds.min, bounds.max) {
                (_, Some(hi)) if hi <= rhs_val => Some(true),
                (Some(lo), _) if lo > rhs_val => Some(false),
                _ => None,
            },
            ExprKind::Gt(..) => match (bounds.min, bounds.max) {
                (Some(lo), _) if lo > rhs_val => Some(true),
                (_, Some(hi)) if hi <= rhs_val => Some(false),
                _ => None,
            },
            ExprKind::Ge(..) => match (bounds.min, bounds.max) {
                (Some(lo), _) if lo >= rhs_val => Some(true),
                (_, Some(hi)) if hi < rhs_val => Some(false),
                _ => None,
            },
            _ => unreachable!(),
        };
        if let Some(v) = decided {
            return self.tm.mk_bool(v);
        }
        let rhs = self.tm.mk_const(dtype, rhs_val);
        make(self.tm, lhs, rhs)
    }

    fn negation(&mut self, a: ExprId) -> ExprId {
        if self.tm.is_true(a) {
            return self.tm.mk_false();
        }
        if self.tm.is_false(a) {
            return self.tm.mk_true();
        }
        let kind = self.tm.kind(a).clone();
        match kind {
            ExprKind::Not(inner) => inner,
            ExprKind::Eq(x, y) => self.tm.mk_ne(x, y),
            ExprKind::Ne(x, y) => self.tm.mk_eq(x, y),
            ExprKind::Lt(x, y) => self.tm.mk_ge(x, y),
            ExprKind::Le(x, y) => self.tm.mk_gt(x, y),
            ExprKind::Gt(x, y) => self.tm.mk_le(x, y),
            ExprKind::Ge(x, y) => self.tm.mk_lt(x, y),
            _ => self.tm.mk_not(a),
        }
    }

    fn cast(&mut self, dtype: DType, value: ExprId) -> ExprId {
        if let Some(v) = self.tm.as_const_int(value) {
            return self.tm.mk_const(dtype, v);
        }
        if let Some(f) = self.as_const_float(value) {
            return match dtype {
                DType::Bool => self.tm.mk_bool(f != 0.0),
                DType::Int32 | DType::Int64 => self.tm.mk_const(dtype, f as i64),
                DType::Float32 | DType::Float64 => self.tm.mk_float(f, dtype),
            };
        }
        self.tm.mk_cast(dtype, value)
    }

    fn canonicalize_int(&mut self, e: ExprId) -> ExprId {
        let dtype = self.tm.dtype(e);
        let lin = self.linearize(e);
        self.rebuild(lin, dtype)
    }

    fn linearize(&mut self, e: ExprId) -> LinForm {
        let mut terms: FxHashMap<ExprId, i64> = FxHashMap::default();
        let mut constant = 0i64;
        if self.lin_rec(e, 1, &mut terms, &mut constant).is_none() {
            // Overflow along the way; treat the whole expression opaquely.
            return LinForm {
                terms: vec![(e, 1)],
                constant: 0,
            };
        }
        let mut terms: Vec<(ExprId, i64)> =
            terms.into_iter().filter(|&(_, k)| k != 0).collect();
        terms.sort_by(|a, b| crate::compare::deep_compare(self.tm, a.0, b.0));
        LinForm { terms, constant }
    }

    fn lin_rec(
        &mut self,
        e: ExprId,
        scale: i64,
        terms: &mut FxHashMap<ExprId, i64>,
        constant: &mut i64,
    ) -> Option<()> {
        let kind = self.tm.kind(e).clone();
        match kind {
            ExprKind::IntImm { value, .. } => {
                *constant = constant.checked_add(value.checked_mul(scale)?)?;
            }
            ExprKind::Add(a, b) => {
                self.lin_rec(a, scale, terms, constant)?;
                self.lin_rec(b, scale, terms, constant)?;
            }
            ExprKind::Sub(a, b) => {
                self.lin_rec(a, scale, terms, constant)?;
                self.lin_rec(b, scale.checked_neg()?, terms, constant)?;
            }
            ExprKind::Mul(a, b) => {
                if let Some(c) = self.tm.as_const_int(a) {
                    self.lin_rec(b, scale.checked_mul(c)?, terms, constant)?;
                } else if let Some(c) = self.tm.as_const_int(b) {
                    self.lin_rec(a, scale.checked_mul(c)?, terms, constant)?;
                } else {
                    let slot = terms.entry(e).or_insert(0);
                    *slot = slot.checked_add(scale)?;
                }
            }
            _ => {
                let slot = terms.entry(e).or_insert(0);
                *slot = slot.checked_add(scale)?;
            }
        }
        Some(())
    }

    fn rebuild(&mut self, lin: LinForm, dtype: DType) -> ExprId {
        let mut acc: Option<ExprId> = None;
        for &(atom, k) in lin.terms.iter().filter(|&&(_, k)| k > 0) {
            let term = if k == 1 {
                atom
            } else {
                let c = self.tm.mk_const(dtype, k);
                self.tm.mk_mul(atom, c)
            };
            acc = Some(match acc {
                Some(prev) => self.tm.mk_add(prev, term),
                None => term,
            });
        }
        for &(atom, k) in lin.terms.iter().filter(|&&(_, k)| k < 0) {
            let term = if k == -1 {
                atom
            } else {
                let c = self.tm.mk_const(dtype, -k);
                self.tm.mk_mul(atom, c)
            };
            let base = acc.unwrap_or_else(|| self.tm.mk_zero(dtype));
            acc = Some(self.tm.mk_sub(base, term));
        }
        match acc {
            None => self.tm.mk_const(dtype, lin.constant),
            Some(acc) if lin.constant > 0 => {
                let c = self.tm.mk_const(dtype, lin.constant);
                self.tm.mk_add(acc, c)
            }
            Some(acc) if lin.constant < 0 => {
                let c = self.tm.mk_const(dtype, -lin.constant);
                self.tm.mk_sub(acc, c)
            }
            Some(acc) => acc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Range;

    fn ctx() -> (ExprManager, RangeMap) {
        (ExprManager::new(), RangeMap::default())
    }

    fn with_range(
        tm: &mut ExprManager,
        ranges: &mut RangeMap,
        name: &str,
        min: i64,
        extent: i64,
    ) -> ExprId {
        let v = tm.mk_var(name, DType::Int32);
        let min = tm.mk_int(min);
        let extent = tm.mk_int(extent);
        ranges.insert(v, Range { min, extent });
        v
    }

    #[test]
    fn affine_cancellation() {
        let (mut tm, ranges) = ctx();
        let i = tm.mk_var("i", DType::Int32);
        let j = tm.mk_var("j", DType::Int32);
        // (i + j) - (j + i) == 0
        let a = tm.mk_add(i, j);
        let b = tm.mk_add(j, i);
        let e = tm.mk_sub(a, b);
        let s = simplify(&mut tm, e, &ranges);
        assert!(tm.is_const_int(s, 0));
    }

    #[test]
    fn range_proves_comparisons() {
        let (mut tm, mut ranges) = ctx();
        let i = with_range(&mut tm, &mut ranges, "i", 0, 10);
        let ten = tm.mk_int(10);
        let lt = tm.mk_lt(i, ten);
        assert!(can_prove(&mut tm, lt, &ranges));
        let zero = tm.mk_int(0);
        let ge = tm.mk_ge(i, zero);
        assert!(can_prove(&mut tm, ge, &ranges));
        let five = tm.mk_int(5);
        let eq = tm.mk_eq(i, five);
        let s = simplify(&mut tm, eq, &ranges);
        assert!(!tm.is_true(s) && !tm.is_false(s));
    }

    #[test]
    fn parity_equations_are_refuted() {
        let (mut tm, ranges) = ctx();
        let i = tm.mk_var("i", DType::Int32);
        let two = tm.mk_int(2);
        let one = tm.mk_int(1);
        // 2*i == 1 has no integer solution.
        let e = tm.mk_mul(two, i);
        let eq = tm.mk_eq(e, one);
        let s = simplify(&mut tm, eq, &ranges);
        assert!(tm.is_false(s));
    }

    #[test]
    fn extent_one_vars_collapse() {
        let (mut tm, mut ranges) = ctx();
        let i = with_range(&mut tm, &mut ranges, "i", 3, 1);
        let s = simplify(&mut tm, i, &ranges);
        assert!(tm.is_const_int(s, 3));
    }

    #[test]
    fn division_rules() {
        let (mut tm, mut ranges) = ctx();
        let n = with_range(&mut tm, &mut ranges, "n", 0, 30);
        let one = tm.mk_int(1);
        let d = tm.mk_floordiv(n, one);
        assert_eq!(simplify(&mut tm, d, &ranges), n);

        // (2n + 4) // 2 == n + 2
        let two = tm.mk_int(2);
        let four = tm.mk_int(4);
        let e = tm.mk_mul(n, two);
        let e = tm.mk_add(e, four);
        let e = tm.mk_floordiv(e, two);
        let s = simplify(&mut tm, e, &ranges);
        let expect = tm.mk_add(n, two);
        let expect = simplify(&mut tm, expect, &ranges);
        assert_eq!(s, expect);

        // n %% 30 == n within the range
        let thirty = tm.mk_int(30);
        let m = tm.mk_floormod(n, thirty);
        assert_eq!(simplify(&mut tm, m, &ranges), n);
    }

    #[test]
    fn empty_axis_reduce_becomes_select() {
        let (mut tm, ranges) = ctx();
        let x = tm.mk_var("acc", DType::Int32);
        let y = tm.mk_var("val", DType::Int32);
        let res = tm.mk_add(x, y);
        let zero = tm.mk_int(0);
        let combiner = crate::expr::CommReducer {
            lhs: vec![x],
            rhs: vec![y],
            result: vec![res],
            identity: vec![zero],
        };
        let i = tm.mk_var("i", DType::Int32);
        let c = tm.mk_var("c", DType::Bool);
        let red = tm.mk_reduce(combiner, vec![i], vec![], c, 0);
        let s = simplify(&mut tm, red, &ranges);
        assert_eq!(s, tm.mk_select(c, i, zero));
    }
}
