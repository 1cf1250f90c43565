//! Division and modulo elimination.
//!
//! Replaces every subterm `e OP c` (`OP` one of the four division/remainder
//! operators, `c` a nonzero integer constant) by a pair of fresh variables
//! `(div, mod)` constrained by the defining equation `e == div * c + mod`.
//! The rewritten conditions become linear and the solvers downstream can
//! reason about them.
//!
//! Replacement is conservative: when the range of a prospective variable
//! cannot be inferred from the surrounding ranges, the subterm stays in
//! place and a warning is logged, because an unbounded variable would
//! poison the whole domain.

use rustc_hash::FxHashMap;
use zeroxide_ir::expr::{ExprId, ExprKind, ExprManager, Range, RangeMap};
use zeroxide_ir::intset::{cover_range, eval_interval, interval_map_from_ranges};
use zeroxide_ir::simplify::can_prove;
use zeroxide_ir::subst::substitute;

use crate::atomic::factor_out_atomic_formulas;
use crate::domain::{Domain, DomainTransformation};
use crate::util::{all_of, concat, itervars_from_map, itervars_to_map, merge_ranges};

/// Result of a div/mod elimination run.
#[derive(Debug, Clone)]
pub struct DivModElimination {
    /// The rewritten expression.
    pub expr: ExprId,
    /// Definitions of the introduced variables over the original terms.
    pub substitution: FxHashMap<ExprId, ExprId>,
    /// The introduced variables, in introduction order.
    pub new_variables: Vec<ExprId>,
    /// Defining (and sign-consistency) conditions.
    pub conditions: Vec<ExprId>,
    /// Input ranges extended with ranges of the introduced variables.
    pub ranges: RangeMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum DivMode {
    Trunc,
    Floor,
}

impl DivMode {
    fn div(self, tm: &mut ExprManager, a: ExprId, b: ExprId) -> ExprId {
        match self {
            DivMode::Trunc => tm.mk_truncdiv(a, b),
            DivMode::Floor => tm.mk_floordiv(a, b),
        }
    }

    fn rem(self, tm: &mut ExprManager, a: ExprId, b: ExprId) -> ExprId {
        match self {
            DivMode::Trunc => tm.mk_truncmod(a, b),
            DivMode::Floor => tm.mk_floormod(a, b),
        }
    }

    fn prefixes(self) -> (&'static str, &'static str) {
        match self {
            DivMode::Trunc => ("tdiv", "tmod"),
            DivMode::Floor => ("fdiv", "fmod"),
        }
    }
}

struct Eliminator<'a> {
    tm: &'a mut ExprManager,
    substitution: FxHashMap<ExprId, ExprId>,
    new_variables: Vec<ExprId>,
    conditions: Vec<ExprId>,
    ranges: RangeMap,
    // Structurally equal dividends share one variable pair per (mode,
    // divisor); interning makes the expression id that key.
    expr_to_vars: FxHashMap<(DivMode, ExprId, i64), (ExprId, ExprId)>,
}

impl Eliminator<'_> {
    fn mutate(&mut self, e: ExprId) -> ExprId {
        let kind = self.tm.kind(e).clone();
        match kind {
            ExprKind::TruncDiv(a, b) => self.divmod(e, a, b, DivMode::Trunc, true),
            ExprKind::TruncMod(a, b) => self.divmod(e, a, b, DivMode::Trunc, false),
            ExprKind::FloorDiv(a, b) => self.divmod(e, a, b, DivMode::Floor, true),
            ExprKind::FloorMod(a, b) => self.divmod(e, a, b, DivMode::Floor, false),
            _ => self.rebuild(e),
        }
    }

    fn rebuild(&mut self, e: ExprId) -> ExprId {
        let kind = self.tm.kind(e).clone();
        match kind {
            ExprKind::IntImm { .. }
            | ExprKind::FloatImm { .. }
            | ExprKind::StrImm(_)
            | ExprKind::Var { .. } => e,
            ExprKind::Cast { dtype, value } => {
                let value = self.mutate(value);
                self.tm.mk_cast(dtype, value)
            }
            ExprKind::Not(a) => {
                let a = self.mutate(a);
                self.tm.mk_not(a)
            }
            ExprKind::Add(a, b) => self.rebuild2(ExprManager::mk_add, a, b),
            ExprKind::Sub(a, b) => self.rebuild2(ExprManager::mk_sub, a, b),
            ExprKind::Mul(a, b) => self.rebuild2(ExprManager::mk_mul, a, b),
            ExprKind::Min(a, b) => self.rebuild2(ExprManager::mk_min, a, b),
            ExprKind::Max(a, b) => self.rebuild2(ExprManager::mk_max, a, b),
            ExprKind::Eq(a, b) => self.rebuild2(ExprManager::mk_eq, a, b),
            ExprKind::Ne(a, b) => self.rebuild2(ExprManager::mk_ne, a, b),
            ExprKind::Lt(a, b) => self.rebuild2(ExprManager::mk_lt, a, b),
            ExprKind::Le(a, b) => self.rebuild2(ExprManager::mk_le, a, b),
            ExprKind::Gt(a, b) => self.rebuild2(ExprManager::mk_gt, a, b),
            ExprKind::Ge(a, b) => self.rebuild2(ExprManager::mk_ge, a, b),
            ExprKind::And(a, b) => self.rebuild2(ExprManager::mk_and, a, b),
            ExprKind::Or(a, b) => self.rebuild2(ExprManager::mk_or, a, b),
            ExprKind::Select {
                cond,
                true_value,
                false_value,
            } => {
                let cond = self.mutate(cond);
                let t = self.mutate(true_value);
                let f = self.mutate(false_value);
                self.tm.mk_select(cond, t, f)
            }
            ExprKind::Let { var, value, body } => {
                let value = self.mutate(value);
                let body = self.mutate(body);
                self.tm.mk_let(var, value, body)
            }
            ExprKind::Call { op, args, .. } => {
                let args: Vec<ExprId> = args.iter().map(|&a| self.mutate(a)).collect();
                match op {
                    zeroxide_ir::expr::CallOp::IfThenElse => {
                        self.tm.mk_if_then_else(args[0], args[1], args[2])
                    }
                    zeroxide_ir::expr::CallOp::Tensor(t) => self.tm.mk_tensor_call(t, &args),
                    zeroxide_ir::expr::CallOp::Extern(name) => {
                        let dtype = self.tm.dtype(e);
                        self.tm.mk_extern_call(&name, &args, dtype)
                    }
                }
            }
            ExprKind::Reduce {
                combiner,
                source,
                axis,
                condition,
                value_index,
            } => {
                let source: Vec<ExprId> = source.iter().map(|&s| self.mutate(s)).collect();
                let condition = self.mutate(condition);
                self.tm
                    .mk_reduce(combiner, source, axis, condition, value_index)
            }
            ExprKind::TruncDiv(..)
            | ExprKind::TruncMod(..)
            | ExprKind::FloorDiv(..)
            | ExprKind::FloorMod(..) => unreachable!("handled by mutate"),
        }
    }

    fn rebuild2(
        &mut self,
        make: fn(&mut ExprManager, ExprId, ExprId) -> ExprId,
        a: ExprId,
        b: ExprId,
    ) -> ExprId {
        let a = self.mutate(a);
        let b = self.mutate(b);
        make(self.tm, a, b)
    }

    fn divmod(
        &mut self,
        e: ExprId,
        a: ExprId,
        b: ExprId,
        mode: DivMode,
        is_div: bool,
    ) -> ExprId {
        let dtype = self.tm.dtype(e);
        let Some(c) = self.tm.as_const_int(b).filter(|&c| c != 0 && dtype.is_int()) else {
            let a = self.mutate(a);
            let b = self.mutate(b);
            return if is_div {
                mode.div(self.tm, a, b)
            } else {
                mode.rem(self.tm, a, b)
            };
        };

        if c < 0 {
            // Reduce to a positive divisor first.
            let pos = self.tm.mk_const(dtype, -c);
            let zero = self.tm.mk_zero(dtype);
            let rewritten = match (mode, is_div) {
                // x / -c == -(x / c) for truncated division
                (DivMode::Trunc, true) => {
                    let inner = self.tm.mk_truncdiv(a, pos);
                    let inner = self.mutate(inner);
                    return self.tm.mk_sub(zero, inner);
                }
                // x % -c == x % c for truncated division
                (DivMode::Trunc, false) => self.tm.mk_truncmod(a, pos),
                // x / -c == (-x) / c for flooring division
                (DivMode::Floor, true) => {
                    let neg = self.tm.mk_sub(zero, a);
                    self.tm.mk_floordiv(neg, pos)
                }
                // x % -c == -((-x) % c) for flooring division
                (DivMode::Floor, false) => {
                    let neg = self.tm.mk_sub(zero, a);
                    let inner = self.tm.mk_floormod(neg, pos);
                    let inner = self.mutate(inner);
                    return self.tm.mk_sub(zero, inner);
                }
            };
            return self.mutate(rewritten);
        }

        if let Some(&(div, modv)) = self.expr_to_vars.get(&(mode, a, c)) {
            return if is_div { div } else { modv };
        }

        let mutated_a = self.mutate(a);
        match self.add_new_var_pair(a, mutated_a, c, mode) {
            Some((div, modv)) => {
                if is_div {
                    div
                } else {
                    modv
                }
            }
            None => {
                if is_div {
                    mode.div(self.tm, mutated_a, b)
                } else {
                    mode.rem(self.tm, mutated_a, b)
                }
            }
        }
    }

    fn add_new_var_pair(
        &mut self,
        e: ExprId,
        mutated: ExprId,
        val: i64,
        mode: DivMode,
    ) -> Option<(ExprId, ExprId)> {
        if e != mutated
            && let Some(&pair) = self.expr_to_vars.get(&(mode, mutated, val))
        {
            return Some(pair);
        }

        let dtype = self.tm.dtype(e);
        let val_e = self.tm.mk_const(dtype, val);

        let intervals = interval_map_from_ranges(self.tm, &self.ranges);
        let div_expr = mode.div(self.tm, mutated, val_e);
        let mod_expr = mode.rem(self.tm, mutated, val_e);
        let div_set = eval_interval(self.tm, div_expr, &intervals, &self.ranges);
        let mod_set = eval_interval(self.tm, mod_expr, &intervals, &self.ranges);
        let div_range = cover_range(self.tm, div_set, &self.ranges);
        let mod_range = cover_range(self.tm, mod_set, &self.ranges);
        let (Some(div_range), Some(mod_range)) = (div_range, mod_range) else {
            tracing::warn!(
                expr = %self.tm.display(div_expr),
                "div/mod not eliminated: the replacement variable's bounds cannot be inferred"
            );
            return None;
        };

        let (div_prefix, mod_prefix) = mode.prefixes();
        let div = self.tm.fresh_var(div_prefix, dtype);
        let modv = self.tm.fresh_var(mod_prefix, dtype);
        self.new_variables.push(div);
        self.new_variables.push(modv);

        // The definitions refer to original variables only, so earlier
        // replacement variables inside `mutated` are expanded first.
        let expanded = substitute(self.tm, mutated, &self.substitution);
        let div_def = mode.div(self.tm, expanded, val_e);
        let mod_def = mode.rem(self.tm, expanded, val_e);
        self.substitution.insert(div, div_def);
        self.substitution.insert(modv, mod_def);

        self.ranges.insert(div, div_range);
        self.ranges.insert(modv, mod_range);

        let prod = self.tm.mk_mul(div, val_e);
        let sum = self.tm.mk_add(prod, modv);
        let defining = self.tm.mk_eq(mutated, sum);
        self.conditions.push(defining);

        let extent_le = self.tm.mk_le(mod_range.extent, val_e);
        if !can_prove(self.tm, extent_le, &self.ranges) {
            // Truncated semantics admit remainders of either sign when the
            // dividend can change sign, so the defining equation alone
            // would be ambiguous.
            tracing::warn!(
                expr = %self.tm.display(mod_expr),
                "div/mod only partially eliminated: the remainder may change sign"
            );
            let zero = self.tm.mk_zero(dtype);
            let e_nonneg = self.tm.mk_ge(e, zero);
            let mod_nonneg = self.tm.mk_ge(modv, zero);
            let mod_nonpos = self.tm.mk_le(modv, zero);
            let sign = self.tm.mk_select(e_nonneg, mod_nonneg, mod_nonpos);
            self.conditions.push(sign);
        }

        let pair = (div, modv);
        self.expr_to_vars.insert((mode, e, val), pair);
        if e != mutated {
            self.expr_to_vars.insert((mode, mutated, val), pair);
        }
        Some(pair)
    }
}

/// Replace div/mod subterms of `expr` by fresh bounded variables.
pub fn eliminate_div_mod(
    tm: &mut ExprManager,
    expr: ExprId,
    ranges: RangeMap,
) -> DivModElimination {
    let mut eliminator = Eliminator {
        tm,
        substitution: FxHashMap::default(),
        new_variables: Vec::new(),
        conditions: Vec::new(),
        ranges,
        expr_to_vars: FxHashMap::default(),
    };
    let expr = eliminator.mutate(expr);
    DivModElimination {
        expr,
        substitution: eliminator.substitution,
        new_variables: eliminator.new_variables,
        conditions: eliminator.conditions,
        ranges: eliminator.ranges,
    }
}

/// Run div/mod elimination over a domain's conditions, returning the
/// transformation onto the extended domain.
pub fn eliminate_div_mod_from_domain(
    tm: &mut ExprManager,
    domain: &Domain,
) -> DomainTransformation {
    let cond = all_of(tm, &domain.conditions);
    let elim = eliminate_div_mod(tm, cond, domain.ranges.clone());

    let new_variables = concat(domain.variables.clone(), &elim.new_variables);

    let defs = all_of(tm, &elim.conditions);
    let new_cond = tm.mk_and(elim.expr, defs);
    let conditions = factor_out_atomic_formulas(tm, new_cond).to_conditions();

    let mut new_to_old = elim.substitution.clone();
    let mut old_to_new = FxHashMap::default();
    for &v in &domain.variables {
        old_to_new.insert(v, v);
        new_to_old.insert(v, v);
    }

    let new_domain = Domain::new(new_variables, conditions, elim.ranges);
    DomainTransformation {
        new_domain,
        old_domain: domain.clone(),
        new_to_old,
        old_to_new,
    }
}

/// Run div/mod elimination on a reduction's condition, extending its axis
/// with the introduced variables. Non-reductions pass through unchanged.
pub fn eliminate_div_mod_from_reduction(
    tm: &mut ExprManager,
    expr: ExprId,
    vranges: &RangeMap,
) -> crate::error::Result<ExprId> {
    let ExprKind::Reduce {
        combiner,
        source,
        axis,
        condition,
        value_index,
    } = tm.kind(expr).clone()
    else {
        return Ok(expr);
    };

    let vranges = merge_ranges(vranges, &itervars_to_map(&axis));
    let elim = eliminate_div_mod(tm, condition, vranges);

    let new_axis = concat(axis, &itervars_from_map(tm, &elim.new_variables, &elim.ranges)?);

    let defs = all_of(tm, &elim.conditions);
    let new_cond = tm.mk_and(elim.expr, defs);

    Ok(tm.mk_reduce(combiner, source, new_axis, new_cond, value_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroxide_ir::DType;

    #[test]
    fn introduces_bounded_pairs() {
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
        let four = tm.mk_int(4);
        let d = tm.mk_truncdiv(i, four);
        let m = tm.mk_truncmod(i, four);
        let e = tm.mk_add(d, m);

        let res = eliminate_div_mod(&mut tm, e, ranges);
        assert_eq!(res.new_variables.len(), 2);
        let (div, modv) = (res.new_variables[0], res.new_variables[1]);
        assert_ne!(e, res.expr);
        assert_eq!(res.expr, tm.mk_add(div, modv));
        // One defining equation, no sign condition: i is nonnegative.
        assert_eq!(res.conditions.len(), 1);
        let dr = res.ranges[&div];
        assert!(tm.is_const_int(dr.min, 0));
        assert!(tm.is_const_int(dr.extent, 4));
        let mr = res.ranges[&modv];
        assert!(tm.is_const_int(mr.min, 0));
        assert!(tm.is_const_int(mr.extent, 4));
    }

    #[test]
    fn shared_dividends_share_variables() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let zero = tm.mk_int(0);
        let ten = tm.mk_int(10);
        let mut ranges = RangeMap::default();
        ranges.insert(
            i,
            Range {
                min: zero,
                extent: ten,
            },
        );
        let three = tm.mk_int(3);
        let d1 = tm.mk_floordiv(i, three);
        let d2 = tm.mk_floordiv(i, three);
        let e = tm.mk_add(d1, d2);
        let res = eliminate_div_mod(&mut tm, e, ranges);
        // Both occurrences collapse onto one variable pair.
        assert_eq!(res.new_variables.len(), 2);
    }

    #[test]
    fn reduction_conditions_gain_axis_variables() {
        let mut tm = ExprManager::new();
        let k = tm.mk_var("k", DType::Int32);
        let zero = tm.mk_int(0);
        let twelve = tm.mk_int(12);
        let axis = zeroxide_ir::expr::IterVar {
            var: k,
            dom: Range {
                min: zero,
                extent: twelve,
            },
        };
        let x = tm.mk_var("x", DType::Int32);
        let y = tm.mk_var("y", DType::Int32);
        let result = tm.mk_add(x, y);
        let combiner = zeroxide_ir::expr::CommReducer {
            lhs: vec![x],
            rhs: vec![y],
            result: vec![result],
            identity: vec![zero],
        };
        let three = tm.mk_int(3);
        let rem = tm.mk_truncmod(k, three);
        let cond = tm.mk_eq(rem, zero);
        let red = tm.mk_reduce(combiner, vec![k], vec![axis], cond, 0);

        let out =
            eliminate_div_mod_from_reduction(&mut tm, red, &RangeMap::default()).unwrap();
        let ExprKind::Reduce {
            axis, condition, ..
        } = tm.kind(out).clone()
        else {
            panic!("expected a reduction");
        };
        // The k axis plus the introduced div/mod pair.
        assert_eq!(axis.len(), 3);
        // The original remainder no longer occurs in the condition.
        fn contains_mod(tm: &ExprManager, e: ExprId) -> bool {
            matches!(tm.kind(e), ExprKind::TruncMod(..))
                || zeroxide_ir::visit::children(tm.kind(e))
                    .into_iter()
                    .any(|c| contains_mod(tm, c))
        }
        assert!(!contains_mod(&tm, condition));
    }

    #[test]
    fn unbounded_dividends_are_left_alone() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let four = tm.mk_int(4);
        let d = tm.mk_truncdiv(i, four);
        let res = eliminate_div_mod(&mut tm, d, RangeMap::default());
        assert!(res.new_variables.is_empty());
        assert_eq!(res.expr, d);
        assert!(res.conditions.is_empty());
    }
}
