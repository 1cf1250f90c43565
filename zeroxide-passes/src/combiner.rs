//! Combiner classification.

use zeroxide_ir::expr::{CommReducer, ExprManager, RangeMap};
use zeroxide_ir::simplify::simplify;
use zeroxide_ir::subst::substitute;

/// Whether the combiner is a plain single-valued summation: the identity is
/// zero and the combination is the sum of its operands. Parameter ranges
/// may decide combiners that branch on outer variables.
pub fn is_sum_combiner(
    tm: &mut ExprManager,
    combiner: &CommReducer,
    vranges: &RangeMap,
) -> bool {
    if combiner.result.len() != 1 {
        return false;
    }
    let identity = simplify(tm, combiner.identity[0], vranges);
    if !tm.is_const_zero(identity) {
        return false;
    }
    let result = simplify(tm, combiner.result[0], vranges);
    // Canonical simplification reorders integer sums but not floating
    // ones, so check both operand orders.
    let sum = tm.mk_add(combiner.lhs[0], combiner.rhs[0]);
    let sum = simplify(tm, sum, vranges);
    let sum_rev = tm.mk_add(combiner.rhs[0], combiner.lhs[0]);
    let sum_rev = simplify(tm, sum_rev, vranges);
    result == sum || result == sum_rev
}

/// Whether zero can be factored out of the reduction at `value_index`: the
/// identity is zero and combining two zeros yields zero again.
pub fn can_factor_zero_from_combiner(
    tm: &mut ExprManager,
    combiner: &CommReducer,
    value_index: usize,
    vranges: &RangeMap,
) -> bool {
    let identity = simplify(tm, combiner.identity[value_index], vranges);
    if !tm.is_const_zero(identity) {
        return false;
    }
    let zero = tm.mk_zero(tm.dtype(combiner.result[value_index]));
    let mut map = rustc_hash::FxHashMap::default();
    map.insert(combiner.lhs[value_index], zero);
    map.insert(combiner.rhs[value_index], zero);
    let folded = substitute(tm, combiner.result[value_index], &map);
    let folded = simplify(tm, folded, vranges);
    tm.is_const_zero(folded)
}
