//! Tensor inlining.
//!
//! Replaces reads of compute tensors by their defining expressions with the
//! tensor axes substituted by the call arguments. Reductions are cloned on
//! the way in so a reduction inlined twice never shares axis variables.

use rustc_hash::{FxHashMap, FxHashSet};
use zeroxide_ir::expr::{
    CallOp, ExprId, ExprKind, ExprManager, OpId, Tensor, TensorOpKind,
};
use zeroxide_ir::subst::{clone_reduction, map_children, substitute};
use zeroxide_ir::tensor::transform_body;

/// If `expr` reads a compute tensor, inline that single read; otherwise
/// return it unchanged.
pub fn inline_this_call(tm: &mut ExprManager, expr: ExprId) -> ExprId {
    let ExprKind::Call {
        op: CallOp::Tensor(tensor),
        args,
        ..
    } = tm.kind(expr).clone()
    else {
        return expr;
    };
    let TensorOpKind::Compute { axis, body } = tm.op(tensor.op).kind.clone() else {
        return expr;
    };
    let mut vmap = FxHashMap::default();
    for (iv, &arg) in axis.iter().zip(args.iter()) {
        vmap.insert(iv.var, arg);
    }
    let inlined = substitute(tm, body[tensor.value_index], &vmap);
    // Duplicate reduction bodies get fresh axes.
    clone_reduction(tm, inlined)
}

/// Inline a compute tensor's own trailing call, if its body is one.
pub fn inline_tail_call(tm: &mut ExprManager, tensor: Tensor) -> Tensor {
    transform_body::<std::convert::Infallible>(tm, tensor, |tm, body, _| {
        Ok(inline_this_call(tm, body))
    })
    .unwrap_or(tensor)
}

struct InlineTensors {
    /// Empty means every compute tensor is fair game.
    inlineable: FxHashSet<(OpId, usize)>,
    inline_reductions: bool,
}

impl InlineTensors {
    fn allowed(&self, tm: &ExprManager, tensor: Tensor) -> bool {
        if !self.inlineable.is_empty()
            && !self.inlineable.contains(&(tensor.op, tensor.value_index))
        {
            return false;
        }
        match &tm.op(tensor.op).kind {
            TensorOpKind::Placeholder { .. } => false,
            TensorOpKind::Compute { body, .. } => {
                self.inline_reductions
                    || !matches!(tm.kind(body[0]), ExprKind::Reduce { .. })
            }
        }
    }

    fn mutate(&self, tm: &mut ExprManager, e: ExprId) -> ExprId {
        let called = match tm.kind(e) {
            ExprKind::Call {
                op: CallOp::Tensor(tensor),
                ..
            } => Some(*tensor),
            _ => None,
        };
        if let Some(tensor) = called
            && self.allowed(tm, tensor)
        {
            // Inline this call, then keep inlining inside the result.
            let inlined = inline_this_call(tm, e);
            return self.mutate(tm, inlined);
        }
        map_children(tm, e, &mut |tm, c| self.mutate(tm, c))
    }
}

/// Inline reads of compute tensors inside `expr`.
///
/// `inlineable` restricts which tensors may be inlined (empty allows all);
/// reductions are only inlined when `inline_reductions` is set.
pub fn inline_tensors(
    tm: &mut ExprManager,
    expr: ExprId,
    inlineable: &[Tensor],
    inline_reductions: bool,
) -> ExprId {
    let mutator = InlineTensors {
        inlineable: inlineable
            .iter()
            .map(|t| (t.op, t.value_index))
            .collect(),
        inline_reductions,
    };
    mutator.mutate(tm, expr)
}

/// Tensor-level [`inline_tensors`].
pub fn inline_tensors_in_tensor(
    tm: &mut ExprManager,
    tensor: Tensor,
    inlineable: &[Tensor],
    inline_reductions: bool,
) -> Tensor {
    transform_body::<std::convert::Infallible>(tm, tensor, |tm, body, _| {
        Ok(inline_tensors(tm, body, inlineable, inline_reductions))
    })
    .unwrap_or(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroxide_ir::expr::{IterVar, Range};
    use zeroxide_ir::DType;

    fn axis2(tm: &mut ExprManager, n: i64) -> Vec<IterVar> {
        let i = tm.fresh_var("i", DType::Int32);
        let j = tm.fresh_var("j", DType::Int32);
        let zero = tm.mk_int(0);
        let ext = tm.mk_int(n);
        vec![
            IterVar {
                var: i,
                dom: Range {
                    min: zero,
                    extent: ext,
                },
            },
            IterVar {
                var: j,
                dom: Range {
                    min: zero,
                    extent: ext,
                },
            },
        ]
    }

    #[test]
    fn inlines_a_compute_read() {
        let mut tm = ExprManager::new();
        // A[i, j] = i + j*j
        let axis = axis2(&mut tm, 10);
        let (i, j) = (axis[0].var, axis[1].var);
        let jj = tm.mk_mul(j, j);
        let body = tm.mk_add(i, jj);
        let a_op = tm.compute_op("A", axis, vec![body]);
        let a = Tensor {
            op: a_op,
            value_index: 0,
        };

        // Read A[k + 1, k]
        let k = tm.mk_var("k", DType::Int32);
        let one = tm.mk_int(1);
        let k1 = tm.mk_add(k, one);
        let read = tm.mk_tensor_call(a, &[k1, k]);

        let inlined = inline_this_call(&mut tm, read);
        let expect = {
            let kk = tm.mk_mul(k, k);
            tm.mk_add(k1, kk)
        };
        assert_eq!(inlined, expect);
    }

    #[test]
    fn placeholders_are_never_inlined() {
        let mut tm = ExprManager::new();
        let p_op = tm.placeholder_op("P", 1, DType::Float32);
        let p = Tensor {
            op: p_op,
            value_index: 0,
        };
        let k = tm.mk_var("k", DType::Int32);
        let read = tm.mk_tensor_call(p, &[k]);
        assert_eq!(inline_tensors(&mut tm, read, &[], true), read);
    }

    #[test]
    fn allow_list_is_respected() {
        let mut tm = ExprManager::new();
        let axis = axis2(&mut tm, 10);
        let (i, j) = (axis[0].var, axis[1].var);
        let body = tm.mk_add(i, j);
        let a_op = tm.compute_op("A", axis.clone(), vec![body]);
        let a = Tensor {
            op: a_op,
            value_index: 0,
        };
        let body_b = tm.mk_mul(i, j);
        let b_op = tm.compute_op("B", axis, vec![body_b]);
        let b = Tensor {
            op: b_op,
            value_index: 0,
        };

        let k = tm.mk_var("k", DType::Int32);
        let l = tm.mk_var("l", DType::Int32);
        let read_a = tm.mk_tensor_call(a, &[k, l]);
        let read_b = tm.mk_tensor_call(b, &[k, l]);
        let e = tm.mk_add(read_a, read_b);

        let out = inline_tensors(&mut tm, e, &[a], false);
        let expect = {
            let kl = tm.mk_add(k, l);
            tm.mk_add(kl, read_b)
        };
        assert_eq!(out, expect);
    }
}
