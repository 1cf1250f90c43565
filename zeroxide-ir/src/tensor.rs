//! Tensor construction helpers.

use rustc_hash::FxHashMap;

use crate::expr::{ExprId, ExprKind, ExprManager, IterVar, Tensor};
use crate::subst::substitute;

/// Create a compute tensor whose body is `expr` over the iteration space
/// `axis`.
///
/// When `clone_axis` is set (the usual case), the axis variables are renamed
/// to fresh ones so the caller's variables are not captured by the new
/// operation. A multi-valued reduction body is replicated across all of its
/// value indices, and the returned tensor selects the index of `expr`.
pub fn tensor_from_expr(
    tm: &mut ExprManager,
    expr: ExprId,
    axis: &[IterVar],
    name: &str,
    clone_axis: bool,
) -> Tensor {
    let (axis, expr) = if clone_axis {
        let mut vmap = FxHashMap::default();
        let mut cloned = Vec::with_capacity(axis.len());
        for iv in axis {
            let fresh = tm.var_with_suffix(iv.var, "");
            vmap.insert(iv.var, fresh);
            cloned.push(IterVar {
                var: fresh,
                dom: iv.dom,
            });
        }
        let expr = substitute(tm, expr, &vmap);
        (cloned, expr)
    } else {
        (axis.to_vec(), expr)
    };

    let op_name = tm.fresh_name(name);
    let (body, value_index) = match tm.kind(expr).clone() {
        ExprKind::Reduce {
            combiner,
            source,
            axis: red_axis,
            condition,
            value_index,
        } if source.len() > 1 => {
            let body = (0..source.len())
                .map(|i| {
                    tm.mk_reduce(
                        combiner.clone(),
                        source.clone(),
                        red_axis.clone(),
                        condition,
                        i,
                    )
                })
                .collect();
            (body, value_index)
        }
        _ => (vec![expr], 0),
    };
    let op = tm.compute_op(&op_name, axis, body);
    Tensor { op, value_index }
}

/// Rewrite the body of a compute tensor through `func`, which receives the
/// body expression and the tensor's axis. Returns the tensor unchanged when
/// the body is untouched or the operation is a placeholder.
pub fn transform_body<E>(
    tm: &mut ExprManager,
    tensor: Tensor,
    func: impl FnOnce(&mut ExprManager, ExprId, &[IterVar]) -> Result<ExprId, E>,
) -> Result<Tensor, E> {
    let data = tm.op(tensor.op);
    let crate::expr::TensorOpKind::Compute { axis, body } = data.kind.clone() else {
        return Ok(tensor);
    };
    let name = data.name.clone();
    let old_body = body[tensor.value_index];
    let new_body = func(tm, old_body, &axis)?;
    if new_body == old_body {
        return Ok(tensor);
    }
    Ok(tensor_from_expr(tm, new_body, &axis, &name, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::expr::Range;

    #[test]
    fn cloning_keeps_the_body_closed() {
        let mut tm = ExprManager::new();
        let i = tm.mk_var("i", DType::Int32);
        let zero = tm.mk_int(0);
        let ten = tm.mk_int(10);
        let axis = vec![IterVar {
            var: i,
            dom: Range {
                min: zero,
                extent: ten,
            },
        }];
        let one = tm.mk_int(1);
        let body = tm.mk_add(i, one);
        let t = tensor_from_expr(&mut tm, body, &axis, "t", true);
        let crate::expr::TensorOpKind::Compute { axis, body } = &tm.op(t.op).kind else {
            panic!("expected a compute op");
        };
        assert_ne!(axis[0].var, i);
        assert!(crate::visit::uses_var(&tm, body[0], axis[0].var));
    }
}
