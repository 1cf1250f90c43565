//! Reference interpreter.
//!
//! Evaluates expressions under a concrete variable assignment. The passes
//! never call this; it exists so test suites can check rewrites by brute
//! force over every in-range assignment, including reductions and tensor
//! reads (placeholder reads are answered by a caller-supplied function).

use num_integer::Integer;
use rustc_hash::FxHashMap;

use crate::dtype::DType;
use crate::expr::{CallOp, ExprId, ExprKind, ExprManager, IterVar, Tensor, TensorOpKind};

/// A runtime value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
    /// Floating point value.
    Float(f64),
}

impl Value {
    /// Integer content; booleans count as 0/1.
    pub fn as_int(self) -> Result<i64, String> {
        match self {
            Value::Int(v) => Ok(v),
            Value::Bool(b) => Ok(i64::from(b)),
            Value::Float(f) => Err(format!("expected an integer, got {f}")),
        }
    }

    /// Boolean content.
    pub fn as_bool(self) -> Result<bool, String> {
        match self {
            Value::Bool(b) => Ok(b),
            Value::Int(v) => Ok(v != 0),
            Value::Float(f) => Err(format!("expected a boolean, got {f}")),
        }
    }

    /// Numeric content widened to `f64`.
    pub fn as_f64(self) -> Result<f64, String> {
        match self {
            Value::Float(f) => Ok(f),
            Value::Int(v) => Ok(v as f64),
            Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        }
    }
}

/// Variable assignment.
pub type VarEnv = FxHashMap<ExprId, Value>;

/// Source of placeholder tensor elements.
pub type TensorFn<'a> = &'a mut dyn FnMut(Tensor, &[i64]) -> Value;

/// Evaluate `e` under `env`, reading placeholder tensors through `tensors`.
pub fn eval_expr(
    tm: &ExprManager,
    e: ExprId,
    env: &VarEnv,
    tensors: TensorFn<'_>,
) -> Result<Value, String> {
    match tm.kind(e) {
        ExprKind::IntImm { value, dtype } => Ok(if dtype.is_bool() {
            Value::Bool(*value != 0)
        } else {
            Value::Int(*value)
        }),
        ExprKind::FloatImm { bits, .. } => Ok(Value::Float(f64::from_bits(*bits))),
        ExprKind::StrImm(s) => Err(format!("cannot evaluate string {s:?}")),
        ExprKind::Var { name, .. } => env
            .get(&e)
            .copied()
            .ok_or_else(|| format!("unbound variable {name}")),
        ExprKind::Cast { dtype, value } => {
            let v = eval_expr(tm, *value, env, tensors)?;
            Ok(match dtype {
                DType::Bool => Value::Bool(v.as_f64()? != 0.0),
                DType::Int32 | DType::Int64 => match v {
                    Value::Float(f) => Value::Int(f as i64),
                    other => Value::Int(other.as_int()?),
                },
                DType::Float32 | DType::Float64 => Value::Float(v.as_f64()?),
            })
        }
        ExprKind::Add(a, b) => numeric(tm, *a, *b, env, tensors, |x, y| x + y, |x, y| x + y),
        ExprKind::Sub(a, b) => numeric(tm, *a, *b, env, tensors, |x, y| x - y, |x, y| x - y),
        ExprKind::Mul(a, b) => numeric(tm, *a, *b, env, tensors, |x, y| x * y, |x, y| x * y),
        ExprKind::Min(a, b) => numeric(tm, *a, *b, env, tensors, |x, y| x.min(y), f64::min),
        ExprKind::Max(a, b) => numeric(tm, *a, *b, env, tensors, |x, y| x.max(y), f64::max),
        ExprKind::TruncDiv(a, b) => int_div(tm, *a, *b, env, tensors, |x, y| x / y),
        ExprKind::TruncMod(a, b) => int_div(tm, *a, *b, env, tensors, |x, y| x % y),
        ExprKind::FloorDiv(a, b) => {
            int_div(tm, *a, *b, env, tensors, |x, y| Integer::div_floor(&x, &y))
        }
        ExprKind::FloorMod(a, b) => {
            int_div(tm, *a, *b, env, tensors, |x, y| Integer::mod_floor(&x, &y))
        }
        ExprKind::Eq(a, b) => comparison(tm, *a, *b, env, tensors, |o| o == std::cmp::Ordering::Equal),
        ExprKind::Ne(a, b) => comparison(tm, *a, *b, env, tensors, |o| o != std::cmp::Ordering::Equal),
        ExprKind::Lt(a, b) => comparison(tm, *a, *b, env, tensors, |o| o == std::cmp::Ordering::Less),
        ExprKind::Le(a, b) => comparison(tm, *a, *b, env, tensors, |o| o != std::cmp::Ordering::Greater),
        ExprKind::Gt(a, b) => comparison(tm, *a, *b, env, tensors, |o| o == std::cmp::Ordering::Greater),
        ExprKind::Ge(a, b) => comparison(tm, *a, *b, env, tensors, |o| o != std::cmp::Ordering::Less),
        ExprKind::And(a, b) => {
            let x = eval_expr(tm, *a, env, tensors)?.as_bool()?;
            if !x {
                return Ok(Value::Bool(false));
            }
            let y = eval_expr(tm, *b, env, tensors)?.as_bool()?;
            Ok(Value::Bool(y))
        }
        ExprKind::Or(a, b) => {
            let x = eval_expr(tm, *a, env, tensors)?.as_bool()?;
            if x {
                return Ok(Value::Bool(true));
            }
            let y = eval_expr(tm, *b, env, tensors)?.as_bool()?;
            Ok(Value::Bool(y))
        }
        ExprKind::Not(a) => {
            let x = eval_expr(tm, *a, env, tensors)?.as_bool()?;
            Ok(Value::Bool(!x))
        }
        ExprKind::Select {
            cond,
            true_value,
            false_value,
        } => {
            let c = eval_expr(tm, *cond, env, tensors)?.as_bool()?;
            eval_expr(tm, if c { *true_value } else { *false_value }, env, tensors)
        }
        ExprKind::Let { var, value, body } => {
            let v = eval_expr(tm, *value, env, tensors)?;
            let mut inner = env.clone();
            inner.insert(*var, v);
            eval_expr(tm, *body, &inner, tensors)
        }
        ExprKind::Call { op, args, .. } => match op {
            CallOp::IfThenElse => {
                let c = eval_expr(tm, args[0], env, tensors)?.as_bool()?;
                eval_expr(tm, if c { args[1] } else { args[2] }, env, tensors)
            }
            CallOp::Tensor(tensor) => {
                let mut coords = Vec::with_capacity(args.len());
                for &a in args {
                    coords.push(eval_expr(tm, a, env, tensors)?.as_int()?);
                }
                eval_tensor(tm, *tensor, &coords, tensors)
            }
            CallOp::Extern(name) => Err(format!("cannot evaluate extern call {name}")),
        },
        ExprKind::Reduce {
            combiner,
            source,
            axis,
            condition,
            value_index,
        } => {
            let mut acc = Vec::with_capacity(combiner.identity.len());
            for &id in &combiner.identity {
                acc.push(eval_expr(tm, id, env, tensors)?);
            }
            let mut doms = Vec::with_capacity(axis.len());
            for iv in axis {
                let min = eval_expr(tm, iv.dom.min, env, tensors)?.as_int()?;
                let extent = eval_expr(tm, iv.dom.extent, env, tensors)?.as_int()?;
                doms.push((iv.var, min, extent));
            }
            reduce_loop(
                tm, combiner, source, *condition, &doms, 0, env, &mut acc, tensors,
            )?;
            Ok(acc[*value_index])
        }
    }
}

/// Evaluate one output element of a tensor.
pub fn eval_tensor(
    tm: &ExprManager,
    tensor: Tensor,
    coords: &[i64],
    tensors: TensorFn<'_>,
) -> Result<Value, String> {
    let data = tm.op(tensor.op);
    match &data.kind {
        TensorOpKind::Placeholder { ndim } => {
            if coords.len() != *ndim {
                return Err(format!(
                    "placeholder {} expects {} coordinates, got {}",
                    data.name,
                    ndim,
                    coords.len()
                ));
            }
            Ok(tensors(tensor, coords))
        }
        TensorOpKind::Compute { axis, body } => {
            if coords.len() != axis.len() {
                return Err(format!(
                    "compute {} expects {} coordinates, got {}",
                    data.name,
                    axis.len(),
                    coords.len()
                ));
            }
            let mut env = VarEnv::default();
            for (iv, &c) in axis.iter().zip(coords) {
                env.insert(iv.var, Value::Int(c));
            }
            eval_expr(tm, body[tensor.value_index], &env, tensors)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn reduce_loop(
    tm: &ExprManager,
    combiner: &crate::expr::CommReducer,
    source: &[ExprId],
    condition: ExprId,
    doms: &[(ExprId, i64, i64)],
    level: usize,
    env: &VarEnv,
    acc: &mut Vec<Value>,
    tensors: TensorFn<'_>,
) -> Result<(), String> {
    if level == doms.len() {
        if !eval_expr(tm, condition, env, tensors)?.as_bool()? {
            return Ok(());
        }
        let mut vals = Vec::with_capacity(source.len());
        for &s in source {
            vals.push(eval_expr(tm, s, env, tensors)?);
        }
        let mut inner = env.clone();
        for ((&l, &r), (&a, &v)) in combiner
            .lhs
            .iter()
            .zip(combiner.rhs.iter())
            .zip(acc.iter().zip(vals.iter()))
        {
            inner.insert(l, a);
            inner.insert(r, v);
        }
        for (slot, &res) in acc.iter_mut().zip(combiner.result.iter()) {
            *slot = eval_expr(tm, res, &inner, tensors)?;
        }
        return Ok(());
    }
    let (var, min, extent) = doms[level];
    for i in min..min + extent {
        let mut inner = env.clone();
        inner.insert(var, Value::Int(i));
        reduce_loop(
            tm, combiner, source, condition, doms, level + 1, &inner, acc, tensors,
        )?;
    }
    Ok(())
}

fn numeric(
    tm: &ExprManager,
    a: ExprId,
    b: ExprId,
    env: &VarEnv,
    tensors: TensorFn<'_>,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, String> {
    let x = eval_expr(tm, a, env, tensors)?;
    let y = eval_expr(tm, b, env, tensors)?;
    match (x, y) {
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            Ok(Value::Float(float_op(x.as_f64()?, y.as_f64()?)))
        }
        _ => Ok(Value::Int(int_op(x.as_int()?, y.as_int()?))),
    }
}

fn int_div(
    tm: &ExprManager,
    a: ExprId,
    b: ExprId,
    env: &VarEnv,
    tensors: TensorFn<'_>,
    op: fn(i64, i64) -> i64,
) -> Result<Value, String> {
    let x = eval_expr(tm, a, env, tensors)?.as_int()?;
    let y = eval_expr(tm, b, env, tensors)?.as_int()?;
    if y == 0 {
        return Err("division by zero".to_string());
    }
    Ok(Value::Int(op(x, y)))
}

fn comparison(
    tm: &ExprManager,
    a: ExprId,
    b: ExprId,
    env: &VarEnv,
    tensors: TensorFn<'_>,
    accept: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, String> {
    let x = eval_expr(tm, a, env, tensors)?;
    let y = eval_expr(tm, b, env, tensors)?;
    let ord = match (x, y) {
        (Value::Float(_), _) | (_, Value::Float(_)) => x
            .as_f64()?
            .partial_cmp(&y.as_f64()?)
            .ok_or_else(|| "NaN comparison".to_string())?,
        _ => x.as_int()?.cmp(&y.as_int()?),
    };
    Ok(Value::Bool(accept(ord)))
}

/// Evaluate a closed expression without tensor reads.
pub fn eval_closed(tm: &ExprManager, e: ExprId) -> Result<Value, String> {
    let env = VarEnv::default();
    eval_expr(tm, e, &env, &mut |_, _| {
        Value::Int(0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{CommReducer, Range};

    #[test]
    fn evaluates_arithmetic() {
        let mut tm = ExprManager::new();
        let seven = tm.mk_int(7);
        let three = tm.mk_int(3);
        let q = tm.mk_truncdiv(seven, three);
        let m = tm.mk_truncmod(seven, three);
        let e = tm.mk_add(q, m);
        assert_eq!(eval_closed(&tm, e).unwrap(), Value::Int(3));

        let neg = tm.mk_int(-7);
        let fd = tm.mk_floordiv(neg, three);
        assert_eq!(eval_closed(&tm, fd).unwrap(), Value::Int(-3));
        let fm = tm.mk_floormod(neg, three);
        assert_eq!(eval_closed(&tm, fm).unwrap(), Value::Int(2));
    }

    #[test]
    fn evaluates_sum_reduction() {
        let mut tm = ExprManager::new();
        let k = tm.mk_var("k", crate::DType::Int32);
        let zero = tm.mk_int(0);
        let five = tm.mk_int(5);
        let x = tm.mk_var("x", crate::DType::Int32);
        let y = tm.mk_var("y", crate::DType::Int32);
        let res = tm.mk_add(x, y);
        let combiner = CommReducer {
            lhs: vec![x],
            rhs: vec![y],
            result: vec![res],
            identity: vec![zero],
        };
        let two = tm.mk_int(2);
        let cond = tm.mk_ne(k, two);
        let red = tm.mk_reduce(
            combiner,
            vec![k],
            vec![IterVar {
                var: k,
                dom: Range {
                    min: zero,
                    extent: five,
                },
            }],
            cond,
            0,
        );
        // 0 + 1 + 3 + 4
        assert_eq!(eval_closed(&tm, red).unwrap(), Value::Int(8));
    }
}
