//! Expression printing.
//!
//! `tm.display(e)` returns a `Display` adapter; output is fully
//! parenthesized infix for binary nodes and function syntax for the rest.

use std::fmt;

use crate::expr::{CallOp, ExprId, ExprKind, ExprManager, IterVar, Range, TensorOpKind};

/// `Display` adapter returned by [`ExprManager::display`].
pub struct DisplayExpr<'a> {
    tm: &'a ExprManager,
    id: ExprId,
}

/// `Display` adapter for a [`Range`].
pub struct DisplayRange<'a> {
    tm: &'a ExprManager,
    range: Range,
}

impl ExprManager {
    /// Printable view of an expression.
    pub fn display(&self, id: ExprId) -> DisplayExpr<'_> {
        DisplayExpr { tm: self, id }
    }

    /// Printable view of a range.
    pub fn display_range(&self, range: Range) -> DisplayRange<'_> {
        DisplayRange { tm: self, range }
    }
}

impl fmt::Display for DisplayRange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}; {})",
            self.tm.display(self.range.min),
            self.tm.display(self.range.extent)
        )
    }
}

fn write_binary(
    tm: &ExprManager,
    f: &mut fmt::Formatter<'_>,
    op: &str,
    a: ExprId,
    b: ExprId,
) -> fmt::Result {
    write!(f, "({} {} {})", tm.display(a), op, tm.display(b))
}

fn write_call(
    tm: &ExprManager,
    f: &mut fmt::Formatter<'_>,
    name: &str,
    args: &[ExprId],
) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", tm.display(*a))?;
    }
    write!(f, ")")
}

fn write_axis(tm: &ExprManager, f: &mut fmt::Formatter<'_>, axis: &[IterVar]) -> fmt::Result {
    write!(f, "[")?;
    for (i, iv) in axis.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", tm.display(iv.var), tm.display_range(iv.dom))?;
    }
    write!(f, "]")
}

impl fmt::Display for DisplayExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tm = self.tm;
        match tm.kind(self.id) {
            ExprKind::IntImm { value, dtype } => {
                if dtype.is_bool() {
                    write!(f, "{}", *value != 0)
                } else {
                    write!(f, "{value}")
                }
            }
            ExprKind::FloatImm { bits, .. } => write!(f, "{:?}", f64::from_bits(*bits)),
            ExprKind::StrImm(s) => write!(f, "{s:?}"),
            ExprKind::Var { name, .. } => f.write_str(name),
            ExprKind::Cast { dtype, value } => {
                write!(f, "{}({})", dtype, tm.display(*value))
            }
            ExprKind::Add(a, b) => write_binary(tm, f, "+", *a, *b),
            ExprKind::Sub(a, b) => write_binary(tm, f, "-", *a, *b),
            ExprKind::Mul(a, b) => write_binary(tm, f, "*", *a, *b),
            ExprKind::TruncDiv(a, b) => write_binary(tm, f, "/", *a, *b),
            ExprKind::TruncMod(a, b) => write_binary(tm, f, "%", *a, *b),
            ExprKind::FloorDiv(a, b) => write_binary(tm, f, "//", *a, *b),
            ExprKind::FloorMod(a, b) => write_binary(tm, f, "%%", *a, *b),
            ExprKind::Min(a, b) => {
                write!(f, "min({}, {})", tm.display(*a), tm.display(*b))
            }
            ExprKind::Max(a, b) => {
                write!(f, "max({}, {})", tm.display(*a), tm.display(*b))
            }
            ExprKind::Eq(a, b) => write_binary(tm, f, "==", *a, *b),
            ExprKind::Ne(a, b) => write_binary(tm, f, "!=", *a, *b),
            ExprKind::Lt(a, b) => write_binary(tm, f, "<", *a, *b),
            ExprKind::Le(a, b) => write_binary(tm, f, "<=", *a, *b),
            ExprKind::Gt(a, b) => write_binary(tm, f, ">", *a, *b),
            ExprKind::Ge(a, b) => write_binary(tm, f, ">=", *a, *b),
            ExprKind::And(a, b) => write_binary(tm, f, "&&", *a, *b),
            ExprKind::Or(a, b) => write_binary(tm, f, "||", *a, *b),
            ExprKind::Not(a) => write!(f, "!({})", tm.display(*a)),
            ExprKind::Select {
                cond,
                true_value,
                false_value,
            } => write_call(tm, f, "select", &[*cond, *true_value, *false_value]),
            ExprKind::Let { var, value, body } => write!(
                f,
                "(let {} = {} in {})",
                tm.display(*var),
                tm.display(*value),
                tm.display(*body)
            ),
            ExprKind::Call { op, args, .. } => match op {
                CallOp::IfThenElse => write_call(tm, f, "if_then_else", args),
                CallOp::Tensor(t) => {
                    let name = &tm.op(t.op).name;
                    write_call(tm, f, name, args)?;
                    if t.value_index != 0 {
                        write!(f, ".{}", t.value_index)?;
                    }
                    Ok(())
                }
                CallOp::Extern(name) => write_call(tm, f, name, args),
            },
            ExprKind::Reduce {
                source,
                axis,
                condition,
                value_index,
                ..
            } => {
                write!(f, "reduce(source=[")?;
                for (i, s) in source.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", tm.display(*s))?;
                }
                write!(f, "], axis=")?;
                write_axis(tm, f, axis)?;
                write!(
                    f,
                    ", where={}, value_index={})",
                    tm.display(*condition),
                    value_index
                )
            }
        }
    }
}

/// Printable description of a tensor operation.
pub struct DisplayOp<'a> {
    tm: &'a ExprManager,
    op: crate::expr::OpId,
}

impl ExprManager {
    /// Printable view of a tensor operation.
    pub fn display_op(&self, op: crate::expr::OpId) -> DisplayOp<'_> {
        DisplayOp { tm: self, op }
    }
}

impl fmt::Display for DisplayOp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.tm.op(self.op);
        match &data.kind {
            TensorOpKind::Placeholder { ndim } => {
                write!(f, "placeholder {}[{}d]", data.name, ndim)
            }
            TensorOpKind::Compute { axis, body } => {
                write!(f, "compute {}", data.name)?;
                write_axis(self.tm, f, axis)?;
                write!(f, " = ")?;
                for (i, b) in body.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", self.tm.display(*b))?;
                }
                Ok(())
            }
        }
    }
}
