//! Hash-consed expression arena.
//!
//! Expressions are immutable structural values stored in an [`ExprManager`]
//! and referenced by [`ExprId`]. Interning guarantees that two structurally
//! equal expressions share the same id, so equality checks are id
//! comparisons and hash containers over expressions are cheap.
//!
//! The manager also owns the tensor-operation table: compute and placeholder
//! operations that expressions reference through [`CallOp::Tensor`] calls.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::dtype::DType;

/// Reference to an interned expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    /// Index into the manager's arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reference to a tensor operation in the manager's operation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u32);

impl OpId {
    /// Index into the manager's operation table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An output of a tensor operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tensor {
    /// The producing operation.
    pub op: OpId,
    /// Which output of the operation this tensor is.
    pub value_index: usize,
}

/// Half-open integer interval `[min, min + extent)` with `extent > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    /// Inclusive lower bound.
    pub min: ExprId,
    /// Number of values in the range.
    pub extent: ExprId,
}

/// An iteration variable together with its domain of iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IterVar {
    /// The bound variable (always an `ExprKind::Var`).
    pub var: ExprId,
    /// The range the variable iterates over.
    pub dom: Range,
}

/// Mapping from variables to their ranges.
///
/// Iteration order of the underlying map is not deterministic; passes that
/// iterate a range map sort its entries by structural comparison first.
pub type RangeMap = FxHashMap<ExprId, Range>;

/// A commutative reducer: `result` combines the accumulators `lhs` with the
/// incoming values `rhs`, starting from `identity`.
///
/// All four sequences have the same length; multi-valued reducers (used for
/// derivative-style reductions) have length greater than one. The `lhs` and
/// `rhs` variables are binders local to `result`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommReducer {
    /// Accumulator variables.
    pub lhs: Vec<ExprId>,
    /// Incoming value variables.
    pub rhs: Vec<ExprId>,
    /// Combination expressions over `lhs`/`rhs`.
    pub result: Vec<ExprId>,
    /// Identity elements.
    pub identity: Vec<ExprId>,
}

/// Target of a call expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallOp {
    /// The `if_then_else` intrinsic: lazily evaluated select that must be
    /// preserved by rewrites.
    IfThenElse,
    /// Element read from a tensor at the argument coordinates.
    Tensor(Tensor),
    /// An opaque external function.
    Extern(String),
}

/// Expression node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    /// Integer (or boolean) constant.
    IntImm {
        /// Constant value; 0 or 1 for booleans.
        value: i64,
        /// Type of the constant.
        dtype: DType,
    },
    /// Floating point constant, stored as raw bits so interning stays exact.
    FloatImm {
        /// Bit pattern of the `f64` value.
        bits: u64,
        /// Type of the constant.
        dtype: DType,
    },
    /// String constant.
    StrImm(String),
    /// Variable. Identity is the `(name, dtype)` pair.
    Var {
        /// Variable name.
        name: String,
        /// Type of the variable.
        dtype: DType,
    },
    /// Type conversion.
    Cast {
        /// Target type.
        dtype: DType,
        /// Converted operand.
        value: ExprId,
    },
    /// Addition.
    Add(ExprId, ExprId),
    /// Subtraction.
    Sub(ExprId, ExprId),
    /// Multiplication.
    Mul(ExprId, ExprId),
    /// Truncated division (rounds toward zero).
    TruncDiv(ExprId, ExprId),
    /// Remainder of truncated division (sign of the dividend).
    TruncMod(ExprId, ExprId),
    /// Floor division (rounds toward negative infinity).
    FloorDiv(ExprId, ExprId),
    /// Remainder of floor division (sign of the divisor).
    FloorMod(ExprId, ExprId),
    /// Minimum.
    Min(ExprId, ExprId),
    /// Maximum.
    Max(ExprId, ExprId),
    /// Equality comparison.
    Eq(ExprId, ExprId),
    /// Inequality comparison.
    Ne(ExprId, ExprId),
    /// Strictly-less comparison.
    Lt(ExprId, ExprId),
    /// Less-or-equal comparison.
    Le(ExprId, ExprId),
    /// Strictly-greater comparison.
    Gt(ExprId, ExprId),
    /// Greater-or-equal comparison.
    Ge(ExprId, ExprId),
    /// Boolean conjunction.
    And(ExprId, ExprId),
    /// Boolean disjunction.
    Or(ExprId, ExprId),
    /// Boolean negation.
    Not(ExprId),
    /// Eager conditional.
    Select {
        /// Condition.
        cond: ExprId,
        /// Value when the condition holds.
        true_value: ExprId,
        /// Value otherwise.
        false_value: ExprId,
    },
    /// Let binding; `var` is bound in `body`.
    Let {
        /// Bound variable.
        var: ExprId,
        /// Bound value.
        value: ExprId,
        /// Expression the binding scopes over.
        body: ExprId,
    },
    /// Call of an intrinsic, tensor or external function.
    Call {
        /// Call target.
        op: CallOp,
        /// Arguments.
        args: SmallVec<[ExprId; 4]>,
        /// Result type.
        dtype: DType,
    },
    /// Commutative reduction over the `axis` iteration variables, which are
    /// binders for `source` and `condition`.
    Reduce {
        /// How values are combined.
        combiner: CommReducer,
        /// Reduced expressions, one per combiner value.
        source: Vec<ExprId>,
        /// Iteration axes.
        axis: Vec<IterVar>,
        /// Guard; points where it is false are skipped.
        condition: ExprId,
        /// Which combiner value this expression denotes.
        value_index: usize,
    },
}

/// An interned expression: its kind plus the derived scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExprData {
    /// Node kind.
    pub kind: ExprKind,
    /// Scalar type of the expression.
    pub dtype: DType,
}

/// A tensor operation: either an opaque input or a compute definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TensorOpKind {
    /// External input of known dimensionality.
    Placeholder {
        /// Number of coordinates.
        ndim: usize,
    },
    /// Pointwise (or reduction) definition over an iteration space.
    Compute {
        /// Output coordinates.
        axis: Vec<IterVar>,
        /// One body expression per output value.
        body: Vec<ExprId>,
    },
}

/// Entry of the manager's tensor-operation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorOpData {
    /// Operation name; unique within a manager.
    pub name: String,
    /// Placeholder or compute definition.
    pub kind: TensorOpKind,
    /// Element type of placeholder outputs. Compute outputs derive their
    /// type from the body.
    pub dtype: DType,
}

/// Arena that interns expressions and owns tensor operations.
pub struct ExprManager {
    exprs: Vec<ExprData>,
    interned: FxHashMap<ExprData, ExprId>,
    ops: Vec<TensorOpData>,
    used_names: FxHashSet<String>,
    fresh_counter: u64,
}

impl Default for ExprManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            exprs: Vec::new(),
            interned: FxHashMap::default(),
            ops: Vec::new(),
            used_names: FxHashSet::default(),
            fresh_counter: 0,
        }
    }

    fn intern(&mut self, kind: ExprKind, dtype: DType) -> ExprId {
        let data = ExprData { kind, dtype };
        if let Some(&id) = self.interned.get(&data) {
            return id;
        }
        let id = ExprId(u32::try_from(self.exprs.len()).expect("expression arena overflow"));
        self.exprs.push(data.clone());
        self.interned.insert(data, id);
        id
    }

    /// Access an interned expression.
    pub fn get(&self, id: ExprId) -> &ExprData {
        &self.exprs[id.index()]
    }

    /// Kind of an interned expression.
    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.exprs[id.index()].kind
    }

    /// Scalar type of an interned expression.
    pub fn dtype(&self, id: ExprId) -> DType {
        self.exprs[id.index()].dtype
    }

    // ---- constants ------------------------------------------------------

    /// 32-bit integer constant.
    pub fn mk_int(&mut self, value: i64) -> ExprId {
        self.mk_const(DType::Int32, value)
    }

    /// Integer-valued constant of the given type. Booleans map 0 to `false`
    /// and everything else to `true`; floats are converted exactly.
    pub fn mk_const(&mut self, dtype: DType, value: i64) -> ExprId {
        match dtype {
            DType::Bool => {
                let value = i64::from(value != 0);
                self.intern(ExprKind::IntImm { value, dtype }, dtype)
            }
            DType::Int32 | DType::Int64 => self.intern(ExprKind::IntImm { value, dtype }, dtype),
            DType::Float32 | DType::Float64 => self.mk_float(value as f64, dtype),
        }
    }

    /// Floating point constant.
    pub fn mk_float(&mut self, value: f64, dtype: DType) -> ExprId {
        debug_assert!(dtype.is_float());
        self.intern(
            ExprKind::FloatImm {
                bits: value.to_bits(),
                dtype,
            },
            dtype,
        )
    }

    /// String constant.
    pub fn mk_str(&mut self, value: &str) -> ExprId {
        // Strings piggyback on Int32 as a nominal dtype; they only occur as
        // opaque call arguments.
        self.intern(ExprKind::StrImm(value.to_string()), DType::Int32)
    }

    /// The zero of a type.
    pub fn mk_zero(&mut self, dtype: DType) -> ExprId {
        self.mk_const(dtype, 0)
    }

    /// The one of a type.
    pub fn mk_one(&mut self, dtype: DType) -> ExprId {
        self.mk_const(dtype, 1)
    }

    /// Boolean constant.
    pub fn mk_bool(&mut self, value: bool) -> ExprId {
        self.mk_const(DType::Bool, i64::from(value))
    }

    /// The boolean `true`.
    pub fn mk_true(&mut self) -> ExprId {
        self.mk_bool(true)
    }

    /// The boolean `false`.
    pub fn mk_false(&mut self) -> ExprId {
        self.mk_bool(false)
    }

    // ---- variables ------------------------------------------------------

    /// A variable. Two calls with the same name and type return the same id.
    pub fn mk_var(&mut self, name: &str, dtype: DType) -> ExprId {
        self.used_names.insert(name.to_string());
        self.intern(
            ExprKind::Var {
                name: name.to_string(),
                dtype,
            },
            dtype,
        )
    }

    /// A name not equal to any name previously interned by this manager.
    pub fn fresh_name(&mut self, base: &str) -> String {
        if !self.used_names.contains(base) {
            self.used_names.insert(base.to_string());
            return base.to_string();
        }
        loop {
            let candidate = format!("{}_{}", base, self.fresh_counter);
            self.fresh_counter += 1;
            if !self.used_names.contains(&candidate) {
                self.used_names.insert(candidate.clone());
                return candidate;
            }
        }
    }

    /// A variable with a fresh name derived from `base`.
    pub fn fresh_var(&mut self, base: &str, dtype: DType) -> ExprId {
        let name = self.fresh_name(base);
        self.mk_var(&name, dtype)
    }

    /// A fresh variable named after an existing variable plus a suffix.
    pub fn var_with_suffix(&mut self, var: ExprId, suffix: &str) -> ExprId {
        let (name, dtype) = match self.kind(var) {
            ExprKind::Var { name, dtype } => (name.clone(), *dtype),
            other => panic!("var_with_suffix on non-variable {other:?}"),
        };
        let base = format!("{name}{suffix}");
        self.fresh_var(&base, dtype)
    }

    /// Name of a variable expression.
    pub fn var_name(&self, var: ExprId) -> &str {
        match self.kind(var) {
            ExprKind::Var { name, .. } => name,
            other => panic!("var_name on non-variable {other:?}"),
        }
    }

    // ---- arithmetic -----------------------------------------------------

    fn binary_arith(
        &mut self,
        make: fn(ExprId, ExprId) -> ExprKind,
        a: ExprId,
        b: ExprId,
    ) -> ExprId {
        let dtype = self.dtype(a);
        self.intern(make(a, b), dtype)
    }

    /// `a + b`.
    pub fn mk_add(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_arith(ExprKind::Add, a, b)
    }

    /// `a - b`.
    pub fn mk_sub(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_arith(ExprKind::Sub, a, b)
    }

    /// `a * b`.
    pub fn mk_mul(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_arith(ExprKind::Mul, a, b)
    }

    /// Truncated division `a / b`.
    pub fn mk_truncdiv(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_arith(ExprKind::TruncDiv, a, b)
    }

    /// Truncated remainder `a % b`.
    pub fn mk_truncmod(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_arith(ExprKind::TruncMod, a, b)
    }

    /// Floor division.
    pub fn mk_floordiv(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_arith(ExprKind::FloorDiv, a, b)
    }

    /// Floor remainder.
    pub fn mk_floormod(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_arith(ExprKind::FloorMod, a, b)
    }

    /// Minimum of two values.
    pub fn mk_min(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_arith(ExprKind::Min, a, b)
    }

    /// Maximum of two values.
    pub fn mk_max(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_arith(ExprKind::Max, a, b)
    }

    // ---- comparisons and booleans --------------------------------------

    fn binary_bool(
        &mut self,
        make: fn(ExprId, ExprId) -> ExprKind,
        a: ExprId,
        b: ExprId,
    ) -> ExprId {
        self.intern(make(a, b), DType::Bool)
    }

    /// `a == b`.
    pub fn mk_eq(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_bool(ExprKind::Eq, a, b)
    }

    /// `a != b`.
    pub fn mk_ne(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_bool(ExprKind::Ne, a, b)
    }

    /// `a < b`.
    pub fn mk_lt(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_bool(ExprKind::Lt, a, b)
    }

    /// `a <= b`.
    pub fn mk_le(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_bool(ExprKind::Le, a, b)
    }

    /// `a > b`.
    pub fn mk_gt(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_bool(ExprKind::Gt, a, b)
    }

    /// `a >= b`.
    pub fn mk_ge(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_bool(ExprKind::Ge, a, b)
    }

    /// `a && b`.
    pub fn mk_and(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_bool(ExprKind::And, a, b)
    }

    /// `a || b`.
    pub fn mk_or(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary_bool(ExprKind::Or, a, b)
    }

    /// `!a`.
    pub fn mk_not(&mut self, a: ExprId) -> ExprId {
        self.intern(ExprKind::Not(a), DType::Bool)
    }

    // ---- structured nodes ----------------------------------------------

    /// Eager conditional.
    pub fn mk_select(&mut self, cond: ExprId, true_value: ExprId, false_value: ExprId) -> ExprId {
        let dtype = self.dtype(true_value);
        self.intern(
            ExprKind::Select {
                cond,
                true_value,
                false_value,
            },
            dtype,
        )
    }

    /// Type conversion; a cast to the operand's own type is the identity.
    pub fn mk_cast(&mut self, dtype: DType, value: ExprId) -> ExprId {
        if self.dtype(value) == dtype {
            return value;
        }
        self.intern(ExprKind::Cast { dtype, value }, dtype)
    }

    /// Let binding.
    pub fn mk_let(&mut self, var: ExprId, value: ExprId, body: ExprId) -> ExprId {
        let dtype = self.dtype(body);
        self.intern(ExprKind::Let { var, value, body }, dtype)
    }

    /// The lazy `if_then_else` intrinsic.
    pub fn mk_if_then_else(&mut self, cond: ExprId, t: ExprId, f: ExprId) -> ExprId {
        let dtype = self.dtype(t);
        self.intern(
            ExprKind::Call {
                op: CallOp::IfThenElse,
                args: SmallVec::from_slice(&[cond, t, f]),
                dtype,
            },
            dtype,
        )
    }

    /// Read of a tensor element.
    pub fn mk_tensor_call(&mut self, tensor: Tensor, args: &[ExprId]) -> ExprId {
        let dtype = self.tensor_dtype(tensor);
        self.intern(
            ExprKind::Call {
                op: CallOp::Tensor(tensor),
                args: SmallVec::from_slice(args),
                dtype,
            },
            dtype,
        )
    }

    /// Call of an opaque external function.
    pub fn mk_extern_call(&mut self, name: &str, args: &[ExprId], dtype: DType) -> ExprId {
        self.intern(
            ExprKind::Call {
                op: CallOp::Extern(name.to_string()),
                args: SmallVec::from_slice(args),
                dtype,
            },
            dtype,
        )
    }

    /// Reduction node.
    pub fn mk_reduce(
        &mut self,
        combiner: CommReducer,
        source: Vec<ExprId>,
        axis: Vec<IterVar>,
        condition: ExprId,
        value_index: usize,
    ) -> ExprId {
        debug_assert!(value_index < source.len());
        let dtype = self.dtype(source[value_index]);
        self.intern(
            ExprKind::Reduce {
                combiner,
                source,
                axis,
                condition,
                value_index,
            },
            dtype,
        )
    }

    // ---- constant inspection -------------------------------------------

    /// The value of an integer or boolean constant.
    pub fn as_const_int(&self, e: ExprId) -> Option<i64> {
        match self.kind(e) {
            ExprKind::IntImm { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Whether `e` is the integer constant `value`.
    pub fn is_const_int(&self, e: ExprId, value: i64) -> bool {
        self.as_const_int(e) == Some(value)
    }

    /// Whether `e` is a zero constant of any numeric type.
    pub fn is_const_zero(&self, e: ExprId) -> bool {
        match self.kind(e) {
            ExprKind::IntImm { value, .. } => *value == 0,
            ExprKind::FloatImm { bits, .. } => f64::from_bits(*bits) == 0.0,
            _ => false,
        }
    }

    /// Whether `e` is the boolean (or integer) constant one.
    pub fn is_true(&self, e: ExprId) -> bool {
        self.is_const_int(e, 1)
    }

    /// Whether `e` is the boolean (or integer) constant zero.
    pub fn is_false(&self, e: ExprId) -> bool {
        self.is_const_int(e, 0)
    }

    /// Whether `e` is a variable.
    pub fn is_var(&self, e: ExprId) -> bool {
        matches!(self.kind(e), ExprKind::Var { .. })
    }

    // ---- tensor operations ---------------------------------------------

    /// Register a placeholder (external input) operation.
    pub fn placeholder_op(&mut self, name: &str, ndim: usize, dtype: DType) -> OpId {
        self.push_op(TensorOpData {
            name: name.to_string(),
            kind: TensorOpKind::Placeholder { ndim },
            dtype,
        })
    }

    /// Register a compute operation.
    pub fn compute_op(&mut self, name: &str, axis: Vec<IterVar>, body: Vec<ExprId>) -> OpId {
        debug_assert!(!body.is_empty());
        let dtype = self.dtype(body[0]);
        self.push_op(TensorOpData {
            name: name.to_string(),
            kind: TensorOpKind::Compute { axis, body },
            dtype,
        })
    }

    fn push_op(&mut self, data: TensorOpData) -> OpId {
        self.used_names.insert(data.name.clone());
        let id = OpId(u32::try_from(self.ops.len()).expect("operation table overflow"));
        self.ops.push(data);
        id
    }

    /// Access a tensor operation.
    pub fn op(&self, op: OpId) -> &TensorOpData {
        &self.ops[op.index()]
    }

    /// Element type of a tensor.
    pub fn tensor_dtype(&self, tensor: Tensor) -> DType {
        let data = self.op(tensor.op);
        match &data.kind {
            TensorOpKind::Placeholder { .. } => data.dtype,
            TensorOpKind::Compute { body, .. } => self.dtype(body[tensor.value_index]),
        }
    }
}
