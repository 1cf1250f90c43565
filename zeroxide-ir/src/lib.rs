//! Zeroxide IR - symbolic expressions for tensor compute definitions
//!
//! This crate provides the expression layer that the zeroxide passes operate
//! on:
//! - Hash-consed expressions with cheap [`ExprId`] references, built through
//!   an [`ExprManager`]
//! - Integer/boolean/floating types, ranges and iteration variables
//! - Structural comparison, traversal, substitution and pretty printing
//! - Arithmetic analyses: constant bounds, symbolic interval evaluation and
//!   linear-form detection
//! - A range-aware simplifier ([`simplify::simplify`], [`simplify::can_prove`])
//! - A reference interpreter used by the test suites
//!
//! # Examples
//!
//! ## Creating expressions
//!
//! ```
//! use zeroxide_ir::{DType, ExprManager};
//!
//! let mut tm = ExprManager::new();
//!
//! let i = tm.mk_var("i", DType::Int32);
//! let four = tm.mk_int(4);
//! let q = tm.mk_floordiv(i, four);
//!
//! // Hash-consing makes structural equality an id comparison.
//! let q2 = tm.mk_floordiv(i, four);
//! assert_eq!(q, q2);
//! ```
//!
//! ## Simplifying under ranges
//!
//! ```
//! use zeroxide_ir::{DType, ExprManager, Range, RangeMap, simplify};
//!
//! let mut tm = ExprManager::new();
//! let i = tm.mk_var("i", DType::Int32);
//! let zero = tm.mk_int(0);
//! let ten = tm.mk_int(10);
//!
//! let mut vranges = RangeMap::default();
//! vranges.insert(i, Range { min: zero, extent: ten });
//!
//! let cond = tm.mk_lt(i, ten);
//! let simplified = simplify::simplify(&mut tm, cond, &vranges);
//! assert!(tm.is_true(simplified));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bound;
pub mod compare;
pub mod dtype;
pub mod eval;
pub mod expr;
pub mod intset;
pub mod linear;
pub mod pretty;
pub mod simplify;
pub mod subst;
pub mod tensor;
pub mod visit;

pub use dtype::DType;
pub use expr::{
    CallOp, CommReducer, ExprId, ExprKind, ExprManager, IterVar, OpId, Range, RangeMap, Tensor,
    TensorOpData, TensorOpKind,
};
pub use intset::IntSet;
