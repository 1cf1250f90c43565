//! Zeroxide passes - zero elimination for tensor compute IR
//!
//! Rewrites tensor compute definitions so that summations over
//! provably-zero regions disappear: nonzeroness conditions are lifted out of
//! expressions and reductions, integer iteration domains are tightened by
//! solving their equalities and inequalities, and redundant conditions are
//! dropped. The headline entry point is
//! [`reduction::optimize_and_lift_nonzeroness_conditions`]; everything else
//! is exposed so hosts can drive individual stages.
//!
//! All rewrites are conservative: whenever a bound cannot be inferred or a
//! fact cannot be proved, the input is kept as is. Unsatisfiable domains are
//! ordinary values ([`domain::empty_transformation`], a `false` condition),
//! never errors; only structural misuse (composing transformations across
//! mismatched domains) reports an [`Error`].

#![deny(unsafe_code)]

pub mod atomic;
pub mod combiner;
pub mod deskew;
pub mod divmod;
pub mod domain;
pub mod equations;
pub mod error;
pub mod inequalities;
pub mod inline;
pub mod nonzero;
pub mod redundant;
pub mod reduction;
pub mod util;

pub use domain::{Domain, DomainTransformation};
pub use error::{Error, Result};
