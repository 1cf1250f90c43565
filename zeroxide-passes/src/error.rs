//! Pass errors.
//!
//! Only structural precondition violations surface here. Unprovable facts
//! and empty domains are ordinary data for the passes.

use thiserror::Error;

/// Error raised by the passes.
#[derive(Debug, Error)]
pub enum Error {
    /// Two domain transformations were composed across mismatched domains.
    #[error(
        "cannot compose domain transformations: the first's new domain \
         differs from the second's old domain"
    )]
    TransformationMismatch,

    /// A variable was used without a range in a context that requires one.
    #[error("no range provided for variable `{0}`")]
    MissingRange(String),
}

/// Result alias used throughout the passes.
pub type Result<T> = std::result::Result<T, Error>;
