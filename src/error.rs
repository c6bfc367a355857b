//! Error taxonomy shared by all engines.
//!
//! Two kinds of failure are errors: input the caller should have validated
//! (`InvalidInput`) and broken calling contracts such as freeing a block that
//! was never handed out (`Contract`). Ordinary negative answers (a Banker's
//! request that must wait, a buddy request that does not fit) are not errors;
//! each engine returns those as outcome values.

use std::fmt;

/// Errors from engine construction and operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A field is out of range or malformed. Engine state is unchanged.
    InvalidInput(String),
    /// The caller violated an engine contract (unknown handle, missing page).
    Contract(String),
}

impl SimError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SimError::InvalidInput(msg.into())
    }

    pub(crate) fn contract(msg: impl Into<String>) -> Self {
        SimError::Contract(msg.into())
    }

    /// Whether this is a contract violation rather than bad input.
    pub fn is_contract(&self) -> bool {
        matches!(self, SimError::Contract(_))
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            SimError::Contract(msg) => write!(f, "contract violation: {msg}"),
        }
    }
}

impl std::error::Error for SimError {}

pub type Result<T> = std::result::Result<T, SimError>;
