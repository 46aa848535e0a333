use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;

/// Entity kinds that a mutation can fail to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Customer,
}

impl Entity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "Customer",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy surfaced by CRM mutations.
///
/// Display output is the user-facing message attached to API responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrmError {
    #[error("{0} does not exist")]
    NotFound(Entity),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl CrmError {
    /// Stable label used for metrics and problem types.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_failed",
            Self::Internal(_) => "internal",
        }
    }
}

/// Business rule violations caused by caller input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("At least one valid product must be selected")]
    NoValidProducts,
    #[error("name must not be blank")]
    EmptyName,
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("a customer with email {0} already exists")]
    DuplicateEmail(String),
    #[error("price must not be negative (got {0})")]
    NegativePrice(Decimal),
    #[error("stock must not be negative (got {0})")]
    NegativeStock(i64),
}

/// Unexpected store or transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("Error creating order: {cause}")]
    OrderCreationFailed { cause: String },
    #[error("Error {operation}: {cause}")]
    Store {
        operation: &'static str,
        cause: String,
    },
}

impl InternalError {
    pub fn store(operation: &'static str, cause: impl fmt::Display) -> Self {
        Self::Store {
            operation,
            cause: cause.to_string(),
        }
    }
}
