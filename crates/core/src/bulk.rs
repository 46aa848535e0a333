use serde::{Deserialize, Serialize};

use crate::types::Customer;

/// Outcome of one row in a bulk customer import. Rows are numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Created(Customer),
    Failed { row: usize, detail: String },
}

impl RowOutcome {
    pub fn failed(row: usize, detail: impl Into<String>) -> Self {
        Self::Failed {
            row,
            detail: detail.into(),
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Aggregated bulk result: created customers and per-row error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCreateOutcome {
    pub customers: Vec<Customer>,
    pub errors: Vec<String>,
}

impl FromIterator<RowOutcome> for BulkCreateOutcome {
    fn from_iter<I: IntoIterator<Item = RowOutcome>>(iter: I) -> Self {
        let mut outcome = Self::default();
        for row in iter {
            match row {
                RowOutcome::Created(customer) => outcome.customers.push(customer),
                RowOutcome::Failed { row, detail } => {
                    outcome.errors.push(format!("Row {row}: {detail}"))
                }
            }
        }
        outcome
    }
}
