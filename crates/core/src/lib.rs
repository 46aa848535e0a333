//! Domain types and policies shared by the API server, storage layer and
//! periodic jobs.

pub mod api;
pub mod bulk;
pub mod error;
pub mod order;
pub mod types;

pub use bulk::{BulkCreateOutcome, RowOutcome};
pub use error::{CrmError, Entity, InternalError, ValidationError};
pub use order::{distinct_ids, resolve_products, ProductResolution};
pub use types::{
    order_total, Customer, CustomerInput, Order, OrderInput, Product, ProductInput,
    RestockOutcome, LOW_STOCK_THRESHOLD, RESTOCK_INCREMENT,
};
