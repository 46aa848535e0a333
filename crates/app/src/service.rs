use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, SubsecRound, Utc};
use metrics::{counter, histogram};
use rust_decimal::prelude::ToPrimitive;
use sqlx::{Sqlite, Transaction};
use tracing::{error, info, warn};

use crm_core::{
    distinct_ids, resolve_products, BulkCreateOutcome, CrmError, Customer, CustomerInput, Entity,
    InternalError, Order, OrderInput, Product, ProductInput, RestockOutcome, RowOutcome,
    ValidationError, LOW_STOCK_THRESHOLD, RESTOCK_INCREMENT,
};
use crm_storage::{CustomerError, Database, NewCustomer, NewOrder, NewProduct};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Executes CRM queries and mutations against the entity store.
#[derive(Clone)]
pub struct CrmService {
    database: Database,
    clock: Clock,
}

impl CrmService {
    pub fn new(database: Database, clock: Clock) -> Self {
        Self { database, clock }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)().trunc_subsecs(3)
    }

    pub async fn create_customer(&self, input: &CustomerInput) -> Result<Customer, CrmError> {
        let result = self.insert_customer(input).await;
        record_mutation("create_customer", &result);
        if let Ok(customer) = &result {
            info!(stage = "customers", customer_id = %customer.id, "customer created");
        }
        result
    }

    /// Creates each input independently; failing rows are reported and skipped.
    pub async fn bulk_create_customers(&self, inputs: &[CustomerInput]) -> BulkCreateOutcome {
        let mut rows = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let row = index + 1;
            let outcome = match self.insert_customer(input).await {
                Ok(customer) => RowOutcome::Created(customer),
                Err(err) => {
                    warn!(stage = "customers", row, error = %err, "bulk row rejected");
                    RowOutcome::failed(row, err.to_string())
                }
            };
            rows.push(outcome);
        }

        let created = rows.iter().filter(|row| row.is_created()).count();
        counter!("crm_mutations_total", "op" => "bulk_create_customers", "result" => "ok")
            .increment(1);
        info!(
            stage = "customers",
            requested = inputs.len(),
            created,
            "bulk customer creation finished"
        );
        rows.into_iter().collect()
    }

    async fn insert_customer(&self, input: &CustomerInput) -> Result<Customer, CrmError> {
        input.validate()?;
        self.database
            .customers()
            .insert(&NewCustomer {
                name: input.name.trim(),
                email: input.email.trim(),
                phone: input.normalized_phone(),
                created_at: self.now(),
            })
            .await
            .map_err(|err| match err {
                CustomerError::DuplicateEmail(email) => {
                    CrmError::from(ValidationError::DuplicateEmail(email))
                }
                other => store_failure("creating customer", other),
            })
    }

    pub async fn create_product(&self, input: &ProductInput) -> Result<Product, CrmError> {
        let result = self.insert_product(input).await;
        record_mutation("create_product", &result);
        if let Ok(product) = &result {
            info!(stage = "products", product_id = %product.id, "product created");
        }
        result
    }

    async fn insert_product(&self, input: &ProductInput) -> Result<Product, CrmError> {
        input.validate()?;
        self.database
            .products()
            .insert(&NewProduct {
                name: input.name.trim(),
                price: input.price,
                stock: input.stock(),
                created_at: self.now(),
            })
            .await
            .map_err(|err| store_failure("creating product", err))
    }

    /// Creates an order for an existing customer and at least one existing product.
    ///
    /// Lookup, insert, product assignment and total update share one
    /// transaction; nothing is persisted unless every step succeeds.
    pub async fn create_order(&self, input: &OrderInput) -> Result<Order, CrmError> {
        let result = self.create_order_atomically(input).await;
        record_mutation("create_order", &result);
        match &result {
            Ok(order) => {
                counter!("crm_orders_created_total").increment(1);
                histogram!("crm_order_total_amount")
                    .record(order.total_amount().to_f64().unwrap_or_default());
                info!(
                    stage = "orders",
                    order_id = %order.id,
                    customer_id = %order.customer.id,
                    products = order.products().len(),
                    total_amount = %order.total_amount(),
                    "order created"
                );
            }
            Err(CrmError::Internal(err)) => {
                error!(stage = "orders", error = %err, "order creation failed");
            }
            Err(err) => {
                info!(stage = "orders", error = %err, "order rejected");
            }
        }
        result
    }

    async fn create_order_atomically(&self, input: &OrderInput) -> Result<Order, CrmError> {
        let mut tx = self.database.begin().await.map_err(order_failure)?;

        match self.create_order_in(&mut tx, input).await {
            Ok(order) => {
                tx.commit().await.map_err(order_failure)?;
                Ok(order)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(stage = "orders", error = %rollback_err, "order rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn create_order_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        input: &OrderInput,
    ) -> Result<Order, CrmError> {
        let customer = self
            .database
            .customers()
            .find_by_id(tx, &input.customer_id)
            .await
            .map_err(order_failure)?
            .ok_or(CrmError::NotFound(Entity::Customer))?;

        let requested = distinct_ids(&input.product_ids);
        let found = self
            .database
            .products()
            .filter_by_ids(tx, &requested)
            .await
            .map_err(order_failure)?;
        let resolution = resolve_products(&requested, found)?;
        if resolution.is_partial() {
            warn!(
                stage = "orders",
                customer_id = %customer.id,
                missing = ?resolution.missing,
                "ignoring unknown product ids"
            );
        }

        let orders = self.database.orders();
        let order_date = self.now();
        let order_id = orders
            .insert(
                tx,
                &NewOrder {
                    customer_id: &customer.id,
                    order_date,
                },
            )
            .await
            .map_err(order_failure)?;

        let order = Order::new(order_id, customer, resolution.products, order_date);
        orders
            .set_products(tx, &order.id, order.products())
            .await
            .map_err(order_failure)?;
        orders
            .update_total(tx, &order.id, order.total_amount())
            .await
            .map_err(order_failure)?;

        Ok(order)
    }

    /// Restocks every product below the low-stock threshold.
    pub async fn update_low_stock_products(&self) -> Result<RestockOutcome, CrmError> {
        let result = self
            .database
            .products()
            .restock_below(LOW_STOCK_THRESHOLD, RESTOCK_INCREMENT)
            .await
            .map(RestockOutcome::from_updated)
            .map_err(|err| store_failure("restocking products", err));
        record_mutation("update_low_stock_products", &result);
        if let Ok(outcome) = &result {
            info!(
                stage = "products",
                updated = outcome.products.len(),
                "low-stock products restocked"
            );
        }
        result
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>, CrmError> {
        self.database
            .customers()
            .list_all()
            .await
            .map_err(|err| store_failure("listing customers", err))
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, CrmError> {
        self.database
            .products()
            .list_all()
            .await
            .map_err(|err| store_failure("listing products", err))
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, CrmError> {
        self.database
            .orders()
            .list_all()
            .await
            .map_err(|err| store_failure("listing orders", err))
    }
}

fn order_failure(err: impl Display) -> CrmError {
    CrmError::from(InternalError::OrderCreationFailed {
        cause: err.to_string(),
    })
}

fn store_failure(operation: &'static str, err: impl Display) -> CrmError {
    error!(stage = "storage", operation, error = %err, "store operation failed");
    CrmError::from(InternalError::store(operation, err))
}

fn record_mutation<T>(op: &'static str, result: &Result<T, CrmError>) {
    let label = match result {
        Ok(_) => "ok",
        Err(err) => err.kind_str(),
    };
    counter!("crm_mutations_total", "op" => op, "result" => label).increment(1);
}
