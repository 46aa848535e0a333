use std::{collections::HashMap, str::FromStr};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::Decimal;
use sqlx::{
    migrate::MigrateError, sqlite::SqlitePoolOptions, QueryBuilder, Sqlite, SqlitePool,
    Transaction,
};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crm_core::{Customer, Order, Product};

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Begins a SQLite transaction spanning several repository calls.
    ///
    /// The first statement is a no-op write so the transaction holds the write
    /// lock before any read. Waiting for the lock is covered by the busy
    /// timeout, while upgrading a read snapshot later fails with SQLITE_BUSY.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE orders SET id = id WHERE 0")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Returns a handle for interacting with customers.
    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for interacting with products.
    pub fn products(&self) -> ProductRepository {
        ProductRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for interacting with orders and their product sets.
    pub fn orders(&self) -> OrderRepository {
        OrderRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A stored value that could not be decoded into its domain type.
#[derive(Debug, Error)]
#[error("invalid decimal {value:?} stored in {column}")]
pub struct DecodeError {
    pub column: &'static str,
    pub value: String,
}

fn parse_decimal(column: &'static str, value: &str) -> Result<Decimal, DecodeError> {
    Decimal::from_str(value).map_err(|_| DecodeError {
        column,
        value: value.to_string(),
    })
}

/// Repository for customer records.
#[derive(Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Inserts a customer, generating its identifier.
    pub async fn insert(&self, record: &NewCustomer<'_>) -> Result<Customer, CustomerError> {
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: record.name.to_string(),
            email: record.email.to_string(),
            phone: record.phone.map(str::to_string),
            created_at: record.created_at.trunc_subsecs(3),
        };

        sqlx::query(
            "INSERT INTO customers (id, name, email, phone, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(to_rfc3339(customer.created_at))
        .execute(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some("2067") {
                    CustomerError::DuplicateEmail(customer.email.clone())
                } else {
                    CustomerError::Database(sqlx::Error::Database(db_err))
                }
            }
            other => CustomerError::Database(other),
        })?;

        Ok(customer)
    }

    /// Looks a customer up inside an open transaction.
    pub async fn find_by_id(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        customer_id: &str,
    ) -> Result<Option<Customer>, CustomerError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, name, email, phone, created_at FROM customers WHERE id = ?",
        )
        .bind(customer_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(CustomerRow::into_domain))
    }

    /// Lists every customer ordered by creation time.
    pub async fn list_all(&self) -> Result<Vec<Customer>, CustomerError> {
        let rows = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, name, email, phone, created_at FROM customers ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CustomerRow::into_domain).collect())
    }
}

/// Parameters required to insert a customer.
pub struct NewCustomer<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    email: String,
    phone: Option<String>,
    created_at: DateTime<Utc>,
}

impl CustomerRow {
    fn into_domain(self) -> Customer {
        Customer {
            id: self.id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            created_at: self.created_at,
        }
    }
}

/// Errors that can occur while reading or writing customers.
#[derive(Debug, Error)]
pub enum CustomerError {
    #[error("a customer with email {0} already exists")]
    DuplicateEmail(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for product records.
#[derive(Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Inserts a product, generating its identifier.
    pub async fn insert(&self, record: &NewProduct<'_>) -> Result<Product, ProductError> {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: record.name.to_string(),
            price: record.price,
            stock: record.stock,
            created_at: record.created_at.trunc_subsecs(3),
        };

        sqlx::query(
            "INSERT INTO products (id, name, price, stock, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price.to_string())
        .bind(product.stock)
        .bind(to_rfc3339(product.created_at))
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Returns the products whose identifiers appear in `ids`; unknown ids are skipped.
    pub async fn filter_by_ids(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        ids: &[String],
    ) -> Result<Vec<Product>, ProductError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, price, stock, created_at FROM products WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows = builder
            .build_query_as::<ProductRow>()
            .fetch_all(&mut **tx)
            .await?;

        rows.into_iter()
            .map(|row| row.into_domain().map_err(ProductError::from))
            .collect()
    }

    /// Lists every product ordered by creation time.
    pub async fn list_all(&self) -> Result<Vec<Product>, ProductError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, price, stock, created_at FROM products ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_domain().map_err(ProductError::from))
            .collect()
    }

    /// Adds `increment` to every product whose stock is below `threshold`,
    /// returning the updated rows.
    pub async fn restock_below(
        &self,
        threshold: i64,
        increment: i64,
    ) -> Result<Vec<Product>, ProductError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, ProductRow>(
            "UPDATE products SET stock = stock + ? WHERE stock < ? \
             RETURNING id, name, price, stock, created_at",
        )
        .bind(increment)
        .bind(threshold)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut products = rows
            .into_iter()
            .map(|row| row.into_domain().map_err(ProductError::from))
            .collect::<Result<Vec<_>, _>>()?;
        products.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(products)
    }
}

/// Parameters required to insert a product.
pub struct NewProduct<'a> {
    pub name: &'a str,
    pub price: Decimal,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price: String,
    stock: i64,
    created_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_domain(self) -> Result<Product, DecodeError> {
        let price = parse_decimal("products.price", &self.price)?;
        Ok(Product {
            id: self.id,
            name: self.name,
            price,
            stock: self.stock,
            created_at: self.created_at,
        })
    }
}

/// Errors that can occur while reading or writing products.
#[derive(Debug, Error)]
pub enum ProductError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for orders and the order/product association.
#[derive(Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Inserts the bare order row for a customer with a zero total.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        record: &NewOrder<'_>,
    ) -> Result<String, OrderError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO orders (id, customer_id, total_amount, order_date) VALUES (?, ?, '0', ?)",
        )
        .bind(&id)
        .bind(record.customer_id)
        .bind(to_rfc3339(record.order_date))
        .execute(&mut **tx)
        .await?;

        Ok(id)
    }

    /// Replaces the product set of an order.
    pub async fn set_products(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        order_id: &str,
        products: &[Product],
    ) -> Result<(), OrderError> {
        sqlx::query("DELETE FROM order_products WHERE order_id = ?")
            .bind(order_id)
            .execute(&mut **tx)
            .await?;

        for (position, product) in products.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_products (order_id, product_id, position) VALUES (?, ?, ?)",
            )
            .bind(order_id)
            .bind(&product.id)
            .bind(position as i64)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Persists the derived total of an order.
    pub async fn update_total(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        order_id: &str,
        total_amount: Decimal,
    ) -> Result<(), OrderError> {
        let result = sqlx::query("UPDATE orders SET total_amount = ? WHERE id = ?")
            .bind(total_amount.to_string())
            .bind(order_id)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrderError::MissingOrder(order_id.to_string()));
        }
        Ok(())
    }

    /// Lists every order with its customer and products.
    pub async fn list_all(&self) -> Result<Vec<Order>, OrderError> {
        let order_rows = sqlx::query_as::<_, OrderRow>(
            r#"
SELECT o.id,
       o.total_amount,
       o.order_date,
       c.id AS customer_id,
       c.name AS customer_name,
       c.email AS customer_email,
       c.phone AS customer_phone,
       c.created_at AS customer_created_at
  FROM orders AS o
  JOIN customers AS c
    ON c.id = o.customer_id
 ORDER BY o.order_date, o.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            r#"
SELECT op.order_id,
       p.id,
       p.name,
       p.price,
       p.stock,
       p.created_at
  FROM order_products AS op
  JOIN products AS p
    ON p.id = op.product_id
 ORDER BY op.order_id, op.position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut products_by_order: HashMap<String, Vec<Product>> = HashMap::new();
        for item in item_rows {
            let (order_id, product) = item.into_domain()?;
            products_by_order.entry(order_id).or_default().push(product);
        }

        order_rows
            .into_iter()
            .map(|row| {
                let products = products_by_order.remove(&row.id).unwrap_or_default();
                row.into_domain(products)
            })
            .collect()
    }
}

/// Parameters required to insert an order.
pub struct NewOrder<'a> {
    pub customer_id: &'a str,
    pub order_date: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    total_amount: String,
    order_date: DateTime<Utc>,
    customer_id: String,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    customer_created_at: DateTime<Utc>,
}

impl OrderRow {
    /// The total is re-derived from the product set; a stored value that
    /// disagrees is reported and superseded.
    fn into_domain(self, products: Vec<Product>) -> Result<Order, OrderError> {
        let stored_total = parse_decimal("orders.total_amount", &self.total_amount)?;
        let customer = Customer {
            id: self.customer_id,
            name: self.customer_name,
            email: self.customer_email,
            phone: self.customer_phone,
            created_at: self.customer_created_at,
        };
        let order = Order::new(self.id, customer, products, self.order_date);
        if order.total_amount() != stored_total {
            warn!(
                stage = "storage",
                order_id = %order.id,
                stored = %stored_total,
                computed = %order.total_amount(),
                "stored order total is stale"
            );
        }
        Ok(order)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    order_id: String,
    id: String,
    name: String,
    price: String,
    stock: i64,
    created_at: DateTime<Utc>,
}

impl OrderItemRow {
    fn into_domain(self) -> Result<(String, Product), DecodeError> {
        let product = ProductRow {
            id: self.id,
            name: self.name,
            price: self.price,
            stock: self.stock,
            created_at: self.created_at,
        }
        .into_domain()?;
        Ok((self.order_id, product))
    }
}

/// Errors that can occur while reading or writing orders.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order {0} does not exist")]
    MissingOrder(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> Database {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    async fn seed_customer(db: &Database, email: &str) -> Customer {
        db.customers()
            .insert(&NewCustomer {
                name: "Alice",
                email,
                phone: None,
                created_at: Utc::now(),
            })
            .await
            .expect("insert customer")
    }

    async fn seed_product(db: &Database, name: &str, price: &str, stock: i64) -> Product {
        db.products()
            .insert(&NewProduct {
                name,
                price: Decimal::from_str(price).expect("decimal"),
                stock,
                created_at: Utc::now(),
            })
            .await
            .expect("insert product")
    }

    #[tokio::test]
    async fn migrations_apply() {
        let db = setup_db().await;

        let tables: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('customers', 'products', 'orders', 'order_products')")
                .fetch_one(db.pool())
                .await
                .expect("fetch tables");
        assert_eq!(tables.0, 4, "expected core tables to be created");
    }

    #[tokio::test]
    async fn duplicate_email_is_reported() {
        let db = setup_db().await;
        seed_customer(&db, "alice@example.com").await;

        let err = db
            .customers()
            .insert(&NewCustomer {
                name: "Alice Again",
                email: "alice@example.com",
                phone: Some("+1-555-0100"),
                created_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CustomerError::DuplicateEmail(email) if email == "alice@example.com"));
    }

    #[tokio::test]
    async fn find_by_id_returns_none_for_unknown_customer() {
        let db = setup_db().await;
        let customer = seed_customer(&db, "alice@example.com").await;

        let mut tx = db.begin().await.expect("begin");
        let found = db
            .customers()
            .find_by_id(&mut tx, &customer.id)
            .await
            .expect("lookup");
        assert_eq!(found, Some(customer));
        let missing = db
            .customers()
            .find_by_id(&mut tx, "missing")
            .await
            .expect("lookup");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn filter_by_ids_skips_unknown_ids() {
        let db = setup_db().await;
        let p1 = seed_product(&db, "Laptop", "999.99", 3).await;
        seed_product(&db, "Mouse", "19.90", 40).await;

        let mut tx = db.begin().await.expect("begin");
        let found = db
            .products()
            .filter_by_ids(&mut tx, &[p1.id.clone(), "nonexistent-id".to_string()])
            .await
            .expect("filter");
        assert_eq!(found, vec![p1]);

        let none = db
            .products()
            .filter_by_ids(&mut tx, &[])
            .await
            .expect("filter empty");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn restock_updates_only_low_stock_products() {
        let db = setup_db().await;
        let low = seed_product(&db, "Cable", "4.50", 2).await;
        seed_product(&db, "Monitor", "150.00", 10).await;

        let updated = db.products().restock_below(10, 10).await.expect("restock");
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].id, low.id);
        assert_eq!(updated[0].stock, 12);

        let again = db.products().restock_below(10, 10).await.expect("restock");
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn order_round_trips_with_products_and_total() {
        let db = setup_db().await;
        let customer = seed_customer(&db, "alice@example.com").await;
        let p1 = seed_product(&db, "Pen", "10.00", 5).await;
        let p2 = seed_product(&db, "Notebook", "15.00", 5).await;

        let repo = db.orders();
        let mut tx = db.begin().await.expect("begin");
        let order_id = repo
            .insert(
                &mut tx,
                &NewOrder {
                    customer_id: &customer.id,
                    order_date: Utc::now(),
                },
            )
            .await
            .expect("insert order");
        let products = vec![p1, p2];
        repo.set_products(&mut tx, &order_id, &products)
            .await
            .expect("set products");
        repo.update_total(&mut tx, &order_id, crm_core::order_total(&products))
            .await
            .expect("update total");
        tx.commit().await.expect("commit");

        let orders = repo.list_all().await.expect("list");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, order_id);
        assert_eq!(orders[0].customer.email, "alice@example.com");
        assert_eq!(orders[0].products().len(), 2);
        assert_eq!(orders[0].total_amount(), Decimal::from_str("25.00").unwrap());
    }

    #[tokio::test]
    async fn rolled_back_transaction_leaves_no_order() {
        let db = setup_db().await;
        let customer = seed_customer(&db, "alice@example.com").await;

        let mut tx = db.begin().await.expect("begin");
        db.orders()
            .insert(
                &mut tx,
                &NewOrder {
                    customer_id: &customer.id,
                    order_date: Utc::now(),
                },
            )
            .await
            .expect("insert order");
        tx.rollback().await.expect("rollback");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(db.pool())
            .await
            .expect("count");
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn update_total_errors_for_missing_order() {
        let db = setup_db().await;
        let mut tx = db.begin().await.expect("begin");
        let err = db
            .orders()
            .update_total(&mut tx, "missing", Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::MissingOrder(id) if id == "missing"));
    }
}
