use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Customer record as persisted in the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Product record as persisted in the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
}

/// Order owning a customer reference and a non-empty product set.
///
/// `total_amount` is derived from the product set and can only change through
/// [`Order::assign_products`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer: Customer,
    products: Vec<Product>,
    total_amount: Decimal,
    pub order_date: DateTime<Utc>,
}

impl Order {
    /// Builds an order and assigns its initial product set.
    pub fn new(
        id: impl Into<String>,
        customer: Customer,
        products: Vec<Product>,
        order_date: DateTime<Utc>,
    ) -> Self {
        let mut order = Self {
            id: id.into(),
            customer,
            products: Vec::new(),
            total_amount: Decimal::ZERO,
            order_date,
        };
        order.assign_products(products);
        order
    }

    /// Replaces the product set and recomputes the total.
    pub fn assign_products(&mut self, products: Vec<Product>) {
        self.total_amount = order_total(&products);
        self.products = products;
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }
}

/// Sum of the product prices.
pub fn order_total(products: &[Product]) -> Decimal {
    products.iter().map(|product| product.price).sum()
}

/// Input for creating a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl CustomerInput {
    /// Checks the business rules that do not require the store.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if !is_plausible_email(&self.email) {
            return Err(ValidationError::InvalidEmail(self.email.clone()));
        }
        Ok(())
    }

    /// Returns the phone number with blank values collapsed to `None`.
    pub fn normalized_phone(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn is_plausible_email(value: &str) -> bool {
    let trimmed = value.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: Option<i64>,
}

impl ProductInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.price < Decimal::ZERO {
            return Err(ValidationError::NegativePrice(self.price));
        }
        if self.stock() < 0 {
            return Err(ValidationError::NegativeStock(self.stock()));
        }
        Ok(())
    }

    /// Stock defaults to zero when unspecified.
    pub fn stock(&self) -> i64 {
        self.stock.unwrap_or(0)
    }
}

/// Input for creating an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInput {
    pub customer_id: String,
    pub product_ids: Vec<String>,
}

/// Result of the low-stock restock mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockOutcome {
    pub success: bool,
    pub message: String,
    pub products: Vec<Product>,
}

impl RestockOutcome {
    pub fn from_updated(products: Vec<Product>) -> Self {
        let message = if products.is_empty() {
            "No low-stock products found".to_string()
        } else {
            format!("Restocked {} low-stock products", products.len())
        };
        Self {
            success: true,
            message,
            products,
        }
    }
}

/// Stock level below which a product is restocked.
pub const LOW_STOCK_THRESHOLD: i64 = 10;
/// Units added to each low-stock product.
pub const RESTOCK_INCREMENT: i64 = 10;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn product(id: &str, price: &str) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            price: Decimal::from_str(price).expect("decimal"),
            stock: 5,
            created_at: Utc::now(),
        }
    }

    fn customer() -> Customer {
        Customer {
            id: "c-1".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn new_order_derives_total_from_products() {
        let order = Order::new(
            "o-1",
            customer(),
            vec![product("p-1", "10.00"), product("p-2", "15.00")],
            Utc::now(),
        );
        assert_eq!(order.total_amount(), Decimal::from_str("25.00").unwrap());
        assert_eq!(order.products().len(), 2);
    }

    #[test]
    fn reassigning_products_recomputes_total() {
        let mut order = Order::new("o-1", customer(), vec![product("p-1", "10.00")], Utc::now());
        order.assign_products(vec![product("p-2", "15.50"), product("p-3", "0.25")]);
        assert_eq!(order.total_amount(), Decimal::from_str("15.75").unwrap());
    }

    #[test]
    fn customer_input_rejects_bad_email() {
        let input = CustomerInput {
            name: "Bob".to_string(),
            email: "not-an-email".to_string(),
            phone: None,
        };
        assert!(matches!(
            input.validate(),
            Err(ValidationError::InvalidEmail(value)) if value == "not-an-email"
        ));
    }

    #[test]
    fn blank_phone_is_normalized_away() {
        let input = CustomerInput {
            name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            phone: Some("   ".to_string()),
        };
        assert!(input.validate().is_ok());
        assert_eq!(input.normalized_phone(), None);
    }

    #[test]
    fn product_input_defaults_stock_and_rejects_negative_price() {
        let input: ProductInput =
            serde_json::from_str(r#"{"name":"Laptop","price":"999.99"}"#).expect("json");
        assert_eq!(input.stock(), 0);
        assert!(input.validate().is_ok());

        let negative = ProductInput {
            name: "Refund".to_string(),
            price: Decimal::from_str("-1").unwrap(),
            stock: None,
        };
        assert!(matches!(
            negative.validate(),
            Err(ValidationError::NegativePrice(_))
        ));
    }

    #[test]
    fn restock_outcome_message_reflects_count() {
        assert_eq!(
            RestockOutcome::from_updated(Vec::new()).message,
            "No low-stock products found"
        );
        let outcome = RestockOutcome::from_updated(vec![product("p-1", "1.00")]);
        assert!(outcome.success);
        assert_eq!(outcome.message, "Restocked 1 low-stock products");
    }

    #[test]
    fn order_serializes_total_as_string() {
        let order = Order::new("o-1", customer(), vec![product("p-1", "10.00")], Utc::now());
        let value = serde_json::to_value(&order).expect("serialize");
        assert_eq!(value["total_amount"], "10.00");
        let decoded: Order = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded.total_amount(), order.total_amount());
    }
}
