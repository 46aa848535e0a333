use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::Product;

/// Products matched for an order request, plus the ids that did not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductResolution {
    pub products: Vec<Product>,
    pub missing: Vec<String>,
}

impl ProductResolution {
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Returns the distinct requested ids, preserving first-seen order.
pub fn distinct_ids(requested: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    requested
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Applies the partial-match policy to the products found for a request.
///
/// Any non-empty subset of matches is accepted; unmatched ids are reported in
/// `missing`. Results follow the request order.
pub fn resolve_products(
    requested: &[String],
    found: Vec<Product>,
) -> Result<ProductResolution, ValidationError> {
    if found.is_empty() {
        return Err(ValidationError::NoValidProducts);
    }

    let mut products = Vec::with_capacity(found.len());
    let mut missing = Vec::new();
    let mut pool = found;
    for id in distinct_ids(requested) {
        match pool.iter().position(|product| product.id == id) {
            Some(index) => products.push(pool.swap_remove(index)),
            None => missing.push(id),
        }
    }

    if products.is_empty() {
        return Err(ValidationError::NoValidProducts);
    }

    Ok(ProductResolution { products, missing })
}
