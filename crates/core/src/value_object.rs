//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{ProductId, VariantId};

/// Marker trait for immutable, value-compared domain objects.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// A catalog product, optionally narrowed to one variant.
///
/// `(product, None)` and `(product, Some(v))` are distinct keys.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductKey {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
}

impl ProductKey {
    pub fn new(product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id,
            variant_id,
        }
    }
}

impl core::fmt::Display for ProductKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.variant_id {
            Some(v) => write!(f, "{}/{}", self.product_id, v),
            None => write!(f, "{}", self.product_id),
        }
    }
}

impl ValueObject for ProductKey {}

/// A positive quantity of one product key.
///
/// Shared by receipts, sales, returns and liquidation items.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(flatten)]
    pub key: ProductKey,
    pub quantity: i64,
}

impl LineItem {
    pub fn new(key: ProductKey, quantity: i64) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be > 0 (got {quantity}) for {key}"
            )));
        }
        Ok(Self { key, quantity })
    }
}

impl ValueObject for LineItem {}
