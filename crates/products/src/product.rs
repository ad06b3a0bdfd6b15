use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use flowrack_core::{DomainError, DomainResult, Entity, ProductId};

/// Stock level classification derived from `stock_quantity` and `minimum_stock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }

    /// Human-readable label shown next to a product.
    pub fn display_text(&self) -> &'static str {
        match self {
            StockStatus::InStock => "In Stock",
            StockStatus::LowStock => "Low Stock",
            StockStatus::OutOfStock => "Out of Stock",
        }
    }
}

/// A catalog product.
///
/// Records are values: every change produces a new `Product`. The stock
/// quantity is only ever replaced through the stock ledger (see
/// `flowrack-inventory`), never through [`ProductUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit_of_measure: String,
    pub stock_quantity: Decimal,
    pub minimum_stock: Decimal,
    pub unit_price: Option<Decimal>,
    pub location: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn stock_status(&self) -> StockStatus {
        if self.stock_quantity <= Decimal::ZERO {
            StockStatus::OutOfStock
        } else if self.stock_quantity <= self.minimum_stock {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// Advisory availability check; nothing is reserved.
    pub fn is_available(&self, requested: Decimal) -> bool {
        self.stock_quantity >= requested
    }

    /// `stock_quantity <= minimum_stock * multiplier`. A threshold past the
    /// decimal range compares as unbounded in its sign's direction.
    pub fn is_low_stock(&self, multiplier: Decimal) -> bool {
        match self.minimum_stock.checked_mul(multiplier) {
            Some(threshold) => self.stock_quantity <= threshold,
            None => self.minimum_stock.is_sign_negative() == multiplier.is_sign_negative(),
        }
    }

    /// Stock relative to the minimum; a zero (or negative) minimum counts as 1.
    pub fn scarcity_ratio(&self) -> Decimal {
        let floor = self.minimum_stock.max(Decimal::ONE);
        self.stock_quantity / floor
    }

    /// Returns a copy carrying the new stock quantity.
    pub fn with_stock_quantity(&self, quantity: Decimal, at: DateTime<Utc>) -> Product {
        Product {
            stock_quantity: quantity,
            updated_at: at,
            ..self.clone()
        }
    }

    pub fn with_update(&self, update: &ProductUpdate, at: DateTime<Utc>) -> Product {
        let mut next = self.clone();
        if let Some(name) = &update.name {
            next.name = name.trim().to_string();
        }
        if let Some(description) = &update.description {
            next.description = Some(description.clone());
        }
        if let Some(category) = &update.category {
            next.category = Some(category.clone());
        }
        if let Some(unit) = &update.unit_of_measure {
            next.unit_of_measure = unit.trim().to_string();
        }
        if let Some(minimum) = update.minimum_stock {
            next.minimum_stock = minimum;
        }
        if let Some(price) = update.unit_price {
            next.unit_price = Some(price);
        }
        if let Some(location) = &update.location {
            next.location = Some(location.clone());
        }
        next.updated_at = at;
        next
    }

    pub fn deactivated(&self, at: DateTime<Utc>) -> Product {
        Product {
            is_active: false,
            updated_at: at,
            ..self.clone()
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub unit_of_measure: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub stock_quantity: Decimal,
    #[serde(default)]
    pub minimum_stock: Decimal,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub location: Option<String>,
}

impl NewProduct {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.unit_of_measure.trim().is_empty() {
            return Err(DomainError::validation("unit_of_measure cannot be empty"));
        }
        if self.stock_quantity < Decimal::ZERO {
            return Err(DomainError::validation("stock_quantity cannot be negative"));
        }
        if self.minimum_stock < Decimal::ZERO {
            return Err(DomainError::validation("minimum_stock cannot be negative"));
        }
        if self.unit_price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(DomainError::validation("unit_price cannot be negative"));
        }
        Ok(())
    }

    /// Materialize the record once storage has assigned an id.
    pub fn into_product(self, id: ProductId, at: DateTime<Utc>) -> Product {
        Product {
            id,
            name: self.name.trim().to_string(),
            description: self.description,
            category: self.category,
            unit_of_measure: self.unit_of_measure.trim().to_string(),
            stock_quantity: self.stock_quantity,
            minimum_stock: self.minimum_stock,
            unit_price: self.unit_price,
            location: self.location,
            is_active: true,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Partial update of catalog fields. Stock is not part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit_of_measure: Option<String>,
    pub minimum_stock: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub location: Option<String>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.unit_of_measure.is_none()
            && self.minimum_stock.is_none()
            && self.unit_price.is_none()
            && self.location.is_none()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.is_empty() {
            return Err(DomainError::validation("no fields to update"));
        }
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.unit_of_measure.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(DomainError::validation("unit_of_measure cannot be empty"));
        }
        if self.minimum_stock.is_some_and(|m| m < Decimal::ZERO) {
            return Err(DomainError::validation("minimum_stock cannot be negative"));
        }
        if self.unit_price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(DomainError::validation("unit_price cannot be negative"));
        }
        Ok(())
    }
}
