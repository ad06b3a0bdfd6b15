use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use flowrack_core::{DomainError, DomainResult, Entity, ProductId, RequestId, TransactionId, UserId};
use flowrack_products::Product;

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    In,
    Out,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::In => "in",
            TransactionType::Out => "out",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "in" => Ok(TransactionType::In),
            "out" => Ok(TransactionType::Out),
            "adjustment" => Ok(TransactionType::Adjustment),
            other => Err(DomainError::validation(format!(
                "transaction_type must be one of: in, out, adjustment (got '{other}')"
            ))),
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    Manual,
    Request,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Manual => "manual",
            ReferenceType::Request => "request",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "manual" => Ok(ReferenceType::Manual),
            "request" => Ok(ReferenceType::Request),
            other => Err(DomainError::validation(format!("unknown reference_type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReference {
    pub reference_type: ReferenceType,
    pub reference_id: Option<i64>,
}

impl StockReference {
    pub fn manual() -> Self {
        Self {
            reference_type: ReferenceType::Manual,
            reference_id: None,
        }
    }

    pub fn request(id: RequestId) -> Self {
        Self {
            reference_type: ReferenceType::Request,
            reference_id: Some(id.get()),
        }
    }
}

/// A requested stock movement, with the sign already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    /// Signed change applied to `stock_quantity`.
    pub delta: Decimal,
    pub transaction_type: TransactionType,
    pub reference: StockReference,
    pub performed_by: UserId,
    pub notes: Option<String>,
}

impl StockAdjustment {
    /// Build an adjustment from operator input.
    ///
    /// `out` movements are always negative (a positive quantity is negated),
    /// `in` movements must be positive, `adjustment` keeps the given sign.
    pub fn new(
        product_id: ProductId,
        transaction_type: TransactionType,
        quantity: Decimal,
        reference: StockReference,
        performed_by: UserId,
        notes: Option<String>,
    ) -> DomainResult<Self> {
        if quantity.is_zero() {
            return Err(DomainError::validation("quantity cannot be zero"));
        }
        let delta = match transaction_type {
            TransactionType::Out => -quantity.abs(),
            TransactionType::In if quantity < Decimal::ZERO => {
                return Err(DomainError::validation("'in' movements need a positive quantity"));
            }
            TransactionType::In | TransactionType::Adjustment => quantity,
        };
        Ok(Self {
            product_id,
            delta,
            transaction_type,
            reference,
            performed_by,
            notes: notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

/// Immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: TransactionId,
    pub product_id: ProductId,
    pub transaction_type: TransactionType,
    /// Absolute size of the movement.
    pub quantity: Decimal,
    /// Signed change; replaying these reconstructs stock.
    pub quantity_change: Decimal,
    pub previous_quantity: Decimal,
    pub new_quantity: Decimal,
    pub reference_type: ReferenceType,
    pub reference_id: Option<i64>,
    pub performed_by: UserId,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for InventoryTransaction {
    type Id = TransactionId;

    fn id(&self) -> TransactionId {
        self.id
    }
}

/// Ledger row before storage assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInventoryTransaction {
    pub product_id: ProductId,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub quantity_change: Decimal,
    pub previous_quantity: Decimal,
    pub new_quantity: Decimal,
    pub reference_type: ReferenceType,
    pub reference_id: Option<i64>,
    pub performed_by: UserId,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewInventoryTransaction {
    pub fn into_transaction(self, id: TransactionId) -> InventoryTransaction {
        InventoryTransaction {
            id,
            product_id: self.product_id,
            transaction_type: self.transaction_type,
            quantity: self.quantity,
            quantity_change: self.quantity_change,
            previous_quantity: self.previous_quantity,
            new_quantity: self.new_quantity,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            performed_by: self.performed_by,
            notes: self.notes,
            created_at: self.created_at,
        }
    }
}

/// Result of posting an adjustment: both halves must be persisted together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockPosting {
    pub product: Product,
    pub entry: NewInventoryTransaction,
}

/// Post an adjustment against the current product value.
///
/// No floor is enforced: stock may go negative. Callers that care check
/// availability first, which is advisory only.
pub fn post(product: &Product, adjustment: &StockAdjustment, at: DateTime<Utc>) -> DomainResult<StockPosting> {
    if product.id != adjustment.product_id {
        return Err(DomainError::invariant(format!(
            "adjustment for product {} posted against product {}",
            adjustment.product_id, product.id
        )));
    }
    if adjustment.delta.is_zero() {
        return Err(DomainError::validation("quantity cannot be zero"));
    }

    let previous = product.stock_quantity;
    let next = previous
        .checked_add(adjustment.delta)
        .ok_or_else(|| DomainError::validation("stock quantity out of range"))?;

    Ok(StockPosting {
        product: product.with_stock_quantity(next, at),
        entry: NewInventoryTransaction {
            product_id: product.id,
            transaction_type: adjustment.transaction_type,
            quantity: adjustment.delta.abs(),
            quantity_change: adjustment.delta,
            previous_quantity: previous,
            new_quantity: next,
            reference_type: adjustment.reference.reference_type,
            reference_id: adjustment.reference.reference_id,
            performed_by: adjustment.performed_by,
            notes: adjustment.notes.clone(),
            created_at: at,
        },
    })
}

/// `stock_quantity >= requested`, read without any reservation.
pub fn check_availability(product: &Product, requested: Decimal) -> bool {
    product.is_available(requested)
}

/// Reconstruct a stock level from an initial quantity and its ledger rows.
pub fn replay<'a>(initial: Decimal, entries: impl IntoIterator<Item = &'a InventoryTransaction>) -> Decimal {
    entries
        .into_iter()
        .fold(initial, |acc, e| acc + e.quantity_change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flowrack_products::{NewProduct, StockStatus};

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
    }

    fn operator() -> UserId {
        UserId::new(2)
    }

    fn product(stock: i64, minimum: i64) -> Product {
        NewProduct {
            name: "Safety Helmet".to_string(),
            unit_of_measure: "pcs".to_string(),
            description: None,
            category: None,
            stock_quantity: Decimal::from(stock),
            minimum_stock: Decimal::from(minimum),
            unit_price: None,
            location: None,
        }
        .into_product(ProductId::new(1), test_time())
    }

    fn out(qty: i64) -> StockAdjustment {
        StockAdjustment::new(
            ProductId::new(1),
            TransactionType::Out,
            Decimal::from(qty),
            StockReference::manual(),
            operator(),
            None,
        )
        .unwrap()
    }

    fn commit(entries: &mut Vec<InventoryTransaction>, posting: StockPosting) -> Product {
        let id = TransactionId::new(entries.len() as i64 + 1);
        entries.push(posting.entry.into_transaction(id));
        posting.product
    }

    #[test]
    fn out_movements_are_negated() {
        assert_eq!(out(45).delta, Decimal::from(-45));
        assert_eq!(out(-45).delta, Decimal::from(-45));
    }

    #[test]
    fn in_movements_must_be_positive_and_zero_is_rejected() {
        let neg_in = StockAdjustment::new(
            ProductId::new(1),
            TransactionType::In,
            Decimal::from(-3),
            StockReference::manual(),
            operator(),
            None,
        );
        assert!(matches!(neg_in, Err(DomainError::Validation(_))));

        let zero = StockAdjustment::new(
            ProductId::new(1),
            TransactionType::Adjustment,
            Decimal::ZERO,
            StockReference::manual(),
            operator(),
            None,
        );
        assert!(matches!(zero, Err(DomainError::Validation(_))));
    }

    #[test]
    fn drains_to_negative_without_floor() {
        let mut entries = Vec::new();
        let mut p = product(50, 10);

        p = commit(&mut entries, post(&p, &out(45), test_time()).unwrap());
        assert_eq!(p.stock_quantity, Decimal::from(5));
        assert_eq!(p.stock_status(), StockStatus::LowStock);

        p = commit(&mut entries, post(&p, &out(5), test_time()).unwrap());
        assert_eq!(p.stock_quantity, Decimal::ZERO);
        assert_eq!(p.stock_status(), StockStatus::OutOfStock);

        p = commit(&mut entries, post(&p, &out(1), test_time()).unwrap());
        assert_eq!(p.stock_quantity, Decimal::NEGATIVE_ONE);

        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.quantity > Decimal::ZERO));
        assert_eq!(entries[2].previous_quantity, Decimal::ZERO);
        assert_eq!(entries[2].new_quantity, Decimal::NEGATIVE_ONE);
        assert_eq!(replay(Decimal::from(50), &entries), p.stock_quantity);
    }

    #[test]
    fn posting_does_not_touch_the_input_product() {
        let p = product(10, 1);
        let posting = post(&p, &out(4), test_time()).unwrap();
        assert_eq!(p.stock_quantity, Decimal::from(10));
        assert_eq!(posting.product.stock_quantity, Decimal::from(6));
    }

    #[test]
    fn rejects_adjustment_for_other_product() {
        let p = product(10, 1);
        let mut adj = out(1);
        adj.product_id = ProductId::new(99);
        assert!(matches!(post(&p, &adj, test_time()), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn request_reference_carries_request_id() {
        let adj = StockAdjustment::new(
            ProductId::new(1),
            TransactionType::In,
            Decimal::from(2),
            StockReference::request(RequestId::new(77)),
            operator(),
            Some("returned".to_string()),
        )
        .unwrap();
        let posting = post(&product(0, 0), &adj, test_time()).unwrap();
        assert_eq!(posting.entry.reference_type, ReferenceType::Request);
        assert_eq!(posting.entry.reference_id, Some(77));
    }

    #[test]
    fn stock_past_decimal_range_is_rejected() {
        let full = Product {
            stock_quantity: Decimal::MAX,
            ..product(0, 0)
        };
        let adj = StockAdjustment::new(
            ProductId::new(1),
            TransactionType::In,
            Decimal::ONE,
            StockReference::manual(),
            operator(),
            None,
        )
        .unwrap();
        assert!(matches!(post(&full, &adj, test_time()), Err(DomainError::Validation(_))));
        assert!(post(&full, &out(1), test_time()).is_ok());
    }

    #[test]
    fn parses_transaction_types() {
        assert_eq!(TransactionType::parse("OUT").unwrap(), TransactionType::Out);
        assert!(TransactionType::parse("transfer").is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: stock after N postings = initial + sum of signed deltas, with N ledger rows.
            #[test]
            fn stock_equals_initial_plus_deltas(
                initial in 0i64..1_000,
                deltas in prop::collection::vec((-500i64..500).prop_filter("non-zero", |d| *d != 0), 0..40)
            ) {
                let mut entries = Vec::new();
                let mut p = product(initial, 10);

                for d in &deltas {
                    let adj = StockAdjustment::new(
                        p.id,
                        TransactionType::Adjustment,
                        Decimal::from(*d),
                        StockReference::manual(),
                        operator(),
                        None,
                    ).unwrap();
                    p = commit(&mut entries, post(&p, &adj, test_time()).unwrap());
                }

                let sum: i64 = deltas.iter().sum();
                prop_assert_eq!(p.stock_quantity, Decimal::from(initial + sum));
                prop_assert_eq!(entries.len(), deltas.len());
                prop_assert_eq!(replay(Decimal::from(initial), &entries), p.stock_quantity);
                for (entry, d) in entries.iter().zip(&deltas) {
                    prop_assert_eq!(entry.quantity, Decimal::from(d.abs()));
                }
            }
        }
    }
}
