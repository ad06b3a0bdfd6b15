use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use flowrack_core::{DomainError, DomainResult, RequestItemId, UserId};
use flowrack_inventory::{StockAdjustment, StockReference, TransactionType};

use crate::request::{Request, RequestItem};
use crate::status::RequestStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemApproval {
    pub item_id: RequestItemId,
    pub approved_quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryWeight {
    pub item_id: RequestItemId,
    pub delivered_quantity: Decimal,
    #[serde(default)]
    pub delivered_weight: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnWeight {
    pub item_id: RequestItemId,
    pub returned_quantity: Decimal,
    #[serde(default)]
    pub returned_weight: Option<Decimal>,
}

/// Whether reconciliation also moves stock, and on whose behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementPolicy {
    pub post_stock_movements: bool,
    pub performed_by: UserId,
}

/// Everything one lifecycle step changes.
///
/// Storage must apply it in a single unit of work and only if the stored
/// status still equals `expected_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTransition {
    pub expected_status: RequestStatus,
    pub request: Request,
    pub item_updates: Vec<RequestItem>,
    pub stock_movements: Vec<StockAdjustment>,
}

impl Request {
    fn require_status(&self, expected: RequestStatus, action: &str) -> DomainResult<()> {
        if self.status != expected {
            return Err(DomainError::invalid_state(
                self.status,
                format!("{action} requires status '{expected}'"),
            ));
        }
        Ok(())
    }

    /// Next request value in `next`, with the matching timestamp stamped.
    fn moved_to(&self, next: RequestStatus, notes: Option<String>, at: DateTime<Utc>) -> Request {
        let mut moved = self.clone();
        moved.status = next;
        moved.updated_at = at;
        match next {
            RequestStatus::Collecting => moved.collection_date = Some(at),
            RequestStatus::Delivered => moved.delivery_date = Some(at),
            RequestStatus::Returned => moved.return_date = Some(at),
            _ => {}
        }
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            moved.notes = Some(notes);
        }
        moved
    }

    fn transition(&self, request: Request) -> RequestTransition {
        RequestTransition {
            expected_status: self.status,
            request,
            item_updates: Vec::new(),
            stock_movements: Vec::new(),
        }
    }

    /// `pending → approved`, setting `approved_quantity` on the listed items.
    pub fn approve(
        &self,
        items: &[RequestItem],
        approvals: &[ItemApproval],
        at: DateTime<Utc>,
    ) -> DomainResult<RequestTransition> {
        self.require_status(RequestStatus::Pending, "approval")?;
        if approvals.is_empty() {
            return Err(DomainError::validation("item approvals are required"));
        }

        let by_id = index_items(self, items)?;
        let mut seen = HashSet::new();
        let mut updates = Vec::with_capacity(approvals.len());
        for approval in approvals {
            let item = lookup(&by_id, approval.item_id)?;
            if !seen.insert(approval.item_id) {
                return Err(DomainError::validation(format!("item {} approved twice", approval.item_id)));
            }
            if approval.approved_quantity < Decimal::ZERO {
                return Err(DomainError::validation("approved quantity cannot be negative"));
            }
            updates.push(RequestItem {
                approved_quantity: Some(approval.approved_quantity),
                ..item.clone()
            });
        }

        let mut transition = self.transition(self.moved_to(RequestStatus::Approved, None, at));
        transition.item_updates = updates;
        Ok(transition)
    }

    /// `pending|approved → cancelled`; the reason replaces the notes.
    pub fn cancel(&self, reason: Option<String>, at: DateTime<Utc>) -> DomainResult<RequestTransition> {
        if !self.status.is_cancellable() {
            return Err(DomainError::invalid_state(
                self.status,
                "only pending or approved requests can be cancelled",
            ));
        }
        Ok(self.transition(self.moved_to(RequestStatus::Cancelled, reason, at)))
    }

    /// `approved → collecting`, stamping `collection_date`.
    pub fn begin_collection(&self, at: DateTime<Utc>) -> DomainResult<RequestTransition> {
        self.require_status(RequestStatus::Approved, "collection")?;
        Ok(self.transition(self.moved_to(RequestStatus::Collecting, None, at)))
    }

    /// `collecting → delivered`, recording what actually left the warehouse.
    pub fn record_delivery(
        &self,
        items: &[RequestItem],
        weights: &[DeliveryWeight],
        policy: MovementPolicy,
        at: DateTime<Utc>,
    ) -> DomainResult<RequestTransition> {
        self.require_status(RequestStatus::Collecting, "recording delivery weights")?;
        if weights.is_empty() {
            return Err(DomainError::validation("weight data is required"));
        }

        let by_id = index_items(self, items)?;
        let mut seen = HashSet::new();
        let mut updates = Vec::with_capacity(weights.len());
        let mut movements = Vec::new();
        for entry in weights {
            let item = lookup(&by_id, entry.item_id)?;
            if !seen.insert(entry.item_id) {
                return Err(DomainError::validation(format!("item {} listed twice", entry.item_id)));
            }
            non_negative(entry.delivered_quantity, "delivered quantity")?;
            if let Some(weight) = entry.delivered_weight {
                non_negative(weight, "delivered weight")?;
            }

            if policy.post_stock_movements && entry.delivered_quantity > Decimal::ZERO {
                movements.push(StockAdjustment::new(
                    item.product_id,
                    TransactionType::Out,
                    entry.delivered_quantity,
                    StockReference::request(self.id),
                    policy.performed_by,
                    Some(format!("Delivered for {}", self.request_number)),
                )?);
            }
            updates.push(RequestItem {
                delivered_quantity: Some(entry.delivered_quantity),
                delivered_weight: entry.delivered_weight,
                ..item.clone()
            });
        }

        let next = self.moved_to(
            RequestStatus::Delivered,
            Some("Delivery weights recorded".to_string()),
            at,
        );
        let mut transition = self.transition(next);
        transition.item_updates = updates;
        transition.stock_movements = movements;
        Ok(transition)
    }

    /// `delivered → returned`, recording what came back.
    pub fn record_return(
        &self,
        items: &[RequestItem],
        weights: &[ReturnWeight],
        policy: MovementPolicy,
        at: DateTime<Utc>,
    ) -> DomainResult<RequestTransition> {
        self.require_status(RequestStatus::Delivered, "recording return weights")?;
        if weights.is_empty() {
            return Err(DomainError::validation("weight data is required"));
        }

        let by_id = index_items(self, items)?;
        let mut seen = HashSet::new();
        let mut updates = Vec::with_capacity(weights.len());
        let mut movements = Vec::new();
        for entry in weights {
            let item = lookup(&by_id, entry.item_id)?;
            if !seen.insert(entry.item_id) {
                return Err(DomainError::validation(format!("item {} listed twice", entry.item_id)));
            }
            non_negative(entry.returned_quantity, "returned quantity")?;
            if let Some(weight) = entry.returned_weight {
                non_negative(weight, "returned weight")?;
            }
            if item.delivered_quantity.is_some_and(|d| entry.returned_quantity > d) {
                return Err(DomainError::validation(format!(
                    "item {} returns more than was delivered",
                    entry.item_id
                )));
            }

            if policy.post_stock_movements && entry.returned_quantity > Decimal::ZERO {
                movements.push(StockAdjustment::new(
                    item.product_id,
                    TransactionType::In,
                    entry.returned_quantity,
                    StockReference::request(self.id),
                    policy.performed_by,
                    Some(format!("Returned for {}", self.request_number)),
                )?);
            }
            updates.push(RequestItem {
                returned_quantity: Some(entry.returned_quantity),
                returned_weight: entry.returned_weight,
                ..item.clone()
            });
        }

        let next = self.moved_to(
            RequestStatus::Returned,
            Some("Return weights recorded".to_string()),
            at,
        );
        let mut transition = self.transition(next);
        transition.item_updates = updates;
        transition.stock_movements = movements;
        Ok(transition)
    }

    /// Plain status move along the graph, without item changes.
    ///
    /// Approval is excluded: it always carries item quantities.
    pub fn advance(
        &self,
        target: RequestStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<RequestTransition> {
        if target == RequestStatus::Approved {
            return Err(DomainError::validation(
                "approval requires item quantities; use the approve operation",
            ));
        }
        if !self.status.can_transition_to(target) {
            return Err(DomainError::invalid_state(
                self.status,
                format!("cannot move request to '{target}'"),
            ));
        }
        Ok(self.transition(self.moved_to(target, notes, at)))
    }
}

fn index_items<'a>(
    request: &Request,
    items: &'a [RequestItem],
) -> DomainResult<HashMap<RequestItemId, &'a RequestItem>> {
    if let Some(stray) = items.iter().find(|i| i.request_id != request.id) {
        return Err(DomainError::invariant(format!(
            "item {} belongs to request {}, not {}",
            stray.id, stray.request_id, request.id
        )));
    }
    Ok(items.iter().map(|i| (i.id, i)).collect())
}

fn lookup<'a>(
    by_id: &HashMap<RequestItemId, &'a RequestItem>,
    id: RequestItemId,
) -> DomainResult<&'a RequestItem> {
    by_id
        .get(&id)
        .copied()
        .ok_or_else(|| DomainError::validation(format!("item {id} is not part of this request")))
}

fn non_negative(value: Decimal, what: &str) -> DomainResult<()> {
    if value < Decimal::ZERO {
        return Err(DomainError::validation(format!("{what} cannot be negative")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::tests::{stored, test_time};
    use flowrack_core::ProductId;

    fn later(minutes: i64) -> DateTime<Utc> {
        test_time() + chrono::Duration::minutes(minutes)
    }

    fn policy(post: bool) -> MovementPolicy {
        MovementPolicy {
            post_stock_movements: post,
            performed_by: UserId::new(2),
        }
    }

    fn approvals(items: &[RequestItem]) -> Vec<ItemApproval> {
        items
            .iter()
            .map(|i| ItemApproval {
                item_id: i.id,
                approved_quantity: i.requested_quantity,
            })
            .collect()
    }

    /// Apply a transition the way storage would.
    fn apply(items: &mut [RequestItem], t: &RequestTransition) -> Request {
        for update in &t.item_updates {
            if let Some(slot) = items.iter_mut().find(|i| i.id == update.id) {
                *slot = update.clone();
            }
        }
        t.request.clone()
    }

    #[test]
    fn approve_then_reapprove_conflicts_and_cancel_succeeds() {
        let (request, mut items) = stored(&[(1, 5), (2, 3)]);

        let t = request.approve(&items, &approvals(&items), later(1)).unwrap();
        assert_eq!(t.expected_status, RequestStatus::Pending);
        let request = apply(&mut items, &t);
        assert_eq!(request.status, RequestStatus::Approved);
        assert!(items.iter().all(|i| i.approved_quantity.is_some()));

        let snapshot = items.clone();
        let err = request.approve(&items, &approvals(&items), later(2)).unwrap_err();
        match err {
            DomainError::InvalidState { current, .. } => assert_eq!(current, "approved"),
            other => panic!("expected InvalidState, got {other:?}"),
        }
        assert_eq!(items, snapshot);

        let t = request.cancel(Some("no longer needed".to_string()), later(3)).unwrap();
        assert_eq!(t.request.status, RequestStatus::Cancelled);
        assert_eq!(t.request.notes.as_deref(), Some("no longer needed"));
    }

    #[test]
    fn partial_approval_leaves_other_items_unset() {
        let (request, items) = stored(&[(1, 5), (2, 3)]);
        let t = request
            .approve(
                &items,
                &[ItemApproval {
                    item_id: items[0].id,
                    approved_quantity: Decimal::from(2),
                }],
                later(1),
            )
            .unwrap();
        assert_eq!(t.item_updates.len(), 1);
        assert_eq!(t.item_updates[0].approved_quantity, Some(Decimal::from(2)));
    }

    #[test]
    fn approval_rejects_foreign_items_and_negative_quantities() {
        let (request, items) = stored(&[(1, 5)]);
        let foreign = ItemApproval {
            item_id: RequestItemId::new(999),
            approved_quantity: Decimal::ONE,
        };
        assert!(matches!(request.approve(&items, &[foreign], later(1)), Err(DomainError::Validation(_))));

        let negative = ItemApproval {
            item_id: items[0].id,
            approved_quantity: Decimal::NEGATIVE_ONE,
        };
        assert!(matches!(request.approve(&items, &[negative], later(1)), Err(DomainError::Validation(_))));
        assert!(matches!(request.approve(&items, &[], later(1)), Err(DomainError::Validation(_))));
    }

    #[test]
    fn full_lifecycle_stamps_dates_and_posts_movements() {
        let (request, mut items) = stored(&[(1, 5), (2, 3)]);
        let t = request.approve(&items, &approvals(&items), later(1)).unwrap();
        let request = apply(&mut items, &t);

        let t = request.begin_collection(later(2)).unwrap();
        let request = apply(&mut items, &t);
        assert_eq!(request.collection_date, Some(later(2)));

        let weights = vec![
            DeliveryWeight {
                item_id: items[0].id,
                delivered_quantity: Decimal::from(5),
                delivered_weight: Some(Decimal::new(125, 1)),
            },
            DeliveryWeight {
                item_id: items[1].id,
                delivered_quantity: Decimal::ZERO,
                delivered_weight: None,
            },
        ];
        let t = request.record_delivery(&items, &weights, policy(true), later(3)).unwrap();
        assert_eq!(t.expected_status, RequestStatus::Collecting);
        assert_eq!(t.stock_movements.len(), 1);
        assert_eq!(t.stock_movements[0].product_id, ProductId::new(1));
        assert_eq!(t.stock_movements[0].delta, Decimal::from(-5));
        let request = apply(&mut items, &t);
        assert_eq!(request.status, RequestStatus::Delivered);
        assert_eq!(request.delivery_date, Some(later(3)));
        assert_eq!(request.notes.as_deref(), Some("Delivery weights recorded"));
        assert_eq!(items[0].delivered_weight, Some(Decimal::new(125, 1)));

        let back = vec![ReturnWeight {
            item_id: items[0].id,
            returned_quantity: Decimal::from(4),
            returned_weight: Some(Decimal::from(10)),
        }];
        let t = request.record_return(&items, &back, policy(true), later(4)).unwrap();
        assert_eq!(t.stock_movements[0].delta, Decimal::from(4));
        let request = apply(&mut items, &t);
        assert_eq!(request.status, RequestStatus::Returned);
        assert_eq!(request.return_date, Some(later(4)));
        assert!(request.status.is_terminal());
    }

    #[test]
    fn return_weights_rejected_while_still_collecting() {
        let (request, mut items) = stored(&[(1, 5)]);
        let t = request.approve(&items, &approvals(&items), later(1)).unwrap();
        let request = apply(&mut items, &t);
        let request = apply(&mut items, &request.begin_collection(later(2)).unwrap());

        let back = vec![ReturnWeight {
            item_id: items[0].id,
            returned_quantity: Decimal::ONE,
            returned_weight: None,
        }];
        let err = request.record_return(&items, &back, policy(false), later(3)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { ref current, .. } if current == "collecting"));

        // explicit status move still works
        let t = request.advance(RequestStatus::Delivered, None, later(4)).unwrap();
        assert_eq!(t.request.status, RequestStatus::Delivered);
        assert!(t.item_updates.is_empty());
    }

    #[test]
    fn movements_suppressed_by_policy() {
        let (mut request, items) = stored(&[(1, 5)]);
        request.status = RequestStatus::Collecting;
        let weights = vec![DeliveryWeight {
            item_id: items[0].id,
            delivered_quantity: Decimal::from(5),
            delivered_weight: None,
        }];
        let t = request.record_delivery(&items, &weights, policy(false), later(1)).unwrap();
        assert!(t.stock_movements.is_empty());
    }

    #[test]
    fn cannot_return_more_than_delivered() {
        let (mut request, mut items) = stored(&[(1, 5)]);
        request.status = RequestStatus::Delivered;
        items[0].delivered_quantity = Some(Decimal::from(2));
        let back = vec![ReturnWeight {
            item_id: items[0].id,
            returned_quantity: Decimal::from(3),
            returned_weight: None,
        }];
        assert!(matches!(
            request.record_return(&items, &back, policy(true), later(1)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn cancel_rejected_after_collection_started() {
        let (mut request, _) = stored(&[(1, 5)]);
        request.status = RequestStatus::Collecting;
        assert!(matches!(request.cancel(None, later(1)), Err(DomainError::InvalidState { .. })));
    }

    #[test]
    fn advance_refuses_approval_and_backward_moves() {
        let (mut request, _) = stored(&[(1, 5)]);
        assert!(matches!(
            request.advance(RequestStatus::Approved, None, later(1)),
            Err(DomainError::Validation(_))
        ));
        request.status = RequestStatus::Delivered;
        assert!(matches!(
            request.advance(RequestStatus::Collecting, None, later(1)),
            Err(DomainError::InvalidState { .. })
        ));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = RequestStatus> {
            prop::sample::select(RequestStatus::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: approval only ever succeeds from pending, and never moves items otherwise.
            #[test]
            fn approve_only_from_pending(status in any_status()) {
                let (mut request, items) = stored(&[(1, 5), (2, 7)]);
                request.status = status;
                let result = request.approve(&items, &approvals(&items), later(1));
                if status == RequestStatus::Pending {
                    prop_assert!(result.is_ok());
                } else {
                    let is_invalid_state = matches!(result, Err(DomainError::InvalidState { .. }));
                    prop_assert!(is_invalid_state);
                }
            }

            /// Property: any successful generic move follows an edge of the graph.
            #[test]
            fn advance_follows_graph(from in any_status(), to in any_status()) {
                let (mut request, _) = stored(&[(1, 1)]);
                request.status = from;
                match request.advance(to, None, later(1)) {
                    Ok(t) => {
                        prop_assert!(from.can_transition_to(to));
                        prop_assert_eq!(t.request.status, to);
                        prop_assert_eq!(t.expected_status, from);
                    }
                    Err(_) => prop_assert!(!from.can_transition_to(to) || to == RequestStatus::Approved),
                }
            }
        }
    }
}
