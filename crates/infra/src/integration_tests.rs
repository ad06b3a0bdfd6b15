//! Service-level tests over the in-memory store.
//!
//! These drive the same code paths the HTTP layer uses: services load
//! records, run the domain transition and commit through the store.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{NaiveTime, Utc};
    use rust_decimal::Decimal;

    use flowrack_auth::{NewUser, Principal, Role, User};
    use flowrack_core::{DomainError, Page, ProductId};
    use flowrack_debts::{DebtResolution, DebtStatus, DebtType, NewDebt};
    use flowrack_inventory::{ReferenceType, TransactionType, replay};
    use flowrack_products::{NewProduct, Product, ProductUpdate, StockStatus};
    use flowrack_requests::{
        DeliveryWeight, ItemApproval, NewRequest, NewRequestItem, RequestFilter, RequestStatus, ReturnWeight,
    };

    use crate::config::AppConfig;
    use crate::services::{ServiceError, Services};
    use crate::store::{InMemoryStore, SharedStore};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn setup() -> Services {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        Services::new(store, &AppConfig::default())
    }

    fn operator() -> Principal {
        Principal::new(flowrack_core::UserId::new(900), Role::Operator)
    }

    async fn user(services: &Services, registration: &str) -> (User, Principal) {
        let new = NewUser {
            registration_number: registration.to_string(),
            password: "unused".to_string(),
            first_name: "Grace".to_string(),
            last_name: registration.to_string(),
            email: None,
            phone: None,
            role: Role::User,
            department: Some("Chemistry".to_string()),
        };
        let user = services.store.insert_user(&new, "not-a-hash", Utc::now()).await.unwrap();
        let principal = Principal::new(user.id, user.role);
        (user, principal)
    }

    async fn product(services: &Services, name: &str, stock: i64, min: i64) -> Product {
        services
            .catalog
            .create(NewProduct {
                name: name.to_string(),
                unit_of_measure: "kg".to_string(),
                description: None,
                category: Some("Metals".to_string()),
                stock_quantity: Decimal::from(stock),
                minimum_stock: Decimal::from(min),
                unit_price: Some(dec("3.50")),
                location: Some("A-1".to_string()),
            })
            .await
            .unwrap()
    }

    fn new_request(lines: &[(ProductId, i64)]) -> NewRequest {
        NewRequest {
            requested_date: Utc::now().date_naive(),
            requested_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            estimated_usage_period: None,
            supervising_instructor: None,
            purpose: Some("Lab session".to_string()),
            notes: None,
            items: lines
                .iter()
                .map(|(product_id, qty)| NewRequestItem {
                    product_id: *product_id,
                    requested_quantity: Decimal::from(*qty),
                    notes: None,
                })
                .collect(),
        }
    }

    fn assert_invalid_state(result: Result<impl core::fmt::Debug, ServiceError>, expected: &str) {
        match result {
            Err(ServiceError::Domain(DomainError::InvalidState { current, .. })) => assert_eq!(current, expected),
            other => panic!("expected invalid state '{expected}', got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stock_follows_the_ledger_without_a_floor() {
        let services = setup();
        let op = operator();
        let wire = product(&services, "Copper wire", 50, 10).await;

        let posted = services
            .ledger
            .adjust(&op, wire.id, TransactionType::Out, dec("45"), None)
            .await
            .unwrap();
        assert_eq!(posted.product.stock_quantity, dec("5"));
        assert_eq!(posted.product.stock_status(), StockStatus::LowStock);

        let posted = services
            .ledger
            .adjust(&op, wire.id, TransactionType::Out, dec("5"), None)
            .await
            .unwrap();
        assert_eq!(posted.product.stock_quantity, Decimal::ZERO);
        assert_eq!(posted.product.stock_status(), StockStatus::OutOfStock);

        let posted = services
            .ledger
            .adjust(&op, wire.id, TransactionType::Adjustment, dec("-1"), Some("count correction".to_string()))
            .await
            .unwrap();
        assert_eq!(posted.product.stock_quantity, dec("-1"));

        let history = services.ledger.history(wire.id, Page::default()).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(replay(dec("50"), &history), dec("-1"));
        assert!(!services.ledger.check_availability(wire.id, Decimal::ONE).await.unwrap());
    }

    #[tokio::test]
    async fn catalog_update_leaves_stock_to_the_ledger() {
        let services = setup();
        let wire = product(&services, "Copper wire", 50, 10).await;

        let updated = services
            .catalog
            .update(
                wire.id,
                ProductUpdate {
                    unit_price: Some(dec("4.25")),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.unit_price, Some(dec("4.25")));
        assert_eq!(updated.stock_quantity, dec("50"));

        let empty = services.catalog.update(wire.id, ProductUpdate::default()).await;
        assert!(matches!(empty, Err(ServiceError::Domain(DomainError::Validation(_)))));

        let detail = services.catalog.detail(wire.id).await.unwrap();
        assert!(detail.recent_transactions.is_empty());

        let availability = services.catalog.availability(wire.id, dec("60")).await.unwrap();
        assert!(!availability.available);
        assert_eq!(availability.max_available, dec("50"));
    }

    #[tokio::test]
    async fn approve_only_from_pending_then_cancel() {
        let services = setup();
        let (_, owner) = user(&services, "STU001").await;
        let wire = product(&services, "Copper wire", 50, 10).await;
        let tape = product(&services, "Tape", 20, 2).await;

        let created = services
            .requests
            .create(&owner, new_request(&[(wire.id, 5), (tape.id, 2)]))
            .await
            .unwrap();
        assert_eq!(created.request.status, RequestStatus::Pending);
        assert_eq!(created.items.len(), 2);
        assert!(created.availability.all_available);

        let approvals: Vec<ItemApproval> = created
            .items
            .iter()
            .map(|line| ItemApproval {
                item_id: line.item.id,
                approved_quantity: line.item.requested_quantity,
            })
            .collect();
        let approved = services
            .requests
            .approve(&operator(), created.request.id, &approvals)
            .await
            .unwrap();
        assert_eq!(approved.request.status, RequestStatus::Approved);
        assert!(approved.items.iter().all(|i| i.approved_quantity.is_some()));

        let before = services.store.request_items(created.request.id).await.unwrap();
        let again: Vec<ItemApproval> = approvals
            .iter()
            .map(|a| ItemApproval {
                approved_quantity: Decimal::ONE,
                ..a.clone()
            })
            .collect();
        assert_invalid_state(
            services.requests.approve(&operator(), created.request.id, &again).await,
            "approved",
        );
        assert_eq!(services.store.request_items(created.request.id).await.unwrap(), before);

        let cancelled = services
            .requests
            .cancel(&owner, created.request.id, Some("no longer needed".to_string()))
            .await
            .unwrap();
        assert_eq!(cancelled.request.status, RequestStatus::Cancelled);
        assert_eq!(cancelled.request.notes.as_deref(), Some("no longer needed"));
    }

    #[tokio::test]
    async fn return_is_rejected_until_the_request_is_delivered() {
        let services = setup();
        let (_, owner) = user(&services, "STU002").await;
        let wire = product(&services, "Copper wire", 50, 10).await;
        let op = operator();

        let created = services.requests.create(&owner, new_request(&[(wire.id, 5)])).await.unwrap();
        let item_id = created.items[0].item.id;
        services
            .requests
            .approve(&op, created.request.id, &[ItemApproval { item_id, approved_quantity: dec("5") }])
            .await
            .unwrap();
        let collecting = services.requests.begin_collection(&op, created.request.id).await.unwrap();
        assert!(collecting.request.collection_date.is_some());

        let returns = [ReturnWeight {
            item_id,
            returned_quantity: dec("1"),
            returned_weight: None,
        }];
        assert_invalid_state(
            services.requests.record_return(&op, created.request.id, &returns).await,
            "collecting",
        );

        let delivered = services
            .requests
            .update_status(&op, created.request.id, RequestStatus::Delivered, None)
            .await
            .unwrap();
        assert!(delivered.request.delivery_date.is_some());
        assert!(delivered.postings.is_empty());

        let returned = services.requests.record_return(&op, created.request.id, &returns).await.unwrap();
        assert_eq!(returned.request.status, RequestStatus::Returned);
        assert!(returned.request.return_date.is_some());
    }

    #[tokio::test]
    async fn delivery_updates_items_status_and_stock_together() {
        let services = setup();
        let (_, owner) = user(&services, "STU003").await;
        let wire = product(&services, "Copper wire", 50, 10).await;
        let op = operator();

        let created = services.requests.create(&owner, new_request(&[(wire.id, 5)])).await.unwrap();
        let item_id = created.items[0].item.id;
        services
            .requests
            .approve(&op, created.request.id, &[ItemApproval { item_id, approved_quantity: dec("4") }])
            .await
            .unwrap();
        services.requests.begin_collection(&op, created.request.id).await.unwrap();

        let delivered = services
            .requests
            .record_delivery(
                &op,
                created.request.id,
                &[DeliveryWeight {
                    item_id,
                    delivered_quantity: dec("4"),
                    delivered_weight: Some(dec("4.2")),
                }],
            )
            .await
            .unwrap();
        assert_eq!(delivered.request.status, RequestStatus::Delivered);
        assert_eq!(delivered.request.notes.as_deref(), Some("Delivery weights recorded"));
        assert_eq!(delivered.items[0].delivered_weight, Some(dec("4.2")));
        assert_eq!(delivered.postings.len(), 1);

        let stored = services.catalog.get(wire.id).await.unwrap();
        assert_eq!(stored.stock_quantity, dec("46"));
        let history = services.ledger.history(wire.id, Page::default()).await.unwrap();
        assert_eq!(history[0].reference_type, ReferenceType::Request);
        assert_eq!(history[0].reference_id, Some(created.request.id.get()));

        let returned = services
            .requests
            .record_return(
                &op,
                created.request.id,
                &[ReturnWeight {
                    item_id,
                    returned_quantity: dec("3"),
                    returned_weight: Some(dec("3.1")),
                }],
            )
            .await
            .unwrap();
        assert_eq!(returned.postings.len(), 1);
        assert_eq!(services.catalog.get(wire.id).await.unwrap().stock_quantity, dec("49"));

        let report = services.requests.reconciliation(&op, created.request.id).await.unwrap();
        assert_eq!(report[0].outstanding_quantity, dec("1"));
        assert_eq!(report[0].weight_difference, Some(dec("1.1")));
    }

    #[tokio::test]
    async fn request_number_is_regenerated_on_collision() {
        let services = setup();
        let (_, owner) = user(&services, "STU004").await;
        let wire = product(&services, "Copper wire", 50, 10).await;

        let fixed = services
            .requests
            .clone()
            .with_number_generator(Arc::new(|_| "REQ-20260101-0001".to_string()));
        let first = fixed.create(&owner, new_request(&[(wire.id, 1)])).await.unwrap();
        assert_eq!(first.request.request_number, "REQ-20260101-0001");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let retrying = services.requests.clone().with_number_generator(Arc::new(move |_| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => "REQ-20260101-0001".to_string(),
                _ => "REQ-20260101-0002".to_string(),
            }
        }));
        let second = retrying.create(&owner, new_request(&[(wire.id, 1)])).await.unwrap();
        assert_eq!(second.request.request_number, "REQ-20260101-0002");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let exhausted = fixed.create(&owner, new_request(&[(wire.id, 1)])).await;
        assert!(matches!(exhausted, Err(ServiceError::Domain(DomainError::Conflict(_)))));
    }

    #[tokio::test]
    async fn request_creation_checks_products() {
        let services = setup();
        let (_, owner) = user(&services, "STU005").await;
        let wire = product(&services, "Copper wire", 50, 10).await;
        services.catalog.deactivate(wire.id).await.unwrap();

        let inactive = services.requests.create(&owner, new_request(&[(wire.id, 1)])).await;
        assert!(matches!(inactive, Err(ServiceError::Domain(DomainError::Validation(_)))));

        let missing = services.requests.create(&owner, new_request(&[(ProductId::new(404), 1)])).await;
        assert!(matches!(missing, Err(ServiceError::Domain(DomainError::NotFound(_)))));
    }

    #[tokio::test]
    async fn users_only_see_their_own_requests() {
        let services = setup();
        let (_, alice) = user(&services, "STU006").await;
        let (_, bob) = user(&services, "STU007").await;
        let wire = product(&services, "Copper wire", 50, 10).await;

        let mine = services.requests.create(&alice, new_request(&[(wire.id, 1)])).await.unwrap();
        services.requests.create(&bob, new_request(&[(wire.id, 1)])).await.unwrap();

        let listed = services.requests.list(&alice, RequestFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.request.id);
        assert_eq!(services.requests.list(&operator(), RequestFilter::default()).await.unwrap().len(), 2);

        assert!(matches!(
            services.requests.get(&bob, mine.request.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            services.requests.cancel(&bob, mine.request.id, None).await,
            Err(ServiceError::Forbidden(_))
        ));

        let stats = services.requests.statistics(&alice).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn debt_total_is_frozen_and_resolution_happens_once() {
        let services = setup();
        let (debtor, _) = user(&services, "STU008").await;
        let wire = product(&services, "Copper wire", 50, 10).await;
        let op = operator();

        let debt = services
            .debts
            .create(
                &op,
                NewDebt {
                    user_id: debtor.id,
                    product_id: wire.id,
                    request_id: None,
                    debt_type: DebtType::Missing,
                    quantity: dec("2"),
                    unit_price: dec("3.50"),
                    description: Some("Short on return".to_string()),
                    due_date: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(debt.total_amount, dec("7.00"));

        services
            .catalog
            .update(
                wire.id,
                ProductUpdate {
                    unit_price: Some(dec("9.99")),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(services.debts.get(&op, debt.id).await.unwrap().total_amount, dec("7.00"));

        let paid = DebtResolution::new(DebtStatus::Paid, Some("cash".to_string())).unwrap();
        let resolved = services.debts.resolve(&op, debt.id, paid.clone()).await.unwrap();
        assert_eq!(resolved.status, DebtStatus::Paid);
        assert_eq!(resolved.description.as_deref(), Some("Short on return | Resolution: cash"));
        assert_eq!(resolved.resolved_by, Some(op.user_id));

        let waived = DebtResolution::new(DebtStatus::Waived, None).unwrap();
        assert_invalid_state(services.debts.resolve(&op, debt.id, waived).await, "paid");
        let stored = services.debts.get(&op, debt.id).await.unwrap();
        assert_eq!(stored.resolved_date, resolved.resolved_date);
        assert_eq!(stored.status, DebtStatus::Paid);
    }

    #[tokio::test]
    async fn debt_request_must_belong_to_the_debtor() {
        let services = setup();
        let (alice, alice_p) = user(&services, "STU009").await;
        let (bob, _) = user(&services, "STU010").await;
        let wire = product(&services, "Copper wire", 50, 10).await;
        let request = services.requests.create(&alice_p, new_request(&[(wire.id, 1)])).await.unwrap();

        let mismatched = services
            .debts
            .create(
                &operator(),
                NewDebt {
                    user_id: bob.id,
                    product_id: wire.id,
                    request_id: Some(request.request.id),
                    debt_type: DebtType::Damaged,
                    quantity: dec("1"),
                    unit_price: dec("2"),
                    description: None,
                    due_date: None,
                },
            )
            .await;
        assert!(matches!(mismatched, Err(ServiceError::Domain(DomainError::Validation(_)))));

        let ok = services
            .debts
            .create(
                &operator(),
                NewDebt {
                    user_id: alice.id,
                    product_id: wire.id,
                    request_id: Some(request.request.id),
                    debt_type: DebtType::Damaged,
                    quantity: dec("1"),
                    unit_price: dec("2"),
                    description: None,
                    due_date: None,
                },
            )
            .await;
        assert!(ok.is_ok());
        assert_eq!(services.debts.list(&alice_p, Default::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn login_logout_round() {
        let services = setup();
        let registered = services
            .users
            .register(NewUser {
                registration_number: "STU100".to_string(),
                password: "secret1".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: Some("Ada@Example.com".to_string()),
                phone: None,
                role: Role::Admin,
                department: None,
            })
            .await
            .unwrap();
        assert_eq!(registered.role, Role::User);
        assert_eq!(registered.email.as_deref(), Some("ada@example.com"));

        assert!(matches!(
            services.users.login("STU100", "wrong-password").await,
            Err(ServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            services.users.login("NOPE", "secret1").await,
            Err(ServiceError::InvalidCredentials)
        ));

        let issued = services.users.login("STU100", "secret1").await.unwrap();
        let session = services.users.authenticate(&issued.token).await.unwrap();
        assert_eq!(session.user.id, registered.id);

        services.users.logout(&session);
        assert!(matches!(
            services.users.authenticate(&issued.token).await,
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn only_admins_change_privileges() {
        let services = setup();
        let (target, target_p) = user(&services, "STU011").await;
        let admin = Principal::new(flowrack_core::UserId::new(901), Role::Admin);

        let promote = flowrack_auth::UserUpdate {
            role: Some(Role::Operator),
            ..Default::default()
        };
        assert!(matches!(
            services.users.update(&target_p, target.id, promote.clone()).await,
            Err(ServiceError::Forbidden(_))
        ));
        let promoted = services.users.update(&admin, target.id, promote).await.unwrap();
        assert_eq!(promoted.role, Role::Operator);

        assert!(services.users.deactivate(&target_p, target.id).await.is_err());
        let deactivated = services.users.deactivate(&admin, target.id).await.unwrap();
        assert!(!deactivated.is_active);
    }

    #[tokio::test]
    async fn dashboards_are_scoped_by_role() {
        let services = setup();
        let (owner, owner_p) = user(&services, "STU012").await;
        let wire = product(&services, "Copper wire", 5, 10).await;
        services.requests.create(&owner_p, new_request(&[(wire.id, 1)])).await.unwrap();
        services
            .debts
            .create(
                &operator(),
                NewDebt {
                    user_id: owner.id,
                    product_id: wire.id,
                    request_id: None,
                    debt_type: DebtType::Other,
                    quantity: dec("1"),
                    unit_price: dec("3.50"),
                    description: None,
                    due_date: None,
                },
            )
            .await
            .unwrap();

        let mine = services.dashboard.for_user(&owner_p).await.unwrap();
        assert_eq!(mine.request_summary.pending, 1);
        assert_eq!(mine.debt_summary.pending_amount, dec("3.50"));

        let feed = services.dashboard.activity(&owner_p, None).await.unwrap();
        assert_eq!(feed.len(), 1);

        let system = services.dashboard.activity(&operator(), Some(10)).await.unwrap();
        assert_eq!(system.len(), 2);

        let overview = services.dashboard.for_operator().await.unwrap();
        assert_eq!(overview.overview.low_stock_products, 1);
        assert_eq!(overview.overview.active_users, 1);
        assert_eq!(overview.overview.total_pending_debt, dec("3.50"));
    }
}
