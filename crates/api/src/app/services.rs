//! Service wiring for the HTTP layer plus the realtime (SSE) channel.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use flowrack_core::UserId;
use flowrack_debts::Debt;
use flowrack_infra::Services;
use flowrack_infra::store::{CommittedTransition, PostedAdjustment};
use flowrack_requests::Request;

use crate::context::PrincipalContext;

pub const REALTIME_CAPACITY: usize = 256;

/// Who may see a realtime message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "lowercase")]
pub enum Audience {
    User(UserId),
    Operators,
}

/// Realtime message broadcast via SSE.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    pub audience: Audience,
    pub topic: &'static str,
    pub payload: serde_json::Value,
}

pub struct AppServices {
    pub services: Services,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

impl AppServices {
    pub fn new(services: Services) -> Self {
        let (realtime_tx, _realtime_rx) = broadcast::channel(REALTIME_CAPACITY);
        Self { services, realtime_tx }
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    /// Lossy: nobody listening is not an error.
    fn publish(&self, audience: Audience, topic: &'static str, payload: serde_json::Value) {
        let _ = self.realtime_tx.send(RealtimeMessage {
            audience,
            topic,
            payload,
        });
    }

    pub fn request_created(&self, request: &Request) {
        let payload = serde_json::json!({
            "request_id": request.id,
            "request_number": request.request_number,
            "user_id": request.user_id,
            "status": request.status,
        });
        self.publish(Audience::Operators, "request.created", payload.clone());
        self.publish(Audience::User(request.user_id), "request.created", payload);
    }

    /// Status change to the owner and to operators, then any low-stock
    /// notices its stock movements produced.
    pub fn request_transitioned(&self, committed: &CommittedTransition, previous: Option<&str>) {
        let request = &committed.request;
        let payload = serde_json::json!({
            "request_id": request.id,
            "request_number": request.request_number,
            "user_id": request.user_id,
            "previous_status": previous,
            "status": request.status,
        });
        self.publish(Audience::Operators, "request.status_changed", payload.clone());
        self.publish(Audience::User(request.user_id), "request.status_changed", payload);
        for posted in &committed.postings {
            self.stock_adjusted(posted);
        }
    }

    pub fn debt_created(&self, debt: &Debt) {
        let payload = serde_json::json!({
            "debt_id": debt.id,
            "user_id": debt.user_id,
            "product_id": debt.product_id,
            "total_amount": debt.total_amount,
        });
        self.publish(Audience::Operators, "debt.created", payload.clone());
        self.publish(Audience::User(debt.user_id), "debt.created", payload);
    }

    pub fn stock_adjusted(&self, posted: &PostedAdjustment) {
        if !self.services.ledger.is_low(posted) {
            return;
        }
        let product = &posted.product;
        self.publish(
            Audience::Operators,
            "stock.low",
            serde_json::json!({
                "product_id": product.id,
                "name": product.name,
                "stock_quantity": product.stock_quantity,
                "minimum_stock": product.minimum_stock,
            }),
        );
    }
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("services", &self.services)
            .field("subscribers", &self.realtime_tx.receiver_count())
            .finish()
    }
}

/// Users see messages addressed to them; staff see operator messages.
fn visible_to(message: &RealtimeMessage, user_id: UserId, staff: bool) -> bool {
    match message.audience {
        Audience::User(id) => !staff && id == user_id,
        Audience::Operators => staff,
    }
}

pub fn principal_sse_stream(
    services: Arc<AppServices>,
    principal: &PrincipalContext,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>> + use<>> {
    let user_id = principal.user_id();
    let staff = principal.principal().is_staff();
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if visible_to(&m, user_id, staff) => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
