use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use flowrack_core::{DomainError, DomainResult, Entity, Page, ProductId, RequestId, RequestItemId, UserId};

use crate::status::RequestStatus;

/// A user's dated ask for product quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub user_id: UserId,
    pub request_number: String,
    pub status: RequestStatus,
    pub requested_date: NaiveDate,
    pub requested_time: NaiveTime,
    pub estimated_usage_period: Option<String>,
    pub supervising_instructor: Option<String>,
    pub purpose: Option<String>,
    pub collection_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}

impl Entity for Request {
    type Id = RequestId;

    fn id(&self) -> RequestId {
        self.id
    }
}

/// A product line inside a request, filled in as the request advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub id: RequestItemId,
    pub request_id: RequestId,
    pub product_id: ProductId,
    pub requested_quantity: Decimal,
    pub approved_quantity: Option<Decimal>,
    pub delivered_quantity: Option<Decimal>,
    pub delivered_weight: Option<Decimal>,
    pub returned_quantity: Option<Decimal>,
    pub returned_weight: Option<Decimal>,
    pub notes: Option<String>,
}

impl Entity for RequestItem {
    type Id = RequestItemId;

    fn id(&self) -> RequestItemId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequestItem {
    pub product_id: ProductId,
    pub requested_quantity: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewRequestItem {
    pub fn into_item(self, id: RequestItemId, request_id: RequestId) -> RequestItem {
        RequestItem {
            id,
            request_id,
            product_id: self.product_id,
            requested_quantity: self.requested_quantity,
            approved_quantity: None,
            delivered_quantity: None,
            delivered_weight: None,
            returned_quantity: None,
            returned_weight: None,
            notes: self.notes,
        }
    }
}

/// Input for creating a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub requested_date: NaiveDate,
    pub requested_time: NaiveTime,
    pub estimated_usage_period: Option<String>,
    pub supervising_instructor: Option<String>,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<NewRequestItem>,
}

impl NewRequest {
    /// Shape checks that need no storage access. Product existence is checked
    /// by the caller.
    pub fn validate(&self, today: NaiveDate) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation("at least one item is required"));
        }
        if self.requested_date < today {
            return Err(DomainError::validation("requested date cannot be in the past"));
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if item.requested_quantity <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "requested quantity for product {} must be greater than zero",
                    item.product_id
                )));
            }
            if !seen.insert(item.product_id) {
                return Err(DomainError::validation(format!(
                    "product {} listed more than once",
                    item.product_id
                )));
            }
        }
        Ok(())
    }

    /// Materialize the request header once storage has assigned an id.
    pub fn to_request(
        &self,
        id: RequestId,
        user_id: UserId,
        request_number: String,
        at: DateTime<Utc>,
    ) -> Request {
        Request {
            id,
            user_id,
            request_number,
            status: RequestStatus::Pending,
            requested_date: self.requested_date,
            requested_time: self.requested_time,
            estimated_usage_period: self.estimated_usage_period.clone(),
            supervising_instructor: self.supervising_instructor.clone(),
            purpose: self.purpose.clone(),
            collection_date: None,
            delivery_date: None,
            return_date: None,
            notes: self.notes.clone(),
            created_at: at,
            updated_at: at,
        }
    }
}

/// `YYYY-MM-DD`.
pub fn parse_requested_date(s: &str) -> DomainResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| DomainError::validation("invalid date format, expected YYYY-MM-DD"))
}

/// `HH:MM` (seconds are tolerated).
pub fn parse_requested_time(s: &str) -> DomainResult<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| DomainError::validation("invalid time format, expected HH:MM"))
}

/// Listing filter; `date_from`/`date_to` bound `requested_date` inclusively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub user_id: Option<UserId>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub page: Page,
}

impl RequestFilter {
    pub fn matches(&self, request: &Request) -> bool {
        self.status.is_none_or(|s| request.status == s)
            && self.user_id.is_none_or(|u| request.user_id == u)
            && self.date_from.is_none_or(|d| request.requested_date >= d)
            && self.date_to.is_none_or(|d| request.requested_date <= d)
    }

    /// Filter, order newest first and paginate.
    pub fn apply<'a>(&self, requests: impl IntoIterator<Item = &'a Request>) -> Vec<Request> {
        let mut hits: Vec<&Request> = requests.into_iter().filter(|r| self.matches(r)).collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        self.page.slice(hits.into_iter().cloned())
    }
}
