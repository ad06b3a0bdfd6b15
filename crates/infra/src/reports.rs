//! Read-side rollups for the dashboard.
//!
//! Nothing here is stored: every report is recomputed per call. The Postgres
//! store computes them in SQL; the in-memory store uses the tally functions
//! below over its maps. Both share the record types and the wording helpers.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use flowrack_auth::{Role, User};
use flowrack_core::{DomainError, DomainResult, ProductId, UserId};
use flowrack_debts::{Debt, DebtStatus};
use flowrack_products::Product;
use flowrack_requests::{Request, RequestItem, RequestStatus};

/// Rolling analytics window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Week,
    Month,
    Year,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            other => Err(DomainError::validation(format!(
                "period must be one of: week, month, year (got '{other}')"
            ))),
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Year => 365,
        }
    }

    /// Start of the window: midnight `days()` days before `today`.
    pub fn since(&self, today: NaiveDate) -> DateTime<Utc> {
        days_before(today, self.days())
    }
}

/// Midnight UTC `days` days before `today`.
pub fn days_before(today: NaiveDate, days: i64) -> DateTime<Utc> {
    (today - Duration::days(days)).and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Window used by request/debt statistics.
pub const STATS_WINDOW_DAYS: i64 = 30;
/// How far back the staff activity feed looks for new debts.
pub const DEBT_ACTIVITY_DAYS: i64 = 7;
pub const ACTIVITY_DEFAULT_LIMIT: u32 = 10;
pub const ACTIVITY_MAX_LIMIT: u32 = 100;
pub const ANALYTICS_TOP_N: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub collecting: i64,
    pub delivered: i64,
    pub returned: i64,
    pub cancelled: i64,
    pub created_today: i64,
}

impl RequestStats {
    fn count(&mut self, status: RequestStatus) {
        self.total += 1;
        match status {
            RequestStatus::Pending => self.pending += 1,
            RequestStatus::Approved => self.approved += 1,
            RequestStatus::Collecting => self.collecting += 1,
            RequestStatus::Delivered => self.delivered += 1,
            RequestStatus::Returned => self.returned += 1,
            RequestStatus::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtStats {
    pub total: i64,
    pub pending: i64,
    pub paid: i64,
    pub waived: i64,
    pub disputed: i64,
    pub pending_amount: Decimal,
    pub total_amount: Decimal,
    pub users_with_debts: i64,
}

/// System-wide counters shown to operators next to the statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorOverview {
    /// Approved or collecting requests whose requested date is today.
    pub today_deliveries: i64,
    pub low_stock_products: i64,
    pub active_users: i64,
    pub total_pending_debt: Decimal,
}

/// Whose activity a feed covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityScope {
    Own(UserId),
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Request,
    Debt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub reference_id: i64,
    pub title: String,
    pub status: String,
    pub user_id: UserId,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTrend {
    pub date: NaiveDate,
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub delivered: i64,
    pub returned: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtTrend {
    pub date: NaiveDate,
    pub count: i64,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUsage {
    pub product_id: ProductId,
    pub name: String,
    pub category: Option<String>,
    pub request_count: i64,
    pub total_delivered: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: UserId,
    pub name: String,
    pub department: Option<String>,
    pub request_count: i64,
    pub total_debt: Decimal,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wording
// ─────────────────────────────────────────────────────────────────────────────

pub fn request_title(request_number: &str) -> String {
    format!("Request {request_number}")
}

pub const DEBT_TITLE: &str = "Debt Created";

/// Feed line for a request, phrased for its owner or for staff.
pub fn request_description(status: RequestStatus, scope: ActivityScope, user_name: &str) -> String {
    match scope {
        ActivityScope::Own(_) => match status {
            RequestStatus::Pending => "Request submitted and pending approval".to_string(),
            RequestStatus::Approved => "Request approved, ready for collection".to_string(),
            RequestStatus::Delivered => "Materials delivered".to_string(),
            RequestStatus::Returned => "Materials returned".to_string(),
            RequestStatus::Cancelled => "Request cancelled".to_string(),
            other => format!("Status: {other}"),
        },
        ActivityScope::System => {
            let phrase = match status {
                RequestStatus::Pending => "New request submitted".to_string(),
                RequestStatus::Approved => "Request approved".to_string(),
                RequestStatus::Delivered => "Materials delivered".to_string(),
                RequestStatus::Returned => "Materials returned".to_string(),
                other => format!("Status: {other}"),
            };
            format!("User: {user_name} - {phrase}")
        }
    }
}

pub fn debt_description(user_name: &str, product_name: &str, amount: Decimal) -> String {
    format!("User: {user_name} - Product: {product_name} (${amount})")
}

/// Merge request and debt entries newest first, keeping at most `limit`.
pub fn merge_activity(mut entries: Vec<ActivityEntry>, limit: usize) -> Vec<ActivityEntry> {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries.truncate(limit);
    entries
}

/// Entries each side of the staff feed may contribute.
pub fn per_side_limit(limit: u32) -> u32 {
    limit.div_ceil(2)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tallies over in-memory records
// ─────────────────────────────────────────────────────────────────────────────

pub fn tally_requests<'a>(
    requests: impl IntoIterator<Item = &'a Request>,
    since: Option<DateTime<Utc>>,
    today: NaiveDate,
) -> RequestStats {
    let mut stats = RequestStats::default();
    for request in requests {
        if since.is_some_and(|s| request.created_at < s) {
            continue;
        }
        stats.count(request.status);
        if request.created_at.date_naive() == today {
            stats.created_today += 1;
        }
    }
    stats
}

pub fn tally_debts<'a>(debts: impl IntoIterator<Item = &'a Debt>, since: Option<DateTime<Utc>>) -> DebtStats {
    let mut stats = DebtStats::default();
    let mut users = std::collections::HashSet::new();
    for debt in debts {
        if since.is_some_and(|s| debt.created_at < s) {
            continue;
        }
        stats.total += 1;
        stats.total_amount = stats.total_amount.saturating_add(debt.total_amount);
        users.insert(debt.user_id);
        match debt.status {
            DebtStatus::Pending => {
                stats.pending += 1;
                stats.pending_amount = stats.pending_amount.saturating_add(debt.total_amount);
            }
            DebtStatus::Paid => stats.paid += 1,
            DebtStatus::Waived => stats.waived += 1,
            DebtStatus::Disputed => stats.disputed += 1,
        }
    }
    stats.users_with_debts = users.len() as i64;
    stats
}

pub fn request_trends<'a>(requests: impl IntoIterator<Item = &'a Request>, since: DateTime<Utc>) -> Vec<RequestTrend> {
    let mut by_day: BTreeMap<NaiveDate, RequestTrend> = BTreeMap::new();
    for request in requests.into_iter().filter(|r| r.created_at >= since) {
        let date = request.created_at.date_naive();
        let row = by_day.entry(date).or_insert_with(|| RequestTrend {
            date,
            total: 0,
            pending: 0,
            approved: 0,
            delivered: 0,
            returned: 0,
        });
        row.total += 1;
        match request.status {
            RequestStatus::Pending => row.pending += 1,
            RequestStatus::Approved => row.approved += 1,
            RequestStatus::Delivered => row.delivered += 1,
            RequestStatus::Returned => row.returned += 1,
            _ => {}
        }
    }
    by_day.into_values().rev().collect()
}

pub fn debt_trends<'a>(debts: impl IntoIterator<Item = &'a Debt>, since: DateTime<Utc>) -> Vec<DebtTrend> {
    let mut by_day: BTreeMap<NaiveDate, DebtTrend> = BTreeMap::new();
    for debt in debts.into_iter().filter(|d| d.created_at >= since) {
        let date = debt.created_at.date_naive();
        let row = by_day.entry(date).or_insert(DebtTrend {
            date,
            count: 0,
            amount: Decimal::ZERO,
        });
        row.count += 1;
        row.amount = row.amount.saturating_add(debt.total_amount);
    }
    by_day.into_values().rev().collect()
}

/// Item counts and delivered totals per product over requests created since
/// `since`. Products without items in the window appear with zero counts.
pub fn product_usage<'a>(
    products: impl IntoIterator<Item = &'a Product>,
    requests: &HashMap<flowrack_core::RequestId, Request>,
    items: impl IntoIterator<Item = &'a RequestItem>,
    since: DateTime<Utc>,
    limit: usize,
) -> Vec<ProductUsage> {
    let mut usage: HashMap<ProductId, (i64, Decimal)> = HashMap::new();
    for item in items {
        let in_window = requests.get(&item.request_id).is_some_and(|r| r.created_at >= since);
        if in_window {
            let entry = usage.entry(item.product_id).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 = entry.1.saturating_add(item.delivered_quantity.unwrap_or(Decimal::ZERO));
        }
    }

    let mut rows: Vec<ProductUsage> = products
        .into_iter()
        .map(|p| {
            let (request_count, total_delivered) = usage.get(&p.id).copied().unwrap_or((0, Decimal::ZERO));
            ProductUsage {
                product_id: p.id,
                name: p.name.clone(),
                category: p.category.clone(),
                request_count,
                total_delivered,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.request_count.cmp(&a.request_count).then_with(|| a.name.cmp(&b.name)));
    rows.truncate(limit);
    rows
}

/// Request counts and debt totals per `user`-role account since `since`.
pub fn user_activity<'a>(
    users: impl IntoIterator<Item = &'a User>,
    requests: impl IntoIterator<Item = &'a Request>,
    debts: impl IntoIterator<Item = &'a Debt>,
    since: DateTime<Utc>,
    limit: usize,
) -> Vec<UserActivity> {
    let mut request_counts: HashMap<UserId, i64> = HashMap::new();
    for request in requests.into_iter().filter(|r| r.created_at >= since) {
        *request_counts.entry(request.user_id).or_default() += 1;
    }
    let mut debt_totals: HashMap<UserId, Decimal> = HashMap::new();
    for debt in debts.into_iter().filter(|d| d.created_at >= since) {
        let total = debt_totals.entry(debt.user_id).or_default();
        *total = total.saturating_add(debt.total_amount);
    }

    let mut rows: Vec<UserActivity> = users
        .into_iter()
        .filter(|u| u.role == Role::User)
        .map(|u| UserActivity {
            user_id: u.id,
            name: u.full_name(),
            department: u.department.clone(),
            request_count: request_counts.get(&u.id).copied().unwrap_or(0),
            total_debt: debt_totals.get(&u.id).copied().unwrap_or(Decimal::ZERO),
        })
        .collect();
    rows.sort_by(|a, b| b.request_count.cmp(&a.request_count).then_with(|| a.name.cmp(&b.name)));
    rows.truncate(limit);
    rows
}
