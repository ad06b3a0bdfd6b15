//! Per-role dashboard projections. Nothing is cached; every call recomputes.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use flowrack_auth::{Principal, User};

use super::{ServiceError, ServiceResult};
use crate::reports::{
    ACTIVITY_DEFAULT_LIMIT, ACTIVITY_MAX_LIMIT, ANALYTICS_TOP_N, ActivityEntry, ActivityScope, DebtStats, DebtTrend,
    OperatorOverview, Period, ProductUsage, RequestStats, RequestTrend, STATS_WINDOW_DAYS, UserActivity, days_before,
};
use crate::store::SharedStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    /// Delivered and not yet returned.
    pub active: i64,
    pub completed: i64,
}

impl From<&RequestStats> for RequestSummary {
    fn from(stats: &RequestStats) -> Self {
        Self {
            total: stats.total,
            pending: stats.pending,
            approved: stats.approved,
            active: stats.delivered,
            completed: stats.returned,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtSummary {
    pub total: i64,
    pub pending: i64,
    pub pending_amount: Decimal,
    pub paid: i64,
    pub total_amount: Decimal,
}

impl From<&DebtStats> for DebtSummary {
    fn from(stats: &DebtStats) -> Self {
        Self {
            total: stats.total,
            pending: stats.pending,
            pending_amount: stats.pending_amount,
            paid: stats.paid,
            total_amount: stats.total_amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDashboard {
    pub user_info: User,
    pub request_summary: RequestSummary,
    pub debt_summary: DebtSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorDashboard {
    pub request_stats: RequestStats,
    pub debt_stats: DebtStats,
    #[serde(flatten)]
    pub overview: OperatorOverview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analytics {
    pub period: Period,
    pub request_trends: Vec<RequestTrend>,
    pub product_usage: Vec<ProductUsage>,
    pub debt_trends: Vec<DebtTrend>,
    pub user_activity: Vec<UserActivity>,
}

#[derive(Clone)]
pub struct DashboardService {
    store: SharedStore,
    low_stock_multiplier: Decimal,
}

impl DashboardService {
    pub fn new(store: SharedStore, low_stock_multiplier: Decimal) -> Self {
        Self {
            store,
            low_stock_multiplier,
        }
    }

    /// All-time counts for the caller's own requests and debts.
    pub async fn for_user(&self, actor: &Principal) -> ServiceResult<UserDashboard> {
        let user_info = self
            .store
            .get_user(actor.user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("user {}", actor.user_id)))?;
        let today = Utc::now().date_naive();
        let requests = self.store.request_stats(Some(actor.user_id), None, today).await?;
        let debts = self.store.debt_stats(Some(actor.user_id), None).await?;
        Ok(UserDashboard {
            user_info,
            request_summary: RequestSummary::from(&requests),
            debt_summary: DebtSummary::from(&debts),
        })
    }

    pub async fn for_operator(&self) -> ServiceResult<OperatorDashboard> {
        let today = Utc::now().date_naive();
        let since = days_before(today, STATS_WINDOW_DAYS);
        let request_stats = self.store.request_stats(None, Some(since), today).await?;
        let debt_stats = self.store.debt_stats(None, Some(since)).await?;
        let overview = self.store.operator_overview(today, self.low_stock_multiplier).await?;
        Ok(OperatorDashboard {
            request_stats,
            debt_stats,
            overview,
        })
    }

    /// Own requests for a `user`; requests and recent debts for staff.
    pub async fn activity(&self, actor: &Principal, limit: Option<u32>) -> ServiceResult<Vec<ActivityEntry>> {
        let limit = limit.unwrap_or(ACTIVITY_DEFAULT_LIMIT).clamp(1, ACTIVITY_MAX_LIMIT);
        let scope = if actor.is_staff() {
            ActivityScope::System
        } else {
            ActivityScope::Own(actor.user_id)
        };
        Ok(self.store.recent_activity(scope, limit, Utc::now()).await?)
    }

    pub async fn analytics(&self, period: Period) -> ServiceResult<Analytics> {
        let since = period.since(Utc::now().date_naive());
        Ok(Analytics {
            period,
            request_trends: self.store.request_trends(since).await?,
            product_usage: self.store.product_usage(since, ANALYTICS_TOP_N).await?,
            debt_trends: self.store.debt_trends(since).await?,
            user_activity: self.store.user_activity(since, ANALYTICS_TOP_N).await?,
        })
    }
}
