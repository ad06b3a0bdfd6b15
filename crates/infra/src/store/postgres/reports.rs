//! Dashboard rollups computed in SQL.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::postgres::PgRow;

use flowrack_core::{ProductId, UserId};
use flowrack_debts::DebtStatus;
use flowrack_requests::RequestStatus;

use super::{PostgresStore, map_sqlx_error};
use crate::reports::{
    self, ActivityEntry, ActivityKind, ActivityScope, DebtStats, DebtTrend, OperatorOverview, ProductUsage,
    RequestStats, RequestTrend, UserActivity,
};
use crate::store::{ReportStore, StoreError, StoreResult};

fn get<'r, T>(row: &'r PgRow, column: &str, operation: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| map_sqlx_error(operation, e))
}

fn parse_request_status(raw: &str) -> StoreResult<RequestStatus> {
    RequestStatus::parse(raw).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl ReportStore for PostgresStore {
    async fn request_stats(&self, user: Option<UserId>, since: Option<DateTime<Utc>>, today: NaiveDate) -> StoreResult<RequestStats> {
        const OP: &str = "request_stats";
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                COUNT(*) FILTER (WHERE status = 'collecting') AS collecting,
                COUNT(*) FILTER (WHERE status = 'delivered') AS delivered,
                COUNT(*) FILTER (WHERE status = 'returned') AS returned,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled,
                COUNT(*) FILTER (WHERE (created_at AT TIME ZONE 'UTC')::date = $3) AS created_today
            FROM requests
            WHERE ($1::bigint IS NULL OR user_id = $1)
              AND ($2::timestamptz IS NULL OR created_at >= $2)
            "#,
        )
        .bind(user.map(|u| u.get()))
        .bind(since)
        .bind(today)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

        Ok(RequestStats {
            total: get(&row, "total", OP)?,
            pending: get(&row, "pending", OP)?,
            approved: get(&row, "approved", OP)?,
            collecting: get(&row, "collecting", OP)?,
            delivered: get(&row, "delivered", OP)?,
            returned: get(&row, "returned", OP)?,
            cancelled: get(&row, "cancelled", OP)?,
            created_today: get(&row, "created_today", OP)?,
        })
    }

    async fn debt_stats(&self, user: Option<UserId>, since: Option<DateTime<Utc>>) -> StoreResult<DebtStats> {
        const OP: &str = "debt_stats";
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'paid') AS paid,
                COUNT(*) FILTER (WHERE status = 'waived') AS waived,
                COUNT(*) FILTER (WHERE status = 'disputed') AS disputed,
                COALESCE(SUM(total_amount) FILTER (WHERE status = 'pending'), 0) AS pending_amount,
                COALESCE(SUM(total_amount), 0) AS total_amount,
                COUNT(DISTINCT user_id) AS users_with_debts
            FROM debts
            WHERE ($1::bigint IS NULL OR user_id = $1)
              AND ($2::timestamptz IS NULL OR created_at >= $2)
            "#,
        )
        .bind(user.map(|u| u.get()))
        .bind(since)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

        Ok(DebtStats {
            total: get(&row, "total", OP)?,
            pending: get(&row, "pending", OP)?,
            paid: get(&row, "paid", OP)?,
            waived: get(&row, "waived", OP)?,
            disputed: get(&row, "disputed", OP)?,
            pending_amount: get(&row, "pending_amount", OP)?,
            total_amount: get(&row, "total_amount", OP)?,
            users_with_debts: get(&row, "users_with_debts", OP)?,
        })
    }

    async fn operator_overview(&self, today: NaiveDate, low_stock_multiplier: Decimal) -> StoreResult<OperatorOverview> {
        const OP: &str = "operator_overview";
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM requests
                  WHERE status IN ('approved', 'collecting') AND requested_date = $1) AS today_deliveries,
                (SELECT COUNT(*) FROM products
                  WHERE is_active AND stock_quantity <= minimum_stock * $2) AS low_stock_products,
                (SELECT COUNT(*) FROM users WHERE is_active AND role = 'user') AS active_users,
                (SELECT COALESCE(SUM(total_amount), 0) FROM debts WHERE status = 'pending') AS total_pending_debt
            "#,
        )
        .bind(today)
        .bind(low_stock_multiplier)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

        Ok(OperatorOverview {
            today_deliveries: get(&row, "today_deliveries", OP)?,
            low_stock_products: get(&row, "low_stock_products", OP)?,
            active_users: get(&row, "active_users", OP)?,
            total_pending_debt: get(&row, "total_pending_debt", OP)?,
        })
    }

    async fn recent_activity(&self, scope: ActivityScope, limit: u32, now: DateTime<Utc>) -> StoreResult<Vec<ActivityEntry>> {
        const OP: &str = "recent_activity";
        let (owner, request_limit) = match scope {
            ActivityScope::Own(user_id) => (Some(user_id.get()), limit),
            ActivityScope::System => (None, reports::per_side_limit(limit)),
        };

        let rows = sqlx::query(
            r#"
            SELECT r.id, r.request_number, r.status, r.user_id, r.updated_at,
                   u.first_name || ' ' || u.last_name AS user_name
            FROM requests r
            JOIN users u ON u.id = r.user_id
            WHERE ($1::bigint IS NULL OR r.user_id = $1)
            ORDER BY r.updated_at DESC, r.id DESC
            LIMIT $2
            "#,
        )
        .bind(owner)
        .bind(i64::from(request_limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let status = parse_request_status(&get::<String>(row, "status", OP)?)?;
            let number: String = get(row, "request_number", OP)?;
            let user_name: String = get(row, "user_name", OP)?;
            entries.push(ActivityEntry {
                kind: ActivityKind::Request,
                reference_id: get(row, "id", OP)?,
                title: reports::request_title(&number),
                status: status.to_string(),
                user_id: UserId::new(get(row, "user_id", OP)?),
                description: reports::request_description(status, scope, &user_name),
                timestamp: get(row, "updated_at", OP)?,
            });
        }

        if scope == ActivityScope::System {
            let since = reports::days_before(now.date_naive(), reports::DEBT_ACTIVITY_DAYS);
            let rows = sqlx::query(
                r#"
                SELECT d.id, d.status, d.user_id, d.total_amount, d.created_at,
                       u.first_name || ' ' || u.last_name AS user_name,
                       p.name AS product_name
                FROM debts d
                JOIN users u ON u.id = d.user_id
                JOIN products p ON p.id = d.product_id
                WHERE d.created_at >= $1
                ORDER BY d.created_at DESC, d.id DESC
                LIMIT $2
                "#,
            )
            .bind(since)
            .bind(i64::from(reports::per_side_limit(limit)))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            for row in &rows {
                let status = DebtStatus::parse(&get::<String>(row, "status", OP)?)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                let user_name: String = get(row, "user_name", OP)?;
                let product_name: String = get(row, "product_name", OP)?;
                entries.push(ActivityEntry {
                    kind: ActivityKind::Debt,
                    reference_id: get(row, "id", OP)?,
                    title: reports::DEBT_TITLE.to_string(),
                    status: status.to_string(),
                    user_id: UserId::new(get(row, "user_id", OP)?),
                    description: reports::debt_description(&user_name, &product_name, get(row, "total_amount", OP)?),
                    timestamp: get(row, "created_at", OP)?,
                });
            }
        }

        Ok(reports::merge_activity(entries, limit as usize))
    }

    async fn request_trends(&self, since: DateTime<Utc>) -> StoreResult<Vec<RequestTrend>> {
        const OP: &str = "request_trends";
        let rows = sqlx::query(
            r#"
            SELECT
                (created_at AT TIME ZONE 'UTC')::date AS day,
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                COUNT(*) FILTER (WHERE status = 'delivered') AS delivered,
                COUNT(*) FILTER (WHERE status = 'returned') AS returned
            FROM requests
            WHERE created_at >= $1
            GROUP BY day
            ORDER BY day DESC
            "#,
        )
        .bind(since)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

        rows.iter()
            .map(|row| {
                Ok(RequestTrend {
                    date: get(row, "day", OP)?,
                    total: get(row, "total", OP)?,
                    pending: get(row, "pending", OP)?,
                    approved: get(row, "approved", OP)?,
                    delivered: get(row, "delivered", OP)?,
                    returned: get(row, "returned", OP)?,
                })
            })
            .collect()
    }

    async fn debt_trends(&self, since: DateTime<Utc>) -> StoreResult<Vec<DebtTrend>> {
        const OP: &str = "debt_trends";
        let rows = sqlx::query(
            r#"
            SELECT
                (created_at AT TIME ZONE 'UTC')::date AS day,
                COUNT(*) AS count,
                COALESCE(SUM(total_amount), 0) AS amount
            FROM debts
            WHERE created_at >= $1
            GROUP BY day
            ORDER BY day DESC
            "#,
        )
        .bind(since)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

        rows.iter()
            .map(|row| {
                Ok(DebtTrend {
                    date: get(row, "day", OP)?,
                    count: get(row, "count", OP)?,
                    amount: get(row, "amount", OP)?,
                })
            })
            .collect()
    }

    async fn product_usage(&self, since: DateTime<Utc>, limit: u32) -> StoreResult<Vec<ProductUsage>> {
        const OP: &str = "product_usage";
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.category,
                   COUNT(ri.id) AS request_count,
                   COALESCE(SUM(ri.delivered_quantity), 0) AS total_delivered
            FROM products p
            LEFT JOIN (
                SELECT ri.id, ri.product_id, ri.delivered_quantity
                FROM request_items ri
                JOIN requests r ON r.id = ri.request_id
                WHERE r.created_at >= $1
            ) ri ON ri.product_id = p.id
            GROUP BY p.id, p.name, p.category
            ORDER BY request_count DESC, p.name ASC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

        rows.iter()
            .map(|row| {
                Ok(ProductUsage {
                    product_id: ProductId::new(get(row, "id", OP)?),
                    name: get(row, "name", OP)?,
                    category: get(row, "category", OP)?,
                    request_count: get(row, "request_count", OP)?,
                    total_delivered: get(row, "total_delivered", OP)?,
                })
            })
            .collect()
    }

    async fn user_activity(&self, since: DateTime<Utc>, limit: u32) -> StoreResult<Vec<UserActivity>> {
        const OP: &str = "user_activity";
        // Counted in separate subqueries so requests and debts do not multiply each other.
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.first_name || ' ' || u.last_name AS name, u.department,
                   (SELECT COUNT(*) FROM requests r
                     WHERE r.user_id = u.id AND r.created_at >= $1) AS request_count,
                   (SELECT COALESCE(SUM(d.total_amount), 0) FROM debts d
                     WHERE d.user_id = u.id AND d.created_at >= $1) AS total_debt
            FROM users u
            WHERE u.role = 'user'
            ORDER BY request_count DESC, name ASC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

        rows.iter()
            .map(|row| {
                Ok(UserActivity {
                    user_id: UserId::new(get(row, "id", OP)?),
                    name: get(row, "name", OP)?,
                    department: get(row, "department", OP)?,
                    request_count: get(row, "request_count", OP)?,
                    total_debt: get(row, "total_debt", OP)?,
                })
            })
            .collect()
    }
}
