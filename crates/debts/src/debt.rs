use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use flowrack_core::{DebtId, DomainError, DomainResult, Entity, Page, ProductId, RequestId, UserId};

/// Debt lifecycle: created `pending`, resolved exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtStatus {
    Pending,
    Paid,
    Waived,
    Disputed,
}

impl DebtStatus {
    pub const ALL: [DebtStatus; 4] = [
        DebtStatus::Pending,
        DebtStatus::Paid,
        DebtStatus::Waived,
        DebtStatus::Disputed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DebtStatus::Pending => "pending",
            DebtStatus::Paid => "paid",
            DebtStatus::Waived => "waived",
            DebtStatus::Disputed => "disputed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| DomainError::validation(format!("unknown debt status '{s}'")))
    }

    pub fn is_resolution(&self) -> bool {
        !matches!(self, DebtStatus::Pending)
    }
}

impl core::fmt::Display for DebtStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtType {
    #[default]
    Missing,
    Damaged,
    Other,
}

impl DebtType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtType::Missing => "missing",
            DebtType::Damaged => "damaged",
            DebtType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "missing" => Ok(DebtType::Missing),
            "damaged" => Ok(DebtType::Damaged),
            "other" => Ok(DebtType::Other),
            other => Err(DomainError::validation(format!("unknown debt type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debt {
    pub id: DebtId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub request_id: Option<RequestId>,
    pub debt_type: DebtType,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// `quantity * unit_price` at creation; never re-derived.
    pub total_amount: Decimal,
    pub status: DebtStatus,
    pub description: Option<String>,
    pub created_by: UserId,
    pub due_date: Option<NaiveDate>,
    pub resolved_by: Option<UserId>,
    pub resolved_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Debt {
    type Id = DebtId;

    fn id(&self) -> DebtId {
        self.id
    }
}

/// Input for recording a debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDebt {
    pub user_id: UserId,
    pub product_id: ProductId,
    #[serde(default)]
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub debt_type: DebtType,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl NewDebt {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        self.total_amount()?;
        Ok(())
    }

    /// `quantity * unit_price`, rejected when it does not fit a decimal.
    pub fn total_amount(&self) -> DomainResult<Decimal> {
        self.quantity
            .checked_mul(self.unit_price)
            .ok_or_else(|| DomainError::validation("total amount out of range"))
    }

    /// Materialize the record once storage has assigned an id.
    pub fn into_debt(self, id: DebtId, created_by: UserId, at: DateTime<Utc>) -> DomainResult<Debt> {
        let total_amount = self.total_amount()?;
        Ok(Debt {
            id,
            user_id: self.user_id,
            product_id: self.product_id,
            request_id: self.request_id,
            debt_type: self.debt_type,
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_amount,
            status: DebtStatus::Pending,
            description: self.description,
            created_by,
            due_date: self.due_date,
            resolved_by: None,
            resolved_date: None,
            created_at: at,
            updated_at: at,
        })
    }
}

/// Outcome applied to a pending debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtResolution {
    pub status: DebtStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DebtResolution {
    pub fn new(status: DebtStatus, notes: Option<String>) -> DomainResult<Self> {
        if !status.is_resolution() {
            return Err(DomainError::validation(
                "status must be one of: paid, waived, disputed",
            ));
        }
        Ok(Self {
            status,
            notes: notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

impl Debt {
    /// Resolve a pending debt. The resolution note is appended to the
    /// description, never replacing it.
    pub fn resolve(
        &self,
        resolution: &DebtResolution,
        resolved_by: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Debt> {
        if self.status != DebtStatus::Pending {
            return Err(DomainError::invalid_state(
                self.status,
                format!("debt {} has already been resolved", self.id),
            ));
        }
        if !resolution.status.is_resolution() {
            return Err(DomainError::validation(
                "status must be one of: paid, waived, disputed",
            ));
        }

        Ok(Debt {
            status: resolution.status,
            description: append_resolution(self.description.as_deref(), resolution.notes.as_deref()),
            resolved_by: Some(resolved_by),
            resolved_date: Some(at),
            updated_at: at,
            ..self.clone()
        })
    }
}

fn append_resolution(description: Option<&str>, notes: Option<&str>) -> Option<String> {
    match (description.filter(|d| !d.is_empty()), notes) {
        (Some(d), Some(n)) => Some(format!("{d} | Resolution: {n}")),
        (None, Some(n)) => Some(format!("Resolution: {n}")),
        (d, None) => d.map(str::to_string),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtFilter {
    pub user_id: Option<UserId>,
    pub status: Option<DebtStatus>,
    pub page: Page,
}

impl DebtFilter {
    pub fn matches(&self, debt: &Debt) -> bool {
        self.user_id.is_none_or(|u| debt.user_id == u) && self.status.is_none_or(|s| debt.status == s)
    }

    /// Filter, order newest first and paginate.
    pub fn apply<'a>(&self, debts: impl IntoIterator<Item = &'a Debt>) -> Vec<Debt> {
        let mut hits: Vec<&Debt> = debts.into_iter().filter(|d| self.matches(d)).collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        self.page.slice(hits.into_iter().cloned())
    }
}
