//! User accounts.
//!
//! Passwords never live on the [`User`] record; storage keeps the hash in a
//! separate column and hands it out only for verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flowrack_core::{DomainError, DomainResult, Entity, Page, UserId};

use crate::Role;
use crate::password::validate_password_strength;

// ─────────────────────────────────────────────────────────────────────────────
// User record
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub registration_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn with_update(&self, update: &UserUpdate, at: DateTime<Utc>) -> User {
        let mut next = self.clone();
        if let Some(first) = &update.first_name {
            next.first_name = first.trim().to_string();
        }
        if let Some(last) = &update.last_name {
            next.last_name = last.trim().to_string();
        }
        if let Some(email) = &update.email {
            next.email = Some(normalize_email(email));
        }
        if let Some(phone) = &update.phone {
            next.phone = Some(phone.clone());
        }
        if let Some(department) = &update.department {
            next.department = Some(department.clone());
        }
        if let Some(role) = update.role {
            next.role = role;
        }
        if let Some(active) = update.is_active {
            next.is_active = active;
        }
        next.updated_at = at;
        next
    }

    pub fn deactivated(&self, at: DateTime<Utc>) -> User {
        User {
            is_active: false,
            updated_at: at,
            ..self.clone()
        }
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inputs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub registration_number: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
}

impl NewUser {
    pub fn validate(&self) -> DomainResult<()> {
        if self.registration_number.trim().is_empty() {
            return Err(DomainError::validation("registration_number is required"));
        }
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(DomainError::validation("first_name and last_name are required"));
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        validate_password_strength(&self.password)
    }

    /// Materialize the record once storage has assigned an id.
    pub fn to_user(&self, id: UserId, at: DateTime<Utc>) -> User {
        User {
            id,
            registration_number: self.registration_number.trim().to_string(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.as_deref().map(normalize_email),
            phone: self.phone.clone(),
            role: self.role,
            department: self.department.clone(),
            is_active: true,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Profile changes. `role` and `is_active` are admin-only; the caller checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.department.is_none()
            && self.role.is_none()
            && self.is_active.is_none()
    }

    pub fn touches_privileges(&self) -> bool {
        self.role.is_some() || self.is_active.is_some()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.is_empty() {
            return Err(DomainError::validation("no fields to update"));
        }
        if self.first_name.as_deref().is_some_and(|n| n.trim().is_empty())
            || self.last_name.as_deref().is_some_and(|n| n.trim().is_empty())
        {
            return Err(DomainError::validation("names cannot be empty"));
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
    /// Case-insensitive substring over names, registration number and email.
    pub search: Option<String>,
    pub page: Page,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if self.role.is_some_and(|r| user.role != r) {
            return false;
        }
        if self.is_active.is_some_and(|a| user.is_active != a) {
            return false;
        }
        if let Some(department) = &self.department {
            if user.department.as_deref() != Some(department.as_str()) {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let haystacks = [
                Some(user.first_name.as_str()),
                Some(user.last_name.as_str()),
                Some(user.registration_number.as_str()),
                user.email.as_deref(),
            ];
            if !haystacks
                .into_iter()
                .flatten()
                .any(|h| h.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }

    /// Filter, order by last then first name, paginate.
    pub fn apply<'a>(&self, users: impl IntoIterator<Item = &'a User>) -> Vec<User> {
        let mut hits: Vec<&User> = users.into_iter().filter(|u| self.matches(u)).collect();
        hits.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
                .then(a.id.cmp(&b.id))
        });
        self.page.slice(hits.into_iter().cloned())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> DomainResult<()> {
    let email = email.trim();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid {
        return Err(DomainError::validation(format!("invalid email address '{email}'")));
    }
    Ok(())
}
