//! Accounts, sessions and profiles.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use flowrack_auth::{
    Hs256Jwt, JwtClaims, JwtIssuer, JwtValidator, NewUser, Principal, Role, TokenRevocationStore, User, UserFilter,
    UserUpdate, hash_password, validate_password_strength, verify_password,
};
use flowrack_core::{DomainError, UserId};

use super::{ServiceError, ServiceResult, ensure_owner_or_staff};
use crate::config::BootstrapAdmin;
use crate::reports::{DebtStats, RequestStats};
use crate::store::{SharedStore, StoreError};

/// A signed bearer token and the account it was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// A validated token resolved against the current account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession {
    pub principal: Principal,
    pub claims: JwtClaims,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: User,
    pub request_summary: RequestStats,
    pub debt_summary: DebtStats,
}

#[derive(Clone)]
pub struct UserService {
    store: SharedStore,
    jwt: Arc<Hs256Jwt>,
    revocations: Arc<dyn TokenRevocationStore>,
    token_ttl: Duration,
}

impl UserService {
    pub fn new(
        store: SharedStore,
        jwt: Arc<Hs256Jwt>,
        revocations: Arc<dyn TokenRevocationStore>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            jwt,
            revocations,
            token_ttl,
        }
    }

    /// Self-service sign-up. Always creates a `user` account.
    #[instrument(skip(self, new), fields(registration_number = %new.registration_number), err)]
    pub async fn register(&self, mut new: NewUser) -> ServiceResult<User> {
        new.role = Role::User;
        self.insert(new).await
    }

    /// Admin-created account with any role.
    #[instrument(skip(self, new), fields(registration_number = %new.registration_number, role = %new.role), err)]
    pub async fn create_user(&self, new: NewUser) -> ServiceResult<User> {
        self.insert(new).await
    }

    /// Unknown accounts, inactive accounts and wrong passwords all fail the same way.
    #[instrument(skip(self, password), fields(registration_number = %registration_number), err)]
    pub async fn login(&self, registration_number: &str, password: &str) -> ServiceResult<IssuedToken> {
        let Some(credentials) = self.store.find_credentials(registration_number.trim()).await? else {
            return Err(ServiceError::InvalidCredentials);
        };
        if !credentials.user.is_active {
            return Err(ServiceError::InvalidCredentials);
        }
        if !verify(password.to_string(), credentials.password_hash).await? {
            return Err(ServiceError::InvalidCredentials);
        }

        let user = credentials.user;
        let claims = JwtClaims::new(user.id, user.role, Utc::now(), self.token_ttl);
        let token = self
            .jwt
            .issue(&claims)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        info!(user_id = %user.id, "login succeeded");
        Ok(IssuedToken {
            token,
            token_type: "Bearer".to_string(),
            expires_at: claims.expires_at(),
            user,
        })
    }

    /// Revoke the session's token until it would have expired anyway.
    pub fn logout(&self, session: &AuthenticatedSession) {
        self.revocations.revoke(session.claims.jti, session.claims.expires_at());
        info!(user_id = %session.user.id, "logged out");
    }

    /// Resolve a bearer token. The principal carries the account's current
    /// role, not the one baked into the token.
    pub async fn authenticate(&self, token: &str) -> ServiceResult<AuthenticatedSession> {
        let now = Utc::now();
        let claims = self
            .jwt
            .validate(token, now)
            .map_err(|_| ServiceError::Unauthenticated)?;
        if self.revocations.is_revoked(&claims.jti, now) {
            return Err(ServiceError::Unauthenticated);
        }
        let user = self
            .store
            .get_user(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ServiceError::Unauthenticated)?;
        Ok(AuthenticatedSession {
            principal: Principal::new(user.id, user.role),
            claims,
            user,
        })
    }

    pub async fn profile(&self, actor: &Principal) -> ServiceResult<UserProfile> {
        let user = self.get(actor, actor.user_id).await?;
        let today = Utc::now().date_naive();
        let request_summary = self.store.request_stats(Some(user.id), None, today).await?;
        let debt_summary = self.store.debt_stats(Some(user.id), None).await?;
        Ok(UserProfile {
            user,
            request_summary,
            debt_summary,
        })
    }

    #[instrument(skip(self, actor, current, new), fields(user_id = %actor.user_id), err)]
    pub async fn change_password(&self, actor: &Principal, current: &str, new: &str) -> ServiceResult<()> {
        validate_password_strength(new)?;
        let credentials = self
            .store
            .credentials(actor.user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("user {}", actor.user_id)))?;
        if !verify(current.to_string(), credentials.password_hash).await? {
            return Err(DomainError::validation("current password is incorrect").into());
        }
        let hash = hash(new.to_string()).await?;
        self.store.set_password_hash(actor.user_id, &hash, Utc::now()).await?;
        info!(user_id = %actor.user_id, "password changed");
        Ok(())
    }

    pub async fn list(&self, filter: &UserFilter) -> ServiceResult<Vec<User>> {
        Ok(self.store.list_users(filter).await?)
    }

    pub async fn get(&self, actor: &Principal, id: UserId) -> ServiceResult<User> {
        ensure_owner_or_staff(actor, id, "user")?;
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("user {id}")))
    }

    /// Profile fields for self or admin; role and active flag are admin-only
    /// and never on one's own account.
    #[instrument(skip(self, actor, update), fields(user_id = %id, actor = %actor.user_id), err)]
    pub async fn update(&self, actor: &Principal, id: UserId, update: UserUpdate) -> ServiceResult<User> {
        update.validate()?;
        if actor.user_id != id && !actor.is_admin() {
            return Err(ServiceError::forbidden("only administrators can update other accounts"));
        }
        if update.touches_privileges() {
            if !actor.is_admin() {
                return Err(ServiceError::forbidden("only administrators can change role or active status"));
            }
            if actor.user_id == id {
                return Err(ServiceError::forbidden("administrators cannot change their own role or status"));
            }
        }

        let current = self
            .store
            .get_user(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("user {id}")))?;
        let next = current.with_update(&update, Utc::now());
        self.store.update_user(&next).await.map_err(duplicate_as_conflict)
    }

    #[instrument(skip(self, actor), fields(user_id = %id, actor = %actor.user_id), err)]
    pub async fn deactivate(&self, actor: &Principal, id: UserId) -> ServiceResult<User> {
        if actor.user_id == id {
            return Err(DomainError::validation("cannot deactivate your own account").into());
        }
        let current = self
            .store
            .get_user(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("user {id}")))?;
        let user = self.store.update_user(&current.deactivated(Utc::now())).await?;
        info!(user_id = %id, "user deactivated");
        Ok(user)
    }

    /// Create the configured administrator unless that registration number
    /// already exists. Returns the new account, if one was created.
    pub async fn ensure_bootstrap_admin(&self, admin: &BootstrapAdmin) -> ServiceResult<Option<User>> {
        if self.store.find_credentials(&admin.registration_number).await?.is_some() {
            info!(registration_number = %admin.registration_number, "bootstrap admin already present");
            return Ok(None);
        }
        let user = self
            .insert(NewUser {
                registration_number: admin.registration_number.clone(),
                password: admin.password.clone(),
                first_name: "System".to_string(),
                last_name: "Administrator".to_string(),
                email: None,
                phone: None,
                role: Role::Admin,
                department: None,
            })
            .await?;
        warn!(user_id = %user.id, registration_number = %user.registration_number, "bootstrap admin created");
        Ok(Some(user))
    }

    async fn insert(&self, new: NewUser) -> ServiceResult<User> {
        new.validate()?;
        let hash = hash(new.password.clone()).await?;
        let user = self
            .store
            .insert_user(&new, &hash, Utc::now())
            .await
            .map_err(duplicate_as_conflict)?;
        info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user)
    }
}

fn duplicate_as_conflict(err: StoreError) -> ServiceError {
    match err {
        StoreError::Duplicate(what) => DomainError::conflict(what).into(),
        other => other.into(),
    }
}

// Argon2 runs on the blocking pool.
async fn hash(password: String) -> ServiceResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(format!("password task failed: {e}")))?
        .map_err(ServiceError::from)
}

async fn verify(password: String, stored_hash: String) -> ServiceResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| ServiceError::Internal(format!("password task failed: {e}")))?
        .map_err(ServiceError::from)
}
