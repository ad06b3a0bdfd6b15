use flowrack_auth::{Principal, Role, User};
use flowrack_core::UserId;
use flowrack_infra::services::AuthenticatedSession;

/// Authenticated caller for a request, inserted by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    session: AuthenticatedSession,
}

impl PrincipalContext {
    pub fn new(session: AuthenticatedSession) -> Self {
        Self { session }
    }

    pub fn principal(&self) -> &Principal {
        &self.session.principal
    }

    pub fn user(&self) -> &User {
        &self.session.user
    }

    pub fn user_id(&self) -> UserId {
        self.session.principal.user_id
    }

    pub fn role(&self) -> Role {
        self.session.principal.role
    }

    pub fn session(&self) -> &AuthenticatedSession {
        &self.session
    }
}
