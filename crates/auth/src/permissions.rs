use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "stock.adjust"). The wildcard `"*"`
/// grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    pub const ALL: Permission = Permission::from_static("*");

    pub const CATALOG_READ: Permission = Permission::from_static("catalog.read");
    pub const CATALOG_WRITE: Permission = Permission::from_static("catalog.write");
    pub const CATALOG_DEACTIVATE: Permission = Permission::from_static("catalog.deactivate");
    pub const STOCK_ADJUST: Permission = Permission::from_static("stock.adjust");
    pub const STOCK_HISTORY: Permission = Permission::from_static("stock.history");

    pub const REQUESTS_CREATE: Permission = Permission::from_static("requests.create");
    pub const REQUESTS_READ_OWN: Permission = Permission::from_static("requests.read_own");
    pub const REQUESTS_READ_ALL: Permission = Permission::from_static("requests.read_all");
    pub const REQUESTS_CANCEL_OWN: Permission = Permission::from_static("requests.cancel_own");
    pub const REQUESTS_FULFIL: Permission = Permission::from_static("requests.fulfil");

    pub const DEBTS_READ_OWN: Permission = Permission::from_static("debts.read_own");
    pub const DEBTS_READ_ALL: Permission = Permission::from_static("debts.read_all");
    pub const DEBTS_MANAGE: Permission = Permission::from_static("debts.manage");

    pub const USERS_READ: Permission = Permission::from_static("users.read");
    pub const USERS_MANAGE: Permission = Permission::from_static("users.manage");

    pub const DASHBOARD_SYSTEM: Permission = Permission::from_static("dashboard.system");
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role policy.
pub fn permissions_for(role: Role) -> Vec<Permission> {
    let user = [
        Permission::CATALOG_READ,
        Permission::REQUESTS_CREATE,
        Permission::REQUESTS_READ_OWN,
        Permission::REQUESTS_CANCEL_OWN,
        Permission::DEBTS_READ_OWN,
    ];
    let operator = [
        Permission::CATALOG_WRITE,
        Permission::STOCK_ADJUST,
        Permission::STOCK_HISTORY,
        Permission::REQUESTS_READ_ALL,
        Permission::REQUESTS_FULFIL,
        Permission::DEBTS_READ_ALL,
        Permission::DEBTS_MANAGE,
        Permission::USERS_READ,
        Permission::DASHBOARD_SYSTEM,
    ];

    match role {
        Role::User => user.to_vec(),
        Role::Operator => user.into_iter().chain(operator).collect(),
        Role::Admin => vec![Permission::ALL],
    }
}
