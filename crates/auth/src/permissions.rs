use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "stock.sort").
/// A special wildcard permission `"*"` indicates "allow all" without
/// hardcoding every domain permission into the policy table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn new_static(name: &'static str) -> Self {
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
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const WILDCARD: Permission = Permission::new_static("*");

pub const PARTIES_REGISTER: Permission = Permission::new_static("parties.register");
pub const STOCK_RECEIVE: Permission = Permission::new_static("stock.receive");
pub const STOCK_SORT: Permission = Permission::new_static("stock.sort");
pub const STOCK_READ: Permission = Permission::new_static("stock.read");
pub const REJECTS_COLLECT: Permission = Permission::new_static("rejects.collect");
pub const REJECTS_READ: Permission = Permission::new_static("rejects.read");
pub const TREATMENT_RECORD: Permission = Permission::new_static("treatment.record");
pub const BALANCES_ADJUST: Permission = Permission::new_static("balances.adjust");
pub const BALANCES_READ: Permission = Permission::new_static("balances.read");
pub const DELIVERY_RECORD: Permission = Permission::new_static("delivery.record");

// Per-role grant tables. `Permission` carries drop glue (Cow), so slice
// literals in a match arm would be temporaries; statics give the tables a
// 'static home.
static MANAGEMENT_GRANTS: [Permission; 1] = [WILDCARD];

static PRODUCTION_MANAGER_GRANTS: [Permission; 5] = [
    STOCK_READ,
    STOCK_SORT,
    TREATMENT_RECORD,
    REJECTS_READ,
    BALANCES_READ,
];

static STOCK_MANAGER_GRANTS: [Permission; 9] = [
    PARTIES_REGISTER,
    STOCK_RECEIVE,
    STOCK_SORT,
    STOCK_READ,
    REJECTS_READ,
    REJECTS_COLLECT,
    DELIVERY_RECORD,
    BALANCES_ADJUST,
    BALANCES_READ,
];

static ACCOUNTANT_GRANTS: [Permission; 5] = [
    PARTIES_REGISTER,
    BALANCES_ADJUST,
    BALANCES_READ,
    STOCK_READ,
    REJECTS_READ,
];

/// Permissions granted to a role.
///
/// Directors and general management hold the wildcard; operational roles get
/// the slice of the yard they run.
pub fn role_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::ManagingDirector | Role::GeneralManager => &MANAGEMENT_GRANTS,
        Role::ProductionManager => &PRODUCTION_MANAGER_GRANTS,
        Role::StockManager => &STOCK_MANAGER_GRANTS,
        Role::Accountant => &ACCOUNTANT_GRANTS,
    }
}
