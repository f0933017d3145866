use serde::{Deserialize, Serialize};

/// Role of the caller invoking a yard operation.
///
/// The set is closed: these are the positions that exist in the business.
/// Mapping roles to permissions lives in [`crate::permissions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ManagingDirector,
    GeneralManager,
    ProductionManager,
    StockManager,
    Accountant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ManagingDirector => "managing_director",
            Role::GeneralManager => "general_manager",
            Role::ProductionManager => "production_manager",
            Role::StockManager => "stock_manager",
            Role::Accountant => "accountant",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
