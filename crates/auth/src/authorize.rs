use thiserror::Error;

use crate::permissions::{Permission, role_permissions};
use crate::roles::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    Forbidden { role: Role, permission: String },
}

/// Authorize a role against a required permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(role: Role, required: &Permission) -> Result<(), AuthzError> {
    let granted = role_permissions(role);

    if granted
        .iter()
        .any(|p| p.is_wildcard() || p.as_str() == required.as_str())
    {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role,
            permission: required.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions;

    #[test]
    fn managing_director_holds_wildcard() {
        assert!(authorize(Role::ManagingDirector, &permissions::TREATMENT_RECORD).is_ok());
        assert!(authorize(Role::ManagingDirector, &permissions::BALANCES_ADJUST).is_ok());
    }

    #[test]
    fn production_manager_cannot_adjust_balances() {
        let err = authorize(Role::ProductionManager, &permissions::BALANCES_ADJUST).unwrap_err();
        match err {
            AuthzError::Forbidden { role, permission } => {
                assert_eq!(role, Role::ProductionManager);
                assert_eq!(permission, "balances.adjust");
            }
        }
    }

    #[test]
    fn accountant_cannot_record_treatment() {
        assert!(authorize(Role::Accountant, &permissions::TREATMENT_RECORD).is_err());
        assert!(authorize(Role::Accountant, &permissions::BALANCES_ADJUST).is_ok());
    }
}
