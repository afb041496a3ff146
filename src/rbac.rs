/// Role-based access checks
///
/// Every protected operation resolves the caller to an `Identity` first and
/// then asks this module whether it may proceed.
use crate::{
    db::models::{Account, Role},
    error::{AuthError, AuthResult},
};
use serde::{Deserialize, Serialize};

/// Authenticated caller as seen by authorization checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_banned: bool,
}

impl From<&Account> for Identity {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            role: account.role,
            is_active: account.is_active,
            is_verified: account.is_verified,
            is_banned: account.is_banned,
        }
    }
}

/// Require an identity in good standing. Checks run in order: present,
/// active, verified, not banned.
pub fn require_auth(identity: Option<&Identity>) -> AuthResult<&Identity> {
    let identity = identity
        .ok_or_else(|| AuthError::Unauthenticated("Authentication required".to_string()))?;

    if !identity.is_active {
        return Err(AuthError::Forbidden("Account is inactive".to_string()));
    }

    if !identity.is_verified {
        return Err(AuthError::Forbidden("Email verification required".to_string()));
    }

    if identity.is_banned {
        return Err(AuthError::Forbidden("Account is banned".to_string()));
    }

    Ok(identity)
}

/// Require an identity in good standing holding one of `allowed`
pub fn require_role<'a>(identity: Option<&'a Identity>, allowed: &[Role]) -> AuthResult<&'a Identity> {
    let identity = require_auth(identity)?;

    if !has_role(Some(identity), allowed) {
        return Err(AuthError::Forbidden("Insufficient permissions".to_string()));
    }

    Ok(identity)
}

/// Whether the identity holds one of `allowed`; inactive or banned never does
pub fn has_role(identity: Option<&Identity>, allowed: &[Role]) -> bool {
    match identity {
        Some(identity) if identity.is_active && !identity.is_banned => {
            allowed.contains(&identity.role)
        }
        _ => false,
    }
}

/// Hierarchy comparison for conditional logic; never fails
pub fn has_minimum_role(identity: Option<&Identity>, minimum: Role) -> bool {
    match identity {
        Some(identity) if identity.is_active && !identity.is_banned => {
            identity.role.can_act_as(minimum)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role) -> Identity {
        Identity {
            id: "acc-1".into(),
            email: "a@x.com".into(),
            role,
            is_active: true,
            is_verified: true,
            is_banned: false,
        }
    }

    #[test]
    fn test_require_auth_order() {
        assert!(matches!(
            require_auth(None),
            Err(AuthError::Unauthenticated(_))
        ));

        let mut id = identity(Role::User);
        id.is_active = false;
        id.is_verified = false;
        id.is_banned = true;
        match require_auth(Some(&id)) {
            Err(AuthError::Forbidden(msg)) => assert_eq!(msg, "Account is inactive"),
            other => panic!("unexpected: {:?}", other),
        }

        id.is_active = true;
        match require_auth(Some(&id)) {
            Err(AuthError::Forbidden(msg)) => assert_eq!(msg, "Email verification required"),
            other => panic!("unexpected: {:?}", other),
        }

        id.is_verified = true;
        match require_auth(Some(&id)) {
            Err(AuthError::Forbidden(msg)) => assert_eq!(msg, "Account is banned"),
            other => panic!("unexpected: {:?}", other),
        }

        id.is_banned = false;
        assert!(require_auth(Some(&id)).is_ok());
    }

    #[test]
    fn test_require_role() {
        let judge = identity(Role::Judge);
        assert!(require_role(Some(&judge), &[Role::Judge, Role::Admin]).is_ok());
        assert!(matches!(
            require_role(Some(&judge), &[Role::Admin]),
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            require_role(None, &[Role::User]),
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_has_minimum_role() {
        let admin = identity(Role::Admin);
        assert!(has_minimum_role(Some(&admin), Role::User));
        assert!(has_minimum_role(Some(&admin), Role::Admin));
        assert!(!has_minimum_role(Some(&admin), Role::SuperAdmin));
        assert!(!has_minimum_role(None, Role::User));

        let mut banned = identity(Role::SuperAdmin);
        banned.is_banned = true;
        assert!(!has_minimum_role(Some(&banned), Role::User));
    }
}
