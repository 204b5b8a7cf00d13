//! Portal identity types.
//!
//! A transport connection is resolved to an [`Identity`] exactly once, by
//! the identity provider at connect time. Everything downstream (registry,
//! router, lifecycle) trusts the resolved identity and never re-reads
//! credentials.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Role of a portal account within the support chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Customer => write!(f, "customer"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// An authenticated portal account attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub display_name: String,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [Role::Customer, Role::Admin] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(role, parsed);
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_identity_is_admin() {
        let identity = Identity {
            user_id: Uuid::now_v7(),
            role: Role::Admin,
            display_name: "Support Team".to_string(),
        };
        assert!(identity.is_admin());
    }
}
