use core::str::FromStr;

use serde::{Deserialize, Serialize};

use invoicer_core::DomainError;

/// Role granted to a user.
///
/// Every user implicitly holds [`Role::User`]; [`Role::Admin`] only matters in
/// combination with membership of an admin tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_USER")]
    User,
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "ROLE_USER",
            Role::Admin => "ROLE_ADMIN",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ROLE_USER" => Ok(Role::User),
            "ROLE_ADMIN" => Ok(Role::Admin),
            other => Err(DomainError::validation("roles", format!("unknown role '{other}'"))),
        }
    }
}
